use cmis_types::{property_ids as ids, ObjectId};

use crate::error::{ClientError, ClientResult};
use crate::object::Entity;

object_view!(
    /// A directed link between two objects.
    Relationship
);

impl Relationship {
    pub fn source_id(&self) -> Option<ObjectId> {
        self.text(ids::SOURCE_ID).map(ObjectId::from)
    }

    pub fn target_id(&self) -> Option<ObjectId> {
        self.text(ids::TARGET_ID).map(ObjectId::from)
    }

    /// Load the source object with this relationship's context.
    pub fn source(&self) -> ClientResult<Entity> {
        self.end(self.source_id(), ids::SOURCE_ID)
    }

    pub fn target(&self) -> ClientResult<Entity> {
        self.end(self.target_id(), ids::TARGET_ID)
    }

    fn end(&self, id: Option<ObjectId>, property: &str) -> ClientResult<Entity> {
        let id = id.ok_or_else(|| {
            ClientError::IllegalState(format!("relationship {} has no {property}", self.id()))
        })?;
        self.session()?
            .get_object_with_context(&id, self.creation_context())
    }
}
