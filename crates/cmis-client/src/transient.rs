//! Staged editing.
//!
//! A [`TransientObject`] is a detached draft of one persistent object.
//! Edits are validated and recorded locally; nothing reaches the repository
//! until [`TransientObject::save`], which replays them in a fixed order:
//!
//! 1. delete (wins over everything else), or a staged folder-tree delete
//! 2. property update, sent with a freshly fetched change token
//! 3. content set or delete, with the token fetched again
//! 4. ACL changes, one call per propagation mode
//! 5. policy applications, then removals, one call per policy
//!
//! Staging takes `&mut self`, so one draft has exactly one editor at a time.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cmis_binding::UnfileObject;
use cmis_types::{
    property_ids as ids, Ace, AclPropagation, BaseTypeId, Cardinality, ContentStream, ObjectId,
    OperationContext, Property, PropertyData, PropertyMap, PropertyValue, TypeDefinition,
    Updatability,
};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::object::Entity;
use crate::session::Session;

/// Options of a staged folder-tree delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeleteTree {
    pub all_versions: bool,
    pub unfile: UnfileObject,
    pub continue_on_failure: bool,
}

#[derive(Clone, Debug, PartialEq)]
enum ContentChange {
    Set { stream: ContentStream, overwrite: bool },
    Delete,
}

/// ACEs staged for one propagation mode. `None` is the unspecified mode.
type AceBuckets = BTreeMap<Option<AclPropagation>, Vec<Ace>>;

/// A local draft of a persistent object.
#[derive(Debug)]
pub struct TransientObject {
    session: Session,
    object: Entity,
    /// `None` once a save deleted the object.
    id: Option<ObjectId>,
    object_type: Arc<TypeDefinition>,
    properties: PropertyMap,
    dirty: BTreeSet<String>,
    modified: bool,
    delete_all_versions: Option<bool>,
    delete_tree: Option<DeleteTree>,
    content: Option<ContentChange>,
    add_aces: AceBuckets,
    remove_aces: AceBuckets,
    add_policies: Vec<ObjectId>,
    remove_policies: Vec<ObjectId>,
}

impl TransientObject {
    pub(crate) fn new(object: Entity) -> ClientResult<Self> {
        let session = object.session()?;
        let id = object.id().clone();
        let object_type = object.object_type();
        let properties = object.properties();
        Ok(Self {
            session,
            object,
            id: Some(id),
            object_type,
            properties,
            dirty: BTreeSet::new(),
            modified: false,
            delete_all_versions: None,
            delete_tree: None,
            content: None,
            add_aces: AceBuckets::new(),
            remove_aces: AceBuckets::new(),
            add_policies: Vec::new(),
            remove_policies: Vec::new(),
        })
    }

    // ---------------------------------------------------------------
    // State
    // ---------------------------------------------------------------

    /// The id edits will be committed against.
    pub fn id(&self) -> ClientResult<&ObjectId> {
        self.id.as_ref().ok_or_else(|| {
            ClientError::IllegalState("the object was deleted by a previous save".to_string())
        })
    }

    /// The persistent object this draft was taken from.
    pub fn object(&self) -> &Entity {
        &self.object
    }

    pub fn base_type_id(&self) -> BaseTypeId {
        self.object.base_type_id()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn is_property_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn is_marked_for_delete(&self) -> bool {
        self.delete_all_versions.is_some()
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, id: &str) -> Option<&Property> {
        self.properties.get(id)
    }

    pub fn property_value(&self, id: &str) -> Option<&PropertyValue> {
        self.properties.get(id).and_then(Property::first_value)
    }

    pub fn name(&self) -> Option<&str> {
        self.properties.get(ids::NAME).and_then(Property::value_as_str)
    }

    fn ensure_live(&self) -> ClientResult<()> {
        self.id().map(|_| ())
    }

    fn is_checked_out(&self) -> bool {
        self.property_value(ids::IS_VERSION_SERIES_CHECKED_OUT)
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false)
    }

    fn ensure_base(&self, base: BaseTypeId, what: &str) -> ClientResult<()> {
        if self.base_type_id() != base {
            return Err(ClientError::NotSupported(format!(
                "{what} on a {}",
                self.base_type_id()
            )));
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Staging
    // ---------------------------------------------------------------

    /// Stage new values for a property. An empty list unsets a
    /// single-valued property and empties a multi-valued one, which stays
    /// present. Checked against the definition without a repository call.
    pub fn set_property_value(&mut self, id: &str, values: Vec<PropertyValue>) -> ClientResult<()> {
        self.ensure_live()?;
        let definition = Arc::clone(
            self.object_type
                .property_definition(id)
                .ok_or_else(|| ClientError::InvalidArgument(format!("unknown property {id}")))?,
        );
        if !Updatability::for_update(self.is_checked_out()).contains(&definition.updatability) {
            return Err(ClientError::InvalidArgument(format!(
                "property {id} is not updatable"
            )));
        }
        let property = self
            .session
            .factory()
            .create_property(&definition, values)?;
        if property.values().is_empty() && definition.cardinality == Cardinality::Single {
            self.properties.remove(id);
        } else {
            self.properties.insert(id.to_string(), property);
        }
        self.dirty.insert(id.to_string());
        self.modified = true;
        debug!(object_id = ?self.id, property = id, "property staged");
        Ok(())
    }

    /// Stage a single value.
    pub fn set_property(&mut self, id: &str, value: impl Into<PropertyValue>) -> ClientResult<()> {
        self.set_property_value(id, vec![value.into()])
    }

    pub fn set_name(&mut self, name: &str) -> ClientResult<()> {
        if name.is_empty() {
            return Err(ClientError::InvalidArgument(
                "name must not be empty".to_string(),
            ));
        }
        self.set_property(ids::NAME, name)
    }

    /// Mark the object for deletion. Other staged edits are ignored on save.
    pub fn delete(&mut self, all_versions: bool) -> ClientResult<()> {
        self.ensure_live()?;
        self.delete_all_versions = Some(all_versions);
        self.modified = true;
        Ok(())
    }

    /// Stage a delete of this folder and everything below it.
    pub fn delete_tree(&mut self, options: DeleteTree) -> ClientResult<()> {
        self.ensure_live()?;
        self.ensure_base(BaseTypeId::Folder, "tree delete")?;
        self.delete_tree = Some(options);
        self.modified = true;
        Ok(())
    }

    pub fn set_content_stream(&mut self, stream: ContentStream, overwrite: bool) -> ClientResult<()> {
        self.ensure_live()?;
        self.ensure_base(BaseTypeId::Document, "content")?;
        self.content = Some(ContentChange::Set { stream, overwrite });
        self.modified = true;
        Ok(())
    }

    pub fn delete_content_stream(&mut self) -> ClientResult<()> {
        self.ensure_live()?;
        self.ensure_base(BaseTypeId::Document, "content")?;
        self.content = Some(ContentChange::Delete);
        self.modified = true;
        Ok(())
    }

    /// Stage applying a policy. Staging the same policy twice has no
    /// further effect; a pending removal of it is withdrawn.
    pub fn apply_policy(&mut self, policy_id: ObjectId) -> ClientResult<()> {
        self.ensure_live()?;
        self.remove_policies.retain(|p| p != &policy_id);
        if !self.add_policies.contains(&policy_id) {
            self.add_policies.push(policy_id);
        }
        self.modified = true;
        Ok(())
    }

    pub fn remove_policy(&mut self, policy_id: ObjectId) -> ClientResult<()> {
        self.ensure_live()?;
        self.add_policies.retain(|p| p != &policy_id);
        if !self.remove_policies.contains(&policy_id) {
            self.remove_policies.push(policy_id);
        }
        self.modified = true;
        Ok(())
    }

    /// Stage granting `permissions` to `principal_id`.
    pub fn add_ace(
        &mut self,
        principal_id: &str,
        permissions: &[&str],
        propagation: Option<AclPropagation>,
    ) -> ClientResult<()> {
        self.ensure_live()?;
        self.add_aces
            .entry(propagation)
            .or_default()
            .push(Ace::new(principal_id, permissions.iter().copied()));
        self.modified = true;
        Ok(())
    }

    pub fn remove_ace(
        &mut self,
        principal_id: &str,
        permissions: &[&str],
        propagation: Option<AclPropagation>,
    ) -> ClientResult<()> {
        self.ensure_live()?;
        self.remove_aces
            .entry(propagation)
            .or_default()
            .push(Ace::new(principal_id, permissions.iter().copied()));
        self.modified = true;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Commit
    // ---------------------------------------------------------------

    /// Commit staged edits.
    ///
    /// Returns the id of the committed object (a new one if the repository
    /// versioned it), or `None` if the object was deleted. An unmodified
    /// draft returns its id without contacting the repository. If a write
    /// fails the staged edits are kept, so the call can be retried. Once
    /// every write went through the draft is clean; a failed reload of the
    /// committed object only leaves the previous snapshot in place.
    pub fn save(&mut self) -> ClientResult<Option<ObjectId>> {
        let original = self.id()?.clone();
        if !self.modified {
            return Ok(Some(original));
        }
        let service = Arc::clone(self.session.service());

        if let Some(all_versions) = self.delete_all_versions {
            service.delete_object(original.as_str(), all_versions)?;
            self.session.remove_object_from_cache(&original);
            info!(object_id = %original, all_versions, "staged delete committed");
            self.discard_staged();
            self.id = None;
            return Ok(None);
        }

        if let Some(options) = self.delete_tree {
            let failed = service.delete_tree(
                original.as_str(),
                options.all_versions,
                options.unfile,
                options.continue_on_failure,
            )?;
            self.session.clear_object_cache();
            if !failed.is_empty() {
                return Err(ClientError::Constraint(format!(
                    "tree delete left {} object(s): {}",
                    failed.len(),
                    failed.join(", ")
                )));
            }
            info!(folder_id = %original, "staged tree delete committed");
            self.discard_staged();
            self.id = None;
            return Ok(None);
        }

        let mut working = original.clone();

        if !self.dirty.is_empty() {
            let token = self.current_change_token(&working)?;
            let properties = self.staged_properties()?;
            let updated =
                service.update_properties(working.as_str(), token.as_deref(), properties)?;
            debug!(object_id = %working, new_id = %updated.id, "staged properties committed");
            self.session.remove_object_from_cache(&working);
            working = ObjectId::from(updated.id);
        }

        if let Some(change) = &self.content {
            let token = self.current_change_token(&working)?;
            let updated = match change {
                ContentChange::Set { stream, overwrite } => service.set_content_stream(
                    working.as_str(),
                    *overwrite,
                    token.as_deref(),
                    stream.clone(),
                )?,
                ContentChange::Delete => {
                    service.delete_content_stream(working.as_str(), token.as_deref())?
                }
            };
            debug!(object_id = %working, new_id = %updated.id, "staged content committed");
            self.session.remove_object_from_cache(&working);
            working = ObjectId::from(updated.id);
        }

        let modes: BTreeSet<Option<AclPropagation>> = self
            .add_aces
            .keys()
            .chain(self.remove_aces.keys())
            .copied()
            .collect();
        for propagation in modes {
            let add = self.add_aces.get(&propagation).map(Vec::as_slice);
            let remove = self.remove_aces.get(&propagation).map(Vec::as_slice);
            service.apply_acl(
                working.as_str(),
                add.unwrap_or_default(),
                remove.unwrap_or_default(),
                propagation,
            )?;
            debug!(object_id = %working, ?propagation, "staged acl committed");
        }

        for policy in &self.add_policies {
            service.apply_policy(policy.as_str(), working.as_str())?;
        }
        for policy in &self.remove_policies {
            service.remove_policy(policy.as_str(), working.as_str())?;
        }

        // Everything is committed: the draft is clean even if the reload fails.
        self.discard_staged();
        self.id = Some(working.clone());
        info!(object_id = %original, committed_id = %working, "staged edits saved");

        self.session.remove_object_from_cache(&working);
        let context = self.object.creation_context().clone();
        match self.session.get_object_with_context(&working, &context) {
            Ok(object) => {
                self.object = object;
                self.snapshot();
            }
            Err(e) => {
                warn!(
                    object_id = %working,
                    error = %e,
                    "reload after save failed; keeping the previous snapshot"
                );
            }
        }
        Ok(Some(working))
    }

    /// The change token as the repository has it now.
    fn current_change_token(&self, id: &ObjectId) -> ClientResult<Option<String>> {
        let context = OperationContext::minimal([ids::CHANGE_TOKEN])?;
        let record = self.session.service().get_object(id.as_str(), &context)?;
        Ok(record.change_token().map(str::to_string))
    }

    fn staged_properties(&self) -> ClientResult<Vec<PropertyData>> {
        let properties: Vec<PropertyData> = self
            .dirty
            .iter()
            .map(|id| {
                let values = self
                    .properties
                    .get(id)
                    .map(|p| p.values().to_vec())
                    .unwrap_or_default();
                PropertyData::new(id.clone(), values)
            })
            .collect();
        self.session.factory().convert_properties_for_update(
            &self.object_type,
            &properties,
            &Updatability::for_update(self.is_checked_out()),
        )
    }

    // ---------------------------------------------------------------
    // Reset
    // ---------------------------------------------------------------

    /// Throw away staged edits and start again from the backing object.
    pub fn reset(&mut self) -> ClientResult<()> {
        self.ensure_live()?;
        self.snapshot();
        Ok(())
    }

    /// Refresh the backing object from the repository, then reset.
    pub fn refresh_and_reset(&mut self) -> ClientResult<()> {
        self.ensure_live()?;
        self.object.refresh()?;
        self.snapshot();
        Ok(())
    }

    fn snapshot(&mut self) {
        self.object_type = self.object.object_type();
        self.properties = self.object.properties();
        self.discard_staged();
    }

    fn discard_staged(&mut self) {
        self.dirty.clear();
        self.modified = false;
        self.delete_all_versions = None;
        self.delete_tree = None;
        self.content = None;
        self.add_aces.clear();
        self.remove_aces.clear();
        self.add_policies.clear();
        self.remove_policies.clear();
    }
}
