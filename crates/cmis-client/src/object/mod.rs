//! Persistent objects.
//!
//! A [`CmisObject`] is the client-side snapshot of one repository object:
//! its type, converted properties and whatever else the operation context
//! asked for. Snapshots are shared (`Arc`) between the cache and callers.
//! Reads take a shared lock, [`CmisObject::refresh`] takes the exclusive
//! lock while it re-fetches.
//!
//! Base-type views ([`Document`], [`Folder`], [`Relationship`], [`Policy`],
//! [`Item`]) dereference to the common object and add their own
//! operations. [`Entity`] holds any one of them.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use chrono::{DateTime, FixedOffset, Utc};
use cmis_types::{
    property_ids as ids, Ace, Acl, AclPropagation, Action, AllowableActions, BaseTypeId,
    ExtensionElement, ExtensionLevel, ObjectId, ObjectRecord, OperationContext, Property,
    PropertyData, PropertyMap, PropertyValue, Rendition, TypeDefinition, Updatability,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::session::{Session, SessionInner};
use crate::transient::TransientObject;

/// Boilerplate shared by the base-type views.
macro_rules! object_view {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        pub struct $name(pub(crate) std::sync::Arc<crate::object::CmisObject>);

        impl $name {
            pub fn object(&self) -> &std::sync::Arc<crate::object::CmisObject> {
                &self.0
            }

            /// Start a staged edit of this object.
            pub fn transient(
                &self,
            ) -> crate::error::ClientResult<crate::transient::TransientObject> {
                self.0.transient()
            }
        }

        impl std::ops::Deref for $name {
            type Target = crate::object::CmisObject;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$name> for crate::object::Entity {
            fn from(view: $name) -> Self {
                crate::object::Entity::$name(view)
            }
        }
    };
}

mod document;
mod folder;
mod item;
mod policy;
mod relationship;

pub use document::Document;
pub use folder::Folder;
pub use item::Item;
pub use policy::Policy;
pub use relationship::Relationship;

/// Mutable part of an object snapshot, replaced wholesale on refresh.
#[derive(Debug)]
pub(crate) struct ObjectState {
    object_type: Arc<TypeDefinition>,
    properties: PropertyMap,
    allowable_actions: Option<AllowableActions>,
    acl: Option<Acl>,
    policy_ids: Vec<ObjectId>,
    relationships: Vec<Relationship>,
    renditions: Vec<Rendition>,
    extensions: BTreeMap<ExtensionLevel, Vec<ExtensionElement>>,
    refreshed_at: i64,
}

impl ObjectState {
    fn from_record(
        session: &Session,
        record: ObjectRecord,
        context: &OperationContext,
    ) -> ClientResult<Self> {
        let type_id = record.object_type_id().ok_or_else(|| {
            ClientError::InvalidArgument(format!("object record has no {}", ids::OBJECT_TYPE_ID))
        })?;
        let object_type = session.type_definition(type_id)?;
        object_type.validate_mandatory()?;

        let factory = session.factory();
        let properties = factory.convert_properties(&object_type, &record.properties)?;
        let relationships = record
            .relationships
            .into_iter()
            .map(|rel| factory.convert_object(session, rel, context)?.into_relationship())
            .collect::<ClientResult<Vec<_>>>()?;

        Ok(Self {
            object_type,
            properties,
            allowable_actions: record.allowable_actions,
            acl: record.acl,
            policy_ids: record
                .policy_ids
                .unwrap_or_default()
                .into_iter()
                .map(ObjectId::from)
                .collect(),
            relationships,
            renditions: record.renditions,
            extensions: record.extensions,
            refreshed_at: Utc::now().timestamp_millis(),
        })
    }
}

/// Snapshot of one repository object, bound to the session that loaded it.
pub struct CmisObject {
    session: Weak<SessionInner>,
    id: ObjectId,
    base_type: BaseTypeId,
    creation_context: OperationContext,
    state: RwLock<ObjectState>,
}

impl fmt::Debug for CmisObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmisObject")
            .field("id", &self.id)
            .field("base_type", &self.base_type)
            .finish_non_exhaustive()
    }
}

impl CmisObject {
    fn from_record(
        session: &Session,
        record: ObjectRecord,
        context: &OperationContext,
    ) -> ClientResult<Arc<Self>> {
        let id = record.id().map(ObjectId::from).ok_or_else(|| {
            ClientError::InvalidArgument(format!("object record has no {}", ids::OBJECT_ID))
        })?;
        let base_type = record.base_type_id().ok_or_else(|| {
            ClientError::InvalidArgument(format!("object {id} has no known base type"))
        })?;
        let state = ObjectState::from_record(session, record, context)?;
        Ok(Arc::new(Self {
            session: session.downgrade(),
            id,
            base_type,
            creation_context: context.clone(),
            state: RwLock::new(state),
        }))
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn base_type_id(&self) -> BaseTypeId {
        self.base_type
    }

    pub fn object_type(&self) -> Arc<TypeDefinition> {
        Arc::clone(&self.state.read().object_type)
    }

    /// The context this object was fetched with; refreshes reuse it.
    pub fn creation_context(&self) -> &OperationContext {
        &self.creation_context
    }

    /// The owning session, as long as it is alive.
    pub fn session(&self) -> ClientResult<Session> {
        self.session
            .upgrade()
            .map(Session::from_inner)
            .ok_or_else(|| ClientError::IllegalState("the session has been closed".to_string()))
    }

    // ---------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------

    pub fn property(&self, id: &str) -> Option<Property> {
        self.state.read().properties.get(id).cloned()
    }

    /// First value of a property.
    pub fn property_value(&self, id: &str) -> Option<PropertyValue> {
        self.state
            .read()
            .properties
            .get(id)
            .and_then(Property::first_value)
            .cloned()
    }

    pub fn properties(&self) -> PropertyMap {
        self.state.read().properties.clone()
    }

    pub(crate) fn text(&self, id: &str) -> Option<String> {
        self.state
            .read()
            .properties
            .get(id)
            .and_then(Property::value_as_str)
            .map(str::to_string)
    }

    pub(crate) fn flag(&self, id: &str) -> Option<bool> {
        self.property_value(id).and_then(|v| v.as_bool())
    }

    fn datetime(&self, id: &str) -> Option<DateTime<FixedOffset>> {
        self.property_value(id).and_then(|v| v.as_datetime().copied())
    }

    pub fn name(&self) -> Option<String> {
        self.text(ids::NAME)
    }

    pub fn description(&self) -> Option<String> {
        self.text(ids::DESCRIPTION)
    }

    pub fn created_by(&self) -> Option<String> {
        self.text(ids::CREATED_BY)
    }

    pub fn creation_date(&self) -> Option<DateTime<FixedOffset>> {
        self.datetime(ids::CREATION_DATE)
    }

    pub fn last_modified_by(&self) -> Option<String> {
        self.text(ids::LAST_MODIFIED_BY)
    }

    pub fn last_modification_date(&self) -> Option<DateTime<FixedOffset>> {
        self.datetime(ids::LAST_MODIFICATION_DATE)
    }

    pub fn change_token(&self) -> Option<String> {
        self.text(ids::CHANGE_TOKEN)
    }

    pub fn allowable_actions(&self) -> Option<AllowableActions> {
        self.state.read().allowable_actions.clone()
    }

    /// `false` when the action is not allowed or actions were not fetched.
    pub fn can(&self, action: Action) -> bool {
        self.state
            .read()
            .allowable_actions
            .as_ref()
            .is_some_and(|actions| actions.contains(action))
    }

    /// The ACL delivered with the object, if the context asked for it.
    pub fn included_acl(&self) -> Option<Acl> {
        self.state.read().acl.clone()
    }

    pub fn policy_ids(&self) -> Vec<ObjectId> {
        self.state.read().policy_ids.clone()
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        self.state.read().relationships.clone()
    }

    pub fn renditions(&self) -> Vec<Rendition> {
        self.state.read().renditions.clone()
    }

    pub fn extensions(&self, level: ExtensionLevel) -> Vec<ExtensionElement> {
        self.state
            .read()
            .extensions
            .get(&level)
            .cloned()
            .unwrap_or_default()
    }

    /// When the snapshot was last loaded, in milliseconds since the epoch.
    pub fn refresh_timestamp(&self) -> i64 {
        self.state.read().refreshed_at
    }

    /// Staged-edit wrapper over this object.
    pub fn transient(self: &Arc<Self>) -> ClientResult<TransientObject> {
        TransientObject::new(Entity::from_object(Arc::clone(self)))
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Re-fetch the object with its creation context and replace the
    /// snapshot. Readers wait until the new state is in place.
    pub fn refresh(&self) -> ClientResult<()> {
        let session = self.session()?;
        let mut state = self.state.write();
        let record = session
            .service()
            .get_object(self.id.as_str(), &self.creation_context)?;
        *state = ObjectState::from_record(&session, record, &self.creation_context)?;
        debug!(object_id = %self.id, "object refreshed");
        Ok(())
    }

    /// Refresh if the snapshot is older than `max_age_millis`. Returns
    /// whether a refresh happened.
    pub fn refresh_if_old(&self, max_age_millis: i64) -> ClientResult<bool> {
        let age = Utc::now().timestamp_millis() - self.refresh_timestamp();
        if age <= max_age_millis {
            return Ok(false);
        }
        self.refresh()?;
        Ok(true)
    }

    /// Send property changes using this snapshot's change token.
    ///
    /// The properties are checked locally first. The object is evicted
    /// from the session cache; with `refresh` this snapshot is reloaded.
    /// Returns the id the repository reports, which differs from this
    /// object's id when the update created a new version.
    pub fn update_properties(
        &self,
        properties: Vec<PropertyData>,
        refresh: bool,
    ) -> ClientResult<ObjectId> {
        let session = self.session()?;
        let updated = {
            let state = self.state.read();
            let checked_out = state
                .properties
                .get(ids::IS_VERSION_SERIES_CHECKED_OUT)
                .and_then(Property::first_value)
                .and_then(PropertyValue::as_bool)
                .unwrap_or(false);
            let properties = session.factory().convert_properties_for_update(
                &state.object_type,
                &properties,
                &Updatability::for_update(checked_out),
            )?;
            let token = state
                .properties
                .get(ids::CHANGE_TOKEN)
                .and_then(Property::value_as_str);
            session
                .service()
                .update_properties(self.id.as_str(), token, properties)?
        };
        session.remove_object_from_cache(&self.id);
        info!(object_id = %self.id, new_id = %updated.id, "properties updated");
        if refresh {
            self.refresh()?;
        }
        Ok(ObjectId::from(updated.id))
    }

    pub fn rename(&self, new_name: &str, refresh: bool) -> ClientResult<ObjectId> {
        if new_name.is_empty() {
            return Err(ClientError::InvalidArgument(
                "new name must not be empty".to_string(),
            ));
        }
        self.update_properties(vec![PropertyData::single(ids::NAME, new_name)], refresh)
    }

    /// Delete the object and evict it from the session cache.
    pub fn delete(&self, all_versions: bool) -> ClientResult<()> {
        let session = self.session()?;
        {
            let _state = self.state.read();
            session
                .service()
                .delete_object(self.id.as_str(), all_versions)?;
        }
        session.remove_object_from_cache(&self.id);
        info!(object_id = %self.id, all_versions, "object deleted");
        Ok(())
    }

    // ---------------------------------------------------------------
    // ACL and policies
    // ---------------------------------------------------------------

    pub fn acl(&self, only_basic_permissions: bool) -> ClientResult<Acl> {
        let session = self.session()?;
        Ok(session
            .service()
            .get_acl(self.id.as_str(), only_basic_permissions)?)
    }

    /// Add and remove entries in one call. Returns the resulting ACL.
    pub fn apply_acl(
        &self,
        add: &[Ace],
        remove: &[Ace],
        propagation: Option<AclPropagation>,
    ) -> ClientResult<Acl> {
        let session = self.session()?;
        let acl = session
            .service()
            .apply_acl(self.id.as_str(), add, remove, propagation)?;
        session.remove_object_from_cache(&self.id);
        debug!(object_id = %self.id, added = add.len(), removed = remove.len(), "acl applied");
        Ok(acl)
    }

    pub fn add_acl(&self, aces: &[Ace], propagation: Option<AclPropagation>) -> ClientResult<Acl> {
        self.apply_acl(aces, &[], propagation)
    }

    pub fn remove_acl(
        &self,
        aces: &[Ace],
        propagation: Option<AclPropagation>,
    ) -> ClientResult<Acl> {
        self.apply_acl(&[], aces, propagation)
    }

    /// Replace the object's direct entries. Needs a repository that
    /// advertises extended ACL support.
    pub fn set_acl(&self, aces: &[Ace]) -> ClientResult<Acl> {
        let session = self.session()?;
        if !session.repository_info().capabilities.extended_acl {
            return Err(ClientError::NotSupported(
                "repository does not support replacing an ACL".to_string(),
            ));
        }
        let acl = session.service().set_acl(self.id.as_str(), aces)?;
        session.remove_object_from_cache(&self.id);
        Ok(acl)
    }

    /// Apply each policy with its own repository call.
    pub fn apply_policies(&self, policy_ids: &[ObjectId]) -> ClientResult<()> {
        let session = self.session()?;
        for policy in policy_ids {
            session
                .service()
                .apply_policy(policy.as_str(), self.id.as_str())?;
        }
        session.remove_object_from_cache(&self.id);
        Ok(())
    }

    pub fn remove_policies(&self, policy_ids: &[ObjectId]) -> ClientResult<()> {
        let session = self.session()?;
        for policy in policy_ids {
            session
                .service()
                .remove_policy(policy.as_str(), self.id.as_str())?;
        }
        session.remove_object_from_cache(&self.id);
        Ok(())
    }
}

/// Any persistent object, typed by its base type.
#[derive(Clone, Debug)]
pub enum Entity {
    Document(Document),
    Folder(Folder),
    Relationship(Relationship),
    Policy(Policy),
    Item(Item),
}

impl Entity {
    pub(crate) fn from_record(
        session: &Session,
        record: ObjectRecord,
        context: &OperationContext,
    ) -> ClientResult<Self> {
        Ok(Self::from_object(CmisObject::from_record(
            session, record, context,
        )?))
    }

    fn from_object(object: Arc<CmisObject>) -> Self {
        match object.base_type {
            BaseTypeId::Document => Entity::Document(Document(object)),
            BaseTypeId::Folder => Entity::Folder(Folder(object)),
            BaseTypeId::Relationship => Entity::Relationship(Relationship(object)),
            BaseTypeId::Policy => Entity::Policy(Policy(object)),
            BaseTypeId::Item => Entity::Item(Item(object)),
        }
    }

    pub fn object(&self) -> &Arc<CmisObject> {
        match self {
            Entity::Document(view) => view.object(),
            Entity::Folder(view) => view.object(),
            Entity::Relationship(view) => view.object(),
            Entity::Policy(view) => view.object(),
            Entity::Item(view) => view.object(),
        }
    }

    pub fn transient(&self) -> ClientResult<TransientObject> {
        TransientObject::new(self.clone())
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Entity::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            Entity::Folder(folder) => Some(folder),
            _ => None,
        }
    }

    pub fn into_document(self) -> ClientResult<Document> {
        match self {
            Entity::Document(doc) => Ok(doc),
            other => Err(other.wrong_base(BaseTypeId::Document)),
        }
    }

    pub fn into_folder(self) -> ClientResult<Folder> {
        match self {
            Entity::Folder(folder) => Ok(folder),
            other => Err(other.wrong_base(BaseTypeId::Folder)),
        }
    }

    pub fn into_relationship(self) -> ClientResult<Relationship> {
        match self {
            Entity::Relationship(rel) => Ok(rel),
            other => Err(other.wrong_base(BaseTypeId::Relationship)),
        }
    }

    pub fn into_policy(self) -> ClientResult<Policy> {
        match self {
            Entity::Policy(policy) => Ok(policy),
            other => Err(other.wrong_base(BaseTypeId::Policy)),
        }
    }

    pub fn into_item(self) -> ClientResult<Item> {
        match self {
            Entity::Item(item) => Ok(item),
            other => Err(other.wrong_base(BaseTypeId::Item)),
        }
    }

    fn wrong_base(&self, expected: BaseTypeId) -> ClientError {
        ClientError::InvalidArgument(format!(
            "object {} is a {}, not a {expected}",
            self.id(),
            self.base_type_id()
        ))
    }
}

impl Deref for Entity {
    type Target = CmisObject;

    fn deref(&self) -> &CmisObject {
        self.object()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cmis_binding::{BindingError, InMemoryRepository, Operation, RecordingService};
    use cmis_types::{ContentStream, PropertyData};

    use super::*;
    use crate::config::SessionConfig;

    fn connect() -> (Arc<RecordingService<InMemoryRepository>>, Session) {
        let service = Arc::new(RecordingService::new(InMemoryRepository::new()));
        let session = Session::connect(SessionConfig::default(), service.clone()).unwrap();
        (service, session)
    }

    fn new_doc(session: &Session, name: &str) -> Document {
        let root = session.root_folder().unwrap();
        let id = root
            .create_document(
                vec![
                    PropertyData::single(ids::OBJECT_TYPE_ID, "cmis:document"),
                    PropertyData::single(ids::NAME, name),
                ],
                Some(ContentStream::new("text/plain", "hello")),
                Default::default(),
            )
            .unwrap();
        session.get_object(&id).unwrap().into_document().unwrap()
    }

    #[test]
    fn snapshot_exposes_converted_properties() {
        let (_, session) = connect();
        let doc = new_doc(&session, "a.txt");
        assert_eq!(doc.name().as_deref(), Some("a.txt"));
        assert_eq!(doc.base_type_id(), BaseTypeId::Document);
        assert_eq!(doc.object_type().id, "cmis:document");
        assert!(doc.change_token().is_some());
        assert!(doc.creation_date().is_some());
        assert!(doc.can(Action::CanUpdateProperties));
        assert!(doc.refresh_timestamp() > 0);
    }

    #[test]
    fn update_sends_token_and_evicts() {
        let (service, session) = connect();
        let doc = new_doc(&session, "a.txt");
        let token = doc.change_token();

        service.clear();
        let id = doc
            .update_properties(vec![PropertyData::single(ids::DESCRIPTION, "d")], false)
            .unwrap();
        assert_eq!(&id, doc.id());
        let calls = service.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].change_token, token);

        // stale snapshot until refreshed
        assert_eq!(doc.description(), None);
        doc.refresh().unwrap();
        assert_eq!(doc.description().as_deref(), Some("d"));

        service.clear();
        session.get_object(doc.id()).unwrap();
        assert_eq!(service.count(Operation::GetObject), 1);
    }

    #[test]
    fn invalid_update_makes_no_call() {
        let (service, session) = connect();
        let doc = new_doc(&session, "a.txt");
        service.clear();

        let err = doc
            .update_properties(vec![PropertyData::single(ids::OBJECT_ID, "x")], false)
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
        assert!(doc.rename("", false).is_err());
        assert!(doc.update_properties(Vec::new(), false).is_err());
        assert_eq!(service.total(), 0);
    }

    #[test]
    fn stale_token_is_an_update_conflict() {
        let (_, session) = connect();
        let doc = new_doc(&session, "a.txt");
        let mut uncached = OperationContext::new();
        uncached.set_cache_enabled(false);
        let other = session.get_object_with_context(doc.id(), &uncached).unwrap();
        other.rename("b.txt", false).unwrap();

        let err = doc.rename("c.txt", false).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Repository(BindingError::UpdateConflict(_))
        ));
    }

    #[test]
    fn refresh_if_old_respects_age() {
        let (service, session) = connect();
        let doc = new_doc(&session, "a.txt");
        service.clear();
        assert!(!doc.refresh_if_old(60_000).unwrap());
        assert_eq!(service.total(), 0);
        assert!(doc.refresh_if_old(-1).unwrap());
        assert_eq!(service.count(Operation::GetObject), 1);
    }

    #[test]
    fn delete_evicts_and_later_reads_fail() {
        let (_, session) = connect();
        let doc = new_doc(&session, "a.txt");
        doc.delete(true).unwrap();
        assert!(session.get_object(doc.id()).unwrap_err().is_not_found());
    }

    #[test]
    fn acl_round_trip() {
        let (_, session) = connect();
        let doc = new_doc(&session, "a.txt");
        let ace = Ace::new("bob", ["cmis:read"]);
        let acl = doc.add_acl(&[ace.clone()], None).unwrap();
        assert_eq!(acl.permissions_for("bob"), vec!["cmis:read"]);
        let acl = doc.remove_acl(&[ace], None).unwrap();
        assert!(acl.permissions_for("bob").is_empty());
        assert_eq!(doc.acl(false).unwrap(), acl);
    }

    #[test]
    fn set_acl_needs_extended_acl() {
        let (service, session) = connect();
        let doc = new_doc(&session, "a.txt");
        service.clear();
        let err = doc.set_acl(&[Ace::new("bob", ["cmis:all"])]).unwrap_err();
        assert!(matches!(err, ClientError::NotSupported(_)));
        assert_eq!(service.count(Operation::SetAcl), 0);
    }

    #[test]
    fn dropped_session_is_an_illegal_state() {
        let (_, session) = connect();
        let doc = new_doc(&session, "a.txt");
        drop(session);
        assert!(matches!(doc.refresh(), Err(ClientError::IllegalState(_))));
        assert_eq!(doc.name().as_deref(), Some("a.txt"));
    }

    #[test]
    fn entity_conversions_check_the_base_type() {
        let (_, session) = connect();
        let root = session
            .get_object(&session.repository_info().root_folder_id)
            .unwrap();
        assert!(root.as_folder().is_some());
        assert!(root.as_document().is_none());
        assert!(root.clone().into_document().is_err());
        assert!(root.into_folder().is_ok());
    }
}
