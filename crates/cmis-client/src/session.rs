//! The session: entry point for everything a caller does with a repository.

use std::sync::{Arc, Weak};

use cmis_binding::{CreateObject, RelationshipDirection, RepositoryService, VersioningState};
use cmis_cache::{CacheStats, ObjectCache};
use cmis_paging::{ChangeLogIterable, ChangePage, ItemIterable, Page, PageFetcher};
use cmis_types::{
    property_ids as ids, BaseTypeId, CmisVersion, ContentStream, ObjectId, OperationContext,
    PropertyData, PropertyValue, RepositoryInfo, TypeDefinition, Updatability,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{ClientError, ClientResult};
use crate::factory::{DefaultObjectFactory, ObjectFactory};
use crate::object::{Document, Entity, Folder, Relationship};
use crate::results::{ChangeEvent, QueryResult};
use crate::transient::TransientObject;
use crate::types::TypeCache;

pub(crate) struct SessionInner {
    service: Arc<dyn RepositoryService>,
    factory: Arc<dyn ObjectFactory>,
    types: TypeCache,
    state: RwLock<SessionState>,
}

struct SessionState {
    cache: Arc<ObjectCache<Entity>>,
    default_context: OperationContext,
    repository_info: RepositoryInfo,
}

/// A connection to one repository.
///
/// Cheap to clone; clones share the cache and default context. Objects keep
/// only a weak reference back, so dropping the last `Session` handle ends
/// the session even while objects are still around.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Session")
            .field("repository_id", &state.repository_info.id)
            .field("cached_entities", &state.cache.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect with the default object factory.
    pub fn connect(
        config: SessionConfig,
        service: Arc<dyn RepositoryService>,
    ) -> ClientResult<Self> {
        Self::connect_with_factory(config, service, Arc::new(DefaultObjectFactory))
    }

    pub fn connect_with_factory(
        config: SessionConfig,
        service: Arc<dyn RepositoryService>,
        factory: Arc<dyn ObjectFactory>,
    ) -> ClientResult<Self> {
        let default_context = config.context.to_context()?;
        let cache = ObjectCache::new(config.cache.clone())?;
        let repository_info = service.repository_info()?;
        info!(
            repository_id = %repository_info.id,
            cmis_version = ?repository_info.cmis_version,
            object_capacity = config.cache.object_capacity,
            "session connected"
        );
        Ok(Self {
            inner: Arc::new(SessionInner {
                service,
                factory,
                types: TypeCache::new(config.cache_type_definitions),
                state: RwLock::new(SessionState {
                    cache: Arc::new(cache),
                    default_context,
                    repository_info,
                }),
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn service(&self) -> &Arc<dyn RepositoryService> {
        &self.inner.service
    }

    pub fn factory(&self) -> &Arc<dyn ObjectFactory> {
        &self.inner.factory
    }

    pub fn repository_info(&self) -> RepositoryInfo {
        self.inner.state.read().repository_info.clone()
    }

    pub fn default_context(&self) -> OperationContext {
        self.inner.state.read().default_context.clone()
    }

    pub fn set_default_context(&self, context: OperationContext) {
        self.inner.state.write().default_context = context;
    }

    fn cache(&self) -> Arc<ObjectCache<Entity>> {
        Arc::clone(&self.inner.state.read().cache)
    }

    // ---------------------------------------------------------------
    // Cache
    // ---------------------------------------------------------------

    /// Drop every cached object and type, and ask the binding to drop its
    /// own caches. Transient objects keep their snapshots.
    pub fn clear(&self) {
        let state = self.inner.state.write();
        state.cache.clear();
        self.inner.types.clear();
        self.inner.service.clear_caches();
        debug!("session caches cleared");
    }

    /// Evict one object under every cache key and path.
    pub fn remove_object_from_cache(&self, object_id: impl AsRef<str>) {
        let object_id = object_id.as_ref();
        self.cache().remove(object_id);
        debug!(object_id, "object evicted from cache");
    }

    pub(crate) fn clear_object_cache(&self) {
        self.cache().clear();
        debug!("object cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    // ---------------------------------------------------------------
    // Object access
    // ---------------------------------------------------------------

    pub fn get_object(&self, object_id: impl AsRef<str>) -> ClientResult<Entity> {
        let context = self.default_context();
        self.get_object_with_context(object_id, &context)
    }

    /// Fetch by id, consulting the cache first when `context` allows it.
    pub fn get_object_with_context(
        &self,
        object_id: impl AsRef<str>,
        context: &OperationContext,
    ) -> ClientResult<Entity> {
        let object_id = object_id.as_ref();
        if object_id.is_empty() {
            return Err(ClientError::InvalidArgument(
                "object id must not be empty".to_string(),
            ));
        }
        let cache = self.cache();
        if let Some(key) = context.cache_key() {
            if let Some(hit) = cache.get(object_id, key) {
                debug!(object_id, "object cache hit");
                return Ok(hit);
            }
            debug!(object_id, "object cache miss");
        }

        let record = self.inner.service.get_object(object_id, context)?;
        let entity = self.inner.factory.convert_object(self, record, context)?;
        if let Some(key) = context.cache_key() {
            cache.put(entity.id().as_str(), key, entity.clone());
        }
        Ok(entity)
    }

    pub fn get_object_by_path(&self, path: &str) -> ClientResult<Entity> {
        let context = self.default_context();
        self.get_object_by_path_with_context(path, &context)
    }

    /// Fetch by path. The path index is consulted on its own; a cached id
    /// entry never answers a path lookup.
    pub fn get_object_by_path_with_context(
        &self,
        path: &str,
        context: &OperationContext,
    ) -> ClientResult<Entity> {
        if path.is_empty() {
            return Err(ClientError::InvalidArgument(
                "path must not be empty".to_string(),
            ));
        }
        let cache = self.cache();
        if let Some(key) = context.cache_key() {
            if let Some(hit) = cache.get_by_path(path, key) {
                debug!(path, "path cache hit");
                return Ok(hit);
            }
            debug!(path, "path cache miss");
        }

        let record = self.inner.service.get_object_by_path(path, context)?;
        let entity = self.inner.factory.convert_object(self, record, context)?;
        if let Some(key) = context.cache_key() {
            cache.put_path(path, entity.id().as_str(), key, entity.clone());
        }
        Ok(entity)
    }

    pub fn root_folder(&self) -> ClientResult<Folder> {
        let root = self.repository_info().root_folder_id;
        self.get_object(root)?.into_folder()
    }

    /// A staged-edit wrapper around `entity`.
    pub fn transient(&self, entity: &Entity) -> ClientResult<TransientObject> {
        TransientObject::new(entity.clone())
    }

    // ---------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------

    pub fn type_definition(&self, type_id: &str) -> ClientResult<Arc<TypeDefinition>> {
        self.inner.types.get_or_fetch(type_id, || {
            Ok(self.inner.service.type_definition(type_id)?)
        })
    }

    fn ensure_type_mutation(&self) -> ClientResult<()> {
        if self.repository_info().cmis_version == CmisVersion::V1_0 {
            return Err(ClientError::NotSupported(
                "type mutation needs a CMIS 1.1 repository".to_string(),
            ));
        }
        Ok(())
    }

    pub fn create_type(&self, definition: &TypeDefinition) -> ClientResult<Arc<TypeDefinition>> {
        self.ensure_type_mutation()?;
        let created = self.inner.service.create_type(definition)?;
        info!(type_id = %created.id, "type created");
        Ok(self.inner.types.put(created))
    }

    pub fn update_type(&self, definition: &TypeDefinition) -> ClientResult<Arc<TypeDefinition>> {
        self.ensure_type_mutation()?;
        let updated = self.inner.service.update_type(definition)?;
        self.inner.types.invalidate(&definition.id);
        Ok(self.inner.types.put(updated))
    }

    pub fn delete_type(&self, type_id: &str) -> ClientResult<()> {
        self.ensure_type_mutation()?;
        self.inner.service.delete_type(type_id)?;
        self.inner.types.invalidate(type_id);
        info!(type_id, "type deleted");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Creation
    // ---------------------------------------------------------------

    pub fn create_document(
        &self,
        properties: Vec<PropertyData>,
        folder_id: Option<&ObjectId>,
        content: Option<ContentStream>,
        versioning_state: VersioningState,
    ) -> ClientResult<ObjectId> {
        self.create_object(
            BaseTypeId::Document,
            properties,
            folder_id,
            content,
            versioning_state,
        )
    }

    pub fn create_folder(
        &self,
        properties: Vec<PropertyData>,
        parent_id: &ObjectId,
    ) -> ClientResult<ObjectId> {
        self.create_object(
            BaseTypeId::Folder,
            properties,
            Some(parent_id),
            None,
            VersioningState::None,
        )
    }

    /// Properties must carry the source and target ids.
    pub fn create_relationship(&self, properties: Vec<PropertyData>) -> ClientResult<ObjectId> {
        self.create_object(
            BaseTypeId::Relationship,
            properties,
            None,
            None,
            VersioningState::None,
        )
    }

    pub fn create_policy(
        &self,
        properties: Vec<PropertyData>,
        folder_id: Option<&ObjectId>,
    ) -> ClientResult<ObjectId> {
        self.create_object(
            BaseTypeId::Policy,
            properties,
            folder_id,
            None,
            VersioningState::None,
        )
    }

    pub fn create_item(
        &self,
        properties: Vec<PropertyData>,
        folder_id: Option<&ObjectId>,
    ) -> ClientResult<ObjectId> {
        self.create_object(
            BaseTypeId::Item,
            properties,
            folder_id,
            None,
            VersioningState::None,
        )
    }

    fn create_object(
        &self,
        base: BaseTypeId,
        properties: Vec<PropertyData>,
        folder_id: Option<&ObjectId>,
        content: Option<ContentStream>,
        versioning_state: VersioningState,
    ) -> ClientResult<ObjectId> {
        let type_id = properties
            .iter()
            .find(|p| p.id == ids::OBJECT_TYPE_ID)
            .and_then(PropertyData::first)
            .and_then(PropertyValue::as_str)
            .ok_or_else(|| {
                ClientError::InvalidArgument(format!("{} is required", ids::OBJECT_TYPE_ID))
            })?;
        let object_type = self.type_definition(type_id)?;
        if object_type.base_type != base {
            return Err(ClientError::InvalidArgument(format!(
                "type {type_id} is not a {base} type"
            )));
        }
        let properties = self.inner.factory.convert_properties_for_update(
            &object_type,
            &properties,
            &Updatability::for_create(),
        )?;

        let id = self.inner.service.create_object(CreateObject {
            properties,
            folder_id: folder_id.map(|f| f.as_str().to_string()),
            content,
            versioning_state,
            ..Default::default()
        })?;
        debug!(object_id = %id, base = %base, "object created");
        Ok(ObjectId::from(id))
    }

    // ---------------------------------------------------------------
    // Listings
    // ---------------------------------------------------------------

    pub(crate) fn children(
        &self,
        folder_id: ObjectId,
        context: &OperationContext,
    ) -> ItemIterable<Entity, ClientError> {
        let session = self.clone();
        let context = context.clone();
        ItemIterable::new(PageFetcher::new(
            context.max_items_per_page(),
            move |skip, max| {
                let page =
                    session
                        .inner
                        .service
                        .get_children(folder_id.as_str(), &context, skip, max)?;
                session.convert_page(page, &context, Ok)
            },
        ))
    }

    pub(crate) fn checked_out_iterable(
        &self,
        folder_id: Option<ObjectId>,
        context: &OperationContext,
    ) -> ItemIterable<Document, ClientError> {
        let session = self.clone();
        let context = context.clone();
        ItemIterable::new(PageFetcher::new(
            context.max_items_per_page(),
            move |skip, max| {
                let page = session.inner.service.get_checked_out_docs(
                    folder_id.as_ref().map(ObjectId::as_str),
                    &context,
                    skip,
                    max,
                )?;
                session.convert_page(page, &context, Entity::into_document)
            },
        ))
    }

    fn convert_page<T>(
        &self,
        page: Page<cmis_types::ObjectRecord>,
        context: &OperationContext,
        view: impl Fn(Entity) -> ClientResult<T>,
    ) -> ClientResult<Page<T>> {
        let items = page
            .items
            .into_iter()
            .map(|record| view(self.inner.factory.convert_object(self, record, context)?))
            .collect::<ClientResult<Vec<_>>>()?;
        Ok(Page::new(items, page.total_num_items, page.has_more_items))
    }

    /// Private working copies anywhere in the repository.
    pub fn checked_out_docs(
        &self,
        context: &OperationContext,
    ) -> ItemIterable<Document, ClientError> {
        self.checked_out_iterable(None, context)
    }

    pub fn query(
        &self,
        statement: impl Into<String>,
        search_all_versions: bool,
        context: &OperationContext,
    ) -> ItemIterable<QueryResult, ClientError> {
        let session = self.clone();
        let statement = statement.into();
        let context = context.clone();
        ItemIterable::new(PageFetcher::new(
            context.max_items_per_page(),
            move |skip, max| {
                let page = session.inner.service.query(
                    &statement,
                    search_all_versions,
                    &context,
                    skip,
                    max,
                )?;
                Ok(page.map(QueryResult::new))
            },
        ))
    }

    /// Relationships of `object_id`, optionally restricted to one type.
    pub fn relationships(
        &self,
        object_id: &ObjectId,
        direction: RelationshipDirection,
        type_id: Option<&str>,
        context: &OperationContext,
    ) -> ItemIterable<Relationship, ClientError> {
        let session = self.clone();
        let object_id = object_id.clone();
        let type_id = type_id.map(str::to_string);
        let context = context.clone();
        ItemIterable::new(PageFetcher::new(
            context.max_items_per_page(),
            move |skip, max| {
                let page = session.inner.service.get_object_relationships(
                    object_id.as_str(),
                    direction,
                    type_id.as_deref(),
                    &context,
                    skip,
                    max,
                )?;
                session.convert_page(page, &context, Entity::into_relationship)
            },
        ))
    }

    /// The change log from `change_log_token` (the beginning when `None`).
    pub fn content_changes(
        &self,
        change_log_token: Option<String>,
        include_properties: bool,
        max_items_per_page: u64,
    ) -> ClientResult<ChangeLogIterable<ChangeEvent, ClientError>> {
        if !self.repository_info().capabilities.changes {
            return Err(ClientError::NotSupported(
                "repository keeps no change log".to_string(),
            ));
        }
        let session = self.clone();
        Ok(ChangeLogIterable::new(
            change_log_token,
            max_items_per_page,
            move |cursor, max| {
                let page =
                    session
                        .inner
                        .service
                        .get_content_changes(cursor, include_properties, max)?;
                let items = page
                    .items
                    .into_iter()
                    .map(ChangeEvent::from_record)
                    .collect::<ClientResult<Vec<_>>>()?;
                Ok(ChangePage {
                    items,
                    total_num_items: page.total_num_items,
                    has_more_items: page.has_more_items,
                    latest_token: page.latest_token,
                    next_link: page.next_link,
                })
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use cmis_binding::{InMemoryConfig, InMemoryRepository, Operation, RecordingService};
    use cmis_types::{Cardinality, ChangeType, IncludeRelationships, PropertyDefinition, PropertyType};

    use super::*;

    fn connect_with(
        config: SessionConfig,
        repository: InMemoryRepository,
    ) -> (Arc<RecordingService<InMemoryRepository>>, Session) {
        let service = Arc::new(RecordingService::new(repository));
        let session = Session::connect(config, service.clone()).unwrap();
        (service, session)
    }

    fn connect() -> (Arc<RecordingService<InMemoryRepository>>, Session) {
        connect_with(SessionConfig::default(), InMemoryRepository::new())
    }

    fn props(type_id: &str, name: &str) -> Vec<PropertyData> {
        vec![
            PropertyData::single(ids::OBJECT_TYPE_ID, type_id),
            PropertyData::single(ids::NAME, name),
        ]
    }

    fn root_id(session: &Session) -> ObjectId {
        ObjectId::from(session.repository_info().root_folder_id)
    }

    #[test]
    fn connect_reads_repository_info() {
        let (service, session) = connect();
        assert_eq!(session.repository_info().id, "memory");
        assert_eq!(service.count(Operation::RepositoryInfo), 1);
        assert_eq!(session.default_context(), OperationContext::new());
    }

    #[test]
    fn zero_capacity_config_is_rejected() {
        let mut config = SessionConfig::default();
        config.cache.object_capacity = 0;
        let service: Arc<dyn RepositoryService> = Arc::new(InMemoryRepository::new());
        assert!(matches!(
            Session::connect(config, service),
            Err(ClientError::InvalidArgument(_))
        ));
    }

    #[test]
    fn cached_object_is_returned_without_a_fetch() {
        let (service, session) = connect();
        let id = session
            .create_document(
                props("cmis:document", "a"),
                Some(&root_id(&session)),
                None,
                VersioningState::Major,
            )
            .unwrap();

        service.clear();
        let first = session.get_object(&id).unwrap();
        let second = session.get_object(&id).unwrap();
        assert!(Arc::ptr_eq(first.object(), second.object()));
        assert_eq!(service.count(Operation::GetObject), 1);

        // same shape, different paging: same cache key
        let mut paged = session.default_context();
        paged.set_max_items_per_page(7).unwrap();
        paged.set_order_by(Some("cmis:name".to_string()));
        session.get_object_with_context(&id, &paged).unwrap();
        assert_eq!(service.count(Operation::GetObject), 1);

        first.rename("b", false).unwrap();
        session.get_object(&id).unwrap();
        assert_eq!(service.count(Operation::GetObject), 2);
    }

    #[test]
    fn disabled_cache_always_fetches() {
        let (service, session) = connect();
        let mut context = session.default_context();
        context.set_cache_enabled(false);
        let root = root_id(&session);

        service.clear();
        session.get_object_with_context(&root, &context).unwrap();
        session.get_object_with_context(&root, &context).unwrap();
        assert_eq!(service.count(Operation::GetObject), 2);
        assert_eq!(session.cache_stats().objects, 0);
    }

    #[test]
    fn path_and_id_lookups_use_separate_indices() {
        let (service, session) = connect();
        session
            .create_folder(props("cmis:folder", "docs"), &root_id(&session))
            .unwrap();

        service.clear();
        let by_path = session.get_object_by_path("/docs").unwrap();
        session.get_object_by_path("/docs").unwrap();
        assert_eq!(service.count(Operation::GetObjectByPath), 1);

        // the path fetch also filled the id index
        session.get_object(by_path.id()).unwrap();
        assert_eq!(service.count(Operation::GetObject), 0);

        session.remove_object_from_cache(by_path.id());
        session.get_object_by_path("/docs").unwrap();
        assert_eq!(service.count(Operation::GetObjectByPath), 2);
    }

    #[test]
    fn empty_inputs_fail_locally() {
        let (service, session) = connect();
        service.clear();
        assert!(matches!(
            session.get_object(""),
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(session.get_object_by_path("").is_err());
        assert_eq!(service.total(), 0);
    }

    #[test]
    fn clear_drops_objects_and_types() {
        let (service, session) = connect();
        session.root_folder().unwrap();
        assert!(session.cache_stats().objects > 0);

        session.clear();
        assert_eq!(session.cache_stats().objects, 0);
        assert_eq!(service.count(Operation::ClearCaches), 1);

        service.clear();
        session.root_folder().unwrap();
        assert_eq!(service.count(Operation::TypeDefinition), 1);
    }

    #[test]
    fn creation_checks_base_type_and_updatability() {
        let (service, session) = connect();
        let root = root_id(&session);
        service.clear();

        let err = session
            .create_folder(props("cmis:document", "x"), &root)
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));

        let mut bad = props("cmis:document", "x");
        bad.push(PropertyData::single(ids::CHANGE_TOKEN, "1"));
        assert!(session
            .create_document(bad, Some(&root), None, VersioningState::Major)
            .is_err());
        assert!(session
            .create_item(vec![PropertyData::single(ids::NAME, "x")], Some(&root))
            .is_err());
        assert_eq!(service.count(Operation::CreateObject), 0);
    }

    #[test]
    fn policies_items_and_relationships() {
        let (_, session) = connect();
        let root = root_id(&session);
        let mut policy_props = props("cmis:policy", "retention");
        policy_props.push(PropertyData::single(ids::POLICY_TEXT, "keep 7y"));
        let policy_id = session.create_policy(policy_props, Some(&root)).unwrap();
        let policy = session.get_object(&policy_id).unwrap().into_policy().unwrap();
        assert_eq!(policy.policy_text().as_deref(), Some("keep 7y"));

        let item_id = session
            .create_item(props("cmis:item", "card"), Some(&root))
            .unwrap();
        let item = session.get_object(&item_id).unwrap().into_item().unwrap();
        assert_eq!(item.base_type_id(), BaseTypeId::Item);

        let mut rel_props = props("cmis:relationship", "applies");
        rel_props.push(PropertyData::single(ids::SOURCE_ID, item_id.as_str()));
        rel_props.push(PropertyData::single(ids::TARGET_ID, policy_id.as_str()));
        let rel_id = session.create_relationship(rel_props).unwrap();

        let context = session.default_context();
        let rels: Vec<_> = session
            .relationships(&item_id, RelationshipDirection::Source, None, &context)
            .iter()
            .collect::<ClientResult<_>>()
            .unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].id(), &rel_id);
        assert_eq!(rels[0].target().unwrap().id(), &policy_id);
        assert_eq!(rels[0].source_id().as_ref(), Some(&item_id));

        item.apply_policies(&[policy_id.clone()]).unwrap();
        let mut context = session.default_context();
        context.set_include_policies(true);
        context.set_include_relationships(IncludeRelationships::Source);
        let item = session.get_object_with_context(&item_id, &context).unwrap();
        assert_eq!(item.policy_ids(), vec![policy_id.clone()]);
        assert_eq!(item.relationships().len(), 1);

        item.remove_policies(&[policy_id]).unwrap();
    }

    #[test]
    fn query_pages_through_matches() {
        let (_, session) = connect();
        let root = root_id(&session);
        for name in ["q1", "q2", "q3"] {
            let properties = props("cmis:document", name);
            session
                .create_document(properties, Some(&root), None, VersioningState::Major)
                .unwrap();
        }
        let mut context = session.default_context();
        context.set_max_items_per_page(2).unwrap();

        let results = session.query("SELECT * FROM cmis:document", false, &context);
        assert_eq!(results.iter().count(), 3);
        let page = results.skip_to(1).get_page(1).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(
            page.items[0].property_value(ids::NAME).and_then(PropertyValue::as_str),
            Some("q2")
        );
        assert_eq!(results.total_num_items().unwrap(), Some(3));

        let named = session.query(
            "SELECT * FROM cmis:document WHERE cmis:name = 'q3'",
            false,
            &context,
        );
        assert_eq!(named.iter().count(), 1);
    }

    #[test]
    fn change_log_resumes_from_a_token() {
        let (_, session) = connect();
        let root = root_id(&session);
        let properties = props("cmis:document", "c1");
        session
            .create_document(properties, Some(&root), None, VersioningState::Major)
            .unwrap();

        let changes = session.content_changes(None, false, 2).unwrap();
        let events: Vec<_> = changes.iter().collect::<ClientResult<_>>().unwrap();
        assert!(!events.is_empty());
        assert_eq!(events.last().map(|e| e.change_type), Some(ChangeType::Created));

        // every event appears once even though pages overlap by one
        let mut tokens: Vec<_> = events
            .iter()
            .filter_map(ChangeEvent::change_log_token)
            .collect();
        let before = tokens.len();
        tokens.dedup();
        assert_eq!(tokens.len(), before);

        assert!(changes.skip_to(1).is_err());
        assert!(changes.get_page(1).is_err());
    }

    #[test]
    fn change_log_with_single_item_pages_returns_every_event() {
        let (service, session) = connect();
        let root = root_id(&session);
        for name in ["c1", "c2", "c3"] {
            session
                .create_document(
                    props("cmis:document", name),
                    Some(&root),
                    None,
                    VersioningState::Major,
                )
                .unwrap();
        }

        let all: Vec<_> = session
            .content_changes(None, false, 100)
            .unwrap()
            .iter()
            .collect::<ClientResult<_>>()
            .unwrap();
        assert!(all.len() >= 3);

        service.clear();
        let single: Vec<_> = session
            .content_changes(None, false, 1)
            .unwrap()
            .iter()
            .collect::<ClientResult<_>>()
            .unwrap();
        assert_eq!(single, all);
        assert_eq!(service.count(Operation::GetContentChanges), all.len());
    }

    #[test]
    fn type_cache_and_type_mutation() {
        let (service, session) = connect();
        let invoice = TypeDefinition::derive(
            "acme:invoice",
            &TypeDefinition::base(BaseTypeId::Document),
        )
        .with_property(PropertyDefinition::new(
            "acme:amount",
            PropertyType::Integer,
            Cardinality::Single,
            Updatability::ReadWrite,
        ));
        session.create_type(&invoice).unwrap();

        service.clear();
        session.type_definition("acme:invoice").unwrap();
        assert_eq!(service.count(Operation::TypeDefinition), 0);

        session.delete_type("acme:invoice").unwrap();
        assert!(session.type_definition("acme:invoice").is_err());
    }

    #[test]
    fn type_mutation_is_not_supported_on_1_0() {
        let repository = InMemoryRepository::with_config(InMemoryConfig {
            cmis_version: CmisVersion::V1_0,
            ..InMemoryConfig::default()
        });
        let (service, session) = connect_with(SessionConfig::default(), repository);
        service.clear();
        let err = session
            .create_type(&TypeDefinition::derive(
                "acme:x",
                &TypeDefinition::base(BaseTypeId::Item),
            ))
            .unwrap_err();
        assert!(matches!(err, ClientError::NotSupported(_)));
        assert_eq!(service.total(), 0);
    }

    #[test]
    fn objects_outlive_their_session_only_weakly() {
        let (_, session) = connect();
        let root = session.root_folder().unwrap();
        let clone = session.clone();
        drop(session);
        assert!(root.session().is_ok());
        drop(clone);
        assert!(root.children(&OperationContext::new()).is_err());
    }
}
