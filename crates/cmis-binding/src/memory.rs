//! In-memory repository for testing and ephemeral use.
//!
//! [`InMemoryRepository`] keeps every object, type, version series and
//! change-log entry in maps behind a `RwLock`. It implements the full
//! [`RepositoryService`] trait with the semantics the client relies on:
//! change tokens that go stale on every write, single-filed folders with
//! unique child names, version series with one private working copy, holds
//! that block deletion, and a change log whose pages repeat the last item of
//! the previous page.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use cmis_paging::{ChangeCursor, ChangePage, Page};
use cmis_types::{
    property_ids as ids, Ace, Acl, AclPropagation, Action, AllowableActions, BaseTypeId,
    Cardinality, ChangeEventInfo, ChangeType, CmisVersion, ContentStream, ContentStreamAllowed,
    ExtensionElement, ExtensionLevel, IncludeRelationships, ObjectRecord, OperationContext,
    PropertyData, PropertyValue, RepositoryCapabilities, RepositoryInfo, TypeDefinition,
    Updatability, WILDCARD,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BindingError, BindingResult};
use crate::traits::RepositoryService;
use crate::types::{
    CheckIn, CreateObject, RelationshipDirection, UnfileObject, UpdatedObject, VersioningState,
};

/// Prefix of the continuation links returned by the change log.
pub const CHANGE_LINK_PREFIX: &str = "changes?from=";

/// Settings of an [`InMemoryRepository`].
#[derive(Clone, Debug)]
pub struct InMemoryConfig {
    pub repository_id: String,
    pub name: String,
    /// CMIS 1.0 repositories reject type mutation.
    pub cmis_version: CmisVersion,
    /// Principal recorded as creator and last modifier.
    pub user: String,
    /// Create a new minor version on every property or content update of a
    /// checked-in versionable document.
    pub auto_version_on_update: bool,
    /// Enables `set_acl`.
    pub extended_acl: bool,
    /// Report a missing main content stream as a constraint violation
    /// instead of returning no content, as some repositories do.
    pub missing_content_is_constraint: bool,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            repository_id: "memory".to_string(),
            name: "In-memory repository".to_string(),
            cmis_version: CmisVersion::V1_1,
            user: "admin".to_string(),
            auto_version_on_update: false,
            extended_acl: false,
            missing_content_is_constraint: false,
        }
    }
}

#[derive(Clone, Debug)]
struct StoredObject {
    base: BaseTypeId,
    type_id: String,
    properties: BTreeMap<String, Vec<PropertyValue>>,
    parent_id: Option<String>,
    content: Option<ContentStream>,
    acl: Vec<Ace>,
    policies: BTreeSet<String>,
    series_id: Option<String>,
    pwc: bool,
}

impl StoredObject {
    fn text(&self, id: &str) -> Option<&str> {
        self.properties
            .get(id)
            .and_then(|values| values.first())
            .and_then(PropertyValue::as_str)
    }

    fn name(&self) -> &str {
        self.text(ids::NAME).unwrap_or_default()
    }

    fn change_token(&self) -> Option<String> {
        self.text(ids::CHANGE_TOKEN).map(str::to_string)
    }

    /// An empty value list clears a single-valued property; a multi-valued
    /// one is kept with no values.
    fn apply(&mut self, properties: &[PropertyData], object_type: &TypeDefinition) {
        for property in properties {
            let multi = object_type
                .property_definition(&property.id)
                .is_some_and(|d| d.cardinality == Cardinality::Multi);
            if property.values.is_empty() && !multi {
                self.properties.remove(&property.id);
            } else {
                self.properties
                    .insert(property.id.clone(), property.values.clone());
            }
        }
    }
}

#[derive(Debug, Default)]
struct VersionSeries {
    /// Oldest first.
    versions: Vec<String>,
    pwc: Option<String>,
    checked_out_by: Option<String>,
}

#[derive(Debug)]
struct ChangeEntry {
    change_type: ChangeType,
    time: DateTime<Utc>,
    properties: Vec<PropertyData>,
}

#[derive(Debug)]
struct RepoState {
    root_id: String,
    objects: HashMap<String, StoredObject>,
    types: BTreeMap<String, TypeDefinition>,
    series: HashMap<String, VersionSeries>,
    changes: Vec<ChangeEntry>,
    holds: HashSet<String>,
    next_token: u64,
}

/// An in-memory implementation of [`RepositoryService`].
///
/// Data is lost when the repository is dropped.
#[derive(Debug)]
pub struct InMemoryRepository {
    config: InMemoryConfig,
    state: RwLock<RepoState>,
}

impl InMemoryRepository {
    /// Create a repository holding only the root folder and the base types.
    pub fn new() -> Self {
        Self::with_config(InMemoryConfig::default())
    }

    pub fn with_config(config: InMemoryConfig) -> Self {
        let root_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut properties = BTreeMap::new();
        for (id, value) in [
            (ids::OBJECT_ID, PropertyValue::from(root_id.as_str())),
            (ids::OBJECT_TYPE_ID, BaseTypeId::Folder.as_str().into()),
            (ids::BASE_TYPE_ID, BaseTypeId::Folder.as_str().into()),
            (ids::NAME, "Root Folder".into()),
            (ids::CREATED_BY, config.user.as_str().into()),
            (ids::CREATION_DATE, now.into()),
            (ids::LAST_MODIFIED_BY, config.user.as_str().into()),
            (ids::LAST_MODIFICATION_DATE, now.into()),
            (ids::CHANGE_TOKEN, "0".into()),
        ] {
            properties.insert(id.to_string(), vec![value]);
        }
        let root = StoredObject {
            base: BaseTypeId::Folder,
            type_id: BaseTypeId::Folder.as_str().to_string(),
            properties,
            parent_id: None,
            content: None,
            acl: vec![Ace::new(config.user.clone(), ["cmis:all"])],
            policies: BTreeSet::new(),
            series_id: None,
            pwc: false,
        };

        let types = BaseTypeId::ALL
            .iter()
            .map(|base| (base.as_str().to_string(), TypeDefinition::base(*base)))
            .collect();

        let mut objects = HashMap::new();
        objects.insert(root_id.clone(), root);

        info!(repository_id = %config.repository_id, "in-memory repository created");
        Self {
            config,
            state: RwLock::new(RepoState {
                root_id,
                objects,
                types,
                series: HashMap::new(),
                changes: Vec::new(),
                holds: HashSet::new(),
                next_token: 1,
            }),
        }
    }

    pub fn config(&self) -> &InMemoryConfig {
        &self.config
    }

    pub fn root_folder_id(&self) -> BindingResult<String> {
        Ok(self.read()?.root_id.clone())
    }

    /// Number of stored objects, including the root folder and working copies.
    pub fn object_count(&self) -> BindingResult<usize> {
        Ok(self.read()?.objects.len())
    }

    /// Register a type regardless of the repository's CMIS version.
    pub fn register_type(&self, definition: TypeDefinition) -> BindingResult<()> {
        let mut state = self.write()?;
        state.insert_type(definition)
    }

    /// Put an object under hold. Held objects cannot be deleted.
    pub fn place_hold(&self, object_id: &str) -> BindingResult<()> {
        let mut state = self.write()?;
        state.object(object_id)?;
        state.holds.insert(object_id.to_string());
        debug!(object_id, "hold placed");
        Ok(())
    }

    /// Returns `true` if the object was held.
    pub fn release_hold(&self, object_id: &str) -> BindingResult<bool> {
        Ok(self.write()?.holds.remove(object_id))
    }

    fn read(&self) -> BindingResult<RwLockReadGuard<'_, RepoState>> {
        self.state
            .read()
            .map_err(|e| BindingError::Runtime(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> BindingResult<RwLockWriteGuard<'_, RepoState>> {
        self.state
            .write()
            .map_err(|e| BindingError::Runtime(format!("lock poisoned: {e}")))
    }

    fn ensure_type_mutation(&self) -> BindingResult<()> {
        match self.config.cmis_version {
            CmisVersion::V1_0 => Err(BindingError::NotSupported(
                "type mutation requires CMIS 1.1".to_string(),
            )),
            CmisVersion::V1_1 => Ok(()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// State helpers
// ---------------------------------------------------------------------------

impl RepoState {
    fn object(&self, id: &str) -> BindingResult<&StoredObject> {
        self.objects
            .get(id)
            .ok_or_else(|| BindingError::ObjectNotFound(id.to_string()))
    }

    fn object_mut(&mut self, id: &str) -> BindingResult<&mut StoredObject> {
        self.objects
            .get_mut(id)
            .ok_or_else(|| BindingError::ObjectNotFound(id.to_string()))
    }

    fn type_definition(&self, type_id: &str) -> BindingResult<&TypeDefinition> {
        self.types
            .get(type_id)
            .ok_or_else(|| BindingError::ObjectNotFound(format!("type {type_id}")))
    }

    fn insert_type(&mut self, definition: TypeDefinition) -> BindingResult<()> {
        if self.types.contains_key(&definition.id) {
            return Err(BindingError::Constraint(format!(
                "type {} already exists",
                definition.id
            )));
        }
        if let Some(parent) = &definition.parent_type_id {
            if !self.types.contains_key(parent) {
                return Err(BindingError::InvalidArgument(format!(
                    "parent type {parent} does not exist"
                )));
            }
        }
        definition
            .validate_mandatory()
            .map_err(|e| BindingError::InvalidArgument(e.to_string()))?;
        info!(type_id = %definition.id, "type registered");
        self.types.insert(definition.id.clone(), definition);
        Ok(())
    }

    /// Whether `type_id` is `ancestor` or derives from it.
    fn is_subtype(&self, type_id: &str, ancestor: &str) -> bool {
        let mut current = Some(type_id);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self
                .types
                .get(id)
                .and_then(|ty| ty.parent_type_id.as_deref());
        }
        false
    }

    fn next_token(&mut self) -> String {
        let token = self.next_token;
        self.next_token += 1;
        token.to_string()
    }

    /// Stamp a write: modifier, modification date and a fresh change token.
    fn touch(&mut self, id: &str, user: &str) {
        let token = self.next_token();
        if let Some(stored) = self.objects.get_mut(id) {
            stored
                .properties
                .insert(ids::LAST_MODIFIED_BY.to_string(), vec![user.into()]);
            stored
                .properties
                .insert(ids::LAST_MODIFICATION_DATE.to_string(), vec![Utc::now().into()]);
            stored
                .properties
                .insert(ids::CHANGE_TOKEN.to_string(), vec![token.into()]);
        }
    }

    fn record_change(&mut self, id: &str, change_type: ChangeType) {
        let Some(stored) = self.objects.get(id) else {
            return;
        };
        let properties = self.materialize(id, stored);
        self.changes.push(ChangeEntry {
            change_type,
            time: Utc::now(),
            properties,
        });
    }

    fn is_latest(&self, id: &str, stored: &StoredObject) -> bool {
        match &stored.series_id {
            None => true,
            Some(_) if stored.pwc => false,
            Some(series_id) => self
                .series
                .get(series_id)
                .and_then(|series| series.versions.last())
                .is_some_and(|latest| latest == id),
        }
    }

    /// Objects shown in folder listings: no working copies, no old versions.
    fn is_listed(&self, id: &str, stored: &StoredObject) -> bool {
        !stored.pwc && self.is_latest(id, stored)
    }

    fn path_of(&self, id: &str) -> Option<String> {
        if id == self.root_id {
            return Some("/".to_string());
        }
        let stored = self.objects.get(id)?;
        let parent_path = self.path_of(stored.parent_id.as_deref()?)?;
        Some(if parent_path == "/" {
            format!("/{}", stored.name())
        } else {
            format!("{parent_path}/{}", stored.name())
        })
    }

    fn sorted_by_name(&self, mut object_ids: Vec<String>) -> Vec<String> {
        object_ids.sort_by(|a, b| {
            let name_a = self.objects.get(a).map(StoredObject::name);
            let name_b = self.objects.get(b).map(StoredObject::name);
            name_a.cmp(&name_b).then_with(|| a.cmp(b))
        });
        object_ids
    }

    fn children(&self, folder_id: &str) -> Vec<String> {
        let children: Vec<String> = self
            .objects
            .iter()
            .filter(|(id, stored)| {
                stored.parent_id.as_deref() == Some(folder_id) && self.is_listed(id, stored)
            })
            .map(|(id, _)| id.clone())
            .collect();
        self.sorted_by_name(children)
    }

    fn child_named(&self, folder_id: &str, name: &str) -> Option<String> {
        self.objects
            .iter()
            .find(|(id, stored)| {
                stored.parent_id.as_deref() == Some(folder_id)
                    && stored.name() == name
                    && self.is_listed(id, stored)
            })
            .map(|(id, _)| id.clone())
    }

    /// Fail if `folder_id` already holds a differently-identified object named `name`.
    fn ensure_unique_name(
        &self,
        folder_id: &str,
        name: &str,
        except_id: Option<&str>,
    ) -> BindingResult<()> {
        let except_series = except_id
            .and_then(|id| self.objects.get(id))
            .and_then(|stored| stored.series_id.as_deref());
        let clash = self.objects.iter().any(|(id, stored)| {
            stored.parent_id.as_deref() == Some(folder_id)
                && stored.name() == name
                && self.is_listed(id, stored)
                && Some(id.as_str()) != except_id
                && (except_series.is_none() || stored.series_id.as_deref() != except_series)
        });
        if clash {
            return Err(BindingError::NameConstraintViolation(format!(
                "{name} already exists in folder {folder_id}"
            )));
        }
        Ok(())
    }

    fn descendants(&self, folder_id: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut pending = vec![folder_id.to_string()];
        while let Some(current) = pending.pop() {
            for (id, stored) in &self.objects {
                if stored.parent_id.as_deref() == Some(current.as_str()) {
                    if stored.base == BaseTypeId::Folder {
                        pending.push(id.clone());
                    }
                    found.push(id.clone());
                }
            }
        }
        found
    }

    fn relationships_of(
        &self,
        object_id: &str,
        direction: RelationshipDirection,
        type_id: Option<&str>,
    ) -> Vec<String> {
        let found: Vec<String> = self
            .objects
            .iter()
            .filter(|(_, stored)| stored.base == BaseTypeId::Relationship)
            .filter(|(_, stored)| type_id.map_or(true, |t| self.is_subtype(&stored.type_id, t)))
            .filter(|(_, stored)| {
                let source = stored.text(ids::SOURCE_ID) == Some(object_id);
                let target = stored.text(ids::TARGET_ID) == Some(object_id);
                match direction {
                    RelationshipDirection::Source => source,
                    RelationshipDirection::Target => target,
                    RelationshipDirection::Either => source || target,
                }
            })
            .map(|(id, _)| id.clone())
            .collect();
        self.sorted_by_name(found)
    }

    /// Stored properties plus the ones derived from repository state.
    fn materialize(&self, id: &str, stored: &StoredObject) -> Vec<PropertyData> {
        let mut properties = stored.properties.clone();
        let mut put = |id: &str, value: PropertyValue| {
            properties.insert(id.to_string(), vec![value]);
        };
        match stored.base {
            BaseTypeId::Document => {
                if let Some(series_id) = &stored.series_id {
                    put(ids::VERSION_SERIES_ID, series_id.as_str().into());
                    put(ids::IS_LATEST_VERSION, self.is_latest(id, stored).into());
                    put(ids::IS_PRIVATE_WORKING_COPY, stored.pwc.into());
                    if let Some(series) = self.series.get(series_id) {
                        put(ids::IS_VERSION_SERIES_CHECKED_OUT, series.pwc.is_some().into());
                        if let Some(pwc) = &series.pwc {
                            put(ids::VERSION_SERIES_CHECKED_OUT_ID, pwc.as_str().into());
                        }
                        if let Some(user) = &series.checked_out_by {
                            put(ids::VERSION_SERIES_CHECKED_OUT_BY, user.as_str().into());
                        }
                    }
                }
                if let Some(content) = &stored.content {
                    let length = i64::try_from(content.len()).unwrap_or(i64::MAX);
                    put(ids::CONTENT_STREAM_LENGTH, length.into());
                    put(ids::CONTENT_STREAM_MIME_TYPE, content.mime_type.as_str().into());
                    if let Some(file_name) = &content.file_name {
                        put(ids::CONTENT_STREAM_FILE_NAME, file_name.as_str().into());
                    }
                }
            }
            BaseTypeId::Folder => {
                if let Some(path) = self.path_of(id) {
                    put(ids::PATH, path.into());
                }
                if let Some(parent) = &stored.parent_id {
                    put(ids::PARENT_ID, parent.as_str().into());
                }
            }
            BaseTypeId::Relationship | BaseTypeId::Policy | BaseTypeId::Item => {}
        }
        properties
            .into_iter()
            .map(|(id, values)| PropertyData::new(id, values))
            .collect()
    }

    fn allowable_actions(&self, id: &str, stored: &StoredObject) -> AllowableActions {
        let mut actions = vec![
            Action::CanGetProperties,
            Action::CanUpdateProperties,
            Action::CanGetObjectRelationships,
            Action::CanGetAcl,
            Action::CanApplyAcl,
            Action::CanApplyPolicy,
            Action::CanGetAppliedPolicies,
            Action::CanRemovePolicy,
        ];
        let is_root = id == self.root_id;
        if !is_root {
            actions.push(Action::CanDeleteObject);
        }
        match stored.base {
            BaseTypeId::Document => {
                actions.extend([
                    Action::CanGetAllVersions,
                    Action::CanSetContentStream,
                    Action::CanGetObjectParents,
                    Action::CanMoveObject,
                ]);
                if stored.content.is_some() {
                    actions.extend([Action::CanGetContentStream, Action::CanDeleteContentStream]);
                }
                if let Some(series) = stored.series_id.as_ref().and_then(|s| self.series.get(s)) {
                    if stored.pwc {
                        actions.extend([Action::CanCheckIn, Action::CanCancelCheckOut]);
                    } else if series.pwc.is_none() && self.is_latest(id, stored) {
                        actions.push(Action::CanCheckOut);
                    }
                }
            }
            BaseTypeId::Folder => {
                actions.extend([
                    Action::CanGetChildren,
                    Action::CanGetDescendants,
                    Action::CanCreateDocument,
                    Action::CanCreateFolder,
                    Action::CanCreateRelationship,
                    Action::CanCreateItem,
                    Action::CanDeleteTree,
                ]);
                if !is_root {
                    actions.extend([
                        Action::CanGetFolderParent,
                        Action::CanGetObjectParents,
                        Action::CanMoveObject,
                    ]);
                }
            }
            BaseTypeId::Policy | BaseTypeId::Item => {
                actions.extend([Action::CanGetObjectParents, Action::CanMoveObject]);
            }
            BaseTypeId::Relationship => {}
        }
        AllowableActions::new(actions)
    }

    fn acl_of(stored: &StoredObject, only_basic_permissions: bool) -> Acl {
        let mut aces = stored.acl.clone();
        if only_basic_permissions {
            for ace in &mut aces {
                ace.permissions.retain(|p| p.starts_with("cmis:"));
            }
            aces.retain(|ace| !ace.permissions.is_empty());
        }
        Acl {
            aces,
            is_exact: Some(true),
        }
    }

    fn record(&self, id: &str, context: &OperationContext) -> BindingResult<ObjectRecord> {
        let stored = self.object(id)?;
        let mut properties = self.materialize(id, stored);
        if let Some(filter) = context.filter() {
            if !filter.contains(WILDCARD) {
                properties.retain(|p| filter.contains(&p.id));
            }
        }

        let direction = match context.include_relationships() {
            IncludeRelationships::None => None,
            IncludeRelationships::Source => Some(RelationshipDirection::Source),
            IncludeRelationships::Target => Some(RelationshipDirection::Target),
            IncludeRelationships::Both => Some(RelationshipDirection::Either),
        };
        let relationships = match direction {
            Some(direction) => self
                .relationships_of(id, direction, None)
                .into_iter()
                .filter_map(|rel_id| {
                    let rel = self.objects.get(&rel_id)?;
                    Some(ObjectRecord {
                        properties: self.materialize(&rel_id, rel),
                        ..Default::default()
                    })
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(ObjectRecord {
            properties,
            allowable_actions: context
                .include_allowable_actions()
                .then(|| self.allowable_actions(id, stored)),
            acl: context
                .include_acls()
                .then(|| Self::acl_of(stored, false)),
            policy_ids: context
                .include_policies()
                .then(|| stored.policies.iter().cloned().collect()),
            relationships,
            ..Default::default()
        })
    }

    fn page(
        &self,
        object_ids: &[String],
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>> {
        let start = usize::try_from(skip_count)
            .unwrap_or(usize::MAX)
            .min(object_ids.len());
        let take = usize::try_from(max_items).unwrap_or(usize::MAX);
        let end = start.saturating_add(take).min(object_ids.len());
        let items = object_ids[start..end]
            .iter()
            .map(|id| self.record(id, context))
            .collect::<BindingResult<Vec<_>>>()?;
        Ok(Page::new(
            items,
            Some(object_ids.len() as u64),
            end < object_ids.len(),
        ))
    }

    fn ensure_policies(&self, policies: &[String]) -> BindingResult<()> {
        for policy_id in policies {
            if self.object(policy_id)?.base != BaseTypeId::Policy {
                return Err(BindingError::InvalidArgument(format!(
                    "{policy_id} is not a policy"
                )));
            }
        }
        Ok(())
    }

    /// Create the next version of the series `from_id` belongs to.
    ///
    /// The new version starts as a copy of `from_id` (a working copy on
    /// check-in, the current version on auto-versioning). `content` replaces
    /// the copied stream when given.
    fn new_version(
        &mut self,
        from_id: &str,
        major: bool,
        properties: &[PropertyData],
        content: Option<Option<ContentStream>>,
        comment: Option<String>,
        user: &str,
    ) -> BindingResult<String> {
        let source = self.object(from_id)?;
        let series_id = source
            .series_id
            .clone()
            .ok_or_else(|| BindingError::Constraint(format!("{from_id} is not versionable")))?;
        let latest_id = self
            .series
            .get(&series_id)
            .and_then(|series| series.versions.last())
            .cloned()
            .ok_or_else(|| BindingError::ObjectNotFound(format!("version series {series_id}")))?;
        let latest = self.object(&latest_id)?;
        let label = next_version_label(latest.text(ids::VERSION_LABEL), major);

        let mut version = StoredObject {
            parent_id: latest.parent_id.clone(),
            pwc: false,
            ..source.clone()
        };
        let object_type = self.type_definition(&source.type_id)?;
        version.apply(properties, object_type);
        if let Some(content) = content {
            version.content = content;
        }

        let id = Uuid::new_v4().to_string();
        let token = self.next_token();
        let now = Utc::now();
        for (property, value) in [
            (ids::OBJECT_ID, PropertyValue::from(id.as_str())),
            (ids::VERSION_LABEL, label.into()),
            (ids::IS_MAJOR_VERSION, major.into()),
            (ids::CREATED_BY, user.into()),
            (ids::CREATION_DATE, now.into()),
            (ids::LAST_MODIFIED_BY, user.into()),
            (ids::LAST_MODIFICATION_DATE, now.into()),
            (ids::CHANGE_TOKEN, token.into()),
        ] {
            version.properties.insert(property.to_string(), vec![value]);
        }
        match comment {
            Some(comment) => {
                version
                    .properties
                    .insert(ids::CHECKIN_COMMENT.to_string(), vec![comment.into()]);
            }
            None => {
                version.properties.remove(ids::CHECKIN_COMMENT);
            }
        }

        self.objects.insert(id.clone(), version);
        if let Some(series) = self.series.get_mut(&series_id) {
            series.versions.push(id.clone());
        }
        self.record_change(&id, ChangeType::Created);
        debug!(object_id = %id, series_id = %series_id, major, "version created");
        Ok(id)
    }

    fn check_out(&mut self, id: &str, user: &str) -> BindingResult<String> {
        let stored = self.object(id)?;
        if stored.base != BaseTypeId::Document {
            return Err(BindingError::Constraint(format!(
                "{id} is not a document"
            )));
        }
        if stored.pwc {
            return Err(BindingError::Constraint(format!(
                "{id} is a private working copy"
            )));
        }
        let series_id = stored
            .series_id
            .clone()
            .ok_or_else(|| BindingError::Constraint(format!("{id} is not versionable")))?;
        if self
            .series
            .get(&series_id)
            .is_some_and(|series| series.pwc.is_some())
        {
            return Err(BindingError::Constraint(format!(
                "version series of {id} is already checked out"
            )));
        }

        let mut pwc = StoredObject {
            parent_id: None,
            pwc: true,
            ..stored.clone()
        };
        let pwc_id = Uuid::new_v4().to_string();
        let token = self.next_token();
        for (property, value) in [
            (ids::OBJECT_ID, PropertyValue::from(pwc_id.as_str())),
            (ids::VERSION_LABEL, "pwc".into()),
            (ids::IS_MAJOR_VERSION, false.into()),
            (ids::CHANGE_TOKEN, token.into()),
        ] {
            pwc.properties.insert(property.to_string(), vec![value]);
        }
        pwc.properties.remove(ids::CHECKIN_COMMENT);
        self.objects.insert(pwc_id.clone(), pwc);

        if let Some(series) = self.series.get_mut(&series_id) {
            series.pwc = Some(pwc_id.clone());
            series.checked_out_by = Some(user.to_string());
        }
        self.touch(id, user);
        self.record_change(id, ChangeType::Updated);
        info!(object_id = id, pwc_id = %pwc_id, "document checked out");
        Ok(pwc_id)
    }

    /// Remove one object and unlink it from its version series.
    fn remove(&mut self, id: &str) {
        self.record_change(id, ChangeType::Deleted);
        let Some(stored) = self.objects.remove(id) else {
            return;
        };
        let Some(series_id) = stored.series_id else {
            return;
        };
        let mut orphaned_pwc = None;
        let mut drop_series = false;
        if let Some(series) = self.series.get_mut(&series_id) {
            if stored.pwc {
                series.pwc = None;
                series.checked_out_by = None;
            } else {
                series.versions.retain(|v| v != id);
                if series.versions.is_empty() {
                    orphaned_pwc = series.pwc.take();
                    drop_series = true;
                }
            }
        }
        if drop_series {
            self.series.remove(&series_id);
        }
        if let Some(pwc) = orphaned_pwc {
            self.objects.remove(&pwc);
        }
    }

    /// Ids to remove when `id` goes with all its versions.
    fn whole_series(&self, id: &str, stored: &StoredObject) -> Vec<String> {
        match stored.series_id.as_ref().and_then(|s| self.series.get(s)) {
            Some(series) => series
                .versions
                .iter()
                .cloned()
                .chain(series.pwc.iter().cloned())
                .collect(),
            None => vec![id.to_string()],
        }
    }

    /// Post-order delete below `folder_id`. Returns `false` if anything stayed.
    fn delete_subtree(
        &mut self,
        folder_id: &str,
        continue_on_failure: bool,
        failed: &mut Vec<String>,
    ) -> bool {
        let children: Vec<String> = self
            .objects
            .iter()
            .filter(|(_, stored)| stored.parent_id.as_deref() == Some(folder_id))
            .map(|(id, _)| id.clone())
            .collect();

        let mut complete = true;
        for child in self.sorted_by_name(children) {
            let Some(stored) = self.objects.get(&child) else {
                continue;
            };
            let deleted = if stored.base == BaseTypeId::Folder {
                self.delete_subtree(&child, continue_on_failure, failed)
            } else {
                let targets = self.whole_series(&child, stored);
                let held: Vec<String> = targets
                    .iter()
                    .filter(|t| self.holds.contains(*t))
                    .cloned()
                    .collect();
                if held.is_empty() {
                    for target in targets {
                        self.remove(&target);
                    }
                    true
                } else {
                    failed.extend(held);
                    false
                }
            };
            if !deleted {
                complete = false;
                if !continue_on_failure {
                    break;
                }
            }
        }

        if folder_id == self.root_id {
            return complete;
        }
        if complete && !self.holds.contains(folder_id) {
            self.remove(folder_id);
            true
        } else {
            failed.push(folder_id.to_string());
            false
        }
    }
}

fn next_version_label(current: Option<&str>, major: bool) -> String {
    let (major_number, minor_number) = current
        .and_then(|label| label.split_once('.'))
        .and_then(|(a, b)| Some((a.parse::<u64>().ok()?, b.parse::<u64>().ok()?)))
        .unwrap_or((0, 0));
    if major {
        format!("{}.0", major_number + 1)
    } else {
        format!("{major_number}.{}", minor_number + 1)
    }
}

fn merge_aces(acl: &mut Vec<Ace>, add: &[Ace], remove: &[Ace]) {
    for ace in remove {
        if let Some(existing) = acl.iter_mut().find(|a| a.principal_id == ace.principal_id) {
            existing.permissions.retain(|p| !ace.permissions.contains(p));
        }
    }
    acl.retain(|ace| !ace.permissions.is_empty());
    for ace in add {
        match acl.iter_mut().find(|a| a.principal_id == ace.principal_id) {
            Some(existing) => {
                for permission in &ace.permissions {
                    if !existing.permissions.contains(permission) {
                        existing.permissions.push(permission.clone());
                    }
                }
            }
            None => acl.push(Ace::new(ace.principal_id.clone(), ace.permissions.clone())),
        }
    }
}

fn check_token(id: &str, stored: &StoredObject, change_token: Option<&str>) -> BindingResult<()> {
    match (change_token, stored.text(ids::CHANGE_TOKEN)) {
        (Some(sent), Some(current)) if sent != current => Err(BindingError::UpdateConflict(
            format!("{id} changed since token {sent}"),
        )),
        _ => Ok(()),
    }
}

fn validate_properties(
    ty: &TypeDefinition,
    properties: &[PropertyData],
    allowed: &[Updatability],
) -> BindingResult<()> {
    for property in properties {
        let definition = ty.property_definition(&property.id).ok_or_else(|| {
            BindingError::InvalidArgument(format!(
                "type {} has no property {}",
                ty.id, property.id
            ))
        })?;
        if !allowed.contains(&definition.updatability) {
            return Err(BindingError::Constraint(format!(
                "property {} is not updatable",
                property.id
            )));
        }
        definition
            .validate(&property.values)
            .map_err(|e| BindingError::InvalidArgument(e.to_string()))?;
    }
    Ok(())
}

fn requested_name(properties: &[PropertyData]) -> Option<&str> {
    properties
        .iter()
        .find(|p| p.id == ids::NAME)
        .and_then(PropertyData::first)
        .and_then(PropertyValue::as_str)
}

fn parse_change_index(token: &str) -> BindingResult<usize> {
    token
        .parse()
        .map_err(|_| BindingError::InvalidArgument(format!("invalid change log token {token}")))
}

struct ParsedQuery {
    type_id: String,
    name: Option<String>,
}

/// Parse `SELECT * FROM <type> [WHERE cmis:name = '<value>']`.
fn parse_query(statement: &str) -> BindingResult<ParsedQuery> {
    let unsupported = || BindingError::InvalidArgument(format!("unsupported query: {statement}"));
    let mut tokens = statement.split_whitespace();
    let keyword = |token: Option<&str>, expected: &str| {
        token.is_some_and(|t| t.eq_ignore_ascii_case(expected))
    };
    if !keyword(tokens.next(), "select")
        || tokens.next() != Some("*")
        || !keyword(tokens.next(), "from")
    {
        return Err(unsupported());
    }
    let type_id = tokens.next().ok_or_else(unsupported)?.to_string();
    if tokens.next().is_none() {
        return Ok(ParsedQuery {
            type_id,
            name: None,
        });
    }

    let lower = statement.to_ascii_lowercase();
    let start = lower.find(" where ").ok_or_else(unsupported)? + " where ".len();
    let (lhs, rhs) = statement[start..].split_once('=').ok_or_else(unsupported)?;
    if lhs.trim() != ids::NAME {
        return Err(unsupported());
    }
    let value = rhs
        .trim()
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .ok_or_else(unsupported)?;
    Ok(ParsedQuery {
        type_id,
        name: Some(value.replace("''", "'")),
    })
}

// ---------------------------------------------------------------------------
// RepositoryService
// ---------------------------------------------------------------------------

impl RepositoryService for InMemoryRepository {
    fn repository_info(&self) -> BindingResult<RepositoryInfo> {
        let state = self.read()?;
        Ok(RepositoryInfo {
            id: self.config.repository_id.clone(),
            name: self.config.name.clone(),
            root_folder_id: state.root_id.clone(),
            cmis_version: self.config.cmis_version,
            latest_change_log_token: state.changes.len().checked_sub(1).map(|i| i.to_string()),
            capabilities: RepositoryCapabilities {
                extended_acl: self.config.extended_acl,
                ..RepositoryCapabilities::default()
            },
        })
    }

    fn type_definition(&self, type_id: &str) -> BindingResult<TypeDefinition> {
        self.read()?.type_definition(type_id).cloned()
    }

    fn create_type(&self, definition: &TypeDefinition) -> BindingResult<TypeDefinition> {
        self.ensure_type_mutation()?;
        let mut state = self.write()?;
        state.insert_type(definition.clone())?;
        Ok(definition.clone())
    }

    fn update_type(&self, definition: &TypeDefinition) -> BindingResult<TypeDefinition> {
        self.ensure_type_mutation()?;
        definition
            .validate_mandatory()
            .map_err(|e| BindingError::InvalidArgument(e.to_string()))?;
        let mut state = self.write()?;
        let existing = state.type_definition(&definition.id)?;
        if existing.base_type != definition.base_type {
            return Err(BindingError::Constraint(format!(
                "type {} cannot change its base type",
                definition.id
            )));
        }
        state
            .types
            .insert(definition.id.clone(), definition.clone());
        info!(type_id = %definition.id, "type updated");
        Ok(definition.clone())
    }

    fn delete_type(&self, type_id: &str) -> BindingResult<()> {
        self.ensure_type_mutation()?;
        let mut state = self.write()?;
        let ty = state.type_definition(type_id)?;
        if ty.parent_type_id.is_none() {
            return Err(BindingError::Constraint(format!(
                "base type {type_id} cannot be deleted"
            )));
        }
        if state.objects.values().any(|o| o.type_id == type_id) {
            return Err(BindingError::Constraint(format!(
                "type {type_id} has instances"
            )));
        }
        if state
            .types
            .values()
            .any(|t| t.parent_type_id.as_deref() == Some(type_id))
        {
            return Err(BindingError::Constraint(format!(
                "type {type_id} has subtypes"
            )));
        }
        state.types.remove(type_id);
        info!(type_id, "type deleted");
        Ok(())
    }

    fn get_object(
        &self,
        object_id: &str,
        context: &OperationContext,
    ) -> BindingResult<ObjectRecord> {
        self.read()?.record(object_id, context)
    }

    fn get_object_by_path(
        &self,
        path: &str,
        context: &OperationContext,
    ) -> BindingResult<ObjectRecord> {
        if !path.starts_with('/') {
            return Err(BindingError::InvalidArgument(format!(
                "path must be absolute: {path}"
            )));
        }
        let state = self.read()?;
        let mut current = state.root_id.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = state
                .child_named(&current, segment)
                .ok_or_else(|| BindingError::ObjectNotFound(path.to_string()))?;
        }
        state.record(&current, context)
    }

    fn get_folder_parent(
        &self,
        folder_id: &str,
        context: &OperationContext,
    ) -> BindingResult<ObjectRecord> {
        let state = self.read()?;
        let folder = state.object(folder_id)?;
        if folder.base != BaseTypeId::Folder {
            return Err(BindingError::InvalidArgument(format!(
                "{folder_id} is not a folder"
            )));
        }
        let parent = folder.parent_id.as_deref().ok_or_else(|| {
            BindingError::InvalidArgument("the root folder has no parent".to_string())
        })?;
        state.record(parent, context)
    }

    fn get_children(
        &self,
        folder_id: &str,
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>> {
        let state = self.read()?;
        if state.object(folder_id)?.base != BaseTypeId::Folder {
            return Err(BindingError::InvalidArgument(format!(
                "{folder_id} is not a folder"
            )));
        }
        let mut children = state.children(folder_id);
        if context
            .order_by()
            .is_some_and(|order| order.to_ascii_lowercase().ends_with(" desc"))
        {
            children.reverse();
        }
        state.page(&children, context, skip_count, max_items)
    }

    fn get_checked_out_docs(
        &self,
        folder_id: Option<&str>,
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>> {
        let state = self.read()?;
        let pwcs: Vec<String> = state
            .series
            .values()
            .filter(|series| match folder_id {
                None => true,
                Some(folder) => series
                    .versions
                    .last()
                    .and_then(|latest| state.objects.get(latest))
                    .is_some_and(|latest| latest.parent_id.as_deref() == Some(folder)),
            })
            .filter_map(|series| series.pwc.clone())
            .collect();
        let pwcs = state.sorted_by_name(pwcs);
        state.page(&pwcs, context, skip_count, max_items)
    }

    fn get_object_relationships(
        &self,
        object_id: &str,
        direction: RelationshipDirection,
        type_id: Option<&str>,
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>> {
        let state = self.read()?;
        state.object(object_id)?;
        let relationships = state.relationships_of(object_id, direction, type_id);
        state.page(&relationships, context, skip_count, max_items)
    }

    fn query(
        &self,
        statement: &str,
        search_all_versions: bool,
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>> {
        let query = parse_query(statement)?;
        let state = self.read()?;
        if !state.types.contains_key(&query.type_id) {
            return Err(BindingError::InvalidArgument(format!(
                "unknown type {}",
                query.type_id
            )));
        }
        let matches: Vec<String> = state
            .objects
            .iter()
            .filter(|(_, stored)| state.is_subtype(&stored.type_id, &query.type_id))
            .filter(|(id, stored)| search_all_versions || state.is_listed(id, stored))
            .filter(|(_, stored)| query.name.as_deref().map_or(true, |n| stored.name() == n))
            .map(|(id, _)| id.clone())
            .collect();
        let matches = state.sorted_by_name(matches);
        debug!(statement, hits = matches.len(), "query executed");
        state.page(&matches, context, skip_count, max_items)
    }

    fn get_content_changes(
        &self,
        cursor: &ChangeCursor,
        include_properties: bool,
        max_items: u64,
    ) -> BindingResult<ChangePage<ObjectRecord>> {
        let start = match cursor {
            ChangeCursor::Start(None) => 0,
            ChangeCursor::Start(Some(token)) | ChangeCursor::Token(token) => {
                parse_change_index(token)?
            }
            ChangeCursor::Link(link) => {
                let token = link.strip_prefix(CHANGE_LINK_PREFIX).ok_or_else(|| {
                    BindingError::InvalidArgument(format!("invalid change log link {link}"))
                })?;
                parse_change_index(token)?
            }
        };

        let state = self.read()?;
        let len = state.changes.len();
        let start = start.min(len);
        let take = usize::try_from(max_items.max(1)).unwrap_or(usize::MAX);
        let end = start.saturating_add(take).min(len);

        let items = state.changes[start..end]
            .iter()
            .enumerate()
            .map(|(offset, entry)| {
                let properties = if include_properties {
                    entry.properties.clone()
                } else {
                    entry
                        .properties
                        .iter()
                        .filter(|p| {
                            matches!(
                                p.id.as_str(),
                                ids::OBJECT_ID | ids::OBJECT_TYPE_ID | ids::BASE_TYPE_ID
                            )
                        })
                        .cloned()
                        .collect()
                };
                let mut extensions = BTreeMap::new();
                extensions.insert(
                    ExtensionLevel::ChangeEvent,
                    vec![ExtensionElement::leaf(
                        "changeLogToken",
                        (start + offset).to_string(),
                    )],
                );
                ObjectRecord {
                    properties,
                    change_event: Some(ChangeEventInfo {
                        change_type: entry.change_type,
                        change_time: entry.time,
                    }),
                    extensions,
                    ..Default::default()
                }
            })
            .collect();

        // The next page starts at the last item of this one.
        let latest_token = (end > start).then(|| (end - 1).to_string());
        Ok(ChangePage {
            items,
            total_num_items: Some(len as u64),
            has_more_items: end < len,
            next_link: latest_token
                .as_ref()
                .map(|token| format!("{CHANGE_LINK_PREFIX}{token}")),
            latest_token,
        })
    }

    fn create_object(&self, request: CreateObject) -> BindingResult<String> {
        let user = self.config.user.as_str();
        let mut state = self.write()?;

        let type_id = request
            .properties
            .iter()
            .find(|p| p.id == ids::OBJECT_TYPE_ID)
            .and_then(PropertyData::first)
            .and_then(PropertyValue::as_str)
            .ok_or_else(|| {
                BindingError::InvalidArgument(format!("{} is required", ids::OBJECT_TYPE_ID))
            })?
            .to_string();
        let ty = state.type_definition(&type_id)?.clone();
        validate_properties(&ty, &request.properties, &Updatability::for_create())?;

        let name = match requested_name(&request.properties) {
            Some(name) if !name.is_empty() => name.to_string(),
            Some(_) => {
                return Err(BindingError::Constraint(format!(
                    "{} must not be empty",
                    ids::NAME
                )))
            }
            None if ty.fileable => {
                return Err(BindingError::Constraint(format!(
                    "{} is required",
                    ids::NAME
                )))
            }
            None => type_id.clone(),
        };

        match (ty.base_type, request.folder_id.as_deref()) {
            (BaseTypeId::Folder, None) => {
                return Err(BindingError::Constraint(
                    "a folder needs a parent folder".to_string(),
                ))
            }
            (_, Some(folder_id)) => {
                if !ty.fileable {
                    return Err(BindingError::Constraint(format!(
                        "type {type_id} is not fileable"
                    )));
                }
                if state.object(folder_id)?.base != BaseTypeId::Folder {
                    return Err(BindingError::InvalidArgument(format!(
                        "{folder_id} is not a folder"
                    )));
                }
                state.ensure_unique_name(folder_id, &name, None)?;
            }
            (_, None) => {}
        }

        if ty.base_type == BaseTypeId::Relationship {
            for end in [ids::SOURCE_ID, ids::TARGET_ID] {
                let end_id = request
                    .properties
                    .iter()
                    .find(|p| p.id == end)
                    .and_then(PropertyData::first)
                    .and_then(PropertyValue::as_str)
                    .ok_or_else(|| BindingError::Constraint(format!("{end} is required")))?;
                state.object(end_id)?;
            }
        }

        match (ty.content_stream_allowed, &request.content) {
            (ContentStreamAllowed::NotAllowed, Some(_)) => {
                return Err(BindingError::Constraint(format!(
                    "type {type_id} does not allow content"
                )))
            }
            (ContentStreamAllowed::Required, None) => {
                return Err(BindingError::Constraint(format!(
                    "type {type_id} requires content"
                )))
            }
            _ => {}
        }
        state.ensure_policies(&request.policies)?;

        let id = Uuid::new_v4().to_string();
        let token = state.next_token();
        let now = Utc::now();
        let mut properties: BTreeMap<String, Vec<PropertyValue>> = request
            .properties
            .into_iter()
            .filter(|p| {
                !p.values.is_empty()
                    || ty
                        .property_definition(&p.id)
                        .is_some_and(|d| d.cardinality == Cardinality::Multi)
            })
            .map(|p| (p.id, p.values))
            .collect();
        for (property, value) in [
            (ids::OBJECT_ID, PropertyValue::from(id.as_str())),
            (ids::BASE_TYPE_ID, ty.base_type.as_str().into()),
            (ids::NAME, name.into()),
            (ids::CREATED_BY, user.into()),
            (ids::CREATION_DATE, now.into()),
            (ids::LAST_MODIFIED_BY, user.into()),
            (ids::LAST_MODIFICATION_DATE, now.into()),
            (ids::CHANGE_TOKEN, token.into()),
        ] {
            properties.insert(property.to_string(), vec![value]);
        }

        let series_id = if ty.base_type == BaseTypeId::Document && ty.versionable {
            let major = request.versioning_state != VersioningState::Minor;
            let label = if major { "1.0" } else { "0.1" };
            properties.insert(ids::VERSION_LABEL.to_string(), vec![label.into()]);
            properties.insert(ids::IS_MAJOR_VERSION.to_string(), vec![major.into()]);
            let series_id = Uuid::new_v4().to_string();
            state.series.insert(
                series_id.clone(),
                VersionSeries {
                    versions: vec![id.clone()],
                    ..VersionSeries::default()
                },
            );
            Some(series_id)
        } else {
            None
        };
        if ty.base_type == BaseTypeId::Document {
            properties.insert(ids::IS_IMMUTABLE.to_string(), vec![false.into()]);
        }

        let mut acl = Vec::new();
        merge_aces(&mut acl, &request.add_aces, &request.remove_aces);

        let versionable = series_id.is_some();
        state.objects.insert(
            id.clone(),
            StoredObject {
                base: ty.base_type,
                type_id: type_id.clone(),
                properties,
                parent_id: request.folder_id,
                content: request.content,
                acl,
                policies: request.policies.into_iter().collect(),
                series_id,
                pwc: false,
            },
        );
        state.record_change(&id, ChangeType::Created);
        info!(object_id = %id, type_id = %type_id, "object created");

        if versionable && request.versioning_state == VersioningState::CheckedOut {
            return state.check_out(&id, user);
        }
        Ok(id)
    }

    fn update_properties(
        &self,
        object_id: &str,
        change_token: Option<&str>,
        properties: Vec<PropertyData>,
    ) -> BindingResult<UpdatedObject> {
        let user = self.config.user.as_str();
        let mut state = self.write()?;

        let stored = state.object(object_id)?;
        check_token(object_id, stored, change_token)?;
        let ty = state.type_definition(&stored.type_id)?.clone();
        validate_properties(&ty, &properties, &Updatability::for_update(stored.pwc))?;
        let is_pwc = stored.pwc;
        let versionable = stored.series_id.is_some();
        let parent_id = stored.parent_id.clone();

        if let Some(name) = requested_name(&properties) {
            if name.is_empty() {
                return Err(BindingError::Constraint(format!(
                    "{} must not be empty",
                    ids::NAME
                )));
            }
            if let Some(parent_id) = &parent_id {
                state.ensure_unique_name(parent_id, name, Some(object_id))?;
            }
        }

        if self.config.auto_version_on_update && versionable && !is_pwc {
            let id = state.new_version(object_id, false, &properties, None, None, user)?;
            let change_token = state.object(&id)?.change_token();
            return Ok(UpdatedObject { id, change_token });
        }

        state.object_mut(object_id)?.apply(&properties, &ty);
        state.touch(object_id, user);
        state.record_change(object_id, ChangeType::Updated);
        let change_token = state.object(object_id)?.change_token();
        debug!(object_id, count = properties.len(), "properties updated");
        Ok(UpdatedObject {
            id: object_id.to_string(),
            change_token,
        })
    }

    fn delete_object(&self, object_id: &str, all_versions: bool) -> BindingResult<()> {
        let mut state = self.write()?;
        let stored = state.object(object_id)?;
        if object_id == state.root_id {
            return Err(BindingError::Constraint(
                "the root folder cannot be deleted".to_string(),
            ));
        }
        if stored.base == BaseTypeId::Folder
            && state
                .objects
                .values()
                .any(|o| o.parent_id.as_deref() == Some(object_id))
        {
            return Err(BindingError::Constraint(format!(
                "folder {object_id} is not empty"
            )));
        }

        let targets = if all_versions && !stored.pwc {
            state.whole_series(object_id, stored)
        } else {
            vec![object_id.to_string()]
        };
        if let Some(held) = targets.iter().find(|t| state.holds.contains(*t)) {
            return Err(BindingError::Constraint(format!("{held} is under hold")));
        }
        for target in &targets {
            state.remove(target);
        }
        info!(object_id, removed = targets.len(), "object deleted");
        Ok(())
    }

    /// Single-filed repository: every `unfile` mode deletes.
    fn delete_tree(
        &self,
        folder_id: &str,
        _all_versions: bool,
        _unfile: UnfileObject,
        continue_on_failure: bool,
    ) -> BindingResult<Vec<String>> {
        let mut state = self.write()?;
        if state.object(folder_id)?.base != BaseTypeId::Folder {
            return Err(BindingError::InvalidArgument(format!(
                "{folder_id} is not a folder"
            )));
        }
        let mut failed = Vec::new();
        state.delete_subtree(folder_id, continue_on_failure, &mut failed);
        if failed.is_empty() {
            info!(folder_id, "tree deleted");
        } else {
            warn!(folder_id, failed = failed.len(), "tree partially deleted");
        }
        Ok(failed)
    }

    /// No renditions are stored, so any `stream_id` yields `None`.
    fn get_content_stream(
        &self,
        object_id: &str,
        stream_id: Option<&str>,
    ) -> BindingResult<Option<ContentStream>> {
        let state = self.read()?;
        let stored = state.object(object_id)?;
        if stream_id.is_some() {
            return Ok(None);
        }
        match &stored.content {
            None if self.config.missing_content_is_constraint => Err(BindingError::Constraint(
                format!("object {object_id} has no content stream"),
            )),
            content => Ok(content.clone()),
        }
    }

    fn set_content_stream(
        &self,
        object_id: &str,
        overwrite: bool,
        change_token: Option<&str>,
        content: ContentStream,
    ) -> BindingResult<UpdatedObject> {
        let user = self.config.user.as_str();
        let mut state = self.write()?;
        let stored = state.object(object_id)?;
        check_token(object_id, stored, change_token)?;
        if stored.base != BaseTypeId::Document {
            return Err(BindingError::Constraint(format!(
                "{object_id} is not a document"
            )));
        }
        if state.type_definition(&stored.type_id)?.content_stream_allowed
            == ContentStreamAllowed::NotAllowed
        {
            return Err(BindingError::Constraint(format!(
                "type {} does not allow content",
                stored.type_id
            )));
        }
        if stored.content.is_some() && !overwrite {
            return Err(BindingError::Constraint(format!(
                "{object_id} already has content"
            )));
        }

        if self.config.auto_version_on_update && stored.series_id.is_some() && !stored.pwc {
            let id = state.new_version(object_id, false, &[], Some(Some(content)), None, user)?;
            let change_token = state.object(&id)?.change_token();
            return Ok(UpdatedObject { id, change_token });
        }

        state.object_mut(object_id)?.content = Some(content);
        state.touch(object_id, user);
        state.record_change(object_id, ChangeType::Updated);
        Ok(UpdatedObject {
            id: object_id.to_string(),
            change_token: state.object(object_id)?.change_token(),
        })
    }

    fn delete_content_stream(
        &self,
        object_id: &str,
        change_token: Option<&str>,
    ) -> BindingResult<UpdatedObject> {
        let user = self.config.user.as_str();
        let mut state = self.write()?;
        let stored = state.object(object_id)?;
        check_token(object_id, stored, change_token)?;
        if state.type_definition(&stored.type_id)?.content_stream_allowed
            == ContentStreamAllowed::Required
        {
            return Err(BindingError::Constraint(format!(
                "type {} requires content",
                stored.type_id
            )));
        }

        if self.config.auto_version_on_update && stored.series_id.is_some() && !stored.pwc {
            let id = state.new_version(object_id, false, &[], Some(None), None, user)?;
            let change_token = state.object(&id)?.change_token();
            return Ok(UpdatedObject { id, change_token });
        }

        state.object_mut(object_id)?.content = None;
        state.touch(object_id, user);
        state.record_change(object_id, ChangeType::Updated);
        Ok(UpdatedObject {
            id: object_id.to_string(),
            change_token: state.object(object_id)?.change_token(),
        })
    }

    fn check_out(&self, object_id: &str) -> BindingResult<String> {
        let mut state = self.write()?;
        state.check_out(object_id, &self.config.user)
    }

    fn cancel_check_out(&self, object_id: &str) -> BindingResult<()> {
        let user = self.config.user.as_str();
        let mut state = self.write()?;
        let series_id = state
            .object(object_id)?
            .series_id
            .clone()
            .ok_or_else(|| BindingError::Constraint(format!("{object_id} is not versionable")))?;
        let series = state
            .series
            .get_mut(&series_id)
            .ok_or_else(|| BindingError::ObjectNotFound(format!("version series {series_id}")))?;
        let pwc_id = series
            .pwc
            .take()
            .ok_or_else(|| BindingError::Constraint(format!("{object_id} is not checked out")))?;
        series.checked_out_by = None;
        let latest = series.versions.last().cloned();

        state.objects.remove(&pwc_id);
        if let Some(latest) = latest {
            state.touch(&latest, user);
            state.record_change(&latest, ChangeType::Updated);
        }
        info!(object_id, pwc_id = %pwc_id, "check out cancelled");
        Ok(())
    }

    fn check_in(&self, object_id: &str, request: CheckIn) -> BindingResult<String> {
        let user = self.config.user.as_str();
        let mut state = self.write()?;
        let stored = state.object(object_id)?;
        if !stored.pwc {
            return Err(BindingError::Constraint(format!(
                "{object_id} is not a private working copy"
            )));
        }
        let ty = state.type_definition(&stored.type_id)?;
        validate_properties(ty, &request.properties, &Updatability::for_update(true))?;
        state.ensure_policies(&request.policies)?;

        let id = state.new_version(
            object_id,
            request.major,
            &request.properties,
            request.content.map(Some),
            request.comment,
            user,
        )?;
        let version = state.object_mut(&id)?;
        merge_aces(&mut version.acl, &request.add_aces, &request.remove_aces);
        version.policies.extend(request.policies);

        state.remove(object_id);
        info!(pwc_id = object_id, object_id = %id, major = request.major, "document checked in");
        Ok(id)
    }

    fn get_all_versions(
        &self,
        object_id: &str,
        context: &OperationContext,
    ) -> BindingResult<Vec<ObjectRecord>> {
        let state = self.read()?;
        let stored = state.object(object_id)?;
        let Some(series) = stored.series_id.as_ref().and_then(|s| state.series.get(s)) else {
            return Ok(vec![state.record(object_id, context)?]);
        };
        series
            .pwc
            .iter()
            .chain(series.versions.iter().rev())
            .map(|id| state.record(id, context))
            .collect()
    }

    fn get_acl(&self, object_id: &str, only_basic_permissions: bool) -> BindingResult<Acl> {
        let state = self.read()?;
        Ok(RepoState::acl_of(
            state.object(object_id)?,
            only_basic_permissions,
        ))
    }

    fn apply_acl(
        &self,
        object_id: &str,
        add: &[Ace],
        remove: &[Ace],
        propagation: Option<AclPropagation>,
    ) -> BindingResult<Acl> {
        let user = self.config.user.as_str();
        let mut state = self.write()?;
        let stored = state.object(object_id)?;
        if !state.type_definition(&stored.type_id)?.controllable_acl {
            return Err(BindingError::Constraint(format!(
                "type {} does not allow ACL changes",
                stored.type_id
            )));
        }

        let mut targets = vec![object_id.to_string()];
        if propagation == Some(AclPropagation::Propagate) && stored.base == BaseTypeId::Folder {
            targets.extend(state.descendants(object_id));
        }
        for target in &targets {
            merge_aces(&mut state.object_mut(target)?.acl, add, remove);
            state.touch(target, user);
            state.record_change(target, ChangeType::Security);
        }
        debug!(object_id, targets = targets.len(), "acl applied");
        Ok(RepoState::acl_of(state.object(object_id)?, false))
    }

    fn set_acl(&self, object_id: &str, aces: &[Ace]) -> BindingResult<Acl> {
        if !self.config.extended_acl {
            return Err(BindingError::NotSupported(format!("set acl on {object_id}")));
        }
        let user = self.config.user.as_str();
        let mut state = self.write()?;
        state.object_mut(object_id)?.acl = aces
            .iter()
            .map(|ace| Ace::new(ace.principal_id.clone(), ace.permissions.clone()))
            .collect();
        state.touch(object_id, user);
        state.record_change(object_id, ChangeType::Security);
        Ok(RepoState::acl_of(state.object(object_id)?, false))
    }

    fn apply_policy(&self, policy_id: &str, object_id: &str) -> BindingResult<()> {
        let user = self.config.user.as_str();
        let mut state = self.write()?;
        state.ensure_policies(&[policy_id.to_string()])?;
        let stored = state.object(object_id)?;
        if !state.type_definition(&stored.type_id)?.controllable_policy {
            return Err(BindingError::Constraint(format!(
                "type {} does not allow policies",
                stored.type_id
            )));
        }
        state
            .object_mut(object_id)?
            .policies
            .insert(policy_id.to_string());
        state.touch(object_id, user);
        state.record_change(object_id, ChangeType::Security);
        Ok(())
    }

    fn remove_policy(&self, policy_id: &str, object_id: &str) -> BindingResult<()> {
        let user = self.config.user.as_str();
        let mut state = self.write()?;
        if !state.object_mut(object_id)?.policies.remove(policy_id) {
            return Err(BindingError::Constraint(format!(
                "policy {policy_id} is not applied to {object_id}"
            )));
        }
        state.touch(object_id, user);
        state.record_change(object_id, ChangeType::Security);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> OperationContext {
        OperationContext::new()
    }

    fn create(
        repo: &InMemoryRepository,
        base: BaseTypeId,
        name: &str,
        folder: Option<&str>,
    ) -> String {
        repo.create_object(CreateObject {
            properties: vec![
                PropertyData::single(ids::OBJECT_TYPE_ID, base.as_str()),
                PropertyData::single(ids::NAME, name),
            ],
            folder_id: folder.map(str::to_string),
            ..CreateObject::default()
        })
        .unwrap()
    }

    fn setup() -> (InMemoryRepository, String) {
        let repo = InMemoryRepository::new();
        let root = repo.root_folder_id().unwrap();
        (repo, root)
    }

    // -----------------------------------------------------------------------
    // Objects and paths
    // -----------------------------------------------------------------------

    #[test]
    fn created_objects_resolve_by_id_and_path() {
        let (repo, root) = setup();
        let folder = create(&repo, BaseTypeId::Folder, "reports", Some(&root));
        let doc = create(&repo, BaseTypeId::Document, "q1.txt", Some(&folder));

        let by_path = repo.get_object_by_path("/reports/q1.txt", &all()).unwrap();
        assert_eq!(by_path.id(), Some(doc.as_str()));

        let folder_record = repo.get_object(&folder, &all()).unwrap();
        assert_eq!(folder_record.text(ids::PATH), Some("/reports"));
        assert_eq!(folder_record.text(ids::PARENT_ID), Some(root.as_str()));
        assert!(matches!(
            repo.get_object_by_path("/reports/missing", &all()),
            Err(BindingError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn sibling_names_must_be_unique() {
        let (repo, root) = setup();
        create(&repo, BaseTypeId::Folder, "a", Some(&root));
        let err = repo
            .create_object(CreateObject {
                properties: vec![
                    PropertyData::single(ids::OBJECT_TYPE_ID, "cmis:document"),
                    PropertyData::single(ids::NAME, "a"),
                ],
                folder_id: Some(root.clone()),
                ..CreateObject::default()
            })
            .unwrap_err();
        assert!(matches!(err, BindingError::NameConstraintViolation(_)));
    }

    #[test]
    fn filter_restricts_returned_properties() {
        let (repo, root) = setup();
        let doc = create(&repo, BaseTypeId::Document, "d", Some(&root));
        let context = OperationContext::minimal([ids::NAME]).unwrap();
        let record = repo.get_object(&doc, &context).unwrap();
        assert!(record.property(ids::NAME).is_some());
        assert!(record.property(ids::OBJECT_ID).is_some());
        assert!(record.property(ids::CREATED_BY).is_none());
        assert!(record.allowable_actions.is_none());
    }

    #[test]
    fn stale_change_token_is_an_update_conflict() {
        let (repo, root) = setup();
        let doc = create(&repo, BaseTypeId::Document, "d", Some(&root));
        let token = repo.get_object(&doc, &all()).unwrap().change_token().map(str::to_string);

        let updated = repo
            .update_properties(&doc, token.as_deref(), vec![PropertyData::single(ids::NAME, "e")])
            .unwrap();
        assert_eq!(updated.id, doc);
        assert_ne!(updated.change_token, token);

        let err = repo
            .update_properties(&doc, token.as_deref(), vec![PropertyData::single(ids::NAME, "f")])
            .unwrap_err();
        assert!(matches!(err, BindingError::UpdateConflict(_)));
    }

    #[test]
    fn read_only_properties_are_rejected() {
        let (repo, root) = setup();
        let doc = create(&repo, BaseTypeId::Document, "d", Some(&root));
        let err = repo
            .update_properties(&doc, None, vec![PropertyData::single(ids::CREATED_BY, "x")])
            .unwrap_err();
        assert!(matches!(err, BindingError::Constraint(_)));
    }

    // -----------------------------------------------------------------------
    // Versioning
    // -----------------------------------------------------------------------

    #[test]
    fn check_out_cancel_and_check_in() {
        let (repo, root) = setup();
        let doc = create(&repo, BaseTypeId::Document, "v.txt", Some(&root));

        let pwc = repo.check_out(&doc).unwrap();
        let record = repo.get_object(&doc, &all()).unwrap();
        assert_eq!(record.flag(ids::IS_VERSION_SERIES_CHECKED_OUT), Some(true));
        assert_eq!(record.text(ids::VERSION_SERIES_CHECKED_OUT_ID), Some(pwc.as_str()));
        assert!(matches!(repo.check_out(&doc), Err(BindingError::Constraint(_))));

        repo.cancel_check_out(&doc).unwrap();
        let record = repo.get_object(&doc, &all()).unwrap();
        assert_eq!(record.flag(ids::IS_VERSION_SERIES_CHECKED_OUT), Some(false));
        assert!(record.property(ids::VERSION_SERIES_CHECKED_OUT_ID).is_none());
        assert!(matches!(
            repo.get_object(&pwc, &all()),
            Err(BindingError::ObjectNotFound(_))
        ));

        let pwc = repo.check_out(&doc).unwrap();
        let new_version = repo
            .check_in(
                &pwc,
                CheckIn {
                    major: true,
                    comment: Some("second".to_string()),
                    ..CheckIn::default()
                },
            )
            .unwrap();
        let latest = repo.get_object(&new_version, &all()).unwrap();
        assert_eq!(latest.text(ids::VERSION_LABEL), Some("2.0"));
        assert_eq!(latest.flag(ids::IS_LATEST_VERSION), Some(true));
        assert_eq!(latest.text(ids::CHECKIN_COMMENT), Some("second"));
        let old = repo.get_object(&doc, &all()).unwrap();
        assert_eq!(old.flag(ids::IS_LATEST_VERSION), Some(false));

        let versions = repo.get_all_versions(&doc, &all()).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].id(), Some(new_version.as_str()));

        let children = repo.get_children(&root, &all(), 0, 10).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children.items[0].id(), Some(new_version.as_str()));
    }

    #[test]
    fn auto_versioning_creates_a_new_id() {
        let repo = InMemoryRepository::with_config(InMemoryConfig {
            auto_version_on_update: true,
            ..InMemoryConfig::default()
        });
        let root = repo.root_folder_id().unwrap();
        let doc = create(&repo, BaseTypeId::Document, "a", Some(&root));
        let updated = repo
            .update_properties(&doc, None, vec![PropertyData::single(ids::DESCRIPTION, "x")])
            .unwrap();
        assert_ne!(updated.id, doc);
        let record = repo.get_object(&updated.id, &all()).unwrap();
        assert_eq!(record.text(ids::VERSION_LABEL), Some("1.1"));
        assert_eq!(record.text(ids::DESCRIPTION), Some("x"));
    }

    #[test]
    fn version_labels_advance() {
        assert_eq!(next_version_label(Some("1.0"), false), "1.1");
        assert_eq!(next_version_label(Some("1.3"), true), "2.0");
        assert_eq!(next_version_label(None, true), "1.0");
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    #[test]
    fn non_empty_folders_and_held_objects_cannot_be_deleted() {
        let (repo, root) = setup();
        let folder = create(&repo, BaseTypeId::Folder, "f", Some(&root));
        let doc = create(&repo, BaseTypeId::Document, "d", Some(&folder));

        assert!(matches!(repo.delete_object(&folder, true), Err(BindingError::Constraint(_))));
        repo.place_hold(&doc).unwrap();
        assert!(matches!(repo.delete_object(&doc, true), Err(BindingError::Constraint(_))));

        assert!(repo.release_hold(&doc).unwrap());
        repo.delete_object(&doc, true).unwrap();
        repo.delete_object(&folder, true).unwrap();
        assert_eq!(repo.object_count().unwrap(), 1);
    }

    #[test]
    fn delete_tree_reports_what_stayed() {
        let (repo, root) = setup();
        let top = create(&repo, BaseTypeId::Folder, "top", Some(&root));
        let sub = create(&repo, BaseTypeId::Folder, "sub", Some(&top));
        let held = create(&repo, BaseTypeId::Document, "held", Some(&sub));
        create(&repo, BaseTypeId::Document, "free", Some(&top));
        repo.place_hold(&held).unwrap();

        let failed = repo
            .delete_tree(&top, true, UnfileObject::Delete, true)
            .unwrap();
        assert!(failed.contains(&held));
        assert!(failed.contains(&sub));
        assert!(failed.contains(&top));
        assert!(repo.get_object_by_path("/top/free", &all()).is_err());

        repo.release_hold(&held).unwrap();
        assert!(repo
            .delete_tree(&top, true, UnfileObject::Delete, true)
            .unwrap()
            .is_empty());
        assert_eq!(repo.object_count().unwrap(), 1);
    }

    // -----------------------------------------------------------------------
    // Content, acl, policies
    // -----------------------------------------------------------------------

    #[test]
    fn content_stream_lifecycle() {
        let (repo, root) = setup();
        let doc = create(&repo, BaseTypeId::Document, "c", Some(&root));
        assert_eq!(repo.get_content_stream(&doc, None).unwrap(), None);

        let stream = ContentStream::new("text/plain", b"hello".to_vec()).with_file_name("c.txt");
        repo.set_content_stream(&doc, true, None, stream.clone()).unwrap();
        assert_eq!(repo.get_content_stream(&doc, None).unwrap(), Some(stream.clone()));
        let record = repo.get_object(&doc, &all()).unwrap();
        assert_eq!(record.text(ids::CONTENT_STREAM_MIME_TYPE), Some("text/plain"));

        assert!(matches!(
            repo.set_content_stream(&doc, false, None, stream),
            Err(BindingError::Constraint(_))
        ));
        repo.delete_content_stream(&doc, None).unwrap();
        assert_eq!(repo.get_content_stream(&doc, None).unwrap(), None);
    }

    #[test]
    fn acl_merge_and_extended_acl_gate() {
        let (repo, root) = setup();
        let doc = create(&repo, BaseTypeId::Document, "a", Some(&root));
        let acl = repo
            .apply_acl(&doc, &[Ace::new("alice", ["cmis:read", "cmis:write"])], &[], None)
            .unwrap();
        assert_eq!(acl.permissions_for("alice").len(), 2);

        let acl = repo
            .apply_acl(&doc, &[], &[Ace::new("alice", ["cmis:write"])], None)
            .unwrap();
        assert_eq!(acl.permissions_for("alice"), vec!["cmis:read"]);

        assert!(matches!(repo.set_acl(&doc, &[]), Err(BindingError::NotSupported(_))));
    }

    #[test]
    fn policies_apply_and_remove() {
        let (repo, root) = setup();
        let doc = create(&repo, BaseTypeId::Document, "a", Some(&root));
        let policy = create(&repo, BaseTypeId::Policy, "retain", Some(&root));

        repo.apply_policy(&policy, &doc).unwrap();
        let mut context = all();
        context.set_include_policies(true);
        let record = repo.get_object(&doc, &context).unwrap();
        assert_eq!(record.policy_ids, Some(vec![policy.clone()]));

        repo.remove_policy(&policy, &doc).unwrap();
        assert!(matches!(repo.remove_policy(&policy, &doc), Err(BindingError::Constraint(_))));
        assert!(matches!(
            repo.apply_policy(&doc, &doc),
            Err(BindingError::InvalidArgument(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Listings
    // -----------------------------------------------------------------------

    #[test]
    fn children_are_paged_by_name() {
        let (repo, root) = setup();
        for name in ["c", "a", "b"] {
            create(&repo, BaseTypeId::Document, name, Some(&root));
        }
        let page = repo.get_children(&root, &all(), 1, 1).unwrap();
        assert_eq!(page.total_num_items, Some(3));
        assert!(page.has_more_items);
        assert_eq!(page.items[0].text(ids::NAME), Some("b"));
    }

    #[test]
    fn query_matches_type_and_name() {
        let (repo, root) = setup();
        create(&repo, BaseTypeId::Document, "x", Some(&root));
        create(&repo, BaseTypeId::Document, "y", Some(&root));
        create(&repo, BaseTypeId::Folder, "x-folder", Some(&root));

        let hits = repo
            .query("SELECT * FROM cmis:document", false, &all(), 0, 10)
            .unwrap();
        assert_eq!(hits.len(), 2);
        let hits = repo
            .query("select * from cmis:document where cmis:name = 'y'", false, &all(), 0, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(matches!(
            repo.query("DELETE FROM x", false, &all(), 0, 10),
            Err(BindingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn relationships_by_direction() {
        let (repo, root) = setup();
        let a = create(&repo, BaseTypeId::Document, "a", Some(&root));
        let b = create(&repo, BaseTypeId::Document, "b", Some(&root));
        repo.create_object(CreateObject {
            properties: vec![
                PropertyData::single(ids::OBJECT_TYPE_ID, "cmis:relationship"),
                PropertyData::single(ids::SOURCE_ID, a.as_str()),
                PropertyData::single(ids::TARGET_ID, b.as_str()),
            ],
            ..CreateObject::default()
        })
        .unwrap();

        let source = repo
            .get_object_relationships(&a, RelationshipDirection::Source, None, &all(), 0, 10)
            .unwrap();
        assert_eq!(source.len(), 1);
        let target = repo
            .get_object_relationships(&a, RelationshipDirection::Target, None, &all(), 0, 10)
            .unwrap();
        assert!(target.is_empty());
    }

    #[test]
    fn change_log_pages_repeat_the_last_item() {
        let (repo, root) = setup();
        for name in ["a", "b", "c", "d"] {
            create(&repo, BaseTypeId::Document, name, Some(&root));
        }
        let first = repo
            .get_content_changes(&ChangeCursor::Start(None), false, 2)
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.has_more_items);
        assert_eq!(first.latest_token.as_deref(), Some("1"));

        let second = repo
            .get_content_changes(&ChangeCursor::Token("1".to_string()), false, 2)
            .unwrap();
        assert_eq!(second.items[0], first.items[1]);
        assert_eq!(
            repo.repository_info().unwrap().latest_change_log_token.as_deref(),
            Some("3")
        );
    }

    // -----------------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------------

    #[test]
    fn type_mutation_depends_on_cmis_version() {
        let base = TypeDefinition::base(BaseTypeId::Document);
        let invoice = TypeDefinition::derive("acme:invoice", &base);

        let old = InMemoryRepository::with_config(InMemoryConfig {
            cmis_version: CmisVersion::V1_0,
            ..InMemoryConfig::default()
        });
        assert!(matches!(old.create_type(&invoice), Err(BindingError::NotSupported(_))));

        let repo = InMemoryRepository::new();
        repo.create_type(&invoice).unwrap();
        assert_eq!(repo.type_definition("acme:invoice").unwrap().id, "acme:invoice");
        assert!(matches!(repo.create_type(&invoice), Err(BindingError::Constraint(_))));
        repo.delete_type("acme:invoice").unwrap();
        assert!(matches!(
            repo.delete_type("cmis:document"),
            Err(BindingError::Constraint(_))
        ));
    }
}
