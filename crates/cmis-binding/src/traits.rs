//! The [`RepositoryService`] trait: the boundary between the client and a
//! repository.
//!
//! The client calls these operations and never looks behind them. A binding
//! (HTTP, web services, or the in-memory repository in this crate) decides
//! how each call reaches the repository.

use cmis_paging::{ChangeCursor, ChangePage, Page};
use cmis_types::{
    Ace, Acl, AclPropagation, ContentStream, ObjectRecord, OperationContext, PropertyData,
    RepositoryInfo, TypeDefinition,
};

use crate::error::{BindingError, BindingResult};
use crate::types::{CheckIn, CreateObject, RelationshipDirection, UnfileObject, UpdatedObject};

/// Operations a repository exposes to the client.
///
/// Implementations must be thread-safe (`Send + Sync`); a session shares one
/// service between every object it hands out. Listing operations take a
/// `skip_count` and `max_items` and return one [`Page`].
pub trait RepositoryService: Send + Sync {
    // -- repository and types ---------------------------------------------

    fn repository_info(&self) -> BindingResult<RepositoryInfo>;

    /// Fetch a type definition by id.
    fn type_definition(&self, type_id: &str) -> BindingResult<TypeDefinition>;

    /// Register a new type. Only repositories speaking CMIS 1.1 support this.
    fn create_type(&self, definition: &TypeDefinition) -> BindingResult<TypeDefinition> {
        Err(BindingError::NotSupported(format!(
            "create type {}",
            definition.id
        )))
    }

    fn update_type(&self, definition: &TypeDefinition) -> BindingResult<TypeDefinition> {
        Err(BindingError::NotSupported(format!(
            "update type {}",
            definition.id
        )))
    }

    fn delete_type(&self, type_id: &str) -> BindingResult<()> {
        Err(BindingError::NotSupported(format!("delete type {type_id}")))
    }

    // -- reads -------------------------------------------------------------

    /// Fetch one object, shaped by `context`.
    fn get_object(&self, object_id: &str, context: &OperationContext)
        -> BindingResult<ObjectRecord>;

    fn get_object_by_path(&self, path: &str, context: &OperationContext)
        -> BindingResult<ObjectRecord>;

    /// The folder containing `folder_id`. Fails for the root folder.
    fn get_folder_parent(&self, folder_id: &str, context: &OperationContext)
        -> BindingResult<ObjectRecord>;

    fn get_children(
        &self,
        folder_id: &str,
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>>;

    /// Private working copies, optionally restricted to one folder.
    fn get_checked_out_docs(
        &self,
        folder_id: Option<&str>,
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>>;

    fn get_object_relationships(
        &self,
        object_id: &str,
        direction: RelationshipDirection,
        type_id: Option<&str>,
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>>;

    fn query(
        &self,
        statement: &str,
        search_all_versions: bool,
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>>;

    /// One page of the change log, continuing from `cursor`.
    fn get_content_changes(
        &self,
        cursor: &ChangeCursor,
        include_properties: bool,
        max_items: u64,
    ) -> BindingResult<ChangePage<ObjectRecord>>;

    // -- writes ------------------------------------------------------------

    /// Create an object and return its id.
    fn create_object(&self, request: CreateObject) -> BindingResult<String>;

    /// Update properties. A stale `change_token` fails with
    /// [`BindingError::UpdateConflict`].
    fn update_properties(
        &self,
        object_id: &str,
        change_token: Option<&str>,
        properties: Vec<PropertyData>,
    ) -> BindingResult<UpdatedObject>;

    fn delete_object(&self, object_id: &str, all_versions: bool) -> BindingResult<()>;

    /// Delete a folder and everything below it. Returns the ids that could
    /// not be deleted.
    fn delete_tree(
        &self,
        folder_id: &str,
        all_versions: bool,
        unfile: UnfileObject,
        continue_on_failure: bool,
    ) -> BindingResult<Vec<String>>;

    // -- content -----------------------------------------------------------

    /// The content stream, or `None` when the object has none.
    fn get_content_stream(
        &self,
        object_id: &str,
        stream_id: Option<&str>,
    ) -> BindingResult<Option<ContentStream>>;

    fn set_content_stream(
        &self,
        object_id: &str,
        overwrite: bool,
        change_token: Option<&str>,
        content: ContentStream,
    ) -> BindingResult<UpdatedObject>;

    fn delete_content_stream(
        &self,
        object_id: &str,
        change_token: Option<&str>,
    ) -> BindingResult<UpdatedObject>;

    // -- versioning --------------------------------------------------------

    /// Check out a document and return the private working copy id.
    fn check_out(&self, object_id: &str) -> BindingResult<String>;

    fn cancel_check_out(&self, object_id: &str) -> BindingResult<()>;

    /// Check in a private working copy and return the new version id.
    fn check_in(&self, object_id: &str, request: CheckIn) -> BindingResult<String>;

    /// Every version of the series `object_id` belongs to, newest first.
    fn get_all_versions(&self, object_id: &str, context: &OperationContext)
        -> BindingResult<Vec<ObjectRecord>>;

    // -- acl and policies --------------------------------------------------

    fn get_acl(&self, object_id: &str, only_basic_permissions: bool) -> BindingResult<Acl>;

    fn apply_acl(
        &self,
        object_id: &str,
        add: &[Ace],
        remove: &[Ace],
        propagation: Option<AclPropagation>,
    ) -> BindingResult<Acl>;

    /// Replace the direct ACL in one call. Needs the extended ACL capability.
    fn set_acl(&self, object_id: &str, aces: &[Ace]) -> BindingResult<Acl> {
        let _ = aces;
        Err(BindingError::NotSupported(format!("set acl on {object_id}")))
    }

    fn apply_policy(&self, policy_id: &str, object_id: &str) -> BindingResult<()>;

    fn remove_policy(&self, policy_id: &str, object_id: &str) -> BindingResult<()>;

    /// Drop whatever the binding caches. Called by `Session::clear`.
    fn clear_caches(&self) {}
}
