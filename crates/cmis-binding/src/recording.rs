//! A [`RepositoryService`] decorator that records every call.
//!
//! Tests wrap a repository in [`RecordingService`] to assert how many
//! round-trips an operation made and which change tokens it sent. A call
//! can also be scripted to fail, to exercise error paths that the wrapped
//! repository never takes on its own.

use cmis_paging::{ChangeCursor, ChangePage, Page};
use cmis_types::{
    Ace, Acl, AclPropagation, ContentStream, ObjectRecord, OperationContext, PropertyData,
    RepositoryInfo, TypeDefinition,
};
use parking_lot::Mutex;

use crate::error::{BindingError, BindingResult};
use crate::traits::RepositoryService;
use crate::types::{CheckIn, CreateObject, RelationshipDirection, UnfileObject, UpdatedObject};

/// Repository operation names, one per trait method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    RepositoryInfo,
    TypeDefinition,
    CreateType,
    UpdateType,
    DeleteType,
    GetObject,
    GetObjectByPath,
    GetFolderParent,
    GetChildren,
    GetCheckedOutDocs,
    GetObjectRelationships,
    Query,
    GetContentChanges,
    CreateObject,
    UpdateProperties,
    DeleteObject,
    DeleteTree,
    GetContentStream,
    SetContentStream,
    DeleteContentStream,
    CheckOut,
    CancelCheckOut,
    CheckIn,
    GetAllVersions,
    GetAcl,
    ApplyAcl,
    SetAcl,
    ApplyPolicy,
    RemovePolicy,
    ClearCaches,
}

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceCall {
    pub operation: Operation,
    /// Object, folder, path or type the call addressed.
    pub target: Option<String>,
    /// Change token sent with a write.
    pub change_token: Option<String>,
}

/// Wraps a service and records each call before delegating it.
#[derive(Debug)]
pub struct RecordingService<S> {
    inner: S,
    calls: Mutex<Vec<ServiceCall>>,
    failures: Mutex<Vec<ScriptedFailure>>,
}

#[derive(Debug)]
struct ScriptedFailure {
    operation: Operation,
    /// Calls still let through before the failure fires.
    remaining: usize,
}

impl<S: RepositoryService> RecordingService<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    /// Number of calls of one operation.
    pub fn count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    pub fn total(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Let `after` more calls of `operation` through, then fail the next
    /// one with [`BindingError::Runtime`] without reaching the wrapped
    /// service. Each scripted failure fires once.
    pub fn fail_after(&self, operation: Operation, after: usize) {
        self.failures.lock().push(ScriptedFailure {
            operation,
            remaining: after,
        });
    }

    fn record(
        &self,
        operation: Operation,
        target: Option<&str>,
        change_token: Option<&str>,
    ) -> BindingResult<()> {
        self.calls.lock().push(ServiceCall {
            operation,
            target: target.map(str::to_string),
            change_token: change_token.map(str::to_string),
        });
        let mut failures = self.failures.lock();
        let Some(index) = failures.iter().position(|f| f.operation == operation) else {
            return Ok(());
        };
        if failures[index].remaining > 0 {
            failures[index].remaining -= 1;
            return Ok(());
        }
        failures.remove(index);
        Err(BindingError::Runtime(format!(
            "scripted failure of {operation:?}"
        )))
    }
}

impl<S: RepositoryService> RepositoryService for RecordingService<S> {
    fn repository_info(&self) -> BindingResult<RepositoryInfo> {
        self.record(Operation::RepositoryInfo, None, None)?;
        self.inner.repository_info()
    }

    fn type_definition(&self, type_id: &str) -> BindingResult<TypeDefinition> {
        self.record(Operation::TypeDefinition, Some(type_id), None)?;
        self.inner.type_definition(type_id)
    }

    fn create_type(&self, definition: &TypeDefinition) -> BindingResult<TypeDefinition> {
        self.record(Operation::CreateType, Some(&definition.id), None)?;
        self.inner.create_type(definition)
    }

    fn update_type(&self, definition: &TypeDefinition) -> BindingResult<TypeDefinition> {
        self.record(Operation::UpdateType, Some(&definition.id), None)?;
        self.inner.update_type(definition)
    }

    fn delete_type(&self, type_id: &str) -> BindingResult<()> {
        self.record(Operation::DeleteType, Some(type_id), None)?;
        self.inner.delete_type(type_id)
    }

    fn get_object(
        &self,
        object_id: &str,
        context: &OperationContext,
    ) -> BindingResult<ObjectRecord> {
        self.record(Operation::GetObject, Some(object_id), None)?;
        self.inner.get_object(object_id, context)
    }

    fn get_object_by_path(
        &self,
        path: &str,
        context: &OperationContext,
    ) -> BindingResult<ObjectRecord> {
        self.record(Operation::GetObjectByPath, Some(path), None)?;
        self.inner.get_object_by_path(path, context)
    }

    fn get_folder_parent(
        &self,
        folder_id: &str,
        context: &OperationContext,
    ) -> BindingResult<ObjectRecord> {
        self.record(Operation::GetFolderParent, Some(folder_id), None)?;
        self.inner.get_folder_parent(folder_id, context)
    }

    fn get_children(
        &self,
        folder_id: &str,
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>> {
        self.record(Operation::GetChildren, Some(folder_id), None)?;
        self.inner
            .get_children(folder_id, context, skip_count, max_items)
    }

    fn get_checked_out_docs(
        &self,
        folder_id: Option<&str>,
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>> {
        self.record(Operation::GetCheckedOutDocs, folder_id, None)?;
        self.inner
            .get_checked_out_docs(folder_id, context, skip_count, max_items)
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
        self.record(Operation::GetObjectRelationships, Some(object_id), None)?;
        self.inner.get_object_relationships(
            object_id, direction, type_id, context, skip_count, max_items,
        )
    }

    fn query(
        &self,
        statement: &str,
        search_all_versions: bool,
        context: &OperationContext,
        skip_count: u64,
        max_items: u64,
    ) -> BindingResult<Page<ObjectRecord>> {
        self.record(Operation::Query, Some(statement), None)?;
        self.inner
            .query(statement, search_all_versions, context, skip_count, max_items)
    }

    fn get_content_changes(
        &self,
        cursor: &ChangeCursor,
        include_properties: bool,
        max_items: u64,
    ) -> BindingResult<ChangePage<ObjectRecord>> {
        self.record(Operation::GetContentChanges, None, None)?;
        self.inner
            .get_content_changes(cursor, include_properties, max_items)
    }

    fn create_object(&self, request: CreateObject) -> BindingResult<String> {
        self.record(Operation::CreateObject, request.folder_id.as_deref(), None)?;
        self.inner.create_object(request)
    }

    fn update_properties(
        &self,
        object_id: &str,
        change_token: Option<&str>,
        properties: Vec<PropertyData>,
    ) -> BindingResult<UpdatedObject> {
        self.record(Operation::UpdateProperties, Some(object_id), change_token)?;
        self.inner
            .update_properties(object_id, change_token, properties)
    }

    fn delete_object(&self, object_id: &str, all_versions: bool) -> BindingResult<()> {
        self.record(Operation::DeleteObject, Some(object_id), None)?;
        self.inner.delete_object(object_id, all_versions)
    }

    fn delete_tree(
        &self,
        folder_id: &str,
        all_versions: bool,
        unfile: UnfileObject,
        continue_on_failure: bool,
    ) -> BindingResult<Vec<String>> {
        self.record(Operation::DeleteTree, Some(folder_id), None)?;
        self.inner
            .delete_tree(folder_id, all_versions, unfile, continue_on_failure)
    }

    fn get_content_stream(
        &self,
        object_id: &str,
        stream_id: Option<&str>,
    ) -> BindingResult<Option<ContentStream>> {
        self.record(Operation::GetContentStream, Some(object_id), None)?;
        self.inner.get_content_stream(object_id, stream_id)
    }

    fn set_content_stream(
        &self,
        object_id: &str,
        overwrite: bool,
        change_token: Option<&str>,
        content: ContentStream,
    ) -> BindingResult<UpdatedObject> {
        self.record(Operation::SetContentStream, Some(object_id), change_token)?;
        self.inner
            .set_content_stream(object_id, overwrite, change_token, content)
    }

    fn delete_content_stream(
        &self,
        object_id: &str,
        change_token: Option<&str>,
    ) -> BindingResult<UpdatedObject> {
        self.record(Operation::DeleteContentStream, Some(object_id), change_token)?;
        self.inner.delete_content_stream(object_id, change_token)
    }

    fn check_out(&self, object_id: &str) -> BindingResult<String> {
        self.record(Operation::CheckOut, Some(object_id), None)?;
        self.inner.check_out(object_id)
    }

    fn cancel_check_out(&self, object_id: &str) -> BindingResult<()> {
        self.record(Operation::CancelCheckOut, Some(object_id), None)?;
        self.inner.cancel_check_out(object_id)
    }

    fn check_in(&self, object_id: &str, request: CheckIn) -> BindingResult<String> {
        self.record(Operation::CheckIn, Some(object_id), None)?;
        self.inner.check_in(object_id, request)
    }

    fn get_all_versions(
        &self,
        object_id: &str,
        context: &OperationContext,
    ) -> BindingResult<Vec<ObjectRecord>> {
        self.record(Operation::GetAllVersions, Some(object_id), None)?;
        self.inner.get_all_versions(object_id, context)
    }

    fn get_acl(&self, object_id: &str, only_basic_permissions: bool) -> BindingResult<Acl> {
        self.record(Operation::GetAcl, Some(object_id), None)?;
        self.inner.get_acl(object_id, only_basic_permissions)
    }

    fn apply_acl(
        &self,
        object_id: &str,
        add: &[Ace],
        remove: &[Ace],
        propagation: Option<AclPropagation>,
    ) -> BindingResult<Acl> {
        self.record(Operation::ApplyAcl, Some(object_id), None)?;
        self.inner.apply_acl(object_id, add, remove, propagation)
    }

    fn set_acl(&self, object_id: &str, aces: &[Ace]) -> BindingResult<Acl> {
        self.record(Operation::SetAcl, Some(object_id), None)?;
        self.inner.set_acl(object_id, aces)
    }

    fn apply_policy(&self, policy_id: &str, object_id: &str) -> BindingResult<()> {
        self.record(Operation::ApplyPolicy, Some(object_id), None)?;
        self.inner.apply_policy(policy_id, object_id)
    }

    fn remove_policy(&self, policy_id: &str, object_id: &str) -> BindingResult<()> {
        self.record(Operation::RemovePolicy, Some(object_id), None)?;
        self.inner.remove_policy(policy_id, object_id)
    }

    fn clear_caches(&self) {
        if self.record(Operation::ClearCaches, None, None).is_err() {
            return;
        }
        self.inner.clear_caches();
    }
}
