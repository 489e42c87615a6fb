use cmis_binding::{UnfileObject, VersioningState};
use cmis_paging::ItemIterable;
use cmis_types::{property_ids as ids, ContentStream, ObjectId, OperationContext, PropertyData};
use tracing::{info, warn};

use crate::error::{ClientError, ClientResult};
use crate::object::{Document, Entity};

object_view!(
    /// A folder in the repository hierarchy.
    Folder
);

impl Folder {
    pub fn path(&self) -> Option<String> {
        self.text(ids::PATH)
    }

    pub fn parent_id(&self) -> Option<ObjectId> {
        self.text(ids::PARENT_ID).map(ObjectId::from)
    }

    pub fn allowed_child_object_type_ids(&self) -> Vec<String> {
        self.property(ids::ALLOWED_CHILD_OBJECT_TYPE_IDS)
            .map(|p| {
                p.values()
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_root_folder(&self) -> bool {
        self.session()
            .map(|session| session.repository_info().root_folder_id == self.id().as_str())
            .unwrap_or(false)
    }

    /// The parent folder; `None` for the root.
    pub fn parent(&self) -> ClientResult<Option<Folder>> {
        if self.is_root_folder() {
            return Ok(None);
        }
        let session = self.session()?;
        let record = session
            .service()
            .get_folder_parent(self.id().as_str(), self.creation_context())?;
        let parent = session
            .factory()
            .convert_object(&session, record, self.creation_context())?
            .into_folder()?;
        Ok(Some(parent))
    }

    /// Lazily paged children, in the order `context` asks for.
    pub fn children(
        &self,
        context: &OperationContext,
    ) -> ClientResult<ItemIterable<Entity, ClientError>> {
        Ok(self.session()?.children(self.id().clone(), context))
    }

    /// Private working copies whose documents live in this folder.
    pub fn checked_out_docs(
        &self,
        context: &OperationContext,
    ) -> ClientResult<ItemIterable<Document, ClientError>> {
        Ok(self
            .session()?
            .checked_out_iterable(Some(self.id().clone()), context))
    }

    pub fn create_document(
        &self,
        properties: Vec<PropertyData>,
        content: Option<ContentStream>,
        versioning_state: VersioningState,
    ) -> ClientResult<ObjectId> {
        self.session()?
            .create_document(properties, Some(self.id()), content, versioning_state)
    }

    pub fn create_folder(&self, properties: Vec<PropertyData>) -> ClientResult<ObjectId> {
        self.session()?.create_folder(properties, self.id())
    }

    /// Delete the folder and everything below it. Returns the ids the
    /// repository could not delete.
    ///
    /// Descendants are not known locally, so the whole object cache is
    /// dropped.
    pub fn delete_tree(
        &self,
        all_versions: bool,
        unfile: UnfileObject,
        continue_on_failure: bool,
    ) -> ClientResult<Vec<ObjectId>> {
        let session = self.session()?;
        let failed = session.service().delete_tree(
            self.id().as_str(),
            all_versions,
            unfile,
            continue_on_failure,
        )?;
        session.clear_object_cache();
        if failed.is_empty() {
            info!(folder_id = %self.id(), "folder tree deleted");
        } else {
            warn!(folder_id = %self.id(), failed = failed.len(), "folder tree partially deleted");
        }
        Ok(failed.into_iter().map(ObjectId::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cmis_binding::{InMemoryRepository, Operation, RecordingService};

    use crate::config::SessionConfig;
    use crate::session::Session;

    use super::*;

    fn setup() -> (Arc<RecordingService<InMemoryRepository>>, Session, Folder) {
        let service = Arc::new(RecordingService::new(InMemoryRepository::new()));
        let session = Session::connect(SessionConfig::default(), service.clone()).unwrap();
        let root = session.root_folder().unwrap();
        let id = root.create_folder(folder_props("projects")).unwrap();
        let folder = session.get_object(&id).unwrap().into_folder().unwrap();
        (service, session, folder)
    }

    fn folder_props(name: &str) -> Vec<PropertyData> {
        vec![
            PropertyData::single(ids::OBJECT_TYPE_ID, "cmis:folder"),
            PropertyData::single(ids::NAME, name),
        ]
    }

    fn doc_props(name: &str) -> Vec<PropertyData> {
        vec![
            PropertyData::single(ids::OBJECT_TYPE_ID, "cmis:document"),
            PropertyData::single(ids::NAME, name),
        ]
    }

    #[test]
    fn path_parent_and_root() {
        let (_, session, folder) = setup();
        assert_eq!(folder.path().as_deref(), Some("/projects"));
        assert!(!folder.is_root_folder());

        let root = folder.parent().unwrap().unwrap();
        assert!(root.is_root_folder());
        assert_eq!(root.id().as_str(), session.repository_info().root_folder_id);
        assert!(root.parent().unwrap().is_none());
        assert_eq!(folder.parent_id().as_ref(), Some(root.id()));
    }

    #[test]
    fn children_are_paged_lazily() {
        let (service, _session, folder) = setup();
        for name in ["c", "a", "b", "d", "e"] {
            folder
                .create_document(doc_props(name), None, VersioningState::Major)
                .unwrap();
        }
        let mut context = OperationContext::new();
        context.set_max_items_per_page(2).unwrap();

        service.clear();
        let children = folder.children(&context).unwrap();
        assert_eq!(service.total(), 0);

        let names: Vec<_> = children
            .iter()
            .map(|child| child.unwrap().name().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(service.count(Operation::GetChildren), 3);

        let tail: Vec<_> = children
            .skip_to(3)
            .iter()
            .map(|child| child.unwrap().name().unwrap())
            .collect();
        assert_eq!(tail, vec!["d", "e"]);
    }

    proptest::proptest! {
        #[test]
        fn any_page_size_yields_the_same_children(count in 0usize..12, page_size in 1u64..6) {
            let (_service, _session, folder) = setup();
            for i in 0..count {
                folder
                    .create_document(doc_props(&format!("d{i:02}")), None, VersioningState::Major)
                    .unwrap();
            }
            let mut context = OperationContext::new();
            context.set_max_items_per_page(page_size).unwrap();
            let children = folder.children(&context).unwrap();

            let names: Vec<_> = children
                .iter()
                .map(|child| child.unwrap().name().unwrap())
                .collect();
            let expected: Vec<_> = (0..count).map(|i| format!("d{i:02}")).collect();
            proptest::prop_assert_eq!(&names, &expected);

            let skip = count / 2;
            let page = children.skip_to(skip as u64).get_page(page_size).unwrap();
            let paged: Vec<_> = page.items.iter().map(|c| c.name().unwrap()).collect();
            let end = (skip + page_size as usize).min(count);
            proptest::prop_assert_eq!(&paged[..], &expected[skip..end]);
        }
    }

    #[test]
    fn checked_out_docs_are_scoped_to_the_folder() {
        let (_, session, folder) = setup();
        let id = folder
            .create_document(doc_props("inside"), None, VersioningState::CheckedOut)
            .unwrap();
        session
            .root_folder()
            .unwrap()
            .create_document(doc_props("outside"), None, VersioningState::CheckedOut)
            .unwrap();

        let context = session.default_context();
        let pwcs: Vec<_> = folder
            .checked_out_docs(&context)
            .unwrap()
            .iter()
            .map(|doc| doc.unwrap().id().clone())
            .collect();
        assert_eq!(pwcs, vec![id]);
        assert_eq!(session.checked_out_docs(&context).iter().count(), 2);
    }

    #[test]
    fn delete_tree_clears_the_cache() {
        let (_, session, folder) = setup();
        let sub = folder.create_folder(folder_props("sub")).unwrap();
        session.get_object(&sub).unwrap();
        assert!(session.cache_stats().objects > 0);

        let failed = folder
            .delete_tree(true, UnfileObject::Delete, true)
            .unwrap();
        assert!(failed.is_empty());
        assert_eq!(session.cache_stats().objects, 0);
        assert!(session.get_object(&sub).unwrap_err().is_not_found());
    }
}
