use cmis_binding::{BindingError, CheckIn};
use cmis_types::{property_ids as ids, ContentStream, ObjectId, Updatability};
use tracing::{debug, info};

use crate::error::ClientResult;

object_view!(
    /// A document: content plus version-series state.
    Document
);

impl Document {
    // ---------------------------------------------------------------
    // Version properties
    // ---------------------------------------------------------------

    pub fn version_label(&self) -> Option<String> {
        self.text(ids::VERSION_LABEL)
    }

    pub fn version_series_id(&self) -> Option<ObjectId> {
        self.text(ids::VERSION_SERIES_ID).map(ObjectId::from)
    }

    pub fn is_latest_version(&self) -> bool {
        self.flag(ids::IS_LATEST_VERSION).unwrap_or(false)
    }

    pub fn is_major_version(&self) -> bool {
        self.flag(ids::IS_MAJOR_VERSION).unwrap_or(false)
    }

    pub fn is_private_working_copy(&self) -> bool {
        self.flag(ids::IS_PRIVATE_WORKING_COPY).unwrap_or(false)
    }

    pub fn is_version_series_checked_out(&self) -> bool {
        self.flag(ids::IS_VERSION_SERIES_CHECKED_OUT)
            .unwrap_or(false)
    }

    pub fn version_series_checked_out_id(&self) -> Option<ObjectId> {
        self.text(ids::VERSION_SERIES_CHECKED_OUT_ID)
            .map(ObjectId::from)
    }

    pub fn version_series_checked_out_by(&self) -> Option<String> {
        self.text(ids::VERSION_SERIES_CHECKED_OUT_BY)
    }

    pub fn checkin_comment(&self) -> Option<String> {
        self.text(ids::CHECKIN_COMMENT)
    }

    // ---------------------------------------------------------------
    // Content
    // ---------------------------------------------------------------

    pub fn content_stream_length(&self) -> Option<u64> {
        self.property_value(ids::CONTENT_STREAM_LENGTH)
            .and_then(|v| v.as_integer().and_then(|n| u64::try_from(n).ok()))
    }

    pub fn content_stream_mime_type(&self) -> Option<String> {
        self.text(ids::CONTENT_STREAM_MIME_TYPE)
    }

    pub fn content_stream_file_name(&self) -> Option<String> {
        self.text(ids::CONTENT_STREAM_FILE_NAME)
    }

    /// The main content stream, or `None` if the document has none.
    pub fn content_stream(&self) -> ClientResult<Option<ContentStream>> {
        self.fetch_content(None)
    }

    /// A rendition or other secondary stream.
    pub fn content_stream_by_id(&self, stream_id: &str) -> ClientResult<Option<ContentStream>> {
        self.fetch_content(Some(stream_id))
    }

    fn fetch_content(&self, stream_id: Option<&str>) -> ClientResult<Option<ContentStream>> {
        let session = self.session()?;
        match session
            .service()
            .get_content_stream(self.id().as_str(), stream_id)
        {
            Ok(content) => Ok(content),
            // some repositories signal a missing stream as a constraint
            Err(BindingError::Constraint(reason)) => {
                debug!(object_id = %self.id(), reason = %reason, "no content stream");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Upload content using this snapshot's change token. Returns the id
    /// the repository reports, which may be a new version.
    pub fn set_content_stream(
        &self,
        content: ContentStream,
        overwrite: bool,
        refresh: bool,
    ) -> ClientResult<ObjectId> {
        let session = self.session()?;
        let token = self.change_token();
        let updated = session.service().set_content_stream(
            self.id().as_str(),
            overwrite,
            token.as_deref(),
            content,
        )?;
        session.remove_object_from_cache(self.id());
        if refresh {
            self.refresh()?;
        }
        Ok(ObjectId::from(updated.id))
    }

    pub fn delete_content_stream(&self, refresh: bool) -> ClientResult<ObjectId> {
        let session = self.session()?;
        let token = self.change_token();
        let updated = session
            .service()
            .delete_content_stream(self.id().as_str(), token.as_deref())?;
        session.remove_object_from_cache(self.id());
        if refresh {
            self.refresh()?;
        }
        Ok(ObjectId::from(updated.id))
    }

    // ---------------------------------------------------------------
    // Versioning
    // ---------------------------------------------------------------

    /// Check the document out. Returns the private working copy's id.
    pub fn check_out(&self) -> ClientResult<ObjectId> {
        let session = self.session()?;
        let pwc_id = session.service().check_out(self.id().as_str())?;
        session.remove_object_from_cache(self.id());
        info!(object_id = %self.id(), pwc_id = %pwc_id, "checked out");
        Ok(ObjectId::from(pwc_id))
    }

    /// Discard the private working copy. Works on the working copy itself or
    /// on any version of a checked-out series.
    pub fn cancel_check_out(&self) -> ClientResult<()> {
        let session = self.session()?;
        session.service().cancel_check_out(self.id().as_str())?;
        session.remove_object_from_cache(self.id());
        if let Some(pwc_id) = self.version_series_checked_out_id() {
            session.remove_object_from_cache(&pwc_id);
        }
        Ok(())
    }

    /// Check in this private working copy as a new version. Properties are
    /// validated locally as for a checked-out document.
    pub fn check_in(&self, request: CheckIn) -> ClientResult<ObjectId> {
        let session = self.session()?;
        if !request.properties.is_empty() {
            session.factory().convert_properties_for_update(
                &self.object_type(),
                &request.properties,
                &Updatability::for_update(true),
            )?;
        }
        let major = request.major;
        let id = session.service().check_in(self.id().as_str(), request)?;
        session.remove_object_from_cache(self.id());
        info!(pwc_id = %self.id(), object_id = %id, major, "checked in");
        Ok(ObjectId::from(id))
    }

    /// Every version of the series, newest first. A working copy, if any,
    /// comes first.
    pub fn all_versions(&self) -> ClientResult<Vec<Document>> {
        let session = self.session()?;
        let context = self.creation_context();
        session
            .service()
            .get_all_versions(self.id().as_str(), context)?
            .into_iter()
            .map(|record| {
                session
                    .factory()
                    .convert_object(&session, record, context)?
                    .into_document()
            })
            .collect()
    }

    /// The latest version, or the latest major version with `major`.
    pub fn latest_version(&self, major: bool) -> ClientResult<Document> {
        self.all_versions()?
            .into_iter()
            .filter(|doc| !doc.is_private_working_copy())
            .find(|doc| if major { doc.is_major_version() } else { doc.is_latest_version() })
            .ok_or_else(|| {
                BindingError::ObjectNotFound(format!("latest version of {}", self.id())).into()
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cmis_binding::{
        InMemoryConfig, InMemoryRepository, Operation, RecordingService, RepositoryService,
        VersioningState,
    };
    use cmis_types::PropertyData;

    use crate::config::SessionConfig;
    use crate::error::ClientError;
    use crate::session::Session;

    use super::*;

    fn setup() -> (Arc<RecordingService<InMemoryRepository>>, Session, Document) {
        let service = Arc::new(RecordingService::new(InMemoryRepository::new()));
        let session = Session::connect(SessionConfig::default(), service.clone()).unwrap();
        let id = session
            .root_folder()
            .unwrap()
            .create_document(
                vec![
                    PropertyData::single(ids::OBJECT_TYPE_ID, "cmis:document"),
                    PropertyData::single(ids::NAME, "report.txt"),
                ],
                Some(ContentStream::new("text/plain", "v1").with_file_name("report.txt")),
                VersioningState::Major,
            )
            .unwrap();
        let doc = session.get_object(&id).unwrap().into_document().unwrap();
        (service, session, doc)
    }

    #[test]
    fn version_and_content_properties() {
        let (_service, _session, doc) = setup();
        assert_eq!(doc.version_label().as_deref(), Some("1.0"));
        assert!(doc.is_latest_version());
        assert!(doc.is_major_version());
        assert!(!doc.is_version_series_checked_out());
        assert_eq!(doc.content_stream_length(), Some(2));
        assert_eq!(doc.content_stream_mime_type().as_deref(), Some("text/plain"));
        assert_eq!(doc.content_stream_file_name().as_deref(), Some("report.txt"));
        assert_eq!(
            doc.content_stream().unwrap().map(|c| c.data),
            Some(b"v1".to_vec())
        );
        assert_eq!(doc.content_stream_by_id("thumbnail").unwrap(), None);
    }

    #[test]
    fn content_replacement_uses_the_snapshot_token() {
        let (service, _session, doc) = setup();
        service.clear();
        doc.set_content_stream(ContentStream::new("text/plain", "v2"), true, true)
            .unwrap();
        let calls = service.calls();
        assert_eq!(calls[0].operation, Operation::SetContentStream);
        assert!(calls[0].change_token.is_some());
        assert_eq!(
            doc.content_stream().unwrap().map(|c| c.data),
            Some(b"v2".to_vec())
        );

        let err = doc
            .set_content_stream(ContentStream::new("text/plain", "v3"), false, false)
            .unwrap_err();
        assert!(err.is_constraint());

        doc.delete_content_stream(true).unwrap();
        assert_eq!(doc.content_stream().unwrap(), None);
        assert_eq!(doc.content_stream_length(), None);
    }

    #[test]
    fn missing_content_reported_as_constraint_reads_as_none() {
        let repository = InMemoryRepository::with_config(InMemoryConfig {
            missing_content_is_constraint: true,
            ..InMemoryConfig::default()
        });
        let service = Arc::new(RecordingService::new(repository));
        let session = Session::connect(SessionConfig::default(), service.clone()).unwrap();
        let id = session
            .root_folder()
            .unwrap()
            .create_document(
                vec![
                    PropertyData::single(ids::OBJECT_TYPE_ID, "cmis:document"),
                    PropertyData::single(ids::NAME, "empty.txt"),
                ],
                None,
                VersioningState::Major,
            )
            .unwrap();
        let doc = session.get_object(&id).unwrap().into_document().unwrap();

        assert!(matches!(
            service.get_content_stream(id.as_str(), None),
            Err(BindingError::Constraint(_))
        ));
        service.clear();
        assert_eq!(doc.content_stream().unwrap(), None);
        assert_eq!(service.count(Operation::GetContentStream), 1);
    }

    #[test]
    fn check_out_then_cancel() {
        let (_, session, doc) = setup();
        let pwc_id = doc.check_out().unwrap();
        let pwc = session.get_object(&pwc_id).unwrap().into_document().unwrap();
        assert!(pwc.is_private_working_copy());
        assert_eq!(session.checked_out_docs(&session.default_context()).iter().count(), 1);

        pwc.cancel_check_out().unwrap();
        assert!(session.get_object(&pwc_id).unwrap_err().is_not_found());
        assert_eq!(session.checked_out_docs(&session.default_context()).iter().count(), 0);

        doc.refresh().unwrap();
        assert!(!doc.is_version_series_checked_out());
    }

    #[test]
    fn check_in_creates_the_next_version() {
        let (_, session, doc) = setup();
        let pwc = session
            .get_object(&doc.check_out().unwrap())
            .unwrap()
            .into_document()
            .unwrap();
        let new_id = pwc
            .check_in(CheckIn {
                major: false,
                content: Some(ContentStream::new("text/plain", "v2")),
                comment: Some("typo".to_string()),
                ..Default::default()
            })
            .unwrap();

        let latest = doc.latest_version(false).unwrap();
        assert_eq!(latest.id(), &new_id);
        assert_eq!(latest.version_label().as_deref(), Some("1.1"));
        assert_eq!(latest.checkin_comment().as_deref(), Some("typo"));
        assert_eq!(doc.latest_version(true).unwrap().id(), doc.id());

        let labels: Vec<_> = doc
            .all_versions()
            .unwrap()
            .iter()
            .filter_map(Document::version_label)
            .collect();
        assert_eq!(labels, vec!["1.1".to_string(), "1.0".to_string()]);
    }

    #[test]
    fn check_in_validates_properties_locally() {
        let (service, session, doc) = setup();
        let pwc = session
            .get_object(&doc.check_out().unwrap())
            .unwrap()
            .into_document()
            .unwrap();
        service.clear();
        let err = pwc
            .check_in(CheckIn {
                properties: vec![PropertyData::single(ids::CREATED_BY, "mallory")],
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
        assert_eq!(service.count(Operation::CheckIn), 0);
    }
}
