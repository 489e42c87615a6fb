//! Well-known property ids defined by the protocol.

pub const OBJECT_ID: &str = "cmis:objectId";
pub const OBJECT_TYPE_ID: &str = "cmis:objectTypeId";
pub const BASE_TYPE_ID: &str = "cmis:baseTypeId";
pub const NAME: &str = "cmis:name";
pub const DESCRIPTION: &str = "cmis:description";
pub const SECONDARY_OBJECT_TYPE_IDS: &str = "cmis:secondaryObjectTypeIds";
pub const CREATED_BY: &str = "cmis:createdBy";
pub const CREATION_DATE: &str = "cmis:creationDate";
pub const LAST_MODIFIED_BY: &str = "cmis:lastModifiedBy";
pub const LAST_MODIFICATION_DATE: &str = "cmis:lastModificationDate";
pub const CHANGE_TOKEN: &str = "cmis:changeToken";

// document
pub const IS_IMMUTABLE: &str = "cmis:isImmutable";
pub const IS_LATEST_VERSION: &str = "cmis:isLatestVersion";
pub const IS_MAJOR_VERSION: &str = "cmis:isMajorVersion";
pub const IS_LATEST_MAJOR_VERSION: &str = "cmis:isLatestMajorVersion";
pub const IS_PRIVATE_WORKING_COPY: &str = "cmis:isPrivateWorkingCopy";
pub const VERSION_LABEL: &str = "cmis:versionLabel";
pub const VERSION_SERIES_ID: &str = "cmis:versionSeriesId";
pub const IS_VERSION_SERIES_CHECKED_OUT: &str = "cmis:isVersionSeriesCheckedOut";
pub const VERSION_SERIES_CHECKED_OUT_BY: &str = "cmis:versionSeriesCheckedOutBy";
pub const VERSION_SERIES_CHECKED_OUT_ID: &str = "cmis:versionSeriesCheckedOutId";
pub const CHECKIN_COMMENT: &str = "cmis:checkinComment";
pub const CONTENT_STREAM_LENGTH: &str = "cmis:contentStreamLength";
pub const CONTENT_STREAM_MIME_TYPE: &str = "cmis:contentStreamMimeType";
pub const CONTENT_STREAM_FILE_NAME: &str = "cmis:contentStreamFileName";
pub const CONTENT_STREAM_ID: &str = "cmis:contentStreamId";

// folder
pub const PARENT_ID: &str = "cmis:parentId";
pub const PATH: &str = "cmis:path";
pub const ALLOWED_CHILD_OBJECT_TYPE_IDS: &str = "cmis:allowedChildObjectTypeIds";

// relationship
pub const SOURCE_ID: &str = "cmis:sourceId";
pub const TARGET_ID: &str = "cmis:targetId";

// policy
pub const POLICY_TEXT: &str = "cmis:policyText";

/// Properties every object must carry regardless of its base type.
pub const MANDATORY: [&str; 9] = [
    OBJECT_ID,
    OBJECT_TYPE_ID,
    BASE_TYPE_ID,
    NAME,
    CREATED_BY,
    CREATION_DATE,
    LAST_MODIFIED_BY,
    LAST_MODIFICATION_DATE,
    CHANGE_TOKEN,
];
