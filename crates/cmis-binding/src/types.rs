//! Request and response records for repository calls.

use cmis_types::{Ace, ContentStream, PropertyData};

/// Versioning state of a newly created document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VersioningState {
    /// Not versionable, or let the repository decide.
    None,
    #[default]
    Major,
    Minor,
    /// Create the document checked out and return the working copy id.
    CheckedOut,
}

/// What `delete_tree` does with objects that are also filed elsewhere.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnfileObject {
    Unfile,
    DeleteSingleFiled,
    #[default]
    Delete,
}

/// Which end of a relationship the object must be on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RelationshipDirection {
    #[default]
    Source,
    Target,
    Either,
}

/// Everything needed to create an object of any base type.
///
/// The base type is derived from the `cmis:objectTypeId` property.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateObject {
    pub properties: Vec<PropertyData>,
    pub folder_id: Option<String>,
    pub content: Option<ContentStream>,
    pub versioning_state: VersioningState,
    pub policies: Vec<String>,
    pub add_aces: Vec<Ace>,
    pub remove_aces: Vec<Ace>,
}

/// Arguments of a check-in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckIn {
    pub major: bool,
    pub properties: Vec<PropertyData>,
    pub content: Option<ContentStream>,
    pub comment: Option<String>,
    pub policies: Vec<String>,
    pub add_aces: Vec<Ace>,
    pub remove_aces: Vec<Ace>,
}

/// The id and change token of an object after a write.
///
/// The id differs from the one sent when the write created a new version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatedObject {
    pub id: String,
    pub change_token: Option<String>,
}
