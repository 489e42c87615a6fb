//! Client sessions for the Strata content-repository client.
//!
//! This is the crate applications embed. A [`Session`] talks to a repository
//! through any [`RepositoryService`] and hands out shared, cached object
//! snapshots; a [`TransientObject`] stages edits to one object and commits
//! them in a single [`TransientObject::save`].
//!
//! ```ignore
//! let session = Session::connect(SessionConfig::default(), service)?;
//! let doc = session.get_object_by_path("/reports/q3.txt")?.into_document()?;
//! let mut draft = doc.transient()?;
//! draft.set_name("q3-final.txt")?;
//! draft.save()?;
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod object;
pub mod results;
pub mod session;
pub mod transient;
pub mod types;

pub use config::{ContextConfig, SessionConfig};
pub use error::{ClientError, ClientResult};
pub use factory::{DefaultObjectFactory, ObjectFactory};
pub use object::{CmisObject, Document, Entity, Folder, Item, Policy, Relationship};
pub use results::{ChangeEvent, QueryResult};
pub use session::Session;
pub use transient::{DeleteTree, TransientObject};
pub use types::TypeCache;

// Re-export what callers need to build requests
pub use cmis_binding::{
    CheckIn, RelationshipDirection, RepositoryService, UnfileObject, VersioningState,
};
pub use cmis_cache::CacheStats;
pub use cmis_paging::{ChangeLogIterable, ItemIterable, Page};
pub use cmis_types::{
    property_ids, Ace, Acl, AclPropagation, Action, BaseTypeId, ContentStream, ObjectId,
    OperationContext, PropertyData, PropertyValue, RepositoryInfo, TypeDefinition,
};
