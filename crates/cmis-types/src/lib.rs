//! Foundation types for the Strata content-repository client.
//!
//! Every other crate in the workspace depends on `cmis-types`. Nothing here
//! performs I/O; these are the values that flow between the binding layer,
//! the cache and the client session.
//!
//! # Key Types
//!
//! - [`ObjectId`]: opaque repository-assigned identifier
//! - [`Property`], [`PropertyValue`], [`PropertyDefinition`]: the typed property model
//! - [`TypeDefinition`]: object types and their mandatory properties
//! - [`OperationContext`]: read-shaping options with a derived cache key
//! - [`ObjectRecord`]: an object as the repository returned it

pub mod acl;
pub mod actions;
pub mod content;
pub mod context;
pub mod error;
pub mod id;
pub mod property;
pub mod property_ids;
pub mod record;
pub mod type_def;

pub use acl::{Ace, Acl, AclPropagation};
pub use actions::{Action, AllowableActions};
pub use content::{ContentStream, Rendition};
pub use context::{IncludeRelationships, OperationContext, RENDITION_NONE, WILDCARD};
pub use error::{TypeError, TypeResult};
pub use id::ObjectId;
pub use property::{
    Cardinality, Property, PropertyDefinition, PropertyMap, PropertyType, PropertyValue,
    Updatability,
};
pub use record::{
    ChangeEventInfo, ChangeType, CmisVersion, ExtensionElement, ExtensionLevel, ObjectRecord,
    PropertyData, RepositoryCapabilities, RepositoryInfo,
};
pub use type_def::{BaseTypeId, ContentStreamAllowed, TypeDefinition};
