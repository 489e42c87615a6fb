//! Object type definitions.
//!
//! Every object is an instance of a type that descends from one of five base
//! types. The base-type builders below produce the protocol-mandated property
//! definitions, so a derived type only declares what it adds.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::property::{Cardinality, PropertyDefinition, PropertyType, Updatability};
use crate::property_ids as ids;

/// The five base object types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaseTypeId {
    #[serde(rename = "cmis:document")]
    Document,
    #[serde(rename = "cmis:folder")]
    Folder,
    #[serde(rename = "cmis:relationship")]
    Relationship,
    #[serde(rename = "cmis:policy")]
    Policy,
    #[serde(rename = "cmis:item")]
    Item,
}

impl BaseTypeId {
    pub const ALL: [BaseTypeId; 5] = [
        BaseTypeId::Document,
        BaseTypeId::Folder,
        BaseTypeId::Relationship,
        BaseTypeId::Policy,
        BaseTypeId::Item,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BaseTypeId::Document => "cmis:document",
            BaseTypeId::Folder => "cmis:folder",
            BaseTypeId::Relationship => "cmis:relationship",
            BaseTypeId::Policy => "cmis:policy",
            BaseTypeId::Item => "cmis:item",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|base| base.as_str() == id)
    }
}

impl fmt::Display for BaseTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether documents of a type may carry a content stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStreamAllowed {
    NotAllowed,
    Allowed,
    Required,
}

/// Definition of an object type and the properties its instances carry.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeDefinition {
    pub id: String,
    pub display_name: String,
    pub base_type: BaseTypeId,
    pub parent_type_id: Option<String>,
    pub versionable: bool,
    pub content_stream_allowed: ContentStreamAllowed,
    pub fileable: bool,
    pub controllable_acl: bool,
    pub controllable_policy: bool,
    property_definitions: BTreeMap<String, Arc<PropertyDefinition>>,
}

impl TypeDefinition {
    /// The standard definition of a base type.
    pub fn base(base: BaseTypeId) -> Self {
        let mut ty = Self {
            id: base.as_str().to_string(),
            display_name: base.as_str().trim_start_matches("cmis:").to_string(),
            base_type: base,
            parent_type_id: None,
            versionable: base == BaseTypeId::Document,
            content_stream_allowed: if base == BaseTypeId::Document {
                ContentStreamAllowed::Allowed
            } else {
                ContentStreamAllowed::NotAllowed
            },
            fileable: matches!(
                base,
                BaseTypeId::Document | BaseTypeId::Folder | BaseTypeId::Policy | BaseTypeId::Item
            ),
            controllable_acl: true,
            controllable_policy: true,
            property_definitions: BTreeMap::new(),
        };

        use Cardinality::{Multi, Single};
        use PropertyType as T;
        use Updatability::{OnCreate, ReadOnly, ReadWrite};

        let common = [
            (ids::OBJECT_ID, T::Id, Single, ReadOnly, false),
            (ids::OBJECT_TYPE_ID, T::Id, Single, OnCreate, true),
            (ids::BASE_TYPE_ID, T::Id, Single, ReadOnly, false),
            (ids::NAME, T::String, Single, ReadWrite, true),
            (ids::DESCRIPTION, T::String, Single, ReadWrite, false),
            (ids::SECONDARY_OBJECT_TYPE_IDS, T::Id, Multi, ReadWrite, false),
            (ids::CREATED_BY, T::String, Single, ReadOnly, false),
            (ids::CREATION_DATE, T::DateTime, Single, ReadOnly, false),
            (ids::LAST_MODIFIED_BY, T::String, Single, ReadOnly, false),
            (ids::LAST_MODIFICATION_DATE, T::DateTime, Single, ReadOnly, false),
            (ids::CHANGE_TOKEN, T::String, Single, ReadOnly, false),
        ];
        let specific: &[(&str, PropertyType, Cardinality, Updatability, bool)] = match base {
            BaseTypeId::Document => &[
                (ids::IS_IMMUTABLE, T::Boolean, Single, ReadOnly, false),
                (ids::IS_LATEST_VERSION, T::Boolean, Single, ReadOnly, false),
                (ids::IS_MAJOR_VERSION, T::Boolean, Single, ReadOnly, false),
                (ids::IS_LATEST_MAJOR_VERSION, T::Boolean, Single, ReadOnly, false),
                (ids::IS_PRIVATE_WORKING_COPY, T::Boolean, Single, ReadOnly, false),
                (ids::VERSION_LABEL, T::String, Single, ReadOnly, false),
                (ids::VERSION_SERIES_ID, T::Id, Single, ReadOnly, false),
                (ids::IS_VERSION_SERIES_CHECKED_OUT, T::Boolean, Single, ReadOnly, false),
                (ids::VERSION_SERIES_CHECKED_OUT_BY, T::String, Single, ReadOnly, false),
                (ids::VERSION_SERIES_CHECKED_OUT_ID, T::Id, Single, ReadOnly, false),
                (ids::CHECKIN_COMMENT, T::String, Single, ReadOnly, false),
                (ids::CONTENT_STREAM_LENGTH, T::Integer, Single, ReadOnly, false),
                (ids::CONTENT_STREAM_MIME_TYPE, T::String, Single, ReadOnly, false),
                (ids::CONTENT_STREAM_FILE_NAME, T::String, Single, ReadOnly, false),
                (ids::CONTENT_STREAM_ID, T::Id, Single, ReadOnly, false),
            ],
            BaseTypeId::Folder => &[
                (ids::PARENT_ID, T::Id, Single, ReadOnly, false),
                (ids::PATH, T::String, Single, ReadOnly, false),
                (ids::ALLOWED_CHILD_OBJECT_TYPE_IDS, T::Id, Multi, ReadOnly, false),
            ],
            BaseTypeId::Relationship => &[
                (ids::SOURCE_ID, T::Id, Single, OnCreate, true),
                (ids::TARGET_ID, T::Id, Single, OnCreate, true),
            ],
            BaseTypeId::Policy => &[(ids::POLICY_TEXT, T::String, Single, ReadWrite, false)],
            BaseTypeId::Item => &[],
        };

        for &(id, property_type, cardinality, updatability, required) in
            common.iter().chain(specific.iter())
        {
            ty.insert(
                PropertyDefinition::new(id, property_type, cardinality, updatability)
                    .with_required(required),
            );
        }
        ty
    }

    /// A subtype of `parent` inheriting all of its property definitions.
    pub fn derive(id: impl Into<String>, parent: &TypeDefinition) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            parent_type_id: Some(parent.id.clone()),
            ..parent.clone()
        }
    }

    pub fn with_property(mut self, definition: PropertyDefinition) -> Self {
        self.insert(definition);
        self
    }

    pub fn with_versionable(mut self, versionable: bool) -> Self {
        self.versionable = versionable;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    fn insert(&mut self, definition: PropertyDefinition) {
        self.property_definitions
            .insert(definition.id.clone(), Arc::new(definition));
    }

    pub fn property_definition(&self, id: &str) -> Option<&Arc<PropertyDefinition>> {
        self.property_definitions.get(id)
    }

    pub fn property_definitions(&self) -> &BTreeMap<String, Arc<PropertyDefinition>> {
        &self.property_definitions
    }

    /// Fails unless the definition declares every mandatory property.
    pub fn validate_mandatory(&self) -> TypeResult<()> {
        if self.property_definitions.len() < ids::MANDATORY.len() {
            return Err(TypeError::InvalidArgument(format!(
                "type {} declares {} properties, at least {} are required",
                self.id,
                self.property_definitions.len(),
                ids::MANDATORY.len()
            )));
        }
        match ids::MANDATORY
            .iter()
            .find(|id| !self.property_definitions.contains_key(**id))
        {
            Some(missing) => Err(TypeError::InvalidArgument(format!(
                "type {} is missing mandatory property {missing}",
                self.id
            ))),
            None => Ok(()),
        }
    }
}
