//! Plain data records exchanged with the binding layer.
//!
//! These carry what the repository sent, untyped against any definition.
//! Turning them into validated [`crate::Property`] values is the job of the
//! client's object factory.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acl::Acl;
use crate::actions::AllowableActions;
use crate::content::Rendition;
use crate::property::PropertyValue;
use crate::property_ids as ids;
use crate::type_def::BaseTypeId;

/// A property as it travels on the wire: an id and its raw values.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyData {
    pub id: String,
    pub values: Vec<PropertyValue>,
}

impl PropertyData {
    pub fn new(id: impl Into<String>, values: Vec<PropertyValue>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    pub fn single(id: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::new(id, vec![value.into()])
    }

    pub fn first(&self) -> Option<&PropertyValue> {
        self.values.first()
    }
}

/// The part of an object an extension element is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtensionLevel {
    Object,
    Properties,
    AllowableActions,
    Acl,
    Policies,
    ChangeEvent,
}

/// A repository-specific extension element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionElement {
    pub namespace: Option<String>,
    pub name: String,
    pub value: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<ExtensionElement>,
}

impl ExtensionElement {
    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
            value: Some(value.into()),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }
}

/// Kind of change recorded in the repository change log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
    Security,
}

/// Change-log metadata attached to an object record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEventInfo {
    pub change_type: ChangeType,
    pub change_time: DateTime<Utc>,
}

/// An object as returned by the repository.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectRecord {
    pub properties: Vec<PropertyData>,
    pub allowable_actions: Option<AllowableActions>,
    pub acl: Option<Acl>,
    pub policy_ids: Option<Vec<String>>,
    pub relationships: Vec<ObjectRecord>,
    pub renditions: Vec<Rendition>,
    pub change_event: Option<ChangeEventInfo>,
    pub extensions: BTreeMap<ExtensionLevel, Vec<ExtensionElement>>,
}

impl ObjectRecord {
    pub fn property(&self, id: &str) -> Option<&PropertyData> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// First value of a text property.
    pub fn text(&self, id: &str) -> Option<&str> {
        self.property(id)
            .and_then(PropertyData::first)
            .and_then(PropertyValue::as_str)
    }

    pub fn flag(&self, id: &str) -> Option<bool> {
        self.property(id)
            .and_then(PropertyData::first)
            .and_then(PropertyValue::as_bool)
    }

    pub fn id(&self) -> Option<&str> {
        self.text(ids::OBJECT_ID)
    }

    pub fn object_type_id(&self) -> Option<&str> {
        self.text(ids::OBJECT_TYPE_ID)
    }

    pub fn base_type_id(&self) -> Option<BaseTypeId> {
        self.text(ids::BASE_TYPE_ID).and_then(BaseTypeId::from_id)
    }

    pub fn change_token(&self) -> Option<&str> {
        self.text(ids::CHANGE_TOKEN)
    }
}

/// Protocol version spoken by the repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CmisVersion {
    #[serde(rename = "1.0")]
    V1_0,
    #[serde(rename = "1.1")]
    V1_1,
}

/// Optional features a repository advertises.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCapabilities {
    pub changes: bool,
    pub manage_acl: bool,
    pub extended_acl: bool,
    pub pwc_updatable: bool,
    pub query: bool,
}

impl Default for RepositoryCapabilities {
    fn default() -> Self {
        Self {
            changes: true,
            manage_acl: true,
            extended_acl: false,
            pwc_updatable: true,
            query: true,
        }
    }
}

/// Static description of a repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub id: String,
    pub name: String,
    pub root_folder_id: String,
    pub cmis_version: CmisVersion,
    pub latest_change_log_token: Option<String>,
    pub capabilities: RepositoryCapabilities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accessors_read_well_known_properties() {
        let record = ObjectRecord {
            properties: vec![
                PropertyData::single(ids::OBJECT_ID, "doc-1"),
                PropertyData::single(ids::BASE_TYPE_ID, "cmis:document"),
                PropertyData::single(ids::CHANGE_TOKEN, "7"),
                PropertyData::single(ids::IS_LATEST_VERSION, true),
            ],
            ..Default::default()
        };
        assert_eq!(record.id(), Some("doc-1"));
        assert_eq!(record.base_type_id(), Some(BaseTypeId::Document));
        assert_eq!(record.change_token(), Some("7"));
        assert_eq!(record.flag(ids::IS_LATEST_VERSION), Some(true));
        assert!(record.object_type_id().is_none());
    }
}
