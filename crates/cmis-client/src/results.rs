//! Rows of a query and entries of the change log.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use cmis_types::{
    AllowableActions, ChangeType, ExtensionElement, ExtensionLevel, ObjectId, ObjectRecord,
    PropertyData, PropertyValue,
};

use crate::error::{ClientError, ClientResult};

/// One query hit. Values are kept as the repository sent them; a query may
/// project properties of several types, so nothing is converted.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    properties: Vec<PropertyData>,
    allowable_actions: Option<AllowableActions>,
}

impl QueryResult {
    pub(crate) fn new(record: ObjectRecord) -> Self {
        Self {
            properties: record.properties,
            allowable_actions: record.allowable_actions,
        }
    }

    pub fn properties(&self) -> &[PropertyData] {
        &self.properties
    }

    pub fn property(&self, id: &str) -> Option<&PropertyData> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// First value of a property.
    pub fn property_value(&self, id: &str) -> Option<&PropertyValue> {
        self.property(id).and_then(PropertyData::first)
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        self.property_value(cmis_types::property_ids::OBJECT_ID)
            .and_then(PropertyValue::as_str)
            .map(ObjectId::from)
    }

    pub fn allowable_actions(&self) -> Option<&AllowableActions> {
        self.allowable_actions.as_ref()
    }
}

/// One change-log entry.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub object_id: ObjectId,
    pub change_type: ChangeType,
    pub change_time: DateTime<Utc>,
    /// The object's properties at the time of the change, if requested.
    pub properties: Vec<PropertyData>,
    pub extensions: BTreeMap<ExtensionLevel, Vec<ExtensionElement>>,
}

impl ChangeEvent {
    pub(crate) fn from_record(record: ObjectRecord) -> ClientResult<Self> {
        let object_id = record.id().map(ObjectId::from).ok_or_else(|| {
            ClientError::InvalidArgument("change event without an object id".to_string())
        })?;
        let info = record.change_event.ok_or_else(|| {
            ClientError::InvalidArgument(format!("change record for {object_id} has no event"))
        })?;
        Ok(Self {
            object_id,
            change_type: info.change_type,
            change_time: info.change_time,
            properties: record.properties,
            extensions: record.extensions,
        })
    }

    /// The change-log token of this entry, when the repository sends one.
    pub fn change_log_token(&self) -> Option<&str> {
        self.extensions
            .get(&ExtensionLevel::ChangeEvent)?
            .iter()
            .find(|e| e.name == "changeLogToken")
            .and_then(|e| e.value.as_deref())
    }
}
