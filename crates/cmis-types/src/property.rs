//! Typed property values and their definitions.
//!
//! A [`Property`] binds a list of [`PropertyValue`]s to the
//! [`PropertyDefinition`] it was declared with. Construction validates the
//! values against the definition, so a `Property` that exists is always
//! well-typed. Properties are immutable; changing one means building a new
//! one and replacing it in the [`PropertyMap`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, Utc};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

/// Declared data type of a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Boolean,
    Id,
    Integer,
    DateTime,
    Decimal,
    Html,
    String,
    Uri,
}

impl PropertyType {
    /// Returns `true` for the types whose values are carried as text.
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            PropertyType::Id | PropertyType::Html | PropertyType::String | PropertyType::Uri
        )
    }
}

/// Whether a property holds one value or a list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    Multi,
}

/// When a property may be written by a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Updatability {
    ReadOnly,
    ReadWrite,
    WhenCheckedOut,
    OnCreate,
}

impl Updatability {
    /// The updatability set that applies to an existing object.
    ///
    /// `ReadWrite` is always allowed; `WhenCheckedOut` joins it while the
    /// object's version series is checked out.
    pub fn for_update(checked_out: bool) -> Vec<Updatability> {
        if checked_out {
            vec![Updatability::ReadWrite, Updatability::WhenCheckedOut]
        } else {
            vec![Updatability::ReadWrite]
        }
    }

    /// The updatability set that applies when creating an object.
    pub fn for_create() -> Vec<Updatability> {
        vec![Updatability::ReadWrite, Updatability::OnCreate]
    }
}

/// Declaration of a single property within a type definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: String,
    pub display_name: Option<String>,
    pub property_type: PropertyType,
    pub cardinality: Cardinality,
    pub updatability: Updatability,
    pub required: bool,
}

impl PropertyDefinition {
    pub fn new(
        id: impl Into<String>,
        property_type: PropertyType,
        cardinality: Cardinality,
        updatability: Updatability,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            property_type,
            cardinality,
            updatability,
            required: false,
        }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn is_multi_valued(&self) -> bool {
        self.cardinality == Cardinality::Multi
    }

    /// Check a candidate value list against this definition.
    pub fn validate(&self, values: &[PropertyValue]) -> TypeResult<()> {
        if self.cardinality == Cardinality::Single && values.len() > 1 {
            return Err(TypeError::Cardinality {
                id: self.id.clone(),
                count: values.len(),
            });
        }
        for value in values {
            if !value.conforms_to(self.property_type) {
                return Err(TypeError::TypeMismatch {
                    id: self.id.clone(),
                    expected: self.property_type,
                    actual: value.kind_name(),
                });
            }
        }
        Ok(())
    }
}

/// A single property value.
///
/// Text-like types (string, id, uri, html) share the `Text` variant; the
/// definition distinguishes them.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Integer(BigInt),
    Decimal(BigDecimal),
    Boolean(bool),
    DateTime(DateTime<FixedOffset>),
}

impl PropertyValue {
    /// Whether this value may be stored in a property of type `ty`.
    pub fn conforms_to(&self, ty: PropertyType) -> bool {
        match self {
            PropertyValue::Text(_) => ty.is_textual(),
            PropertyValue::Integer(_) => ty == PropertyType::Integer,
            PropertyValue::Decimal(_) => ty == PropertyType::Decimal,
            PropertyValue::Boolean(_) => ty == PropertyType::Boolean,
            PropertyValue::DateTime(_) => ty == PropertyType::DateTime,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Text(_) => "text",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Decimal(_) => "decimal",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::DateTime(_) => "datetime",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<&BigInt> {
        match self {
            PropertyValue::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            PropertyValue::Decimal(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            PropertyValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Decimal(d) => write!(f, "{d}"),
            PropertyValue::Boolean(b) => write!(f, "{b}"),
            PropertyValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(BigInt::from(value))
    }
}

impl From<BigInt> for PropertyValue {
    fn from(value: BigInt) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<BigDecimal> for PropertyValue {
    fn from(value: BigDecimal) -> Self {
        PropertyValue::Decimal(value)
    }
}

impl From<DateTime<FixedOffset>> for PropertyValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        PropertyValue::DateTime(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::DateTime(DateTime::<FixedOffset>::from(value))
    }
}

/// A validated property: values bound to the definition they conform to.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    definition: Arc<PropertyDefinition>,
    values: Vec<PropertyValue>,
}

impl Property {
    /// Build a property, validating cardinality and value types.
    pub fn new(definition: Arc<PropertyDefinition>, values: Vec<PropertyValue>) -> TypeResult<Self> {
        definition.validate(&values)?;
        Ok(Self { definition, values })
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &Arc<PropertyDefinition> {
        &self.definition
    }

    pub fn property_type(&self) -> PropertyType {
        self.definition.property_type
    }

    pub fn cardinality(&self) -> Cardinality {
        self.definition.cardinality
    }

    pub fn is_multi_valued(&self) -> bool {
        self.definition.is_multi_valued()
    }

    /// All values. A multi-valued property may legitimately have none.
    pub fn values(&self) -> &[PropertyValue] {
        &self.values
    }

    pub fn first_value(&self) -> Option<&PropertyValue> {
        self.values.first()
    }

    /// First value rendered as text, if it is a text value.
    pub fn value_as_str(&self) -> Option<&str> {
        self.first_value().and_then(PropertyValue::as_str)
    }
}

/// Properties of one object keyed by property id.
pub type PropertyMap = BTreeMap<String, Property>;

#[cfg(test)]
mod tests {
    use super::*;

    fn def(ty: PropertyType, card: Cardinality) -> Arc<PropertyDefinition> {
        Arc::new(PropertyDefinition::new("test:prop", ty, card, Updatability::ReadWrite))
    }

    #[test]
    fn text_value_fits_every_textual_type() {
        let v = PropertyValue::from("x");
        for ty in [PropertyType::String, PropertyType::Id, PropertyType::Uri, PropertyType::Html] {
            assert!(v.conforms_to(ty));
        }
        assert!(!v.conforms_to(PropertyType::Integer));
    }

    #[test]
    fn single_valued_rejects_lists() {
        let err = Property::new(
            def(PropertyType::String, Cardinality::Single),
            vec!["a".into(), "b".into()],
        )
        .unwrap_err();
        assert!(matches!(err, TypeError::Cardinality { count: 2, .. }));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let err = Property::new(def(PropertyType::Integer, Cardinality::Single), vec!["1".into()])
            .unwrap_err();
        assert!(matches!(
            err,
            TypeError::TypeMismatch { expected: PropertyType::Integer, actual: "text", .. }
        ));
    }

    #[test]
    fn empty_multi_value_is_valid_and_distinct() {
        let prop = Property::new(def(PropertyType::Id, Cardinality::Multi), vec![]).unwrap();
        assert!(prop.is_multi_valued());
        assert!(prop.values().is_empty());
        assert!(prop.first_value().is_none());
    }

    #[test]
    fn integers_are_arbitrary_precision() {
        let big: BigInt = "123456789012345678901234567890".parse().unwrap();
        let prop = Property::new(
            def(PropertyType::Integer, Cardinality::Single),
            vec![big.clone().into()],
        )
        .unwrap();
        assert_eq!(prop.first_value().and_then(PropertyValue::as_integer), Some(&big));
    }

    #[test]
    fn utc_datetimes_convert_to_fixed_offset() {
        let now = Utc::now();
        let value = PropertyValue::from(now);
        assert_eq!(value.as_datetime().map(|dt| dt.timestamp()), Some(now.timestamp()));
        assert!(value.conforms_to(PropertyType::DateTime));
    }

    #[test]
    fn update_set_includes_when_checked_out_only_for_checked_out() {
        assert_eq!(Updatability::for_update(false), vec![Updatability::ReadWrite]);
        assert!(Updatability::for_update(true).contains(&Updatability::WhenCheckedOut));
    }
}
