//! Conversion between wire records and typed objects.

use std::sync::Arc;

use cmis_types::{
    Cardinality, ObjectRecord, OperationContext, Property, PropertyData, PropertyDefinition,
    PropertyMap, PropertyValue, TypeDefinition, TypeError, Updatability,
};

use crate::error::{ClientError, ClientResult};
use crate::object::Entity;
use crate::session::Session;

/// Turns repository records into typed properties and objects, and checks
/// outgoing property edits against their definitions.
///
/// Sessions use [`DefaultObjectFactory`] unless connected with another one.
pub trait ObjectFactory: Send + Sync {
    /// Convert wire properties against `object_type`. Single-valued
    /// properties without a value are left out; an empty multi-valued
    /// property is kept.
    fn convert_properties(
        &self,
        object_type: &TypeDefinition,
        properties: &[PropertyData],
    ) -> ClientResult<PropertyMap>;

    /// Build one validated property.
    fn create_property(
        &self,
        definition: &Arc<PropertyDefinition>,
        values: Vec<PropertyValue>,
    ) -> ClientResult<Property>;

    /// Check outgoing properties: each must be declared by `object_type`,
    /// have an updatability in `allowed`, and match its definition's
    /// cardinality and type. An empty list is rejected.
    fn convert_properties_for_update(
        &self,
        object_type: &TypeDefinition,
        properties: &[PropertyData],
        allowed: &[Updatability],
    ) -> ClientResult<Vec<PropertyData>>;

    /// Build the typed entity for a record fetched with `context`.
    fn convert_object(
        &self,
        session: &Session,
        record: ObjectRecord,
        context: &OperationContext,
    ) -> ClientResult<Entity> {
        Entity::from_record(session, record, context)
    }
}

/// The standard [`ObjectFactory`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultObjectFactory;

impl ObjectFactory for DefaultObjectFactory {
    fn convert_properties(
        &self,
        object_type: &TypeDefinition,
        properties: &[PropertyData],
    ) -> ClientResult<PropertyMap> {
        let mut converted = PropertyMap::new();
        for data in properties {
            let definition = object_type
                .property_definition(&data.id)
                .ok_or_else(|| TypeError::UnknownProperty(data.id.clone()))?;
            if data.values.is_empty() && definition.cardinality == Cardinality::Single {
                continue;
            }
            converted.insert(
                data.id.clone(),
                self.create_property(definition, data.values.clone())?,
            );
        }
        Ok(converted)
    }

    fn create_property(
        &self,
        definition: &Arc<PropertyDefinition>,
        values: Vec<PropertyValue>,
    ) -> ClientResult<Property> {
        Ok(Property::new(Arc::clone(definition), values)?)
    }

    fn convert_properties_for_update(
        &self,
        object_type: &TypeDefinition,
        properties: &[PropertyData],
        allowed: &[Updatability],
    ) -> ClientResult<Vec<PropertyData>> {
        if properties.is_empty() {
            return Err(ClientError::InvalidArgument(
                "properties must not be empty".to_string(),
            ));
        }
        for data in properties {
            let definition = object_type
                .property_definition(&data.id)
                .ok_or_else(|| TypeError::UnknownProperty(data.id.clone()))?;
            if !allowed.contains(&definition.updatability) {
                return Err(ClientError::InvalidArgument(format!(
                    "property {} is not updatable",
                    data.id
                )));
            }
            definition.validate(&data.values)?;
        }
        Ok(properties.to_vec())
    }
}
