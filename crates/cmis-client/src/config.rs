use std::path::Path;

use cmis_cache::CacheConfig;
use cmis_types::{IncludeRelationships, OperationContext};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Everything a session needs besides the repository service.
///
/// ```toml
/// cache_type_definitions = true
///
/// [cache]
/// object_capacity = 500
/// path_capacity = 200
///
/// [context]
/// filter = ["cmis:name", "cmis:description"]
/// include_acls = true
/// max_items_per_page = 50
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cache: CacheConfig,
    /// Source of the session's default operation context.
    pub context: ContextConfig,
    /// Keep fetched type definitions for the life of the session.
    pub cache_type_definitions: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            context: ContextConfig::default(),
            cache_type_definitions: true,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(source: &str) -> ClientResult<Self> {
        toml::from_str(source)
            .map_err(|e| ClientError::InvalidArgument(format!("session config: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            ClientError::InvalidArgument(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }
}

/// Serialisable form of an [`OperationContext`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Property ids to fetch; empty fetches everything.
    pub filter: Vec<String>,
    pub include_acls: bool,
    pub include_allowable_actions: bool,
    pub include_policies: bool,
    pub include_relationships: IncludeRelationships,
    /// Empty selects no renditions.
    pub rendition_filter: Vec<String>,
    pub include_path_segments: bool,
    pub order_by: Option<String>,
    pub cache_enabled: bool,
    pub max_items_per_page: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            filter: Vec::new(),
            include_acls: false,
            include_allowable_actions: true,
            include_policies: false,
            include_relationships: IncludeRelationships::None,
            rendition_filter: Vec::new(),
            include_path_segments: true,
            order_by: None,
            cache_enabled: true,
            max_items_per_page: 100,
        }
    }
}

impl ContextConfig {
    /// Build the context, applying the usual filter normalisation.
    pub fn to_context(&self) -> ClientResult<OperationContext> {
        let mut context = OperationContext::new();
        context.set_filter(&self.filter)?;
        context.set_include_acls(self.include_acls);
        context.set_include_allowable_actions(self.include_allowable_actions);
        context.set_include_policies(self.include_policies);
        context.set_include_relationships(self.include_relationships);
        context.set_rendition_filter(&self.rendition_filter)?;
        context.set_include_path_segments(self.include_path_segments);
        context.set_order_by(self.order_by.clone());
        context.set_cache_enabled(self.cache_enabled);
        context.set_max_items_per_page(self.max_items_per_page)?;
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use cmis_types::WILDCARD;

    use super::*;

    #[test]
    fn defaults_match_a_fresh_context() {
        let context = ContextConfig::default().to_context().unwrap();
        assert_eq!(context, OperationContext::new());
        assert!(SessionConfig::default().cache_type_definitions);
    }

    #[test]
    fn parses_partial_toml() {
        let config = SessionConfig::from_toml_str(
            r#"
            [cache]
            object_capacity = 10

            [context]
            filter = ["cmis:name", "*"]
            include_relationships = "both"
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.object_capacity, 10);
        assert_eq!(config.cache.path_capacity, 1000);

        let context = config.context.to_context().unwrap();
        assert_eq!(context.filter_string().as_deref(), Some(WILDCARD));
        assert_eq!(context.include_relationships(), IncludeRelationships::Both);
    }

    #[test]
    fn invalid_context_values_are_rejected() {
        let config = SessionConfig::from_toml_str("[context]\nmax_items_per_page = 0\n").unwrap();
        assert!(matches!(
            config.context.to_context(),
            Err(ClientError::InvalidArgument(_))
        ));

        let config = SessionConfig::from_toml_str("[context]\nfilter = [\"a,b\"]\n").unwrap();
        assert!(config.context.to_context().is_err());
    }

    #[test]
    fn malformed_toml_is_an_invalid_argument() {
        assert!(matches!(
            SessionConfig::from_toml_str("cache = 3"),
            Err(ClientError::InvalidArgument(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache_type_definitions = false").unwrap();
        writeln!(file, "[context]").unwrap();
        writeln!(file, "include_acls = true").unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert!(!config.cache_type_definitions);
        assert!(config.context.include_acls);
    }

    #[test]
    fn missing_file_is_an_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let err = SessionConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }
}
