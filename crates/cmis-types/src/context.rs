//! Operation contexts: the read-shaping options attached to every fetch.
//!
//! A context normalises its filters on every setter and keeps a derived cache
//! key in sync with the options that change the shape of a returned object.
//! Options that only affect listings (`order_by`, page size, path segments)
//! are deliberately left out of the key.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::property_ids as ids;

/// Filter token selecting every property.
pub const WILDCARD: &str = "*";

/// Rendition filter token selecting no renditions.
pub const RENDITION_NONE: &str = "cmis:none";

const DEFAULT_MAX_ITEMS_PER_PAGE: u64 = 100;

/// Which relationships to include with a fetched object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeRelationships {
    #[default]
    None,
    Source,
    Target,
    Both,
}

impl IncludeRelationships {
    pub fn as_str(self) -> &'static str {
        match self {
            IncludeRelationships::None => "none",
            IncludeRelationships::Source => "source",
            IncludeRelationships::Target => "target",
            IncludeRelationships::Both => "both",
        }
    }
}

/// Read-shaping options for fetches, with a derived cache key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationContext {
    filter: Option<BTreeSet<String>>,
    include_acls: bool,
    include_allowable_actions: bool,
    include_policies: bool,
    include_relationships: IncludeRelationships,
    rendition_filter: BTreeSet<String>,
    include_path_segments: bool,
    order_by: Option<String>,
    cache_enabled: bool,
    max_items_per_page: u64,
    cache_key: Option<String>,
}

impl Default for OperationContext {
    fn default() -> Self {
        let mut ctx = Self {
            filter: None,
            include_acls: false,
            include_allowable_actions: true,
            include_policies: false,
            include_relationships: IncludeRelationships::None,
            rendition_filter: none_rendition_filter(),
            include_path_segments: true,
            order_by: None,
            cache_enabled: true,
            max_items_per_page: DEFAULT_MAX_ITEMS_PER_PAGE,
            cache_key: None,
        };
        ctx.generate_cache_key();
        ctx
    }
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that fetches only the given properties, nothing else, and
    /// never touches the cache.
    pub fn minimal<I, S>(filter: I) -> TypeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ctx = Self::default();
        ctx.include_allowable_actions = false;
        ctx.include_path_segments = false;
        ctx.cache_enabled = false;
        ctx.set_filter(filter)?;
        Ok(ctx)
    }

    // ---- filter ----

    /// The normalised property filter; `None` means "no filter".
    pub fn filter(&self) -> Option<&BTreeSet<String>> {
        self.filter.as_ref()
    }

    /// The filter as sent on the wire (`None` when unfiltered).
    pub fn filter_string(&self) -> Option<String> {
        self.filter.as_ref().map(join)
    }

    /// Replace the property filter.
    ///
    /// Entries are trimmed and blanks dropped. An entry containing a comma is
    /// rejected. If any entry is `*` the filter collapses to exactly `*`;
    /// otherwise the id and type properties needed to read the object back
    /// are always added. An empty result clears the filter.
    pub fn set_filter<I, S>(&mut self, entries: I) -> TypeResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = normalize_entries(entries, "filter")?;
        self.filter = if entries.is_empty() {
            None
        } else if entries.contains(WILDCARD) {
            Some(BTreeSet::from([WILDCARD.to_string()]))
        } else {
            let mut entries = entries;
            for required in [ids::OBJECT_ID, ids::BASE_TYPE_ID, ids::OBJECT_TYPE_ID] {
                entries.insert(required.to_string());
            }
            Some(entries)
        };
        self.generate_cache_key();
        Ok(())
    }

    /// Replace the property filter from a comma-separated string.
    pub fn set_filter_string(&mut self, filter: &str) -> TypeResult<()> {
        self.set_filter(filter.split(','))
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
        self.generate_cache_key();
    }

    // ---- rendition filter ----

    pub fn rendition_filter(&self) -> &BTreeSet<String> {
        &self.rendition_filter
    }

    pub fn rendition_filter_string(&self) -> String {
        join(&self.rendition_filter)
    }

    /// Replace the rendition filter; an empty filter means no renditions.
    pub fn set_rendition_filter<I, S>(&mut self, entries: I) -> TypeResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = normalize_entries(entries, "rendition filter")?;
        self.rendition_filter = if entries.is_empty() {
            none_rendition_filter()
        } else {
            entries
        };
        self.generate_cache_key();
        Ok(())
    }

    pub fn set_rendition_filter_string(&mut self, filter: &str) -> TypeResult<()> {
        self.set_rendition_filter(filter.split(','))
    }

    // ---- include flags ----

    pub fn include_acls(&self) -> bool {
        self.include_acls
    }

    pub fn set_include_acls(&mut self, include: bool) {
        self.include_acls = include;
        self.generate_cache_key();
    }

    pub fn include_allowable_actions(&self) -> bool {
        self.include_allowable_actions
    }

    pub fn set_include_allowable_actions(&mut self, include: bool) {
        self.include_allowable_actions = include;
        self.generate_cache_key();
    }

    pub fn include_policies(&self) -> bool {
        self.include_policies
    }

    pub fn set_include_policies(&mut self, include: bool) {
        self.include_policies = include;
        self.generate_cache_key();
    }

    pub fn include_relationships(&self) -> IncludeRelationships {
        self.include_relationships
    }

    pub fn set_include_relationships(&mut self, include: IncludeRelationships) {
        self.include_relationships = include;
        self.generate_cache_key();
    }

    // ---- listing options (not part of the cache key) ----

    pub fn include_path_segments(&self) -> bool {
        self.include_path_segments
    }

    pub fn set_include_path_segments(&mut self, include: bool) {
        self.include_path_segments = include;
    }

    pub fn order_by(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    pub fn set_order_by(&mut self, order_by: Option<String>) {
        self.order_by = order_by.filter(|o| !o.trim().is_empty());
    }

    pub fn max_items_per_page(&self) -> u64 {
        self.max_items_per_page
    }

    pub fn set_max_items_per_page(&mut self, max_items: u64) -> TypeResult<()> {
        if max_items < 1 {
            return Err(TypeError::InvalidArgument(
                "max items per page must be at least 1".into(),
            ));
        }
        self.max_items_per_page = max_items;
        Ok(())
    }

    // ---- caching ----

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.cache_enabled = enabled;
        self.generate_cache_key();
    }

    /// Key identifying the payload shape this context produces, or `None`
    /// when caching is disabled so that lookups always miss.
    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    fn generate_cache_key(&mut self) {
        if !self.cache_enabled {
            self.cache_key = None;
            return;
        }
        let flag = |b: bool| if b { '1' } else { '0' };
        self.cache_key = Some(format!(
            "{}{}{}|{}|{}|{}",
            flag(self.include_acls),
            flag(self.include_allowable_actions),
            flag(self.include_policies),
            self.filter_string().unwrap_or_default(),
            self.include_relationships.as_str(),
            self.rendition_filter_string(),
        ));
    }
}

fn none_rendition_filter() -> BTreeSet<String> {
    BTreeSet::from([RENDITION_NONE.to_string()])
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

fn normalize_entries<I, S>(entries: I, what: &str) -> TypeResult<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = BTreeSet::new();
    for entry in entries {
        let entry = entry.as_ref().trim();
        if entry.is_empty() {
            continue;
        }
        if entry.contains(',') {
            return Err(TypeError::InvalidArgument(format!(
                "{what} entry must not contain a comma: {entry}"
            )));
        }
        out.insert(entry.to_string());
    }
    Ok(out)
}
