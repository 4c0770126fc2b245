//! Canonical query keys.

use std::collections::BTreeMap;
use std::fmt;

/// Separator used to join list-valued parameters.
pub const LIST_SEPARATOR: char = ',';

/// Order-independent identifier of a parameterised read.
///
/// Built from an endpoint namespace plus normalised parameters: empty values
/// are dropped, list values are trimmed, sorted, deduplicated and joined with
/// [`LIST_SEPARATOR`]. Parameters are kept sorted by name, so two logically
/// identical queries always render the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    namespace: String,
    params: BTreeMap<String, String>,
}

impl QueryKey {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into().trim_matches('/').to_string(),
            params: BTreeMap::new(),
        }
    }

    /// Add a scalar parameter. Blank values are omitted.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        let value = value.trim();
        if !value.is_empty() {
            self.params.insert(name.into(), value.to_string());
        }
        self
    }

    /// Add an optional parameter. `None` is omitted.
    pub fn opt_param<T: fmt::Display>(self, name: impl Into<String>, value: Option<T>) -> Self {
        match value {
            Some(value) => self.param(name, value.to_string()),
            None => self,
        }
    }

    /// Add a list parameter. An empty list is omitted, exactly like an absent one.
    pub fn list_param<I, S>(self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = normalize_list(values).join(&LIST_SEPARATOR.to_string());
        self.param(name, joined)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Parameters as query pairs, in key order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Check if the rendered key starts with `prefix`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.to_string().starts_with(prefix)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespace)?;
        if self.params.is_empty() {
            return Ok(());
        }
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.params {
            serializer.append_pair(name, value);
        }
        write!(f, "?{}", serializer.finish())
    }
}

/// Split on [`LIST_SEPARATOR`], trim, drop blanks, sort and deduplicate list
/// values.
///
/// A value containing the separator becomes several values, so a normalised
/// list joins and splits back to itself.
pub fn normalize_list<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut list: Vec<String> = values
        .into_iter()
        .flat_map(|v| {
            v.as_ref()
                .split(LIST_SEPARATOR)
                .map(|part| part.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .collect();
    list.sort();
    list.dedup();
    list
}
