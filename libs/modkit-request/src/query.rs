//! Query-string encoding.

use crate::error::HttpError;
use crate::json::JsonSource;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Ordered multimap of query parameters.
///
/// Keys are kept sorted so the encoded string is stable; repeated values of a
/// key keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryValues {
    inner: BTreeMap<String, Vec<String>>,
}

impl QueryValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to `key`, keeping existing values.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.inner.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Replace all values of `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.inner.insert(key.into(), vec![value.into()]);
        self
    }

    /// First value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values of `key`, in insertion order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.inner.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Form-encode as `key=value` pairs joined with `&`.
    ///
    /// # Errors
    /// Returns [`HttpError::QueryEncoding`] if the encoder rejects the input.
    pub fn encode(&self) -> Result<String, HttpError> {
        let pairs: Vec<(&str, &str)> = self
            .inner
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |v| (key.as_str(), v.as_str())))
            .collect();
        serde_urlencoded::to_string(pairs).map_err(|e| HttpError::QueryEncoding(Box::new(e)))
    }
}

impl<K, V> FromIterator<(K, V)> for QueryValues
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (key, value) in iter {
            values.add(key, value);
        }
        values
    }
}

/// Query parameters attached to a request.
pub enum Query {
    /// Explicit key/value multimap.
    Values(QueryValues),
    /// Record whose serialized fields become parameters.
    ///
    /// Field names are lower-cased. Strings are used verbatim, numbers and
    /// booleans in their textual form, `null` as an empty value. Sequences
    /// produce one pair per element; nested objects are sent as JSON text.
    Record(Arc<dyn JsonSource>),
}

impl Query {
    /// Query built from the fields of a serializable record.
    #[must_use]
    pub fn record<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Query::Record(Arc::new(value))
    }

    /// Encode to a query string without the leading `?`.
    ///
    /// # Errors
    /// Returns [`HttpError::QueryEncoding`] if a record cannot be serialized
    /// or does not serialize to an object.
    pub fn encode(&self) -> Result<String, HttpError> {
        match self {
            Query::Values(values) => values.encode(),
            Query::Record(record) => record_values(record.as_ref())?.encode(),
        }
    }
}

impl From<QueryValues> for Query {
    fn from(values: QueryValues) -> Self {
        Query::Values(values)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Values(values) => f.debug_tuple("Values").field(values).finish(),
            Query::Record(_) => f.write_str("Record(..)"),
        }
    }
}

fn record_values(record: &dyn JsonSource) -> Result<QueryValues, HttpError> {
    let value = record
        .to_json_value()
        .map_err(|e| HttpError::QueryEncoding(Box::new(e)))?;

    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(HttpError::QueryEncoding(
                format!("query record must serialize to an object, got {}", kind_of(&other))
                    .into(),
            ));
        }
    };

    let mut values = QueryValues::new();
    for (name, field) in &fields {
        let key = name.to_lowercase();
        match field {
            Value::Array(items) => {
                for item in items {
                    values.add(key.as_str(), value_text(item));
                }
            }
            other => {
                values.add(key, value_text(other));
            }
        }
    }
    Ok(values)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Attach an encoded query string to `uri`.
///
/// The query goes before any `#fragment`. It is joined with `?` when `uri`
/// has no query yet and with `&` otherwise. An empty query leaves `uri`
/// untouched.
#[must_use]
pub fn append_query(uri: &str, query: &str) -> String {
    if query.is_empty() {
        return uri.to_owned();
    }
    let (base, fragment) = match uri.find('#') {
        Some(idx) => uri.split_at(idx),
        None => (uri, ""),
    };
    let separator = if base.ends_with(['?', '&']) {
        ""
    } else if base.contains('?') {
        "&"
    } else {
        "?"
    };
    format!("{base}{separator}{query}{fragment}")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_values_sorted_with_repeats() {
        let mut values = QueryValues::new();
        values.add("name", "marcos");
        values.add("friend", "jonas");
        values.add("friend", "peter");

        assert_eq!(
            values.encode().unwrap(),
            "friend=jonas&friend=peter&name=marcos"
        );
        assert_eq!(values.get("friend"), Some("jonas"));
        assert_eq!(values.get_all("friend"), ["jonas", "peter"]);
    }

    #[test]
    fn test_values_are_form_encoded() {
        let values: QueryValues = [("q", "a b&c"), ("x", "\u{e9}")].into_iter().collect();
        assert_eq!(values.encode().unwrap(), "q=a+b%26c&x=%C3%A9");
    }

    #[test]
    fn test_set_replaces_values() {
        let mut values = QueryValues::new();
        values.add("k", "1").add("k", "2");
        values.set("k", "3");
        assert_eq!(values.get_all("k"), ["3"]);
    }

    #[derive(Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct Paging {
        limit: u32,
        skip: u32,
    }

    #[test]
    fn test_record_fields_lowercased() {
        let query = Query::record(Paging { limit: 3, skip: 5 });
        assert_eq!(query.encode().unwrap(), "limit=3&skip=5");
    }

    #[derive(Serialize)]
    struct Filter {
        tags: Vec<&'static str>,
        active: bool,
        owner: Option<String>,
        range: BTreeMap<&'static str, u8>,
    }

    #[test]
    fn test_record_value_kinds() {
        let query = Query::record(Filter {
            tags: vec!["a", "b"],
            active: true,
            owner: None,
            range: BTreeMap::from([("min", 1)]),
        });
        assert_eq!(
            query.encode().unwrap(),
            "active=true&owner=&range=%7B%22min%22%3A1%7D&tags=a&tags=b"
        );
    }

    #[test]
    fn test_non_record_rejected() {
        let err = Query::record(vec![1, 2]).encode().unwrap_err();
        assert!(matches!(err, HttpError::QueryEncoding(_)), "got: {err:?}");
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_record_with_nan_rejected() {
        #[derive(Serialize)]
        struct Ratio {
            value: f64,
        }
        let err = Query::record(Ratio { value: f64::NAN }).encode().unwrap_err();
        assert!(matches!(err, HttpError::QueryEncoding(_)));
    }

    #[test]
    fn test_append_query() {
        assert_eq!(append_query("http://h/p", "a=1"), "http://h/p?a=1");
        assert_eq!(append_query("http://h/p?x=0", "a=1"), "http://h/p?x=0&a=1");
        assert_eq!(append_query("http://h/p?", "a=1"), "http://h/p?a=1");
        assert_eq!(append_query("http://h/p#frag", "a=1"), "http://h/p?a=1#frag");
        assert_eq!(append_query("http://h/p?x=0#f", "a=1"), "http://h/p?x=0&a=1#f");
        assert_eq!(append_query("http://h/p", ""), "http://h/p");
    }
}
