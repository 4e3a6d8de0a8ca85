//! HTTP header map with case-insensitive name lookup.
//!
//! Header names are case-insensitive and order-preserving per RFC 9110 §5.

use std::fmt;

/// A case-insensitive HTTP header map that preserves insertion order.
///
/// Backed by a plain `Vec` — the handful of headers on a proxy request or
/// response never justifies a hash map.
///
/// # Examples
///
/// ```
/// use cachet::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("X-Cache", "HIT");
///
/// assert_eq!(headers.get("x-cache"), Some("HIT"));
/// assert!(headers.contains("X-CACHE"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with pre-allocated capacity for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the first value for the given header name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries with the given name. Returns `true` if any were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the number of header entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = Headers::new();
        h.insert("X-Cache", "MISS");
        assert_eq!(h.get("x-cache"), Some("MISS"));
        assert_eq!(h.get("X-CACHE"), Some("MISS"));
    }

    #[test]
    fn first_value_wins_on_get() {
        let mut h = Headers::new();
        h.insert("Accept", "application/json");
        h.insert("accept", "text/html");
        assert_eq!(h.get("accept"), Some("application/json"));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn remove_clears_every_occurrence() {
        let mut h = Headers::new();
        h.insert("X-Forwarded-For", "10.0.0.1");
        h.insert("x-forwarded-for", "10.0.0.2");
        assert!(h.remove("X-Forwarded-For"));
        assert!(h.is_empty());
        assert!(!h.remove("X-Forwarded-For"));
    }

    #[test]
    fn insertion_order_preserved() {
        let mut h = Headers::new();
        h.insert("A", "1");
        h.insert("B", "2");
        let names: Vec<_> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}
