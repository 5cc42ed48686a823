//! HTTP header set attached to every fetch request.
//!
//! Field names compare case-insensitively (as HTTP does); insertion order is
//! kept so requests go out with a stable header order.

/// Accept header sent unless the caller overrides or removes it.
pub const DEFAULT_ACCEPT: &str = "image/*;q=0.8";

/// Ordered, case-insensitive collection of header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    fields: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header set every new fetcher starts with (`Accept: image/*;q=0.8`).
    pub fn with_defaults() -> Self {
        let mut headers = Self::new();
        headers.set("Accept", Some(DEFAULT_ACCEPT));
        headers
    }

    /// Set `field` to `value`, replacing any existing value. `None` removes the field.
    pub fn set(&mut self, field: &str, value: Option<&str>) {
        let field = field.trim();
        if field.is_empty() {
            return;
        }
        let pos = self
            .fields
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(field));
        match (pos, value) {
            (Some(i), Some(v)) => self.fields[i].1 = v.trim().to_string(),
            (Some(i), None) => {
                self.fields.remove(i);
            }
            (None, Some(v)) => self.fields.push((field.to_string(), v.trim().to_string())),
            (None, None) => {}
        }
    }

    /// Value of `field`, if present.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(field.trim()))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Lines in `Name: value` form, as handed to curl.
    pub fn to_lines(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{}: {}", k, v)).collect()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = HeaderSet::new();
        for (k, v) in iter {
            headers.set(k.as_ref(), Some(v.as_ref()));
        }
        headers
    }
}
