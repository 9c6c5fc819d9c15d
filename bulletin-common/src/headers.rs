//! Outbound mail headers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered collection of mail headers.
///
/// Header names compare case-insensitively but keep the spelling they were
/// first inserted with, so the rendered block reads the way it was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any existing values with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        if let Some(position) = self.position(&name) {
            self.entries[position].1 = value;
            let mut index = position + 1;
            while index < self.entries.len() {
                if self.entries[index].0.eq_ignore_ascii_case(&name) {
                    self.entries.remove(index);
                } else {
                    index += 1;
                }
            }
        } else {
            self.entries.push((name, value));
        }
    }

    /// Appends a header value without touching existing ones.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|index| self.entries[index].1.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.entries
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_case_insensitively() {
        let mut headers = Headers::new();
        headers.set("X-Priority", "3");
        headers.add("x-priority", "4");
        headers.set("X-PRIORITY", "1");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-priority"), Some("1"));
        assert_eq!(headers.iter().next(), Some(("X-Priority", "1")));
    }

    #[test]
    fn test_display_preserves_order() {
        let headers: Headers = [("From", "a@example.com"), ("Precedence", "bulk")]
            .into_iter()
            .collect();

        assert_eq!(
            headers.to_string(),
            "From: a@example.com\r\nPrecedence: bulk\r\n"
        );
    }

    #[test]
    fn test_remove() {
        let mut headers = Headers::new();
        headers.set("Precedence", "bulk");
        headers.remove("precedence");
        assert!(headers.is_empty());
        assert!(!headers.contains("Precedence"));
    }
}
