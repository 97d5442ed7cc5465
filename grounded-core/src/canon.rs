//! Glossary-driven canonical names.
//!
//! Query-side and data-side spellings are both pushed through the same map so
//! equality filters compare canonical labels.

use std::collections::HashMap;

use crate::rows::GlossaryRow;

/// Case-insensitive lookup from any term or synonym to its canonical label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalMap {
    entries: HashMap<String, String>,
}

impl CanonicalMap {
    /// Build the map from glossary rows. Later rows win on key collisions.
    pub fn from_glossary(glossary: &[GlossaryRow]) -> Self {
        let mut entries = HashMap::new();
        for row in glossary {
            let term = row.term.trim();
            let canonical = match row.canonical.trim() {
                "" => term,
                c => c,
            };
            if !term.is_empty() {
                entries.insert(term.to_lowercase(), canonical.to_string());
            }
            for syn in row.synonyms.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                entries.insert(syn.to_lowercase(), canonical.to_string());
            }
        }
        Self { entries }
    }

    /// Canonical label for an already-lowercased key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Trim `value` and map it to its canonical label, or return it unchanged.
    pub fn canonicalize(&self, value: &str) -> String {
        let v = value.trim();
        if v.is_empty() {
            return String::new();
        }
        self.entries
            .get(&v.to_lowercase())
            .cloned()
            .unwrap_or_else(|| v.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
