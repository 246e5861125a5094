//! Sectioned key/value store for the updater's INI dialect
//!
//! The `version` manifest, `UpdaterConfig.ini`, and the update scripts all
//! share one dialect: `[section]` headers, `key=value` lines, `;` comment
//! lines, and comma-separated value lists. The parser tolerates a UTF-8
//! BOM, CRLF or LF endings, and blank lines; duplicate keys resolve to the
//! last value written while keeping the key's original position.

use std::collections::HashMap;
use std::fmt::Write as _;

/// One `[section]` of a store: insertion-ordered keys with their values
#[derive(Debug, Clone, Default)]
pub struct IniSection {
    name: String,
    keys: Vec<String>,
    values: HashMap<String, String>,
}

impl IniSection {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
            values: HashMap::new(),
        }
    }

    /// Section name without brackets
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Look up a value and split it on `,` into trimmed fields
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| value.split(',').map(|f| f.trim().to_string()).collect())
            .unwrap_or_default()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// `(key, value)` pairs in insertion order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().map(|k| {
            (
                k.as_str(),
                self.values.get(k).map(String::as_str).unwrap_or(""),
            )
        })
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the section holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Insert or overwrite a key. Duplicates keep their original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if !self.values.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.values.insert(key, value.into());
    }
}

/// Parsed INI-dialect document
#[derive(Debug, Clone, Default)]
pub struct IniStore {
    sections: Vec<IniSection>,
    index: HashMap<String, usize>,
}

impl IniStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document. Parsing never fails; unrecognized lines are
    /// dropped and keys outside any section are ignored.
    pub fn parse(text: &str) -> Self {
        let mut store = Self::new();
        let mut current: Option<usize> = None;

        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(store.section_entry(name.trim()));
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                if let Some(section) = current {
                    store.sections[section].set(key.trim(), value.trim());
                }
            }
        }

        store
    }

    /// Look up a section
    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.index.get(name).map(|&i| &self.sections[i])
    }

    /// Look up a key inside a section
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    /// Sections in document order
    pub fn sections(&self) -> impl Iterator<Item = &IniSection> {
        self.sections.iter()
    }

    /// Insert or overwrite a key, creating the section if needed
    pub fn set(&mut self, section: &str, key: impl Into<String>, value: impl Into<String>) {
        let index = self.section_entry(section);
        self.sections[index].set(key, value);
    }

    /// Render the store back to INI text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            let _ = writeln!(out, "[{}]", section.name);
            for (key, value) in section.entries() {
                let _ = writeln!(out, "{key}={value}");
            }
            let _ = writeln!(out);
        }
        out
    }

    fn section_entry(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        self.sections.push(IniSection::new(name));
        let i = self.sections.len() - 1;
        self.index.insert(name.to_string(), i);
        i
    }
}
