//! Parser for the section/key/value format of `chrandr.conf`.
//!
//! Only the document structure is handled here; what the keys mean is up to
//! [`crate::config`].
//!
//! Any indented line continues the value of the entry above it, even when it
//! contains a delimiter.

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub line: usize,
    pub entries: Vec<Entry>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }
}

/// Sections in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub sections: Vec<Section>,
}

impl Document {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let mut sections: Vec<Section> = Vec::new();
        // true while the last meaningful line was an entry that may continue
        let mut open_entry = false;

        for (idx, raw) in input.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim_end();
            let trimmed = line.trim_start();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let indented = trimmed.len() != line.len();

            if indented {
                let entry = sections
                    .last_mut()
                    .and_then(|s| s.entries.last_mut())
                    .filter(|_| open_entry)
                    .ok_or_else(|| ConfigError::Syntax {
                        line: line_no,
                        message: "continuation line without a preceding key".to_string(),
                    })?;
                if !entry.value.is_empty() {
                    entry.value.push('\n');
                }
                entry.value.push_str(trimmed);
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix('[') {
                let name = rest
                    .strip_suffix(']')
                    .map(str::trim)
                    .ok_or_else(|| ConfigError::Syntax {
                        line: line_no,
                        message: format!("unterminated section header '{}'", trimmed),
                    })?;
                if name.is_empty() {
                    return Err(ConfigError::Syntax {
                        line: line_no,
                        message: "empty section name".to_string(),
                    });
                }
                if sections.iter().any(|s| s.name == name) {
                    return Err(ConfigError::DuplicateSection {
                        section: name.to_string(),
                        line: line_no,
                    });
                }
                sections.push(Section {
                    name: name.to_string(),
                    line: line_no,
                    entries: Vec::new(),
                });
                open_entry = false;
                continue;
            }

            let Some(split) = trimmed.find(['=', ':']) else {
                return Err(ConfigError::Syntax {
                    line: line_no,
                    message: format!("expected 'key = value', found '{}'", trimmed),
                });
            };
            let key = trimmed[..split].trim().to_lowercase();
            let value = trimmed[split + 1..].trim().to_string();

            if key.is_empty() {
                return Err(ConfigError::Syntax {
                    line: line_no,
                    message: "empty key".to_string(),
                });
            }

            let section = sections.last_mut().ok_or_else(|| ConfigError::Syntax {
                line: line_no,
                message: format!("key '{}' appears before any [section]", key),
            })?;

            if section.entries.iter().any(|e| e.key == key) {
                return Err(ConfigError::DuplicateKey {
                    section: section.name.clone(),
                    key,
                    line: line_no,
                });
            }

            section.entries.push(Entry {
                key,
                value,
                line: line_no,
            });
            open_entry = true;
        }

        Ok(Self { sections })
    }
}
