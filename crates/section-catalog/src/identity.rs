use section_data::SectionType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// System-assigned catalog key, `{normalized_type}_{sequence:04}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(String);

impl UniqueId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UniqueId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Run-wide counter shared by every section of every annotation.
///
/// The candidate id is read with [`peek`](Self::peek) so it can name output
/// files, and only [`advance`](Self::advance)d once the section is actually
/// extracted. Numbers therefore stay contiguous across dropped sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySequence {
    next: u32,
}

impl Default for IdentitySequence {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentitySequence {
    /// Fresh sequence starting at 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn peek(&self, section_type: &SectionType) -> UniqueId {
        format_id(section_type, self.next)
    }

    pub fn advance(&mut self) {
        self.next += 1;
    }

    /// Peek and advance in one step.
    pub fn assign(&mut self, section_type: &SectionType) -> UniqueId {
        let id = self.peek(section_type);
        self.advance();
        id
    }
}

fn format_id(section_type: &SectionType, n: u32) -> UniqueId {
    UniqueId(format!("{}_{:04}", section_type.key(), n))
}
