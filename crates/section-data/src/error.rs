use serde::Serialize;
use tracing::warn;

/// A recoverable failure scoped to one annotation record or one section.
/// The run records it and moves on to the next item.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("Missing required field '{field}' in {file}")]
    MissingField { field: &'static str, file: String },

    #[error("Missing '{field}' in section {index} of {file}")]
    MissingSectionField {
        field: &'static str,
        index: usize,
        file: String,
    },

    #[error("Malformed annotation {file}: {reason}")]
    Malformed { file: String, reason: String },

    #[error("Error loading {file}: {reason}")]
    Unreadable { file: String, reason: String },

    #[error("No matching screenshot found for: {source_image}")]
    Unresolved { source_image: String },

    #[error("Invalid crop dimensions for {section}: {width}x{height}")]
    Geometry {
        section: String,
        width: i64,
        height: i64,
    },

    #[error("Error processing {context}: {reason}")]
    Image { context: String, reason: String },
}

impl ItemError {
    pub fn image(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ItemError::Image {
            context: context.into(),
            reason: err.to_string(),
        }
    }
}

/// Run-wide, append-only list of rendered item errors.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ErrorLog {
    entries: Vec<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, err: &ItemError) {
        warn!("{}", err);
        self.entries.push(err.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}
