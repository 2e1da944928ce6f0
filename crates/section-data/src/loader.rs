use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{Annotation, ErrorLog, ItemError, LoadedAnnotation};

/// Annotation records are `annotations_<store>.json`.
pub const ANNOTATION_PREFIX: &str = "annotations_";
pub const ANNOTATION_SUFFIX: &str = ".json";

const REQUIRED_FIELDS: [&str; 3] = ["source_image", "image_dimensions", "sections"];
const REQUIRED_SECTION_FIELDS: [&str; 3] = ["id", "type", "coordinates"];

/// Output of a loading pass.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub annotations: Vec<LoadedAnnotation>,
    pub files_discovered: usize,
    pub files_processed: usize,
}

/// Reads annotation records and binds each to its screenshot.
#[derive(Debug, Clone)]
pub struct AnnotationLoader {
    annotations_dir: PathBuf,
    screenshots_dir: PathBuf,
}

impl AnnotationLoader {
    pub fn new(annotations_dir: impl Into<PathBuf>, screenshots_dir: impl Into<PathBuf>) -> Self {
        Self {
            annotations_dir: annotations_dir.into(),
            screenshots_dir: screenshots_dir.into(),
        }
    }

    /// List annotation record files in filename order.
    /// A missing annotations directory is fatal for the run.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.annotations_dir.is_dir() {
            bail!(
                "Annotations directory not found: {}",
                self.annotations_dir.display()
            );
        }

        let entries = std::fs::read_dir(&self.annotations_dir).with_context(|| {
            format!(
                "Failed to read annotations directory {}",
                self.annotations_dir.display()
            )
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read annotations directory entry")?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if path.is_file()
                && name.starts_with(ANNOTATION_PREFIX)
                && name.ends_with(ANNOTATION_SUFFIX)
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Load every discovered record. Per-record failures go to `errors`;
    /// only directory-level failures are returned as `Err`.
    pub fn load_all(&self, errors: &mut ErrorLog) -> Result<LoadOutcome> {
        let files = self.discover()?;
        info!("Found {} annotation files", files.len());

        let mut outcome = LoadOutcome {
            files_discovered: files.len(),
            ..LoadOutcome::default()
        };

        for path in files {
            match self.load_file(&path) {
                Ok(loaded) => {
                    info!("Loaded: {}", display_name(&path));
                    outcome.annotations.push(loaded);
                    outcome.files_processed += 1;
                }
                Err(e) => errors.record(&e),
            }
        }

        info!(
            "Successfully loaded {} of {} annotation files",
            outcome.files_processed, outcome.files_discovered
        );
        Ok(outcome)
    }

    /// Read, validate and resolve a single annotation record.
    pub fn load_file(&self, path: &Path) -> Result<LoadedAnnotation, ItemError> {
        let file = display_name(path);
        let content = std::fs::read_to_string(path).map_err(|e| ItemError::Unreadable {
            file: file.clone(),
            reason: e.to_string(),
        })?;
        let value: Value = serde_json::from_str(&content).map_err(|e| ItemError::Unreadable {
            file: file.clone(),
            reason: e.to_string(),
        })?;

        let annotation = validate_annotation(&value, &file)?;

        let screenshot_path = resolve_screenshot(&self.screenshots_dir, &annotation.source_image)
            .ok_or_else(|| ItemError::Unresolved {
                source_image: annotation.source_image.clone(),
            })?;
        debug!(
            "{} -> {} ({} sections)",
            file,
            screenshot_path.display(),
            annotation.sections.len()
        );

        Ok(LoadedAnnotation {
            annotation,
            screenshot_path,
            annotation_file: path.to_path_buf(),
        })
    }
}

/// Check required fields on the record and on every section, then decode it.
/// Any failure rejects the whole record.
pub fn validate_annotation(value: &Value, file: &str) -> Result<Annotation, ItemError> {
    let Some(record) = value.as_object() else {
        return Err(ItemError::Malformed {
            file: file.to_string(),
            reason: "top level must be an object".into(),
        });
    };

    for field in REQUIRED_FIELDS {
        if !record.contains_key(field) {
            return Err(ItemError::MissingField {
                field,
                file: file.to_string(),
            });
        }
    }

    let Some(sections) = record["sections"].as_array() else {
        return Err(ItemError::Malformed {
            file: file.to_string(),
            reason: "'sections' must be a list".into(),
        });
    };

    for (index, section) in sections.iter().enumerate() {
        let Some(section) = section.as_object() else {
            return Err(ItemError::Malformed {
                file: file.to_string(),
                reason: format!("section {} must be an object", index),
            });
        };
        for field in REQUIRED_SECTION_FIELDS {
            if !section.contains_key(field) {
                return Err(ItemError::MissingSectionField {
                    field,
                    index,
                    file: file.to_string(),
                });
            }
        }
    }

    Annotation::deserialize(value).map_err(|e| ItemError::Malformed {
        file: file.to_string(),
        reason: e.to_string(),
    })
}

/// Exact filename first, then the same name with all whitespace removed.
pub fn resolve_screenshot(screenshots_dir: &Path, source_image: &str) -> Option<PathBuf> {
    let exact = screenshots_dir.join(source_image);
    if exact.is_file() {
        return Some(exact);
    }

    let stripped: String = source_image.chars().filter(|c| !c.is_whitespace()).collect();
    let alt = screenshots_dir.join(stripped);
    if alt.is_file() {
        debug!(
            "Resolved '{}' via whitespace-stripped name {}",
            source_image,
            alt.display()
        );
        return Some(alt);
    }

    None
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
