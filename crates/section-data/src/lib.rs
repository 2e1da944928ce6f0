use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

mod error;
mod loader;

pub use error::{ErrorLog, ItemError};
pub use loader::{
    resolve_screenshot, validate_annotation, AnnotationLoader, LoadOutcome, ANNOTATION_PREFIX,
    ANNOTATION_SUFFIX,
};

/// Rectangle in source-image pixel space, exactly as annotated.
/// Values may be negative or exceed the image; clamping happens at crop time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Coordinates {
    /// `width * height`, saturating at the `i64` bounds.
    pub fn area(&self) -> i64 {
        self.width.saturating_mul(self.height)
    }
}

/// Free-form section tag from the annotator, normalized once at ingestion.
///
/// `label` is what the annotator wrote ("Hero Banner"); `key` is the form
/// every consumer groups and names things by ("hero_banner").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SectionType {
    label: String,
    key: String,
}

impl SectionType {
    pub fn new(label: impl Into<String>) -> Result<Self, InvalidSectionType> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(InvalidSectionType);
        }
        let key = normalize_type(&label);
        Ok(Self { label, key })
    }

    /// Normalized grouping key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Label as written in the annotation record.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl TryFrom<String> for SectionType {
    type Error = InvalidSectionType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SectionType> for String {
    fn from(value: SectionType) -> Self {
        value.label
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSectionType;

impl fmt::Display for InvalidSectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("section type must not be blank")
    }
}

impl std::error::Error for InvalidSectionType {}

/// Lower-case the tag and turn whitespace (and anything else outside
/// `[a-z0-9_]`) into underscores.
pub fn normalize_type(label: &str) -> String {
    label
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// One labeled rectangle inside an annotation, before extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSpec {
    /// Annotator-supplied id. Not unique across annotations.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub coordinates: Coordinates,
    /// Any other keys the annotator attached; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-store annotation record describing one screenshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub source_image: String,
    pub image_dimensions: Map<String, Value>,
    pub sections: Vec<SectionSpec>,
}

impl Annotation {
    /// Width/height the annotator recorded, when both are present as integers.
    pub fn declared_size(&self) -> Option<(u64, u64)> {
        let width = self.image_dimensions.get("width")?.as_u64()?;
        let height = self.image_dimensions.get("height")?.as_u64()?;
        Some((width, height))
    }
}

/// An annotation that passed validation and is bound to a screenshot on disk.
#[derive(Debug, Clone)]
pub struct LoadedAnnotation {
    pub annotation: Annotation,
    pub screenshot_path: PathBuf,
    pub annotation_file: PathBuf,
}

impl LoadedAnnotation {
    /// File name of the resolved screenshot (may differ from `source_image`
    /// when the whitespace-stripped fallback matched).
    pub fn screenshot_file_name(&self) -> String {
        self.screenshot_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_type() {
        assert_eq!(normalize_type("Hero Banner"), "hero_banner");
        assert_eq!(normalize_type("product_selector"), "product_selector");
        assert_eq!(normalize_type("Text\tBlock"), "text_block");
        assert_eq!(normalize_type("Link-Out Image"), "link_out_image");
    }

    #[test]
    fn test_blank_type_rejected() {
        assert!(SectionType::new("   ").is_err());
        assert!(SectionType::new("").is_err());
    }

    #[test]
    fn test_section_spec_keeps_extra_keys() {
        let json = r#"{
            "id": 7,
            "type": "Hero",
            "coordinates": {"x": 1, "y": 2, "width": 3, "height": 4},
            "notes": "above the fold"
        }"#;
        let spec: SectionSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.id, "7");
        assert_eq!(spec.section_type.key(), "hero");
        assert_eq!(spec.section_type.label(), "Hero");
        assert_eq!(spec.coordinates.area(), 12);

        let huge = Coordinates {
            x: 0,
            y: 0,
            width: 4_000_000_000,
            height: 4_000_000_000,
        };
        assert_eq!(huge.area(), i64::MAX);
        assert_eq!(spec.extra.get("notes"), Some(&Value::from("above the fold")));

        let back = serde_json::to_value(&spec).unwrap();
        assert_eq!(back["type"], "Hero");
        assert_eq!(back["notes"], "above the fold");
    }

    #[test]
    fn test_declared_size() {
        let json = r#"{
            "source_image": "s1.png",
            "image_dimensions": {"width": 1000, "height": 2000},
            "sections": []
        }"#;
        let annotation: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(annotation.declared_size(), Some((1000, 2000)));
    }
}
