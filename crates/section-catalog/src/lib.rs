use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use section_crop::CroppedFiles;
use section_data::{Coordinates, SectionSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

mod identity;

pub use identity::{IdentitySequence, UniqueId};

/// `type -> [unique_id]`, in catalog order within each type.
pub type TypesIndex = BTreeMap<String, Vec<UniqueId>>;

/// Keys owned by [`ExtractedSection`]. Annotator keys with these names are
/// dropped at extraction and enrichment may not reuse them.
const RESERVED_KEYS: &[&str] = &[
    "unique_id",
    "id",
    "type",
    "type_label",
    "coordinates",
    "source_image",
    "source_file",
    "cropped_files",
    "processing_date",
];

/// A section that was cropped and identified. One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSection {
    pub unique_id: UniqueId,
    pub id: String,
    /// Normalized type key.
    #[serde(rename = "type")]
    pub section_type: String,
    /// Type as the annotator wrote it.
    pub type_label: String,
    /// Coordinates as annotated (before clamping).
    pub coordinates: Coordinates,
    pub source_image: String,
    pub source_file: String,
    pub cropped_files: CroppedFiles,
    pub processing_date: DateTime<Utc>,
    /// Annotator keys plus anything appended later by enrichment.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtractedSection {
    pub fn new(
        spec: SectionSpec,
        unique_id: UniqueId,
        source_image: impl Into<String>,
        source_file: impl Into<String>,
        cropped_files: CroppedFiles,
        processing_date: DateTime<Utc>,
    ) -> Self {
        let mut extra = spec.extra;
        extra.retain(|key, _| {
            let reserved = RESERVED_KEYS.contains(&key.as_str());
            if reserved {
                debug!("{}: dropping annotator key '{}'", unique_id, key);
            }
            !reserved
        });

        Self {
            unique_id,
            id: spec.id,
            section_type: spec.section_type.key().to_string(),
            type_label: spec.section_type.label().to_string(),
            coordinates: spec.coordinates,
            source_image: source_image.into(),
            source_file: source_file.into(),
            cropped_files,
            processing_date,
            extra,
        }
    }

    /// Add a new top-level key (e.g. `performance_metrics`). Existing keys,
    /// whether built in or previously appended, are never overwritten.
    pub fn append_field(&mut self, key: &str, value: Value) -> Result<()> {
        if RESERVED_KEYS.contains(&key) || self.extra.contains_key(key) {
            bail!("{} already has a '{}' field", self.unique_id, key);
        }
        self.extra.insert(key.to_string(), value);
        Ok(())
    }
}

/// Sections of one type, as positions into the flat list.
#[derive(Debug, Clone)]
struct TypeGroup {
    section_type: String,
    members: Vec<usize>,
}

/// Accumulates extracted sections in discovery order, grouped by type.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    modules: Vec<ExtractedSection>,
    groups: Vec<TypeGroup>,
    group_index: HashMap<String, usize>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, section: ExtractedSection) {
        let position = self.modules.len();
        let group = match self.group_index.get(&section.section_type).copied() {
            Some(g) => g,
            None => {
                self.groups.push(TypeGroup {
                    section_type: section.section_type.clone(),
                    members: Vec::new(),
                });
                let g = self.groups.len() - 1;
                self.group_index.insert(section.section_type.clone(), g);
                g
            }
        };
        self.groups[group].members.push(position);
        debug!("Cataloged {} ({})", section.unique_id, section.section_type);
        self.modules.push(section);
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Types in the order they were first seen.
    pub fn section_types(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.section_type.as_str())
    }

    /// Freeze the accumulator into the catalog document.
    pub fn finalize(self, source_stores: usize, generated: DateTime<Utc>) -> CatalogDocument {
        let types_index: TypesIndex = self
            .groups
            .iter()
            .map(|g| {
                let ids = g
                    .members
                    .iter()
                    .map(|&i| self.modules[i].unique_id.clone())
                    .collect();
                (g.section_type.clone(), ids)
            })
            .collect();

        let metadata = CatalogMetadata {
            generated,
            total_modules: self.modules.len(),
            source_stores,
            section_types: self.groups.into_iter().map(|g| g.section_type).collect(),
        };

        info!(
            "Catalog finalized: {} modules across {} types",
            metadata.total_modules,
            metadata.section_types.len()
        );

        CatalogDocument {
            metadata,
            modules: self.modules,
            types_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub generated: DateTime<Utc>,
    pub total_modules: usize,
    pub source_stores: usize,
    /// Types in first-seen order.
    pub section_types: Vec<String>,
}

/// The terminal artifact of a run: `modules_catalog.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub metadata: CatalogMetadata,
    pub modules: Vec<ExtractedSection>,
    pub types_index: TypesIndex,
}

impl CatalogDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize catalog")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Recompute the type index from `modules`.
    pub fn rebuild_types_index(&self) -> TypesIndex {
        let mut index = TypesIndex::new();
        for module in &self.modules {
            index
                .entry(module.section_type.clone())
                .or_default()
                .push(module.unique_id.clone());
        }
        index
    }

    /// Whether `types_index` covers exactly the modules, with no orphans.
    pub fn is_consistent(&self) -> bool {
        self.types_index == self.rebuild_types_index()
            && self.metadata.total_modules == self.modules.len()
    }

    /// Sections grouped by type, types in first-seen order.
    pub fn groups(&self) -> Vec<(&str, Vec<&ExtractedSection>)> {
        let mut groups: Vec<(&str, Vec<&ExtractedSection>)> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for module in &self.modules {
            let key = module.section_type.as_str();
            match positions.get(key) {
                Some(&g) => groups[g].1.push(module),
                None => {
                    positions.insert(key, groups.len());
                    groups.push((key, vec![module]));
                }
            }
        }
        groups
    }

    pub fn get(&self, unique_id: &str) -> Option<&ExtractedSection> {
        self.modules.iter().find(|m| m.unique_id.as_str() == unique_id)
    }

    /// Modules cut from a given annotated screenshot, for joining external
    /// per-store data.
    pub fn by_source_image<'a>(
        &'a self,
        source_image: &'a str,
    ) -> impl Iterator<Item = &'a ExtractedSection> + 'a {
        self.modules
            .iter()
            .filter(move |m| m.source_image == source_image || m.source_file == source_image)
    }

    /// Owned copy for downstream enrichment; the original stays untouched.
    pub fn enriched_copy(&self) -> CatalogDocument {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use section_crop::{DerivativeDimensions, Dimensions};
    use section_data::SectionType;
    use serde_json::json;

    fn files(id: &str) -> CroppedFiles {
        let d = Dimensions::new(10, 10);
        CroppedFiles {
            full: format!("images/full/{}.png", id),
            medium: format!("images/medium/{}_medium.png", id),
            thumbnail: format!("images/thumbnails/{}_thumb.png", id),
            dimensions: DerivativeDimensions {
                original: d,
                medium: d,
                thumbnail: d,
            },
        }
    }

    fn section(seq: &mut IdentitySequence, label: &str, source: &str) -> ExtractedSection {
        let spec = SectionSpec {
            id: "s".into(),
            section_type: SectionType::new(label).unwrap(),
            coordinates: Coordinates {
                x: 0,
                y: 0,
                width: 100,
                height: 50,
            },
            extra: Map::new(),
        };
        let id = seq.assign(&spec.section_type);
        let cropped = files(id.as_str());
        ExtractedSection::new(spec, id, source, source, cropped, Utc::now())
    }

    fn build(labels: &[&str]) -> CatalogBuilder {
        let mut seq = IdentitySequence::new();
        let mut builder = CatalogBuilder::new();
        for (i, label) in labels.iter().enumerate() {
            let source = if i % 2 == 0 { "a.png" } else { "b.png" };
            builder.push(section(&mut seq, label, source));
        }
        builder
    }

    #[test]
    fn test_groups_keep_insertion_order() {
        let builder = build(&["hero", "footer", "Hero", "testimonial", "hero"]);
        assert_eq!(
            builder.section_types().collect::<Vec<_>>(),
            ["hero", "footer", "testimonial"]
        );
        let catalog = builder.finalize(2, Utc::now());
        assert_eq!(
            catalog.types_index["hero"],
            vec![
                UniqueId::from("hero_0001"),
                UniqueId::from("hero_0003"),
                UniqueId::from("hero_0005")
            ]
        );
        assert!(!catalog.types_index.contains_key("video"));
    }

    #[test]
    fn test_annotator_keys_cannot_shadow_system_keys() {
        let mut extra = Map::new();
        extra.insert("unique_id".into(), json!("annotator_x"));
        extra.insert("source_file".into(), json!("elsewhere.png"));
        extra.insert("processing_date".into(), json!("yesterday"));
        extra.insert("note".into(), json!("keep me"));
        let spec = SectionSpec {
            id: "s1".into(),
            section_type: SectionType::new("hero").unwrap(),
            coordinates: Coordinates {
                x: 0,
                y: 0,
                width: 100,
                height: 50,
            },
            extra,
        };
        let mut seq = IdentitySequence::new();
        let id = seq.assign(&spec.section_type);
        let cropped = files(id.as_str());
        let mut builder = CatalogBuilder::new();
        builder.push(ExtractedSection::new(spec, id, "a.png", "a.png", cropped, Utc::now()));
        let catalog = builder.finalize(1, Utc::now());

        let module = &catalog.modules[0];
        assert_eq!(module.extra.len(), 1);
        assert_eq!(module.extra["note"], "keep me");

        let json = serde_json::to_string_pretty(&catalog).unwrap();
        assert_eq!(json.matches("\"unique_id\"").count(), 1);
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["modules"][0]["unique_id"], "hero_0001");
        assert_eq!(value["modules"][0]["source_file"], "a.png");

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("modules_catalog.json");
        catalog.save(&path).unwrap();
        assert_eq!(CatalogDocument::load(&path).unwrap(), catalog);
    }

    #[test]
    fn test_finalize_index_matches_modules() {
        let catalog = build(&["hero", "footer", "hero", "Product Selector"]).finalize(2, Utc::now());
        assert_eq!(catalog.metadata.total_modules, 4);
        assert_eq!(catalog.metadata.source_stores, 2);
        assert_eq!(
            catalog.metadata.section_types,
            ["hero", "footer", "product_selector"]
        );
        assert_eq!(
            catalog.types_index["hero"],
            vec![UniqueId::from("hero_0001"), UniqueId::from("hero_0003")]
        );
        assert_eq!(catalog.types_index, catalog.rebuild_types_index());
        assert!(catalog.is_consistent());

        let mut broken = catalog.clone();
        broken.modules.pop();
        assert!(!broken.is_consistent());
    }

    #[test]
    fn test_catalog_json_shape() {
        let catalog = build(&["Hero Banner"]).finalize(1, Utc::now());
        let value = serde_json::to_value(&catalog).unwrap();
        let module = &value["modules"][0];
        assert_eq!(module["unique_id"], "hero_banner_0001");
        assert_eq!(module["type"], "hero_banner");
        assert_eq!(module["type_label"], "Hero Banner");
        assert_eq!(module["coordinates"]["width"], 100);
        assert_eq!(module["source_image"], "a.png");
        assert_eq!(module["cropped_files"]["dimensions"]["medium"]["width"], 10);
        assert_eq!(value["types_index"]["hero_banner"], json!(["hero_banner_0001"]));
        assert_eq!(value["metadata"]["total_modules"], 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("modules_catalog.json");
        let catalog = build(&["hero", "footer"]).finalize(1, Utc::now());
        catalog.save(&path).unwrap();
        let loaded = CatalogDocument::load(&path).unwrap();
        assert_eq!(loaded, catalog);
    }

    #[test]
    fn test_append_field_is_append_only() {
        let catalog = build(&["hero"]).finalize(1, Utc::now());
        let mut copy = catalog.enriched_copy();
        let module = &mut copy.modules[0];

        module
            .append_field("performance_metrics", json!({"conversion_rate": 0.04}))
            .unwrap();
        assert!(module.append_field("performance_metrics", json!({})).is_err());
        assert!(module.append_field("type", json!("other")).is_err());
        assert_eq!(module.section_type, "hero");

        assert!(catalog.modules[0].extra.is_empty());
        let value = serde_json::to_value(&copy.modules[0]).unwrap();
        assert_eq!(value["performance_metrics"]["conversion_rate"], 0.04);
    }

    #[test]
    fn test_lookup_helpers() {
        let catalog = build(&["hero", "footer", "hero"]).finalize(2, Utc::now());
        assert_eq!(catalog.get("footer_0002").unwrap().section_type, "footer");
        assert!(catalog.get("footer_0009").is_none());
        let from_a: Vec<&str> = catalog
            .by_source_image("a.png")
            .map(|m| m.unique_id.as_str())
            .collect();
        assert_eq!(from_a, ["hero_0001", "hero_0003"]);

        let groups = catalog.groups();
        assert_eq!(groups[0].0, "hero");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "footer");
    }
}
