use anyhow::{Context, Result};
use section_catalog::{CatalogDocument, ExtractedSection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

mod frequency;

pub use frequency::FrequencyCounter;

const TOP_DIMENSIONS: usize = 5;
const TOP_ASPECT_RATIOS: usize = 3;
const TOP_TYPES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionCount {
    pub width: i64,
    pub height: i64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectRatioCount {
    pub ratio: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeRange {
    pub min_area: i64,
    pub max_area: i64,
}

/// Dimension statistics for one section type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypePattern {
    pub count: usize,
    pub common_dimensions: Vec<DimensionCount>,
    pub common_aspect_ratios: Vec<AspectRatioCount>,
    pub avg_area: f64,
    pub size_range: SizeRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub section_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyAnalysis {
    pub most_common_types: Vec<TypeCount>,
    pub total_sections: usize,
    pub unique_types: usize,
}

/// `patterns.json`: derived from a finalized catalog, never fed back into it.
///
/// Ties in the "most common" lists keep first-encountered order; which of
/// several equally frequent entries makes the cut is not otherwise defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    pub section_types: BTreeMap<String, TypePattern>,
    pub frequency_analysis: FrequencyAnalysis,
}

impl PatternReport {
    pub fn analyze(catalog: &CatalogDocument) -> Self {
        let mut section_types = BTreeMap::new();
        for (section_type, members) in catalog.groups() {
            debug!("Analyzing {}: {} sections", section_type, members.len());
            section_types.insert(section_type.to_string(), type_pattern(&members));
        }

        let types = type_frequencies(catalog);
        let frequency_analysis = FrequencyAnalysis {
            most_common_types: types.iter().take(TOP_TYPES).cloned().collect(),
            total_sections: catalog.modules.len(),
            unique_types: types.len(),
        };

        info!(
            "Pattern analysis: {} sections, {} types",
            frequency_analysis.total_sections, frequency_analysis.unique_types
        );

        Self {
            section_types,
            frequency_analysis,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize patterns")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Every type with its section count, most frequent first.
pub fn type_frequencies(catalog: &CatalogDocument) -> Vec<TypeCount> {
    let counter: FrequencyCounter<&str> = catalog
        .modules
        .iter()
        .map(|m| m.section_type.as_str())
        .collect();
    counter
        .most_common(counter.len())
        .into_iter()
        .map(|(section_type, count)| TypeCount {
            section_type: section_type.to_string(),
            count,
        })
        .collect()
}

/// `width / height` in hundredths; a zero height maps to 0.
fn aspect_ratio_key(width: i64, height: i64) -> i64 {
    if height == 0 {
        return 0;
    }
    (width as f64 / height as f64 * 100.0).round() as i64
}

fn type_pattern(members: &[&ExtractedSection]) -> TypePattern {
    let mut dimensions = FrequencyCounter::new();
    let mut ratios = FrequencyCounter::new();
    let mut areas = Vec::with_capacity(members.len());

    for section in members {
        let c = &section.coordinates;
        dimensions.add((c.width, c.height));
        ratios.add(aspect_ratio_key(c.width, c.height));
        areas.push(c.area());
    }

    let avg_area = if areas.is_empty() {
        0.0
    } else {
        areas.iter().map(|&a| a as f64).sum::<f64>() / areas.len() as f64
    };

    TypePattern {
        count: members.len(),
        common_dimensions: dimensions
            .most_common(TOP_DIMENSIONS)
            .into_iter()
            .map(|((width, height), count)| DimensionCount {
                width,
                height,
                count,
            })
            .collect(),
        common_aspect_ratios: ratios
            .most_common(TOP_ASPECT_RATIOS)
            .into_iter()
            .map(|(key, count)| AspectRatioCount {
                ratio: key as f64 / 100.0,
                count,
            })
            .collect(),
        avg_area,
        size_range: SizeRange {
            min_area: areas.iter().copied().min().unwrap_or(0),
            max_area: areas.iter().copied().max().unwrap_or(0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use section_catalog::{CatalogBuilder, IdentitySequence};
    use section_crop::{CroppedFiles, DerivativeDimensions, Dimensions};
    use section_data::{Coordinates, SectionSpec, SectionType};

    fn catalog(sections: &[(&str, i64, i64)]) -> CatalogDocument {
        let mut seq = IdentitySequence::new();
        let mut builder = CatalogBuilder::new();
        let d = Dimensions::new(1, 1);
        for &(label, width, height) in sections {
            let spec = SectionSpec {
                id: "x".into(),
                section_type: SectionType::new(label).unwrap(),
                coordinates: Coordinates {
                    x: 0,
                    y: 0,
                    width,
                    height,
                },
                extra: Default::default(),
            };
            let id = seq.assign(&spec.section_type);
            let files = CroppedFiles {
                full: String::new(),
                medium: String::new(),
                thumbnail: String::new(),
                dimensions: DerivativeDimensions {
                    original: d,
                    medium: d,
                    thumbnail: d,
                },
            };
            builder.push(section_catalog::ExtractedSection::new(
                spec,
                id,
                "s.png",
                "s.png",
                files,
                Utc::now(),
            ));
        }
        builder.finalize(1, Utc::now())
    }

    #[test]
    fn test_type_pattern_stats() {
        let report = PatternReport::analyze(&catalog(&[
            ("hero", 1000, 300),
            ("hero", 1000, 300),
            ("hero", 800, 400),
            ("footer", 1000, 100),
        ]));

        let hero = &report.section_types["hero"];
        assert_eq!(hero.count, 3);
        assert_eq!(
            hero.common_dimensions[0],
            DimensionCount {
                width: 1000,
                height: 300,
                count: 2
            }
        );
        assert_eq!(hero.common_dimensions.len(), 2);
        assert_eq!(hero.common_aspect_ratios[0].ratio, 3.33);
        assert_eq!(hero.common_aspect_ratios[0].count, 2);
        assert_eq!(hero.common_aspect_ratios[1].ratio, 2.0);
        assert!((hero.avg_area - 306_666.666).abs() < 0.01);
        assert_eq!(hero.size_range.min_area, 300_000);
        assert_eq!(hero.size_range.max_area, 320_000);

        assert_eq!(report.section_types["footer"].count, 1);
    }

    #[test]
    fn test_oversized_areas_saturate() {
        let report = PatternReport::analyze(&catalog(&[
            ("hero", 4_000_000_000, 4_000_000_000),
            ("hero", i64::MAX, i64::MAX),
            ("hero", 10, 10),
        ]));
        let hero = &report.section_types["hero"];
        assert_eq!(hero.size_range.max_area, i64::MAX);
        assert_eq!(hero.size_range.min_area, 100);
        assert!(hero.avg_area.is_finite());
        assert!(hero.avg_area > 1e18);
    }

    #[test]
    fn test_zero_height_ratio() {
        assert_eq!(aspect_ratio_key(100, 0), 0);
        assert_eq!(aspect_ratio_key(16, 9), 178);
    }

    #[test]
    fn test_top_lists_are_capped() {
        let sections: Vec<(&str, i64, i64)> = (1..=8).map(|i| ("gallery", 100 * i, 50 + i)).collect();
        let report = PatternReport::analyze(&catalog(&sections));
        let gallery = &report.section_types["gallery"];
        assert_eq!(gallery.common_dimensions.len(), 5);
        assert_eq!(gallery.common_aspect_ratios.len(), 3);
        // All counts tie at 1: first encountered wins.
        assert_eq!(gallery.common_dimensions[0].width, 100);
    }

    #[test]
    fn test_frequency_analysis() {
        let labels: Vec<String> = (0..12).map(|i| format!("type{}", i)).collect();
        let mut sections: Vec<(&str, i64, i64)> = vec![("hero", 10, 10); 3];
        sections.extend([("footer", 10, 10), ("Text Block", 10, 10), ("footer", 10, 10)]);
        for l in &labels {
            sections.push((l.as_str(), 10, 10));
        }
        let report = PatternReport::analyze(&catalog(&sections));

        let freq = &report.frequency_analysis;
        assert_eq!(freq.total_sections, 18);
        assert_eq!(freq.unique_types, 15);
        assert_eq!(freq.most_common_types.len(), 10);
        assert_eq!(freq.most_common_types[0].section_type, "hero");
        assert_eq!(freq.most_common_types[1].section_type, "footer");
        assert_eq!(freq.most_common_types[2].section_type, "text_block");
        assert_eq!(freq.most_common_types[3].section_type, "type0");
    }

    #[test]
    fn test_empty_catalog() {
        let report = PatternReport::analyze(&catalog(&[]));
        assert!(report.section_types.is_empty());
        assert_eq!(report.frequency_analysis.total_sections, 0);
        assert!(report.frequency_analysis.most_common_types.is_empty());
    }
}
