use anyhow::{Context, Result};
use section_catalog::CatalogDocument;
use section_data::ErrorLog;
use section_patterns::type_frequencies;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Above this many modules the catalog is flagged as large.
const LARGE_CATALOG: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub files_processed: usize,
    pub sections_extracted: usize,
    pub processing_time_seconds: f64,
    pub errors_count: usize,
}

/// `stats/analysis.json`: run summary plus every dropped item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub processing_summary: ProcessingSummary,
    pub section_type_breakdown: BTreeMap<String, usize>,
    pub recommendations: Vec<String>,
    pub errors: Vec<String>,
}

impl StatisticsReport {
    pub fn build(
        catalog: &CatalogDocument,
        files_processed: usize,
        elapsed: Duration,
        errors: &ErrorLog,
    ) -> Self {
        let section_type_breakdown = catalog
            .types_index
            .iter()
            .map(|(section_type, ids)| (section_type.clone(), ids.len()))
            .collect();

        Self {
            processing_summary: ProcessingSummary {
                files_processed,
                sections_extracted: catalog.modules.len(),
                processing_time_seconds: elapsed.as_secs_f64(),
                errors_count: errors.len(),
            },
            section_type_breakdown,
            recommendations: recommendations(catalog),
            errors: errors.entries().to_vec(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize statistics")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Short textual hints about the shape of the catalog.
pub fn recommendations(catalog: &CatalogDocument) -> Vec<String> {
    let mut out = Vec::new();
    let types = type_frequencies(catalog);

    if !types.is_empty() {
        let top: Vec<String> = types
            .iter()
            .take(3)
            .map(|t| format!("{}({})", t.section_type, t.count))
            .collect();
        out.push(format!(
            "Most used section types: {}. Consider creating multiple variants of these.",
            top.join(", ")
        ));
    }

    let rare: Vec<&str> = types
        .iter()
        .filter(|t| t.count == 1)
        .map(|t| t.section_type.as_str())
        .collect();
    if !rare.is_empty() {
        out.push(format!(
            "Rare section types found: {}. Consider if these are special cases or could be generalized.",
            rare.join(", ")
        ));
    }

    if catalog.modules.len() > LARGE_CATALOG {
        out.push(
            "Large catalog detected. Consider implementing search and filtering in a browsing UI."
                .to_string(),
        );
    }

    out
}
