use anyhow::{Context, Result};
use chrono::Utc;
use image::RgbImage;
use section_catalog::{CatalogBuilder, CatalogDocument, ExtractedSection, IdentitySequence};
use section_crop::SectionCropper;
use section_data::{AnnotationLoader, ErrorLog, ItemError, LoadedAnnotation, SectionSpec};
use section_patterns::PatternReport;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProcessorConfig;
use crate::report::StatisticsReport;

/// Where the terminal documents of a run were written.
#[derive(Debug, Clone)]
pub struct OutputFiles {
    pub catalog: PathBuf,
    pub patterns: PathBuf,
    pub statistics: PathBuf,
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub catalog: CatalogDocument,
    pub patterns: PatternReport,
    pub statistics: StatisticsReport,
    pub outputs: OutputFiles,
}

/// Manages the load → crop → identify → catalog → patterns run.
pub struct Pipeline {
    config: ProcessorConfig,
}

impl Pipeline {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Create the output tree. Failure here aborts the run.
    pub fn setup_directories(&self) -> Result<()> {
        self.config.derivative_layout().create_dirs()?;
        for dir in [self.config.data_dir(), self.config.stats_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        info!(
            "Created output directory structure at: {}",
            self.config.output_dir().display()
        );
        Ok(())
    }

    /// Run every phase in order. Per-item failures end up in the statistics
    /// report; only setup, a missing annotations directory, or failing to
    /// write a terminal document return `Err`.
    pub fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        self.setup_directories()?;

        let mut errors = ErrorLog::new();

        info!("=== Phase 1: Data Aggregation ===");
        let loader =
            AnnotationLoader::new(self.config.annotations_dir(), self.config.screenshots_dir());
        let loaded = loader.load_all(&mut errors)?;
        if loaded.annotations.is_empty() {
            warn!("No valid annotations found; writing empty catalog");
        }

        info!("=== Phase 2: Image Cropping ===");
        let cropper = SectionCropper::new(self.config.derivative_layout());
        let mut sequence = IdentitySequence::new();
        let mut builder = CatalogBuilder::new();
        for annotation in &loaded.annotations {
            extract_annotation(annotation, &cropper, &mut sequence, &mut builder, &mut errors);
        }
        info!(
            "Extracted {} sections of {} types",
            builder.len(),
            builder.section_types().count()
        );

        let catalog = builder.finalize(loaded.annotations.len(), Utc::now());

        info!("=== Phase 3: Pattern Recognition ===");
        let patterns = PatternReport::analyze(&catalog);
        let outputs = OutputFiles {
            catalog: self.config.catalog_path(),
            patterns: self.config.patterns_path(),
            statistics: self.config.statistics_path(),
        };
        patterns.save(&outputs.patterns)?;
        info!("Pattern analysis saved to: {}", outputs.patterns.display());

        info!("=== Phase 4: Module Catalog ===");
        catalog.save(&outputs.catalog)?;
        info!("Module catalog saved to: {}", outputs.catalog.display());

        let statistics =
            StatisticsReport::build(&catalog, loaded.files_processed, started.elapsed(), &errors);
        statistics.save(&outputs.statistics)?;
        info!("Statistics saved to: {}", outputs.statistics.display());

        if !errors.is_empty() {
            warn!(
                "{} item(s) were skipped; see {}",
                errors.len(),
                outputs.statistics.display()
            );
        }

        Ok(RunSummary {
            catalog,
            patterns,
            statistics,
            outputs,
        })
    }
}

/// Decode one screenshot and extract all of its sections. The decoded image
/// lives only for this call. Returns how many sections were cataloged.
pub fn extract_annotation(
    loaded: &LoadedAnnotation,
    cropper: &SectionCropper,
    sequence: &mut IdentitySequence,
    builder: &mut CatalogBuilder,
    errors: &mut ErrorLog,
) -> usize {
    info!(
        "Processing: {} ({})",
        loaded.screenshot_file_name(),
        loaded.annotation_file.display()
    );

    let screenshot = match section_crop::open_screenshot(&loaded.screenshot_path) {
        Ok(img) => img,
        Err(e) => {
            errors.record(&ItemError::image(
                loaded.annotation.source_image.as_str(),
                e,
            ));
            return 0;
        }
    };

    if let Some((w, h)) = loaded.annotation.declared_size() {
        if (w, h) != (u64::from(screenshot.width()), u64::from(screenshot.height())) {
            debug!(
                "{}: annotated as {}x{}, decoded as {}x{}",
                loaded.annotation.source_image,
                w,
                h,
                screenshot.width(),
                screenshot.height()
            );
        }
    }

    let mut extracted = 0;
    for spec in &loaded.annotation.sections {
        match extract_section(spec, &screenshot, loaded, cropper, sequence) {
            Ok(section) => {
                builder.push(section);
                extracted += 1;
            }
            Err(e) => errors.record(&e),
        }
    }
    extracted
}

/// Crop one section and give it an identity. The sequence only advances
/// when the derivatives were written.
pub fn extract_section(
    spec: &SectionSpec,
    screenshot: &RgbImage,
    loaded: &LoadedAnnotation,
    cropper: &SectionCropper,
    sequence: &mut IdentitySequence,
) -> Result<ExtractedSection, ItemError> {
    let unique_id = sequence.peek(&spec.section_type);
    let label = format!("section '{}' of {}", spec.id, loaded.annotation.source_image);
    let files = cropper.crop_section(screenshot, &spec.coordinates, unique_id.as_str(), &label)?;
    sequence.advance();

    debug!(
        "{} <- section '{}' of {}",
        unique_id, spec.id, loaded.annotation.source_image
    );

    Ok(ExtractedSection::new(
        spec.clone(),
        unique_id,
        loaded.annotation.source_image.as_str(),
        loaded.screenshot_file_name(),
        files,
        Utc::now(),
    ))
}
