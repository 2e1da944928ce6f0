use section_crop::DerivativeLayout;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no base directory is passed.
pub const BASE_DIR_ENV: &str = "SECTION_PROCESSOR_BASE_DIR";

const SCREENSHOTS_DIR: &str = "store_screenshots";
const ANNOTATIONS_DIR: &str = "annotations";
const OUTPUT_DIR: &str = "processed_modules";

/// Input and output locations, all derived from one base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    base_dir: PathBuf,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ProcessorConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Base directory from an explicit argument, then the environment, then `.`.
    pub fn resolve(arg: Option<String>) -> Self {
        arg.filter(|a| !a.is_empty())
            .or_else(|| std::env::var(BASE_DIR_ENV).ok().filter(|v| !v.is_empty()))
            .map(Self::new)
            .unwrap_or_default()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.base_dir.join(SCREENSHOTS_DIR)
    }

    pub fn annotations_dir(&self) -> PathBuf {
        self.base_dir.join(ANNOTATIONS_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.base_dir.join(OUTPUT_DIR)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.output_dir().join("data")
    }

    pub fn stats_dir(&self) -> PathBuf {
        self.output_dir().join("stats")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir().join("modules_catalog.json")
    }

    pub fn patterns_path(&self) -> PathBuf {
        self.data_dir().join("patterns.json")
    }

    pub fn statistics_path(&self) -> PathBuf {
        self.stats_dir().join("analysis.json")
    }

    pub fn derivative_layout(&self) -> DerivativeLayout {
        DerivativeLayout::new(self.output_dir())
    }
}
