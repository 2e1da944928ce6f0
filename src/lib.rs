mod config;
mod pipeline;
mod report;

pub use config::{ProcessorConfig, BASE_DIR_ENV};
pub use pipeline::{extract_annotation, extract_section, OutputFiles, Pipeline, RunSummary};
pub use report::{recommendations, ProcessingSummary, StatisticsReport};

/// Install the fmt subscriber, honoring `RUST_LOG` when set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "storefront_sections=info,section_data=info,section_crop=info,section_catalog=info,section_patterns=info"
                    .into()
            }),
        )
        .try_init();
}

/// Run the full pipeline for `config`.
pub fn run(config: ProcessorConfig) -> anyhow::Result<RunSummary> {
    Pipeline::new(config).run()
}
