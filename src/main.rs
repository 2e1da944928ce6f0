//! Extract annotated storefront sections and build the module catalog.
//! Usage: process_sections [base_dir]

use storefront_sections::{init_tracing, run, ProcessorConfig};

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ProcessorConfig::resolve(std::env::args().nth(1));
    println!("Storefront Section Processor");
    println!("Base directory: {}", config.base_dir().display());

    let summary = run(config)?;
    let stats = &summary.statistics.processing_summary;

    println!("\n=== Processing Complete ===");
    println!("Files processed: {}", stats.files_processed);
    println!("Sections extracted: {}", stats.sections_extracted);
    println!(
        "Section types found: {}",
        summary.catalog.metadata.section_types.len()
    );
    println!("Processing time: {:.2} seconds", stats.processing_time_seconds);
    if stats.errors_count > 0 {
        println!(
            "Errors encountered: {} (details in {})",
            stats.errors_count,
            summary.outputs.statistics.display()
        );
    }
    println!("\nCatalog: {}", summary.outputs.catalog.display());
    Ok(())
}
