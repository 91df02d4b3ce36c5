//! kicad-svg-extras - Generate net-colored SVG files from KiCad PCB files
//!
//! Command line entry point wiring the parsed configuration to the
//! generation pipeline running against a local `kicad-cli` installation.

use tracing::{error, info};

use kicad_svg_extras::{
    config::Config, error::Result, exporter::KicadCliExporter, pipeline::Pipeline,
};

fn main() -> Result<()> {
    // Parse configuration and initialize logging
    let config = Config::from_args().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    let exporter = KicadCliExporter::new();
    match exporter.check_available() {
        Ok(version) => info!("Using kicad-cli {}", version),
        Err(e) => {
            error!("kicad-cli is not available: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }

    let mut pipeline = Pipeline::new(config, Box::new(exporter));

    match pipeline.run() {
        Ok(()) => {
            let stats = pipeline.get_generation_stats();
            info!(
                "Exported {} net group fragment(s), merged {} SVG file(s), colored {} net(s)",
                stats.groups_exported, stats.svg_files_merged, stats.nets_colored
            );

            println!("SVG generation completed successfully");
            for output in &stats.output_files {
                println!("  {}", output.display());
            }
            Ok(())
        }
        Err(e) => {
            error!("SVG generation failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
