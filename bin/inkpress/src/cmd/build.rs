//! Build command - generates the static site

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use inkpress_core::BuildMode;
use inkpress_generator::{Assembler, write_manifest};

use super::load_config;

/// Run the build command.
///
/// Assembles the whole site in memory, then replaces the output directory.
pub async fn run(config_path: &Path, output: Option<&Path>) -> Result<()> {
    tracing::info!(?config_path, ?output, "Starting build");

    let mut config = load_config(config_path)?;
    if let Some(dir) = output {
        tracing::info!(output = %dir.display(), "Overriding output directory from CLI");
        config.paths.output_dir = dir.to_path_buf();
    }
    let output_dir = config.paths.output_dir.clone();

    let context = Assembler::new(config)
        .wrap_err("Failed to prepare build")?
        .assemble(BuildMode::OneShot)
        .await
        .wrap_err("Build failed")?;

    let written = write_manifest(&context, &output_dir)
        .await
        .wrap_err_with(|| format!("Failed to write {}", output_dir.display()))?;

    let stats = context.stats();
    println!();
    println!("  Build completed successfully!");
    println!();
    println!("  Posts:      {} ({} published)", stats.posts, stats.published);
    println!("  Assets:     {}", stats.assets);
    println!("  Files:      {written}");
    println!();
    println!("  Duration:   {}ms", stats.duration_ms);
    println!("  Output:     {}", output_dir.display());
    println!();

    tracing::info!(?stats, "Build completed successfully");

    Ok(())
}
