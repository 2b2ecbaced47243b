//! Check command - assemble without writing

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use inkpress_core::BuildMode;
use inkpress_generator::{Assembler, BuildContext};

use super::load_config;

/// Run the check command.
///
/// Runs a full assembly and reports what a build would write.
pub async fn run(config_path: &Path) -> Result<()> {
    tracing::info!(?config_path, "Checking site");

    println!("Checking configuration...");
    let config = load_config(config_path)?;
    println!("  ✓ Configuration valid");

    println!("\nAssembling site...");
    let context = Assembler::new(config)
        .wrap_err("Failed to prepare build")?
        .assemble(BuildMode::OneShot)
        .await
        .wrap_err("Check failed")?;

    for line in summary(&context) {
        println!("{line}");
    }
    println!("\n✓ All checks passed!");

    Ok(())
}

fn summary(context: &BuildContext) -> Vec<String> {
    let stats = context.stats();
    vec![
        format!("  ✓ {} posts ({} drafts)", stats.posts, stats.posts - stats.published),
        format!(
            "  ✓ {} on the front page, {} older",
            context.latest_posts().len(),
            context.older_posts().len()
        ),
        format!("  ✓ {} static assets", stats.assets),
        format!("  ✓ {} output files", stats.files),
    ]
}
