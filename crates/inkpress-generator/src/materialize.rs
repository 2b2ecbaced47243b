//! Writing a build context to disk.

use std::path::{Path, PathBuf};

use inkpress_core::{OutputBody, OutputFile};
use tokio::fs;
use tracing::{debug, info};

use crate::{
    build::BuildContext,
    error::{BuildError, Result},
};

/// Location of a manifest entry below `output_dir`.
#[must_use]
pub fn output_path(output_dir: &Path, file: &OutputFile) -> PathBuf {
    output_dir.join(file.file_path.trim_start_matches('/'))
}

/// Clear `output_dir` and write every manifest entry into it, in order.
///
/// The first failed write stops the run.
pub async fn write_manifest(context: &BuildContext, output_dir: &Path) -> Result<usize> {
    if fs::try_exists(output_dir).await.unwrap_or(false) {
        debug!(dir = %output_dir.display(), "cleaning output directory");
        fs::remove_dir_all(output_dir)
            .await
            .map_err(|e| BuildError::io(output_dir, e))?;
    }
    fs::create_dir_all(output_dir)
        .await
        .map_err(|e| BuildError::io(output_dir, e))?;

    for file in context.manifest() {
        write_entry(output_dir, file).await?;
    }

    info!(
        dir = %output_dir.display(),
        files = context.manifest().len(),
        "wrote build output"
    );
    Ok(context.manifest().len())
}

async fn write_entry(output_dir: &Path, file: &OutputFile) -> Result<()> {
    let target = output_path(output_dir, file);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| BuildError::io(parent, e))?;
    }

    match &file.body {
        OutputBody::Rendered(content) => fs::write(&target, content)
            .await
            .map_err(|e| BuildError::io(&target, e))?,
        OutputBody::Passthrough(source) => {
            fs::copy(source, &target)
                .await
                .map_err(|e| BuildError::io(source, e))?;
        }
    }

    debug!(path = %target.display(), "wrote file");
    Ok(())
}
