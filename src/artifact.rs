use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

/// Transient files omc leaves next to the FMU after a build.
pub const BYPRODUCT_SUFFIXES: [&str; 5] =
    [".log", "_FMU.libs", "_FMU.log", "_FMU.makefile", "_info.json"];

/// Byproduct file names for `model`, in deletion order.
pub fn byproduct_names(model: &str) -> Vec<String> {
    BYPRODUCT_SUFFIXES
        .iter()
        .map(|suffix| format!("{model}{suffix}"))
        .collect()
}

/// Delete the build byproducts from `work_dir`. A missing byproduct is an
/// error and deletion stops there; nothing is rolled back.
pub async fn clean_byproducts(work_dir: &Path, model: &str) -> Result<()> {
    for name in byproduct_names(model) {
        let path = work_dir.join(&name);
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("deleting byproduct {}", path.display()))?;
    }
    info!(%model, "deleted build byproducts");
    Ok(())
}

/// Move `<work_dir>/<model>.fmu` to `<destination>/<model>.fmu`.
///
/// Rename first; when that fails (typically a destination on another
/// filesystem), fall back to copy plus remove.
pub async fn relocate_fmu(work_dir: &Path, model: &str, destination: &Path) -> Result<PathBuf> {
    let source = work_dir.join(format!("{model}.fmu"));
    let target = destination.join(format!("{model}.fmu"));
    info!(from = %source.display(), to = %target.display(), "moving fmu");

    if tokio::fs::rename(&source, &target).await.is_err() {
        tokio::fs::copy(&source, &target)
            .await
            .with_context(|| format!("copying {} to {}", source.display(), target.display()))?;
        tokio::fs::remove_file(&source)
            .await
            .with_context(|| format!("removing {}", source.display()))?;
    }
    Ok(target)
}
