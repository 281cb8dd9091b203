use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::artifact;
use crate::config::{Config, Settings};
use crate::engine::{select_model, ModelingEngine};
use crate::fetch::{self, FetchedSource, SourceFetcher};

/// Run the export pipeline for one source suffix against an open engine
/// session. Returns the final artifact path.
pub async fn run(
    cfg: &Config,
    settings: &Settings,
    engine: &mut dyn ModelingEngine,
    suffix: &str,
) -> Result<PathBuf> {
    let fetcher = SourceFetcher::new(&cfg.fetch)?;
    let source = fetcher.fetch(suffix, &settings.work_dir).await?;

    let target = export(cfg, settings, engine, &source).await?;

    fetch::discard_downloaded(&source).await?;
    Ok(target)
}

/// Load the source, select the first model class, build the FMU, then clean
/// up byproducts and move the artifact into place.
pub async fn export(
    cfg: &Config,
    settings: &Settings,
    engine: &mut dyn ModelingEngine,
    source: &FetchedSource,
) -> Result<PathBuf> {
    info!(path = %source.path.display(), "loading source file");
    engine.load_file(&source.path).await?;

    let model = select_model(engine).await?;
    info!(%model, "selected model class");

    info!(%model, version = %cfg.engine.fmu_version, kind = %cfg.engine.fmu_type, "building fmu");
    engine
        .build_fmu(&model, &cfg.engine.fmu_version, &cfg.engine.fmu_type)
        .await?;

    artifact::clean_byproducts(&settings.work_dir, &model).await?;
    let target =
        artifact::relocate_fmu(&settings.work_dir, &model, &settings.destination_dir).await?;
    info!(artifact = %target.display(), "export complete");
    Ok(target)
}
