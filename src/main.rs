use anyhow::{Context, Result};
use fmu_export::config::{Config, Settings};
use fmu_export::engine::OmcSession;
use fmu_export::{pipeline, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let suffix = std::env::args()
        .nth(1)
        .context("usage: fmu-export <source-path>, e.g. fmu-export Project/main/Model.mo")?;

    let cfg = Config::load()?;
    let settings = Settings::load(&cfg.paths.settings_file)?;
    info!(
        source = %suffix,
        destination = %settings.destination_dir.display(),
        "starting fmu export"
    );

    let mut session = OmcSession::start(&cfg.engine, &settings.work_dir).await?;
    let outcome = pipeline::run(&cfg, &settings, &mut session, &suffix).await;
    let quit = session.quit().await;

    let artifact = outcome?;
    quit?;
    info!(artifact = %artifact.display(), "done");
    Ok(())
}
