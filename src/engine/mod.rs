pub mod omc;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

pub use omc::OmcSession;

/// Errors surfaced by the compiler session.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine rejected loadFile for {path}: {detail}")]
    LoadRejected { path: String, detail: String },

    #[error("no loaded class is classified as a model")]
    NoModelClass,

    #[error("FMU build for {model} produced no artifact: {detail}")]
    BuildFailed { model: String, detail: String },

    #[error("unexpected engine reply to `{expr}`: {reply}")]
    UnexpectedReply { expr: String, reply: String },

    #[error("engine did not publish its endpoint within {seconds}s")]
    StartupTimeout { seconds: u64 },
}

/// The compiler session seam: load a source file, introspect the classes it
/// declares, and build an FMU for one of them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelingEngine: Send {
    async fn load_file(&mut self, path: &Path) -> Result<()>;
    async fn class_names(&mut self) -> Result<Vec<String>>;
    async fn is_model(&mut self, class: &str) -> Result<bool>;
    async fn build_fmu(&mut self, model: &str, version: &str, kind: &str) -> Result<()>;
}

/// First engine-reported class the engine classifies as a model. Order is
/// whatever the engine returned from enumeration.
pub async fn select_model(engine: &mut dyn ModelingEngine) -> Result<String> {
    for class in engine.class_names().await? {
        if engine.is_model(&class).await? {
            return Ok(class);
        }
    }
    Err(EngineError::NoModelClass.into())
}
