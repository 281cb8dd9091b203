use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{error, info};

use crate::config::FetchConfig;

/// A resolved Modelica source: where it lives locally and whether this run
/// downloaded it. Downloaded copies are removed after a successful export;
/// pre-existing local files are left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    pub path: PathBuf,
    pub downloaded: bool,
}

pub struct SourceFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl SourceFetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("fmu-export/0.1"));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_seconds))
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url: cfg.base_url.clone(),
            client,
        })
    }

    /// Download URL for a source suffix: the configured prefix joined with
    /// the suffix.
    pub fn url_for(&self, suffix: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            suffix.trim_start_matches('/')
        )
    }

    /// Resolve `suffix` to a local file. An existing local path is used
    /// in place; anything else is downloaded into `work_dir` under the
    /// suffix's file name.
    ///
    /// A non-success status is logged but not fatal here: nothing is written
    /// and the returned path will not exist, so the engine's load step
    /// reports the failure.
    pub async fn fetch(&self, suffix: &str, work_dir: &Path) -> Result<FetchedSource> {
        let local = Path::new(suffix);
        if local.is_file() {
            info!(path = %local.display(), "using existing local source file");
            return Ok(FetchedSource {
                path: local.to_path_buf(),
                downloaded: false,
            });
        }

        let file_name = local.file_name().context("source suffix has no file name")?;
        let target = work_dir.join(file_name);
        let url = self.url_for(suffix);
        info!(%url, "downloading source file");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("source GET failed")?;
        let status = resp.status();
        if !status.is_success() {
            error!(%url, %status, "source download failed, continuing without a local file");
            return Ok(FetchedSource {
                path: target,
                downloaded: false,
            });
        }

        let body = resp.bytes().await.context("source body read failed")?;
        tokio::fs::write(&target, &body)
            .await
            .with_context(|| format!("writing {}", target.display()))?;
        info!(path = %target.display(), bytes = body.len(), "source file written");
        Ok(FetchedSource {
            path: target,
            downloaded: true,
        })
    }
}

/// Remove a source file this run downloaded. Pre-existing local sources are
/// never touched.
pub async fn discard_downloaded(source: &FetchedSource) -> Result<()> {
    if !source.downloaded {
        return Ok(());
    }
    tokio::fs::remove_file(&source.path)
        .await
        .with_context(|| format!("removing downloaded source {}", source.path.display()))?;
    info!(path = %source.path.display(), "removed downloaded source file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fetcher(base_url: &str) -> SourceFetcher {
        SourceFetcher::new(&FetchConfig {
            base_url: base_url.to_string(),
            http_timeout_seconds: 5,
        })
        .unwrap()
    }

    #[rstest]
    #[case(
        "https://raw.githubusercontent.com",
        "Proj/main/Car.mo",
        "https://raw.githubusercontent.com/Proj/main/Car.mo"
    )]
    #[case(
        "https://raw.githubusercontent.com/",
        "Proj/main/Car.mo",
        "https://raw.githubusercontent.com/Proj/main/Car.mo"
    )]
    #[case(
        "https://example.com/models",
        "/deep/path/Model.mo",
        "https://example.com/models/deep/path/Model.mo"
    )]
    fn builds_url_from_prefix_and_suffix(
        #[case] base: &str,
        #[case] suffix: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(fetcher(base).url_for(suffix), expected);
    }

    #[tokio::test]
    async fn discards_only_downloaded_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Car.mo");
        std::fs::write(&path, "model Car end Car;").unwrap();

        let kept = FetchedSource {
            path: path.clone(),
            downloaded: false,
        };
        discard_downloaded(&kept).await.unwrap();
        assert!(path.exists());

        let downloaded = FetchedSource {
            path: path.clone(),
            downloaded: true,
        };
        discard_downloaded(&downloaded).await.unwrap();
        assert!(!path.exists());
    }
}
