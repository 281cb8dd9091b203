use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub fetch: FetchConfig,
    pub engine: EngineConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    pub base_url: String,
    pub http_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub binary: String,
    pub startup_timeout_seconds: u64,
    pub fmu_version: String,
    pub fmu_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub settings_file: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("FMU_EXPORT__").split("__"));
        Ok(figment.extract()?)
    }
}

/// The two-line settings file: line 1 is the destination directory, line 2
/// (optional) is the local working directory. Lines are taken verbatim with
/// only the trailing newline stripped; a missing second line means the
/// working directory is the current directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub destination_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing settings file {}", path.display()))
    }

    fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let destination = lines
            .next()
            .filter(|line| !line.is_empty())
            .context("line 1 (destination directory) is missing or empty")?;
        let work = lines.next().filter(|line| !line.is_empty()).unwrap_or(".");
        Ok(Self {
            destination_dir: PathBuf::from(destination),
            work_dir: PathBuf::from(work),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case("/out/\n/work/\n", "/out/", "/work/")]
    #[case("/out/\n/work/", "/out/", "/work/")]
    #[case("/out/\n", "/out/", ".")]
    #[case("/out/", "/out/", ".")]
    #[case("relative/dest\nrelative/work\n", "relative/dest", "relative/work")]
    fn parses_settings_lines_verbatim(
        #[case] text: &str,
        #[case] destination: &str,
        #[case] work: &str,
    ) {
        let settings = Settings::parse(text).unwrap();
        assert_eq!(settings.destination_dir, PathBuf::from(destination));
        assert_eq!(settings.work_dir, PathBuf::from(work));
    }

    #[test]
    fn rejects_empty_settings() {
        assert!(Settings::parse("").is_err());
        assert!(Settings::parse("\n/work/\n").is_err());
    }

    #[test]
    fn loads_settings_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "/out/\n/work/\n").unwrap();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.destination_dir, PathBuf::from("/out/"));
        assert_eq!(settings.work_dir, PathBuf::from("/work/"));
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let err = Settings::load(Path::new("/nonexistent/settings.txt")).unwrap_err();
        assert!(err.to_string().contains("settings file"));
    }

    #[test]
    fn default_config_loads() {
        let cfg = Config::load().unwrap();
        assert_eq!(cfg.engine.binary, "omc");
        assert_eq!(cfg.engine.fmu_version, "2.0");
        assert_eq!(cfg.engine.fmu_type, "cs");
    }
}
