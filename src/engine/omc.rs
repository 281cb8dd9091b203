use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use zeromq::{Socket, SocketRecv, SocketSend, ZmqMessage};

use super::{EngineError, ModelingEngine};
use crate::config::EngineConfig;

/// One interactive `omc` child process plus the ZMQ REQ socket it serves.
///
/// omc is started with `--interactive=zmq` and a per-session suffix; it
/// publishes its endpoint in `openmodelica.<user>.port.<suffix>` under the
/// system temp directory, which is polled until the configured startup
/// timeout. The child runs in the pipeline's working directory so build
/// outputs land there.
pub struct OmcSession {
    child: Child,
    socket: zeromq::ReqSocket,
    port_file: PathBuf,
}

impl OmcSession {
    pub async fn start(cfg: &EngineConfig, work_dir: &Path) -> Result<Self> {
        let suffix = session_suffix();
        let port_file = std::env::temp_dir().join(format!(
            "openmodelica.{}.port.{}",
            current_user(),
            suffix
        ));

        let child = Command::new(&cfg.binary)
            .arg("--interactive=zmq")
            .arg(format!("-z={suffix}"))
            .current_dir(work_dir)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", cfg.binary))?;

        let endpoint = wait_for_port_file(&port_file, cfg.startup_timeout_seconds).await?;
        debug!(%endpoint, "omc endpoint published");

        let mut socket = zeromq::ReqSocket::new();
        socket
            .connect(&endpoint)
            .await
            .with_context(|| format!("connecting to omc at {endpoint}"))?;

        info!(%suffix, "omc session established");
        Ok(Self {
            child,
            socket,
            port_file,
        })
    }

    /// Evaluate one textual expression and return the reply with surrounding
    /// whitespace stripped.
    async fn send_expression(&mut self, expr: &str) -> Result<String> {
        debug!(%expr, "omc request");
        self.socket
            .send(ZmqMessage::from(expr.to_string()))
            .await
            .with_context(|| format!("sending `{expr}`"))?;
        let reply = self
            .socket
            .recv()
            .await
            .with_context(|| format!("awaiting reply to `{expr}`"))?;
        let frame: Vec<u8> = reply.into_vec().into_iter().flatten().collect();
        let text = String::from_utf8(frame).context("omc reply is not UTF-8")?;
        debug!(reply = %text.trim(), "omc reply");
        Ok(text.trim().to_string())
    }

    async fn error_string(&mut self) -> String {
        match self.send_expression("getErrorString()").await {
            Ok(reply) => unquote(&reply).trim().to_string(),
            Err(e) => format!("(getErrorString failed: {e})"),
        }
    }

    /// Orderly shutdown: ask omc to exit, reap the child, drop the port file.
    pub async fn quit(mut self) -> Result<()> {
        if let Err(e) = self.socket.send(ZmqMessage::from("quit()".to_string())).await {
            warn!("omc quit() not delivered: {e}");
        }
        self.child.wait().await.context("waiting for omc to exit")?;
        let _ = tokio::fs::remove_file(&self.port_file).await;
        Ok(())
    }
}

#[async_trait]
impl ModelingEngine for OmcSession {
    async fn load_file(&mut self, path: &Path) -> Result<()> {
        let expr = format!(r#"loadFile("{}")"#, escape(&path.display().to_string()));
        let reply = self.send_expression(&expr).await?;
        match parse_bool(&reply) {
            Some(true) => Ok(()),
            Some(false) => {
                let detail = self.error_string().await;
                Err(EngineError::LoadRejected {
                    path: path.display().to_string(),
                    detail,
                }
                .into())
            }
            None => Err(EngineError::UnexpectedReply { expr, reply }.into()),
        }
    }

    async fn class_names(&mut self) -> Result<Vec<String>> {
        let reply = self.send_expression("getClassNames()").await?;
        match parse_class_set(&reply) {
            Some(classes) => Ok(classes),
            None => Err(EngineError::UnexpectedReply {
                expr: "getClassNames()".into(),
                reply,
            }
            .into()),
        }
    }

    async fn is_model(&mut self, class: &str) -> Result<bool> {
        let expr = format!("isModel({class})");
        let reply = self.send_expression(&expr).await?;
        match parse_bool(&reply) {
            Some(answer) => Ok(answer),
            None => Err(EngineError::UnexpectedReply { expr, reply }.into()),
        }
    }

    async fn build_fmu(&mut self, model: &str, version: &str, kind: &str) -> Result<()> {
        let expr = format!(r#"buildModelFMU("{model}", version="{version}", fmuType="{kind}")"#);
        let reply = self.send_expression(&expr).await?;
        // A successful build replies with the quoted FMU path; an empty
        // string means the build failed and the detail sits in the error
        // buffer.
        if unquote(&reply).trim().is_empty() {
            let detail = self.error_string().await;
            return Err(EngineError::BuildFailed {
                model: model.to_string(),
                detail,
            }
            .into());
        }
        Ok(())
    }
}

fn parse_bool(reply: &str) -> Option<bool> {
    match reply {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// omc prints class enumerations as `{A,B.C,D}`; the empty set is `{}`.
fn parse_class_set(reply: &str) -> Option<Vec<String>> {
    let inner = reply.strip_prefix('{')?.strip_suffix('}')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    Some(inner.split(',').map(|name| name.trim().to_string()).collect())
}

fn unquote(reply: &str) -> &str {
    reply
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(reply)
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "nobody".to_string())
}

/// Suffix for the session port file. Collisions only matter across
/// concurrently running exports, so pid plus sub-second time is enough.
fn session_suffix() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("fmu-export.{}.{nanos}", std::process::id())
}

async fn wait_for_port_file(path: &Path, timeout_seconds: u64) -> Result<String> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_seconds);
    loop {
        if let Ok(endpoint) = tokio::fs::read_to_string(path).await {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                return Ok(endpoint.to_string());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(EngineError::StartupTimeout {
                seconds: timeout_seconds,
            }
            .into());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("true", Some(true))]
    #[case("false", Some(false))]
    #[case("True", None)]
    #[case("", None)]
    fn parses_boolean_replies(#[case] reply: &str, #[case] expected: Option<bool>) {
        assert_eq!(parse_bool(reply), expected);
    }

    #[rstest]
    #[case("{}", Vec::new())]
    #[case("{Car}", vec!["Car".to_string()])]
    #[case("{Helper,Car}", vec!["Helper".to_string(), "Car".to_string()])]
    #[case("{Helper, Pkg.Car}", vec!["Helper".to_string(), "Pkg.Car".to_string()])]
    fn parses_class_enumerations(#[case] reply: &str, #[case] expected: Vec<String>) {
        assert_eq!(parse_class_set(reply), Some(expected));
    }

    #[test]
    fn rejects_malformed_class_enumerations() {
        assert_eq!(parse_class_set("Helper,Car"), None);
        assert_eq!(parse_class_set("{Helper"), None);
    }

    #[test]
    fn unquotes_engine_strings() {
        assert_eq!(unquote(r#""/work/Car.fmu""#), "/work/Car.fmu");
        assert_eq!(unquote("bare"), "bare");
        assert_eq!(unquote(r#""""#), "");
    }

    #[test]
    fn escapes_paths_for_expressions() {
        assert_eq!(escape(r#"C:\models\a"b.mo"#), r#"C:\\models\\a\"b.mo"#);
        assert_eq!(escape("/work/Car.mo"), "/work/Car.mo");
    }

    #[tokio::test]
    async fn port_file_wait_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("openmodelica.nobody.port.none");
        let err = wait_for_port_file(&missing, 0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::StartupTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn port_file_wait_returns_published_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openmodelica.nobody.port.test");
        std::fs::write(&path, "tcp://127.0.0.1:40121\n").unwrap();
        let endpoint = wait_for_port_file(&path, 1).await.unwrap();
        assert_eq!(endpoint, "tcp://127.0.0.1:40121");
    }
}
