//! Step and error persistence sinks.
//!
//! Persistence is fire-and-forget: callers ignore every error a sink
//! returns, so a broken disk never affects a run.

use super::Capability;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Receives per-session step results and errors.
pub trait PersistenceSink: Send + Sync {
    fn record_step(&self, session_id: &str, step: &str, data: &Value) -> Result<()>;
    fn record_error(&self, session_id: &str, step: &str, error: &str) -> Result<()>;
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl PersistenceSink for NoopSink {
    fn record_step(&self, _session_id: &str, _step: &str, _data: &Value) -> Result<()> {
        Ok(())
    }

    fn record_error(&self, _session_id: &str, _step: &str, _error: &str) -> Result<()> {
        Ok(())
    }
}

/// Appends JSON lines to `<root>/<session_id>/{steps,errors}.jsonl`.
pub struct JsonlSink {
    root: PathBuf,
    // Serializes appends from concurrent sessions.
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create persistence dir: {}", root.display()))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn append(&self, session_id: &str, file: &str, line: &Value) -> Result<()> {
        let dir = self.root.join(sanitize(session_id));
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("persistence lock poisoned"))?;

        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session dir: {}", dir.display()))?;

        let path = dir.join(file);
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        writeln!(handle, "{}", serde_json::to_string(line)?)?;
        Ok(())
    }
}

impl PersistenceSink for JsonlSink {
    fn record_step(&self, session_id: &str, step: &str, data: &Value) -> Result<()> {
        let line = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session_id": session_id,
            "step": step,
            "data": data,
        });
        self.append(session_id, "steps.jsonl", &line)
    }

    fn record_error(&self, session_id: &str, step: &str, error: &str) -> Result<()> {
        let line = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session_id": session_id,
            "step": step,
            "error": error,
        });
        self.append(session_id, "errors.jsonl", &line)
    }
}

/// A sink registered as the `persistence` collaborator.
pub struct SinkCapability {
    sink: Arc<dyn PersistenceSink>,
}

impl SinkCapability {
    pub fn new(sink: Arc<dyn PersistenceSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Capability for SinkCapability {
    fn name(&self) -> &str {
        "persistence"
    }

    fn operations(&self) -> &[&'static str] {
        &["record_step", "record_error"]
    }

    async fn invoke(&self, operation: &str, args: &Value) -> Result<Value> {
        let field = |key: &str| {
            args.get(key)
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("missing '{}' argument", key))
        };
        let session_id = field("session_id")?;
        let step = field("step")?;

        match operation {
            "record_step" => {
                let data = args.get("data").cloned().unwrap_or(Value::Null);
                self.sink.record_step(session_id, step, &data)?;
            }
            "record_error" => self.sink.record_error(session_id, step, field("error")?)?,
            other => anyhow::bail!("unsupported operation: {}", other),
        }

        Ok(json!({ "recorded": true }))
    }
}

/// Directory name for a session id.
///
/// Ids made of `[A-Za-z0-9_-]` are used as-is. Anything else is hex-encoded
/// behind a `~` prefix, which plain ids never contain, so distinct ids
/// never share a directory.
fn sanitize(session_id: &str) -> String {
    let plain = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        return session_id.to_string();
    }

    let hex: String = session_id.bytes().map(|b| format!("{:02x}", b)).collect();
    format!("~{}", hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(temp_dir.path()).unwrap();

        sink.record_step("s-1", "web_research", &json!({"status": "success"}))
            .unwrap();
        sink.record_step("s-1", "avatar", &json!({"status": "fallback"}))
            .unwrap();
        sink.record_error("s-1", "avatar", "boom").unwrap();

        let steps = std::fs::read_to_string(temp_dir.path().join("s-1/steps.jsonl")).unwrap();
        assert_eq!(steps.lines().count(), 2);
        let first: Value = serde_json::from_str(steps.lines().next().unwrap()).unwrap();
        assert_eq!(first["step"], "web_research");

        let errors = std::fs::read_to_string(temp_dir.path().join("s-1/errors.jsonl")).unwrap();
        assert!(errors.contains("boom"));
    }

    #[test]
    fn test_session_id_is_sanitized() {
        assert_eq!(sanitize("abc-123_x"), "abc-123_x");
        assert_eq!(sanitize("../etc"), "~2e2e2f657463");
        assert_eq!(sanitize(""), "~");
        assert!(!sanitize("../../etc").contains('/'));
    }

    #[test]
    fn test_distinct_ids_get_distinct_dirs() {
        assert_ne!(sanitize("a/b"), sanitize("a_b"));
        assert_ne!(sanitize("a.b"), sanitize("a_b"));

        let temp_dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(temp_dir.path()).unwrap();
        sink.record_step("a/b", "avatar", &json!({})).unwrap();
        sink.record_step("a_b", "avatar", &json!({})).unwrap();

        let plain = std::fs::read_to_string(temp_dir.path().join("a_b/steps.jsonl")).unwrap();
        assert_eq!(plain.lines().count(), 1);
        let encoded =
            std::fs::read_to_string(temp_dir.path().join(sanitize("a/b")).join("steps.jsonl")).unwrap();
        assert_eq!(encoded.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_sink_capability_forwards_to_sink() {
        let temp_dir = TempDir::new().unwrap();
        let sink: Arc<dyn PersistenceSink> = Arc::new(JsonlSink::new(temp_dir.path()).unwrap());
        let capability = SinkCapability::new(sink);

        let result = capability
            .invoke(
                "record_error",
                &json!({"session_id": "s-2", "step": "avatar", "error": "timeout"}),
            )
            .await
            .unwrap();
        assert_eq!(result["recorded"], true);

        let errors = std::fs::read_to_string(temp_dir.path().join("s-2/errors.jsonl")).unwrap();
        assert!(errors.contains("timeout"));

        assert!(capability
            .invoke("record_step", &json!({"step": "x"}))
            .await
            .is_err());
    }

    #[test]
    fn test_noop_sink() {
        assert!(NoopSink.record_step("s", "x", &Value::Null).is_ok());
        assert!(NoopSink.record_error("s", "x", "e").is_ok());
    }
}
