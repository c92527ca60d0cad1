//! fast.com measurement through the external `fast-cli` tool.
//!
//! A bundled Node runtime plus fast-cli script is preferred; otherwise
//! `fast` or `fast-cli` is looked up on `PATH`. The tool is run with
//! `--upload --json` and its JSON report parsed.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use super::{MeasurementProvider, Unavailable};
use crate::models::Throughput;

const NAME: &str = "fast-cli";
const TOOL_ARGS: &[&str] = &["--upload", "--json"];
const PATH_TOOLS: &[&str] = &["fast", "fast-cli"];

/// One way of launching the tool.
#[derive(Debug, Clone, PartialEq)]
struct Invocation {
    label: &'static str,
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

pub struct FastCliProvider {
    resource_dir: PathBuf,
    timeout: Duration,
}

impl FastCliProvider {
    pub fn new(resource_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            resource_dir,
            timeout,
        }
    }

    /// The bundled runtime, if both the node binary and the script exist.
    fn bundled(&self) -> Option<Invocation> {
        let node_name = if cfg!(windows) { "node.exe" } else { "node" };
        let node = self
            .resource_dir
            .join("third_party")
            .join("node")
            .join(node_name);
        let bundle = self.resource_dir.join("third_party").join("fast-bundle");
        let script = bundle
            .join("node_modules")
            .join("fast-cli")
            .join("distribution")
            .join("cli.js");
        if !(node.is_file() && script.is_file()) {
            return None;
        }
        let mut args = vec![script.to_string_lossy().into_owned()];
        args.extend(TOOL_ARGS.iter().map(|a| a.to_string()));
        Some(Invocation {
            label: "bundled Node",
            program: node,
            args,
            cwd: Some(bundle),
        })
    }

    fn on_path() -> Option<Invocation> {
        let path = std::env::var_os("PATH")?;
        let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();
        PATH_TOOLS
            .iter()
            .find_map(|tool| find_in_dirs(tool, &dirs))
            .map(|program| Invocation {
                label: "PATH",
                program,
                args: TOOL_ARGS.iter().map(|a| a.to_string()).collect(),
                cwd: None,
            })
    }

    fn candidates(&self) -> Vec<Invocation> {
        self.bundled().into_iter().chain(Self::on_path()).collect()
    }

    /// Run one invocation, returning its parsed JSON report.
    async fn run(&self, inv: &Invocation) -> Result<Value, String> {
        let mut cmd = Command::new(&inv.program);
        cmd.args(&inv.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &inv.cwd {
            cmd.current_dir(cwd);
        }

        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW
            cmd.creation_flags(0x0800_0000);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("spawn failed: {}", e)),
            Err(_) => return Err(format!("timed out after {}s", self.timeout.as_secs())),
        };
        if !output.status.success() {
            return Err(format!("exited with {}", output.status));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = stdout.trim();
        let body = if trimmed.is_empty() { "{}" } else { trimmed };
        serde_json::from_str(body).map_err(|e| format!("bad JSON: {}", e))
    }
}

#[async_trait]
impl MeasurementProvider for FastCliProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn measure(&self) -> Result<Throughput, Unavailable> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            return Err(Unavailable::new(NAME, "no fast-cli executable found"));
        }

        let mut last_reason = String::new();
        for inv in &candidates {
            log::info!("[SPEEDTEST] Backend: fast-cli ({})", inv.label);
            match self.run(inv).await {
                Ok(report) => match parse_fast_json(&report) {
                    Some(t) => return Ok(t),
                    None => last_reason = format!("{}: incomplete report", inv.label),
                },
                Err(reason) => last_reason = format!("{}: {}", inv.label, reason),
            }
            log::debug!("fast-cli candidate failed: {}", last_reason);
        }
        Err(Unavailable::new(NAME, last_reason))
    }
}

fn find_in_dirs(tool: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let names: Vec<String> = if cfg!(windows) {
        vec![
            format!("{}.exe", tool),
            format!("{}.cmd", tool),
            tool.to_string(),
        ]
    } else {
        vec![tool.to_string()]
    };
    dirs.iter().find_map(|dir| {
        names
            .iter()
            .map(|name| dir.join(name))
            .find(|p| is_executable(p))
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Extract download/upload Mb/s from a fast-cli JSON report.
///
/// Top-level `downloadSpeed`/`download` and `uploadSpeed`/`upload` are tried
/// first, then `speeds.download`/`speeds.upload`. Both directions must come
/// from the same place.
pub fn parse_fast_json(report: &Value) -> Option<Throughput> {
    let top = report.as_object()?;
    let mut sources = vec![(top, &["downloadSpeed", "download"][..], &["uploadSpeed", "upload"][..])];
    if let Some(speeds) = top.get("speeds").and_then(Value::as_object) {
        sources.push((speeds, &["download"][..], &["upload"][..]));
    }

    sources.into_iter().find_map(|(obj, down_keys, up_keys)| {
        let down = first_float(obj, down_keys)?;
        let up = first_float(obj, up_keys)?;
        Some(Throughput {
            down_mbps: down,
            up_mbps: up,
        })
    })
}

/// First value under any of `keys` that converts to a float.
fn first_float(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_top_level_speed_keys() {
        let t = parse_fast_json(&json!({"downloadSpeed": 95.0, "uploadSpeed": 10}));
        assert_eq!(
            t,
            Some(Throughput {
                down_mbps: 95.0,
                up_mbps: 10.0
            })
        );
    }

    #[test]
    fn parses_short_keys_and_numeric_strings() {
        let t = parse_fast_json(&json!({"download": "120.5", "upload": " 8 "})).unwrap();
        assert_eq!(t.down_mbps, 120.5);
        assert_eq!(t.up_mbps, 8.0);
    }

    #[test]
    fn long_key_takes_precedence_over_short() {
        let t = parse_fast_json(&json!({
            "downloadSpeed": 50, "download": 1,
            "uploadSpeed": 5, "upload": 1
        }))
        .unwrap();
        assert_eq!(t.down_mbps, 50.0);
        assert_eq!(t.up_mbps, 5.0);
    }

    #[test]
    fn unconvertible_value_falls_to_next_key() {
        let t = parse_fast_json(&json!({
            "downloadSpeed": "n/a", "download": 42,
            "uploadSpeed": null, "upload": 7
        }))
        .unwrap();
        assert_eq!(t.down_mbps, 42.0);
        assert_eq!(t.up_mbps, 7.0);
    }

    #[test]
    fn parses_nested_speeds_object() {
        let t = parse_fast_json(&json!({"speeds": {"download": 300, "upload": "40.5"}})).unwrap();
        assert_eq!(t.down_mbps, 300.0);
        assert_eq!(t.up_mbps, 40.5);
    }

    #[test]
    fn incomplete_top_level_falls_back_to_speeds() {
        let t = parse_fast_json(&json!({
            "downloadSpeed": 99,
            "speeds": {"download": 80, "upload": 9}
        }))
        .unwrap();
        assert_eq!(t.down_mbps, 80.0);
        assert_eq!(t.up_mbps, 9.0);
    }

    #[test]
    fn rejects_missing_or_non_object_reports() {
        assert_eq!(parse_fast_json(&json!({})), None);
        assert_eq!(parse_fast_json(&json!({"downloadSpeed": 10})), None);
        assert_eq!(parse_fast_json(&json!([1, 2])), None);
        assert_eq!(parse_fast_json(&json!({"speeds": "fast"})), None);
    }

    #[test]
    fn bundled_candidate_requires_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FastCliProvider::new(dir.path().to_path_buf(), Duration::from_secs(1));
        assert!(provider.bundled().is_none());

        let node_dir = dir.path().join("third_party").join("node");
        std::fs::create_dir_all(&node_dir).unwrap();
        let node_name = if cfg!(windows) { "node.exe" } else { "node" };
        std::fs::write(node_dir.join(node_name), "").unwrap();
        assert!(provider.bundled().is_none());

        let script_dir = dir
            .path()
            .join("third_party/fast-bundle/node_modules/fast-cli/distribution");
        std::fs::create_dir_all(&script_dir).unwrap();
        std::fs::write(script_dir.join("cli.js"), "").unwrap();

        let inv = provider.bundled().unwrap();
        assert_eq!(inv.program, node_dir.join(node_name));
        assert_eq!(inv.args[1..], ["--upload", "--json"]);
        assert_eq!(inv.cwd, Some(dir.path().join("third_party").join("fast-bundle")));
    }

    #[test]
    fn path_lookup_skips_missing_tools() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_in_dirs("fast", &[dir.path().to_path_buf()]).is_none());
    }

    #[tokio::test]
    async fn missing_executable_is_unavailable() {
        let provider = FastCliProvider::new(PathBuf::from("/nonexistent"), Duration::from_secs(1));
        let inv = Invocation {
            label: "test",
            program: PathBuf::from("/nonexistent/fast"),
            args: vec![],
            cwd: None,
        };
        assert!(provider.run(&inv).await.is_err());
    }
}
