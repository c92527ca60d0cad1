//! Per-tick reachability check.
//!
//! The probe reports a plain boolean. Spawn failures, timeouts and non-zero
//! exits all collapse to `false`; nothing is propagated to the sampler.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// One bounded-latency reachability check.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Single ICMP echo via the system `ping` binary.
pub struct PingProbe {
    host: String,
    timeout: Duration,
}

impl PingProbe {
    pub fn new(host: &str, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            timeout,
        }
    }
}

/// `ping` arguments for one echo on `os`, waiting at most `timeout`.
fn ping_args(os: &str, host: &str, timeout: Duration) -> Vec<String> {
    let millis = timeout.as_millis();
    match os {
        "windows" => vec![
            host.to_string(),
            "-n".into(),
            "1".into(),
            "-w".into(),
            millis.to_string(),
        ],
        // -W is in milliseconds here
        "macos" | "ios" | "freebsd" | "dragonfly" => vec![
            "-c".into(),
            "1".into(),
            "-W".into(),
            millis.max(1).to_string(),
            host.to_string(),
        ],
        // iputils and busybox take whole seconds
        _ => vec![
            "-c".into(),
            "1".into(),
            "-W".into(),
            millis.div_ceil(1000).max(1).to_string(),
            host.to_string(),
        ],
    }
}

/// Wait for `cmd` to exit successfully within `bound`. The child is killed
/// when the bound elapses.
async fn succeeds_within(mut cmd: Command, bound: Duration) -> bool {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    match tokio::time::timeout(bound, cmd.status()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            log::debug!("ping spawn failed: {}", e);
            false
        }
        Err(_) => false,
    }
}

#[async_trait]
impl ConnectivityProbe for PingProbe {
    async fn probe(&self) -> bool {
        let mut cmd = Command::new("ping");
        cmd.args(ping_args(std::env::consts::OS, &self.host, self.timeout));

        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW
            cmd.creation_flags(0x0800_0000);
        }

        // The tool's own wait may round up; the tick never waits past the timeout
        succeeds_within(cmd, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn args(os: &str, millis: u64) -> Vec<String> {
        ping_args(os, "example.com", Duration::from_millis(millis))
    }

    #[test]
    fn linux_wait_is_whole_seconds_rounded_up() {
        assert_eq!(args("linux", 1200), vec!["-c", "1", "-W", "2", "example.com"]);
        assert_eq!(args("linux", 200), vec!["-c", "1", "-W", "1", "example.com"]);
    }

    #[test]
    fn bsd_family_wait_is_milliseconds() {
        for os in ["macos", "freebsd"] {
            assert_eq!(args(os, 1200), vec!["-c", "1", "-W", "1200", "example.com"]);
        }
    }

    #[test]
    fn windows_wait_is_milliseconds() {
        assert_eq!(args("windows", 1200), vec!["example.com", "-n", "1", "-w", "1200"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hanging_command_is_cut_off_at_the_bound() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let bound = Duration::from_millis(200);

        let started = Instant::now();
        let ok = succeeds_within(cmd, bound).await;
        let elapsed = started.elapsed();

        assert!(!ok);
        assert!(elapsed >= bound);
        assert!(elapsed < bound + Duration::from_millis(150), "took {:?}", elapsed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_command_reports_true() {
        assert!(succeeds_within(Command::new("true"), Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn unresolvable_host_reports_false() {
        let probe = PingProbe::new("host.invalid", Duration::from_millis(200));
        assert!(!probe.probe().await);
    }
}
