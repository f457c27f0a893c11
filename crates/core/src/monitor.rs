// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 ovpn-connect Contributors

// ovpn-connect - Log Monitor
// Tails the daemon log line-by-line and races recognition of the
// initialization marker against a fixed deadline. Exactly one terminal
// transition fires per watch; cancellation is idempotent.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Fixed substring the daemon logs once the tunnel is up
pub const INIT_COMPLETED_MARKER: &str = "Initialization Sequence Completed";

const INIT_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Terminal state of a log watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Marker observed before the deadline; pid read from the pid file
    Completed { pid: String },
    /// Deadline elapsed without the marker
    TimedOut,
}

/// Byte-offset reader over a growing log file.
///
/// Tolerates the file not yet existing, never re-reads seen bytes, and
/// carries incomplete trailing lines across polls.
struct LogCursor {
    path: PathBuf,
    offset: u64,
    partial: String,
}

impl LogCursor {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            offset: 0,
            partial: String::new(),
        }
    }

    /// Read newly appended complete lines, if any
    async fn read_new_lines(&mut self) -> Vec<String> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            // Not created yet; the daemon may not have started writing
            Err(_) => return Vec::new(),
        };

        if let Ok(meta) = file.metadata().await {
            if meta.len() < self.offset {
                warn!("Log file shrank; restarting from the beginning");
                self.offset = 0;
                self.partial.clear();
            }
        }

        if file.seek(SeekFrom::Start(self.offset)).await.is_err() {
            return Vec::new();
        }

        let mut buf = Vec::new();
        match file.read_to_end(&mut buf).await {
            Ok(0) => return Vec::new(),
            Ok(n) => self.offset += n as u64,
            Err(e) => {
                debug!("Log read failed: {}", e);
                return Vec::new();
            }
        }

        self.partial.push_str(&String::from_utf8_lossy(&buf));

        let mut lines = Vec::new();
        while let Some(newline) = self.partial.find('\n') {
            let line = self.partial[..newline].trim_end_matches('\r').to_string();
            self.partial.drain(..=newline);
            lines.push(line);
        }
        lines
    }
}

/// Watches the daemon log for the initialization marker.
///
/// States: Watching -> Completed | TimedOut. Whichever fires first
/// cancels the other through the shared `CancellationToken`; cancelling
/// twice is safe.
pub struct LogMonitor {
    log_path: PathBuf,
    pid_path: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl LogMonitor {
    pub fn new(log_path: &Path, pid_path: &Path) -> Self {
        Self {
            log_path: log_path.to_path_buf(),
            pid_path: pid_path.to_path_buf(),
            timeout: INIT_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            cancel: CancellationToken::new(),
        }
    }

    /// Override the deadline (tests scale this down)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the tail poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Token that releases the watch from outside (e.g. the launch
    /// failure path). Cancelling is idempotent.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Watch until a terminal transition fires.
    ///
    /// Returns `None` only when the token was cancelled externally
    /// before either transition; otherwise exactly one of `Completed`
    /// or `TimedOut` is produced, and the watch resource is released
    /// exactly once either way.
    pub async fn watch(self) -> Option<MonitorOutcome> {
        let mut cursor = LogCursor::new(&self.log_path);
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("Log watch cancelled");
                    return None;
                }

                () = &mut deadline => {
                    self.cancel.cancel();
                    error!(
                        "VPN connection failed: no '{}' within {:?}",
                        INIT_COMPLETED_MARKER, self.timeout
                    );
                    return Some(MonitorOutcome::TimedOut);
                }

                () = tokio::time::sleep(self.poll_interval) => {
                    for line in cursor.read_new_lines().await {
                        // Every observed line is bring-up progress
                        info!("{}", line);
                        if line.contains(INIT_COMPLETED_MARKER) {
                            self.cancel.cancel();
                            return Some(MonitorOutcome::Completed { pid: self.read_pid().await });
                        }
                    }
                }
            }
        }
    }

    /// Read and trim the pid the daemon recorded. Missing or unreadable
    /// pid files degrade to an empty pid rather than failing the watch.
    async fn read_pid(&self) -> String {
        match tokio::fs::read_to_string(&self.pid_path).await {
            Ok(pid) => pid.trim().to_string(),
            Err(e) => {
                warn!("Could not read pid file {}: {}", self.pid_path.display(), e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn monitor_for(dir: &Path) -> LogMonitor {
        LogMonitor::new(&dir.join("openvpn.log"), &dir.join("openvpn.pid"))
            .with_timeout(Duration::from_millis(800))
            .with_poll_interval(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_completes_when_marker_appears() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("openvpn.log");
        fs::write(&log, "").unwrap();
        fs::write(dir.path().join("openvpn.pid"), "12345\n").unwrap();

        let monitor = monitor_for(dir.path());
        let writer = tokio::spawn({
            let log = log.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                let mut f = fs::OpenOptions::new().append(true).open(&log).unwrap();
                writeln!(f, "foo").unwrap();
                writeln!(f, "bar").unwrap();
                writeln!(f, "{}", INIT_COMPLETED_MARKER).unwrap();
            }
        });

        let outcome = monitor.watch().await;
        writer.await.unwrap();

        assert_eq!(
            outcome,
            Some(MonitorOutcome::Completed {
                pid: "12345".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_times_out_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("openvpn.log"), "noise\nmore noise\n").unwrap();

        let outcome = monitor_for(dir.path()).watch().await;
        assert_eq!(outcome, Some(MonitorOutcome::TimedOut));
    }

    #[tokio::test]
    async fn test_tolerates_log_file_created_late() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("openvpn.log");
        fs::write(dir.path().join("openvpn.pid"), "7\n").unwrap();

        let monitor = monitor_for(dir.path());
        let log_clone = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            fs::write(&log_clone, format!("{}\n", INIT_COMPLETED_MARKER)).unwrap();
        });

        let outcome = monitor.watch().await;
        assert_eq!(
            outcome,
            Some(MonitorOutcome::Completed {
                pid: "7".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_marker_split_across_writes_only_matches_complete_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("openvpn.log");
        fs::write(&log, "").unwrap();
        fs::write(dir.path().join("openvpn.pid"), "99").unwrap();

        let monitor = monitor_for(dir.path());
        let log_clone = log.clone();
        tokio::spawn(async move {
            let mut f = fs::OpenOptions::new().append(true).open(&log_clone).unwrap();
            // Partial line without newline first
            write!(f, "Initialization Sequence").unwrap();
            f.flush().unwrap();
            drop(f);
            tokio::time::sleep(Duration::from_millis(120)).await;
            let mut f = fs::OpenOptions::new().append(true).open(&log_clone).unwrap();
            writeln!(f, " Completed").unwrap();
        });

        let outcome = monitor.watch().await;
        assert_eq!(
            outcome,
            Some(MonitorOutcome::Completed {
                pid: "99".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_external_cancel_stops_watch_without_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor_for(dir.path()).with_timeout(Duration::from_secs(30));
        let token = monitor.cancel_token();

        let handle = tokio::spawn(monitor.watch());
        token.cancel();

        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_double_cancel_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor_for(dir.path());
        let token = monitor.cancel_token();

        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());

        // Watch started after cancellation terminates immediately
        assert_eq!(monitor.watch().await, None);
    }

    #[tokio::test]
    async fn test_missing_pid_file_degrades_to_empty_pid() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("openvpn.log"),
            format!("{}\n", INIT_COMPLETED_MARKER),
        )
        .unwrap();

        let outcome = monitor_for(dir.path()).watch().await;
        assert_eq!(
            outcome,
            Some(MonitorOutcome::Completed {
                pid: String::new()
            })
        );
    }
}
