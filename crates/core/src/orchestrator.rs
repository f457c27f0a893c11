// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 ovpn-connect Contributors

// ovpn-connect - Orchestrator
// Composes config augmentation, probing, launch and log monitoring
// into the end-to-end bring-up sequence

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info};

use crate::config::{ConfigAugmenter, Endpoint};
use crate::error::Result;
use crate::launcher::DaemonLauncher;
use crate::monitor::{LogMonitor, MonitorOutcome};
use crate::options::BringupOptions;
use crate::probe::{self, ProbeReport};

/// Daemon log file name, created in the work directory
pub const LOG_FILE: &str = "openvpn.log";
/// Pid file the daemon writes once it has forked
pub const PID_FILE: &str = "openvpn.pid";

/// Terminal outcome of a bring-up invocation. A timeout travels here,
/// in the same channel as success; fatal errors travel as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BringupOutcome {
    /// Daemon initialized; pid as recorded in its pid file
    Connected { pid: String },
    /// The initialization marker never appeared before the deadline
    TimedOut,
}

/// Caller-visible result of the bring-up sequence
#[derive(Debug, Clone, Serialize)]
pub struct Bringup {
    /// Endpoint extracted from the configuration, if any
    pub endpoint: Option<Endpoint>,
    /// Reachability diagnostics, when probing ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeReport>,
    #[serde(flatten)]
    pub outcome: BringupOutcome,
}

impl Bringup {
    pub fn is_connected(&self) -> bool {
        matches!(self.outcome, BringupOutcome::Connected { .. })
    }
}

/// Drives the full bring-up sequence for one tunnel
pub struct Orchestrator {
    options: BringupOptions,
    endpoint: Option<Endpoint>,
}

impl Orchestrator {
    pub fn new(options: BringupOptions) -> Self {
        Self {
            options,
            endpoint: None,
        }
    }

    /// Endpoint parsed during the last bring-up attempt. Populated as
    /// soon as augmentation succeeds, so callers can still report the
    /// endpoint facts when a later step fails fatally.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Run the bring-up sequence: augment the configuration, probe the
    /// endpoint (diagnostics only), launch the daemon and watch its log
    /// until it either completes initialization or the deadline passes.
    pub async fn bring_up(&mut self) -> Result<Bringup> {
        let augmented = ConfigAugmenter::new(&self.options).augment()?;
        self.endpoint = augmented.endpoint.clone();

        // Purely informational; never blocks or aborts the sequence
        let probe_report = match &augmented.endpoint {
            Some(endpoint) if self.options.test_connection => {
                Some(probe::probe_endpoint(endpoint, augmented.transport).await)
            }
            _ => None,
        };

        let log_path = self.work_path(LOG_FILE);
        let pid_path = self.work_path(PID_FILE);

        // Truncate the log before anyone watches it so leftover lines
        // from a previous run cannot satisfy the marker check, then
        // start tailing before the daemon starts so no early lines are
        // missed
        std::fs::write(&log_path, "")?;
        let monitor = LogMonitor::new(&log_path, &pid_path);
        let cancel = monitor.cancel_token();
        let watch = tokio::spawn(monitor.watch());

        let launcher = DaemonLauncher::new(&self.options);
        if let Err(e) = launcher
            .launch(&self.options.config_file, &log_path, &pid_path)
            .await
        {
            // Release the watch before propagating
            cancel.cancel();
            let _ = watch.await;
            return Err(e);
        }

        let outcome = match watch.await {
            Ok(Some(MonitorOutcome::Completed { pid })) => {
                info!("VPN connected successfully. Daemon PID: {}", pid);
                BringupOutcome::Connected { pid }
            }
            Ok(Some(MonitorOutcome::TimedOut)) | Ok(None) => {
                error!("VPN connection failed.");
                BringupOutcome::TimedOut
            }
            Err(e) => {
                error!("Log watch task failed: {}", e);
                BringupOutcome::TimedOut
            }
        };

        Ok(Bringup {
            endpoint: augmented.endpoint,
            probe: probe_report,
            outcome,
        })
    }

    fn work_path(&self, name: &str) -> PathBuf {
        self.options.work_dir.join(name)
    }
}
