// ovpn-connect - Daemon Launcher
// Starts the openvpn daemon detached against the augmented
// configuration, with its log and pid redirected to known files

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::options::BringupOptions;

/// Launches the tunnel daemon as a detached background process
pub struct DaemonLauncher {
    openvpn_bin: PathBuf,
    sudo: bool,
}

impl DaemonLauncher {
    pub fn new(options: &BringupOptions) -> Self {
        Self {
            openvpn_bin: options.openvpn_bin.clone(),
            sudo: options.sudo,
        }
    }

    /// Run `openvpn --config <cfg> --daemon --log <log> --writepid <pid>`.
    ///
    /// The caller prepares the log file before any watcher attaches;
    /// the launcher never touches it. The daemon forks itself into the
    /// background; a successful exit here only means the launch
    /// succeeded, not that the tunnel is up. On failure the current log
    /// contents are surfaced at error level before the error
    /// propagates.
    pub async fn launch(
        &self,
        config_path: &Path,
        log_path: &Path,
        pid_path: &Path,
    ) -> Result<()> {
        let mut command = if self.sudo {
            let mut c = Command::new("sudo");
            c.arg(&self.openvpn_bin);
            c
        } else {
            Command::new(&self.openvpn_bin)
        };
        command
            .arg("--config")
            .arg(config_path)
            .arg("--daemon")
            .arg("--log")
            .arg(log_path)
            .arg("--writepid")
            .arg(pid_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!("Launching VPN daemon: {}", self.openvpn_bin.display());

        let output = command.output().await.map_err(|e| {
            self.surface_log(log_path);
            Error::Launch {
                reason: format!("could not run {}: {}", self.openvpn_bin.display(), e),
            }
        })?;

        if !output.status.success() {
            self.surface_log(log_path);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Launch {
                reason: format!("{} ({})", stderr.trim(), output.status),
            });
        }

        Ok(())
    }

    /// Dump whatever the daemon managed to log before it died
    fn surface_log(&self, log_path: &Path) {
        match std::fs::read_to_string(log_path) {
            Ok(contents) if !contents.is_empty() => error!("{}", contents),
            Ok(_) => error!("VPN daemon produced no log output"),
            Err(e) => error!("Could not read daemon log {}: {}", log_path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn stub_options(dir: &Path, script: &str) -> BringupOptions {
        let bin = dir.join("fake-openvpn");
        fs::write(&bin, script).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let mut opts = BringupOptions::new(dir.join("client.ovpn"));
        opts.openvpn_bin = bin;
        opts.sudo = false;
        opts
    }

    #[tokio::test]
    async fn test_launch_success_leaves_log_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let opts = stub_options(dir.path(), "#!/bin/sh\nexit 0\n");
        let log = dir.path().join("openvpn.log");
        fs::write(&log, "prepared by the caller").unwrap();

        DaemonLauncher::new(&opts)
            .launch(&opts.config_file, &log, &dir.path().join("openvpn.pid"))
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(&log).unwrap(), "prepared by the caller");
    }

    #[tokio::test]
    async fn test_launch_failure_propagates_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let opts = stub_options(dir.path(), "#!/bin/sh\necho 'bad option' >&2\nexit 1\n");

        let result = DaemonLauncher::new(&opts)
            .launch(
                &opts.config_file,
                &dir.path().join("openvpn.log"),
                &dir.path().join("openvpn.pid"),
            )
            .await;

        match result {
            Err(Error::Launch { reason }) => assert!(reason.contains("bad option")),
            other => panic!("expected launch failure, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_launch_missing_binary_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = BringupOptions::new(dir.path().join("client.ovpn"));
        opts.openvpn_bin = dir.path().join("does-not-exist");
        opts.sudo = false;

        let result = DaemonLauncher::new(&opts)
            .launch(
                &opts.config_file,
                &dir.path().join("openvpn.log"),
                &dir.path().join("openvpn.pid"),
            )
            .await;

        assert!(matches!(result, Err(Error::Launch { .. })));
    }
}
