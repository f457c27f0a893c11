// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 ovpn-connect Contributors

// ovpn-connect - CLI
// Pipeline-facing entry point: brings up an OpenVPN tunnel and reports
// the endpoint facts and daemon pid to later pipeline steps

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ovpn_connect_core::{BringupOptions, BringupOutcome, Endpoint, Orchestrator};

#[derive(Parser, Debug)]
#[command(name = "ovpn-connect")]
#[command(about = "Bring up an OpenVPN tunnel and wait for it to initialize", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the base OpenVPN configuration file
    #[arg(short, long, required_unless_present = "options")]
    config: Option<PathBuf>,

    /// TOML file with bring-up options (flags override its values)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Directory for generated artifacts (secrets, log, pid file)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Username for auth-user-pass
    #[arg(long, env = "VPN_USERNAME", hide_env_values = true)]
    username: Option<String>,

    /// Password for auth-user-pass
    #[arg(long, env = "VPN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Client private key content
    #[arg(long, env = "VPN_CLIENT_KEY", hide_env_values = true)]
    client_key: Option<String>,

    /// TLS auth key content
    #[arg(long, env = "VPN_TLS_AUTH_KEY", hide_env_values = true)]
    tls_auth_key: Option<String>,

    /// TLS crypt key content
    #[arg(long, env = "VPN_TLS_CRYPT_KEY", hide_env_values = true)]
    tls_crypt_key: Option<String>,

    /// TLS crypt v2 client key content
    #[arg(long, env = "VPN_TLS_CRYPT_V2_KEY", hide_env_values = true)]
    tls_crypt_v2_key: Option<String>,

    /// Echo the final configuration to the log
    #[arg(long)]
    echo_config: bool,

    /// Skip the pre-launch reachability probe
    #[arg(long)]
    no_test_connection: bool,

    /// Path to the openvpn binary
    #[arg(long)]
    openvpn_bin: Option<PathBuf>,

    /// Launch openvpn directly instead of through sudo
    #[arg(long)]
    no_sudo: bool,

    /// File to append pipeline outputs to (vpn_ip=, vpn_port=, vpn_pid=)
    #[arg(long)]
    outputs_file: Option<PathBuf>,

    /// Print a JSON summary to stdout for scripting
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Build the bring-up options: start from the TOML options file if
    /// one was given, then let explicit flags and env inputs win.
    fn into_options(self) -> Result<BringupOptions> {
        let mut opts = match &self.options {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read options file {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse options file {}", path.display()))?
            }
            None => BringupOptions::new(
                self.config
                    .clone()
                    .context("--config is required without an options file")?,
            ),
        };

        if let Some(config) = self.config {
            opts.config_file = config;
        }
        if let Some(work_dir) = self.work_dir {
            opts.work_dir = work_dir;
        }
        if let Some(openvpn_bin) = self.openvpn_bin {
            opts.openvpn_bin = openvpn_bin;
        }
        opts.username = self.username.or(opts.username);
        opts.password = self.password.or(opts.password);
        opts.client_key = self.client_key.or(opts.client_key);
        opts.tls_auth_key = self.tls_auth_key.or(opts.tls_auth_key);
        opts.tls_crypt_key = self.tls_crypt_key.or(opts.tls_crypt_key);
        opts.tls_crypt_v2_key = self.tls_crypt_v2_key.or(opts.tls_crypt_v2_key);
        if self.echo_config {
            opts.echo_config = true;
        }
        if self.no_test_connection {
            opts.test_connection = false;
        }
        if self.no_sudo {
            opts.sudo = false;
        }
        Ok(opts)
    }
}

/// Append key=value outputs for later pipeline steps. Written on every
/// path that knows the endpoint, including fatal bring-up failures.
fn write_outputs(path: &PathBuf, endpoint: Option<&Endpoint>, pid: &str) -> Result<()> {
    let (ip, port) = match endpoint {
        Some(ep) => (ep.host.clone(), ep.port.to_string()),
        None => (String::new(), String::new()),
    };

    let mut contents = fs::read_to_string(path).unwrap_or_default();
    contents.push_str(&format!("vpn_ip={}\nvpn_port={}\nvpn_pid={}\n", ip, port, pid));
    fs::write(path, contents)
        .with_context(|| format!("Failed to write outputs file {}", path.display()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ovpn_connect=info,ovpn_connect_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    let outputs_file = cli.outputs_file.clone();
    let options = cli.into_options()?;

    info!("Bringing up VPN from config: {}", options.config_file.display());

    let mut orchestrator = Orchestrator::new(options);
    let result = orchestrator.bring_up().await;

    if let Some(path) = &outputs_file {
        let endpoint = match &result {
            Ok(bringup) => bringup.endpoint.as_ref(),
            // The daemon never came up, but the endpoint facts are
            // still useful to later pipeline steps
            Err(_) => orchestrator.endpoint(),
        };
        let pid = match &result {
            Ok(bringup) => match &bringup.outcome {
                BringupOutcome::Connected { pid } => pid.as_str(),
                BringupOutcome::TimedOut => "",
            },
            Err(_) => "",
        };
        write_outputs(path, endpoint, pid)?;
    }

    let bringup = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&bringup)?);
    }

    if !bringup.is_connected() {
        error!("VPN connection failed.");
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_config_required_without_options_file() {
        assert!(Cli::try_parse_from(["ovpn-connect"]).is_err());
        assert!(Cli::try_parse_from(["ovpn-connect", "--config", "client.ovpn"]).is_ok());
        assert!(Cli::try_parse_from(["ovpn-connect", "--options", "opts.toml"]).is_ok());
    }

    #[test]
    fn test_flags_map_to_options() {
        let cli = parse(&[
            "ovpn-connect",
            "--config",
            "client.ovpn",
            "--username",
            "alice",
            "--password",
            "secret",
            "--echo-config",
            "--no-test-connection",
            "--no-sudo",
        ]);
        let opts = cli.into_options().unwrap();

        assert_eq!(opts.config_file, PathBuf::from("client.ovpn"));
        assert!(opts.has_credentials());
        assert!(opts.echo_config);
        assert!(!opts.test_connection);
        assert!(!opts.sudo);
    }

    #[test]
    fn test_options_file_with_flag_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opts.toml");
        fs::write(
            &path,
            "config_file = \"from-file.ovpn\"\nusername = \"fileuser\"\npassword = \"filepass\"\n",
        )
        .unwrap();

        let cli = parse(&[
            "ovpn-connect",
            "--options",
            path.to_str().unwrap(),
            "--username",
            "flaguser",
        ]);
        let opts = cli.into_options().unwrap();

        assert_eq!(opts.config_file, PathBuf::from("from-file.ovpn"));
        assert_eq!(opts.username.as_deref(), Some("flaguser"));
        assert_eq!(opts.password.as_deref(), Some("filepass"));
    }

    #[test]
    fn test_write_outputs_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs");
        let endpoint = Endpoint {
            host: "10.0.0.5".to_string(),
            port: 1194,
        };

        write_outputs(&path, Some(&endpoint), "12345").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "vpn_ip=10.0.0.5\nvpn_port=1194\nvpn_pid=12345\n"
        );
    }

    #[test]
    fn test_write_outputs_endpoint_without_pid_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs");
        let endpoint = Endpoint {
            host: "10.0.0.5".to_string(),
            port: 1194,
        };

        // Launch failed or timed out: endpoint known, no pid
        write_outputs(&path, Some(&endpoint), "").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "vpn_ip=10.0.0.5\nvpn_port=1194\nvpn_pid=\n"
        );
    }

    #[test]
    fn test_write_outputs_empty_without_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs");

        write_outputs(&path, None, "").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "vpn_ip=\nvpn_port=\nvpn_pid=\n"
        );
    }
}
