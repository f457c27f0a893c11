// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 ovpn-connect Contributors

// ovpn-connect - Config Augmenter
// Parses the endpoint out of a base OpenVPN configuration and appends
// the authentication and runtime directives, materializing secret
// artifacts as it goes. The augmented text replaces the file on disk
// before the daemon is launched.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::options::BringupOptions;
use crate::secrets;

/// File names for materialized secret artifacts, created in the work directory
pub const CREDENTIALS_FILE: &str = "up.txt";
pub const CLIENT_KEY_FILE: &str = "client.key";
pub const TLS_AUTH_KEY_FILE: &str = "ta.key";
pub const TLS_CRYPT_KEY_FILE: &str = "tc.key";
pub const TLS_CRYPT_V2_KEY_FILE: &str = "tcv2.key";

const MARKER_COMMENT: &str = "# ----- modified by ovpn-connect -----";

const ECHO_BEGIN: &str = "========== begin configuration ==========";
const ECHO_END: &str = "=========== end configuration ===========";

/// Server certificate hardening, appended only when no tls-auth key is supplied
const HARDENING_DIRECTIVES: &[&str] = &["remote-cert-tls server", "tls-cert-profile preferred"];

/// Fixed runtime block appended to every augmented configuration
const RUNTIME_DIRECTIVES: &[&str] = &[
    "data-ciphers AES-256-GCM:AES-128-GCM:CHACHA20-POLY1305",
    "data-ciphers-fallback AES-256-CBC",
    "nobind",
    "persist-key",
    "persist-tun",
    "comp-lzo no",
    "verb 3",
    "connect-retry 5",
    "connect-retry-max 3",
];

/// The (address, port) pair the tunnel daemon connects to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Transport the daemon (and the reachability probe) uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Udp,
    Tcp,
}

/// Result of augmenting a base configuration
#[derive(Debug)]
pub struct AugmentedConfig {
    /// Final configuration text, as written back to disk
    pub text: String,
    /// Endpoint extracted from the first `remote` line, if any
    pub endpoint: Option<Endpoint>,
    /// Transport from the first `proto` line (OpenVPN defaults to UDP)
    pub transport: Transport,
}

/// Transforms a user-supplied tunnel configuration into a fully
/// materialized, secret-bearing one
pub struct ConfigAugmenter<'a> {
    options: &'a BringupOptions,
}

impl<'a> ConfigAugmenter<'a> {
    pub fn new(options: &'a BringupOptions) -> Self {
        Self { options }
    }

    /// Augment the configuration file in place.
    ///
    /// Checks existence before any parsing, extracts the endpoint,
    /// appends directives in a fixed order, materializes the secret
    /// files they reference, and rewrites the file.
    pub fn augment(&self) -> Result<AugmentedConfig> {
        let config_path = &self.options.config_file;
        if !config_path.exists() {
            return Err(Error::ConfigNotFound(config_path.clone()));
        }

        let original = fs::read_to_string(config_path)?;

        let endpoint = parse_endpoint(&original);
        match &endpoint {
            Some(ep) => info!("Found VPN server: {}", ep),
            None => warn!("No remote server found in config file"),
        }
        let transport = parse_transport(&original);

        let text = self.build_augmented(&original)?;
        fs::write(config_path, &text)?;

        if self.options.echo_config {
            info!("{}", ECHO_BEGIN);
            info!("{}", text);
            info!("{}", ECHO_END);
        }

        Ok(AugmentedConfig {
            text,
            endpoint,
            transport,
        })
    }

    /// Append the directive lines and materialize the secrets they
    /// reference. Order is fixed regardless of input presentation.
    fn build_augmented(&self, original: &str) -> Result<String> {
        let opts = self.options;
        let mut text = original.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(MARKER_COMMENT);
        text.push('\n');

        if opts.has_credentials() {
            let path = self.artifact_path(CREDENTIALS_FILE);
            text.push_str(&format!("auth-user-pass {}\n", path.display()));
            let content = format!(
                "{}\n{}",
                opts.username.as_deref().unwrap_or_default(),
                opts.password.as_deref().unwrap_or_default()
            );
            secrets::materialize(&path, &content)?;
        }

        if let Some(client_key) = &opts.client_key {
            let path = self.artifact_path(CLIENT_KEY_FILE);
            text.push_str(&format!("key {}\n", path.display()));
            secrets::materialize(&path, client_key)?;
        }

        if let Some(tls_auth_key) = &opts.tls_auth_key {
            let path = self.artifact_path(TLS_AUTH_KEY_FILE);
            text.push_str(&format!("tls-auth {} 1\n", path.display()));
            secrets::materialize(&path, tls_auth_key)?;
        } else {
            // No shared HMAC key to fence the control channel with, so
            // enforce strict server certificate validation instead.
            for directive in HARDENING_DIRECTIVES {
                text.push_str(directive);
                text.push('\n');
            }
        }

        if let Some(tls_crypt_key) = &opts.tls_crypt_key {
            let path = self.artifact_path(TLS_CRYPT_KEY_FILE);
            text.push_str(&format!("tls-crypt {} 1\n", path.display()));
            secrets::materialize(&path, tls_crypt_key)?;
        }

        if let Some(tls_crypt_v2_key) = &opts.tls_crypt_v2_key {
            let path = self.artifact_path(TLS_CRYPT_V2_KEY_FILE);
            text.push_str(&format!("tls-crypt-v2 {}\n", path.display()));
            secrets::materialize(&path, tls_crypt_v2_key)?;
        }

        for directive in RUNTIME_DIRECTIVES {
            text.push_str(directive);
            text.push('\n');
        }

        Ok(text)
    }

    fn artifact_path(&self, name: &str) -> PathBuf {
        self.options.work_dir.join(name)
    }
}

/// Extract host and port from the first line matching `remote <host> <port>`.
/// The keyword is case-sensitive and must start the line.
fn parse_endpoint(config: &str) -> Option<Endpoint> {
    for line in config.lines() {
        if !line.starts_with("remote") {
            continue;
        }
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("remote") {
            continue;
        }
        let (Some(host), Some(port_str)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        match port_str.parse::<u16>() {
            Ok(port) if port > 0 => {
                return Some(Endpoint {
                    host: host.to_string(),
                    port,
                })
            }
            _ => continue,
        }
    }
    None
}

/// Transport from the first `proto` directive; OpenVPN defaults to UDP
fn parse_transport(config: &str) -> Transport {
    for line in config.lines() {
        if !line.starts_with("proto") {
            continue;
        }
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("proto") {
            continue;
        }
        if let Some(value) = tokens.next() {
            if value.starts_with("tcp") {
                return Transport::Tcp;
            }
            if value.starts_with("udp") {
                return Transport::Udp;
            }
        }
    }
    Transport::Udp
}
