// ovpn-connect - Bring-up Options
// Explicit configuration struct passed into the orchestrator.
// Secret inputs carry the literal key/credential content, not paths.

use std::path::PathBuf;

use serde::Deserialize;

/// Options for a single tunnel bring-up invocation
#[derive(Debug, Clone, Deserialize)]
pub struct BringupOptions {
    /// Path to the base OpenVPN configuration file (required)
    pub config_file: PathBuf,

    /// Directory where secret artifacts, the log file and the pid file
    /// are created. Defaults to the current directory.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Username for auth-user-pass (only used together with password)
    #[serde(default)]
    pub username: Option<String>,

    /// Password for auth-user-pass (only used together with username)
    #[serde(default)]
    pub password: Option<String>,

    /// Client private key content (key directive)
    #[serde(default)]
    pub client_key: Option<String>,

    /// TLS auth key content (tls-auth directive, key-direction 1)
    #[serde(default)]
    pub tls_auth_key: Option<String>,

    /// TLS crypt key content (tls-crypt directive, key-direction 1)
    #[serde(default)]
    pub tls_crypt_key: Option<String>,

    /// TLS crypt v2 client key content (tls-crypt-v2 directive)
    #[serde(default)]
    pub tls_crypt_v2_key: Option<String>,

    /// Echo the final configuration to the log
    #[serde(default)]
    pub echo_config: bool,

    /// Probe endpoint reachability before launching the daemon
    #[serde(default = "default_test_connection")]
    pub test_connection: bool,

    /// Path to the openvpn binary
    #[serde(default = "default_openvpn_bin")]
    pub openvpn_bin: PathBuf,

    /// Launch the daemon through sudo (disable for root/rootless setups)
    #[serde(default = "default_sudo")]
    pub sudo: bool,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_test_connection() -> bool {
    true
}

fn default_openvpn_bin() -> PathBuf {
    PathBuf::from("openvpn")
}

fn default_sudo() -> bool {
    true
}

impl BringupOptions {
    /// Create options for the given base configuration file, with every
    /// optional input absent and defaults applied.
    pub fn new(config_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            work_dir: default_work_dir(),
            username: None,
            password: None,
            client_key: None,
            tls_auth_key: None,
            tls_crypt_key: None,
            tls_crypt_v2_key: None,
            echo_config: false,
            test_connection: default_test_connection(),
            openvpn_bin: default_openvpn_bin(),
            sudo: default_sudo(),
        }
    }

    /// Set the working directory for generated artifacts
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Set username and password for auth-user-pass
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// True when both a username and a password were supplied
    pub fn has_credentials(&self) -> bool {
        matches!((&self.username, &self.password), (Some(u), Some(p)) if !u.is_empty() && !p.is_empty())
    }
}
