//! Daemon configuration.
//!
//! The config file is JSON. Keys are accepted in the PascalCase spelling
//! used by the service files shipped with the control plane, with camelCase
//! accepted as an alias. Durations are strings in the usual `"5s"`, `"3m"`
//! forms.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file path used when `-c/--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "aos_message_proxy.cfg";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "WorkingDir", alias = "workingDir")]
    pub working_dir: PathBuf,

    /// PEM bundle of the CA that signs both peer ends.
    #[serde(rename = "CACert", alias = "caCert")]
    pub ca_cert: PathBuf,

    /// Default certificate storage slot.
    #[serde(rename = "CertStorage", alias = "certStorage")]
    pub cert_storage: String,

    /// Where unpacked images are kept.
    #[serde(rename = "ImageStoreDir", alias = "imageStoreDir")]
    pub image_store_dir: PathBuf,

    #[serde(rename = "VChan", alias = "vChan")]
    pub vchan: VChanConfig,

    #[serde(rename = "CMConfig", alias = "cmConfig")]
    pub cm: CmConfig,

    #[serde(rename = "IAMConfig", alias = "iamConfig")]
    pub iam: IamConfig,

    #[serde(rename = "Downloader", alias = "downloader")]
    pub downloader: DownloaderConfig,
}

/// Hypervisor virtual-channel settings.
///
/// The proxy only consumes the certificate storage slots here; the channel
/// paths are handed to the transport implementation as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VChanConfig {
    #[serde(rename = "Domain", alias = "domain")]
    pub domain: u32,

    #[serde(rename = "XSRXPath", alias = "xsRxPath")]
    pub xs_rx_path: String,

    #[serde(rename = "XSTXPath", alias = "xsTxPath")]
    pub xs_tx_path: String,

    /// Storage slot for the IAM secure channel identity.
    #[serde(rename = "IAMCertStorage", alias = "iamCertStorage")]
    pub iam_cert_storage: String,

    /// Storage slot for the CM secure channel identity.
    #[serde(rename = "SMCertStorage", alias = "smCertStorage")]
    pub sm_cert_storage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CmConfig {
    #[serde(rename = "CMServerURL", alias = "cmServerUrl")]
    pub cm_server_url: String,

    #[serde(rename = "OpenPort", alias = "openPort")]
    pub open_port: u32,

    #[serde(rename = "SecurePort", alias = "securePort")]
    pub secure_port: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IamConfig {
    #[serde(rename = "IAMPublicServerURL", alias = "iamPublicServerUrl")]
    pub iam_public_server_url: String,

    #[serde(rename = "IAMProtectedServerURL", alias = "iamProtectedServerUrl")]
    pub iam_protected_server_url: String,

    #[serde(rename = "CertStorage", alias = "certStorage")]
    pub cert_storage: String,

    #[serde(rename = "OpenPort", alias = "openPort")]
    pub open_port: u32,

    #[serde(rename = "SecurePort", alias = "securePort")]
    pub secure_port: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    #[serde(rename = "DownloadDir", alias = "downloadDir")]
    pub download_dir: PathBuf,

    #[serde(rename = "MaxConcurrentDownloads", alias = "maxConcurrentDownloads")]
    pub max_concurrent_downloads: usize,

    /// Initial delay between download retries.
    #[serde(rename = "RetryDelay", alias = "retryDelay", with = "duration_str")]
    pub retry_delay: Duration,

    /// Upper bound the retry delay backs off towards.
    #[serde(rename = "MaxRetryDelay", alias = "maxRetryDelay", with = "duration_str")]
    pub max_retry_delay: Duration,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("/var/aos/messageproxy"),
            ca_cert: PathBuf::new(),
            cert_storage: String::new(),
            image_store_dir: PathBuf::from("/var/aos/messageproxy/images"),
            vchan: VChanConfig::default(),
            cm: CmConfig::default(),
            iam: IamConfig::default(),
            downloader: DownloaderConfig::default(),
        }
    }
}

impl Default for VChanConfig {
    fn default() -> Self {
        Self {
            domain: 0,
            xs_rx_path: String::new(),
            xs_tx_path: String::new(),
            iam_cert_storage: String::new(),
            sm_cert_storage: String::new(),
        }
    }
}

impl Default for CmConfig {
    fn default() -> Self {
        Self {
            cm_server_url: String::new(),
            open_port: 30001,
            secure_port: 30002,
        }
    }
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            iam_public_server_url: String::new(),
            iam_protected_server_url: String::new(),
            cert_storage: String::new(),
            open_port: 8080,
            secure_port: 8089,
        }
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("/var/aos/messageproxy/downloads"),
            max_concurrent_downloads: 4,
            retry_delay: Duration::from_secs(10),
            max_retry_delay: Duration::from_secs(300),
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),

    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, serde_json::Error),

    #[error("port {0} is assigned to more than one channel")]
    DuplicatePort(u32),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

// ── Loading ──────────────────────────────────────────────────────────────────

impl Config {
    /// Load and validate a config file. Any failure here is fatal to
    /// daemon startup.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;

        let config: Config = serde_json::from_str(&text)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// Enforce startup invariants: required endpoints present and every
    /// logical channel on its own port.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cm.cm_server_url.is_empty() {
            return Err(ConfigError::MissingField("CMConfig.CMServerURL"));
        }

        if self.iam.iam_public_server_url.is_empty() {
            return Err(ConfigError::MissingField("IAMConfig.IAMPublicServerURL"));
        }

        let mut seen = std::collections::HashSet::new();
        for port in [
            self.iam.open_port,
            self.iam.secure_port,
            self.cm.open_port,
            self.cm.secure_port,
        ] {
            if !seen.insert(port) {
                return Err(ConfigError::DuplicatePort(port));
            }
        }

        Ok(())
    }
}

// ── Duration strings ─────────────────────────────────────────────────────────

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
