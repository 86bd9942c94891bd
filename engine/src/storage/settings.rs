//! Settings file management

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tracing::info;
use url::Url;

use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::models::deployment::RequestDefaults;

/// Engine settings, loaded once at start-up
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily-rolling log files here
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub target: TargetSettings,

    #[serde(default)]
    pub workspace: WorkspaceSettings,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(default)]
    pub certificates: CertificateSettings,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub intake: IntakeSettings,

    /// Defaults for optional request fields
    #[serde(default)]
    pub defaults: RequestDefaults,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Run at most one attempt per domain at a time
    #[serde(default = "default_true")]
    pub serialize_domains: bool,

    /// Finished outcomes kept for status queries
    #[serde(default = "default_outcome_cache_capacity")]
    pub outcome_cache_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_outcome_cache_capacity() -> usize {
    256
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            target: TargetSettings::default(),
            workspace: WorkspaceSettings::default(),
            proxy: ProxySettings::default(),
            certificates: CertificateSettings::default(),
            registry: RegistrySettings::default(),
            intake: IntakeSettings::default(),
            defaults: RequestDefaults::default(),
            timeouts: TimeoutSettings::default(),
            serialize_domains: true,
            outcome_cache_capacity: default_outcome_cache_capacity(),
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    9000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Target host identity and layout
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSettings {
    #[serde(default = "default_target_user")]
    pub user: String,

    #[serde(default = "default_target_host")]
    pub host: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// Passed as `-o` options to ssh, scp and rsync
    #[serde(default = "default_ssh_options")]
    pub ssh_options: Vec<String>,

    /// One directory per deployed domain lives here
    #[serde(default = "default_site_root")]
    pub site_root: String,
}

fn default_target_user() -> String {
    "pi".to_string()
}

fn default_target_host() -> String {
    "aria".to_string()
}

fn default_ssh_options() -> Vec<String> {
    vec![
        "BatchMode=yes".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
    ]
}

fn default_site_root() -> String {
    "/home/pi/static-sites".to_string()
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            user: default_target_user(),
            host: default_target_host(),
            port: None,
            identity_file: None,
            ssh_options: default_ssh_options(),
            site_root: default_site_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceSettings {
    #[serde(default = "default_workspace_base")]
    pub base_dir: PathBuf,
}

fn default_workspace_base() -> PathBuf {
    PathBuf::from("/tmp/road-deploys")
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            base_dir: default_workspace_base(),
        }
    }
}

/// nginx locations and commands on the target host
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    #[serde(default = "default_sites_available")]
    pub sites_available: String,

    #[serde(default = "default_sites_enabled")]
    pub sites_enabled: String,

    #[serde(default = "default_remote_staging")]
    pub remote_staging_dir: String,

    /// Prefix for privileged commands, empty for none
    #[serde(default = "default_privilege")]
    pub privilege: String,

    #[serde(default = "default_validate_command")]
    pub validate_command: String,

    #[serde(default = "default_reload_command")]
    pub reload_command: String,
}

fn default_sites_available() -> String {
    "/etc/nginx/sites-available".to_string()
}

fn default_sites_enabled() -> String {
    "/etc/nginx/sites-enabled".to_string()
}

fn default_remote_staging() -> String {
    "/tmp".to_string()
}

fn default_privilege() -> String {
    "sudo".to_string()
}

fn default_validate_command() -> String {
    "sudo nginx -t".to_string()
}

fn default_reload_command() -> String {
    "sudo nginx -s reload".to_string()
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            sites_available: default_sites_available(),
            sites_enabled: default_sites_enabled(),
            remote_staging_dir: default_remote_staging(),
            privilege: default_privilege(),
            validate_command: default_validate_command(),
            reload_command: default_reload_command(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertificateSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_certificate_email")]
    pub email: String,

    #[serde(default = "default_certificate_command")]
    pub command: String,
}

fn default_certificate_email() -> String {
    "admin@blackroad.io".to_string()
}

fn default_certificate_command() -> String {
    "sudo certbot".to_string()
}

impl Default for CertificateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            email: default_certificate_email(),
            command: default_certificate_command(),
        }
    }
}

/// Deployment registry endpoint; notifications are off without a base URL
#[derive(Debug, Default, Deserialize)]
pub struct RegistrySettings {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub token: Option<SecretString>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()).map(SecretString::from))
}

/// Webhook translation rules
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeSettings {
    /// Webhook deployments go to `<repository name>.<domain_suffix>`
    #[serde(default = "default_domain_suffix")]
    pub domain_suffix: String,

    /// Stripped from the pushed ref to obtain the branch
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_domain_suffix() -> String {
    "blackroad.io".to_string()
}

fn default_branch_prefix() -> String {
    "refs/heads/".to_string()
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            domain_suffix: default_domain_suffix(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

/// Per-stage time budgets, in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_fetch_secs")]
    pub fetch_secs: u64,

    #[serde(default = "default_build_secs")]
    pub build_secs: u64,

    #[serde(default = "default_sync_secs")]
    pub sync_secs: u64,

    /// Small remote commands and proxy configuration steps
    #[serde(default = "default_remote_secs")]
    pub remote_secs: u64,

    #[serde(default = "default_certificate_secs")]
    pub certificate_secs: u64,

    #[serde(default = "default_registry_secs")]
    pub registry_secs: u64,

    /// Upper bound on draining in-flight attempts at shutdown
    #[serde(default = "default_shutdown_secs")]
    pub shutdown_secs: u64,
}

fn default_fetch_secs() -> u64 {
    300
}

fn default_build_secs() -> u64 {
    900
}

fn default_sync_secs() -> u64 {
    300
}

fn default_remote_secs() -> u64 {
    60
}

fn default_certificate_secs() -> u64 {
    180
}

fn default_registry_secs() -> u64 {
    30
}

fn default_shutdown_secs() -> u64 {
    120
}

impl TimeoutSettings {
    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    pub fn sync(&self) -> Duration {
        Duration::from_secs(self.sync_secs)
    }

    pub fn remote(&self) -> Duration {
        Duration::from_secs(self.remote_secs)
    }

    pub fn certificate(&self) -> Duration {
        Duration::from_secs(self.certificate_secs)
    }

    pub fn registry(&self) -> Duration {
        Duration::from_secs(self.registry_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            fetch_secs: default_fetch_secs(),
            build_secs: default_build_secs(),
            sync_secs: default_sync_secs(),
            remote_secs: default_remote_secs(),
            certificate_secs: default_certificate_secs(),
            registry_secs: default_registry_secs(),
            shutdown_secs: default_shutdown_secs(),
        }
    }
}

impl Settings {
    /// Read settings from a file; a missing file yields the defaults
    pub async fn load(file: &File) -> Result<Self, EngineError> {
        if !file.exists().await {
            info!(
                "No settings file at {}, using defaults",
                file.path().display()
            );
            return Ok(Self::default());
        }
        file.read_json().await
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| EngineError::ConfigError(format!("invalid PORT: {}", port)))?;
        }
        if let Some(dir) = lookup("DEPLOY_BASE_DIR") {
            self.workspace.base_dir = PathBuf::from(dir);
        }
        if let Some(host) = lookup("TARGET_HOST") {
            self.target.host = host;
        }
        if let Some(user) = lookup("TARGET_USER") {
            self.target.user = user;
        }
        if let Some(url) = lookup("REGISTRY_API") {
            self.registry.base_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.parse().map_err(EngineError::ConfigError)?;
        }
        Ok(())
    }

    /// Check settings that would otherwise fail at deploy time
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: String| Err(EngineError::ConfigError(reason));

        if self.target.host.trim().is_empty() {
            return invalid("target.host must not be empty".to_string());
        }
        if !self.target.site_root.starts_with('/') {
            return invalid(format!(
                "target.site_root must be absolute: {}",
                self.target.site_root
            ));
        }
        for (name, path) in [
            ("proxy.sites_available", &self.proxy.sites_available),
            ("proxy.sites_enabled", &self.proxy.sites_enabled),
            ("proxy.remote_staging_dir", &self.proxy.remote_staging_dir),
        ] {
            if !path.starts_with('/') {
                return invalid(format!("{} must be absolute: {}", name, path));
            }
        }
        if !Path::new(&self.workspace.base_dir).is_absolute() {
            return invalid(format!(
                "workspace.base_dir must be absolute: {}",
                self.workspace.base_dir.display()
            ));
        }
        if self.intake.domain_suffix.trim_matches('.').is_empty() {
            return invalid("intake.domain_suffix must not be empty".to_string());
        }
        if let Some(base_url) = &self.registry.base_url {
            let url = Url::parse(base_url)
                .map_err(|e| EngineError::ConfigError(format!("registry.base_url: {}", e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return invalid(format!("registry.base_url must be http(s): {}", base_url));
            }
        }
        Ok(())
    }
}
