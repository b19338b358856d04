use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_HELPDESK_CONFIG: &str = "HELPDESK_CONFIG";
pub const ENV_HELPDESK_API_TOKEN: &str = "HELPDESK_API_TOKEN";

const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_AGENTS_PATH: &str = "users";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;
const DEFAULT_RESULTING_STATUS: &str = "assigned";
const SUPPORTED_RESULTING_STATUSES: &[&str] = &["assigned", "in-progress"];
const DEFAULT_FALLBACK_CHAIN: &[&str] = &["put_full", "put_minimal", "patch_minimal"];
const DEFAULT_AGENT_ROLES: &[&str] = &["agent", "admin"];
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    fn file(action: &str, path: &Path, error: impl std::fmt::Display) -> Self {
        Self::Message(format!(
            "Failed to {action} HELPDESK_CONFIG at {}: {error}",
            path.display()
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HelpdeskConfig {
    #[serde(default)]
    pub backend: BackendConfigToml,
    #[serde(default)]
    pub assignment: AssignmentConfigToml,
    #[serde(default)]
    pub logging: LoggingConfigToml,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfigToml {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_agents_path")]
    pub agents_path: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfigToml {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            agents_path: default_agents_path(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentConfigToml {
    /// Status an open ticket moves to once assigned: `assigned` or `in-progress`.
    #[serde(default = "default_resulting_status")]
    pub resulting_status: String,
    #[serde(default = "default_fallback_chain")]
    pub fallback_chain: Vec<String>,
    #[serde(default = "default_agent_roles")]
    pub agent_roles: Vec<String>,
}

impl Default for AssignmentConfigToml {
    fn default() -> Self {
        Self {
            resulting_status: default_resulting_status(),
            fallback_chain: default_fallback_chain(),
            agent_roles: default_agent_roles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfigToml {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfigToml {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BackendRuntimeConfig {
    pub api_url: String,
    pub agents_path: String,
    pub request_timeout_secs: u64,
    pub api_token: Option<String>,
}

impl std::fmt::Debug for BackendRuntimeConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BackendRuntimeConfig")
            .field("api_url", &self.api_url)
            .field("agents_path", &self.agents_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRuntimeConfig {
    pub resulting_status: String,
    pub fallback_chain: Vec<String>,
    pub agent_roles: Vec<String>,
}

impl HelpdeskConfig {
    /// Backend settings plus the API token, which is only ever read from the environment.
    pub fn backend_runtime(&self) -> BackendRuntimeConfig {
        BackendRuntimeConfig {
            api_url: self.backend.api_url.clone(),
            agents_path: self.backend.agents_path.clone(),
            request_timeout_secs: self.backend.request_timeout_secs,
            api_token: api_token_from_env(),
        }
    }

    pub fn assignment_runtime(&self) -> AssignmentRuntimeConfig {
        AssignmentRuntimeConfig {
            resulting_status: self.assignment.resulting_status.clone(),
            fallback_chain: self.assignment.fallback_chain.clone(),
            agent_roles: self.assignment.agent_roles.clone(),
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.logging.filter
    }
}

pub fn load_from_env() -> Result<HelpdeskConfig, ConfigError> {
    let path = config_path_from_env()?;
    load_from_path(path)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<HelpdeskConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::configuration("Unable to resolve home directory from HOME or USERPROFILE")
    })?;

    Ok(home.join(".config").join("helpdesk").join("config.toml"))
}

pub fn api_token_from_env() -> Option<String> {
    std::env::var(ENV_HELPDESK_API_TOKEN)
        .ok()
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
}

fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var(ENV_HELPDESK_CONFIG) {
        Ok(raw) => {
            if raw.trim().is_empty() {
                default_config_path()
            } else {
                Ok(raw.into())
            }
        }
        Err(std::env::VarError::NotPresent) => default_config_path(),
        Err(_) => Err(ConfigError::configuration(
            "HELPDESK_CONFIG contained invalid UTF-8",
        )),
    }
}

fn resolve_home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"].into_iter().find_map(|key| {
        std::env::var(key)
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    })
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_owned()
}

fn default_agents_path() -> String {
    DEFAULT_AGENTS_PATH.to_owned()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_resulting_status() -> String {
    DEFAULT_RESULTING_STATUS.to_owned()
}

fn default_fallback_chain() -> Vec<String> {
    DEFAULT_FALLBACK_CHAIN
        .iter()
        .map(|value| (*value).to_owned())
        .collect()
}

fn default_agent_roles() -> Vec<String> {
    DEFAULT_AGENT_ROLES
        .iter()
        .map(|value| (*value).to_owned())
        .collect()
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Reads the config file, or `None` when nothing exists at `path` yet.
fn read_config_file(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(ConfigError::file("read", path, error)),
    }
}

/// Writes `config` as TOML, creating the parent directory on first use.
fn write_config_file(path: &Path, config: &HelpdeskConfig) -> Result<(), ConfigError> {
    let rendered =
        toml::to_string_pretty(config).map_err(|error| ConfigError::file("render", path, error))?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|error| ConfigError::file("create the directory for", path, error))?;
    }
    std::fs::write(path, rendered).map_err(|error| ConfigError::file("write", path, error))
}

/// First run writes the defaults; later runs write back only when normalization changed
/// something.
fn load_or_create_config(path: &Path) -> Result<HelpdeskConfig, ConfigError> {
    let Some(raw) = read_config_file(path)? else {
        let config = HelpdeskConfig::default();
        write_config_file(path, &config)?;
        return Ok(config);
    };

    let mut config: HelpdeskConfig =
        toml::from_str(&raw).map_err(|error| ConfigError::file("parse", path, error))?;
    if normalize_config(&mut config)? {
        write_config_file(path, &config)?;
    }
    Ok(config)
}

/// Cleans up hand-edited values in place. Returns whether anything changed; values that cannot
/// be repaired are errors.
fn normalize_config(config: &mut HelpdeskConfig) -> Result<bool, ConfigError> {
    let mut changed = false;

    changed |= tidy_or_default(&mut config.backend.api_url, &[], default_api_url);
    let api_url = config.backend.api_url.as_str();
    if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
        return Err(ConfigError::configuration(format!(
            "Invalid backend.api_url `{api_url}`: expected an http:// or https:// URL"
        )));
    }

    changed |= tidy_or_default(&mut config.backend.agents_path, &['/'], default_agents_path);

    let timeout = config
        .backend
        .request_timeout_secs
        .clamp(1, MAX_REQUEST_TIMEOUT_SECS);
    if timeout != config.backend.request_timeout_secs {
        config.backend.request_timeout_secs = timeout;
        changed = true;
    }

    changed |= normalize_resulting_status(&mut config.assignment.resulting_status)?;
    changed |= normalize_fallback_chain(&mut config.assignment.fallback_chain)?;

    changed |= normalize_agent_roles(&mut config.assignment.agent_roles);
    if config.assignment.agent_roles.is_empty() {
        config.assignment.agent_roles = default_agent_roles();
        changed = true;
    }

    changed |= tidy_or_default(&mut config.logging.filter, &[], default_log_filter);

    Ok(changed)
}

fn normalize_resulting_status(value: &mut String) -> Result<bool, ConfigError> {
    let normalized = value
        .trim()
        .to_ascii_lowercase()
        .replace(['_', ' '], "-");
    let normalized = if normalized.is_empty() {
        default_resulting_status()
    } else {
        normalized
    };

    if !SUPPORTED_RESULTING_STATUSES.contains(&normalized.as_str()) {
        return Err(ConfigError::configuration(format!(
            "Invalid assignment.resulting_status `{}`: expected one of {}",
            value.trim(),
            SUPPORTED_RESULTING_STATUSES.join(", ")
        )));
    }

    if *value != normalized {
        *value = normalized;
        return Ok(true);
    }
    Ok(false)
}

fn normalize_fallback_chain(values: &mut Vec<String>) -> Result<bool, ConfigError> {
    let mut normalized: Vec<String> = Vec::with_capacity(values.len());
    for raw in values.iter() {
        let key = raw.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        if !DEFAULT_FALLBACK_CHAIN.contains(&key.as_str()) {
            return Err(ConfigError::configuration(format!(
                "Invalid assignment.fallback_chain entry `{}`: expected one of {}",
                raw.trim(),
                DEFAULT_FALLBACK_CHAIN.join(", ")
            )));
        }
        if !normalized.contains(&key) {
            normalized.push(key);
        }
    }
    if normalized.is_empty() {
        normalized = default_fallback_chain();
    }

    if *values != normalized {
        *values = normalized;
        return Ok(true);
    }
    Ok(false)
}

/// Strips `trim` from both ends of `value`; an emptied value takes `default()`.
fn tidy_or_default(value: &mut String, trim: &[char], default: fn() -> String) -> bool {
    let tidied = value.trim().trim_matches(trim);
    let tidied = if tidied.is_empty() {
        default()
    } else {
        tidied.to_owned()
    };
    let changed = tidied != *value;
    *value = tidied;
    changed
}

fn normalize_agent_roles(values: &mut Vec<String>) -> bool {
    let mut normalized: Vec<String> = Vec::with_capacity(values.len());
    for role in values.iter().map(|value| value.trim().to_ascii_lowercase()) {
        if !role.is_empty() && !normalized.contains(&role) {
            normalized.push(role);
        }
    }
    if *values != normalized {
        *values = normalized;
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
    use tempfile::TempDir;

    /// Overrides environment variables until dropped. Holds the process-wide env lock so tests
    /// touching the environment run one at a time.
    struct EnvOverride {
        saved: Vec<(&'static str, Option<String>)>,
        _lock: MutexGuard<'static, ()>,
    }

    impl EnvOverride {
        fn apply(vars: &[(&'static str, Option<&str>)]) -> Self {
            static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
            let lock = ENV_LOCK
                .get_or_init(|| Mutex::new(()))
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let saved = vars
                .iter()
                .map(|(name, _)| (*name, std::env::var(name).ok()))
                .collect();
            for (name, value) in vars {
                set_or_clear(name, *value);
            }
            Self { saved, _lock: lock }
        }
    }

    impl Drop for EnvOverride {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                set_or_clear(name, value.as_deref());
            }
        }
    }

    fn set_or_clear(name: &str, value: Option<&str>) {
        match value {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
    }

    fn scratch_dir() -> TempDir {
        tempfile::tempdir().expect("temp dir should be created")
    }

    fn env_path(dir: &TempDir) -> &str {
        dir.path().to_str().expect("temp dir path should be UTF-8")
    }

    fn write_fixture(path: &Path, raw: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture config parent");
        }
        std::fs::write(path, raw.as_bytes()).expect("write fixture config");
    }

    fn desk_config_under(root: &Path) -> PathBuf {
        root.join(".config").join("helpdesk").join("config.toml")
    }

    #[test]
    fn load_from_env_creates_default_config_when_missing() {
        let home = scratch_dir();
        let _env = EnvOverride::apply(&[
            ("HOME", Some(env_path(&home))),
            ("USERPROFILE", None),
            (ENV_HELPDESK_CONFIG, None),
        ]);

        let config = load_from_env().expect("load defaults");
        assert_eq!(config, HelpdeskConfig::default());
        assert_eq!(config.backend.api_url, "http://localhost:3000");
        assert_eq!(
            config.assignment.fallback_chain,
            vec!["put_full", "put_minimal", "patch_minimal"]
        );
        assert!(desk_config_under(home.path()).exists());
    }

    #[test]
    fn load_from_env_honors_explicit_config_path() {
        let home = scratch_dir();
        let root = scratch_dir();
        let explicit = root.path().join("nested").join("custom.toml");
        let _env = EnvOverride::apply(&[
            ("HOME", Some(env_path(&home))),
            ("USERPROFILE", None),
            (
                ENV_HELPDESK_CONFIG,
                Some(explicit.to_str().expect("config path")),
            ),
        ]);

        load_from_env().expect("load explicit path config");
        assert!(explicit.exists());
        assert!(!desk_config_under(home.path()).exists());
    }

    #[test]
    fn load_from_env_treats_blank_config_path_as_unset() {
        let home = scratch_dir();
        let _env = EnvOverride::apply(&[
            ("HOME", Some(env_path(&home))),
            ("USERPROFILE", None),
            (ENV_HELPDESK_CONFIG, Some("  ")),
        ]);

        load_from_env().expect("load config from default path");
        assert!(desk_config_under(home.path()).exists());
    }

    #[test]
    fn default_config_path_falls_back_to_userprofile_when_home_is_blank() {
        let profile = scratch_dir();
        let _env = EnvOverride::apply(&[
            ("HOME", Some(" ")),
            ("USERPROFILE", Some(env_path(&profile))),
        ]);

        assert_eq!(
            default_config_path().expect("config path"),
            desk_config_under(profile.path())
        );
    }

    #[test]
    fn api_token_is_read_from_environment_only() {
        let root = scratch_dir();
        let path = root.path().join("config.toml");
        write_fixture(&path, "[backend]\napi_url = 'https://desk.example.com'\n");

        {
            let _env = EnvOverride::apply(&[(ENV_HELPDESK_API_TOKEN, Some("  t0ken  "))]);
            let config = load_from_path(&path).expect("load config");
            let backend = config.backend_runtime();
            assert_eq!(backend.api_token.as_deref(), Some("t0ken"));
            assert!(!format!("{backend:?}").contains("t0ken"));
        }
        let _env = EnvOverride::apply(&[(ENV_HELPDESK_API_TOKEN, Some(""))]);
        assert_eq!(api_token_from_env(), None);
    }

    #[test]
    fn load_from_path_returns_parse_error_for_invalid_toml() {
        let root = scratch_dir();
        let path = root.path().join("config.toml");
        write_fixture(&path, "[backend]\napi_url = [\n");

        let error = load_from_path(&path).expect_err("expected parse failure");
        assert!(error
            .to_string()
            .contains("Failed to parse HELPDESK_CONFIG"));
    }

    #[test]
    fn untouched_config_file_is_not_rewritten() {
        let root = scratch_dir();
        let path = root.path().join("config.toml");
        let raw = "# ops desk\n[backend]\napi_url = 'https://desk.example.com'\n";
        write_fixture(&path, raw);

        load_from_path(&path).expect("load config");
        assert_eq!(std::fs::read_to_string(&path).expect("read config"), raw);
    }

    #[test]
    fn load_from_path_normalizes_and_persists_supported_bounds() {
        let root = scratch_dir();
        let path = root.path().join("config.toml");
        write_fixture(
            &path,
            r#"
[backend]
api_url = "  https://desk.example.com/api  "
agents_path = "/employees/"
request_timeout_secs = 0

[assignment]
resulting_status = "In_Progress"
fallback_chain = ["PATCH_MINIMAL", " ", "patch_minimal", "put_full"]
agent_roles = [" Agent ", "", "agent", "ADMIN"]

[logging]
filter = "  "
"#,
        );

        let config = load_from_path(&path).expect("load normalized config");
        assert_eq!(config.backend.api_url, "https://desk.example.com/api");
        assert_eq!(config.backend.agents_path, "employees");
        assert_eq!(config.backend.request_timeout_secs, 1);
        assert_eq!(config.assignment.resulting_status, "in-progress");
        assert_eq!(
            config.assignment.fallback_chain,
            vec!["patch_minimal", "put_full"]
        );
        assert_eq!(config.assignment.agent_roles, vec!["agent", "admin"]);
        assert_eq!(config.log_filter(), "info");

        let persisted = std::fs::read_to_string(&path).expect("read persisted config");
        let reparsed: HelpdeskConfig = toml::from_str(&persisted).expect("parse persisted config");
        assert_eq!(reparsed, config);
    }

    #[test]
    fn load_from_path_rejects_unsupported_values() {
        let root = scratch_dir();
        let status_path = root.path().join("status.toml");
        write_fixture(&status_path, "[assignment]\nresulting_status = 'closed'\n");
        let error = load_from_path(&status_path).expect_err("closed is not an assignment status");
        assert!(error.to_string().contains("assignment.resulting_status"));

        let chain_path = root.path().join("chain.toml");
        write_fixture(&chain_path, "[assignment]\nfallback_chain = ['post_full']\n");
        let error = load_from_path(&chain_path).expect_err("unknown strategy");
        assert!(error.to_string().contains("post_full"));

        let url_path = root.path().join("url.toml");
        write_fixture(&url_path, "[backend]\napi_url = 'ftp://desk'\n");
        let error = load_from_path(&url_path).expect_err("non-http url");
        assert!(error.to_string().contains("backend.api_url"));
    }

    #[test]
    fn typed_config_slices_expose_expected_fields() {
        let config = HelpdeskConfig::default();
        let assignment = config.assignment_runtime();
        assert_eq!(assignment.resulting_status, "assigned");
        assert_eq!(assignment.agent_roles, vec!["agent", "admin"]);

        let backend = config.backend_runtime();
        assert_eq!(backend.agents_path, "users");
        assert_eq!(backend.request_timeout_secs, 20);
    }
}
