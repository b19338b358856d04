use crate::interface::AssignmentError;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_AGENTS_PATH: &str = "users";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Clone, PartialEq, Eq)]
pub struct RestBackendConfig {
    pub api_url: String,
    pub agents_path: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
}

impl fmt::Debug for RestBackendConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RestBackendConfig")
            .field("api_url", &self.api_url)
            .field("agents_path", &self.agents_path)
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for RestBackendConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            agents_path: DEFAULT_AGENTS_PATH.to_owned(),
            api_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl RestBackendConfig {
    pub fn from_settings(
        api_url: impl Into<String>,
        agents_path: impl Into<String>,
        api_token: Option<String>,
        request_timeout_secs: u64,
    ) -> Result<Self, AssignmentError> {
        let api_url = api_url.into().trim().to_owned();
        let api_url = if api_url.is_empty() {
            DEFAULT_API_URL.to_owned()
        } else {
            api_url
        };
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(AssignmentError::Validation(format!(
                "backend api_url `{api_url}` must start with http:// or https://"
            )));
        }

        let agents_path = agents_path.into().trim().trim_matches('/').to_owned();
        let agents_path = if agents_path.is_empty() {
            DEFAULT_AGENTS_PATH.to_owned()
        } else {
            agents_path
        };

        if request_timeout_secs == 0 {
            return Err(AssignmentError::Validation(
                "backend request_timeout_secs must be greater than zero.".to_owned(),
            ));
        }

        Ok(Self {
            api_url,
            agents_path,
            api_token: api_token
                .map(|token| token.trim().to_owned())
                .filter(|token| !token.is_empty()),
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}
