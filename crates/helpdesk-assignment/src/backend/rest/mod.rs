mod config;
mod wire;

pub use config::{
    RestBackendConfig, DEFAULT_AGENTS_PATH, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT_SECS,
};

use crate::interface::{
    Agent, AssignmentError, Team, Ticket, TicketBackend, TicketId, TicketUpdateBody,
    TicketUpdateRequest, UpdateMethod,
};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use serde_json::Value;
use tracing::debug;
use wire::{backend_message, extract_list, parse_ticket, AgentRecord, TeamRecord};

/// `TicketBackend` over the help desk's JSON REST API (or a json-server style mock of it).
#[derive(Debug, Clone)]
pub struct RestTicketBackend {
    config: RestBackendConfig,
    base_url: Url,
    client: Client,
}

impl RestTicketBackend {
    pub fn new(config: RestBackendConfig) -> Result<Self, AssignmentError> {
        let base_url = Url::parse(&config.api_url).map_err(|error| {
            AssignmentError::Validation(format!(
                "backend api_url `{}` is not a valid URL: {error}",
                config.api_url
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AssignmentError::Validation(format!(
                "backend api_url `{}` cannot carry a path",
                config.api_url
            )));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(token) = config.api_token.as_deref() {
            let value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|error| {
                    AssignmentError::Validation(format!("HELPDESK_API_TOKEN is invalid: {error}"))
                })?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .user_agent("helpdesk/assignment")
            .build()
            .map_err(|error| {
                AssignmentError::Transport(format!(
                    "failed to build help desk HTTP client: {error}"
                ))
            })?;

        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    pub fn config(&self) -> &RestBackendConfig {
        &self.config
    }

    /// Appends each segment to the base URL path, percent-encoding `/`, `?`, `#` and `%`.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn collection_url(&self, path: &str) -> Url {
        self.endpoint(path.split('/').filter(|segment| !segment.is_empty()))
    }

    /// The id always lands in one segment under `tickets/`. Dot segments would be dropped by
    /// URL normalization and address the collection instead.
    fn ticket_url(&self, ticket_id: &TicketId) -> Result<Url, AssignmentError> {
        let id = ticket_id.as_str();
        if id.is_empty() || id == "." || id == ".." {
            return Err(AssignmentError::Validation(format!(
                "ticket id `{id}` cannot be addressed by the help desk API"
            )));
        }
        Ok(self.endpoint(["tickets", id]))
    }

    fn ticket_path(ticket_id: &TicketId) -> String {
        format!("tickets/{}", ticket_id.as_str())
    }

    /// Sends the request and returns the raw body of a 2xx response.
    async fn send(
        &self,
        method: &str,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, AssignmentError> {
        debug!(method, path, "help desk API request");
        let response = request.send().await.map_err(|error| {
            AssignmentError::Transport(format!("{method} /{path} failed: {error}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            AssignmentError::Transport(format!("{method} /{path} response read failed: {error}"))
        })?;

        if status.is_success() {
            return Ok(body);
        }

        let message = backend_message(&body);
        if status == StatusCode::NOT_FOUND {
            return Err(AssignmentError::NotFound(format!(
                "{method} /{path}: {message}"
            )));
        }

        Err(AssignmentError::Conflict(format!(
            "{method} /{path} was rejected with status {status}: {message}"
        )))
    }

    async fn request_json(
        &self,
        method: &str,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, AssignmentError> {
        let body = self.send(method, path, request).await?;
        serde_json::from_str(&body).map_err(|error| {
            AssignmentError::Transport(format!(
                "{method} /{path} response was malformed JSON: {error}"
            ))
        })
    }
}

#[async_trait]
impl TicketBackend for RestTicketBackend {
    async fn list_tickets(&self) -> Result<Vec<Ticket>, AssignmentError> {
        let request = self.client.get(self.collection_url("tickets"));
        let payload = self.request_json("GET", "tickets", request).await?;
        extract_list(payload, "tickets")
    }

    async fn get_ticket(&self, ticket_id: &TicketId) -> Result<Ticket, AssignmentError> {
        let path = Self::ticket_path(ticket_id);
        let request = self.client.get(self.ticket_url(ticket_id)?);
        parse_ticket(self.request_json("GET", &path, request).await?)
    }

    async fn update_ticket(
        &self,
        request: TicketUpdateRequest,
    ) -> Result<Option<Ticket>, AssignmentError> {
        let path = Self::ticket_path(&request.ticket_id);
        let url = self.ticket_url(&request.ticket_id)?;
        let builder = match request.method {
            UpdateMethod::Put => self.client.put(url),
            UpdateMethod::Patch => self.client.patch(url),
        };
        let builder = match &request.body {
            TicketUpdateBody::Full(ticket) => builder.json(ticket.as_ref()),
            TicketUpdateBody::Partial(patch) => builder.json(patch),
        };

        let body = self.send(request.method.as_str(), &path, builder).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&body)
            .ok()
            .map(parse_ticket)
        {
            Some(Ok(ticket)) => Ok(Some(ticket)),
            _ => {
                debug!(path = %path, "update response did not contain a ticket; ignoring body");
                Ok(None)
            }
        }
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, AssignmentError> {
        let path = self.config.agents_path.clone();
        let request = self.client.get(self.collection_url(&path));
        let payload = self.request_json("GET", &path, request).await?;
        let records: Vec<AgentRecord> = extract_list(payload, &path)?;
        Ok(records.into_iter().map(Agent::from).collect())
    }

    async fn list_teams(&self) -> Result<Vec<Team>, AssignmentError> {
        let request = self.client.get(self.collection_url("teams"));
        let payload = self.request_json("GET", "teams", request).await?;
        let records: Vec<TeamRecord> = extract_list(payload, "teams")?;
        Ok(records.into_iter().map(Team::from).collect())
    }

    async fn delete_ticket(&self, ticket_id: &TicketId) -> Result<(), AssignmentError> {
        let path = Self::ticket_path(ticket_id);
        let request = self.client.delete(self.ticket_url(ticket_id)?);
        self.send("DELETE", &path, request).await.map(|_| ())
    }
}
