mod candidate;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

pub use candidate::{
    Agent, Availability, Candidate, CandidateFilter, CandidateKind, CandidatePool, CandidateRef,
    Team,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl AssignmentError {
    pub fn reason(&self) -> &str {
        match self {
            Self::Validation(message)
            | Self::NotFound(message)
            | Self::Conflict(message)
            | Self::Transport(message) => message.as_str(),
        }
    }

    /// Rejections of a payload shape are the only failures the fallback chain moves past.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

pub type AssignmentResult = Result<AssignedTicket, AssignmentError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(String);

impl TicketId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<String> for TicketId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TicketId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TicketStatus {
    #[default]
    Open,
    Assigned,
    InProgress,
    OnHold,
    Resolved,
    Closed,
    Other(String),
}

impl TicketStatus {
    pub fn as_label(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::InProgress => "in-progress",
            Self::OnHold => "on-hold",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Other(label) => label.as_str(),
        }
    }

    pub fn from_label(raw: &str) -> Self {
        match normalize_label(raw).as_str() {
            "open" | "new" => Self::Open,
            "assigned" => Self::Assigned,
            "in-progress" | "inprogress" => Self::InProgress,
            "on-hold" | "onhold" => Self::OnHold,
            "resolved" => Self::Resolved,
            "closed" => Self::Closed,
            _ => Self::Other(raw.trim().to_owned()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_label())
    }
}

impl Serialize for TicketStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_label())
    }
}

impl<'de> Deserialize<'de> for TicketStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .filter(|value| !value.trim().is_empty())
            .map(|value| Self::from_label(&value))
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TicketPriority {
    Critical,
    Urgent,
    High,
    Medium,
    Low,
    Unknown(String),
}

impl Default for TicketPriority {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl TicketPriority {
    pub fn as_label(&self) -> &str {
        match self {
            Self::Critical => "critical",
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown(label) => label.as_str(),
        }
    }

    pub fn from_label(raw: &str) -> Self {
        match normalize_label(raw).as_str() {
            "critical" => Self::Critical,
            "urgent" => Self::Urgent,
            "high" => Self::High,
            "medium" | "normal" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unknown(raw.trim().to_owned()),
        }
    }

    /// Queue position, most urgent first. `urgent` shares the `high` slot.
    pub fn urgency_rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Urgent | Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Unknown(_) => 4,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unknown(label) if label.is_empty())
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            formatter.write_str("unknown")
        } else {
            formatter.write_str(self.as_label())
        }
    }
}

impl Serialize for TicketPriority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_label())
    }
}

impl<'de> Deserialize<'de> for TicketPriority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw
            .and_then(|value| json_value_to_non_empty_string(&value))
            .map(|value| Self::from_label(&value))
            .unwrap_or_default())
    }
}

fn normalize_label(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|ch| if ch == '_' || ch == ' ' { '-' } else { ch })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    #[serde(deserialize_with = "deserialize_ticket_id")]
    pub id: TicketId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "TicketPriority::is_unset")]
    pub priority: TicketPriority,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_stringish"
    )]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Fields this crate does not model; carried through full-replace updates untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Ticket {
    pub fn new(id: impl Into<TicketId>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            customer_name: None,
            customer_email: None,
            category: None,
            contact_number: None,
            status: TicketStatus::Open,
            priority: TicketPriority::default(),
            assigned_to: None,
            created_at: None,
            updated_at: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_to
            .as_deref()
            .is_some_and(|assignee| !assignee.trim().is_empty())
    }

    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.description.as_deref())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or("Untitled")
    }

    pub fn updated_at_instant(&self) -> Option<OffsetDateTime> {
        self.updated_at
            .as_deref()
            .and_then(|value| OffsetDateTime::parse(value, &Rfc3339).ok())
    }

    /// Copy of this ticket carrying a new committed assignment.
    pub fn with_assignment(
        &self,
        assignee: &str,
        status: TicketStatus,
        updated_at: String,
    ) -> Self {
        let mut next = self.clone();
        next.assigned_to = Some(assignee.to_owned());
        next.status = status;
        next.updated_at = Some(updated_at);
        next
    }
}

/// Status a ticket ends up in after a successful assignment. Resolved and closed tickets keep
/// their status; everything else moves to `assigned_status`.
pub fn resulting_status(current: &TicketStatus, assigned_status: &TicketStatus) -> TicketStatus {
    if current.is_terminal() {
        current.clone()
    } else {
        assigned_status.clone()
    }
}

/// RFC 3339 timestamp for a mutation, strictly later than `previous` when that parses.
pub fn next_updated_at(previous: Option<&str>) -> String {
    let now = OffsetDateTime::now_utc();
    let previous =
        previous.and_then(|value| OffsetDateTime::parse(value.trim(), &Rfc3339).ok());
    let next = match previous {
        Some(previous) if previous >= now => previous + Duration::milliseconds(1),
        _ => now,
    };
    next.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedTicket {
    pub ticket: Ticket,
    pub candidate: CandidateRef,
    pub strategy: UpdateStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    Put,
    Patch,
}

impl UpdateMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Patch => "PATCH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketUpdateBody {
    Full(Box<Ticket>),
    Partial(AssignmentPatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketUpdateRequest {
    pub ticket_id: TicketId,
    pub method: UpdateMethod,
    pub body: TicketUpdateBody,
}

/// One request shape in the commit fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateStrategy {
    PutFull,
    PutMinimal,
    PatchMinimal,
}

impl UpdateStrategy {
    pub const fn as_key(self) -> &'static str {
        match self {
            Self::PutFull => "put_full",
            Self::PutMinimal => "put_minimal",
            Self::PatchMinimal => "patch_minimal",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "put_full" => Some(Self::PutFull),
            "put_minimal" => Some(Self::PutMinimal),
            "patch_minimal" => Some(Self::PatchMinimal),
            _ => None,
        }
    }

    pub const fn method(self) -> UpdateMethod {
        match self {
            Self::PutFull | Self::PutMinimal => UpdateMethod::Put,
            Self::PatchMinimal => UpdateMethod::Patch,
        }
    }

    pub fn build_request(self, assigned: &Ticket) -> TicketUpdateRequest {
        let body = match self {
            Self::PutFull => TicketUpdateBody::Full(Box::new(assigned.clone())),
            Self::PutMinimal | Self::PatchMinimal => TicketUpdateBody::Partial(AssignmentPatch {
                assigned_to: assigned.assigned_to.clone(),
                status: Some(assigned.status.clone()),
            }),
        };
        TicketUpdateRequest {
            ticket_id: assigned.id.clone(),
            method: self.method(),
            body,
        }
    }
}

pub fn default_fallback_chain() -> Vec<UpdateStrategy> {
    vec![
        UpdateStrategy::PutFull,
        UpdateStrategy::PutMinimal,
        UpdateStrategy::PatchMinimal,
    ]
}

/// Boundary to whatever stores tickets durably. Implementations return the crate's error
/// taxonomy; anything unexpected is reported as `Transport`.
#[async_trait::async_trait]
pub trait TicketBackend: Send + Sync {
    async fn list_tickets(&self) -> Result<Vec<Ticket>, AssignmentError>;
    async fn get_ticket(&self, ticket_id: &TicketId) -> Result<Ticket, AssignmentError>;
    async fn update_ticket(
        &self,
        request: TicketUpdateRequest,
    ) -> Result<Option<Ticket>, AssignmentError>;
    async fn list_agents(&self) -> Result<Vec<Agent>, AssignmentError>;
    async fn list_teams(&self) -> Result<Vec<Team>, AssignmentError>;
    async fn delete_ticket(&self, ticket_id: &TicketId) -> Result<(), AssignmentError>;
}

pub(crate) fn json_value_to_non_empty_string(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => {
            let normalized = raw.trim();
            if normalized.is_empty() {
                None
            } else {
                Some(normalized.to_owned())
            }
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn deserialize_optional_stringish<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|entry| json_value_to_non_empty_string(&entry)))
}

pub(crate) fn deserialize_required_stringish<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    json_value_to_non_empty_string(&value)
        .ok_or_else(|| serde::de::Error::custom("expected non-empty string or numeric id"))
}

fn deserialize_ticket_id<'de, D>(deserializer: D) -> Result<TicketId, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_required_stringish(deserializer).map(TicketId::from)
}
