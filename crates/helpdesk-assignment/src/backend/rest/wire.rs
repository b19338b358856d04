use crate::interface::{
    deserialize_optional_stringish, deserialize_required_stringish,
    json_value_to_non_empty_string, Agent, AssignmentError, Availability, Team, Ticket,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

const MAX_ERROR_BODY_LEN: usize = 200;

pub(crate) fn extract_list<T: DeserializeOwned>(
    payload: Value,
    key: &str,
) -> Result<Vec<T>, AssignmentError> {
    if payload.is_array() {
        return decode_values(payload, key);
    }

    for wrapper in [key, "data", "items"] {
        if let Some(values) = payload.get(wrapper).filter(|value| value.is_array()) {
            return decode_values(values.clone(), key);
        }
    }

    Err(AssignmentError::Transport(format!(
        "backend response does not contain a list for '{key}'."
    )))
}

fn decode_values<T: DeserializeOwned>(values: Value, key: &str) -> Result<Vec<T>, AssignmentError> {
    serde_json::from_value(values).map_err(|error| {
        AssignmentError::Transport(format!("backend '{key}' payload decode failed: {error}"))
    })
}

pub(crate) fn parse_ticket(payload: Value) -> Result<Ticket, AssignmentError> {
    let inner = payload
        .get("ticket")
        .or_else(|| payload.get("data").filter(|value| value.is_object()))
        .cloned()
        .unwrap_or(payload);
    serde_json::from_value(inner).map_err(|error| {
        AssignmentError::Transport(format!("backend ticket payload decode failed: {error}"))
    })
}

/// The backend's `{message}` when present, otherwise a bounded copy of the raw body.
pub(crate) fn backend_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".to_owned();
    }

    if let Ok(payload) = serde_json::from_str::<Value>(trimmed) {
        for key in ["message", "error"] {
            if let Some(message) = payload.get(key).and_then(json_value_to_non_empty_string) {
                return message;
            }
        }
    }

    truncate_for_error(trimmed)
}

pub(crate) fn truncate_for_error(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_LEN {
        body.to_owned()
    } else {
        format!(
            "{}...",
            body.chars().take(MAX_ERROR_BODY_LEN).collect::<String>()
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AgentRecord {
    #[serde(deserialize_with = "deserialize_required_stringish")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_optional_stringish")]
    pub name: Option<String>,
    #[serde(default, alias = "first_name")]
    pub first_name: Option<String>,
    #[serde(default, alias = "last_name")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "dept")]
    pub department: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub availability: Option<Value>,
    #[serde(default, alias = "is_available")]
    pub is_available: Option<bool>,
}

impl From<AgentRecord> for Agent {
    fn from(record: AgentRecord) -> Self {
        let full_name = [record.first_name.as_deref(), record.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let name = record
            .name
            .clone()
            .or_else(|| (!full_name.is_empty()).then_some(full_name))
            .or_else(|| {
                record
                    .email
                    .as_deref()
                    .map(str::trim)
                    .filter(|email| !email.is_empty())
                    .map(ToOwned::to_owned)
            })
            .unwrap_or_else(|| record.id.clone());

        let active = record.active.unwrap_or_else(|| {
            !matches!(
                record
                    .status
                    .as_deref()
                    .map(|status| status.trim().to_ascii_lowercase())
                    .as_deref(),
                Some("inactive" | "disabled" | "suspended" | "deleted")
            )
        });

        Agent {
            id: record.id,
            name,
            email: record.email,
            role: record.role,
            department: record.department,
            active,
            availability: availability_from(record.availability.as_ref(), record.is_available),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TeamRecord {
    #[serde(deserialize_with = "deserialize_required_stringish")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub availability: Option<Value>,
    #[serde(default, alias = "member_count")]
    pub member_count: Option<u32>,
    #[serde(default)]
    pub members: Vec<Value>,
}

impl From<TeamRecord> for Team {
    fn from(record: TeamRecord) -> Self {
        let member_count = record
            .member_count
            .unwrap_or_else(|| u32::try_from(record.members.len()).unwrap_or(u32::MAX));
        Team {
            name: record
                .name
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| record.id.clone()),
            id: record.id,
            availability: availability_from(record.availability.as_ref(), None),
            member_count,
        }
    }
}

fn availability_from(raw: Option<&Value>, is_available: Option<bool>) -> Availability {
    match raw {
        Some(Value::String(label)) => Availability::from_label(label),
        Some(Value::Bool(true)) => Availability::Available,
        Some(Value::Bool(false)) => Availability::Unavailable,
        _ => match is_available {
            Some(false) => Availability::Unavailable,
            _ => Availability::Available,
        },
    }
}
