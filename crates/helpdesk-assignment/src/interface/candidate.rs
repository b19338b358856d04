use super::AssignmentError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Availability {
    #[default]
    Available,
    Unavailable,
}

impl Availability {
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "unavailable" | "busy" | "away" | "offline" | "false" => Self::Unavailable,
            _ => Self::Available,
        }
    }

    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CandidateKind {
    Agent,
    Team,
}

impl CandidateKind {
    pub const fn as_key(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Team => "team",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "agent" | "user" | "employee" => Some(Self::Agent),
            "team" => Some(Self::Team),
            _ => None,
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub active: bool,
    pub availability: Availability,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub availability: Availability,
    pub member_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Agent(Agent),
    Team(Team),
}

impl Candidate {
    pub fn id(&self) -> &str {
        match self {
            Self::Agent(agent) => &agent.id,
            Self::Team(team) => &team.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Agent(agent) => &agent.name,
            Self::Team(team) => &team.name,
        }
    }

    pub fn kind(&self) -> CandidateKind {
        match self {
            Self::Agent(_) => CandidateKind::Agent,
            Self::Team(_) => CandidateKind::Team,
        }
    }

    pub fn availability(&self) -> Availability {
        match self {
            Self::Agent(agent) => agent.availability,
            Self::Team(team) => team.availability,
        }
    }

    pub fn is_available(&self) -> bool {
        self.availability() == Availability::Available
    }

    pub fn projection(&self) -> CandidateRef {
        CandidateRef {
            id: self.id().to_owned(),
            name: self.name().to_owned(),
            kind: self.kind(),
        }
    }
}

/// The `{id, name, type}` view of a candidate used when rendering choices and results.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateRef {
    pub id: String,
    pub name: String,
    pub kind: CandidateKind,
}

impl fmt::Display for CandidateRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} ({}:{})", self.name, self.kind, self.id)
    }
}

/// Which agents from the backend's user list may receive tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFilter {
    pub agent_roles: Vec<String>,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            agent_roles: vec!["agent".to_owned(), "admin".to_owned()],
        }
    }
}

impl CandidateFilter {
    pub fn admits(&self, agent: &Agent) -> bool {
        if !agent.active {
            return false;
        }
        let Some(role) = agent.role.as_deref().map(str::trim) else {
            return false;
        };
        self.agent_roles
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(role))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidatePool {
    pub agents: Vec<Agent>,
    pub teams: Vec<Team>,
}

impl CandidatePool {
    pub fn new(agents: Vec<Agent>, teams: Vec<Team>, filter: &CandidateFilter) -> Self {
        Self {
            agents: agents
                .into_iter()
                .filter(|agent| filter.admits(agent))
                .collect(),
            teams,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty() && self.teams.is_empty()
    }

    /// Agents first, then teams; unavailable entries are included so they can be shown.
    pub fn combined(&self) -> Vec<Candidate> {
        self.agents
            .iter()
            .cloned()
            .map(Candidate::Agent)
            .chain(self.teams.iter().cloned().map(Candidate::Team))
            .collect()
    }

    pub fn find(&self, kind: CandidateKind, id: &str) -> Option<Candidate> {
        match kind {
            CandidateKind::Agent => self
                .agents
                .iter()
                .find(|agent| agent.id == id)
                .cloned()
                .map(Candidate::Agent),
            CandidateKind::Team => self
                .teams
                .iter()
                .find(|team| team.id == id)
                .cloned()
                .map(Candidate::Team),
        }
    }

    /// Resolves `agent:<id>`, `team:<id>` or a case-insensitive unique name.
    pub fn resolve(&self, token: &str) -> Result<Candidate, AssignmentError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AssignmentError::Validation(
                "no candidate selected".to_owned(),
            ));
        }

        if let Some((raw_kind, id)) = token.split_once(':') {
            if let Some(kind) = CandidateKind::from_key(raw_kind) {
                return self.find(kind, id.trim()).ok_or_else(|| {
                    AssignmentError::Validation(format!("unknown {kind} candidate `{}`", id.trim()))
                });
            }
        }

        let mut matches = self
            .combined()
            .into_iter()
            .filter(|candidate| candidate.name().eq_ignore_ascii_case(token))
            .collect::<Vec<_>>();
        match matches.len() {
            0 => Err(AssignmentError::Validation(format!(
                "unknown candidate `{token}`"
            ))),
            1 => Ok(matches.remove(0)),
            _ => Err(AssignmentError::Validation(format!(
                "candidate name `{token}` is ambiguous; use agent:<id> or team:<id>"
            ))),
        }
    }
}
