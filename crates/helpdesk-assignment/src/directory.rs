use crate::interface::{
    next_updated_at, resulting_status, AssignmentError, CandidateFilter, CandidatePool, Ticket,
    TicketBackend, TicketId, TicketStatus,
};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    pub tickets: BTreeMap<TicketId, Ticket>,
    pub candidates: CandidatePool,
    pub last_loaded_at: Option<String>,
    pub last_load_error: Option<String>,
}

/// Committed ticket state. The only writer of `assigned_to`/`status` outside a full reload.
pub struct TicketDirectory {
    backend: Arc<dyn TicketBackend>,
    filter: CandidateFilter,
    state: RwLock<DirectorySnapshot>,
}

impl TicketDirectory {
    pub fn new(backend: Arc<dyn TicketBackend>) -> Self {
        Self::with_filter(backend, CandidateFilter::default())
    }

    pub fn with_filter(backend: Arc<dyn TicketBackend>, filter: CandidateFilter) -> Self {
        Self {
            backend,
            filter,
            state: RwLock::new(DirectorySnapshot::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DirectorySnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DirectorySnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces tickets and the candidate pool in one step. On failure the previous snapshot
    /// stays in place and only `last_load_error` changes.
    pub async fn load_all(&self) -> Result<Vec<Ticket>, AssignmentError> {
        let fetched = tokio::try_join!(
            self.backend.list_tickets(),
            self.backend.list_agents(),
            self.backend.list_teams(),
        );

        let (tickets, agents, teams) = match fetched {
            Ok(fetched) => fetched,
            Err(error) => {
                warn!(error = %error, "ticket directory reload failed; keeping previous snapshot");
                self.write().last_load_error = Some(error.to_string());
                return Err(error);
            }
        };

        let mut by_id = BTreeMap::new();
        for ticket in tickets {
            if let Some(previous) = by_id.insert(ticket.id.clone(), ticket) {
                warn!(
                    ticket_id = %previous.id,
                    "backend returned duplicate ticket id; keeping the later entry"
                );
            }
        }
        let candidates = CandidatePool::new(agents, teams, &self.filter);
        let loaded = by_id.values().cloned().collect::<Vec<_>>();

        {
            let mut state = self.write();
            state.tickets = by_id;
            state.candidates = candidates;
            state.last_loaded_at = OffsetDateTime::now_utc().format(&Rfc3339).ok();
            state.last_load_error = None;
            info!(
                tickets = state.tickets.len(),
                agents = state.candidates.agents.len(),
                teams = state.candidates.teams.len(),
                "ticket directory loaded"
            );
        }

        Ok(loaded)
    }

    /// Unassigned tickets, most urgent first, ties broken by id.
    pub fn list_unassigned(&self) -> Vec<Ticket> {
        let mut tickets = self
            .read()
            .tickets
            .values()
            .filter(|ticket| !ticket.is_assigned())
            .cloned()
            .collect::<Vec<_>>();
        tickets.sort_by(|left, right| {
            left.priority
                .urgency_rank()
                .cmp(&right.priority.urgency_rank())
                .then_with(|| left.id.cmp(&right.id))
        });
        tickets
    }

    pub fn list_assigned(&self) -> Vec<Ticket> {
        self.read()
            .tickets
            .values()
            .filter(|ticket| ticket.is_assigned())
            .cloned()
            .collect()
    }

    pub fn get(&self, ticket_id: &TicketId) -> Option<Ticket> {
        self.read().tickets.get(ticket_id).cloned()
    }

    pub fn contains(&self, ticket_id: &TicketId) -> bool {
        self.read().tickets.contains_key(ticket_id)
    }

    pub fn candidates(&self) -> CandidatePool {
        self.read().candidates.clone()
    }

    pub fn snapshot(&self) -> DirectorySnapshot {
        self.read().clone()
    }

    /// Commits an assignment to exactly one ticket. A resolved or closed ticket keeps its
    /// status whatever `resulting` asks for.
    pub fn apply_assignment(
        &self,
        ticket_id: &TicketId,
        candidate_name: &str,
        resulting: TicketStatus,
    ) -> Result<Ticket, AssignmentError> {
        let candidate_name = candidate_name.trim();
        if candidate_name.is_empty() {
            return Err(AssignmentError::Validation(format!(
                "ticket `{ticket_id}` cannot be assigned to an empty assignee"
            )));
        }

        let mut state = self.write();
        let ticket = state.tickets.get_mut(ticket_id).ok_or_else(|| {
            AssignmentError::NotFound(format!("ticket `{ticket_id}` is not in the directory"))
        })?;

        let status = resulting_status(&ticket.status, &resulting);
        *ticket = ticket.with_assignment(
            candidate_name,
            status,
            next_updated_at(ticket.updated_at.as_deref()),
        );
        Ok(ticket.clone())
    }

    /// Drops a ticket from the local snapshot. Pending selections for it become stale.
    pub fn remove(&self, ticket_id: &TicketId) -> Option<Ticket> {
        self.write().tickets.remove(ticket_id)
    }

    /// Re-reads one ticket from the backend. A ticket the backend no longer has is dropped.
    pub async fn refresh_ticket(&self, ticket_id: &TicketId) -> Result<Ticket, AssignmentError> {
        match self.backend.get_ticket(ticket_id).await {
            Ok(ticket) => {
                self.write().tickets.insert(ticket_id.clone(), ticket.clone());
                Ok(ticket)
            }
            Err(AssignmentError::NotFound(message)) => {
                self.remove(ticket_id);
                Err(AssignmentError::NotFound(message))
            }
            Err(error) => Err(error),
        }
    }
}
