use crate::interface::{
    Agent, AssignmentError, Availability, Candidate, Team, Ticket, TicketBackend, TicketId,
    TicketPriority, TicketStatus, TicketUpdateBody, TicketUpdateRequest,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub(crate) fn ticket(
    id: &str,
    priority: TicketPriority,
    status: TicketStatus,
    assigned_to: Option<&str>,
) -> Ticket {
    let mut ticket = Ticket::new(id);
    ticket.title = Some(format!("Ticket {id}"));
    ticket.priority = priority;
    ticket.status = status;
    ticket.assigned_to = assigned_to.map(ToOwned::to_owned);
    ticket
}

pub(crate) fn agent(id: &str, name: &str) -> Agent {
    Agent {
        id: id.to_owned(),
        name: name.to_owned(),
        email: Some(format!("{}@example.com", name.to_ascii_lowercase())),
        role: Some("agent".to_owned()),
        department: None,
        active: true,
        availability: Availability::Available,
    }
}

pub(crate) fn agent_candidate(id: &str, name: &str) -> Candidate {
    Candidate::Agent(agent(id, name))
}

/// In-memory backend that applies accepted updates, so a reload sees committed assignments.
#[derive(Debug, Default)]
pub(crate) struct StubBackend {
    tickets: Mutex<BTreeMap<TicketId, Ticket>>,
    agents: Mutex<Vec<Agent>>,
    teams: Mutex<Vec<Team>>,
    update_failures: Mutex<HashMap<TicketId, VecDeque<AssignmentError>>>,
    listing_failure: Mutex<Option<String>>,
    updates: Mutex<Vec<TicketUpdateRequest>>,
    deleted: Mutex<Vec<TicketId>>,
    update_gate: Mutex<Option<UpdateGate>>,
    call_count: AtomicUsize,
}

/// Holds updates until released. `entered` fires once an update is waiting.
#[derive(Debug, Clone, Default)]
pub(crate) struct UpdateGate {
    pub(crate) entered: Arc<Notify>,
    pub(crate) release: Arc<Notify>,
}

impl StubBackend {
    pub(crate) fn seed_tickets(&self, tickets: Vec<Ticket>) {
        let mut stored = self.tickets.lock().expect("stub tickets lock");
        for ticket in tickets {
            stored.insert(ticket.id.clone(), ticket);
        }
    }

    pub(crate) fn seed_agents(&self, agents: Vec<Agent>) {
        *self.agents.lock().expect("stub agents lock") = agents;
    }

    pub(crate) fn seed_teams(&self, teams: Vec<Team>) {
        *self.teams.lock().expect("stub teams lock") = teams;
    }

    pub(crate) fn forget_ticket(&self, ticket_id: &TicketId) {
        self.tickets.lock().expect("stub tickets lock").remove(ticket_id);
    }

    pub(crate) fn stored_ticket(&self, ticket_id: &TicketId) -> Option<Ticket> {
        self.tickets
            .lock()
            .expect("stub tickets lock")
            .get(ticket_id)
            .cloned()
    }

    /// Queues errors returned by successive updates of `ticket_id`; later updates succeed.
    pub(crate) fn fail_updates(&self, ticket_id: &str, errors: Vec<AssignmentError>) {
        self.update_failures
            .lock()
            .expect("stub update failure lock")
            .insert(TicketId::from(ticket_id), VecDeque::from(errors));
    }

    pub(crate) fn hold_updates(&self) -> UpdateGate {
        let gate = UpdateGate::default();
        *self.update_gate.lock().expect("stub update gate lock") = Some(gate.clone());
        gate
    }

    pub(crate) fn fail_listing(&self, message: &str) {
        *self.listing_failure.lock().expect("stub listing failure lock") =
            Some(message.to_owned());
    }

    pub(crate) fn recover_listing(&self) {
        *self.listing_failure.lock().expect("stub listing failure lock") = None;
    }

    pub(crate) fn updates(&self) -> Vec<TicketUpdateRequest> {
        self.updates.lock().expect("stub updates lock").clone()
    }

    pub(crate) fn deleted(&self) -> Vec<TicketId> {
        self.deleted.lock().expect("stub deleted lock").clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn check_listing(&self) -> Result<(), AssignmentError> {
        match self
            .listing_failure
            .lock()
            .expect("stub listing failure lock")
            .as_ref()
        {
            Some(message) => Err(AssignmentError::Transport(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl TicketBackend for StubBackend {
    async fn list_tickets(&self) -> Result<Vec<Ticket>, AssignmentError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.check_listing()?;
        Ok(self
            .tickets
            .lock()
            .expect("stub tickets lock")
            .values()
            .cloned()
            .collect())
    }

    async fn get_ticket(&self, ticket_id: &TicketId) -> Result<Ticket, AssignmentError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.stored_ticket(ticket_id)
            .ok_or_else(|| AssignmentError::NotFound(format!("ticket `{ticket_id}`")))
    }

    async fn update_ticket(
        &self,
        request: TicketUpdateRequest,
    ) -> Result<Option<Ticket>, AssignmentError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.updates
            .lock()
            .expect("stub updates lock")
            .push(request.clone());

        let gate = self.update_gate.lock().expect("stub update gate lock").clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let queued = self
            .update_failures
            .lock()
            .expect("stub update failure lock")
            .get_mut(&request.ticket_id)
            .and_then(VecDeque::pop_front);
        if let Some(error) = queued {
            return Err(error);
        }

        let mut tickets = self.tickets.lock().expect("stub tickets lock");
        let stored = tickets.get_mut(&request.ticket_id).ok_or_else(|| {
            AssignmentError::NotFound(format!("ticket `{}`", request.ticket_id))
        })?;
        match request.body {
            TicketUpdateBody::Full(ticket) => *stored = *ticket,
            TicketUpdateBody::Partial(patch) => {
                if let Some(assignee) = patch.assigned_to {
                    stored.assigned_to = Some(assignee);
                }
                if let Some(status) = patch.status {
                    stored.status = status;
                }
            }
        }
        Ok(Some(stored.clone()))
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, AssignmentError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.check_listing()?;
        Ok(self.agents.lock().expect("stub agents lock").clone())
    }

    async fn list_teams(&self) -> Result<Vec<Team>, AssignmentError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.check_listing()?;
        Ok(self.teams.lock().expect("stub teams lock").clone())
    }

    async fn delete_ticket(&self, ticket_id: &TicketId) -> Result<(), AssignmentError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let removed = self
            .tickets
            .lock()
            .expect("stub tickets lock")
            .remove(ticket_id);
        match removed {
            Some(_) => {
                self.deleted
                    .lock()
                    .expect("stub deleted lock")
                    .push(ticket_id.clone());
                Ok(())
            }
            None => Err(AssignmentError::NotFound(format!("ticket `{ticket_id}`"))),
        }
    }
}
