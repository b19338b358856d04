use crate::interface::{AssignmentError, Candidate, TicketId};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct SelectorState {
    open_dropdown: Option<TicketId>,
    pending: BTreeMap<TicketId, Candidate>,
}

/// What the selector currently holds for one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionView {
    pub open: bool,
    pub pending: Option<Candidate>,
}

/// Uncommitted per-ticket choices plus the single open dropdown. Never touches the backend.
#[derive(Debug, Default)]
pub struct AssignmentSelector {
    state: Mutex<SelectorState>,
}

impl AssignmentSelector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SelectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the dropdown for `ticket_id`, returning the ticket whose dropdown it replaced.
    pub fn open(&self, ticket_id: &TicketId) -> Option<TicketId> {
        let mut state = self.lock();
        match state.open_dropdown.replace(ticket_id.clone()) {
            Some(previous) if &previous != ticket_id => Some(previous),
            _ => None,
        }
    }

    pub fn close(&self, ticket_id: &TicketId) -> bool {
        let mut state = self.lock();
        if state.open_dropdown.as_ref() == Some(ticket_id) {
            state.open_dropdown = None;
            true
        } else {
            false
        }
    }

    /// Returns whether the dropdown for `ticket_id` is open afterwards.
    pub fn toggle(&self, ticket_id: &TicketId) -> bool {
        let mut state = self.lock();
        if state.open_dropdown.as_ref() == Some(ticket_id) {
            state.open_dropdown = None;
            false
        } else {
            state.open_dropdown = Some(ticket_id.clone());
            true
        }
    }

    pub fn open_dropdown(&self) -> Option<TicketId> {
        self.lock().open_dropdown.clone()
    }

    pub fn is_open(&self, ticket_id: &TicketId) -> bool {
        self.lock().open_dropdown.as_ref() == Some(ticket_id)
    }

    /// Records `candidate` as pending for `ticket_id`, replacing any earlier choice, and closes
    /// that ticket's dropdown. Unavailable candidates cannot be chosen.
    pub fn select(
        &self,
        ticket_id: &TicketId,
        candidate: Candidate,
    ) -> Result<Option<Candidate>, AssignmentError> {
        if !candidate.is_available() {
            return Err(AssignmentError::Validation(format!(
                "candidate `{}` is unavailable",
                candidate.name()
            )));
        }

        let mut state = self.lock();
        if state.open_dropdown.as_ref() == Some(ticket_id) {
            state.open_dropdown = None;
        }
        Ok(state.pending.insert(ticket_id.clone(), candidate))
    }

    pub fn clear_pending(&self, ticket_id: &TicketId) -> Option<Candidate> {
        self.lock().pending.remove(ticket_id)
    }

    pub fn pending_for(&self, ticket_id: &TicketId) -> Option<Candidate> {
        self.lock().pending.get(ticket_id).cloned()
    }

    pub fn pending(&self) -> BTreeMap<TicketId, Candidate> {
        self.lock().pending.clone()
    }

    pub fn view(&self, ticket_id: &TicketId) -> SelectionView {
        let state = self.lock();
        SelectionView {
            open: state.open_dropdown.as_ref() == Some(ticket_id),
            pending: state.pending.get(ticket_id).cloned(),
        }
    }

    /// Drops pending choices and the open dropdown for tickets `is_known` rejects.
    pub fn prune_stale(&self, is_known: impl Fn(&TicketId) -> bool) -> Vec<TicketId> {
        let mut state = self.lock();
        let stale = state
            .pending
            .keys()
            .filter(|ticket_id| !is_known(ticket_id))
            .cloned()
            .collect::<Vec<_>>();
        for ticket_id in &stale {
            state.pending.remove(ticket_id);
        }
        if state
            .open_dropdown
            .as_ref()
            .is_some_and(|ticket_id| !is_known(ticket_id))
        {
            state.open_dropdown = None;
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{Availability, Team};
    use crate::test_support::agent_candidate;

    fn team_candidate(id: &str, name: &str, availability: Availability) -> Candidate {
        Candidate::Team(Team {
            id: id.to_owned(),
            name: name.to_owned(),
            availability,
            member_count: 4,
        })
    }

    #[test]
    fn at_most_one_dropdown_is_open() {
        let selector = AssignmentSelector::new();
        let first = TicketId::from("T1");
        let second = TicketId::from("T2");

        assert_eq!(selector.open(&first), None);
        assert_eq!(selector.open(&second), Some(first.clone()));
        assert!(!selector.is_open(&first));
        assert!(selector.is_open(&second));
        assert_eq!(selector.open_dropdown(), Some(second.clone()));

        assert!(!selector.close(&first));
        assert!(selector.close(&second));
        assert_eq!(selector.open_dropdown(), None);
    }

    #[test]
    fn toggle_flips_only_the_named_ticket() {
        let selector = AssignmentSelector::new();
        let ticket = TicketId::from("T1");

        assert!(selector.toggle(&ticket));
        assert!(selector.is_open(&ticket));
        assert!(!selector.toggle(&ticket));
        assert!(!selector.is_open(&ticket));
    }

    #[test]
    fn select_records_pending_and_closes_dropdown() {
        let selector = AssignmentSelector::new();
        let ticket = TicketId::from("T1");
        selector.open(&ticket);

        let previous = selector
            .select(&ticket, agent_candidate("a1", "Ada"))
            .expect("select Ada");

        assert_eq!(previous, None);
        assert_eq!(
            selector.view(&ticket),
            SelectionView {
                open: false,
                pending: Some(agent_candidate("a1", "Ada")),
            }
        );
    }

    #[test]
    fn selecting_again_overwrites_the_pending_choice() {
        let selector = AssignmentSelector::new();
        let ticket = TicketId::from("T1");
        selector
            .select(&ticket, agent_candidate("a1", "Ada"))
            .expect("select Ada");

        let previous = selector
            .select(&ticket, team_candidate("t1", "Network", Availability::Available))
            .expect("select Network");

        assert_eq!(previous.map(|candidate| candidate.name().to_owned()), Some("Ada".to_owned()));
        assert_eq!(
            selector.pending_for(&ticket).map(|candidate| candidate.id().to_owned()),
            Some("t1".to_owned())
        );
        assert_eq!(selector.pending().len(), 1);
    }

    #[test]
    fn unavailable_candidates_cannot_be_selected() {
        let selector = AssignmentSelector::new();
        let ticket = TicketId::from("T1");
        selector.open(&ticket);

        let error = selector
            .select(&ticket, team_candidate("t9", "Night shift", Availability::Unavailable))
            .expect_err("unavailable team");

        assert!(matches!(error, AssignmentError::Validation(_)));
        assert_eq!(selector.pending_for(&ticket), None);
        assert!(selector.is_open(&ticket));
    }

    #[test]
    fn selecting_for_one_ticket_leaves_another_open_dropdown_alone() {
        let selector = AssignmentSelector::new();
        selector.open(&TicketId::from("T2"));

        selector
            .select(&TicketId::from("T1"), agent_candidate("a1", "Ada"))
            .expect("select Ada");

        assert!(selector.is_open(&TicketId::from("T2")));
    }

    #[test]
    fn prune_stale_drops_unknown_tickets() {
        let selector = AssignmentSelector::new();
        selector
            .select(&TicketId::from("T1"), agent_candidate("a1", "Ada"))
            .expect("select for T1");
        selector
            .select(&TicketId::from("T2"), agent_candidate("a2", "Bo"))
            .expect("select for T2");
        selector.open(&TicketId::from("T2"));

        let pruned = selector.prune_stale(|ticket_id| ticket_id.as_str() == "T1");

        assert_eq!(pruned, vec![TicketId::from("T2")]);
        assert_eq!(selector.open_dropdown(), None);
        assert!(selector.pending_for(&TicketId::from("T1")).is_some());
    }

    #[test]
    fn clear_pending_returns_the_removed_choice() {
        let selector = AssignmentSelector::new();
        let ticket = TicketId::from("T1");
        selector
            .select(&ticket, agent_candidate("a1", "Ada"))
            .expect("select Ada");

        assert!(selector.clear_pending(&ticket).is_some());
        assert!(selector.clear_pending(&ticket).is_none());
        assert_eq!(selector.view(&ticket), SelectionView::default());
    }
}
