use crate::directory::TicketDirectory;
use crate::interface::{
    default_fallback_chain, next_updated_at, resulting_status, AssignedTicket, AssignmentError,
    AssignmentResult, Candidate, CandidateRef, Ticket, TicketBackend, TicketId, TicketStatus,
    UpdateStrategy,
};
use crate::selector::AssignmentSelector;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitterConfig {
    pub assigned_status: TicketStatus,
    pub fallback_chain: Vec<UpdateStrategy>,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            assigned_status: TicketStatus::Assigned,
            fallback_chain: default_fallback_chain(),
        }
    }
}

impl CommitterConfig {
    pub fn validate(&self) -> Result<(), AssignmentError> {
        if self.fallback_chain.is_empty() {
            return Err(AssignmentError::Validation(
                "assignment fallback chain must name at least one update strategy".to_owned(),
            ));
        }
        if !matches!(
            self.assigned_status,
            TicketStatus::Assigned | TicketStatus::InProgress
        ) {
            return Err(AssignmentError::Validation(format!(
                "assigned status must be `assigned` or `in-progress`, got `{}`",
                self.assigned_status
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFailure {
    pub ticket_id: TicketId,
    pub error: AssignmentError,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkCommitReport {
    pub succeeded: Vec<TicketId>,
    pub failed: Vec<CommitFailure>,
    /// Set when the post-commit reload failed; succeeded tickets were applied locally instead.
    pub reconcile_error: Option<String>,
}

impl BulkCommitReport {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

struct PreparedAssignment {
    assigned: Ticket,
    candidate: CandidateRef,
}

struct SentAssignment {
    prepared: PreparedAssignment,
    strategy: UpdateStrategy,
}

/// Persists assignments through the backend and then mirrors them into the directory.
pub struct AssignmentCommitter {
    backend: Arc<dyn TicketBackend>,
    config: CommitterConfig,
}

impl AssignmentCommitter {
    pub fn new(backend: Arc<dyn TicketBackend>) -> Self {
        Self {
            backend,
            config: CommitterConfig::default(),
        }
    }

    pub fn with_config(
        backend: Arc<dyn TicketBackend>,
        config: CommitterConfig,
    ) -> Result<Self, AssignmentError> {
        config.validate()?;
        Ok(Self { backend, config })
    }

    pub fn config(&self) -> &CommitterConfig {
        &self.config
    }

    /// Commits one assignment. Validation failures never reach the backend. The directory and
    /// selector change only once the backend has accepted the update, or when it reports the
    /// ticket gone.
    pub async fn commit_one(
        &self,
        directory: &TicketDirectory,
        selector: &AssignmentSelector,
        ticket_id: &TicketId,
        candidate: Option<&Candidate>,
    ) -> AssignmentResult {
        let sent = match self.send_assignment(directory, ticket_id, candidate).await {
            Ok(sent) => sent,
            Err(error) => {
                if matches!(error, AssignmentError::NotFound(_)) {
                    forget_missing(directory, selector, ticket_id);
                }
                return Err(error);
            }
        };
        let ticket = match directory.apply_assignment(
            ticket_id,
            &sent.prepared.candidate.name,
            sent.prepared.assigned.status.clone(),
        ) {
            Ok(ticket) => ticket,
            Err(AssignmentError::NotFound(_)) => {
                warn!(
                    ticket_id = %ticket_id,
                    "ticket left the directory while its assignment was in flight"
                );
                sent.prepared.assigned
            }
            Err(error) => return Err(error),
        };
        selector.clear_pending(ticket_id);
        info!(
            ticket_id = %ticket_id,
            assignee = %sent.prepared.candidate,
            strategy = sent.strategy.as_key(),
            "ticket assigned"
        );

        Ok(AssignedTicket {
            ticket,
            candidate: sent.prepared.candidate,
            strategy: sent.strategy,
        })
    }

    pub async fn commit_pending(
        &self,
        directory: &TicketDirectory,
        selector: &AssignmentSelector,
        ticket_id: &TicketId,
    ) -> AssignmentResult {
        let candidate = selector.pending_for(ticket_id);
        self.commit_one(directory, selector, ticket_id, candidate.as_ref())
            .await
    }

    /// Sends every pending assignment concurrently, then reloads the directory once.
    /// Failed tickets keep their pending choice unless the backend no longer has them; one
    /// failure never blocks the others.
    pub async fn commit_bulk(
        &self,
        directory: &TicketDirectory,
        selector: &AssignmentSelector,
        pending: BTreeMap<TicketId, Candidate>,
    ) -> BulkCommitReport {
        let mut report = BulkCommitReport::default();
        if pending.is_empty() {
            return report;
        }

        let attempts = pending.iter().map(|(ticket_id, candidate)| async move {
            let outcome = self
                .send_assignment(directory, ticket_id, Some(candidate))
                .await;
            (ticket_id.clone(), outcome)
        });

        let mut confirmed = Vec::new();
        for (ticket_id, outcome) in join_all(attempts).await {
            match outcome {
                Ok(sent) => {
                    report.succeeded.push(ticket_id);
                    confirmed.push(sent);
                }
                Err(error) => {
                    warn!(ticket_id = %ticket_id, error = %error, "bulk assignment failed");
                    if matches!(error, AssignmentError::NotFound(_)) {
                        forget_missing(directory, selector, &ticket_id);
                    }
                    report.failed.push(CommitFailure { ticket_id, error });
                }
            }
        }

        if let Err(error) = directory.load_all().await {
            warn!(
                error = %error,
                "directory reload after bulk assignment failed; applying confirmed assignments \
                 locally"
            );
            report.reconcile_error = Some(error.to_string());
            for sent in &confirmed {
                let ticket_id = &sent.prepared.assigned.id;
                if let Err(error) = directory.apply_assignment(
                    ticket_id,
                    &sent.prepared.candidate.name,
                    sent.prepared.assigned.status.clone(),
                ) {
                    debug!(
                        ticket_id = %ticket_id,
                        error = %error,
                        "confirmed assignment no longer applies locally"
                    );
                }
            }
        }

        for ticket_id in &report.succeeded {
            selector.clear_pending(ticket_id);
        }
        selector.prune_stale(|ticket_id| directory.contains(ticket_id));

        info!(
            succeeded = report.succeeded_count(),
            failed = report.failed_count(),
            "bulk assignment finished"
        );
        report
    }

    /// Runs `commit_bulk` on the runtime so it completes even if the caller stops waiting.
    pub fn spawn_bulk(
        self: Arc<Self>,
        directory: Arc<TicketDirectory>,
        selector: Arc<AssignmentSelector>,
        pending: BTreeMap<TicketId, Candidate>,
    ) -> JoinHandle<BulkCommitReport> {
        tokio::spawn(async move {
            self.commit_bulk(&directory, &selector, pending).await
        })
    }

    /// Deletes a ticket in the backend and forgets it locally. A ticket the backend has
    /// already lost is forgotten as well.
    pub async fn remove_ticket(
        &self,
        directory: &TicketDirectory,
        selector: &AssignmentSelector,
        ticket_id: &TicketId,
    ) -> Result<(), AssignmentError> {
        if !directory.contains(ticket_id) {
            return Err(AssignmentError::Validation(format!(
                "ticket `{ticket_id}` is not in the directory"
            )));
        }

        match self.backend.delete_ticket(ticket_id).await {
            Ok(()) => {}
            Err(AssignmentError::NotFound(message)) => {
                warn!(
                    ticket_id = %ticket_id,
                    message = %message,
                    "ticket was already gone from the backend"
                );
            }
            Err(error) => return Err(error),
        }

        directory.remove(ticket_id);
        selector.clear_pending(ticket_id);
        selector.prune_stale(|known| directory.contains(known));
        info!(ticket_id = %ticket_id, "ticket removed");
        Ok(())
    }

    fn prepare(
        &self,
        directory: &TicketDirectory,
        ticket_id: &TicketId,
        candidate: Option<&Candidate>,
    ) -> Result<PreparedAssignment, AssignmentError> {
        let candidate = candidate.ok_or_else(|| {
            AssignmentError::Validation("no candidate selected".to_owned())
        })?;
        if !candidate.is_available() {
            return Err(AssignmentError::Validation(format!(
                "candidate `{}` is unavailable",
                candidate.name()
            )));
        }
        if candidate.name().trim().is_empty() {
            return Err(AssignmentError::Validation(format!(
                "candidate `{}` has no name to assign",
                candidate.id()
            )));
        }

        let ticket = directory.get(ticket_id).ok_or_else(|| {
            AssignmentError::Validation(format!("ticket `{ticket_id}` is not in the directory"))
        })?;
        let status = resulting_status(&ticket.status, &self.config.assigned_status);
        let assigned = ticket.with_assignment(
            candidate.name().trim(),
            status,
            next_updated_at(ticket.updated_at.as_deref()),
        );

        Ok(PreparedAssignment {
            assigned,
            candidate: candidate.projection(),
        })
    }

    async fn send_assignment(
        &self,
        directory: &TicketDirectory,
        ticket_id: &TicketId,
        candidate: Option<&Candidate>,
    ) -> Result<SentAssignment, AssignmentError> {
        let prepared = self.prepare(directory, ticket_id, candidate)?;
        let strategy = self.send_with_fallback(&prepared.assigned).await?;
        Ok(SentAssignment { prepared, strategy })
    }

    /// Walks the fallback chain. Only a rejection moves on to the next payload shape; a
    /// missing ticket or a transport failure ends the attempt immediately.
    async fn send_with_fallback(
        &self,
        assigned: &Ticket,
    ) -> Result<UpdateStrategy, AssignmentError> {
        let mut last_rejection = None;
        for strategy in self.config.fallback_chain.iter().copied() {
            match self.backend.update_ticket(strategy.build_request(assigned)).await {
                Ok(_) => return Ok(strategy),
                Err(error) if error.is_rejection() => {
                    warn!(
                        ticket_id = %assigned.id,
                        strategy = strategy.as_key(),
                        error = %error,
                        "backend rejected assignment payload"
                    );
                    last_rejection = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        Err(match last_rejection {
            Some(error) => AssignmentError::Conflict(format!(
                "every update shape for ticket `{}` was rejected; last: {}",
                assigned.id,
                error.reason()
            )),
            None => AssignmentError::Validation(
                "assignment fallback chain must name at least one update strategy".to_owned(),
            ),
        })
    }
}

/// The backend no longer has the ticket, so neither the directory nor the selector should.
fn forget_missing(
    directory: &TicketDirectory,
    selector: &AssignmentSelector,
    ticket_id: &TicketId,
) {
    if directory.remove(ticket_id).is_some() {
        warn!(ticket_id = %ticket_id, "backend no longer has ticket; dropped it locally");
    }
    selector.clear_pending(ticket_id);
    selector.prune_stale(|known| directory.contains(known));
}
