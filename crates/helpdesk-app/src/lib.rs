pub mod cli;
pub mod render;

pub use cli::{BulkPair, Cli, Command};

use anyhow::{anyhow, Context, Result};
use helpdesk_assignment::{
    AssignmentCommitter, AssignmentSelector, CandidateFilter, CommitFailure, CommitterConfig,
    RestBackendConfig, RestTicketBackend, TicketBackend, TicketDirectory, TicketId, TicketStatus,
    UpdateStrategy,
};
use helpdesk_config::{AssignmentRuntimeConfig, HelpdeskConfig};
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed,
    Failed,
}

/// Directory, selector and committer wired to one backend for the lifetime of a command.
pub struct AssignmentDesk {
    directory: Arc<TicketDirectory>,
    selector: Arc<AssignmentSelector>,
    committer: Arc<AssignmentCommitter>,
}

impl AssignmentDesk {
    pub fn from_config(config: &HelpdeskConfig) -> Result<Self> {
        let settings = config.backend_runtime();
        let rest_config = RestBackendConfig::from_settings(
            settings.api_url,
            settings.agents_path,
            settings.api_token,
            settings.request_timeout_secs,
        )?;
        info!(api_url = %rest_config.api_url, "using help desk backend");
        let backend = RestTicketBackend::new(rest_config)?;
        Self::with_backend(Arc::new(backend), &config.assignment_runtime())
    }

    pub fn with_backend(
        backend: Arc<dyn TicketBackend>,
        settings: &AssignmentRuntimeConfig,
    ) -> Result<Self> {
        let committer_config = committer_config(settings)?;
        let filter = CandidateFilter {
            agent_roles: settings.agent_roles.clone(),
        };

        Ok(Self {
            directory: Arc::new(TicketDirectory::with_filter(backend.clone(), filter)),
            selector: Arc::new(AssignmentSelector::new()),
            committer: Arc::new(AssignmentCommitter::with_config(backend, committer_config)?),
        })
    }

    pub fn directory(&self) -> &TicketDirectory {
        &self.directory
    }

    pub async fn run(&self, command: &Command, out: &mut dyn Write) -> Result<CommandOutcome> {
        self.directory
            .load_all()
            .await
            .context("failed to load tickets and candidates from the help desk")?;

        match command {
            Command::Queue => {
                render::write_queue(out, &self.directory.list_unassigned())?;
                Ok(CommandOutcome::Completed)
            }
            Command::Assigned => {
                render::write_assigned(out, &self.directory.list_assigned())?;
                Ok(CommandOutcome::Completed)
            }
            Command::Candidates => {
                render::write_candidates(out, &self.directory.candidates())?;
                Ok(CommandOutcome::Completed)
            }
            Command::Assign { ticket, candidate } => self.assign(ticket, candidate, out).await,
            Command::BulkAssign { pairs } => self.bulk_assign(pairs, out).await,
            Command::Remove { ticket } => {
                let ticket_id = TicketId::from(ticket.trim());
                match self
                    .committer
                    .remove_ticket(&self.directory, &self.selector, &ticket_id)
                    .await
                {
                    Ok(()) => {
                        render::write_removed(out, &ticket_id)?;
                        Ok(CommandOutcome::Completed)
                    }
                    Err(error) => {
                        writeln!(out, "failed to remove {ticket_id}: {error}")?;
                        Ok(CommandOutcome::Failed)
                    }
                }
            }
        }
    }

    async fn assign(
        &self,
        ticket: &str,
        candidate: &str,
        out: &mut dyn Write,
    ) -> Result<CommandOutcome> {
        let ticket_id = TicketId::from(ticket.trim());
        let selected = self
            .directory
            .candidates()
            .resolve(candidate)
            .and_then(|resolved| {
                self.selector.open(&ticket_id);
                self.selector.select(&ticket_id, resolved)
            });
        if let Err(error) = selected {
            self.selector.close(&ticket_id);
            writeln!(out, "failed to assign {ticket_id}: {error}")?;
            return Ok(CommandOutcome::Failed);
        }

        match self
            .committer
            .commit_pending(&self.directory, &self.selector, &ticket_id)
            .await
        {
            Ok(assigned) => {
                render::write_assignment(out, &assigned)?;
                Ok(CommandOutcome::Completed)
            }
            Err(error) => {
                writeln!(out, "failed to assign {ticket_id}: {error}")?;
                Ok(CommandOutcome::Failed)
            }
        }
    }

    async fn bulk_assign(&self, pairs: &[BulkPair], out: &mut dyn Write) -> Result<CommandOutcome> {
        let pool = self.directory.candidates();
        let mut unresolved = Vec::new();
        // A later entry for the same ticket replaces an earlier one, whether or not it resolves.
        for pair in pairs {
            let ticket_id = TicketId::from(pair.ticket.trim());
            unresolved.retain(|failure: &CommitFailure| failure.ticket_id != ticket_id);
            let selected = pool
                .resolve(&pair.candidate)
                .and_then(|candidate| self.selector.select(&ticket_id, candidate));
            if let Err(error) = selected {
                warn!(ticket_id = %ticket_id, error = %error, "skipping bulk entry");
                self.selector.clear_pending(&ticket_id);
                unresolved.push(CommitFailure { ticket_id, error });
            }
        }

        let pending = self.selector.pending();
        let mut report = Arc::clone(&self.committer)
            .spawn_bulk(Arc::clone(&self.directory), Arc::clone(&self.selector), pending)
            .await
            .context("bulk assignment task did not complete")?;
        unresolved.append(&mut report.failed);
        report.failed = unresolved;

        render::write_bulk_report(out, &report)?;
        Ok(if report.is_complete_success() {
            CommandOutcome::Completed
        } else {
            CommandOutcome::Failed
        })
    }
}

fn committer_config(settings: &AssignmentRuntimeConfig) -> Result<CommitterConfig> {
    let fallback_chain = settings
        .fallback_chain
        .iter()
        .map(|key| {
            UpdateStrategy::from_key(key)
                .ok_or_else(|| anyhow!("unknown assignment fallback strategy `{key}`"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CommitterConfig {
        assigned_status: TicketStatus::from_label(&settings.resulting_status),
        fallback_chain,
    })
}
