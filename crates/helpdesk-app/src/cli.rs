use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "helpdesk",
    version,
    about = "Triage and assign help desk tickets",
    long_about = None
)]
pub struct Cli {
    /// Config file to use instead of HELPDESK_CONFIG or ~/.config/helpdesk/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List unassigned tickets, most urgent first.
    Queue,
    /// List tickets that already have an assignee.
    Assigned,
    /// List agents and teams that can receive tickets.
    Candidates,
    /// Assign one ticket. CANDIDATE is `agent:<id>`, `team:<id>` or a unique name.
    Assign { ticket: String, candidate: String },
    /// Assign several tickets at once, each given as TICKET=CANDIDATE.
    BulkAssign {
        #[arg(required = true, value_name = "TICKET=CANDIDATE", value_parser = parse_bulk_pair)]
        pairs: Vec<BulkPair>,
    },
    /// Delete a ticket from the help desk.
    Remove { ticket: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkPair {
    pub ticket: String,
    pub candidate: String,
}

pub fn parse_bulk_pair(raw: &str) -> Result<BulkPair, String> {
    let (ticket, candidate) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TICKET=CANDIDATE, got `{raw}`"))?;
    let ticket = ticket.trim();
    let candidate = candidate.trim();
    if ticket.is_empty() || candidate.is_empty() {
        return Err(format!(
            "both ticket and candidate are required in `{raw}`"
        ));
    }
    Ok(BulkPair {
        ticket: ticket.to_owned(),
        candidate: candidate.to_owned(),
    })
}
