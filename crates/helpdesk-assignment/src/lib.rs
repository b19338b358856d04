pub mod backend;
pub mod committer;
pub mod directory;
pub mod interface;
pub mod selector;

#[cfg(test)]
mod test_support;

pub use backend::{RestBackendConfig, RestTicketBackend};
pub use committer::{AssignmentCommitter, BulkCommitReport, CommitFailure, CommitterConfig};
pub use directory::{DirectorySnapshot, TicketDirectory};
pub use interface::{
    default_fallback_chain, next_updated_at, resulting_status, Agent, AssignedTicket,
    AssignmentError, AssignmentPatch, AssignmentResult, Availability, Candidate, CandidateFilter,
    CandidateKind, CandidatePool, CandidateRef, Team, Ticket, TicketBackend, TicketId,
    TicketPriority, TicketStatus, TicketUpdateBody, TicketUpdateRequest, UpdateMethod,
    UpdateStrategy,
};
pub use selector::{AssignmentSelector, SelectionView};
