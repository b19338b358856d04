use helpdesk_assignment::{
    AssignedTicket, BulkCommitReport, Candidate, CandidatePool, Ticket, TicketId,
};
use std::io::{self, Write};

pub fn write_queue(out: &mut dyn Write, tickets: &[Ticket]) -> io::Result<()> {
    if tickets.is_empty() {
        return writeln!(out, "no unassigned tickets");
    }
    for ticket in tickets {
        writeln!(
            out,
            "{:<10} {:<9} {:<12} {}{}",
            ticket.id.as_str(),
            ticket.priority.to_string(),
            ticket.status.to_string(),
            ticket.display_title(),
            customer_suffix(ticket)
        )?;
    }
    Ok(())
}

pub fn write_assigned(out: &mut dyn Write, tickets: &[Ticket]) -> io::Result<()> {
    if tickets.is_empty() {
        return writeln!(out, "no assigned tickets");
    }
    for ticket in tickets {
        writeln!(
            out,
            "{:<10} {:<20} {:<12} {}",
            ticket.id.as_str(),
            ticket.assigned_to.as_deref().unwrap_or_default(),
            ticket.status.to_string(),
            ticket.display_title()
        )?;
    }
    Ok(())
}

pub fn write_candidates(out: &mut dyn Write, pool: &CandidatePool) -> io::Result<()> {
    if pool.is_empty() {
        return writeln!(out, "no candidates available");
    }
    for candidate in pool.combined() {
        let detail = match &candidate {
            Candidate::Agent(agent) => agent
                .role
                .as_deref()
                .map(|role| format!("role={role}"))
                .unwrap_or_default(),
            Candidate::Team(team) => format!("members={}", team.member_count),
        };
        writeln!(
            out,
            "{:<16} {:<24} {:<12} {}",
            format!("{}:{}", candidate.kind(), candidate.id()),
            candidate.name(),
            candidate.availability().as_label(),
            detail
        )?;
    }
    Ok(())
}

pub fn write_assignment(out: &mut dyn Write, assigned: &AssignedTicket) -> io::Result<()> {
    writeln!(
        out,
        "{} assigned to {} via {}; status {}",
        assigned.ticket.id,
        assigned.candidate,
        assigned.strategy.as_key(),
        assigned.ticket.status
    )
}

pub fn write_bulk_report(out: &mut dyn Write, report: &BulkCommitReport) -> io::Result<()> {
    writeln!(
        out,
        "bulk assignment: {} succeeded, {} failed",
        report.succeeded_count(),
        report.failed_count()
    )?;
    for ticket_id in &report.succeeded {
        writeln!(out, "  ok    {ticket_id}")?;
    }
    for failure in &report.failed {
        writeln!(out, "  fail  {}: {}", failure.ticket_id, failure.error)?;
    }
    if let Some(error) = report.reconcile_error.as_deref() {
        writeln!(
            out,
            "  warning: reload after commit failed, showing local results: {error}"
        )?;
    }
    Ok(())
}

pub fn write_removed(out: &mut dyn Write, ticket_id: &TicketId) -> io::Result<()> {
    writeln!(out, "{ticket_id} removed")
}

fn customer_suffix(ticket: &Ticket) -> String {
    match ticket.customer_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => format!(" ({name})"),
        _ => String::new(),
    }
}
