//! Colored console output for the onboarding CLI.
//!
//! Color scheme: blue+bold headers, cyan values, green success,
//! yellow warnings, red failures, dimmed secondary text.

use crate::backfill::{BackfillError, BackfillSummary};
use crate::layout::{SlotRole, StorageLayout, StorageSlotAssignment};
use crate::onboard::BatchReport;
use crate::store::ContractId;
use colored::Colorize;
use std::path::Path;

// ── Helpers ────────────────────────────────────────────────────────

/// Short label for a slot role.
pub fn role_label(role: SlotRole) -> &'static str {
    match role {
        SlotRole::Value => "value",
        SlotRole::BaseSlot => "base",
        SlotRole::Composite => "struct",
    }
}

/// Format an assignment as `slot[offset..end]`.
pub fn format_location(assignment: &StorageSlotAssignment) -> String {
    if assignment.role == SlotRole::Value && assignment.size < 32 {
        let end = assignment.offset as usize + assignment.size;
        format!("{}[{}..{}]", assignment.slot, assignment.offset, end)
    } else if assignment.slot_span() > 1 {
        let last = assignment.slot + assignment.slot_span() - 1;
        format!("{}..={}", assignment.slot, last)
    } else {
        assignment.slot.to_string()
    }
}

// ── Banner ─────────────────────────────────────────────────────────

/// Print a section header.
pub fn print_banner(title: &str) {
    println!();
    println!("{}", format!("=== {title} ===").blue().bold());
}

// ── Layout ─────────────────────────────────────────────────────────

/// Print the resolved layout of one contract as a table.
pub fn print_layout(contract: &str, layout: &StorageLayout) {
    print_banner(&format!("Storage layout: {contract}"));
    println!(
        "  {} {}",
        "Slots used:".dimmed(),
        layout.slots_used.to_string().cyan()
    );
    if layout.is_empty() {
        println!("  {}", "(no storage variables)".dimmed());
        return;
    }
    let width = layout.assignments.iter().map(|a| a.name.len()).max().unwrap_or(0);
    for assignment in &layout.assignments {
        println!(
            "  {:<12} {:<width$} {:<7} {}",
            format_location(assignment).cyan(),
            assignment.name,
            role_label(assignment.role).dimmed(),
            assignment.signature.dimmed(),
        );
        if let Some(data) = assignment.data_slot() {
            println!("  {:<12} {}", "", format!("data at {data:#066x}").dimmed());
        }
    }
}

// ── Batch ──────────────────────────────────────────────────────────

/// Print the per-address outcome of one batch round.
pub fn print_batch_report(report: &BatchReport, round: u32) {
    let title = if round == 0 { "Onboarding".to_string() } else { format!("Retry #{round}") };
    print_banner(&title);
    for accepted in report.success() {
        println!(
            "  {} {} → #{} {}",
            "OK".green().bold(),
            accepted.address.cyan(),
            accepted.contract_id.to_string().cyan(),
            accepted.name.dimmed(),
        );
    }
    for rejected in report.fail() {
        let tag = if rejected.reason.is_retryable() {
            "RETRY".yellow().bold()
        } else {
            "FAIL".red().bold()
        };
        println!(
            "  {} {} at {}: {}",
            tag,
            rejected.address.cyan(),
            rejected.stage.to_string().yellow(),
            rejected.reason,
        );
    }
}

/// Print totals after all rounds.
pub fn print_batch_totals(accepted: usize, rejected: usize) {
    println!();
    println!(
        "  {} accepted, {} rejected",
        accepted.to_string().green().bold(),
        if rejected == 0 {
            rejected.to_string().normal()
        } else {
            rejected.to_string().red().bold()
        },
    );
}

// ── Backfill ───────────────────────────────────────────────────────

/// Print that a backfill run was started.
pub fn print_backfill_dispatched(ids: &[ContractId]) {
    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    println!(
        "  {} Backfill dispatched for contracts {}",
        "OK".green().bold(),
        ids.join(",").cyan(),
    );
}

/// Print how a backfill run ended.
pub fn print_backfill_result(result: &Result<BackfillSummary, BackfillError>) {
    match result {
        Ok(summary) => println!(
            "  {} Backfill finished for {} contracts ({} stdout, {} stderr lines)",
            "OK".green().bold(),
            summary.ids.len().to_string().cyan(),
            summary.stdout_lines.to_string().dimmed(),
            summary.stderr_lines.to_string().dimmed(),
        ),
        Err(e) => println!("  {} {}", "BACKFILL FAILED".red().bold(), e),
    }
}

/// Print a warning when there is nothing to backfill.
pub fn print_no_backfill(reason: &str) {
    println!("  {} {}", "WARNING:".yellow().bold(), reason.dimmed());
}

// ── Store ──────────────────────────────────────────────────────────

/// Print that the store snapshot was written.
pub fn print_store_saved(path: &Path, contracts: usize) {
    println!(
        "  {} Store saved to {} ({} contracts)",
        "OK".green().bold(),
        path.display().to_string().dimmed(),
        contracts.to_string().cyan(),
    );
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(slot: u64, offset: u8, size: usize, role: SlotRole) -> StorageSlotAssignment {
        StorageSlotAssignment {
            name: "x".into(),
            slot,
            offset,
            size,
            signature: "uint8".into(),
            role,
        }
    }

    #[test]
    fn test_format_location_packed() {
        assert_eq!(format_location(&assignment(0, 20, 1, SlotRole::Value)), "0[20..21]");
    }

    #[test]
    fn test_format_location_full_slot() {
        assert_eq!(format_location(&assignment(3, 0, 32, SlotRole::Value)), "3");
        assert_eq!(format_location(&assignment(2, 0, 32, SlotRole::BaseSlot)), "2");
    }

    #[test]
    fn test_format_location_multi_slot() {
        assert_eq!(format_location(&assignment(3, 0, 256, SlotRole::Composite)), "3..=10");
    }

    #[test]
    fn test_role_label() {
        assert_eq!(role_label(SlotRole::BaseSlot), "base");
        assert_eq!(role_label(SlotRole::Composite), "struct");
    }
}
