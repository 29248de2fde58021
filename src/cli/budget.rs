//! CLI command: `dsrouter budget`
//!
//! Reads today's counters from the configured store (Redis when
//! `budget.redis_url` is set, otherwise an empty process-local store).

use crate::loader::load_config;
use anyhow::{Context, Result};
use dsrouter_core::{BudgetStatus, BudgetTracker};

/// Run the budget subcommand.
pub async fn run(json: bool) -> Result<()> {
    let config = load_config()?;
    let tracker = BudgetTracker::new(config.budget).context("Failed to open budget store")?;
    let status = tracker.check_budget().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_table(&status, tracker.is_degraded());
    }
    Ok(())
}

fn print_table(status: &BudgetStatus, degraded: bool) {
    println!();
    println!("  Daily Budget");
    println!("  {}", "-".repeat(48));
    println!(
        "  {:<10} {:>14} / {:<14}",
        "Tokens", status.tokens_used, status.tokens_limit
    );
    println!(
        "  {:<10} {:>14} / {:<14}",
        "USD",
        format!("${:.4}", status.usd_spent),
        format!("${:.2}", status.usd_limit)
    );
    println!("  {}", "-".repeat(48));
    println!(
        "  Status: {}  |  Resets: {}",
        if status.exceeded { "EXCEEDED" } else { "ok" },
        status.next_reset_utc.to_rfc3339()
    );
    if degraded {
        println!("  (shared store unreachable, showing process-local counters)");
    }
    println!();
}
