//! Reports new large holdings reports
//!
//! This example demonstrates the change detection checker:
//! - Look at the catalogs of the last few days
//! - Inspect large holdings reports not seen in earlier runs
//! - Exit with status 1 when anything new was found, so it can drive a cron job
//!
//! Run with: `cargo run --example check_holdings -- 3 history.json 7203 6758`

use edinetkit::{Edinet, EdinetConfig, History, HoldingsChecker};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let days: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(1);
    let history_path = PathBuf::from(args.next().unwrap_or("history.json".into()));
    let sec_codes: Vec<String> = args.collect();

    let edinet = Edinet::with_config(EdinetConfig::from_env()?)?;
    let mut checker = HoldingsChecker::new(edinet);
    if !sec_codes.is_empty() {
        checker = checker.with_sec_codes(&sec_codes);
    }

    let today = chrono::Local::now().date_naive();
    let from = today - chrono::Days::new(days);
    let mut history = History::load(&history_path)?;
    let report = checker.check_with_history(from, today, &mut history).await?;
    history.save(&history_path)?;

    println!("=== {} new reports inspected ===\n", report.inspected);
    for alert in &report.alerts {
        println!(
            "{} {} {} -> {} ({})",
            alert.submit_date_time.as_deref().unwrap_or("-"),
            alert.doc_id,
            alert.filer_name.as_deref().unwrap_or("-"),
            alert.issuer_name.as_deref().unwrap_or("-"),
            alert.reason.as_deref().unwrap_or("-"),
        );
    }
    for failure in &report.failures {
        eprintln!("✗ {}: {}", failure.date, failure.error);
    }

    Ok(if report.alerts.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
