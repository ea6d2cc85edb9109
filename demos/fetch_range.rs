//! Downloads securities reports for a date range into a local tree
//!
//! This example demonstrates the acquisition side of EdinetKit:
//! - Build the client from `EDINET_API_KEY`
//! - Fetch every listed securities report (type 120) of each day
//! - Print the accounting of what was fetched, skipped and failed
//!
//! Running it twice only downloads what is missing.
//!
//! Run with: `cargo run --example fetch_range -- 2020-06-26 2020-06-30 edinet_data`

use chrono::NaiveDate;
use edinetkit::{ArtifactStore, DocTypeCode, Edinet, EdinetConfig, FetchOptions, Fetcher};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let from: NaiveDate = args.next().unwrap_or("2020-06-26".into()).parse()?;
    let to: NaiveDate = args.next().map(|s| s.parse()).transpose()?.unwrap_or(from);
    let root = args.next().unwrap_or("edinet_data".into());

    let edinet = Edinet::with_config(EdinetConfig::from_env()?)?;
    let fetcher = Fetcher::new(edinet, ArtifactStore::new(&root));

    println!("=== Fetching {} .. {} into {} ===\n", from, to, root);

    let options = FetchOptions::new()
        .with_doc_code(DocTypeCode::SECURITIES_REPORT)
        .require_security_code(true);
    let report = fetcher.run(from, to, &options).await?;

    println!("✓ Days processed: {}", report.days_processed);
    println!("✓ Fetched: {}", report.fetched);
    println!("- Already present: {}", report.skipped);
    println!("- Unavailable renditions: {}", report.unavailable);
    for failure in &report.failures {
        let id = failure
            .descriptor
            .as_ref()
            .map(|d| d.doc_id.as_str())
            .unwrap_or("(whole day)");
        println!("✗ {} {}: {}", failure.date, id, failure.error);
    }

    Ok(())
}
