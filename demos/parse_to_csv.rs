//! Turns a fetched tree into a CSV of financial figures
//!
//! This example works offline on a tree written by `fetch_range`:
//! - Parse every securities report of the range
//! - Write one CSV row per report to stdout
//! - Report skipped and failed documents on stderr
//!
//! Run with: `cargo run --example parse_to_csv -- 2020-06-26 2020-06-30 edinet_data > out.csv`

use chrono::NaiveDate;
use edinetkit::{Aggregator, ParserRegistry};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let from: NaiveDate = args.next().unwrap_or("2020-06-26".into()).parse()?;
    let to: NaiveDate = args.next().map(|s| s.parse()).transpose()?.unwrap_or(from);
    let root = args.next().unwrap_or("edinet_data".into());

    let table = Aggregator::new(ParserRegistry::default()).parse(&root, from, to)?;
    table.write_csv(std::io::stdout())?;

    eprintln!(
        "✓ {} records, {} skipped, {} failed",
        table.len(),
        table.skipped.len(),
        table.errors.len()
    );
    for failure in &table.errors {
        eprintln!(
            "✗ {} {}: {}",
            failure.date,
            failure.document_id.as_deref().unwrap_or("(whole day)"),
            failure.error
        );
    }

    Ok(())
}
