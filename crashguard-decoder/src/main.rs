//! Command-line front end for the region decoder.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crashguard_decoder::{decode_region, region_from_file_bytes, EventTable};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Diagnostic region to decode: raw bytes, or console hex-dump text.
    input: PathBuf,

    /// JSON file with application event definitions, merged over the
    /// built-in test events. May be given more than once.
    #[arg(long = "events")]
    events: Vec<PathBuf>,

    /// Emit the report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut table = EventTable::with_test_events();
    for path in &args.events {
        let defs = fs::read_to_string(path)
            .with_context(|| format!("reading event definitions {}", path.display()))?;
        table
            .extend_from_json(&defs)
            .with_context(|| format!("loading event definitions {}", path.display()))?;
    }

    let bytes =
        fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    let region = region_from_file_bytes(&bytes)?;
    let report = decode_region(&region, &table)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    } else {
        print!("{report}");
    }
    Ok(())
}
