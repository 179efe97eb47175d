use std::path::PathBuf;

use clap::Args;
use serde::Deserialize;

use velostash_core::geo::{GpsPoint, summarize_signed};

#[derive(Args, Debug)]
pub struct RegionArgs {
    /// Track JSON: {"positions": [[lat, lon] | null, ...], "timestamps": [ms, ...]}
    pub track: PathBuf,

    /// First sample index (inclusive)
    #[arg(long, allow_hyphen_values = true)]
    pub start: i64,

    /// Last sample index (inclusive)
    #[arg(long, allow_hyphen_values = true)]
    pub end: i64,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Deserialize)]
struct Track {
    positions: Vec<Option<[f64; 2]>>,
    timestamps: Vec<f64>,
}

pub fn run(args: RegionArgs) -> anyhow::Result<()> {
    let track: Track = super::read_json(&args.track)?;
    let positions: Vec<Option<GpsPoint>> = track
        .positions
        .iter()
        .map(|p| p.map(|[lat, lon]| GpsPoint::new(lat, lon)))
        .collect();

    let summary = summarize_signed(&positions, &track.timestamps, args.start, args.end)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("Region {}..={}", summary.start_index, summary.end_index);
    println!("  Position: {:.6}, {:.6}", summary.latitude, summary.longitude);
    match summary.timestamp() {
        Some(t) => println!("  Time:     {}", t.to_rfc3339()),
        None => println!("  Time:     (unrepresentable)"),
    }
    println!("  Samples:  {} valid", summary.valid_samples);
    Ok(())
}
