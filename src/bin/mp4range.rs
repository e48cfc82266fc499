use clap::{ArgAction, Parser};
use mp4seek::Mp4Stream;
use serde::Serialize;
use std::fs::File;

#[derive(Parser, Debug)]
#[command(version, about = "Print the rewritten-metadata length and mdat byte range for a start time")]
struct Args {
    /// Source MP4 path
    input: String,

    /// Start time in seconds
    #[arg(short, long, default_value_t = 0.0)]
    start: f64,

    /// Emit JSON instead of human-readable text
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

/// The numbers an HTTP middleware needs to build the response: how many
/// metadata bytes it will yield, which range of the origin object to
/// request afterwards, and the resulting Content-Length.
#[derive(Serialize)]
struct RangeSummary {
    start_ms: u64,
    metadata_len: u64,
    range_start: u64,
    range_end: u64,
    content_len: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let file = File::open(&args.input)?;
    let len = file.metadata()?.len();

    let mut stream = Mp4Stream::parse(file, len, args.start)?;
    stream.update()?;

    let (range_start, range_end) = stream.mdat_range()?;
    let start_ms = stream.start_ms();
    let mut metadata_len = 0u64;
    for chunk in stream.metadata() {
        metadata_len += chunk?.len() as u64;
    }

    let summary = RangeSummary {
        start_ms,
        metadata_len,
        range_start,
        range_end,
        content_len: metadata_len + (range_end - range_start + 1),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("start:        {} ms", summary.start_ms);
        println!("metadata:     {} bytes", summary.metadata_len);
        println!("mdat range:   bytes={}-{}", summary.range_start, summary.range_end);
        println!("content-len:  {}", summary.content_len);
    }
    Ok(())
}
