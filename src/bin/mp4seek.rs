use clap::Parser;
use mp4seek::Mp4Stream;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};

#[derive(Parser, Debug)]
#[command(version, about = "Rewrite an MP4 so playback starts at a given time")]
struct Args {
    /// Source MP4 path
    input: String,

    /// Start time in seconds
    #[arg(short, long, default_value_t = 0.0)]
    start: f64,

    /// Destination path for the rewritten MP4
    #[arg(short, long)]
    output: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let file = File::open(&args.input)?;
    let len = file.metadata()?.len();

    let mut stream = Mp4Stream::parse(file, len, args.start)?;
    stream.update()?;
    let (lo, hi) = stream.mdat_range()?;

    let mut out = BufWriter::new(File::create(&args.output)?);
    let mut written = 0u64;
    for chunk in stream.metadata() {
        let bytes = chunk?;
        out.write_all(&bytes)?;
        written += bytes.len() as u64;
    }

    // the trimmed payload follows the metadata verbatim
    let mut src = stream.into_inner();
    src.seek(SeekFrom::Start(lo))?;
    written += io::copy(&mut Read::by_ref(&mut src).take(hi - lo + 1), &mut out)?;
    out.flush()?;

    eprintln!("{} -> {} ({} bytes from {:.3}s)", args.input, args.output, written, args.start);
    Ok(())
}
