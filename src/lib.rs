//! # mp4seek
//!
//! HTTP pseudo-streaming for MP4/ISOBMFF: given a start time in seconds,
//! rewrite the `moov` sample tables so the file plays from that time, and
//! report the byte range of the original `mdat` payload to append after the
//! rewritten metadata.
//!
//! The crate parses the box tree once, runs a two-phase rewrite (update
//! settles every size and offset in place, emit then writes bytes), and
//! hands the result back as a lazy sequence of metadata chunks plus an
//! inclusive byte range. It has no HTTP knowledge: a middleware feeds it a
//! buffered object prefix and serves the range itself.
//!
//! ## What gets rewritten
//! - `mvhd`/`tkhd`/`mdhd` durations are trimmed by the start time
//! - `stts`, `stss`, `ctts`, `stsc`, `stsz` are cut to the samples from the
//!   start onward
//! - `stco`/`co64` entries are relocated to the emitted layout
//! - the `mdat` header is re-emitted for the trimmed payload
//!
//! Fragmented MP4 (`moof`), edit lists and compressed movie headers
//! (`cmov`) are out of scope; `cmov` is rejected, the rest are dropped.
//!
//! # Quick start
//!
//! ```no_run
//! use mp4seek::Mp4Stream;
//! use std::fs::File;
//! use std::io::Write;
//!
//! fn main() -> anyhow::Result<()> {
//!     let file = File::open("video.mp4")?;
//!     let len = file.metadata()?.len();
//!
//!     let mut stream = Mp4Stream::parse(file, len, 12.5)?;
//!     if !stream.verify() {
//!         // the buffered prefix missed ftyp, moov or mdat: re-read more
//!     }
//!     stream.update()?;
//!
//!     let (lo, hi) = stream.mdat_range()?;
//!     let mut out = Vec::new();
//!     for chunk in stream.metadata() {
//!         out.write_all(&chunk?)?;
//!     }
//!     // append bytes lo..=hi of the original file to `out`
//!     let _ = (lo, hi);
//!     Ok(())
//! }
//! ```

pub mod boxes;
mod emit;
pub mod error;
pub mod known_boxes;
pub mod parser;
pub mod rewrite;
pub mod stream;
mod util;

pub use boxes::{Atom, AtomKind, BoxHeader, FourCC};
pub use error::{Error, Result};
pub use known_boxes::KnownBox;
pub use rewrite::{RewriteContext, TrakData};
pub use stream::{MetadataChunks, Mp4Stream};
