use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};

/// Copies `len` bytes from `offset` in the source into the sink.
pub(crate) fn copy_range<R: Read + Seek, W: Write>(
    src: &mut R,
    out: &mut W,
    offset: u64,
    len: u64,
) -> Result<()> {
    src.seek(SeekFrom::Start(offset))?;
    let copied = io::copy(&mut src.take(len), out)?;
    if copied != len {
        return Err(Error::EndOfInput);
    }
    Ok(())
}

/// Milliseconds to timescale ticks, truncating. The widening matters:
/// `millis * timescale` overflows 64 bits for large timescales on long
/// movies.
pub(crate) fn ticks(millis: u64, timescale: u32) -> u64 {
    ((millis as u128 * timescale as u128) / 1000) as u64
}
