use std::fmt;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::util::ticks;

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn as_str_lossy(&self) -> String {
        self.0.iter().map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
}
impl fmt::Debug for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }
impl fmt::Display for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }

/// Position and length of a box as found in the source. After the update
/// pass, `size` holds the length the box will have in the emitted stream
/// instead.
#[derive(Debug, Clone)]
pub struct BoxHeader {
    pub start: u64,        // file offset of header start
    pub size: u64,         // total size including header
    pub typ: FourCC,
    pub is_large: bool,    // 64-bit "largesize" form
    pub header_size: u64,  // 8, or 16 when is_large
}

impl BoxHeader {
    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}

/// One node of the parsed box tree. `copy = false` nodes are dropped from
/// the emitted stream.
#[derive(Debug)]
pub struct Atom {
    pub hdr: BoxHeader,
    pub copy: bool,
    pub kind: AtomKind,
}

#[derive(Debug)]
pub enum AtomKind {
    /// Recursed container (`moov`, `trak`, `mdia`, `minf`, `stbl` and the
    /// dropped generic containers).
    Container(Vec<Atom>),
    Mvhd(MvhdData),
    Tkhd(TkhdData),
    Mdhd(MdhdData),
    Stts(SttsData),
    Stss(StssData),
    Ctts(CttsData),
    Stsc(StscData),
    Stsz(StszData),
    Stco(StcoData),
    Co64(Co64Data),
    Mdat(MdatData),
    /// Copied verbatim: `ftyp`, `hdlr`, `vmhd`, `smhd`, `dinf`, `stsd`.
    Passthrough,
    /// Unknown or irrelevant; never emitted.
    Opaque,
}

pub(crate) fn read_version_flags<R: Read>(r: &mut R) -> Result<(u8, u32)> {
    let version = r.read_u8()?;
    let flags = r.read_u24::<BigEndian>()?;
    Ok((version, flags))
}

/// Movie header: timescale and overall duration.
#[derive(Debug, Clone)]
pub struct MvhdData {
    pub version: u8,
    pub flags: u32,
    pub timescale: u32,
    pub duration: u64,
}

impl MvhdData {
    /// Reads timescale and duration; rejects a start time at or past the
    /// end of the movie up front, before any table work happens.
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, version: u8, flags: u32, start_ms: u64) -> Result<Self> {
        let (timescale, duration) = if version == 1 {
            r.seek(SeekFrom::Current(16))?;
            let ts = r.read_u32::<BigEndian>()?;
            let dur = r.read_u64::<BigEndian>()?;
            (ts, dur)
        } else {
            r.seek(SeekFrom::Current(8))?;
            let ts = r.read_u32::<BigEndian>()?;
            let dur = r.read_u32::<BigEndian>()? as u64;
            (ts, dur)
        };
        let start_ticks = ticks(start_ms, timescale);
        if duration < start_ticks || (duration == start_ticks && start_ms > 0) {
            return Err(Error::StartOutOfRange);
        }
        Ok(MvhdData { version, flags, timescale, duration })
    }
}

/// Track header: only the duration matters for the rewrite.
#[derive(Debug, Clone)]
pub struct TkhdData {
    pub version: u8,
    pub flags: u32,
    pub duration: u64,
}

impl TkhdData {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, version: u8, flags: u32) -> Result<Self> {
        let duration = if version == 1 {
            r.seek(SeekFrom::Current(24))?;
            r.read_u64::<BigEndian>()?
        } else {
            r.seek(SeekFrom::Current(16))?;
            r.read_u32::<BigEndian>()? as u64
        };
        Ok(TkhdData { version, flags, duration })
    }
}

/// Media header: per-track timescale and duration.
#[derive(Debug, Clone)]
pub struct MdhdData {
    pub version: u8,
    pub flags: u32,
    pub timescale: u32,
    pub duration: u64,
}

impl MdhdData {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, version: u8, flags: u32) -> Result<Self> {
        let (timescale, duration) = if version == 1 {
            r.seek(SeekFrom::Current(16))?;
            let ts = r.read_u32::<BigEndian>()?;
            let dur = r.read_u64::<BigEndian>()?;
            (ts, dur)
        } else {
            r.seek(SeekFrom::Current(8))?;
            let ts = r.read_u32::<BigEndian>()?;
            let dur = r.read_u32::<BigEndian>()? as u64;
            (ts, dur)
        };
        Ok(MdhdData { version, flags, timescale, duration })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SttsEntry {
    pub count: u32,
    pub delta: u32,
}

/// Decoding time-to-sample runs.
#[derive(Debug, Clone)]
pub struct SttsData {
    pub version: u8,
    pub flags: u32,
    pub entries: Vec<SttsEntry>,
}

impl SttsData {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, version: u8, flags: u32, end: u64) -> Result<Self> {
        let count = read_entry_count(r, end, 8, "stts")?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let count = r.read_u32::<BigEndian>()?;
            let delta = r.read_u32::<BigEndian>()?;
            entries.push(SttsEntry { count, delta });
        }
        Ok(SttsData { version, flags, entries })
    }
}

/// Sync (keyframe) sample numbers, 1-based.
#[derive(Debug, Clone)]
pub struct StssData {
    pub version: u8,
    pub flags: u32,
    pub entries: Vec<u32>,
}

impl StssData {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, version: u8, flags: u32, end: u64) -> Result<Self> {
        let count = read_entry_count(r, end, 4, "stss")?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(r.read_u32::<BigEndian>()?);
        }
        Ok(StssData { version, flags, entries })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CttsEntry {
    pub count: u32,
    pub offset: u32,
}

/// Composition time offset runs.
#[derive(Debug, Clone)]
pub struct CttsData {
    pub version: u8,
    pub flags: u32,
    pub entries: Vec<CttsEntry>,
}

impl CttsData {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, version: u8, flags: u32, end: u64) -> Result<Self> {
        let count = read_entry_count(r, end, 8, "ctts")?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let count = r.read_u32::<BigEndian>()?;
            let offset = r.read_u32::<BigEndian>()?;
            entries.push(CttsEntry { count, offset });
        }
        Ok(CttsData { version, flags, entries })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StscEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub description_id: u32,
}

/// Sample-to-chunk runs.
#[derive(Debug, Clone)]
pub struct StscData {
    pub version: u8,
    pub flags: u32,
    pub entries: Vec<StscEntry>,
}

impl StscData {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, version: u8, flags: u32, end: u64) -> Result<Self> {
        let count = read_entry_count(r, end, 12, "stsc")?;
        if count == 0 {
            return Err(Error::Malformed("empty sample-to-chunk table"));
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let first_chunk = r.read_u32::<BigEndian>()?;
            let samples_per_chunk = r.read_u32::<BigEndian>()?;
            let description_id = r.read_u32::<BigEndian>()?;
            entries.push(StscEntry { first_chunk, samples_per_chunk, description_id });
        }
        Ok(StscData { version, flags, entries })
    }
}

/// Per-sample sizes. A nonzero `uniform_size` means the table is implicit
/// and the box passes through unchanged.
#[derive(Debug, Clone)]
pub struct StszData {
    pub version: u8,
    pub flags: u32,
    pub uniform_size: u32,
    pub entries: Vec<u32>,
}

impl StszData {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, version: u8, flags: u32, end: u64) -> Result<Self> {
        let uniform_size = r.read_u32::<BigEndian>()?;
        let declared = r.read_u32::<BigEndian>()?;
        let mut entries = Vec::new();
        if uniform_size == 0 {
            let pos = r.stream_position()?;
            let avail = end.checked_sub(pos).ok_or(Error::Malformed("stsz payload overruns its box"))?;
            if avail % 4 != 0 || avail / 4 != declared as u64 {
                return Err(Error::Malformed("stsz entry count mismatch"));
            }
            entries.reserve(declared as usize);
            for _ in 0..declared {
                entries.push(r.read_u32::<BigEndian>()?);
            }
        }
        Ok(StszData { version, flags, uniform_size, entries })
    }
}

/// 32-bit chunk offsets.
#[derive(Debug, Clone)]
pub struct StcoData {
    pub version: u8,
    pub flags: u32,
    pub entries: Vec<u32>,
}

impl StcoData {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, version: u8, flags: u32, end: u64) -> Result<Self> {
        let count = read_entry_count(r, end, 4, "stco")?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(r.read_u32::<BigEndian>()?);
        }
        Ok(StcoData { version, flags, entries })
    }
}

/// 64-bit chunk offsets.
#[derive(Debug, Clone)]
pub struct Co64Data {
    pub version: u8,
    pub flags: u32,
    pub entries: Vec<u64>,
}

impl Co64Data {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, version: u8, flags: u32, end: u64) -> Result<Self> {
        let count = read_entry_count(r, end, 8, "co64")?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(r.read_u64::<BigEndian>()?);
        }
        Ok(Co64Data { version, flags, entries })
    }
}

/// Media payload. The payload itself is never emitted inline; the update
/// pass records the byte range of the original file to stream after the
/// rewritten metadata.
#[derive(Debug, Clone, Default)]
pub struct MdatData {
    pub stream_offset: Option<u64>,
    pub stream_size: Option<u64>,
}

/// Reads a table's declared entry count and cross-checks it against the
/// space left in the box. Trailing garbage and short tables both surface
/// as a count mismatch.
fn read_entry_count<R: Read + Seek>(
    r: &mut R,
    end: u64,
    entry_width: u64,
    table: &'static str,
) -> Result<usize> {
    let declared = r.read_u32::<BigEndian>()?;
    let pos = r.stream_position()?;
    let avail = match end.checked_sub(pos) {
        Some(n) => n,
        None => return Err(Error::Malformed("table payload overruns its box")),
    };
    if avail % entry_width != 0 || avail / entry_width != declared as u64 {
        log::debug!("{table} declares {declared} entries but carries {avail} bytes");
        return Err(Error::Malformed("table entry count mismatch"));
    }
    Ok(declared as usize)
}
