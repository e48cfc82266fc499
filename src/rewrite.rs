//! Update pass: trims the sample tables in place so they describe only the
//! samples from the requested start time onward, and settles every size and
//! offset before a single output byte is produced.

use crate::boxes::{
    Atom, AtomKind, BoxHeader, Co64Data, CttsData, MdatData, MdhdData, MvhdData, StcoData,
    StscData, StscEntry, StssData, StszData, SttsData, TkhdData,
};
use crate::error::{Error, Result};
use crate::util::ticks;

/// A container body larger than this forces the 16-byte largesize header.
const LARGE_SIZE_THRESHOLD: u64 = u32::MAX as u64 - 8;

pub(crate) const TOP_ORDER: &[[u8; 4]] = &[*b"ftyp", *b"moov", *b"mdat"];

const MOOV_ORDER: &[[u8; 4]] = &[*b"cmov", *b"mvhd", *b"trak", *b"tkhd"];
const TRAK_ORDER: &[[u8; 4]] = &[*b"tkhd", *b"mdia"];
const MDIA_ORDER: &[[u8; 4]] = &[*b"mdhd", *b"hdlr", *b"minf"];
const MINF_ORDER: &[[u8; 4]] = &[*b"vmhd", *b"smhd", *b"dinf", *b"stbl"];
const STBL_ORDER: &[[u8; 4]] = &[*b"stsd", *b"stts", *b"stss", *b"ctts", *b"stsc", *b"stsz", *b"stco", *b"co64"];

/// Children of each container are visited in a fixed order, not on-disk
/// order: the table trims depend on each other (stts feeds stss/ctts/stsc,
/// stsc feeds stsz, stsz feeds stco).
pub(crate) fn child_order(typ: &[u8; 4]) -> &'static [[u8; 4]] {
    match typ {
        b"moov" => MOOV_ORDER,
        b"trak" => TRAK_ORDER,
        b"mdia" => MDIA_ORDER,
        b"minf" => MINF_ORDER,
        b"stbl" => STBL_ORDER,
        _ => &[],
    }
}

/// Scratch state threaded between the sample-table boxes of one track.
#[derive(Debug, Clone, Default)]
pub struct TrakData {
    pub timescale: Option<u32>,
    /// Chunk count, from whichever of stco/co64 is present.
    pub chunks: Option<u32>,
    /// Samples to skip inside the start chunk.
    pub chunk_samples: Option<u32>,
    /// Byte size of those skipped samples.
    pub chunk_sample_size: Option<u64>,
    /// 0-based index of the first chunk to keep.
    pub start_chunk: Option<u32>,
    /// 0-based index of the first sample to keep.
    pub start_sample: Option<u64>,
    /// Absolute source offset where this track's payload starts.
    pub start_offset: Option<u64>,
}

/// Rewrite-wide state accumulated across boxes.
#[derive(Debug, Clone, Default)]
pub struct RewriteContext {
    /// Signed delta applied to every emitted chunk offset.
    pub chunk_offset: i64,
    /// Movie timescale from mvhd, used by tkhd.
    pub movie_timescale: Option<u32>,
    /// Scratch for the track currently being updated.
    pub trak: TrakData,
    /// Minimum start offset over all tracks: the first payload byte to
    /// stream from the original mdat.
    pub trak_start_offset: Option<u64>,
}

/// Runs the update pass over the top-level boxes in emit order.
pub(crate) fn update_all(atoms: &mut [Atom], start_ms: u64) -> Result<RewriteContext> {
    let mut ctx = RewriteContext::default();
    for tag in TOP_ORDER {
        for atom in atoms.iter_mut() {
            if atom.copy && atom.hdr.typ.0 == *tag {
                update_atom(atom, start_ms, &mut ctx)?;
            }
        }
    }
    log::info!(
        "rewrite: start {} ms, stream offset {:#x}, chunk offset delta {}",
        start_ms,
        ctx.trak_start_offset.unwrap_or(0),
        ctx.chunk_offset,
    );
    Ok(ctx)
}

fn update_atom(atom: &mut Atom, start_ms: u64, ctx: &mut RewriteContext) -> Result<()> {
    let Atom { hdr, copy, kind } = atom;
    match kind {
        AtomKind::Container(children) => update_container(hdr, children, start_ms, ctx),
        AtomKind::Passthrough => {
            if &hdr.typ.0 == b"ftyp" {
                ctx.chunk_offset += hdr.size as i64;
            }
            Ok(())
        }
        AtomKind::Mvhd(d) => update_mvhd(d, start_ms),
        AtomKind::Tkhd(d) => update_tkhd(d, start_ms, ctx),
        AtomKind::Mdhd(d) => update_mdhd(d, start_ms, &mut ctx.trak),
        AtomKind::Stts(d) => update_stts(hdr, d, start_ms, &mut ctx.trak),
        AtomKind::Stss(d) => update_stss(hdr, d, &ctx.trak),
        AtomKind::Ctts(d) => update_ctts(hdr, copy, d, &ctx.trak),
        AtomKind::Stsc(d) => update_stsc(hdr, d, &mut ctx.trak),
        AtomKind::Stsz(d) => update_stsz(hdr, d, &mut ctx.trak),
        AtomKind::Stco(d) => update_stco(hdr, d, &mut ctx.trak),
        AtomKind::Co64(d) => update_co64(hdr, d, &mut ctx.trak),
        AtomKind::Mdat(d) => update_mdat(hdr, d, ctx),
        AtomKind::Opaque => Ok(()),
    }
}

fn update_container(
    hdr: &mut BoxHeader,
    children: &mut [Atom],
    start_ms: u64,
    ctx: &mut RewriteContext,
) -> Result<()> {
    match &hdr.typ.0 {
        b"moov" => {
            // mvhd's timescale must be visible before tkhd children run
            for child in children.iter() {
                if let AtomKind::Mvhd(d) = &child.kind {
                    ctx.movie_timescale = Some(d.timescale);
                }
            }
        }
        b"trak" => ctx.trak = TrakData::default(),
        b"stbl" => {
            // the chunk count is needed by stsc, which runs before stco
            for child in children.iter() {
                match &child.kind {
                    AtomKind::Stco(d) => ctx.trak.chunks = Some(d.entries.len() as u32),
                    AtomKind::Co64(d) => ctx.trak.chunks = Some(d.entries.len() as u32),
                    _ => {}
                }
            }
        }
        _ => {}
    }

    for tag in child_order(&hdr.typ.0) {
        for child in children.iter_mut() {
            if child.copy && child.hdr.typ.0 == *tag {
                update_atom(child, start_ms, ctx)?;
            }
        }
    }

    let body: u64 = children.iter().filter(|c| c.copy).map(|c| c.hdr.size).sum();
    if body > LARGE_SIZE_THRESHOLD {
        hdr.size = body + 16;
        hdr.is_large = true;
        hdr.header_size = 16;
    } else {
        hdr.size = body + 8;
        hdr.is_large = false;
        hdr.header_size = 8;
    }

    match &hdr.typ.0 {
        b"moov" => ctx.chunk_offset += hdr.size as i64,
        b"trak" => {
            let offset = ctx
                .trak
                .start_offset
                .ok_or(Error::Malformed("track without chunk offsets"))?;
            ctx.trak_start_offset = Some(match ctx.trak_start_offset {
                Some(current) => current.min(offset),
                None => offset,
            });
        }
        _ => {}
    }
    Ok(())
}

fn update_mvhd(d: &mut MvhdData, start_ms: u64) -> Result<()> {
    d.duration = d.duration.saturating_sub(ticks(start_ms, d.timescale));
    Ok(())
}

fn update_tkhd(d: &mut TkhdData, start_ms: u64, ctx: &RewriteContext) -> Result<()> {
    let timescale = ctx
        .movie_timescale
        .ok_or(Error::Malformed("track header without a movie header"))?;
    d.duration = d.duration.saturating_sub(ticks(start_ms, timescale));
    Ok(())
}

fn update_mdhd(d: &mut MdhdData, start_ms: u64, trak: &mut TrakData) -> Result<()> {
    trak.timescale = Some(d.timescale);
    d.duration = d.duration.saturating_sub(ticks(start_ms, d.timescale));
    Ok(())
}

/// Finds the sample the start time falls on, drops the runs before it and
/// shortens the run containing it. Records the start sample for the other
/// tables.
fn update_stts(hdr: &mut BoxHeader, d: &mut SttsData, start_ms: u64, trak: &mut TrakData) -> Result<()> {
    let timescale = trak
        .timescale
        .ok_or(Error::Malformed("time-to-sample without a media header"))?;
    let mut stream_time = ticks(start_ms, timescale);
    let mut start_sample: u64 = 0;
    let mut hit = None;

    for (index, entry) in d.entries.iter_mut().enumerate() {
        let span = entry.count as u64 * entry.delta as u64;
        if stream_time < span {
            let skip = stream_time / entry.delta as u64;
            start_sample += skip;
            entry.count -= skip as u32;
            hit = Some(index);
            break;
        }
        hdr.size -= 8;
        start_sample += entry.count as u64;
        stream_time -= span;
    }

    let index = hit.ok_or(Error::Malformed("start time past end of track"))?;
    if index > 0 {
        d.entries.drain(..index);
    }
    trak.start_sample = Some(start_sample);
    Ok(())
}

/// Keeps the keyframes from the first one at or after the start sample and
/// renumbers them to the trimmed track, 1-based.
fn update_stss(hdr: &mut BoxHeader, d: &mut StssData, trak: &TrakData) -> Result<()> {
    let start_sample = match trak.start_sample {
        Some(s) if s > 0 => s,
        // nothing was trimmed, or stts never ran: the prefix was too short
        _ => return Err(Error::IncorrectParse),
    };
    let wanted = start_sample + 1;
    let mut hit = None;
    for (index, &sample) in d.entries.iter().enumerate() {
        if sample as u64 >= wanted {
            hit = Some(index);
            break;
        }
        hdr.size -= 4;
    }
    let index = hit.ok_or(Error::Malformed("no keyframe at or after start"))?;
    if index > 0 {
        d.entries.drain(..index);
    }
    for sample in &mut d.entries {
        *sample = (*sample as u64 - start_sample) as u32;
    }
    Ok(())
}

/// Trims composition offsets like stts. A start beyond the table drops the
/// box from the output instead of failing.
fn update_ctts(hdr: &mut BoxHeader, copy: &mut bool, d: &mut CttsData, trak: &TrakData) -> Result<()> {
    let mut remaining = match trak.start_sample {
        Some(s) if s > 0 => s + 1,
        _ => {
            *copy = false;
            return Ok(());
        }
    };
    let mut hit = None;
    for (index, entry) in d.entries.iter_mut().enumerate() {
        if remaining <= entry.count as u64 {
            entry.count -= (remaining - 1) as u32;
            hit = Some(index);
            break;
        }
        remaining -= entry.count as u64;
        hdr.size -= 8;
    }
    match hit {
        Some(index) => {
            if index > 0 {
                d.entries.drain(..index);
            }
        }
        None => *copy = false,
    }
    Ok(())
}

/// Walks the sample-to-chunk runs to locate the chunk holding the start
/// sample, rebases chunk numbering to the trimmed file and splits the run
/// when the start falls mid-chunk.
fn update_stsc(hdr: &mut BoxHeader, d: &mut StscData, trak: &mut TrakData) -> Result<()> {
    let mut start_sample = trak.start_sample.ok_or(Error::IncorrectParse)?;
    let entries = &mut d.entries;

    let mut cur = entries[0];
    hdr.size -= 12;
    let mut truncate_index = 1usize;
    let mut found = None;
    while truncate_index < entries.len() {
        let next = entries[truncate_index];
        if next.first_chunk < cur.first_chunk {
            return Err(Error::Malformed("sample-to-chunk entries out of order"));
        }
        let n = (next.first_chunk - cur.first_chunk) as u64 * cur.samples_per_chunk as u64;
        if start_sample <= n {
            found = Some(next.first_chunk);
            break;
        }
        start_sample -= n;
        cur = next;
        truncate_index += 1;
        hdr.size -= 12;
    }
    let next_chunk = match found {
        Some(first_chunk) => first_chunk,
        None => {
            // the start sits in the final run, which extends to the last chunk
            let chunks = trak
                .chunks
                .ok_or(Error::Malformed("sample-to-chunk without chunk offsets"))?;
            let n = (chunks as i64 - cur.first_chunk as i64) * cur.samples_per_chunk as i64;
            if start_sample as i64 > n {
                return Err(Error::Malformed("start sample past end of track"));
            }
            chunks
        }
    };
    if cur.samples_per_chunk == 0 {
        return Err(Error::Malformed("zero samples per chunk"));
    }

    // the walk dropped the run containing the start; put it back
    truncate_index -= 1;
    hdr.size += 12;
    if truncate_index > 0 {
        entries.drain(..truncate_index);
    }
    let first = entries[0];
    if first.first_chunk == 0 {
        return Err(Error::Malformed("sample-to-chunk entry with chunk number zero"));
    }
    entries[0] = StscEntry { first_chunk: 1, ..first };

    let start_chunk = (first.first_chunk - 1) + (start_sample / first.samples_per_chunk as u64) as u32;
    let chunk_samples = (start_sample % first.samples_per_chunk as u64) as u32;

    let mut index = 1usize;
    if chunk_samples > 0 && next_chunk as i64 - start_chunk as i64 == 2 {
        // the partial chunk is the run's last: shrink the run in place
        entries[0].samples_per_chunk = first.samples_per_chunk - chunk_samples;
    } else if chunk_samples > 0 {
        entries.insert(0, StscEntry {
            first_chunk: 1,
            samples_per_chunk: first.samples_per_chunk - chunk_samples,
            description_id: first.description_id,
        });
        entries[1] = StscEntry { first_chunk: 2, ..first };
        hdr.size += 12;
        index = 2;
    }
    while index < entries.len() {
        let rebased = entries[index]
            .first_chunk
            .checked_sub(start_chunk)
            .ok_or(Error::Malformed("sample-to-chunk entries out of order"))?;
        entries[index].first_chunk = rebased;
        index += 1;
    }

    trak.start_chunk = Some(start_chunk);
    trak.chunk_samples = Some(chunk_samples);
    Ok(())
}

/// Drops the sizes of skipped samples and records the byte size of the
/// partial samples skipped inside the start chunk.
fn update_stsz(hdr: &mut BoxHeader, d: &mut StszData, trak: &mut TrakData) -> Result<()> {
    let start_sample = trak.start_sample.ok_or(Error::IncorrectParse)?;
    let chunk_samples = trak.chunk_samples.ok_or(Error::IncorrectParse)? as u64;

    if d.uniform_size != 0 {
        // implicit table: the skipped bytes fall straight out of the math
        trak.chunk_sample_size = Some(chunk_samples * d.uniform_size as u64);
        return Ok(());
    }

    if start_sample > d.entries.len() as u64 {
        return Err(Error::Malformed("start sample past end of size table"));
    }
    let start = start_sample as usize;
    let skipped: u64 = d.entries[start - chunk_samples as usize..start]
        .iter()
        .map(|&s| s as u64)
        .sum();
    trak.chunk_sample_size = Some(skipped);

    if start > 0 {
        d.entries.drain(..start);
        hdr.size -= 4 * start as u64;
    }
    Ok(())
}

/// Drops the offsets of skipped chunks and advances the first kept offset
/// past the skipped partial samples. The result is this track's first
/// payload byte in the original file.
fn update_stco(hdr: &mut BoxHeader, d: &mut StcoData, trak: &mut TrakData) -> Result<()> {
    let start_chunk = trak.start_chunk.ok_or(Error::IncorrectParse)?;
    let chunks = trak.chunks.ok_or(Error::Malformed("chunk offsets missing a chunk count"))?;
    if d.entries.is_empty() || start_chunk > chunks || (start_chunk as usize) >= d.entries.len() {
        return Err(Error::Malformed("start chunk past end of chunk offsets"));
    }
    let start = start_chunk as usize;
    if start > 0 {
        d.entries.drain(..start);
        hdr.size -= 4 * start as u64;
    }
    let skipped = trak.chunk_sample_size.ok_or(Error::IncorrectParse)?;
    let start_offset = d.entries[0] as u64 + skipped;
    let first = u32::try_from(start_offset)
        .map_err(|_| Error::Malformed("chunk offset overflows 32 bits"))?;
    d.entries[0] = first;
    trak.start_offset = Some(start_offset);
    Ok(())
}

fn update_co64(hdr: &mut BoxHeader, d: &mut Co64Data, trak: &mut TrakData) -> Result<()> {
    let start_chunk = trak.start_chunk.ok_or(Error::IncorrectParse)?;
    let chunks = trak.chunks.ok_or(Error::Malformed("chunk offsets missing a chunk count"))?;
    if d.entries.is_empty() || start_chunk > chunks || (start_chunk as usize) >= d.entries.len() {
        return Err(Error::Malformed("start chunk past end of chunk offsets"));
    }
    let start = start_chunk as usize;
    if start > 0 {
        d.entries.drain(..start);
        hdr.size -= 8 * start as u64;
    }
    let skipped = trak.chunk_sample_size.ok_or(Error::IncorrectParse)?;
    let start_offset = d.entries[0] + skipped;
    d.entries[0] = start_offset;
    trak.start_offset = Some(start_offset);
    Ok(())
}

/// Settles where the streamed payload begins and how the emitted layout
/// shifts every chunk offset: metadata sizes were added along the way, the
/// new mdat header is added here, and the bytes skipped at the front of the
/// original payload are subtracted.
fn update_mdat(hdr: &mut BoxHeader, d: &mut MdatData, ctx: &mut RewriteContext) -> Result<()> {
    let start_offset = ctx
        .trak_start_offset
        .ok_or(Error::Malformed("no track contributed a start offset"))?;
    let end = hdr.end();
    if start_offset > end {
        return Err(Error::Malformed("start offset past end of media payload"));
    }
    let stream_size = end - start_offset;
    d.stream_offset = Some(start_offset);
    d.stream_size = Some(stream_size);
    hdr.size = stream_size + hdr.header_size;
    ctx.chunk_offset += hdr.header_size as i64;
    ctx.chunk_offset -= start_offset as i64;
    Ok(())
}
