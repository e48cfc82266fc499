//! Emit pass: writes the rewritten boxes to a sink, copying unchanged bytes
//! straight from the source and substituting the recomputed fields. Runs
//! strictly after the update pass, so every size it writes is final.

use std::io::{Read, Seek, Write};

use byteorder::{BigEndian, WriteBytesExt};

use crate::boxes::{
    Atom, AtomKind, BoxHeader, Co64Data, CttsData, MdhdData, MvhdData, StcoData, StscData,
    StssData, StszData, SttsData, TkhdData,
};
use crate::error::{Error, Result};
use crate::rewrite::{RewriteContext, child_order};
use crate::util::copy_range;

pub(crate) fn emit_atom<R: Read + Seek, W: Write>(
    atom: &Atom,
    src: &mut R,
    out: &mut W,
    ctx: &RewriteContext,
) -> Result<()> {
    if !atom.copy {
        return Ok(());
    }
    let hdr = &atom.hdr;
    match &atom.kind {
        AtomKind::Passthrough => copy_range(src, out, hdr.start, hdr.size),
        AtomKind::Container(children) => {
            write_box_header(out, hdr)?;
            for tag in child_order(&hdr.typ.0) {
                for child in children {
                    if child.copy && child.hdr.typ.0 == *tag {
                        emit_atom(child, src, out, ctx)?;
                    }
                }
            }
            Ok(())
        }
        AtomKind::Mvhd(d) => emit_mvhd(hdr, d, src, out),
        AtomKind::Tkhd(d) => emit_tkhd(hdr, d, src, out),
        AtomKind::Mdhd(d) => emit_mdhd(hdr, d, src, out),
        AtomKind::Stts(d) => emit_stts(hdr, d, out),
        AtomKind::Stss(d) => emit_stss(hdr, d, out),
        AtomKind::Ctts(d) => emit_ctts(hdr, d, out),
        AtomKind::Stsc(d) => emit_stsc(hdr, d, out),
        AtomKind::Stsz(d) => emit_stsz(hdr, d, src, out),
        AtomKind::Stco(d) => emit_stco(hdr, d, out, ctx),
        AtomKind::Co64(d) => emit_co64(hdr, d, out, ctx),
        // only the header; the caller streams the payload range afterwards
        AtomKind::Mdat(_) => write_box_header(out, hdr),
        AtomKind::Opaque => Ok(()),
    }
}

fn write_box_header<W: Write>(out: &mut W, hdr: &BoxHeader) -> Result<()> {
    if hdr.is_large {
        out.write_u32::<BigEndian>(1)?;
        out.write_all(&hdr.typ.0)?;
        out.write_u64::<BigEndian>(hdr.size)?;
    } else {
        out.write_u32::<BigEndian>(hdr.size as u32)?;
        out.write_all(&hdr.typ.0)?;
    }
    Ok(())
}

fn write_full_header<W: Write>(out: &mut W, hdr: &BoxHeader, version: u8, flags: u32) -> Result<()> {
    write_box_header(out, hdr)?;
    out.write_u8(version)?;
    out.write_u24::<BigEndian>(flags)?;
    Ok(())
}

// mvhd and mdhd share a layout: creation and modification times, then
// timescale, then the duration being replaced.
fn emit_header_with_duration<R: Read + Seek, W: Write>(
    hdr: &BoxHeader,
    version: u8,
    flags: u32,
    duration: u64,
    lead: u64, // bytes between version/flags and the duration field
    src: &mut R,
    out: &mut W,
) -> Result<()> {
    write_full_header(out, hdr, version, flags)?;
    let body = hdr.start + hdr.header_size + 4;
    copy_range(src, out, body, lead)?;
    let tail = if version == 1 {
        out.write_u64::<BigEndian>(duration)?;
        body + lead + 8
    } else {
        out.write_u32::<BigEndian>(duration as u32)?;
        body + lead + 4
    };
    copy_range(src, out, tail, hdr.end() - tail)
}

fn emit_mvhd<R: Read + Seek, W: Write>(hdr: &BoxHeader, d: &MvhdData, src: &mut R, out: &mut W) -> Result<()> {
    let lead = if d.version == 1 { 20 } else { 12 };
    emit_header_with_duration(hdr, d.version, d.flags, d.duration, lead, src, out)
}

fn emit_tkhd<R: Read + Seek, W: Write>(hdr: &BoxHeader, d: &TkhdData, src: &mut R, out: &mut W) -> Result<()> {
    let lead = if d.version == 1 { 24 } else { 16 };
    emit_header_with_duration(hdr, d.version, d.flags, d.duration, lead, src, out)
}

fn emit_mdhd<R: Read + Seek, W: Write>(hdr: &BoxHeader, d: &MdhdData, src: &mut R, out: &mut W) -> Result<()> {
    let lead = if d.version == 1 { 20 } else { 12 };
    emit_header_with_duration(hdr, d.version, d.flags, d.duration, lead, src, out)
}

fn emit_stts<W: Write>(hdr: &BoxHeader, d: &SttsData, out: &mut W) -> Result<()> {
    write_full_header(out, hdr, d.version, d.flags)?;
    out.write_u32::<BigEndian>(d.entries.len() as u32)?;
    for entry in &d.entries {
        out.write_u32::<BigEndian>(entry.count)?;
        out.write_u32::<BigEndian>(entry.delta)?;
    }
    Ok(())
}

fn emit_stss<W: Write>(hdr: &BoxHeader, d: &StssData, out: &mut W) -> Result<()> {
    write_full_header(out, hdr, d.version, d.flags)?;
    out.write_u32::<BigEndian>(d.entries.len() as u32)?;
    for &sample in &d.entries {
        out.write_u32::<BigEndian>(sample)?;
    }
    Ok(())
}

fn emit_ctts<W: Write>(hdr: &BoxHeader, d: &CttsData, out: &mut W) -> Result<()> {
    write_full_header(out, hdr, d.version, d.flags)?;
    out.write_u32::<BigEndian>(d.entries.len() as u32)?;
    for entry in &d.entries {
        out.write_u32::<BigEndian>(entry.count)?;
        out.write_u32::<BigEndian>(entry.offset)?;
    }
    Ok(())
}

fn emit_stsc<W: Write>(hdr: &BoxHeader, d: &StscData, out: &mut W) -> Result<()> {
    write_full_header(out, hdr, d.version, d.flags)?;
    out.write_u32::<BigEndian>(d.entries.len() as u32)?;
    for entry in &d.entries {
        out.write_u32::<BigEndian>(entry.first_chunk)?;
        out.write_u32::<BigEndian>(entry.samples_per_chunk)?;
        out.write_u32::<BigEndian>(entry.description_id)?;
    }
    Ok(())
}

fn emit_stsz<R: Read + Seek, W: Write>(hdr: &BoxHeader, d: &StszData, src: &mut R, out: &mut W) -> Result<()> {
    if d.uniform_size != 0 {
        return copy_range(src, out, hdr.start, hdr.size);
    }
    write_full_header(out, hdr, d.version, d.flags)?;
    out.write_u32::<BigEndian>(0)?;
    out.write_u32::<BigEndian>(d.entries.len() as u32)?;
    for &size in &d.entries {
        out.write_u32::<BigEndian>(size)?;
    }
    Ok(())
}

fn emit_stco<W: Write>(hdr: &BoxHeader, d: &StcoData, out: &mut W, ctx: &RewriteContext) -> Result<()> {
    write_full_header(out, hdr, d.version, d.flags)?;
    out.write_u32::<BigEndian>(d.entries.len() as u32)?;
    for &offset in &d.entries {
        let relocated = u32::try_from(offset as i64 + ctx.chunk_offset)
            .map_err(|_| Error::Malformed("relocated chunk offset overflows 32 bits"))?;
        out.write_u32::<BigEndian>(relocated)?;
    }
    Ok(())
}

fn emit_co64<W: Write>(hdr: &BoxHeader, d: &Co64Data, out: &mut W, ctx: &RewriteContext) -> Result<()> {
    write_full_header(out, hdr, d.version, d.flags)?;
    out.write_u32::<BigEndian>(d.entries.len() as u32)?;
    for &offset in &d.entries {
        let relocated = u64::try_from(offset as i64 + ctx.chunk_offset)
            .map_err(|_| Error::Malformed("relocated chunk offset is negative"))?;
        out.write_u64::<BigEndian>(relocated)?;
    }
    Ok(())
}
