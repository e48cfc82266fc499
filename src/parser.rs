use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};

use crate::boxes::{
    Atom, AtomKind, BoxHeader, Co64Data, CttsData, FourCC, MdatData, MdhdData, MvhdData, StcoData,
    StscData, StssData, StszData, SttsData, TkhdData, read_version_flags,
};
use crate::error::{Error, Result};
use crate::known_boxes::KnownBox;

pub fn read_box_header<R: Read + Seek>(r: &mut R) -> Result<BoxHeader> {
    let start = r.stream_position()?;
    let size32 = r.read_u32::<BigEndian>()?;
    let mut typ = [0u8; 4];
    r.read_exact(&mut typ)?;
    let mut size = size32 as u64;
    let mut is_large = false;

    if size32 == 1 {
        size = r.read_u64::<BigEndian>()?;
        is_large = true;
    }

    let header_size = if is_large { 16 } else { 8 };
    if size != 0 && size < header_size {
        return Err(Error::Malformed("box size smaller than its header"));
    }

    Ok(BoxHeader { start, size, typ: FourCC(typ), is_large, header_size })
}

/// Parses the boxes between the current position and `parent_end`.
///
/// Running out of input mid-box truncates this level instead of failing:
/// the caller's prefix may simply be too short, which `verify()` reports
/// and the caller fixes by re-reading with a bigger prefix. Structural
/// errors still abort the whole parse.
pub fn parse_tree<R: Read + Seek>(r: &mut R, parent_end: u64, start_ms: u64) -> Result<Vec<Atom>> {
    let mut atoms = Vec::new();
    while r.stream_position()? < parent_end {
        let atom = match parse_box(r, parent_end, start_ms) {
            Ok(atom) => atom,
            Err(Error::EndOfInput) => break,
            Err(e) => return Err(e),
        };
        let end = atom.hdr.end();
        atoms.push(atom);
        if end >= parent_end {
            break;
        }
        r.seek(SeekFrom::Start(end))?;
    }
    Ok(atoms)
}

/// Reads one box at the current position and dispatches on its type:
/// recognized leaf types get their payload parsed, containers recurse,
/// everything else becomes an opaque leaf that is never emitted.
pub fn parse_box<R: Read + Seek>(r: &mut R, parent_end: u64, start_ms: u64) -> Result<Atom> {
    let mut hdr = read_box_header(r)?;
    if hdr.size == 0 {
        // extends to the end of the enclosing container
        hdr.size = parent_end - hdr.start;
        if hdr.size < hdr.header_size {
            return Err(Error::Malformed("box size smaller than its header"));
        }
    }
    log::debug!("{} @ {:#010x}: {} bytes", hdr.typ, hdr.start, hdr.size);

    let end = hdr.end();
    let known = KnownBox::from(hdr.typ);
    let (copy, kind) = match known {
        KnownBox::Cmov => return Err(Error::Unsupported(hdr.typ)),
        KnownBox::Mdat => (true, AtomKind::Mdat(MdatData::default())),
        KnownBox::Mvhd => {
            let (version, flags) = read_version_flags(r)?;
            (true, AtomKind::Mvhd(MvhdData::parse(r, version, flags, start_ms)?))
        }
        KnownBox::Tkhd => {
            let (version, flags) = read_version_flags(r)?;
            (true, AtomKind::Tkhd(TkhdData::parse(r, version, flags)?))
        }
        KnownBox::Mdhd => {
            let (version, flags) = read_version_flags(r)?;
            (true, AtomKind::Mdhd(MdhdData::parse(r, version, flags)?))
        }
        KnownBox::Stts => {
            let (version, flags) = read_version_flags(r)?;
            (true, AtomKind::Stts(SttsData::parse(r, version, flags, end)?))
        }
        KnownBox::Stss => {
            let (version, flags) = read_version_flags(r)?;
            (true, AtomKind::Stss(StssData::parse(r, version, flags, end)?))
        }
        KnownBox::Ctts => {
            let (version, flags) = read_version_flags(r)?;
            (true, AtomKind::Ctts(CttsData::parse(r, version, flags, end)?))
        }
        KnownBox::Stsc => {
            let (version, flags) = read_version_flags(r)?;
            (true, AtomKind::Stsc(StscData::parse(r, version, flags, end)?))
        }
        KnownBox::Stsz => {
            let (version, flags) = read_version_flags(r)?;
            (true, AtomKind::Stsz(StszData::parse(r, version, flags, end)?))
        }
        KnownBox::Stco => {
            let (version, flags) = read_version_flags(r)?;
            (true, AtomKind::Stco(StcoData::parse(r, version, flags, end)?))
        }
        KnownBox::Co64 => {
            let (version, flags) = read_version_flags(r)?;
            (true, AtomKind::Co64(Co64Data::parse(r, version, flags, end)?))
        }
        k if k.is_passthrough() => (true, AtomKind::Passthrough),
        k if k.is_container() => {
            let children = parse_tree(r, end, start_ms)?;
            (k.is_emitted_container(), AtomKind::Container(children))
        }
        _ => (false, AtomKind::Opaque),
    };

    r.seek(SeekFrom::Start(end))?;
    Ok(Atom { hdr, copy, kind })
}
