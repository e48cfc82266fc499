//! Stream orchestrator: parse, verify, update, then pull the rewritten
//! metadata and the byte range of the original payload to append.

use std::io::{Read, Seek, SeekFrom};

use crate::boxes::{Atom, AtomKind};
use crate::emit::emit_atom;
use crate::error::{Error, Result};
use crate::parser::parse_tree;
use crate::rewrite::{RewriteContext, TOP_ORDER, update_all};

/// One MP4 being rewritten to start at a requested time.
///
/// The source is owned for the whole request and handed back through
/// [`Mp4Stream::into_inner`], so the caller can keep using the same handle
/// for the ranged payload read that follows the metadata.
///
/// ```no_run
/// use std::fs::File;
/// use mp4seek::Mp4Stream;
///
/// fn main() -> mp4seek::Result<()> {
///     let file = File::open("video.mp4")?;
///     let len = file.metadata()?.len();
///
///     let mut stream = Mp4Stream::parse(file, len, 4.0)?;
///     stream.update()?;
///
///     let (lo, hi) = stream.mdat_range()?;
///     for chunk in stream.metadata() {
///         let bytes = chunk?;
///         // send `bytes`, then serve source bytes lo..=hi verbatim
///         let _ = (&bytes, lo, hi);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Mp4Stream<R> {
    src: R,
    source_len: u64,
    start_ms: u64,
    atoms: Vec<Atom>,
    ctx: Option<RewriteContext>,
}

impl<R: Read + Seek> Mp4Stream<R> {
    /// Parses the box tree from the source. `source_len` is the total
    /// length of the object, which may exceed what the source can actually
    /// read back: only the metadata prefix is ever touched.
    ///
    /// The start time is given in seconds and truncated to milliseconds.
    pub fn parse(mut src: R, source_len: u64, start_secs: f64) -> Result<Self> {
        let start_ms = (start_secs * 1000.0) as u64;
        src.seek(SeekFrom::Start(0))?;
        let atoms = parse_tree(&mut src, source_len, start_ms)?;
        Ok(Mp4Stream { src, source_len, start_ms, atoms, ctx: None })
    }

    /// True iff the top level contains `ftyp`, `moov` and `mdat`. False
    /// usually means the parsed prefix was too short.
    pub fn verify(&self) -> bool {
        TOP_ORDER
            .iter()
            .all(|tag| self.atoms.iter().any(|a| a.hdr.typ.0 == *tag))
    }

    /// Runs the rewrite pass over the parsed tree. After this, every box
    /// size and chunk offset is settled and emission is purely mechanical.
    pub fn update(&mut self) -> Result<()> {
        if !self.verify() {
            return Err(Error::Malformed("missing ftyp, moov or mdat"));
        }
        let ctx = update_all(&mut self.atoms, self.start_ms)?;
        self.ctx = Some(ctx);
        Ok(())
    }

    /// Lazy sequence of rewritten metadata bytes: the ftyp box, the
    /// rewritten moov, then the new mdat header. The caller appends the
    /// bytes of [`Mp4Stream::mdat_range`] to complete the stream.
    pub fn metadata(&mut self) -> MetadataChunks<'_, R> {
        MetadataChunks { stream: self, stage: 0 }
    }

    /// Inclusive byte range of the original object holding the trimmed
    /// media payload.
    pub fn mdat_range(&self) -> Result<(u64, u64)> {
        if self.ctx.is_none() {
            return Err(Error::Malformed("rewrite has not run"));
        }
        for atom in &self.atoms {
            if let AtomKind::Mdat(d) = &atom.kind {
                if let (Some(offset), Some(len)) = (d.stream_offset, d.stream_size) {
                    if len == 0 {
                        return Err(Error::Malformed("empty media payload"));
                    }
                    return Ok((offset, offset + len - 1));
                }
            }
        }
        Err(Error::Malformed("missing ftyp, moov or mdat"))
    }

    /// The parsed (and after [`Mp4Stream::update`], rewritten) box tree.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    /// Releases the source so the caller can issue the payload read.
    pub fn into_inner(self) -> R {
        self.src
    }

    fn emit_top(&mut self, tag: [u8; 4]) -> Result<Vec<u8>> {
        let ctx = self.ctx.as_ref().ok_or(Error::Malformed("rewrite has not run"))?;
        let mut buf = Vec::new();
        for atom in &self.atoms {
            if atom.copy && atom.hdr.typ.0 == tag {
                emit_atom(atom, &mut self.src, &mut buf, ctx)?;
            }
        }
        Ok(buf)
    }
}

/// Pull-based emitter over the top-level emit order. Each step yields the
/// bytes of one top-level box; dropping it abandons the request.
pub struct MetadataChunks<'a, R> {
    stream: &'a mut Mp4Stream<R>,
    stage: usize,
}

impl<R: Read + Seek> Iterator for MetadataChunks<'_, R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.stage < TOP_ORDER.len() {
            let tag = TOP_ORDER[self.stage];
            self.stage += 1;
            match self.stream.emit_top(tag) {
                Ok(buf) if buf.is_empty() => continue,
                Ok(buf) => return Some(Ok(buf)),
                Err(e) => {
                    self.stage = TOP_ORDER.len();
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
