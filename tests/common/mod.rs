//! Shared builders for synthetic MP4 fixtures.

#![allow(dead_code)]

use mp4seek::{Atom, AtomKind};

pub fn plain_box(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(8 + payload.len());
    v.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    v.extend_from_slice(tag);
    v.extend_from_slice(payload);
    v
}

pub fn full_box(tag: &[u8; 4], version: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![version, 0, 0, 0];
    body.extend_from_slice(payload);
    plain_box(tag, &body)
}

pub fn large_box(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(16 + payload.len());
    v.extend_from_slice(&1u32.to_be_bytes());
    v.extend_from_slice(tag);
    v.extend_from_slice(&((16 + payload.len()) as u64).to_be_bytes());
    v.extend_from_slice(payload);
    v
}

pub fn ftyp() -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(b"isom");
    p.extend_from_slice(&512u32.to_be_bytes());
    p.extend_from_slice(b"isom");
    p.extend_from_slice(b"avc1");
    plain_box(b"ftyp", &p)
}

const MATRIX: [u8; 36] = {
    let mut m = [0u8; 36];
    m[1] = 0x01; // 0x00010000
    m[17] = 0x01;
    m[32] = 0x40; // 0x40000000
    m
};

/// A one-video-track movie with evenly filled chunks, assembled as
/// `ftyp moov mdat` with chunk offsets pointing into the real payload.
///
/// When `uniform_size` is nonzero, `sample_sizes` must hold that value for
/// every sample; the sizes still drive the payload layout.
pub struct Movie {
    pub timescale: u32,
    pub duration: u64,
    pub sample_delta: u32,
    pub sample_sizes: Vec<u32>,
    pub samples_per_chunk: u32,
    pub keyframes: Option<Vec<u32>>,
    pub ctts: Option<Vec<(u32, u32)>>,
    pub uniform_size: u32,
    pub co64: bool,
    pub v1_headers: bool,
    pub omit_stts: bool,
}

impl Default for Movie {
    fn default() -> Self {
        // 10 seconds, 10 fps, 10 chunks of 10 samples, distinct sizes
        Movie {
            timescale: 1000,
            duration: 10_000,
            sample_delta: 100,
            sample_sizes: (0..100).map(|i| 100 + i).collect(),
            samples_per_chunk: 10,
            keyframes: None,
            ctts: None,
            uniform_size: 0,
            co64: false,
            v1_headers: false,
            omit_stts: false,
        }
    }
}

impl Movie {
    pub fn sample_count(&self) -> u32 {
        self.sample_sizes.len() as u32
    }

    pub fn chunk_count(&self) -> u32 {
        self.sample_count().div_ceil(self.samples_per_chunk)
    }

    pub fn payload_len(&self) -> u64 {
        self.sample_sizes.iter().map(|&s| s as u64).sum()
    }

    /// Offset of each chunk relative to the start of the mdat payload.
    pub fn chunk_rel_offsets(&self) -> Vec<u64> {
        let mut offsets = Vec::new();
        let mut pos = 0u64;
        for (i, &size) in self.sample_sizes.iter().enumerate() {
            if i as u32 % self.samples_per_chunk == 0 {
                offsets.push(pos);
            }
            pos += size as u64;
        }
        offsets
    }

    /// Absolute file offset of the first payload byte.
    pub fn payload_base(&self) -> u64 {
        (ftyp().len() + self.moov(0).len() + 8) as u64
    }

    pub fn build(&self) -> Vec<u8> {
        let mut v = ftyp();
        v.extend_from_slice(&self.moov(self.payload_base()));
        let payload: Vec<u8> = (0..self.payload_len()).map(|i| (i % 251) as u8).collect();
        v.extend_from_slice(&plain_box(b"mdat", &payload));
        v
    }

    fn moov(&self, payload_base: u64) -> Vec<u8> {
        let mut stbl = self.stsd();
        if !self.omit_stts {
            stbl.extend_from_slice(&stts_box(&[(self.sample_count(), self.sample_delta)]));
        }
        if let Some(keyframes) = &self.keyframes {
            stbl.extend_from_slice(&stss_box(keyframes));
        }
        if let Some(ctts) = &self.ctts {
            stbl.extend_from_slice(&ctts_box(ctts));
        }
        stbl.extend_from_slice(&stsc_box(&[(1, self.samples_per_chunk, 1)]));
        stbl.extend_from_slice(&self.stsz());
        let offsets: Vec<u64> = self
            .chunk_rel_offsets()
            .iter()
            .map(|rel| payload_base + rel)
            .collect();
        if self.co64 {
            stbl.extend_from_slice(&co64_box(&offsets));
        } else {
            let narrow: Vec<u32> = offsets.iter().map(|&o| o as u32).collect();
            stbl.extend_from_slice(&stco_box(&narrow));
        }

        let mut minf = self.vmhd();
        minf.extend_from_slice(&self.dinf());
        minf.extend_from_slice(&plain_box(b"stbl", &stbl));

        let mut mdia = self.mdhd();
        mdia.extend_from_slice(&self.hdlr());
        mdia.extend_from_slice(&plain_box(b"minf", &minf));

        let mut trak = self.tkhd();
        trak.extend_from_slice(&plain_box(b"mdia", &mdia));

        let mut moov = self.mvhd();
        moov.extend_from_slice(&plain_box(b"trak", &trak));
        plain_box(b"moov", &moov)
    }

    fn mvhd(&self) -> Vec<u8> {
        let mut p = Vec::new();
        if self.v1_headers {
            p.extend_from_slice(&0u64.to_be_bytes()); // creation
            p.extend_from_slice(&0u64.to_be_bytes()); // modification
            p.extend_from_slice(&self.timescale.to_be_bytes());
            p.extend_from_slice(&self.duration.to_be_bytes());
        } else {
            p.extend_from_slice(&0u32.to_be_bytes());
            p.extend_from_slice(&0u32.to_be_bytes());
            p.extend_from_slice(&self.timescale.to_be_bytes());
            p.extend_from_slice(&(self.duration as u32).to_be_bytes());
        }
        p.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate
        p.extend_from_slice(&0x0100u16.to_be_bytes()); // volume
        p.extend_from_slice(&[0u8; 10]); // reserved
        p.extend_from_slice(&MATRIX);
        p.extend_from_slice(&[0u8; 24]); // pre_defined
        p.extend_from_slice(&2u32.to_be_bytes()); // next track id
        full_box(b"mvhd", self.version(), &p)
    }

    fn tkhd(&self) -> Vec<u8> {
        let mut p = Vec::new();
        if self.v1_headers {
            p.extend_from_slice(&0u64.to_be_bytes());
            p.extend_from_slice(&0u64.to_be_bytes());
            p.extend_from_slice(&1u32.to_be_bytes()); // track id
            p.extend_from_slice(&0u32.to_be_bytes()); // reserved
            p.extend_from_slice(&self.duration.to_be_bytes());
        } else {
            p.extend_from_slice(&0u32.to_be_bytes());
            p.extend_from_slice(&0u32.to_be_bytes());
            p.extend_from_slice(&1u32.to_be_bytes());
            p.extend_from_slice(&0u32.to_be_bytes());
            p.extend_from_slice(&(self.duration as u32).to_be_bytes());
        }
        p.extend_from_slice(&[0u8; 8]); // reserved
        p.extend_from_slice(&[0u8; 4]); // layer + alternate group
        p.extend_from_slice(&[0u8; 4]); // volume + reserved
        p.extend_from_slice(&MATRIX);
        p.extend_from_slice(&(640u32 << 16).to_be_bytes()); // width 16.16
        p.extend_from_slice(&(480u32 << 16).to_be_bytes()); // height 16.16
        full_box(b"tkhd", self.version(), &p)
    }

    fn mdhd(&self) -> Vec<u8> {
        let mut p = Vec::new();
        if self.v1_headers {
            p.extend_from_slice(&0u64.to_be_bytes());
            p.extend_from_slice(&0u64.to_be_bytes());
            p.extend_from_slice(&self.timescale.to_be_bytes());
            p.extend_from_slice(&self.duration.to_be_bytes());
        } else {
            p.extend_from_slice(&0u32.to_be_bytes());
            p.extend_from_slice(&0u32.to_be_bytes());
            p.extend_from_slice(&self.timescale.to_be_bytes());
            p.extend_from_slice(&(self.duration as u32).to_be_bytes());
        }
        p.extend_from_slice(&0x55C4u16.to_be_bytes()); // language "und"
        p.extend_from_slice(&0u16.to_be_bytes()); // pre_defined
        full_box(b"mdhd", self.version(), &p)
    }

    fn version(&self) -> u8 {
        if self.v1_headers { 1 } else { 0 }
    }

    fn hdlr(&self) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&0u32.to_be_bytes()); // pre_defined
        p.extend_from_slice(b"vide");
        p.extend_from_slice(&[0u8; 12]); // reserved
        p.extend_from_slice(b"VideoHandler\0");
        full_box(b"hdlr", 0, &p)
    }

    fn vmhd(&self) -> Vec<u8> {
        full_box(b"vmhd", 0, &[0u8; 8])
    }

    fn dinf(&self) -> Vec<u8> {
        let dref = full_box(b"dref", 0, &0u32.to_be_bytes());
        plain_box(b"dinf", &dref)
    }

    fn stsd(&self) -> Vec<u8> {
        let entry = plain_box(b"avc1", &[0u8; 78]);
        let mut p = 1u32.to_be_bytes().to_vec();
        p.extend_from_slice(&entry);
        full_box(b"stsd", 0, &p)
    }

    fn stsz(&self) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&self.uniform_size.to_be_bytes());
        p.extend_from_slice(&self.sample_count().to_be_bytes());
        if self.uniform_size == 0 {
            for &size in &self.sample_sizes {
                p.extend_from_slice(&size.to_be_bytes());
            }
        }
        full_box(b"stsz", 0, &p)
    }
}

pub fn stts_box(entries: &[(u32, u32)]) -> Vec<u8> {
    let mut p = (entries.len() as u32).to_be_bytes().to_vec();
    for &(count, delta) in entries {
        p.extend_from_slice(&count.to_be_bytes());
        p.extend_from_slice(&delta.to_be_bytes());
    }
    full_box(b"stts", 0, &p)
}

pub fn stss_box(samples: &[u32]) -> Vec<u8> {
    let mut p = (samples.len() as u32).to_be_bytes().to_vec();
    for &s in samples {
        p.extend_from_slice(&s.to_be_bytes());
    }
    full_box(b"stss", 0, &p)
}

pub fn ctts_box(entries: &[(u32, u32)]) -> Vec<u8> {
    let mut p = (entries.len() as u32).to_be_bytes().to_vec();
    for &(count, offset) in entries {
        p.extend_from_slice(&count.to_be_bytes());
        p.extend_from_slice(&offset.to_be_bytes());
    }
    full_box(b"ctts", 0, &p)
}

pub fn stsc_box(entries: &[(u32, u32, u32)]) -> Vec<u8> {
    let mut p = (entries.len() as u32).to_be_bytes().to_vec();
    for &(first_chunk, samples_per_chunk, id) in entries {
        p.extend_from_slice(&first_chunk.to_be_bytes());
        p.extend_from_slice(&samples_per_chunk.to_be_bytes());
        p.extend_from_slice(&id.to_be_bytes());
    }
    full_box(b"stsc", 0, &p)
}

pub fn stco_box(offsets: &[u32]) -> Vec<u8> {
    let mut p = (offsets.len() as u32).to_be_bytes().to_vec();
    for &o in offsets {
        p.extend_from_slice(&o.to_be_bytes());
    }
    full_box(b"stco", 0, &p)
}

pub fn co64_box(offsets: &[u64]) -> Vec<u8> {
    let mut p = (offsets.len() as u32).to_be_bytes().to_vec();
    for &o in offsets {
        p.extend_from_slice(&o.to_be_bytes());
    }
    full_box(b"co64", 0, &p)
}

/// Walks container atoms along a tag path and returns the final atom.
pub fn find_box<'a>(mut atoms: &'a [Atom], path: &[&[u8; 4]]) -> &'a Atom {
    let (last, inner) = path.split_last().expect("empty path");
    for tag in inner {
        let parent = atoms
            .iter()
            .find(|a| &a.hdr.typ.0 == *tag)
            .unwrap_or_else(|| panic!("no {} box", String::from_utf8_lossy(*tag)));
        match &parent.kind {
            AtomKind::Container(children) => atoms = children,
            other => panic!("{} is not a container: {:?}", String::from_utf8_lossy(*tag), other),
        }
    }
    atoms
        .iter()
        .find(|a| &a.hdr.typ.0 == *last)
        .unwrap_or_else(|| panic!("no {} box", String::from_utf8_lossy(*last)))
}
