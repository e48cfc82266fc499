use crate::boxes::FourCC;

/// Typed view over the closed set of boxes the rewriter cares about.
///
/// Anything not in this list becomes `KnownBox::Unknown(fourcc)` and is
/// carried as an opaque leaf that never reaches the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownBox {
    // File-level / top-level
    Ftyp,
    Moov,
    Mdat,

    // Recursed containers
    Trak,
    Mdia,
    Minf,
    Stbl,

    // Containers parsed but never emitted
    Edts,
    Mvex,
    Moof,
    Traf,
    Mfra,
    Skip,
    Udta,
    Meta,
    Ipro,
    Sinf,
    Fiin,
    Paen,
    Meco,

    // Headers with a duration to trim
    Mvhd,
    Tkhd,
    Mdhd,

    // Verbatim pass-through leaves
    Hdlr,
    Vmhd,
    Smhd,
    Dinf,
    Stsd,

    // Sample tables that get rewritten
    Stts,
    Stss,
    Ctts,
    Stsc,
    Stsz,
    Stco,
    Co64,

    // Compressed movie header; rejected outright
    Cmov,

    // Anything else
    Unknown(FourCC),
}

impl From<FourCC> for KnownBox {
    fn from(cc: FourCC) -> Self {
        match &cc.0 {
            b"ftyp" => KnownBox::Ftyp,
            b"moov" => KnownBox::Moov,
            b"mdat" => KnownBox::Mdat,

            b"trak" => KnownBox::Trak,
            b"mdia" => KnownBox::Mdia,
            b"minf" => KnownBox::Minf,
            b"stbl" => KnownBox::Stbl,

            b"edts" => KnownBox::Edts,
            b"mvex" => KnownBox::Mvex,
            b"moof" => KnownBox::Moof,
            b"traf" => KnownBox::Traf,
            b"mfra" => KnownBox::Mfra,
            b"skip" => KnownBox::Skip,
            b"udta" => KnownBox::Udta,
            b"meta" => KnownBox::Meta,
            b"ipro" => KnownBox::Ipro,
            b"sinf" => KnownBox::Sinf,
            b"fiin" => KnownBox::Fiin,
            b"paen" => KnownBox::Paen,
            b"meco" => KnownBox::Meco,

            b"mvhd" => KnownBox::Mvhd,
            b"tkhd" => KnownBox::Tkhd,
            b"mdhd" => KnownBox::Mdhd,

            b"hdlr" => KnownBox::Hdlr,
            b"vmhd" => KnownBox::Vmhd,
            b"smhd" => KnownBox::Smhd,
            b"dinf" => KnownBox::Dinf,
            b"stsd" => KnownBox::Stsd,

            b"stts" => KnownBox::Stts,
            b"stss" => KnownBox::Stss,
            b"ctts" => KnownBox::Ctts,
            b"stsc" => KnownBox::Stsc,
            b"stsz" => KnownBox::Stsz,
            b"stco" => KnownBox::Stco,
            b"co64" => KnownBox::Co64,

            b"cmov" => KnownBox::Cmov,

            _ => KnownBox::Unknown(cc),
        }
    }
}

impl KnownBox {
    /// Returns `true` if this box type is parsed by recursing into child
    /// boxes. `dinf` is deliberately absent: it is copied as one verbatim
    /// blob, so re-deriving its size from children would corrupt it.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            KnownBox::Moov
                | KnownBox::Trak
                | KnownBox::Mdia
                | KnownBox::Minf
                | KnownBox::Stbl
                | KnownBox::Edts
                | KnownBox::Mvex
                | KnownBox::Moof
                | KnownBox::Traf
                | KnownBox::Mfra
                | KnownBox::Skip
                | KnownBox::Udta
                | KnownBox::Meta
                | KnownBox::Ipro
                | KnownBox::Sinf
                | KnownBox::Fiin
                | KnownBox::Paen
                | KnownBox::Meco
        )
    }

    /// Returns `true` for the containers that survive into the output and
    /// participate in the ordered update/emit traversal.
    pub fn is_emitted_container(&self) -> bool {
        matches!(
            self,
            KnownBox::Moov | KnownBox::Trak | KnownBox::Mdia | KnownBox::Minf | KnownBox::Stbl
        )
    }

    /// Returns `true` for boxes copied byte-for-byte into the output.
    pub fn is_passthrough(&self) -> bool {
        matches!(
            self,
            KnownBox::Ftyp
                | KnownBox::Hdlr
                | KnownBox::Vmhd
                | KnownBox::Smhd
                | KnownBox::Dinf
                | KnownBox::Stsd
        )
    }
}
