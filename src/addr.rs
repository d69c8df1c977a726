use crate::config::Geometry;

/// An address split into its cache fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr {
    pub offset: u64,
    pub set: usize,
    pub tag: u64,
}

#[derive(Debug, Clone, Copy)]
struct BitSection {
    shift: u32,
    mask: u64,
}

impl BitSection {
    fn new(shift: u32, width: u32) -> Self {
        let mask = if width >= u64::BITS {
            !0
        } else {
            (1 << width) - 1
        };
        BitSection { shift, mask }
    }

    fn apply(&self, num: u64) -> u64 {
        (num >> self.shift) & self.mask
    }
}

/// Splits addresses into offset, set index and tag by masking.
///
/// Bits above `offset + index + tag` are dropped, so a 64-bit trace address
/// is decoded by its low 32 bits only.
#[derive(Debug, Clone, Copy)]
pub struct AddrDecoder {
    offset_sec: BitSection,
    set_sec: BitSection,
    tag_sec: BitSection,
}

impl AddrDecoder {
    pub fn new(geometry: &Geometry) -> Self {
        let set_shift = geometry.offset_bits;
        let tag_shift = set_shift + geometry.index_bits;
        AddrDecoder {
            offset_sec: BitSection::new(0, geometry.offset_bits),
            set_sec: BitSection::new(set_shift, geometry.index_bits),
            tag_sec: BitSection::new(tag_shift, geometry.tag_bits),
        }
    }

    pub fn split(&self, addr: u64) -> Addr {
        Addr {
            offset: self.offset_sec.apply(addr),
            // index_bits <= 32, so the set always fits
            set: self.set_sec.apply(addr) as usize,
            tag: self.tag_sec.apply(addr),
        }
    }
}
