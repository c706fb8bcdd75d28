//! On-disk structures of the CAT container.
//!
//! A CAT file is a header, two variable (interning) tables, a node tree keyed
//! by one-byte ASCII tags, the variable condition groups, the parameter data
//! region, and a NUL-separated string pool, zero-padded at the tail.

use bitflags::bitflags;
use num_enum::TryFromPrimitive;

use crate::bytes::{self, Reader, Writer, get_bits};

/// Files are padded with zero bytes to the next multiple of this.
pub const TAIL_ALIGN: usize = 1024;

/// Number of pad bytes appended after `len` content bytes. A full block is
/// written when the length is already aligned, matching the files the engine
/// ships with.
#[must_use]
pub fn tail_padding(len: usize) -> usize {
    TAIL_ALIGN - (len % TAIL_ALIGN)
}

/// Fixed-size file header. All fields are u32 in the configured byte order.
///
/// `counter_banks` is stored as its value minus one; the engine expects the
/// quirk and decoding keeps the raw stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub file_length: u32,
    pub p_data: u32,
    pub p_strings: u32,
    pub p_groups: u32,
    pub counter_banks: u32,
    pub counter_nodes: u32,
    pub counter_refs: u32,
    pub counter_leaves: u32,
}

impl Header {
    pub const SIZE: usize = 32;

    pub fn read(r: &mut Reader<'_>) -> Result<Self, bytes::Error> {
        Ok(Self {
            file_length: r.read_u32()?,
            p_data: r.read_u32()?,
            p_strings: r.read_u32()?,
            p_groups: r.read_u32()?,
            counter_banks: r.read_u32()?,
            counter_nodes: r.read_u32()?,
            counter_refs: r.read_u32()?,
            counter_leaves: r.read_u32()?,
        })
    }

    pub fn write(&self, w: &mut Writer) {
        w.write_u32(self.file_length);
        w.write_u32(self.p_data);
        w.write_u32(self.p_strings);
        w.write_u32(self.p_groups);
        w.write_u32(self.counter_banks);
        w.write_u32(self.counter_nodes);
        w.write_u32(self.counter_refs);
        w.write_u32(self.counter_leaves);
    }
}

/// Discriminating tag byte of a node-tree record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum NodeTag {
    /// Root bank: hash, conditions, children.
    Bank = b'b',
    /// Interior node: hash, conditions, tracks, children.
    Node = b'n',
    /// Leaf node: same layout as `Node` with a zero child count.
    Leaf = b'l',
    /// File reference, not transcluded.
    Reference = b'r',
    /// File reference, transcluded into the host file.
    Include = b'i',
}

impl NodeTag {
    /// Tags carrying a title hash and a condition list.
    #[must_use]
    pub fn has_conditions(self) -> bool {
        matches!(self, Self::Bank | Self::Node | Self::Leaf)
    }

    /// Tags carrying a track list (banks have none).
    #[must_use]
    pub fn has_tracks(self) -> bool {
        matches!(self, Self::Node | Self::Leaf)
    }

    #[must_use]
    pub fn is_reference(self) -> bool {
        matches!(self, Self::Reference | Self::Include)
    }
}

bitflags! {
    /// Low three bits of a track parameter header word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParamFlags: u16 {
        /// Another parameter follows this one.
        const MORE = 0x0001;
        /// Meaning unknown; preserved on decode, never set on encode.
        const UNK = 0x0002;
        /// Value is 4 bytes; clear means a 1-byte boolean.
        const WIDE = 0x0004;
    }
}

/// Decoded track parameter header: three flag bits and a 13-bit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamHeader {
    pub flags: ParamFlags,
    pub id: u16,
}

impl ParamHeader {
    pub const MAX_ID: u16 = (1 << 13) - 1;

    #[must_use]
    pub fn decode(word: u16) -> Self {
        Self {
            flags: ParamFlags::from_bits_truncate(word),
            id: get_bits(u32::from(word), 3, 16) as u16,
        }
    }

    #[must_use]
    pub fn encode(self) -> u16 {
        (self.id << 3) | self.flags.bits()
    }

    #[must_use]
    pub fn more(self) -> bool {
        self.flags.contains(ParamFlags::MORE)
    }

    #[must_use]
    pub fn wide(self) -> bool {
        self.flags.contains(ParamFlags::WIDE)
    }

    #[must_use]
    pub fn value_len(self) -> usize {
        if self.wide() { 4 } else { 1 }
    }
}

/// One entry of a variable (interning) table.
///
/// `target_offset` points at the interned value (string-pool relative for
/// strings, `p_groups`-relative for condition groups); each `var_offsets[i]`
/// is a `p_data`-relative 4-byte hole inside a parameter that receives the
/// target offset during fix-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarEntry {
    pub target_offset: u32,
    pub var_offsets: Vec<u32>,
}

impl VarEntry {
    pub fn read(r: &mut Reader<'_>) -> Result<Self, bytes::Error> {
        let target_offset = r.read_u32()?;
        let n = r.read_u16()?;
        let mut var_offsets = Vec::with_capacity(usize::from(n));
        for _ in 0..n {
            var_offsets.push(r.read_u32()?);
        }
        Ok(Self {
            target_offset,
            var_offsets,
        })
    }
}

/// Count-prefixed run of [`VarEntry`] records.
pub fn read_var_table(r: &mut Reader<'_>) -> Result<Vec<VarEntry>, bytes::Error> {
    let count = r.read_u32()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(VarEntry::read(r)?);
    }
    Ok(entries)
}
