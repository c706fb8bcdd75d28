use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::{error, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    UnexpectedEof { offset: usize },
    InvalidUtf8 { offset: usize },
    PatchOutOfBounds { offset: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof { offset } => write!(f, "unexpected end of data at {offset}"),
            Self::InvalidUtf8 { offset } => write!(f, "invalid utf-8 in string at {offset}"),
            Self::PatchOutOfBounds { offset } => write!(f, "patch position {offset} out of bounds"),
        }
    }
}

impl error::Error for Error {}

/// Byte order of every multi-byte read and write, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Extract bits `[start, end)` of the low bits of `v`.
#[must_use]
pub fn get_bits(v: u32, start: u32, end: u32) -> u32 {
    let mask = if end >= 32 { u32::MAX } else { (1u32 << end) - 1 };
    (v & mask) >> start
}

/// Positional reader over a fully loaded file.
#[derive(Clone)]
pub struct Reader<'input> {
    buffer: &'input [u8],
    offset: usize,
    endian: Endian,
}

impl<'input> Reader<'input> {
    #[must_use]
    pub fn new(buffer: &'input [u8]) -> Self {
        Self::with_endian(buffer, Endian::Little)
    }

    #[must_use]
    pub fn with_endian(buffer: &'input [u8], endian: Endian) -> Self {
        Self {
            buffer,
            offset: 0,
            endian,
        }
    }

    #[must_use]
    pub fn pos(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.offset >= self.buffer.len()
    }

    pub fn seek(&mut self, pos: usize) {
        self.offset = pos;
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'input [u8], Error> {
        let end = self.offset + count;
        let bytes = self.buffer.get(self.offset..end).ok_or(Error::UnexpectedEof {
            offset: self.offset,
        })?;
        self.offset = end;
        Ok(bytes)
    }

    pub fn read_array4(&mut self) -> Result<[u8; 4], Error> {
        let bytes = self.read_bytes(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        let b = self.read_bytes(2)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_u16(b),
            Endian::Big => BigEndian::read_u16(b),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        let b = self.read_bytes(4)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_u32(b),
            Endian::Big => BigEndian::read_u32(b),
        })
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        self.read_u32().map(|v| v as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        self.read_u32().map(f32::from_bits)
    }

    /// Run of bytes up to (and consuming) the next NUL.
    pub fn read_cstring(&mut self) -> Result<String, Error> {
        let start = self.offset;
        let rest = &self.buffer[start.min(self.buffer.len())..];
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let bytes = &rest[..len];
        // consume the terminator when present
        self.offset = start + len + usize::from(len < rest.len());
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8 { offset: start })
    }
}

/// Growable output buffer with positional back-patching.
pub struct Writer {
    buffer: Vec<u8>,
    endian: Endian,
}

impl Writer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_endian(Endian::Little)
    }

    #[must_use]
    pub fn with_endian(endian: Endian) -> Self {
        Self {
            buffer: Vec::new(),
            endian,
        }
    }

    /// Current write position, which is always the end of the buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.buffer.len()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buffer.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        let mut b = [0u8; 2];
        match self.endian {
            Endian::Little => LittleEndian::write_u16(&mut b, v),
            Endian::Big => BigEndian::write_u16(&mut b, v),
        }
        self.buffer.extend_from_slice(&b);
    }

    pub fn write_u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        match self.endian {
            Endian::Little => LittleEndian::write_u32(&mut b, v),
            Endian::Big => BigEndian::write_u32(&mut b, v),
        }
        self.buffer.extend_from_slice(&b);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_u32(v as u32);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    /// String bytes followed by NUL.
    pub fn write_cstring(&mut self, s: &str) {
        self.buffer.extend_from_slice(s.as_bytes());
        self.buffer.push(0);
    }

    pub fn pad_zero(&mut self, count: usize) {
        self.buffer.resize(self.buffer.len() + count, 0);
    }

    /// Rewrite a previously emitted 4-byte slot in place.
    pub fn patch_u32(&mut self, pos: usize, v: u32) -> Result<(), Error> {
        let slot = self
            .buffer
            .get_mut(pos..pos + 4)
            .ok_or(Error::PatchOutOfBounds { offset: pos })?;
        match self.endian {
            Endian::Little => LittleEndian::write_u32(slot, v),
            Endian::Big => BigEndian::write_u32(slot, v),
        }
        Ok(())
    }

    /// Rewrite a run of previously emitted bytes in place.
    pub fn patch_bytes(&mut self, pos: usize, bytes: &[u8]) -> Result<(), Error> {
        let slot = self
            .buffer
            .get_mut(pos..pos + bytes.len())
            .ok_or(Error::PatchOutOfBounds { offset: pos })?;
        slot.copy_from_slice(bytes);
        Ok(())
    }

    pub fn patch_u16(&mut self, pos: usize, v: u16) -> Result<(), Error> {
        let slot = self
            .buffer
            .get_mut(pos..pos + 2)
            .ok_or(Error::PatchOutOfBounds { offset: pos })?;
        match self.endian {
            Endian::Little => LittleEndian::write_u16(slot, v),
            Endian::Big => BigEndian::write_u16(slot, v),
        }
        Ok(())
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn test_reader_scalars() {
    let data = [0x01, 0x02, 0x03, 0x04, 0xff, 0x7f, b'h', b'i', 0x00, 0xaa];
    let mut r = Reader::new(&data);
    assert_eq!(0x04030201, r.read_u32().unwrap());
    assert_eq!(0x7fff, r.read_u16().unwrap());
    assert_eq!("hi", r.read_cstring().unwrap());
    assert_eq!(0xaa, r.read_u8().unwrap());
    assert!(r.is_at_end());
    assert!(r.read_u8().is_err());

    let mut r = Reader::with_endian(&data, Endian::Big);
    assert_eq!(0x01020304, r.read_u32().unwrap());
    assert_eq!(0xff7f, r.read_u16().unwrap());
}

#[test]
fn test_reader_cstring_at_end() {
    // no terminator before EOF: the run ends at the buffer edge
    let mut r = Reader::new(b"abc");
    assert_eq!("abc", r.read_cstring().unwrap());
    assert!(r.is_at_end());
    assert_eq!("", r.read_cstring().unwrap());
}

#[test]
fn test_writer_patching() {
    let mut w = Writer::new();
    w.write_u32(0);
    w.write_u16(0xbeef);
    let pos = w.pos();
    w.write_u32(0);
    w.patch_u32(0, 0x11223344).unwrap();
    w.patch_u32(pos, 0xdeadbeef).unwrap();
    assert!(w.patch_u32(pos + 1, 0).is_err());
    assert_eq!(
        vec![0x44, 0x33, 0x22, 0x11, 0xef, 0xbe, 0xef, 0xbe, 0xad, 0xde],
        w.into_bytes()
    );
}

#[test]
fn test_get_bits() {
    assert_eq!(1, get_bits(0b0101, 0, 1));
    assert_eq!(0b10, get_bits(0b0101, 1, 3));
    assert_eq!(0x1fff, get_bits(0xffff, 3, 16));
    assert_eq!(0, get_bits(0b0101, 1, 2));
}

#[test]
fn test_f32_roundtrip() {
    let mut w = Writer::new();
    w.write_f32(1.5);
    w.write_i32(-7);
    let bytes = w.into_bytes();
    let mut r = Reader::new(&bytes);
    assert_eq!(1.5, r.read_f32().unwrap());
    assert_eq!(-7, r.read_i32().unwrap());
}
