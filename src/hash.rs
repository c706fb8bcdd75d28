//! Name hashing for CAT titles and values.
//!
//! The engine hashes the upper-cased name with a 0x83 multiply-accumulate,
//! masks to 31 bits, and sets bit 31 only for container titles (banks and
//! nodes). Hashes are stored in the file as little-endian bytes regardless of
//! the configured byte order, so they are handled here as 4-byte arrays in
//! file order.

fn fold(s: &str, title: bool) -> u32 {
    let mut h: i32 = 0;
    for &b in s.to_uppercase().as_bytes() {
        h = h.wrapping_mul(0x83).wrapping_add(i32::from(b));
    }
    let mut h = (h as u32) & 0x7fff_ffff;
    if title {
        h |= 0x8000_0000;
    }
    h
}

/// Hash of a Bank/Node container name (bit 31 set).
#[must_use]
pub fn hash_title(s: &str) -> [u8; 4] {
    fold(s, true).to_le_bytes()
}

/// Hash of a condition/track title or string value (bit 31 clear).
#[must_use]
pub fn hash_value(s: &str) -> [u8; 4] {
    fold(s, false).to_le_bytes()
}

/// Display form: `0x` followed by the four file-order bytes, upper-case hex.
#[must_use]
pub fn pretty(bytes: [u8; 4]) -> String {
    format!(
        "0x{:02X}{:02X}{:02X}{:02X}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

/// Parse the display form back into file-order bytes.
#[must_use]
pub fn parse_pretty(s: &str) -> Option<[u8; 4]> {
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if hex.len() != 8 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let mut out = [0u8; 4];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

#[test]
fn test_hash_laws() {
    for s in ["Animation", "C_PLAYER\\PICKUP", "", "Nemesis"] {
        let t = u32::from_le_bytes(hash_title(s));
        let v = u32::from_le_bytes(hash_value(s));
        assert_eq!(0x8000_0000, t & 0x8000_0000);
        assert_eq!(0, v & 0x8000_0000);
        assert_eq!(t & 0x7fff_ffff, v & 0x7fff_ffff);
    }
}

#[test]
fn test_hash_case_insensitive() {
    assert_eq!(hash_value("animation"), hash_value("ANIMATION"));
    assert_eq!(hash_title("Nemesis"), hash_title("nEMESIS"));
}

#[test]
fn test_hash_known_value() {
    // single char: h = 'A' = 65
    assert_eq!([65, 0, 0, 0], hash_value("a"));
    // two chars: 65 * 0x83 + 66 = 8581
    assert_eq!(8581u32.to_le_bytes(), hash_value("ab"));
}

#[test]
fn test_pretty_roundtrip() {
    let b = [0x12, 0xef, 0x00, 0x80];
    assert_eq!("0x12EF0080", pretty(b));
    assert_eq!(Some(b), parse_pretty("0x12EF0080"));
    assert_eq!(Some(b), parse_pretty("0x12ef0080"));
    assert_eq!(None, parse_pretty("0x12EF00"));
    assert_eq!(None, parse_pretty("12EF0080"));
    assert_eq!(None, parse_pretty("0x12EF00GG"));
}
