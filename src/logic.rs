//! The logical tree shared by the decoder, the encoder and the text layer.

use crate::hash;

/// Number of digits in generated numeric parameter names (`[00042]`).
pub const PARAM_NAME_DIGITS: usize = 5;

/// A name that may or may not have been resolved from its 32-bit hash.
///
/// Unresolved hashes keep their raw file-order bytes so they survive a
/// decode/encode round trip bit-exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Title {
    Name(String),
    Hash([u8; 4]),
}

impl Title {
    /// Interpret MACT title text: `0x`-form becomes raw hash bytes.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match hash::parse_pretty(text) {
            Some(bytes) => Self::Hash(bytes),
            None => Self::Name(text.to_string()),
        }
    }

    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Name(name) => name.clone(),
            Self::Hash(bytes) => hash::pretty(*bytes),
        }
    }

    /// File bytes when used as a condition/track title or string value.
    #[must_use]
    pub fn value_hash(&self) -> [u8; 4] {
        match self {
            Self::Name(name) => hash::hash_value(name),
            Self::Hash(bytes) => *bytes,
        }
    }

    /// File bytes when used as a Bank/Node container title.
    #[must_use]
    pub fn title_hash(&self) -> [u8; 4] {
        match self {
            Self::Name(name) => hash::hash_title(name),
            Self::Hash(bytes) => *bytes,
        }
    }
}

impl Default for Title {
    fn default() -> Self {
        Self::Name(String::new())
    }
}

/// A node of the container tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    Bank(Container),
    Node(Container),
    FileReference(FileRef),
}

impl Tree {
    /// Nodes of the subtree in prefix order.
    pub fn walk(&self) -> Vec<&Tree> {
        let mut nodes = vec![self];
        if let Self::Bank(c) | Self::Node(c) = self {
            for child in &c.children {
                nodes.extend(child.walk());
            }
        }
        nodes
    }
}

/// Payload of a `Bank` or `Node`: a condition group, tracks and children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Container {
    pub title: Title,
    pub conditions: Vec<Logic>,
    pub tracks: Vec<Logic>,
    pub children: Vec<Tree>,
}

/// A `FileReference` record naming another CAT file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub file_name: String,
    pub path: String,
    pub include: bool,
}

/// A condition or a track: a titled, ordered parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct Logic {
    pub title: Title,
    pub params: Vec<Param>,
}

/// One parameter. `id` is populated by the decoder and, on the encode side,
/// whenever it can be recovered from the name; the template database fills
/// the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub id: Option<u16>,
    pub name: String,
    pub value: Value,
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    Bytes([u8; 4]),
    Str(String),
    HashedStr(String),
    /// Inline condition group. May be empty.
    Group(Vec<Logic>),
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Str(_) => ValueKind::Str,
            Self::HashedStr(_) => ValueKind::HashedStr,
            Self::Group(_) => ValueKind::Group,
        }
    }
}

/// The value types a parameter can carry, as named by template databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Bytes,
    Str,
    HashedStr,
    Group,
    None,
}

impl ValueKind {
    /// Infer the type of a raw MACT value token.
    #[must_use]
    pub fn infer(text: &str) -> Self {
        if text.starts_with("0x") || text.starts_with("0X") {
            if text.len() > 4 { Self::Bytes } else { Self::Bool }
        } else if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
            Self::Bool
        } else if text.starts_with("h\"") || text.starts_with("h'") {
            Self::HashedStr
        } else if text.starts_with('"') || text.starts_with('\'') {
            Self::Str
        } else if text.contains('.') {
            Self::Float
        } else {
            Self::Int
        }
    }

    /// Template database spelling.
    #[must_use]
    pub fn db_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bytes => "bytes",
            Self::Str => "string",
            Self::HashedStr => "hashed_string",
            Self::Group => "cg",
            Self::None => "none",
        }
    }

    #[must_use]
    pub fn from_db_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "int" => Self::Int,
            "float" => Self::Float,
            "bytes" => Self::Bytes,
            "string" => Self::Str,
            "hashed_string" => Self::HashedStr,
            "cg" => Self::Group,
            _ => return None,
        })
    }
}

/// `[00042]`-style generated name for a parameter without a known one.
#[must_use]
pub fn format_param_name(id: u16) -> String {
    format!("[{:0width$}]", id, width = PARAM_NAME_DIGITS)
}

/// Recover a numeric id from `[00042]` or `param00042` names.
#[must_use]
pub fn param_id_from_name(name: &str) -> Option<u16> {
    if !(name.starts_with('[') || name.starts_with("param")) {
        return None;
    }
    let digits: String = name.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_parse() {
        assert_eq!(Title::Name("Nemesis".into()), Title::parse("Nemesis"));
        assert_eq!(
            Title::Hash([0xaa, 0xbb, 0xcc, 0x80]),
            Title::parse("0xAABBCC80")
        );
        // too short to be a hash
        assert_eq!(Title::Name("0xAABB".into()), Title::parse("0xAABB"));
    }

    #[test]
    fn title_hashes_pass_raw_bytes_through() {
        let t = Title::Hash([1, 2, 3, 4]);
        assert_eq!([1, 2, 3, 4], t.value_hash());
        assert_eq!([1, 2, 3, 4], t.title_hash());
    }

    #[test]
    fn value_kind_inference() {
        assert_eq!(ValueKind::Bytes, ValueKind::infer("0x01020304"));
        assert_eq!(ValueKind::Bool, ValueKind::infer("0x01"));
        assert_eq!(ValueKind::Bool, ValueKind::infer("TRUE"));
        assert_eq!(ValueKind::Bool, ValueKind::infer("false"));
        assert_eq!(ValueKind::Str, ValueKind::infer("\"C_PLAYER\\PICKUP\""));
        assert_eq!(ValueKind::HashedStr, ValueKind::infer("h\"IDLE\""));
        assert_eq!(ValueKind::Float, ValueKind::infer("1.5"));
        assert_eq!(ValueKind::Int, ValueKind::infer("-12"));
    }

    #[test]
    fn param_names() {
        assert_eq!("[00042]", format_param_name(42));
        assert_eq!(Some(42), param_id_from_name("[00042]"));
        assert_eq!(Some(7), param_id_from_name("param00007"));
        assert_eq!(None, param_id_from_name("state"));
        assert_eq!(None, param_id_from_name("param"));
    }

    #[test]
    fn walk_order() {
        let leaf = Tree::Node(Container {
            title: Title::Name("leaf".into()),
            ..Container::default()
        });
        let bank = Tree::Bank(Container {
            title: Title::Name("root".into()),
            children: vec![leaf],
            ..Container::default()
        });
        let names: Vec<String> = bank
            .walk()
            .iter()
            .map(|n| match n {
                Tree::Bank(c) | Tree::Node(c) => c.title.display(),
                Tree::FileReference(r) => r.file_name.clone(),
            })
            .collect();
        assert_eq!(vec!["root".to_string(), "leaf".to_string()], names);
    }
}
