//! CAT binary decoding.
//!
//! Parsing runs front to back: header, the two variable tables, the node
//! tree, the variable condition groups, then the parameter region and string
//! pool are visited through the offsets collected on the way. Optimized
//! tracks are expanded into self-contained parameter lists before the logic
//! tree is built.

use std::collections::HashSet;
use std::{error, fmt};

use log::{debug, warn};

use crate::bytes::{self, Endian, Reader};
use crate::cat::{Header, NodeTag, ParamFlags, ParamHeader, VarEntry, read_var_table};
use crate::db::Databases;
use crate::logic::{
    Container, FileRef, Logic, Param, Title, Tree, Value, ValueKind, format_param_name,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Bytes(bytes::Error),
    BadTag { tag: u8, offset: usize },
    EmptyCondition { offset: u32 },
    NoOptimizationTarget { offset: u32, target: u32 },
    OptimizationCycle { offset: u32 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(err) => err.fmt(f),
            Self::BadTag { tag, offset } => {
                write!(f, "unknown node tag 0x{tag:02x} at {offset}")
            }
            Self::EmptyCondition { offset } => {
                write!(f, "condition at data offset {offset} has no parameter slots")
            }
            Self::NoOptimizationTarget { offset, target } => write!(
                f,
                "track at data offset {offset} inherits from missing track at {target}"
            ),
            Self::OptimizationCycle { offset } => {
                write!(f, "optimization chain from data offset {offset} does not terminate")
            }
        }
    }
}

impl error::Error for Error {}

impl From<bytes::Error> for Error {
    fn from(err: bytes::Error) -> Self {
        Self::Bytes(err)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    pub endian: Endian,
}

/// Where a parameter's display type came from. Higher sources beat lower
/// ones; disagreements are logged so round-trip tests can reason about them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    VariableTable,
    BitHeader,
    Template,
    Guess,
}

/// Decode a whole CAT file into a logic tree.
pub fn decode(data: &[u8], db: &Databases, options: &DecodeOptions) -> Result<Tree, Error> {
    let (file, tree) = parse_file(data, options)?;
    let builder = TreeBuilder {
        file: &file,
        db,
        endian: options.endian,
        data,
    };
    Ok(builder.build_tree(&tree))
}

/// A decoded condition or track as seen by template generation: the raw
/// title hash plus per-parameter type evidence.
#[derive(Debug, Clone)]
pub struct LogicObservation {
    pub hash: [u8; 4],
    pub params: Vec<ParamObservation>,
}

#[derive(Debug, Clone)]
pub struct ParamObservation {
    pub id: u16,
    /// Type evidence from the file itself (variable tables or the size bit);
    /// `None` means the emitter has to guess from the value.
    pub kind: Option<ValueKind>,
    pub value: [u8; 4],
}

/// Everything one file contributes to template generation.
#[derive(Debug, Clone, Default)]
pub struct Observations {
    pub conditions: Vec<LogicObservation>,
    pub tracks: Vec<LogicObservation>,
}

/// Collect template observations without building a logic tree.
pub fn observe(data: &[u8], options: &DecodeOptions) -> Result<Observations, Error> {
    let (file, _) = parse_file(data, options)?;
    let observe_blob = |blob: &LogicBlob, track: bool| LogicObservation {
        hash: blob.hash,
        params: blob
            .params
            .iter()
            .map(|p| ParamObservation {
                id: p.id,
                kind: if track && !p.wide {
                    Some(ValueKind::Bool)
                } else {
                    file.table_kind(p.offset)
                },
                value: p.value,
            })
            .collect(),
    };
    Ok(Observations {
        conditions: file.conditions.iter().map(|b| observe_blob(b, false)).collect(),
        tracks: file.tracks.iter().map(|b| observe_blob(b, true)).collect(),
    })
}

fn parse_file(data: &[u8], options: &DecodeOptions) -> Result<(CatFile, RawNode), Error> {
    let mut r = Reader::with_endian(data, options.endian);
    let header = Header::read(&mut r)?;
    let string_vars = read_var_table(&mut r)?;
    let group_vars = read_var_table(&mut r)?;

    let tree = read_node(&mut r)?;

    r.seek(header.p_groups as usize);
    let mut var_groups = Vec::with_capacity(group_vars.len());
    for _ in 0..group_vars.len() {
        let offset = r.pos() as u32;
        let n = r.read_u8()?;
        let mut condition_offsets = Vec::with_capacity(usize::from(n));
        for _ in 0..n {
            condition_offsets.push(r.read_u32()?);
        }
        var_groups.push(VarGroup {
            offset,
            condition_offsets,
        });
    }

    let mut file = CatFile {
        header,
        string_vars,
        group_vars,
        var_groups,
        conditions: Vec::new(),
        tracks: Vec::new(),
        strings: Vec::new(),
    };
    file.read_conditions(&mut r, &tree)?;
    file.read_tracks(&mut r)?;
    file.unoptimize_tracks()?;
    file.read_strings(&mut r)?;
    Ok((file, tree))
}

/// Raw node-tree record, offsets still unresolved.
#[derive(Debug)]
struct RawNode {
    tag: NodeTag,
    hash: [u8; 4],
    file_offset: u32,
    path_offset: u32,
    condition_offsets: Vec<u32>,
    track_offsets: Vec<u32>,
    children: Vec<RawNode>,
}

impl RawNode {
    fn walk(&self) -> Vec<&RawNode> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.walk());
        }
        nodes
    }
}

fn read_node(r: &mut Reader<'_>) -> Result<RawNode, Error> {
    let offset = r.pos();
    let byte = r.read_u8()?;
    let tag = NodeTag::try_from(byte).map_err(|_| Error::BadTag { tag: byte, offset })?;

    let mut node = RawNode {
        tag,
        hash: [0; 4],
        file_offset: 0,
        path_offset: 0,
        condition_offsets: Vec::new(),
        track_offsets: Vec::new(),
        children: Vec::new(),
    };
    if tag.has_conditions() {
        node.hash = r.read_array4()?;
        let n = r.read_u8()?;
        for _ in 0..n {
            node.condition_offsets.push(r.read_u32()?);
        }
    }
    if tag.has_tracks() {
        let n = r.read_u8()?;
        for _ in 0..n {
            node.track_offsets.push(r.read_u32()?);
        }
    }
    if tag.is_reference() {
        node.file_offset = r.read_u32()?;
        node.path_offset = r.read_u32()?;
    }
    if tag.has_conditions() {
        let n = r.read_u16()?;
        for _ in 0..n {
            node.children.push(read_node(r)?);
        }
    }
    Ok(node)
}

/// One variable condition group as stored at `p_groups`.
#[derive(Debug)]
struct VarGroup {
    /// Absolute file position of the record.
    offset: u32,
    condition_offsets: Vec<u32>,
}

/// A decoded condition or track blob, merged by data offset.
#[derive(Debug, Clone)]
struct LogicBlob {
    offset: u32,
    hash: [u8; 4],
    opti_offset: u16,
    params: Vec<RawParam>,
}

#[derive(Debug, Clone)]
struct RawParam {
    /// `p_data`-relative offset of the value cell.
    offset: u32,
    id: u16,
    /// Raw flag bits for track params; conditions carry none.
    #[allow(dead_code)]
    flags: ParamFlags,
    wide: bool,
    value: [u8; 4],
}

struct CatFile {
    header: Header,
    string_vars: Vec<VarEntry>,
    group_vars: Vec<VarEntry>,
    var_groups: Vec<VarGroup>,
    conditions: Vec<LogicBlob>,
    tracks: Vec<LogicBlob>,
    /// Interned strings listed in the string-variable table, pool-relative.
    strings: Vec<(u32, String)>,
}

impl CatFile {
    /// Evidence from the variable tables: a param cell at this offset is a
    /// string or condition-group reference.
    fn table_kind(&self, offset: u32) -> Option<ValueKind> {
        if self
            .string_vars
            .iter()
            .any(|v| v.var_offsets.contains(&offset))
        {
            return Some(ValueKind::Str);
        }
        if self
            .group_vars
            .iter()
            .any(|v| v.var_offsets.contains(&offset))
        {
            return Some(ValueKind::Group);
        }
        None
    }

    /// Condition blobs have no length marker; the count of 4-byte slots is
    /// the distance to the next known condition start, the first track, or
    /// the end of the data region.
    fn read_conditions(&mut self, r: &mut Reader<'_>, tree: &RawNode) -> Result<(), Error> {
        let mut condition_offsets: Vec<u32> = Vec::new();
        for node in tree.walk() {
            for &offset in &node.condition_offsets {
                if !condition_offsets.contains(&offset) {
                    condition_offsets.push(offset);
                }
            }
        }
        for group in &self.var_groups {
            for &offset in &group.condition_offsets {
                if !condition_offsets.contains(&offset) {
                    condition_offsets.push(offset);
                }
            }
        }
        condition_offsets.sort_unstable();

        let mut track_offsets: Vec<u32> = Vec::new();
        for node in tree.walk() {
            for &offset in &node.track_offsets {
                if !track_offsets.contains(&offset) {
                    track_offsets.push(offset);
                }
            }
        }
        track_offsets.sort_unstable();

        let data_end = self.header.p_strings.saturating_sub(self.header.p_data);
        let condition_end = track_offsets.first().copied().unwrap_or(data_end);
        let mut boundaries = condition_offsets.clone();
        boundaries.push(condition_end);
        boundaries.sort_unstable();
        boundaries.dedup();

        for &offset in &condition_offsets {
            let end = boundaries
                .iter()
                .copied()
                .find(|&b| b > offset)
                .unwrap_or(condition_end);
            let slots = (end.saturating_sub(offset)) / 4;
            if slots == 0 {
                return Err(Error::EmptyCondition { offset });
            }
            r.seek((self.header.p_data + offset) as usize);
            let mut params = Vec::with_capacity(slots as usize);
            for k in 0..slots {
                let cell = (r.pos() as u32) - self.header.p_data;
                let value = r.read_array4()?;
                params.push(RawParam {
                    offset: cell,
                    id: k as u16,
                    flags: ParamFlags::empty(),
                    wide: true,
                    value,
                });
            }
            let hash = params[0].value;
            self.conditions.push(LogicBlob {
                offset,
                hash,
                opti_offset: 0,
                params,
            });
        }
        self.tracks = track_offsets
            .into_iter()
            .map(|offset| LogicBlob {
                offset,
                hash: [0; 4],
                opti_offset: 0,
                params: Vec::new(),
            })
            .collect();
        Ok(())
    }

    fn read_tracks(&mut self, r: &mut Reader<'_>) -> Result<(), Error> {
        for track in &mut self.tracks {
            r.seek((self.header.p_data + track.offset) as usize);
            track.opti_offset = r.read_u16()?;
            loop {
                let header = ParamHeader::decode(r.read_u16()?);
                let cell = (r.pos() as u32) - self.header.p_data;
                let value = if header.wide() {
                    r.read_array4()?
                } else {
                    [r.read_u8()?, 0, 0, 0]
                };
                track.params.push(RawParam {
                    offset: cell,
                    id: header.id,
                    flags: header.flags,
                    wide: header.wide(),
                    value,
                });
                if !header.more() {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Expand `opti_offset` inheritance chains so every track carries its
    /// full parameter set, then restore id order.
    fn unoptimize_tracks(&mut self) -> Result<(), Error> {
        for i in 0..self.tracks.len() {
            let start = self.tracks[i].offset;
            let mut target = match self.tracks[i].opti_offset {
                0 => None,
                opti => Some(start + u32::from(opti)),
            };
            let mut hops = 0usize;
            while let Some(target_offset) = target {
                if hops > self.tracks.len() {
                    return Err(Error::OptimizationCycle { offset: start });
                }
                hops += 1;
                let Some(j) = self.tracks.iter().position(|t| t.offset == target_offset) else {
                    return Err(Error::NoOptimizationTarget {
                        offset: start,
                        target: target_offset,
                    });
                };
                let adopted: Vec<RawParam> = self.tracks[j]
                    .params
                    .iter()
                    .filter(|p| !self.tracks[i].params.iter().any(|q| q.id == p.id))
                    .cloned()
                    .collect();
                self.tracks[i].params.extend(adopted);
                target = match self.tracks[j].opti_offset {
                    0 => None,
                    opti => Some(self.tracks[j].offset + u32::from(opti)),
                };
            }
            self.tracks[i].params.sort_by_key(|p| p.id);
            match self.tracks[i].params.iter().find(|p| p.id == 0) {
                Some(hash_param) => self.tracks[i].hash = hash_param.value,
                None => warn!(
                    "track at data offset {} has no id-0 hash parameter",
                    self.tracks[i].offset
                ),
            }
        }
        Ok(())
    }

    fn read_strings(&mut self, r: &mut Reader<'_>) -> Result<(), Error> {
        r.seek(self.header.p_strings as usize);
        for _ in 0..self.string_vars.len() {
            let offset = (r.pos() as u32) - self.header.p_strings;
            let string = r.read_cstring()?;
            self.strings.push((offset, string));
        }
        Ok(())
    }
}

/// Last-resort type guess from the 4-byte pattern, used only where no other
/// source resolves a parameter.
pub(crate) fn guess_kind(value: [u8; 4], endian: Endian) -> ValueKind {
    if value == [0; 4] {
        return ValueKind::Bytes;
    }
    let (as_int, as_float) = match endian {
        Endian::Little => (i32::from_le_bytes(value), f32::from_le_bytes(value)),
        Endian::Big => (i32::from_be_bytes(value), f32::from_be_bytes(value)),
    };
    if (-32768..=32767).contains(&as_int) {
        ValueKind::Int
    } else if (-2048.0..=2048.0).contains(&as_float) && !(-0.1..=0.1).contains(&as_float) {
        ValueKind::Float
    } else {
        ValueKind::Bytes
    }
}

struct TreeBuilder<'a> {
    file: &'a CatFile,
    db: &'a Databases,
    endian: Endian,
    data: &'a [u8],
}

impl TreeBuilder<'_> {
    fn build_tree(&self, raw: &RawNode) -> Tree {
        match raw.tag {
            NodeTag::Bank => Tree::Bank(self.build_container(raw)),
            NodeTag::Node | NodeTag::Leaf => Tree::Node(self.build_container(raw)),
            NodeTag::Reference | NodeTag::Include => Tree::FileReference(FileRef {
                file_name: self.string_at(raw.file_offset),
                path: self.string_at(raw.path_offset),
                include: raw.tag == NodeTag::Include,
            }),
        }
    }

    fn build_container(&self, raw: &RawNode) -> Container {
        let title = match self.db.title_hashes.lookup(raw.hash) {
            Some(name) => Title::Name(name.to_string()),
            None => Title::Hash(raw.hash),
        };
        let mut visiting = HashSet::new();
        Container {
            title,
            conditions: raw
                .condition_offsets
                .iter()
                .filter_map(|&offset| self.build_condition(offset, &mut visiting))
                .collect(),
            tracks: raw
                .track_offsets
                .iter()
                .filter_map(|&offset| self.build_track(offset))
                .collect(),
            children: raw.children.iter().map(|c| self.build_tree(c)).collect(),
        }
    }

    fn build_condition(&self, offset: u32, visiting: &mut HashSet<u32>) -> Option<Logic> {
        let Some(blob) = self.file.conditions.iter().find(|c| c.offset == offset) else {
            warn!("unable to match condition offset {offset}");
            return None;
        };
        if !visiting.insert(offset) {
            warn!("condition group cycle through data offset {offset}");
            return None;
        }
        let logic = self.build_logic(blob, &self.db.condition_templates, visiting);
        visiting.remove(&offset);
        Some(logic)
    }

    fn build_track(&self, offset: u32) -> Option<Logic> {
        let Some(blob) = self.file.tracks.iter().find(|t| t.offset == offset) else {
            warn!("unable to match track offset {offset}");
            return None;
        };
        let mut visiting = HashSet::new();
        Some(self.build_logic(blob, &self.db.track_templates, &mut visiting))
    }

    fn build_logic(
        &self,
        blob: &LogicBlob,
        templates: &crate::db::TemplateDb,
        visiting: &mut HashSet<u32>,
    ) -> Logic {
        let title = match self.db.logic_hashes.lookup(blob.hash) {
            Some(name) => Title::Name(name.to_string()),
            None => Title::Hash(blob.hash),
        };
        let title_text = title.display();
        let params = blob
            .params
            .iter()
            .filter(|p| p.id != 0)
            .map(|p| self.build_param(p, &title_text, templates, visiting))
            .collect();
        Logic { title, params }
    }

    fn build_param(
        &self,
        raw: &RawParam,
        logic_title: &str,
        templates: &crate::db::TemplateDb,
        visiting: &mut HashSet<u32>,
    ) -> Param {
        let db_param = templates.find_by_id(logic_title, raw.id);
        if db_param.is_none() && self.db.has_templates() {
            warn!("unable to match param id {} from {logic_title} with database", raw.id);
        }
        let name = db_param
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format_param_name(raw.id));

        let table_kind = self.file.table_kind(raw.offset);
        let (kind, source) = if let Some(kind) = table_kind {
            if let Some(db_param) = db_param {
                if db_param.kind != kind {
                    warn!(
                        "param id {} from {logic_title} is a {} by the variable tables \
                         but its template says {}",
                        raw.id,
                        kind.db_name(),
                        db_param.kind.db_name()
                    );
                }
            }
            (kind, Provenance::VariableTable)
        } else if !raw.wide {
            (ValueKind::Bool, Provenance::BitHeader)
        } else if let Some(db_param) = db_param {
            (db_param.kind, Provenance::Template)
        } else {
            (guess_kind(raw.value, self.endian), Provenance::Guess)
        };

        debug!(
            "param {} of {logic_title} typed {} via {source:?}",
            raw.id,
            kind.db_name()
        );
        let value = self.build_value(raw, kind, visiting);
        Param {
            id: Some(raw.id),
            name,
            value,
        }
    }

    fn build_value(&self, raw: &RawParam, kind: ValueKind, visiting: &mut HashSet<u32>) -> Value {
        match kind {
            ValueKind::Bool => Value::Bool(raw.value[0] != 0),
            ValueKind::Int => Value::Int(match self.endian {
                Endian::Little => i32::from_le_bytes(raw.value),
                Endian::Big => i32::from_be_bytes(raw.value),
            }),
            ValueKind::Float => Value::Float(match self.endian {
                Endian::Little => f32::from_le_bytes(raw.value),
                Endian::Big => f32::from_be_bytes(raw.value),
            }),
            ValueKind::Str => {
                if raw.value != [0; 4] {
                    // cell already carries a value: the string was hashed
                    Value::Bytes(raw.value)
                } else {
                    match self.interned_string(raw.offset) {
                        Some(s) => Value::Str(s),
                        None => {
                            warn!(
                                "unable to get string reference for param at data offset {}",
                                raw.offset
                            );
                            Value::Str(String::new())
                        }
                    }
                }
            }
            ValueKind::Group => Value::Group(self.group_conditions(raw.offset, visiting)),
            ValueKind::Bytes | ValueKind::HashedStr => {
                match self.db.generic_hashes.lookup(raw.value) {
                    Some(name) => Value::HashedStr(strip_quotes(name).to_string()),
                    None => Value::Bytes(raw.value),
                }
            }
            ValueKind::None => {
                warn!("unable to handle value at data offset {}", raw.offset);
                Value::Bytes([0; 4])
            }
        }
    }

    /// Interned string for the param cell at `offset`, via the variable table.
    fn interned_string(&self, offset: u32) -> Option<String> {
        let entry = self
            .file
            .string_vars
            .iter()
            .find(|v| v.var_offsets.contains(&offset))?;
        self.file
            .strings
            .iter()
            .find(|(o, _)| *o == entry.target_offset)
            .map(|(_, s)| s.clone())
    }

    /// Conditions of the variable group referenced by the param cell at
    /// `offset`.
    fn group_conditions(&self, offset: u32, visiting: &mut HashSet<u32>) -> Vec<Logic> {
        let Some(entry) = self
            .file
            .group_vars
            .iter()
            .find(|v| v.var_offsets.contains(&offset))
        else {
            warn!("unable to get group reference for param at data offset {offset}");
            return Vec::new();
        };
        let Some(group) = self
            .file
            .var_groups
            .iter()
            .find(|g| g.offset - self.file.header.p_groups == entry.target_offset)
        else {
            warn!("unable to get group at offset {}", entry.target_offset);
            return Vec::new();
        };
        group
            .condition_offsets
            .iter()
            .filter_map(|&o| self.build_condition(o, visiting))
            .collect()
    }

    /// String-pool lookup for FileReference names: interned strings first,
    /// then a direct read at the pool offset (reference strings).
    fn string_at(&self, offset: u32) -> String {
        if let Some((_, s)) = self.file.strings.iter().find(|(o, _)| *o == offset) {
            return s.clone();
        }
        let pos = (self.file.header.p_strings + offset) as usize;
        let mut r = Reader::with_endian(self.data, self.endian);
        r.seek(pos);
        match r.read_cstring() {
            Ok(s) => s,
            Err(_) => {
                warn!("unable to get string from offset {offset}");
                String::new()
            }
        }
    }
}

fn strip_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}
