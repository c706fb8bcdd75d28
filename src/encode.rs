//! CAT binary encoding.
//!
//! The layout is a single left-to-right pass with lazy back-patching.
//! Strings, condition groups, conditions and tracks are registered as
//! *sleepers* before anything is written: a sleeper collects the file
//! positions of every 4-byte slot that must eventually point at it, and the
//! matching target offsets as they become known. A final fix-up pass rewrites
//! each slot with `target - section_base`.

use std::{error, fmt};

use log::{debug, warn};

use crate::bytes::{self, Endian, Writer};
use crate::cat::{self, Header, NodeTag, ParamFlags, ParamHeader};
use crate::db::{Databases, TemplateDb, resolve_param_id, resolve_param_kind};
use crate::hash;
use crate::logic::{Container, Logic, Param, Tree, Value, ValueKind};
use crate::optimize::{self, Optimization};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Bytes(bytes::Error),
    /// A track optimization target landed more than 32767 bytes away.
    OptimizationDistance { from: usize, to: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(err) => err.fmt(f),
            Self::OptimizationDistance { from, to } => write!(
                f,
                "optimization distance from {from} to {to} exceeds 32767"
            ),
        }
    }
}

impl error::Error for Error {}

impl From<bytes::Error> for Error {
    fn from(err: bytes::Error) -> Self {
        Self::Bytes(err)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    pub endian: Endian,
    /// Re-introduce track parameter delta-reuse (`--PO`).
    pub optimize: bool,
    /// Quick mode only considers targets with a matching title. Slow mode has
    /// never been observed to win; quick is the default.
    pub quick_optimize: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            endian: Endian::Little,
            optimize: false,
            quick_optimize: true,
        }
    }
}

/// A pending interned string: slot positions waiting for the pooled offset.
#[derive(Debug, Default)]
struct SleepingString {
    string: String,
    /// How many parameters reference the string (table `n` field).
    users: usize,
    /// Positions holding the pool-relative string offset.
    string_slots: Vec<usize>,
    /// Positions inside the variable table pointing at using params.
    param_slots: Vec<usize>,
    /// Data positions of the using params, FIFO-matched against the slots.
    param_offsets: Vec<usize>,
}

/// A pending variable condition group, keyed by its owning `cg` parameter.
#[derive(Debug)]
struct SleepingGroup {
    cg_param: Param,
    users: usize,
    group_slots: Vec<usize>,
    condition_slots: Vec<usize>,
    condition_offsets: Vec<usize>,
    param_slots: Vec<usize>,
    param_offsets: Vec<usize>,
}

/// A pending condition or track blob.
#[derive(Debug)]
struct SleepingLogic {
    logic: Logic,
    logic_slots: Vec<usize>,
    logic_offset: usize,
}

/// Arena of all sleepers, addressed by index. Duplicates coalesce on
/// structural equality so every identical logic shares one blob.
#[derive(Debug, Default)]
struct Sleepers {
    strings: Vec<SleepingString>,
    reference_strings: Vec<SleepingString>,
    groups: Vec<SleepingGroup>,
    conditions: Vec<SleepingLogic>,
    tracks: Vec<SleepingLogic>,
}

impl Sleepers {
    fn add_string(&mut self, string: &str) {
        match self.strings.iter_mut().find(|s| s.string == string) {
            Some(existing) => existing.users += 1,
            None => self.strings.push(SleepingString {
                string: string.to_string(),
                users: 1,
                ..SleepingString::default()
            }),
        }
    }

    fn add_reference_string(&mut self, string: &str, slot: Option<usize>) {
        let entry = match self
            .reference_strings
            .iter_mut()
            .find(|s| s.string == string)
        {
            Some(existing) => existing,
            None => {
                self.reference_strings.push(SleepingString {
                    string: string.to_string(),
                    ..SleepingString::default()
                });
                self.reference_strings.last_mut().expect("just pushed")
            }
        };
        entry.string_slots.extend(slot);
    }

    fn add_group(&mut self, cg_param: &Param) {
        match self.groups.iter_mut().find(|g| g.cg_param == *cg_param) {
            Some(existing) => existing.users += 1,
            None => self.groups.push(SleepingGroup {
                cg_param: cg_param.clone(),
                users: 1,
                group_slots: Vec::new(),
                condition_slots: Vec::new(),
                condition_offsets: Vec::new(),
                param_slots: Vec::new(),
                param_offsets: Vec::new(),
            }),
        }
    }

    fn add_condition(&mut self, logic: &Logic) {
        if !self.conditions.iter().any(|s| s.logic == *logic) {
            self.conditions.push(SleepingLogic {
                logic: logic.clone(),
                logic_slots: Vec::new(),
                logic_offset: 0,
            });
        }
    }

    fn add_track(&mut self, logic: &Logic) {
        if !self.tracks.iter().any(|s| s.logic == *logic) {
            self.tracks.push(SleepingLogic {
                logic: logic.clone(),
                logic_slots: Vec::new(),
                logic_offset: 0,
            });
        }
    }

    fn condition_index(&self, logic: &Logic) -> Option<usize> {
        self.conditions.iter().position(|s| s.logic == *logic)
    }

    fn track_index(&self, logic: &Logic) -> Option<usize> {
        self.tracks.iter().position(|s| s.logic == *logic)
    }
}

#[derive(Debug, Default)]
struct Counters {
    banks: u32,
    nodes: u32,
    refs: u32,
    leaves: u32,
}

/// Encode a logic tree into CAT bytes.
pub fn encode(tree: &Tree, db: &Databases, options: &EncodeOptions) -> Result<Vec<u8>, Error> {
    let mut encoder = Encoder {
        db,
        options,
        w: Writer::with_endian(options.endian),
        sleepers: Sleepers::default(),
        optimizations: Vec::new(),
        counters: Counters::default(),
        p_groups: 0,
        p_data: 0,
        p_strings: 0,
    };
    encoder.run(tree)?;
    Ok(encoder.w.into_bytes())
}

struct Encoder<'a> {
    db: &'a Databases,
    options: &'a EncodeOptions,
    w: Writer,
    sleepers: Sleepers,
    optimizations: Vec<Option<Optimization>>,
    counters: Counters,
    p_groups: usize,
    p_data: usize,
    p_strings: usize,
}

impl Encoder<'_> {
    fn run(&mut self, tree: &Tree) -> Result<(), Error> {
        self.gather_sleepers(tree);

        if self.options.optimize {
            let tracks: Vec<&Logic> = self.sleepers.tracks.iter().map(|s| &s.logic).collect();
            self.optimizations = optimize::optimize_tracks(
                &tracks,
                &self.db.track_templates,
                self.options.quick_optimize,
            );
        }

        self.gather_strings();
        self.gather_groups();

        // zero-filled header, rewritten at the end
        Header::default().write(&mut self.w);

        let pos_string_count = self.w.pos();
        self.w.write_u32(0);
        self.write_string_variables();

        let pos_group_count = self.w.pos();
        self.w.write_u32(0);
        self.write_group_variables();

        self.write_tree(tree);

        self.p_groups = self.w.pos();
        self.write_groups()?;

        self.p_data = self.w.pos();
        self.write_param_data()?;

        self.p_strings = self.w.pos();
        self.write_strings()?;

        let file_length = self.w.pos();
        self.fix_group_offsets()?;

        let header = Header {
            file_length: file_length as u32,
            p_data: self.p_data as u32,
            p_strings: self.p_strings as u32,
            p_groups: self.p_groups as u32,
            counter_banks: self.counters.banks.wrapping_sub(1),
            counter_nodes: self.counters.nodes,
            counter_refs: self.counters.refs,
            counter_leaves: self.counters.leaves,
        };
        let mut header_bytes = Writer::with_endian(self.options.endian);
        header.write(&mut header_bytes);
        self.w.patch_bytes(0, &header_bytes.into_bytes())?;
        self.w
            .patch_u32(pos_string_count, self.sleepers.strings.len() as u32)?;
        self.w
            .patch_u32(pos_group_count, self.sleepers.groups.len() as u32)?;

        self.w.pad_zero(cat::tail_padding(file_length));
        Ok(())
    }

    /// Pre-register every condition, track and reference string so later
    /// passes can merge against the full set.
    fn gather_sleepers(&mut self, tree: &Tree) {
        match tree {
            Tree::Bank(container) | Tree::Node(container) => {
                for condition in &container.conditions {
                    self.gather_condition(condition);
                }
                for track in &container.tracks {
                    self.sleepers.add_track(track);
                    self.gather_group_conditions(track);
                }
                for child in &container.children {
                    self.gather_sleepers(child);
                }
            }
            Tree::FileReference(reference) => {
                self.sleepers.add_reference_string(&reference.file_name, None);
                self.sleepers.add_reference_string(&reference.path, None);
            }
        }
    }

    fn gather_condition(&mut self, condition: &Logic) {
        self.sleepers.add_condition(condition);
        self.gather_group_conditions(condition);
    }

    /// Conditions inside `cg` params live outside the node tree but share
    /// the same parameter-data emit pass.
    fn gather_group_conditions(&mut self, logic: &Logic) {
        for param in &logic.params {
            if let Value::Group(conditions) = &param.value {
                for condition in conditions {
                    self.gather_condition(condition);
                }
            }
        }
    }

    /// Effective parameter list of a track sleeper, optimization-reduced
    /// when the pass produced a match.
    fn track_params(&self, index: usize) -> Vec<Param> {
        if let Some(Some(opt)) = self.optimizations.get(index) {
            return opt.unique_params.clone();
        }
        self.sleepers.tracks[index].logic.params.clone()
    }

    fn gather_strings(&mut self) {
        let mut found: Vec<String> = Vec::new();
        let collect = |title: &str, params: &[Param], templates: &TemplateDb| {
            let mut out = Vec::new();
            for param in params {
                let Value::Str(string) = &param.value else {
                    continue;
                };
                if string.is_empty() {
                    continue;
                }
                if let Some(kind) = resolve_param_kind(templates, title, param) {
                    if kind != ValueKind::Str {
                        warn!(
                            "param {:?} of {title} carries a string but its template \
                             says {}; writing the value hash instead of interning",
                            param.name,
                            kind.db_name()
                        );
                        continue;
                    }
                }
                out.push(string.clone());
            }
            out
        };
        for i in 0..self.sleepers.tracks.len() {
            let title = self.sleepers.tracks[i].logic.title.display();
            let params = self.track_params(i);
            found.extend(collect(&title, &params, &self.db.track_templates));
        }
        for sleeper in &self.sleepers.conditions {
            let title = sleeper.logic.title.display();
            found.extend(collect(
                &title,
                &sleeper.logic.params,
                &self.db.condition_templates,
            ));
        }
        for string in found {
            self.sleepers.add_string(&string);
        }
    }

    fn gather_groups(&mut self) {
        let mut found: Vec<Param> = Vec::new();
        for i in 0..self.sleepers.tracks.len() {
            for param in self.track_params(i) {
                if matches!(&param.value, Value::Group(c) if !c.is_empty()) {
                    found.push(param);
                }
            }
        }
        for sleeper in &self.sleepers.conditions {
            for param in &sleeper.logic.params {
                if matches!(&param.value, Value::Group(c) if !c.is_empty()) {
                    found.push(param.clone());
                }
            }
        }
        for param in found {
            self.sleepers.add_group(&param);
        }
    }

    /// Table entry per interned string: an offset slot and one slot per use.
    fn write_string_variables(&mut self) {
        for string in &mut self.sleepers.strings {
            string.string_slots.push(self.w.pos());
            self.w.write_u32(0);
            self.w.write_u16(string.users as u16);
            for _ in 0..string.users {
                string.param_slots.push(self.w.pos());
                self.w.write_u32(0);
            }
        }
    }

    fn write_group_variables(&mut self) {
        for group in &mut self.sleepers.groups {
            group.group_slots.push(self.w.pos());
            self.w.write_u32(0);
            self.w.write_u16(group.users as u16);
            for _ in 0..group.users {
                group.param_slots.push(self.w.pos());
                self.w.write_u32(0);
            }
        }
    }

    fn write_tree(&mut self, tree: &Tree) {
        match tree {
            Tree::Bank(container) => {
                self.counters.banks += 1;
                self.w.write_u8(NodeTag::Bank as u8);
                self.write_container(container, false);
            }
            Tree::Node(container) => {
                self.counters.nodes += 1;
                if container.children.is_empty() {
                    self.counters.leaves += 1;
                    self.w.write_u8(NodeTag::Leaf as u8);
                } else {
                    self.w.write_u8(NodeTag::Node as u8);
                }
                self.write_container(container, true);
            }
            Tree::FileReference(reference) => {
                self.counters.refs += 1;
                let tag = if reference.include {
                    NodeTag::Include
                } else {
                    NodeTag::Reference
                };
                self.w.write_u8(tag as u8);
                let slot = self.w.pos();
                self.sleepers
                    .add_reference_string(&reference.file_name, Some(slot));
                self.sleepers
                    .add_reference_string(&reference.path, Some(slot + 4));
                self.w.write_u32(0);
                self.w.write_u32(0);
            }
        }
    }

    fn write_container(&mut self, container: &Container, with_tracks: bool) {
        self.w.write_bytes(&container.title.title_hash());

        self.w.write_u8(container.conditions.len() as u8);
        for condition in &container.conditions {
            let slot = self.w.pos();
            match self.sleepers.condition_index(condition) {
                Some(index) => self.sleepers.conditions[index].logic_slots.push(slot),
                None => warn!(
                    "unable to match tree condition {} with sleeping conditions",
                    condition.title.display()
                ),
            }
            self.w.write_u32(0);
        }

        if with_tracks {
            self.w.write_u8(container.tracks.len() as u8);
            for track in &container.tracks {
                let slot = self.w.pos();
                match self.sleepers.track_index(track) {
                    Some(index) => self.sleepers.tracks[index].logic_slots.push(slot),
                    None => warn!(
                        "unable to match tree track {} with sleeping tracks",
                        track.title.display()
                    ),
                }
                self.w.write_u32(0);
            }
        }

        self.w.write_u16(container.children.len() as u16);
        for child in &container.children {
            self.write_tree(child);
        }
    }

    /// Variable condition groups: the group offset goes back into the group
    /// variable table, the per-condition slots join the conditions' own
    /// slot lists so the parameter pass patches them all at once.
    fn write_groups(&mut self) -> Result<(), Error> {
        for g in 0..self.sleepers.groups.len() {
            let offset = self.w.pos() - self.p_groups;
            let slots = self.sleepers.groups[g].group_slots.clone();
            for slot in slots {
                self.w.patch_u32(slot, offset as u32)?;
            }
            let conditions = match &self.sleepers.groups[g].cg_param.value {
                Value::Group(conditions) => conditions.clone(),
                _ => Vec::new(),
            };
            self.w.write_u8(conditions.len() as u8);
            for condition in &conditions {
                let slot = self.w.pos();
                self.sleepers.groups[g].condition_slots.push(slot);
                self.w.write_u32(0);
                match self.sleepers.condition_index(condition) {
                    Some(index) => self.sleepers.conditions[index].logic_slots.push(slot),
                    None => warn!(
                        "group condition {} missing from sleeping conditions",
                        condition.title.display()
                    ),
                }
            }
        }
        Ok(())
    }

    fn write_param_data(&mut self) -> Result<(), Error> {
        for i in 0..self.sleepers.conditions.len() {
            let offset = self.w.pos();
            self.sleepers.conditions[i].logic_offset = offset;
            let slots = self.sleepers.conditions[i].logic_slots.clone();
            for slot in slots {
                self.w.patch_u32(slot, (offset - self.p_data) as u32)?;
            }
            let (title, title_hash, params) = {
                let logic = &self.sleepers.conditions[i].logic;
                (logic.title.display(), logic.title.value_hash(), logic.params.clone())
            };
            self.w.write_bytes(&title_hash);
            for param in &params {
                let db_kind = resolve_param_kind(&self.db.condition_templates, &title, param);
                self.emit_param_value(&title, param, db_kind, true);
            }
        }

        for i in 0..self.sleepers.tracks.len() {
            let offset = self.w.pos();
            self.sleepers.tracks[i].logic_offset = offset;
            let slots = self.sleepers.tracks[i].logic_slots.clone();
            for slot in slots {
                self.w.patch_u32(slot, (offset - self.p_data) as u32)?;
            }
            let title = self.sleepers.tracks[i].logic.title.display();
            let title_hash = self.sleepers.tracks[i].logic.title.value_hash();
            let params = self.track_params(i);

            // optimization offset placeholder
            self.w.write_u16(0);
            // the id-0 slot carries the track hash
            let mut flags = ParamFlags::WIDE;
            if !params.is_empty() {
                flags |= ParamFlags::MORE;
            }
            self.w.write_u16(ParamHeader { flags, id: 0 }.encode());
            self.w.write_bytes(&title_hash);

            for (n, param) in params.iter().enumerate() {
                let id = match resolve_param_id(&self.db.track_templates, &title, param) {
                    Some(id) if id != 0 && id <= ParamHeader::MAX_ID => id,
                    other => {
                        warn!(
                            "unable to find a usable id for param {:?} of {title} \
                             ({other:?}), the file will not load",
                            param.name
                        );
                        0
                    }
                };
                let db_kind = resolve_param_kind(&self.db.track_templates, &title, param);
                let value_kind = param.value.kind();
                if let Some(db_kind) = db_kind {
                    if db_kind != value_kind {
                        debug!(
                            "param {:?} of {title} is written as {} but its template \
                             says {}",
                            param.name,
                            value_kind.db_name(),
                            db_kind.db_name()
                        );
                    }
                }
                let mut flags = ParamFlags::empty();
                if value_kind != ValueKind::Bool {
                    flags |= ParamFlags::WIDE;
                }
                if n + 1 < params.len() {
                    flags |= ParamFlags::MORE;
                }
                self.w.write_u16(ParamHeader { flags, id }.encode());
                self.emit_param_value(&title, param, db_kind, false);
            }
        }

        if self.options.optimize {
            self.patch_optimization_offsets()?;
        }
        Ok(())
    }

    fn patch_optimization_offsets(&mut self) -> Result<(), Error> {
        for (i, optimization) in self.optimizations.iter().enumerate() {
            let Some(opt) = optimization else { continue };
            let from = self.sleepers.tracks[i].logic_offset;
            let to = self.sleepers.tracks[opt.target].logic_offset;
            let distance = to.saturating_sub(from);
            if distance > 32767 {
                return Err(Error::OptimizationDistance { from, to });
            }
            self.w.patch_u16(from, distance as u16)?;
        }
        Ok(())
    }

    /// Write one parameter value according to its typed form.
    fn emit_param_value(
        &mut self,
        logic_title: &str,
        param: &Param,
        db_kind: Option<ValueKind>,
        in_condition: bool,
    ) {
        match &param.value {
            Value::Bytes(bytes) => self.w.write_bytes(bytes),
            Value::Int(v) => self.w.write_i32(*v),
            Value::Float(v) => self.w.write_f32(*v),
            Value::Bool(v) => {
                if in_condition {
                    // condition blobs are fixed 4-byte slots
                    warn!(
                        "boolean param {:?} inside condition {logic_title} widened to \
                         4 bytes",
                        param.name
                    );
                    self.w.write_u32(u32::from(*v));
                } else {
                    self.w.write_u8(u8::from(*v));
                }
            }
            Value::Str(string) => {
                let interned = !matches!(db_kind, Some(kind) if kind != ValueKind::Str);
                let pos = self.w.pos();
                let mut matched = false;
                if interned {
                    if let Some(sleeper) = self.sleepers.strings.iter_mut().find(|s| {
                        s.string == *string && s.param_slots.len() > s.param_offsets.len()
                    }) {
                        sleeper.param_offsets.push(pos);
                        matched = true;
                    }
                }
                if matched {
                    self.w.write_u32(0);
                } else {
                    self.w.write_bytes(&hash::hash_value(string));
                }
            }
            Value::HashedStr(string) => self.w.write_bytes(&hash::hash_value(string)),
            Value::Group(conditions) => {
                if conditions.is_empty() {
                    self.w.write_u32(0);
                    return;
                }
                let pos = self.w.pos();
                let mut matched = false;
                if let Some(group) = self.sleepers.groups.iter_mut().find(|g| {
                    g.cg_param == *param && g.param_slots.len() > g.param_offsets.len()
                }) {
                    group.param_offsets.push(pos);
                    matched = true;
                }
                if !matched {
                    log::error!(
                        "param {:?} of {logic_title} could not be matched to a \
                         variable condition group",
                        param.name
                    );
                }
                self.w.write_u32(0);
            }
        }
    }

    /// Interned strings first, reference strings immediately after, with the
    /// FIFO slot/offset fix-up for every using parameter.
    fn write_strings(&mut self) -> Result<(), Error> {
        for i in 0..self.sleepers.strings.len() {
            self.write_string_entry(i, false)?;
        }
        for i in 0..self.sleepers.reference_strings.len() {
            self.write_string_entry(i, true)?;
        }
        Ok(())
    }

    fn write_string_entry(&mut self, index: usize, reference: bool) -> Result<(), Error> {
        let entry = if reference {
            &self.sleepers.reference_strings[index]
        } else {
            &self.sleepers.strings[index]
        };
        let offset = self.w.pos() - self.p_strings;
        let string = entry.string.clone();
        let string_slots = entry.string_slots.clone();
        let param_slots = entry.param_slots.clone();
        let param_offsets = entry.param_offsets.clone();

        for slot in string_slots {
            self.w.patch_u32(slot, offset as u32)?;
        }
        if param_slots.len() != param_offsets.len() {
            log::error!(
                "string {string:?} has {} param slots but {} param offsets",
                param_slots.len(),
                param_offsets.len()
            );
        } else {
            for (slot, target) in param_slots.into_iter().zip(param_offsets) {
                self.w.patch_u32(slot, (target - self.p_data) as u32)?;
            }
        }
        self.w.write_cstring(&string);
        Ok(())
    }

    /// Final pass: groups collect their conditions' resolved offsets, then
    /// every recorded slot is rewritten relative to `p_data`.
    fn fix_group_offsets(&mut self) -> Result<(), Error> {
        for g in 0..self.sleepers.groups.len() {
            let conditions = match &self.sleepers.groups[g].cg_param.value {
                Value::Group(conditions) => conditions.clone(),
                _ => Vec::new(),
            };
            for condition in &conditions {
                if let Some(index) = self.sleepers.condition_index(condition) {
                    let offset = self.sleepers.conditions[index].logic_offset;
                    self.sleepers.groups[g].condition_offsets.push(offset);
                }
            }

            let condition_slots = self.sleepers.groups[g].condition_slots.clone();
            let condition_offsets = self.sleepers.groups[g].condition_offsets.clone();
            if condition_slots.len() != condition_offsets.len() {
                log::error!(
                    "group {g} has {} condition slots but {} condition offsets",
                    condition_slots.len(),
                    condition_offsets.len()
                );
            } else {
                for (slot, target) in condition_slots.into_iter().zip(condition_offsets) {
                    self.w.patch_u32(slot, (target - self.p_data) as u32)?;
                }
            }

            let param_slots = self.sleepers.groups[g].param_slots.clone();
            let param_offsets = self.sleepers.groups[g].param_offsets.clone();
            if param_slots.len() != param_offsets.len() {
                log::error!(
                    "group {g} has {} param slots but {} param offsets",
                    param_slots.len(),
                    param_offsets.len()
                );
            } else {
                for (slot, target) in param_slots.into_iter().zip(param_offsets) {
                    self.w.patch_u32(slot, (target - self.p_data) as u32)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{FileRef, Title};

    fn track(title: &str, params: Vec<Param>) -> Logic {
        Logic {
            title: Title::Name(title.into()),
            params,
        }
    }

    fn int_param(id: u16, v: i32) -> Param {
        Param {
            id: Some(id),
            name: crate::logic::format_param_name(id),
            value: Value::Int(v),
        }
    }

    #[test]
    fn sleeper_merging_is_structural() {
        let mut sleepers = Sleepers::default();
        let a = track("A", vec![int_param(1, 5)]);
        let b = track("A", vec![int_param(1, 5)]);
        let c = track("A", vec![int_param(1, 6)]);
        sleepers.add_track(&a);
        sleepers.add_track(&b);
        sleepers.add_track(&c);
        assert_eq!(2, sleepers.tracks.len());
        assert_eq!(Some(0), sleepers.track_index(&b));
        assert_eq!(Some(1), sleepers.track_index(&c));
    }

    #[test]
    fn string_sleepers_count_users() {
        let mut sleepers = Sleepers::default();
        sleepers.add_string("A");
        sleepers.add_string("B");
        sleepers.add_string("A");
        assert_eq!(2, sleepers.strings.len());
        assert_eq!(2, sleepers.strings[0].users);
        assert_eq!(1, sleepers.strings[1].users);
    }

    #[test]
    fn reference_strings_merge_slots() {
        let mut sleepers = Sleepers::default();
        sleepers.add_reference_string("X.cat", None);
        sleepers.add_reference_string("X.cat", Some(40));
        sleepers.add_reference_string("X.cat", Some(80));
        assert_eq!(1, sleepers.reference_strings.len());
        assert_eq!(vec![40, 80], sleepers.reference_strings[0].string_slots);
    }

    #[test]
    fn empty_bank_layout() {
        let tree = Tree::Bank(Container {
            title: Title::Name("TestBank".into()),
            ..Container::default()
        });
        let bytes = encode(&tree, &Databases::empty(), &EncodeOptions::default()).unwrap();
        // padded to a whole block
        assert_eq!(0, bytes.len() % cat::TAIL_ALIGN);

        let mut r = crate::bytes::Reader::new(&bytes);
        let header = Header::read(&mut r).unwrap();
        // one bank, stored minus one
        assert_eq!(0, header.counter_banks);
        assert_eq!(0, header.counter_nodes);
        // no strings, no groups
        assert_eq!(0, r.read_u32().unwrap());
        assert_eq!(0, r.read_u32().unwrap());
        // the bank record: tag, hash, no conditions, no children
        assert_eq!(b'b', r.read_u8().unwrap());
        assert_eq!(crate::hash::hash_title("TestBank"), r.read_array4().unwrap());
        assert_eq!(0, r.read_u8().unwrap());
        assert_eq!(0, r.read_u16().unwrap());
        assert_eq!(header.p_groups as usize, r.pos());
        assert_eq!(header.p_data, header.p_groups);
        assert_eq!(header.p_strings, header.p_data);
        assert_eq!(header.file_length as usize, r.pos());
    }

    #[test]
    fn file_reference_slots_point_into_pool() {
        let tree = Tree::Bank(Container {
            title: Title::Name("B".into()),
            children: vec![Tree::FileReference(FileRef {
                file_name: "Other.cat".into(),
                path: "ACT\\".into(),
                include: true,
            })],
            ..Container::default()
        });
        let bytes = encode(&tree, &Databases::empty(), &EncodeOptions::default()).unwrap();
        let mut r = crate::bytes::Reader::new(&bytes);
        let header = Header::read(&mut r).unwrap();
        r.read_u32().unwrap();
        r.read_u32().unwrap();
        // bank record
        assert_eq!(b'b', r.read_u8().unwrap());
        r.read_array4().unwrap();
        r.read_u8().unwrap();
        assert_eq!(1, r.read_u16().unwrap());
        // reference record
        assert_eq!(b'i', r.read_u8().unwrap());
        let file_offset = r.read_u32().unwrap();
        let path_offset = r.read_u32().unwrap();
        let mut r2 = crate::bytes::Reader::new(&bytes);
        r2.seek((header.p_strings + file_offset) as usize);
        assert_eq!("Other.cat", r2.read_cstring().unwrap());
        r2.seek((header.p_strings + path_offset) as usize);
        assert_eq!("ACT\\", r2.read_cstring().unwrap());
    }
}
