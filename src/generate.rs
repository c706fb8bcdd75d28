//! Template generation.
//!
//! Sweeping a corpus of CAT files yields per-logic parameter observations;
//! compressing them by `(title, id)` identity produces the template tables
//! that later decode and encode passes consult for names and types. The
//! first observation of a parameter wins; parameters with no file evidence
//! get the value guess.

use std::collections::BTreeMap;

use crate::bytes::Endian;
use crate::db::Databases;
use crate::decode::{LogicObservation, Observations, guess_kind};
use crate::hash;
use crate::logic::{PARAM_NAME_DIGITS, ValueKind};

/// Accumulates observations across a corpus, in discovery order.
#[derive(Debug, Default)]
pub struct TemplateGenerator {
    conditions: Vec<LogicObservation>,
    tracks: Vec<LogicObservation>,
}

impl TemplateGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one file's observations into the accumulator.
    pub fn absorb(&mut self, observations: Observations) {
        self.conditions.extend(observations.conditions);
        self.tracks.extend(observations.tracks);
    }

    /// Render the track template table.
    #[must_use]
    pub fn render_tracks(&self, db: &Databases, endian: Endian) -> String {
        render(&self.tracks, db, endian)
    }

    /// Render the condition template table.
    #[must_use]
    pub fn render_conditions(&self, db: &Databases, endian: Endian) -> String {
        render(&self.conditions, db, endian)
    }
}

struct MergedLogic {
    hash: [u8; 4],
    params: BTreeMap<u16, ValueKind>,
}

fn render(observations: &[LogicObservation], db: &Databases, endian: Endian) -> String {
    let mut merged: Vec<MergedLogic> = Vec::new();
    for observation in observations {
        let logic = match merged.iter_mut().find(|m| m.hash == observation.hash) {
            Some(existing) => existing,
            None => {
                merged.push(MergedLogic {
                    hash: observation.hash,
                    params: BTreeMap::new(),
                });
                merged.last_mut().expect("just pushed")
            }
        };
        for param in &observation.params {
            let kind = param.kind.unwrap_or_else(|| guess_kind(param.value, endian));
            logic.params.entry(param.id).or_insert(kind);
        }
    }

    let display = |hash: [u8; 4]| -> String {
        db.logic_hashes
            .lookup(hash)
            .map(str::to_string)
            .unwrap_or_else(|| hash::pretty(hash))
    };
    merged.sort_by_key(|m| display(m.hash));

    let mut out = String::new();
    for logic in &merged {
        match db.logic_hashes.lookup(logic.hash) {
            Some(name) => {
                out.push_str(name);
                out.push('\t');
                out.push_str(&hash::pretty(logic.hash));
                out.push('\n');
            }
            None => {
                out.push_str(&hash::pretty(logic.hash));
                out.push('\n');
            }
        }
        for (&id, &kind) in &logic.params {
            // the id-0 hash slot never makes it into templates
            if id == 0 {
                continue;
            }
            out.push_str(&format!(
                "\t{id}\tparam{id:0digits$}\t{kind}\n",
                digits = PARAM_NAME_DIGITS,
                kind = kind.db_name()
            ));
        }
    }
    out
}
