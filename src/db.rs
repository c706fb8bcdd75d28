//! Template databases and hash dictionaries.
//!
//! Templates map `(logic title, param id)` to a name and a type, one table
//! for tracks and one for conditions. The two are kept separate because a
//! title may occur as both with different schemas. Hash dictionaries recover
//! human names from 32-bit hashes. All files are optional; a missing file is
//! a startup warning and the codec falls back to generated names and guessed
//! types.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::warn;

use crate::hash;
use crate::logic::{Param, ValueKind};

pub const TEMPLATES_TRACKS: &str = "TEMPLATES/TEMPLATES_TRACKS.txt";
pub const TEMPLATES_CONDITIONS: &str = "TEMPLATES/TEMPLATES_CONDITIONS.txt";
pub const HASHES_TRACKS: &str = "DB/HASHES_TRACKS.txt";
pub const HASHES_CONDITIONS: &str = "DB/HASHES_CONDITIONS.txt";
pub const HASHES_TITLES: &str = "DB/HASHES_TITLES.txt";
pub const HASHES_GENERIC: &str = "DB/HASHES_GENERIC.txt";

/// One parameter row of a template table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbParam {
    pub id: u16,
    pub name: String,
    pub kind: ValueKind,
}

/// One logic block of a template table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbLogic {
    pub title: String,
    pub params: Vec<DbParam>,
}

/// A per-logic parameter schema table.
#[derive(Debug, Clone, Default)]
pub struct TemplateDb {
    logics: Vec<DbLogic>,
    loaded: bool,
}

impl TemplateDb {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether a backing file was found; silences unmatched-param warnings
    /// when nothing was ever loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Parse the tabular text form: a non-indented line `<title>[\t<hash>]`
    /// opens a block, tab-indented `<id>\t<name>\t<type>` lines fill it.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut logics: Vec<DbLogic> = Vec::new();
        for line in text.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() || line.starts_with('#') {
                continue;
            }
            if !line.starts_with('\t') {
                logics.push(DbLogic {
                    title: fields[0].to_string(),
                    params: Vec::new(),
                });
                continue;
            }
            let Some(last) = logics.last_mut() else {
                warn!("template parameter line before any logic title: {line:?}");
                continue;
            };
            if fields.len() < 3 {
                warn!("short template parameter line: {line:?}");
                continue;
            }
            let Ok(id) = fields[0].parse::<u16>() else {
                warn!("bad template parameter id {:?}", fields[0]);
                continue;
            };
            let kind = ValueKind::from_db_name(fields[2]).unwrap_or_else(|| {
                warn!("unknown template type {:?}, treating as bytes", fields[2]);
                ValueKind::Bytes
            });
            last.params.push(DbParam {
                id,
                name: fields[1].to_string(),
                kind,
            });
        }
        Self {
            logics,
            loaded: true,
        }
    }

    /// Look a parameter up by id when one is known, by name otherwise.
    #[must_use]
    pub fn find(&self, title: &str, id: Option<u16>, name: &str) -> Option<&DbParam> {
        for logic in self.logics.iter().filter(|l| l.title == title) {
            let hit = logic.params.iter().find(|p| match id {
                Some(id) => p.id == id,
                None => p.name == name,
            });
            if hit.is_some() {
                return hit;
            }
        }
        None
    }

    #[must_use]
    pub fn find_by_id(&self, title: &str, id: u16) -> Option<&DbParam> {
        self.find(title, Some(id), "")
    }
}

/// Split a dictionary line on whitespace, except inside double quotes.
/// Quotes stay part of the token.
pub(crate) fn split_keywords(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoting = false;
    for c in line.chars() {
        if c.is_whitespace() && !quoting {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c == '"' {
            quoting = !quoting;
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Name lookup by hash. Lines are `<name> <hex-hash>...`; several hashes may
/// map to one name and the first binding of a hash wins.
#[derive(Debug, Clone, Default)]
pub struct HashDict {
    entries: HashMap<[u8; 4], String>,
    loaded: bool,
}

impl HashDict {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn absorb(&mut self, text: &str) {
        for line in text.lines() {
            let words = split_keywords(line);
            let Some((name, hashes)) = words.split_first() else {
                continue;
            };
            for h in hashes {
                let Some(bytes) = hash::parse_pretty(h) else {
                    warn!("bad hash {h:?} for {name:?} in dictionary");
                    continue;
                };
                self.entries.entry(bytes).or_insert_with(|| name.clone());
            }
        }
        self.loaded = true;
    }

    #[must_use]
    pub fn lookup(&self, bytes: [u8; 4]) -> Option<&str> {
        self.entries.get(&bytes).map(String::as_str)
    }
}

/// Everything the codec consults for names and types, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct Databases {
    pub track_templates: TemplateDb,
    pub condition_templates: TemplateDb,
    /// Track and condition title hashes, merged.
    pub logic_hashes: HashDict,
    /// Bank/Node container title hashes.
    pub title_hashes: HashDict,
    /// Free-form value hashes, recovered as `h"..."` strings.
    pub generic_hashes: HashDict,
}

impl Databases {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every optional table under `base`, warning for each missing file.
    #[must_use]
    pub fn load(base: &Path) -> Self {
        let mut db = Self::empty();
        if let Some(text) = read_optional(&base.join(TEMPLATES_TRACKS)) {
            db.track_templates = TemplateDb::parse(&text);
        }
        if let Some(text) = read_optional(&base.join(TEMPLATES_CONDITIONS)) {
            db.condition_templates = TemplateDb::parse(&text);
        }
        for name in [HASHES_TRACKS, HASHES_CONDITIONS] {
            if let Some(text) = read_optional(&base.join(name)) {
                db.logic_hashes.absorb(&text);
            }
        }
        if let Some(text) = read_optional(&base.join(HASHES_TITLES)) {
            db.title_hashes.absorb(&text);
        }
        if let Some(text) = read_optional(&base.join(HASHES_GENERIC)) {
            db.generic_hashes.absorb(&text);
        }
        db
    }

    #[must_use]
    pub fn has_templates(&self) -> bool {
        self.track_templates.is_loaded() || self.condition_templates.is_loaded()
    }
}

/// Numeric id of a parameter: the template row wins, then whatever the name
/// itself encodes.
#[must_use]
pub fn resolve_param_id(templates: &TemplateDb, title: &str, param: &Param) -> Option<u16> {
    templates
        .find(title, param.id, &param.name)
        .map(|p| p.id)
        .or(param.id)
}

/// Declared type of a parameter, when a template row covers it.
#[must_use]
pub fn resolve_param_kind(templates: &TemplateDb, title: &str, param: &Param) -> Option<ValueKind> {
    templates.find(title, param.id, &param.name).map(|p| p.kind)
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(_) => {
            warn!("no '{}' found", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
# comment line
Animation\t0x1C84A1D3
\t1\tstate\tbool
\t2\tspeed\tfloat
0x0102030405
Movement
\t1\ttarget\tstring
";

    #[test]
    fn template_parse_and_find() {
        let db = TemplateDb::parse(TEMPLATE);
        assert!(db.is_loaded());
        let p = db.find_by_id("Animation", 2).unwrap();
        assert_eq!("speed", p.name);
        assert_eq!(ValueKind::Float, p.kind);
        // name-based lookup when no id is derivable
        let p = db.find("Movement", None, "target").unwrap();
        assert_eq!(1, p.id);
        assert!(db.find_by_id("Animation", 9).is_none());
        assert!(db.find_by_id("Nothing", 1).is_none());
    }

    #[test]
    fn hash_dict() {
        let mut dict = HashDict::empty();
        dict.absorb("ANIMATION 0x41000000 0x42000000\n\"SOME STRING\" 0x43000000\n");
        assert_eq!(Some("ANIMATION"), dict.lookup([0x41, 0, 0, 0]));
        assert_eq!(Some("ANIMATION"), dict.lookup([0x42, 0, 0, 0]));
        // quoted names keep their quotes for h"..." recovery
        assert_eq!(Some("\"SOME STRING\""), dict.lookup([0x43, 0, 0, 0]));
        assert_eq!(None, dict.lookup([0x44, 0, 0, 0]));
    }

    #[test]
    fn hash_dict_first_binding_wins() {
        let mut dict = HashDict::empty();
        dict.absorb("FIRST 0x41000000\nSECOND 0x41000000\n");
        assert_eq!(Some("FIRST"), dict.lookup([0x41, 0, 0, 0]));
    }

    #[test]
    fn split_keywords_quotes() {
        assert_eq!(
            vec!["\"A B\"".to_string(), "0x01020304".to_string()],
            split_keywords("\"A B\"\t0x01020304")
        );
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("TEMPLATES")).unwrap();
        fs::create_dir(dir.path().join("DB")).unwrap();
        fs::write(
            dir.path().join(TEMPLATES_TRACKS),
            "Animation\n\t1\tstate\tbool\n",
        )
        .unwrap();
        fs::write(dir.path().join(HASHES_TITLES), "NEMESIS 0x41000000\n").unwrap();

        let db = Databases::load(dir.path());
        assert!(db.track_templates.is_loaded());
        // the condition table was missing, which is only a warning
        assert!(!db.condition_templates.is_loaded());
        assert!(db.has_templates());
        assert_eq!(
            ValueKind::Bool,
            db.track_templates.find_by_id("Animation", 1).unwrap().kind
        );
        assert_eq!(Some("NEMESIS"), db.title_hashes.lookup([0x41, 0, 0, 0]));
        assert_eq!(None, db.generic_hashes.lookup([0x41, 0, 0, 0]));
    }
}
