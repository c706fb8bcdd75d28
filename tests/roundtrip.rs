use pretty_assertions::assert_eq;

use mact::bytes::Reader;
use mact::cat::{Header, ParamHeader};
use mact::db::{Databases, TemplateDb};
use mact::decode::{DecodeOptions, decode};
use mact::encode::{EncodeOptions, encode};
use mact::hash;
use mact::logic::{Param, Title, Tree, Value};
use mact::mact::{parse, write};

fn encode_text(text: &str, db: &Databases, optimize: bool) -> Vec<u8> {
    let tree = parse::parse(text).unwrap();
    let options = EncodeOptions {
        optimize,
        ..EncodeOptions::default()
    };
    encode(&tree, db, &options).unwrap()
}

fn header_of(bytes: &[u8]) -> Header {
    Header::read(&mut Reader::new(bytes)).unwrap()
}

#[test]
fn empty_bank() {
    let text = "Bank TestBank\n{\n\tConditionGroup\n\t{\n\t}\n}\n";
    let bytes = encode_text(text, &Databases::empty(), false);
    let mut r = Reader::new(&bytes);
    let header = Header::read(&mut r).unwrap();

    // one bank, stored minus one
    assert_eq!(0, header.counter_banks);
    assert_eq!(0, header.counter_refs);
    assert_eq!(0, r.read_u32().unwrap()); // strings
    assert_eq!(0, r.read_u32().unwrap()); // groups
    assert_eq!(b'b', r.read_u8().unwrap());
    assert_eq!(hash::hash_title("TestBank"), r.read_array4().unwrap());
    assert_eq!(0, r.read_u8().unwrap()); // conditions
    assert_eq!(0, r.read_u16().unwrap()); // children
    assert_eq!(header.file_length as usize, r.pos());
}

#[test]
fn single_leaf_with_boolean_track_param() {
    let templates = TemplateDb::parse("Animation\n\t1\tstate\tbool\n");
    let db = Databases {
        track_templates: templates,
        ..Databases::empty()
    };
    let text = "\
Node Foo
{
\tConditionGroup
\t{
\t}
\tTracks
\t{
\t\tAnimation
\t\t{
\t\t\tstate\tTRUE
\t\t}
\t}
}
";
    let bytes = encode_text(text, &db, false);
    let mut r = Reader::new(&bytes);
    let header = Header::read(&mut r).unwrap();
    r.read_u32().unwrap();
    r.read_u32().unwrap();

    assert_eq!(b'l', r.read_u8().unwrap());
    assert_eq!(hash::hash_title("Foo"), r.read_array4().unwrap());
    assert_eq!(0, r.read_u8().unwrap()); // conditions
    assert_eq!(1, r.read_u8().unwrap()); // tracks
    let track_slot = r.read_u32().unwrap();
    assert_eq!(0, r.read_u16().unwrap()); // children

    // the track blob sits at p_data + slot
    r.seek((header.p_data + track_slot) as usize);
    assert_eq!(0, r.read_u16().unwrap()); // opti_offset
    let hash_header = ParamHeader::decode(r.read_u16().unwrap());
    assert_eq!(0, hash_header.id);
    assert!(hash_header.more());
    assert!(hash_header.wide());
    assert_eq!(hash::hash_value("Animation"), r.read_array4().unwrap());
    let state_header = ParamHeader::decode(r.read_u16().unwrap());
    assert_eq!(1, state_header.id);
    assert!(!state_header.more());
    assert!(!state_header.wide());
    assert_eq!(1, r.read_u8().unwrap());
    assert_eq!(header.p_strings as usize, r.pos());
}

#[test]
fn string_interning_merges_identical_values() {
    let text = "\
Bank B
{
\tConditionGroup
\t{
\t}
\tNode N1
\t{
\t\tConditionGroup
\t\t{
\t\t}
\t\tTracks
\t\t{
\t\t\tAnimation
\t\t\t{
\t\t\t\t[00001]\t\"C_PLAYER\\PICKUP\"
\t\t\t\t[00002]\t1
\t\t\t}
\t\t}
\t}
\tNode N2
\t{
\t\tConditionGroup
\t\t{
\t\t}
\t\tTracks
\t\t{
\t\t\tMovement
\t\t\t{
\t\t\t\t[00001]\t\"C_PLAYER\\PICKUP\"
\t\t\t\t[00002]\t2
\t\t\t}
\t\t}
\t}
}
";
    let bytes = encode_text(text, &Databases::empty(), false);
    let mut r = Reader::new(&bytes);
    let header = Header::read(&mut r).unwrap();

    assert_eq!(1, r.read_u32().unwrap());
    let string_offset = r.read_u32().unwrap();
    assert_eq!(2, r.read_u16().unwrap());
    let cell_a = r.read_u32().unwrap();
    let cell_b = r.read_u32().unwrap();
    assert_ne!(cell_a, cell_b);

    // both cells sit in the data region and were left zero for the engine
    for cell in [cell_a, cell_b] {
        assert!(header.p_data + cell < header.p_strings);
        let mut r2 = Reader::new(&bytes);
        r2.seek((header.p_data + cell) as usize);
        assert_eq!(0, r2.read_u32().unwrap());
    }

    let mut r2 = Reader::new(&bytes);
    r2.seek((header.p_strings + string_offset) as usize);
    assert_eq!("C_PLAYER\\PICKUP", r2.read_cstring().unwrap());

    // decoding recovers both params as the same string
    let tree = decode(&bytes, &Databases::empty(), &DecodeOptions::default()).unwrap();
    let Tree::Bank(bank) = tree else { panic!("expected bank") };
    for child in &bank.children {
        let Tree::Node(node) = child else { panic!("expected node") };
        assert_eq!(
            Value::Str("C_PLAYER\\PICKUP".into()),
            node.tracks[0].params[0].value
        );
    }
}

#[test]
fn condition_group_param() {
    let text = "\
Bank B
{
\tConditionGroup
\t{
\t\tNot
\t\t{
\t\t\t[00001]
\t\t\t{
\t\t\t\tIsDead
\t\t\t\t{
\t\t\t\t\t[00001]\t7
\t\t\t\t}
\t\t\t\tIsAlive
\t\t\t\t{
\t\t\t\t\t[00001]\t8
\t\t\t\t}
\t\t\t}
\t\t}
\t}
}
";
    let bytes = encode_text(text, &Databases::empty(), false);
    let mut r = Reader::new(&bytes);
    let header = Header::read(&mut r).unwrap();
    assert_eq!(0, r.read_u32().unwrap()); // no strings
    assert_eq!(1, r.read_u32().unwrap()); // one group
    let group_offset = r.read_u32().unwrap();
    assert_eq!(1, r.read_u16().unwrap());
    let param_cell = r.read_u32().unwrap();
    assert!(header.p_data + param_cell < header.p_strings);

    // the group record lists both conditions
    let mut r2 = Reader::new(&bytes);
    r2.seek((header.p_groups + group_offset) as usize);
    assert_eq!(2, r2.read_u8().unwrap());
    for _ in 0..2 {
        let condition_offset = r2.read_u32().unwrap();
        assert!(header.p_data + condition_offset < header.p_strings);
    }

    // decoding rebuilds the inline group
    let tree = decode(&bytes, &Databases::empty(), &DecodeOptions::default()).unwrap();
    let Tree::Bank(bank) = tree else { panic!("expected bank") };
    let Value::Group(group) = &bank.conditions[0].params[0].value else {
        panic!("expected inline group");
    };
    assert_eq!(2, group.len());
    assert_eq!(Value::Int(7), group[0].params[0].value);
    assert_eq!(Value::Int(8), group[1].params[0].value);
}

#[test]
fn track_optimization_roundtrip() {
    let text = "\
Bank B
{
\tConditionGroup
\t{
\t}
\tNode N1
\t{
\t\tConditionGroup
\t\t{
\t\t}
\t\tTracks
\t\t{
\t\t\tAnimation
\t\t\t{
\t\t\t\t[00001]\t0x01020304
\t\t\t\t[00002]\t10
\t\t\t}
\t\t}
\t}
\tNode N2
\t{
\t\tConditionGroup
\t\t{
\t\t}
\t\tTracks
\t\t{
\t\t\tAnimation
\t\t\t{
\t\t\t\t[00001]\t0x01020304
\t\t\t\t[00002]\t20
\t\t\t}
\t\t}
\t}
}
";
    let bytes = encode_text(text, &Databases::empty(), true);
    let header = header_of(&bytes);

    // track A carries an optimization offset to B
    let tree_plain = decode(&bytes, &Databases::empty(), &DecodeOptions::default()).unwrap();
    let Tree::Bank(bank) = &tree_plain else { panic!("expected bank") };
    let Tree::Node(n1) = &bank.children[0] else { panic!("expected node") };
    let a = &n1.tracks[0];
    assert_eq!(
        vec![
            Param {
                id: Some(1),
                name: "[00001]".into(),
                value: Value::Bytes([1, 2, 3, 4]),
            },
            Param {
                id: Some(2),
                name: "[00002]".into(),
                value: Value::Int(10),
            },
        ],
        a.params
    );

    // raw check: the first track blob holds a non-zero opti_offset and only
    // the differing param
    let mut r = Reader::new(&bytes);
    r.seek(header.p_data as usize);
    let opti = r.read_u16().unwrap();
    assert_ne!(0, opti);
    let hash_header = ParamHeader::decode(r.read_u16().unwrap());
    assert!(hash_header.more());
    r.read_array4().unwrap();
    let unique = ParamHeader::decode(r.read_u16().unwrap());
    assert_eq!(2, unique.id);
    assert!(!unique.more());
    // the inherited track starts exactly opti bytes later
    let b_offset = u32::from(opti);
    let mut r2 = Reader::new(&bytes);
    r2.seek((header.p_data + b_offset) as usize);
    assert_eq!(0, r2.read_u16().unwrap());
}

#[test]
fn template_type_override_hashes_instead_of_interning() {
    let templates = TemplateDb::parse("Effect\n\t24\tparam00024\tbytes\n");
    let db = Databases {
        track_templates: templates,
        ..Databases::empty()
    };
    let text = "\
Node N
{
\tConditionGroup
\t{
\t}
\tTracks
\t{
\t\tEffect
\t\t{
\t\t\t[00024]\t\"some_string\"
\t\t}
\t}
}
";
    let bytes = encode_text(text, &db, false);
    let mut r = Reader::new(&bytes);
    let header = Header::read(&mut r).unwrap();
    // nothing was interned
    assert_eq!(0, r.read_u32().unwrap());
    assert_eq!(0, r.read_u32().unwrap());

    // the param cell carries the value hash
    r.seek(header.p_data as usize);
    r.read_u16().unwrap(); // opti
    r.read_u16().unwrap(); // hash header
    r.read_array4().unwrap(); // track hash
    let param_header = ParamHeader::decode(r.read_u16().unwrap());
    assert_eq!(24, param_header.id);
    assert!(param_header.wide());
    assert_eq!(hash::hash_value("some_string"), r.read_array4().unwrap());
}

const RICH: &str = "\
Bank Root
{
\tConditionGroup
\t{
\t\tOnEvent
\t\t{
\t\t\t[00001]\t42
\t\t\t[00002]\t0xDEADBEEF
\t\t}
\t}
\tNode Fighter
\t{
\t\tConditionGroup
\t\t{
\t\t\tNot
\t\t\t{
\t\t\t\t[00001]
\t\t\t\t{
\t\t\t\t\tIsDead
\t\t\t\t\t{
\t\t\t\t\t\t[00001]\t3
\t\t\t\t\t}
\t\t\t\t}
\t\t\t}
\t\t}
\t\tTracks
\t\t{
\t\t\tAnimation
\t\t\t{
\t\t\t\t[00001]\ttrue
\t\t\t\t[00002]\t\"C_PLAYER\\PICKUP\"
\t\t\t\t[00003]\t1.500000
\t\t\t}
\t\t\tSound
\t\t\t{
\t\t\t\t[00001]\t\"C_PLAYER\\PICKUP\"
\t\t\t\t[00002]\th\"IDLE\"
\t\t\t}
\t\t}
\t\tNode Inner
\t\t{
\t\t\tConditionGroup
\t\t\t{
\t\t\t\tOnEvent
\t\t\t\t{
\t\t\t\t\t[00001]\t42
\t\t\t\t\t[00002]\t0xDEADBEEF
\t\t\t\t}
\t\t\t}
\t\t\tTracks
\t\t\t{
\t\t\t}
\t\t}
\t}
\tFileReference
\t{
\t\tfileName\t\"Shared.cat\"
\t\tpath\t\"ACT\\\"
\t\tincludeFile\tfalse
\t}
}
";

#[test]
fn roundtrip_is_byte_exact() {
    let db = Databases::empty();
    let first = encode_text(RICH, &db, false);
    let tree = decode(&first, &db, &DecodeOptions::default()).unwrap();
    let second = encode(&tree, &db, &EncodeOptions::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn decode_is_idempotent() {
    let db = Databases::empty();
    let bytes = encode_text(RICH, &db, false);
    let once = decode(&bytes, &db, &DecodeOptions::default()).unwrap();
    let again = decode(
        &encode(&once, &db, &EncodeOptions::default()).unwrap(),
        &db,
        &DecodeOptions::default(),
    )
    .unwrap();
    assert_eq!(once, again);
}

#[test]
fn rendered_text_reparses_identically() {
    let db = Databases::empty();
    let bytes = encode_text(RICH, &db, false);
    let tree = decode(&bytes, &db, &DecodeOptions::default()).unwrap();
    let text = write::render(&tree);
    assert_eq!(tree, parse::parse(&text).unwrap());
}

#[test]
fn shared_conditions_merge_into_one_blob() {
    // the same condition appears under two nodes; the encoder must emit one
    // blob with two pointers to it
    let db = Databases::empty();
    let bytes = encode_text(RICH, &db, false);
    let mut r = Reader::new(&bytes);
    let header = Header::read(&mut r).unwrap();
    r.read_u32().unwrap();
    r.read_u32().unwrap();

    // bank record: 1 condition slot, 2 children
    assert_eq!(b'b', r.read_u8().unwrap());
    r.read_array4().unwrap();
    assert_eq!(1, r.read_u8().unwrap());
    let bank_condition = r.read_u32().unwrap();
    assert_eq!(2, r.read_u16().unwrap());

    // fighter node: 1 condition, 2 tracks, 1 child
    assert_eq!(b'n', r.read_u8().unwrap());
    r.read_array4().unwrap();
    assert_eq!(1, r.read_u8().unwrap());
    r.read_u32().unwrap();
    assert_eq!(2, r.read_u8().unwrap());
    r.read_u32().unwrap();
    r.read_u32().unwrap();
    assert_eq!(1, r.read_u16().unwrap());

    // inner leaf: its OnEvent condition is the same blob as the bank's
    assert_eq!(b'l', r.read_u8().unwrap());
    r.read_array4().unwrap();
    assert_eq!(1, r.read_u8().unwrap());
    let inner_condition = r.read_u32().unwrap();
    assert_eq!(bank_condition, inner_condition);
    let _ = header;
}

#[test]
fn offset_laws_hold() {
    let db = Databases::empty();
    let bytes = encode_text(RICH, &db, false);
    let mut r = Reader::new(&bytes);
    let header = Header::read(&mut r).unwrap();

    assert!(header.p_groups <= header.p_data);
    assert!(header.p_data <= header.p_strings);
    assert!(header.p_strings <= header.file_length);
    assert_eq!(0, bytes.len() % 1024);

    // string table: pool offsets stay inside the pool, cell offsets inside
    // the data region
    let n_strings = r.read_u32().unwrap();
    for _ in 0..n_strings {
        let pool_offset = r.read_u32().unwrap();
        assert!(pool_offset < header.file_length - header.p_strings);
        let n = r.read_u16().unwrap();
        for _ in 0..n {
            let cell = r.read_u32().unwrap();
            assert!(cell < header.p_strings - header.p_data);
        }
    }
    let n_groups = r.read_u32().unwrap();
    for _ in 0..n_groups {
        let group_offset = r.read_u32().unwrap();
        assert!(group_offset < header.p_data - header.p_groups);
        let n = r.read_u16().unwrap();
        for _ in 0..n {
            let cell = r.read_u32().unwrap();
            assert!(cell < header.p_strings - header.p_data);
        }
    }
}

#[test]
fn unresolved_hashes_survive_roundtrip() {
    // a decode without dictionaries leaves titles as raw hashes; they must
    // encode back to the same bytes
    let db = Databases::empty();
    let bytes = encode_text(RICH, &db, false);
    let tree = decode(&bytes, &db, &DecodeOptions::default()).unwrap();
    let Tree::Bank(bank) = &tree else { panic!("expected bank") };
    assert_eq!(Title::Hash(hash::hash_title("Root")), bank.title);
    assert_eq!(
        Title::Hash(hash::hash_value("OnEvent")),
        bank.conditions[0].title
    );
    let text = write::render(&tree);
    let reencoded = encode(
        &parse::parse(&text).unwrap(),
        &db,
        &EncodeOptions::default(),
    )
    .unwrap();
    assert_eq!(bytes, reencoded);
}

#[test]
fn title_dictionary_recovers_names() {
    let mut db = Databases::empty();
    let title_entry = format!("Root {}\n", hash::pretty(hash::hash_title("Root")));
    db.title_hashes.absorb(&title_entry);
    let logic_entry = format!("OnEvent {}\n", hash::pretty(hash::hash_value("OnEvent")));
    db.logic_hashes.absorb(&logic_entry);

    let bytes = encode_text(RICH, &Databases::empty(), false);
    let tree = decode(&bytes, &db, &DecodeOptions::default()).unwrap();
    let Tree::Bank(bank) = &tree else { panic!("expected bank") };
    assert_eq!(Title::Name("Root".into()), bank.title);
    assert_eq!(Title::Name("OnEvent".into()), bank.conditions[0].title);
}

#[test]
fn generic_dictionary_recovers_hashed_strings() {
    let mut db = Databases::empty();
    let entry = format!("\"IDLE\" {}\n", hash::pretty(hash::hash_value("IDLE")));
    db.generic_hashes.absorb(&entry);

    let bytes = encode_text(RICH, &Databases::empty(), false);
    let tree = decode(&bytes, &db, &DecodeOptions::default()).unwrap();
    let Tree::Bank(bank) = &tree else { panic!("expected bank") };
    let Tree::Node(fighter) = &bank.children[0] else { panic!("expected node") };
    let sound = &fighter.tracks[1];
    assert_eq!(Value::HashedStr("IDLE".into()), sound.params[1].value);
}
