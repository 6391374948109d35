#![cfg(test)]

use brine_flat_schema::*;

fn def(name: &str) -> Definition {
    Definition::new(name, Namespace::parse("Game"))
}

// table Monster { name: string (required); hp: short = 100; mana: short = 150; tags: [ubyte]; }
fn monster_schema() -> Schema {
    Schema::new(
        vec![StructDef::table(def("Monster"), vec![
            FieldDef::new("name", 0, Type::String).with_required(),
            FieldDef::new("hp", 1, Type::Short).with_default(DefaultValue::Integer(100)),
            FieldDef::new("mana", 2, Type::Short).with_default(DefaultValue::Integer(150)),
            FieldDef::new("tags", 3, Type::Vector(Box::new(Type::UChar))),
        ])],
        vec![],
    )
    .expect("schema")
    .with_root(StructId(0))
    .expect("root")
}

fn build_monster(builder: &mut Builder, name: &str, hp: Option<i16>) -> Offset {
    let name = builder.create_string(name).unwrap();
    builder.start_table().unwrap();
    builder.add_offset(0, name).unwrap();
    if let Some(hp) = hp {
        builder.add_field(1, hp).unwrap();
    }
    builder.end_table().unwrap()
}

#[test]
fn test_absent_fields_read_defaults() {
    let mut builder = Builder::new();
    let root = build_monster(&mut builder, "Orc", None);
    builder.finish(root).unwrap();

    let bytes = builder.finished_data().unwrap();
    let table = Buffer::new(bytes).root().unwrap();

    // Only the name is stored.
    assert_eq!(table.live_fields(), Ok(1));
    assert_eq!(table.get_string(0), Ok(Some("Orc")));
    assert_eq!(table.get_scalar::<i16>(1, 100), Ok(100));
    assert_eq!(table.get_scalar::<i16>(2, 150), Ok(150));
    assert_eq!(table.get_vector(3).map(|v| v.is_some()), Ok(false));

    let schema = monster_schema();
    let value = Value::decode_root(&schema, bytes).unwrap();
    assert_eq!(
        format!("{:?}", value),
        "Game.Monster {hp: 100, mana: 150, name: \"Orc\"}"
    );
}

#[test]
fn test_vtable_has_one_slot_per_field_up_to_the_highest_id() {
    let mut builder = Builder::new();
    builder.start_table().unwrap();
    builder.add_field(0, 1u8).unwrap();
    builder.add_field(4, 2u32).unwrap();
    let root = builder.end_table().unwrap();
    builder.finish(root).unwrap();

    let table = Buffer::new(builder.finished_data().unwrap()).root().unwrap();
    assert_eq!(table.vtable_len(), Ok(5));
    assert_eq!(table.live_fields(), Ok(2));
    assert_eq!(table.get_scalar_opt::<u32>(4), Ok(Some(2)));
    assert_eq!(table.get_scalar_opt::<u32>(3), Ok(None));

    // Ids past the end of the vtable were written by an older schema.
    assert_eq!(table.get_scalar::<u32>(9, 7), Ok(7));
}

#[test]
fn test_identical_vtables_are_written_once() {
    let mut builder = Builder::new();
    let first = build_monster(&mut builder, "Orc", Some(1));
    let before = builder.used();
    let second = build_monster(&mut builder, "Elf", Some(2));
    let grown = builder.used() - before;

    // The second table costs its string, its fields and its soffset, but no
    // new vtable.
    let string = 4 + 4; // length, "Elf" and its NUL
    let table = 4 + 4 + 2 + 2; // soffset, name, hp, padding
    assert_eq!(grown, string + table);

    let list = builder.create_vector_of_offsets(&[first, second]).unwrap();
    builder.start_table().unwrap();
    builder.add_offset(0, list).unwrap();
    let root = builder.end_table().unwrap();
    builder.finish(root).unwrap();

    let bytes = builder.finished_data().unwrap();
    let monsters = Buffer::new(bytes).root().unwrap().get_vector(0).unwrap().unwrap();
    let a = monsters.get_table(0).unwrap();
    let b = monsters.get_table(1).unwrap();
    let vtable = |loc: usize| loc as i64 - i32::from_le_bytes(bytes[loc..loc + 4].try_into().unwrap()) as i64;
    assert_eq!(vtable(a.location()), vtable(b.location()));
    assert_eq!(b.get_string(0), Ok(Some("Elf")));
    assert_eq!(b.get_scalar::<i16>(1, 100), Ok(2));
}

#[test]
fn test_sorted_structs_and_binary_search() {
    // struct Stat { id: ushort (key); value: ushort; }
    let mut data = Vec::new();
    for (id, value) in [(30u16, 0u16), (10, 1), (20, 2)] {
        data.extend_from_slice(&id.to_le_bytes());
        data.extend_from_slice(&value.to_le_bytes());
    }

    let mut builder = Builder::new();
    let stats = builder
        .create_sorted_vector_of_structs(&data, 4, 2, |s| Ok(Key::UInt(s.get::<u16>(0)? as u64)))
        .unwrap();
    builder.start_table().unwrap();
    builder.add_offset(0, stats).unwrap();
    let root = builder.end_table().unwrap();
    builder.finish(root).unwrap();

    let bytes = builder.finished_data().unwrap();
    let stats = Buffer::new(bytes).root().unwrap().get_vector(0).unwrap().unwrap();
    let ids: Vec<u16> = (0..stats.len()).map(|i| stats.get_struct(i, 4).unwrap().get(0).unwrap()).collect();
    assert_eq!(ids, [10, 20, 30]);

    let found = stats
        .lookup_struct_by_key(&Key::UInt(20), 4, |s| Ok(Key::UInt(s.get::<u16>(0)? as u64)))
        .unwrap()
        .unwrap();
    assert_eq!(found.get::<u16>(2), Ok(2));
    let missing = stats
        .lookup_struct_by_key(&Key::UInt(25), 4, |s| Ok(Key::UInt(s.get::<u16>(0)? as u64)))
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_finish_errors() {
    let mut builder = Builder::new();
    builder.start_table().unwrap();
    assert_eq!(builder.start_table(), Err(BuilderError::Nested));
    assert_eq!(builder.create_string("nested"), Err(BuilderError::Nested));
    let root = builder.end_table().unwrap();

    // An offset from another builder is not a root of this one.
    assert_eq!(Builder::new().finish(root), Err(BuilderError::MissingRoot));

    builder.finish(root).unwrap();
    assert_eq!(builder.finish(root), Err(BuilderError::Finished));
    assert_eq!(builder.create_string("late"), Err(BuilderError::Finished));
}

#[test]
fn test_file_identifier() {
    let schema = monster_schema().with_file_identifier(*b"MONS");
    let mut orc = Value::Object("Game.Monster", Default::default());
    orc.set("name", Value::String("Orc".to_owned()));

    let bytes = orc.encode(&schema).unwrap();
    let buffer = Buffer::new(&bytes);
    assert_eq!(buffer.identifier(), Some(&b"MONS"[..]));
    assert!(buffer.has_identifier(b"MONS"));
    assert!(!buffer.has_identifier(b"ELFS"));
}

#[test]
fn test_encoding_is_deterministic() {
    let schema = monster_schema();
    let mut orc = Value::Object("Game.Monster", Default::default());
    orc.set("name", Value::String("Orc".to_owned()));
    orc.set("hp", Value::Short(80));
    orc.set("tags", Value::Array(vec![Value::UByte(1), Value::UByte(2)]));

    let first = orc.encode(&schema).unwrap();
    let second = orc.encode(&schema).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len() % 4, 0);
}

#[test]
fn test_layout_report() {
    let schema = monster_schema();
    let layout = schema.struct_layout(StructId(0));
    assert!(!layout.fixed);
    assert_eq!(layout.vtable_size(), 4 + 2 * 4);

    let voffsets: Vec<u16> = layout.fields.iter().map(|f| f.voffset).collect();
    assert_eq!(voffsets, [4, 6, 8, 10]);
}
