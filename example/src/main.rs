// example/src/main.rs

use std::collections::HashMap;
use brine_flat::*;
use brine_flat_schema::{Key, KeyKind, StructDef};

const MONSTER_FBS: &str = include_str!("../monster.fbs");

fn field_id(def: &StructDef, name: &str) -> Result<u16, FlatError> {
    def.field(name)
        .map(|field| field.id)
        .ok_or_else(|| FlatError::EncodeError(format!("{} has no field {}", def.qualified_name(), name)))
}

fn main() -> Result<(), FlatError> {
    let schema = compile_schema(MONSTER_FBS)?;
    let monster_id = schema.find_struct("Game.Sample.Monster").ok_or_else(|| FlatError::DecodeError("no Monster".into()))?;
    let weapon_id = schema.find_struct("Game.Sample.Weapon").ok_or_else(|| FlatError::DecodeError("no Weapon".into()))?;
    let monster = schema.struct_def(monster_id);
    let weapon = schema.struct_def(weapon_id);

    // 1) Build a buffer by hand, children first.
    let mut builder = Builder::new();

    let mut weapons = Vec::new();
    for (name, damage) in [("Sword", 3i16), ("Axe", 5)] {
        let name = builder.create_string(name)?;
        builder.start_table()?;
        builder.add_offset(field_id(weapon, "name")?, name)?;
        builder.add_field(field_id(weapon, "damage")?, damage)?;
        weapons.push(builder.end_table()?);
    }
    let equipped = weapons[0];
    let weapons = builder.create_sorted_vector_of_tables(&weapons, |table| {
        KeyKind::String.read_from_table(table, 0, None)
    })?;
    let name = builder.create_string("Orc")?;
    let inventory = builder.create_vector(&[0u8, 1, 2, 3, 4])?;

    let mut pos = Vec::with_capacity(12);
    for coordinate in [1.0f32, 2.0, 3.0] {
        pos.extend_from_slice(&coordinate.to_le_bytes());
    }
    let pos_layout = schema.struct_layout(schema.find_struct("Game.Sample.Vec3").ok_or_else(|| FlatError::DecodeError("no Vec3".into()))?);

    builder.start_table()?;
    builder.add_struct(field_id(monster, "pos")?, &pos, pos_layout.align)?;
    builder.add_field_default(field_id(monster, "mana")?, 150i16, 150)?;
    builder.add_field_default(field_id(monster, "hp")?, 300i16, 100)?;
    builder.add_offset(field_id(monster, "name")?, name)?;
    builder.add_offset(field_id(monster, "inventory")?, inventory)?;
    builder.add_field(field_id(monster, "color")?, 0i8)?;
    builder.add_offset(field_id(monster, "weapons")?, weapons)?;
    builder.add_field(field_id(monster, "equipped_type")?, 1u8)?;
    builder.add_offset(field_id(monster, "equipped")?, equipped)?;
    let orc = builder.end_table()?;
    builder.check_required(orc, &[field_id(monster, "name")?])?;
    builder.finish_with_identifier(orc, b"MONS")?;

    let bytes = builder.into_finished_data()?;
    println!("buffer: {} bytes", bytes.len());

    // 2) Read it back without copying.
    let buffer = Buffer::new(&bytes);
    println!("identifier MONS = {}", buffer.has_identifier(b"MONS"));
    let root = buffer.root()?;
    println!("name = {:?}", root.get_string(field_id(monster, "name")?)?);
    println!("hp   = {}", root.get_scalar::<i16>(field_id(monster, "hp")?, 100)?);
    println!("mana = {} (default, not stored)", root.get_scalar::<i16>(field_id(monster, "mana")?, 150)?);

    if let Some(pos) = root.get_struct(field_id(monster, "pos")?)? {
        println!("pos  = ({}, {}, {})", pos.get::<f32>(0)?, pos.get::<f32>(4)?, pos.get::<f32>(8)?);
    }
    if let Some(weapons) = root.get_vector(field_id(monster, "weapons")?)? {
        let axe = weapons.lookup_table_by_key(&Key::Bytes(b"Axe"), |table| {
            KeyKind::String.read_from_table(table, 0, None)
        })?;
        if let Some(axe) = axe {
            println!("Axe damage = {}", axe.get_scalar::<i16>(1, 0)?);
        }
    }

    // 3) The same data as a dynamic value, and a copy with a change.
    let mut value = Value::decode_root(&schema, &bytes)?;
    println!("{:?}", value);

    value.set("hp", Value::Short(80));
    value.remove("equipped");
    let mut fields = HashMap::new();
    fields.insert("name", Value::String("Bow".to_owned()));
    fields.insert("damage", Value::Short(2));
    if let Value::Object(_, ref mut monster_fields) = value {
        if let Some(Value::Array(weapons)) = monster_fields.get_mut("weapons") {
            weapons.push(Value::Object("Game.Sample.Weapon", fields));
        }
    }
    let copy = value.encode(&schema)?;
    println!("{}", decode_to_json(&schema, &copy)?);

    Ok(())
}
