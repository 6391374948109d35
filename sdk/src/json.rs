//! Conversion between [Value] trees and JSON documents.
//!
//! JSON carries no type information of its own, so reading JSON is driven by
//! the schema: integers become the [Value] variant of the field's type, enum
//! fields accept value names, and a union field `x` is typed by its sibling
//! `x_type` naming the member table.

use std::collections::HashMap;
use brine_flat_compiler::FlatError;
use brine_flat_schema::{BaseType, EnumId, Schema, StructId, Type, Value};
use serde_json::{Map, Number, Value as Json};

/// Render a [Value] as JSON. Enum values are written by name, objects keep
/// only the fields that are set.
pub fn value_to_json(value: &Value<'_>) -> Json {
    match value {
        Value::Bool(value) => Json::Bool(*value),
        Value::Byte(value) => Json::from(*value),
        Value::UByte(value) => Json::from(*value),
        Value::Short(value) => Json::from(*value),
        Value::UShort(value) => Json::from(*value),
        Value::Int(value) => Json::from(*value),
        Value::UInt(value) => Json::from(*value),
        Value::Long(value) => Json::from(*value),
        Value::ULong(value) => Json::from(*value),
        Value::Float(value) => float(*value as f64),
        Value::Double(value) => float(*value),
        Value::String(value) => Json::String(value.clone()),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Enum(_, name) => Json::String((*name).to_owned()),
        Value::Object(_, fields) => {
            let mut object = Map::new();
            for (name, value) in fields {
                object.insert((*name).to_owned(), value_to_json(value));
            }
            Json::Object(object)
        }
    }
}

// NaN and infinities have no JSON form.
fn float(value: f64) -> Json {
    Number::from_f64(value).map_or(Json::Null, Json::Number)
}

fn mismatch(path: &str, expected: &str, found: &Json) -> FlatError {
    FlatError::EncodeError(format!("{}: expected {}, found {}", path, expected, found))
}

/// Read a JSON object as the table or struct `struct_id` of `schema`.
pub fn json_to_value<'a>(schema: &'a Schema, struct_id: StructId, json: &Json) -> Result<Value<'a>, FlatError> {
    object_to_value(schema, struct_id, json, schema.struct_name(struct_id))
}

fn object_to_value<'a>(schema: &'a Schema, struct_id: StructId, json: &Json, path: &str) -> Result<Value<'a>, FlatError> {
    let def = schema.struct_def(struct_id);
    let object = json
        .as_object()
        .ok_or_else(|| mismatch(path, &format!("an object of type {}", def.qualified_name()), json))?;

    let mut fields = HashMap::new();
    for (name, item) in object {
        let field = def.field(name).ok_or_else(|| {
            FlatError::EncodeError(format!("{}: {} has no field named {}", path, def.qualified_name(), name))
        })?;
        let field_path = format!("{}.{}", path, name);

        let value = match &field.ty {
            // Only used to pick the member of the union next to it.
            Type::UType(_) => continue,
            Type::Union(union_id) => {
                let type_name = format!("{}_type", name);
                let tag = object
                    .get(&type_name)
                    .ok_or_else(|| FlatError::EncodeError(format!("{}: missing {}", path, type_name)))?;
                let member = union_member(schema, *union_id, tag, &field_path)?;
                object_to_value(schema, member, item, &field_path)?
            }
            ty => element_to_value(schema, ty, item, &field_path)?,
        };
        fields.insert(field.name.as_str(), value);
    }
    Ok(Value::Object(schema.struct_name(struct_id), fields))
}

fn union_member(schema: &Schema, union_id: EnumId, tag: &Json, path: &str) -> Result<StructId, FlatError> {
    let def = schema.enum_def(union_id);
    let value = match tag {
        Json::String(name) => def.value_by_name(name),
        Json::Number(number) => number.as_i64().and_then(|number| def.value_by_number(number)),
        _ => None,
    };
    value
        .and_then(|value| value.union_type)
        .ok_or_else(|| mismatch(path, &format!("a member of {}", def.def.qualified_name()), tag))
}

fn element_to_value<'a>(schema: &'a Schema, ty: &Type, json: &Json, path: &str) -> Result<Value<'a>, FlatError> {
    match ty {
        Type::String => match json {
            Json::String(text) => Ok(Value::String(text.clone())),
            _ => Err(mismatch(path, "a string", json)),
        },
        Type::Vector(element) | Type::Array(element, _) => {
            let items = json.as_array().ok_or_else(|| mismatch(path, "an array", json))?;
            let mut values = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                values.push(element_to_value(schema, element, item, &format!("{}[{}]", path, index))?);
            }
            Ok(Value::Array(values))
        }
        Type::Struct(id) => object_to_value(schema, *id, json, path),
        Type::Enum(id) => enum_to_value(schema, *id, json, path),
        Type::Union(_) | Type::UType(_) | Type::None => {
            Err(FlatError::EncodeError(format!("{}: {} cannot be read from JSON here", path, schema.type_name(ty))))
        }
        _ => scalar_to_value(schema.base_type(ty), json, path),
    }
}

/// Enum values are written by name. Bit flag enums also accept several
/// names separated by spaces, which are or-ed together.
fn enum_to_value<'a>(schema: &'a Schema, enum_id: EnumId, json: &Json, path: &str) -> Result<Value<'a>, FlatError> {
    let def = schema.enum_def(enum_id);
    let text = match json {
        Json::String(text) => text,
        _ => return scalar_to_value(def.underlying, json, path),
    };

    if let Some(value) = def.value_by_name(text) {
        return Ok(Value::Enum(schema.enum_name(enum_id), value.name.as_str()));
    }
    if def.bit_flags {
        let mut bits = 0i64;
        for name in text.split_whitespace() {
            let value = def
                .value_by_name(name)
                .ok_or_else(|| mismatch(path, &format!("a value of {}", def.def.qualified_name()), json))?;
            bits |= value.value;
        }
        return scalar_to_value(def.underlying, &Json::from(bits), path);
    }
    Err(mismatch(path, &format!("a value of {}", def.def.qualified_name()), json))
}

fn scalar_to_value<'a>(base: BaseType, json: &Json, path: &str) -> Result<Value<'a>, FlatError> {
    let out_of_range = || mismatch(path, &format!("a {}", base.name()), json);

    if base == BaseType::Bool {
        return match json {
            Json::Bool(value) => Ok(Value::Bool(*value)),
            Json::Number(number) => match number.as_u64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(out_of_range()),
            },
            _ => Err(out_of_range()),
        };
    }

    let number = match json {
        Json::Number(number) => number,
        _ => return Err(out_of_range()),
    };
    if base.is_float() {
        let value = number.as_f64().ok_or_else(out_of_range)?;
        return Ok(match base {
            BaseType::Float => Value::Float(value as f32),
            _ => Value::Double(value),
        });
    }

    let value: i128 = match (number.as_i64(), number.as_u64()) {
        (Some(value), _) => value as i128,
        (None, Some(value)) => value as i128,
        (None, None) => return Err(out_of_range()),
    };
    match base.integer_range() {
        Some((low, high)) if value >= low && value <= high => {}
        _ => return Err(out_of_range()),
    }
    Ok(match base {
        BaseType::Char => Value::Byte(value as i8),
        BaseType::UChar | BaseType::UType => Value::UByte(value as u8),
        BaseType::Short => Value::Short(value as i16),
        BaseType::UShort => Value::UShort(value as u16),
        BaseType::Int => Value::Int(value as i32),
        BaseType::UInt => Value::UInt(value as u32),
        BaseType::Long => Value::Long(value as i64),
        BaseType::ULong => Value::ULong(value as u64),
        _ => return Err(out_of_range()),
    })
}
