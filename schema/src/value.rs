use crate::bb::Scalar;
use crate::builder::{Builder, Offset};
use crate::error::{BuilderError, EncodeError, LayoutError, ReadError};
use crate::layout::KeyKind;
use crate::reader::{Buffer, Struct, Table, Vector};
use crate::schema::{BaseType, DefaultValue, EnumId, FieldDef, Schema, StructDef, StructId, Type};

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;

/// This type holds dynamic data described by a [Schema].
///
/// Values can represent anything in a schema and can be converted to and
/// from finished buffers using that [Schema]. Enum, type and field names are
/// stored using string slices from the Schema for efficiency. This means that
/// a Value can outlive the buffer it was decoded from but can't outlive the
/// schema.
#[derive(Clone, PartialEq)]
pub enum Value<'a> {
    Bool(bool),
    Byte(i8),
    UByte(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    String(String),
    Array(Vec<Value<'a>>),
    /// Qualified enum name and value name.
    Enum(&'a str, &'a str),
    /// Qualified struct or table name and the fields that are set.
    Object(&'a str, HashMap<&'a str, Value<'a>>),
}

impl<'a> Value<'a> {
    /// A convenience method to extract the value out of a [Bool](#variant.Bool).
    /// Returns `false` for other value kinds.
    pub fn as_bool(&self) -> bool {
        match *self {
            Value::Bool(value) => value,
            _ => false,
        }
    }

    /// A convenience method to extract the value out of a [UByte](#variant.UByte).
    /// Returns `0` for other value kinds.
    pub fn as_ubyte(&self) -> u8 {
        match *self {
            Value::UByte(value) => value,
            _ => 0,
        }
    }

    /// A convenience method to extract the value out of a [Short](#variant.Short).
    /// Returns `0` for other value kinds.
    pub fn as_short(&self) -> i16 {
        match *self {
            Value::Short(value) => value,
            _ => 0,
        }
    }

    /// A convenience method to extract the value out of an [Int](#variant.Int).
    /// Returns `0` for other value kinds.
    pub fn as_int(&self) -> i32 {
        match *self {
            Value::Int(value) => value,
            _ => 0,
        }
    }

    /// A convenience method to extract the value out of a [UInt](#variant.UInt).
    /// Returns `0` for other value kinds.
    pub fn as_uint(&self) -> u32 {
        match *self {
            Value::UInt(value) => value,
            _ => 0,
        }
    }

    /// A convenience method to extract the value out of a [Long](#variant.Long).
    /// Returns `0` for other value kinds.
    pub fn as_long(&self) -> i64 {
        match *self {
            Value::Long(value) => value,
            _ => 0,
        }
    }

    /// A convenience method to extract the value out of a [ULong](#variant.ULong).
    /// Returns `0` for other value kinds.
    pub fn as_ulong(&self) -> u64 {
        match *self {
            Value::ULong(value) => value,
            _ => 0,
        }
    }

    /// A convenience method to extract the value out of a [Float](#variant.Float).
    /// Returns `0.0` for other value kinds.
    pub fn as_float(&self) -> f32 {
        match *self {
            Value::Float(value) => value,
            _ => 0.0,
        }
    }

    /// A convenience method to extract the value out of a [Double](#variant.Double).
    /// Returns `0.0` for other value kinds.
    pub fn as_double(&self) -> f64 {
        match *self {
            Value::Double(value) => value,
            _ => 0.0,
        }
    }

    /// A convenience method to extract the value out of a [String](#variant.String).
    /// Returns `""` for other value kinds.
    pub fn as_string(&self) -> &str {
        match *self {
            Value::String(ref value) => value.as_str(),
            Value::Enum(_, value) => value,
            _ => "",
        }
    }

    /// A convenience method to get an array of values out of an [Array](#variant.Array).
    /// Returns an empty array for other value kinds.
    pub fn as_array(&self) -> &[Value<'a>] {
        match *self {
            Value::Array(ref values) => values.as_slice(),
            _ => &[],
        }
    }

    /// A convenience method to extract the value out of an [Enum](#variant.Enum).
    /// Returns `("", "")` for other value kinds.
    pub fn as_enum(&self) -> (&str, &str) {
        match *self {
            Value::Enum(name, value) => (name, value),
            _ => ("", ""),
        }
    }

    /// A convenience method to extract the length out of an [Array](#variant.Array).
    /// Returns `0` for other value kinds.
    pub fn len(&self) -> usize {
        match *self {
            Value::Array(ref values) => values.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A convenience method to append to an [Array](#variant.Array). Does
    /// nothing for other value kinds.
    pub fn push(&mut self, value: Value<'a>) {
        if let Value::Array(ref mut values) = *self {
            values.push(value);
        }
    }

    /// A convenience method to extract a field out of an [Object](#variant.Object).
    /// Returns `None` for other value kinds or if the field isn't present.
    pub fn get(&self, name: &str) -> Option<&Value<'a>> {
        match *self {
            Value::Object(_, ref fields) => fields.get(name),
            _ => None,
        }
    }

    /// A convenience method to update a field on an [Object](#variant.Object).
    /// Does nothing for other value kinds.
    pub fn set(&mut self, name: &'a str, value: Value<'a>) {
        if let Value::Object(_, ref mut fields) = *self {
            fields.insert(name, value);
        }
    }

    /// A convenience method to remove a field on an [Object](#variant.Object).
    /// Does nothing for other value kinds.
    pub fn remove(&mut self, name: &'a str) {
        if let Value::Object(_, ref mut fields) = *self {
            fields.remove(name);
        }
    }

    /// Decodes the table `struct_id` from the root of the finished buffer
    /// `bytes`.
    pub fn decode(schema: &'a Schema, struct_id: StructId, bytes: &[u8]) -> Result<Value<'a>, ReadError> {
        let root = Buffer::new(bytes).root()?;
        Value::decode_table(schema, struct_id, &root)
    }

    /// Like [decode](#method.decode), using the schema's root type.
    pub fn decode_root(schema: &'a Schema, bytes: &[u8]) -> Result<Value<'a>, ReadError> {
        let root = schema
            .root_struct()
            .ok_or_else(|| ReadError::UnknownType("root_type".to_owned()))?;
        Value::decode(schema, root, bytes)
    }

    /// Encodes this object as the root of a new finished buffer. The
    /// schema's file identifier is written when it declares one.
    pub fn encode(&self, schema: &Schema) -> Result<Vec<u8>, EncodeError> {
        let id = self.object_type(schema)?;
        if schema.struct_def(id).fixed {
            return Err(EncodeError::TypeMismatch {
                field:    "root".to_owned(),
                expected: "a table".to_owned(),
            });
        }

        let mut builder = Builder::new();
        let root = self.encode_table(schema, id, &mut builder)?;
        match schema.file_identifier() {
            Some(identifier) => builder.finish_with_identifier(root, identifier)?,
            None => builder.finish(root)?,
        }
        Ok(builder.into_finished_data()?)
    }

    /// Decodes the table `struct_id` from `table`. Absent scalar fields
    /// decode to their default, absent strings, vectors, structs, tables and
    /// unions are left out, deprecated fields are skipped. This is mainly
    /// useful as a helper routine for [decode](#method.decode), which you
    /// probably want to use instead.
    pub fn decode_table(schema: &'a Schema, struct_id: StructId, table: &Table<'_>) -> Result<Value<'a>, ReadError> {
        let def = schema.struct_def(struct_id);
        let mut fields = HashMap::new();

        for field in &def.fields {
            if field.deprecated {
                continue;
            }

            let value = match &field.ty {
                Type::UType(_) => match table.get_raw(field.id, 1)? {
                    Some(bytes) => Some(scalar_to_value(schema, &field.ty, RawScalar::read(BaseType::UType, bytes)?)),
                    None => None,
                },
                ty if ty.is_scalar() => {
                    let base = schema.base_type(&field.ty);
                    let raw = match table.get_raw(field.id, base.size())? {
                        Some(bytes) => RawScalar::read(base, bytes)?,
                        None => RawScalar::from_default(base, field.default)?,
                    };
                    Some(scalar_to_value(schema, &field.ty, raw))
                }
                Type::String => table.get_string(field.id)?.map(|value| Value::String(value.to_owned())),
                Type::Vector(element) => match table.get_vector(field.id)? {
                    Some(vector) => Some(Value::decode_vector(schema, element, &vector)?),
                    None => None,
                },
                Type::Struct(id) if schema.struct_def(*id).fixed => match table.get_struct(field.id)? {
                    Some(value) => Some(Value::decode_struct(schema, *id, &value)?),
                    None => None,
                },
                Type::Struct(id) => match table.get_table(field.id)? {
                    Some(child) => Some(Value::decode_table(schema, *id, &child)?),
                    None => None,
                },
                Type::Union(union_id) => {
                    match table.get_union(field.id.saturating_sub(1), field.id)? {
                        Some((tag, child)) => {
                            let member = schema
                                .enum_def(*union_id)
                                .value_by_number(tag as i64)
                                .and_then(|value| value.union_type)
                                .ok_or_else(|| {
                                    ReadError::UnknownType(format!("{} member {}", schema.enum_name(*union_id), tag))
                                })?;
                            Some(Value::decode_table(schema, member, &child)?)
                        }
                        None => None,
                    }
                }
                _ => {
                    return Err(ReadError::TypeMismatch {
                        expected: "a table field".to_owned(),
                        found:    schema.type_name(&field.ty),
                    })
                }
            };

            if let Some(value) = value {
                fields.insert(field.name.as_str(), value);
            }
        }

        Ok(Value::Object(schema.struct_name(struct_id), fields))
    }

    fn decode_vector(schema: &'a Schema, element: &Type, vector: &Vector<'_>) -> Result<Value<'a>, ReadError> {
        let mut items = Vec::with_capacity(vector.len());
        for index in 0..vector.len() {
            items.push(match element {
                ty if ty.is_scalar() => {
                    let base = schema.base_type(element);
                    let raw = RawScalar::read(base, vector.get_raw(index, base.size())?)?;
                    scalar_to_value(schema, element, raw)
                }
                Type::String => Value::String(vector.get_string(index)?.to_owned()),
                Type::Struct(id) if schema.struct_def(*id).fixed => {
                    let size = schema.struct_layout(*id).size;
                    Value::decode_struct(schema, *id, &vector.get_struct(index, size)?)?
                }
                Type::Struct(id) => Value::decode_table(schema, *id, &vector.get_table(index)?)?,
                Type::Vector(inner) => Value::decode_vector(schema, inner, &vector.get_vector(index)?)?,
                _ => {
                    return Err(ReadError::TypeMismatch {
                        expected: "a vector element".to_owned(),
                        found:    schema.type_name(element),
                    })
                }
            });
        }
        Ok(Value::Array(items))
    }

    fn decode_struct(schema: &'a Schema, struct_id: StructId, value: &Struct<'_>) -> Result<Value<'a>, ReadError> {
        let def = schema.struct_def(struct_id);
        let layout = schema.struct_layout(struct_id);
        let mut fields = HashMap::new();
        for (field, slot) in def.fields.iter().zip(&layout.fields) {
            fields.insert(
                field.name.as_str(),
                Value::decode_inline(schema, &field.ty, value, slot.offset, slot.size)?,
            );
        }
        Ok(Value::Object(schema.struct_name(struct_id), fields))
    }

    fn decode_inline(
        schema: &'a Schema,
        ty: &Type,
        value: &Struct<'_>,
        offset: usize,
        size: usize,
    ) -> Result<Value<'a>, ReadError> {
        match ty {
            ty if ty.is_scalar() => {
                let base = schema.base_type(ty);
                let raw = RawScalar::read(base, value.get_raw(offset, base.size())?)?;
                Ok(scalar_to_value(schema, ty, raw))
            }
            Type::Struct(id) => Value::decode_struct(schema, *id, &value.get_struct(offset)),
            Type::Array(element, len) => {
                let stride = size / (*len).max(1) as usize;
                let mut items = Vec::with_capacity(*len as usize);
                for index in 0..*len as usize {
                    items.push(Value::decode_inline(schema, element, value, offset + index * stride, stride)?);
                }
                Ok(Value::Array(items))
            }
            _ => Err(ReadError::TypeMismatch {
                expected: "an inline value".to_owned(),
                found:    schema.type_name(ty),
            }),
        }
    }

    fn object_type(&self, schema: &Schema) -> Result<StructId, EncodeError> {
        match *self {
            Value::Object(name, _) => schema
                .find_struct(name)
                .ok_or_else(|| EncodeError::UnknownType(name.to_owned())),
            _ => Err(EncodeError::TypeMismatch {
                field:    "root".to_owned(),
                expected: "an object".to_owned(),
            }),
        }
    }

    fn object_fields(&self, def: &StructDef) -> Result<&HashMap<&'a str, Value<'a>>, EncodeError> {
        match *self {
            Value::Object(_, ref fields) => {
                for name in fields.keys() {
                    if def.field(name).is_none() {
                        return Err(EncodeError::UnknownField {
                            owner: def.qualified_name(),
                            field: (*name).to_owned(),
                        });
                    }
                }
                Ok(fields)
            }
            _ => Err(EncodeError::TypeMismatch {
                field:    def.qualified_name(),
                expected: "an object".to_owned(),
            }),
        }
    }

    /// Encodes this object as the table `struct_id` into `builder` and
    /// returns its offset. Children are written first, then the fields in
    /// id order. Every field that is set is written, even when it equals its
    /// default. This is mainly useful as a helper routine for
    /// [encode](#method.encode), which you probably want to use instead.
    pub fn encode_table(&self, schema: &Schema, struct_id: StructId, builder: &mut Builder) -> Result<Offset, EncodeError> {
        let def = schema.struct_def(struct_id);
        let fields = self.object_fields(def)?;
        let mut slots = Vec::new();

        for field in &def.fields {
            if field.deprecated {
                continue;
            }
            let value = match fields.get(field.name.as_str()) {
                Some(value) => value,
                None => continue,
            };

            match &field.ty {
                // Derived from the union value itself.
                Type::UType(_) => {}
                ty if ty.is_scalar() => {
                    slots.push((field.id, Slot::Scalar(scalar_from_value(schema, &field.name, &field.ty, value)?)));
                }
                Type::Union(union_id) => {
                    let (tag, offset) = value.encode_union(schema, *union_id, builder)?;
                    slots.push((field.id.saturating_sub(1), Slot::Scalar(RawScalar::UChar(tag))));
                    slots.push((field.id, Slot::Offset(offset)));
                }
                Type::String => {
                    let offset = builder.create_string(string_of(&field.name, value)?)?;
                    slots.push((field.id, Slot::Offset(offset)));
                }
                Type::Vector(element) => {
                    let offset = value.encode_vector(schema, def, field, element, builder)?;
                    slots.push((field.id, Slot::Offset(offset)));
                }
                Type::Struct(id) if schema.struct_def(*id).fixed => {
                    let layout = schema.struct_layout(*id);
                    let mut bytes = vec![0; layout.size];
                    value.write_struct(schema, *id, &mut bytes)?;
                    slots.push((field.id, Slot::Inline(bytes, layout.align)));
                }
                Type::Struct(id) => {
                    let offset = value.encode_table(schema, *id, builder)?;
                    slots.push((field.id, Slot::Offset(offset)));
                }
                _ => return Err(unsupported(schema, def, field, &field.ty, "a table")),
            }
        }

        slots.sort_by_key(|(id, _)| *id);
        builder.start_table()?;
        for (id, slot) in slots {
            match slot {
                Slot::Scalar(raw) => raw.add_to(builder, id)?,
                Slot::Offset(offset) => builder.add_offset(id, offset)?,
                Slot::Inline(bytes, align) => builder.add_struct(id, &bytes, align)?,
            }
        }
        let table = builder.end_table()?;

        let required: Vec<u16> = def
            .fields
            .iter()
            .filter(|field| field.required && !field.deprecated)
            .map(|field| field.id)
            .collect();
        builder.check_required(table, &required).map_err(|error| match error {
            BuilderError::MissingRequired(id) => EncodeError::MissingRequired {
                owner: def.qualified_name(),
                field: def
                    .field_by_id(id)
                    .map_or_else(|| id.to_string(), |field| field.name.clone()),
            },
            other => other.into(),
        })?;

        Ok(table)
    }

    fn encode_union(&self, schema: &Schema, union_id: EnumId, builder: &mut Builder) -> Result<(u8, Offset), EncodeError> {
        let member_id = self.object_type(schema)?;
        let member = schema
            .enum_def(union_id)
            .member_for(member_id)
            .ok_or_else(|| {
                EncodeError::UnionMismatch(
                    schema.struct_name(member_id).to_owned(),
                    schema.enum_name(union_id).to_owned(),
                )
            })?;
        let tag = u8::try_from(member.value).map_err(|_| EncodeError::OutOfRange {
            field: schema.enum_name(union_id).to_owned(),
            value: member.value.to_string(),
        })?;
        Ok((tag, self.encode_table(schema, member_id, builder)?))
    }

    fn encode_vector(
        &self,
        schema: &Schema,
        owner: &StructDef,
        field: &FieldDef,
        element: &Type,
        builder: &mut Builder,
    ) -> Result<Offset, EncodeError> {
        let items = match *self {
            Value::Array(ref items) => items,
            _ => {
                return Err(EncodeError::TypeMismatch {
                    field:    field.name.clone(),
                    expected: "an array".to_owned(),
                })
            }
        };

        let offset = match element {
            ty if ty.is_scalar() => {
                let size = schema.base_type(element).size();
                let mut bytes = vec![0; size * items.len()];
                for (index, item) in items.iter().enumerate() {
                    scalar_from_value(schema, &field.name, element, item)?.write(&mut bytes[index * size..]);
                }
                builder.create_vector_of_structs(&bytes, size, size)?
            }
            Type::String => {
                let mut offsets = Vec::with_capacity(items.len());
                for item in items {
                    offsets.push(builder.create_string(string_of(&field.name, item)?)?);
                }
                builder.create_vector_of_offsets(&offsets)?
            }
            Type::Struct(id) if schema.struct_def(*id).fixed => {
                let def = schema.struct_def(*id);
                let layout = schema.struct_layout(*id);
                let mut bytes = vec![0; layout.size * items.len()];
                for (index, item) in items.iter().enumerate() {
                    item.write_struct(schema, *id, &mut bytes[index * layout.size..(index + 1) * layout.size])?;
                }
                match sort_key(schema, def)? {
                    Some((kind, key)) => {
                        let offset = layout
                            .fields
                            .iter()
                            .find(|slot| slot.id == key.id)
                            .map_or(0, |slot| slot.offset);
                        builder.create_sorted_vector_of_structs(&bytes, layout.size, layout.align, |value| {
                            kind.read_from_struct(value, offset)
                        })?
                    }
                    None => builder.create_vector_of_structs(&bytes, layout.size, layout.align)?,
                }
            }
            Type::Struct(id) => {
                let mut offsets = Vec::with_capacity(items.len());
                for item in items {
                    offsets.push(item.encode_table(schema, *id, builder)?);
                }
                match sort_key(schema, schema.struct_def(*id))? {
                    Some((kind, key)) => {
                        let (key_id, default) = (key.id, key.default);
                        builder.create_sorted_vector_of_tables(&offsets, |table| {
                            kind.read_from_table(table, key_id, default)
                        })?
                    }
                    None => builder.create_vector_of_offsets(&offsets)?,
                }
            }
            Type::Vector(inner) => {
                let mut offsets = Vec::with_capacity(items.len());
                for item in items {
                    offsets.push(item.encode_vector(schema, owner, field, inner, builder)?);
                }
                builder.create_vector_of_offsets(&offsets)?
            }
            _ => {
                return Err(unsupported(schema, owner, field, element, "a vector"))
            }
        };
        Ok(offset)
    }

    /// Writes this object as the fixed struct `struct_id` into `out`, which
    /// must be exactly as long as the struct. Every field must be set.
    fn write_struct(&self, schema: &Schema, struct_id: StructId, out: &mut [u8]) -> Result<(), EncodeError> {
        let def = schema.struct_def(struct_id);
        let layout = schema.struct_layout(struct_id);
        let fields = self.object_fields(def)?;
        for (field, slot) in def.fields.iter().zip(&layout.fields) {
            let value = fields.get(field.name.as_str()).ok_or_else(|| EncodeError::MissingField {
                owner: def.qualified_name(),
                field: field.name.clone(),
            })?;
            value.write_inline(schema, def, field, &field.ty, &mut out[slot.offset..slot.offset + slot.size])?;
        }
        Ok(())
    }

    fn write_inline(
        &self,
        schema: &Schema,
        owner: &StructDef,
        field: &FieldDef,
        ty: &Type,
        out: &mut [u8],
    ) -> Result<(), EncodeError> {
        match ty {
            ty if ty.is_scalar() => {
                scalar_from_value(schema, &field.name, ty, self)?.write(out);
                Ok(())
            }
            Type::Struct(id) => self.write_struct(schema, *id, out),
            Type::Array(element, len) => {
                let items = self.as_array();
                if !matches!(self, Value::Array(_)) || items.len() != *len as usize {
                    return Err(EncodeError::TypeMismatch {
                        field:    field.name.clone(),
                        expected: format!("an array of {} elements", len),
                    });
                }
                let stride = out.len() / (*len).max(1) as usize;
                for (index, item) in items.iter().enumerate() {
                    item.write_inline(schema, owner, field, element, &mut out[index * stride..(index + 1) * stride])?;
                }
                Ok(())
            }
            _ => {
                Err(unsupported(schema, owner, field, ty, "a fixed struct"))
            }
        }
    }
}

enum Slot {
    Scalar(RawScalar),
    Offset(Offset),
    Inline(Vec<u8>, usize),
}

fn unsupported(schema: &Schema, owner: &StructDef, field: &FieldDef, ty: &Type, context: &'static str) -> EncodeError {
    LayoutError::UnsupportedType {
        context,
        owner: owner.qualified_name(),
        field: field.name.clone(),
        ty: schema.type_name(ty),
    }
    .into()
}

fn sort_key<'s>(schema: &Schema, def: &'s StructDef) -> Result<Option<(KeyKind, &'s FieldDef)>, EncodeError> {
    if !def.has_key {
        return Ok(None);
    }
    let key = def
        .key_field()
        .ok_or_else(|| LayoutError::MissingKey(def.qualified_name()))?;
    let kind = KeyKind::resolve(schema, &key.ty).ok_or_else(|| LayoutError::UnsupportedKeyType {
        owner: def.qualified_name(),
        field: key.name.clone(),
        ty:    schema.type_name(&key.ty),
    })?;
    Ok(Some((kind, key)))
}

fn string_of<'v>(field: &str, value: &'v Value<'_>) -> Result<&'v str, EncodeError> {
    match value {
        Value::String(value) => Ok(value),
        _ => Err(EncodeError::TypeMismatch {
            field:    field.to_owned(),
            expected: "a string".to_owned(),
        }),
    }
}

/// A scalar tagged with its wire type.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RawScalar {
    Bool(bool),
    Char(i8),
    UChar(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
}

enum Number {
    Int(i128),
    Real(f64),
}

impl RawScalar {
    fn read(base: BaseType, bytes: &[u8]) -> Result<RawScalar, ReadError> {
        if bytes.len() < base.size() {
            return Err(ReadError::OutOfBounds {
                position: 0,
                size:     base.size(),
                len:      bytes.len(),
            });
        }
        Ok(match base {
            BaseType::Bool => RawScalar::Bool(bool::read_le(bytes)),
            BaseType::Char => RawScalar::Char(i8::read_le(bytes)),
            BaseType::UType | BaseType::UChar => RawScalar::UChar(u8::read_le(bytes)),
            BaseType::Short => RawScalar::Short(i16::read_le(bytes)),
            BaseType::UShort => RawScalar::UShort(u16::read_le(bytes)),
            BaseType::Int => RawScalar::Int(i32::read_le(bytes)),
            BaseType::UInt => RawScalar::UInt(u32::read_le(bytes)),
            BaseType::Long => RawScalar::Long(i64::read_le(bytes)),
            BaseType::ULong => RawScalar::ULong(u64::read_le(bytes)),
            BaseType::Float => RawScalar::Float(f32::read_le(bytes)),
            BaseType::Double => RawScalar::Double(f64::read_le(bytes)),
            other => {
                return Err(ReadError::TypeMismatch {
                    expected: "a scalar".to_owned(),
                    found:    other.name().to_owned(),
                })
            }
        })
    }

    /// The value readers see for an absent field.
    fn from_default(base: BaseType, default: Option<DefaultValue>) -> Result<RawScalar, ReadError> {
        let default = default.unwrap_or(DefaultValue::Integer(0));
        let int = default.as_i64();
        Ok(match base {
            BaseType::Bool => RawScalar::Bool(int != 0),
            BaseType::Char => RawScalar::Char(int as i8),
            BaseType::UType | BaseType::UChar => RawScalar::UChar(int as u8),
            BaseType::Short => RawScalar::Short(int as i16),
            BaseType::UShort => RawScalar::UShort(int as u16),
            BaseType::Int => RawScalar::Int(int as i32),
            BaseType::UInt => RawScalar::UInt(int as u32),
            BaseType::Long => RawScalar::Long(int),
            BaseType::ULong => RawScalar::ULong(int as u64),
            BaseType::Float => RawScalar::Float(default.as_f64() as f32),
            BaseType::Double => RawScalar::Double(default.as_f64()),
            other => {
                return Err(ReadError::TypeMismatch {
                    expected: "a scalar".to_owned(),
                    found:    other.name().to_owned(),
                })
            }
        })
    }

    fn convert(base: BaseType, number: Number) -> Option<RawScalar> {
        let int = match number {
            Number::Real(real) if base.is_float() => {
                return match base {
                    BaseType::Float => Some(RawScalar::Float(real as f32)),
                    _ => Some(RawScalar::Double(real)),
                }
            }
            Number::Real(real) if real.fract() == 0.0 && real.abs() < 1e19 => real as i128,
            Number::Real(_) => return None,
            Number::Int(int) => int,
        };

        if base.is_float() {
            return match base {
                BaseType::Float => Some(RawScalar::Float(int as f32)),
                _ => Some(RawScalar::Double(int as f64)),
            };
        }
        let (low, high) = base.integer_range()?;
        if int < low || int > high {
            return None;
        }
        Some(match base {
            BaseType::Bool => RawScalar::Bool(int != 0),
            BaseType::Char => RawScalar::Char(int as i8),
            BaseType::UType | BaseType::UChar => RawScalar::UChar(int as u8),
            BaseType::Short => RawScalar::Short(int as i16),
            BaseType::UShort => RawScalar::UShort(int as u16),
            BaseType::Int => RawScalar::Int(int as i32),
            BaseType::UInt => RawScalar::UInt(int as u32),
            BaseType::Long => RawScalar::Long(int as i64),
            BaseType::ULong => RawScalar::ULong(int as u64),
            _ => return None,
        })
    }

    fn as_i64(self) -> Option<i64> {
        Some(match self {
            RawScalar::Bool(value) => value as i64,
            RawScalar::Char(value) => value as i64,
            RawScalar::UChar(value) => value as i64,
            RawScalar::Short(value) => value as i64,
            RawScalar::UShort(value) => value as i64,
            RawScalar::Int(value) => value as i64,
            RawScalar::UInt(value) => value as i64,
            RawScalar::Long(value) => value,
            RawScalar::ULong(value) => i64::try_from(value).ok()?,
            RawScalar::Float(_) | RawScalar::Double(_) => return None,
        })
    }

    fn write(self, out: &mut [u8]) {
        match self {
            RawScalar::Bool(value) => value.write_le(out),
            RawScalar::Char(value) => value.write_le(out),
            RawScalar::UChar(value) => value.write_le(out),
            RawScalar::Short(value) => value.write_le(out),
            RawScalar::UShort(value) => value.write_le(out),
            RawScalar::Int(value) => value.write_le(out),
            RawScalar::UInt(value) => value.write_le(out),
            RawScalar::Long(value) => value.write_le(out),
            RawScalar::ULong(value) => value.write_le(out),
            RawScalar::Float(value) => value.write_le(out),
            RawScalar::Double(value) => value.write_le(out),
        }
    }

    fn add_to(self, builder: &mut Builder, id: u16) -> Result<(), BuilderError> {
        match self {
            RawScalar::Bool(value) => builder.add_field(id, value),
            RawScalar::Char(value) => builder.add_field(id, value),
            RawScalar::UChar(value) => builder.add_field(id, value),
            RawScalar::Short(value) => builder.add_field(id, value),
            RawScalar::UShort(value) => builder.add_field(id, value),
            RawScalar::Int(value) => builder.add_field(id, value),
            RawScalar::UInt(value) => builder.add_field(id, value),
            RawScalar::Long(value) => builder.add_field(id, value),
            RawScalar::ULong(value) => builder.add_field(id, value),
            RawScalar::Float(value) => builder.add_field(id, value),
            RawScalar::Double(value) => builder.add_field(id, value),
        }
    }

    fn into_value<'a>(self) -> Value<'a> {
        match self {
            RawScalar::Bool(value) => Value::Bool(value),
            RawScalar::Char(value) => Value::Byte(value),
            RawScalar::UChar(value) => Value::UByte(value),
            RawScalar::Short(value) => Value::Short(value),
            RawScalar::UShort(value) => Value::UShort(value),
            RawScalar::Int(value) => Value::Int(value),
            RawScalar::UInt(value) => Value::UInt(value),
            RawScalar::Long(value) => Value::Long(value),
            RawScalar::ULong(value) => Value::ULong(value),
            RawScalar::Float(value) => Value::Float(value),
            RawScalar::Double(value) => Value::Double(value),
        }
    }
}

/// Enum and union discriminants become [Value::Enum] when the number names
/// a declared value, and stay numeric otherwise.
fn scalar_to_value<'a>(schema: &'a Schema, ty: &Type, raw: RawScalar) -> Value<'a> {
    if let Type::Enum(id) | Type::UType(id) = ty {
        let def = schema.enum_def(*id);
        if let Some(value) = raw.as_i64().and_then(|number| def.value_by_number(number)) {
            return Value::Enum(schema.enum_name(*id), value.name.as_str());
        }
    }
    raw.into_value()
}

fn scalar_from_value(schema: &Schema, field: &str, ty: &Type, value: &Value<'_>) -> Result<RawScalar, EncodeError> {
    let base = schema.base_type(ty);
    let number = match (ty, value) {
        (Type::Enum(id) | Type::UType(id), Value::Enum(enum_name, name)) => {
            if *enum_name != schema.enum_name(*id) {
                return Err(EncodeError::TypeMismatch {
                    field:    field.to_owned(),
                    expected: schema.enum_name(*id).to_owned(),
                });
            }
            let known = schema.enum_def(*id).value_by_name(name).ok_or_else(|| EncodeError::UnknownEnumValue {
                enum_name: (*enum_name).to_owned(),
                value:     (*name).to_owned(),
            })?;
            Number::Int(known.value as i128)
        }
        (_, Value::Bool(value)) => Number::Int(*value as i128),
        (_, Value::Byte(value)) => Number::Int(*value as i128),
        (_, Value::UByte(value)) => Number::Int(*value as i128),
        (_, Value::Short(value)) => Number::Int(*value as i128),
        (_, Value::UShort(value)) => Number::Int(*value as i128),
        (_, Value::Int(value)) => Number::Int(*value as i128),
        (_, Value::UInt(value)) => Number::Int(*value as i128),
        (_, Value::Long(value)) => Number::Int(*value as i128),
        (_, Value::ULong(value)) => Number::Int(*value as i128),
        (_, Value::Float(value)) => Number::Real(*value as f64),
        (_, Value::Double(value)) => Number::Real(*value),
        _ => {
            return Err(EncodeError::TypeMismatch {
                field:    field.to_owned(),
                expected: schema.type_name(ty),
            })
        }
    };
    RawScalar::convert(base, number).ok_or_else(|| EncodeError::OutOfRange {
        field: field.to_owned(),
        value: format!("{:?}", value),
    })
}

impl<'a> Index<usize> for Value<'a> {
    type Output = Value<'a>;

    /// A convenience method that adds support for `self[index]` expressions.
    /// It will panic if this value isn't an [Array](#variant.Array) or if the
    /// provided index is out of bounds.
    fn index(&self, index: usize) -> &Value<'a> {
        match *self {
            Value::Array(ref values) => &values[index],
            _ => panic!(),
        }
    }
}

impl<'a> fmt::Debug for Value<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match *self {
            Value::Bool(value) => value.fmt(f),
            Value::Byte(value) => value.fmt(f),
            Value::UByte(value) => value.fmt(f),
            Value::Short(value) => value.fmt(f),
            Value::UShort(value) => value.fmt(f),
            Value::Int(value) => value.fmt(f),
            Value::UInt(value) => value.fmt(f),
            Value::Long(value) => value.fmt(f),
            Value::ULong(value) => value.fmt(f),
            Value::Float(value) => value.fmt(f),
            Value::Double(value) => value.fmt(f),
            Value::String(ref value) => value.fmt(f),
            Value::Array(ref values) => values.fmt(f),
            Value::Enum(name, ref value) => write!(f, "{}::{}", name, value),

            Value::Object(name, ref fields) => {
                let mut keys: Vec<_> = fields.keys().collect();
                let mut first = true;
                keys.sort();
                write!(f, "{} {{", name)?;

                for key in keys {
                    if first {
                        first = false;
                    } else {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {:?}", key, fields[key])?;
                }

                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Key;
    use crate::schema::{Definition, EnumDef, EnumVal, Namespace};

    fn object<'a>(name: &'a str, fields: Vec<(&'a str, Value<'a>)>) -> Value<'a> {
        Value::Object(name, fields.into_iter().collect())
    }

    fn monster_schema() -> Schema {
        let def = |name| Definition::new(name, Namespace::default());
        let color = EnumDef::new(def("Color"), BaseType::Char, vec![
            EnumVal::new("Red", 0),
            EnumVal::new("Green", 1),
            EnumVal::new("Blue", 2),
        ]);
        let equipment = EnumDef::union(def("Equipment"), vec![EnumVal::member("Weapon", 1, StructId(2))]);

        let vec3 = StructDef::fixed(def("Vec3"), vec![
            FieldDef::new("x", 0, Type::Float),
            FieldDef::new("y", 1, Type::Float),
            FieldDef::new("z", 2, Type::Float),
        ]);
        let stat = StructDef::fixed(def("Stat"), vec![
            FieldDef::new("id", 0, Type::UShort).with_key(),
            FieldDef::new("value", 1, Type::UShort),
        ]);
        let weapon = StructDef::table(def("Weapon"), vec![
            FieldDef::new("name", 0, Type::String).with_key(),
            FieldDef::new("damage", 1, Type::Short),
        ]);
        let monster = StructDef::table(def("Monster"), vec![
            FieldDef::new("pos", 0, Type::Struct(StructId(0))),
            FieldDef::new("hp", 1, Type::Short).with_default(DefaultValue::Integer(100)),
            FieldDef::new("name", 2, Type::String).with_required(),
            FieldDef::new("inventory", 3, Type::Vector(Box::new(Type::UChar))),
            FieldDef::new("color", 4, Type::Enum(EnumId(0))).with_default(DefaultValue::Integer(2)),
            FieldDef::new("weapons", 5, Type::Vector(Box::new(Type::Struct(StructId(2))))),
            FieldDef::new("equipped_type", 6, Type::UType(EnumId(1))),
            FieldDef::new("equipped", 7, Type::Union(EnumId(1))),
            FieldDef::new("stats", 8, Type::Vector(Box::new(Type::Struct(StructId(1))))),
            FieldDef::new("path", 9, Type::Vector(Box::new(Type::Vector(Box::new(Type::Short))))),
            FieldDef::new("friendly", 10, Type::Bool).with_deprecated(),
        ]);

        Schema::new(vec![vec3, stat, weapon, monster], vec![color, equipment])
            .unwrap()
            .with_root(StructId(3))
            .unwrap()
            .with_file_identifier(*b"MONS")
    }

    #[test]
    fn value_basic() {
        let value = Value::Array(vec![
            Value::Bool(true),
            Value::UByte(255),
            Value::Int(-1),
            Value::UInt(1),
            Value::Float(0.5),
            Value::String("abc".to_owned()),
            Value::Enum("Foo", "FOO"),
            object("Obj", vec![
                ("key1", Value::String("value1".to_owned())),
                ("key2", Value::String("value2".to_owned())),
            ]),
        ]);

        assert_eq!(value.len(), 8);

        assert_eq!(value[0], Value::Bool(true));
        assert_eq!(value[1], Value::UByte(255));
        assert_eq!(value[2], Value::Int(-1));
        assert_eq!(value[3], Value::UInt(1));
        assert_eq!(value[4], Value::Float(0.5));
        assert_eq!(value[5], Value::String("abc".to_owned()));
        assert_eq!(value[6], Value::Enum("Foo", "FOO"));

        assert_eq!(value[0].as_bool(), true);
        assert_eq!(value[1].as_ubyte(), 255);
        assert_eq!(value[2].as_int(), -1);
        assert_eq!(value[3].as_uint(), 1);
        assert_eq!(value[4].as_float(), 0.5);
        assert_eq!(value[5].as_string(), "abc");
        assert_eq!(value[6].as_enum(), ("Foo", "FOO"));
        assert_eq!(value.get("key1"), None);
        assert_eq!(value[7].get("key1"), Some(&Value::String("value1".to_owned())));

        assert_eq!(
            format!("{:?}", value),
            "[true, 255, -1, 1, 0.5, \"abc\", Foo::FOO, Obj {key1: \"value1\", key2: \"value2\"}]"
        );
    }

    #[test]
    fn value_push() {
        let mut value = Value::Array(vec![]);
        assert!(value.is_empty());

        value.push(Value::Long(123));
        value.push(Value::Long(456));
        assert_eq!(value.len(), 2);
        assert_eq!(value[0].as_long(), 123);
        assert_eq!(value[1].as_long(), 456);
    }

    #[test]
    fn value_set_and_remove() {
        let mut value = Value::Object("Foo", HashMap::new());
        assert_eq!(value.get("x"), None);

        value.set("x", Value::Short(123));
        value.set("y", Value::Short(456));
        assert_eq!(value.get("x"), Some(&Value::Short(123)));

        value.set("x", Value::Short(789));
        assert_eq!(value.get("x").map(Value::as_short), Some(789));

        value.remove("x");
        assert_eq!(value.get("x"), None);
        assert_eq!(value.get("y"), Some(&Value::Short(456)));
    }

    #[test]
    fn only_name_set() {
        let schema = monster_schema();
        let orc = object("Monster", vec![("name", Value::String("Orc".to_owned()))]);
        let bytes = orc.encode(&schema).unwrap();

        let root = Buffer::new(&bytes).root().unwrap();
        assert_eq!(root.get_scalar::<i16>(1, 100), Ok(100));
        assert_eq!(root.get_string(2), Ok(Some("Orc")));
        assert_eq!(root.live_fields(), Ok(1));

        let decoded = Value::decode_root(&schema, &bytes).unwrap();
        assert_eq!(
            format!("{:?}", decoded),
            "Monster {color: Color::Blue, hp: 100, name: \"Orc\"}"
        );
    }

    #[test]
    fn encode_and_decode() {
        let schema = monster_schema();
        let stat = |id, value| object("Stat", vec![("id", Value::UShort(id)), ("value", Value::UShort(value))]);
        let weapon = |name: &str, damage| {
            object("Weapon", vec![("name", Value::String(name.to_owned())), ("damage", Value::Short(damage))])
        };

        let monster = object("Monster", vec![
            ("pos", object("Vec3", vec![("x", Value::Float(1.0)), ("y", Value::Float(2.0)), ("z", Value::Float(3.0))])),
            ("hp", Value::Short(300)),
            ("name", Value::String("Orc".to_owned())),
            ("inventory", Value::Array(vec![Value::UByte(1), Value::UByte(2), Value::UByte(3)])),
            ("color", Value::Enum("Color", "Red")),
            ("weapons", Value::Array(vec![weapon("Sword", 3), weapon("Axe", 5)])),
            ("equipped", weapon("Bow", 2)),
            ("stats", Value::Array(vec![stat(30, 0), stat(10, 1), stat(20, 2)])),
            ("path", Value::Array(vec![
                Value::Array(vec![Value::Short(1), Value::Short(2)]),
                Value::Array(vec![]),
            ])),
            ("friendly", Value::Bool(true)),
        ]);

        let bytes = monster.encode(&schema).unwrap();
        assert!(Buffer::new(&bytes).has_identifier(b"MONS"));

        let decoded = Value::decode(&schema, StructId(3), &bytes).unwrap();
        assert_eq!(decoded.get("hp"), Some(&Value::Short(300)));
        assert_eq!(decoded.get("color"), Some(&Value::Enum("Color", "Red")));
        assert_eq!(decoded.get("friendly"), None);
        assert_eq!(decoded.get("equipped_type"), Some(&Value::Enum("Equipment", "Weapon")));
        assert_eq!(decoded.get("equipped"), Some(&weapon("Bow", 2)));
        assert_eq!(decoded.get("weapons"), Some(&Value::Array(vec![weapon("Axe", 5), weapon("Sword", 3)])));
        assert_eq!(decoded.get("stats"), Some(&Value::Array(vec![stat(10, 1), stat(20, 2), stat(30, 0)])));
        assert_eq!(decoded.get("path").map(|path| path[0].len()), Some(2));
        assert_eq!(
            format!("{:?}", decoded.get("pos").unwrap()),
            "Vec3 {x: 1.0, y: 2.0, z: 3.0}"
        );

        // The sorted struct vector supports binary search by key.
        let stats = Buffer::new(&bytes).root().unwrap().get_vector(8).unwrap().unwrap();
        let found = stats
            .lookup_struct_by_key(&Key::UInt(20), 4, |s| Ok(Key::UInt(s.get::<u16>(0)? as u64)))
            .unwrap();
        assert_eq!(found.map(|s| s.get::<u16>(2).unwrap()), Some(2));

        // Re-encoding the decoded value gives the same tree.
        let again = decoded.encode(&schema).unwrap();
        assert_eq!(Value::decode(&schema, StructId(3), &again).unwrap(), decoded);
    }

    #[test]
    fn set_fields_are_always_written() {
        let schema = monster_schema();
        let orc = object("Monster", vec![("name", Value::String("Orc".to_owned())), ("hp", Value::Short(100))]);
        let bytes = orc.encode(&schema).unwrap();
        let root = Buffer::new(&bytes).root().unwrap();
        assert!(root.field_offset(1).unwrap().is_some());
    }

    #[test]
    fn encode_errors() {
        let schema = monster_schema();
        let encode = |value: Value| value.encode(&schema);

        assert_eq!(
            encode(object("Monster", vec![("hp", Value::Short(1))])),
            Err(EncodeError::MissingRequired {
                owner: "Monster".to_owned(),
                field: "name".to_owned(),
            })
        );
        assert_eq!(
            encode(object("Monster", vec![("name", Value::String("x".to_owned())), ("mana", Value::Int(1))])),
            Err(EncodeError::UnknownField {
                owner: "Monster".to_owned(),
                field: "mana".to_owned(),
            })
        );
        assert_eq!(
            encode(object("Monster", vec![("name", Value::String("x".to_owned())), ("hp", Value::Int(70000))])),
            Err(EncodeError::OutOfRange {
                field: "hp".to_owned(),
                value: "70000".to_owned(),
            })
        );
        assert_eq!(
            encode(object("Monster", vec![("name", Value::String("x".to_owned())), ("color", Value::Enum("Color", "Pink"))])),
            Err(EncodeError::UnknownEnumValue {
                enum_name: "Color".to_owned(),
                value:     "Pink".to_owned(),
            })
        );
        assert_eq!(
            encode(object("Monster", vec![
                ("name", Value::String("x".to_owned())),
                ("pos", object("Vec3", vec![("x", Value::Float(1.0))])),
            ])),
            Err(EncodeError::MissingField {
                owner: "Vec3".to_owned(),
                field: "y".to_owned(),
            })
        );
        assert_eq!(
            encode(object("Monster", vec![("name", Value::String("x".to_owned())), ("equipped", object("Monster", vec![]))])),
            Err(EncodeError::UnionMismatch("Monster".to_owned(), "Equipment".to_owned()))
        );
        assert_eq!(encode(Value::Int(1)), Err(EncodeError::TypeMismatch {
            field:    "root".to_owned(),
            expected: "an object".to_owned(),
        }));
    }

    #[test]
    fn unknown_enum_numbers_stay_numeric() {
        let schema = monster_schema();
        let orc = object("Monster", vec![("name", Value::String("Orc".to_owned())), ("color", Value::Byte(7))]);
        let decoded = Value::decode_root(&schema, &orc.encode(&schema).unwrap()).unwrap();
        assert_eq!(decoded.get("color"), Some(&Value::Byte(7)));
    }
}
