//! Byte layout of every struct and table in a [Schema].
//!
//! Fixed structs get static field offsets with natural alignment and tail
//! padding. Tables get one vtable slot per field id (`voffset = 4 + 2 * id`);
//! where the field lands inside a table instance is decided by the builder.

use crate::bb::Scalar;
use crate::error::{LayoutError, ReadError, SchemaError};
use crate::reader::{Key, Struct, Table};
use crate::schema::{BaseType, DefaultValue, Schema, StructDef, StructId, Type};

use serde::Serialize;
use tracing::trace;

/// Bytes in front of the vtable slots: the vtable size and the table size.
pub const VTABLE_HEADER_SIZE: usize = 4;

/// The highest table field id whose vtable still fits 16-bit offsets.
pub const MAX_FIELD_ID: u16 = ((u16::MAX as usize - VTABLE_HEADER_SIZE) / 2 - 1) as u16;

/// The vtable slot of a field id. Ids above [MAX_FIELD_ID] are rejected
/// when the schema is built.
pub fn field_voffset(id: u16) -> u16 {
    (VTABLE_HEADER_SIZE + 2 * id as usize) as u16
}

/// Total byte size of a vtable covering ids `0..=max_id`.
pub fn vtable_size(max_id: Option<u16>) -> usize {
    VTABLE_HEADER_SIZE + 2 * max_id.map_or(0, |id| id as usize + 1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLayout {
    pub id:      u16,
    /// Vtable slot for table fields, `0` for fixed struct fields.
    pub voffset: u16,
    /// Static byte offset inside a fixed struct, `0` for table fields.
    pub offset:  usize,
    /// Inline size: the value itself, or its 32-bit offset.
    pub size:    usize,
    pub align:   usize,
    /// Zero bytes following this field inside a fixed struct.
    pub padding: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructLayout {
    pub fixed:  bool,
    /// Total size for fixed structs, largest possible inline payload for tables.
    pub size:   usize,
    pub align:  usize,
    /// One entry per field, in declaration order.
    pub fields: Vec<FieldLayout>,
}

impl StructLayout {
    pub fn max_id(&self) -> Option<u16> {
        self.fields.iter().map(|field| field.id).max()
    }

    /// Size of a vtable that has a slot for every declared field.
    pub fn vtable_size(&self) -> usize {
        vtable_size(self.max_id())
    }
}

/// Layout of every struct of a schema, indexed by [StructId].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaLayout {
    structs: Vec<StructLayout>,
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    Pending,
    Active,
    Done(usize, usize),
}

#[derive(Clone, Copy, PartialEq)]
enum Context {
    Fixed,
    Table,
    Vector,
}

impl Context {
    fn describe(self) -> &'static str {
        match self {
            Context::Fixed => "a fixed struct",
            Context::Table => "a table",
            Context::Vector => "a vector",
        }
    }
}

struct Engine<'s> {
    schema: &'s Schema,
    shapes: Vec<Visit>,
}

impl SchemaLayout {
    /// Lays out every struct of `schema`. Pure and deterministic: the same
    /// schema always produces the same layout.
    pub fn compute(schema: &Schema) -> Result<SchemaLayout, SchemaError> {
        let mut engine = Engine {
            schema,
            shapes: vec![Visit::Pending; schema.structs().len()],
        };

        let mut structs = Vec::with_capacity(schema.structs().len());
        for id in schema.struct_ids() {
            let def = schema.struct_def(id);
            let layout = if def.fixed {
                engine.fixed_layout(id)?
            } else {
                engine.table_layout(def)?
            };
            if let Some(key) = def.key_field() {
                KeyKind::resolve(schema, &key.ty).ok_or_else(|| LayoutError::UnsupportedKeyType {
                    owner: def.qualified_name(),
                    field: key.name.clone(),
                    ty:    schema.type_name(&key.ty),
                })?;
            }
            trace!(
                name = %def.qualified_name(),
                fixed = def.fixed,
                size = layout.size,
                align = layout.align,
                "laid out"
            );
            structs.push(layout);
        }

        Ok(SchemaLayout { structs })
    }

    /// Panics if `id` was not produced for the laid out schema.
    pub fn struct_layout(&self, id: StructId) -> &StructLayout {
        &self.structs[id.index()]
    }

    pub fn structs(&self) -> &[StructLayout] {
        &self.structs
    }
}

fn padding(offset: usize, align: usize) -> usize {
    (align - offset % align) % align
}

impl<'s> Engine<'s> {
    /// Size and alignment of a fixed struct, memoized. Revisiting a struct
    /// that is still being laid out means it contains itself by value.
    fn fixed_shape(&mut self, id: StructId) -> Result<(usize, usize), SchemaError> {
        match self.shapes[id.index()] {
            Visit::Done(size, align) => Ok((size, align)),
            Visit::Active => Err(SchemaError::InvalidCycle(
                self.schema.struct_def(id).qualified_name(),
            )),
            Visit::Pending => {
                let layout = self.fixed_layout(id)?;
                Ok((layout.size, layout.align))
            }
        }
    }

    fn fixed_layout(&mut self, id: StructId) -> Result<StructLayout, SchemaError> {
        let schema = self.schema;
        let def = schema.struct_def(id);
        self.shapes[id.index()] = Visit::Active;

        let mut fields: Vec<FieldLayout> = Vec::with_capacity(def.fields.len());
        let mut offset = 0;
        let mut align = 1;
        for field in &def.fields {
            let (size, field_align) = self.inline_shape(def, &field.name, &field.ty, Context::Fixed)?;
            let before = padding(offset, field_align);
            if let Some(previous) = fields.last_mut() {
                previous.padding += before;
            }
            offset += before;
            fields.push(FieldLayout {
                id: field.id,
                voffset: 0,
                offset,
                size,
                align: field_align,
                padding: 0,
            });
            offset += size;
            align = align.max(field_align);
        }

        if let Some(force_align) = def.force_align {
            if !force_align.is_power_of_two() || force_align > 256 {
                return Err(LayoutError::InvalidAlignment {
                    owner: def.qualified_name(),
                    align: force_align,
                }
                .into());
            }
            align = align.max(force_align);
        }

        let tail = padding(offset, align);
        if let Some(last) = fields.last_mut() {
            last.padding += tail;
        }
        let size = offset + tail;

        self.shapes[id.index()] = Visit::Done(size, align);
        Ok(StructLayout {
            fixed: true,
            size,
            align,
            fields,
        })
    }

    fn table_layout(&mut self, def: &StructDef) -> Result<StructLayout, SchemaError> {
        let mut fields = Vec::with_capacity(def.fields.len());
        let mut size = 0;
        let mut align = 4;
        for field in &def.fields {
            let (field_size, field_align) = self.inline_shape(def, &field.name, &field.ty, Context::Table)?;
            fields.push(FieldLayout {
                id: field.id,
                voffset: field_voffset(field.id),
                offset: 0,
                size: field_size,
                align: field_align,
                padding: 0,
            });
            size += field_size;
            align = align.max(field_align);
        }
        Ok(StructLayout {
            fixed: false,
            size,
            align,
            fields,
        })
    }

    /// Inline size and alignment of a value of type `ty` in `context`.
    fn inline_shape(
        &mut self,
        owner: &StructDef,
        field: &str,
        ty: &Type,
        context: Context,
    ) -> Result<(usize, usize), SchemaError> {
        let unsupported = |schema: &Schema, context: Context| -> SchemaError {
            LayoutError::UnsupportedType {
                context: context.describe(),
                owner:   owner.qualified_name(),
                field:   field.to_owned(),
                ty:      schema.type_name(ty),
            }
            .into()
        };

        match ty {
            Type::None => Err(unsupported(self.schema, context)),
            Type::UType(_) | Type::Bool | Type::Char | Type::UChar => Ok((1, 1)),
            Type::Short | Type::UShort => Ok((2, 2)),
            Type::Int | Type::UInt | Type::Float => Ok((4, 4)),
            Type::Long | Type::ULong | Type::Double => Ok((8, 8)),
            Type::Enum(_) => {
                let size = self.schema.base_type(ty).size();
                Ok((size, size))
            }
            Type::String | Type::Union(_) => match context {
                Context::Fixed => Err(unsupported(self.schema, context)),
                Context::Table | Context::Vector => Ok((4, 4)),
            },
            Type::Vector(element) => {
                if context == Context::Fixed {
                    return Err(unsupported(self.schema, context));
                }
                match element.as_ref() {
                    Type::Union(_) | Type::Array(..) => Err(unsupported(self.schema, Context::Vector)),
                    _ => {
                        self.inline_shape(owner, field, element, Context::Vector)?;
                        Ok((4, 4))
                    }
                }
            }
            Type::Struct(id) => {
                if self.schema.struct_def(*id).fixed {
                    self.fixed_shape(*id)
                } else if context == Context::Fixed {
                    Err(unsupported(self.schema, context))
                } else {
                    Ok((4, 4))
                }
            }
            Type::Array(element, len) => {
                if context != Context::Fixed || *len == 0 {
                    return Err(unsupported(self.schema, context));
                }
                if !self.schema.is_inline(element) {
                    return Err(unsupported(self.schema, context));
                }
                let (size, align) = self.inline_shape(owner, field, element, Context::Fixed)?;
                Ok((size * *len as usize, align))
            }
        }
    }
}

/// How the key field of a sorted vector element is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// A scalar key of the given wire type.
    Scalar(BaseType),
    /// A string key, compared byte-wise.
    String,
}

impl KeyKind {
    /// The key kind of a field type, or `None` when the type cannot act as
    /// a key. Every variant is spelled out so a new variant must be
    /// classified here.
    pub fn of(ty: &Type) -> Option<KeyKind> {
        match ty {
            Type::Bool => Some(KeyKind::Scalar(BaseType::Bool)),
            Type::Char => Some(KeyKind::Scalar(BaseType::Char)),
            Type::UChar => Some(KeyKind::Scalar(BaseType::UChar)),
            Type::Short => Some(KeyKind::Scalar(BaseType::Short)),
            Type::UShort => Some(KeyKind::Scalar(BaseType::UShort)),
            Type::Int => Some(KeyKind::Scalar(BaseType::Int)),
            Type::UInt => Some(KeyKind::Scalar(BaseType::UInt)),
            Type::Long => Some(KeyKind::Scalar(BaseType::Long)),
            Type::ULong => Some(KeyKind::Scalar(BaseType::ULong)),
            Type::Float => Some(KeyKind::Scalar(BaseType::Float)),
            Type::Double => Some(KeyKind::Scalar(BaseType::Double)),
            Type::String => Some(KeyKind::String),
            // Enum keys compare by their numeric value, but the underlying
            // type is only known to the schema.
            Type::Enum(_) => None,
            Type::None
            | Type::UType(_)
            | Type::Vector(_)
            | Type::Struct(_)
            | Type::Union(_)
            | Type::Array(..) => None,
        }
    }

    /// Like [of](#method.of), resolving enums to their underlying type.
    pub fn resolve(schema: &Schema, ty: &Type) -> Option<KeyKind> {
        match ty {
            Type::Enum(_) => Some(KeyKind::Scalar(schema.base_type(ty))),
            _ => KeyKind::of(ty),
        }
    }

    /// Reads the key of a table. An absent scalar key reads as its default.
    pub fn read_from_table<'a>(
        self,
        table: &Table<'a>,
        id: u16,
        default: Option<DefaultValue>,
    ) -> Result<Key<'a>, ReadError> {
        match self {
            KeyKind::String => Ok(Key::Bytes(table.get_byte_string(id)?.unwrap_or(&[]))),
            KeyKind::Scalar(base) => match table.field_offset(id)? {
                Some(position) => scalar_key(base, table.data(), position),
                None => Ok(default_key(base, default)),
            },
        }
    }

    /// Reads the key stored `offset` bytes into a fixed struct.
    pub fn read_from_struct<'a>(self, value: &Struct<'a>, offset: usize) -> Result<Key<'a>, ReadError> {
        match self {
            KeyKind::String => Err(ReadError::TypeMismatch {
                expected: "scalar key".to_owned(),
                found:    "string".to_owned(),
            }),
            KeyKind::Scalar(base) => scalar_key(base, value.data(), value.location() + offset),
        }
    }
}

fn scalar_key<'a>(base: BaseType, data: &'a [u8], position: usize) -> Result<Key<'a>, ReadError> {
    let bytes = data.get(position..position + base.size()).ok_or(ReadError::OutOfBounds {
        position,
        size: base.size(),
        len: data.len(),
    })?;
    Ok(match base {
        BaseType::Char => Key::Int(i8::read_le(bytes) as i64),
        BaseType::Short => Key::Int(i16::read_le(bytes) as i64),
        BaseType::Int => Key::Int(i32::read_le(bytes) as i64),
        BaseType::Long => Key::Int(i64::read_le(bytes)),
        BaseType::Bool | BaseType::UType | BaseType::UChar => Key::UInt(u8::read_le(bytes) as u64),
        BaseType::UShort => Key::UInt(u16::read_le(bytes) as u64),
        BaseType::UInt => Key::UInt(u32::read_le(bytes) as u64),
        BaseType::ULong => Key::UInt(u64::read_le(bytes)),
        BaseType::Float => Key::Float(f32::read_le(bytes) as f64),
        BaseType::Double => Key::Float(f64::read_le(bytes)),
        other => {
            return Err(ReadError::TypeMismatch {
                expected: "scalar key".to_owned(),
                found:    other.name().to_owned(),
            })
        }
    })
}

fn default_key<'a>(base: BaseType, default: Option<DefaultValue>) -> Key<'a> {
    let default = default.unwrap_or(DefaultValue::Integer(0));
    if base.is_float() {
        Key::Float(default.as_f64())
    } else if base.is_signed() {
        Key::Int(default.as_i64())
    } else {
        Key::UInt(default.as_i64() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Definition, EnumDef, EnumId, EnumVal, FieldDef, Namespace};

    fn def(name: &str) -> Definition {
        Definition::new(name, Namespace::default())
    }

    fn layout_of(structs: Vec<StructDef>) -> Result<SchemaLayout, SchemaError> {
        Schema::new(structs, vec![]).map(|schema| schema.layout().clone())
    }

    #[test]
    fn fixed_struct_offsets() {
        let layout = layout_of(vec![StructDef::fixed(
            def("S"),
            vec![
                FieldDef::new("a", 0, Type::Char),
                FieldDef::new("b", 1, Type::Int),
                FieldDef::new("c", 2, Type::Short),
            ],
        )])
        .unwrap();

        let s = layout.struct_layout(StructId(0));
        assert!(s.fixed);
        assert_eq!((s.size, s.align), (12, 4));
        let offsets: Vec<_> = s.fields.iter().map(|f| (f.offset, f.size, f.padding)).collect();
        assert_eq!(offsets, [(0, 1, 3), (4, 4, 0), (8, 2, 2)]);
    }

    #[test]
    fn nested_struct_and_arrays() {
        let layout = layout_of(vec![
            StructDef::fixed(def("Vec3"), vec![
                FieldDef::new("x", 0, Type::Float),
                FieldDef::new("y", 1, Type::Float),
                FieldDef::new("z", 2, Type::Float),
            ]),
            StructDef::fixed(def("Path"), vec![
                FieldDef::new("tag", 0, Type::UChar),
                FieldDef::new("points", 1, Type::Array(Box::new(Type::Struct(StructId(0))), 2)),
                FieldDef::new("weights", 2, Type::Array(Box::new(Type::Double), 2)),
            ]),
        ])
        .unwrap();

        let path = layout.struct_layout(StructId(1));
        assert_eq!((path.size, path.align), (48, 8));
        let offsets: Vec<_> = path.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, [0, 4, 32]);
        assert_eq!(path.fields[0].padding, 3);
        assert_eq!(path.fields[1].padding, 4);
    }

    #[test]
    fn force_align_pads_size() {
        let mut vec3 = StructDef::fixed(def("Vec3"), vec![
            FieldDef::new("x", 0, Type::Float),
            FieldDef::new("y", 1, Type::Float),
            FieldDef::new("z", 2, Type::Float),
        ]);
        vec3.force_align = Some(16);
        let layout = layout_of(vec![vec3.clone()]).unwrap();
        assert_eq!((layout.struct_layout(StructId(0)).size, layout.struct_layout(StructId(0)).align), (16, 16));

        vec3.force_align = Some(12);
        assert_eq!(
            layout_of(vec![vec3]),
            Err(SchemaError::Layout(LayoutError::InvalidAlignment {
                owner: "Vec3".to_owned(),
                align: 12,
            }))
        );
    }

    #[test]
    fn table_voffsets() {
        let layout = layout_of(vec![StructDef::table(def("Monster"), vec![
            FieldDef::new("name", 0, Type::String),
            FieldDef::new("hp", 1, Type::Int),
            FieldDef::new("mana", 5, Type::Long),
        ])])
        .unwrap();

        let table = layout.struct_layout(StructId(0));
        assert!(!table.fixed);
        let slots: Vec<_> = table.fields.iter().map(|f| (f.voffset, f.size)).collect();
        assert_eq!(slots, [(4, 4), (6, 4), (14, 8)]);
        assert_eq!(table.vtable_size(), 16);
        assert_eq!(vtable_size(None), 4);
    }

    #[test]
    fn layout_is_deterministic() {
        let structs = || {
            vec![
                StructDef::fixed(def("Point"), vec![FieldDef::new("x", 0, Type::Short), FieldDef::new("y", 1, Type::Double)]),
                StructDef::table(def("Shape"), vec![
                    FieldDef::new("origin", 0, Type::Struct(StructId(0))),
                    FieldDef::new("children", 1, Type::Vector(Box::new(Type::Struct(StructId(1))))),
                ]),
            ]
        };
        assert_eq!(layout_of(structs()), layout_of(structs()));
    }

    #[test]
    fn unsupported_types() {
        let unsupported = |structs| match layout_of(structs) {
            Err(SchemaError::Layout(LayoutError::UnsupportedType { context, .. })) => context,
            other => panic!("unexpected {:?}", other),
        };

        assert_eq!(
            unsupported(vec![StructDef::fixed(def("S"), vec![FieldDef::new("s", 0, Type::String)])]),
            "a fixed struct"
        );
        assert_eq!(
            unsupported(vec![StructDef::table(def("T"), vec![FieldDef::new("a", 0, Type::Array(Box::new(Type::Int), 2))])]),
            "a table"
        );
        assert_eq!(
            unsupported(vec![
                StructDef::table(def("T"), vec![]),
                StructDef::fixed(def("S"), vec![FieldDef::new("t", 0, Type::Struct(StructId(0)))]),
            ]),
            "a fixed struct"
        );
    }

    #[test]
    fn vector_of_unions_is_rejected() {
        let schema = Schema::new(
            vec![StructDef::table(def("T"), vec![
                FieldDef::new("things", 0, Type::Vector(Box::new(Type::Union(EnumId(0))))),
            ])],
            vec![EnumDef::union(def("Any"), vec![EnumVal::member("T", 1, StructId(0))])],
        );
        assert!(matches!(
            schema,
            Err(SchemaError::Layout(LayoutError::UnsupportedType { context: "a vector", .. }))
        ));
    }

    #[test]
    fn value_cycles_are_fatal() {
        assert_eq!(
            layout_of(vec![StructDef::fixed(def("Loop"), vec![FieldDef::new("next", 0, Type::Struct(StructId(0)))])]),
            Err(SchemaError::InvalidCycle("Loop".to_owned()))
        );

        // Reference cycles through tables are fine.
        assert!(layout_of(vec![StructDef::table(def("Node"), vec![
            FieldDef::new("next", 0, Type::Struct(StructId(0))),
            FieldDef::new("children", 1, Type::Vector(Box::new(Type::Struct(StructId(0))))),
        ])])
        .is_ok());
    }

    #[test]
    fn key_types() {
        assert_eq!(KeyKind::of(&Type::String), Some(KeyKind::String));
        assert_eq!(KeyKind::of(&Type::UShort), Some(KeyKind::Scalar(BaseType::UShort)));
        assert_eq!(KeyKind::of(&Type::Vector(Box::new(Type::Int))), None);

        assert_eq!(
            layout_of(vec![StructDef::table(def("T"), vec![
                FieldDef::new("tags", 0, Type::Vector(Box::new(Type::Int))).with_key(),
            ])]),
            Err(SchemaError::Layout(LayoutError::UnsupportedKeyType {
                owner: "T".to_owned(),
                field: "tags".to_owned(),
                ty:    "[int]".to_owned(),
            }))
        );
    }
}
