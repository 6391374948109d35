use crate::error::SchemaError;
use crate::layout::{SchemaLayout, StructLayout, MAX_FIELD_ID};

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Handle of a [StructDef] inside its owning [Schema].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StructId(pub u32);

impl StructId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of an [EnumDef] (enum or union) inside its owning [Schema].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EnumId(pub u32);

impl EnumId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The closed set of wire-level types. The numeric tags are stable and are
/// what the binary schema stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum BaseType {
    None = 0,
    UType = 1,
    Bool = 2,
    Char = 3,
    UChar = 4,
    Short = 5,
    UShort = 6,
    Int = 7,
    UInt = 8,
    Long = 9,
    ULong = 10,
    Float = 11,
    Double = 12,
    String = 13,
    Vector = 14,
    Struct = 15,
    Union = 16,
    Array = 17,
}

impl BaseType {
    pub const ALL: [BaseType; 18] = [
        BaseType::None,
        BaseType::UType,
        BaseType::Bool,
        BaseType::Char,
        BaseType::UChar,
        BaseType::Short,
        BaseType::UShort,
        BaseType::Int,
        BaseType::UInt,
        BaseType::Long,
        BaseType::ULong,
        BaseType::Float,
        BaseType::Double,
        BaseType::String,
        BaseType::Vector,
        BaseType::Struct,
        BaseType::Union,
        BaseType::Array,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<BaseType> {
        BaseType::ALL.get(tag as usize).copied()
    }

    /// Size in bytes of the inline representation. Reference types report
    /// the size of their 32-bit offset; arrays have no size of their own.
    pub fn size(self) -> usize {
        match self {
            BaseType::None | BaseType::UType | BaseType::Bool | BaseType::Char | BaseType::UChar => 1,
            BaseType::Short | BaseType::UShort => 2,
            BaseType::Int | BaseType::UInt | BaseType::Float => 4,
            BaseType::Long | BaseType::ULong | BaseType::Double => 8,
            BaseType::String | BaseType::Vector | BaseType::Struct | BaseType::Union => 4,
            BaseType::Array => 0,
        }
    }

    pub fn is_scalar(self) -> bool {
        self.tag() <= BaseType::Double.tag()
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BaseType::UType
                | BaseType::Char
                | BaseType::UChar
                | BaseType::Short
                | BaseType::UShort
                | BaseType::Int
                | BaseType::UInt
                | BaseType::Long
                | BaseType::ULong
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            BaseType::Char | BaseType::Short | BaseType::Int | BaseType::Long
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, BaseType::Float | BaseType::Double)
    }

    /// The inclusive range of values an integer type can hold.
    pub fn integer_range(self) -> Option<(i128, i128)> {
        match self {
            BaseType::Bool => Some((0, 1)),
            BaseType::UType | BaseType::UChar => Some((0, u8::MAX as i128)),
            BaseType::Char => Some((i8::MIN as i128, i8::MAX as i128)),
            BaseType::Short => Some((i16::MIN as i128, i16::MAX as i128)),
            BaseType::UShort => Some((0, u16::MAX as i128)),
            BaseType::Int => Some((i32::MIN as i128, i32::MAX as i128)),
            BaseType::UInt => Some((0, u32::MAX as i128)),
            BaseType::Long => Some((i64::MIN as i128, i64::MAX as i128)),
            BaseType::ULong => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }

    /// The IDL spelling of this type.
    pub fn name(self) -> &'static str {
        match self {
            BaseType::None => "none",
            BaseType::UType => "utype",
            BaseType::Bool => "bool",
            BaseType::Char => "byte",
            BaseType::UChar => "ubyte",
            BaseType::Short => "short",
            BaseType::UShort => "ushort",
            BaseType::Int => "int",
            BaseType::UInt => "uint",
            BaseType::Long => "long",
            BaseType::ULong => "ulong",
            BaseType::Float => "float",
            BaseType::Double => "double",
            BaseType::String => "string",
            BaseType::Vector => "vector",
            BaseType::Struct => "struct",
            BaseType::Union => "union",
            BaseType::Array => "array",
        }
    }

    /// Maps an IDL type name (including the sized aliases) to a base type.
    /// Only scalars and `string` can be named directly.
    pub fn from_name(name: &str) -> Option<BaseType> {
        Some(match name {
            "bool" => BaseType::Bool,
            "byte" | "int8" => BaseType::Char,
            "ubyte" | "uint8" => BaseType::UChar,
            "short" | "int16" => BaseType::Short,
            "ushort" | "uint16" => BaseType::UShort,
            "int" | "int32" => BaseType::Int,
            "uint" | "uint32" => BaseType::UInt,
            "long" | "int64" => BaseType::Long,
            "ulong" | "uint64" => BaseType::ULong,
            "float" | "float32" => BaseType::Float,
            "double" | "float64" => BaseType::Double,
            "string" => BaseType::String,
            _ => return None,
        })
    }
}

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    None,
    /// The hidden discriminant of a union field.
    UType(EnumId),
    Bool,
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    String,
    Vector(Box<Type>),
    /// A fixed struct or a table, depending on [StructDef::fixed].
    Struct(StructId),
    Union(EnumId),
    Array(Box<Type>, u16),
    /// A scalar stored as the enum's underlying integer type.
    Enum(EnumId),
}

impl Type {
    /// The type of a scalar or string [BaseType]. Other base types need
    /// more information and return `None`.
    pub fn from_base(base: BaseType) -> Option<Type> {
        Some(match base {
            BaseType::Bool => Type::Bool,
            BaseType::Char => Type::Char,
            BaseType::UChar => Type::UChar,
            BaseType::Short => Type::Short,
            BaseType::UShort => Type::UShort,
            BaseType::Int => Type::Int,
            BaseType::UInt => Type::UInt,
            BaseType::Long => Type::Long,
            BaseType::ULong => Type::ULong,
            BaseType::Float => Type::Float,
            BaseType::Double => Type::Double,
            BaseType::String => Type::String,
            _ => return None,
        })
    }

    /// The element type of a vector or array.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Vector(element) | Type::Array(element, _) => Some(element),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Type::UType(_)
                | Type::Bool
                | Type::Char
                | Type::UChar
                | Type::Short
                | Type::UShort
                | Type::Int
                | Type::UInt
                | Type::Long
                | Type::ULong
                | Type::Float
                | Type::Double
                | Type::Enum(_)
        )
    }
}

/// An ordered sequence of name components, like `Game.Sample`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Namespace {
    pub components: Vec<String>,
}

impl Namespace {
    pub fn new(components: Vec<String>) -> Namespace {
        Namespace { components }
    }

    /// Parses a dotted path. The empty string is the root namespace.
    pub fn parse(path: &str) -> Namespace {
        Namespace {
            components: path
                .split('.')
                .filter(|part| !part.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// The enclosing namespace, or `None` for the root.
    pub fn parent(&self) -> Option<Namespace> {
        if self.is_root() {
            return None;
        }
        let mut components = self.components.clone();
        components.pop();
        Some(Namespace { components })
    }

    /// `A.B` + `name` gives `A.B.name`.
    pub fn qualify(&self, name: &str) -> String {
        self.join(name, ".")
    }

    /// `A.B` + `name` gives `A::B::name`.
    pub fn scoped(&self, name: &str) -> String {
        self.join(name, "::")
    }

    fn join(&self, name: &str, separator: &str) -> String {
        let mut text = String::new();
        for component in &self.components {
            text.push_str(component);
            text.push_str(separator);
        }
        text.push_str(name);
        text
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.components.join("."))
    }
}

/// Identity shared by every named schema entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Definition {
    pub name:        String,
    pub namespace:   Namespace,
    pub doc_comment: Vec<String>,
}

impl Definition {
    pub fn new(name: &str, namespace: Namespace) -> Definition {
        Definition {
            name: name.to_owned(),
            namespace,
            doc_comment: Vec::new(),
        }
    }

    pub fn qualified_name(&self) -> String {
        self.namespace.qualify(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DefaultValue {
    Integer(i64),
    Real(f64),
}

impl DefaultValue {
    pub fn as_i64(self) -> i64 {
        match self {
            DefaultValue::Integer(value) => value,
            DefaultValue::Real(value) => value as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            DefaultValue::Integer(value) => value as f64,
            DefaultValue::Real(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDef {
    pub name:        String,
    pub ty:          Type,
    /// Vtable slot for tables, declaration index for fixed structs.
    pub id:          u16,
    pub default:     Option<DefaultValue>,
    pub deprecated:  bool,
    pub key:         bool,
    pub required:    bool,
    pub doc_comment: Vec<String>,
}

impl FieldDef {
    pub fn new(name: &str, id: u16, ty: Type) -> FieldDef {
        FieldDef {
            name: name.to_owned(),
            ty,
            id,
            default: None,
            deprecated: false,
            key: false,
            required: false,
            doc_comment: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: DefaultValue) -> FieldDef {
        self.default = Some(default);
        self
    }

    pub fn with_key(mut self) -> FieldDef {
        self.key = true;
        self
    }

    pub fn with_required(mut self) -> FieldDef {
        self.required = true;
        self
    }

    pub fn with_deprecated(mut self) -> FieldDef {
        self.deprecated = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumVal {
    pub name:        String,
    pub value:       i64,
    /// The table a union member refers to. `None` for plain enums and for
    /// the implicit `NONE` member of a union.
    pub union_type:  Option<StructId>,
    pub doc_comment: Vec<String>,
}

impl EnumVal {
    pub fn new(name: &str, value: i64) -> EnumVal {
        EnumVal {
            name: name.to_owned(),
            value,
            union_type: None,
            doc_comment: Vec::new(),
        }
    }

    pub fn member(name: &str, value: i64, table: StructId) -> EnumVal {
        EnumVal {
            union_type: Some(table),
            ..EnumVal::new(name, value)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumDef {
    pub def:        Definition,
    pub underlying: BaseType,
    pub values:     Vec<EnumVal>,
    pub is_union:   bool,
    pub bit_flags:  bool,
}

impl EnumDef {
    pub fn new(def: Definition, underlying: BaseType, values: Vec<EnumVal>) -> EnumDef {
        EnumDef {
            def,
            underlying,
            values,
            is_union: false,
            bit_flags: false,
        }
    }

    /// A union always starts with `NONE = 0`, followed by its members.
    pub fn union(def: Definition, members: Vec<EnumVal>) -> EnumDef {
        let mut values = vec![EnumVal::new("NONE", 0)];
        values.extend(members);
        EnumDef {
            def,
            underlying: BaseType::UType,
            values,
            is_union: true,
            bit_flags: false,
        }
    }

    pub fn value_by_name(&self, name: &str) -> Option<&EnumVal> {
        self.values.iter().find(|value| value.name == name)
    }

    pub fn value_by_number(&self, number: i64) -> Option<&EnumVal> {
        self.values.iter().find(|value| value.value == number)
    }

    /// The union member that refers to `table`.
    pub fn member_for(&self, table: StructId) -> Option<&EnumVal> {
        self.values.iter().find(|value| value.union_type == Some(table))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructDef {
    pub def:         Definition,
    pub fields:      Vec<FieldDef>,
    /// Inline fixed-layout struct when set, table otherwise.
    pub fixed:       bool,
    /// Came from an included file.
    pub generated:   bool,
    pub has_key:     bool,
    pub force_align: Option<usize>,
}

impl StructDef {
    pub fn table(def: Definition, fields: Vec<FieldDef>) -> StructDef {
        let has_key = fields.iter().any(|field| field.key);
        StructDef {
            def,
            fields,
            fixed: false,
            generated: false,
            has_key,
            force_align: None,
        }
    }

    pub fn fixed(def: Definition, fields: Vec<FieldDef>) -> StructDef {
        StructDef {
            fixed: true,
            ..StructDef::table(def, fields)
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn qualified_name(&self) -> String {
        self.def.qualified_name()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_by_id(&self, id: u16) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.id == id)
    }

    pub fn key_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.key)
    }
}

/// A fully resolved and laid out schema.
///
/// Built once by [Schema::new] (and the `with_*` methods) and read-only
/// afterward. Every cross-reference is a [StructId]/[EnumId] into the
/// arenas owned here, so cyclic table graphs need no special handling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    structs:         Vec<StructDef>,
    enums:           Vec<EnumDef>,
    root_struct:     Option<StructId>,
    file_identifier: Option<[u8; 4]>,
    file_extension:  Option<String>,
    included_files:  Vec<String>,

    #[serde(skip)]
    struct_names:   Vec<String>,
    #[serde(skip)]
    enum_names:     Vec<String>,
    #[serde(skip)]
    struct_by_name: HashMap<String, StructId>,
    #[serde(skip)]
    enum_by_name:   HashMap<String, EnumId>,
    #[serde(skip)]
    layout:         SchemaLayout,
}

impl Schema {
    /// Validates the definitions and computes their layout.
    pub fn new(structs: Vec<StructDef>, enums: Vec<EnumDef>) -> Result<Schema, SchemaError> {
        let mut schema = Schema {
            structs,
            enums,
            root_struct: None,
            file_identifier: None,
            file_extension: None,
            included_files: Vec::new(),
            struct_names: Vec::new(),
            enum_names: Vec::new(),
            struct_by_name: HashMap::new(),
            enum_by_name: HashMap::new(),
            layout: SchemaLayout::default(),
        };

        schema.index_names()?;
        for index in 0..schema.enums.len() {
            schema.validate_enum(&schema.enums[index])?;
        }
        for index in 0..schema.structs.len() {
            schema.validate_struct(&schema.structs[index])?;
        }
        schema.layout = SchemaLayout::compute(&schema)?;

        Ok(schema)
    }

    /// Sets the root table. Fixed structs cannot be roots.
    pub fn with_root(mut self, root: StructId) -> Result<Schema, SchemaError> {
        let def = self.structs.get(root.index()).ok_or_else(|| SchemaError::UnresolvedType {
            owner:     "root_type".to_owned(),
            reference: format!("struct #{}", root.0),
        })?;
        if def.fixed {
            return Err(SchemaError::InvalidRoot(def.qualified_name()));
        }
        self.root_struct = Some(root);
        Ok(self)
    }

    pub fn with_file_identifier(mut self, identifier: [u8; 4]) -> Schema {
        self.file_identifier = Some(identifier);
        self
    }

    pub fn with_file_extension(mut self, extension: &str) -> Schema {
        self.file_extension = Some(extension.to_owned());
        self
    }

    pub fn with_included_files(mut self, files: Vec<String>) -> Schema {
        for file in files {
            if !self.included_files.contains(&file) {
                self.included_files.push(file);
            }
        }
        self
    }

    pub fn structs(&self) -> &[StructDef] {
        &self.structs
    }

    pub fn enums(&self) -> &[EnumDef] {
        &self.enums
    }

    /// Panics if `id` was not produced for this schema.
    pub fn struct_def(&self, id: StructId) -> &StructDef {
        &self.structs[id.index()]
    }

    /// Panics if `id` was not produced for this schema.
    pub fn enum_def(&self, id: EnumId) -> &EnumDef {
        &self.enums[id.index()]
    }

    /// The fully qualified name of a struct or table.
    pub fn struct_name(&self, id: StructId) -> &str {
        &self.struct_names[id.index()]
    }

    /// The fully qualified name of an enum or union.
    pub fn enum_name(&self, id: EnumId) -> &str {
        &self.enum_names[id.index()]
    }

    pub fn struct_layout(&self, id: StructId) -> &StructLayout {
        self.layout.struct_layout(id)
    }

    pub fn layout(&self) -> &SchemaLayout {
        &self.layout
    }

    /// Looks up a struct or table by its fully qualified name.
    pub fn find_struct(&self, qualified_name: &str) -> Option<StructId> {
        self.struct_by_name.get(qualified_name).copied()
    }

    /// Looks up an enum or union by its fully qualified name.
    pub fn find_enum(&self, qualified_name: &str) -> Option<EnumId> {
        self.enum_by_name.get(qualified_name).copied()
    }

    pub fn struct_ids(&self) -> impl Iterator<Item = StructId> {
        (0..self.structs.len() as u32).map(StructId)
    }

    pub fn root_struct(&self) -> Option<StructId> {
        self.root_struct
    }

    pub fn file_identifier(&self) -> Option<&[u8; 4]> {
        self.file_identifier.as_ref()
    }

    pub fn file_extension(&self) -> Option<&str> {
        self.file_extension.as_deref()
    }

    pub fn included_files(&self) -> &[String] {
        &self.included_files
    }

    /// The wire-level type of `ty`, resolving enums to their underlying type.
    pub fn base_type(&self, ty: &Type) -> BaseType {
        match ty {
            Type::None => BaseType::None,
            Type::UType(_) => BaseType::UType,
            Type::Bool => BaseType::Bool,
            Type::Char => BaseType::Char,
            Type::UChar => BaseType::UChar,
            Type::Short => BaseType::Short,
            Type::UShort => BaseType::UShort,
            Type::Int => BaseType::Int,
            Type::UInt => BaseType::UInt,
            Type::Long => BaseType::Long,
            Type::ULong => BaseType::ULong,
            Type::Float => BaseType::Float,
            Type::Double => BaseType::Double,
            Type::String => BaseType::String,
            Type::Vector(_) => BaseType::Vector,
            Type::Struct(_) => BaseType::Struct,
            Type::Union(_) => BaseType::Union,
            Type::Array(..) => BaseType::Array,
            Type::Enum(id) => self.enum_def(*id).underlying,
        }
    }

    /// Whether `ty` is stored inline: scalars and fixed structs.
    pub fn is_inline(&self, ty: &Type) -> bool {
        match ty {
            Type::Struct(id) => self.struct_def(*id).fixed,
            _ => ty.is_scalar(),
        }
    }

    /// A readable rendering of `ty` in IDL syntax.
    pub fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Vector(element) => format!("[{}]", self.type_name(element)),
            Type::Array(element, len) => format!("[{}:{}]", self.type_name(element), len),
            Type::Struct(id) => match self.structs.get(id.index()) {
                Some(def) => def.qualified_name(),
                None => format!("struct #{}", id.0),
            },
            Type::Enum(id) | Type::Union(id) | Type::UType(id) => match self.enums.get(id.index()) {
                Some(def) => def.def.qualified_name(),
                None => format!("enum #{}", id.0),
            },
            Type::None => BaseType::None.name().to_owned(),
            Type::Bool => BaseType::Bool.name().to_owned(),
            Type::Char => BaseType::Char.name().to_owned(),
            Type::UChar => BaseType::UChar.name().to_owned(),
            Type::Short => BaseType::Short.name().to_owned(),
            Type::UShort => BaseType::UShort.name().to_owned(),
            Type::Int => BaseType::Int.name().to_owned(),
            Type::UInt => BaseType::UInt.name().to_owned(),
            Type::Long => BaseType::Long.name().to_owned(),
            Type::ULong => BaseType::ULong.name().to_owned(),
            Type::Float => BaseType::Float.name().to_owned(),
            Type::Double => BaseType::Double.name().to_owned(),
            Type::String => BaseType::String.name().to_owned(),
        }
    }

    fn index_names(&mut self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for (index, def) in self.structs.iter().enumerate() {
            let name = def.qualified_name();
            if !seen.insert(name.clone()) {
                return Err(SchemaError::DuplicateDefinition(name));
            }
            self.struct_by_name.insert(name.clone(), StructId(index as u32));
            self.struct_names.push(name);
        }
        for (index, def) in self.enums.iter().enumerate() {
            let name = def.def.qualified_name();
            if !seen.insert(name.clone()) {
                return Err(SchemaError::DuplicateDefinition(name));
            }
            self.enum_by_name.insert(name.clone(), EnumId(index as u32));
            self.enum_names.push(name);
        }
        Ok(())
    }

    fn validate_enum(&self, def: &EnumDef) -> Result<(), SchemaError> {
        let name = def.def.qualified_name();
        if !def.underlying.is_integer() || (def.is_union && def.underlying != BaseType::UType) {
            return Err(SchemaError::InvalidEnumType(name));
        }

        let mut names = HashSet::new();
        for value in &def.values {
            if !names.insert(value.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    owner: name,
                    field: value.name.clone(),
                });
            }
            if let Some(table) = value.union_type {
                let member = self.structs.get(table.index()).ok_or_else(|| SchemaError::UnresolvedType {
                    owner:     name.clone(),
                    reference: format!("struct #{}", table.0),
                })?;
                if !def.is_union || member.fixed {
                    return Err(SchemaError::InvalidUnionMember {
                        union_name: name,
                        member:     member.qualified_name(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_struct(&self, def: &StructDef) -> Result<(), SchemaError> {
        let owner = def.qualified_name();
        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        let mut key: Option<&FieldDef> = None;

        for field in &def.fields {
            self.validate_type(&owner, &field.ty)?;

            if !names.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    owner,
                    field: field.name.clone(),
                });
            }
            if !ids.insert(field.id) {
                return Err(SchemaError::DuplicateFieldId { owner, id: field.id });
            }
            if !def.fixed && field.id > MAX_FIELD_ID {
                return Err(SchemaError::FieldIdTooLarge {
                    owner,
                    field: field.name.clone(),
                    id: field.id,
                    max: MAX_FIELD_ID,
                });
            }
            if field.key {
                if let Some(first) = key {
                    return Err(SchemaError::DuplicateKey {
                        owner,
                        first: first.name.clone(),
                        second: field.name.clone(),
                    });
                }
                key = Some(field);
            }

            if let Type::Union(union_id) = field.ty {
                let preceded = field
                    .id
                    .checked_sub(1)
                    .and_then(|id| def.field_by_id(id))
                    .map_or(false, |type_field| type_field.ty == Type::UType(union_id));
                if !preceded {
                    return Err(SchemaError::MissingUnionType {
                        owner,
                        field: field.name.clone(),
                    });
                }
            }
        }

        if def.has_key != key.is_some() {
            return Err(SchemaError::KeyFlagMismatch(owner));
        }
        Ok(())
    }

    fn validate_type(&self, owner: &str, ty: &Type) -> Result<(), SchemaError> {
        let unresolved = |reference: String| SchemaError::UnresolvedType {
            owner: owner.to_owned(),
            reference,
        };
        match ty {
            Type::Struct(id) if id.index() >= self.structs.len() => Err(unresolved(format!("struct #{}", id.0))),
            Type::Enum(id) | Type::Union(id) | Type::UType(id) if id.index() >= self.enums.len() => {
                Err(unresolved(format!("enum #{}", id.0)))
            }
            Type::Union(id) | Type::UType(id) if !self.enums[id.index()].is_union => {
                Err(unresolved(self.enums[id.index()].def.qualified_name()))
            }
            Type::Enum(id) if self.enums[id.index()].is_union => {
                Err(unresolved(self.enums[id.index()].def.qualified_name()))
            }
            Type::Vector(element) | Type::Array(element, _) => self.validate_type(owner, element),
            _ => Ok(()),
        }
    }
}
