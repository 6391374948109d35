use std::collections::{HashMap, HashSet};
use brine_flat_schema::{
    BaseType, DefaultValue, Definition as SchemaDefinition, EnumDef, EnumId, EnumVal, FieldDef, Namespace,
    Schema, StructDef, StructId, Type,
};
use tracing::debug;
use crate::{
    types::{Definition, DefinitionKind, Field, SchemaFile, TypeRef},
    utils::{parse_integer, quote},
    error::FlatError,
};

/// A parsed file along with where it came from. `generated` marks files that
/// were pulled in by `include`.
#[derive(Debug)]
pub struct ParsedFile {
    pub path:      String,
    pub file:      SchemaFile,
    pub generated: bool,
}

#[derive(Debug, Clone, Copy)]
struct Symbol {
    kind:  DefinitionKind,
    index: u32,
}

struct Resolver {
    symbols: HashMap<String, Symbol>,
    enums:   Vec<EnumDef>,
}

fn invalid(msg: String) -> FlatError {
    FlatError::VerifierError(msg)
}

/// Resolves names across `files` and builds the [Schema]. Definitions keep
/// their declaration order; the last file is the one being compiled and
/// supplies the root type, file identifier and file extension.
pub fn resolve_schema(files: &[ParsedFile]) -> Result<Schema, FlatError> {
    let mut symbols = HashMap::new();
    let (mut structs, mut enums) = (0u32, 0u32);
    for def in files.iter().flat_map(|parsed| &parsed.file.definitions) {
        let counter = match def.kind {
            DefinitionKind::Struct | DefinitionKind::Table => &mut structs,
            DefinitionKind::Enum | DefinitionKind::Union => &mut enums,
        };
        let symbol = Symbol {
            kind:  def.kind,
            index: *counter,
        };
        *counter += 1;
        if symbols.insert(def.qualified_name(), symbol).is_some() {
            return Err(invalid(format!("The type {} is defined twice", quote(&def.qualified_name()))));
        }
    }

    let mut resolver = Resolver {
        symbols,
        enums: Vec::new(),
    };

    // Enums first, so enum typed defaults can be resolved by name.
    for def in files.iter().flat_map(|parsed| &parsed.file.definitions) {
        match def.kind {
            DefinitionKind::Enum => {
                let value = resolver.enum_def(def)?;
                resolver.enums.push(value);
            }
            DefinitionKind::Union => {
                let value = resolver.union_def(def)?;
                resolver.enums.push(value);
            }
            DefinitionKind::Struct | DefinitionKind::Table => {}
        }
    }

    let mut struct_defs = Vec::new();
    for parsed in files {
        for def in &parsed.file.definitions {
            if let DefinitionKind::Struct | DefinitionKind::Table = def.kind {
                let mut value = resolver.struct_def(def)?;
                value.generated = parsed.generated;
                struct_defs.push(value);
            }
        }
    }

    let mut schema = Schema::new(struct_defs, std::mem::take(&mut resolver.enums))?;

    if let Some(main) = files.last() {
        if let Some(root) = &main.file.root_type {
            let id = match resolver.lookup(&root.text, &main.file.root_namespace) {
                Some(Symbol { kind: DefinitionKind::Table, index }) => StructId(index),
                _ => {
                    return Err(invalid(format!(
                        "The root type {} must be a table (line {}, column {})",
                        quote(&root.text),
                        root.line,
                        root.column
                    )))
                }
            };
            schema = schema.with_root(id)?;
        }
        if let Some(identifier) = &main.file.file_identifier {
            let bytes: [u8; 4] = identifier.text.as_bytes().try_into().map_err(|_| {
                invalid(format!("The file identifier {} must be exactly 4 bytes long", quote(&identifier.text)))
            })?;
            schema = schema.with_file_identifier(bytes);
        }
        if let Some(extension) = &main.file.file_extension {
            schema = schema.with_file_extension(extension);
        }
    }

    let included = files.iter().filter(|parsed| parsed.generated).map(|parsed| parsed.path.clone()).collect();
    let schema = schema.with_included_files(included);

    debug!(
        structs = schema.structs().len(),
        enums = schema.enums().len(),
        "resolved schema"
    );
    Ok(schema)
}

impl Resolver {
    /// Looks `name` up in `namespace`, then in each enclosing namespace up to
    /// the root, where fully qualified names resolve.
    fn lookup(&self, name: &str, namespace: &str) -> Option<Symbol> {
        let mut scope = Namespace::parse(namespace);
        loop {
            if let Some(symbol) = self.symbols.get(&scope.qualify(name)) {
                return Some(*symbol);
            }
            scope = scope.parent()?;
        }
    }

    fn definition(def: &Definition) -> SchemaDefinition {
        SchemaDefinition {
            doc_comment: def.doc_comment.clone(),
            ..SchemaDefinition::new(&def.name, Namespace::parse(&def.namespace))
        }
    }

    fn resolve_type(&self, def: &Definition, field: &Field, ty: &TypeRef) -> Result<Type, FlatError> {
        match ty {
            TypeRef::Vector(element) => Ok(Type::Vector(Box::new(self.resolve_type(def, field, element)?))),
            TypeRef::Array(element, len) => Ok(Type::Array(Box::new(self.resolve_type(def, field, element)?), *len)),
            TypeRef::Named(name) => {
                if let Some(base) = BaseType::from_name(name).and_then(Type::from_base) {
                    return Ok(base);
                }
                match self.lookup(name, &def.namespace) {
                    Some(Symbol { kind: DefinitionKind::Struct | DefinitionKind::Table, index }) => {
                        Ok(Type::Struct(StructId(index)))
                    }
                    Some(Symbol { kind: DefinitionKind::Enum, index }) => Ok(Type::Enum(EnumId(index))),
                    Some(Symbol { kind: DefinitionKind::Union, index }) => Ok(Type::Union(EnumId(index))),
                    None => Err(invalid(format!(
                        "The type {} is not defined for field {}.{} (line {}, column {})",
                        quote(name),
                        def.name,
                        field.name,
                        field.line,
                        field.column
                    ))),
                }
            }
        }
    }

    fn enum_def(&self, def: &Definition) -> Result<EnumDef, FlatError> {
        let underlying = def
            .underlying
            .as_deref()
            .and_then(BaseType::from_name)
            .filter(|base| base.is_integer())
            .ok_or_else(|| invalid(format!("The enum {} needs an integer underlying type", quote(&def.name))))?;
        let bit_flags = def.has_attribute("bit_flags");

        let mut values = Vec::with_capacity(def.fields.len());
        let mut next = 0i64;
        for field in &def.fields {
            let position = match &field.value {
                Some(text) => parse_integer(text)
                    .and_then(|value| i64::try_from(value).ok())
                    .ok_or_else(|| invalid(format!("Invalid value {} for {}", quote(text), quote(&field.name))))?,
                None => next,
            };
            next = position.saturating_add(1);

            let number = if bit_flags {
                u32::try_from(position)
                    .ok()
                    .and_then(|bit| 1u64.checked_shl(bit))
                    .map(|flag| flag as i64)
                    .ok_or_else(|| invalid(format!("The bit {} of {} is out of range", position, quote(&field.name))))?
            } else {
                position
            };
            values.push(EnumVal {
                doc_comment: field.doc_comment.clone(),
                ..EnumVal::new(&field.name, number)
            });
        }

        let mut value = EnumDef::new(Resolver::definition(def), underlying, values);
        value.bit_flags = bit_flags;
        Ok(value)
    }

    fn union_def(&self, def: &Definition) -> Result<EnumDef, FlatError> {
        let mut members = Vec::with_capacity(def.fields.len());
        for (index, field) in def.fields.iter().enumerate() {
            let table = match self.lookup(&field.name, &def.namespace) {
                Some(Symbol { kind: DefinitionKind::Table, index }) => StructId(index),
                _ => {
                    return Err(invalid(format!(
                        "The union {} member {} must be a table",
                        quote(&def.name),
                        quote(&field.name)
                    )))
                }
            };
            members.push(EnumVal {
                doc_comment: field.doc_comment.clone(),
                ..EnumVal::member(&field.name.replace('.', "_"), index as i64 + 1, table)
            });
        }
        Ok(EnumDef::union(Resolver::definition(def), members))
    }

    fn struct_def(&self, def: &Definition) -> Result<StructDef, FlatError> {
        let fixed = def.kind == DefinitionKind::Struct;
        let fields = if fixed {
            self.struct_fields(def)?
        } else {
            self.table_fields(def)?
        };

        let mut value = if fixed {
            StructDef::fixed(Resolver::definition(def), fields)
        } else {
            StructDef::table(Resolver::definition(def), fields)
        };
        value.force_align = def
            .attribute("force_align")
            .and_then(|attribute| attribute.value.as_deref())
            .and_then(parse_integer)
            .map(|align| align as usize);
        Ok(value)
    }

    fn field_type(&self, def: &Definition, field: &Field) -> Result<Type, FlatError> {
        let ty = field
            .type_
            .as_ref()
            .ok_or_else(|| invalid(format!("The field {}.{} has no type", def.name, field.name)))?;
        self.resolve_type(def, field, ty)
    }

    fn field_def(&self, def: &Definition, field: &Field, id: u16, ty: Type) -> Result<FieldDef, FlatError> {
        let default = self.default_value(def, field, &ty)?;
        Ok(FieldDef {
            name: field.name.clone(),
            ty,
            id,
            default,
            deprecated: field.has_attribute("deprecated"),
            key: field.has_attribute("key"),
            required: field.has_attribute("required"),
            doc_comment: field.doc_comment.clone(),
        })
    }

    fn struct_fields(&self, def: &Definition) -> Result<Vec<FieldDef>, FlatError> {
        let mut fields = Vec::with_capacity(def.fields.len());
        for (index, field) in def.fields.iter().enumerate() {
            let ty = self.field_type(def, field)?;
            fields.push(self.field_def(def, field, index as u16, ty)?);
        }
        Ok(fields)
    }

    /// Table fields get sequential ids unless every field declares one. A
    /// union field is preceded by a hidden `<name>_type` field one id below.
    fn table_fields(&self, def: &Definition) -> Result<Vec<FieldDef>, FlatError> {
        let explicit = def.fields.iter().any(|field| field.has_attribute("id"));
        let mut fields = Vec::with_capacity(def.fields.len());
        let mut next = 0u16;

        for field in &def.fields {
            let ty = self.field_type(def, field)?;
            let union = match ty {
                Type::Union(union) => Some(union),
                _ => None,
            };

            let id = if explicit {
                field
                    .attribute("id")
                    .and_then(|attribute| attribute.value.as_deref())
                    .and_then(parse_integer)
                    .and_then(|id| u16::try_from(id).ok())
                    .ok_or_else(|| invalid(format!("Invalid id for field {}.{}", def.name, field.name)))?
            } else {
                next + union.is_some() as u16
            };
            next = id + 1;

            if let Some(union) = union {
                let type_id = id.checked_sub(1).ok_or_else(|| {
                    invalid(format!(
                        "The union field {}.{} needs an id of at least 1 for its type field",
                        def.name, field.name
                    ))
                })?;
                let mut type_field = FieldDef::new(&format!("{}_type", field.name), type_id, Type::UType(union));
                type_field.deprecated = field.has_attribute("deprecated");
                fields.push(type_field);
            }
            fields.push(self.field_def(def, field, id, ty)?);
        }

        if explicit {
            let mut ids: Vec<u16> = fields.iter().map(|field| field.id).collect();
            ids.sort_unstable();
            let dense = ids.iter().enumerate().all(|(index, id)| *id as usize == index);
            if !dense {
                return Err(invalid(format!(
                    "The field ids of {} must be unique and cover 0..{} (unions take two ids)",
                    quote(&def.name),
                    ids.len()
                )));
            }
        }

        let mut names = HashSet::new();
        for field in &fields {
            if !names.insert(field.name.as_str()) {
                return Err(invalid(format!(
                    "The field {}.{} collides with the type field of a union",
                    def.name, field.name
                )));
            }
        }
        Ok(fields)
    }

    fn default_value(&self, def: &Definition, field: &Field, ty: &Type) -> Result<Option<DefaultValue>, FlatError> {
        let text = match &field.value {
            Some(text) => text.as_str(),
            None => return Ok(None),
        };
        let bad_default = || {
            invalid(format!(
                "Invalid default value {} for field {}.{}",
                quote(text),
                def.name,
                field.name
            ))
        };

        let integer = |base: BaseType| parse_integer(text).map(|value| (value, base)).ok_or_else(bad_default);
        let (value, base) = match ty {
            Type::Float | Type::Double => {
                let real = match parse_integer(text) {
                    Some(value) => value as f64,
                    None => text.parse::<f64>().map_err(|_| bad_default())?,
                };
                return Ok(Some(DefaultValue::Real(real)));
            }
            Type::Bool => match text {
                "true" => (1, BaseType::Bool),
                "false" => (0, BaseType::Bool),
                _ => integer(BaseType::Bool)?,
            },
            Type::Enum(id) => {
                let enum_def = &self.enums[id.index()];
                let name = text.rsplit('.').next().unwrap_or(text);
                match enum_def.value_by_name(name) {
                    Some(value) => (value.value as i128, enum_def.underlying),
                    None => integer(enum_def.underlying)?,
                }
            }
            Type::Char => integer(BaseType::Char)?,
            Type::UChar => integer(BaseType::UChar)?,
            Type::Short => integer(BaseType::Short)?,
            Type::UShort => integer(BaseType::UShort)?,
            Type::Int => integer(BaseType::Int)?,
            Type::UInt => integer(BaseType::UInt)?,
            Type::Long => integer(BaseType::Long)?,
            Type::ULong => integer(BaseType::ULong)?,
            Type::None
            | Type::UType(_)
            | Type::String
            | Type::Vector(_)
            | Type::Struct(_)
            | Type::Union(_)
            | Type::Array(..) => {
                return Err(invalid(format!(
                    "Only scalar fields can have a default value ({}.{})",
                    def.name, field.name
                )))
            }
        };

        match base.integer_range() {
            Some((low, high)) if value >= low && value <= high => {}
            _ => return Err(bad_default()),
        }
        // u64 defaults above i64::MAX keep their bit pattern.
        Ok(Some(DefaultValue::Integer(value as i64)))
    }
}
