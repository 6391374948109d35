use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use brine_flat_schema::{
    BaseType, Builder, Buffer, DefaultValue, Definition, EnumDef, EnumId, EnumVal, FieldDef, Namespace, Offset,
    Schema, StructDef, StructId, Table, Type, Vector,
};
use tracing::{debug, trace};
use crate::{
    types::SchemaFile,
    verifier::verify_schema,
    resolver::{resolve_schema, ParsedFile},
    tokenizer::tokenize_schema,
    parser::parse_schema,
    utils::quote,
    error::FlatError,
};

/// Where `compile_file` looks for included files, after the directory of
/// the including file.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub include_paths: Vec<PathBuf>,
}

/// Tokenizes and parses one schema file without resolving anything.
pub fn parse_schema_text(text: &str) -> Result<SchemaFile, FlatError> {
    let tokens = tokenize_schema(text)?;
    parse_schema(&tokens)
}

/// Compile a textual schema into a [Schema]. Includes need a file system
/// location to be resolved against, use [compile_file] for those.
pub fn compile_schema(text: &str) -> Result<Schema, FlatError> {
    let file = parse_schema_text(text)?;
    if let Some(include) = file.includes.first() {
        return Err(FlatError::IncludeError(format!(
            "Cannot include {} from a schema without a path (line {})",
            quote(&include.path),
            include.line
        )));
    }

    let declared = file.attributes.iter().cloned().collect();
    verify_schema(&file, &declared)?;
    resolve_schema(&[ParsedFile {
        path: String::new(),
        file,
        generated: false,
    }])
}

/// Compile the schema file at `path` along with everything it includes.
/// Each file is loaded once, included files before the files that include
/// them, and their definitions are marked as generated.
pub fn compile_file(path: &Path, options: &CompileOptions) -> Result<Schema, FlatError> {
    let mut loader = Loader {
        options,
        seen: HashSet::new(),
        files: Vec::new(),
    };
    let root = fs::canonicalize(path)?;
    loader.seen.insert(root.clone());
    loader.load(&root, false)?;

    let declared: HashSet<String> = loader
        .files
        .iter()
        .flat_map(|parsed| parsed.file.attributes.iter().cloned())
        .collect();
    for parsed in &loader.files {
        verify_schema(&parsed.file, &declared).map_err(|err| match err {
            FlatError::VerifierError(msg) => FlatError::VerifierError(format!("{}: {}", parsed.path, msg)),
            other => other,
        })?;
    }
    resolve_schema(&loader.files)
}

struct Loader<'o> {
    options: &'o CompileOptions,
    seen:    HashSet<PathBuf>,
    files:   Vec<ParsedFile>,
}

impl<'o> Loader<'o> {
    fn load(&mut self, path: &Path, generated: bool) -> Result<(), FlatError> {
        debug!(path = %path.display(), generated, "loading schema file");
        let text = fs::read_to_string(path)?;
        let file = parse_schema_text(&text).map_err(|err| match err {
            FlatError::ParseError { msg, line, column } => FlatError::ParseError {
                msg: format!("{}: {}", path.display(), msg),
                line,
                column,
            },
            other => other,
        })?;

        for include in &file.includes {
            let found = self.locate(path, &include.path).ok_or_else(|| {
                FlatError::IncludeError(format!(
                    "Unable to locate {} included from {} (line {})",
                    quote(&include.path),
                    path.display(),
                    include.line
                ))
            })?;
            if self.seen.insert(found.clone()) {
                self.load(&found, true)?;
            } else {
                trace!(path = %found.display(), "already loaded");
            }
        }

        self.files.push(ParsedFile {
            path: path.display().to_string(),
            file,
            generated,
        });
        Ok(())
    }

    fn locate(&self, from: &Path, include: &str) -> Option<PathBuf> {
        let local = from.parent().map(|dir| dir.join(include));
        local
            .into_iter()
            .chain(self.options.include_paths.iter().map(|dir| dir.join(include)))
            .find(|candidate| candidate.is_file())
            .and_then(|candidate| fs::canonicalize(candidate).ok())
    }
}

/// The file identifier of binary schemas.
pub const BINARY_SCHEMA_IDENTIFIER: [u8; 4] = *b"BFBS";

// Field ids of the tables making up a binary schema.
const SCHEMA_OBJECTS: u16 = 0;
const SCHEMA_ENUMS: u16 = 1;
const SCHEMA_ROOT: u16 = 2;
const SCHEMA_FILE_IDENT: u16 = 3;
const SCHEMA_FILE_EXT: u16 = 4;
const SCHEMA_INCLUDES: u16 = 5;

const OBJECT_NAME: u16 = 0;
const OBJECT_NAMESPACE: u16 = 1;
const OBJECT_FIELDS: u16 = 2;
const OBJECT_FIXED: u16 = 3;
const OBJECT_FORCE_ALIGN: u16 = 4;
const OBJECT_GENERATED: u16 = 5;
const OBJECT_DOC: u16 = 6;

const FIELD_NAME: u16 = 0;
const FIELD_TYPE: u16 = 1;
const FIELD_ID: u16 = 2;
const FIELD_DEFAULT_INTEGER: u16 = 3;
const FIELD_DEFAULT_REAL: u16 = 4;
const FIELD_DEPRECATED: u16 = 5;
const FIELD_REQUIRED: u16 = 6;
const FIELD_KEY: u16 = 7;
const FIELD_DOC: u16 = 8;

const TYPE_BASE: u16 = 0;
const TYPE_ELEMENT: u16 = 1;
const TYPE_INDEX: u16 = 2;
const TYPE_LENGTH: u16 = 3;

const ENUM_NAME: u16 = 0;
const ENUM_NAMESPACE: u16 = 1;
const ENUM_VALUES: u16 = 2;
const ENUM_UNION: u16 = 3;
const ENUM_UNDERLYING: u16 = 4;
const ENUM_BIT_FLAGS: u16 = 5;
const ENUM_DOC: u16 = 6;

const VALUE_NAME: u16 = 0;
const VALUE_NUMBER: u16 = 1;
const VALUE_TABLE: u16 = 2;
const VALUE_DOC: u16 = 3;

/// Encode a [Schema] as a flat buffer with the `BFBS` file identifier.
pub fn encode_binary_schema(schema: &Schema) -> Result<Vec<u8>, FlatError> {
    let mut builder = Builder::new();

    let mut objects = Vec::with_capacity(schema.structs().len());
    for def in schema.structs() {
        objects.push(encode_object(&mut builder, schema, def)?);
    }
    let objects = builder.create_vector_of_offsets(&objects)?;

    let mut enums = Vec::with_capacity(schema.enums().len());
    for def in schema.enums() {
        enums.push(encode_enum(&mut builder, def)?);
    }
    let enums = builder.create_vector_of_offsets(&enums)?;

    let file_ident = match schema.file_identifier() {
        Some(identifier) => Some(builder.create_byte_string(identifier)?),
        None => None,
    };
    let file_ext = match schema.file_extension() {
        Some(extension) => Some(builder.create_string(extension)?),
        None => None,
    };
    let includes = encode_strings(&mut builder, schema.included_files())?;

    builder.start_table()?;
    builder.add_offset(SCHEMA_OBJECTS, objects)?;
    builder.add_offset(SCHEMA_ENUMS, enums)?;
    if let Some(root) = schema.root_struct() {
        builder.add_field(SCHEMA_ROOT, root.0)?;
    }
    if let Some(file_ident) = file_ident {
        builder.add_offset(SCHEMA_FILE_IDENT, file_ident)?;
    }
    if let Some(file_ext) = file_ext {
        builder.add_offset(SCHEMA_FILE_EXT, file_ext)?;
    }
    builder.add_offset(SCHEMA_INCLUDES, includes)?;
    let root = builder.end_table()?;

    builder.finish_with_identifier(root, &BINARY_SCHEMA_IDENTIFIER)?;
    let bytes = builder.into_finished_data()?;
    debug!(bytes = bytes.len(), "encoded binary schema");
    Ok(bytes)
}

fn encode_strings(builder: &mut Builder, items: &[String]) -> Result<Offset, FlatError> {
    let mut offsets = Vec::with_capacity(items.len());
    for item in items {
        offsets.push(builder.create_shared_string(item)?);
    }
    Ok(builder.create_vector_of_offsets(&offsets)?)
}

fn encode_type(builder: &mut Builder, schema: &Schema, ty: &Type) -> Result<Offset, FlatError> {
    let element = match ty.element() {
        Some(element) => Some(encode_type(builder, schema, element)?),
        None => None,
    };
    let index = match ty {
        Type::Struct(id) => Some(id.0),
        Type::Enum(id) | Type::Union(id) | Type::UType(id) => Some(id.0),
        _ => None,
    };

    builder.start_table()?;
    builder.add_field(TYPE_BASE, schema.base_type(ty).tag())?;
    if let Some(element) = element {
        builder.add_offset(TYPE_ELEMENT, element)?;
    }
    if let Some(index) = index {
        builder.add_field(TYPE_INDEX, index)?;
    }
    if let Type::Array(_, len) = ty {
        builder.add_field(TYPE_LENGTH, *len)?;
    }
    Ok(builder.end_table()?)
}

fn encode_field(builder: &mut Builder, schema: &Schema, field: &FieldDef) -> Result<Offset, FlatError> {
    let name = builder.create_shared_string(&field.name)?;
    let ty = encode_type(builder, schema, &field.ty)?;
    let doc = encode_strings(builder, &field.doc_comment)?;

    builder.start_table()?;
    builder.add_offset(FIELD_NAME, name)?;
    builder.add_offset(FIELD_TYPE, ty)?;
    builder.add_field(FIELD_ID, field.id)?;
    match field.default {
        Some(DefaultValue::Integer(value)) => builder.add_field(FIELD_DEFAULT_INTEGER, value)?,
        Some(DefaultValue::Real(value)) => builder.add_field(FIELD_DEFAULT_REAL, value)?,
        None => {}
    }
    builder.add_field_default(FIELD_DEPRECATED, field.deprecated, false)?;
    builder.add_field_default(FIELD_REQUIRED, field.required, false)?;
    builder.add_field_default(FIELD_KEY, field.key, false)?;
    builder.add_offset(FIELD_DOC, doc)?;
    Ok(builder.end_table()?)
}

fn encode_object(builder: &mut Builder, schema: &Schema, def: &StructDef) -> Result<Offset, FlatError> {
    let name = builder.create_shared_string(&def.def.name)?;
    let namespace = builder.create_shared_string(&def.def.namespace.to_string())?;
    let mut fields = Vec::with_capacity(def.fields.len());
    for field in &def.fields {
        fields.push(encode_field(builder, schema, field)?);
    }
    let fields = builder.create_vector_of_offsets(&fields)?;
    let doc = encode_strings(builder, &def.def.doc_comment)?;

    builder.start_table()?;
    builder.add_offset(OBJECT_NAME, name)?;
    builder.add_offset(OBJECT_NAMESPACE, namespace)?;
    builder.add_offset(OBJECT_FIELDS, fields)?;
    builder.add_field_default(OBJECT_FIXED, def.fixed, false)?;
    if let Some(align) = def.force_align {
        let align = u32::try_from(align).map_err(|_| FlatError::EncodeError(format!("force_align {}", align)))?;
        builder.add_field(OBJECT_FORCE_ALIGN, align)?;
    }
    builder.add_field_default(OBJECT_GENERATED, def.generated, false)?;
    builder.add_offset(OBJECT_DOC, doc)?;
    Ok(builder.end_table()?)
}

fn encode_enum(builder: &mut Builder, def: &EnumDef) -> Result<Offset, FlatError> {
    let name = builder.create_shared_string(&def.def.name)?;
    let namespace = builder.create_shared_string(&def.def.namespace.to_string())?;

    let mut values = Vec::with_capacity(def.values.len());
    for value in &def.values {
        let value_name = builder.create_shared_string(&value.name)?;
        let doc = encode_strings(builder, &value.doc_comment)?;
        builder.start_table()?;
        builder.add_offset(VALUE_NAME, value_name)?;
        builder.add_field(VALUE_NUMBER, value.value)?;
        if let Some(table) = value.union_type {
            builder.add_field(VALUE_TABLE, table.0)?;
        }
        builder.add_offset(VALUE_DOC, doc)?;
        values.push(builder.end_table()?);
    }
    let values = builder.create_vector_of_offsets(&values)?;
    let doc = encode_strings(builder, &def.def.doc_comment)?;

    builder.start_table()?;
    builder.add_offset(ENUM_NAME, name)?;
    builder.add_offset(ENUM_NAMESPACE, namespace)?;
    builder.add_offset(ENUM_VALUES, values)?;
    builder.add_field_default(ENUM_UNION, def.is_union, false)?;
    builder.add_field(ENUM_UNDERLYING, def.underlying.tag())?;
    builder.add_field_default(ENUM_BIT_FLAGS, def.bit_flags, false)?;
    builder.add_offset(ENUM_DOC, doc)?;
    Ok(builder.end_table()?)
}

/// Decode a binary schema buffer back into a [Schema].
/// Returns `Err(FlatError)` on any read failure or invalid data.
pub fn decode_binary_schema(buffer: &[u8]) -> Result<Schema, FlatError> {
    let buffer = Buffer::new(buffer);
    if !buffer.has_identifier(&BINARY_SCHEMA_IDENTIFIER) {
        return Err(FlatError::DecodeError("Missing the BFBS file identifier".to_owned()));
    }
    let root = buffer.root()?;

    let mut structs = Vec::new();
    let objects = required_vector(&root, SCHEMA_OBJECTS, "objects")?;
    for index in 0..objects.len() {
        structs.push(decode_object(&objects.get_table(index)?)?);
    }

    let mut enums = Vec::new();
    let enum_tables = required_vector(&root, SCHEMA_ENUMS, "enums")?;
    for index in 0..enum_tables.len() {
        enums.push(decode_enum(&enum_tables.get_table(index)?)?);
    }

    let mut schema = Schema::new(structs, enums)?;
    if let Some(root_struct) = root.get_scalar_opt::<u32>(SCHEMA_ROOT)? {
        schema = schema.with_root(StructId(root_struct))?;
    }
    if let Some(identifier) = root.get_byte_string(SCHEMA_FILE_IDENT)? {
        let identifier: [u8; 4] = identifier
            .try_into()
            .map_err(|_| FlatError::DecodeError("The file identifier must be 4 bytes long".to_owned()))?;
        schema = schema.with_file_identifier(identifier);
    }
    if let Some(extension) = root.get_string(SCHEMA_FILE_EXT)? {
        schema = schema.with_file_extension(extension);
    }
    Ok(schema.with_included_files(decode_strings(&root, SCHEMA_INCLUDES)?))
}

fn required_vector<'a>(table: &Table<'a>, id: u16, what: &str) -> Result<Vector<'a>, FlatError> {
    table
        .get_vector(id)?
        .ok_or_else(|| FlatError::DecodeError(format!("Missing {}", what)))
}

fn required_string(table: &Table<'_>, id: u16, what: &str) -> Result<String, FlatError> {
    table
        .get_string(id)?
        .map(str::to_owned)
        .ok_or_else(|| FlatError::DecodeError(format!("Missing {}", what)))
}

fn decode_strings(table: &Table<'_>, id: u16) -> Result<Vec<String>, FlatError> {
    let mut items = Vec::new();
    if let Some(vector) = table.get_vector(id)? {
        for index in 0..vector.len() {
            items.push(vector.get_string(index)?.to_owned());
        }
    }
    Ok(items)
}

fn decode_definition(table: &Table<'_>, name: u16, namespace: u16, doc: u16) -> Result<Definition, FlatError> {
    Ok(Definition {
        name:        required_string(table, name, "definition name")?,
        namespace:   Namespace::parse(&required_string(table, namespace, "namespace")?),
        doc_comment: decode_strings(table, doc)?,
    })
}

fn decode_type(table: &Table<'_>) -> Result<Type, FlatError> {
    let tag = table.get_scalar::<u8>(TYPE_BASE, 0)?;
    let base = BaseType::from_tag(tag).ok_or_else(|| FlatError::DecodeError(format!("Invalid base type {}", tag)))?;
    let index = table.get_scalar_opt::<u32>(TYPE_INDEX)?;
    let element = || -> Result<Box<Type>, FlatError> {
        let element = table
            .get_table(TYPE_ELEMENT)?
            .ok_or_else(|| FlatError::DecodeError("Missing element type".to_owned()))?;
        Ok(Box::new(decode_type(&element)?))
    };

    let ty = match (base, index) {
        (BaseType::Vector, _) => Type::Vector(element()?),
        (BaseType::Array, _) => Type::Array(element()?, table.get_scalar::<u16>(TYPE_LENGTH, 0)?),
        (BaseType::Struct, Some(index)) => Type::Struct(StructId(index)),
        (BaseType::Union, Some(index)) => Type::Union(EnumId(index)),
        (BaseType::UType, Some(index)) => Type::UType(EnumId(index)),
        (base, Some(index)) if base.is_integer() => Type::Enum(EnumId(index)),
        (BaseType::None, None) => Type::None,
        (base, _) => Type::from_base(base)
            .ok_or_else(|| FlatError::DecodeError(format!("Incomplete type {}", base.name())))?,
    };
    Ok(ty)
}

fn decode_object(table: &Table<'_>) -> Result<StructDef, FlatError> {
    let def = decode_definition(table, OBJECT_NAME, OBJECT_NAMESPACE, OBJECT_DOC)?;

    let mut fields = Vec::new();
    let field_tables = required_vector(table, OBJECT_FIELDS, "fields")?;
    for index in 0..field_tables.len() {
        let field = field_tables.get_table(index)?;
        let ty = field
            .get_table(FIELD_TYPE)?
            .ok_or_else(|| FlatError::DecodeError("Missing field type".to_owned()))?;

        let default = match field.get_scalar_opt::<i64>(FIELD_DEFAULT_INTEGER)? {
            Some(value) => Some(DefaultValue::Integer(value)),
            None => field.get_scalar_opt::<f64>(FIELD_DEFAULT_REAL)?.map(DefaultValue::Real),
        };
        fields.push(FieldDef {
            name: required_string(&field, FIELD_NAME, "field name")?,
            ty: decode_type(&ty)?,
            id: field.get_scalar::<u16>(FIELD_ID, 0)?,
            default,
            deprecated: field.get_scalar(FIELD_DEPRECATED, false)?,
            key: field.get_scalar(FIELD_KEY, false)?,
            required: field.get_scalar(FIELD_REQUIRED, false)?,
            doc_comment: decode_strings(&field, FIELD_DOC)?,
        });
    }

    let mut value = if table.get_scalar(OBJECT_FIXED, false)? {
        StructDef::fixed(def, fields)
    } else {
        StructDef::table(def, fields)
    };
    value.force_align = table.get_scalar_opt::<u32>(OBJECT_FORCE_ALIGN)?.map(|align| align as usize);
    value.generated = table.get_scalar(OBJECT_GENERATED, false)?;
    Ok(value)
}

fn decode_enum(table: &Table<'_>) -> Result<EnumDef, FlatError> {
    let def = decode_definition(table, ENUM_NAME, ENUM_NAMESPACE, ENUM_DOC)?;

    let mut values = Vec::new();
    let value_tables = required_vector(table, ENUM_VALUES, "enum values")?;
    for index in 0..value_tables.len() {
        let value = value_tables.get_table(index)?;
        values.push(EnumVal {
            name:        required_string(&value, VALUE_NAME, "enum value name")?,
            value:       value.get_scalar::<i64>(VALUE_NUMBER, 0)?,
            union_type:  value.get_scalar_opt::<u32>(VALUE_TABLE)?.map(StructId),
            doc_comment: decode_strings(&value, VALUE_DOC)?,
        });
    }

    let tag = table.get_scalar::<u8>(ENUM_UNDERLYING, 0)?;
    Ok(EnumDef {
        def,
        underlying: BaseType::from_tag(tag)
            .ok_or_else(|| FlatError::DecodeError(format!("Invalid underlying type {}", tag)))?,
        values,
        is_union: table.get_scalar(ENUM_UNION, false)?,
        bit_flags: table.get_scalar(ENUM_BIT_FLAGS, false)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONSTER: &str = r#"
        namespace Game;

        /// Colors of a monster.
        enum Color : byte { Red, Green, Blue = 5 }

        struct Vec3 (force_align: 16) { x: float; y: float; z: float; }

        table Weapon { name: string (key); damage: short = -1; }

        union Equipment { Weapon }

        table Monster {
            pos: Vec3;
            hp: short = 100;
            speed: float = 1.5;
            name: string (required);
            color: Color = Blue;
            equipped: Equipment;
            weapons: [Weapon];
            friendly: bool = true (deprecated);
            big: ulong = 18446744073709551615;
        }

        root_type Monster;
        file_identifier "MONS";
        file_extension "mon";
    "#;

    #[test]
    fn test_compile_schema() {
        let schema = compile_schema(MONSTER).unwrap();
        let monster = schema.find_struct("Game.Monster").unwrap();
        assert_eq!(schema.root_struct(), Some(monster));
        assert_eq!(schema.file_identifier(), Some(b"MONS"));
        assert_eq!(schema.file_extension(), Some("mon"));

        let def = schema.struct_def(monster);
        let fields: Vec<(&str, u16)> = def.fields.iter().map(|f| (f.name.as_str(), f.id)).collect();
        assert_eq!(fields, [
            ("pos", 0),
            ("hp", 1),
            ("speed", 2),
            ("name", 3),
            ("color", 4),
            ("equipped_type", 5),
            ("equipped", 6),
            ("weapons", 7),
            ("friendly", 8),
            ("big", 9),
        ]);
        assert_eq!(def.field("color").unwrap().default, Some(DefaultValue::Integer(5)));
        assert_eq!(def.field("speed").unwrap().default, Some(DefaultValue::Real(1.5)));
        assert_eq!(def.field("big").unwrap().default, Some(DefaultValue::Integer(-1)));
        assert!(def.field("friendly").unwrap().deprecated);

        let color = schema.find_enum("Game.Color").unwrap();
        assert_eq!(schema.enum_def(color).def.doc_comment, ["Colors of a monster."]);
        let equipment = schema.enum_def(schema.find_enum("Game.Equipment").unwrap());
        assert_eq!(equipment.values[1].name, "Weapon");
        assert_eq!(equipment.values[1].union_type, schema.find_struct("Game.Weapon"));
    }

    #[test]
    fn test_binary_schema_round_trip() {
        let schema = compile_schema(MONSTER).unwrap();
        let bytes = encode_binary_schema(&schema).unwrap();
        assert_eq!(&bytes[4..8], b"BFBS");

        let decoded = decode_binary_schema(&bytes).unwrap();
        assert_eq!(decoded, schema);
    }

    #[test]
    fn test_decode_rejects_foreign_buffers() {
        let err = decode_binary_schema(&[12, 0, 0, 0, b'N', b'O', b'P', b'E']).unwrap_err();
        assert!(matches!(err, FlatError::DecodeError(_)), "{:?}", err);
        assert!(decode_binary_schema(&[]).is_err());
    }

    #[test]
    fn test_includes_need_a_path() {
        let err = compile_schema("include \"other.fbs\";").unwrap_err();
        assert!(matches!(err, FlatError::IncludeError(_)), "{:?}", err);
    }
}
