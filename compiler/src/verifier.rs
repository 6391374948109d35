use std::collections::{HashMap, HashSet};
use brine_flat_schema::BaseType;
use crate::{
    types::{Attribute, Definition, DefinitionKind, Field, SchemaFile, TypeRef},
    utils::{parse_integer, quote},
    error::FlatError,
};

pub const RESERVED_NAMES: [&str; 10] = [
    "include", "namespace", "attribute", "root_type", "file_identifier",
    "file_extension", "enum", "union", "struct", "table",
];

/// Attributes the compiler understands. Anything else must be declared with
/// `attribute "name";` first.
pub const KNOWN_ATTRIBUTES: [&str; 6] = ["deprecated", "key", "required", "id", "force_align", "bit_flags"];

fn fail(msg: String) -> Result<(), FlatError> {
    Err(FlatError::VerifierError(msg))
}

/// Checks the rules that can be decided from a single file. `declared` holds
/// the attribute names declared by this file and everything it includes.
/// Returns `Ok(())` if verification passed, or
/// `Err(FlatError::VerifierError(_))` otherwise.
pub fn verify_schema(file: &SchemaFile, declared: &HashSet<String>) -> Result<(), FlatError> {
    let mut defined_types: HashMap<String, &Definition> = HashMap::new();

    // 1) Check duplicate / reserved type names
    for def in &file.definitions {
        if BaseType::from_name(&def.name).is_some() || RESERVED_NAMES.contains(&def.name.as_str()) {
            return fail(format!("The type name {} is reserved", quote(&def.name)));
        }
        if defined_types.insert(def.qualified_name(), def).is_some() {
            return fail(format!("The type {} is defined twice", quote(&def.qualified_name())));
        }
    }

    // 2) Check attributes everywhere
    for def in &file.definitions {
        verify_attributes(&def.attributes, declared)?;
        for field in &def.fields {
            verify_attributes(&field.attributes, declared)?;
        }
    }

    // 3) Check each definition by kind
    for def in &file.definitions {
        let mut names = HashSet::new();
        for field in &def.fields {
            if !names.insert(field.name.as_str()) {
                return fail(format!(
                    "The name {} is used twice in {}",
                    quote(&field.name),
                    quote(&def.name)
                ));
            }
        }

        match def.kind {
            DefinitionKind::Enum => verify_enum(def)?,
            DefinitionKind::Union => verify_union(def)?,
            DefinitionKind::Struct => verify_struct(def)?,
            DefinitionKind::Table => verify_table(def)?,
        }
    }

    if let Some(identifier) = &file.file_identifier {
        if identifier.text.len() != 4 {
            return fail(format!(
                "The file identifier {} must be exactly 4 bytes long",
                quote(&identifier.text)
            ));
        }
    }

    Ok(())
}

fn verify_attributes(attributes: &[Attribute], declared: &HashSet<String>) -> Result<(), FlatError> {
    for attribute in attributes {
        if !KNOWN_ATTRIBUTES.contains(&attribute.name.as_str()) && !declared.contains(&attribute.name) {
            return Err(FlatError::VerifierError(format!(
                "Unknown attribute {} at line {}, column {}",
                quote(&attribute.name),
                attribute.line,
                attribute.column
            )));
        }
    }
    Ok(())
}

fn verify_enum(def: &Definition) -> Result<(), FlatError> {
    let underlying = def.underlying.as_deref().unwrap_or_default();
    let base = match BaseType::from_name(underlying) {
        Some(base) if base.is_integer() => base,
        _ => {
            return fail(format!(
                "The underlying type {} of enum {} must be an integer type",
                quote(underlying),
                quote(&def.name)
            ))
        }
    };
    if def.fields.is_empty() {
        return fail(format!("The enum {} must declare at least one value", quote(&def.name)));
    }

    let bit_flags = def.has_attribute("bit_flags");
    let (low, high) = match (base.integer_range(), bit_flags) {
        (_, true) => (0, base.size() as i128 * 8 - 1),
        (Some(range), false) => range,
        (None, false) => (0, 0),
    };

    let mut previous: Option<i128> = None;
    for field in &def.fields {
        let value = match &field.value {
            Some(text) => parse_integer(text).ok_or_else(|| {
                FlatError::VerifierError(format!("Invalid value {} for {}", quote(text), quote(&field.name)))
            })?,
            None => previous.map_or(0, |previous| previous + 1),
        };
        if let Some(previous) = previous {
            if value <= previous {
                return fail(format!(
                    "The values of enum {} must be declared in ascending order ({} after {})",
                    quote(&def.name),
                    quote(&field.name),
                    previous
                ));
            }
        }
        if value < low || value > high {
            return fail(format!(
                "The value {} of {} does not fit in {}",
                value,
                quote(&field.name),
                if bit_flags {
                    format!("the bits of {}", underlying)
                } else {
                    underlying.to_owned()
                }
            ));
        }
        previous = Some(value);
    }
    Ok(())
}

fn verify_union(def: &Definition) -> Result<(), FlatError> {
    if def.fields.len() > u8::MAX as usize {
        return fail(format!("The union {} has too many members", quote(&def.name)));
    }
    for field in &def.fields {
        if BaseType::from_name(&field.name).is_some() {
            return fail(format!(
                "The union {} member {} must be a table",
                quote(&def.name),
                quote(&field.name)
            ));
        }
    }
    Ok(())
}

fn verify_struct(def: &Definition) -> Result<(), FlatError> {
    if def.fields.is_empty() {
        return fail(format!("The struct {} must declare at least one field", quote(&def.name)));
    }
    if let Some(align) = def.attribute("force_align") {
        let valid = align
            .value
            .as_deref()
            .and_then(parse_integer)
            .map_or(false, |value| value > 0 && value <= 256 && (value & (value - 1)) == 0);
        if !valid {
            return fail(format!(
                "The force_align of {} must be a power of two between 1 and 256",
                quote(&def.name)
            ));
        }
    }

    for field in &def.fields {
        for (attribute, reason) in [
            ("deprecated", "be deprecated"),
            ("required", "be marked required"),
            ("id", "have an explicit id"),
        ] {
            if field.has_attribute(attribute) {
                return fail(format!(
                    "The struct field {}.{} cannot {}",
                    def.name, field.name, reason
                ));
            }
        }
        if field.value.is_some() {
            return fail(format!(
                "The struct field {}.{} cannot have a default value",
                def.name, field.name
            ));
        }
    }
    Ok(())
}

fn verify_table(def: &Definition) -> Result<(), FlatError> {
    if def.has_attribute("force_align") {
        return fail(format!("Only structs can use force_align ({})", quote(&def.name)));
    }

    for field in &def.fields {
        if let Some(TypeRef::Array(..)) = field.type_ {
            return fail(format!(
                "The table field {}.{} cannot be a fixed-length array",
                def.name, field.name
            ));
        }
        if field.has_attribute("required") && is_scalar_name(field) {
            return fail(format!(
                "The scalar field {}.{} cannot be required",
                def.name, field.name
            ));
        }
    }

    // Explicit ids: all or none, covering 0..n without gaps. Unions take
    // two slots, the type slot being `id - 1`.
    let explicit = def.fields.iter().filter(|field| field.has_attribute("id")).count();
    if explicit == 0 {
        return Ok(());
    }
    if explicit != def.fields.len() {
        return fail(format!(
            "Either all or none of the fields of {} must have an id",
            quote(&def.name)
        ));
    }

    let mut used = HashSet::new();
    for field in &def.fields {
        let id = field
            .attribute("id")
            .and_then(|attribute| attribute.value.as_deref())
            .and_then(parse_integer)
            .filter(|id| (0..u16::MAX as i128).contains(id))
            .ok_or_else(|| FlatError::VerifierError(format!("Invalid id for field {}.{}", def.name, field.name)))?;

        // Whether a field is a union is only known after name resolution,
        // so the resolver reports a union whose type slot collides.
        if !used.insert(id) {
            return fail(format!("The id of field {}.{} is used twice", def.name, field.name));
        }
    }
    Ok(())
}

/// True for fields whose declared type is a base scalar type. Enum typed
/// fields are rejected later, once names are resolved.
fn is_scalar_name(field: &Field) -> bool {
    match &field.type_ {
        Some(TypeRef::Named(name)) => BaseType::from_name(name).map_or(false, BaseType::is_scalar),
        _ => false,
    }
}
