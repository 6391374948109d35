//! brine-flat
//!
//! This crate bundles the runtime and the compiler of the Brine Flat format.
//!
//! - Schema model, builder and zero-copy reader (re-exported from
//!   `brine-flat-schema`)
//! - The `.fbs` compiler and binary schemas (re-exported from
//!   `brine-flat-compiler`)
//! - Helpers converting between finished buffers and JSON

pub mod json;

pub use brine_flat_compiler::{
    compile_file, compile_schema, compile_schema_to_json, decode_binary_schema, encode_binary_schema, CompileOptions,
    FlatError,
};
pub use brine_flat_schema::{Buffer, Builder, Schema, StructId, Table, Value};
pub use json::{json_to_value, value_to_json};

/// Decode a binary schema into a pretty‐printed JSON string.
pub fn schema_to_json(buffer: &[u8]) -> Result<String, FlatError> {
    let schema = decode_binary_schema(buffer)?;
    Ok(serde_json::to_string_pretty(&schema)?)
}

/// Decode a finished buffer of the schema's root type into a pretty‐printed
/// JSON string.
pub fn decode_to_json(schema: &Schema, buffer: &[u8]) -> Result<String, FlatError> {
    let value = Value::decode_root(schema, buffer)?;
    Ok(serde_json::to_string_pretty(&value_to_json(&value))?)
}

/// Build a finished buffer of the schema's root type from a JSON document.
pub fn encode_from_json(schema: &Schema, text: &str) -> Result<Vec<u8>, FlatError> {
    let root = schema
        .root_struct()
        .ok_or_else(|| FlatError::EncodeError("The schema declares no root_type".to_owned()))?;
    let json: serde_json::Value = serde_json::from_str(text)?;
    let value = json_to_value(schema, root, &json)?;
    Ok(value.encode(schema)?)
}

pub mod error {
    pub use brine_flat_compiler::error::FlatError;
    pub use brine_flat_schema::{BuilderError, EncodeError, ReadError, SchemaError};
}

pub mod schema {
    pub use brine_flat_schema::{EnumDef, EnumVal, FieldDef, Schema, StructDef, Type, Value};
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
        namespace Zoo;
        enum Kind : ubyte { Cat, Dog }
        table Animal { name: string (key); kind: Kind = Dog; legs: ubyte = 4; }
        table Pen { animals: [Animal]; label: string (required); }
        root_type Pen;
        file_identifier "ZOO1";
    "#;

    #[test]
    fn test_json_round_trip() {
        let schema = compile_schema(SCHEMA).unwrap();
        let bytes = encode_from_json(
            &schema,
            r#"{"label": "north", "animals": [{"name": "rex"}, {"name": "felix", "kind": "Cat"}]}"#,
        )
        .unwrap();
        assert_eq!(&bytes[4..8], b"ZOO1");

        let text = decode_to_json(&schema, &bytes).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        // Keyed vectors are stored sorted, absent scalars read as defaults.
        assert_eq!(json["animals"][0]["name"], "felix");
        assert_eq!(json["animals"][0]["kind"], "Cat");
        assert_eq!(json["animals"][1]["kind"], "Dog");
        assert_eq!(json["animals"][1]["legs"], 4);
        assert_eq!(json["label"], "north");
    }

    #[test]
    fn test_encode_errors() {
        let schema = compile_schema(SCHEMA).unwrap();
        assert!(matches!(encode_from_json(&schema, "{"), Err(FlatError::Json(_))));
        assert!(matches!(encode_from_json(&schema, "{}"), Err(FlatError::Value(_))));

        let no_root = compile_schema("table T { x: int; }").unwrap();
        assert!(matches!(encode_from_json(&no_root, "{}"), Err(FlatError::EncodeError(_))));
    }

    #[test]
    fn test_schema_to_json() {
        let schema = compile_schema(SCHEMA).unwrap();
        let bytes = encode_binary_schema(&schema).unwrap();
        let json: serde_json::Value = serde_json::from_str(&schema_to_json(&bytes).unwrap()).unwrap();
        assert_eq!(json["structs"][0]["def"]["name"], "Animal");
        assert_eq!(json["file_identifier"], serde_json::json!([b'Z', b'O', b'O', b'1']));
    }
}
