use brine_flat_schema::{DefaultValue, EnumDef, Schema, StructId};
use serde_json::{json, Value};
use crate::error::FlatError;

/// Render the resolved schema and its computed layout as a JSON report:
/// every enum with its values, every struct and table with the vtable slot
/// or struct offset of each field.
pub fn compile_schema_to_json(schema: &Schema) -> Result<String, FlatError> {
    let report = schema_report(schema);
    Ok(serde_json::to_string_pretty(&report)?)
}

/// The report as a [serde_json::Value], for callers that embed it.
pub fn schema_report(schema: &Schema) -> Value {
    let enums: Vec<Value> = schema.enums().iter().map(enum_report).collect();
    let objects: Vec<Value> = schema.struct_ids().map(|id| object_report(schema, id)).collect();

    json!({
        "root_type": schema.root_struct().map(|id| schema.struct_name(id)),
        "file_identifier": schema.file_identifier().map(|id| String::from_utf8_lossy(id).into_owned()),
        "file_extension": schema.file_extension(),
        "included_files": schema.included_files(),
        "enums": enums,
        "objects": objects,
    })
}

fn enum_report(def: &EnumDef) -> Value {
    let values: Vec<Value> = def
        .values
        .iter()
        .map(|value| json!({ "name": value.name, "value": value.value }))
        .collect();

    json!({
        "name": def.def.qualified_name(),
        "underlying": def.underlying.name(),
        "union": def.is_union,
        "bit_flags": def.bit_flags,
        "values": values,
    })
}

fn object_report(schema: &Schema, id: StructId) -> Value {
    let def = schema.struct_def(id);
    let layout = schema.struct_layout(id);

    let fields: Vec<Value> = def
        .fields
        .iter()
        .zip(&layout.fields)
        .map(|(field, slot)| {
            let mut report = json!({
                "name": field.name,
                "type": schema.type_name(&field.ty),
                "id": field.id,
                "size": slot.size,
            });
            if layout.fixed {
                report["offset"] = json!(slot.offset);
                report["padding"] = json!(slot.padding);
            } else {
                report["voffset"] = json!(slot.voffset);
            }
            match field.default {
                Some(DefaultValue::Integer(value)) => report["default"] = json!(value),
                Some(DefaultValue::Real(value)) => report["default"] = json!(value),
                None => {}
            }
            for (flag, set) in [("deprecated", field.deprecated), ("required", field.required), ("key", field.key)] {
                if set {
                    report[flag] = json!(true);
                }
            }
            report
        })
        .collect();

    let mut report = json!({
        "name": def.qualified_name(),
        "kind": if def.fixed { "struct" } else { "table" },
        "generated": def.generated,
        "size": layout.size,
        "align": layout.align,
        "fields": fields,
    });
    if !def.fixed {
        report["vtable_size"] = json!(layout.vtable_size());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_schema;

    #[test]
    fn test_layout_report() {
        let schema = compile_schema(
            r#"
            namespace Geo;
            enum Kind : ubyte { Point, Line }
            struct Vec2 { x: float; y: double; }
            table Shape { kind: Kind = Line; origin: Vec2; name: string (required); }
            root_type Shape;
            "#,
        )
        .unwrap();
        let report = schema_report(&schema);

        assert_eq!(report["root_type"], "Geo.Shape");
        assert_eq!(report["file_identifier"], Value::Null);
        assert_eq!(report["enums"][0]["name"], "Geo.Kind");
        assert_eq!(report["enums"][0]["values"][1], json!({"name": "Line", "value": 1}));

        let vec2 = &report["objects"][0];
        assert_eq!(vec2["kind"], "struct");
        assert_eq!((vec2["size"].as_u64(), vec2["align"].as_u64()), (Some(16), Some(8)));
        assert_eq!(vec2["fields"][0]["padding"], 4);
        assert_eq!(vec2["fields"][1]["offset"], 8);

        let shape = &report["objects"][1];
        assert_eq!(shape["vtable_size"], 10);
        assert_eq!(shape["fields"][0]["default"], 1);
        assert_eq!(shape["fields"][2]["voffset"], 8);
        assert_eq!(shape["fields"][2]["required"], true);
        assert_eq!(shape["fields"][1]["type"], "Geo.Vec2");

        let text = compile_schema_to_json(&schema).unwrap();
        assert!(text.starts_with("{\n"));
    }
}
