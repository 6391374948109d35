//! This is a Rust library with the core of the Flat serialization format: a
//! resolved schema model, the layout engine that decides where every field
//! lives on the wire, and a builder/reader pair for zero-copy buffers.
//!
//! Buffers are built back to front. Tables point at a vtable of 16-bit field
//! offsets, so absent fields cost nothing and readers fall back to the
//! schema default.
//!
//! ```
//! use brine_flat_schema::*;
//!
//! let schema = Schema::new(vec![
//!     StructDef::table(Definition::new("Point", Namespace::default()), vec![
//!         FieldDef::new("x", 0, Type::Float),
//!         FieldDef::new("y", 1, Type::Float).with_default(DefaultValue::Real(1.0)),
//!     ]),
//! ], vec![]).unwrap();
//!
//! let mut point = Value::Object("Point", Default::default());
//! point.set("x", Value::Float(0.5));
//!
//! let bytes = point.encode(&schema).unwrap();
//! let value = Value::decode(&schema, StructId(0), &bytes).unwrap();
//! assert_eq!(format!("{:?}", value), "Point {x: 0.5, y: 1.0}");
//! ```

pub mod bb;
pub mod builder;
pub mod error;
pub mod layout;
pub mod reader;
pub mod schema;
pub mod value;

pub use bb::*;
pub use builder::*;
pub use error::*;
pub use layout::*;
pub use reader::*;
pub use schema::*;
pub use value::*;
