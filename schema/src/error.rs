use thiserror::Error;

/// A schema that cannot be loaded. Fatal for the whole schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Unresolved type {reference} referenced from {owner}")]
    UnresolvedType { owner: String, reference: String },

    #[error("The type {0} is defined more than once")]
    DuplicateDefinition(String),

    #[error("The field {field} is defined more than once in {owner}")]
    DuplicateField { owner: String, field: String },

    #[error("The field id {id} is used more than once in {owner}")]
    DuplicateFieldId { owner: String, id: u16 },

    #[error("The id {id} of field {owner}.{field} is above the maximum of {max}")]
    FieldIdTooLarge {
        owner: String,
        field: String,
        id:    u16,
        max:   u16,
    },

    #[error("{owner} declares more than one key field ({first} and {second})")]
    DuplicateKey {
        owner:  String,
        first:  String,
        second: String,
    },

    #[error("The has_key flag of {0} does not match its fields")]
    KeyFlagMismatch(String),

    #[error("{0} contains itself by value")]
    InvalidCycle(String),

    #[error("The enum {0} must have an integer underlying type")]
    InvalidEnumType(String),

    #[error("The union {union_name} member {member} must be a table")]
    InvalidUnionMember { union_name: String, member: String },

    #[error("The union field {field} in {owner} must directly follow its type field")]
    MissingUnionType { owner: String, field: String },

    #[error("The root type {0} must be a table")]
    InvalidRoot(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// A type used in a place where the wire format cannot represent it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    /// String, vector, table or union inside a fixed struct; array inside a
    /// table; vector of unions.
    #[error("The type {ty} is not supported in {context} (field {owner}.{field})")]
    UnsupportedType {
        context: &'static str,
        owner:   String,
        field:   String,
        ty:      String,
    },

    #[error("The field {owner}.{field} of type {ty} cannot be used as a key")]
    UnsupportedKeyType {
        owner: String,
        field: String,
        ty:    String,
    },

    #[error("{0} has no key field and cannot be stored in a sorted vector")]
    MissingKey(String),

    #[error("The alignment {align} of {owner} is not a power of two between 1 and 256")]
    InvalidAlignment { owner: String, align: usize },
}

/// A misuse of the [Builder](crate::Builder). None of these are recoverable
/// for the buffer being built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuilderError {
    #[error("The buffer is already finished")]
    Finished,

    #[error("The buffer is not finished yet")]
    NotFinished,

    #[error("Field {id} added after field {previous}, ids must increase")]
    FieldOutOfOrder { previous: u16, id: u16 },

    #[error("Fields can only be added between start_table and end_table")]
    NotInTable,

    #[error("Cannot start a table or create an object while a table is being built")]
    Nested,

    #[error("The root offset was not produced by this builder")]
    MissingRoot,

    #[error("The offset {0} was not produced by this builder")]
    InvalidOffset(u32),

    #[error("The required field {0} is missing")]
    MissingRequired(u16),

    #[error("A table of {0} bytes does not fit 16-bit vtable offsets")]
    TableTooLarge(usize),

    #[error("An object of {0} bytes does not fit a 32-bit buffer")]
    TooLarge(usize),

    #[error("{len} bytes is not a whole number of {size}-byte structs")]
    StructSize { len: usize, size: usize },

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// A read outside the buffer or against the shape of the buffer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadError {
    #[error("Reading {size} bytes at {position} is out of bounds for a buffer of {len} bytes")]
    OutOfBounds {
        position: usize,
        size:     usize,
        len:      usize,
    },

    #[error("Index {index} is out of range for a vector of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid UTF-8 string at {position}")]
    InvalidUtf8 { position: usize },

    #[error("{owner} has no field named {field}")]
    UnknownField { owner: String, field: String },

    #[error("Invalid vtable for the table at {position}")]
    InvalidVTable { position: usize },

    #[error("Expected {expected} but found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Unknown type {0}")]
    UnknownType(String),
}

/// Errors turning a [Value](crate::Value) into a buffer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("Unknown type {0}")]
    UnknownType(String),

    #[error("{owner} has no field named {field}")]
    UnknownField { owner: String, field: String },

    #[error("{enum_name} has no value named {value}")]
    UnknownEnumValue { enum_name: String, value: String },

    #[error("The field {field} expects {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("The value {value} is out of range for the field {field}")]
    OutOfRange { field: String, value: String },

    #[error("The required field {owner}.{field} is missing")]
    MissingRequired { owner: String, field: String },

    #[error("The struct field {owner}.{field} is missing")]
    MissingField { owner: String, field: String },

    #[error("{0} is not a member of {1}")]
    UnionMismatch(String, String),

    #[error("The schema has no root type")]
    NoRoot,

    #[error(transparent)]
    Builder(#[from] BuilderError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Read(#[from] ReadError),
}
