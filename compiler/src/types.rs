use serde::Serialize;

/// One parsed `.fbs` file.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct SchemaFile {
    pub includes:        Vec<Include>,
    pub attributes:      Vec<String>,
    pub definitions:     Vec<Definition>,
    pub root_type:       Option<Located>,
    /// The namespace in effect where `root_type` was declared.
    pub root_namespace:  String,
    pub file_identifier: Option<Located>,
    pub file_extension:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Include {
    pub path:   String,
    pub line:   usize,
    pub column: usize,
}

/// A name or literal with the position it was written at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Located {
    pub text:   String,
    pub line:   usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DefinitionKind {
    Enum,
    Union,
    Struct,
    Table,
}

impl DefinitionKind {
    pub fn keyword(self) -> &'static str {
        match self {
            DefinitionKind::Enum => "enum",
            DefinitionKind::Union => "union",
            DefinitionKind::Struct => "struct",
            DefinitionKind::Table => "table",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeRef {
    Named(String),
    Vector(Box<TypeRef>),
    Array(Box<TypeRef>, u16),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name:   String,
    pub value:  Option<String>,
    pub line:   usize,
    pub column: usize,
}

/// A table or struct field, an enum value or a union member.
///
/// Enum values carry their number in `value` and no type. Union members are
/// named after the table they refer to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name:        String,
    pub line:        usize,
    pub column:      usize,
    pub type_:       Option<TypeRef>,
    pub value:       Option<String>,
    pub attributes:  Vec<Attribute>,
    pub doc_comment: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Definition {
    pub name:        String,
    pub namespace:   String,
    pub line:        usize,
    pub column:      usize,
    pub kind:        DefinitionKind,
    pub underlying:  Option<String>,
    pub attributes:  Vec<Attribute>,
    pub fields:      Vec<Field>,
    pub doc_comment: Vec<String>,
}

impl Field {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }
}

impl Definition {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}
