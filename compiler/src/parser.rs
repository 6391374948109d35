use crate::{
    tokenizer::Token,
    types::{Attribute, Definition, DefinitionKind, Field, Include, Located, SchemaFile, TypeRef},
    utils::{error, quote},
    error::FlatError,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref IDENTIFIER:        Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref QUALIFIED:         Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap();
    static ref INTEGER:           Regex = Regex::new(r"^-?(0[xX][0-9A-Fa-f]+|\d+)$").unwrap();
    static ref SCALAR:            Regex = Regex::new(r"^(-?(0[xX][0-9A-Fa-f]+|\d+(\.\d+([eE][+-]?\d+)?)?)|[A-Za-z_][A-Za-z0-9_.]*)$").unwrap();
    static ref STRING:            Regex = Regex::new(r#"^"(?:[^"\\]|\\.)*"$"#).unwrap();
    static ref EQUALS:            Regex = Regex::new(r"^=$").unwrap();
    static ref SEMICOLON:         Regex = Regex::new(r"^;$").unwrap();
    static ref COLON:             Regex = Regex::new(r"^:$").unwrap();
    static ref COMMA:             Regex = Regex::new(r"^,$").unwrap();
    static ref LEFT_BRACE:        Regex = Regex::new(r"^\{$").unwrap();
    static ref RIGHT_BRACE:       Regex = Regex::new(r"^\}$").unwrap();
    static ref LEFT_BRACKET:      Regex = Regex::new(r"^\[$").unwrap();
    static ref RIGHT_BRACKET:     Regex = Regex::new(r"^\]$").unwrap();
    static ref LEFT_PAREN:        Regex = Regex::new(r"^\($").unwrap();
    static ref RIGHT_PAREN:       Regex = Regex::new(r"^\)$").unwrap();
    static ref INCLUDE_KEYWORD:   Regex = Regex::new(r"^include$").unwrap();
    static ref NAMESPACE_KEYWORD: Regex = Regex::new(r"^namespace$").unwrap();
    static ref ATTRIBUTE_KEYWORD: Regex = Regex::new(r"^attribute$").unwrap();
    static ref ROOT_TYPE_KEYWORD: Regex = Regex::new(r"^root_type$").unwrap();
    static ref IDENT_KEYWORD:     Regex = Regex::new(r"^file_identifier$").unwrap();
    static ref EXTENSION_KEYWORD: Regex = Regex::new(r"^file_extension$").unwrap();
    static ref ENUM_KEYWORD:      Regex = Regex::new(r"^enum$").unwrap();
    static ref UNION_KEYWORD:     Regex = Regex::new(r"^union$").unwrap();
    static ref STRUCT_KEYWORD:    Regex = Regex::new(r"^struct$").unwrap();
    static ref TABLE_KEYWORD:     Regex = Regex::new(r"^table$").unwrap();
    static ref EOF:               Regex = Regex::new(r"^$").unwrap();
}

struct Parser<'t> {
    tokens:    &'t [Token],
    index:     usize,
    namespace: String,
}

impl<'t> Parser<'t> {
    /// The token stream always ends with the EOF token, which is never
    /// consumed past.
    fn current(&self) -> &'t Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn eat(&mut self, test: &Regex) -> bool {
        if test.is_match(&self.current().text) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, test: &Regex, expected: &str) -> Result<&'t Token, FlatError> {
        let token = self.current();
        if !self.eat(test) {
            return Err(error(
                &format!("Expected {} but found {}", expected, quote(&token.text)),
                token.line,
                token.column,
            ));
        }
        Ok(token)
    }

    fn unexpected_token(&self) -> FlatError {
        let token = self.current();
        error(
            &format!("Unexpected token {}", quote(&token.text)),
            token.line,
            token.column,
        )
    }

    fn located(token: &Token) -> Located {
        Located {
            text:   token.text.clone(),
            line:   token.line,
            column: token.column,
        }
    }

    fn string(&mut self) -> Result<Located, FlatError> {
        let token = self.expect(&STRING, "string")?;
        let text = serde_json::from_str::<String>(&token.text)
            .map_err(|_| error(&format!("Invalid string {}", token.text), token.line, token.column))?;
        Ok(Located {
            text,
            line: token.line,
            column: token.column,
        })
    }

    fn doc_comments(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while self.current().is_doc_comment() {
            let text = &self.current().text[3..];
            lines.push(text.strip_prefix(' ').unwrap_or(text).to_owned());
            self.index += 1;
        }
        lines
    }

    fn parse_type(&mut self) -> Result<TypeRef, FlatError> {
        if !self.eat(&LEFT_BRACKET) {
            let name = self.expect(&QUALIFIED, "type name")?;
            return Ok(TypeRef::Named(name.text.clone()));
        }

        let element = self.parse_type()?;
        let ty = if self.eat(&COLON) {
            let len = self.expect(&INTEGER, "array length")?;
            let fixed_length = len.text.parse::<u16>().map_err(|_| {
                error(&format!("Invalid array length {}", quote(&len.text)), len.line, len.column)
            })?;
            TypeRef::Array(Box::new(element), fixed_length)
        } else {
            TypeRef::Vector(Box::new(element))
        };
        self.expect(&RIGHT_BRACKET, "\"]\"")?;
        Ok(ty)
    }

    fn parse_metadata(&mut self) -> Result<Vec<Attribute>, FlatError> {
        let mut attributes = Vec::new();
        if !self.eat(&LEFT_PAREN) || self.eat(&RIGHT_PAREN) {
            return Ok(attributes);
        }

        loop {
            let name = self.expect(&IDENTIFIER, "attribute name")?;
            let value = if self.eat(&COLON) {
                if STRING.is_match(&self.current().text) {
                    Some(self.string()?.text)
                } else {
                    Some(self.expect(&SCALAR, "attribute value")?.text.clone())
                }
            } else {
                None
            };
            attributes.push(Attribute {
                name:   name.text.clone(),
                value,
                line:   name.line,
                column: name.column,
            });

            if self.eat(&RIGHT_PAREN) {
                return Ok(attributes);
            }
            self.expect(&COMMA, "\",\" or \")\"")?;
        }
    }

    fn parse_fields(&mut self) -> Result<Vec<Field>, FlatError> {
        let mut fields = Vec::new();
        loop {
            let doc_comment = self.doc_comments();
            if self.eat(&RIGHT_BRACE) {
                return Ok(fields);
            }

            let name = self.expect(&IDENTIFIER, "field name")?;
            self.expect(&COLON, "\":\"")?;
            let type_ = self.parse_type()?;
            let value = if self.eat(&EQUALS) {
                Some(self.expect(&SCALAR, "default value")?.text.clone())
            } else {
                None
            };
            let attributes = self.parse_metadata()?;
            self.expect(&SEMICOLON, "\";\"")?;

            fields.push(Field {
                name: name.text.clone(),
                line: name.line,
                column: name.column,
                type_: Some(type_),
                value,
                attributes,
                doc_comment,
            });
        }
    }

    /// Enum values and union members, separated by commas.
    fn parse_values(&mut self, kind: DefinitionKind) -> Result<Vec<Field>, FlatError> {
        let mut fields = Vec::new();
        loop {
            let doc_comment = self.doc_comments();
            if self.eat(&RIGHT_BRACE) {
                return Ok(fields);
            }

            let name = match kind {
                DefinitionKind::Union => self.expect(&QUALIFIED, "union member")?,
                _ => self.expect(&IDENTIFIER, "enum value")?,
            };
            let value = if kind == DefinitionKind::Enum && self.eat(&EQUALS) {
                Some(self.expect(&INTEGER, "integer")?.text.clone())
            } else {
                None
            };
            let attributes = self.parse_metadata()?;

            fields.push(Field {
                name: name.text.clone(),
                line: name.line,
                column: name.column,
                type_: None,
                value,
                attributes,
                doc_comment,
            });

            if !self.eat(&COMMA) {
                self.doc_comments();
                self.expect(&RIGHT_BRACE, "\"}\"")?;
                return Ok(fields);
            }
        }
    }

    fn parse_definition(&mut self, kind: DefinitionKind, doc_comment: Vec<String>) -> Result<Definition, FlatError> {
        let name = self.expect(&IDENTIFIER, "identifier")?;
        let underlying = if kind == DefinitionKind::Enum {
            self.expect(&COLON, "\":\"")?;
            Some(self.expect(&IDENTIFIER, "underlying type")?.text.clone())
        } else {
            None
        };
        let attributes = self.parse_metadata()?;
        self.expect(&LEFT_BRACE, "\"{\"")?;

        let fields = match kind {
            DefinitionKind::Enum | DefinitionKind::Union => self.parse_values(kind)?,
            DefinitionKind::Struct | DefinitionKind::Table => self.parse_fields()?,
        };

        Ok(Definition {
            name: name.text.clone(),
            namespace: self.namespace.clone(),
            line: name.line,
            column: name.column,
            kind,
            underlying,
            attributes,
            fields,
            doc_comment,
        })
    }
}

pub fn parse_schema(tokens: &[Token]) -> Result<SchemaFile, FlatError> {
    match tokens.last() {
        Some(last) if last.text.is_empty() => {}
        _ => return Err(error("Expected the token stream to end with EOF", 0, 0)),
    }

    let mut parser = Parser {
        tokens,
        index: 0,
        namespace: String::new(),
    };
    let mut file = SchemaFile::default();
    let mut declared = false;

    loop {
        let doc_comment = parser.doc_comments();
        if parser.eat(&EOF) {
            break;
        }

        let kind = if parser.eat(&ENUM_KEYWORD) {
            Some(DefinitionKind::Enum)
        } else if parser.eat(&UNION_KEYWORD) {
            Some(DefinitionKind::Union)
        } else if parser.eat(&STRUCT_KEYWORD) {
            Some(DefinitionKind::Struct)
        } else if parser.eat(&TABLE_KEYWORD) {
            Some(DefinitionKind::Table)
        } else {
            None
        };
        if let Some(kind) = kind {
            file.definitions.push(parser.parse_definition(kind, doc_comment)?);
            declared = true;
            continue;
        }

        let keyword = parser.current();
        if parser.eat(&INCLUDE_KEYWORD) {
            if declared {
                return Err(error("Includes must come before any declaration", keyword.line, keyword.column));
            }
            let path = parser.string()?;
            file.includes.push(Include {
                path:   path.text,
                line:   keyword.line,
                column: keyword.column,
            });
        } else if parser.eat(&NAMESPACE_KEYWORD) {
            parser.namespace = parser.expect(&QUALIFIED, "namespace")?.text.clone();
            declared = true;
        } else if parser.eat(&ATTRIBUTE_KEYWORD) {
            let name = if STRING.is_match(&parser.current().text) {
                parser.string()?.text
            } else {
                parser.expect(&IDENTIFIER, "attribute name")?.text.clone()
            };
            file.attributes.push(name);
            declared = true;
        } else if parser.eat(&ROOT_TYPE_KEYWORD) {
            let name = parser.expect(&QUALIFIED, "type name")?;
            file.root_type = Some(Parser::located(name));
            file.root_namespace = parser.namespace.clone();
            declared = true;
        } else if parser.eat(&IDENT_KEYWORD) {
            file.file_identifier = Some(parser.string()?);
            declared = true;
        } else if parser.eat(&EXTENSION_KEYWORD) {
            file.file_extension = Some(parser.string()?.text);
            declared = true;
        } else {
            return Err(parser.unexpected_token());
        }
        parser.expect(&SEMICOLON, "\";\"")?;
    }

    debug!(
        definitions = file.definitions.len(),
        includes = file.includes.len(),
        "parsed schema"
    );
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize_schema;

    fn parse(text: &str) -> Result<SchemaFile, FlatError> {
        parse_schema(&tokenize_schema(text)?)
    }

    #[test]
    fn test_parse_declarations() {
        let file = parse(
            r#"
            include "common.fbs";
            namespace Game.Sample;
            attribute "priority";
            root_type Monster;
            file_identifier "MONS";
            file_extension "mon";
            "#,
        )
        .unwrap();

        assert_eq!(file.includes[0].path, "common.fbs");
        assert_eq!(file.attributes, ["priority"]);
        assert_eq!(file.root_type.unwrap().text, "Monster");
        assert_eq!(file.root_namespace, "Game.Sample");
        assert_eq!(file.file_identifier.unwrap().text, "MONS");
        assert_eq!(file.file_extension.as_deref(), Some("mon"));
    }

    #[test]
    fn test_parse_enum_and_union() {
        let file = parse(
            "/// Colors.\nenum Color : byte (bit_flags) { Red, Green = 2, /// last\n Blue, }\nunion Equipment { Weapon, Game.Shield }",
        )
        .unwrap();

        let color = &file.definitions[0];
        assert_eq!(color.kind, DefinitionKind::Enum);
        assert_eq!(color.underlying.as_deref(), Some("byte"));
        assert_eq!(color.doc_comment, ["Colors."]);
        assert!(color.has_attribute("bit_flags"));
        let values: Vec<_> = color.fields.iter().map(|f| (f.name.as_str(), f.value.as_deref())).collect();
        assert_eq!(values, [("Red", None), ("Green", Some("2")), ("Blue", None)]);
        assert_eq!(color.fields[2].doc_comment, ["last"]);

        let equipment = &file.definitions[1];
        assert_eq!(equipment.kind, DefinitionKind::Union);
        assert_eq!(equipment.fields[1].name, "Game.Shield");
    }

    #[test]
    fn test_parse_table_fields() {
        let file = parse(
            "table Monster { hp: short = 100; path: [[short]]; pos: [float:3] (id: 2, priority: \"high\"); }",
        )
        .unwrap();

        let fields = &file.definitions[0].fields;
        assert_eq!(fields[0].type_, Some(TypeRef::Named("short".into())));
        assert_eq!(fields[0].value.as_deref(), Some("100"));
        assert_eq!(
            fields[1].type_,
            Some(TypeRef::Vector(Box::new(TypeRef::Vector(Box::new(TypeRef::Named("short".into()))))))
        );
        assert_eq!(fields[2].type_, Some(TypeRef::Array(Box::new(TypeRef::Named("float".into())), 3)));
        assert_eq!(fields[2].attribute("id").and_then(|a| a.value.as_deref()), Some("2"));
        assert_eq!(fields[2].attribute("priority").and_then(|a| a.value.as_deref()), Some("high"));
    }

    #[test]
    fn test_parse_errors() {
        let err = parse("table Monster { hp short; }").unwrap_err();
        assert!(matches!(err, FlatError::ParseError { line: 1, column: 20, .. }), "{:?}", err);

        let err = parse("table A {}\ninclude \"b.fbs\";").unwrap_err();
        assert!(matches!(err, FlatError::ParseError { line: 2, .. }), "{:?}", err);

        assert!(matches!(parse("message X {}"), Err(FlatError::ParseError { .. })));
        assert!(matches!(parse("table X { a: int }"), Err(FlatError::ParseError { .. })));

        // Token streams not produced by the tokenizer lack the EOF token.
        assert!(matches!(parse_schema(&[]), Err(FlatError::ParseError { .. })));
    }
}
