use regex::Regex;
use lazy_static::lazy_static;
use tracing::trace;
use crate::utils::{quote, error};
use crate::error::FlatError;

lazy_static! {
    pub static ref TOKEN_REGEX: Regex = Regex::new(concat!(
        r#"(//[^\n]*"#,
        r#"|"(?:[^"\\\n]|\\.)*""#,
        r#"|(?:-|\b)(?:0[xX][0-9A-Fa-f]+|\d+\.\d+(?:[eE][+-]?\d+)?|\d+)\b"#,
        r#"|[=;{}:,()\[\]]"#,
        r#"|\b[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*\b"#,
        r#"|\s+)"#,
    )).unwrap();
    pub static ref WHITESPACE_RX: Regex = Regex::new(r"^\s+$").unwrap();
}

#[derive(Debug, PartialEq)]
pub struct Token {
    pub text:   String,
    pub line:   usize,
    pub column: usize,
}

impl Token {
    /// `///` comments document the declaration that follows them.
    pub fn is_doc_comment(&self) -> bool {
        self.text.starts_with("///") && !self.text.starts_with("////")
    }
}

pub fn tokenize_schema(text: &str) -> Result<Vec<Token>, FlatError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut column = 1;
    let mut last_end = 0;

    for mat in TOKEN_REGEX.find_iter(text) {
        let start = mat.start();
        let end   = mat.end();
        let part  = mat.as_str();

        if start > last_end {
            let unexpected = &text[last_end..start];
            return Err(error(
                &format!("Syntax error: {}", quote(unexpected)),
                line,
                column,
            ));
        }

        let comment = part.starts_with("//");
        if !WHITESPACE_RX.is_match(part) && (!comment || (part.starts_with("///") && !part.starts_with("////"))) {
            tokens.push(Token {
                text:   part.trim_end().to_string(),
                line,
                column,
            });
        }

        let newline_count = part.matches('\n').count();
        if newline_count > 0 {
            line += newline_count;
            if let Some(last_line_part) = part.split('\n').last() {
                column = last_line_part.chars().count() + 1;
            }
        } else {
            column += part.chars().count();
        }

        last_end = end;
    }

    if last_end != text.len() {
        let unexpected = &text[last_end..];
        return Err(error(
            &format!("Syntax error: {}", quote(unexpected)),
            line,
            column,
        ));
    }

    tokens.push(Token {
        text:   "".to_string(),
        line,
        column,
    });
    trace!(count = tokens.len(), "tokenized schema");
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<String> {
        tokenize_schema(input).unwrap().into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_tokenize_simple() {
        let input = "hp: short = 10;";
        let expected = vec![
            Token { text: "hp".into(),    line: 1, column: 1 },
            Token { text: ":".into(),     line: 1, column: 3 },
            Token { text: "short".into(), line: 1, column: 5 },
            Token { text: "=".into(),     line: 1, column: 11 },
            Token { text: "10".into(),    line: 1, column: 13 },
            Token { text: ";".into(),     line: 1, column: 15 },
            Token { text: "".into(),      line: 1, column: 16 },
        ];
        let got = tokenize_schema(input).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_tokenize_literals() {
        assert_eq!(
            texts(r#"include "a b.fbs"; x = -0x1F; y = 1.5e3; z = -2;"#),
            ["include", "\"a b.fbs\"", ";", "x", "=", "-0x1F", ";", "y", "=", "1.5e3", ";", "z", "=", "-2", ";", ""]
        );
    }

    #[test]
    fn test_tokenize_types_and_metadata() {
        assert_eq!(
            texts("path: [ubyte:2] (id: 3, deprecated);"),
            ["path", ":", "[", "ubyte", ":", "2", "]", "(", "id", ":", "3", ",", "deprecated", ")", ";", ""]
        );
        assert_eq!(texts("namespace Game.Sample;"), ["namespace", "Game.Sample", ";", ""]);
    }

    #[test]
    fn test_tokenize_comments() {
        let input = "// dropped\n/// kept \n//// dropped too\ntable T {}";
        let got = tokenize_schema(input).unwrap();
        assert_eq!(got[0], Token { text: "/// kept".into(), line: 2, column: 1 });
        assert!(got[0].is_doc_comment());
        assert_eq!(got[1], Token { text: "table".into(), line: 4, column: 1 });
        assert_eq!(got.len(), 6);
    }

    #[test]
    fn test_tokenize_unexpected_text() {
        let input = "x: int = 10 @";
        let err = tokenize_schema(input).unwrap_err();
        assert!(
            matches!(err, FlatError::ParseError { line: 1, column: 13, .. }),
            "expected a ParseError but got {:?}",
            err
        );
    }
}
