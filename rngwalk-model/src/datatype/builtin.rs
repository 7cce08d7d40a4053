//! The Relax NG builtin datatype library (`datatypeLibrary=""`).
//!
//! Both builtin types accept every string; they differ only in how values
//! compare: `string` by codepoints, `token` after whitespace normalization.

use super::{DatatypeError, Param};

/// Collapse XML whitespace: leading/trailing runs removed, internal runs
/// replaced by a single space.
pub fn normalize_whitespace(value: &str) -> String {
    value
        .split(is_xml_whitespace)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

pub fn is_xml_whitespace_str(s: &str) -> bool {
    s.chars().all(is_xml_whitespace)
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum BuiltinDatatypes {
    String,
    Token,
}

impl BuiltinDatatypes {
    pub fn compile(name: &str, params: &[Param]) -> Result<BuiltinDatatypes, DatatypeError> {
        let dt = match name {
            "string" => BuiltinDatatypes::String,
            "token" => BuiltinDatatypes::Token,
            _ => {
                return Err(DatatypeError::UnknownDatatype {
                    library: String::new(),
                    name: name.to_string(),
                });
            }
        };
        if !params.is_empty() {
            return Err(DatatypeError::ParamsNotAllowed {
                type_name: match dt {
                    BuiltinDatatypes::String => "string",
                    BuiltinDatatypes::Token => "token",
                },
            });
        }
        Ok(dt)
    }

    pub fn value(&self, raw: &str) -> BuiltinDatatypeValues {
        match self {
            BuiltinDatatypes::String => BuiltinDatatypeValues::String(raw.to_string()),
            BuiltinDatatypes::Token => BuiltinDatatypeValues::Token(normalize_whitespace(raw)),
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum BuiltinDatatypeValues {
    String(String),
    Token(String),
}

impl BuiltinDatatypeValues {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            BuiltinDatatypeValues::String(s) => s == value,
            BuiltinDatatypeValues::Token(s) => *s == normalize_whitespace(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn whitespace_normalization() {
        assert_eq!(normalize_whitespace("  a \t b\n\nc "), "a b c");
        assert_eq!(normalize_whitespace("abc"), "abc");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn string_is_exact() {
        let v = BuiltinDatatypes::String.value("a b");
        assert!(v.matches("a b"));
        assert!(!v.matches("a  b"));
    }

    #[test]
    fn token_collapses() {
        let v = BuiltinDatatypes::Token.value(" a  b ");
        assert!(v.matches("a b"));
        assert!(v.matches("\na\tb\n"));
        assert!(!v.matches("a c"));
    }

    #[test]
    fn no_params_accepted() {
        let res = BuiltinDatatypes::compile("string", &[Param::new("length", "3")]);
        assert_matches!(res, Err(DatatypeError::ParamsNotAllowed { .. }));
    }

    #[test]
    fn unknown_type() {
        let res = BuiltinDatatypes::compile("decimal", &[]);
        assert_matches!(res, Err(DatatypeError::UnknownDatatype { .. }));
    }
}
