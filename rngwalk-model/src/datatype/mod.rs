//! Datatype support for `Value` and `Data` patterns.
//!
//! Two libraries ship with the crate: the Relax NG builtin library (the
//! empty datatype-library URI) and a subset of the XML Schema datatypes.
//! Facet parameters are checked and baked into a [`Datatypes`] instance at
//! pattern-construction time, so per-event validation is a plain method call.

pub mod builtin;
pub mod xsd;

use thiserror::Error;

/// Namespace context available while interpreting a lexical value.  Needed
/// by the QName-like datatypes, whose value space depends on the in-scope
/// prefix declarations.
pub trait Namespaces {
    fn resolve(&self, prefix: &str) -> Option<&str>;
}

/// A datatype parameter (facet) from the simplified schema tree.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct Param {
    pub name: String,
    pub value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Param {
        Param {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DatatypeError {
    #[error("unknown datatype library {0:?}")]
    UnknownLibrary(String),
    #[error("unknown datatype {name:?} in library {library:?}")]
    UnknownDatatype { library: String, name: String },
    #[error("datatype {type_name} does not accept parameters")]
    ParamsNotAllowed { type_name: &'static str },
    #[error("bad facet for {type_name}: {facet}")]
    Facet {
        type_name: &'static str,
        facet: FacetError,
    },
    #[error("{raw:?} is not a valid value of type {type_name}")]
    InvalidValue { type_name: String, raw: String },
}

#[derive(Debug, Error)]
pub enum FacetError {
    #[error("conflicting facets: {0}")]
    Conflicting(&'static str),
    #[error("invalid integer {0:?}")]
    InvalidInt(String),
    #[error("invalid number {0:?}")]
    InvalidFloat(String),
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("facet {0:?} is not applicable to this type")]
    NotApplicable(String),
}

/// Contract between patterns and a datatype library.
pub trait Datatype {
    /// Lexical interpretation depends on the in-scope namespace declarations
    /// (QName, NOTATION).
    fn needs_context(&self) -> bool;
    /// Map a lexical form into the value space.
    fn parse_value(
        &self,
        raw: &str,
        ns: Option<&dyn Namespaces>,
    ) -> Result<DatatypeValues, DatatypeError>;
    /// Compare an incoming lexical form against a previously parsed value.
    fn equal(&self, value: &str, parsed: &DatatypeValues, ns: Option<&dyn Namespaces>) -> bool;
    /// True when the lexical form is rejected by the type or one of its
    /// facets.
    fn disallows(&self, value: &str, ns: Option<&dyn Namespaces>) -> bool;
}

/// One concrete datatype with its facets baked in.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum Datatypes {
    Builtin(builtin::BuiltinDatatypes),
    Xsd(xsd::XsdDatatypes),
}

/// A value in some datatype's value space, precomputed from a `Value`
/// pattern's raw lexical form.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum DatatypeValues {
    Builtin(builtin::BuiltinDatatypeValues),
    Xsd(xsd::XsdDatatypeValues),
}

impl Datatypes {
    /// Look up `name` in `library` and check its parameters.  Facets that are
    /// accepted but not enforced (per the supported-datatype table) push a
    /// note onto `warnings`.
    pub fn compile(
        library: &str,
        name: &str,
        params: &[Param],
        warnings: &mut Vec<String>,
    ) -> Result<Datatypes, DatatypeError> {
        match library {
            "" => builtin::BuiltinDatatypes::compile(name, params).map(Datatypes::Builtin),
            xsd::NAMESPACE_URI => {
                xsd::XsdDatatypes::compile(name, params, warnings).map(Datatypes::Xsd)
            }
            other => Err(DatatypeError::UnknownLibrary(other.to_string())),
        }
    }
}

impl Datatype for Datatypes {
    fn needs_context(&self) -> bool {
        match self {
            Datatypes::Builtin(_) => false,
            Datatypes::Xsd(dt) => dt.needs_context(),
        }
    }

    fn parse_value(
        &self,
        raw: &str,
        ns: Option<&dyn Namespaces>,
    ) -> Result<DatatypeValues, DatatypeError> {
        match self {
            Datatypes::Builtin(dt) => Ok(DatatypeValues::Builtin(dt.value(raw))),
            Datatypes::Xsd(dt) => dt.parse_value(raw, ns).map(DatatypeValues::Xsd),
        }
    }

    fn equal(&self, value: &str, parsed: &DatatypeValues, ns: Option<&dyn Namespaces>) -> bool {
        match parsed {
            DatatypeValues::Builtin(v) => v.matches(value),
            DatatypeValues::Xsd(v) => v.matches(value, ns),
        }
    }

    fn disallows(&self, value: &str, ns: Option<&dyn Namespaces>) -> bool {
        match self {
            Datatypes::Builtin(_) => false,
            Datatypes::Xsd(dt) => !dt.is_valid(value, ns),
        }
    }
}
