//! A subset of the XML Schema datatypes
//! (`datatypeLibrary="http://www.w3.org/2001/XMLSchema-datatypes"`).
//!
//! Facets are parsed once, at pattern-construction time, into the
//! [`XsdDatatypes`] variants below.  Temporal types are checked lexically
//! only, and `float`/`double` are checked for parsability but not range;
//! min/max facets on those types are accepted with a warning and ignored.

use super::{DatatypeError, FacetError, Namespaces, Param};
use crate::datatype::builtin::normalize_whitespace;
use crate::ncname;
use lazy_static::lazy_static;
use std::fmt;
use std::str::FromStr;

pub const NAMESPACE_URI: &str = "http://www.w3.org/2001/XMLSchema-datatypes";

lazy_static! {
    static ref LANG_RE: regex::Regex = regex::Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap();
    static ref DATETIME_RE: regex::Regex = regex::Regex::new(r"^-?\d{4,}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref DURATION_RE: regex::Regex = regex::Regex::new(r"^-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$").unwrap();
    static ref TIME_RE: regex::Regex = regex::Regex::new(r"^\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref GYEAR_RE: regex::Regex = regex::Regex::new(r"^-?\d{4,}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref GYEARMONTH_RE: regex::Regex = regex::Regex::new(r"^-?\d{4,}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref GMONTH_RE: regex::Regex = regex::Regex::new(r"^--\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref GMONTHDAY_RE: regex::Regex = regex::Regex::new(r"^--\d{2}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref GDAY_RE: regex::Regex = regex::Regex::new(r"^---\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref BASE64_RE: regex::Regex = regex::Regex::new(r"^[A-Za-z0-9+/\s]*={0,2}$").unwrap();
    static ref HEXBINARY_RE: regex::Regex = regex::Regex::new(r"^([0-9A-Fa-f]{2})*$").unwrap();
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum XsdDatatypes {
    String(StringFacets),
    NormalizedString(StringFacets),
    Token(LengthFacet),
    Language(Option<PatternFacet>),
    Boolean(Option<PatternFacet>),
    Byte(MinMaxFacet<i8>, Option<PatternFacet>),
    Short(MinMaxFacet<i16>, Option<PatternFacet>),
    Int(MinMaxFacet<i32>, Option<PatternFacet>),
    Long(MinMaxFacet<i64>, Option<PatternFacet>),
    UnsignedByte(MinMaxFacet<u8>, Option<PatternFacet>),
    UnsignedShort(MinMaxFacet<u16>, Option<PatternFacet>),
    UnsignedInt(MinMaxFacet<u32>, Option<PatternFacet>),
    UnsignedLong(MinMaxFacet<u64>, Option<PatternFacet>),
    Integer(MinMaxFacet<num_bigint::BigInt>, Option<PatternFacet>),
    NonNegativeInteger(MinMaxFacet<num_bigint::BigUint>, Option<PatternFacet>),
    PositiveInteger(MinMaxFacet<num_bigint::BigUint>, Option<PatternFacet>),
    NonPositiveInteger(MinMaxFacet<num_bigint::BigInt>, Option<PatternFacet>),
    NegativeInteger(MinMaxFacet<num_bigint::BigInt>, Option<PatternFacet>),
    Decimal {
        min_max: MinMaxFacet<bigdecimal::BigDecimal>,
        pattern: Option<PatternFacet>,
        fraction_digits: Option<u16>,
        total_digits: Option<u16>,
    },
    Float(Option<PatternFacet>),
    Double(Option<PatternFacet>),
    Duration(Option<PatternFacet>),
    Date(Option<PatternFacet>),
    Datetime(Option<PatternFacet>),
    Time(Option<PatternFacet>),
    GYear(Option<PatternFacet>),
    GYearMonth(Option<PatternFacet>),
    GMonth(Option<PatternFacet>),
    GMonthDay(Option<PatternFacet>),
    GDay(Option<PatternFacet>),
    AnyUri(Option<PatternFacet>),
    NmToken(LengthFacet),
    NmTokens(LengthFacet),
    Name(LengthFacet),
    NcName(LengthFacet),
    Id(Option<PatternFacet>),
    IdRef(Option<PatternFacet>),
    Entity(LengthFacet),
    QNameData,
    Notation,
}

impl XsdDatatypes {
    pub fn type_name(&self) -> &'static str {
        match self {
            XsdDatatypes::String(_) => "string",
            XsdDatatypes::NormalizedString(_) => "normalizedString",
            XsdDatatypes::Token(_) => "token",
            XsdDatatypes::Language(_) => "language",
            XsdDatatypes::Boolean(_) => "boolean",
            XsdDatatypes::Byte(..) => "byte",
            XsdDatatypes::Short(..) => "short",
            XsdDatatypes::Int(..) => "int",
            XsdDatatypes::Long(..) => "long",
            XsdDatatypes::UnsignedByte(..) => "unsignedByte",
            XsdDatatypes::UnsignedShort(..) => "unsignedShort",
            XsdDatatypes::UnsignedInt(..) => "unsignedInt",
            XsdDatatypes::UnsignedLong(..) => "unsignedLong",
            XsdDatatypes::Integer(..) => "integer",
            XsdDatatypes::NonNegativeInteger(..) => "nonNegativeInteger",
            XsdDatatypes::PositiveInteger(..) => "positiveInteger",
            XsdDatatypes::NonPositiveInteger(..) => "nonPositiveInteger",
            XsdDatatypes::NegativeInteger(..) => "negativeInteger",
            XsdDatatypes::Decimal { .. } => "decimal",
            XsdDatatypes::Float(_) => "float",
            XsdDatatypes::Double(_) => "double",
            XsdDatatypes::Duration(_) => "duration",
            XsdDatatypes::Date(_) => "date",
            XsdDatatypes::Datetime(_) => "dateTime",
            XsdDatatypes::Time(_) => "time",
            XsdDatatypes::GYear(_) => "gYear",
            XsdDatatypes::GYearMonth(_) => "gYearMonth",
            XsdDatatypes::GMonth(_) => "gMonth",
            XsdDatatypes::GMonthDay(_) => "gMonthDay",
            XsdDatatypes::GDay(_) => "gDay",
            XsdDatatypes::AnyUri(_) => "anyURI",
            XsdDatatypes::NmToken(_) => "NMTOKEN",
            XsdDatatypes::NmTokens(_) => "NMTOKENS",
            XsdDatatypes::Name(_) => "Name",
            XsdDatatypes::NcName(_) => "NCName",
            XsdDatatypes::Id(_) => "ID",
            XsdDatatypes::IdRef(_) => "IDREF",
            XsdDatatypes::Entity(_) => "ENTITY",
            XsdDatatypes::QNameData => "QName",
            XsdDatatypes::Notation => "NOTATION",
        }
    }

    pub fn needs_context(&self) -> bool {
        matches!(self, XsdDatatypes::QNameData | XsdDatatypes::Notation)
    }

    pub fn is_valid(&self, value: &str, ns: Option<&dyn Namespaces>) -> bool {
        match self {
            XsdDatatypes::String(facets) => facets.is_valid(value),
            XsdDatatypes::NormalizedString(facets) => {
                facets.is_valid(&normalize_whitespace(value))
            }
            XsdDatatypes::Token(len) => {
                normalize_whitespace(value) == value && len.is_valid(value)
            }
            XsdDatatypes::Language(patt) => LANG_RE.is_match(value) && pattern_ok(patt, value),
            XsdDatatypes::Boolean(patt) => {
                matches!(value, "true" | "false" | "1" | "0") && pattern_ok(patt, value)
            }
            XsdDatatypes::Byte(min_max, patt) => number_ok::<i8>(value, min_max, patt),
            XsdDatatypes::Short(min_max, patt) => number_ok::<i16>(value, min_max, patt),
            XsdDatatypes::Int(min_max, patt) => number_ok::<i32>(value, min_max, patt),
            XsdDatatypes::Long(min_max, patt) => number_ok::<i64>(value, min_max, patt),
            XsdDatatypes::UnsignedByte(min_max, patt) => number_ok::<u8>(value, min_max, patt),
            XsdDatatypes::UnsignedShort(min_max, patt) => number_ok::<u16>(value, min_max, patt),
            XsdDatatypes::UnsignedInt(min_max, patt) => number_ok::<u32>(value, min_max, patt),
            XsdDatatypes::UnsignedLong(min_max, patt) => number_ok::<u64>(value, min_max, patt),
            XsdDatatypes::Integer(min_max, patt) => {
                number_ok::<num_bigint::BigInt>(value, min_max, patt)
            }
            XsdDatatypes::NonNegativeInteger(min_max, patt) => {
                number_ok::<num_bigint::BigUint>(value, min_max, patt)
            }
            XsdDatatypes::PositiveInteger(min_max, patt) => {
                let one = num_bigint::BigUint::from(1u32);
                num_bigint::BigUint::from_str(value)
                    .ok()
                    .is_some_and(|v| v >= one && min_max.is_valid(&v))
                    && pattern_ok(patt, value)
            }
            XsdDatatypes::NonPositiveInteger(min_max, patt) => {
                let zero = num_bigint::BigInt::from(0i32);
                num_bigint::BigInt::from_str(value)
                    .ok()
                    .is_some_and(|v| v <= zero && min_max.is_valid(&v))
                    && pattern_ok(patt, value)
            }
            XsdDatatypes::NegativeInteger(min_max, patt) => {
                let minus_one = num_bigint::BigInt::from(-1i32);
                num_bigint::BigInt::from_str(value)
                    .ok()
                    .is_some_and(|v| v <= minus_one && min_max.is_valid(&v))
                    && pattern_ok(patt, value)
            }
            XsdDatatypes::Decimal {
                min_max,
                pattern,
                fraction_digits: _,
                total_digits: _,
            } => number_ok::<bigdecimal::BigDecimal>(value, min_max, pattern),
            XsdDatatypes::Float(patt) => value.parse::<f32>().is_ok() && pattern_ok(patt, value),
            XsdDatatypes::Double(patt) => value.parse::<f64>().is_ok() && pattern_ok(patt, value),
            XsdDatatypes::Duration(patt) => {
                DURATION_RE.is_match(value)
                    && value.chars().any(|c| c.is_ascii_digit())
                    && pattern_ok(patt, value)
            }
            XsdDatatypes::Date(patt) => {
                chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
                    && pattern_ok(patt, value)
            }
            XsdDatatypes::Datetime(patt) => DATETIME_RE.is_match(value) && pattern_ok(patt, value),
            XsdDatatypes::Time(patt) => TIME_RE.is_match(value) && pattern_ok(patt, value),
            XsdDatatypes::GYear(patt) => GYEAR_RE.is_match(value) && pattern_ok(patt, value),
            XsdDatatypes::GYearMonth(patt) => {
                GYEARMONTH_RE.is_match(value) && pattern_ok(patt, value)
            }
            XsdDatatypes::GMonth(patt) => GMONTH_RE.is_match(value) && pattern_ok(patt, value),
            XsdDatatypes::GMonthDay(patt) => {
                GMONTHDAY_RE.is_match(value) && pattern_ok(patt, value)
            }
            XsdDatatypes::GDay(patt) => GDAY_RE.is_match(value) && pattern_ok(patt, value),
            // anyURI accepts any string (XSD 1.0 practice)
            XsdDatatypes::AnyUri(patt) => pattern_ok(patt, value),
            XsdDatatypes::NmToken(len) => is_valid_nmtoken(value) && len.is_valid(value),
            XsdDatatypes::NmTokens(len) => {
                // length facets on NMTOKENS count tokens, not characters
                let tokens: Vec<&str> = value.split_ascii_whitespace().collect();
                !tokens.is_empty()
                    && tokens.iter().all(|t| is_valid_nmtoken(t))
                    && len.is_valid_count(tokens.len())
            }
            XsdDatatypes::Name(len) => is_valid_name(value) && len.is_valid(value),
            XsdDatatypes::NcName(len) => ncname::is_nc_name(value) && len.is_valid(value),
            XsdDatatypes::Id(patt) => ncname::is_nc_name(value) && pattern_ok(patt, value),
            XsdDatatypes::IdRef(patt) => ncname::is_nc_name(value) && pattern_ok(patt, value),
            XsdDatatypes::Entity(len) => ncname::is_nc_name(value) && len.is_valid(value),
            XsdDatatypes::QNameData | XsdDatatypes::Notation => match ns {
                // with a namespace context available, the prefix must resolve
                Some(ns) => QNameVal::from_qname(value.trim(), ns).is_ok(),
                None => is_valid_qname_syntax(value.trim()),
            },
        }
    }

    pub(crate) fn parse_value(
        &self,
        raw: &str,
        ns: Option<&dyn Namespaces>,
    ) -> Result<XsdDatatypeValues, DatatypeError> {
        let invalid = || DatatypeError::InvalidValue {
            type_name: self.type_name().to_string(),
            raw: raw.to_string(),
        };
        match self {
            XsdDatatypes::String(_) | XsdDatatypes::NormalizedString(_) => {
                Ok(XsdDatatypeValues::String(raw.to_string()))
            }
            XsdDatatypes::QNameData | XsdDatatypes::Notation => {
                let ns = ns.ok_or_else(invalid)?;
                let val = QNameVal::from_qname(raw.trim(), ns).map_err(|()| invalid())?;
                Ok(XsdDatatypeValues::QName(val))
            }
            // remaining types compare equal after whitespace collapse, which
            // is exact for token-derived types and a close approximation for
            // the numeric and temporal ones
            _ => {
                if self.is_valid(raw.trim(), ns) {
                    Ok(XsdDatatypeValues::Token(normalize_whitespace(raw)))
                } else {
                    Err(invalid())
                }
            }
        }
    }

    pub(crate) fn compile(
        name: &str,
        params: &[Param],
        warnings: &mut Vec<String>,
    ) -> Result<XsdDatatypes, DatatypeError> {
        let dt = match name {
            "string" => XsdDatatypes::String(string_facets("string", params)?),
            "normalizedString" => {
                XsdDatatypes::NormalizedString(string_facets("normalizedString", params)?)
            }
            "token" => XsdDatatypes::Token(length_facets("token", params)?),
            "language" => XsdDatatypes::Language(pattern_only("language", params)?),
            "boolean" => XsdDatatypes::Boolean(pattern_only("boolean", params)?),
            "byte" => {
                let (min_max, patt) = min_max_facets::<i8>("byte", params)?;
                XsdDatatypes::Byte(min_max, patt)
            }
            "short" => {
                let (min_max, patt) = min_max_facets::<i16>("short", params)?;
                XsdDatatypes::Short(min_max, patt)
            }
            "int" => {
                let (min_max, patt) = min_max_facets::<i32>("int", params)?;
                XsdDatatypes::Int(min_max, patt)
            }
            "long" => {
                let (min_max, patt) = min_max_facets::<i64>("long", params)?;
                XsdDatatypes::Long(min_max, patt)
            }
            "unsignedByte" => {
                let (min_max, patt) = min_max_facets::<u8>("unsignedByte", params)?;
                XsdDatatypes::UnsignedByte(min_max, patt)
            }
            "unsignedShort" => {
                let (min_max, patt) = min_max_facets::<u16>("unsignedShort", params)?;
                XsdDatatypes::UnsignedShort(min_max, patt)
            }
            "unsignedInt" => {
                let (min_max, patt) = min_max_facets::<u32>("unsignedInt", params)?;
                XsdDatatypes::UnsignedInt(min_max, patt)
            }
            "unsignedLong" => {
                let (min_max, patt) = min_max_facets::<u64>("unsignedLong", params)?;
                XsdDatatypes::UnsignedLong(min_max, patt)
            }
            "integer" => {
                let (min_max, patt) = min_max_facets::<num_bigint::BigInt>("integer", params)?;
                XsdDatatypes::Integer(min_max, patt)
            }
            "nonNegativeInteger" => {
                let (min_max, patt) =
                    min_max_facets::<num_bigint::BigUint>("nonNegativeInteger", params)?;
                XsdDatatypes::NonNegativeInteger(min_max, patt)
            }
            "positiveInteger" => {
                let (min_max, patt) =
                    min_max_facets::<num_bigint::BigUint>("positiveInteger", params)?;
                XsdDatatypes::PositiveInteger(min_max, patt)
            }
            "nonPositiveInteger" => {
                let (min_max, patt) =
                    min_max_facets::<num_bigint::BigInt>("nonPositiveInteger", params)?;
                XsdDatatypes::NonPositiveInteger(min_max, patt)
            }
            "negativeInteger" => {
                let (min_max, patt) =
                    min_max_facets::<num_bigint::BigInt>("negativeInteger", params)?;
                XsdDatatypes::NegativeInteger(min_max, patt)
            }
            "decimal" => decimal_facets(params)?,
            "float" => XsdDatatypes::Float(unranged_float_facets("float", params, warnings)?),
            "double" => XsdDatatypes::Double(unranged_float_facets("double", params, warnings)?),
            "duration" => XsdDatatypes::Duration(pattern_only("duration", params)?),
            "date" => XsdDatatypes::Date(pattern_only("date", params)?),
            "dateTime" => XsdDatatypes::Datetime(pattern_only("dateTime", params)?),
            "time" => XsdDatatypes::Time(pattern_only("time", params)?),
            "gYear" => XsdDatatypes::GYear(pattern_only("gYear", params)?),
            "gYearMonth" => XsdDatatypes::GYearMonth(pattern_only("gYearMonth", params)?),
            "gMonth" => XsdDatatypes::GMonth(pattern_only("gMonth", params)?),
            "gMonthDay" => XsdDatatypes::GMonthDay(pattern_only("gMonthDay", params)?),
            "gDay" => XsdDatatypes::GDay(pattern_only("gDay", params)?),
            "anyURI" => XsdDatatypes::AnyUri(pattern_only("anyURI", params)?),
            "NMTOKEN" => XsdDatatypes::NmToken(length_facets("NMTOKEN", params)?),
            "NMTOKENS" => XsdDatatypes::NmTokens(length_facets("NMTOKENS", params)?),
            "Name" => XsdDatatypes::Name(length_facets("Name", params)?),
            "NCName" => XsdDatatypes::NcName(length_facets("NCName", params)?),
            "ID" => XsdDatatypes::Id(pattern_only("ID", params)?),
            "IDREF" => XsdDatatypes::IdRef(pattern_only("IDREF", params)?),
            "ENTITY" | "ENTITIES" => XsdDatatypes::Entity(length_facets("ENTITY", params)?),
            "QName" => {
                if !params.is_empty() {
                    return Err(DatatypeError::ParamsNotAllowed { type_name: "QName" });
                }
                XsdDatatypes::QNameData
            }
            "NOTATION" => {
                if !params.is_empty() {
                    return Err(DatatypeError::ParamsNotAllowed {
                        type_name: "NOTATION",
                    });
                }
                XsdDatatypes::Notation
            }
            _ => {
                return Err(DatatypeError::UnknownDatatype {
                    library: NAMESPACE_URI.to_string(),
                    name: name.to_string(),
                });
            }
        };
        Ok(dt)
    }
}

fn pattern_ok(patt: &Option<PatternFacet>, value: &str) -> bool {
    patt.as_ref().map(|p| p.is_valid(value)).unwrap_or(true)
}

fn number_ok<T>(value: &str, min_max: &MinMaxFacet<T>, patt: &Option<PatternFacet>) -> bool
where
    T: FromStr + PartialOrd,
{
    T::from_str(value)
        .ok()
        .is_some_and(|v| min_max.is_valid(&v))
        && pattern_ok(patt, value)
}

/// XML 1.0 `NameChar`: an NCNameChar, or `:`.
fn is_name_char(c: char) -> bool {
    c == ':' || ncname::is_nc_name_char(c)
}

fn is_name_start_char(c: char) -> bool {
    c == ':' || ncname::is_nc_name_start_char(c)
}

fn is_valid_nmtoken(text: &str) -> bool {
    !text.is_empty() && text.chars().all(is_name_char)
}

fn is_valid_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        None => false,
        Some(first) => is_name_start_char(first) && chars.all(is_name_char),
    }
}

fn is_valid_qname_syntax(text: &str) -> bool {
    ncname::split_qname(text).is_some()
}

/// An XSD QName in the value space: `(namespace_uri, local_name)`, with `""`
/// for names in no namespace.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct QNameVal(String, String);

impl QNameVal {
    pub(crate) fn from_qname(value: &str, ns: &dyn Namespaces) -> Result<QNameVal, ()> {
        match ncname::split_qname(value) {
            Some((Some(prefix), local)) => {
                let uri = ns.resolve(prefix).ok_or(())?;
                Ok(QNameVal(uri.to_string(), local.to_string()))
            }
            Some((None, local)) => {
                let uri = ns.resolve("").unwrap_or("");
                Ok(QNameVal(uri.to_string(), local.to_string()))
            }
            None => Err(()),
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum XsdDatatypeValues {
    String(String),
    Token(String),
    QName(QNameVal),
}

impl XsdDatatypeValues {
    pub fn matches(&self, value: &str, ns: Option<&dyn Namespaces>) -> bool {
        match self {
            XsdDatatypeValues::String(s) => s == value,
            XsdDatatypeValues::Token(s) => *s == normalize_whitespace(value),
            XsdDatatypeValues::QName(q) => match ns {
                Some(ns) => QNameVal::from_qname(value.trim(), ns)
                    .map(|v| v == *q)
                    .unwrap_or(false),
                // QName comparison is impossible without a namespace context
                None => false,
            },
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum LengthFacet {
    Unbounded,
    MinLength(usize),
    MaxLength(usize),
    MinMaxLength(usize, usize),
    Length(usize),
}

impl LengthFacet {
    fn is_valid(&self, value: &str) -> bool {
        self.is_valid_count(value.chars().count())
    }

    fn is_valid_count(&self, actual: usize) -> bool {
        match self {
            LengthFacet::Unbounded => true,
            LengthFacet::MinLength(min) => *min <= actual,
            LengthFacet::MaxLength(max) => actual <= *max,
            LengthFacet::MinMaxLength(min, max) => *min <= actual && actual <= *max,
            LengthFacet::Length(len) => actual == *len,
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
enum Min<T: PartialOrd> {
    Unbounded,
    Inclusive(T),
    Exclusive(T),
}

impl<T: PartialOrd> Min<T> {
    fn is_valid(&self, v: &T) -> bool {
        match self {
            Min::Unbounded => true,
            Min::Inclusive(min) => min <= v,
            Min::Exclusive(min) => min < v,
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
enum Max<T: PartialOrd> {
    Unbounded,
    Inclusive(T),
    Exclusive(T),
}

impl<T: PartialOrd> Max<T> {
    fn is_valid(&self, v: &T) -> bool {
        match self {
            Max::Unbounded => true,
            Max::Inclusive(max) => v <= max,
            Max::Exclusive(max) => v < max,
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct MinMaxFacet<T: PartialOrd> {
    min: Min<T>,
    max: Max<T>,
}

impl<T: PartialOrd> Default for MinMaxFacet<T> {
    fn default() -> Self {
        MinMaxFacet {
            min: Min::Unbounded,
            max: Max::Unbounded,
        }
    }
}

impl<T: PartialOrd> MinMaxFacet<T> {
    fn set_min(&mut self, min: Min<T>) -> Result<(), FacetError> {
        if !matches!(self.min, Min::Unbounded) {
            return Err(FacetError::Conflicting(
                "minInclusive conflicts with minExclusive",
            ));
        }
        self.min = min;
        Ok(())
    }

    fn set_max(&mut self, max: Max<T>) -> Result<(), FacetError> {
        if !matches!(self.max, Max::Unbounded) {
            return Err(FacetError::Conflicting(
                "maxInclusive conflicts with maxExclusive",
            ));
        }
        self.max = max;
        Ok(())
    }

    fn check_consistent(&self) -> Result<(), FacetError> {
        let conflict = match (&self.min, &self.max) {
            (Min::Inclusive(min), Max::Inclusive(max)) => min > max,
            (Min::Inclusive(min), Max::Exclusive(max))
            | (Min::Exclusive(min), Max::Inclusive(max))
            | (Min::Exclusive(min), Max::Exclusive(max)) => min >= max,
            _ => false,
        };
        if conflict {
            Err(FacetError::Conflicting("minimum exceeds maximum"))
        } else {
            Ok(())
        }
    }

    fn is_valid(&self, v: &T) -> bool {
        self.min.is_valid(v) && self.max.is_valid(v)
    }
}

#[derive(Clone)]
pub struct PatternFacet(String, regex::Regex);

impl PatternFacet {
    fn new(raw: &str) -> Result<PatternFacet, FacetError> {
        // the XSD pattern facet matches the entire lexical value
        let anchored = format!("^(?:{raw})$");
        let re = regex::Regex::new(&anchored)?;
        Ok(PatternFacet(raw.to_string(), re))
    }

    fn is_valid(&self, value: &str) -> bool {
        self.1.is_match(value)
    }
}

impl PartialEq for PatternFacet {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for PatternFacet {}
impl std::hash::Hash for PatternFacet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}
impl fmt::Debug for PatternFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("PatternFacet").field(&self.0).finish()
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct StringFacets {
    len: LengthFacet,
    pattern: Option<PatternFacet>,
}

impl StringFacets {
    fn is_valid(&self, value: &str) -> bool {
        self.len.is_valid(value) && pattern_ok(&self.pattern, value)
    }
}

fn facet_err(type_name: &'static str, facet: FacetError) -> DatatypeError {
    DatatypeError::Facet { type_name, facet }
}

fn parse_num<T>(type_name: &'static str, param: &Param) -> Result<T, DatatypeError>
where
    T: FromStr,
{
    param
        .value
        .trim()
        .parse()
        .map_err(|_| facet_err(type_name, FacetError::InvalidInt(param.value.clone())))
}

fn parse_pattern(type_name: &'static str, param: &Param) -> Result<PatternFacet, DatatypeError> {
    PatternFacet::new(&param.value).map_err(|e| facet_err(type_name, e))
}

/// `length` / `minLength` / `maxLength` / `pattern`.
fn string_facets(type_name: &'static str, params: &[Param]) -> Result<StringFacets, DatatypeError> {
    let mut pattern = None;
    let (mut length, mut min, mut max) = (None, None, None);
    for param in params {
        match &param.name[..] {
            "length" => length = Some(parse_num::<usize>(type_name, param)?),
            "minLength" => min = Some(parse_num::<usize>(type_name, param)?),
            "maxLength" => max = Some(parse_num::<usize>(type_name, param)?),
            "pattern" => pattern = Some(parse_pattern(type_name, param)?),
            other => {
                return Err(facet_err(
                    type_name,
                    FacetError::NotApplicable(other.to_string()),
                ));
            }
        }
    }
    Ok(StringFacets {
        len: combine_lengths(type_name, length, min, max)?,
        pattern,
    })
}

/// `length` / `minLength` / `maxLength` only.
fn length_facets(type_name: &'static str, params: &[Param]) -> Result<LengthFacet, DatatypeError> {
    let (mut length, mut min, mut max) = (None, None, None);
    for param in params {
        match &param.name[..] {
            "length" => length = Some(parse_num::<usize>(type_name, param)?),
            "minLength" => min = Some(parse_num::<usize>(type_name, param)?),
            "maxLength" => max = Some(parse_num::<usize>(type_name, param)?),
            other => {
                return Err(facet_err(
                    type_name,
                    FacetError::NotApplicable(other.to_string()),
                ));
            }
        }
    }
    combine_lengths(type_name, length, min, max)
}

fn combine_lengths(
    type_name: &'static str,
    length: Option<usize>,
    min: Option<usize>,
    max: Option<usize>,
) -> Result<LengthFacet, DatatypeError> {
    match (length, min, max) {
        (None, None, None) => Ok(LengthFacet::Unbounded),
        (Some(l), None, None) => Ok(LengthFacet::Length(l)),
        (Some(_), _, _) => Err(facet_err(
            type_name,
            FacetError::Conflicting("length conflicts with minLength/maxLength"),
        )),
        (None, Some(min), None) => Ok(LengthFacet::MinLength(min)),
        (None, None, Some(max)) => Ok(LengthFacet::MaxLength(max)),
        (None, Some(min), Some(max)) => {
            if min > max {
                Err(facet_err(
                    type_name,
                    FacetError::Conflicting("minLength greater than maxLength"),
                ))
            } else {
                Ok(LengthFacet::MinMaxLength(min, max))
            }
        }
    }
}

/// `pattern` only.
fn pattern_only(
    type_name: &'static str,
    params: &[Param],
) -> Result<Option<PatternFacet>, DatatypeError> {
    let mut pattern = None;
    for param in params {
        match &param.name[..] {
            "pattern" => pattern = Some(parse_pattern(type_name, param)?),
            other => {
                return Err(facet_err(
                    type_name,
                    FacetError::NotApplicable(other.to_string()),
                ));
            }
        }
    }
    Ok(pattern)
}

/// `float`/`double`: the `pattern` facet is enforced; min/max facets are
/// syntax-checked but not enforced (range checking of IEEE values is out of
/// scope), which is reported as a warning.
fn unranged_float_facets(
    type_name: &'static str,
    params: &[Param],
    warnings: &mut Vec<String>,
) -> Result<Option<PatternFacet>, DatatypeError> {
    let mut pattern = None;
    for param in params {
        match &param.name[..] {
            "pattern" => pattern = Some(parse_pattern(type_name, param)?),
            "minInclusive" | "minExclusive" | "maxInclusive" | "maxExclusive" => {
                let v: f64 = param.value.trim().parse().map_err(|_| {
                    facet_err(type_name, FacetError::InvalidFloat(param.value.clone()))
                })?;
                if !v.is_finite() {
                    return Err(facet_err(
                        type_name,
                        FacetError::InvalidFloat(param.value.clone()),
                    ));
                }
                warnings.push(format!(
                    "{type_name}: {} facet is not enforced",
                    param.name
                ));
            }
            other => {
                return Err(facet_err(
                    type_name,
                    FacetError::NotApplicable(other.to_string()),
                ));
            }
        }
    }
    Ok(pattern)
}

fn min_max_facets<T>(
    type_name: &'static str,
    params: &[Param],
) -> Result<(MinMaxFacet<T>, Option<PatternFacet>), DatatypeError>
where
    T: FromStr + PartialOrd,
{
    let mut min_max = MinMaxFacet::default();
    let mut pattern = None;
    for param in params {
        match &param.name[..] {
            "minInclusive" => min_max
                .set_min(Min::Inclusive(parse_num(type_name, param)?))
                .map_err(|e| facet_err(type_name, e))?,
            "minExclusive" => min_max
                .set_min(Min::Exclusive(parse_num(type_name, param)?))
                .map_err(|e| facet_err(type_name, e))?,
            "maxInclusive" => min_max
                .set_max(Max::Inclusive(parse_num(type_name, param)?))
                .map_err(|e| facet_err(type_name, e))?,
            "maxExclusive" => min_max
                .set_max(Max::Exclusive(parse_num(type_name, param)?))
                .map_err(|e| facet_err(type_name, e))?,
            "pattern" => pattern = Some(parse_pattern(type_name, param)?),
            other => {
                return Err(facet_err(
                    type_name,
                    FacetError::NotApplicable(other.to_string()),
                ));
            }
        }
    }
    min_max
        .check_consistent()
        .map_err(|e| facet_err(type_name, e))?;
    Ok((min_max, pattern))
}

fn decimal_facets(params: &[Param]) -> Result<XsdDatatypes, DatatypeError> {
    let mut min_max = MinMaxFacet::default();
    let mut pattern = None;
    let mut fraction_digits = None;
    let mut total_digits = None;
    for param in params {
        match &param.name[..] {
            "minInclusive" => min_max
                .set_min(Min::Inclusive(parse_num("decimal", param)?))
                .map_err(|e| facet_err("decimal", e))?,
            "minExclusive" => min_max
                .set_min(Min::Exclusive(parse_num("decimal", param)?))
                .map_err(|e| facet_err("decimal", e))?,
            "maxInclusive" => min_max
                .set_max(Max::Inclusive(parse_num("decimal", param)?))
                .map_err(|e| facet_err("decimal", e))?,
            "maxExclusive" => min_max
                .set_max(Max::Exclusive(parse_num("decimal", param)?))
                .map_err(|e| facet_err("decimal", e))?,
            "pattern" => pattern = Some(parse_pattern("decimal", param)?),
            "fractionDigits" => fraction_digits = Some(parse_num::<u16>("decimal", param)?),
            "totalDigits" => total_digits = Some(parse_num::<u16>("decimal", param)?),
            other => {
                return Err(facet_err(
                    "decimal",
                    FacetError::NotApplicable(other.to_string()),
                ));
            }
        }
    }
    min_max
        .check_consistent()
        .map_err(|e| facet_err("decimal", e))?;
    Ok(XsdDatatypes::Decimal {
        min_max,
        pattern,
        fraction_digits,
        total_digits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct NoNs;
    impl Namespaces for NoNs {
        fn resolve(&self, _prefix: &str) -> Option<&str> {
            None
        }
    }

    struct OneNs(&'static str, &'static str);
    impl Namespaces for OneNs {
        fn resolve(&self, prefix: &str) -> Option<&str> {
            (prefix == self.0).then_some(self.1)
        }
    }

    fn compile(name: &str, params: &[Param]) -> Result<XsdDatatypes, DatatypeError> {
        XsdDatatypes::compile(name, params, &mut Vec::new())
    }

    #[test]
    fn short_range() {
        let dt = compile(
            "short",
            &[
                Param::new("minInclusive", "0"),
                Param::new("maxInclusive", "100"),
            ],
        )
        .unwrap();
        assert!(dt.is_valid("0", None));
        assert!(dt.is_valid("100", None));
        assert!(!dt.is_valid("101", None));
        assert!(!dt.is_valid("-1", None));
        assert!(!dt.is_valid("3.5", None));
    }

    #[test]
    fn conflicting_min_facets() {
        let res = compile(
            "int",
            &[
                Param::new("minInclusive", "0"),
                Param::new("minExclusive", "1"),
            ],
        );
        assert_matches!(res, Err(DatatypeError::Facet { type_name: "int", .. }));
    }

    #[test]
    fn inverted_range_rejected() {
        let res = compile(
            "int",
            &[
                Param::new("minInclusive", "10"),
                Param::new("maxInclusive", "2"),
            ],
        );
        assert_matches!(res, Err(DatatypeError::Facet { .. }));
    }

    #[test]
    fn string_length() {
        let dt = compile("string", &[Param::new("length", "3")]).unwrap();
        assert!(dt.is_valid("abc", None));
        assert!(!dt.is_valid("ab", None));
    }

    #[test]
    fn token_rejects_uncollapsed() {
        let dt = compile("token", &[]).unwrap();
        assert!(dt.is_valid("a b", None));
        assert!(!dt.is_valid(" a b", None));
        assert!(!dt.is_valid("a  b", None));
    }

    #[test]
    fn pattern_is_anchored() {
        let dt = compile("string", &[Param::new("pattern", "[a-z]+")]).unwrap();
        assert!(dt.is_valid("abc", None));
        assert!(!dt.is_valid("abc1", None));
    }

    #[test]
    fn boolean_lexical_space() {
        let dt = compile("boolean", &[]).unwrap();
        for ok in ["true", "false", "1", "0"] {
            assert!(dt.is_valid(ok, None), "{ok}");
        }
        assert!(!dt.is_valid("TRUE", None));
    }

    #[test]
    fn dates_and_times() {
        assert!(compile("date", &[]).unwrap().is_valid("2021-02-28", None));
        assert!(!compile("date", &[]).unwrap().is_valid("2021-02-31", None));
        assert!(compile("dateTime", &[])
            .unwrap()
            .is_valid("2021-02-28T12:00:00Z", None));
        assert!(compile("duration", &[]).unwrap().is_valid("PT1H30M", None));
        assert!(!compile("duration", &[]).unwrap().is_valid("P", None));
    }

    #[test]
    fn double_range_facet_warns() {
        let mut warnings = Vec::new();
        let dt = XsdDatatypes::compile(
            "double",
            &[Param::new("minInclusive", "0.5")],
            &mut warnings,
        )
        .unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(dt.is_valid("0.25", None));
    }

    #[test]
    fn qname_needs_resolvable_prefix() {
        let dt = compile("QName", &[]).unwrap();
        assert!(dt.is_valid("p:x", Some(&OneNs("p", "urn:p"))));
        assert!(!dt.is_valid("q:x", Some(&OneNs("p", "urn:p"))));
        // without a context, only the syntax is checked
        assert!(dt.is_valid("q:x", None));
        assert!(!dt.is_valid("q:x:y", None));
    }

    #[test]
    fn qname_value_space_ignores_prefix_spelling() {
        let dt = compile("QName", &[]).unwrap();
        let parsed = dt.parse_value("a:local", Some(&OneNs("a", "urn:x"))).unwrap();
        assert!(parsed.matches("b:local", Some(&OneNs("b", "urn:x"))));
        assert!(!parsed.matches("b:local", Some(&OneNs("b", "urn:y"))));
        assert!(!parsed.matches("b:local", Some(&NoNs)));
    }

    #[test]
    fn nmtokens_counts_tokens() {
        let dt = compile("NMTOKENS", &[Param::new("maxLength", "2")]).unwrap();
        assert!(dt.is_valid("one two", None));
        assert!(!dt.is_valid("one two three", None));
        assert!(!dt.is_valid("", None));
    }

    #[test]
    fn unknown_type_and_facet() {
        assert_matches!(
            compile("starship", &[]),
            Err(DatatypeError::UnknownDatatype { .. })
        );
        assert_matches!(
            compile("boolean", &[Param::new("length", "1")]),
            Err(DatatypeError::Facet { .. })
        );
    }
}
