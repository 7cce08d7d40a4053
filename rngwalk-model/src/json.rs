//! Schema (de)serialization: `{"v": 3, "o": <bitfield>, "d": [...]}`.
//!
//! `d` is a recursive array-encoded tree.  Each node is `[kind, ...args]`;
//! kind 0 marks a plain array (definition lists, parameter lists), every
//! other kind maps to one constructor and the remaining elements are its
//! positional arguments.  Option bit 0 records whether element nodes carry
//! their origin path.

use crate::datatype::Param;
use crate::name::NamePattern;
use crate::pattern::{Grammar, Pat, PatId, PatternBuilder, RefTarget};
use crate::SchemaError;
use serde_json::{json, Value as Json};

pub const VERSION: u64 = 3;
pub const OPTION_ELEMENT_PATHS: u64 = 1;

const K_ARRAY: u64 = 0;
const K_EMPTY: u64 = 1;
const K_DATA: u64 = 2;
const K_LIST: u64 = 3;
const K_PARAM: u64 = 4;
const K_VALUE: u64 = 5;
const K_NOT_ALLOWED: u64 = 6;
const K_TEXT: u64 = 7;
const K_REF: u64 = 8;
const K_ONE_OR_MORE: u64 = 9;
const K_CHOICE: u64 = 10;
const K_GROUP: u64 = 11;
const K_ATTRIBUTE: u64 = 12;
const K_ELEMENT: u64 = 13;
const K_DEFINE: u64 = 14;
const K_GRAMMAR: u64 = 15;
const K_INTERLEAVE: u64 = 17;
const K_NAME: u64 = 18;
const K_NAME_CHOICE: u64 = 19;
const K_NS_NAME: u64 = 20;
const K_ANY_NAME: u64 = 21;

pub fn write_tree_to_json(grammar: &Grammar) -> String {
    let with_paths = has_any_element_path(grammar);
    let defines: Vec<Json> = std::iter::once(json!(K_ARRAY))
        .chain(grammar.defines().iter().map(|d| {
            json!([
                K_DEFINE,
                &d.name,
                encode_pattern(grammar, d.body, with_paths)
            ])
        }))
        .collect();
    let d = json!([
        K_GRAMMAR,
        encode_pattern(grammar, grammar.start(), with_paths),
        Json::Array(defines)
    ]);
    let o = if with_paths { OPTION_ELEMENT_PATHS } else { 0 };
    json!({ "v": VERSION, "o": o, "d": d }).to_string()
}

fn has_any_element_path(grammar: &Grammar) -> bool {
    (0..grammar.pattern_count()).any(|i| {
        let id = PatId::from_index(i);
        matches!(grammar.pat(id), Pat::Element(_, _)) && !grammar.path(id).is_empty()
    })
}

fn encode_pattern(g: &Grammar, id: PatId, with_paths: bool) -> Json {
    match g.pat(id) {
        Pat::Empty => json!([K_EMPTY]),
        Pat::Text => json!([K_TEXT]),
        Pat::NotAllowed => json!([K_NOT_ALLOWED]),
        Pat::Value(v) => json!([K_VALUE, &v.library, &v.type_name, &v.raw, &v.ns]),
        Pat::Data(d) => {
            let params: Vec<Json> = std::iter::once(json!(K_ARRAY))
                .chain(
                    d.params
                        .iter()
                        .map(|p| json!([K_PARAM, &p.name, &p.value])),
                )
                .collect();
            let mut node = vec![
                json!(K_DATA),
                json!(&d.library),
                json!(&d.type_name),
                Json::Array(params),
            ];
            if let Some(except) = d.except {
                node.push(encode_pattern(g, except, with_paths));
            }
            Json::Array(node)
        }
        Pat::List(p) => json!([K_LIST, encode_pattern(g, *p, with_paths)]),
        Pat::Attribute(nc, p) => json!([
            K_ATTRIBUTE,
            encode_name(nc),
            encode_pattern(g, *p, with_paths)
        ]),
        Pat::Element(nc, p) => {
            if with_paths {
                json!([
                    K_ELEMENT,
                    g.path(id),
                    encode_name(nc),
                    encode_pattern(g, *p, with_paths)
                ])
            } else {
                json!([
                    K_ELEMENT,
                    encode_name(nc),
                    encode_pattern(g, *p, with_paths)
                ])
            }
        }
        Pat::OneOrMore(p) => json!([K_ONE_OR_MORE, encode_pattern(g, *p, with_paths)]),
        Pat::Group(a, b) => json!([
            K_GROUP,
            encode_pattern(g, *a, with_paths),
            encode_pattern(g, *b, with_paths)
        ]),
        Pat::Interleave(a, b) => json!([
            K_INTERLEAVE,
            encode_pattern(g, *a, with_paths),
            encode_pattern(g, *b, with_paths)
        ]),
        Pat::Choice(a, b) => json!([
            K_CHOICE,
            encode_pattern(g, *a, with_paths),
            encode_pattern(g, *b, with_paths)
        ]),
        Pat::Ref(RefTarget::Resolved(def)) => json!([K_REF, &g.define(*def).name]),
        Pat::Ref(RefTarget::Unresolved(name)) => json!([K_REF, name]),
    }
}

fn encode_name(nc: &NamePattern) -> Json {
    match nc {
        NamePattern::Name { ns, name } => json!([K_NAME, ns, name]),
        NamePattern::NameChoice { a, b } => {
            json!([K_NAME_CHOICE, encode_name(a), encode_name(b)])
        }
        NamePattern::NsName { ns, except } => match except {
            Some(e) => json!([K_NS_NAME, ns, encode_name(e)]),
            None => json!([K_NS_NAME, ns]),
        },
        NamePattern::AnyName { except } => match except {
            Some(e) => json!([K_ANY_NAME, encode_name(e)]),
            None => json!([K_ANY_NAME]),
        },
    }
}

pub fn read_tree_from_json(text: &str) -> Result<Grammar, SchemaError> {
    let doc: Json = serde_json::from_str(text)?;
    let obj = doc
        .as_object()
        .ok_or_else(|| malformed("top level must be an object"))?;
    let v = obj
        .get("v")
        .and_then(Json::as_u64)
        .ok_or_else(|| malformed("missing format version"))?;
    if v != VERSION {
        return Err(SchemaError::UnsupportedVersion(v));
    }
    let options = obj
        .get("o")
        .and_then(Json::as_u64)
        .ok_or_else(|| malformed("missing options bitfield"))?;
    let d = obj.get("d").ok_or_else(|| malformed("missing tree"))?;

    let mut decoder = Decoder {
        builder: PatternBuilder::new(),
        with_paths: options & OPTION_ELEMENT_PATHS != 0,
    };
    let (kind, args) = node(d)?;
    if kind != K_GRAMMAR {
        return Err(malformed("root node must be a grammar"));
    }
    let [start_node, defines_node] = args else {
        return Err(malformed("grammar node takes start and defines"));
    };
    for define in items(defines_node)? {
        let (kind, args) = node(define)?;
        if kind != K_DEFINE {
            return Err(malformed("expected define node"));
        }
        let [name, body] = args else {
            return Err(malformed("define node takes name and body"));
        };
        let name = string_arg(name, "define name")?.to_string();
        let body = decoder.pattern(body)?;
        decoder.builder.define(&name, body)?;
    }
    let start = decoder.pattern(start_node)?;
    decoder.builder.finish(start)
}

struct Decoder {
    builder: PatternBuilder,
    with_paths: bool,
}

impl Decoder {
    fn pattern(&mut self, v: &Json) -> Result<PatId, SchemaError> {
        let (kind, args) = node(v)?;
        let id = match (kind, args) {
            (K_EMPTY, []) => self.builder.empty(),
            (K_TEXT, []) => self.builder.text(),
            (K_NOT_ALLOWED, []) => self.builder.not_allowed(),
            (K_VALUE, [library, type_name, raw, ns]) => self.builder.value(
                string_arg(library, "value library")?,
                string_arg(type_name, "value type")?,
                string_arg(raw, "value literal")?,
                string_arg(ns, "value namespace")?,
            )?,
            (K_DATA, [library, type_name, params]) => {
                let params = self.params(params)?;
                self.builder.data(
                    string_arg(library, "data library")?,
                    string_arg(type_name, "data type")?,
                    &params,
                    None,
                )?
            }
            (K_DATA, [library, type_name, params, except]) => {
                let except = self.pattern(except)?;
                let params = self.params(params)?;
                self.builder.data(
                    string_arg(library, "data library")?,
                    string_arg(type_name, "data type")?,
                    &params,
                    Some(except),
                )?
            }
            (K_LIST, [content]) => {
                let content = self.pattern(content)?;
                self.builder.list(content)
            }
            (K_ATTRIBUTE, [nc, content]) => {
                let nc = name_class(nc)?;
                let content = self.pattern(content)?;
                self.builder.attribute(nc, content)
            }
            (K_ELEMENT, args) => {
                let (path, nc, content) = match (self.with_paths, args) {
                    (true, [path, nc, content]) => {
                        (Some(string_arg(path, "element path")?.to_string()), nc, content)
                    }
                    (false, [nc, content]) => (None, nc, content),
                    _ => return Err(malformed("bad element node arity")),
                };
                let nc = name_class(nc)?;
                let content = self.pattern(content)?;
                let id = self.builder.element(nc, content);
                if let Some(path) = path {
                    self.builder.set_path(id, &path);
                }
                id
            }
            (K_ONE_OR_MORE, [content]) => {
                let content = self.pattern(content)?;
                self.builder.one_or_more(content)
            }
            (K_CHOICE, [a, b]) => {
                let a = self.pattern(a)?;
                let b = self.pattern(b)?;
                self.builder.choice(a, b)
            }
            (K_GROUP, [a, b]) => {
                let a = self.pattern(a)?;
                let b = self.pattern(b)?;
                self.builder.group(a, b)
            }
            (K_INTERLEAVE, [a, b]) => {
                let a = self.pattern(a)?;
                let b = self.pattern(b)?;
                self.builder.interleave(a, b)
            }
            (K_REF, [name]) => self.builder.reference(string_arg(name, "ref name")?),
            _ => return Err(malformed(format!("bad pattern node of kind {kind}"))),
        };
        Ok(id)
    }

    fn params(&mut self, v: &Json) -> Result<Vec<Param>, SchemaError> {
        items(v)?
            .iter()
            .map(|p| {
                let (kind, args) = node(p)?;
                if kind != K_PARAM {
                    return Err(malformed("expected param node"));
                }
                let [name, value] = args else {
                    return Err(malformed("param node takes name and value"));
                };
                Ok(Param::new(
                    string_arg(name, "param name")?,
                    string_arg(value, "param value")?,
                ))
            })
            .collect()
    }
}

fn name_class(v: &Json) -> Result<NamePattern, SchemaError> {
    let (kind, args) = node(v)?;
    match (kind, args) {
        (K_NAME, [ns, name]) => Ok(NamePattern::name(
            string_arg(ns, "name namespace")?,
            string_arg(name, "local name")?,
        )),
        (K_NAME_CHOICE, [a, b]) => Ok(NamePattern::choice(name_class(a)?, name_class(b)?)),
        (K_NS_NAME, [ns]) => Ok(NamePattern::ns_name(string_arg(ns, "nsName namespace")?, None)),
        (K_NS_NAME, [ns, except]) => Ok(NamePattern::ns_name(
            string_arg(ns, "nsName namespace")?,
            Some(name_class(except)?),
        )),
        (K_ANY_NAME, []) => Ok(NamePattern::any_name(None)),
        (K_ANY_NAME, [except]) => Ok(NamePattern::any_name(Some(name_class(except)?))),
        _ => Err(malformed(format!("bad name-class node of kind {kind}"))),
    }
}

fn malformed(msg: impl Into<String>) -> SchemaError {
    SchemaError::Malformed(msg.into())
}

fn string_arg<'a>(v: &'a Json, what: &str) -> Result<&'a str, SchemaError> {
    v.as_str()
        .ok_or_else(|| malformed(format!("expected a string for {what}")))
}

/// Split `[kind, ...args]`, rejecting the array marker (callers that expect
/// an array use [`items`]).
fn node(v: &Json) -> Result<(u64, &[Json]), SchemaError> {
    let arr = v
        .as_array()
        .ok_or_else(|| malformed("pattern node must be an array"))?;
    let kind = arr
        .first()
        .and_then(Json::as_u64)
        .ok_or_else(|| malformed("pattern node must start with a numeric kind"))?;
    if kind == K_ARRAY {
        return Err(malformed("unexpected array marker"));
    }
    Ok((kind, &arr[1..]))
}

/// The elements of an array-marked node `[0, ...items]`.
fn items(v: &Json) -> Result<&[Json], SchemaError> {
    let arr = v
        .as_array()
        .ok_or_else(|| malformed("expected an array node"))?;
    match arr.first().and_then(Json::as_u64) {
        Some(K_ARRAY) => Ok(&arr[1..]),
        _ => Err(malformed("expected an array marker")),
    }
}
