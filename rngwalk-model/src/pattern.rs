//! The simplified pattern tree.
//!
//! Patterns live in a flat arena indexed by [`PatId`]; `Ref` nodes carry an
//! index into the grammar's definition table rather than a pointer, which
//! keeps the (cyclic) grammar graph representable without interior
//! mutability.  A [`PatternBuilder`] constructs the arena; [`Grammar`] is the
//! immutable result after the resolution and preparation passes have run.

use crate::datatype::{Datatype, Datatypes, DatatypeValues, Param};
use crate::name::{EName, NamePattern};
use crate::resolver::NameResolver;
use crate::SchemaError;
use fnv::FnvHashMap;
use std::collections::BTreeSet;

/// Stable identifier of one pattern node; the node's index in the arena.
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Copy, Clone, Debug)]
pub struct PatId(u32);

impl PatId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> PatId {
        PatId(index as u32)
    }
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub struct DefineId(u32);

impl DefineId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of the simplified pattern tree.
#[derive(Clone, Debug)]
pub enum Pat {
    /// Matches the empty sequence (and, leniently, whitespace-only text).
    Empty,
    /// Matches any text run.
    Text,
    /// Matches nothing; surfaces only as a dead branch.
    NotAllowed,
    /// Matches a single text run equal, per the datatype, to a precomputed
    /// value.
    Value(Box<ValuePat>),
    /// Matches text accepted by a datatype and all its facets.
    Data(Box<DataPat>),
    /// Splits a text run into whitespace-separated tokens, each matched
    /// against the content pattern in order.
    List(PatId),
    Attribute(Box<NamePattern>, PatId),
    Element(Box<NamePattern>, PatId),
    OneOrMore(PatId),
    /// Sequence: first operand, then second.
    Group(PatId, PatId),
    /// Arbitrary interleaving of events from the two operands.
    Interleave(PatId, PatId),
    Choice(PatId, PatId),
    /// Reference to a named definition; resolved in place by the resolution
    /// pass.
    Ref(RefTarget),
}

#[derive(Clone, Debug)]
pub enum RefTarget {
    Unresolved(String),
    Resolved(DefineId),
}

#[derive(Clone, Debug)]
pub struct ValuePat {
    pub datatype: Datatypes,
    /// The precomputed value-space form of `raw`.
    pub value: DatatypeValues,
    pub raw: String,
    /// Namespace in scope for the raw form (QName-like datatypes).
    pub ns: String,
    pub library: String,
    pub type_name: String,
}

#[derive(Clone, Debug)]
pub struct DataPat {
    pub datatype: Datatypes,
    pub library: String,
    pub type_name: String,
    /// The raw facet parameters, kept for re-serialization; their checked
    /// form is baked into `datatype`.
    pub params: Vec<Param>,
    /// Values matched by this pattern are rejected.
    pub except: Option<PatId>,
}

#[derive(Clone, Debug)]
pub struct Define {
    pub name: String,
    pub body: PatId,
}

/// An immutable, prepared grammar: the pattern arena, definition table and
/// the indexes computed by the preparation pass.  Safe to share between
/// walkers on any number of threads.
#[derive(Clone, Debug)]
pub struct Grammar {
    patterns: Vec<Pat>,
    paths: Vec<Box<str>>,
    defines: Vec<Define>,
    start: PatId,
    /// Namespace URIs appearing in name classes anywhere in the grammar.
    namespaces: Vec<String>,
    /// `(uri, local-name)` to the element patterns with that (simple) name,
    /// for misplaced-element recovery.
    element_index: FnvHashMap<EName, Vec<PatId>>,
    /// Per pattern: does the subtree (resolving refs, not crossing element
    /// boundaries) contain an attribute pattern?
    has_attributes: Vec<bool>,
    warnings: Vec<String>,
}

impl Grammar {
    pub fn pat(&self, id: PatId) -> &Pat {
        &self.patterns[id.index()]
    }

    /// Origin path of the pattern in the source schema, when recorded;
    /// empty otherwise.
    pub fn path(&self, id: PatId) -> &str {
        &self.paths[id.index()]
    }

    pub fn start(&self) -> PatId {
        self.start
    }

    pub fn defines(&self) -> &[Define] {
        &self.defines
    }

    pub fn define(&self, id: DefineId) -> &Define {
        &self.defines[id.index()]
    }

    /// Follow `Ref` indirection to the pattern a walker should actually be
    /// built from.  Trivial for every other node kind.
    pub fn body_of(&self, id: PatId) -> PatId {
        let mut id = id;
        let mut hops = 0;
        while let Pat::Ref(target) = &self.patterns[id.index()] {
            match target {
                RefTarget::Resolved(def) => id = self.defines[def.index()].body,
                RefTarget::Unresolved(name) => {
                    unreachable!("unresolved ref {name:?} survived grammar construction")
                }
            }
            hops += 1;
            assert!(hops <= self.defines.len(), "cyclic chain of empty refs");
        }
        id
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Element patterns whose (simple) name class admits `(ns, name)`.
    /// Elements with `NsName`/`AnyName` classes are not indexed.
    pub fn elements_named(&self, ns: &str, name: &str) -> &[PatId] {
        self.element_index
            .get(&EName::new(ns, name))
            .map(|v| &v[..])
            .unwrap_or(&[])
    }

    pub fn has_attributes(&self, id: PatId) -> bool {
        self.has_attributes[id.index()]
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Constructs a pattern arena bottom-up.  This is the target API for the
/// external simplification pipeline and for the schema JSON reader.
///
/// Children must be created before their parents; `reference` breaks cycles
/// through the definition table.  `finish` runs the resolution and
/// preparation passes and yields the immutable [`Grammar`].
#[derive(Default, Debug)]
pub struct PatternBuilder {
    patterns: Vec<Pat>,
    paths: Vec<Box<str>>,
    defines: Vec<Define>,
    define_index: FnvHashMap<String, DefineId>,
    empty: Option<PatId>,
    text: Option<PatId>,
    not_allowed: Option<PatId>,
    warnings: Vec<String>,
}

impl PatternBuilder {
    pub fn new() -> PatternBuilder {
        PatternBuilder::default()
    }

    fn push(&mut self, pat: Pat) -> PatId {
        let id = PatId(u32::try_from(self.patterns.len()).expect("pattern arena overflow"));
        self.patterns.push(pat);
        self.paths.push(Box::from(""));
        id
    }

    pub fn empty(&mut self) -> PatId {
        if let Some(id) = self.empty {
            return id;
        }
        let id = self.push(Pat::Empty);
        self.empty = Some(id);
        id
    }

    pub fn text(&mut self) -> PatId {
        if let Some(id) = self.text {
            return id;
        }
        let id = self.push(Pat::Text);
        self.text = Some(id);
        id
    }

    pub fn not_allowed(&mut self) -> PatId {
        if let Some(id) = self.not_allowed {
            return id;
        }
        let id = self.push(Pat::NotAllowed);
        self.not_allowed = Some(id);
        id
    }

    /// A `Value` pattern.  The raw lexical form is parsed into the datatype's
    /// value space now; QName-like datatypes see a synthetic resolver whose
    /// default prefix is bound to `ns`.
    pub fn value(
        &mut self,
        library: &str,
        type_name: &str,
        raw: &str,
        ns: &str,
    ) -> Result<PatId, SchemaError> {
        let datatype = Datatypes::compile(library, type_name, &[], &mut self.warnings)?;
        let value = if datatype.needs_context() {
            let resolver = NameResolver::for_value(ns);
            datatype.parse_value(raw, Some(&resolver))?
        } else {
            datatype.parse_value(raw, None)?
        };
        Ok(self.push(Pat::Value(Box::new(ValuePat {
            datatype,
            value,
            raw: raw.to_string(),
            ns: ns.to_string(),
            library: library.to_string(),
            type_name: type_name.to_string(),
        }))))
    }

    /// A `Data` pattern; facet parameters are checked here.
    pub fn data(
        &mut self,
        library: &str,
        type_name: &str,
        params: &[Param],
        except: Option<PatId>,
    ) -> Result<PatId, SchemaError> {
        let datatype = Datatypes::compile(library, type_name, params, &mut self.warnings)?;
        Ok(self.push(Pat::Data(Box::new(DataPat {
            datatype,
            library: library.to_string(),
            type_name: type_name.to_string(),
            params: params.to_vec(),
            except,
        }))))
    }

    pub fn list(&mut self, content: PatId) -> PatId {
        self.push(Pat::List(content))
    }

    pub fn attribute(&mut self, name: NamePattern, content: PatId) -> PatId {
        self.push(Pat::Attribute(Box::new(name), content))
    }

    pub fn element(&mut self, name: NamePattern, content: PatId) -> PatId {
        self.push(Pat::Element(Box::new(name), content))
    }

    pub fn one_or_more(&mut self, content: PatId) -> PatId {
        self.push(Pat::OneOrMore(content))
    }

    pub fn group(&mut self, a: PatId, b: PatId) -> PatId {
        self.push(Pat::Group(a, b))
    }

    pub fn interleave(&mut self, a: PatId, b: PatId) -> PatId {
        self.push(Pat::Interleave(a, b))
    }

    pub fn choice(&mut self, a: PatId, b: PatId) -> PatId {
        self.push(Pat::Choice(a, b))
    }

    pub fn define(&mut self, name: &str, body: PatId) -> Result<DefineId, SchemaError> {
        if self.define_index.contains_key(name) {
            return Err(SchemaError::DuplicateDefinition(name.to_string()));
        }
        let id = DefineId(u32::try_from(self.defines.len()).expect("define table overflow"));
        self.defines.push(Define {
            name: name.to_string(),
            body,
        });
        self.define_index.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn reference(&mut self, name: &str) -> PatId {
        self.push(Pat::Ref(RefTarget::Unresolved(name.to_string())))
    }

    /// Record the origin path of a pattern, for debugging and error output.
    pub fn set_path(&mut self, id: PatId, path: &str) {
        self.paths[id.index()] = Box::from(path);
    }

    /// Run the resolution and preparation passes and produce the grammar.
    pub fn finish(self, start: PatId) -> Result<Grammar, SchemaError> {
        let PatternBuilder {
            mut patterns,
            paths,
            defines,
            define_index,
            warnings,
            ..
        } = self;

        // Resolution: bind every Ref to its Define.  The pass is a linear
        // scan of the arena; it never needs to cross ref/define boundaries
        // because defines are registered in the same table.
        let mut unresolved = Vec::new();
        for pat in &mut patterns {
            if let Pat::Ref(target @ RefTarget::Unresolved(_)) = pat {
                let name = match target {
                    RefTarget::Unresolved(name) => name.clone(),
                    RefTarget::Resolved(_) => unreachable!(),
                };
                match define_index.get(&name) {
                    Some(&def) => *target = RefTarget::Resolved(def),
                    None => unresolved.push(name),
                }
            }
        }
        if !unresolved.is_empty() {
            unresolved.sort();
            unresolved.dedup();
            return Err(SchemaError::UnresolvedReferences(unresolved));
        }

        // Preparation: collect name-class namespaces, the attribute flags
        // and the element index used by misplaced-element recovery.
        let mut namespaces = BTreeSet::new();
        let mut element_index: FnvHashMap<EName, Vec<PatId>> = FnvHashMap::default();
        for (i, pat) in patterns.iter().enumerate() {
            let id = PatId(i as u32);
            match pat {
                Pat::Element(nc, _) => {
                    nc.collect_namespaces(&mut namespaces);
                    if let Some(names) = nc.to_names() {
                        for name in names {
                            element_index.entry(name).or_default().push(id);
                        }
                    }
                }
                Pat::Attribute(nc, _) => nc.collect_namespaces(&mut namespaces),
                _ => {}
            }
        }

        let mut has_attributes = vec![None; patterns.len()];
        for i in 0..patterns.len() {
            compute_has_attributes(&patterns, &defines, PatId(i as u32), &mut has_attributes);
        }
        let has_attributes = has_attributes
            .into_iter()
            .map(|v| v.expect("attribute flag computed for every pattern"))
            .collect();

        log::debug!(
            "prepared grammar: {} patterns, {} defines, {} namespaces",
            patterns.len(),
            defines.len(),
            namespaces.len()
        );

        Ok(Grammar {
            patterns,
            paths,
            defines,
            start,
            namespaces: namespaces.into_iter().collect(),
            element_index,
            has_attributes,
            warnings,
        })
    }
}

// Attribute patterns are separable from element content, so the flag never
// needs to look through Element (an inner element's attributes are its own
// concern).  Refs are resolved through their define's body, exactly as the
// walkers resolve them at run time; a shared attribute group referenced from
// a composite must count as attribute-bearing.
fn compute_has_attributes(
    patterns: &[Pat],
    defines: &[Define],
    id: PatId,
    memo: &mut Vec<Option<bool>>,
) -> bool {
    if let Some(v) = memo[id.index()] {
        return v;
    }
    let v = match &patterns[id.index()] {
        Pat::Attribute(_, _) => true,
        Pat::Empty
        | Pat::Text
        | Pat::NotAllowed
        | Pat::Value(_)
        | Pat::Data(_)
        | Pat::List(_)
        | Pat::Element(_, _) => false,
        Pat::Ref(target) => {
            let body = match target {
                RefTarget::Resolved(def) => defines[def.index()].body,
                RefTarget::Unresolved(name) => {
                    unreachable!("unresolved ref {name:?} survived resolution")
                }
            };
            // a provisional entry breaks degenerate cycles of refs that
            // never pass through an element
            memo[id.index()] = Some(false);
            compute_has_attributes(patterns, defines, body, memo)
        }
        Pat::OneOrMore(p) => compute_has_attributes(patterns, defines, *p, memo),
        Pat::Group(a, b) | Pat::Interleave(a, b) | Pat::Choice(a, b) => {
            compute_has_attributes(patterns, defines, *a, memo)
                || compute_has_attributes(patterns, defines, *b, memo)
        }
    };
    memo[id.index()] = Some(v);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn leaves_are_interned() {
        let mut b = PatternBuilder::new();
        assert_eq!(b.empty(), b.empty());
        assert_eq!(b.text(), b.text());
        assert_ne!(b.empty(), b.text());
    }

    #[test]
    fn unresolved_ref_reported() {
        let mut b = PatternBuilder::new();
        let r = b.reference("missing");
        let e = b.element(NamePattern::name("", "root"), r);
        let res = b.finish(e);
        assert_matches!(res, Err(SchemaError::UnresolvedReferences(names)) => {
            assert_eq!(names, vec!["missing".to_string()]);
        });
    }

    #[test]
    fn duplicate_define_rejected() {
        let mut b = PatternBuilder::new();
        let empty = b.empty();
        b.define("d", empty).unwrap();
        assert_matches!(
            b.define("d", empty),
            Err(SchemaError::DuplicateDefinition(_))
        );
    }

    #[test]
    fn ref_resolution_and_body_of() {
        let mut b = PatternBuilder::new();
        let empty = b.empty();
        let inner = b.element(NamePattern::name("", "inner"), empty);
        b.define("inner", inner).unwrap();
        let r = b.reference("inner");
        let root = b.element(NamePattern::name("", "root"), r);
        let g = b.finish(root).unwrap();
        assert_eq!(g.body_of(r), inner);
        assert_matches!(g.pat(g.body_of(r)), Pat::Element(_, _));
    }

    #[test]
    fn recursive_grammar_resolves() {
        // start = a; a = element a { a? }
        let mut b = PatternBuilder::new();
        let r = b.reference("a");
        let empty = b.empty();
        let opt = b.choice(r, empty);
        let elem = b.element(NamePattern::name("", "a"), opt);
        b.define("a", elem).unwrap();
        let start = b.reference("a");
        let g = b.finish(start).unwrap();
        assert_eq!(g.body_of(start), elem);
    }

    #[test]
    fn attribute_flag() {
        let mut b = PatternBuilder::new();
        let text = b.text();
        let attr = b.attribute(NamePattern::name("", "a"), text);
        let inner_t = b.text();
        let inner = b.element(NamePattern::name("", "inner"), inner_t);
        let grp = b.group(attr, inner);
        let root = b.element(NamePattern::name("", "root"), grp);
        let g = b.finish(root).unwrap();
        assert!(g.has_attributes(grp));
        assert!(!g.has_attributes(inner));
        assert!(!g.has_attributes(root));
    }

    #[test]
    fn attribute_flag_resolves_refs() {
        // a shared attribute group referenced from a composite counts as
        // attribute-bearing for the enclosing pattern
        let mut b = PatternBuilder::new();
        let t = b.text();
        let attr = b.attribute(NamePattern::name("", "a"), t);
        b.define("attrs", attr).unwrap();
        let r = b.reference("attrs");
        let text = b.text();
        let grp = b.group(r, text);
        let root = b.element(NamePattern::name("", "root"), grp);
        let g = b.finish(root).unwrap();
        assert!(g.has_attributes(r));
        assert!(g.has_attributes(grp));
        assert!(!g.has_attributes(root));
    }

    #[test]
    fn element_index_covers_simple_names_only() {
        // NsName elements cannot be enumerated, so they are not indexed
        let mut b = PatternBuilder::new();
        let t1 = b.text();
        let named = b.element(
            NamePattern::choice(NamePattern::name("", "x"), NamePattern::name("", "y")),
            t1,
        );
        let t2 = b.text();
        let wild = b.element(NamePattern::ns_name("urn:w", None), t2);
        let grp = b.group(named, wild);
        let root = b.element(NamePattern::name("", "root"), grp);
        let g = b.finish(root).unwrap();
        assert_eq!(g.elements_named("", "x"), &[named]);
        assert_eq!(g.elements_named("", "y"), &[named]);
        assert!(g.elements_named("urn:w", "anything").is_empty());
        assert_eq!(g.namespaces(), &["".to_string(), "urn:w".to_string()]);
    }
}
