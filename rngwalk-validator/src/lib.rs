//! Streaming validation of abstract XML parse events against a simplified
//! Relax NG pattern tree.
//!
//! The crate does not tokenize XML.  A caller (an editor, a SAX bridge, a
//! test harness) feeds [`Event`]s in document order to a [`GrammarWalker`]
//! and may ask, at every step, which events would be acceptable next
//! ([`GrammarWalker::possible`]) and whether the document could end here
//! ([`GrammarWalker::can_end`]).  Walkers are cheap to clone, so an editor
//! can snapshot validation state and speculate.
//!
//! One [`Walker`] exists per live pattern node; the dispatch is a `match` on
//! a closed set of walker kinds, mirroring the closed set of pattern kinds.
//! `Ref` patterns never get a walker of their own: building a walker for a
//! `Ref` builds the walker of the referenced definition's body.

use fnv::FnvHashSet;
use rngwalk_model::datatype::builtin::{is_xml_whitespace, is_xml_whitespace_str};
use rngwalk_model::datatype::{Datatype, Datatypes, Namespaces};
use rngwalk_model::event::{Event, Possibility, PossibilitySet, ValueShape};
use rngwalk_model::name::{EName, NamePattern};
use rngwalk_model::pattern::{DataPat, Grammar, Pat, PatId, ValuePat};
use rngwalk_model::resolver::NameResolver;
use std::sync::Arc;
use thiserror::Error;

/// A problem found in the event stream.  Names are reported as
/// [`NamePattern`] values, not prefixed strings, so the caller can render
/// them under its own prefix policy.
#[derive(PartialEq, Eq, Clone, Debug, Error)]
pub enum ValidationError {
    #[error("element {0} not allowed here")]
    UnexpectedElement(NamePattern),
    #[error("unexpected end tag {0}")]
    UnexpectedEndTag(NamePattern),
    #[error("attribute {0} not allowed here")]
    UnexpectedAttribute(NamePattern),
    #[error("text not allowed here")]
    UnexpectedText,
    #[error("unexpected {0}")]
    UnexpectedEvent(&'static str),
    #[error("attribute {0} required")]
    MissingAttribute(NamePattern),
    #[error("element {0} required")]
    MissingElement(NamePattern),
    #[error("element {0} is not finished")]
    ElementUnfinished(NamePattern),
    #[error("bad value {value:?}: expected {expected}")]
    BadValue { value: String, expected: String },
    #[error("text content required: expected {expected}")]
    TextMissing { expected: String },
    #[error("no alternative matches")]
    ChoiceExhausted,
}

/// Outcome of dispatching one event to one walker.
#[derive(Debug)]
pub enum FireResult {
    /// Consumed cleanly; state advanced.
    Ok,
    /// This walker cannot consume the event at all, and its state is
    /// untouched.  Composite walkers use this to route events between
    /// subwalkers; it is converted to a validation error only at the top of
    /// the walker tree.
    NoMatch,
    /// Consumed, but with validation errors; the walker has advanced into a
    /// recovery state and the caller may continue.
    Errors(Vec<ValidationError>),
}

impl FireResult {
    pub fn is_no_match(&self) -> bool {
        matches!(self, FireResult::NoMatch)
    }
}

/// Mutable matching state for one pattern node.
///
/// Owned by the caller, advanced by [`Walker::fire_event`].  A walker only
/// ever observes the pattern it was created from; the [`Grammar`] is passed
/// into every operation rather than stored, which keeps walkers `'static`
/// and cheap to clone.
#[derive(Clone, Debug)]
pub struct Walker {
    pat: PatId,
    state: WalkerState,
    /// Most recent possibility set; invalidated by any state transition and
    /// deliberately carried across clones.
    possible_cache: Option<PossibilitySet>,
    /// Set once `leaveStartTag` has been seen in the enclosing start tag; no
    /// further attribute events are offered or accepted.
    suppressed: bool,
}

#[derive(Clone, Debug)]
enum WalkerState {
    Empty,
    Text,
    NotAllowed,
    Value {
        matched: bool,
    },
    Data {
        matched: bool,
    },
    List {
        content: Box<Walker>,
    },
    Attribute {
        seen: Option<EName>,
        content: Option<Box<Walker>>,
        consumed: bool,
    },
    Element {
        phase: ElementPhase,
        name: Option<EName>,
        content: Option<Box<Walker>>,
    },
    OneOrMore {
        current: Box<Walker>,
    },
    Group {
        a: Box<Walker>,
        b: Box<Walker>,
        /// Set once `b` has consumed a non-attribute event; `a` is then
        /// closed to further content.
        a_done: bool,
    },
    Interleave {
        a: Box<Walker>,
        b: Box<Walker>,
        /// Which side consumed the last content event; ties are broken
        /// towards the other side to keep both branches live.
        last_was_a: bool,
        /// While a child element is open on one side, every event belongs to
        /// that side: `(side is a, nesting depth)`.
        open: Option<(bool, u32)>,
    },
    Choice {
        a: Option<Box<Walker>>,
        b: Option<Box<Walker>>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ElementPhase {
    BeforeStart,
    InStartTag,
    InContent,
    Done,
}

fn value_pat(g: &Grammar, pat: PatId) -> &ValuePat {
    match g.pat(pat) {
        Pat::Value(v) => v,
        other => unreachable!("value walker over {other:?}"),
    }
}

fn data_pat(g: &Grammar, pat: PatId) -> &DataPat {
    match g.pat(pat) {
        Pat::Data(d) => d,
        other => unreachable!("data walker over {other:?}"),
    }
}

fn attribute_parts(g: &Grammar, pat: PatId) -> (&NamePattern, PatId) {
    match g.pat(pat) {
        Pat::Attribute(nc, p) => (nc, *p),
        other => unreachable!("attribute walker over {other:?}"),
    }
}

fn element_parts(g: &Grammar, pat: PatId) -> (&NamePattern, PatId) {
    match g.pat(pat) {
        Pat::Element(nc, p) => (nc, *p),
        other => unreachable!("element walker over {other:?}"),
    }
}

fn one_or_more_content(g: &Grammar, pat: PatId) -> PatId {
    match g.pat(pat) {
        Pat::OneOrMore(p) => *p,
        other => unreachable!("oneOrMore walker over {other:?}"),
    }
}

fn context_for<'a>(
    datatype: &Datatypes,
    resolver: &'a NameResolver,
) -> Option<&'a dyn Namespaces> {
    if datatype.needs_context() {
        Some(resolver)
    } else {
        None
    }
}

/// Would a fresh walker over `pat` accept exactly this text run and then be
/// able to end?  Used for `Data` exceptions.
fn accepts_whole_text(g: &Grammar, resolver: &NameResolver, pat: PatId, value: &str) -> bool {
    let mut walker = Walker::new(g, pat);
    if value.is_empty() {
        return walker.can_end(g, false);
    }
    match walker.fire_event(
        g,
        resolver,
        &Event::Text {
            value: value.to_string(),
        },
    ) {
        FireResult::Ok => walker.can_end(g, false),
        _ => false,
    }
}

fn data_allows_empty(g: &Grammar, resolver: &NameResolver, pat: PatId) -> bool {
    let dp = data_pat(g, pat);
    if dp.datatype.disallows("", None) {
        return false;
    }
    match dp.except {
        Some(except) => !accepts_whole_text(g, resolver, except, ""),
        None => true,
    }
}

/// Human-readable description of what text a content pattern expects, for
/// bad-value diagnostics.
fn describe_text_pattern(g: &Grammar, pat: PatId) -> String {
    match g.pat(pat) {
        Pat::Value(v) => format!("{:?}", v.raw),
        Pat::Data(d) => d.type_name.clone(),
        Pat::List(p) => format!("list of {}", describe_text_pattern(g, *p)),
        Pat::Choice(a, b) => format!(
            "{} or {}",
            describe_text_pattern(g, *a),
            describe_text_pattern(g, *b)
        ),
        Pat::Ref(_) => describe_text_pattern(g, g.body_of(pat)),
        _ => "text".to_string(),
    }
}

fn bad_value(g: &Grammar, content_pat: PatId, value: &str) -> ValidationError {
    ValidationError::BadValue {
        value: value.to_string(),
        expected: describe_text_pattern(g, content_pat),
    }
}

/// Fire an attribute's value into its content walker.  The attribute name
/// was already matched, so a value that does not fit is an error, never a
/// `NoMatch`.
fn fire_attribute_value(
    g: &Grammar,
    resolver: &NameResolver,
    content: &mut Walker,
    value: &str,
) -> FireResult {
    if value.is_empty() {
        return if content.can_end(g, false) {
            FireResult::Ok
        } else {
            FireResult::Errors(vec![bad_value(g, content.pat, value)])
        };
    }
    match content.fire_event(
        g,
        resolver,
        &Event::Text {
            value: value.to_string(),
        },
    ) {
        FireResult::Ok => {
            if content.can_end(g, false) {
                FireResult::Ok
            } else {
                FireResult::Errors(vec![bad_value(g, content.pat, value)])
            }
        }
        FireResult::NoMatch => FireResult::Errors(vec![bad_value(g, content.pat, value)]),
        FireResult::Errors(e) => FireResult::Errors(e),
    }
}

impl Walker {
    /// Build a walker for `pat`.  `Ref` indirection is flattened here: the
    /// walker returned for a reference is the walker of the definition's
    /// body, so event dispatch never pays for the indirection.
    pub fn new(g: &Grammar, pat: PatId) -> Walker {
        let pat = g.body_of(pat);
        let state = match g.pat(pat) {
            Pat::Empty => WalkerState::Empty,
            Pat::Text => WalkerState::Text,
            Pat::NotAllowed => WalkerState::NotAllowed,
            Pat::Value(_) => WalkerState::Value { matched: false },
            Pat::Data(_) => WalkerState::Data { matched: false },
            Pat::List(p) => WalkerState::List {
                content: Box::new(Walker::new(g, *p)),
            },
            Pat::Attribute(_, _) => WalkerState::Attribute {
                seen: None,
                content: None,
                consumed: false,
            },
            // content walker is created at enterStartTag; this laziness is
            // what makes recursive grammars finite
            Pat::Element(_, _) => WalkerState::Element {
                phase: ElementPhase::BeforeStart,
                name: None,
                content: None,
            },
            Pat::OneOrMore(p) => WalkerState::OneOrMore {
                current: Box::new(Walker::new(g, *p)),
            },
            Pat::Group(a, b) => WalkerState::Group {
                a: Box::new(Walker::new(g, *a)),
                b: Box::new(Walker::new(g, *b)),
                a_done: false,
            },
            Pat::Interleave(a, b) => WalkerState::Interleave {
                a: Box::new(Walker::new(g, *a)),
                b: Box::new(Walker::new(g, *b)),
                last_was_a: false,
                open: None,
            },
            Pat::Choice(a, b) => WalkerState::Choice {
                a: Some(Box::new(Walker::new(g, *a))),
                b: Some(Box::new(Walker::new(g, *b))),
            },
            Pat::Ref(_) => unreachable!("body_of resolves refs"),
        };
        Walker {
            pat,
            state,
            possible_cache: None,
            suppressed: false,
        }
    }

    /// The pattern this walker matches.
    pub fn pattern(&self) -> PatId {
        self.pat
    }

    /// Advance on one event.  A `NoMatch` result leaves the walker
    /// untouched.
    pub fn fire_event(&mut self, g: &Grammar, resolver: &NameResolver, ev: &Event) -> FireResult {
        let res = self.fire_inner(g, resolver, ev);
        if !res.is_no_match() {
            self.possible_cache = None;
        }
        res
    }

    fn fire_inner(&mut self, g: &Grammar, resolver: &NameResolver, ev: &Event) -> FireResult {
        let pat = self.pat;
        let suppressed = self.suppressed;
        match &mut self.state {
            WalkerState::Empty => match ev {
                Event::Text { value } if is_xml_whitespace_str(value) => FireResult::Ok,
                _ => FireResult::NoMatch,
            },
            WalkerState::Text => match ev {
                Event::Text { .. } => FireResult::Ok,
                _ => FireResult::NoMatch,
            },
            WalkerState::NotAllowed => FireResult::NoMatch,
            WalkerState::Value { matched } => match ev {
                Event::Text { value } if !*matched => {
                    let vp = value_pat(g, pat);
                    let ctx = context_for(&vp.datatype, resolver);
                    if vp.datatype.equal(value, &vp.value, ctx) {
                        *matched = true;
                        FireResult::Ok
                    } else {
                        FireResult::NoMatch
                    }
                }
                _ => FireResult::NoMatch,
            },
            WalkerState::Data { matched } => match ev {
                Event::Text { value } if !*matched => {
                    let dp = data_pat(g, pat);
                    let ctx = context_for(&dp.datatype, resolver);
                    if dp.datatype.disallows(value, ctx) {
                        return FireResult::NoMatch;
                    }
                    // the exception is tried only once the base type matches
                    if let Some(except) = dp.except {
                        if accepts_whole_text(g, resolver, except, value) {
                            return FireResult::NoMatch;
                        }
                    }
                    *matched = true;
                    FireResult::Ok
                }
                _ => FireResult::NoMatch,
            },
            WalkerState::List { content } => match ev {
                Event::Text { value } => {
                    let mut probe = content.clone();
                    let mut errors = Vec::new();
                    for token in value.split(is_xml_whitespace).filter(|t| !t.is_empty()) {
                        match probe.fire_event(
                            g,
                            resolver,
                            &Event::Text {
                                value: token.to_string(),
                            },
                        ) {
                            FireResult::Ok => {}
                            FireResult::NoMatch => return FireResult::NoMatch,
                            FireResult::Errors(e) => errors.extend(e),
                        }
                    }
                    *content = probe;
                    if errors.is_empty() {
                        FireResult::Ok
                    } else {
                        FireResult::Errors(errors)
                    }
                }
                _ => FireResult::NoMatch,
            },
            WalkerState::Attribute {
                seen,
                content,
                consumed,
            } => {
                let (nc, content_pat) = attribute_parts(g, pat);
                match ev {
                    Event::AttributeName { ns, name }
                        if seen.is_none() && !suppressed && nc.matches(ns, name) =>
                    {
                        *seen = Some(EName::new(ns.clone(), name.clone()));
                        *content = Some(Box::new(Walker::new(g, content_pat)));
                        FireResult::Ok
                    }
                    Event::AttributeValue { value } if seen.is_some() && !*consumed => {
                        *consumed = true;
                        fire_attribute_value(g, resolver, content.as_mut().unwrap(), value)
                    }
                    Event::AttributeNameAndValue { ns, name, value }
                        if seen.is_none() && !suppressed && nc.matches(ns, name) =>
                    {
                        *seen = Some(EName::new(ns.clone(), name.clone()));
                        let mut walker = Box::new(Walker::new(g, content_pat));
                        let res = fire_attribute_value(g, resolver, &mut walker, value);
                        *content = Some(walker);
                        *consumed = true;
                        res
                    }
                    _ => FireResult::NoMatch,
                }
            }
            WalkerState::Element {
                phase,
                name,
                content,
            } => {
                let (nc, content_pat) = element_parts(g, pat);
                match phase {
                    ElementPhase::BeforeStart => match ev {
                        Event::EnterStartTag { ns, name: local } if nc.matches(ns, local) => {
                            *name = Some(EName::new(ns.clone(), local.clone()));
                            *content = Some(Box::new(Walker::new(g, content_pat)));
                            *phase = ElementPhase::InStartTag;
                            FireResult::Ok
                        }
                        Event::StartTagAndAttributes {
                            ns,
                            name: local,
                            attributes,
                        } if nc.matches(ns, local) => {
                            // expanded internally: enterStartTag, each
                            // attribute, leaveStartTag; error positions are
                            // coarser than with the expanded form
                            let mut walker = Box::new(Walker::new(g, content_pat));
                            let mut errors = Vec::new();
                            for attr in attributes {
                                let attr_ev = Event::AttributeNameAndValue {
                                    ns: attr.ns.clone(),
                                    name: attr.name.clone(),
                                    value: attr.value.clone(),
                                };
                                match walker.fire_event(g, resolver, &attr_ev) {
                                    FireResult::Ok => {}
                                    FireResult::NoMatch => {
                                        errors.push(ValidationError::UnexpectedAttribute(
                                            NamePattern::name(attr.ns.clone(), attr.name.clone()),
                                        ));
                                    }
                                    FireResult::Errors(e) => errors.extend(e),
                                }
                            }
                            errors.extend(walker.end(g, true));
                            walker.suppress_attributes(g);
                            *name = Some(EName::new(ns.clone(), local.clone()));
                            *content = Some(walker);
                            *phase = ElementPhase::InContent;
                            if errors.is_empty() {
                                FireResult::Ok
                            } else {
                                FireResult::Errors(errors)
                            }
                        }
                        Event::Text { value } if is_xml_whitespace_str(value) => FireResult::Ok,
                        _ => FireResult::NoMatch,
                    },
                    ElementPhase::InStartTag => match ev {
                        Event::LeaveStartTag => {
                            let walker = content.as_mut().unwrap();
                            let errors = walker.end(g, true);
                            walker.suppress_attributes(g);
                            *phase = ElementPhase::InContent;
                            if errors.is_empty() {
                                FireResult::Ok
                            } else {
                                FireResult::Errors(errors)
                            }
                        }
                        Event::AttributeName { .. }
                        | Event::AttributeValue { .. }
                        | Event::AttributeNameAndValue { .. } => {
                            content.as_mut().unwrap().fire_event(g, resolver, ev)
                        }
                        _ => FireResult::NoMatch,
                    },
                    ElementPhase::InContent => {
                        let walker = content.as_mut().unwrap();
                        match ev {
                            Event::EndTag { ns, name: local } => {
                                // an inner element may still be open; it gets
                                // the end tag first
                                match walker.fire_event(g, resolver, ev) {
                                    FireResult::NoMatch => {
                                        let own = name.as_ref().unwrap();
                                        if own.ns == *ns && own.name == *local {
                                            let errors = walker.end(g, false);
                                            *phase = ElementPhase::Done;
                                            if errors.is_empty() {
                                                FireResult::Ok
                                            } else {
                                                FireResult::Errors(errors)
                                            }
                                        } else {
                                            FireResult::NoMatch
                                        }
                                    }
                                    res => res,
                                }
                            }
                            Event::Text { value } if is_xml_whitespace_str(value) => {
                                // whitespace between child elements is
                                // tolerated even when the content pattern has
                                // no text position
                                match walker.fire_event(g, resolver, ev) {
                                    FireResult::NoMatch => FireResult::Ok,
                                    res => res,
                                }
                            }
                            _ => walker.fire_event(g, resolver, ev),
                        }
                    }
                    ElementPhase::Done => match ev {
                        Event::Text { value } if is_xml_whitespace_str(value) => FireResult::Ok,
                        _ => FireResult::NoMatch,
                    },
                }
            }
            WalkerState::OneOrMore { current } => {
                match current.fire_event(g, resolver, ev) {
                    FireResult::NoMatch => {
                        // the current iteration cannot take the event; if it
                        // is complete, try a fresh one
                        if current.can_end(g, false) {
                            let mut fresh =
                                Box::new(Walker::new(g, one_or_more_content(g, pat)));
                            if suppressed {
                                fresh.suppress_attributes(g);
                            }
                            match fresh.fire_event(g, resolver, ev) {
                                FireResult::NoMatch => FireResult::NoMatch,
                                res => {
                                    *current = fresh;
                                    res
                                }
                            }
                        } else {
                            FireResult::NoMatch
                        }
                    }
                    res => res,
                }
            }
            WalkerState::Group { a, b, a_done } => {
                if *a_done {
                    return b.fire_event(g, resolver, ev);
                }
                match a.fire_event(g, resolver, ev) {
                    FireResult::NoMatch => {
                        if ev.is_attribute_event() {
                            // attributes are unordered across a sequence
                            b.fire_event(g, resolver, ev)
                        } else if a.can_end(g, false) {
                            match b.fire_event(g, resolver, ev) {
                                FireResult::NoMatch => FireResult::NoMatch,
                                res => {
                                    *a_done = true;
                                    res
                                }
                            }
                        } else {
                            FireResult::NoMatch
                        }
                    }
                    res => res,
                }
            }
            WalkerState::Interleave {
                a,
                b,
                last_was_a,
                open,
            } => {
                if let Some((in_a, depth)) = open {
                    // a child element is open; the other side sees nothing
                    // until its matching end tag
                    let side = if *in_a { a } else { b };
                    let res = side.fire_event(g, resolver, ev);
                    if !res.is_no_match() {
                        match ev {
                            Event::EnterStartTag { .. } | Event::StartTagAndAttributes { .. } => {
                                *depth += 1
                            }
                            Event::EndTag { .. } => {
                                *depth -= 1;
                                if *depth == 0 {
                                    *open = None;
                                }
                            }
                            _ => {}
                        }
                    }
                    return res;
                }
                if ev.is_attribute_event() {
                    // restriction 7.3 makes the accepting side unique, so no
                    // tie-break state is involved
                    return match a.fire_event(g, resolver, ev) {
                        FireResult::NoMatch => b.fire_event(g, resolver, ev),
                        res => res,
                    };
                }
                let prefer_a = !*last_was_a;
                let opens_element = matches!(
                    ev,
                    Event::EnterStartTag { .. } | Event::StartTagAndAttributes { .. }
                );
                let (first, second) = if prefer_a { (a, b) } else { (b, a) };
                let (res, went_a) = match first.fire_event(g, resolver, ev) {
                    FireResult::NoMatch => match second.fire_event(g, resolver, ev) {
                        FireResult::NoMatch => return FireResult::NoMatch,
                        res => (res, !prefer_a),
                    },
                    res => (res, prefer_a),
                };
                *last_was_a = went_a;
                if opens_element {
                    *open = Some((went_a, 1));
                }
                res
            }
            WalkerState::Choice { a, b } => {
                let res_a = a
                    .as_mut()
                    .map(|w| w.fire_event(g, resolver, ev))
                    .unwrap_or(FireResult::NoMatch);
                let res_b = b
                    .as_mut()
                    .map(|w| w.fire_event(g, resolver, ev))
                    .unwrap_or(FireResult::NoMatch);
                match (res_a, res_b) {
                    (FireResult::NoMatch, FireResult::NoMatch) => FireResult::NoMatch,
                    (FireResult::NoMatch, res) => {
                        *a = None;
                        res
                    }
                    (res, FireResult::NoMatch) => {
                        *b = None;
                        res
                    }
                    (FireResult::Ok, FireResult::Ok) => FireResult::Ok,
                    (FireResult::Ok, FireResult::Errors(_)) => {
                        *b = None;
                        FireResult::Ok
                    }
                    (FireResult::Errors(_), FireResult::Ok) => {
                        *a = None;
                        FireResult::Ok
                    }
                    (FireResult::Errors(e1), FireResult::Errors(e2)) => {
                        FireResult::Errors(if e2.len() < e1.len() { e2 } else { e1 })
                    }
                }
            }
        }
    }

    /// Non-destructive terminality check.  `attribute=true` asks only
    /// whether attribute obligations are met (the `leaveStartTag` check);
    /// `attribute=false` is full terminality.
    pub fn can_end(&self, g: &Grammar, attribute: bool) -> bool {
        if attribute && !g.has_attributes(self.pat) {
            // nothing below can owe an attribute
            return true;
        }
        match &self.state {
            WalkerState::Empty | WalkerState::Text => true,
            WalkerState::NotAllowed => false,
            WalkerState::Value { matched } => *matched || value_pat(g, self.pat).raw.is_empty(),
            WalkerState::Data { matched } => {
                *matched || {
                    let resolver = NameResolver::new();
                    data_allows_empty(g, &resolver, self.pat)
                }
            }
            WalkerState::List { content } => content.can_end(g, attribute),
            WalkerState::Attribute { consumed, .. } => *consumed || self.suppressed,
            WalkerState::Element { phase, .. } => *phase == ElementPhase::Done,
            WalkerState::OneOrMore { current } => current.can_end(g, attribute),
            WalkerState::Group { a, b, .. } | WalkerState::Interleave { a, b, .. } => {
                a.can_end(g, attribute) && b.can_end(g, attribute)
            }
            WalkerState::Choice { a, b } => {
                a.as_ref().is_some_and(|w| w.can_end(g, attribute))
                    || b.as_ref().is_some_and(|w| w.can_end(g, attribute))
            }
        }
    }

    /// Assert terminality, reporting what is missing.  An empty vec means
    /// success.
    pub fn end(&mut self, g: &Grammar, attribute: bool) -> Vec<ValidationError> {
        if self.can_end(g, attribute) {
            return Vec::new();
        }
        match &mut self.state {
            WalkerState::Empty | WalkerState::Text => Vec::new(),
            WalkerState::NotAllowed => vec![ValidationError::ChoiceExhausted],
            WalkerState::Value { .. } | WalkerState::Data { .. } | WalkerState::List { .. } => {
                vec![ValidationError::TextMissing {
                    expected: describe_text_pattern(g, self.pat),
                }]
            }
            WalkerState::Attribute { .. } => {
                let (nc, _) = attribute_parts(g, self.pat);
                vec![ValidationError::MissingAttribute(nc.clone())]
            }
            WalkerState::Element { phase, .. } => {
                let (nc, _) = element_parts(g, self.pat);
                match phase {
                    ElementPhase::BeforeStart => {
                        vec![ValidationError::MissingElement(nc.clone())]
                    }
                    _ => vec![ValidationError::ElementUnfinished(nc.clone())],
                }
            }
            WalkerState::OneOrMore { current } => current.end(g, attribute),
            WalkerState::Group { a, b, .. } | WalkerState::Interleave { a, b, .. } => {
                let mut errors = a.end(g, attribute);
                errors.extend(b.end(g, attribute));
                errors
            }
            WalkerState::Choice { a, b } => {
                let errors_a = a.as_mut().map(|w| w.end(g, attribute));
                let errors_b = b.as_mut().map(|w| w.end(g, attribute));
                match (errors_a, errors_b) {
                    (Some(ea), Some(eb)) => {
                        if eb.len() < ea.len() {
                            eb
                        } else {
                            ea
                        }
                    }
                    (Some(e), None) | (None, Some(e)) => e,
                    (None, None) => vec![ValidationError::ChoiceExhausted],
                }
            }
        }
    }

    /// Declare that no further attribute events will arrive.  Propagates to
    /// subwalkers, stopping at element boundaries (an inner element's
    /// attributes are its own concern).
    pub fn suppress_attributes(&mut self, g: &Grammar) {
        if self.suppressed {
            return;
        }
        self.suppressed = true;
        if !g.has_attributes(self.pat) {
            return;
        }
        self.possible_cache = None;
        match &mut self.state {
            WalkerState::List { content } => content.suppress_attributes(g),
            WalkerState::OneOrMore { current } => current.suppress_attributes(g),
            WalkerState::Group { a, b, .. } | WalkerState::Interleave { a, b, .. } => {
                a.suppress_attributes(g);
                b.suppress_attributes(g);
            }
            WalkerState::Choice { a, b } => {
                for w in [a.as_mut(), b.as_mut()].into_iter().flatten() {
                    w.suppress_attributes(g);
                }
            }
            _ => {}
        }
    }

    /// The set of events acceptable next.  The returned set is fresh and
    /// owned by the caller; compact events and suppressed attribute events
    /// never appear in it.
    pub fn possible(&mut self, g: &Grammar) -> PossibilitySet {
        if self.possible_cache.is_none() {
            let set = self.compute_possible(g);
            self.possible_cache = Some(set);
        }
        self.possible_cache.as_ref().unwrap().clone()
    }

    fn compute_possible(&mut self, g: &Grammar) -> PossibilitySet {
        let pat = self.pat;
        let suppressed = self.suppressed;
        let mut set = PossibilitySet::default();
        match &mut self.state {
            WalkerState::Empty | WalkerState::NotAllowed => {}
            WalkerState::Text => {
                set.insert(Possibility::Text(ValueShape::Any));
            }
            WalkerState::Value { matched } => {
                if !*matched {
                    set.insert(Possibility::Text(ValueShape::Literal(
                        value_pat(g, pat).raw.clone(),
                    )));
                }
            }
            WalkerState::Data { matched } => {
                if !*matched {
                    set.insert(Possibility::Text(ValueShape::Any));
                }
            }
            WalkerState::List { content } => {
                set.extend(content.possible(g));
            }
            WalkerState::Attribute {
                seen,
                content,
                consumed,
            } => {
                if seen.is_none() {
                    if !suppressed {
                        let (nc, _) = attribute_parts(g, pat);
                        set.insert(Possibility::AttributeName(nc.clone()));
                    }
                } else if !*consumed {
                    for possibility in content.as_mut().unwrap().possible(g) {
                        if let Possibility::Text(shape) = possibility {
                            set.insert(Possibility::AttributeValue(shape));
                        }
                    }
                }
            }
            WalkerState::Element {
                phase,
                name,
                content,
            } => match phase {
                ElementPhase::BeforeStart => {
                    let (nc, _) = element_parts(g, pat);
                    set.insert(Possibility::EnterStartTag(nc.clone()));
                }
                ElementPhase::InStartTag => {
                    let walker = content.as_mut().unwrap();
                    set.extend(walker.possible(g).into_iter().filter(Possibility::is_attribute));
                    if walker.can_end(g, true) {
                        set.insert(Possibility::LeaveStartTag);
                    }
                }
                ElementPhase::InContent => {
                    let walker = content.as_mut().unwrap();
                    set.extend(walker.possible(g));
                    if walker.can_end(g, false) {
                        let own = name.as_ref().unwrap();
                        set.insert(Possibility::EndTag(NamePattern::name(
                            own.ns.clone(),
                            own.name.clone(),
                        )));
                    }
                }
                ElementPhase::Done => {}
            },
            WalkerState::OneOrMore { current } => {
                set.extend(current.possible(g));
                if current.can_end(g, false) {
                    let mut fresh = Walker::new(g, one_or_more_content(g, pat));
                    if suppressed {
                        fresh.suppress_attributes(g);
                    }
                    set.extend(fresh.possible(g));
                }
            }
            WalkerState::Group { a, b, a_done } => {
                if *a_done {
                    set.extend(b.possible(g));
                } else {
                    set.extend(a.possible(g));
                    if !suppressed && g.has_attributes(b.pat) {
                        set.extend(b.possible(g).into_iter().filter(Possibility::is_attribute));
                    }
                    if a.can_end(g, false) {
                        set.extend(b.possible(g));
                    }
                }
            }
            WalkerState::Interleave { a, b, open, .. } => match open {
                Some((true, _)) => set.extend(a.possible(g)),
                Some((false, _)) => set.extend(b.possible(g)),
                None => {
                    set.extend(a.possible(g));
                    set.extend(b.possible(g));
                }
            },
            WalkerState::Choice { a, b } => {
                for w in [a.as_mut(), b.as_mut()].into_iter().flatten() {
                    set.extend(w.possible(g));
                }
            }
        }
        set
    }
}

/// Which recovery mode a misplaced element put the validator into.
#[derive(Clone, Debug)]
enum RecoveryFrame {
    /// The misplaced element has exactly one definition in the schema: its
    /// subtree is validated against that definition while the enclosing
    /// walker is paused.
    Walking { walker: Walker, depth: u32 },
    /// Zero or several candidate definitions: the subtree is skipped
    /// wholesale.
    Ignoring { depth: u32 },
}

/// Validation façade: owns the root walker, the namespace context stack and
/// the misplaced-element recovery state.
///
/// `NoMatch` never escapes this type; an event no live walker accepts is
/// turned into validation errors plus a recovery transition, so a caller can
/// always keep feeding events.
#[derive(Clone)]
pub struct GrammarWalker {
    grammar: Arc<Grammar>,
    root: Walker,
    resolver: NameResolver,
    recovery: Vec<RecoveryFrame>,
    /// Set after an unexpected `attributeName`, so the orphaned value event
    /// that follows is dropped silently.
    skip_attribute_value: bool,
}

impl GrammarWalker {
    pub fn new(grammar: Arc<Grammar>) -> GrammarWalker {
        let root = Walker::new(&grammar, grammar.start());
        GrammarWalker {
            grammar,
            root,
            resolver: NameResolver::new(),
            recovery: Vec::new(),
            skip_attribute_value: false,
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// The current namespace context stack.
    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    // -- namespace context stack -------------------------------------------

    pub fn enter_context(&mut self) {
        self.resolver.enter_context();
    }

    pub fn enter_context_with_mapping<I>(&mut self, mapping: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.resolver.enter_context_with_mapping(mapping);
    }

    pub fn define_prefix(&mut self, prefix: &str, uri: &str) {
        self.resolver.define_prefix(prefix, uri);
    }

    pub fn leave_context(&mut self) {
        self.resolver.leave_context();
    }

    pub fn resolve_name(&self, qname: &str, attribute: bool) -> Option<EName> {
        self.resolver.resolve_name(qname, attribute)
    }

    pub fn unresolve_name(&self, ns: &str, name: &str) -> Option<String> {
        self.resolver.unresolve_name(ns, name)
    }

    // -- event dispatch ----------------------------------------------------

    /// Feed one event.  `Err` carries the validation errors the event
    /// provoked; the walker has advanced either way and the caller may
    /// continue with the next event.
    pub fn fire_event(&mut self, ev: &Event) -> Result<(), Vec<ValidationError>> {
        if let Some(RecoveryFrame::Ignoring { depth }) = self.recovery.last_mut() {
            match ev {
                Event::EnterStartTag { .. } | Event::StartTagAndAttributes { .. } => *depth += 1,
                Event::EndTag { .. } => {
                    if *depth == 0 {
                        self.recovery.pop();
                        log::debug!("resuming after ignored element subtree");
                    } else {
                        *depth -= 1;
                    }
                }
                _ => {}
            }
            return Ok(());
        }
        if self.skip_attribute_value {
            self.skip_attribute_value = false;
            if matches!(ev, Event::AttributeValue { .. }) {
                return Ok(());
            }
        }
        let res = {
            let target = match self.recovery.last_mut() {
                Some(RecoveryFrame::Walking { walker, .. }) => walker,
                Some(RecoveryFrame::Ignoring { .. }) => unreachable!(),
                None => &mut self.root,
            };
            target.fire_event(&self.grammar, &self.resolver, ev)
        };
        if !res.is_no_match() {
            self.track_recovery_depth(ev);
        }
        match res {
            FireResult::Ok => Ok(()),
            FireResult::Errors(errors) => Err(errors),
            FireResult::NoMatch => self.convert_no_match(ev),
        }
    }

    fn track_recovery_depth(&mut self, ev: &Event) {
        if let Some(RecoveryFrame::Walking { depth, .. }) = self.recovery.last_mut() {
            match ev {
                Event::EnterStartTag { .. } | Event::StartTagAndAttributes { .. } => *depth += 1,
                Event::EndTag { .. } => {
                    if *depth == 0 {
                        self.recovery.pop();
                        log::debug!("resuming after misplaced element");
                    } else {
                        *depth -= 1;
                    }
                }
                _ => {}
            }
        }
    }

    /// No live walker accepts the event: report it, and for start tags enter
    /// one of the two recovery modes.
    fn convert_no_match(&mut self, ev: &Event) -> Result<(), Vec<ValidationError>> {
        match ev {
            Event::EnterStartTag { ns, name } | Event::StartTagAndAttributes { ns, name, .. } => {
                let mut errors = vec![ValidationError::UnexpectedElement(NamePattern::name(
                    ns.clone(),
                    name.clone(),
                ))];
                let candidates = self.grammar.elements_named(ns, name);
                if candidates.len() == 1 {
                    log::debug!(
                        "misplaced element {{{ns}}}{name}: validating against its only definition"
                    );
                    let mut walker = Walker::new(&self.grammar, candidates[0]);
                    match walker.fire_event(&self.grammar, &self.resolver, ev) {
                        FireResult::Ok => {}
                        FireResult::Errors(e) => errors.extend(e),
                        FireResult::NoMatch => {
                            unreachable!("indexed element pattern accepts its own name")
                        }
                    }
                    self.recovery.push(RecoveryFrame::Walking { walker, depth: 0 });
                } else {
                    log::debug!(
                        "misplaced element {{{ns}}}{name}: {} candidate definitions, \
                         ignoring subtree",
                        candidates.len()
                    );
                    self.recovery.push(RecoveryFrame::Ignoring { depth: 0 });
                }
                Err(errors)
            }
            Event::EndTag { ns, name } => Err(vec![ValidationError::UnexpectedEndTag(
                NamePattern::name(ns.clone(), name.clone()),
            )]),
            Event::AttributeName { ns, name } => {
                self.skip_attribute_value = true;
                Err(vec![ValidationError::UnexpectedAttribute(
                    NamePattern::name(ns.clone(), name.clone()),
                )])
            }
            Event::AttributeNameAndValue { ns, name, .. } => {
                Err(vec![ValidationError::UnexpectedAttribute(
                    NamePattern::name(ns.clone(), name.clone()),
                )])
            }
            Event::AttributeValue { .. } => {
                Err(vec![ValidationError::UnexpectedEvent("attribute value")])
            }
            Event::Text { value } => {
                if is_xml_whitespace_str(value) {
                    Ok(())
                } else {
                    Err(vec![ValidationError::UnexpectedText])
                }
            }
            Event::LeaveStartTag => Err(vec![ValidationError::UnexpectedEvent("leaveStartTag")]),
        }
    }

    /// Events acceptable as the next input.  Empty while skipping an ignored
    /// subtree.
    pub fn possible(&mut self) -> PossibilitySet {
        match self.recovery.last_mut() {
            Some(RecoveryFrame::Ignoring { .. }) => PossibilitySet::default(),
            Some(RecoveryFrame::Walking { walker, .. }) => walker.possible(&self.grammar),
            None => self.root.possible(&self.grammar),
        }
    }

    pub fn can_end(&self) -> bool {
        self.recovery.is_empty() && self.root.can_end(&self.grammar, false)
    }

    /// Final call at end of input.
    pub fn end(&mut self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if !self.recovery.is_empty() {
            errors.push(ValidationError::UnexpectedEvent(
                "end of input inside misplaced content",
            ));
            self.recovery.clear();
        }
        errors.extend(self.root.end(&self.grammar, false));
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Convenience alias matching the common "every error seen so far" shape.
pub type ValidationErrors = Vec<ValidationError>;

/// Collect the distinct concrete names in a possibility set, for simple
/// completion UIs.  Non-simple name patterns are skipped.
pub fn possible_names(possibilities: &PossibilitySet) -> FnvHashSet<EName> {
    let mut out = FnvHashSet::default();
    for possibility in possibilities {
        let nc = match possibility {
            Possibility::EnterStartTag(nc)
            | Possibility::EndTag(nc)
            | Possibility::AttributeName(nc) => nc,
            _ => continue,
        };
        if let Some(names) = nc.to_names() {
            out.extend(names);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rngwalk_model::PatternBuilder;

    fn walker_for(build: impl FnOnce(&mut PatternBuilder) -> PatId) -> GrammarWalker {
        let mut b = PatternBuilder::new();
        let start = build(&mut b);
        GrammarWalker::new(Arc::new(b.finish(start).unwrap()))
    }

    #[test]
    fn text_walker_accepts_repeated_runs() {
        let mut w = walker_for(|b| {
            let text = b.text();
            b.element(NamePattern::name("", "a"), text)
        });
        w.fire_event(&Event::enter_start_tag("", "a")).unwrap();
        w.fire_event(&Event::LeaveStartTag).unwrap();
        w.fire_event(&Event::text("one")).unwrap();
        w.fire_event(&Event::text("two")).unwrap();
        w.fire_event(&Event::end_tag("", "a")).unwrap();
        w.end().unwrap();
    }

    #[test]
    fn empty_walker_tolerates_whitespace() {
        let mut w = walker_for(|b| {
            let empty = b.empty();
            b.element(NamePattern::name("", "a"), empty)
        });
        w.fire_event(&Event::enter_start_tag("", "a")).unwrap();
        w.fire_event(&Event::LeaveStartTag).unwrap();
        w.fire_event(&Event::text(" \t\n")).unwrap();
        w.fire_event(&Event::end_tag("", "a")).unwrap();
        w.end().unwrap();
    }

    #[test]
    fn group_routes_in_order() {
        let mut w = walker_for(|b| {
            let t1 = b.text();
            let e1 = b.element(NamePattern::name("", "x"), t1);
            let t2 = b.text();
            let e2 = b.element(NamePattern::name("", "y"), t2);
            let grp = b.group(e1, e2);
            b.element(NamePattern::name("", "root"), grp)
        });
        w.fire_event(&Event::enter_start_tag("", "root")).unwrap();
        w.fire_event(&Event::LeaveStartTag).unwrap();
        // y before x violates the sequence
        let errs = w
            .fire_event(&Event::enter_start_tag("", "y"))
            .unwrap_err();
        assert!(matches!(
            errs[0],
            ValidationError::UnexpectedElement(_)
        ));
    }

    #[test]
    fn one_or_more_restarts() {
        let mut w = walker_for(|b| {
            let empty = b.empty();
            let item = b.element(NamePattern::name("", "i"), empty);
            let rep = b.one_or_more(item);
            b.element(NamePattern::name("", "root"), rep)
        });
        w.fire_event(&Event::enter_start_tag("", "root")).unwrap();
        w.fire_event(&Event::LeaveStartTag).unwrap();
        for _ in 0..3 {
            w.fire_event(&Event::enter_start_tag("", "i")).unwrap();
            w.fire_event(&Event::LeaveStartTag).unwrap();
            w.fire_event(&Event::end_tag("", "i")).unwrap();
        }
        w.fire_event(&Event::end_tag("", "root")).unwrap();
        w.end().unwrap();
    }

    #[test]
    fn one_or_more_requires_one() {
        let mut w = walker_for(|b| {
            let empty = b.empty();
            let item = b.element(NamePattern::name("", "i"), empty);
            let rep = b.one_or_more(item);
            b.element(NamePattern::name("", "root"), rep)
        });
        w.fire_event(&Event::enter_start_tag("", "root")).unwrap();
        w.fire_event(&Event::LeaveStartTag).unwrap();
        let errs = w.fire_event(&Event::end_tag("", "root")).unwrap_err();
        assert_eq!(
            errs,
            vec![ValidationError::MissingElement(NamePattern::name("", "i"))]
        );
    }

    #[test]
    fn list_validates_tokens() {
        let mut w = walker_for(|b| {
            let one = b.value("", "token", "one", "").unwrap();
            let two = b.value("", "token", "two", "").unwrap();
            let seq = b.group(one, two);
            let list = b.list(seq);
            b.element(NamePattern::name("", "e"), list)
        });
        w.fire_event(&Event::enter_start_tag("", "e")).unwrap();
        w.fire_event(&Event::LeaveStartTag).unwrap();
        w.fire_event(&Event::text(" one  two ")).unwrap();
        w.fire_event(&Event::end_tag("", "e")).unwrap();
        w.end().unwrap();
    }

    #[test]
    fn list_rejects_wrong_token() {
        let mut w = walker_for(|b| {
            let one = b.value("", "token", "one", "").unwrap();
            let list = b.list(one);
            b.element(NamePattern::name("", "e"), list)
        });
        w.fire_event(&Event::enter_start_tag("", "e")).unwrap();
        w.fire_event(&Event::LeaveStartTag).unwrap();
        let errs = w.fire_event(&Event::text("uno")).unwrap_err();
        assert_eq!(errs, vec![ValidationError::UnexpectedText]);
    }

    #[test]
    fn data_except_rejects_excluded_value() {
        let mut w = walker_for(|b| {
            let excluded = b.value("", "token", "secret", "").unwrap();
            let data = b
                .data(
                    "http://www.w3.org/2001/XMLSchema-datatypes",
                    "NCName",
                    &[],
                    Some(excluded),
                )
                .unwrap();
            b.element(NamePattern::name("", "e"), data)
        });
        let mut ok = w.clone();
        ok.fire_event(&Event::enter_start_tag("", "e")).unwrap();
        ok.fire_event(&Event::LeaveStartTag).unwrap();
        ok.fire_event(&Event::text("visible")).unwrap();
        ok.fire_event(&Event::end_tag("", "e")).unwrap();
        ok.end().unwrap();

        w.fire_event(&Event::enter_start_tag("", "e")).unwrap();
        w.fire_event(&Event::LeaveStartTag).unwrap();
        assert!(w.fire_event(&Event::text("secret")).is_err());
    }

    #[test]
    fn suppression_removes_attribute_possibilities() {
        let mut w = walker_for(|b| {
            let t1 = b.text();
            let attr = b.attribute(NamePattern::name("", "opt"), t1);
            let empty = b.empty();
            let opt = b.choice(attr, empty);
            b.element(NamePattern::name("", "e"), opt)
        });
        w.fire_event(&Event::enter_start_tag("", "e")).unwrap();
        assert!(w
            .possible()
            .iter()
            .any(|p| matches!(p, Possibility::AttributeName(_))));
        w.fire_event(&Event::LeaveStartTag).unwrap();
        assert!(!w.possible().iter().any(Possibility::is_attribute));
    }

    #[test]
    fn value_qname_uses_context() {
        // value of type QName: "p:answer" under p=urn:q
        let mut w = walker_for(|b| {
            let v = b
                .value(
                    "http://www.w3.org/2001/XMLSchema-datatypes",
                    "QName",
                    "answer",
                    "urn:q",
                )
                .unwrap();
            b.element(NamePattern::name("", "e"), v)
        });
        w.enter_context();
        w.define_prefix("q", "urn:q");
        w.fire_event(&Event::enter_start_tag("", "e")).unwrap();
        w.fire_event(&Event::LeaveStartTag).unwrap();
        // the prefix spelling differs from the schema's, the expansion is
        // what counts
        w.fire_event(&Event::text("q:answer")).unwrap();
        w.fire_event(&Event::end_tag("", "e")).unwrap();
        w.leave_context();
        w.end().unwrap();
    }

    #[test]
    fn possible_names_flattens_simple_patterns() {
        let mut w = walker_for(|b| {
            let empty = b.empty();
            b.element(
                NamePattern::choice(NamePattern::name("", "a"), NamePattern::name("", "b")),
                empty,
            )
        });
        let names = possible_names(&w.possible());
        assert!(names.contains(&EName::new("", "a")));
        assert!(names.contains(&EName::new("", "b")));
    }
}
