//! Parse events and possibility sets.
//!
//! Two event domains exist.  [`Event`] is the input side: names are concrete
//! `(uri, local-name)` pairs as delivered by the tokenizer.  [`Possibility`]
//! is the output side: the name-bearing kinds carry a [`NamePattern`] so that
//! a completion UI can offer `NsName`/`AnyName` positions too.

use crate::name::NamePattern;
use fnv::FnvHashSet;

/// One abstract parse event, as fed to a walker.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum Event {
    /// The `<tag` part of a start tag.
    EnterStartTag { ns: String, name: String },
    /// The `>` closing a start tag; must follow all attribute events.
    LeaveStartTag,
    /// `</tag>`.
    EndTag { ns: String, name: String },
    AttributeName { ns: String, name: String },
    /// The value for the most recent `AttributeName`; delivered even when
    /// empty.
    AttributeValue { value: String },
    /// A maximal contiguous text run; the caller must not deliver empty runs.
    Text { value: String },
    /// Compact equivalent of `AttributeName` followed by `AttributeValue`.
    AttributeNameAndValue {
        ns: String,
        name: String,
        value: String,
    },
    /// Compact equivalent of `EnterStartTag`, every attribute, then
    /// `LeaveStartTag`.
    StartTagAndAttributes {
        ns: String,
        name: String,
        attributes: Vec<AttributeData>,
    },
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct AttributeData {
    pub ns: String,
    pub name: String,
    pub value: String,
}

impl Event {
    pub fn enter_start_tag(ns: impl Into<String>, name: impl Into<String>) -> Event {
        Event::EnterStartTag {
            ns: ns.into(),
            name: name.into(),
        }
    }

    pub fn end_tag(ns: impl Into<String>, name: impl Into<String>) -> Event {
        Event::EndTag {
            ns: ns.into(),
            name: name.into(),
        }
    }

    pub fn attribute_name(ns: impl Into<String>, name: impl Into<String>) -> Event {
        Event::AttributeName {
            ns: ns.into(),
            name: name.into(),
        }
    }

    pub fn attribute_value(value: impl Into<String>) -> Event {
        Event::AttributeValue {
            value: value.into(),
        }
    }

    pub fn text(value: impl Into<String>) -> Event {
        Event::Text {
            value: value.into(),
        }
    }

    /// Attribute events may arrive in any order within a start tag, and are
    /// routed accordingly by the composite walkers.
    pub fn is_attribute_event(&self) -> bool {
        matches!(
            self,
            Event::AttributeName { .. }
                | Event::AttributeValue { .. }
                | Event::AttributeNameAndValue { .. }
        )
    }

    pub fn is_compact(&self) -> bool {
        matches!(
            self,
            Event::AttributeNameAndValue { .. } | Event::StartTagAndAttributes { .. }
        )
    }
}

/// What lexical values a text-like possibility admits.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum ValueShape {
    /// Any text run.
    Any,
    /// Exactly this lexical form (a `Value` pattern).
    Literal(String),
}

/// An event a walker would accept next.  Compact kinds never appear here.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum Possibility {
    EnterStartTag(NamePattern),
    LeaveStartTag,
    EndTag(NamePattern),
    AttributeName(NamePattern),
    AttributeValue(ValueShape),
    Text(ValueShape),
}

impl Possibility {
    pub fn is_attribute(&self) -> bool {
        matches!(
            self,
            Possibility::AttributeName(_) | Possibility::AttributeValue(_)
        )
    }
}

/// A set of possibilities.  Events hash by value, so equal possibilities
/// collapse when sets from several subwalkers are unioned.
pub type PossibilitySet = FnvHashSet<Possibility>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_event_classification() {
        assert!(Event::attribute_name("", "a").is_attribute_event());
        assert!(Event::attribute_value("v").is_attribute_event());
        assert!(!Event::enter_start_tag("", "e").is_attribute_event());
        assert!(!Event::LeaveStartTag.is_attribute_event());
    }

    #[test]
    fn set_collapses_equal_possibilities() {
        let mut set = PossibilitySet::default();
        set.insert(Possibility::Text(ValueShape::Any));
        set.insert(Possibility::Text(ValueShape::Any));
        set.insert(Possibility::LeaveStartTag);
        assert_eq!(set.len(), 2);
    }
}
