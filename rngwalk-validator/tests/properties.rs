//! Checks for the walker contract's quantified invariants: possibility-set
//! soundness, attribute suppression, clone independence, and JSON
//! round-trip equivalence.

use rngwalk_model::event::{Event, Possibility, ValueShape};
use rngwalk_model::name::NamePattern;
use rngwalk_model::pattern::PatternBuilder;
use rngwalk_model::{read_tree_from_json, write_tree_to_json, Grammar};
use rngwalk_validator::{GrammarWalker, ValidationError};
use std::sync::Arc;

/// element doc { attribute version { text },
///               element title { text },
///               element item { attribute id { text } }+ }
fn document_grammar() -> Grammar {
    let mut b = PatternBuilder::new();
    let t1 = b.text();
    let version = b.attribute(NamePattern::name("", "version"), t1);
    let t2 = b.text();
    let title = b.element(NamePattern::name("", "title"), t2);
    let t3 = b.text();
    let id = b.attribute(NamePattern::name("", "id"), t3);
    let item = b.element(NamePattern::name("", "item"), id);
    let items = b.one_or_more(item);
    let content = b.group(title, items);
    let grp = b.group(version, content);
    let doc = b.element(NamePattern::name("", "doc"), grp);
    b.finish(doc).unwrap()
}

fn valid_document_events() -> Vec<Event> {
    vec![
        Event::enter_start_tag("", "doc"),
        Event::attribute_name("", "version"),
        Event::attribute_value("1"),
        Event::LeaveStartTag,
        Event::enter_start_tag("", "title"),
        Event::LeaveStartTag,
        Event::text("a title"),
        Event::end_tag("", "title"),
        Event::enter_start_tag("", "item"),
        Event::attribute_name("", "id"),
        Event::attribute_value("i1"),
        Event::LeaveStartTag,
        Event::end_tag("", "item"),
        Event::enter_start_tag("", "item"),
        Event::attribute_name("", "id"),
        Event::attribute_value("i2"),
        Event::LeaveStartTag,
        Event::end_tag("", "item"),
        Event::end_tag("", "doc"),
    ]
}

/// Turn a possibility into one concrete event that exercises it, when the
/// possibility names a finite set.
fn event_for(possibility: &Possibility) -> Option<Event> {
    let event = match possibility {
        Possibility::EnterStartTag(nc) => {
            let name = nc.to_names()?.into_iter().next()?;
            Event::enter_start_tag(name.ns, name.name)
        }
        Possibility::EndTag(nc) => {
            let name = nc.to_names()?.into_iter().next()?;
            Event::end_tag(name.ns, name.name)
        }
        Possibility::AttributeName(nc) => {
            let name = nc.to_names()?.into_iter().next()?;
            Event::attribute_name(name.ns, name.name)
        }
        Possibility::LeaveStartTag => Event::LeaveStartTag,
        Possibility::AttributeValue(ValueShape::Literal(v)) => Event::attribute_value(v.clone()),
        Possibility::AttributeValue(ValueShape::Any) => Event::attribute_value("sample"),
        Possibility::Text(ValueShape::Literal(v)) => Event::text(v.clone()),
        // "any text" is sound here because the grammar under test uses only
        // `text` content, never datatypes
        Possibility::Text(ValueShape::Any) => Event::text("sample"),
    };
    Some(event)
}

#[test]
fn every_possibility_is_fireable() {
    let grammar = Arc::new(document_grammar());
    let mut w = GrammarWalker::new(grammar);
    for ev in valid_document_events() {
        for possibility in w.possible() {
            let Some(probe_ev) = event_for(&possibility) else {
                continue;
            };
            let mut probe = w.clone();
            assert_eq!(
                probe.fire_event(&probe_ev),
                Ok(()),
                "possibility {possibility:?} was not accepted"
            );
        }
        w.fire_event(&ev).unwrap();
    }
    w.end().unwrap();
}

#[test]
fn no_attribute_possibilities_after_leave_start_tag() {
    let grammar = Arc::new(document_grammar());
    let mut w = GrammarWalker::new(grammar);
    let mut inside_start_tag = false;
    for ev in valid_document_events() {
        w.fire_event(&ev).unwrap();
        match ev {
            Event::EnterStartTag { .. } => inside_start_tag = true,
            Event::LeaveStartTag => inside_start_tag = false,
            _ => {}
        }
        if !inside_start_tag {
            assert!(
                !w.possible().iter().any(Possibility::is_attribute),
                "attribute possibility offered outside a start tag after {ev:?}"
            );
        }
    }
}

#[test]
fn clone_does_not_disturb_the_original() {
    let grammar = Arc::new(document_grammar());
    let mut w = GrammarWalker::new(grammar);
    let events = valid_document_events();
    // stop just before the first <item>
    for ev in &events[..8] {
        w.fire_event(ev).unwrap();
    }
    let snapshot = w.clone();
    assert_eq!(snapshot.possible_sorted(), w.possible_sorted());

    // drive the clone into an error; the original must be unaffected
    let mut wrong = snapshot.clone();
    assert!(wrong.fire_event(&Event::enter_start_tag("", "title")).is_err());

    for ev in &events[8..] {
        w.fire_event(ev).unwrap();
    }
    w.end().unwrap();

    // the snapshot is still at its old position and can finish on its own
    let mut resumed = snapshot;
    for ev in &events[8..] {
        resumed.fire_event(ev).unwrap();
    }
    resumed.end().unwrap();
}

trait PossibleSorted {
    fn possible_sorted(&self) -> Vec<String>;
}

impl PossibleSorted for GrammarWalker {
    fn possible_sorted(&self) -> Vec<String> {
        let mut w = self.clone();
        let mut all: Vec<String> = w.possible().iter().map(|p| format!("{p:?}")).collect();
        all.sort();
        all
    }
}

#[test]
fn json_round_trip_validates_identically() {
    let grammar = document_grammar();
    let text = write_tree_to_json(&grammar);
    let reread = read_tree_from_json(&text).unwrap();

    let drive = |grammar: Grammar, events: &[Event]| -> Vec<ValidationError> {
        let mut w = GrammarWalker::new(Arc::new(grammar));
        let mut errors = Vec::new();
        for ev in events {
            if let Err(e) = w.fire_event(ev) {
                errors.extend(e);
            }
        }
        if let Err(e) = w.end() {
            errors.extend(e);
        }
        errors
    };

    // a valid document passes both
    assert_eq!(drive(grammar.clone(), &valid_document_events()), vec![]);
    assert_eq!(drive(reread.clone(), &valid_document_events()), vec![]);

    // an invalid document fails both with the same errors
    let invalid = vec![
        Event::enter_start_tag("", "doc"),
        Event::LeaveStartTag,
        Event::enter_start_tag("", "title"),
        Event::LeaveStartTag,
        Event::end_tag("", "title"),
        Event::end_tag("", "doc"),
    ];
    let errors_direct = drive(grammar, &invalid);
    let errors_reread = drive(reread, &invalid);
    assert!(!errors_direct.is_empty());
    assert_eq!(errors_direct, errors_reread);
}

#[test]
fn simple_name_patterns_always_flatten() {
    let patterns = [
        NamePattern::name("", "a"),
        NamePattern::choice(NamePattern::name("", "a"), NamePattern::name("urn:x", "b")),
        NamePattern::choice(
            NamePattern::choice(NamePattern::name("", "a"), NamePattern::name("", "b")),
            NamePattern::name("", "c"),
        ),
    ];
    for nc in patterns {
        assert!(nc.is_simple());
        assert!(!nc.to_names().unwrap().is_empty());
    }
}

#[test]
fn possibility_sets_are_fresh_copies() {
    let grammar = Arc::new(document_grammar());
    let mut w = GrammarWalker::new(grammar);
    let mut first = w.possible();
    first.clear();
    // mutating the returned set must not affect the walker's view
    assert!(!w.possible().is_empty());
}
