//! Name classes used by element and attribute patterns.

use std::collections::BTreeSet;
use std::fmt;

/// An expanded name: namespace URI (empty string for no namespace) plus
/// local name.
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Debug)]
pub struct EName {
    pub ns: String,
    pub name: String,
}

impl EName {
    pub fn new(ns: impl Into<String>, name: impl Into<String>) -> EName {
        EName {
            ns: ns.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ns.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{{{}}}{}", self.ns, self.name)
        }
    }
}

/// Declarative description of the set of expanded names admissible for an
/// element or attribute.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum NamePattern {
    /// Exactly one expanded name.
    Name { ns: String, name: String },
    /// Either of two name patterns.
    NameChoice {
        a: Box<NamePattern>,
        b: Box<NamePattern>,
    },
    /// Any local name within one namespace, minus an optional exception.
    NsName {
        ns: String,
        except: Option<Box<NamePattern>>,
    },
    /// Any name at all, minus an optional exception.
    AnyName { except: Option<Box<NamePattern>> },
}

impl NamePattern {
    pub fn name(ns: impl Into<String>, name: impl Into<String>) -> NamePattern {
        NamePattern::Name {
            ns: ns.into(),
            name: name.into(),
        }
    }

    pub fn choice(a: NamePattern, b: NamePattern) -> NamePattern {
        NamePattern::NameChoice {
            a: Box::new(a),
            b: Box::new(b),
        }
    }

    pub fn ns_name(ns: impl Into<String>, except: Option<NamePattern>) -> NamePattern {
        NamePattern::NsName {
            ns: ns.into(),
            except: except.map(Box::new),
        }
    }

    pub fn any_name(except: Option<NamePattern>) -> NamePattern {
        NamePattern::AnyName {
            except: except.map(Box::new),
        }
    }

    /// Does `(ns, name)` belong to the set this pattern describes?
    pub fn matches(&self, ns: &str, name: &str) -> bool {
        match self {
            NamePattern::Name { ns: n, name: ln } => n == ns && ln == name,
            NamePattern::NameChoice { a, b } => a.matches(ns, name) || b.matches(ns, name),
            NamePattern::NsName { ns: n, except } => {
                n == ns && !except.as_ref().is_some_and(|e| e.matches(ns, name))
            }
            NamePattern::AnyName { except } => {
                !except.as_ref().is_some_and(|e| e.matches(ns, name))
            }
        }
    }

    /// True when the pattern is built only from `Name` and `NameChoice`, so
    /// that the admissible names form a finite, enumerable set.
    pub fn is_simple(&self) -> bool {
        match self {
            NamePattern::Name { .. } => true,
            NamePattern::NameChoice { a, b } => a.is_simple() && b.is_simple(),
            NamePattern::NsName { .. } | NamePattern::AnyName { .. } => false,
        }
    }

    /// Flatten a simple pattern into the list of names it admits.  Returns
    /// `None` if the pattern is not simple.  For a simple pattern the result
    /// is never empty.
    pub fn to_names(&self) -> Option<Vec<EName>> {
        fn collect(nc: &NamePattern, out: &mut Vec<EName>) -> bool {
            match nc {
                NamePattern::Name { ns, name } => {
                    out.push(EName::new(ns.clone(), name.clone()));
                    true
                }
                NamePattern::NameChoice { a, b } => collect(a, out) && collect(b, out),
                NamePattern::NsName { .. } | NamePattern::AnyName { .. } => false,
            }
        }
        let mut names = Vec::new();
        if collect(self, &mut names) {
            Some(names)
        } else {
            None
        }
    }

    /// Add every namespace URI mentioned by this pattern to `out`.
    pub fn collect_namespaces(&self, out: &mut BTreeSet<String>) {
        match self {
            NamePattern::Name { ns, .. } => {
                out.insert(ns.clone());
            }
            NamePattern::NameChoice { a, b } => {
                a.collect_namespaces(out);
                b.collect_namespaces(out);
            }
            NamePattern::NsName { ns, except } => {
                out.insert(ns.clone());
                if let Some(e) = except {
                    e.collect_namespaces(out);
                }
            }
            NamePattern::AnyName { except } => {
                if let Some(e) = except {
                    e.collect_namespaces(out);
                }
            }
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamePattern::Name { ns, name } => {
                if ns.is_empty() {
                    write!(f, "{name}")
                } else {
                    write!(f, "{{{ns}}}{name}")
                }
            }
            NamePattern::NameChoice { a, b } => write!(f, "{a}|{b}"),
            NamePattern::NsName { ns, except } => {
                write!(f, "{{{ns}}}*")?;
                if let Some(e) = except {
                    write!(f, "-{e}")?;
                }
                Ok(())
            }
            NamePattern::AnyName { except } => {
                write!(f, "*")?;
                if let Some(e) = except {
                    write!(f, "-{e}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named() {
        let nc = NamePattern::name("urn:x", "a");
        assert!(nc.matches("urn:x", "a"));
        assert!(!nc.matches("urn:x", "b"));
        assert!(!nc.matches("", "a"));
        assert!(nc.is_simple());
        assert_eq!(nc.to_names(), Some(vec![EName::new("urn:x", "a")]));
    }

    #[test]
    fn choice_flattens() {
        let nc = NamePattern::choice(
            NamePattern::choice(NamePattern::name("", "a"), NamePattern::name("", "b")),
            NamePattern::name("", "c"),
        );
        assert!(nc.is_simple());
        let names = nc.to_names().unwrap();
        assert_eq!(names.len(), 3);
        assert!(nc.matches("", "b"));
        assert!(!nc.matches("", "d"));
    }

    #[test]
    fn ns_name_except() {
        let nc = NamePattern::ns_name("urn:x", Some(NamePattern::name("urn:x", "hidden")));
        assert!(nc.matches("urn:x", "anything"));
        assert!(!nc.matches("urn:x", "hidden"));
        assert!(!nc.matches("urn:y", "anything"));
        assert!(!nc.is_simple());
        assert_eq!(nc.to_names(), None);
    }

    #[test]
    fn any_name_except_choice() {
        let nc = NamePattern::any_name(Some(NamePattern::choice(
            NamePattern::name("urn:x", "a"),
            NamePattern::name("", "b"),
        )));
        assert!(nc.matches("urn:y", "whatever"));
        assert!(!nc.matches("urn:x", "a"));
        assert!(!nc.matches("", "b"));
    }

    #[test]
    fn namespace_collection() {
        let nc = NamePattern::choice(
            NamePattern::name("urn:x", "a"),
            NamePattern::ns_name("urn:y", None),
        );
        let mut out = BTreeSet::new();
        nc.collect_namespaces(&mut out);
        assert_eq!(
            out.into_iter().collect::<Vec<_>>(),
            vec!["urn:x".to_string(), "urn:y".to_string()]
        );
    }
}
