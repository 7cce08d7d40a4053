//! Prefix-to-URI resolution over a stack of namespace contexts.

use crate::datatype::Namespaces;
use crate::name::EName;
use crate::ncname::split_qname;
use fnv::FnvHashMap;

pub const XML_NAMESPACE_URI: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE_URI: &str = "http://www.w3.org/2000/xmlns/";

/// A stack of prefix-to-URI mappings.
///
/// The caller pushes one context per element that declares namespaces,
/// _before_ firing that element's `EnterStartTag` (so declarations on the
/// element are visible to its own name), and pops it after the matching
/// `EndTag`.  The root context predefines the `xml` and `xmlns` prefixes and
/// can never be popped.
#[derive(Clone, Debug)]
pub struct NameResolver {
    frames: Vec<FnvHashMap<String, String>>,
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl NameResolver {
    pub fn new() -> NameResolver {
        let mut root = FnvHashMap::default();
        root.insert("xml".to_string(), XML_NAMESPACE_URI.to_string());
        root.insert("xmlns".to_string(), XMLNS_NAMESPACE_URI.to_string());
        NameResolver { frames: vec![root] }
    }

    /// A synthetic resolver for interpreting the lexical form of a `Value`
    /// pattern: the default prefix is bound to the pattern's declared
    /// namespace.
    pub fn for_value(ns: &str) -> NameResolver {
        let mut resolver = NameResolver::new();
        resolver.enter_context();
        resolver.define_prefix("", ns);
        resolver
    }

    pub fn enter_context(&mut self) {
        self.frames.push(FnvHashMap::default());
    }

    pub fn enter_context_with_mapping<I>(&mut self, mapping: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.frames.push(mapping.into_iter().collect());
    }

    /// Pops the innermost context.
    ///
    /// # Panics
    ///
    /// Panics if only the root context remains; entering and leaving must be
    /// balanced by the caller.
    pub fn leave_context(&mut self) {
        assert!(
            self.frames.len() > 1,
            "leave_context called with no context entered"
        );
        self.frames.pop();
    }

    /// Bind `prefix` in the innermost context.  The empty prefix sets the
    /// default namespace.
    pub fn define_prefix(&mut self, prefix: &str, uri: &str) {
        self.frames
            .last_mut()
            .expect("resolver always has a root frame")
            .insert(prefix.to_string(), uri.to_string());
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(prefix))
            .map(|uri| &uri[..])
    }

    /// Resolve a lexical QName against the current context stack.
    ///
    /// Returns `None` when the name is not lexically a QName or uses an
    /// undeclared prefix.  Per XML namespace rules the default namespace
    /// applies to element names only: an unprefixed attribute name is in no
    /// namespace.
    pub fn resolve_name(&self, qname: &str, attribute: bool) -> Option<EName> {
        let (prefix, local) = split_qname(qname)?;
        match prefix {
            Some(prefix) => self.lookup(prefix).map(|uri| EName::new(uri, local)),
            None => {
                let ns = if attribute {
                    ""
                } else {
                    self.lookup("").unwrap_or("")
                };
                Some(EName::new(ns, local))
            }
        }
    }

    /// Reverse mapping: a QName that resolves to `(ns, name)` in the current
    /// context, preferring the innermost declaration.  Returns `None` when no
    /// in-scope prefix maps to `ns`.
    pub fn unresolve_name(&self, ns: &str, name: &str) -> Option<String> {
        if ns.is_empty() {
            return Some(name.to_string());
        }
        for frame in self.frames.iter().rev() {
            if let Some((prefix, _)) = frame.iter().find(|(_, uri)| uri.as_str() == ns) {
                return Some(if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{prefix}:{name}")
                });
            }
        }
        None
    }
}

impl Namespaces for NameResolver {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.lookup(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_prefix_predefined() {
        let resolver = NameResolver::new();
        assert_eq!(
            resolver.resolve_name("xml:lang", true),
            Some(EName::new(XML_NAMESPACE_URI, "lang"))
        );
    }

    #[test]
    fn default_ns_elements_only() {
        let mut resolver = NameResolver::new();
        resolver.enter_context();
        resolver.define_prefix("", "urn:d");
        assert_eq!(
            resolver.resolve_name("foo", false),
            Some(EName::new("urn:d", "foo"))
        );
        assert_eq!(
            resolver.resolve_name("foo", true),
            Some(EName::new("", "foo"))
        );
    }

    #[test]
    fn inner_context_shadows_outer() {
        let mut resolver = NameResolver::new();
        resolver.enter_context();
        resolver.define_prefix("p", "urn:outer");
        resolver.enter_context();
        resolver.define_prefix("p", "urn:inner");
        assert_eq!(
            resolver.resolve_name("p:x", false),
            Some(EName::new("urn:inner", "x"))
        );
        resolver.leave_context();
        assert_eq!(
            resolver.resolve_name("p:x", false),
            Some(EName::new("urn:outer", "x"))
        );
    }

    #[test]
    fn undeclared_prefix() {
        let resolver = NameResolver::new();
        assert_eq!(resolver.resolve_name("nope:x", false), None);
    }

    #[test]
    fn mapping_context_and_unresolve() {
        let mut resolver = NameResolver::new();
        resolver.enter_context_with_mapping([("a".to_string(), "urn:a".to_string())]);
        assert_eq!(resolver.unresolve_name("urn:a", "x"), Some("a:x".to_string()));
        assert_eq!(resolver.unresolve_name("urn:b", "x"), None);
        assert_eq!(resolver.unresolve_name("", "x"), Some("x".to_string()));
    }

    #[test]
    fn value_resolver_binds_default() {
        let resolver = NameResolver::for_value("urn:v");
        assert_eq!(
            resolver.resolve_name("x", false),
            Some(EName::new("urn:v", "x"))
        );
    }
}
