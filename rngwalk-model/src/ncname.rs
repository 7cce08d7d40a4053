//! Lexical checks for XML names, per the _Namespaces in XML 1.0_ productions.

/// `NCNameStartChar`: an `NameStartChar` excluding `:`.
pub fn is_nc_name_start_char(c: char) -> bool {
    matches!(c,
        'A'..='Z'
        | '_'
        | 'a'..='z'
        | '\u{c0}'..='\u{d6}'
        | '\u{d8}'..='\u{f6}'
        | '\u{f8}'..='\u{2ff}'
        | '\u{370}'..='\u{37d}'
        | '\u{37f}'..='\u{1fff}'
        | '\u{200c}'..='\u{200d}'
        | '\u{2070}'..='\u{218f}'
        | '\u{2c00}'..='\u{2fef}'
        | '\u{3001}'..='\u{d7ff}'
        | '\u{f900}'..='\u{fdcf}'
        | '\u{fdf0}'..='\u{fffd}'
        | '\u{10000}'..='\u{effff}')
}

/// `NCNameChar`: an `NameChar` excluding `:`.
pub fn is_nc_name_char(c: char) -> bool {
    is_nc_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9'
            | '\u{b7}'
            | '\u{300}'..='\u{36f}'
            | '\u{203f}'..='\u{2040}')
}

pub fn is_nc_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        None => false,
        Some(first) => is_nc_name_start_char(first) && chars.all(is_nc_name_char),
    }
}

/// Split a lexical QName into `(prefix, local-name)`, checking that both
/// halves are NCNames.  A name without a colon yields `(None, name)`.
pub fn split_qname(text: &str) -> Option<(Option<&str>, &str)> {
    if let Some(pos) = text.find(':') {
        let prefix = &text[..pos];
        let local = &text[pos + 1..];
        if is_nc_name(prefix) && is_nc_name(local) {
            Some((Some(prefix), local))
        } else {
            None
        }
    } else if is_nc_name(text) {
        Some((None, text))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nc_names() {
        assert!(is_nc_name("foo"));
        assert!(is_nc_name("_foo-bar.baz"));
        assert!(is_nc_name("héllo"));
        assert!(!is_nc_name(""));
        assert!(!is_nc_name("1foo"));
        assert!(!is_nc_name("foo:bar"));
        assert!(!is_nc_name("foo bar"));
    }

    #[test]
    fn qnames() {
        assert_eq!(split_qname("foo"), Some((None, "foo")));
        assert_eq!(split_qname("a:b"), Some((Some("a"), "b")));
        assert_eq!(split_qname(":b"), None);
        assert_eq!(split_qname("a:"), None);
        assert_eq!(split_qname("a:b:c"), None);
    }
}
