//! Command-line front end: tokenizes XML documents with `xmlparser`, feeds
//! the abstract event stream to the walker and renders validation errors
//! with source spans.

use rngwalk_model::datatype::Namespaces;
use rngwalk_model::event::Event;
use rngwalk_model::{convert_to_pattern, ConvertOptions, FsFiles};
use rngwalk_validator::{GrammarWalker, ValidationError};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;
use structopt::StructOpt;
use xmlparser::{ElementEnd, StrSpan, Token, Tokenizer};

#[derive(Debug, StructOpt)]
enum Cli {
    /// Validate XML documents against a simplified schema in JSON form
    Validate {
        /// Schema file (JSON tree, format version 3)
        schema: PathBuf,
        /// Documents to validate
        xml: Vec<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    match Cli::from_args() {
        Cli::Validate { schema, xml } => validate(schema, xml),
    }
}

fn validate(schema: PathBuf, xmls: Vec<PathBuf>) {
    let converted = match convert_to_pattern(&FsFiles, &schema, ConvertOptions::default()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}: {e}", schema.display());
            exit(1);
        }
    };
    for warning in &converted.warnings {
        eprintln!("{}: warning: {warning}", schema.display());
    }
    let grammar = Arc::new(converted.pattern);

    let mut failed = false;
    for xml in xmls {
        let doc = match std::fs::read_to_string(&xml) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("{}: {e}", xml.display());
                exit(1);
            }
        };
        log::debug!("validating {}", xml.display());
        let problems = Bridge::new(GrammarWalker::new(grammar.clone())).run(&doc);
        if !problems.is_empty() {
            failed = true;
            report(&xml, doc, &problems);
        }
    }
    if failed {
        exit(2);
    }
}

struct Problem {
    span: Range<usize>,
    message: String,
}

/// Adapts `xmlparser` tokens to the walker's event vocabulary: buffers
/// attributes until the start tag closes, maintains the namespace context
/// stack, and coalesces text runs split by CDATA sections or entity
/// references.
struct Bridge<'a> {
    walker: GrammarWalker,
    stack: Vec<PendingElement<'a>>,
    text: String,
    text_start: usize,
    problems: Vec<Problem>,
}

struct PendingElement<'a> {
    prefix: StrSpan<'a>,
    local: StrSpan<'a>,
    attributes: Vec<PendingAttribute<'a>>,
}

struct PendingAttribute<'a> {
    prefix: StrSpan<'a>,
    local: StrSpan<'a>,
    value: StrSpan<'a>,
    span: StrSpan<'a>,
}

impl<'a> Bridge<'a> {
    fn new(walker: GrammarWalker) -> Bridge<'a> {
        Bridge {
            walker,
            stack: Vec::new(),
            text: String::new(),
            text_start: 0,
            problems: Vec::new(),
        }
    }

    fn run(mut self, doc: &'a str) -> Vec<Problem> {
        for token in Tokenizer::from(doc) {
            match token {
                Ok(token) => self.token(token),
                Err(e) => {
                    let pos = e.pos();
                    self.problems.push(Problem {
                        span: 0..0,
                        message: format!(
                            "XML error at {}:{}: {e}",
                            pos.row, pos.col
                        ),
                    });
                    return self.problems;
                }
            }
        }
        if let Err(errors) = self.walker.end() {
            let end = doc.len();
            self.record(end..end, &errors);
        }
        self.problems
    }

    fn record(&mut self, span: Range<usize>, errors: &[ValidationError]) {
        for error in errors {
            self.problems.push(Problem {
                span: span.clone(),
                message: error.to_string(),
            });
        }
    }

    fn fire(&mut self, span: Range<usize>, ev: Event) {
        if let Err(errors) = self.walker.fire_event(&ev) {
            self.record(span, &errors);
        }
    }

    fn token(&mut self, token: Token<'a>) {
        match token {
            Token::ElementStart { prefix, local, .. } => {
                self.flush_text();
                // context opens before the element's own enterStartTag so
                // that xmlns declarations on this element bind its own name
                self.walker.enter_context();
                self.stack.push(PendingElement {
                    prefix,
                    local,
                    attributes: Vec::new(),
                });
            }
            Token::Attribute { prefix, local, value, span } => {
                if prefix.as_str() == "xmlns" {
                    self.walker.define_prefix(local.as_str(), value.as_str());
                } else if prefix.as_str().is_empty() && local.as_str() == "xmlns" {
                    self.walker.define_prefix("", value.as_str());
                } else {
                    self.stack.last_mut().unwrap().attributes.push(PendingAttribute {
                        prefix,
                        local,
                        value,
                        span,
                    });
                }
            }
            Token::ElementEnd { end, span } => match end {
                ElementEnd::Open => {
                    self.open_element(span);
                }
                ElementEnd::Empty => {
                    let (ns, name) = self.open_element(span);
                    self.fire(range_of(span), Event::EndTag { ns, name });
                    self.walker.leave_context();
                    self.stack.pop();
                }
                ElementEnd::Close(_, _) => {
                    self.flush_text();
                    let top = self.stack.last().unwrap();
                    let (prefix, local) = (top.prefix, top.local);
                    let (ns, name) = self.element_name(prefix, local);
                    self.fire(range_of(span), Event::EndTag { ns, name });
                    self.walker.leave_context();
                    self.stack.pop();
                }
            },
            Token::Text { text } => {
                if self.text.is_empty() {
                    self.text_start = text.start();
                }
                self.text.push_str(&expand_entities(text.as_str()));
            }
            Token::Cdata { text, .. } => {
                if self.text.is_empty() {
                    self.text_start = text.start();
                }
                self.text.push_str(text.as_str());
            }
            Token::Declaration { .. }
            | Token::ProcessingInstruction { .. }
            | Token::Comment { .. }
            | Token::DtdStart { .. }
            | Token::EmptyDtd { .. }
            | Token::EntityDeclaration { .. }
            | Token::DtdEnd { .. } => {}
        }
    }

    /// Fire enterStartTag, the buffered attributes and leaveStartTag for the
    /// innermost pending element.  Returns the element's resolved name.
    fn open_element(&mut self, span: StrSpan<'a>) -> (String, String) {
        let (prefix, local, attributes) = {
            let top = self.stack.last().unwrap();
            let attributes: Vec<_> = top
                .attributes
                .iter()
                .map(|a| (a.prefix, a.local, a.value, a.span))
                .collect();
            (top.prefix, top.local, attributes)
        };
        let (ns, name) = self.element_name(prefix, local);
        self.fire(
            range_of(span),
            Event::EnterStartTag {
                ns: ns.clone(),
                name: name.clone(),
            },
        );
        for (prefix, local, value, attr_span) in attributes {
            let attr_ns = if prefix.as_str().is_empty() {
                // unprefixed attributes are in no namespace
                String::new()
            } else {
                self.resolve_prefix(prefix, range_of(attr_span))
            };
            self.fire(
                range_of(attr_span),
                Event::AttributeNameAndValue {
                    ns: attr_ns,
                    name: local.as_str().to_string(),
                    value: expand_entities(value.as_str()),
                },
            );
        }
        self.fire(range_of(span), Event::LeaveStartTag);
        (ns, name)
    }

    fn element_name(&mut self, prefix: StrSpan<'a>, local: StrSpan<'a>) -> (String, String) {
        let ns = if prefix.as_str().is_empty() {
            self.walker
                .resolve_name(local.as_str(), false)
                .map(|n| n.ns)
                .unwrap_or_default()
        } else {
            self.resolve_prefix(prefix, range_of(local))
        };
        (ns, local.as_str().to_string())
    }

    fn resolve_prefix(&mut self, prefix: StrSpan<'a>, span: Range<usize>) -> String {
        match self.walker.resolver().resolve(prefix.as_str()) {
            Some(uri) => uri.to_string(),
            None => {
                self.problems.push(Problem {
                    span,
                    message: format!("the prefix {:?} is not defined", prefix.as_str()),
                });
                String::new()
            }
        }
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let value = std::mem::take(&mut self.text);
        let span = self.text_start..self.text_start + value.len();
        self.fire(span, Event::Text { value });
    }
}

fn range_of(span: StrSpan<'_>) -> Range<usize> {
    span.start()..span.end()
}

/// Expand the predefined and character entity references.  Unknown entities
/// are passed through verbatim.
fn expand_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match rest.find(';') {
            Some(end) => {
                let entity = &rest[1..end];
                match entity {
                    "lt" => out.push('<'),
                    "gt" => out.push('>'),
                    "amp" => out.push('&'),
                    "apos" => out.push('\''),
                    "quot" => out.push('"'),
                    _ => {
                        let expanded = entity
                            .strip_prefix("#x")
                            .and_then(|h| u32::from_str_radix(h, 16).ok())
                            .or_else(|| {
                                entity.strip_prefix('#').and_then(|d| d.parse().ok())
                            })
                            .and_then(char::from_u32);
                        match expanded {
                            Some(c) => out.push(c),
                            None => out.push_str(&rest[..=end]),
                        }
                    }
                }
                rest = &rest[end + 1..];
            }
            None => {
                out.push_str(rest);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn report(path: &Path, source: String, problems: &[Problem]) {
    let mut map = codemap::CodeMap::new();
    let file = map.add_file(path.display().to_string(), source);
    let diagnostics: Vec<codemap_diagnostic::Diagnostic> = problems
        .iter()
        .map(|problem| {
            let span = file
                .span
                .subspan(problem.span.start as u64, problem.span.end as u64);
            codemap_diagnostic::Diagnostic {
                level: codemap_diagnostic::Level::Error,
                message: problem.message.clone(),
                code: None,
                spans: vec![codemap_diagnostic::SpanLabel {
                    span,
                    label: None,
                    style: codemap_diagnostic::SpanStyle::Primary,
                }],
            }
        })
        .collect();
    let mut emitter = codemap_diagnostic::Emitter::stderr(
        codemap_diagnostic::ColorConfig::Auto,
        Some(&map),
    );
    emitter.emit(&diagnostics);
}

#[cfg(test)]
mod tests {
    use super::expand_entities;

    #[test]
    fn entity_expansion() {
        assert_eq!(expand_entities("a &amp; b"), "a & b");
        assert_eq!(expand_entities("&lt;x&gt;"), "<x>");
        assert_eq!(expand_entities("&#65;&#x42;"), "AB");
        assert_eq!(expand_entities("&unknown; stays"), "&unknown; stays");
        assert_eq!(expand_entities("plain"), "plain");
    }
}
