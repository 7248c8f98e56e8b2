//! ENML markup tree
//!
//! Parses a note body into a small element/text tree with `quick-xml`.
//! The XML declaration, DOCTYPE, comments and processing instructions are
//! dropped; XML and common HTML named entities are resolved.

use quick_xml::escape::unescape_with;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ConversionError;

/// A node of the parsed note body
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with lowercase name, attributes in document order and children
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Attribute value by (case-insensitive) name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Concatenated text of all descendants
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    fn push_text(&mut self, text: &str) {
        push_text(&mut self.children, text);
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = nodes.last_mut() {
        last.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

/// Find the first element named `name` in document order
pub fn find_element<'a>(nodes: &'a [Node], name: &str) -> Option<&'a Element> {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.name == name {
                return Some(el);
            }
            if let Some(found) = find_element(&el.children, name) {
                return Some(found);
            }
        }
    }
    None
}

/// Resolve a named entity: the five XML ones plus the HTML entities that
/// show up in Evernote exports.
pub fn resolve_entity(name: &str) -> Option<&'static str> {
    let value = match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        "nbsp" => "\u{a0}",
        "ensp" => "\u{2002}",
        "emsp" => "\u{2003}",
        "thinsp" => "\u{2009}",
        "zwnj" => "\u{200c}",
        "zwj" => "\u{200d}",
        "shy" => "\u{ad}",
        "copy" => "©",
        "reg" => "®",
        "trade" => "™",
        "mdash" => "—",
        "ndash" => "–",
        "hellip" => "…",
        "laquo" => "«",
        "raquo" => "»",
        "lsquo" => "‘",
        "rsquo" => "’",
        "ldquo" => "“",
        "rdquo" => "”",
        "bull" => "•",
        "middot" => "·",
        "deg" => "°",
        "plusmn" => "±",
        "times" => "×",
        "divide" => "÷",
        "euro" => "€",
        "pound" => "£",
        "yen" => "¥",
        "cent" => "¢",
        "sect" => "§",
        "para" => "¶",
        "iexcl" => "¡",
        "iquest" => "¿",
        "larr" => "←",
        "rarr" => "→",
        "uarr" => "↑",
        "darr" => "↓",
        "harr" => "↔",
        "frac12" => "½",
        "frac14" => "¼",
        "frac34" => "¾",
        "aacute" => "á",
        "agrave" => "à",
        "acirc" => "â",
        "auml" => "ä",
        "eacute" => "é",
        "egrave" => "è",
        "ecirc" => "ê",
        "iacute" => "í",
        "oacute" => "ó",
        "ouml" => "ö",
        "uacute" => "ú",
        "uuml" => "ü",
        "Auml" => "Ä",
        "Ouml" => "Ö",
        "Uuml" => "Ü",
        "szlig" => "ß",
        "ccedil" => "ç",
        "ntilde" => "ñ",
        _ => return None,
    };
    Some(value)
}

/// Parse an ENML body into a node list
pub fn parse(content: &str) -> Result<Vec<Node>, ConversionError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);

    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event()
            .map_err(|e| ConversionError::InvalidMarkup {
                position,
                details: e.to_string(),
            })?;

        match event {
            Event::Start(e) => stack.push(start_element(&e)),
            Event::Empty(e) => {
                let el = start_element(&e);
                append(&mut stack, &mut root, Node::Element(el));
            }
            Event::End(_) => {
                // quick-xml rejects mismatched end tags itself
                if let Some(el) = stack.pop() {
                    append(&mut stack, &mut root, Node::Element(el));
                }
            }
            Event::Text(e) => {
                let raw = String::from_utf8_lossy(&e);
                let text = unescape_with(&raw, resolve_entity).map_err(|err| {
                    ConversionError::InvalidMarkup {
                        position,
                        details: err.to_string(),
                    }
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.push_text(&text),
                    None => push_text(&mut root, &text),
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e);
                match stack.last_mut() {
                    Some(parent) => parent.push_text(&text),
                    None => push_text(&mut root, &text),
                }
            }
            Event::Eof => break,
            // declaration, doctype, comments, processing instructions
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(ConversionError::UnclosedElement { element: open.name });
    }

    Ok(root)
}

fn start_element(e: &BytesStart<'_>) -> Element {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
    let mut el = Element::new(name);

    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_ascii_lowercase();
        let raw = String::from_utf8_lossy(&attr.value).into_owned();
        let value = match unescape_with(&raw, resolve_entity) {
            Ok(value) => value.into_owned(),
            Err(_) => raw,
        };
        el.attrs.push((key, value));
    }

    el
}

fn append(stack: &mut [Element], root: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => root.push(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element(nodes: &[Node]) -> &Element {
        nodes
            .iter()
            .find_map(|n| match n {
                Node::Element(el) => Some(el),
                Node::Text(_) => None,
            })
            .unwrap()
    }

    #[test]
    fn test_parse_strips_prolog() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE en-note SYSTEM "http://xml.evernote.com/pub/enml2.dtd">
<en-note><div>Hello</div></en-note>"#;

        let nodes = parse(xml).unwrap();
        let note = find_element(&nodes, "en-note").unwrap();
        assert_eq!(note.text_content(), "Hello");
    }

    #[test]
    fn test_parse_attributes_and_empty_elements() {
        let nodes = parse(r#"<en-note><en-media hash="ABC" type="image/png"/></en-note>"#).unwrap();
        let media = find_element(&nodes, "en-media").unwrap();
        assert_eq!(media.attr("hash"), Some("ABC"));
        assert_eq!(media.attr("TYPE"), Some("image/png"));
        assert!(media.children.is_empty());
    }

    #[test]
    fn test_parse_resolves_entities() {
        let nodes = parse("<p>a&nbsp;b &amp; c&mdash;d &#65;</p>").unwrap();
        assert_eq!(first_element(&nodes).text_content(), "a\u{a0}b & c—d A");
    }

    #[test]
    fn test_parse_unknown_entity_fails() {
        assert!(matches!(
            parse("<p>&bogus;</p>"),
            Err(ConversionError::InvalidMarkup { .. })
        ));
    }

    #[test]
    fn test_parse_mismatched_tags_fails() {
        assert!(matches!(
            parse("<en-note><b>bold</i></en-note>"),
            Err(ConversionError::InvalidMarkup { .. })
        ));
    }

    #[test]
    fn test_parse_unclosed_element_fails() {
        match parse("<en-note><div>open") {
            Err(ConversionError::UnclosedElement { element }) => assert_eq!(element, "div"),
            other => panic!("expected unclosed element, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_lowercases_names() {
        let nodes = parse("<DIV Style=\"x\">t</DIV>").unwrap();
        let div = first_element(&nodes);
        assert_eq!(div.name, "div");
        assert_eq!(div.attr("style"), Some("x"));
    }

    #[test]
    fn test_parse_fragment_without_root() {
        let nodes = parse("plain <b>text</b>").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0], Node::Text("plain ".to_string()));
    }
}
