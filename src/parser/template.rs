//! Parser for the markup bodies of template declarations

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// A node of template markup
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Element(MarkupElement),
    Text(String),
}

/// An element of template markup; attributes keep their source order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarkupElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<MarkupNode>,
}

impl MarkupElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Child elements, skipping text
    pub fn elements(&self) -> impl Iterator<Item = &MarkupElement> {
        self.children.iter().filter_map(|child| match child {
            MarkupNode::Element(element) => Some(element),
            MarkupNode::Text(_) => None,
        })
    }

    /// Concatenated text of all descendants
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                MarkupNode::Text(text) => out.push_str(text),
                MarkupNode::Element(element) => out.push_str(&element.text_content()),
            }
        }
        out
    }

    /// First descendant element with the given name, in document order
    pub fn find_descendant(&self, name: &str) -> Option<&MarkupElement> {
        self.elements().find_map(|element| {
            if element.name == name {
                Some(element)
            } else {
                element.find_descendant(name)
            }
        })
    }

    /// Serialise this element back to XML text
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    /// Serialised content of this element, without its own tags
    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_xml(&mut out);
        }
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }

        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl MarkupNode {
    fn write_xml(&self, out: &mut String) {
        match self {
            MarkupNode::Element(element) => element.write_xml(out),
            MarkupNode::Text(text) => out.push_str(&escape(text.as_str())),
        }
    }
}

/// Parses template markup into a list of top-level nodes
pub struct TemplateParser;

impl TemplateParser {
    /// Parse a markup fragment; several top-level nodes are allowed
    pub fn parse(markup: &str) -> Result<Vec<MarkupNode>, String> {
        // the only HTML entity templates use that XML does not predefine
        let markup = markup.replace("&nbsp;", "&#160;");
        let mut reader = Reader::from_str(&markup);

        let mut stack: Vec<MarkupElement> = Vec::new();
        let mut roots = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| format!("at byte {}: {}", reader.buffer_position(), e))?;

            match event {
                Event::Start(start) => stack.push(Self::element(&start)?),
                Event::Empty(start) => {
                    let element = Self::element(&start)?;
                    Self::append(&mut stack, &mut roots, MarkupNode::Element(element));
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| "unexpected closing tag".to_string())?;
                    Self::append(&mut stack, &mut roots, MarkupNode::Element(element));
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| e.to_string())?;
                    let text = text.replace('\u{a0}', " ");
                    Self::append(&mut stack, &mut roots, MarkupNode::Text(text));
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    Self::append(&mut stack, &mut roots, MarkupNode::Text(text));
                }
                Event::Eof => break,
                // comments, declarations and processing instructions carry no widgets
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(format!("unclosed element <{}>", open.name));
        }

        Ok(roots)
    }

    fn element(start: &BytesStart<'_>) -> Result<MarkupElement, String> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();

        for attribute in start.html_attributes() {
            let attribute = attribute.map_err(|e| format!("in <{name}>: {e}"))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| format!("in <{name}> attribute {key}: {e}"))?
                .replace('\u{a0}', " ");
            attributes.push((key, value));
        }

        Ok(MarkupElement {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn append(stack: &mut [MarkupElement], roots: &mut Vec<MarkupNode>, node: MarkupNode) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }
}
