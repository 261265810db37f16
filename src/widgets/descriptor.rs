//! `oxy_editor(...)` widget descriptors

use std::fmt;

/// Value of one descriptor property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Bare identifier, e.g. `combo`
    Keyword(String),
    /// Quoted string
    Text(String),
    Number(u32),
    Bool(bool),
    /// Emitted verbatim (references, `oxy_xpath(...)` calls)
    Raw(String),
}

impl PropertyValue {
    /// Attribute text as a value: `true`/`false` become booleans, the rest text
    pub fn from_attribute(value: &str) -> Self {
        match value {
            "true" => PropertyValue::Bool(true),
            "false" => PropertyValue::Bool(false),
            _ => PropertyValue::Text(value.to_string()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Keyword(word) => write!(f, "{word}"),
            PropertyValue::Text(text) => write!(f, "\"{}\"", text.replace('"', "\\\"")),
            PropertyValue::Number(number) => write!(f, "{number}"),
            PropertyValue::Bool(flag) => write!(f, "{flag}"),
            PropertyValue::Raw(raw) => write!(f, "{raw}"),
        }
    }
}

/// Ordered property list of one editor widget
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidgetDescriptor {
    properties: Vec<(String, PropertyValue)>,
}

impl WidgetDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(kind: &str) -> Self {
        let mut descriptor = Self::new();
        descriptor.set("type", PropertyValue::Keyword(kind.to_string()));
        descriptor
    }

    /// Set a property; an existing property keeps its position
    pub fn set(&mut self, name: &str, value: PropertyValue) {
        match self.properties.iter_mut().find(|(key, _)| key == name) {
            Some(property) => property.1 = value,
            None => self.properties.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Bind the widget to a node; `text()` means the node's own text
    pub fn set_edit(&mut self, reference: &str) {
        let reference = if reference == "text()" { "#text" } else { reference };
        self.set("edit", PropertyValue::Text(reference.to_string()));
    }

    pub fn edit_value(&self) -> Option<&str> {
        match self.get("edit") {
            Some(PropertyValue::Text(edit)) => Some(edit),
            _ => None,
        }
    }
}

impl fmt::Display for WidgetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oxy_editor(")?;
        for (i, (name, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}, {value}")?;
        }
        write!(f, ")")
    }
}
