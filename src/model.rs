//! Per-compilation state accumulated while walking an addon source

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{Error, Result};

/// Trigger phase of declarative event listeners
pub const LOAD_PHASE: &str = "load";

/// Everything the directive walk learns about an addon.
///
/// Owned by one compilation; the directive handlers and the widget expander are
/// the only writers.
#[derive(Debug, Clone, Default)]
pub struct CompilationModel {
    /// Variable values keyed by name including the `$` sigil
    pub variables: HashMap<String, String>,
    /// Expanded template content by template id
    pub templates: BTreeMap<String, String>,
    pub dialogs: BTreeMap<String, Dialog>,
    /// Comma-joined option labels by list id
    pub datalists: BTreeMap<String, String>,
    /// Ordered handler names by observer id
    pub observers: BTreeMap<String, Vec<String>>,
    /// Observer bindings keyed by compiled selector
    pub connect_observer_actions: BTreeMap<String, ObserverConnection>,
    pub node_selectors: BTreeMap<String, SelectorKind>,
    /// Action ids by trigger phase
    pub actions_by_name: BTreeMap<String, Vec<String>>,
    /// Action class names by trigger phase
    pub actions_by_class: BTreeMap<String, Vec<String>>,
    pub attached_templates: Vec<AttachedTemplate>,
    /// `@id: oxy_action(...);` declarations
    pub less_actions: Vec<String>,
    /// Generated tree-generator templates by generated id
    pub tree_templates: BTreeMap<String, String>,
    /// Actions whose modes run against the caret position
    pub caret_actions: BTreeSet<String>,
    /// Namespace and variable declarations, as prepended to generated queries
    pub prolog: String,
}

impl CompilationModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the content of a declared template
    pub fn declare_template(&mut self, id: &str, content: String) -> Result<()> {
        if self.templates.contains_key(id) {
            return Err(Error::DuplicateTemplate(id.to_string()));
        }
        self.templates.insert(id.to_string(), content);
        Ok(())
    }

    pub fn is_dialog(&self, template_id: &str) -> bool {
        self.dialogs.contains_key(template_id)
    }

    pub fn add_action_by_name(&mut self, phase: &str, action_id: String) {
        self.actions_by_name
            .entry(phase.to_string())
            .or_default()
            .push(action_id);
    }

    pub fn add_action_by_class(&mut self, phase: &str, class_name: String) {
        self.actions_by_class
            .entry(phase.to_string())
            .or_default()
            .push(class_name);
    }

    pub fn connect_observer(&mut self, connection: ObserverConnection) {
        self.node_selectors
            .insert(connection.selector.clone(), SelectorKind::Xpath);
        self.connect_observer_actions
            .insert(connection.selector.clone(), connection);
    }

    /// `selector{content: ...;}` lines, one per attached template
    pub fn attached_templates_stylesheet(&self) -> String {
        self.attached_templates
            .iter()
            .map(|attached| format!("{}{{content: {};}}\n", attached.selector, attached.content))
            .collect()
    }

    pub fn less_stylesheet(&self) -> String {
        self.less_actions
            .iter()
            .map(|declaration| format!("{declaration}\n"))
            .collect()
    }
}

/// Language of a compiled node selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Xpath,
}

/// A handler bound to the nodes a selector matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverConnection {
    pub handler: String,
    pub selector: String,
    pub options: ObserverOptions,
}

/// Mutation-observer options; unset flags are left to the host defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_filter: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_list: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtree: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_data: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_old_value: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_data_old_value: Option<bool>,
}

impl ObserverOptions {
    /// Set a boolean flag by its option name; returns false for unknown names
    pub fn set_flag(&mut self, name: &str, value: bool) -> bool {
        let slot = match name {
            "attributes" => &mut self.attributes,
            "childList" => &mut self.child_list,
            "subtree" => &mut self.subtree,
            "characterData" => &mut self.character_data,
            "attributeOldValue" => &mut self.attribute_old_value,
            "characterDataOldValue" => &mut self.character_data_old_value,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// A template rendered as a dialog window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dialog {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resize: String,
    pub margin: String,
    pub data_src: String,
    pub owner: String,
    pub markup: String,
}

/// A template shown for every node a selector matches
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedTemplate {
    pub selector: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_template_is_rejected() {
        let mut model = CompilationModel::new();
        model.declare_template("form", "\"a\"".to_string()).unwrap();

        match model.declare_template("form", "\"b\"".to_string()) {
            Err(Error::DuplicateTemplate(id)) => assert_eq!(id, "form"),
            other => panic!("expected duplicate template error, got {:?}", other),
        }
        assert_eq!(model.templates["form"], "\"a\"");
    }

    #[test]
    fn test_connect_observer_records_selector_kind() {
        let mut model = CompilationModel::new();
        model.connect_observer(ObserverConnection {
            handler: "refresh".to_string(),
            selector: "field[data-id]".to_string(),
            options: ObserverOptions::default(),
        });

        assert_eq!(model.node_selectors["field[data-id]"], SelectorKind::Xpath);
        assert_eq!(
            serde_json::to_string(&model.node_selectors).unwrap(),
            r#"{"field[data-id]":"xpath"}"#
        );
    }

    #[test]
    fn test_observer_options_serialize_camel_case() {
        let mut options = ObserverOptions {
            attribute_filter: Some(vec!["value".to_string()]),
            ..Default::default()
        };
        assert!(options.set_flag("childList", true));
        assert!(!options.set_flag("bogus", true));

        assert_eq!(
            serde_json::to_string(&options).unwrap(),
            r#"{"attributeFilter":["value"],"childList":true}"#
        );
    }

    #[test]
    fn test_stylesheets() {
        let mut model = CompilationModel::new();
        model.attached_templates.push(AttachedTemplate {
            selector: "entry".to_string(),
            content: "\"Entry\"".to_string(),
        });
        model.less_actions.push("@a: oxy_action();".to_string());

        assert_eq!(model.attached_templates_stylesheet(), "entry{content: \"Entry\";}\n");
        assert_eq!(model.less_stylesheet(), "@a: oxy_action();\n");
    }
}
