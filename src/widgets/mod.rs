//! Expansion of template markup into editor widget descriptors.
//!
//! Dispatch is on the element name only. Widget elements render to one
//! `oxy_editor(...)` descriptor each, `dialog` and `datalist` register their
//! content in the model, and any other element is a transparent container.

pub mod descriptor;
pub mod style;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::PathBuf;

use crate::compiler::actions::SimpleAction;
use crate::compiler::expressions::{
    literal, literal_call_argument, strip_braces, strip_markers, xpath_call, xpath_property,
    XPATH_START,
};
use crate::compiler::ids::{IdGenerator, SIMPLE_ACTION_PREFIX};
use crate::model::{CompilationModel, Dialog};
use crate::parser::{local_name, MarkupElement, MarkupNode, NodeKind, XQueryParser};
use crate::{Error, Result};

pub use descriptor::{PropertyValue, WidgetDescriptor};
pub use style::WidgetStyle;

/// Renderer and editor class of tree widgets
pub const TREE_CONTROL_CLASS: &str = "ro.kuberam.oxygen.addonBuilder.templates.java.tree.TreeFormControl";

/// Form controls the host provides under their own type name
pub const BUILTIN_FORM_CONTROLS: [&str; 1] = ["combo"];

/// Owner tag of registered dialogs
pub const DIALOG_OWNER: &str = "OxygenAddonBuilder";

/// Data attributes consumed by the widgets themselves
const CONSUMED_DATA_ATTRIBUTES: [&str; 4] = ["data-ua-ref", "data-ua-appearance", "data-ua-type", "data-src"];

static BETWEEN_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").unwrap());

/// Skeleton of generated tree-generator templates, read on first use
#[derive(Debug, Default)]
pub struct TreeTemplate {
    path: Option<PathBuf>,
    skeleton: Option<String>,
}

impl TreeTemplate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            skeleton: None,
        }
    }

    /// In-memory skeleton, for tests and embedders
    pub fn from_skeleton(skeleton: impl Into<String>) -> Self {
        Self {
            path: None,
            skeleton: Some(skeleton.into()),
        }
    }

    /// `prolog` followed by the skeleton
    pub fn base(&mut self, prolog: &str) -> Result<String> {
        if self.skeleton.is_none() {
            let path = self.path.as_ref().ok_or_else(|| {
                Error::Config("a tree widget needs a tree template file".to_string())
            })?;
            let skeleton = fs::read_to_string(path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            debug!("loaded tree template from {}", path.display());
            self.skeleton = Some(skeleton);
        }
        Ok(format!("{}{}", prolog, self.skeleton.as_deref().unwrap_or_default()))
    }
}

/// Expands the markup of one template declaration
pub struct WidgetExpander<'a> {
    pub template_id: &'a str,
    pub model: &'a mut CompilationModel,
    pub simple_actions: &'a mut Vec<SimpleAction>,
    pub ids: &'a mut IdGenerator,
    pub tree_template: &'a mut TreeTemplate,
}

impl WidgetExpander<'_> {
    /// Expanded items separated by single spaces
    pub fn expand(&mut self, nodes: &[MarkupNode]) -> Result<String> {
        let mut items = Vec::new();
        for node in nodes {
            self.expand_node(node, &mut items)?;
        }
        Ok(items.join(" ").trim().to_string())
    }

    fn expand_node(&mut self, node: &MarkupNode, items: &mut Vec<String>) -> Result<()> {
        let item = match node {
            MarkupNode::Text(text) => text_item(text)?,
            MarkupNode::Element(element) => match element.name.as_str() {
                "button" => self.button(element),
                "input" => input(element),
                "select" => select(element),
                "textarea" => textarea(element),
                "template" => {
                    process_oxy_get_template(strip_markers(element.text_content().trim()).trim())?
                }
                "dialog" => self.dialog(element),
                "datalist" => {
                    self.datalist(element)?;
                    String::new()
                }
                "tree" => self.tree(element)?,
                _ => {
                    for child in &element.children {
                        self.expand_node(child, items)?;
                    }
                    return Ok(());
                }
            },
        };

        if !item.is_empty() {
            items.push(item);
        }
        Ok(())
    }

    fn button(&mut self, element: &MarkupElement) -> String {
        let mut descriptor = WidgetDescriptor::of_type("button");
        let mut action_id = None;

        for (name, value) in &element.attributes {
            match name.as_str() {
                "onclick" => {
                    let handler = strip_markers(value);
                    if let Some(id) = literal_call_argument(&handler, "execute-action-by-name") {
                        descriptor.set("actionID", PropertyValue::Text(id.clone()));
                        action_id = Some(id);
                    }
                    if let Some(template_id) = literal_call_argument(&handler, "show-template") {
                        let id = self.ids.mint(SIMPLE_ACTION_PREFIX);
                        self.simple_actions.push(SimpleAction {
                            id: id.clone(),
                            name: element.text_content().trim().to_string(),
                            template_id,
                        });
                        descriptor.set("actionID", PropertyValue::Text(id.clone()));
                        action_id = Some(id);
                    }
                    if let Some(query) = literal_call_argument(&handler, "xquery") {
                        descriptor.set("action", PropertyValue::Raw(format!("@{query}")));
                    }
                }
                "style" => {
                    for (property, value) in style::declarations(value) {
                        match property {
                            "background-color" if value.starts_with("transparent") => {
                                descriptor.set("transparent", PropertyValue::Bool(true));
                            }
                            "visibility" => descriptor.set("visible", expression_value(value)),
                            "color" => descriptor.set("color", PropertyValue::Text(value.to_string())),
                            _ => {}
                        }
                    }
                }
                "disabled" if value.is_empty() => descriptor.set("disabled", PropertyValue::Bool(true)),
                "disabled" => descriptor.set("disabled", expression_value(value)),
                _ => forward_data_attribute(&mut descriptor, name, value),
            }
        }

        if action_id.is_some_and(|id| self.model.caret_actions.contains(&id)) {
            descriptor.set("actionContext", PropertyValue::Text("caret".to_string()));
        }
        descriptor.to_string()
    }

    fn dialog(&mut self, element: &MarkupElement) -> String {
        let style = WidgetStyle::parse("dialog", element.attr("style"));
        let markup = element.to_xml();

        self.model.dialogs.insert(
            self.template_id.to_string(),
            Dialog {
                id: self.template_id.to_string(),
                kind: element.attr("data-ua-type").unwrap_or("modal").to_string(),
                title: element.attr("title").unwrap_or_default().to_string(),
                width: style.width,
                height: style.height,
                resize: style.resize,
                margin: style.margin,
                data_src: element.attr("data-src").unwrap_or_default().to_string(),
                owner: DIALOG_OWNER.to_string(),
                markup: markup.clone(),
            },
        );
        debug!("template '{}' registered as a dialog", self.template_id);
        markup
    }

    fn datalist(&mut self, element: &MarkupElement) -> Result<()> {
        let Some(id) = element.attr("id") else {
            debug!("datalist without id ignored");
            return Ok(());
        };
        let labels = options(element)
            .map(|(_, label)| label)
            .collect::<Vec<_>>()
            .join(",");

        self.model.declare_template(id, labels.clone())?;
        self.model.datalists.insert(id.to_string(), labels);
        Ok(())
    }

    fn tree(&mut self, element: &MarkupElement) -> Result<String> {
        let mut descriptor = WidgetDescriptor::new();
        descriptor.set("rendererClassName", PropertyValue::Text(TREE_CONTROL_CLASS.to_string()));
        descriptor.set("swingEditorClassName", PropertyValue::Text(TREE_CONTROL_CLASS.to_string()));
        for (name, value) in &element.attributes {
            match name.as_str() {
                "data-ua-ref" => descriptor.set_edit(&edit_reference(value)),
                _ => forward_data_attribute(&mut descriptor, name, value),
            }
        }

        let style = WidgetStyle::parse("tree", element.attr("style"));
        descriptor.set("columns", PropertyValue::Number(style.width));
        descriptor.set("rows", PropertyValue::Number(style.height));

        let tree_item = element
            .find_descendant("treeitem")
            .map(|item| strip_markers(item.text_content().trim()).replace("ua:context()", "$node"))
            .unwrap_or_default();
        let item_template = element
            .find_descendant("itemtemplate")
            .map(|template| BETWEEN_TAGS.replace_all(template.inner_xml().trim(), "><").into_owned())
            .unwrap_or_default();

        let generated_id = self.ids.next_token();
        descriptor.set("treeGeneratorTemplateId", PropertyValue::Text(generated_id.clone()));

        let root_nodes = descriptor.edit_value().unwrap_or_default().to_string();
        let generated = self
            .tree_template
            .base(&self.model.prolog)?
            .replace("${root-nodes-path}", &format!("\"{root_nodes}\""))
            .replace("${root-nodes}", &root_nodes)
            .replace("${treeitem}", &tree_item)
            .replace("${item-template}", &item_template)
            .replace("${tree-height}", &format!("{}px", style.height));

        self.model.declare_template(&generated_id, generated.clone())?;
        self.model.tree_templates.insert(generated_id, generated);
        Ok(descriptor.to_string())
    }
}

fn input(element: &MarkupElement) -> String {
    let mut descriptor = WidgetDescriptor::of_type("text");
    for (name, value) in &element.attributes {
        match name.as_str() {
            "data-ua-ref" => descriptor.set_edit(&edit_reference(value)),
            "size" => descriptor.set("columns", number_value(value)),
            "list" => descriptor.set("values", PropertyValue::Text(format!("@{value}"))),
            _ => forward_data_attribute(&mut descriptor, name, value),
        }
    }
    descriptor.to_string()
}

fn select(element: &MarkupElement) -> String {
    let popup = element.attr("data-ua-appearance") == Some("oxy:popupWithMultipleSelection");
    let multiple = element.has_attr("multiple");

    let mut descriptor = match (multiple, popup) {
        (false, _) => WidgetDescriptor::of_type("combo"),
        (true, true) => WidgetDescriptor::of_type("popupSelection"),
        (true, false) => WidgetDescriptor::new(),
    };
    if !multiple || popup {
        if let Some(reference) = element.attr("data-ua-ref") {
            descriptor.set_edit(&edit_reference(reference));
        }
    }

    let (values, labels): (Vec<_>, Vec<_>) = options(element).unzip();
    descriptor.set("values", PropertyValue::Text(values.join(",")));
    descriptor.set("labels", PropertyValue::Text(labels.join(",")));

    let style = WidgetStyle::parse("select", element.attr("style"));
    descriptor.set("columns", PropertyValue::Number(style.width));

    if !multiple {
        if let Some(editable) = element.attr("contenteditable") {
            descriptor.set("editable", PropertyValue::from_attribute(editable));
        }
    } else if popup {
        descriptor.set("selectionMode", PropertyValue::Text("multiple".to_string()));
    }

    for (name, value) in &element.attributes {
        forward_data_attribute(&mut descriptor, name, value);
    }
    descriptor.to_string()
}

fn textarea(element: &MarkupElement) -> String {
    let mut descriptor = WidgetDescriptor::of_type("textArea");
    for (name, value) in &element.attributes {
        match name.as_str() {
            "data-ua-ref" => descriptor.set_edit(&edit_reference(value)),
            "cols" => descriptor.set("columns", number_value(value)),
            "rows" => descriptor.set("rows", number_value(value)),
            _ => forward_data_attribute(&mut descriptor, name, value),
        }
    }
    descriptor.to_string()
}

/// `(value, label)` of every `option` child; each falls back to the other
fn options(element: &MarkupElement) -> impl Iterator<Item = (String, String)> + '_ {
    element
        .elements()
        .filter(|child| child.name == "option")
        .map(|option| {
            let text = option.text_content().trim().to_string();
            let label = option.attr("label").map_or(text, str::to_string);
            let value = option.attr("value").map_or_else(|| label.clone(), str::to_string);
            (value, label)
        })
}

/// Property for a text node of template markup
fn text_item(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(String::new());
    }
    if text.contains("oxy:get-template(") {
        return process_oxy_get_template(strip_markers(text).trim());
    }
    if text.contains(XPATH_START) {
        return Ok(xpath_property(text));
    }
    Ok(PropertyValue::Text(text.to_string()).to_string())
}

/// Node reference of a `data-ua-ref` attribute
fn edit_reference(value: &str) -> String {
    strip_markers(strip_braces(value)).trim().to_string()
}

fn expression_value(value: &str) -> PropertyValue {
    if value.contains(XPATH_START) {
        PropertyValue::Raw(xpath_property(value))
    } else {
        PropertyValue::from_attribute(value)
    }
}

fn number_value(value: &str) -> PropertyValue {
    match value.trim().parse() {
        Ok(number) => PropertyValue::Number(number),
        Err(_) => PropertyValue::Text(value.to_string()),
    }
}

/// Forward `data-*` attributes as custom properties
fn forward_data_attribute(descriptor: &mut WidgetDescriptor, name: &str, value: &str) {
    let Some(property) = name.strip_prefix("data-") else {
        return;
    };
    if CONSUMED_DATA_ATTRIBUTES.contains(&name) {
        return;
    }
    descriptor.set(property, PropertyValue::from_attribute(value));
}

/// Expand an `oxy:get-template("name", map {...})` reference into a builtin
/// form-control descriptor. Text without such a reference is returned as is.
pub fn process_oxy_get_template(text: &str) -> Result<String> {
    if !text.contains("oxy:get-template(") {
        return Ok(text.to_string());
    }

    let module = XQueryParser::parse(text)?;
    let Some(body) = module.body.as_ref() else {
        return Ok(text.to_string());
    };
    let call = body.function_calls().into_iter().find(|call| {
        call.as_call()
            .is_some_and(|(name, _)| name.starts_with("oxy:") && local_name(name) == "get-template")
    });
    let Some((_, args)) = call.and_then(|call| call.as_call()) else {
        return Ok(text.to_string());
    };

    let mut descriptor = WidgetDescriptor::new();
    let control = args.first().map(|arg| literal(arg, text)).unwrap_or_default();
    if BUILTIN_FORM_CONTROLS.contains(&control.as_str()) {
        descriptor.set("type", PropertyValue::Keyword(control));
    } else {
        descriptor.set("rendererClassName", PropertyValue::Text(control.clone()));
        descriptor.set("swingEditorClassName", PropertyValue::Text(control));
    }

    if let Some(NodeKind::Map(entries)) = args.get(1).map(|arg| &arg.kind) {
        for entry in entries {
            let key = literal(&entry.key, text);
            let value = match entry.value.string_value() {
                Some(value) => PropertyValue::Text(value.to_string()),
                None => PropertyValue::Raw(xpath_call(entry.value.text(text))),
            };
            descriptor.set(&key, value);
        }
    }
    Ok(descriptor.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TemplateParser;

    struct Fixture {
        model: CompilationModel,
        simple_actions: Vec<SimpleAction>,
        ids: IdGenerator,
        tree_template: TreeTemplate,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                model: CompilationModel::new(),
                simple_actions: Vec::new(),
                ids: IdGenerator::seeded(5),
                tree_template: TreeTemplate::from_skeleton(
                    "tree(${root-nodes}, ${root-nodes-path}, ${treeitem}, '${item-template}', '${tree-height}')",
                ),
            }
        }

        fn try_expand(&mut self, markup: &str) -> Result<String> {
            let nodes = TemplateParser::parse(markup).unwrap();
            WidgetExpander {
                template_id: "form",
                model: &mut self.model,
                simple_actions: &mut self.simple_actions,
                ids: &mut self.ids,
                tree_template: &mut self.tree_template,
            }
            .expand(&nodes)
        }

        fn expand(&mut self, markup: &str) -> String {
            self.try_expand(markup).unwrap()
        }
    }

    #[test]
    fn test_text_and_input() {
        let mut fixture = Fixture::new();
        let out = fixture.expand(
            "<div>Name: <input data-ua-ref=\"oxy_xpath_start@nameoxy_xpath_end\" size=\"12\" list=\"langs\"/></div>",
        );
        assert_eq!(
            out,
            "\"Name:\" oxy_editor(type, text, edit, \"@name\", columns, 12, values, \"@langs\")"
        );
    }

    #[test]
    fn test_text_with_expression() {
        let mut fixture = Fixture::new();
        assert_eq!(
            fixture.expand("<p>Count: oxy_xpath_startcount(*)oxy_xpath_end</p>"),
            "\"Count: \" oxy_xpath(\"count(*)\")"
        );
    }

    #[test]
    fn test_button_by_name_with_caret_context() {
        let mut fixture = Fixture::new();
        fixture.model.caret_actions.insert("wrap".to_string());
        let out = fixture.expand(
            "<button onclick=\"oxy_xpath_startoxy:execute-action-by-name('wrap')oxy_xpath_end\" \
             style=\"background-color: transparent; color: red\" data-tooltip=\"Wrap\">W</button>",
        );
        assert_eq!(
            out,
            "oxy_editor(type, button, actionID, \"wrap\", transparent, true, color, \"red\", tooltip, \"Wrap\", actionContext, \"caret\")"
        );
    }

    #[test]
    fn test_button_show_template_mints_simple_action() {
        let mut fixture = Fixture::new();
        let out = fixture.expand("<button onclick=\"ua:show-template('dlg')\"> Open </button>");

        assert_eq!(fixture.simple_actions.len(), 1);
        let simple = &fixture.simple_actions[0];
        assert!(simple.id.starts_with("simpleAction"));
        assert_eq!(simple.name, "Open");
        assert_eq!(simple.template_id, "dlg");
        assert!(out.contains(&format!("actionID, \"{}\"", simple.id)));
    }

    #[test]
    fn test_button_xquery_and_disabled() {
        let mut fixture = Fixture::new();
        let out = fixture.expand(
            "<button onclick=\"oxy:xquery('search')\" disabled=\"oxy_xpath_start@lockedoxy_xpath_end\">S</button>",
        );
        assert_eq!(
            out,
            "oxy_editor(type, button, action, @search, disabled, oxy_xpath(\"@locked\"))"
        );
    }

    #[test]
    fn test_select_variants() {
        let mut fixture = Fixture::new();
        let options = "<option value=\"n\" label=\"Noun\"/><option value=\"v\" label=\"Verb\"/>";

        let combo = fixture.expand(&format!(
            "<select data-ua-ref=\"@pos\" contenteditable=\"false\">{options}</select>"
        ));
        assert_eq!(
            combo,
            "oxy_editor(type, combo, edit, \"@pos\", values, \"n,v\", labels, \"Noun,Verb\", columns, 20, editable, false)"
        );

        let popup = fixture.expand(&format!(
            "<select multiple=\"multiple\" data-ua-ref=\"@pos\" data-ua-appearance=\"oxy:popupWithMultipleSelection\" style=\"width: 30\">{options}</select>"
        ));
        assert_eq!(
            popup,
            "oxy_editor(type, popupSelection, edit, \"@pos\", values, \"n,v\", labels, \"Noun,Verb\", columns, 30, selectionMode, \"multiple\")"
        );

        let plain = fixture.expand(&format!("<select multiple=\"multiple\">{options}</select>"));
        assert!(!plain.contains("type,"));
        assert!(!plain.contains("selectionMode"));
    }

    #[test]
    fn test_textarea() {
        let mut fixture = Fixture::new();
        assert_eq!(
            fixture.expand("<textarea data-ua-ref=\"text()\" cols=\"40\" rows=\"3\"/>"),
            "oxy_editor(type, textArea, edit, \"#text\", columns, 40, rows, 3)"
        );
    }

    #[test]
    fn test_dialog_is_registered() {
        let mut fixture = Fixture::new();
        let out = fixture.expand("<dialog title=\"Pick\" style=\"width: 200px\"><p>Hi</p></dialog>");

        assert_eq!(out, "<dialog title=\"Pick\" style=\"width: 200px\"><p>Hi</p></dialog>");
        let dialog = &fixture.model.dialogs["form"];
        assert_eq!(dialog.kind, "modal");
        assert_eq!(dialog.title, "Pick");
        assert_eq!((dialog.width, dialog.height), (200, 300));
        assert_eq!(dialog.owner, "OxygenAddonBuilder");
    }

    #[test]
    fn test_datalist_registers_labels() {
        let mut fixture = Fixture::new();
        let out = fixture.expand(
            "<datalist id=\"langs\"><option label=\"en\"/><option label=\"ro\"/></datalist>",
        );
        assert_eq!(out, "");
        assert_eq!(fixture.model.datalists["langs"], "en,ro");
        assert_eq!(fixture.model.templates["langs"], "en,ro");
    }

    #[test]
    fn test_datalist_id_clash_is_a_duplicate_template() {
        let mut fixture = Fixture::new();
        fixture
            .model
            .declare_template("langs", "\"Languages\"".to_string())
            .unwrap();

        let err = fixture
            .try_expand("<datalist id=\"langs\"><option label=\"en\"/></datalist>")
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTemplate(id) if id == "langs"));
        assert_eq!(fixture.model.templates["langs"], "\"Languages\"");
        assert!(fixture.model.datalists.is_empty());
    }

    #[test]
    fn test_builtin_get_template() {
        let out = process_oxy_get_template(
            "oxy:get-template(\"combo\", map {\"edit\": \"@type\", \"values\": string-join(., ',')})",
        )
        .unwrap();
        assert_eq!(
            out,
            "oxy_editor(type, combo, edit, \"@type\", values, oxy_xpath(\"string-join(., ',')\"))"
        );

        let custom = process_oxy_get_template("oxy:get-template(\"ro.x.Picker\", map {})").unwrap();
        assert_eq!(
            custom,
            "oxy_editor(rendererClassName, \"ro.x.Picker\", swingEditorClassName, \"ro.x.Picker\")"
        );
        assert_eq!(process_oxy_get_template("\"plain\"").unwrap(), "\"plain\"");
    }

    #[test]
    fn test_tree_generates_template() {
        let mut fixture = Fixture::new();
        fixture.model.prolog = "declare namespace ua = \"u\"; ".to_string();
        let out = fixture.expand(
            "<tree data-ua-ref=\"//entry\" style=\"height: 5\">\
               <treeitem>oxy_xpath_startua:context()/senseoxy_xpath_end</treeitem>\
               <itemtemplate>\n  <span>x</span>\n  <b/>\n</itemtemplate>\
             </tree>",
        );

        assert_eq!(fixture.model.tree_templates.len(), 1);
        let (id, generated) = fixture.model.tree_templates.iter().next().unwrap();
        assert_eq!(id.len(), 32);
        assert_eq!(
            generated,
            "declare namespace ua = \"u\"; tree(//entry, \"//entry\", $node/sense, '<span>x</span><b/>', '5px')"
        );
        assert_eq!(&fixture.model.templates[id], generated);
        assert!(out.starts_with(&format!(
            "oxy_editor(rendererClassName, \"{TREE_CONTROL_CLASS}\", swingEditorClassName, \"{TREE_CONTROL_CLASS}\", edit, \"//entry\", columns, 40, rows, 5, treeGeneratorTemplateId, \"{id}\")"
        )));
    }

    #[test]
    fn test_tree_height_is_written_as_given() {
        let mut fixture = Fixture::new();
        fixture.expand(
            "<tree data-ua-ref=\"//entry\" style=\"height: 300000000\">\
               <itemtemplate><span>x</span></itemtemplate>\
             </tree>",
        );

        let generated = fixture.model.tree_templates.values().next().unwrap();
        assert!(generated.ends_with("'300000000px')"));
    }

    #[test]
    fn test_tree_template_file_is_required() {
        let mut template = TreeTemplate::default();
        assert!(matches!(template.base(""), Err(Error::Config(_))));

        let mut missing = TreeTemplate::new("/nonexistent/tree-template.xq");
        assert!(matches!(missing.base(""), Err(Error::Io { .. })));
    }
}
