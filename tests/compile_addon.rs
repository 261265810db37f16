//! End-to-end compilation of addon directories

use addon_builder::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<serialized xml:space="preserve">
  <serializableOrderedMap>
    <entry>
      <String>document.types</String>
      <documentTypeDescriptor-array>
        <documentTypeDescriptor>
          <field name="actionsProvider">
            <action-array>
              <action><field name="id"><String>stale</String></field></action>
            </action-array>
          </field>
          <field name="name"><String>Dictionary &amp; Co</String></field>
        </documentTypeDescriptor>
      </documentTypeDescriptor-array>
    </entry>
  </serializableOrderedMap>
</serialized>
"#;

const ADDON: &str = r#"declare namespace tei = "http://www.tei-c.org/ns/1.0";
declare variable $label as xs:string := 'Entry';

ua:observer('entry-observer', 'reload redraw'),
ua:connect-observer('reload', ua-dt:xpath-selector('entry'),
    map {'attributes': true(), 'attributeFilter': ['value']}),
ua:action('add-sense', map {'name': 'Add sense', 'description': 'Adds a sense'},
    insert node <sense n="{count(./sense)}"/> as last into .),
ua:template('toolbar',
    <div>
        <button onclick="{oxy:execute-action-by-name('add-sense')}">Add</button>
        <select multiple="multiple" data-ua-ref="{@pos}" data-ua-appearance="oxy:popupWithMultipleSelection">
            <option value="n" label="Noun"/><option value="v" label="Verb"/>
        </select>
    </div>),
ua:attach-template(ua-dt:css-selector('entry'), 'toolbar'),
ua:add-event-listener(., 'load', oxy:execute-action-by-name('add-sense'))
"#;

struct AddonDir {
    dir: TempDir,
}

impl AddonDir {
    fn new(source: &str, descriptor: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("addon.xq"), source).unwrap();
        fs::write(dir.path().join("dictionary.framework"), descriptor).unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self) -> CompilerConfig {
        CompilerConfig::new(self.path(), "dictionary", self.path().join("out"))
    }

    fn descriptor(&self) -> String {
        fs::read_to_string(self.path().join("dictionary.framework")).unwrap()
    }

    fn artifact(&self, name: &str) -> String {
        fs::read_to_string(self.path().join("out").join(name)).unwrap()
    }
}

fn compile(addon: &AddonDir) -> CompilationModel {
    compile_addon_with_ids(&addon.config(), IdGenerator::seeded(42)).unwrap()
}

#[test]
fn test_compiles_addon_into_descriptor_and_artifacts() {
    let addon = AddonDir::new(ADDON, DESCRIPTOR);
    let model = compile(&addon);

    assert_eq!(model.observers["entry-observer"], vec!["reload", "redraw"]);
    assert_eq!(model.variables["$label"], "'Entry'");
    assert!(model.templates["toolbar"].contains("actionID, \"add-sense\""));
    assert!(model.templates["toolbar"].contains("type, popupSelection"));

    let descriptor = addon.descriptor();
    assert!(!descriptor.contains("stale"));
    assert!(descriptor.contains("<String>add-sense</String>"));
    assert!(descriptor.contains("<String>Add sense</String>"));
    assert!(descriptor.contains("$ua:context/sense"));
    assert!(descriptor.contains("InsertOperation"));

    let connections: serde_json::Value =
        serde_json::from_str(&addon.artifact("connect-observers.json")).unwrap();
    assert_eq!(connections["entry"]["handler"], "reload");
    assert_eq!(connections["entry"]["options"]["attributes"], true);
    assert_eq!(
        connections["entry"]["options"]["attributeFilter"],
        serde_json::json!(["value"])
    );

    let by_name: serde_json::Value =
        serde_json::from_str(&addon.artifact("actions-by-name.json")).unwrap();
    assert_eq!(by_name["load"], serde_json::json!(["add-sense"]));

    let attached = addon.artifact("attached-templates.less");
    assert!(attached.starts_with("entry{content: "));
    assert!(attached.contains("actionID, \"add-sense\""));
}

#[test]
fn test_merge_keeps_the_rest_of_the_descriptor() {
    let addon = AddonDir::new(ADDON, DESCRIPTOR);
    compile(&addon);

    let descriptor = addon.descriptor();
    let head = &DESCRIPTOR[..DESCRIPTOR.find("<action-array>").unwrap()];
    let tail = &DESCRIPTOR[DESCRIPTOR.find("</action-array>").unwrap() + "</action-array>".len()..];
    assert!(descriptor.starts_with(head));
    assert!(descriptor.ends_with(tail));
    assert!(descriptor.contains("<String>Dictionary &amp; Co</String>"));
}

#[test]
fn test_seeded_compilations_are_reproducible() {
    let source = r#"
ua:template('dlg', <dialog title="Pick"><p>Choose</p></dialog>),
ua:template('bar', <button onclick="{ua:show-template('dlg')}">Pick</button>)
"#;
    let first = AddonDir::new(source, DESCRIPTOR);
    let second = AddonDir::new(source, DESCRIPTOR);
    compile(&first);
    compile(&second);

    let descriptor = first.descriptor();
    assert!(descriptor.contains("simpleAction"));
    assert_eq!(descriptor, second.descriptor());
    assert_eq!(first.artifact("dialogs.json"), second.artifact("dialogs.json"));
}

#[test]
fn test_duplicate_template_fails_without_writing() {
    let addon = AddonDir::new("(ua:template('t', 'a'), ua:template('t', 'b'))", DESCRIPTOR);
    let err = compile_addon_with_ids(&addon.config(), IdGenerator::seeded(1)).unwrap_err();

    assert!(matches!(err, Error::DuplicateTemplate(ref id) if id == "t"));
    assert_eq!(addon.descriptor(), DESCRIPTOR);
    assert!(!addon.path().join("out").exists());
}

#[test]
fn test_missing_action_array_fails_before_any_write() {
    let descriptor = "<serialized><map/></serialized>";
    let addon = AddonDir::new(ADDON, descriptor);
    let err = compile_addon_with_ids(&addon.config(), IdGenerator::seeded(1)).unwrap_err();

    assert!(matches!(err, Error::Descriptor(_)));
    assert_eq!(addon.descriptor(), descriptor);
    assert!(!addon.path().join("out").exists());
}

#[test]
fn test_missing_source_names_the_file() {
    let addon = AddonDir::new(ADDON, DESCRIPTOR);
    fs::remove_file(addon.path().join("addon.xq")).unwrap();

    let err = compile_addon_with_ids(&addon.config(), IdGenerator::seeded(1)).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert!(err.to_string().contains("addon.xq"));
}

#[test]
fn test_tree_widget_writes_generator_template() {
    let source = r#"
ua:template('senses',
    <tree data-ua-ref="//entry">
        <treeitem>{ua:context()/sense}</treeitem>
        <itemtemplate><span>sense</span></itemtemplate>
    </tree>)
"#;
    let addon = AddonDir::new(source, DESCRIPTOR);
    fs::create_dir_all(addon.path().join("target")).unwrap();
    fs::write(
        addon.path().join("target/tree-template.xq"),
        "tree(${root-nodes}, '${item-template}', '${tree-height}')",
    )
    .unwrap();

    let model = compile(&addon);
    assert_eq!(model.tree_templates.len(), 1);
    let (id, generated) = model.tree_templates.iter().next().unwrap();
    assert!(generated.starts_with("declare namespace ua = "));
    assert!(generated.ends_with("tree(//entry, '<span>sense</span>', '10px')"));
    assert!(model.templates["senses"].contains(&format!("treeGeneratorTemplateId, \"{id}\"")));

    let written = fs::read_to_string(
        addon
            .path()
            .join("out")
            .join("tree-templates")
            .join(format!("{id}.xq")),
    )
    .unwrap();
    assert_eq!(&written, generated);
}

#[test]
fn test_byte_order_mark_is_ignored() {
    let addon = AddonDir::new("\u{feff}ua:observer('o', 'a')", DESCRIPTOR);
    let model = compile(&addon);
    assert_eq!(model.observers["o"], vec!["a"]);
}

#[test]
fn test_invalid_config_is_rejected() {
    let addon = AddonDir::new(ADDON, DESCRIPTOR);
    let config = CompilerConfig::new(addon.path(), "", addon.path().join("out"));
    assert!(matches!(compile_addon(&config), Err(Error::Config(_))));
}

fn compile_in_memory(source: &str) -> CompilationOutput {
    Compiler::new().compile_source(source).unwrap()
}

#[test]
fn test_declared_observer_keeps_handler_order() {
    let out = compile_in_memory(r#"ua:declare-observer("refresh", "reload redraw")"#);
    assert_eq!(out.model.observers["refresh"], vec!["reload", "redraw"]);
}

#[test]
fn test_connect_observer_on_attribute_selector() {
    let out = compile_in_memory(
        r#"ua:connect-observer("refresh", ua-dt:css-selector("field[data-id]"),
               map {"attributeFilter": ["value"]})"#,
    );

    let connection = &out.model.connect_observer_actions["field[data-id]"];
    assert_eq!(connection.handler, "refresh");
    assert_eq!(
        connection.options.attribute_filter,
        Some(vec!["value".to_string()])
    );
    assert!(out.model.node_selectors.contains_key("field[data-id]"));
}

#[test]
fn test_plain_onclick_handler_binds_action() {
    let out = compile_in_memory(
        r#"ua:template("bar", <button onclick="oxy:execute-action-by-name('save')">Save</button>)"#,
    );
    assert!(out.model.templates["bar"].starts_with("oxy_editor(type, button, actionID, \"save\""));
}

#[test]
fn test_unseeded_runs_differ_only_in_generated_ids() {
    let source = r#"
ua:action('clean', map {'name': 'Clean'}, (delete node @a, delete node @b)),
ua:template('dlg', <dialog title="Pick"><p>Choose</p></dialog>),
ua:template('bar', <button onclick="{ua:show-template('dlg')}">Pick</button>)
"#;
    let first = AddonDir::new(source, DESCRIPTOR);
    let second = AddonDir::new(source, DESCRIPTOR);
    compile_addon(&first.config()).unwrap();
    compile_addon(&second.config()).unwrap();

    let generated = regex::Regex::new(r"(derivedAction|simpleAction)[0-9a-f]{32}").unwrap();
    let (first, second) = (first.descriptor(), second.descriptor());
    assert_ne!(first, second);
    assert_eq!(
        generated.replace_all(&first, "$1"),
        generated.replace_all(&second, "$1")
    );
}
