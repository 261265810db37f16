//! Typed actions and the translation of action bodies into action modes

use log::{debug, warn};
use std::collections::BTreeSet;

use super::expressions::{find_call, literal, render, render_with_context};
use super::ids::{IdGenerator, DERIVED_ACTION_PREFIX};
use crate::parser::{InsertPosition, Node, NodeKind};

/// Display metadata every action carries, in output order
pub const ACTION_FIELDS: [&str; 6] = [
    "name",
    "description",
    "largeIconPath",
    "smallIconPath",
    "accessKey",
    "accelerator",
];

/// Host operation run by an action mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Rename,
    Insert,
    Delete,
    Replace,
    ExecuteMultiple,
    SurroundWithFragment,
    XQuery,
    ShowDialog,
    /// Operation named by its implementing class
    ByClass(String),
    Void,
}

impl Operation {
    pub fn id(&self) -> &str {
        match self {
            Operation::Rename => "ro.sync.ecss.extensions.commons.operations.RenameElementOperation",
            Operation::Insert => "ro.kuberam.oxygen.addonBuilder.operations.InsertOperation",
            Operation::Delete => "ro.kuberam.oxygen.addonBuilder.operations.DeleteOperation",
            Operation::Replace => "ro.kuberam.oxygen.addonBuilder.operations.ReplaceOperation",
            Operation::ExecuteMultiple => {
                "ro.sync.ecss.extensions.commons.operations.ExecuteMultipleActionsOperation"
            }
            Operation::SurroundWithFragment => {
                "ro.sync.ecss.extensions.commons.operations.SurroundWithFragmentOperation"
            }
            Operation::XQuery => "ro.sync.ecss.extensions.commons.operations.XQueryOperation",
            Operation::ShowDialog => "ro.kuberam.oxygen.addonBuilder.operations.ShowDialog",
            Operation::ByClass(class_name) => class_name,
            Operation::Void => "ro.kuberam.oxygen.addonBuilder.operations.VoidOperation",
        }
    }
}

/// One guarded variant of an action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionMode {
    /// Path expression guarding the mode; empty means always
    pub condition: String,
    pub arguments: Vec<(String, String)>,
    pub operation: Operation,
}

impl ActionMode {
    pub fn new(operation: Operation) -> Self {
        Self {
            condition: String::new(),
            arguments: Vec::new(),
            operation,
        }
    }

    pub fn with_argument(mut self, name: &str, value: impl Into<String>) -> Self {
        self.arguments.push((name.to_string(), value.into()));
        self
    }

    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A host-invocable action
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub id: String,
    /// Display metadata: the fixed fields first, then extra parameters in source order
    pub fields: Vec<(String, String)>,
    pub modes: Vec<ActionMode>,
}

impl Action {
    pub fn new(id: impl Into<String>, parameters: &[(String, String)]) -> Self {
        let mut fields: Vec<(String, String)> = ACTION_FIELDS
            .iter()
            .map(|name| (name.to_string(), String::new()))
            .collect();

        for (key, value) in parameters {
            match fields.iter_mut().find(|(name, _)| name == key) {
                Some(field) => field.1 = value.clone(),
                None => fields.push((key.clone(), value.clone())),
            }
        }

        Self {
            id: id.into(),
            fields,
            modes: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A button action that opens a template as a dialog
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleAction {
    pub id: String,
    pub name: String,
    pub template_id: String,
}

impl SimpleAction {
    pub fn into_action(self) -> Action {
        let mut action = Action::new(self.id, &[("name".to_string(), self.name)]);
        action
            .modes
            .push(ActionMode::new(Operation::ShowDialog).with_argument("dialogId", self.template_id));
        action
    }
}

/// Actions synthesised during the walk, emitted after the declared ones
#[derive(Debug, Default)]
pub struct ActionQueues {
    pub derived: Vec<Action>,
    pub simple: Vec<SimpleAction>,
}

impl ActionQueues {
    /// Declared actions, then derived, then simple
    pub fn drain_after(self, declared: Vec<Action>) -> Vec<Action> {
        let mut actions = declared;
        actions.extend(self.derived);
        actions.extend(self.simple.into_iter().map(SimpleAction::into_action));
        actions
    }
}

/// Translates action bodies into action modes.
///
/// Holds only what translation touches: the id source, the derived-action queue
/// and the set of actions that need the caret context.
pub struct ActionTranslator<'a> {
    pub source: &'a str,
    pub ids: &'a mut IdGenerator,
    pub derived: &'a mut Vec<Action>,
    pub caret_actions: &'a mut BTreeSet<String>,
}

impl<'a> ActionTranslator<'a> {
    /// One mode per conditional branch of `body`
    pub fn translate(&mut self, action_id: &str, body: &Node) -> Vec<ActionMode> {
        collect_branches(body, self.source)
            .into_iter()
            .map(|(condition, branch)| {
                let mut mode = self.branch_mode(action_id, branch);
                mode.condition = condition;
                mode
            })
            .collect()
    }

    fn branch_mode(&mut self, action_id: &str, branch: &Node) -> ActionMode {
        let updates = branch.find_outermost(&Node::is_update);

        match updates.as_slice() {
            [] => self.fallback_mode(action_id, branch),
            [update] => update_mode(update, self.source),
            _ => {
                // every id is followed by a carriage return
                let mut action_ids = String::new();
                for update in updates.iter() {
                    let id = self.ids.mint(DERIVED_ACTION_PREFIX);
                    let mut derived = Action::new(id.clone(), &[]);
                    derived.modes.push(update_mode(update, self.source));
                    debug!("hoisted update into derived action {id}");
                    self.derived.push(derived);
                    action_ids.push_str(&id);
                    action_ids.push('\r');
                }
                ActionMode::new(Operation::ExecuteMultiple).with_argument("actionIDs", action_ids)
            }
        }
    }

    /// Mode for a branch without update expressions
    fn fallback_mode(&mut self, action_id: &str, branch: &Node) -> ActionMode {
        if let Some(call) = find_call(branch, "execute-action-by-class") {
            let class_name = first_literal(call, self.source);
            return ActionMode::new(Operation::ByClass(class_name));
        }

        if let Some(call) = find_call(branch, "range-surround-contents") {
            let fragment = call
                .as_call()
                .and_then(|(_, args)| args.get(2).or(args.last()))
                .map(|arg| render(arg, self.source))
                .unwrap_or_default();
            self.caret_actions.insert(action_id.to_string());
            return ActionMode::new(Operation::SurroundWithFragment)
                .with_argument("fragment", fragment);
        }

        if let Some(call) = find_call(branch, "execute-xquery-script") {
            let script = first_literal(call, self.source);
            self.caret_actions.insert(action_id.to_string());
            return ActionMode::new(Operation::XQuery)
                .with_argument("script", script)
                .with_argument("action", "After");
        }

        warn!(
            "action '{}': no operation recognised in `{}`, using the void operation",
            action_id,
            branch.text(self.source)
        );
        ActionMode::new(Operation::Void)
    }
}

/// Guard text and body of every branch: outermost conditionals flattened along
/// their else-if chains, or the whole body when there is none
fn collect_branches<'n>(body: &'n Node, source: &str) -> Vec<(String, &'n Node)> {
    let conditionals = body.find_outermost(&|node| matches!(node.kind, NodeKind::If { .. }));
    if conditionals.is_empty() {
        return vec![(String::new(), body)];
    }

    let mut branches = Vec::new();
    for conditional in conditionals {
        let mut current = conditional;
        while let NodeKind::If {
            test,
            then_branch,
            else_branch,
        } = &current.kind
        {
            branches.push((render(test, source), then_branch.as_ref()));

            if matches!(else_branch.kind, NodeKind::If { .. }) {
                current = else_branch.as_ref();
                continue;
            }
            if !else_branch.is_empty_sequence() {
                branches.push((String::new(), else_branch.as_ref()));
            }
            break;
        }
    }
    branches
}

/// Mode running a single update expression
fn update_mode(update: &Node, source: &str) -> ActionMode {
    match &update.kind {
        NodeKind::Rename { target, new_name } => ActionMode::new(Operation::Rename)
            .with_argument("elementName", literal(new_name, source))
            .with_argument("elementLocation", render(target, source)),
        NodeKind::Insert {
            source: inserted,
            position,
            target,
        } => ActionMode::new(Operation::Insert)
            .with_argument("insertAction", insert_action(*position))
            .with_argument("insertSourceLocation", render_with_context(inserted, source))
            .with_argument("insertTargetLocation", render(target, source)),
        NodeKind::Delete { target } => {
            ActionMode::new(Operation::Delete).with_argument("elementLocation", render(target, source))
        }
        NodeKind::Replace {
            value_of,
            target,
            source: replacement,
        } => ActionMode::new(Operation::Replace)
            .with_argument("replaceAction", if *value_of { "Before" } else { "After" })
            .with_argument("replaceSourceLocation", render_with_context(replacement, source))
            .with_argument("replaceTargetLocation", render(target, source)),
        _ => ActionMode::new(Operation::Void),
    }
}

fn insert_action(position: InsertPosition) -> &'static str {
    match position {
        InsertPosition::After => "After",
        InsertPosition::Before => "Before",
        InsertPosition::AsFirstInto => "Inside as first child",
        InsertPosition::AsLastInto | InsertPosition::Into => "Inside as last child",
    }
}

fn first_literal(call: &Node, source: &str) -> String {
    call.as_call()
        .and_then(|(_, args)| args.first())
        .map(|arg| literal(arg, source))
        .unwrap_or_default()
}

/// `@id: oxy_action(...)` declaration for an action whose body runs a script
pub fn less_declaration(action_id: &str, name: &str, description: &str, script: &str) -> String {
    format!(
        "@{}: oxy_action(name, \"{}\", description, \"{}\", operation, \"{}\", arg-script, \"{}\", arg-action, \"After\");",
        action_id,
        less_escape(name),
        less_escape(description),
        Operation::XQuery.id(),
        less_escape(script)
    )
}

fn less_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
