//! Directive recognition and the per-directive handlers of the walk

use log::{debug, warn};

use super::actions::{less_declaration, Action, ActionTranslator};
use super::expressions::{
    compile_selector, find_call, is_call_to, literal, render, render_markup, xpath_call,
};
use super::Walk;
use crate::model::{AttachedTemplate, ObserverConnection, ObserverOptions, LOAD_PHASE};
use crate::parser::{split_qname, Node, NodeKind, TemplateParser};
use crate::widgets::{process_oxy_get_template, WidgetExpander};
use crate::{Error, Result};

/// Prefixes under which directive functions are recognised
const DIRECTIVE_PREFIXES: [&str; 3] = ["ua", "oxy", "ua-dt"];

/// A directive function call of the addon vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    DeclareAction,
    DeclareObserver,
    ConnectObserver,
    GenerateUuid,
    Selector,
    AddEventListener,
    DeclareTemplate,
    AttachTemplate,
}

impl Directive {
    /// Recognise a function name, with or without a directive prefix
    pub fn from_name(name: &str) -> Option<Self> {
        let (prefix, local) = split_qname(name);
        if prefix.is_some_and(|prefix| !DIRECTIVE_PREFIXES.contains(&prefix)) {
            return None;
        }

        let directive = match local {
            "action" | "declare-action" => Directive::DeclareAction,
            "observer" | "declare-observer" => Directive::DeclareObserver,
            "connect-observer" => Directive::ConnectObserver,
            "uuid" | "generate-uuid" => Directive::GenerateUuid,
            "xpath-selector" | "css-selector" => Directive::Selector,
            "add-event-listener" => Directive::AddEventListener,
            "template" | "declare-template" => Directive::DeclareTemplate,
            "attach-template" => Directive::AttachTemplate,
            _ => return None,
        };
        Some(directive)
    }

    /// Number of arguments the handler reads
    fn arity(self) -> usize {
        match self {
            Directive::DeclareAction | Directive::AddEventListener => 3,
            Directive::DeclareObserver
            | Directive::ConnectObserver
            | Directive::DeclareTemplate
            | Directive::AttachTemplate => 2,
            Directive::GenerateUuid | Directive::Selector => 0,
        }
    }
}

impl Walk<'_> {
    /// Apply one function call to the compilation state
    pub(crate) fn dispatch(&mut self, call: &Node) -> Result<()> {
        let Some((name, args)) = call.as_call() else {
            return Ok(());
        };
        let Some(directive) = Directive::from_name(name) else {
            return Ok(());
        };

        if args.len() < directive.arity() {
            warn!(
                "{}: expected {} arguments, found {}; call ignored",
                name,
                directive.arity(),
                args.len()
            );
            return Ok(());
        }

        match directive {
            Directive::DeclareAction => self.declare_action(args),
            Directive::DeclareObserver => {
                self.declare_observer(args);
                Ok(())
            }
            Directive::ConnectObserver => {
                self.connect_observer(args);
                Ok(())
            }
            Directive::AddEventListener => {
                self.add_event_listener(args);
                Ok(())
            }
            Directive::DeclareTemplate => self.declare_template(args),
            Directive::AttachTemplate => {
                self.attach_template(args);
                Ok(())
            }
            // substituted wherever the surrounding text is rendered
            Directive::GenerateUuid | Directive::Selector => {
                debug!("{name}: value directive, nothing to record");
                Ok(())
            }
        }
    }

    fn declare_action(&mut self, args: &[Node]) -> Result<()> {
        let id = literal(&args[0], self.source);
        let parameters = map_entries(&args[1], self.source);
        let body = &args[2];

        if is_call_to(body, "execute-xquery-script") {
            let script = body
                .as_call()
                .and_then(|(_, script_args)| script_args.first())
                .map(|arg| literal(arg, self.source))
                .unwrap_or_default();
            let lookup = |key: &str| {
                parameters
                    .iter()
                    .find(|(name, _)| name == key)
                    .map_or("", |(_, value)| value.as_str())
            };
            self.model.less_actions.push(less_declaration(
                &id,
                lookup("name"),
                lookup("description"),
                &script,
            ));
            debug!("action '{id}' declared as a stylesheet action");
            return Ok(());
        }

        let mut action = Action::new(id.clone(), &parameters);
        action.modes = ActionTranslator {
            source: self.source,
            ids: &mut *self.ids,
            derived: &mut self.queues.derived,
            caret_actions: &mut self.model.caret_actions,
        }
        .translate(&id, body);

        debug!("action '{}' declared with {} modes", id, action.modes.len());
        self.actions.push(action);
        Ok(())
    }

    fn declare_observer(&mut self, args: &[Node]) {
        let id = literal(&args[0], self.source);
        let handlers = literal(&args[1], self.source)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        self.model.observers.insert(id, handlers);
    }

    fn connect_observer(&mut self, args: &[Node]) {
        let handler = literal(&args[0], self.source);
        let selector = compile_selector(&args[1], self.source);
        let options = args
            .iter()
            .rev()
            .find(|arg| matches!(arg.kind, NodeKind::Map(_)))
            .map(|map| observer_options(map, self.source))
            .unwrap_or_default();

        self.model.connect_observer(ObserverConnection {
            handler,
            selector,
            options,
        });
    }

    fn add_event_listener(&mut self, args: &[Node]) {
        let event_type = literal(&args[1], self.source);
        if event_type != LOAD_PHASE {
            debug!("event listener for '{event_type}' skipped");
            return;
        }

        let listener = &args[2];
        let source = self.source;
        let first_argument = |call: &Node| {
            call.as_call()
                .and_then(|(_, call_args)| call_args.first())
                .map(|arg| literal(arg, source))
        };

        if let Some(action_id) = find_call(listener, "execute-action-by-name").and_then(first_argument) {
            self.model.add_action_by_name(LOAD_PHASE, action_id);
        } else if let Some(class_name) =
            find_call(listener, "execute-action-by-class").and_then(first_argument)
        {
            self.model.add_action_by_class(LOAD_PHASE, class_name);
        } else {
            warn!(
                "event listener `{}` runs no action",
                listener.text(self.source)
            );
        }
    }

    fn declare_template(&mut self, args: &[Node]) -> Result<()> {
        let id = literal(&args[0], self.source);
        if self.model.templates.contains_key(&id) {
            return Err(Error::DuplicateTemplate(id));
        }

        let body = unwrap_parentheses(&args[1]);
        let content = if matches!(body.kind, NodeKind::Element { .. }) {
            let markup = render_markup(
                body,
                self.source,
                &self.model.variables,
                &self.model.templates,
            );
            let nodes = TemplateParser::parse(&markup).map_err(|message| Error::Markup {
                template: id.clone(),
                message,
            })?;

            WidgetExpander {
                template_id: &id,
                model: &mut self.model,
                simple_actions: &mut self.queues.simple,
                ids: &mut *self.ids,
                tree_template: &mut *self.tree_template,
            }
            .expand(&nodes)?
        } else {
            let text = render(body, self.source);
            if text.contains("oxy:get-template(") {
                process_oxy_get_template(&text)?
            } else if let Some(value) = body.string_value() {
                format!("\"{value}\"")
            } else {
                xpath_call(&text)
            }
        };

        if content.is_empty() {
            debug!("template '{id}' expanded to nothing; not stored");
            return Ok(());
        }
        self.model.declare_template(&id, content)
    }

    fn attach_template(&mut self, args: &[Node]) {
        let selector = compile_selector(&args[0], self.source);
        let template_id = literal(&args[1], self.source);

        if self.model.is_dialog(&template_id) {
            debug!("template '{template_id}' is a dialog; not attached to {selector}");
            return;
        }
        match self.model.templates.get(&template_id) {
            Some(content) => {
                let content = content.clone();
                self.model
                    .attached_templates
                    .push(AttachedTemplate { selector, content });
            }
            None => warn!("attach-template: no template '{template_id}' declared before use"),
        }
    }
}

fn unwrap_parentheses(node: &Node) -> &Node {
    match &node.kind {
        NodeKind::Parenthesized(Some(inner)) => unwrap_parentheses(inner),
        _ => node,
    }
}

/// Key/value literals of a map constructor, in source order
fn map_entries(node: &Node, source: &str) -> Vec<(String, String)> {
    match &node.kind {
        NodeKind::Map(entries) => entries
            .iter()
            .map(|entry| (literal(&entry.key, source), literal(&entry.value, source)))
            .collect(),
        _ => Vec::new(),
    }
}

fn observer_options(map: &Node, source: &str) -> ObserverOptions {
    let mut options = ObserverOptions::default();
    let NodeKind::Map(entries) = &map.kind else {
        return options;
    };

    for entry in entries {
        let key = literal(&entry.key, source);
        if key == "attributeFilter" {
            options.attribute_filter = Some(attribute_filter(&entry.value, source));
            continue;
        }

        match parse_flag(&render(&entry.value, source)) {
            Some(flag) => {
                if !options.set_flag(&key, flag) {
                    debug!("observer option '{key}' ignored");
                }
            }
            None => debug!("observer option '{key}' is not a boolean; ignored"),
        }
    }
    options
}

fn attribute_filter(value: &Node, source: &str) -> Vec<String> {
    if let NodeKind::Array(items) = &value.kind {
        return items.iter().map(|item| literal(item, source)).collect();
    }

    literal(value, source)
        .replace(['[', ']', '\'', '"'], "")
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim() {
        "true" | "true()" => Some(true),
        "false" | "false()" => Some(false),
        _ => None,
    }
}
