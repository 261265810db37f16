//! Text-level helpers shared by the directive handlers and the widget expander

use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};

use super::directives::Directive;
use crate::parser::{local_name, Node, NodeKind};

pub const XPATH_START: &str = "oxy_xpath_start";
pub const XPATH_END: &str = "oxy_xpath_end";

/// Rendering of `generate-uuid()`; the host expands `${uuid}` per document
pub const UUID_PLACEHOLDER: &str = "'id-${uuid}'";

/// Explicit reference to the node an action runs on
pub const CONTEXT_REFERENCE: &str = "$ua:context";

static TEMPLATE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(ua:(get|show)-template\(['"])([A-Za-z_-]+)(['"]\)\s*,?\s*)"#).unwrap()
});

static LITERAL_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:[A-Za-z_][\w.-]*:)?([A-Za-z_][\w.-]*)\(\s*['"]([^'"]*)['"]"#).unwrap()
});

/// Drop one leading and one trailing quote character
pub fn unquote(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix(['\'', '"']).unwrap_or(text);
    text.strip_suffix(['\'', '"']).unwrap_or(text)
}

/// Drop the outermost `{` `}` pair and the whitespace next to it
pub fn strip_braces(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix('{').map_or(text, str::trim_start);
    text.strip_suffix('}').map_or(text, str::trim_end)
}

pub fn strip_markers(text: &str) -> String {
    text.replace(XPATH_START, "").replace(XPATH_END, "")
}

/// Turn text with expression markers into a property value:
/// `Name: oxy_xpath_start@nameoxy_xpath_end` becomes `"Name: " oxy_xpath("@name")`
pub fn xpath_property(text: &str) -> String {
    let mut parts = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(XPATH_START) {
        push_literal(&mut parts, &rest[..start]);
        let after = &rest[start + XPATH_START.len()..];
        let (expr, tail) = match after.find(XPATH_END) {
            Some(end) => (&after[..end], &after[end + XPATH_END.len()..]),
            None => (after, ""),
        };
        parts.push(xpath_call(expr));
        rest = tail;
    }
    push_literal(&mut parts, rest);

    parts.join(" ")
}

/// `oxy_xpath("expr")`, with the expression's own double quotes escaped
pub fn xpath_call(expr: &str) -> String {
    format!("oxy_xpath(\"{}\")", expr.trim().replace('"', "\\\""))
}

fn push_literal(parts: &mut Vec<String>, literal: &str) {
    if !literal.trim().is_empty() {
        parts.push(format!("\"{}\"", literal.replace('"', "\\\"")));
    }
}

/// Replacement text for directive calls that stand for a value
pub fn directive_substitution(node: &Node, source: &str) -> Option<String> {
    let (name, _) = node.as_call()?;
    match Directive::from_name(name)? {
        Directive::GenerateUuid => Some(UUID_PLACEHOLDER.to_string()),
        Directive::Selector => Some(compile_selector(node, source)),
        _ => None,
    }
}

/// Source text of `node` with directive calls substituted
pub fn render(node: &Node, source: &str) -> String {
    node.render(source, &mut |n| directive_substitution(n, source))
        .trim()
        .to_string()
}

/// Like [`render`], with every bare context item written as `$ua:context`
pub fn render_with_context(node: &Node, source: &str) -> String {
    node.render(source, &mut |n| match n.kind {
        NodeKind::ContextItem => Some(CONTEXT_REFERENCE.to_string()),
        _ => directive_substitution(n, source),
    })
    .trim()
    .to_string()
}

/// String value of an argument: the literal itself, or its rendered text unquoted
pub fn literal(node: &Node, source: &str) -> String {
    match node.string_value() {
        Some(value) => value.to_string(),
        None => unquote(&render(node, source)).to_string(),
    }
}

/// Compile a node selector argument.
///
/// Path selectors pass through unchanged; both selector functions and bare
/// string literals are accepted.
pub fn compile_selector(node: &Node, source: &str) -> String {
    if let Some((name, args)) = node.as_call() {
        if Directive::from_name(name) == Some(Directive::Selector) {
            return args
                .first()
                .map(|arg| literal(arg, source))
                .unwrap_or_default();
        }
    }
    literal(node, source)
}

/// First string argument of a call to `local` found in `text`
pub fn literal_call_argument(text: &str, local: &str) -> Option<String> {
    LITERAL_CALL
        .captures_iter(text)
        .find(|caps| &caps[1] == local)
        .map(|caps| caps[2].to_string())
}

/// Wrap an expression for embedding in template markup.
///
/// An expression using `ua:get-template` has its template references replaced
/// by the referenced content and is wrapped in a `<template>` element; every
/// other expression is put between the expression markers.
pub fn process_xpath_expression(expression: &str, templates: &BTreeMap<String, String>) -> String {
    let expression = strip_braces(expression);

    if expression.contains("ua:get-template(") {
        let substituted = TEMPLATE_REFERENCE.replace_all(expression, |caps: &Captures| {
            let content = templates.get(&caps[3]).map(String::as_str).unwrap_or_default();
            format!("{} ", escape(content))
        });
        return format!("<template>{substituted}</template>");
    }

    format!("{XPATH_START}{expression}{XPATH_END}")
}

/// Markup text for an enclosed `{ ... }` expression of a direct constructor
pub fn process_enclosed(
    node: &Node,
    source: &str,
    variables: &HashMap<String, String>,
    templates: &BTreeMap<String, String>,
) -> String {
    let NodeKind::Enclosed(Some(inner)) = &node.kind else {
        return String::new();
    };

    let text = inner.render(source, &mut |n| match &n.kind {
        NodeKind::VarRef(name) => variables
            .get(&format!("${name}"))
            .map(|value| strip_braces(value).to_string()),
        _ => directive_substitution(n, source),
    });

    let processed = process_xpath_expression(&text, templates);
    let Some(expression) = processed.strip_prefix(XPATH_START) else {
        return processed;
    };
    let expression = expression.strip_suffix(XPATH_END).unwrap_or(expression);

    if expression.starts_with('<') {
        // the expression is markup itself
        expression.to_string()
    } else {
        format!("{XPATH_START}{}{XPATH_END}", escape(expression))
    }
}

/// Render a direct constructor (or any node) with enclosed expressions processed
pub fn render_markup(
    node: &Node,
    source: &str,
    variables: &HashMap<String, String>,
    templates: &BTreeMap<String, String>,
) -> String {
    node.render(source, &mut |n| match n.kind {
        NodeKind::Enclosed(_) => Some(process_enclosed(n, source, variables, templates)),
        _ => directive_substitution(n, source),
    })
}

/// Whether `node` is a call whose local name is `local`
pub fn is_call_to(node: &Node, local: &str) -> bool {
    node.as_call()
        .is_some_and(|(name, _)| local_name(name) == local)
}

/// First call to `local` at or below `node`, in document order
pub fn find_call<'n>(node: &'n Node, local: &str) -> Option<&'n Node> {
    node.function_calls()
        .into_iter()
        .find(|call| is_call_to(call, local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::XQueryParser;

    fn body(source: &str) -> Node {
        XQueryParser::parse(source).unwrap().body.unwrap()
    }

    #[test]
    fn test_unquote_and_braces() {
        assert_eq!(unquote("'save'"), "save");
        assert_eq!(unquote("\"a\""), "a");
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(strip_braces("{ @name }"), "@name");
    }

    #[test]
    fn test_xpath_property() {
        assert_eq!(
            xpath_property("Name: oxy_xpath_start@nameoxy_xpath_end"),
            "\"Name: \" oxy_xpath(\"@name\")"
        );
        assert_eq!(
            xpath_property("oxy_xpath_startcount(*)oxy_xpath_end items"),
            "oxy_xpath(\"count(*)\") \" items\""
        );
    }

    #[test]
    fn test_xpath_call_keeps_apostrophes() {
        assert_eq!(
            xpath_property("oxy_xpath_startconcat(\"it's \", @a)oxy_xpath_end"),
            "oxy_xpath(\"concat(\\\"it's \\\", @a)\")"
        );
        assert_eq!(xpath_call(" @a = 'x' "), "oxy_xpath(\"@a = 'x'\")");
    }

    #[test]
    fn test_uuid_and_selector_are_substituted() {
        let source = "concat(oxy:uuid(), ua-dt:xpath-selector('entry'))";
        assert_eq!(render(&body(source), source), "concat('id-${uuid}', entry)");
    }

    #[test]
    fn test_context_item_rewrite() {
        let source = "./@type";
        assert_eq!(render_with_context(&body(source), source), "$ua:context/@type");
    }

    #[test]
    fn test_compile_selector() {
        let source = "ua-dt:css-selector(\"field[data-id]\")";
        assert_eq!(compile_selector(&body(source), source), "field[data-id]");
        let source = "'entry'";
        assert_eq!(compile_selector(&body(source), source), "entry");
    }

    #[test]
    fn test_literal_call_argument() {
        let handler = "oxy:execute-action-by-name('save')";
        assert_eq!(
            literal_call_argument(handler, "execute-action-by-name"),
            Some("save".to_string())
        );
        assert_eq!(literal_call_argument(handler, "show-template"), None);
    }

    #[test]
    fn test_template_references_are_inlined() {
        let mut templates = BTreeMap::new();
        templates.insert("label".to_string(), "\"Label\"".to_string());

        assert_eq!(
            process_xpath_expression("{ua:get-template('label')}", &templates),
            "<template>&quot;Label&quot; </template>"
        );
        assert_eq!(
            process_xpath_expression("{@name}", &templates),
            "oxy_xpath_start@nameoxy_xpath_end"
        );
    }

    #[test]
    fn test_enclosed_expressions() {
        let source = "<p>{$title} {@a < 2} {<b/>}</p>";
        let node = body(source);
        let mut variables = HashMap::new();
        variables.insert("$title".to_string(), "{ @title }".to_string());

        let markup = render_markup(&node, source, &variables, &BTreeMap::new());
        assert_eq!(
            markup,
            "<p>oxy_xpath_start@titleoxy_xpath_end oxy_xpath_start@a &lt; 2oxy_xpath_end <b/></p>"
        );
    }
}
