//! Tests for the parser module

use super::*;

fn body(source: &str) -> Node {
    XQueryParser::parse(source)
        .expect("source should parse")
        .body
        .expect("source should have a body")
}

fn call_names(source: &str) -> Vec<String> {
    XQueryParser::parse(source)
        .unwrap()
        .function_calls()
        .iter()
        .filter_map(|call| call.as_call().map(|(name, _)| name.to_string()))
        .collect()
}

#[test]
fn test_prolog_declarations() {
    let source = r#"
declare namespace ua = "http://www.oxygenxml.com/ns/user-agent";
declare variable $title as xs:string := 'Dictionary';
declare variable $doc external;
declare function local:f($a) { ua:uuid() };
ua:template('t', $title)
"#;
    let module = XQueryParser::parse(source).unwrap();
    assert_eq!(module.prolog.len(), 4);

    match &module.prolog[0] {
        PrologItem::NamespaceDecl { prefix, uri, span } => {
            assert_eq!(prefix, "ua");
            assert_eq!(uri, "http://www.oxygenxml.com/ns/user-agent");
            assert!(!span.text(source).ends_with(';'));
        }
        other => panic!("expected namespace declaration, got {:?}", other),
    }

    let vars: Vec<&VarDecl> = module.var_decls().collect();
    assert_eq!(vars.len(), 2);
    assert_eq!(vars[0].name, "title");
    assert_eq!(vars[0].type_decl.as_deref(), Some("xs:string"));
    assert_eq!(vars[0].value.as_ref().unwrap().text(source), "'Dictionary'");
    assert_eq!(
        vars[0].span.text(source),
        "declare variable $title as xs:string := 'Dictionary'"
    );
    assert_eq!(vars[1].name, "doc");
    assert!(vars[1].type_decl.is_none());
    assert!(vars[1].value.is_none());

    assert!(matches!(&module.prolog[3], PrologItem::Other { blocks, .. } if blocks.len() == 1));
    assert!(module.body.is_some());
}

#[test]
fn test_function_calls_in_document_order() {
    let source = r#"
declare function local:helper() { ua:observer('o', 'a') };
ua:template('t', <b>{ua:uuid()}</b>),
ua:action('a', map {'name': 'A'}, delete node ua:context()/x)
"#;
    assert_eq!(
        call_names(source),
        vec![
            "ua:observer",
            "ua:template",
            "ua:uuid",
            "ua:action",
            "ua:context"
        ]
    );
}

#[test]
fn test_kind_tests_are_not_calls() {
    assert!(call_names("//entry/node()").is_empty());
    assert!(call_names("$x instance of element(entry)").is_empty());
    assert_eq!(call_names("//entry/text() ! string-length(.)"), vec!["string-length"]);
}

#[test]
fn test_operator_expression_keeps_recognised_operands() {
    let source = "$count + ua:uuid() * 2";
    let node = body(source);
    match &node.kind {
        NodeKind::Opaque(children) => {
            assert!(matches!(&children[0].kind, NodeKind::VarRef(name) if name == "count"));
            assert_eq!(children[1].as_call().unwrap().0, "ua:uuid");
        }
        other => panic!("expected opaque expression, got {:?}", other),
    }
    assert_eq!(node.text(source), source);
}

#[test]
fn test_string_literal_alone() {
    let node = body("'it''s'");
    assert_eq!(node.string_value(), Some("it's"));
}

#[test]
fn test_update_expressions() {
    let insert = body("insert node <entry/> as last into $dict");
    match &insert.kind {
        NodeKind::Insert {
            source,
            position,
            target,
        } => {
            assert!(matches!(&source.kind, NodeKind::Element { name, .. } if name == "entry"));
            assert_eq!(*position, InsertPosition::AsLastInto);
            assert!(matches!(&target.kind, NodeKind::VarRef(name) if name == "dict"));
        }
        other => panic!("expected insert, got {:?}", other),
    }
    assert!(insert.is_update());

    let replace = body("replace value of node $e/@id with 'x'");
    assert!(matches!(replace.kind, NodeKind::Replace { value_of: true, .. }));

    let rename = body("rename node $e as 'item'");
    assert!(matches!(rename.kind, NodeKind::Rename { .. }));

    let delete = body("delete node //entry[@id = '1']");
    assert!(matches!(delete.kind, NodeKind::Delete { .. }));
    assert!(!body("$e").is_update());
}

#[test]
fn test_nested_if() {
    let node = body("if ($a) then 1 else if ($b) then ua:uuid() else ()");
    let NodeKind::If { else_branch, .. } = &node.kind else {
        panic!("expected if, got {:?}", node.kind);
    };
    let NodeKind::If {
        then_branch,
        else_branch,
        ..
    } = &else_branch.kind
    else {
        panic!("expected else-if, got {:?}", else_branch.kind);
    };
    assert_eq!(then_branch.as_call().unwrap().0, "ua:uuid");
    assert!(else_branch.is_empty_sequence());
}

#[test]
fn test_flwor_body_is_parsed() {
    let node = body("for $e in //entry let $id := $e/@id return ua:uuid()");
    match &node.kind {
        NodeKind::Flwor { clauses, body } => {
            assert_eq!(clauses.len(), 1);
            assert_eq!(body.as_call().unwrap().0, "ua:uuid");
        }
        other => panic!("expected flwor, got {:?}", other),
    }
}

#[test]
fn test_map_constructors() {
    let source = "map {'name': 'Add', 'description': ua:uuid()}";
    let node = body(source);
    let NodeKind::Map(entries) = &node.kind else {
        panic!("expected map, got {:?}", node.kind);
    };
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key.string_value(), Some("name"));
    assert_eq!(entries[0].value.string_value(), Some("Add"));
    assert!(entries[1].value.as_call().is_some());

    let legacy = body("{'subtree' := true()}");
    assert!(matches!(&legacy.kind, NodeKind::Map(entries) if entries.len() == 1));

    assert!(matches!(body("map {}").kind, NodeKind::Opaque(_) | NodeKind::Map(_)));
    assert!(matches!(body("{ $a }").kind, NodeKind::Block(Some(_))));
}

#[test]
fn test_array_constructor() {
    let node = body("['value', 'label']");
    match &node.kind {
        NodeKind::Array(items) => {
            let values: Vec<_> = items.iter().filter_map(Node::string_value).collect();
            assert_eq!(values, vec!["value", "label"]);
        }
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn test_element_constructor_with_enclosed_expressions() {
    let source = r#"<div class="{$cls}" title="a {{literal}}">text {ua:uuid()}<br/><!-- } --></div>"#;
    let node = body(source);
    let NodeKind::Element { name, children } = &node.kind else {
        panic!("expected element, got {:?}", node.kind);
    };
    assert_eq!(name, "div");
    assert_eq!(children.len(), 3);
    assert!(matches!(children[0].kind, NodeKind::Enclosed(Some(_))));
    assert!(matches!(children[1].kind, NodeKind::Enclosed(Some(_))));
    assert!(matches!(&children[2].kind, NodeKind::Element { name, .. } if name == "br"));
    assert_eq!(node.span.text(source), source);
}

#[test]
fn test_render_substitutes_whole_nodes() {
    let source = "concat($a, ua:uuid(), 'x')";
    let node = body(source);
    let rendered = node.render(source, &mut |node| match &node.kind {
        NodeKind::VarRef(name) => Some(format!("${name}2")),
        NodeKind::FunctionCall { name, .. } if name == "ua:uuid" => Some("'id'".to_string()),
        _ => None,
    });
    assert_eq!(rendered, "concat($a2, 'id', 'x')");
}

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        call_names("(: ua:ignored() :) ua:kept('a', 'b')"),
        vec!["ua:kept"]
    );
}

#[test]
fn test_error_reports_line_and_column() {
    let source = "declare namespace ua = 'x';\nua:template('a';";
    let err = XQueryParser::parse(source).unwrap_err();
    assert_eq!(err.line, 2);
    assert_eq!(err.column, 16);
    assert!(err.message.contains("',' or ')'"), "message: {}", err.message);
    assert!(err.to_string().starts_with("line 2, column 16:"));
}

#[test]
fn test_mismatched_closing_tag() {
    let err = XQueryParser::parse("<a><b></a></b>").unwrap_err();
    assert!(err.message.contains("mismatched closing tag"));
}

#[test]
fn test_qname_helpers() {
    assert_eq!(split_qname("ua:template"), (Some("ua"), "template"));
    assert_eq!(split_qname("concat"), (None, "concat"));
    assert_eq!(local_name("oxy:get-template"), "get-template");
}
