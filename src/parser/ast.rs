//! Abstract Syntax Tree definitions for addon sources

/// Byte range into the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// Represents a parsed addon source
#[derive(Debug, Clone)]
pub struct Module {
    pub prolog: Vec<PrologItem>,
    pub body: Option<Node>,
}

/// A declaration in the module prolog
#[derive(Debug, Clone)]
pub enum PrologItem {
    NamespaceDecl {
        prefix: String,
        uri: String,
        span: Span,
    },
    VarDecl(VarDecl),
    /// Any other declaration (imports, options, functions); enclosed blocks are kept
    Other { span: Span, blocks: Vec<Node> },
}

/// `declare variable $name as type := value;`
#[derive(Debug, Clone)]
pub struct VarDecl {
    /// Variable name without the `$` sigil
    pub name: String,
    /// Declared type, without the leading `as`
    pub type_decl: Option<String>,
    pub value: Option<Node>,
    pub span: Span,
}

/// Target choice of an `insert` expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    After,
    Before,
    AsFirstInto,
    AsLastInto,
    Into,
}

/// `key : value` pair of a map constructor
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: Node,
    pub value: Node,
}

/// Represents a node in the expression tree
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Comma-separated expressions
    Sequence(Vec<Node>),
    /// Operator expression kept as text; only the recognised operands are children
    Opaque(Vec<Node>),
    FunctionCall {
        name: String,
        args: Vec<Node>,
    },
    If {
        test: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Box<Node>,
    },
    /// for/let/some/every/copy: clauses are opaque, the body is parsed
    Flwor {
        clauses: Vec<Node>,
        body: Box<Node>,
    },
    Rename {
        target: Box<Node>,
        new_name: Box<Node>,
    },
    Insert {
        source: Box<Node>,
        position: InsertPosition,
        target: Box<Node>,
    },
    Delete {
        target: Box<Node>,
    },
    Replace {
        value_of: bool,
        target: Box<Node>,
        source: Box<Node>,
    },
    ContextItem,
    /// Variable reference, name without the sigil
    VarRef(String),
    StringLiteral(String),
    NumericLiteral,
    Parenthesized(Option<Box<Node>>),
    Map(Vec<MapEntry>),
    Array(Vec<Node>),
    /// `{ expr }` in operand position that is not a map
    Block(Option<Box<Node>>),
    Predicate(Box<Node>),
    /// Direct element constructor; children are nested elements and enclosed expressions
    Element {
        name: String,
        children: Vec<Node>,
    },
    Enclosed(Option<Box<Node>>),
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Source text covered by this node, trimmed
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.text(source).trim()
    }

    /// Direct children in source order
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Sequence(items)
            | NodeKind::Opaque(items)
            | NodeKind::Array(items)
            | NodeKind::FunctionCall { args: items, .. }
            | NodeKind::Element {
                children: items, ..
            } => items.iter().collect(),
            NodeKind::If {
                test,
                then_branch,
                else_branch,
            } => vec![test.as_ref(), then_branch.as_ref(), else_branch.as_ref()],
            NodeKind::Flwor { clauses, body } => {
                let mut out: Vec<&Node> = clauses.iter().collect();
                out.push(body.as_ref());
                out
            }
            NodeKind::Rename { target, new_name } => vec![target.as_ref(), new_name.as_ref()],
            NodeKind::Insert { source, target, .. } => vec![source.as_ref(), target.as_ref()],
            NodeKind::Delete { target } => vec![target.as_ref()],
            NodeKind::Replace { target, source, .. } => vec![target.as_ref(), source.as_ref()],
            NodeKind::Map(entries) => entries
                .iter()
                .flat_map(|entry| [&entry.key, &entry.value])
                .collect(),
            NodeKind::Parenthesized(inner) | NodeKind::Block(inner) | NodeKind::Enclosed(inner) => {
                inner.iter().map(|node| node.as_ref()).collect()
            }
            NodeKind::Predicate(inner) => vec![inner.as_ref()],
            NodeKind::ContextItem
            | NodeKind::VarRef(_)
            | NodeKind::StringLiteral(_)
            | NodeKind::NumericLiteral => Vec::new(),
        }
    }

    /// All nodes below this one, in document (pre-)order
    pub fn descendants(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        for child in self.children() {
            out.push(child);
            out.extend(child.descendants());
        }
        out
    }

    /// Outermost descendants (or self) matching `pred`; matches are not searched further
    pub fn find_outermost<'a>(&'a self, pred: &dyn Fn(&Node) -> bool) -> Vec<&'a Node> {
        if pred(self) {
            return vec![self];
        }
        self.children()
            .into_iter()
            .flat_map(|child| child.find_outermost(pred))
            .collect()
    }

    /// Function calls at or below this node, in document order
    pub fn function_calls(&self) -> Vec<&Node> {
        std::iter::once(self)
            .chain(self.descendants())
            .filter(|node| matches!(node.kind, NodeKind::FunctionCall { .. }))
            .collect()
    }

    pub fn as_call(&self) -> Option<(&str, &[Node])> {
        match &self.kind {
            NodeKind::FunctionCall { name, args } => Some((name.as_str(), args.as_slice())),
            _ => None,
        }
    }

    pub fn string_value(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::StringLiteral(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Rename { .. }
                | NodeKind::Insert { .. }
                | NodeKind::Delete { .. }
                | NodeKind::Replace { .. }
        )
    }

    /// `()`
    pub fn is_empty_sequence(&self) -> bool {
        matches!(self.kind, NodeKind::Parenthesized(None))
    }

    /// Reproduce the source text of this node, letting `subst` replace whole sub-nodes.
    ///
    /// Text between children is copied verbatim, so everything the parser did not
    /// model survives unchanged.
    pub fn render(&self, source: &str, subst: &mut dyn FnMut(&Node) -> Option<String>) -> String {
        let mut out = String::new();
        self.render_into(source, subst, &mut out);
        out
    }

    fn render_into(
        &self,
        source: &str,
        subst: &mut dyn FnMut(&Node) -> Option<String>,
        out: &mut String,
    ) {
        if let Some(text) = subst(self) {
            out.push_str(&text);
            return;
        }

        let mut cursor = self.span.start;
        for child in self.children() {
            out.push_str(&source[cursor..child.span.start]);
            child.render_into(source, subst, out);
            cursor = child.span.end;
        }
        out.push_str(&source[cursor..self.span.end]);
    }
}

impl Module {
    /// Every function call of the module (prolog first, then body), in document order
    pub fn function_calls(&self) -> Vec<&Node> {
        let mut calls = Vec::new();
        for item in &self.prolog {
            match item {
                PrologItem::VarDecl(decl) => {
                    if let Some(value) = &decl.value {
                        calls.extend(value.function_calls());
                    }
                }
                PrologItem::Other { blocks, .. } => {
                    for block in blocks {
                        calls.extend(block.function_calls());
                    }
                }
                PrologItem::NamespaceDecl { .. } => {}
            }
        }
        if let Some(body) = &self.body {
            calls.extend(body.function_calls());
        }
        calls
    }

    pub fn var_decls(&self) -> impl Iterator<Item = &VarDecl> {
        self.prolog.iter().filter_map(|item| match item {
            PrologItem::VarDecl(decl) => Some(decl),
            _ => None,
        })
    }
}

/// Split `prefix:local` into its parts
pub fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// Local part of a qualified name
pub fn local_name(name: &str) -> &str {
    split_qname(name).1
}
