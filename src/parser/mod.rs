//! Parser for addon sources.
//!
//! Addon sources are XQuery 3.0 scripts. Only the constructs the compiler acts on
//! are modelled precisely (prolog declarations, function calls, conditionals,
//! update expressions, maps, arrays and direct element constructors); every other
//! expression is kept as an [`NodeKind::Opaque`] span so it can be reproduced
//! verbatim later.

pub mod ast;
pub mod template;
mod tokenizer;

#[cfg(test)]
mod tests;

pub use ast::{
    local_name, split_qname, InsertPosition, MapEntry, Module, Node, NodeKind, PrologItem, Span,
    VarDecl,
};
pub use template::{MarkupElement, MarkupNode, TemplateParser};
pub use tokenizer::decode_entities;

use tokenizer::{is_name_char, is_name_start, Spanned, Token, Tokenizer};

/// Syntax error with the position it was detected at
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn at(source: &str, pos: usize, message: impl Into<String>) -> Self {
        let before = source.get(..pos).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let column = before
            .rsplit('\n')
            .next()
            .map_or(0, |last| last.chars().count())
            + 1;

        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Pseudo stop word: stop an operand sequence at `:` or `:=` (map keys)
const MAP_KEY: &str = ":";

/// Names that take a parenthesised argument but are type tests, not calls
const KIND_TESTS: &[&str] = &[
    "node",
    "text",
    "element",
    "attribute",
    "comment",
    "document-node",
    "processing-instruction",
    "item",
    "empty-sequence",
    "schema-element",
    "schema-attribute",
    "namespace-node",
    "function",
    "map",
    "array",
];

/// Keywords that introduce a computed constructor or a braced block
const BLOCK_KEYWORDS: &[&str] = &[
    "element",
    "attribute",
    "text",
    "document",
    "comment",
    "processing-instruction",
    "namespace",
    "ordered",
    "unordered",
    "validate",
    "try",
    "catch",
    "array",
];

#[derive(Debug, Clone, Copy)]
enum PrologKind {
    Namespace,
    Variable,
    Other,
}

/// Expression forms introduced by a leading keyword
#[derive(Debug, Clone, Copy)]
enum KeywordForm {
    If,
    Insert,
    Delete,
    Replace,
    Rename,
    Flwor(&'static str),
}

/// Recursive-descent parser for addon sources
pub struct XQueryParser<'a> {
    tokenizer: Tokenizer<'a>,
    peeked: Option<Spanned>,
    last_end: usize,
}

impl<'a> XQueryParser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            tokenizer: Tokenizer::new(source),
            peeked: None,
            last_end: 0,
        }
    }

    /// Parse a complete addon source
    pub fn parse(source: &str) -> Result<Module, ParseError> {
        XQueryParser::new(source).parse_module()
    }

    pub fn parse_module(&mut self) -> Result<Module, ParseError> {
        let mut prolog = Vec::new();
        while let Some(kind) = self.prolog_kind()? {
            prolog.push(self.parse_prolog_item(kind)?);
        }

        let body = if self.peek_token()? == &Token::Eof {
            None
        } else {
            Some(self.parse_expr(&[])?)
        };

        let next = self.advance()?;
        if next.token != Token::Eof {
            return Err(self.unexpected(&next, "end of input"));
        }

        Ok(Module { prolog, body })
    }

    // ---- prolog -------------------------------------------------------------

    fn prolog_kind(&mut self) -> Result<Option<PrologKind>, ParseError> {
        let ahead = self.lookahead(3)?;
        let word = |i: usize| match ahead.get(i) {
            Some(Token::Name(name)) => Some(name.as_str()),
            _ => None,
        };

        let kind = match (word(0), word(1)) {
            (Some("xquery"), Some("version" | "encoding")) => Some(PrologKind::Other),
            (Some("module"), Some("namespace")) => Some(PrologKind::Other),
            (Some("import"), Some("module" | "schema")) => Some(PrologKind::Other),
            (Some("declare"), Some("namespace")) if word(2).is_some() => {
                Some(PrologKind::Namespace)
            }
            (Some("declare"), Some("variable")) => Some(PrologKind::Variable),
            (Some("declare"), Some(_)) => Some(PrologKind::Other),
            (Some("declare"), None)
                if matches!(ahead.get(1), Some(Token::Operator(op)) if op == "%") =>
            {
                Some(PrologKind::Other)
            }
            _ => None,
        };

        Ok(kind)
    }

    fn parse_prolog_item(&mut self, kind: PrologKind) -> Result<PrologItem, ParseError> {
        match kind {
            PrologKind::Namespace => self.parse_namespace_decl(),
            PrologKind::Variable => self.parse_var_decl().map(PrologItem::VarDecl),
            PrologKind::Other => self.parse_other_decl(),
        }
    }

    fn parse_namespace_decl(&mut self) -> Result<PrologItem, ParseError> {
        let start = self.advance()?.span.start;
        self.expect_keyword("namespace")?;

        let prefix = match self.advance()? {
            Spanned {
                token: Token::Name(name),
                ..
            } => name,
            other => return Err(self.unexpected(&other, "namespace prefix")),
        };
        self.expect(Token::Operator("=".to_string()), "'='")?;
        let uri = match self.advance()? {
            Spanned {
                token: Token::String(uri),
                ..
            } => uri,
            other => return Err(self.unexpected(&other, "namespace URI")),
        };

        let span = Span::new(start, self.last_end);
        self.expect(Token::Semicolon, "';'")?;

        Ok(PrologItem::NamespaceDecl { prefix, uri, span })
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, ParseError> {
        let start = self.advance()?.span.start;
        self.expect_keyword("variable")?;

        let name = match self.advance()? {
            Spanned {
                token: Token::Variable(name),
                ..
            } => name,
            other => return Err(self.unexpected(&other, "variable name")),
        };

        let mut type_decl = None;
        if self.peek_is_name("as")? {
            self.advance()?;
            let type_start = self.peek()?.span.start;
            let mut depth = 0usize;
            loop {
                match self.peek_token()?.clone() {
                    Token::Assign | Token::Semicolon if depth == 0 => break,
                    Token::Name(word) if depth == 0 && word == "external" => break,
                    Token::OpenParen => depth += 1,
                    Token::CloseParen => depth = depth.saturating_sub(1),
                    Token::Eof => {
                        let pos = self.peek()?.span.start;
                        return Err(self.error(pos, "unterminated variable declaration"));
                    }
                    _ => {}
                }
                self.advance()?;
            }
            let text = self.tokenizer.source()[type_start..self.last_end].trim();
            type_decl = Some(text.to_string());
        }

        let mut value = None;
        if self.peek_is_name("external")? {
            self.advance()?;
        }
        if self.peek_token()? == &Token::Assign {
            self.advance()?;
            value = Some(self.parse_expr_single(&[])?);
        }

        let span = Span::new(start, self.last_end);
        self.expect(Token::Semicolon, "';'")?;

        Ok(VarDecl {
            name,
            type_decl,
            value,
            span,
        })
    }

    /// Any declaration the compiler does not interpret; braces are parsed as blocks
    fn parse_other_decl(&mut self) -> Result<PrologItem, ParseError> {
        let start = self.peek()?.span.start;
        let mut blocks = Vec::new();
        let mut depth = 0usize;

        loop {
            match self.peek_token()?.clone() {
                Token::Semicolon if depth == 0 => break,
                Token::OpenBrace => {
                    blocks.push(self.parse_brace(false)?);
                    continue;
                }
                Token::OpenParen => depth += 1,
                Token::CloseParen => depth = depth.saturating_sub(1),
                Token::Eof => return Err(self.error(start, "unterminated declaration")),
                _ => {}
            }
            self.advance()?;
        }

        let span = Span::new(start, self.last_end);
        self.expect(Token::Semicolon, "';'")?;

        Ok(PrologItem::Other { span, blocks })
    }

    // ---- expressions --------------------------------------------------------

    /// `ExprSingle ("," ExprSingle)*`
    fn parse_expr(&mut self, stops: &[&str]) -> Result<Node, ParseError> {
        let first = self.parse_expr_single(stops)?;
        if self.peek_token()? != &Token::Comma {
            return Ok(first);
        }

        let start = first.span.start;
        let mut items = vec![first];
        while self.peek_token()? == &Token::Comma {
            self.advance()?;
            items.push(self.parse_expr_single(stops)?);
        }

        Ok(Node::new(
            NodeKind::Sequence(items),
            Span::new(start, self.last_end),
        ))
    }

    fn parse_expr_single(&mut self, stops: &[&str]) -> Result<Node, ParseError> {
        match self.keyword_form()? {
            Some(form) => self.parse_keyword_form(form, stops),
            None => self.parse_operator_expr(stops),
        }
    }

    fn keyword_form(&mut self) -> Result<Option<KeywordForm>, ParseError> {
        let ahead = self.lookahead(3)?;
        let word = |i: usize| match ahead.get(i) {
            Some(Token::Name(name)) => Some(name.as_str()),
            _ => None,
        };
        let variable_follows = matches!(ahead.get(1), Some(Token::Variable(_)));

        let form = match word(0) {
            Some("if") if ahead.get(1) == Some(&Token::OpenParen) => Some(KeywordForm::If),
            Some("insert") if matches!(word(1), Some("node" | "nodes")) => {
                Some(KeywordForm::Insert)
            }
            Some("delete") if matches!(word(1), Some("node" | "nodes")) => {
                Some(KeywordForm::Delete)
            }
            Some("replace")
                if word(1) == Some("node") || (word(1) == Some("value") && word(2) == Some("of")) =>
            {
                Some(KeywordForm::Replace)
            }
            Some("rename") if word(1) == Some("node") => Some(KeywordForm::Rename),
            Some("for" | "let" | "copy") if variable_follows => Some(KeywordForm::Flwor("return")),
            Some("for") if matches!(word(1), Some("tumbling" | "sliding")) => {
                Some(KeywordForm::Flwor("return"))
            }
            Some("some" | "every") if variable_follows => Some(KeywordForm::Flwor("satisfies")),
            _ => None,
        };

        Ok(form)
    }

    fn parse_keyword_form(&mut self, form: KeywordForm, stops: &[&str]) -> Result<Node, ParseError> {
        match form {
            KeywordForm::If => self.parse_if(stops),
            KeywordForm::Insert => self.parse_insert(stops),
            KeywordForm::Delete => self.parse_delete(stops),
            KeywordForm::Replace => self.parse_replace(stops),
            KeywordForm::Rename => self.parse_rename(stops),
            KeywordForm::Flwor(terminator) => self.parse_flwor(terminator, stops),
        }
    }

    /// `if (Expr) then ExprSingle else ExprSingle`
    fn parse_if(&mut self, stops: &[&str]) -> Result<Node, ParseError> {
        let start = self.advance()?.span.start;
        self.expect(Token::OpenParen, "'(' after 'if'")?;
        let test = self.parse_expr(&[])?;
        self.expect(Token::CloseParen, "')'")?;

        self.expect_keyword("then")?;
        let then_branch = self.parse_expr_single(&["else"])?;
        self.expect_keyword("else")?;
        let else_branch = self.parse_expr_single(stops)?;

        Ok(Node::new(
            NodeKind::If {
                test: Box::new(test),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            Span::new(start, self.last_end),
        ))
    }

    /// `insert node(s) Source (after|before|as first into|as last into|into) Target`
    fn parse_insert(&mut self, stops: &[&str]) -> Result<Node, ParseError> {
        let start = self.advance()?.span.start;
        self.advance()?;
        let source = self.parse_expr_single(&["after", "before", "as", "into"])?;

        let choice = self.advance()?;
        let position = match &choice.token {
            Token::Name(word) if word == "after" => InsertPosition::After,
            Token::Name(word) if word == "before" => InsertPosition::Before,
            Token::Name(word) if word == "into" => InsertPosition::Into,
            Token::Name(word) if word == "as" => {
                let which = self.advance()?;
                let position = match &which.token {
                    Token::Name(word) if word == "first" => InsertPosition::AsFirstInto,
                    Token::Name(word) if word == "last" => InsertPosition::AsLastInto,
                    _ => return Err(self.unexpected(&which, "'first' or 'last'")),
                };
                self.expect_keyword("into")?;
                position
            }
            _ => return Err(self.unexpected(&choice, "insert target choice")),
        };

        let target = self.parse_expr_single(stops)?;

        Ok(Node::new(
            NodeKind::Insert {
                source: Box::new(source),
                position,
                target: Box::new(target),
            },
            Span::new(start, self.last_end),
        ))
    }

    /// `delete node(s) Target`
    fn parse_delete(&mut self, stops: &[&str]) -> Result<Node, ParseError> {
        let start = self.advance()?.span.start;
        self.advance()?;
        let target = self.parse_expr_single(stops)?;

        Ok(Node::new(
            NodeKind::Delete {
                target: Box::new(target),
            },
            Span::new(start, self.last_end),
        ))
    }

    /// `replace (value of)? node Target with Source`
    fn parse_replace(&mut self, stops: &[&str]) -> Result<Node, ParseError> {
        let start = self.advance()?.span.start;
        let value_of = if self.peek_is_name("value")? {
            self.advance()?;
            self.expect_keyword("of")?;
            true
        } else {
            false
        };
        self.expect_keyword("node")?;

        let target = self.parse_expr_single(&["with"])?;
        self.expect_keyword("with")?;
        let source = self.parse_expr_single(stops)?;

        Ok(Node::new(
            NodeKind::Replace {
                value_of,
                target: Box::new(target),
                source: Box::new(source),
            },
            Span::new(start, self.last_end),
        ))
    }

    /// `rename node Target as NewName`
    fn parse_rename(&mut self, stops: &[&str]) -> Result<Node, ParseError> {
        let start = self.advance()?.span.start;
        self.expect_keyword("node")?;
        let target = self.parse_expr_single(&["as"])?;
        self.expect_keyword("as")?;
        let new_name = self.parse_expr_single(stops)?;

        Ok(Node::new(
            NodeKind::Rename {
                target: Box::new(target),
                new_name: Box::new(new_name),
            },
            Span::new(start, self.last_end),
        ))
    }

    /// for/let/copy ... return, some/every ... satisfies
    fn parse_flwor(&mut self, terminator: &'static str, stops: &[&str]) -> Result<Node, ParseError> {
        let start = self.advance()?.span.start;
        let mut clauses = Vec::new();

        loop {
            clauses.push(self.parse_operator_expr(&[terminator])?);
            let next = self.peek()?.clone();
            match &next.token {
                Token::Comma => {
                    self.advance()?;
                }
                Token::Name(word) if word == terminator => break,
                _ => return Err(self.unexpected(&next, &format!("'{terminator}'"))),
            }
        }

        self.advance()?;
        let body = self.parse_expr_single(stops)?;

        Ok(Node::new(
            NodeKind::Flwor {
                clauses,
                body: Box::new(body),
            },
            Span::new(start, self.last_end),
        ))
    }

    /// Operands joined by operators, path steps and predicates.
    ///
    /// Only recognised operands become children; the operators themselves live in
    /// the span text. A lone operand covering the whole span is returned as is.
    fn parse_operator_expr(&mut self, stops: &[&str]) -> Result<Node, ParseError> {
        let start = self.peek()?.span.start;
        let mut children = Vec::new();
        let mut expect_operand = true;
        let mut after_path_step = false;
        let mut consumed = false;

        loop {
            let next = self.peek()?.clone();
            let stop = match &next.token {
                Token::Eof
                | Token::Comma
                | Token::CloseParen
                | Token::CloseBracket
                | Token::CloseBrace
                | Token::Semicolon => true,
                Token::Colon | Token::Assign => stops.contains(&MAP_KEY),
                Token::Name(word) => !after_path_step && stops.contains(&word.as_str()),
                _ => false,
            };
            if stop {
                break;
            }
            consumed = true;

            let operand_like = matches!(
                next.token,
                Token::Variable(_) | Token::String(_) | Token::Number(_) | Token::Dot
            );

            if expect_operand || operand_like {
                after_path_step = matches!(next.token, Token::Slash | Token::DoubleSlash | Token::At);
                expect_operand = self.parse_operand(next, stops, &mut children)?;
                continue;
            }

            after_path_step = false;
            match &next.token {
                Token::OpenBracket => {
                    self.advance()?;
                    let inner = self.parse_expr(&[])?;
                    self.expect(Token::CloseBracket, "']'")?;
                    children.push(Node::new(
                        NodeKind::Predicate(Box::new(inner)),
                        Span::new(next.span.start, self.last_end),
                    ));
                }
                Token::OpenParen => {
                    // dynamic function call: $f(...)
                    children.push(self.parse_parenthesized()?);
                }
                Token::OpenBrace => {
                    children.push(self.parse_brace(false)?);
                }
                Token::Slash | Token::DoubleSlash => {
                    self.advance()?;
                    expect_operand = true;
                    after_path_step = true;
                }
                Token::Operator(op) if op == "::" => {
                    self.advance()?;
                    expect_operand = true;
                    after_path_step = true;
                }
                _ => {
                    // infix operator or keyword (and, or, eq, in, where, ...)
                    self.advance()?;
                    expect_operand = true;
                }
            }
        }

        if !consumed {
            let next = self.peek()?.clone();
            return Err(self.unexpected(&next, "expression"));
        }

        let span = Span::new(start, self.last_end);
        if children.len() == 1 && children[0].span == span {
            return Ok(children.remove(0));
        }

        Ok(Node::new(NodeKind::Opaque(children), span))
    }

    /// Parse one operand; returns whether another operand is expected next
    fn parse_operand(
        &mut self,
        next: Spanned,
        stops: &[&str],
        children: &mut Vec<Node>,
    ) -> Result<bool, ParseError> {
        match next.token {
            Token::OpenParen => {
                children.push(self.parse_parenthesized()?);
                Ok(false)
            }
            Token::OpenBracket => {
                children.push(self.parse_array()?);
                Ok(false)
            }
            Token::OpenBrace => {
                children.push(self.parse_brace(false)?);
                Ok(false)
            }
            Token::Dot => {
                self.advance()?;
                children.push(Node::new(NodeKind::ContextItem, next.span));
                Ok(false)
            }
            Token::Variable(name) => {
                self.advance()?;
                children.push(Node::new(NodeKind::VarRef(name), next.span));
                Ok(false)
            }
            Token::String(value) => {
                self.advance()?;
                children.push(Node::new(NodeKind::StringLiteral(value), next.span));
                Ok(false)
            }
            Token::Number(_) => {
                self.advance()?;
                children.push(Node::new(NodeKind::NumericLiteral, next.span));
                Ok(false)
            }
            Token::DotDot | Token::Star => {
                self.advance()?;
                Ok(false)
            }
            Token::Less => {
                let source = self.tokenizer.source();
                let after = &source[next.span.end..];
                if after.chars().next().is_some_and(is_name_start) {
                    children.push(self.parse_element_at(next.span.start)?);
                    Ok(false)
                } else if after.starts_with("!--") {
                    let end = find_after(source, next.span.end, "-->")
                        .ok_or_else(|| self.error(next.span.start, "unterminated comment constructor"))?;
                    self.finish_raw(end);
                    Ok(false)
                } else {
                    Err(self.unexpected(&next, "expression"))
                }
            }
            Token::Name(name) => {
                if let Some(form) = self.keyword_form()? {
                    children.push(self.parse_keyword_form(form, stops)?);
                    return Ok(false);
                }

                let ahead = self.lookahead(2)?;
                match ahead.get(1) {
                    Some(Token::OpenParen) if KIND_TESTS.contains(&name.as_str()) => {
                        self.advance()?;
                        children.push(self.parse_parenthesized()?);
                        Ok(name == "function")
                    }
                    Some(Token::OpenParen) => {
                        children.push(self.parse_function_call()?);
                        Ok(false)
                    }
                    Some(Token::OpenBrace) if name == "map" => {
                        self.advance()?;
                        children.push(self.parse_brace(true)?);
                        Ok(false)
                    }
                    Some(Token::OpenBrace | Token::Name(_))
                        if BLOCK_KEYWORDS.contains(&name.as_str()) =>
                    {
                        self.advance()?;
                        Ok(true)
                    }
                    _ => {
                        self.advance()?;
                        Ok(false)
                    }
                }
            }
            _ => {
                // prefix operators, path starts (/, //, @) and the like
                self.advance()?;
                Ok(true)
            }
        }
    }

    fn parse_function_call(&mut self) -> Result<Node, ParseError> {
        let name_token = self.advance()?;
        let Token::Name(name) = name_token.token else {
            return Err(self.error(name_token.span.start, "expected function name"));
        };
        self.expect(Token::OpenParen, "'('")?;

        let mut args = Vec::new();
        if self.peek_token()? == &Token::CloseParen {
            self.advance()?;
        } else {
            loop {
                args.push(self.parse_expr_single(&[])?);
                let next = self.advance()?;
                match next.token {
                    Token::Comma => continue,
                    Token::CloseParen => break,
                    _ => return Err(self.unexpected(&next, "',' or ')' in argument list")),
                }
            }
        }

        Ok(Node::new(
            NodeKind::FunctionCall { name, args },
            Span::new(name_token.span.start, self.last_end),
        ))
    }

    fn parse_parenthesized(&mut self) -> Result<Node, ParseError> {
        let start = self.expect(Token::OpenParen, "'('")?.span.start;
        if self.peek_token()? == &Token::CloseParen {
            self.advance()?;
            return Ok(Node::new(
                NodeKind::Parenthesized(None),
                Span::new(start, self.last_end),
            ));
        }

        let inner = self.parse_expr(&[])?;
        self.expect(Token::CloseParen, "')'")?;

        Ok(Node::new(
            NodeKind::Parenthesized(Some(Box::new(inner))),
            Span::new(start, self.last_end),
        ))
    }

    /// Square array constructor `[a, b, c]`
    fn parse_array(&mut self) -> Result<Node, ParseError> {
        let start = self.expect(Token::OpenBracket, "'['")?.span.start;
        let mut items = Vec::new();

        if self.peek_token()? == &Token::CloseBracket {
            self.advance()?;
        } else {
            loop {
                items.push(self.parse_expr_single(&[])?);
                let next = self.advance()?;
                match next.token {
                    Token::Comma => continue,
                    Token::CloseBracket => break,
                    _ => return Err(self.unexpected(&next, "',' or ']' in array")),
                }
            }
        }

        Ok(Node::new(NodeKind::Array(items), Span::new(start, self.last_end)))
    }

    /// `{ ... }` in operand position: a map constructor when the first item is
    /// followed by `:` or `:=`, otherwise a block
    fn parse_brace(&mut self, force_map: bool) -> Result<Node, ParseError> {
        let start = self.expect(Token::OpenBrace, "'{'")?.span.start;

        if self.peek_token()? == &Token::CloseBrace {
            self.advance()?;
            let kind = if force_map {
                NodeKind::Map(Vec::new())
            } else {
                NodeKind::Block(None)
            };
            return Ok(Node::new(kind, Span::new(start, self.last_end)));
        }

        let first = self.parse_expr_single(&[MAP_KEY])?;

        if matches!(self.peek_token()?, Token::Colon | Token::Assign) {
            self.advance()?;
            let value = self.parse_expr_single(&[])?;
            let mut entries = vec![MapEntry { key: first, value }];

            while self.peek_token()? == &Token::Comma {
                self.advance()?;
                let key = self.parse_expr_single(&[MAP_KEY])?;
                let separator = self.advance()?;
                if !matches!(separator.token, Token::Colon | Token::Assign) {
                    return Err(self.unexpected(&separator, "':' in map constructor"));
                }
                let value = self.parse_expr_single(&[])?;
                entries.push(MapEntry { key, value });
            }

            self.expect(Token::CloseBrace, "'}'")?;
            return Ok(Node::new(NodeKind::Map(entries), Span::new(start, self.last_end)));
        }

        if force_map {
            let next = self.peek()?.clone();
            return Err(self.unexpected(&next, "':' in map constructor"));
        }

        let inner_start = first.span.start;
        let mut items = vec![first];
        while self.peek_token()? == &Token::Comma {
            self.advance()?;
            items.push(self.parse_expr_single(&[])?);
        }
        let inner = if items.len() == 1 {
            items.remove(0)
        } else {
            Node::new(
                NodeKind::Sequence(items),
                Span::new(inner_start, self.last_end),
            )
        };

        self.expect(Token::CloseBrace, "'}'")?;
        Ok(Node::new(
            NodeKind::Block(Some(Box::new(inner))),
            Span::new(start, self.last_end),
        ))
    }

    // ---- direct element constructors (raw mode) ----------------------------

    /// Scan `<name ...>...</name>` starting at the `<`
    fn parse_element_at(&mut self, start: usize) -> Result<Node, ParseError> {
        let source = self.tokenizer.source();
        let mut pos = start + 1;
        let name = scan_name(source, &mut pos);
        if name.is_empty() {
            return Err(self.error(start, "expected element name after '<'"));
        }
        let mut children = Vec::new();

        // attributes
        loop {
            skip_whitespace(source, &mut pos);
            let rest = &source[pos..];
            if rest.starts_with("/>") {
                pos += 2;
                self.finish_raw(pos);
                return Ok(Node::new(
                    NodeKind::Element { name, children },
                    Span::new(start, pos),
                ));
            }
            if rest.starts_with('>') {
                pos += 1;
                break;
            }

            let attribute = scan_name(source, &mut pos);
            if attribute.is_empty() {
                return Err(self.error(pos, format!("malformed start tag <{name}>")));
            }
            skip_whitespace(source, &mut pos);
            if !source[pos..].starts_with('=') {
                return Err(self.error(pos, format!("expected '=' after attribute {attribute}")));
            }
            pos += 1;
            skip_whitespace(source, &mut pos);

            let quote = match source[pos..].chars().next() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(self.error(pos, format!("expected quoted value for {attribute}"))),
            };
            pos += 1;

            loop {
                let rest = &source[pos..];
                let Some(ch) = rest.chars().next() else {
                    return Err(self.error(start, format!("unterminated attribute {attribute}")));
                };
                if ch == quote {
                    if rest[1..].starts_with(quote) {
                        pos += 2;
                        continue;
                    }
                    pos += 1;
                    break;
                }
                if rest.starts_with("{{") || rest.starts_with("}}") {
                    pos += 2;
                    continue;
                }
                if ch == '{' {
                    let enclosed = self.parse_enclosed_at(pos)?;
                    pos = enclosed.span.end;
                    children.push(enclosed);
                    continue;
                }
                pos += ch.len_utf8();
            }
        }

        // content
        loop {
            let rest = &source[pos..];
            if rest.is_empty() {
                return Err(self.error(start, format!("unterminated element <{name}>")));
            }

            if rest.starts_with("</") {
                pos += 2;
                let closing = scan_name(source, &mut pos);
                if closing != name {
                    return Err(self.error(
                        pos,
                        format!("mismatched closing tag </{closing}> for <{name}>"),
                    ));
                }
                skip_whitespace(source, &mut pos);
                if !source[pos..].starts_with('>') {
                    return Err(self.error(pos, format!("expected '>' to close </{name}")));
                }
                pos += 1;
                break;
            }

            let skipped = [("<!--", "-->"), ("<![CDATA[", "]]>"), ("<?", "?>")]
                .iter()
                .find(|(open, _)| rest.starts_with(open));
            if let Some((_, close)) = skipped {
                pos = find_after(source, pos, close)
                    .ok_or_else(|| self.error(pos, format!("missing '{close}'")))?;
                continue;
            }

            if rest.starts_with('<') {
                let element = self.parse_element_at(pos)?;
                pos = element.span.end;
                children.push(element);
                continue;
            }
            if rest.starts_with("{{") || rest.starts_with("}}") {
                pos += 2;
                continue;
            }
            if rest.starts_with('{') {
                let enclosed = self.parse_enclosed_at(pos)?;
                pos = enclosed.span.end;
                children.push(enclosed);
                continue;
            }
            if rest.starts_with('}') {
                return Err(self.error(pos, "unescaped '}' in element content"));
            }

            pos += rest.chars().next().map_or(1, char::len_utf8);
        }

        self.finish_raw(pos);
        Ok(Node::new(
            NodeKind::Element { name, children },
            Span::new(start, pos),
        ))
    }

    /// `{ Expr }` inside a direct constructor, starting at the `{`
    fn parse_enclosed_at(&mut self, start: usize) -> Result<Node, ParseError> {
        self.peeked = None;
        self.tokenizer.seek(start + 1);

        let inner = if self.peek_token()? == &Token::CloseBrace {
            None
        } else {
            Some(Box::new(self.parse_expr(&[])?))
        };
        let close = self.expect(Token::CloseBrace, "'}' closing enclosed expression")?;

        Ok(Node::new(
            NodeKind::Enclosed(inner),
            Span::new(start, close.span.end),
        ))
    }

    /// Resume tokenizing after a raw-mode construct ending at `end`
    fn finish_raw(&mut self, end: usize) {
        self.peeked = None;
        self.tokenizer.seek(end);
        self.last_end = end;
    }

    // ---- token helpers ------------------------------------------------------

    fn peek(&mut self) -> Result<&Spanned, ParseError> {
        let next = match self.peeked.take() {
            Some(token) => token,
            None => self.tokenizer.next_token()?,
        };
        Ok(self.peeked.insert(next))
    }

    fn peek_token(&mut self) -> Result<&Token, ParseError> {
        Ok(&self.peek()?.token)
    }

    fn peek_is_name(&mut self, word: &str) -> Result<bool, ParseError> {
        Ok(matches!(self.peek_token()?, Token::Name(name) if name == word))
    }

    fn advance(&mut self) -> Result<Spanned, ParseError> {
        let next = match self.peeked.take() {
            Some(token) => token,
            None => self.tokenizer.next_token()?,
        };
        if next.token != Token::Eof {
            self.last_end = next.span.end;
        }
        Ok(next)
    }

    /// Up to `count` upcoming tokens, without consuming them.
    ///
    /// Scanning stops quietly at the first lexical error; the error surfaces
    /// again when the tokens are really consumed.
    fn lookahead(&mut self, count: usize) -> Result<Vec<Token>, ParseError> {
        let resume = match &self.peeked {
            Some(token) => token.span.start,
            None => self.tokenizer.position(),
        };
        self.peeked = None;
        self.tokenizer.seek(resume);

        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            match self.tokenizer.next_token() {
                Ok(next) => {
                    let eof = next.token == Token::Eof;
                    out.push(next.token);
                    if eof {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        self.tokenizer.seek(resume);
        Ok(out)
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<Spanned, ParseError> {
        let next = self.advance()?;
        if next.token == expected {
            Ok(next)
        } else {
            Err(self.unexpected(&next, what))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Spanned, ParseError> {
        let next = self.advance()?;
        match &next.token {
            Token::Name(word) if word == keyword => Ok(next),
            _ => Err(self.unexpected(&next, &format!("'{keyword}'"))),
        }
    }

    fn error(&self, pos: usize, message: impl Into<String>) -> ParseError {
        ParseError::at(self.tokenizer.source(), pos, message)
    }

    fn unexpected(&self, found: &Spanned, expected: &str) -> ParseError {
        self.error(
            found.span.start,
            format!("expected {expected}, found {}", describe(&found.token)),
        )
    }
}

fn describe(token: &Token) -> String {
    let symbol = match token {
        Token::Name(name) => return format!("'{name}'"),
        Token::Variable(name) => return format!("'${name}'"),
        Token::String(value) => return format!("string \"{value}\""),
        Token::Number(value) => return format!("number {value}"),
        Token::Operator(op) => return format!("'{op}'"),
        Token::Eof => return "end of input".to_string(),
        Token::OpenParen => "(",
        Token::CloseParen => ")",
        Token::OpenBracket => "[",
        Token::CloseBracket => "]",
        Token::OpenBrace => "{",
        Token::CloseBrace => "}",
        Token::Comma => ",",
        Token::Semicolon => ";",
        Token::Assign => ":=",
        Token::Colon => ":",
        Token::Dot => ".",
        Token::DotDot => "..",
        Token::Slash => "/",
        Token::DoubleSlash => "//",
        Token::At => "@",
        Token::Star => "*",
        Token::Less => "<",
    };
    format!("'{symbol}'")
}

fn scan_name(source: &str, pos: &mut usize) -> String {
    let rest = &source[*pos..];
    let len = rest
        .char_indices()
        .find(|&(i, ch)| !(is_name_char(ch) || ch == ':') || (i == 0 && !is_name_start(ch)))
        .map_or(rest.len(), |(i, _)| i);
    *pos += len;
    rest[..len].to_string()
}

fn skip_whitespace(source: &str, pos: &mut usize) {
    let rest = &source[*pos..];
    *pos += rest.len() - rest.trim_start().len();
}

/// Byte offset just past the next occurrence of `needle` at or after `from`
fn find_after(source: &str, from: usize, needle: &str) -> Option<usize> {
    source[from..]
        .find(needle)
        .map(|offset| from + offset + needle.len())
}
