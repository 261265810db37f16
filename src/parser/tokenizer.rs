//! Tokenizer for addon query sources

use super::ast::Span;
use super::ParseError;

/// Token types that can appear in a query expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Names and references
    Name(String),     // local-name or prefix:local-name
    Variable(String), // $name, without the sigil

    // Literals
    String(String),
    Number(String),

    // Delimiters
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }

    // Punctuation
    Comma,       // ,
    Semicolon,   // ;
    Assign,      // :=
    Colon,       // :
    Dot,         // .
    DotDot,      // ..
    Slash,       // /
    DoubleSlash, // //
    At,          // @
    Star,        // *
    Less,        // < (comparison or start of a direct constructor)

    // Everything else the grammar treats as an infix or prefix operator
    Operator(String),

    Eof,
}

/// A token together with the source range it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

/// Tokenizes query source text on demand.
///
/// The parser may [`seek`](Tokenizer::seek) to an arbitrary byte offset, which is
/// how direct element constructors are scanned in raw mode and then handed back.
pub struct Tokenizer<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer for the given input
    pub fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.source.len());
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Spanned, ParseError> {
        self.skip_trivia()?;

        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(Spanned {
                token: Token::Eof,
                span: Span::new(start, start),
            });
        };

        let token = match ch {
            '(' => self.single(Token::OpenParen),
            ')' => self.single(Token::CloseParen),
            '[' => self.single(Token::OpenBracket),
            ']' => self.single(Token::CloseBracket),
            '{' => self.single(Token::OpenBrace),
            '}' => self.single(Token::CloseBrace),
            ',' => self.single(Token::Comma),
            ';' => self.single(Token::Semicolon),
            '@' => self.single(Token::At),
            '*' => self.single(Token::Star),
            ':' => {
                self.advance();
                match self.peek() {
                    Some('=') => {
                        self.advance();
                        Token::Assign
                    }
                    Some(':') => {
                        self.advance();
                        Token::Operator("::".to_string())
                    }
                    _ => Token::Colon,
                }
            }
            '.' => match self.peek_next() {
                Some('.') => {
                    self.advance();
                    self.advance();
                    Token::DotDot
                }
                Some(d) if d.is_ascii_digit() => self.read_number(),
                _ => self.single(Token::Dot),
            },
            '/' => {
                self.advance();
                if self.peek() == Some('/') {
                    self.advance();
                    Token::DoubleSlash
                } else {
                    Token::Slash
                }
            }
            '<' => {
                self.advance();
                match self.peek() {
                    Some('=') => self.operator_with("<="),
                    Some('<') => self.operator_with("<<"),
                    _ => Token::Less,
                }
            }
            '>' => {
                self.advance();
                match self.peek() {
                    Some('=') => self.operator_with(">="),
                    Some('>') => self.operator_with(">>"),
                    _ => Token::Operator(">".to_string()),
                }
            }
            '!' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.operator_with("!=")
                } else {
                    Token::Operator("!".to_string())
                }
            }
            '=' => {
                self.advance();
                if self.peek() == Some('>') {
                    self.operator_with("=>")
                } else {
                    Token::Operator("=".to_string())
                }
            }
            '|' => {
                self.advance();
                if self.peek() == Some('|') {
                    self.operator_with("||")
                } else {
                    Token::Operator("|".to_string())
                }
            }
            '+' | '-' | '?' | '#' | '%' => {
                self.advance();
                Token::Operator(ch.to_string())
            }
            '"' | '\'' => self.read_string()?,
            '$' => {
                self.advance();
                if !self.peek().is_some_and(is_name_start) {
                    return Err(ParseError::at(self.source, start, "expected variable name after '$'"));
                }
                Token::Variable(self.read_qname())
            }
            ch if ch.is_ascii_digit() => self.read_number(),
            ch if is_name_start(ch) => Token::Name(self.read_qname()),
            ch => {
                return Err(ParseError::at(
                    self.source,
                    start,
                    format!("unexpected character '{ch}'"),
                ))
            }
        };

        Ok(Spanned {
            token,
            span: Span::new(start, self.pos),
        })
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    /// Consume the second character of a two-character operator
    fn operator_with(&mut self, op: &str) -> Token {
        self.advance();
        Token::Operator(op.to_string())
    }

    /// Read a string literal; doubled delimiters stand for one delimiter
    fn read_string(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let quote = self.advance().unwrap_or('"');
        let mut value = String::new();

        while let Some(ch) = self.advance() {
            if ch == quote {
                if self.peek() == Some(quote) {
                    self.advance();
                    value.push(quote);
                    continue;
                }
                return Ok(Token::String(decode_entities(&value)));
            }
            value.push(ch);
        }

        Err(ParseError::at(self.source, start, "unterminated string literal"))
    }

    /// Read a numeric literal (integer, decimal or double)
    fn read_number(&mut self) -> Token {
        let mut number = String::new();

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '.' {
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let mark = self.pos;
            let mut exponent = String::from("e");
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                exponent.push(sign);
                self.advance();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while let Some(d) = self.peek().filter(|c| c.is_ascii_digit()) {
                    exponent.push(d);
                    self.advance();
                }
                number.push_str(&exponent);
            } else {
                self.pos = mark;
            }
        }

        Token::Number(number)
    }

    /// Read a name, including an optional `prefix:` part
    fn read_qname(&mut self) -> String {
        let mut name = self.read_ncname();

        if self.peek() == Some(':') {
            match self.peek_next() {
                Some(c) if is_name_start(c) => {
                    self.advance();
                    name.push(':');
                    name.push_str(&self.read_ncname());
                }
                Some('*') => {
                    self.advance();
                    self.advance();
                    name.push_str(":*");
                }
                _ => {}
            }
        }

        name
    }

    fn read_ncname(&mut self) -> String {
        let mut ident = String::new();

        while let Some(ch) = self.peek() {
            if is_name_char(ch) {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        ident
    }

    /// Skip whitespace and (possibly nested) `(: ... :)` comments
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            }

            if self.peek() == Some('(') && self.peek_next() == Some(':') {
                let start = self.pos;
                self.advance();
                self.advance();
                let mut depth = 1;
                while depth > 0 {
                    match self.advance() {
                        Some('(') if self.peek() == Some(':') => {
                            self.advance();
                            depth += 1;
                        }
                        Some(':') if self.peek() == Some(')') => {
                            self.advance();
                            depth -= 1;
                        }
                        Some(_) => {}
                        None => {
                            return Err(ParseError::at(self.source, start, "unterminated comment"))
                        }
                    }
                }
                continue;
            }

            return Ok(());
        }
    }

    /// Peek at the next character without consuming it
    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    /// Peek at the character after the next one
    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source[self.pos..].chars();
        iter.next();
        iter.next()
    }

    /// Advance to the next character
    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }
}

pub fn is_name_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

pub fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.')
}

/// Decode the predefined entity and character references
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let Some(semi) = rest.find(';') else { break };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
