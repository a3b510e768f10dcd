//! Tokenizer
//!
//! Turns expression text into tokens carrying their character span and
//! line/column, so the parser can both report locations and tell whether
//! two tokens touch (`.a.b` versus `.a .b`).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{JsltError, Location, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Literals
    /// Unsigned digits; a preceding `-` is applied by the parser.
    Integer(u64),
    Decimal(f64),
    String(String),
    Ident(String),
    /// `prefix:name`, only lexed when directly followed by `(`
    PrefixedIdent(String),
    Variable(String),

    // Keywords
    True,
    False,
    Null,
    Let,
    Def,
    Import,
    As,
    If,
    Else,
    For,
    And,
    Or,

    // Punctuation
    Dot,
    Comma,
    Colon,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Assign,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    Eof,
}

impl TokenType {
    /// Text of identifier-like tokens, keywords included, for use as keys.
    pub fn key_name(&self) -> Option<String> {
        let name = match self {
            TokenType::Ident(name) => return Some(name.clone()),
            TokenType::True => "true",
            TokenType::False => "false",
            TokenType::Null => "null",
            TokenType::Let => "let",
            TokenType::Def => "def",
            TokenType::Import => "import",
            TokenType::As => "as",
            TokenType::If => "if",
            TokenType::Else => "else",
            TokenType::For => "for",
            TokenType::And => "and",
            TokenType::Or => "or",
            _ => return None,
        };
        Some(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    /// Character offset of the first character.
    pub start: usize,
    /// Character offset just past the last character.
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

lazy_static::lazy_static! {
    static ref KEYWORDS: HashMap<&'static str, TokenType> = {
        let mut m = HashMap::new();
        m.insert("true", TokenType::True);
        m.insert("false", TokenType::False);
        m.insert("null", TokenType::Null);
        m.insert("let", TokenType::Let);
        m.insert("def", TokenType::Def);
        m.insert("import", TokenType::Import);
        m.insert("as", TokenType::As);
        m.insert("if", TokenType::If);
        m.insert("else", TokenType::Else);
        m.insert("for", TokenType::For);
        m.insert("and", TokenType::And);
        m.insert("or", TokenType::Or);
        m
    };
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    /// Character offsets at which each line starts.
    line_starts: Vec<usize>,
    source: Option<Arc<str>>,
}

impl Lexer {
    pub fn new(input: &str, source: Option<Arc<str>>) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let mut line_starts = vec![0];
        for (i, c) in chars.iter().enumerate() {
            if *c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { chars, pos: 0, line_starts, source }
    }

    /// 1-based line and column of a character offset.
    fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }

    pub fn location(&self, offset: usize) -> Location {
        let (line, column) = self.line_col(offset);
        Location::new(self.source.clone(), line, column)
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> JsltError {
        JsltError::parse(message, self.location(offset))
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek(0) {
            let start = self.pos;

            // Whitespace
            if c.is_whitespace() {
                self.pos += 1;
                continue;
            }

            // Comments
            if c == '/' && self.peek(1) == Some('/') {
                while let Some(c) = self.peek(0) {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
                continue;
            }

            let token_type = if c == '"' {
                self.read_string()?
            } else if c.is_ascii_digit() {
                self.read_number()?
            } else if c == '$' {
                self.pos += 1;
                match self.peek(0) {
                    Some(c) if is_ident_start(c) => TokenType::Variable(self.read_ident()),
                    _ => return Err(self.error("Expected variable name after '$'", start)),
                }
            } else if is_ident_start(c) {
                self.read_word()
            } else {
                self.read_operator(c, start)?
            };

            let (line, column) = self.line_col(start);
            tokens.push(Token { token_type, start, end: self.pos, line, column });
        }

        let (line, column) = self.line_col(self.pos);
        tokens.push(Token { token_type: TokenType::Eof, start: self.pos, end: self.pos, line, column });
        Ok(tokens)
    }

    fn read_ident(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(0), Some(c) if is_ident_char(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn read_word(&mut self) -> TokenType {
        let name = self.read_ident();

        // prefix:name( is an imported function call
        if self.peek(0) == Some(':') && matches!(self.peek(1), Some(c) if is_ident_start(c)) {
            let saved = self.pos;
            self.pos += 1;
            let function = self.read_ident();
            if self.peek(0) == Some('(') {
                return TokenType::PrefixedIdent(format!("{}:{}", name, function));
            }
            self.pos = saved;
        }

        match KEYWORDS.get(name.as_str()) {
            Some(keyword) => keyword.clone(),
            None => TokenType::Ident(name),
        }
    }

    fn read_number(&mut self) -> Result<TokenType> {
        let start = self.pos;
        let mut integral = true;

        while matches!(self.peek(0), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek(0) == Some('.') && matches!(self.peek(1), Some(c) if c.is_ascii_digit()) {
            integral = false;
            self.pos += 1;
            while matches!(self.peek(0), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(0), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek(1), Some('+' | '-')));
            if matches!(self.peek(1 + sign), Some(c) if c.is_ascii_digit()) {
                integral = false;
                self.pos += 1 + sign;
                while matches!(self.peek(0), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        if integral {
            if let Ok(n) = text.parse::<u64>() {
                return Ok(TokenType::Integer(n));
            }
        }
        text.parse::<f64>()
            .map(TokenType::Decimal)
            .map_err(|_| self.error(format!("Invalid number '{}'", text), start))
    }

    fn read_string(&mut self) -> Result<TokenType> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut value = String::new();

        loop {
            let c = match self.peek(0) {
                Some(c) => c,
                None => return Err(self.error("Unterminated string", start)),
            };
            self.pos += 1;
            match c {
                '"' => break,
                '\\' => {
                    let escaped = match self.peek(0) {
                        Some(e) => e,
                        None => return Err(self.error("Unterminated string", start)),
                    };
                    self.pos += 1;
                    match escaped {
                        '"' => value.push('"'),
                        '\\' => value.push('\\'),
                        '/' => value.push('/'),
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        'b' => value.push('\u{0008}'),
                        'f' => value.push('\u{000C}'),
                        'u' => value.push(self.read_unicode_escape()?),
                        other => {
                            return Err(self.error(
                                format!("Invalid escape '\\{}' in string", other),
                                self.pos - 2,
                            ))
                        }
                    }
                }
                c => value.push(c),
            }
        }
        Ok(TokenType::String(value))
    }

    fn read_hex4(&mut self) -> Result<u32> {
        let start = self.pos;
        let hex: String = self.chars.iter().skip(self.pos).take(4).collect();
        if hex.chars().count() != 4 {
            return Err(self.error("Truncated \\u escape", start));
        }
        self.pos += 4;
        u32::from_str_radix(&hex, 16).map_err(|_| self.error(format!("Invalid \\u escape '{}'", hex), start))
    }

    fn read_unicode_escape(&mut self) -> Result<char> {
        let start = self.pos;
        let high = self.read_hex4()?;

        // surrogate pair written as two escapes
        if (0xD800..0xDC00).contains(&high) && self.peek(0) == Some('\\') && self.peek(1) == Some('u') {
            self.pos += 2;
            let low = self.read_hex4()?;
            let combined = 0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
            return char::from_u32(combined).ok_or_else(|| self.error("Invalid surrogate pair", start));
        }
        char::from_u32(high).ok_or_else(|| self.error("Invalid \\u escape", start))
    }

    fn read_operator(&mut self, c: char, start: usize) -> Result<TokenType> {
        let next = self.peek(1);
        let (token_type, width) = match (c, next) {
            ('=', Some('=')) => (TokenType::Eq, 2),
            ('!', Some('=')) => (TokenType::Ne, 2),
            ('<', Some('=')) => (TokenType::Le, 2),
            ('>', Some('=')) => (TokenType::Ge, 2),
            ('=', _) => (TokenType::Assign, 1),
            ('<', _) => (TokenType::Lt, 1),
            ('>', _) => (TokenType::Gt, 1),
            ('+', _) => (TokenType::Plus, 1),
            ('-', _) => (TokenType::Minus, 1),
            ('*', _) => (TokenType::Star, 1),
            ('/', _) => (TokenType::Slash, 1),
            ('%', _) => (TokenType::Percent, 1),
            ('|', _) => (TokenType::Pipe, 1),
            ('.', _) => (TokenType::Dot, 1),
            (',', _) => (TokenType::Comma, 1),
            (':', _) => (TokenType::Colon, 1),
            ('(', _) => (TokenType::LParen, 1),
            (')', _) => (TokenType::RParen, 1),
            ('[', _) => (TokenType::LBracket, 1),
            (']', _) => (TokenType::RBracket, 1),
            ('{', _) => (TokenType::LBrace, 1),
            ('}', _) => (TokenType::RBrace, 1),
            _ => return Err(self.error(format!("Unexpected character '{}'", c), start)),
        };
        self.pos += width;
        Ok(token_type)
    }
}

pub fn tokenize(input: &str, source: Option<Arc<str>>) -> Result<Vec<Token>> {
    Lexer::new(input, source).tokenize()
}
