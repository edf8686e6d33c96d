// Expression Engine Lexer
// Tokenizes ${{ }} expressions and splits templated text into segments

use std::fmt;

/// Token types for workflow expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Null,
    True,
    False,
    Number(f64),
    String(String),

    // Identifiers and references
    Identifier(String),

    // Operators
    Star, // *
    Eq,   // ==
    Ne,   // !=
    Lt,   // <
    Le,   // <=
    Gt,   // >
    Ge,   // >=
    And,  // &&
    Or,   // ||
    Not,  // !
    Dot,  // .
    Comma,

    // Delimiters
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]

    // End of input
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Null => write!(f, "null"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "'{}'", s),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::Star => write!(f, "*"),
            Token::Eq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

/// Lexer error
#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lex error at position {}: {}", self.position, self.message)
    }
}

impl std::error::Error for LexError {}

/// Lexer for workflow expressions
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let Some(&(pos, ch)) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        self.position = pos;

        let single = match ch {
            '*' => Some(Token::Star),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        match ch {
            '=' => self.pair('=', Token::Eq, None, pos),
            '!' => self.pair('=', Token::Ne, Some(Token::Not), pos),
            '<' => self.pair('=', Token::Le, Some(Token::Lt), pos),
            '>' => self.pair('=', Token::Ge, Some(Token::Gt), pos),
            '&' => self.pair('&', Token::And, None, pos),
            '|' => self.pair('|', Token::Or, None, pos),

            '\'' => self.read_string(),

            '0'..='9' => self.read_number(),
            '-' => {
                let mut ahead = self.chars.clone();
                ahead.next();
                match ahead.peek() {
                    Some(&(_, d)) if d.is_ascii_digit() || d == '.' => self.read_number(),
                    _ => Err(LexError {
                        message: "unexpected character: '-'".to_string(),
                        position: pos,
                    }),
                }
            }

            'a'..='z' | 'A'..='Z' | '_' => self.read_identifier(),

            _ => Err(LexError {
                message: format!("unexpected character: '{}'", ch),
                position: pos,
            }),
        }
    }

    /// Consume a one or two character operator
    fn pair(
        &mut self,
        second: char,
        double: Token,
        single: Option<Token>,
        pos: usize,
    ) -> Result<Token, LexError> {
        self.advance();
        if self.peek_char() == Some(second) {
            self.advance();
            return Ok(double);
        }
        single.ok_or_else(|| LexError {
            message: format!("expected '{}' operator", double),
            position: pos,
        })
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        self.advance(); // opening quote

        let mut value = String::new();

        loop {
            match self.chars.peek() {
                Some(&(_, '\'')) => {
                    self.advance();
                    // '' is an escaped quote
                    if self.peek_char() == Some('\'') {
                        value.push('\'');
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(&(_, ch)) => {
                    value.push(ch);
                    self.advance();
                }
                None => {
                    return Err(LexError {
                        message: "unterminated string".to_string(),
                        position: start,
                    });
                }
            }
        }

        Ok(Token::String(value))
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        let mut num_str = String::new();

        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '+' {
                // Signs only belong to the number at the start or after an exponent
                if (ch == '-' || ch == '+')
                    && !(num_str.is_empty()
                        || (num_str.ends_with(['e', 'E']) && !is_hex(&num_str)))
                {
                    break;
                }
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        parse_number(&num_str)
            .map(Token::Number)
            .ok_or_else(|| LexError {
                message: format!("invalid number: {}", num_str),
                position: start,
            })
    }

    fn read_identifier(&mut self) -> Result<Token, LexError> {
        let mut ident = String::new();

        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let token = match ident.as_str() {
            "null" => Token::Null,
            "true" => Token::True,
            "false" => Token::False,
            _ => Token::Identifier(ident),
        };

        Ok(token)
    }
}

fn is_hex(s: &str) -> bool {
    let s = s.trim_start_matches('-');
    s.starts_with("0x") || s.starts_with("0X")
}

/// Parse a numeric literal: decimal, exponent, or `0x` hex, with optional sign.
pub fn parse_number(text: &str) -> Option<f64> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let value = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()? as f64
    } else {
        if body.is_empty() || !body.chars().next()?.is_ascii_digit() && !body.starts_with('.') {
            return None;
        }
        body.parse::<f64>().ok()?
    };

    Some(if negative { -value } else { value })
}

/// A piece of templated text
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text passed through unchanged
    Text(String),
    /// The inside of a `${{ }}` span, trimmed
    Expression(String),
}

/// Split text into literal and `${{ }}` segments, in source order.
///
/// An opening `${{` with no matching `}}` is kept as literal text.
pub fn extract_expressions(input: &str) -> Vec<Segment> {
    let mut results = Vec::new();
    let mut text = String::new();
    let mut rest = input;

    while let Some(start) = rest.find("${{") {
        let after = &rest[start + 3..];
        match find_closing(after) {
            Some(end) => {
                text.push_str(&rest[..start]);
                if !text.is_empty() {
                    results.push(Segment::Text(std::mem::take(&mut text)));
                }
                results.push(Segment::Expression(after[..end].trim().to_string()));
                rest = &after[end + 2..];
            }
            None => break,
        }
    }

    text.push_str(rest);
    if !text.is_empty() {
        results.push(Segment::Text(text));
    }

    results
}

/// Whether the text contains at least one complete `${{ }}` span
pub fn contains_expression(input: &str) -> bool {
    extract_expressions(input)
        .iter()
        .any(|s| matches!(s, Segment::Expression(_)))
}

/// Byte offset of the `}}` closing an expression, skipping quoted strings
fn find_closing(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut in_string = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_string = !in_string,
            b'}' if !in_string && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }

    None
}
