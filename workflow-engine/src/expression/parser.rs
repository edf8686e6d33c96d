// Expression Engine Parser
// Parses tokens into an AST for ${{ }} expressions

use crate::expression::lexer::{LexError, Lexer, Token};

use std::fmt;

/// Abstract Syntax Tree node for expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    String(String),

    /// Top-level named value: github, env, matrix, ...
    Identifier(String),

    /// Function call: contains(a, b), success()
    FunctionCall { name: String, args: Vec<Expr> },

    /// Member access: obj.property
    Member { object: Box<Expr>, property: String },

    /// Index access: arr[0], obj['key']
    Index { object: Box<Expr>, index: Box<Expr> },

    /// Object filter: obj.* or obj[*]
    Filter { object: Box<Expr> },

    /// Logical negation: !expr
    Not(Box<Expr>),

    /// Binary operation: a == b, a && b
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Comparison
    Eq, // ==
    Ne, // !=
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=

    // Logical
    And, // &&
    Or,  // ||
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Eq => write!(f, "=="),
            BinaryOp::Ne => write!(f, "!="),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::Le => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::Ge => write!(f, ">="),
            BinaryOp::And => write!(f, "&&"),
            BinaryOp::Or => write!(f, "||"),
        }
    }
}

/// Parser error
#[derive(Debug, Clone)]
pub struct ParseExprError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for ParseExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at token {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseExprError {}

impl From<LexError> for ParseExprError {
    fn from(err: LexError) -> Self {
        Self {
            message: err.message,
            position: err.position,
        }
    }
}

/// Recursive descent parser for workflow expressions
pub struct ExprParser {
    tokens: Vec<Token>,
    position: usize,
}

impl ExprParser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse expression from string
    pub fn parse_str(input: &str) -> Result<Expr, ParseExprError> {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize()?;
        let mut parser = Self::new(tokens);
        parser.parse()
    }

    /// Parse the token stream into an expression
    pub fn parse(&mut self) -> Result<Expr, ParseExprError> {
        if self.is_at_end() {
            return Err(self.error("empty expression"));
        }

        let expr = self.parse_or()?;

        if !self.is_at_end() {
            return Err(self.error(&format!("unexpected token: {}", self.peek())));
        }

        Ok(expr)
    }

    // Precedence (lowest to highest):
    // 1. Or: ||
    // 2. And: &&
    // 3. Equality: == !=
    // 4. Comparison: < <= > >=
    // 5. Unary: !
    // 6. Postfix: . [] .* [*]

    fn parse_or(&mut self) -> Result<Expr, ParseExprError> {
        let mut left = self.parse_and()?;

        while self.check(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseExprError> {
        let mut left = self.parse_equality()?;

        while self.check(&Token::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseExprError> {
        let mut left = self.parse_comparison()?;

        loop {
            let op = match self.peek() {
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                _ => break,
            };

            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseExprError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => break,
            };

            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseExprError> {
        if self.check(&Token::Not) {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(expr)));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseExprError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(&Token::Dot) {
                self.advance();
                expr = match self.advance().clone() {
                    Token::Star => Expr::Filter {
                        object: Box::new(expr),
                    },
                    token => {
                        let property = property_name(&token)
                            .ok_or_else(|| self.error("expected property name after '.'"))?;
                        Expr::Member {
                            object: Box::new(expr),
                            property,
                        }
                    }
                };
            } else if self.check(&Token::LBracket) {
                self.advance();
                if self.check(&Token::Star) {
                    self.advance();
                    self.expect(&Token::RBracket, "expected ']'")?;
                    expr = Expr::Filter {
                        object: Box::new(expr),
                    };
                } else {
                    let index = self.parse_or()?;
                    self.expect(&Token::RBracket, "expected ']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseExprError> {
        match self.peek().clone() {
            Token::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::String(s))
            }
            Token::Identifier(name) => {
                self.advance();
                if self.check(&Token::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr::FunctionCall { name, args })
                } else {
                    Ok(Expr::Identifier(name))
                }
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_or()?;
                self.expect(&Token::RParen, "expected ')'")?;
                Ok(expr)
            }
            token => Err(self.error(&format!("unexpected token: {}", token))),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseExprError> {
        self.expect(&Token::LParen, "expected '('")?;

        let mut args = Vec::new();

        if !self.check(&Token::RParen) {
            args.push(self.parse_or()?);

            while self.check(&Token::Comma) {
                self.advance();
                args.push(self.parse_or()?);
            }
        }

        self.expect(&Token::RParen, "expected ')'")?;
        Ok(args)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> &Token {
        let token = self.tokens.get(self.position).unwrap_or(&Token::Eof);
        self.position += 1;
        token
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn expect(&mut self, token: &Token, msg: &str) -> Result<(), ParseExprError> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(msg))
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn error(&self, message: &str) -> ParseExprError {
        ParseExprError {
            message: message.to_string(),
            position: self.position,
        }
    }
}

/// Keywords are valid property names after a dot (`inputs.true` is legal)
fn property_name(token: &Token) -> Option<String> {
    match token {
        Token::Identifier(s) => Some(s.clone()),
        Token::Null | Token::True | Token::False => Some(token.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Identifier(name.to_string()))
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(ExprParser::parse_str("null").unwrap(), Expr::Null);
        assert_eq!(ExprParser::parse_str("true").unwrap(), Expr::Bool(true));
        assert_eq!(ExprParser::parse_str("42").unwrap(), Expr::Number(42.0));
        assert_eq!(
            ExprParser::parse_str("'hello'").unwrap(),
            Expr::String("hello".to_string())
        );
    }

    #[test]
    fn test_parse_member_chain() {
        let expr = ExprParser::parse_str("steps.build.outputs").unwrap();
        assert_eq!(
            expr,
            Expr::Member {
                object: Box::new(Expr::Member {
                    object: ident("steps"),
                    property: "build".to_string(),
                }),
                property: "outputs".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_index_access() {
        let expr = ExprParser::parse_str("matrix['os']").unwrap();
        assert_eq!(
            expr,
            Expr::Index {
                object: ident("matrix"),
                index: Box::new(Expr::String("os".to_string())),
            }
        );
    }

    #[test]
    fn test_parse_filter() {
        let dotted = ExprParser::parse_str("github.event.commits.*.message").unwrap();
        let bracketed = ExprParser::parse_str("github.event.commits[*].message").unwrap();
        assert_eq!(dotted, bracketed);
        assert!(matches!(dotted, Expr::Member { ref object, .. } if matches!(**object, Expr::Filter { .. })));
    }

    #[test]
    fn test_parse_function_call() {
        let expr = ExprParser::parse_str("contains(github.ref, 'main')").unwrap();
        match expr {
            Expr::FunctionCall { name, args } => {
                assert_eq!(name, "contains");
                assert_eq!(args.len(), 2);
            }
            _ => panic!("expected function call"),
        }

        let expr = ExprParser::parse_str("success()").unwrap();
        assert_eq!(
            expr,
            Expr::FunctionCall {
                name: "success".to_string(),
                args: vec![]
            }
        );
    }

    #[test]
    fn test_parse_operator_precedence() {
        // a || b && c == d parses as a || (b && (c == d))
        let expr = ExprParser::parse_str("a || b && c == d").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Or,
                right,
                ..
            } => match *right {
                Expr::Binary {
                    op: BinaryOp::And,
                    right,
                    ..
                } => assert!(matches!(*right, Expr::Binary { op: BinaryOp::Eq, .. })),
                other => panic!("expected &&, got {:?}", other),
            },
            other => panic!("expected ||, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_not_and_parentheses() {
        let expr = ExprParser::parse_str("!(a == b)").unwrap();
        assert!(matches!(expr, Expr::Not(inner) if matches!(*inner, Expr::Binary { op: BinaryOp::Eq, .. })));
    }

    #[test]
    fn test_parse_keyword_property() {
        let expr = ExprParser::parse_str("inputs.true").unwrap();
        assert_eq!(
            expr,
            Expr::Member {
                object: ident("inputs"),
                property: "true".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(ExprParser::parse_str("").is_err());
        assert!(ExprParser::parse_str("a b").is_err());
        assert!(ExprParser::parse_str("foo(").is_err());
        assert!(ExprParser::parse_str("a.").is_err());
        assert!(ExprParser::parse_str("(a").is_err());
    }
}
