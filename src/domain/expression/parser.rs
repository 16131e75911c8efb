//! Recursive-descent parser
//!
//! Precedence, loosest first:
//!
//! ```text
//! ternary     := or_expr ("if" or_expr "else" ternary)?
//! or_expr     := and_expr ("or" and_expr)*
//! and_expr    := comparison ("and" comparison)*
//! comparison  := additive (("<" | "<=" | ">" | ">=" | "==" | "!=") additive)*
//! additive    := term (("+" | "-") term)*
//! term        := power (("*" | "/" | "%") power)*
//! power       := unary ("**" power)?
//! unary       := ("-" | "+" | "not") unary | atom
//! atom        := number | string | bool | ident | ident "(" args ")" | "(" ternary ")"
//! ```

use super::ast::{BinaryOp, CompareOp, Expr, UnaryOp};
use super::error::ExpressionError;
use super::lexer::{tokenize, Spanned, Token};

/// Deepest expression tree the parser accepts
pub const MAX_NESTING_DEPTH: usize = 64;

/// Parse a complete expression; trailing tokens are a syntax error
pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(source)?;

    if tokens.is_empty() {
        return Err(ExpressionError::syntax(source, 0, "empty expression"));
    }

    let mut parser = Parser {
        source,
        tokens,
        cursor: 0,
        depth: 0,
    };

    let expr = parser.ternary()?;

    if let Some(extra) = parser.peek() {
        return Err(ExpressionError::syntax(
            source,
            extra.position,
            format!("unexpected token '{}'", extra.token.describe()),
        ));
    }

    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
    cursor: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.cursor)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek_token() == Some(expected) {
            self.cursor += 1;
            return true;
        }
        false
    }

    fn end_position(&self) -> usize {
        self.source.chars().count()
    }

    fn error_here(&self, message: impl Into<String>) -> ExpressionError {
        let position = self
            .peek()
            .map(|s| s.position)
            .unwrap_or_else(|| self.end_position());
        ExpressionError::syntax(self.source, position, message)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        if self.eat(&expected) {
            return Ok(());
        }

        let found = self
            .peek_token()
            .map(|t| format!("'{}'", t.describe()))
            .unwrap_or_else(|| "end of expression".to_string());

        Err(self.error_here(format!("expected '{}', found {}", expected.describe(), found)))
    }

    /// Every level of the tree costs one unit of depth while it is parsed
    fn descend(&mut self) -> Result<(), ExpressionError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error_here(format!(
                "expression nested too deeply (limit {})",
                MAX_NESTING_DEPTH
            )));
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    fn ternary(&mut self) -> Result<Expr, ExpressionError> {
        self.descend()?;
        let result = self.conditional();
        self.ascend(1);
        result
    }

    fn conditional(&mut self) -> Result<Expr, ExpressionError> {
        let then_branch = self.or_expr()?;

        if !self.eat(&Token::If) {
            return Ok(then_branch);
        }

        let condition = self.or_expr()?;
        self.expect(Token::Else)?;
        let else_branch = self.ternary()?;

        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn or_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and_expr()?;
        let mut folds = 0;

        while self.eat(&Token::Or) {
            self.descend()?;
            folds += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }

        self.ascend(folds);
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.comparison()?;
        let mut folds = 0;

        while self.eat(&Token::And) {
            self.descend()?;
            folds += 1;
            let right = self.comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }

        self.ascend(folds);
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let first = self.additive()?;
        let mut rest = Vec::new();

        loop {
            let op = match self.peek_token() {
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                Some(Token::EqEq) => CompareOp::Eq,
                Some(Token::NotEq) => CompareOp::Ne,
                _ => break,
            };
            self.cursor += 1;
            rest.push((op, self.additive()?));
        }

        if rest.is_empty() {
            return Ok(first);
        }

        Ok(Expr::Compare {
            first: Box::new(first),
            rest,
        })
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.term()?;
        let mut folds = 0;

        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.cursor += 1;
            self.descend()?;
            folds += 1;
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        self.ascend(folds);
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.power()?;
        let mut folds = 0;

        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.cursor += 1;
            self.descend()?;
            folds += 1;
            let right = self.power()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        self.ascend(folds);
        Ok(left)
    }

    fn power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.unary()?;

        if self.eat(&Token::StarStar) {
            self.descend()?;
            let exponent = self.power()?;
            self.ascend(1);
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }

        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek_token() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Not) => Some(UnaryOp::Not),
            Some(Token::Plus) => {
                self.cursor += 1;
                self.descend()?;
                let operand = self.unary()?;
                self.ascend(1);
                return Ok(operand);
            }
            _ => None,
        };

        match op {
            Some(op) => {
                self.cursor += 1;
                self.descend()?;
                let operand = self.unary()?;
                self.ascend(1);
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<Expr, ExpressionError> {
        let Some(spanned) = self.advance() else {
            return Err(self.error_here("unexpected end of expression"));
        };

        match spanned.token {
            Token::Int(v) => Ok(Expr::Int(v)),
            Token::Float(v) => Ok(Expr::Float(v)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments()?;
                    return Ok(Expr::Call {
                        function: name,
                        args,
                    });
                }
                Ok(Expr::Ident(name))
            }
            Token::LParen => {
                let inner = self.ternary()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(ExpressionError::syntax(
                self.source,
                spanned.position,
                format!("unexpected token '{}'", other.describe()),
            )),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();

        if self.eat(&Token::RParen) {
            return Ok(args);
        }

        loop {
            args.push(self.ternary()?);

            if self.eat(&Token::Comma) {
                continue;
            }

            self.expect(Token::RParen)?;
            return Ok(args);
        }
    }
}
