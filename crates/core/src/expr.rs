//! Boolean logic expressions over named input signals.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! or   := xor (("|" | "OR") xor)*
//! xor  := and (("^" | "XOR") and)*
//! and  := not (("&" | "AND") not)*
//! not  := ("!" | "~" | "NOT") not | atom
//! atom := ident | "0" | "1" | "(" or ")"
//! ```

use crate::error::SpecError;
use regex::Regex;

/// A parsed Boolean expression. Variables are indices into the input list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicExpr {
    /// Constant value
    Const(bool),
    /// Input signal by position
    Var(usize),
    /// Negation
    Not(Box<LogicExpr>),
    /// Conjunction
    And(Box<LogicExpr>, Box<LogicExpr>),
    /// Disjunction
    Or(Box<LogicExpr>, Box<LogicExpr>),
    /// Exclusive or
    Xor(Box<LogicExpr>, Box<LogicExpr>),
}

impl LogicExpr {
    /// Parse `source` against the ordered list of input names.
    pub fn parse(source: &str, inputs: &[String]) -> Result<Self, SpecError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0, inputs };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.tokens.get(parser.pos) {
            return Err(SpecError::Expression(format!("unexpected token '{}'", tok.text())));
        }
        Ok(expr)
    }

    /// Evaluate for one input combination.
    pub fn eval(&self, values: &[bool]) -> bool {
        match self {
            LogicExpr::Const(b) => *b,
            LogicExpr::Var(i) => values.get(*i).copied().unwrap_or(false),
            LogicExpr::Not(e) => !e.eval(values),
            LogicExpr::And(a, b) => a.eval(values) && b.eval(values),
            LogicExpr::Or(a, b) => a.eval(values) || b.eval(values),
            LogicExpr::Xor(a, b) => a.eval(values) ^ b.eval(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Const(bool),
    Not,
    And,
    Or,
    Xor,
    LParen,
    RParen,
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::Const(b) => if *b { "1" } else { "0" }.to_string(),
            Token::Not => "!".to_string(),
            Token::And => "&".to_string(),
            Token::Or => "|".to_string(),
            Token::Xor => "^".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, SpecError> {
    let re = Regex::new(r"^\s*(?:([A-Za-z_][A-Za-z0-9_\-]*)|([01])|([!~&|^()]))")
        .map_err(|e| SpecError::Expression(e.to_string()))?;

    let mut tokens = Vec::new();
    let mut rest = source;
    while !rest.trim().is_empty() {
        let caps = re.captures(rest).ok_or_else(|| {
            SpecError::Expression(format!("cannot parse near '{}'", rest.trim()))
        })?;
        let whole = caps.get(0).map(|m| m.end()).unwrap_or(rest.len());

        let token = if let Some(word) = caps.get(1) {
            match word.as_str().to_ascii_uppercase().as_str() {
                "NOT" => Token::Not,
                "AND" => Token::And,
                "OR" => Token::Or,
                "XOR" => Token::Xor,
                _ => Token::Ident(word.as_str().to_string()),
            }
        } else if let Some(digit) = caps.get(2) {
            Token::Const(digit.as_str() == "1")
        } else {
            match caps.get(3).map(|m| m.as_str()) {
                Some("!") | Some("~") => Token::Not,
                Some("&") => Token::And,
                Some("|") => Token::Or,
                Some("^") => Token::Xor,
                Some("(") => Token::LParen,
                _ => Token::RParen,
            }
        };

        tokens.push(token);
        rest = &rest[whole..];
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    inputs: &'a [String],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<LogicExpr, SpecError> {
        let mut lhs = self.parse_xor()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_xor()?;
            lhs = LogicExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_xor(&mut self) -> Result<LogicExpr, SpecError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Xor) {
            let rhs = self.parse_and()?;
            lhs = LogicExpr::Xor(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<LogicExpr, SpecError> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = LogicExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<LogicExpr, SpecError> {
        if self.eat(&Token::Not) {
            let inner = self.parse_not()?;
            return Ok(LogicExpr::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<LogicExpr, SpecError> {
        let Some(token) = self.tokens.get(self.pos).cloned() else {
            return Err(SpecError::Expression("unexpected end of expression".to_string()));
        };
        self.pos += 1;

        match token {
            Token::Const(b) => Ok(LogicExpr::Const(b)),
            Token::Ident(name) => self
                .inputs
                .iter()
                .position(|i| *i == name)
                .map(LogicExpr::Var)
                .ok_or(SpecError::UnknownSignal(name)),
            Token::LParen => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(SpecError::Expression("missing ')'".to_string()));
                }
                Ok(inner)
            }
            other => Err(SpecError::Expression(format!("unexpected token '{}'", other.text()))),
        }
    }
}
