//! Arithmetic expression evaluator for the `calculate` tool.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '//' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := atom (('**' | '^') unary)?
//! atom    := number | name | name '(' args ')' | '(' expr ')'
//! ```

use std::f64::consts;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn invalid(message: impl std::fmt::Display) -> Error {
    Error::InvalidToolArguments(format!("Invalid expression: {}", message))
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent: 1e3, 2.5E-4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("bad number '{}'", text)))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op("**"));
                i += 2;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::Op("//"));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    '%' => "%",
                    _ => "^",
                }));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(invalid(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

/// Nesting allowed for parentheses, unary signs and exponent chains combined.
const MAX_DEPTH: usize = 200;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(invalid(format!("expected {:?}, found {:?}", expected, t))),
            None => Err(invalid(format!("expected {:?}, found end of input", expected))),
        }
    }

    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.term()?;
            value = if op == "+" { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "//", "%"]) {
            let rhs = self.unary()?;
            value = match op {
                "*" => value * rhs,
                _ if rhs == 0.0 => return Err(invalid("division by zero")),
                "/" => value / rhs,
                "//" => (value / rhs).floor(),
                // Sign follows the divisor.
                _ => value - rhs * (value / rhs).floor(),
            };
        }
        Ok(value)
    }

    // Every recursive path of the grammar passes through here.
    fn unary(&mut self) -> Result<f64> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(invalid("expression is nested too deeply"));
        }
        let value = match self.eat_op(&["+", "-"]) {
            Some("-") => self.unary().map(|v| -v),
            Some(_) => self.unary(),
            None => self.power(),
        };
        self.depth -= 1;
        value
    }

    fn power(&mut self) -> Result<f64> {
        let base = self.atom()?;
        if self.eat_op(&["**", "^"]).is_some() {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.args()?;
                    call(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(t) => Err(invalid(format!("unexpected {:?}", t))),
            None => Err(invalid("unexpected end of input")),
        }
    }

    fn args(&mut self) -> Result<Vec<f64>> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(invalid("expected ',' or ')' in argument list")),
            }
        }
    }
}

fn constant(name: &str) -> Result<f64> {
    match name {
        "pi" => Ok(consts::PI),
        "e" => Ok(consts::E),
        "tau" => Ok(consts::TAU),
        "inf" => Ok(f64::INFINITY),
        _ => Err(invalid(format!("unknown name '{}'", name))),
    }
}

fn arity(name: &str, args: &[f64], expected: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(invalid(format!(
            "{}() takes {} argument(s), got {}",
            name,
            expected,
            args.len()
        )))
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64> {
    let unary = |f: fn(f64) -> f64| -> Result<f64> {
        arity(name, args, 1)?;
        Ok(f(args[0]))
    };

    match name {
        "sqrt" => {
            arity(name, args, 1)?;
            if args[0] < 0.0 {
                return Err(invalid("math domain error"));
            }
            Ok(args[0].sqrt())
        }
        "abs" | "fabs" => unary(f64::abs),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "asin" => unary(f64::asin),
        "acos" => unary(f64::acos),
        "atan" => unary(f64::atan),
        "sinh" => unary(f64::sinh),
        "cosh" => unary(f64::cosh),
        "tanh" => unary(f64::tanh),
        "exp" => unary(f64::exp),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "trunc" => unary(f64::trunc),
        "degrees" => unary(f64::to_degrees),
        "radians" => unary(f64::to_radians),
        "log10" => unary(f64::log10),
        "log2" => unary(f64::log2),
        "log" => match args {
            [x] => Ok(x.ln()),
            [x, base] => Ok(x.log(*base)),
            _ => Err(invalid("log() takes 1 or 2 arguments")),
        },
        "atan2" => {
            arity(name, args, 2)?;
            Ok(args[0].atan2(args[1]))
        }
        "pow" => {
            arity(name, args, 2)?;
            Ok(args[0].powf(args[1]))
        }
        "hypot" => {
            arity(name, args, 2)?;
            Ok(args[0].hypot(args[1]))
        }
        "round" => match args {
            [x] => Ok(x.round()),
            [x, digits] => {
                let factor = 10f64.powi(*digits as i32);
                Ok((x * factor).round() / factor)
            }
            _ => Err(invalid("round() takes 1 or 2 arguments")),
        },
        "factorial" => {
            arity(name, args, 1)?;
            let n = args[0];
            if n < 0.0 || n.fract() != 0.0 || n > 170.0 {
                return Err(invalid("factorial() needs a non-negative integer up to 170"));
            }
            Ok((1..=n as u64).fold(1.0, |acc, k| acc * k as f64))
        }
        "min" | "max" | "sum" if args.is_empty() => {
            Err(invalid(format!("{}() needs at least one argument", name)))
        }
        "min" => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        "sum" => Ok(args.iter().sum()),
        _ => Err(invalid(format!("unknown function '{}'", name))),
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expression: &str) -> Result<f64> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(invalid("empty expression"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(t) = parser.peek() {
        return Err(invalid(format!("unexpected trailing {:?}", t)));
    }
    if value.is_nan() {
        return Err(invalid("math domain error"));
    }
    Ok(value)
}
