//! Sandboxed boolean expressions for edge and completion conditions.
//!
//! Expressions are parsed once into a small AST and evaluated against an
//! execution context. The grammar is intentionally closed:
//!
//! - Field access: dotted paths into the context (`visitor.age`)
//! - Comparisons: `==`, `===`, `!=`, `!==`, `>`, `>=`, `<`, `<=`
//! - Logical: `&&`, `||`, `!`, parentheses
//! - Literals: numbers, single or double quoted strings, `true`, `false`, `null`
//!
//! There are no function calls, assignments or member calls. A path whose
//! root key is absent is an evaluation error, which callers treat as false.

use serde_json::Value;
use waypoint_config::Operator;

use crate::condition::compare_values;
use crate::context::Context;
use crate::error::{EvalError, ExpressionError};

/// Deepest tree a condition may compile to. Parsing and evaluation both
/// recurse, so anything deeper is rejected as malformed.
const MAX_DEPTH: usize = 64;

/// A compiled boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
  source: String,
  root: Expr,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
  Literal(Value),
  Path(String),
  Not(Box<Expr>),
  And(Box<Expr>, Box<Expr>),
  Or(Box<Expr>, Box<Expr>),
  Compare(Box<Expr>, Operator, Box<Expr>),
}

impl Expression {
  /// Parse an expression string.
  pub fn parse(source: &str) -> Result<Self, ExpressionError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
      return Err(ExpressionError::Empty);
    }

    let mut parser = Parser {
      tokens: &tokens,
      pos: 0,
      depth: 0,
    };
    let root = parser.parse_or()?;
    if let Some((token, position)) = parser.peek() {
      return Err(ExpressionError::Parse {
        position: *position,
        message: format!("unexpected token {:?}", token),
      });
    }

    Ok(Self {
      source: source.to_string(),
      root,
    })
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  /// Evaluate to a boolean using truthiness of the final value.
  pub fn evaluate(&self, context: &Context) -> Result<bool, EvalError> {
    eval(&self.root, context).map(|v| truthy(&v))
  }
}

fn eval(expr: &Expr, context: &Context) -> Result<Value, EvalError> {
  match expr {
    Expr::Literal(v) => Ok(v.clone()),
    Expr::Path(path) => context
      .lookup(path)
      .cloned()
      .ok_or_else(|| EvalError::MissingKey(path.clone())),
    Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, context)?))),
    Expr::And(left, right) => {
      if !truthy(&eval(left, context)?) {
        return Ok(Value::Bool(false));
      }
      Ok(Value::Bool(truthy(&eval(right, context)?)))
    }
    Expr::Or(left, right) => {
      if truthy(&eval(left, context)?) {
        return Ok(Value::Bool(true));
      }
      Ok(Value::Bool(truthy(&eval(right, context)?)))
    }
    Expr::Compare(left, op, right) => {
      let l = eval(left, context)?;
      let r = eval(right, context)?;
      Ok(Value::Bool(compare_values(&l, *op, &r)))
    }
  }
}

pub(crate) fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
  Ident(String),
  Str(String),
  Num(f64),
  Bool(bool),
  Null,
  Op(Operator),
  And,
  Or,
  Not,
  LParen,
  RParen,
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
  let chars: Vec<char> = input.chars().collect();
  let mut tokens = Vec::new();
  let mut i = 0;

  let err = |position: usize, message: String| ExpressionError::Parse { position, message };

  while i < chars.len() {
    let c = chars[i];
    let start = i;
    match c {
      ' ' | '\t' | '\r' | '\n' => i += 1,
      '(' => {
        tokens.push((Token::LParen, start));
        i += 1;
      }
      ')' => {
        tokens.push((Token::RParen, start));
        i += 1;
      }
      '&' if chars.get(i + 1) == Some(&'&') => {
        tokens.push((Token::And, start));
        i += 2;
      }
      '|' if chars.get(i + 1) == Some(&'|') => {
        tokens.push((Token::Or, start));
        i += 2;
      }
      '=' | '!' | '<' | '>' => {
        // Longest match first: `===`, `!==`, then two-char, then one-char.
        let three: String = chars[i..chars.len().min(i + 3)].iter().collect();
        let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
        if let Some(op) = Operator::from_symbol(&three) {
          tokens.push((Token::Op(op), start));
          i += 3;
        } else if let Some(op) = Operator::from_symbol(&two) {
          tokens.push((Token::Op(op), start));
          i += 2;
        } else if c == '!' {
          tokens.push((Token::Not, start));
          i += 1;
        } else if let Some(op) = Operator::from_symbol(&c.to_string()) {
          tokens.push((Token::Op(op), start));
          i += 1;
        } else {
          return Err(err(start, format!("unexpected character '{}'", c)));
        }
      }
      '"' | '\'' => {
        let quote = c;
        i += 1;
        let mut literal = String::new();
        loop {
          match chars.get(i) {
            None => return Err(err(start, "unterminated string literal".to_string())),
            Some('\\') => {
              if let Some(next) = chars.get(i + 1) {
                literal.push(*next);
              }
              i += 2;
            }
            Some(ch) if *ch == quote => {
              i += 1;
              break;
            }
            Some(ch) => {
              literal.push(*ch);
              i += 1;
            }
          }
        }
        tokens.push((Token::Str(literal), start));
      }
      c if c.is_ascii_digit()
        || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
      {
        i += 1;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
          i += 1;
        }
        let text: String = chars[start..i].iter().collect();
        let num = text
          .parse::<f64>()
          .map_err(|_| err(start, format!("invalid number '{}'", text)))?;
        tokens.push((Token::Num(num), start));
      }
      c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
        while i < chars.len()
          && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '$' | '.'))
        {
          i += 1;
        }
        let ident: String = chars[start..i].iter().collect();
        if ident.ends_with('.') || ident.contains("..") {
          return Err(err(start, format!("invalid field path '{}'", ident)));
        }
        let token = match ident.as_str() {
          "true" => Token::Bool(true),
          "false" => Token::Bool(false),
          "null" => Token::Null,
          _ => Token::Ident(ident),
        };
        tokens.push((token, start));
      }
      other => return Err(err(start, format!("unexpected character '{}'", other))),
    }
  }

  Ok(tokens)
}

struct Parser<'a> {
  tokens: &'a [(Token, usize)],
  pos: usize,
  depth: usize,
}

impl Parser<'_> {
  fn peek(&self) -> Option<&(Token, usize)> {
    self.tokens.get(self.pos)
  }

  fn next(&mut self) -> Option<&(Token, usize)> {
    let token = self.tokens.get(self.pos);
    self.pos += 1;
    token
  }

  fn end_position(&self) -> usize {
    self.tokens.last().map(|(_, p)| p + 1).unwrap_or(0)
  }

  fn descend(&mut self) -> Result<(), ExpressionError> {
    self.depth += 1;
    if self.depth > MAX_DEPTH {
      let position = self
        .tokens
        .get(self.pos.saturating_sub(1))
        .map(|(_, p)| *p)
        .unwrap_or(0);
      return Err(ExpressionError::Parse {
        position,
        message: format!("expression nested deeper than {}", MAX_DEPTH),
      });
    }
    Ok(())
  }

  /// or := and ( "||" and )*
  fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
    let base = self.depth;
    let mut left = self.parse_and()?;
    while matches!(self.peek(), Some((Token::Or, _))) {
      self.pos += 1;
      // Chains build left-deep trees
      self.descend()?;
      let right = self.parse_and()?;
      left = Expr::Or(Box::new(left), Box::new(right));
    }
    self.depth = base;
    Ok(left)
  }

  /// and := not ( "&&" not )*
  fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
    let base = self.depth;
    let mut left = self.parse_not()?;
    while matches!(self.peek(), Some((Token::And, _))) {
      self.pos += 1;
      self.descend()?;
      let right = self.parse_not()?;
      left = Expr::And(Box::new(left), Box::new(right));
    }
    self.depth = base;
    Ok(left)
  }

  /// not := "!" not | comparison
  fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
    if matches!(self.peek(), Some((Token::Not, _))) {
      self.pos += 1;
      self.descend()?;
      let inner = self.parse_not()?;
      self.depth -= 1;
      return Ok(Expr::Not(Box::new(inner)));
    }
    self.parse_comparison()
  }

  /// comparison := primary ( op primary )?
  fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
    let left = self.parse_primary()?;
    if let Some((Token::Op(op), _)) = self.peek() {
      let op = *op;
      self.pos += 1;
      let right = self.parse_primary()?;
      return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
    }
    Ok(left)
  }

  /// primary := literal | path | "(" or ")"
  fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
    let end = self.end_position();
    let Some((token, position)) = self.next().cloned() else {
      return Err(ExpressionError::Parse {
        position: end,
        message: "unexpected end of expression".to_string(),
      });
    };

    match token {
      Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
      Token::Num(n) => Ok(Expr::Literal(
        serde_json::Number::from_f64(n)
          .map(Value::Number)
          .unwrap_or(Value::Null),
      )),
      Token::Bool(b) => Ok(Expr::Literal(Value::Bool(b))),
      Token::Null => Ok(Expr::Literal(Value::Null)),
      Token::Ident(path) => Ok(Expr::Path(path)),
      Token::LParen => {
        self.descend()?;
        let inner = self.parse_or()?;
        self.depth -= 1;
        match self.next() {
          Some((Token::RParen, _)) => Ok(inner),
          _ => Err(ExpressionError::Parse {
            position,
            message: "unclosed parenthesis".to_string(),
          }),
        }
      }
      other => Err(ExpressionError::Parse {
        position,
        message: format!("expected value, got {:?}", other),
      }),
    }
  }
}
