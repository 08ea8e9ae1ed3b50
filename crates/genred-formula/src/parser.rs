//! Parser for the operator-call formula syntax.
//!
//! ```text
//! formula  := sum
//! sum      := product (('+' | '-') product)*
//! product  := unary (('*' | '/') unary)*
//! unary    := '-' unary | primary
//! primary  := number | name | name '(' args ')' | '(' formula ('|' formula)? ')'
//! ```
//!
//! `Inf` and `NaN` are constants and cannot be used as alias names.
//!
//! Names resolve against an [`AliasTable`]. Operators with integer attributes
//! (`Pow(x, 2)`, `Elem(x, 0)`, `Extract(x, 0, 2)`, ...) take them as trailing
//! integer literals. `Grad(F, v, e)` expands to the vector-Jacobian product of
//! `F` with respect to the variable `v`.

use crate::error::{FormulaError, FormulaResult};
use crate::expr::Formula;
use crate::ops::{BinaryOp, TernaryOp, UnaryOp};
use crate::variable::AliasTable;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Pipe,
    LParen,
    RParen,
    Comma,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
    /// Integral literal without a fractional part or exponent
    integral: bool,
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    current: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            current: 0,
        }
    }

    fn tokenize(mut self) -> FormulaResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            while self.current < self.bytes.len() && self.bytes[self.current].is_ascii_whitespace()
            {
                self.current += 1;
            }
            let offset = self.current;
            if offset >= self.bytes.len() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    offset,
                    integral: false,
                });
                return Ok(tokens);
            }

            let ch = self.bytes[offset];
            let kind = match ch {
                b'+' => TokenKind::Plus,
                b'-' => TokenKind::Minus,
                b'*' => TokenKind::Star,
                b'/' => TokenKind::Slash,
                b'|' => TokenKind::Pipe,
                b'(' => TokenKind::LParen,
                b')' => TokenKind::RParen,
                b',' => TokenKind::Comma,
                c if c.is_ascii_digit() || c == b'.' => {
                    let (value, integral) = self.number()?;
                    tokens.push(Token {
                        kind: TokenKind::Number(value),
                        offset,
                        integral,
                    });
                    continue;
                }
                c if c.is_ascii_alphabetic() || c == b'_' => {
                    let start = self.current;
                    while self.current < self.bytes.len()
                        && (self.bytes[self.current].is_ascii_alphanumeric()
                            || self.bytes[self.current] == b'_')
                    {
                        self.current += 1;
                    }
                    tokens.push(Token {
                        kind: TokenKind::Ident(self.source[start..self.current].to_string()),
                        offset,
                        integral: false,
                    });
                    continue;
                }
                _ => {
                    return Err(FormulaError::syntax(
                        format!("unexpected character '{}'", ch as char),
                        offset,
                    ))
                }
            };
            self.current += 1;
            tokens.push(Token {
                kind,
                offset,
                integral: false,
            });
        }
    }

    fn number(&mut self) -> FormulaResult<(f64, bool)> {
        let start = self.current;
        let mut integral = true;
        while self.current < self.bytes.len() && self.bytes[self.current].is_ascii_digit() {
            self.current += 1;
        }
        if self.current < self.bytes.len() && self.bytes[self.current] == b'.' {
            integral = false;
            self.current += 1;
            while self.current < self.bytes.len() && self.bytes[self.current].is_ascii_digit() {
                self.current += 1;
            }
        }
        if self.current < self.bytes.len()
            && (self.bytes[self.current] == b'e' || self.bytes[self.current] == b'E')
        {
            integral = false;
            self.current += 1;
            if self.current < self.bytes.len()
                && (self.bytes[self.current] == b'+' || self.bytes[self.current] == b'-')
            {
                self.current += 1;
            }
            while self.current < self.bytes.len() && self.bytes[self.current].is_ascii_digit() {
                self.current += 1;
            }
        }
        let text = &self.source[start..self.current];
        text.parse::<f64>()
            .map(|v| (v, integral))
            .map_err(|_| FormulaError::syntax(format!("invalid number '{}'", text), start))
    }
}

/// Parse `text` against the declared aliases.
pub fn parse(text: &str, aliases: &AliasTable) -> FormulaResult<Formula> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        current: 0,
        aliases,
    };
    let formula = parser.formula()?;
    let tok = parser.peek();
    if tok.kind != TokenKind::Eof {
        return Err(FormulaError::syntax(
            format!("unexpected trailing input {:?}", tok.kind),
            tok.offset,
        ));
    }
    Ok(formula)
}

/// Parse formula text together with alias declarations.
pub fn parse_with_aliases<S: AsRef<str>>(text: &str, aliases: &[S]) -> FormulaResult<Formula> {
    let table = AliasTable::parse(aliases)?;
    parse(text, &table)
}

/// Call argument: either a sub-formula or a bare integer literal.
enum Arg {
    Formula(Formula),
    Int(i64, usize),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    aliases: &'a AliasTable,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> FormulaResult<()> {
        let tok = self.advance();
        if tok.kind == kind {
            Ok(())
        } else {
            Err(FormulaError::syntax(
                format!("expected {}, found {:?}", what, tok.kind),
                tok.offset,
            ))
        }
    }

    fn formula(&mut self) -> FormulaResult<Formula> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.product()?;
            lhs = Formula::binary(op, lhs, rhs)?;
        }
    }

    fn product(&mut self) -> FormulaResult<Formula> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Formula::binary(op, lhs, rhs)?;
        }
    }

    fn unary(&mut self) -> FormulaResult<Formula> {
        if self.peek().kind == TokenKind::Minus {
            self.advance();
            // Negative literals stay constants.
            if let Some(v) = self.literal() {
                self.advance();
                return Ok(Formula::constant(-v));
            }
            let arg = self.unary()?;
            return Formula::neg(arg);
        }
        self.primary()
    }

    /// The value of the next token when it is a numeric literal or a
    /// constant keyword.
    fn literal(&self) -> Option<f64> {
        let next = self.tokens.get(self.current + 1).map(|t| &t.kind);
        match &self.peek().kind {
            TokenKind::Number(v) => Some(*v),
            TokenKind::Ident(name) if next != Some(&TokenKind::LParen) => keyword_constant(name),
            _ => None,
        }
    }

    fn primary(&mut self) -> FormulaResult<Formula> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Number(v) => Ok(Formula::constant(v)),
            TokenKind::LParen => {
                let inner = self.formula()?;
                if self.peek().kind == TokenKind::Pipe {
                    self.advance();
                    let rhs = self.formula()?;
                    self.expect(TokenKind::RParen, "')'")?;
                    return Formula::scalprod(inner, rhs);
                }
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if self.peek().kind == TokenKind::LParen {
                    self.advance();
                    let args = self.call_args()?;
                    self.call(&name, args, tok.offset)
                } else if let Some(v) = keyword_constant(&name) {
                    Ok(Formula::constant(v))
                } else {
                    self.aliases
                        .get(&name)
                        .cloned()
                        .map(Formula::var)
                        .ok_or(FormulaError::UnknownVariable { name })
                }
            }
            other => Err(FormulaError::syntax(
                format!("unexpected {:?}", other),
                tok.offset,
            )),
        }
    }

    fn call_args(&mut self) -> FormulaResult<Vec<Arg>> {
        let mut args = Vec::new();
        if self.peek().kind == TokenKind::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            let tok = self.peek().clone();
            let next = self.tokens.get(self.current + 1).map(|t| t.kind.clone());
            let terminates = matches!(next, Some(TokenKind::Comma) | Some(TokenKind::RParen));
            match tok.kind {
                TokenKind::Number(v) if tok.integral && terminates => {
                    self.advance();
                    args.push(Arg::Int(v as i64, tok.offset));
                }
                TokenKind::Minus
                    if matches!(next, Some(TokenKind::Number(_)))
                        && self.tokens[self.current + 1].integral
                        && matches!(
                            self.tokens.get(self.current + 2).map(|t| &t.kind),
                            Some(TokenKind::Comma) | Some(TokenKind::RParen)
                        ) =>
                {
                    self.advance();
                    let num = self.advance();
                    if let TokenKind::Number(v) = num.kind {
                        args.push(Arg::Int(-(v as i64), tok.offset));
                    }
                }
                _ => args.push(Arg::Formula(self.formula()?)),
            }
            let sep = self.advance();
            match sep.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => return Ok(args),
                other => {
                    return Err(FormulaError::syntax(
                        format!("expected ',' or ')', found {:?}", other),
                        sep.offset,
                    ))
                }
            }
        }
    }

    fn call(&self, name: &str, args: Vec<Arg>, offset: usize) -> FormulaResult<Formula> {
        if let Some(op) = UnaryOp::from_name(name) {
            let [a] = take_formulas::<1>(name, args)?;
            return Formula::unary(op, a);
        }
        if let Some(op) = BinaryOp::from_name(name) {
            let [a, b] = take_formulas::<2>(name, args)?;
            return Formula::binary(op, a, b);
        }
        if let Some(op) = TernaryOp::from_name(name) {
            let [a, b, c] = take_formulas::<3>(name, args)?;
            return Formula::ternary(op, a, b, c);
        }

        match name {
            "IntCst" => {
                let [n] = take_ints::<1>(name, args, 0)?;
                Ok(Formula::int_cst(n))
            }
            "Zero" => {
                let [d] = take_ints::<1>(name, args, 0)?;
                match to_usize(name, d, 0)? {
                    0 => Err(FormulaError::invalid_dimension(name, "dimension must be positive")),
                    d => Ok(Formula::zero(d)),
                }
            }
            "Pow" => {
                let (a, [n]) = take_formula_ints::<1>(name, args)?;
                let n = i32::try_from(n).map_err(|_| FormulaError::ExpectedInteger {
                    name: name.to_string(),
                    arg_index: 1,
                })?;
                Formula::unary(UnaryOp::Pow(n), a)
            }
            "Elem" => {
                let (a, [k]) = take_formula_ints::<1>(name, args)?;
                let start = to_usize(name, k, 1)?;
                Formula::unary(UnaryOp::Extract { start, len: 1 }, a)
            }
            "Extract" => {
                let (a, [s, l]) = take_formula_ints::<2>(name, args)?;
                let op = UnaryOp::Extract {
                    start: to_usize(name, s, 1)?,
                    len: to_usize(name, l, 2)?,
                };
                Formula::unary(op, a)
            }
            "ExtractT" => {
                let (a, [s, d]) = take_formula_ints::<2>(name, args)?;
                let op = UnaryOp::ExtractT {
                    start: to_usize(name, s, 1)?,
                    dim: to_usize(name, d, 2)?,
                };
                Formula::unary(op, a)
            }
            "Broadcast" => {
                let (a, [d]) = take_formula_ints::<1>(name, args)?;
                Formula::unary(UnaryOp::Broadcast(to_usize(name, d, 1)?), a)
            }
            "Grad" => {
                let [f, v, e] = take_formulas::<3>(name, args)?;
                match v {
                    Formula::Var(var) => f.grad(&var, &e),
                    _ => Err(FormulaError::syntax(
                        "Grad expects a variable as its second argument",
                        offset,
                    )),
                }
            }
            _ => Err(FormulaError::UnknownOperator {
                name: name.to_string(),
            }),
        }
    }
}

/// Names that parse as constants instead of variables.
pub(crate) fn keyword_constant(name: &str) -> Option<f64> {
    match name {
        "Inf" => Some(f64::INFINITY),
        "NaN" => Some(f64::NAN),
        _ => None,
    }
}

fn to_usize(name: &str, value: i64, arg_index: usize) -> FormulaResult<usize> {
    usize::try_from(value).map_err(|_| FormulaError::ExpectedInteger {
        name: name.to_string(),
        arg_index,
    })
}

fn take_formulas<const K: usize>(name: &str, args: Vec<Arg>) -> FormulaResult<[Formula; K]> {
    if args.len() != K {
        return Err(FormulaError::ArityMismatch {
            name: name.to_string(),
            expected: K,
            actual: args.len(),
        });
    }
    let formulas: Vec<Formula> = args
        .into_iter()
        .map(|a| match a {
            Arg::Formula(f) => f,
            Arg::Int(n, _) => Formula::int_cst(n),
        })
        .collect();
    formulas
        .try_into()
        .map_err(|_| FormulaError::ArityMismatch {
            name: name.to_string(),
            expected: K,
            actual: 0,
        })
}

fn take_ints<const K: usize>(name: &str, args: Vec<Arg>, first_index: usize) -> FormulaResult<[i64; K]> {
    if args.len() != K {
        return Err(FormulaError::ArityMismatch {
            name: name.to_string(),
            expected: K,
            actual: args.len(),
        });
    }
    let mut out = [0i64; K];
    for (k, arg) in args.into_iter().enumerate() {
        match arg {
            Arg::Int(n, _) => out[k] = n,
            Arg::Formula(_) => {
                return Err(FormulaError::ExpectedInteger {
                    name: name.to_string(),
                    arg_index: first_index + k,
                })
            }
        }
    }
    Ok(out)
}

fn take_formula_ints<const K: usize>(
    name: &str,
    mut args: Vec<Arg>,
) -> FormulaResult<(Formula, [i64; K])> {
    if args.len() != K + 1 {
        return Err(FormulaError::ArityMismatch {
            name: name.to_string(),
            expected: K + 1,
            actual: args.len(),
        });
    }
    let rest = args.split_off(1);
    let head = match args.pop() {
        Some(Arg::Formula(f)) => f,
        Some(Arg::Int(n, _)) => Formula::int_cst(n),
        None => {
            return Err(FormulaError::ArityMismatch {
                name: name.to_string(),
                expected: K + 1,
                actual: 0,
            })
        }
    };
    Ok((head, take_ints::<K>(name, rest, 1)?))
}
