//! XP curve evaluation and level derivation.
//!
//! The curve is configured as an arithmetic formula over `level` giving the total XP a
//! player needs to reach that level. It is parsed into a small [`Expr`] tree and evaluated
//! directly; there is no general-purpose interpreter behind it. Supported syntax:
//! numbers, `level`, `+ - * / %`, `^` or `**` (right associative), parentheses, and the
//! functions `floor`, `ceil`, `round`, `sqrt`, `abs`, `min`, `max`, `pow`, `int` (truncates
//! toward zero) and `float` (identity).

use thiserror::Error;
use tracing::warn;

/// Total XP for a level when no usable formula is configured.
pub const LINEAR_XP_PER_LEVEL: u64 = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurveError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unknown name '{0}'")]
    UnknownName(String),
    #[error("{func} takes {expected} argument(s), got {got}")]
    Arity { func: &'static str, expected: usize, got: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("formula produced {0} at level {1}, not a usable XP total")]
    Unusable(f64, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Floor,
    Ceil,
    Round,
    Sqrt,
    Abs,
    Min,
    Max,
    Pow,
    Int,
    Float,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "round" => Func::Round,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            "min" => Func::Min,
            "max" => Func::Max,
            "pow" => Func::Pow,
            "int" => Func::Int,
            "float" => Func::Float,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Func::Floor => "floor",
            Func::Ceil => "ceil",
            Func::Round => "round",
            Func::Sqrt => "sqrt",
            Func::Abs => "abs",
            Func::Min => "min",
            Func::Max => "max",
            Func::Pow => "pow",
            Func::Int => "int",
            Func::Float => "float",
        }
    }

    fn arity(self) -> usize {
        match self {
            Func::Min | Func::Max | Func::Pow => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Level,
    Neg(Box<Expr>),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { func: Func, args: Vec<Expr> },
}

impl Expr {
    pub fn parse(input: &str) -> Result<Expr, CurveError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;
        match parser.peek() {
            None => Ok(expr),
            Some(tok) => Err(CurveError::UnexpectedToken(tok.to_string())),
        }
    }

    pub fn eval(&self, level: f64) -> Result<f64, CurveError> {
        Ok(match self {
            Expr::Number(n) => *n,
            Expr::Level => level,
            Expr::Neg(inner) => -inner.eval(level)?,
            Expr::Binary { op, lhs, rhs } => {
                let a = lhs.eval(level)?;
                let b = rhs.eval(level)?;
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div if b == 0.0 => return Err(CurveError::DivisionByZero),
                    BinOp::Div => a / b,
                    BinOp::Rem if b == 0.0 => return Err(CurveError::DivisionByZero),
                    BinOp::Rem => a % b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call { func, args } => {
                let values = args
                    .iter()
                    .map(|a| a.eval(level))
                    .collect::<Result<Vec<_>, _>>()?;
                match (func, values.as_slice()) {
                    (Func::Floor, [x]) => x.floor(),
                    (Func::Ceil, [x]) => x.ceil(),
                    (Func::Round, [x]) => x.round(),
                    (Func::Sqrt, [x]) => x.sqrt(),
                    (Func::Abs, [x]) => x.abs(),
                    (Func::Min, [x, y]) => x.min(*y),
                    (Func::Max, [x, y]) => x.max(*y),
                    (Func::Pow, [x, y]) => x.powf(*y),
                    (Func::Int, [x]) => x.trunc(),
                    (Func::Float, [x]) => *x,
                    (f, v) => {
                        return Err(CurveError::Arity { func: f.name(), expected: f.arity(), got: v.len() });
                    }
                }
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    Pow,
    LParen,
    RParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{n}"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Op(c) => write!(f, "{c}"),
            Token::Pow => write!(f, "**"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CurveError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| CurveError::UnexpectedToken(text.clone()))?;
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
                tokens.push(Token::Pow);
                i += 2;
            }
            '^' => {
                tokens.push(Token::Pow);
                i += 1;
            }
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Op(c));
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
            other => return Err(CurveError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, want: Token) -> Result<(), CurveError> {
        match self.next() {
            Some(tok) if tok == want => Ok(()),
            Some(tok) => Err(CurveError::UnexpectedToken(tok.to_string())),
            None => Err(CurveError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> Result<Expr, CurveError> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(c @ ('+' | '-'))) = self.peek() {
            let op = if *c == '+' { BinOp::Add } else { BinOp::Sub };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, CurveError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(c @ ('*' | '/' | '%'))) = self.peek() {
            let op = match *c {
                '*' => BinOp::Mul,
                '/' => BinOp::Div,
                _ => BinOp::Rem,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, CurveError> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, CurveError> {
        let base = self.atom()?;
        if let Some(Token::Pow) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary { op: BinOp::Pow, lhs: Box::new(base), rhs: Box::new(exponent) });
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, CurveError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if name == "level" => Ok(Expr::Level),
            Some(Token::Ident(name)) => {
                let func = Func::from_name(&name).ok_or(CurveError::UnknownName(name))?;
                self.expect(Token::LParen)?;
                let mut args = vec![self.expr()?];
                while let Some(Token::Comma) = self.peek() {
                    self.pos += 1;
                    args.push(self.expr()?);
                }
                self.expect(Token::RParen)?;
                if args.len() != func.arity() {
                    return Err(CurveError::Arity { func: func.name(), expected: func.arity(), got: args.len() });
                }
                Ok(Expr::Call { func, args })
            }
            Some(tok) => Err(CurveError::UnexpectedToken(tok.to_string())),
            None => Err(CurveError::UnexpectedEnd),
        }
    }
}

fn linear_xp(level: u32) -> u64 {
    u64::from(level) * LINEAR_XP_PER_LEVEL
}

/// The configured XP curve, bounded by the level cap.
#[derive(Debug, Clone)]
pub struct XpCurve {
    expr: Option<Expr>,
    level_cap: u32,
}

impl XpCurve {
    /// Parses `formula` and checks it at every level up to the cap. Any failure is logged
    /// and the whole curve becomes linear, so levels stay consistent with each other.
    pub fn new(formula: &str, level_cap: u32) -> Self {
        let level_cap = level_cap.max(1);
        match Self::checked(formula, level_cap) {
            Ok(expr) => Self { expr: Some(expr), level_cap },
            Err(e) => {
                warn!(target: "quest.config", formula, error = %e, "xp curve unusable, falling back to linear");
                Self::linear(level_cap)
            }
        }
    }

    pub fn linear(level_cap: u32) -> Self {
        Self { expr: None, level_cap: level_cap.max(1) }
    }

    fn checked(formula: &str, level_cap: u32) -> Result<Expr, CurveError> {
        let expr = Expr::parse(formula)?;
        for level in 1..=level_cap {
            eval_total(&expr, level)?;
        }
        Ok(expr)
    }

    pub fn is_linear(&self) -> bool {
        self.expr.is_none()
    }

    pub fn level_cap(&self) -> u32 {
        self.level_cap
    }

    /// Total XP needed to reach `level`.
    pub fn xp_for_level(&self, level: u32) -> u64 {
        match &self.expr {
            Some(expr) => eval_total(expr, level).unwrap_or_else(|_| linear_xp(level)),
            None => linear_xp(level),
        }
    }

    /// Lowest XP a player at `level` may hold. Level 1 starts from zero.
    pub fn level_floor(&self, level: u32) -> u64 {
        if level <= 1 { 0 } else { self.xp_for_level(level) }
    }

    /// Level for a given total XP. Monotonic in `xp` and never above the cap.
    pub fn level_for_xp(&self, xp: u64) -> u32 {
        let mut level = 1;
        while level < self.level_cap && xp >= self.xp_for_level(level + 1) {
            level += 1;
        }
        level
    }

    /// XP still needed from `xp` to reach the next level, or `None` at the cap.
    pub fn xp_to_next(&self, level: u32, xp: u64) -> Option<u64> {
        if level >= self.level_cap {
            return None;
        }
        Some(self.xp_for_level(level + 1).saturating_sub(xp))
    }
}

fn eval_total(expr: &Expr, level: u32) -> Result<u64, CurveError> {
    let value = expr.eval(f64::from(level))?;
    if !value.is_finite() || value < 0.0 || value > u64::MAX as f64 {
        return Err(CurveError::Unusable(value, level));
    }
    Ok(value.floor() as u64)
}

/// Outcome of granting XP to a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUpResult {
    pub xp_gained: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub did_level_up: bool,
    /// True only on the grant that moved the player onto the cap.
    pub reached_cap: bool,
    pub max_energy_raised_to: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_precedence_and_power() {
        let expr = Expr::parse("100 + 2 * level ^ 2").unwrap();
        assert_eq!(expr.eval(3.0).unwrap(), 118.0);
        let expr = Expr::parse("-2 ** 2").unwrap();
        assert_eq!(expr.eval(0.0).unwrap(), -4.0);
        let expr = Expr::parse("2 ** 3 ** 2").unwrap();
        assert_eq!(expr.eval(0.0).unwrap(), 512.0);
    }

    #[test]
    fn functions_check_arity() {
        assert_eq!(Expr::parse("max(level, 3)").unwrap().eval(1.0).unwrap(), 3.0);
        assert!(matches!(Expr::parse("floor(1, 2)"), Err(CurveError::Arity { .. })));
    }

    #[test]
    fn int_truncates_inside_a_curve() {
        let expr = Expr::parse("int(level**1.5*100)").unwrap();
        assert_eq!(expr.eval(2.0).unwrap(), 282.0);
        assert_eq!(Expr::parse("int(-2.7)").unwrap().eval(0.0).unwrap(), -2.0);
        assert_eq!(Expr::parse("float(level) / 2").unwrap().eval(3.0).unwrap(), 1.5);

        let curve = XpCurve::new("int(level**1.5*100)", 20);
        assert!(!curve.is_linear());
        assert_eq!(curve.xp_for_level(2), 282);
    }

    #[test]
    fn rejects_names_outside_the_grammar() {
        assert_eq!(
            Expr::parse("__import__(os)"),
            Err(CurveError::UnknownName("__import__".to_string()))
        );
        assert!(matches!(Expr::parse("level; 1"), Err(CurveError::UnexpectedChar(';', _))));
        assert_eq!(Expr::parse("(level * 2"), Err(CurveError::UnexpectedEnd));
    }

    #[test]
    fn division_by_zero_makes_curve_linear() {
        let curve = XpCurve::new("100 / (level - 3)", 20);
        assert!(curve.is_linear());
        assert_eq!(curve.xp_for_level(4), 400);
    }

    #[test]
    fn default_formula_matches_linear() {
        let curve = XpCurve::new("level * 100", 20);
        assert!(!curve.is_linear());
        assert_eq!(curve.level_for_xp(0), 1);
        assert_eq!(curve.level_for_xp(199), 1);
        assert_eq!(curve.level_for_xp(200), 2);
        assert_eq!(curve.level_for_xp(1_000_000), 20);
        assert_eq!(curve.level_floor(1), 0);
        assert_eq!(curve.level_floor(5), 500);
    }
}
