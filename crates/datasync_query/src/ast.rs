//! Expression tree for `$filter` and `$orderby`.

use chrono::{DateTime, Utc};

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// Decimal or floating literal.
    Real(f64),
    /// String literal.
    String(String),
    /// Date/time literal.
    Date(DateTime<Utc>),
}

/// Binary operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `or`
    Or,
    /// `and`
    And,
    /// `eq`
    Eq,
    /// `ne`
    Ne,
    /// `gt`
    Gt,
    /// `ge`
    Ge,
    /// `lt`
    Lt,
    /// `le`
    Le,
    /// `add`
    Add,
    /// `sub`
    Sub,
    /// `mul`
    Mul,
    /// `div`
    Div,
    /// `mod`
    Mod,
}

impl BinaryOp {
    pub(crate) fn comparison(word: &str) -> Option<Self> {
        Some(match word {
            "eq" => BinaryOp::Eq,
            "ne" => BinaryOp::Ne,
            "gt" => BinaryOp::Gt,
            "ge" => BinaryOp::Ge,
            "lt" => BinaryOp::Lt,
            "le" => BinaryOp::Le,
            _ => return None,
        })
    }

    pub(crate) fn additive(word: &str) -> Option<Self> {
        Some(match word {
            "add" => BinaryOp::Add,
            "sub" => BinaryOp::Sub,
            _ => return None,
        })
    }

    pub(crate) fn multiplicative(word: &str) -> Option<Self> {
        Some(match word {
            "mul" => BinaryOp::Mul,
            "div" => BinaryOp::Div,
            "mod" => BinaryOp::Mod,
            _ => return None,
        })
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `not`
    Not,
    /// `-`
    Negate,
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// `startswith(s, prefix)`
    StartsWith,
    /// `endswith(s, suffix)`
    EndsWith,
    /// `contains(s, needle)`
    Contains,
    /// `substringof(needle, s)`
    SubstringOf,
    /// `indexof(s, needle)`
    IndexOf,
    /// `length(s)`
    Length,
    /// `tolower(s)`
    ToLower,
    /// `toupper(s)`
    ToUpper,
    /// `trim(s)`
    Trim,
    /// `concat(a, b)`
    Concat,
    /// `substring(s, start[, length])`
    Substring,
    /// `year(d)`
    Year,
    /// `month(d)`
    Month,
    /// `day(d)`
    Day,
    /// `hour(d)`
    Hour,
    /// `minute(d)`
    Minute,
    /// `second(d)`
    Second,
    /// `round(n)`, ties to even
    Round,
    /// `floor(n)`
    Floor,
    /// `ceiling(n)`
    Ceiling,
    /// `cast(value, Edm.Type)`
    Cast,
}

impl Function {
    /// Looks up a function and its accepted argument counts.
    pub(crate) fn lookup(name: &str) -> Option<(Self, usize, usize)> {
        Some(match name.to_ascii_lowercase().as_str() {
            "startswith" => (Function::StartsWith, 2, 2),
            "endswith" => (Function::EndsWith, 2, 2),
            "contains" => (Function::Contains, 2, 2),
            "substringof" => (Function::SubstringOf, 2, 2),
            "indexof" => (Function::IndexOf, 2, 2),
            "length" => (Function::Length, 1, 1),
            "tolower" => (Function::ToLower, 1, 1),
            "toupper" => (Function::ToUpper, 1, 1),
            "trim" => (Function::Trim, 1, 1),
            "concat" => (Function::Concat, 2, 2),
            "substring" => (Function::Substring, 2, 3),
            "year" => (Function::Year, 1, 1),
            "month" => (Function::Month, 1, 1),
            "day" => (Function::Day, 1, 1),
            "hour" => (Function::Hour, 1, 1),
            "minute" => (Function::Minute, 1, 1),
            "second" => (Function::Second, 1, 1),
            "round" => (Function::Round, 1, 1),
            "floor" => (Function::Floor, 1, 1),
            "ceiling" => (Function::Ceiling, 1, 1),
            "cast" => (Function::Cast, 2, 2),
            _ => return None,
        })
    }
}

/// Target types for `cast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdmType {
    /// `Edm.String`
    String,
    /// `Edm.Int32` / `Edm.Int64`
    Integer,
    /// `Edm.Double` / `Edm.Decimal` / `Edm.Single`
    Real,
    /// `Edm.Boolean`
    Boolean,
    /// `Edm.DateTimeOffset` / `Edm.DateTime` / `Edm.Date`
    Date,
}

impl EdmType {
    pub(crate) fn parse(name: &str) -> Option<Self> {
        let name = name.strip_prefix("Edm.").unwrap_or(name);
        Some(match name {
            "String" => EdmType::String,
            "Int16" | "Int32" | "Int64" | "Byte" => EdmType::Integer,
            "Double" | "Decimal" | "Single" => EdmType::Real,
            "Boolean" => EdmType::Boolean,
            "DateTimeOffset" | "DateTime" | "Date" => EdmType::Date,
            _ => return None,
        })
    }
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant.
    Literal(Literal),
    /// A property path (`author/name`).
    Member(Vec<String>),
    /// A unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// A binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// A function call.
    Call(Function, Vec<Expr>),
    /// A cast to an EDM type.
    Cast(Box<Expr>, EdmType),
}

/// One `$orderby` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// The sort key.
    pub expr: Expr,
    /// True for `desc`.
    pub descending: bool,
}
