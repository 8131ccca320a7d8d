//! In-process evaluation of expressions against JSON entities.

use crate::ast::{BinaryOp, EdmType, Expr, Function, Literal, UnaryOp};
use crate::lexer::parse_date;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Missing property or `null`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Floating point.
    Real(f64),
    /// String.
    String(String),
    /// Date/time.
    Date(DateTime<Utc>),
    /// Arrays and objects; only ever equal to themselves.
    Other(Value),
}

impl Operand {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Operand::Null,
            Value::Bool(b) => Operand::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Operand::Integer(i),
                None => n.as_f64().map_or(Operand::Null, Operand::Real),
            },
            Value::String(s) => Operand::String(s.clone()),
            other => Operand::Other(other.clone()),
        }
    }

    fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Operand::Null,
            Literal::Bool(b) => Operand::Bool(*b),
            Literal::Integer(n) => Operand::Integer(*n),
            Literal::Real(n) => Operand::Real(*n),
            Literal::String(s) => Operand::String(s.clone()),
            Literal::Date(d) => Operand::Date(*d),
        }
    }

    /// Returns true only for `Bool(true)`.
    pub fn is_true(&self) -> bool {
        matches!(self, Operand::Bool(true))
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Operand::Integer(n) => Some(*n as f64),
            Operand::Real(n) => Some(*n),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Operand::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Operand::Date(d) => Some(*d),
            Operand::String(s) => parse_date(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Operand::Null => 0,
            Operand::Bool(_) => 1,
            Operand::Integer(_) | Operand::Real(_) => 2,
            Operand::Date(_) => 3,
            Operand::String(_) => 4,
            Operand::Other(_) => 5,
        }
    }
}

/// Compares two operands of compatible types.
///
/// Returns `None` when the types cannot be compared; `null` only compares
/// equal to `null`.
pub fn compare(left: &Operand, right: &Operand) -> Option<Ordering> {
    use Operand::*;
    match (left, right) {
        (Null, Null) => Some(Ordering::Equal),
        (Null, _) | (_, Null) => None,
        (Integer(a), Integer(b)) => Some(a.cmp(b)),
        (Integer(_) | Real(_), Integer(_) | Real(_)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Bool(a), Bool(b)) => Some(a.cmp(b)),
        (String(a), String(b)) => Some(a.cmp(b)),
        (Date(a), _) => right.as_date().map(|b| a.cmp(&b)),
        (_, Date(b)) => left.as_date().map(|a| a.cmp(b)),
        (Other(a), Other(b)) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total ordering used by `$orderby`: `null` first, then by type, then by
/// value.
pub fn sort_order(left: &Operand, right: &Operand) -> Ordering {
    compare(left, right).unwrap_or_else(|| left.rank().cmp(&right.rank()))
}

/// Evaluates an expression against one entity (a JSON object).
pub fn evaluate(expr: &Expr, item: &Value) -> Operand {
    match expr {
        Expr::Literal(literal) => Operand::from_literal(literal),
        Expr::Member(path) => lookup(item, path),
        Expr::Unary(UnaryOp::Not, inner) => match evaluate(inner, item) {
            Operand::Bool(b) => Operand::Bool(!b),
            _ => Operand::Null,
        },
        Expr::Unary(UnaryOp::Negate, inner) => match evaluate(inner, item) {
            Operand::Integer(n) => n.checked_neg().map_or(Operand::Null, Operand::Integer),
            Operand::Real(n) => Operand::Real(-n),
            _ => Operand::Null,
        },
        Expr::Binary(op, left, right) => binary(*op, left, right, item),
        Expr::Call(function, args) => {
            let args: Vec<Operand> = args.iter().map(|a| evaluate(a, item)).collect();
            call(*function, &args)
        }
        Expr::Cast(inner, target) => cast(evaluate(inner, item), *target),
    }
}

/// Looks up a property path. The first segment matches case-insensitively.
fn lookup(item: &Value, path: &[String]) -> Operand {
    let mut current = item;
    for segment in path {
        let Value::Object(map) = current else {
            return Operand::Null;
        };
        let found = map.get(segment).or_else(|| {
            map.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(segment))
                .map(|(_, value)| value)
        });
        match found {
            Some(value) => current = value,
            None => return Operand::Null,
        }
    }
    Operand::from_json(current)
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, item: &Value) -> Operand {
    match op {
        BinaryOp::And => {
            Operand::Bool(evaluate(left, item).is_true() && evaluate(right, item).is_true())
        }
        BinaryOp::Or => {
            Operand::Bool(evaluate(left, item).is_true() || evaluate(right, item).is_true())
        }
        _ => {
            let l = evaluate(left, item);
            let r = evaluate(right, item);
            match op {
                BinaryOp::Eq => Operand::Bool(compare(&l, &r) == Some(Ordering::Equal)),
                BinaryOp::Ne => Operand::Bool(compare(&l, &r) != Some(Ordering::Equal)),
                BinaryOp::Gt => Operand::Bool(compare(&l, &r) == Some(Ordering::Greater)),
                BinaryOp::Ge => Operand::Bool(matches!(
                    compare(&l, &r),
                    Some(Ordering::Greater | Ordering::Equal)
                )),
                BinaryOp::Lt => Operand::Bool(compare(&l, &r) == Some(Ordering::Less)),
                BinaryOp::Le => Operand::Bool(matches!(
                    compare(&l, &r),
                    Some(Ordering::Less | Ordering::Equal)
                )),
                _ => arithmetic(op, &l, &r),
            }
        }
    }
}

fn arithmetic(op: BinaryOp, left: &Operand, right: &Operand) -> Operand {
    if let (Operand::Integer(a), Operand::Integer(b)) = (left, right) {
        let result = match op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Sub => a.checked_sub(*b),
            BinaryOp::Mul => a.checked_mul(*b),
            BinaryOp::Div => a.checked_div(*b),
            BinaryOp::Mod => a.checked_rem(*b),
            _ => None,
        };
        return result.map_or(Operand::Null, Operand::Integer);
    }
    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Operand::Null;
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b != 0.0 => a / b,
        BinaryOp::Mod if b != 0.0 => a % b,
        _ => return Operand::Null,
    };
    Operand::Real(result)
}

fn call(function: Function, args: &[Operand]) -> Operand {
    let text = |i: usize| args.get(i).and_then(Operand::as_str);
    let date = |i: usize| args.get(i).and_then(Operand::as_date);
    let number = |i: usize| args.get(i).and_then(Operand::as_f64);

    match function {
        Function::StartsWith => two_strings(text(0), text(1), |s, p| s.starts_with(p)),
        Function::EndsWith => two_strings(text(0), text(1), |s, p| s.ends_with(p)),
        Function::Contains => two_strings(text(0), text(1), |s, p| s.contains(p)),
        Function::SubstringOf => two_strings(text(1), text(0), |s, p| s.contains(p)),
        Function::IndexOf => match (text(0), text(1)) {
            (Some(s), Some(p)) => Operand::Integer(
                s.find(p)
                    .map_or(-1, |byte| s[..byte].chars().count() as i64),
            ),
            _ => Operand::Null,
        },
        Function::Length => text(0).map_or(Operand::Null, |s| Operand::Integer(s.chars().count() as i64)),
        Function::ToLower => text(0).map_or(Operand::Null, |s| Operand::String(s.to_lowercase())),
        Function::ToUpper => text(0).map_or(Operand::Null, |s| Operand::String(s.to_uppercase())),
        Function::Trim => text(0).map_or(Operand::Null, |s| Operand::String(s.trim().to_string())),
        Function::Concat => match (args.first(), args.get(1)) {
            (Some(a), Some(b)) => match (display(a), display(b)) {
                (Some(a), Some(b)) => Operand::String(a + &b),
                _ => Operand::Null,
            },
            _ => Operand::Null,
        },
        Function::Substring => substring(text(0), args.get(1), args.get(2)),
        Function::Year => date(0).map_or(Operand::Null, |d| Operand::Integer(i64::from(d.year()))),
        Function::Month => date(0).map_or(Operand::Null, |d| Operand::Integer(i64::from(d.month()))),
        Function::Day => date(0).map_or(Operand::Null, |d| Operand::Integer(i64::from(d.day()))),
        Function::Hour => date(0).map_or(Operand::Null, |d| Operand::Integer(i64::from(d.hour()))),
        Function::Minute => date(0).map_or(Operand::Null, |d| Operand::Integer(i64::from(d.minute()))),
        Function::Second => date(0).map_or(Operand::Null, |d| Operand::Integer(i64::from(d.second()))),
        Function::Round => number(0).map_or(Operand::Null, |n| Operand::Real(n.round_ties_even())),
        Function::Floor => number(0).map_or(Operand::Null, |n| Operand::Real(n.floor())),
        Function::Ceiling => number(0).map_or(Operand::Null, |n| Operand::Real(n.ceil())),
        Function::Cast => Operand::Null,
    }
}

fn two_strings(s: Option<&str>, p: Option<&str>, f: impl Fn(&str, &str) -> bool) -> Operand {
    match (s, p) {
        (Some(s), Some(p)) => Operand::Bool(f(s, p)),
        _ => Operand::Null,
    }
}

fn display(operand: &Operand) -> Option<String> {
    match operand {
        Operand::String(s) => Some(s.clone()),
        Operand::Integer(n) => Some(n.to_string()),
        Operand::Real(n) => Some(n.to_string()),
        Operand::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn substring(s: Option<&str>, start: Option<&Operand>, length: Option<&Operand>) -> Operand {
    let (Some(s), Some(Operand::Integer(start))) = (s, start) else {
        return Operand::Null;
    };
    let start = usize::try_from(*start).unwrap_or(0);
    let rest = s.chars().skip(start);
    let taken: String = match length {
        Some(Operand::Integer(len)) => rest.take(usize::try_from(*len).unwrap_or(0)).collect(),
        Some(_) => return Operand::Null,
        None => rest.collect(),
    };
    Operand::String(taken)
}

fn cast(value: Operand, target: EdmType) -> Operand {
    match target {
        EdmType::Date => value.as_date().map_or(Operand::Null, Operand::Date),
        EdmType::String => display(&value).map_or(Operand::Null, Operand::String),
        EdmType::Integer => match value {
            Operand::Integer(n) => Operand::Integer(n),
            Operand::Real(n) => Operand::Integer(n.trunc() as i64),
            Operand::String(s) => s.trim().parse().map_or(Operand::Null, Operand::Integer),
            _ => Operand::Null,
        },
        EdmType::Real => match value {
            Operand::String(s) => s.trim().parse().map_or(Operand::Null, Operand::Real),
            other => other.as_f64().map_or(Operand::Null, Operand::Real),
        },
        EdmType::Boolean => match value {
            Operand::Bool(b) => Operand::Bool(b),
            Operand::String(s) if s.eq_ignore_ascii_case("true") => Operand::Bool(true),
            Operand::String(s) if s.eq_ignore_ascii_case("false") => Operand::Bool(false),
            _ => Operand::Null,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_filter;
    use serde_json::json;

    fn movie() -> Value {
        json!({
            "id": "id-000",
            "title": "The Shawshank Redemption",
            "year": 1994,
            "duration": 142,
            "rating": "R",
            "bestPictureWinner": false,
            "releaseDate": "1994-10-14T00:00:00.000Z",
            "director": { "name": "Frank Darabont" }
        })
    }

    fn matches(filter: &str) -> bool {
        evaluate(&parse_filter(filter).unwrap(), &movie()).is_true()
    }

    #[test]
    fn comparisons() {
        assert!(matches("year eq 1994"));
        assert!(matches("year ge 1994 and year le 1994"));
        assert!(matches("rating ne 'PG-13'"));
        assert!(matches("bestPictureWinner eq false"));
        assert!(!matches("year gt 1994"));
        assert!(matches("duration lt 142.5"));
    }

    #[test]
    fn null_semantics() {
        assert!(matches("missing eq null"));
        assert!(!matches("rating eq null"));
        assert!(matches("missing ne 'R'"));
        assert!(!matches("missing gt 5"));
        assert!(!matches("not(missing gt 5) and false"));
    }

    #[test]
    fn arithmetic_and_rounding() {
        assert!(matches("(year sub 1900) ge 80"));
        assert!(matches("(year div 1000.5) lt 2"));
        assert!(matches("year mod 2 eq 0"));
        assert!(matches("floor(duration div 60.0) eq 2"));
        assert!(matches("ceiling(duration div 60.0) eq 3"));
        assert!(matches("round(duration div 60.0) eq 2"));
        assert!(matches("round(2.5) eq 2"));
        assert!(matches("duration div 0 eq null"));
    }

    #[test]
    fn string_functions() {
        assert!(matches("startswith(title, 'The')"));
        assert!(matches("endswith(tolower(title), 'redemption')"));
        assert!(matches("contains(title, 'shank')"));
        assert!(matches("substringof('shank', title)"));
        assert!(matches("indexof(title, 'Shaw') eq 4"));
        assert!(matches("length(rating) eq 1"));
        assert!(matches("toupper(rating) eq 'R'"));
        assert!(matches("trim('  R ') eq rating"));
        assert!(matches("concat(rating, '-rated') eq 'R-rated'"));
        assert!(matches("substring(title, 4, 9) eq 'Shawshank'"));
        assert!(matches("substring(title, 4) eq 'Shawshank Redemption'"));
    }

    #[test]
    fn date_functions() {
        assert!(matches("year(releaseDate) eq 1994"));
        assert!(matches("month(releaseDate) eq 10"));
        assert!(matches("day(releaseDate) eq 14"));
        assert!(matches("hour(releaseDate) eq 0"));
        assert!(matches("releaseDate eq cast(1994-10-14T00:00:00.000Z,Edm.DateTimeOffset)"));
        assert!(matches("releaseDate lt 2000-01-01T00:00:00Z"));
        assert!(matches("releaseDate gt datetimeoffset'1990-01-01T00:00:00Z'"));
    }

    #[test]
    fn member_paths_and_case() {
        assert!(matches("director/name eq 'Frank Darabont'"));
        assert!(matches("Title eq 'The Shawshank Redemption'"));
        assert!(matches("director/missing eq null"));
    }

    #[test]
    fn mismatched_types_are_false() {
        assert!(!matches("title eq 5"));
        assert!(!matches("year eq '1994'"));
    }

    #[test]
    fn sort_order_puts_null_first() {
        assert_eq!(sort_order(&Operand::Null, &Operand::Integer(1)), Ordering::Less);
        assert_eq!(
            sort_order(&Operand::String("b".into()), &Operand::String("a".into())),
            Ordering::Greater
        );
        assert_eq!(sort_order(&Operand::Integer(2), &Operand::Real(2.0)), Ordering::Equal);
    }
}
