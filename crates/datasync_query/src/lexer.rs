//! Tokenizer for OData expressions.

use crate::error::{QueryError, QueryResult};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Identifier(String),
    String(String),
    Integer(i64),
    Real(f64),
    Date(DateTime<Utc>),
    OpenParen,
    CloseParen,
    Comma,
    Slash,
    Minus,
    End,
}

/// A token and the offset it started at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

impl Token {
    /// Returns true if the token is the identifier `word` (case-sensitive,
    /// as OData keywords are).
    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Identifier(text) if text == word)
    }
}

/// Splits an expression into tokens.
pub(crate) struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenizes the whole input, ending with [`TokenKind::End`].
    pub fn tokenize(mut self) -> QueryResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let end = token.kind == TokenKind::End;
            tokens.push(token);
            if end {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn next_token(&mut self) -> QueryResult<Token> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        let position = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::End,
                position,
            });
        };

        let kind = match c {
            '(' => self.single(TokenKind::OpenParen),
            ')' => self.single(TokenKind::CloseParen),
            ',' => self.single(TokenKind::Comma),
            '/' => self.single(TokenKind::Slash),
            '-' => self.single(TokenKind::Minus),
            '\'' => TokenKind::String(self.string_literal()?),
            c if c.is_ascii_digit() => self.number_or_date()?,
            c if c.is_alphabetic() || c == '_' || c == '$' || c == '@' => self.identifier()?,
            other => {
                return Err(QueryError::syntax(
                    position,
                    format!("unexpected character '{other}'"),
                ))
            }
        };
        Ok(Token { kind, position })
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn string_literal(&mut self) -> QueryResult<String> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(QueryError::syntax(start, "unterminated string literal")),
                Some('\'') if self.peek_at(1) == Some('\'') => {
                    value.push('\'');
                    self.pos += 2;
                }
                Some('\'') => {
                    self.pos += 1;
                    return Ok(value);
                }
                Some(c) => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn identifier(&mut self) -> QueryResult<TokenKind> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '$' || c == '@')
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();

        // Typed literals such as datetimeoffset'2021-01-01T00:00:00Z'.
        if self.peek() == Some('\'') {
            let lower = text.to_ascii_lowercase();
            let raw = self.string_literal()?;
            return match lower.as_str() {
                "datetime" | "datetimeoffset" => parse_date(&raw)
                    .map(TokenKind::Date)
                    .ok_or_else(|| QueryError::syntax(start, format!("invalid date '{raw}'"))),
                "guid" => Ok(TokenKind::String(raw)),
                _ => Err(QueryError::syntax(
                    start,
                    format!("unknown literal type '{text}'"),
                )),
            };
        }
        Ok(TokenKind::Identifier(text))
    }

    fn number_or_date(&mut self) -> QueryResult<TokenKind> {
        let start = self.pos;
        self.skip_digits();

        // Bare ISO dates: four digits then '-' then a digit.
        if self.pos - start == 4
            && self.peek() == Some('-')
            && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
        {
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_digit() || "TtZz:.+-".contains(c))
            {
                self.pos += 1;
            }
            let raw: String = self.chars[start..self.pos].iter().collect();
            return parse_date(&raw)
                .map(TokenKind::Date)
                .ok_or_else(|| QueryError::syntax(start, format!("invalid date '{raw}'")));
        }

        let mut real = false;
        if self.peek() == Some('.') {
            real = true;
            self.pos += 1;
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(QueryError::syntax(self.pos, "digit expected"));
            }
            self.skip_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            real = true;
            self.pos += 1;
            if matches!(self.peek(), Some('+' | '-')) {
                self.pos += 1;
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(QueryError::syntax(self.pos, "digit expected"));
            }
            self.skip_digits();
        }
        let digits: String = self.chars[start..self.pos].iter().collect();

        match self.peek() {
            Some('f' | 'F' | 'm' | 'M' | 'd' | 'D') => {
                real = true;
                self.pos += 1;
            }
            Some('l' | 'L') if !real => self.pos += 1,
            _ => {}
        }

        if real {
            digits
                .parse::<f64>()
                .map(TokenKind::Real)
                .map_err(|_| QueryError::syntax(start, format!("invalid number '{digits}'")))
        } else {
            digits
                .parse::<i64>()
                .map(TokenKind::Integer)
                .map_err(|_| QueryError::syntax(start, format!("invalid integer '{digits}'")))
        }
    }

    fn skip_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
    }
}

/// Parses an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
pub(crate) fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        Lexer::new(text)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn comparison_expression() {
        assert_eq!(
            kinds("rating eq 'R'"),
            vec![
                TokenKind::Identifier("rating".into()),
                TokenKind::Identifier("eq".into()),
                TokenKind::String("R".into()),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn escaped_quote() {
        assert_eq!(
            kinds("'Schindler''s List'")[0],
            TokenKind::String("Schindler's List".into())
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("42")[0], TokenKind::Integer(42));
        assert_eq!(kinds("42L")[0], TokenKind::Integer(42));
        assert_eq!(kinds("1000.5")[0], TokenKind::Real(1000.5));
        assert_eq!(kinds("2m")[0], TokenKind::Real(2.0));
        assert_eq!(kinds("1e3")[0], TokenKind::Real(1000.0));
    }

    #[test]
    fn dates() {
        let expected = Utc.with_ymd_and_hms(1994, 10, 14, 0, 0, 0).unwrap();
        assert_eq!(kinds("1994-10-14T00:00:00.000Z")[0], TokenKind::Date(expected));
        assert_eq!(kinds("1994-10-14")[0], TokenKind::Date(expected));
        assert_eq!(
            kinds("datetimeoffset'1994-10-14T00:00:00Z'")[0],
            TokenKind::Date(expected)
        );
    }

    #[test]
    fn cast_tokens() {
        let tokens = kinds("cast(1994-10-14T00:00:00.000Z,Edm.DateTimeOffset)");
        assert_eq!(tokens[0], TokenKind::Identifier("cast".into()));
        assert_eq!(tokens[1], TokenKind::OpenParen);
        assert!(matches!(tokens[2], TokenKind::Date(_)));
        assert_eq!(tokens[3], TokenKind::Comma);
        assert_eq!(tokens[4], TokenKind::Identifier("Edm.DateTimeOffset".into()));
    }

    #[test]
    fn errors_report_position() {
        let err = Lexer::new("title eq 'open").tokenize().unwrap_err();
        assert_eq!(err, QueryError::syntax(9, "unterminated string literal"));
        assert!(Lexer::new("a # b").tokenize().is_err());
        assert!(Lexer::new("1.").tokenize().is_err());
    }
}
