//! Literal expression parser
//!
//! Reads the list-literal syntax generators fall back to when they ignore a
//! JSON instruction: single-quoted strings, tuples, `True`/`False`/`None` and
//! trailing commas. Values come back as `serde_json::Value` so both parse
//! paths feed the same downstream code.

use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralError {
    pub position: usize,
    pub message: String,
}

impl std::fmt::Display for LiteralError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.message, self.position)
    }
}

impl std::error::Error for LiteralError {}

type ParseResult<T> = std::result::Result<T, LiteralError>;

/// Parse a complete literal expression. Trailing non-whitespace is an error.
pub fn parse_literal(input: &str) -> ParseResult<Value> {
    let mut parser = Parser::new(input);
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> LiteralError {
        LiteralError {
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> ParseResult<Value> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.sequence('[', ']'),
            Some('(') => self.sequence('(', ')'),
            Some('{') => self.mapping(),
            Some('\'') | Some('"') => {
                let mut text = self.string()?;
                // Adjacent literals concatenate
                loop {
                    self.skip_ws();
                    match self.peek() {
                        Some('\'') | Some('"') => text.push_str(&self.string()?),
                        _ => break,
                    }
                }
                Ok(Value::String(text))
            }
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.keyword(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn sequence(&mut self, open: char, close: char) -> ParseResult<Value> {
        debug_assert_eq!(self.peek(), Some(open));
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(Value::Array(items)),
                Some(_) => {
                    self.pos -= 1;
                    return Err(self.error("expected ',' or closing bracket"));
                }
                None => return Err(self.error("unterminated sequence")),
            }
        }
    }

    fn mapping(&mut self) -> ParseResult<Value> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.skip_ws();
            if self.bump() != Some(':') {
                return Err(self.error("expected ':' in mapping"));
            }
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn string(&mut self) -> ParseResult<String> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let escaped = self.bump().ok_or_else(|| self.error("dangling escape"))?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(escaped),
                        '\n' => {}
                        'x' => out.push(self.hex_escape(2)?),
                        'u' => out.push(self.hex_escape(4)?),
                        'U' => out.push(self.hex_escape(8)?),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> ParseResult<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid hex escape"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| self.error("escape is not a valid code point"))
    }

    fn number(&mut self) -> ParseResult<Value> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_')
        ) {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        if let Ok(int) = raw.parse::<i64>() {
            return Ok(Value::Number(int.into()));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LiteralError {
                position: start,
                message: format!("invalid number '{}'", raw),
            })
    }

    fn keyword(&mut self) -> ParseResult<Value> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            _ => Err(LiteralError {
                position: start,
                message: format!("unknown name '{}'", word),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_quoted_list() {
        assert_eq!(parse_literal("['customer', 'orders']").unwrap(), json!(["customer", "orders"]));
    }

    #[test]
    fn test_nested_tuples_and_trailing_commas() {
        let value = parse_literal("[('a', \"b\"), ('c', 'd',),]").unwrap();
        assert_eq!(value, json!([["a", "b"], ["c", "d"]]));
    }

    #[test]
    fn test_escapes_and_keywords() {
        let value = parse_literal(r#"['it\'s', True, None, -3, 2.5, 'ã']"#).unwrap();
        assert_eq!(value, json!(["it's", true, null, -3, 2.5, "ã"]));
    }

    #[test]
    fn test_mapping() {
        let value = parse_literal("{'orders': 'order facts', 1: [2]}").unwrap();
        assert_eq!(value, json!({"orders": "order facts", "1": [2]}));
    }

    #[test]
    fn test_rejects_prose_and_trailing_text() {
        assert!(parse_literal("Here are the agents: ['orders']").is_err());
        assert!(parse_literal("['orders'] thanks").is_err());
        assert!(parse_literal("['orders'").is_err());
        assert!(parse_literal("").is_err());
    }
}
