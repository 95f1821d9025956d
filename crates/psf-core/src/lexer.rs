//! Tokenizer for the structured-text parts of a PSF container.
//!
//! Both encodings share this grammar for HEADER, TYPE, SWEEP and TRACE
//! bodies; the textual encoding also uses it for the VALUE block.

use crate::types::{PropValue, Properties, PsfError, Result};

/// Token types for PSF text
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    /// Double-quoted string, escapes resolved
    Str(String),
    Int(i64),
    Real(f64),
    /// Bare keyword (FLOAT, DOUBLE, PROP, GROUP, ...)
    Word(&'a str),
    LParen,
    RParen,
    Star,
}

impl Token<'_> {
    /// Short description for error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Int(i) => format!("integer {}", i),
            Token::Real(r) => format!("number {}", r),
            Token::Word(w) => format!("keyword {}", w),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Star => "'*'".to_string(),
        }
    }
}

/// A token with its source line
#[derive(Debug, Clone)]
pub struct SpannedToken<'a> {
    pub token: Token<'a>,
    pub line: usize,
}

/// Lexer over one section body
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    peeked: Option<SpannedToken<'a>>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer; `first_line` is the file line the body starts on
    pub fn new(input: &'a str, first_line: usize) -> Self {
        Self {
            input,
            pos: 0,
            line: first_line,
            peeked: None,
        }
    }

    /// Line of the next unread token
    pub fn line(&self) -> usize {
        self.peeked.as_ref().map(|t| t.line).unwrap_or(self.line)
    }

    pub fn error(&self, message: impl std::fmt::Display) -> PsfError {
        PsfError::malformed(format!("line {}: {}", self.line(), message))
    }

    /// Look at the next token without consuming it
    pub fn peek(&mut self) -> Result<Option<&Token<'a>>> {
        if self.peeked.is_none() {
            self.peeked = self.scan()?;
        }
        Ok(self.peeked.as_ref().map(|t| &t.token))
    }

    pub fn next_token(&mut self) -> Result<Option<Token<'a>>> {
        match self.peeked.take() {
            Some(t) => Ok(Some(t.token)),
            None => Ok(self.scan()?.map(|t| t.token)),
        }
    }

    pub fn at_end(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_none())
    }

    /// Consume the next token, failing at end of input
    pub fn expect_token(&mut self, what: &str) -> Result<Token<'a>> {
        self.next_token()?
            .ok_or_else(|| self.error(format!("expected {}, found end of section", what)))
    }

    pub fn expect_str(&mut self, what: &str) -> Result<String> {
        match self.expect_token(what)? {
            Token::Str(s) => Ok(s),
            other => Err(self.error(format!("expected {}, found {}", what, other.describe()))),
        }
    }

    pub fn expect_lparen(&mut self) -> Result<()> {
        match self.expect_token("'('")? {
            Token::LParen => Ok(()),
            other => Err(self.error(format!("expected '(', found {}", other.describe()))),
        }
    }

    pub fn expect_rparen(&mut self) -> Result<()> {
        match self.expect_token("')'")? {
            Token::RParen => Ok(()),
            other => Err(self.error(format!("expected ')', found {}", other.describe()))),
        }
    }

    pub fn expect_integer(&mut self, what: &str) -> Result<i64> {
        match self.expect_token(what)? {
            Token::Int(i) => Ok(i),
            other => Err(self.error(format!("expected {}, found {}", what, other.describe()))),
        }
    }

    /// Consume the next token if it is the given keyword
    pub fn eat_word(&mut self, word: &str) -> Result<bool> {
        if matches!(self.peek()?, Some(Token::Word(w)) if *w == word) {
            self.peeked = None;
            return Ok(true);
        }
        Ok(false)
    }

    /// Parse an optional `PROP( "key" value ... )` block
    pub fn parse_props(&mut self) -> Result<Properties> {
        if !self.eat_word("PROP")? {
            return Ok(Properties::new());
        }
        self.expect_lparen()?;
        let mut props = Properties::new();
        loop {
            match self.expect_token("property or ')'")? {
                Token::RParen => return Ok(props),
                Token::Str(key) => {
                    let value = self.parse_prop_value()?;
                    props.insert(key, value);
                }
                other => {
                    return Err(self.error(format!(
                        "expected property name, found {}",
                        other.describe()
                    )))
                }
            }
        }
    }

    /// Parse `"key" value` pairs up to the end of the section
    pub fn parse_pairs(&mut self) -> Result<Properties> {
        let mut props = Properties::new();
        while !self.at_end()? {
            let key = self.expect_str("header key")?;
            let value = self.parse_prop_value()?;
            props.insert(key, value);
        }
        Ok(props)
    }

    fn parse_prop_value(&mut self) -> Result<PropValue> {
        match self.expect_token("property value")? {
            Token::Str(s) => Ok(PropValue::Str(s)),
            Token::Int(i) => Ok(PropValue::Int(i)),
            Token::Real(r) => Ok(PropValue::Real(r)),
            other => Err(self.error(format!(
                "expected property value, found {}",
                other.describe()
            ))),
        }
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    fn skip_whitespace(&mut self) {
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            if bytes[self.pos] == b'\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
    }

    fn scan(&mut self) -> Result<Option<SpannedToken<'a>>> {
        self.skip_whitespace();
        let bytes = self.input.as_bytes();
        if self.pos >= bytes.len() {
            return Ok(None);
        }

        let line = self.line;
        let token = match bytes[self.pos] {
            b'(' => {
                self.pos += 1;
                Token::LParen
            }
            b')' => {
                self.pos += 1;
                Token::RParen
            }
            b'*' => {
                self.pos += 1;
                Token::Star
            }
            b'"' => Token::Str(self.scan_string()?),
            _ => self.scan_atom()?,
        };
        Ok(Some(SpannedToken { token, line }))
    }

    fn scan_string(&mut self) -> Result<String> {
        let start_line = self.line;
        // Skip opening quote
        self.pos += 1;
        let input = self.input;
        let mut out = String::new();
        let mut chars = input[self.pos..].char_indices();
        while let Some((offset, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += offset + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                '\n' => {
                    self.line += 1;
                    out.push(c);
                }
                _ => out.push(c),
            }
        }
        Err(PsfError::malformed(format!(
            "line {}: unterminated string",
            start_line
        )))
    }

    fn scan_atom(&mut self) -> Result<Token<'a>> {
        let input = self.input;
        let bytes = input.as_bytes();
        let start = self.pos;
        while self.pos < bytes.len()
            && !bytes[self.pos].is_ascii_whitespace()
            && !matches!(bytes[self.pos], b'(' | b')' | b'"')
        {
            self.pos += 1;
        }
        let text = &input[start..self.pos];

        let first = text.as_bytes()[0];
        if first.is_ascii_digit() || matches!(first, b'-' | b'+' | b'.') {
            return parse_number(text).ok_or_else(|| {
                PsfError::malformed(format!("line {}: invalid number '{}'", self.line, text))
            });
        }

        match text.to_ascii_lowercase().as_str() {
            "inf" | "infinity" => Ok(Token::Real(f64::INFINITY)),
            "nan" => Ok(Token::Real(f64::NAN)),
            _ if text.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') => {
                Ok(Token::Word(text))
            }
            _ => Err(PsfError::malformed(format!(
                "line {}: unexpected '{}'",
                self.line, text
            ))),
        }
    }
}

fn parse_number(text: &str) -> Option<Token<'static>> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Token::Int(i));
    }
    match text.to_ascii_lowercase().as_str() {
        "-inf" | "-infinity" => return Some(Token::Real(f64::NEG_INFINITY)),
        "+inf" | "+infinity" => return Some(Token::Real(f64::INFINITY)),
        _ => {}
    }
    text.parse::<f64>().ok().map(Token::Real)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(input, 1);
        let mut out = Vec::new();
        while let Some(t) = lexer.next_token().unwrap() {
            out.push(t);
        }
        out
    }

    #[test]
    fn test_scans_value_row() {
        assert_eq!(
            tokens("\"top\" (1.0e+00 -2)\n\"freq\" 3"),
            vec![
                Token::Str("top".into()),
                Token::LParen,
                Token::Real(1.0),
                Token::Int(-2),
                Token::RParen,
                Token::Str("freq".into()),
                Token::Int(3),
            ]
        );
    }

    #[test]
    fn test_scans_keywords_and_star() {
        assert_eq!(
            tokens("STRING * FLOAT DOUBLE"),
            vec![
                Token::Word("STRING"),
                Token::Star,
                Token::Word("FLOAT"),
                Token::Word("DOUBLE"),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#""a\"b" "V/sqrt(Hz)""#),
            vec![Token::Str("a\"b".into()), Token::Str("V/sqrt(Hz)".into())]
        );
    }

    #[test]
    fn test_special_numbers() {
        let toks = tokens("inf -inf nan");
        assert_eq!(toks[0], Token::Real(f64::INFINITY));
        assert_eq!(toks[1], Token::Real(f64::NEG_INFINITY));
        assert!(matches!(toks[2], Token::Real(x) if x.is_nan()));
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("\"abc", 4);
        let err = lexer.next_token().unwrap_err();
        assert!(err.to_string().contains("line 4"));
    }

    #[test]
    fn test_props_and_lines() {
        let mut lexer = Lexer::new("PROP(\n\"units\" \"V\"\n\"grid\" 1\n)\n\"x\"", 10);
        let props = lexer.parse_props().unwrap();
        assert_eq!(props.get_str("units"), Some("V"));
        assert_eq!(props.get_f64("grid"), Some(1.0));
        lexer.peek().unwrap();
        assert_eq!(lexer.line(), 14);
        assert_eq!(lexer.expect_str("name").unwrap(), "x");
        assert!(lexer.at_end().unwrap());
    }
}
