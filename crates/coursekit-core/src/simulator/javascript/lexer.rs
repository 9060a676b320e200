//! Tokenizer for the JavaScript subset.

use std::fmt;

/// Multi-character punctuators come first so the longest match wins.
const PUNCTUATORS: [&str; 41] = [
    "===", "!==", "**=", "...", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--",
    "+=", "-=", "*=", "/=", "%=", "**", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "=", "!", "?", ":", ".",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    Text(String),
    /// Source of an embedded `${...}` expression.
    Code(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Template(Vec<TemplateChunk>),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    /// A line break separates this token from the previous one.
    pub newline_before: bool,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Template(_) => f.write_str("template literal"),
            Self::Ident(name) => f.write_str(name),
            Self::Punct(p) => f.write_str(p),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

/// A parse-time failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
}

/// Splits `source` into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(source: &str, first_line: u32) -> Result<Vec<Token>, SyntaxError> {
    Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: first_line,
    }
    .run()
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            let newline_before = self.skip_trivia()?;
            let line = self.line;
            let Some(c) = self.peek(0) else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    newline_before: true,
                });
                return Ok(tokens);
            };

            let kind = if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|d| d.is_ascii_digit())) {
                self.number()?
            } else if c == '"' || c == '\'' {
                self.bump();
                TokenKind::Str(self.string(c)?)
            } else if c == '`' {
                self.bump();
                self.template()?
            } else if c.is_alphabetic() || c == '_' || c == '$' {
                TokenKind::Ident(self.identifier())
            } else {
                self.punctuator()?
            };

            tokens.push(Token {
                kind,
                line,
                newline_before,
            });
        }
    }

    /// Skips whitespace and comments; returns whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<bool, SyntaxError> {
        let mut newline = false;
        while let Some(c) = self.peek(0) {
            match c {
                '\n' => {
                    newline = true;
                    self.bump();
                }
                c if c.is_whitespace() => {
                    self.bump();
                }
                '/' if self.peek(1) == Some('/') => {
                    while self.peek(0).is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                '/' if self.peek(1) == Some('*') => {
                    let start = self.line;
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek(0) == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some('\n') => newline = true,
                            Some(_) => {}
                            None => return Err(SyntaxError::new("Unterminated comment", start)),
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(newline)
    }

    fn number(&mut self) -> Result<TokenKind, SyntaxError> {
        let line = self.line;
        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x' | 'X')) {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek(0).filter(char::is_ascii_hexdigit) {
                digits.push(c);
                self.bump();
            }
            return u64::from_str_radix(&digits, 16)
                .map(|n| TokenKind::Number(n as f64))
                .map_err(|_| SyntaxError::new("Invalid hexadecimal literal", line));
        }

        let mut text = String::new();
        let (mut seen_dot, mut seen_exp) = (false, false);
        while let Some(c) = self.peek(0) {
            let next = self.peek(1);
            let accept = match c {
                '0'..='9' => true,
                '_' => next.is_some_and(|d| d.is_ascii_digit()),
                // `1.toFixed` lexes as `1` `.` `toFixed`
                '.' => !seen_dot && !seen_exp && !next.is_some_and(|d| d.is_alphabetic() || d == '_' || d == '$'),
                'e' | 'E' => {
                    !seen_exp
                        && (next.is_some_and(|d| d.is_ascii_digit())
                            || (matches!(next, Some('+' | '-'))
                                && self.peek(2).is_some_and(|d| d.is_ascii_digit())))
                }
                '+' | '-' => matches!(text.chars().last(), Some('e' | 'E')),
                _ => false,
            };
            if !accept {
                break;
            }
            match c {
                '.' => seen_dot = true,
                'e' | 'E' => seen_exp = true,
                _ => {}
            }
            if c != '_' {
                text.push(c);
            }
            self.bump();
        }
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| SyntaxError::new(format!("Invalid number '{text}'"), line))
    }

    fn escape(&mut self, line: u32) -> Result<Option<char>, SyntaxError> {
        let Some(c) = self.bump() else {
            return Err(SyntaxError::new("Invalid or unexpected token", line));
        };
        let decoded = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            'u' => {
                let mut hex = String::new();
                for _ in 0..4 {
                    match self.bump() {
                        Some(h) if h.is_ascii_hexdigit() => hex.push(h),
                        _ => return Err(SyntaxError::new("Invalid Unicode escape sequence", line)),
                    }
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or('\u{fffd}')
            }
            // line continuation
            '\n' => return Ok(None),
            other => other,
        };
        Ok(Some(decoded))
    }

    fn string(&mut self, quote: char) -> Result<String, SyntaxError> {
        let line = self.line;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    if let Some(c) = self.escape(line)? {
                        out.push(c);
                    }
                }
                Some('\n') | None => return Err(SyntaxError::new("Invalid or unexpected token", line)),
                Some(c) => out.push(c),
            }
        }
    }

    fn template(&mut self) -> Result<TokenKind, SyntaxError> {
        let line = self.line;
        let mut chunks = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some('\\') => {
                    if let Some(c) = self.escape(line)? {
                        text.push(c);
                    }
                }
                Some('$') if self.peek(0) == Some('{') => {
                    self.bump();
                    if !text.is_empty() {
                        chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                    }
                    chunks.push(TemplateChunk::Code(self.template_code(line)?));
                }
                Some(c) => text.push(c),
                None => return Err(SyntaxError::new("Unterminated template literal", line)),
            }
        }
        if !text.is_empty() {
            chunks.push(TemplateChunk::Text(text));
        }
        Ok(TokenKind::Template(chunks))
    }

    /// Collects the source of a `${...}` up to its matching brace.
    fn template_code(&mut self, line: u32) -> Result<String, SyntaxError> {
        let mut code = String::new();
        let mut depth = 0usize;
        loop {
            let Some(c) = self.bump() else {
                return Err(SyntaxError::new("Unterminated template literal", line));
            };
            match c {
                '{' => depth += 1,
                '}' if depth == 0 => return Ok(code),
                '}' => depth -= 1,
                '"' | '\'' | '`' => {
                    code.push(c);
                    while let Some(inner) = self.bump() {
                        code.push(inner);
                        if inner == '\\' {
                            if let Some(escaped) = self.bump() {
                                code.push(escaped);
                            }
                        } else if inner == c {
                            break;
                        }
                    }
                    continue;
                }
                _ => {}
            }
            code.push(c);
        }
    }

    fn identifier(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek(0).filter(|c| c.is_alphanumeric() || *c == '_' || *c == '$') {
            name.push(c);
            self.bump();
        }
        name
    }

    fn punctuator(&mut self) -> Result<TokenKind, SyntaxError> {
        for punct in PUNCTUATORS {
            let matches = punct
                .chars()
                .enumerate()
                .all(|(i, p)| self.peek(i) == Some(p));
            if matches {
                for _ in 0..punct.chars().count() {
                    self.bump();
                }
                return Ok(TokenKind::Punct(punct));
            }
        }
        let c = self.peek(0).unwrap_or(' ');
        Err(SyntaxError::new(format!("Invalid or unexpected token '{c}'"), self.line))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, 1)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_longest_punctuator_wins() {
        assert_eq!(
            kinds("a !== b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Punct("!=="),
                TokenKind::Ident("b".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1.5e3 0xff .5")[..3], [
            TokenKind::Number(1500.0),
            TokenKind::Number(255.0),
            TokenKind::Number(0.5)
        ]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(kinds(r#""a\n\"b\"""#)[0], TokenKind::Str("a\n\"b\"".into()));
        assert_eq!(kinds(r"'A'")[0], TokenKind::Str("A".into()));
    }

    #[test]
    fn test_template_chunks() {
        let tokens = kinds("`Hi ${user.name + '}'}!`");
        assert_eq!(
            tokens[0],
            TokenKind::Template(vec![
                TemplateChunk::Text("Hi ".into()),
                TemplateChunk::Code("user.name + '}'".into()),
                TemplateChunk::Text("!".into()),
            ])
        );
    }

    #[test]
    fn test_comments_and_newlines() {
        let tokens = tokenize("a // note\n/* block\n */ b", 1).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Ident("b".into()));
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("let s = 'oops", 1).unwrap_err();
        assert_eq!(err.message, "Invalid or unexpected token");
    }
}
