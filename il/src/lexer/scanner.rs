//! Lexer implementation

use super::token::*;
use std::iter::Peekable;
use std::str::CharIndices;

// ============================================================================
// LEXER IMPLEMENTATION
// ============================================================================

/// Lexer for the instruction language.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            pos: 0,
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        tokens
    }

    /// Get the next token from the source.
    fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start_pos = self.pos;
        let start_line = self.line;
        let start_col = self.column;

        let kind = match self.peek_char() {
            None => TokenKind::Eof,
            Some(c) => match c {
                '{' => {
                    self.advance();
                    TokenKind::LBrace
                }
                '}' => {
                    self.advance();
                    TokenKind::RBrace
                }
                '(' => {
                    self.advance();
                    TokenKind::LParen
                }
                ')' => {
                    self.advance();
                    TokenKind::RParen
                }
                '=' => {
                    self.advance();
                    TokenKind::Eq
                }
                ',' => {
                    self.advance();
                    TokenKind::Comma
                }

                '"' => self.scan_string(),

                '$' => self.scan_variable(),

                '-' if self
                    .peek_next_char()
                    .map(|c| c.is_ascii_digit())
                    .unwrap_or(false) =>
                {
                    self.scan_number()
                }

                c if c.is_ascii_digit() => self.scan_number(),

                c if c.is_ascii_alphabetic() || c == '_' => self.scan_identifier(),

                c => {
                    self.advance();
                    TokenKind::Error(format!("unexpected character: {}", c))
                }
            },
        };

        Token {
            kind,
            span: Span {
                start: start_pos,
                end: self.pos,
                line: start_line,
                column: start_col,
            },
        }
    }

    /// Scan an identifier, allowing the hyphenated operator names of the
    /// grammar (`ON-FAIL`, `SANDBOXED-EXECUTE`).
    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;

        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                self.advance();
            } else {
                break;
            }
        }

        let ident = &self.source[start..self.pos];
        match ident {
            "true" => TokenKind::Boolean(true),
            "false" => TokenKind::Boolean(false),
            _ => TokenKind::Identifier(ident.to_string()),
        }
    }

    /// Scan a `$name` variable reference.
    fn scan_variable(&mut self) -> TokenKind {
        self.advance(); // consume '$'
        let start = self.pos;

        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                self.advance();
            } else {
                break;
            }
        }

        if self.pos == start {
            return TokenKind::Error("expected a variable name after '$'".to_string());
        }

        TokenKind::Variable(self.source[start..self.pos].to_string())
    }

    /// Scan a string literal with escape sequences.
    fn scan_string(&mut self) -> TokenKind {
        self.advance(); // consume opening quote
        let mut value = String::new();

        loop {
            match self.peek_char() {
                None => return TokenKind::Error("unterminated string".to_string()),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        Some('n') => {
                            self.advance();
                            value.push('\n');
                        }
                        Some('t') => {
                            self.advance();
                            value.push('\t');
                        }
                        Some('r') => {
                            self.advance();
                            value.push('\r');
                        }
                        Some('\\') => {
                            self.advance();
                            value.push('\\');
                        }
                        Some('"') => {
                            self.advance();
                            value.push('"');
                        }
                        _ => value.push('\\'),
                    }
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        TokenKind::String(value)
    }

    /// Scan a numeric literal, including a leading sign.
    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;

        if self.peek_char() == Some('-') {
            self.advance();
        }

        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() || c == '.' {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.pos];
        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Error(format!("invalid number: {}", text)),
        }
    }

    /// Skip whitespace and `//`/`/* */` comments.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                Some('/') => {
                    let next = self.peek_next_char();
                    if next == Some('/') {
                        while let Some(c) = self.peek_char() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    } else if next == Some('*') {
                        self.advance(); // /
                        self.advance(); // *
                        loop {
                            match self.peek_char() {
                                None => break,
                                Some('*') if self.peek_next_char() == Some('/') => {
                                    self.advance();
                                    self.advance();
                                    break;
                                }
                                Some('\n') => {
                                    self.advance();
                                    self.line += 1;
                                    self.column = 1;
                                }
                                _ => {
                                    self.advance();
                                }
                            }
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next_char(&self) -> Option<char> {
        let mut iter = self.source[self.pos..].char_indices();
        iter.next();
        iter.next().map(|(_, c)| c)
    }

    fn advance(&mut self) -> Option<char> {
        if let Some((i, c)) = self.chars.next() {
            self.pos = i + c.len_utf8();
            self.column += 1;
            Some(c)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_a_simple_form() {
        let tokens = kinds(r#"(QUERY "hello")"#);
        assert_eq!(
            tokens,
            vec![
                TokenKind::LParen,
                TokenKind::Identifier("QUERY".into()),
                TokenKind::String("hello".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_hyphenated_operator_names() {
        let tokens = kinds("(SANDBOXED-EXECUTE)");
        assert_eq!(tokens[1], TokenKind::Identifier("SANDBOXED-EXECUTE".into()));
    }

    #[test]
    fn tokenizes_variable_references() {
        let tokens = kinds("$error.kind");
        assert_eq!(tokens[0], TokenKind::Variable("error.kind".into()));
    }

    #[test]
    fn tokenizes_metadata_block() {
        let tokens = kinds("{agent_id=\"a1\", k=3}");
        assert_eq!(
            tokens,
            vec![
                TokenKind::LBrace,
                TokenKind::Identifier("agent_id".into()),
                TokenKind::Eq,
                TokenKind::String("a1".into()),
                TokenKind::Comma,
                TokenKind::Identifier("k".into()),
                TokenKind::Eq,
                TokenKind::Number(3.0),
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_negative_numbers() {
        assert_eq!(kinds("-5")[0], TokenKind::Number(-5.0));
    }

    #[test]
    fn string_escapes_are_unescaped() {
        let tokens = kinds(r#""a\nb\"c""#);
        assert_eq!(tokens[0], TokenKind::String("a\nb\"c".into()));
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let tokens = kinds("\"abc");
        assert!(matches!(tokens[0], TokenKind::Error(_)));
    }

    #[test]
    fn skips_line_and_block_comments() {
        let tokens = kinds("// comment\n(QUERY /* inline */ \"x\")");
        assert_eq!(tokens[0], TokenKind::LParen);
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = Lexer::new("\n(QUERY)").tokenize();
        let lparen = &tokens[0];
        assert_eq!(lparen.span.line, 2);
    }
}
