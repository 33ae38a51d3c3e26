//! Lexical analysis of rule source text

/// Error types for lexer operations
pub mod error;
/// Token definitions and keyword table
pub mod token;

pub use error::LexError;
pub use token::{LineCol, Token, TokenKind};

/// Tokenize `input` in one pass
pub fn scan_tokens(input: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(input);
    lexer.scan_tokens()?;
    Ok(lexer.into_tokens())
}

/// Lexer for rule source text.
///
/// Produces the token list plus the index of every `rule` keyword, which the
/// parser uses to resynchronize after an error.
#[derive(Debug)]
pub struct Lexer<'a> {
    input: &'a str,
    start: usize,
    position: usize,
    pos: LineCol,
    tokens: Vec<Token>,
    rule_indices: Vec<usize>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `input`
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            start: 0,
            position: 0,
            pos: LineCol::default(),
            tokens: Vec::new(),
            rule_indices: Vec::new(),
        }
    }

    /// Scan the whole input. Ends with exactly one `EndOfFile` token.
    pub fn scan_tokens(&mut self) -> Result<(), LexError> {
        while !self.is_at_end() {
            self.scan_token()?;
        }
        let len = self.input.len();
        self.tokens
            .push(Token::new(TokenKind::EndOfFile, len, len, self.pos));
        Ok(())
    }

    /// Tokens scanned so far
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Indices into `tokens()` of every `rule` keyword
    pub fn rule_indices(&self) -> &[usize] {
        &self.rule_indices
    }

    /// Number of `rule` keywords seen
    pub fn rule_count(&self) -> usize {
        self.rule_indices.len()
    }

    /// Current position of the scanner
    pub fn position(&self) -> LineCol {
        self.pos
    }

    /// Text of `token` in the input
    pub fn lexeme(&self, token: &Token) -> &'a str {
        token.lexeme(self.input)
    }

    /// Consume the lexer, keeping only the tokens
    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    /// Consume the lexer, keeping the tokens and the rule-start table
    pub fn into_parts(self) -> (Vec<Token>, Vec<usize>) {
        (self.tokens, self.rule_indices)
    }

    fn scan_token(&mut self) -> Result<(), LexError> {
        self.start = self.position;
        let pos = self.pos;
        let Some(c) = self.advance() else {
            return Ok(());
        };

        match c {
            ' ' | '\t' | '\r' | '\n' => {}
            '{' => self.add_token(TokenKind::OpenBrace, pos),
            '}' => self.add_token(TokenKind::CloseBrace, pos),
            '(' => self.add_token(TokenKind::OpenParen, pos),
            ')' => self.add_token(TokenKind::CloseParen, pos),
            ',' => self.add_token(TokenKind::Comma, pos),
            ':' => self.add_token(TokenKind::Colon, pos),
            '=' => {
                let kind = if self.match_char('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.add_token(kind, pos);
            }
            '<' => {
                let kind = if self.match_char('=') {
                    TokenKind::LessThanEqual
                } else {
                    TokenKind::LessThan
                };
                self.add_token(kind, pos);
            }
            '>' => {
                let kind = if self.match_char('=') {
                    TokenKind::GreaterThanEqual
                } else {
                    TokenKind::GreaterThan
                };
                self.add_token(kind, pos);
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::NotEqual, pos);
                } else {
                    return Err(LexError::unexpected("Unexpected input character: !", pos));
                }
            }
            '/' => {
                if self.match_char('/') {
                    self.single_line_comment();
                } else if self.match_char('*') {
                    self.multi_line_comment(pos)?;
                } else {
                    return Err(LexError::unexpected("Unexpected input character: /", pos));
                }
            }
            '"' => self.string(pos)?,
            c if c.is_ascii_digit() => {
                self.advance_while(|c| c.is_ascii_digit());
                self.add_token(TokenKind::Number, pos);
            }
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(pos)?,
            _ => return Err(LexError::unexpected("Unexpected input character", pos)),
        }
        Ok(())
    }

    fn identifier(&mut self, pos: LineCol) -> Result<(), LexError> {
        self.advance_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let text = &self.input[self.start..self.position];
        match TokenKind::from_keyword(text) {
            Some(TokenKind::Rule) => {
                self.rule_indices.push(self.tokens.len());
                self.add_token(TokenKind::Rule, pos);
            }
            Some(TokenKind::Encodings) => {
                self.add_token(TokenKind::Encodings, pos);
                self.encoding_list()?;
            }
            Some(kind) => self.add_token(kind, pos),
            None => self.add_token(TokenKind::Identifier, pos),
        }
        Ok(())
    }

    /// `= NAME (, NAME)*` after the `encodings` keyword. Names such as `UTF-16LE`
    /// contain characters that are not identifier characters, so they are
    /// scanned as runs up to whitespace, `,`, `}` or `)`.
    fn encoding_list(&mut self) -> Result<(), LexError> {
        self.skip_blanks();
        self.start = self.position;
        let pos = self.pos;
        if !self.match_char('=') {
            return Err(LexError::unexpected(
                "Expected = after encodings",
                self.pos,
            ));
        }
        self.add_token(TokenKind::Equal, pos);

        loop {
            self.skip_blanks();
            self.start = self.position;
            let pos = self.pos;
            self.advance_while(|c| !(c.is_whitespace() || matches!(c, ',' | '}' | ')')));
            if self.start == self.position {
                return Err(LexError::unexpected("Expected encoding name", pos));
            }
            self.add_token(TokenKind::Identifier, pos);

            let (saved_position, saved_pos) = (self.position, self.pos);
            self.skip_blanks();
            if self.peek() == Some(',') {
                self.start = self.position;
                let pos = self.pos;
                self.advance();
                self.add_token(TokenKind::Comma, pos);
            } else {
                self.position = saved_position;
                self.pos = saved_pos;
                return Ok(());
            }
        }
    }

    fn string(&mut self, pos: LineCol) -> Result<(), LexError> {
        let start = self.position;
        loop {
            match self.advance() {
                None => return Err(LexError::unexpected("Unterminated string", pos)),
                Some('\\') => {
                    self.advance();
                }
                Some('"') => break,
                Some(_) => {}
            }
        }
        // Range excludes both quotes
        let end = self.position - 1;
        self.tokens
            .push(Token::new(TokenKind::DoubleQuotedString, start, end, pos));
        Ok(())
    }

    /// Skips to the newline without consuming it
    fn single_line_comment(&mut self) {
        let rest = &self.input[self.position..];
        let len = memchr::memchr(b'\n', rest.as_bytes()).unwrap_or(rest.len());
        self.pos.col += rest[..len].chars().count() as u32;
        self.position += len;
    }

    /// `/* ... */` comments do not nest.
    fn multi_line_comment(&mut self, pos: LineCol) -> Result<(), LexError> {
        loop {
            match self.advance() {
                None => {
                    return Err(LexError::unexpected(
                        "Unterminated multi-line comment",
                        pos,
                    ))
                }
                Some('*') if self.match_char('/') => return Ok(()),
                Some(_) => {}
            }
        }
    }

    fn add_token(&mut self, kind: TokenKind, pos: LineCol) {
        self.tokens
            .push(Token::new(kind, self.start, self.position, pos));
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// Consume one character, tracking line and column
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        if c == '\n' {
            self.pos.line += 1;
            self.pos.col = 1;
        } else {
            self.pos.col += 1;
        }
        Some(c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.advance();
        }
    }

    fn skip_blanks(&mut self) {
        self.advance_while(char::is_whitespace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<TokenKind> {
        scan_tokens(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let tokens = scan_tokens("").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::EndOfFile);
        assert_eq!((tokens[0].start, tokens[0].end), (0, 0));
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            kinds("== != <= >= < > ="),
            vec![
                TokenKind::EqualEqual,
                TokenKind::NotEqual,
                TokenKind::LessThanEqual,
                TokenKind::GreaterThanEqual,
                TokenKind::LessThan,
                TokenKind::GreaterThan,
                TokenKind::Equal,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_string_range_excludes_quotes() {
        let input = r#""some string""#;
        let tokens = scan_tokens(input).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::DoubleQuotedString);
        assert_eq!(tokens[0].lexeme(input), "some string");
    }

    #[test]
    fn test_escaped_quote_does_not_terminate() {
        let input = r#""a \"quoted\" word""#;
        let tokens = scan_tokens(input).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].lexeme(input), r#"a \"quoted\" word"#);
    }

    #[test]
    fn test_unterminated_string() {
        let err = scan_tokens("\"open").unwrap_err();
        assert_eq!(err.to_string(), "Unterminated string at line 1 column 1");
    }

    #[test]
    fn test_lone_bang_and_slash() {
        assert!(scan_tokens("!").is_err());
        assert!(scan_tokens("a / b").is_err());
    }

    #[test]
    fn test_rule_indices() {
        let mut lexer = Lexer::new("rule A {} rule B {}");
        lexer.scan_tokens().unwrap();
        assert_eq!(lexer.rule_indices(), &[0, 4]);
        assert_eq!(lexer.rule_count(), 2);
    }

    #[test]
    fn test_multi_line_comment_position() {
        let mut lexer = Lexer::new("/* this is a multi-line comment\n\n\n*/");
        lexer.scan_tokens().unwrap();
        assert_eq!(lexer.position(), LineCol::new(4, 3));
        assert_eq!(lexer.tokens().len(), 1);
    }

    #[test]
    fn test_encodings_list() {
        let input = "encodings=UTF-8,UTF-16";
        let tokens = scan_tokens(input).unwrap();
        let got: Vec<_> = tokens.iter().map(|t| (t.kind, t.lexeme(input))).collect();
        assert_eq!(
            got,
            vec![
                (TokenKind::Encodings, "encodings"),
                (TokenKind::Equal, "="),
                (TokenKind::Identifier, "UTF-8"),
                (TokenKind::Comma, ","),
                (TokenKind::Identifier, "UTF-16"),
                (TokenKind::EndOfFile, ""),
            ]
        );
    }

    #[test]
    fn test_encodings_requires_equal() {
        assert!(scan_tokens("encodings UTF-8").is_err());
        assert!(scan_tokens("encodings=").is_err());
    }
}
