use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Token kinds of the rule language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Punctuation
    /// `{`
    OpenBrace,
    /// `}`
    CloseBrace,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `=`
    Equal,
    /// `==`
    EqualEqual,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,

    // Literals
    /// User-defined word
    Identifier,
    /// Contents of a `"..."` literal, without the quotes
    DoubleQuotedString,
    /// Unsigned integer literal
    Number,

    // Keywords
    /// `rule`
    Rule,
    /// `meta`
    Meta,
    /// `file_metadata`
    FileMetadata,
    /// `signature`
    Signature,
    /// `grep`
    Grep,
    /// `patterns`
    Patterns,
    /// `hash`
    Hash,
    /// `condition`
    Condition,
    /// `created`
    Created,
    /// `modified`
    Modified,
    /// `filesize`
    Filesize,
    /// `filename`
    Filename,
    /// `filepath`
    Filepath,
    /// `all`
    All,
    /// `any`
    Any,
    /// `offset`
    Offset,
    /// `count`
    Count,
    /// `count_has_hits`
    CountHasHits,
    /// `length`
    Length,
    /// `md5`
    Md5,
    /// `sha1`
    Sha1,
    /// `sha256`
    Sha256,
    /// `blake3`
    Blake3,
    /// `encodings`
    Encodings,
    /// `nocase`
    Nocase,
    /// `fixed`
    Fixed,
    /// `and`
    And,
    /// `or`
    Or,

    /// End of input
    EndOfFile,
}

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    [
        ("rule", Rule),
        ("meta", Meta),
        ("file_metadata", FileMetadata),
        ("signature", Signature),
        ("grep", Grep),
        ("patterns", Patterns),
        ("hash", Hash),
        ("condition", Condition),
        ("created", Created),
        ("modified", Modified),
        ("filesize", Filesize),
        ("filename", Filename),
        ("filepath", Filepath),
        ("all", All),
        ("any", Any),
        ("offset", Offset),
        ("count", Count),
        ("count_has_hits", CountHasHits),
        ("length", Length),
        ("md5", Md5),
        ("sha1", Sha1),
        ("sha256", Sha256),
        ("blake3", Blake3),
        ("encodings", Encodings),
        ("nocase", Nocase),
        ("fixed", Fixed),
        ("and", And),
        ("or", Or),
    ]
    .into_iter()
    .collect()
});

impl TokenKind {
    /// Look up a reserved word. Matching is exact and case-sensitive.
    pub fn from_keyword(s: &str) -> Option<TokenKind> {
        KEYWORDS.get(s).copied()
    }

    /// Whether this kind is a reserved word
    pub fn is_keyword(&self) -> bool {
        use TokenKind::*;
        !matches!(
            self,
            OpenBrace
                | CloseBrace
                | OpenParen
                | CloseParen
                | Comma
                | Colon
                | Equal
                | EqualEqual
                | NotEqual
                | LessThan
                | LessThanEqual
                | GreaterThan
                | GreaterThanEqual
                | Identifier
                | DoubleQuotedString
                | Number
                | EndOfFile
        )
    }

    /// Whether this kind is one of the six comparison operators
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            TokenKind::EqualEqual
                | TokenKind::NotEqual
                | TokenKind::LessThan
                | TokenKind::LessThanEqual
                | TokenKind::GreaterThan
                | TokenKind::GreaterThanEqual
        )
    }

    /// Fixed source text of punctuation and keywords
    pub fn literal(&self) -> &'static str {
        use TokenKind::*;
        match self {
            OpenBrace => "{",
            CloseBrace => "}",
            OpenParen => "(",
            CloseParen => ")",
            Comma => ",",
            Colon => ":",
            Equal => "=",
            EqualEqual => "==",
            NotEqual => "!=",
            LessThan => "<",
            LessThanEqual => "<=",
            GreaterThan => ">",
            GreaterThanEqual => ">=",
            Identifier | DoubleQuotedString | Number | EndOfFile => "",
            kw => KEYWORDS
                .iter()
                .find(|(_, k)| *k == kw)
                .map(|(s, _)| *s)
                .unwrap_or(""),
        }
    }
}

/// 1-based line and column of a character in the rule source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineCol {
    /// Line number, starting at 1
    pub line: u32,
    /// Column number, starting at 1
    pub col: u32,
}

impl LineCol {
    /// Create a position
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl Default for LineCol {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} column {}", self.line, self.col)
    }
}

/// A lexed token. The lexeme is recovered from the source through `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// Position of the first character
    pub pos: LineCol,
}

impl Token {
    /// Create a token
    pub fn new(kind: TokenKind, start: usize, end: usize, pos: LineCol) -> Self {
        Self {
            kind,
            start,
            end,
            pos,
        }
    }

    /// Text of this token within `source`
    pub fn lexeme<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }

    /// Length in bytes of the lexeme
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the lexeme is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
