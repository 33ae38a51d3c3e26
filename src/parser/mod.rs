//! Recursive-descent parser for rule declarations
//!
//! One method per grammar production. Errors are positioned at the token
//! that broke the production. When a declaration fails, the parser records
//! the error and resumes at the next `rule` keyword found by the lexer, so a
//! single file reports every broken rule while keeping the good ones.

use crate::ast::{CompareOp, Function, FunctionCall, Node, PropertyComparison, Section, Value};
use crate::lexer::{LexError, Lexer, Token, TokenKind};
use crate::pattern::{compile_pattern, Encoding};
use crate::rule::{
    rule_id, FileHashRecord, GrepSection, HashAlgorithm, HashSection, PatternDef,
    PatternOptions, Rule, DEFAULT_ENCODING,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Parser error types
pub mod error;
/// Property and function validation tables
pub mod validate;

pub use error::ParseError;
use validate::{
    expected_property_message, function_policy, property_rule, ComparisonPolicy, ValueKind,
};

/// Maximum nesting depth of parenthesized expressions
const MAX_RECURSION_DEPTH: usize = 50;

const HASH_ALGORITHMS: [TokenKind; 4] = [
    TokenKind::Md5,
    TokenKind::Sha1,
    TokenKind::Sha256,
    TokenKind::Blake3,
];

const FUNCTIONS: [TokenKind; 6] = [
    TokenKind::All,
    TokenKind::Any,
    TokenKind::Offset,
    TokenKind::Count,
    TokenKind::CountHasHits,
    TokenKind::Length,
];

const PATTERN_MODIFIERS: [TokenKind; 3] =
    [TokenKind::Nocase, TokenKind::Fixed, TokenKind::Encodings];

/// Rules and errors from one source text
#[derive(Debug, Default)]
pub struct ParseOutput {
    /// Successfully parsed declarations, in source order
    pub rules: Vec<Rule>,
    /// One entry per failed declaration or stray token run
    pub errors: Vec<ParseError>,
}

/// Which leaves a boolean expression is built from
#[derive(Debug, Clone, Copy)]
enum ExprContext {
    Properties(Section),
    Functions,
}

/// Lex and parse `input`. A lexing error fails the whole text; parse errors
/// are collected per declaration.
pub fn parse_rules(input: &str) -> Result<ParseOutput, LexError> {
    let mut lexer = Lexer::new(input);
    lexer.scan_tokens()?;
    let (tokens, rule_indices) = lexer.into_parts();
    let mut parser = Parser::new(input, tokens);
    Ok(parser.parse_rules(&rule_indices))
}

/// Parser over a scanned token list
#[derive(Debug)]
pub struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
    declared_patterns: BTreeSet<String>,
}

impl<'a> Parser<'a> {
    /// Create a parser. `tokens` must end with an `EndOfFile` token.
    pub fn new(input: &'a str, mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::EndOfFile) {
            let (len, pos) = (input.len(), tokens.last().map(|t| t.pos).unwrap_or_default());
            tokens.push(Token::new(TokenKind::EndOfFile, len, len, pos));
        }
        Self {
            input,
            tokens,
            current: 0,
            depth: 0,
            declared_patterns: BTreeSet::new(),
        }
    }

    /// Parse every declaration, resynchronizing at the entries of
    /// `rule_indices` after an error.
    pub fn parse_rules(&mut self, rule_indices: &[usize]) -> ParseOutput {
        let mut out = ParseOutput::default();

        while !self.is_at_end() {
            let start = self.current;
            if !self.check(TokenKind::Rule) {
                out.errors
                    .push(ParseError::syntax("Expected rule keyword", self.peek().pos));
                self.resync(rule_indices, start);
                continue;
            }
            match self.parse_rule_decl() {
                Ok(rule) => {
                    debug!(rule = %rule.name, id = %rule.id, "Parsed rule");
                    out.rules.push(rule);
                }
                Err(e) => {
                    debug!(error = %e, "Rule declaration failed");
                    out.errors.push(e);
                    self.resync(rule_indices, start);
                }
            }
        }
        out
    }

    /// Jump to the first rule start after token `after`, or to end of input
    fn resync(&mut self, rule_indices: &[usize], after: usize) {
        self.current = rule_indices
            .iter()
            .copied()
            .find(|&i| i > after)
            .unwrap_or(self.tokens.len() - 1);
    }

    /// `rule := RULE IDENT '{' meta? hash? file_metadata? signature? grep? '}'`
    pub fn parse_rule_decl(&mut self) -> Result<Rule, ParseError> {
        let start = self.current;
        self.declared_patterns.clear();
        self.must_parse("Expected rule keyword", &[TokenKind::Rule])?;
        let name = self.must_parse("Expected rule name", &[TokenKind::Identifier])?;
        let name = self.lexeme(&name).to_string();
        self.must_parse("Expected open curly brace", &[TokenKind::OpenBrace])?;

        let meta = if self.check(TokenKind::Meta) {
            self.parse_meta_section()?
        } else {
            BTreeMap::new()
        };
        let hash = if self.check(TokenKind::Hash) {
            Some(self.parse_hash_section()?)
        } else {
            None
        };
        let file_metadata = if self.check(TokenKind::FileMetadata) {
            Some(self.parse_file_metadata_section()?)
        } else {
            None
        };
        let signature = if self.check(TokenKind::Signature) {
            Some(self.parse_signature_section()?)
        } else {
            None
        };
        let grep = if self.check(TokenKind::Grep) {
            Some(self.parse_grep_section()?)
        } else {
            None
        };
        self.must_parse("Expected close curly brace", &[TokenKind::CloseBrace])?;

        let span = start..self.current;
        let id = rule_id(self.tokens[span.clone()].iter().map(|t| t.lexeme(self.input)));
        Ok(Rule {
            name,
            id,
            meta,
            hash,
            file_metadata,
            signature,
            grep,
            token_span: span,
        })
    }

    /// `meta := META ':' (IDENT '=' STRING)*`
    pub fn parse_meta_section(&mut self) -> Result<BTreeMap<String, String>, ParseError> {
        self.must_parse("Expected meta keyword", &[TokenKind::Meta])?;
        self.must_parse("Expected colon after meta keyword", &[TokenKind::Colon])?;
        let mut fields = BTreeMap::new();
        while self.match_any(&[TokenKind::Identifier]) {
            let key = self.lexeme(&self.previous()).to_string();
            self.must_parse("Expected equal sign", &[TokenKind::Equal])?;
            let value =
                self.must_parse("Expected double quoted string", &[TokenKind::DoubleQuotedString])?;
            fields.insert(key, self.lexeme(&value).to_string());
        }
        Ok(fields)
    }

    /// `hash := HASH ':' fileHashRecord+`
    pub fn parse_hash_section(&mut self) -> Result<HashSection, ParseError> {
        self.must_parse("Expected hash keyword", &[TokenKind::Hash])?;
        self.must_parse("Expected colon after hash keyword", &[TokenKind::Colon])?;
        let mut section = HashSection::default();
        while self.check_any(&HASH_ALGORITHMS) {
            let record = self.parse_file_hash_record()?;
            section.algorithms.extend(record.digests.keys().copied());
            section.records.push(record);
        }
        if section.records.is_empty() {
            return Err(ParseError::validation("Expected hash type", self.peek().pos));
        }
        Ok(section)
    }

    /// `fileHashRecord := hashAlg '==' STRING (',' hashAlg '==' STRING)*`
    pub fn parse_file_hash_record(&mut self) -> Result<FileHashRecord, ParseError> {
        let mut record = FileHashRecord::default();
        loop {
            let alg_token = self.peek();
            let alg = self.parse_hash_algorithm()?;
            self.must_parse("Expected equal sign", &[TokenKind::EqualEqual])?;
            let digest =
                self.must_parse("Expected double quoted string", &[TokenKind::DoubleQuotedString])?;
            if record.digests.contains_key(&alg) {
                return Err(ParseError::validation("Duplicate hash type", alg_token.pos));
            }
            record
                .digests
                .insert(alg, self.lexeme(&digest).to_ascii_lowercase());
            if !self.match_any(&[TokenKind::Comma]) {
                return Ok(record);
            }
        }
    }

    fn parse_hash_algorithm(&mut self) -> Result<HashAlgorithm, ParseError> {
        let token = self.must_parse("Expected hash type", &HASH_ALGORITHMS)?;
        Ok(match token.kind {
            TokenKind::Md5 => HashAlgorithm::Md5,
            TokenKind::Sha1 => HashAlgorithm::Sha1,
            TokenKind::Sha256 => HashAlgorithm::Sha256,
            _ => HashAlgorithm::Blake3,
        })
    }

    /// `file_metadata := FILE_METADATA ':' expr`
    pub fn parse_file_metadata_section(&mut self) -> Result<Node, ParseError> {
        self.must_parse("Expected file_metadata keyword", &[TokenKind::FileMetadata])?;
        self.must_parse("Expected colon after file_metadata keyword", &[TokenKind::Colon])?;
        self.parse_expr(ExprContext::Properties(Section::FileMetadata))
    }

    /// `signature := SIGNATURE ':' expr`
    pub fn parse_signature_section(&mut self) -> Result<Node, ParseError> {
        self.must_parse("Expected signature keyword", &[TokenKind::Signature])?;
        self.must_parse("Expected colon after signature keyword", &[TokenKind::Colon])?;
        self.parse_expr(ExprContext::Properties(Section::Signature))
    }

    /// `grep := GREP ':' PATTERNS ':' patternDef+ CONDITION ':' expr`
    pub fn parse_grep_section(&mut self) -> Result<GrepSection, ParseError> {
        self.must_parse("Expected grep keyword", &[TokenKind::Grep])?;
        self.must_parse("Expected colon after grep keyword", &[TokenKind::Colon])?;
        let patterns = self.parse_patterns_section()?;
        self.must_parse("Expected condition keyword", &[TokenKind::Condition])?;
        self.must_parse("Expected colon after condition keyword", &[TokenKind::Colon])?;
        let condition = self.parse_expr(ExprContext::Functions)?;
        Ok(GrepSection {
            patterns,
            condition,
        })
    }

    /// `PATTERNS ':' (IDENT '=' patternDef)+`
    pub fn parse_patterns_section(
        &mut self,
    ) -> Result<BTreeMap<String, Vec<PatternDef>>, ParseError> {
        self.must_parse("Expected patterns keyword", &[TokenKind::Patterns])?;
        self.must_parse("Expected colon after patterns keyword", &[TokenKind::Colon])?;
        let mut patterns = BTreeMap::new();
        while self.match_any(&[TokenKind::Identifier]) {
            let name_token = self.previous();
            let name = self.lexeme(&name_token).to_string();
            let defs = self.parse_pattern_def()?;
            if patterns.contains_key(&name) {
                return Err(ParseError::validation(
                    format!("Duplicate pattern name {}", name),
                    name_token.pos,
                ));
            }
            self.declared_patterns.insert(name.clone());
            patterns.insert(name, defs);
        }
        if patterns.is_empty() {
            return Err(ParseError::syntax(
                "Expected pattern definition",
                self.peek().pos,
            ));
        }
        Ok(patterns)
    }

    /// `'=' (STRING patternMods? | '{' hexBytes '}')`
    pub fn parse_pattern_def(&mut self) -> Result<Vec<PatternDef>, ParseError> {
        self.must_parse("Expected equal sign", &[TokenKind::Equal])?;
        if self.match_any(&[TokenKind::DoubleQuotedString]) {
            self.parse_pattern_mods()
        } else if self.match_any(&[TokenKind::OpenBrace]) {
            let pos = self.previous().pos;
            let def = PatternDef::new(self.parse_hex_string()?);
            self.check_compiles(&def, pos)?;
            Ok(vec![def])
        } else {
            Err(ParseError::syntax(
                "Expected double quoted string or hex string",
                self.peek().pos,
            ))
        }
    }

    /// Modifiers after the pattern string just consumed, in any order
    fn parse_pattern_mods(&mut self) -> Result<Vec<PatternDef>, ParseError> {
        let pattern_token = self.previous();
        let pattern = self.lexeme(&pattern_token).to_string();
        let mut options = PatternOptions::default();
        let mut encodings: Vec<String> = Vec::new();

        while self.check_any(&PATTERN_MODIFIERS) {
            let modifier = self.advance();
            match modifier.kind {
                TokenKind::Nocase => options.case_insensitive = true,
                TokenKind::Fixed => options.fixed_string = true,
                // A later `encodings=` replaces an earlier one
                _ => encodings = self.parse_encodings()?,
            }
        }
        if encodings.is_empty() {
            encodings.push(DEFAULT_ENCODING.to_string());
        }

        let defs: Vec<PatternDef> = encodings
            .into_iter()
            .map(|encoding| PatternDef {
                pattern: pattern.clone(),
                options,
                encoding,
            })
            .collect();
        for def in &defs {
            self.check_compiles(def, pattern_token.pos)?;
        }
        Ok(defs)
    }

    /// `'=' IDENT (',' IDENT)*` after `encodings`
    fn parse_encodings(&mut self) -> Result<Vec<String>, ParseError> {
        self.must_parse(
            "Expected equal sign after encodings keyword",
            &[TokenKind::Equal],
        )?;
        let mut encodings = Vec::new();
        loop {
            let token = self.must_parse("Expected encoding", &[TokenKind::Identifier])?;
            let name = self.lexeme(&token);
            if Encoding::from_label(name).is_none() {
                return Err(ParseError::validation(
                    format!("Unknown encoding {}", name),
                    token.pos,
                ));
            }
            encodings.push(name.to_string());
            if !self.match_any(&[TokenKind::Comma]) {
                return Ok(encodings);
            }
        }
    }

    /// Hex digits up to the closing brace, as `\zXY` byte escapes.
    /// Digits may be split across number and identifier tokens (`9f` lexes
    /// as `9` then `f`).
    pub fn parse_hex_string(&mut self) -> Result<String, ParseError> {
        let mut digits = String::new();
        while !self.check(TokenKind::CloseBrace) && !self.is_at_end() {
            if self.match_any(&[TokenKind::Identifier, TokenKind::Number]) {
                let token = self.previous();
                let text = self.lexeme(&token);
                if !text.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(ParseError::validation("Invalid hex digit", token.pos));
                }
                digits.push_str(text);
            } else {
                return Err(ParseError::syntax("Expected hex digit", self.peek().pos));
            }
        }
        if self.is_at_end() {
            return Err(ParseError::syntax("Unterminated hex string", self.peek().pos));
        }
        if digits.len() % 2 == 1 {
            return Err(ParseError::validation("Odd number of hex digits", self.peek().pos));
        }
        if digits.is_empty() {
            return Err(ParseError::validation("Empty hex string", self.peek().pos));
        }
        self.must_parse("Expected close brace", &[TokenKind::CloseBrace])?;

        let mut pattern = String::with_capacity(digits.len() * 2);
        for pair in digits.as_bytes().chunks(2) {
            pattern.push_str("\\z");
            pattern.push(pair[0] as char);
            pattern.push(pair[1] as char);
        }
        Ok(pattern)
    }

    fn check_compiles(&self, def: &PatternDef, pos: crate::lexer::LineCol) -> Result<(), ParseError> {
        compile_pattern(def)
            .map(|_| ())
            .map_err(|e| ParseError::validation(e.to_string(), pos))
    }

    /// `expr := term (OR term)*`
    fn parse_expr(&mut self, ctx: ExprContext) -> Result<Node, ParseError> {
        let mut left = self.parse_term(ctx)?;
        while self.match_any(&[TokenKind::Or]) {
            let right = self.parse_term(ctx)?;
            left = Node::or(left, right);
        }
        Ok(left)
    }

    /// `term := factor (AND factor)*`
    fn parse_term(&mut self, ctx: ExprContext) -> Result<Node, ParseError> {
        let mut left = self.parse_factor(ctx)?;
        while self.match_any(&[TokenKind::And]) {
            let right = self.parse_factor(ctx)?;
            left = Node::and(left, right);
        }
        Ok(left)
    }

    /// `factor := '(' expr ')' | leaf`
    fn parse_factor(&mut self, ctx: ExprContext) -> Result<Node, ParseError> {
        if self.match_any(&[TokenKind::OpenParen]) {
            if self.depth >= MAX_RECURSION_DEPTH {
                return Err(ParseError::validation(
                    "Expression nested too deeply",
                    self.previous().pos,
                ));
            }
            self.depth += 1;
            let node = self.parse_expr(ctx);
            self.depth -= 1;
            let node = node?;
            self.must_parse("Expected close parenthesis", &[TokenKind::CloseParen])?;
            return Ok(node);
        }
        match ctx {
            ExprContext::Properties(section) => self.parse_property_comparison(section),
            ExprContext::Functions => self.parse_func_call().map(Node::Function),
        }
    }

    /// `property compareOp (STRING | NUMBER)`, checked against the section's table
    fn parse_property_comparison(&mut self, section: Section) -> Result<Node, ParseError> {
        let token = self.peek();
        let named = token.kind == TokenKind::Identifier || token.kind.is_keyword();
        let rule = named
            .then(|| property_rule(section, self.lexeme(&token)))
            .flatten()
            .ok_or_else(|| ParseError::syntax(expected_property_message(section), token.pos))?;
        self.advance();

        let op_token = self.peek();
        let op = self.parse_operator()?;
        if !rule.allows(op) {
            return Err(ParseError::validation(
                format!(
                    "Operator {} is not supported for {}",
                    op,
                    self.lexeme(&token)
                ),
                op_token.pos,
            ));
        }

        let value = match rule.value {
            ValueKind::String => {
                let v = self.must_parse(
                    "Expected double quoted string",
                    &[TokenKind::DoubleQuotedString],
                )?;
                Value::String(self.lexeme(&v).to_string())
            }
            ValueKind::Number => Value::Number(self.parse_number()?),
        };
        Ok(Node::Property(PropertyComparison {
            property: rule.property,
            op,
            value,
        }))
    }

    fn parse_operator(&mut self) -> Result<CompareOp, ParseError> {
        let token = self.peek();
        match CompareOp::from_token(token.kind) {
            Some(op) => {
                self.advance();
                Ok(op)
            }
            None => Err(ParseError::syntax("Expected operator", token.pos)),
        }
    }

    fn parse_number(&mut self) -> Result<u64, ParseError> {
        let token = self.must_parse("Expected number", &[TokenKind::Number])?;
        self.lexeme(&token)
            .parse()
            .map_err(|_| ParseError::validation("Number out of range", token.pos))
    }

    /// `function '(' (arg (',' arg)*)? ')' (compareOp NUMBER)?`
    fn parse_func_call(&mut self) -> Result<FunctionCall, ParseError> {
        let name_token = self.must_parse("Expected function name", &FUNCTIONS)?;
        let function = Function::from_token(name_token.kind)
            .ok_or_else(|| ParseError::syntax("Expected function name", name_token.pos))?;
        self.must_parse("Expected open parenthesis", &[TokenKind::OpenParen])?;

        let mut args = Vec::new();
        if !self.check(TokenKind::CloseParen) {
            loop {
                args.push(self.must_parse(
                    "Expected identifier or number",
                    &[TokenKind::Identifier, TokenKind::Number],
                )?);
                if !self.match_any(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.must_parse("Expected close parenthesis", &[TokenKind::CloseParen])?;

        let comparison = if self.peek().kind.is_comparison() {
            let op = self.parse_operator()?;
            Some((op, self.parse_number()?))
        } else {
            None
        };

        let policy = function_policy(function);
        if !policy.accepts_arity(args.len()) {
            return Err(ParseError::validation(
                format!("Wrong number of arguments to {}", function.name()),
                name_token.pos,
            ));
        }
        match (policy.comparison, comparison.is_some()) {
            (ComparisonPolicy::Required, false) => {
                return Err(ParseError::validation(
                    format!("Expected comparison after {}", function.name()),
                    self.peek().pos,
                ))
            }
            (ComparisonPolicy::Forbidden, true) => {
                return Err(ParseError::validation(
                    format!("Unexpected comparison after {}", function.name()),
                    name_token.pos,
                ))
            }
            _ => {}
        }

        let mut patterns = Vec::new();
        let mut hit_index = None;
        for (i, arg) in args.iter().enumerate() {
            let text = self.lexeme(arg);
            if policy.hit_index && i == 1 {
                if arg.kind != TokenKind::Number {
                    return Err(ParseError::validation("Expected hit index", arg.pos));
                }
                let index = text
                    .parse()
                    .map_err(|_| ParseError::validation("Number out of range", arg.pos))?;
                hit_index = Some(index);
            } else if arg.kind != TokenKind::Identifier {
                return Err(ParseError::validation("Expected pattern name", arg.pos));
            } else if !self.declared_patterns.contains(text) {
                return Err(ParseError::validation(
                    format!("Unknown pattern {}", text),
                    arg.pos,
                ));
            } else {
                patterns.push(text.to_string());
            }
        }

        Ok(FunctionCall {
            function,
            patterns,
            hit_index,
            comparison,
        })
    }

    fn lexeme(&self, token: &Token) -> &'a str {
        token.lexeme(self.input)
    }

    fn peek(&self) -> Token {
        self.tokens[self.current]
    }

    fn previous(&self) -> Token {
        self.tokens[self.current.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::EndOfFile
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.peek().kind)
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> bool {
        if self.check_any(kinds) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn must_parse(&mut self, message: &str, kinds: &[TokenKind]) -> Result<Token, ParseError> {
        if self.check_any(kinds) {
            Ok(self.advance())
        } else {
            Err(ParseError::syntax(message, self.peek().pos))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Property;
    use crate::lexer::{scan_tokens, LineCol};
    use pretty_assertions::assert_eq;

    fn parser(input: &str) -> Parser<'_> {
        Parser::new(input, scan_tokens(input).unwrap())
    }

    #[test]
    fn test_empty_rule() {
        let rule = parser("rule MyRule {}").parse_rule_decl().unwrap();
        assert_eq!(rule.name, "MyRule");
        assert!(rule.is_unconditional());
        assert_eq!(rule.token_span, 0..4);
    }

    #[test]
    fn test_missing_rule_name() {
        let err = parser("rule {}").parse_rule_decl().unwrap_err();
        assert_eq!(err.to_string(), "Expected rule name at line 1 column 6");
    }

    #[test]
    fn test_meta_section() {
        let input = "meta:\n  description = \"this is my rule\"\n  author = \"me\"";
        let meta = parser(input).parse_meta_section().unwrap();
        assert_eq!(meta.get("description").map(String::as_str), Some("this is my rule"));
        assert_eq!(meta.get("author").map(String::as_str), Some("me"));
    }

    #[test]
    fn test_hash_section_records() {
        let input = r#"hash:
            md5 == "ABC", sha1 == "def"
            sha256 == "0123""#;
        let section = parser(input).parse_hash_section().unwrap();
        assert_eq!(section.records.len(), 2);
        assert_eq!(
            section.records[0].digests.get(&HashAlgorithm::Md5).map(String::as_str),
            Some("abc")
        );
        assert_eq!(section.algorithms.len(), 3);
    }

    #[test]
    fn test_duplicate_hash_type() {
        let err = parser(r#"hash: md5 == "abc", md5 == "def""#)
            .parse_hash_section()
            .unwrap_err();
        assert_eq!(err.message(), "Duplicate hash type");
        assert_eq!(err.pos(), LineCol::new(1, 21));
    }

    #[test]
    fn test_empty_hash_section() {
        let err = parser("hash: }").parse_hash_section().unwrap_err();
        assert_eq!(err.message(), "Expected hash type");
    }

    #[test]
    fn test_hex_string() {
        let mut p = parser("{ 34 56 78 9f }");
        p.advance();
        assert_eq!(p.parse_hex_string().unwrap(), r"\z34\z56\z78\z9f");
    }

    #[test]
    fn test_bad_hex_strings() {
        for (input, message) in [
            ("{ 5 }", "Odd number of hex digits"),
            ("{ }", "Empty hex string"),
            ("{ 4g }", "Invalid hex digit"),
            ("{ 41 42", "Unterminated hex string"),
            ("{ 41 \"x\" }", "Expected hex digit"),
        ] {
            let mut p = parser(input);
            p.advance();
            assert_eq!(p.parse_hex_string().unwrap_err().message(), message, "{}", input);
        }
    }

    #[test]
    fn test_pattern_modifiers_any_order() {
        let input = r#"patterns: a = "test" encodings=UTF-8,UTF-16LE nocase fixed"#;
        let patterns = parser(input).parse_patterns_section().unwrap();
        let defs = &patterns["a"];
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].encoding, "UTF-8");
        assert_eq!(defs[1].encoding, "UTF-16LE");
        assert!(defs.iter().all(|d| d.options.case_insensitive && d.options.fixed_string));
    }

    #[test]
    fn test_duplicate_pattern_name() {
        let input = r#"patterns: a = "x" a = "y""#;
        let err = parser(input).parse_patterns_section().unwrap_err();
        assert!(err.message().starts_with("Duplicate pattern name"));
    }

    #[test]
    fn test_file_metadata_precedence() {
        let input = r#"file_metadata: filesize == 1 or filesize == 2 and filesize == 3"#;
        let node = parser(input).parse_file_metadata_section().unwrap();
        match node {
            Node::Or(_, right) => assert!(matches!(*right, Node::And(_, _))),
            other => panic!("expected OR at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_property_validation() {
        let cases = [
            (r#"file_metadata: filename < "a""#, "Operator < is not supported for filename"),
            (r#"file_metadata: filesize == "a""#, "Expected number"),
            (r#"file_metadata: created == 5"#, "Expected double quoted string"),
            (r#"file_metadata: name == "a""#, "Expected created, modified, filesize, filename, or filepath"),
        ];
        for (input, message) in cases {
            let err = parser(input).parse_file_metadata_section().unwrap_err();
            assert_eq!(err.message(), message, "{}", input);
        }
    }

    #[test]
    fn test_signature_properties() {
        let node = parser(r#"signature: name == "PDF" or id == "125""#)
            .parse_signature_section()
            .unwrap();
        let mut props = Vec::new();
        node.for_each_leaf(&mut |leaf| {
            if let crate::ast::Leaf::Property(p) = leaf {
                props.push(p.property);
            }
        });
        assert_eq!(props, vec![Property::SignatureName, Property::SignatureId]);
    }

    #[test]
    fn test_grep_functions() {
        let input = r#"grep: patterns: a = "x" b = "y"
            condition: all(a, b) and (count(a) > 2 or offset(b, 1) == 40) and count_has_hits() >= 1"#;
        let grep = parser(input).parse_grep_section().unwrap();
        assert_eq!(grep.patterns.len(), 2);
        let mut calls = Vec::new();
        grep.condition.for_each_leaf(&mut |leaf| {
            if let crate::ast::Leaf::Function(f) = leaf {
                calls.push(f.clone());
            }
        });
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[2].function, Function::Offset);
        assert_eq!(calls[2].hit_index, Some(1));
        assert_eq!(calls[2].comparison, Some((CompareOp::Eq, 40)));
    }

    #[test]
    fn test_function_policy_errors() {
        let cases = [
            ("all(a) > 1", "Unexpected comparison after all"),
            ("count(a)", "Expected comparison after count"),
            ("count() > 1", "Wrong number of arguments to count"),
            ("offset(a, b) == 1", "Expected hit index"),
            ("any(zzz)", "Unknown pattern zzz"),
        ];
        for (cond, message) in cases {
            let input = format!("grep: patterns: a = \"x\" b = \"y\" condition: {}", cond);
            let err = parser(&input).parse_grep_section().unwrap_err();
            assert_eq!(err.message(), message, "{}", cond);
        }
    }

    #[test]
    fn test_regex_patterns() {
        let patterns = parser(r#"patterns: a = "fo+o" b = "\d{3}-\d{4}" c = "cmd.exe" fixed"#)
            .parse_patterns_section()
            .unwrap();
        assert_eq!(patterns["b"][0].pattern, r"\d{3}-\d{4}");
        assert!(patterns["c"][0].options.fixed_string);

        let err = parser(r#"patterns: a = "(unclosed""#)
            .parse_patterns_section()
            .unwrap_err();
        assert!(matches!(err, ParseError::Validation { .. }));
        let err = parser(r#"patterns: a = "x*""#)
            .parse_patterns_section()
            .unwrap_err();
        assert!(err.message().contains("matches the empty string"));
    }

    #[test]
    fn test_last_encodings_modifier_wins() {
        let patterns = parser(r#"patterns: a = "x" encodings=UTF-8,UTF-16LE nocase encodings=UTF-16BE"#)
            .parse_patterns_section()
            .unwrap();
        let encodings: Vec<&str> = patterns["a"].iter().map(|d| d.encoding.as_str()).collect();
        assert_eq!(encodings, vec!["UTF-16BE"]);
        assert!(patterns["a"][0].options.case_insensitive);
    }

    #[test]
    fn test_section_order_is_strict() {
        let input = r#"rule A { file_metadata: filesize == 1 hash: md5 == "a" }"#;
        let err = parser(input).parse_rule_decl().unwrap_err();
        assert_eq!(err.message(), "Expected close curly brace");
    }

    #[test]
    fn test_recovery_keeps_good_rules() {
        let out = parse_rules("rule Good {}\nrule {}\nrule AlsoGood {}").unwrap();
        assert_eq!(out.rules.len(), 2);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].pos(), LineCol::new(2, 6));
    }

    #[test]
    fn test_stray_tokens_between_rules() {
        let out = parse_rules("rule A {} junk junk rule B {}").unwrap();
        assert_eq!(out.rules.len(), 2);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].message(), "Expected rule keyword");
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let mut input = String::from("file_metadata: ");
        input.push_str(&"(".repeat(60));
        input.push_str("filesize == 1");
        input.push_str(&")".repeat(60));
        let err = parser(&input).parse_file_metadata_section().unwrap_err();
        assert_eq!(err.message(), "Expression nested too deeply");
    }
}
