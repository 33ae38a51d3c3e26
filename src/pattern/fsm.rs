//! Combined multi-pattern program and streaming search

use super::{compile_pattern, CompiledPattern, PatternError};
use crate::rule::PatternDef;
use aho_corasick::{AhoCorasick, MatchKind};
use regex::bytes::Regex;
use tracing::debug;

/// Default cap on how far a regex match may extend past a chunk boundary
pub const DEFAULT_REGEX_WINDOW: usize = 4096;

/// Bytes kept before the committed point so look-around sees its context
const LOOK_BEHIND: usize = 4;

/// A pattern as registered in a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternInfo {
    /// Caller-supplied index, typically into a rule/pattern table
    pub user_index: usize,
    /// Pattern text as written
    pub pattern: String,
    /// Encoding name as written
    pub encoding: String,
    /// Longest match in bytes. For unbounded regular expressions this is
    /// the program's regex window.
    pub len: usize,
}

/// A match reported by a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Hit {
    /// Absolute offset one past the last matched byte
    pub end: u64,
    /// Absolute offset of the first matched byte
    pub start: u64,
    /// Program pattern index
    pub pattern_index: usize,
}

impl Hit {
    /// Number of matched bytes
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the hit is empty
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Collects patterns for one program
#[derive(Debug)]
pub struct FsmBuilder {
    sensitive: Vec<(Vec<u8>, usize)>,
    insensitive: Vec<(Vec<u8>, usize)>,
    regexes: Vec<(Regex, Option<usize>, usize)>,
    patterns: Vec<PatternInfo>,
    regex_window: usize,
}

impl Default for FsmBuilder {
    fn default() -> Self {
        Self {
            sensitive: Vec::new(),
            insensitive: Vec::new(),
            regexes: Vec::new(),
            patterns: Vec::new(),
            regex_window: DEFAULT_REGEX_WINDOW,
        }
    }
}

impl FsmBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Longest regex match guaranteed to be found across chunk boundaries.
    /// Matches of unbounded expressions longer than this may be cut short.
    pub fn regex_window(mut self, bytes: usize) -> Self {
        self.regex_window = bytes.max(1);
        self
    }

    /// Compile `def` and add it. Returns the program pattern index, which is
    /// assigned in insertion order.
    pub fn add_pattern(&mut self, def: &PatternDef, user_index: usize) -> Result<usize, PatternError> {
        let index = self.patterns.len();
        let len = match compile_pattern(def)? {
            CompiledPattern::Literal(lit) => {
                let len = lit.bytes.len();
                if lit.case_insensitive {
                    self.insensitive.push((lit.bytes, index));
                } else {
                    self.sensitive.push((lit.bytes, index));
                }
                len
            }
            CompiledPattern::Regex(re) => {
                let len = re.max_len.unwrap_or(self.regex_window).min(self.regex_window);
                self.regexes.push((re.regex, re.max_len, index));
                len
            }
        };
        self.patterns.push(PatternInfo {
            user_index,
            pattern: def.pattern.clone(),
            encoding: def.encoding.clone(),
            len,
        });
        Ok(index)
    }

    /// Number of patterns added
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no pattern was added
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Build the immutable program
    pub fn build(self) -> Result<PatternProgram, PatternError> {
        let max_len = self.patterns.iter().map(|p| p.len).max().unwrap_or(0);
        let literal_len = self
            .sensitive
            .iter()
            .chain(&self.insensitive)
            .map(|(bytes, _)| bytes.len())
            .max()
            .unwrap_or(0);
        let window = self.regex_window;
        let overlap = self
            .regexes
            .iter()
            .map(|(_, max, _)| max.unwrap_or(window).min(window))
            .max()
            .unwrap_or(0);
        let sensitive = Automaton::build(self.sensitive, false)?;
        let insensitive = Automaton::build(self.insensitive, true)?;
        let regexes: Vec<RegexMatcher> = self
            .regexes
            .into_iter()
            .map(|(regex, _, index)| RegexMatcher { regex, index })
            .collect();
        debug!(
            patterns = self.patterns.len(),
            regexes = regexes.len(),
            max_len,
            overlap,
            "Built pattern program"
        );
        Ok(PatternProgram {
            automata: sensitive.into_iter().chain(insensitive).collect(),
            regexes,
            patterns: self.patterns,
            max_len,
            literal_len,
            overlap,
        })
    }
}

#[derive(Debug)]
struct RegexMatcher {
    regex: Regex,
    /// Program pattern index
    index: usize,
}

#[derive(Debug)]
struct Automaton {
    ac: AhoCorasick,
    /// Automaton pattern id to program pattern index
    indices: Vec<usize>,
}

impl Automaton {
    fn build(
        patterns: Vec<(Vec<u8>, usize)>,
        case_insensitive: bool,
    ) -> Result<Option<Self>, PatternError> {
        if patterns.is_empty() {
            return Ok(None);
        }
        let (bytes, indices): (Vec<Vec<u8>>, Vec<usize>) = patterns.into_iter().unzip();
        let ac = AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .ascii_case_insensitive(case_insensitive)
            .build(&bytes)
            .map_err(|e| PatternError::Build(e.to_string()))?;
        Ok(Some(Self { ac, indices }))
    }
}

/// Compiled, read-only search program. Share it between threads; give each
/// search its own `SearchContext`.
#[derive(Debug)]
pub struct PatternProgram {
    automata: Vec<Automaton>,
    regexes: Vec<RegexMatcher>,
    patterns: Vec<PatternInfo>,
    max_len: usize,
    /// Longest literal, sizes the automaton tail
    literal_len: usize,
    /// Bytes held back so regex matches can complete in a later chunk
    overlap: usize,
}

impl PatternProgram {
    /// Program with no patterns
    pub fn empty() -> Self {
        Self {
            automata: Vec::new(),
            regexes: Vec::new(),
            patterns: Vec::new(),
            max_len: 0,
            literal_len: 0,
            overlap: 0,
        }
    }

    /// Registered pattern by program index
    pub fn pattern(&self, index: usize) -> Option<&PatternInfo> {
        self.patterns.get(index)
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the program has no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Longest possible match in bytes
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Fresh context for one stream
    pub fn new_context(&self) -> SearchContext {
        SearchContext::default()
    }

    /// Feed the next chunk of a stream, with offsets absolute within the
    /// stream. Literal hits are reported when their last byte arrives and
    /// regex hits once enough data follows them; `finish` reports the rest.
    /// Every hit is reported exactly once.
    pub fn search<F>(&self, ctx: &mut SearchContext, chunk: &[u8], mut on_hit: F)
    where
        F: FnMut(Hit),
    {
        if chunk.is_empty() {
            return;
        }
        ctx.hits.clear();
        if !self.automata.is_empty() {
            self.search_literals(ctx, chunk);
        }
        if !self.regexes.is_empty() {
            ctx.pending.extend_from_slice(chunk);
            if ctx.pending.len() > self.overlap {
                let committed = ctx.pending.len() - self.overlap;
                self.search_regexes(ctx, committed);
            }
        }
        ctx.offset += chunk.len() as u64;

        ctx.hits.sort_unstable();
        for hit in ctx.hits.drain(..) {
            on_hit(hit);
        }
    }

    fn search_literals(&self, ctx: &mut SearchContext, chunk: &[u8]) {
        let carried = ctx.tail.len();
        ctx.buf.clear();
        ctx.buf.extend_from_slice(&ctx.tail);
        ctx.buf.extend_from_slice(chunk);
        let base = ctx.offset - carried as u64;

        for automaton in &self.automata {
            for m in automaton.ac.find_overlapping_iter(&ctx.buf) {
                // Hits ending inside the carried tail were reported last time
                if m.end() > carried {
                    ctx.hits.push(Hit {
                        start: base + m.start() as u64,
                        end: base + m.end() as u64,
                        pattern_index: automaton.indices[m.pattern().as_usize()],
                    });
                }
            }
        }

        let keep = self.literal_len.saturating_sub(1).min(ctx.buf.len());
        ctx.tail.clear();
        ctx.tail
            .extend_from_slice(&ctx.buf[ctx.buf.len() - keep..]);
    }

    /// Report regex matches starting before `committed` (relative to the
    /// pending buffer), then drop the pending bytes no longer needed.
    fn search_regexes(&self, ctx: &mut SearchContext, committed: usize) {
        if ctx.next_start.len() != self.regexes.len() {
            ctx.next_start = vec![ctx.pending_base; self.regexes.len()];
        }
        let base = ctx.pending_base;
        for (matcher, next) in self.regexes.iter().zip(ctx.next_start.iter_mut()) {
            let mut pos = (*next - base) as usize;
            while pos < committed {
                let Some(m) = matcher.regex.find_at(&ctx.pending, pos) else {
                    break;
                };
                if m.start() >= committed {
                    break;
                }
                ctx.hits.push(Hit {
                    start: base + m.start() as u64,
                    end: base + m.end() as u64,
                    pattern_index: matcher.index,
                });
                pos = m.end();
            }
            *next = base + pos.max(committed) as u64;
        }

        let drop = committed.saturating_sub(LOOK_BEHIND);
        ctx.pending.drain(..drop);
        ctx.pending_base += drop as u64;
    }

    /// End the stream: report regex matches still held back, return the
    /// number of bytes searched and reset the context for reuse.
    pub fn finish<F>(&self, ctx: &mut SearchContext, mut on_hit: F) -> u64
    where
        F: FnMut(Hit),
    {
        if !self.regexes.is_empty() && !ctx.pending.is_empty() {
            ctx.hits.clear();
            let committed = ctx.pending.len();
            self.search_regexes(ctx, committed);
            ctx.hits.sort_unstable();
            for hit in ctx.hits.drain(..) {
                on_hit(hit);
            }
        }
        let searched = ctx.offset;
        ctx.reset();
        searched
    }

    /// Search a complete buffer
    pub fn search_all(&self, data: &[u8]) -> Vec<Hit> {
        let mut ctx = self.new_context();
        let mut hits = Vec::new();
        self.search(&mut ctx, data, |h| hits.push(h));
        self.finish(&mut ctx, |h| hits.push(h));
        hits
    }
}

/// Per-stream search state
#[derive(Debug, Default)]
pub struct SearchContext {
    tail: Vec<u8>,
    buf: Vec<u8>,
    hits: Vec<Hit>,
    offset: u64,
    /// Bytes not yet committed to regex search, plus look-behind context
    pending: Vec<u8>,
    /// Stream offset of `pending[0]`
    pending_base: u64,
    /// Per regex, the stream offset its next search starts from
    next_start: Vec<u64>,
}

impl SearchContext {
    /// Forget the current stream
    pub fn reset(&mut self) {
        self.tail.clear();
        self.buf.clear();
        self.hits.clear();
        self.offset = 0;
        self.pending.clear();
        self.pending_base = 0;
        self.next_start.clear();
    }

    /// Bytes fed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }
}
