use llama_rs::pattern::{
    compile_pattern, CompiledPattern, FsmBuilder, Hit, PatternError, PatternProgram,
};
use llama_rs::rule::PatternDef;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;

fn def(pattern: &str, encoding: &str, nocase: bool, fixed: bool) -> PatternDef {
    let mut def = PatternDef::new(pattern);
    def.encoding = encoding.to_string();
    def.options.case_insensitive = nocase;
    def.options.fixed_string = fixed;
    def
}

fn program(patterns: &[&str]) -> PatternProgram {
    program_with_window(patterns, 4096)
}

fn program_with_window(patterns: &[&str], window: usize) -> PatternProgram {
    let mut builder = FsmBuilder::new().regex_window(window);
    for (i, p) in patterns.iter().enumerate() {
        builder.add_pattern(&PatternDef::new(*p), i).unwrap();
    }
    builder.build().unwrap()
}

#[rstest]
#[case("abc", "ASCII", false, b"abc".to_vec())]
#[case("ab", "UTF-16LE", false, vec![b'a', 0, b'b', 0])]
#[case("ab", "UTF-16BE", false, vec![0, b'a', 0, b'b'])]
#[case("é", "UTF-8", false, vec![0xc3, 0xa9])]
#[case("é", "windows-1252", false, vec![0xe9])]
#[case(r"a\x41", "ASCII", false, b"aA".to_vec())]
#[case(r"\z00\zff", "UTF-16LE", false, vec![0x00, 0xff])]
#[case(r"1\.5", "ASCII", false, b"1.5".to_vec())]
#[case(r"cmd\.exe", "ASCII", false, b"cmd.exe".to_vec())]
#[case("cmd.exe", "ASCII", true, b"cmd.exe".to_vec())]
#[case(r"a.b\n", "ASCII", true, b"a.b\\n".to_vec())]
fn test_compiled_bytes(
    #[case] pattern: &str,
    #[case] encoding: &str,
    #[case] fixed: bool,
    #[case] expected: Vec<u8>,
) {
    let compiled = compile_pattern(&def(pattern, encoding, false, fixed)).unwrap();
    assert_eq!(compiled.literal_bytes(), Some(expected.as_slice()));
}

#[rstest]
#[case("fo+o", "ASCII")]
#[case(r"\d{3}-\d{4}", "ASCII")]
#[case("a.b", "UTF-8")]
#[case("(cmd|powershell)\\.exe", "UTF-16LE")]
#[case(r"[^\x00]{4}\z00", "ASCII")]
fn test_operators_compile_to_regex(#[case] pattern: &str, #[case] encoding: &str) {
    assert!(matches!(
        compile_pattern(&def(pattern, encoding, false, false)),
        Ok(CompiledPattern::Regex(_))
    ));
}

#[test]
fn test_compile_errors() {
    assert!(matches!(
        compile_pattern(&def(r"\q", "ASCII", false, false)),
        Err(PatternError::Regex { .. })
    ));
    assert!(matches!(
        compile_pattern(&def(r"ab\z4", "ASCII", false, false)),
        Err(PatternError::InvalidEscape { .. })
    ));
    assert!(matches!(
        compile_pattern(&def("é", "ASCII", false, false)),
        Err(PatternError::Unencodable { .. })
    ));
    assert!(matches!(
        compile_pattern(&def("x", "KLINGON", false, false)),
        Err(PatternError::UnknownEncoding(name)) if name == "KLINGON"
    ));
    assert!(matches!(
        compile_pattern(&def("", "ASCII", false, false)),
        Err(PatternError::Empty)
    ));
    assert!(matches!(
        compile_pattern(&def("x?", "ASCII", false, false)),
        Err(PatternError::EmptyMatch { .. })
    ));
    assert!(matches!(
        compile_pattern(&def("end$", "ASCII", false, false)),
        Err(PatternError::Regex { .. })
    ));
}

#[test]
fn test_regex_hits() {
    let prog = program(&["fo+o", r"\d{3}-\d{4}"]);
    let hits = prog.search_all(b"fooo fo foo 555-1234");
    let spans: Vec<(usize, u64, u64)> = hits
        .iter()
        .map(|h| (h.pattern_index, h.start, h.end))
        .collect();
    assert_eq!(spans, vec![(0, 0, 4), (0, 8, 11), (1, 12, 20)]);
}

#[test]
fn test_utf16_regex_hits() {
    let mut builder = FsmBuilder::new();
    builder
        .add_pattern(&def("[0-9]+x", "UTF-16LE", false, false), 0)
        .unwrap();
    builder
        .add_pattern(&def("AB.", "UTF-16BE", true, false), 1)
        .unwrap();
    let prog = builder.build().unwrap();
    let data = b"1\x002\x00x\x00 \x00a\x00b\x00c";
    let spans: Vec<(usize, u64, u64)> = prog
        .search_all(data)
        .iter()
        .map(|h| (h.pattern_index, h.start, h.end))
        .collect();
    assert_eq!(spans, vec![(0, 0, 6), (1, 7, 13)]);
}

#[test]
fn test_hits_are_ordered_and_keep_owner_index() {
    let mut builder = FsmBuilder::new();
    builder.add_pattern(&PatternDef::new("bar"), 7).unwrap();
    builder
        .add_pattern(&def("FOO", "ASCII", true, false), 3)
        .unwrap();
    let prog = builder.build().unwrap();
    assert_eq!(prog.len(), 2);
    assert_eq!(prog.max_len(), 3);

    let hits = prog.search_all(b"foo bar Foo");
    let spans: Vec<(u64, u64)> = hits.iter().map(|h| (h.start, h.end)).collect();
    assert_eq!(spans, vec![(0, 3), (4, 7), (8, 11)]);
    let owners: Vec<usize> = hits
        .iter()
        .map(|h| prog.pattern(h.pattern_index).unwrap().user_index)
        .collect();
    assert_eq!(owners, vec![3, 7, 3]);
}

#[test]
fn test_context_reuse_starts_at_zero() {
    let prog = program(&["needle"]);
    let mut ctx = prog.new_context();
    let mut first = Vec::new();
    prog.search(&mut ctx, b"..needle", |h| first.push(h));
    assert_eq!(prog.finish(&mut ctx, |h| first.push(h)), 8);

    let mut second = Vec::new();
    prog.search(&mut ctx, b"needle", |h| second.push(h));
    prog.finish(&mut ctx, |h| second.push(h));
    assert_eq!(first[0].start, 2);
    assert_eq!(second[0].start, 0);
}

fn chunked(prog: &PatternProgram, data: &[u8], cuts: &[usize]) -> Vec<Hit> {
    let mut ctx = prog.new_context();
    let mut hits = Vec::new();
    let mut at = 0;
    for &cut in cuts {
        let end = (at + cut).min(data.len());
        prog.search(&mut ctx, &data[at..end], |h| hits.push(h));
        at = end;
    }
    prog.search(&mut ctx, &data[at..], |h| hits.push(h));
    prog.finish(&mut ctx, |h| hits.push(h));
    hits.sort();
    hits
}

proptest! {
    #[test]
    fn prop_chunking_does_not_change_hits(
        data in prop::collection::vec(prop::sample::select(b"abc".to_vec()), 0..200),
        cuts in prop::collection::vec(1usize..9, 0..40),
    ) {
        let prog = program(&["ab", "abc", "cab", "bcab"]);
        let mut whole = prog.search_all(&data);
        whole.sort();
        prop_assert_eq!(chunked(&prog, &data, &cuts), whole);
    }

    #[test]
    fn prop_chunking_does_not_change_regex_hits(
        data in prop::collection::vec(prop::sample::select(b"abc".to_vec()), 0..200),
        cuts in prop::collection::vec(1usize..9, 0..40),
    ) {
        // Bounded expressions mixed with a literal
        let prog = program_with_window(&["a[bc]{2}", "(ab|ca)c", "ba?c", "cb{1,3}a", "ab"], 8);
        let mut whole = prog.search_all(&data);
        whole.sort();
        prop_assert_eq!(chunked(&prog, &data, &cuts), whole);
    }
}
