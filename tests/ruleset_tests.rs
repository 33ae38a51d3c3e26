use llama_rs::{LlamaBuilder, LlamaError, RuleSet};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

fn rule_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, text) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }
    dir
}

#[test]
fn test_directory_collects_all_errors() {
    let dir = rule_dir(&[
        ("a.llama", "rule A {}\nrule {}\nrule C {}"),
        ("b.llama", "rule B { ! }"),
        ("nested/c.llama", "rule D { file_metadata: filesize > 10 }"),
    ]);
    let mut set = RuleSet::new();
    let clean = set.read_dir(dir.path()).unwrap();
    assert!(!clean);

    let names: Vec<&str> = set.rules().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["A", "C", "D"]);
    assert_eq!(set.source_count(), 3);

    let errors: Vec<String> = set.errors().iter().map(|e| e.message.clone()).collect();
    assert_eq!(
        errors,
        vec![
            "Expected rule name at line 2 column 6".to_string(),
            "Unexpected input character: ! at line 1 column 10".to_string(),
        ]
    );
    assert!(set.errors()[0].source_name.ends_with("a.llama"));
    assert!(set.errors()[1].source_name.ends_with("b.llama"));
}

#[test]
fn test_single_file_path() {
    let dir = rule_dir(&[("only.llama", "rule Only {}")]);
    let mut set = RuleSet::new();
    assert!(set.read_path(dir.path().join("only.llama")).unwrap());
    assert_eq!(set.len(), 1);
    assert!(set.check().is_ok());
}

#[test]
fn test_non_utf8_file_is_a_rule_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bin.llama"), [0xff, 0xfe, 0x00]).unwrap();
    let mut set = RuleSet::new();
    assert!(!set.read_dir(dir.path()).unwrap());
    assert_eq!(set.errors().len(), 1);
    assert!(set.is_empty());
}

#[test]
fn test_builder_strictness() {
    let dir = rule_dir(&[("a.llama", "rule A {}"), ("b.llama", "rule {}")]);

    let lenient = LlamaBuilder::new()
        .add_rule_path(dir.path())
        .worker_threads(1)
        .build()
        .unwrap();
    assert_eq!(lenient.engine().rules().len(), 1);
    assert_eq!(lenient.rule_errors().len(), 1);

    let strict = LlamaBuilder::new()
        .add_rule_path(dir.path())
        .fail_on_rule_error(true)
        .build();
    match strict {
        Err(LlamaError::Rules { count, first }) => {
            assert_eq!(count, 1);
            assert!(first.ends_with("Expected rule name at line 1 column 6"));
        }
        other => panic!("expected rule errors, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_directory() {
    let mut set = RuleSet::new();
    assert!(set.read_dir("/no/such/rules").is_err());
}
