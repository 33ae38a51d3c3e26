use llama_rs::query::{QueryBuilder, CREATE_RULES_TABLE, CREATE_RULE_MATCHES_TABLE};
use llama_rs::{parse_rules, RuleEngine};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn clause(section: &str) -> String {
    let text = format!("rule R {{ {} }}", section);
    let out = parse_rules(&text).unwrap();
    assert!(out.errors.is_empty(), "{:?}", out.errors);
    let rule = &out.rules[0];
    let node = rule
        .file_metadata
        .as_ref()
        .or(rule.signature.as_ref())
        .unwrap();
    QueryBuilder::new().clause(node).unwrap()
}

#[rstest]
#[case("file_metadata: filesize == 30000", "Filesize == 30000")]
#[case(
    "file_metadata: created > \"2023-05-04\" and modified < \"2023-05-06\"",
    "(Created > '2023-05-04' AND Modified < '2023-05-06')"
)]
#[case(
    "file_metadata: filename == \"a.txt\" or filepath != \"/tmp\" and filesize <= 5",
    "(Name == 'a.txt' OR (Path != '/tmp' AND Filesize <= 5))"
)]
#[case(
    "file_metadata: (filesize > 1 or filesize < 0) and filename == \"x\"",
    "((Filesize > 1 OR Filesize < 0) AND Name == 'x')"
)]
#[case("signature: id == \"7\"", "signature.Id == '7'")]
#[case("file_metadata: filename == \"o'brien\"", "Name == 'o''brien'")]
fn test_clauses(#[case] section: &str, #[case] expected: &str) {
    assert_eq!(clause(section), expected);
}

#[test]
fn test_rule_query_combines_sections() {
    let out = parse_rules(
        r#"rule R { file_metadata: filesize > 10 signature: name == "PDF" }"#,
    )
    .unwrap();
    let rule = &out.rules[0];
    assert_eq!(
        QueryBuilder::new().rule_query(rule).unwrap(),
        format!(
            "SELECT '{}', Path, Name, Addr FROM dirent, inode, signature WHERE dirent.Metaaddr == inode.Addr AND signature.MetaAddr == inode.Addr AND Filesize > 10 AND signature.Name == 'PDF'",
            rule.id
        )
    );
}

#[test]
fn test_engine_statements() {
    let out = parse_rules("rule A { file_metadata: filesize > 1 } rule B {}").unwrap();
    let engine = RuleEngine::new(out.rules).unwrap();
    let statements = engine.statements();
    assert_eq!(
        statements.create_tables,
        vec![CREATE_RULES_TABLE.to_string(), CREATE_RULE_MATCHES_TABLE.to_string()]
    );

    let ids: Vec<&str> = engine.rules().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        statements.insert_rules.unwrap(),
        format!("INSERT INTO rules VALUES ('{}', 'A'),('{}', 'B');", ids[0], ids[1])
    );
    assert_eq!(
        statements.insert_rule_matches.unwrap(),
        format!(
            "INSERT INTO rule_matches (SELECT '{a}', Path, Name, Addr FROM dirent, inode WHERE dirent.Metaaddr == inode.Addr AND Filesize > 1) UNION (SELECT '{b}', Path, Name, Addr FROM dirent, inode WHERE dirent.Metaaddr == inode.Addr);",
            a = ids[0],
            b = ids[1]
        )
    );
}

#[test]
fn test_no_rules_no_inserts() {
    let engine = RuleEngine::new(Vec::new()).unwrap();
    let statements = engine.statements();
    assert!(statements.insert_rules.is_none());
    assert!(statements.insert_rule_matches.is_none());
}
