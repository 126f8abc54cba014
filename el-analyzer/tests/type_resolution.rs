mod common;

use el_analyzer::schema::LookupResult;
use el_analyzer::{parse, resolve_types, Analyzer, ResolveMode, Schema, TypeName};

fn types_of(source: &str) -> String {
    let schema = common::schema();
    let tree = parse(source);
    let node = tree
        .root()
        .first_child()
        .unwrap_or_else(|| panic!("`{source}` should produce an expression"));
    resolve_types(&schema, node).to_string()
}

#[test]
fn resolves_expression_types() {
    let cases = [
        ("obj", "custom44"),
        ("true", "bool"),
        ("true || true", "bool"),
        ("obj ?? true", "custom44|bool"),
        ("(obj ?? true)", "custom44|bool"),
        ("true or false", "bool"),
        ("1 + 2", "number"),
        ("not 1", "bool"),
        ("!1", "bool"),
        ("+false", "number"),
        ("-true", "number"),
        ("arr[0]", "string"),
        ("arr2[0]", "string[]"),
        ("arr2[0][0]", "string"),
    ];
    for (source, expected) in cases {
        assert_eq!(types_of(source), expected, "types of `{source}`");
    }
}

#[test]
fn resolves_literals_and_operators() {
    let cases = [
        ("'a'", "string"),
        ("\"a\"", "string"),
        ("null", "null"),
        ("1.5e3", "number"),
        ("[1, 2]", "array"),
        ("{a: 1}", "object"),
        ("'a' ~ 'b'", "string"),
        ("1..3", "number[]"),
        ("2 ** 8", "number"),
        ("1 < 2", "bool"),
        ("'foo' in arr", "bool"),
        ("'foo' starts with 'f'", "bool"),
        ("foobar ? obj : false", "custom44|bool"),
        ("foobar ?: obj", "any|custom44"),
    ];
    for (source, expected) in cases {
        assert_eq!(types_of(source), expected, "types of `{source}`");
    }
}

#[test]
fn resolves_references_through_schema() {
    let cases = [
        ("smh()", "string"),
        ("getObject()", "custom44"),
        ("getObject().firstMethod()", "custom44"),
        ("obj.firstMethod().firstMethod()", "custom44"),
        ("obj.property11", "any"),
        ("obj?.property22", "any"),
        ("foobar", "any"),
        ("notfound", "any"),
        ("notfound()", "any"),
        ("smash_my_head({})", "any"),
        ("obj.missing", "any"),
        ("[1, 2][0]", "any"),
    ];
    for (source, expected) in cases {
        assert_eq!(types_of(source), expected, "types of `{source}`");
    }
}

#[test]
fn resolves_base_of_incomplete_member_access() {
    let schema = common::schema();
    let tree = parse("obj.firstMethod().");
    let access = tree.root().first_child().expect("member access");
    let base = access.first_operand().expect("base of member access");

    let analyzer = Analyzer::new(&schema);
    assert_eq!(analyzer.resolve_types(base, ResolveMode::Lenient).to_string(), "custom44");
}

#[test]
fn lookup_hook_supplies_declarations() {
    let schema = Schema::from_json_str(
        r#"{"identifiers": [{"name": "user", "type": ["User"]}]}"#,
    )
    .expect("schema")
    .with_type_resolver(|name: &TypeName| -> LookupResult {
        if name.to_string() != "User" {
            return Ok(None);
        }
        let declaration = serde_json::from_str(
            r#"{"identifiers": [{"name": "email", "type": ["string"]}]}"#,
        )
        .map_err(|error| el_analyzer::LookupError::new(name.to_string(), error.to_string()))?;
        Ok(Some(std::sync::Arc::new(declaration)))
    });

    assert_eq!(
        resolve_types(&schema, parse("user.email").root().first_child().expect("node")).to_string(),
        "string"
    );
}
