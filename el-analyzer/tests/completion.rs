mod common;

use el_analyzer::{
    complete, parse, CompletionKind, CompletionMode, CompletionRequest, CompletionResult, Function,
    Identifier, Schema, ValidFor,
};

const OPERATOR_KEYWORDS: [&str; 9] = [
    "starts with",
    "ends with",
    "contains",
    "matches",
    "in",
    "not",
    "or",
    "xor",
    "and",
];

fn complete_at(doc: &str, explicit: bool) -> Option<CompletionResult> {
    let (text, position) = common::split_cursor(doc);
    let request = if explicit {
        CompletionRequest::explicit(position)
    } else {
        CompletionRequest::at(position)
    };
    complete(&parse(&text), &common::schema(), request)
}

fn labels(doc: &str) -> Vec<String> {
    complete_at(doc, false)
        .map(|result| result.options.into_iter().map(|option| option.label).collect())
        .unwrap_or_default()
}

fn has_keyword(labels: &[String]) -> bool {
    labels.iter().any(|label| OPERATOR_KEYWORDS.contains(&label.as_str()))
}

fn assert_object_members(doc: &str) {
    assert_eq!(
        labels(doc),
        ["property11", "property22", "firstMethod()"],
        "members for `{doc}`"
    );
}

#[test]
fn completes_when_explicitly_requested() {
    let result = complete_at("‸", true).expect("explicit completion");
    let labels: Vec<String> = result.labels().into_iter().map(str::to_string).collect();
    assert!(!labels.is_empty());
    assert!(!has_keyword(&labels));
    assert_eq!(result.mode, CompletionMode::Identifier);
}

#[test]
fn completes_identifiers_after_keyword_when_explicit() {
    let result = complete_at("foo > 10 and ‸", true).expect("explicit completion");
    let labels: Vec<String> = result.labels().into_iter().map(str::to_string).collect();
    assert!(!labels.is_empty());
    assert!(!has_keyword(&labels));
}

#[test]
fn completes_operators_when_explicitly_requested() {
    let result = complete_at("foo > 10 ‸", true).expect("explicit completion");
    assert_eq!(result.mode, CompletionMode::OperatorKeyword);
    assert_eq!(result.valid_for, ValidFor::Keyword { explicit: true });
    assert_eq!(result.labels().len(), OPERATOR_KEYWORDS.len() + 1);
}

#[test]
fn completes_variables_mid_word_when_explicit() {
    let result = complete_at("foo > 10 and foo‸", true).expect("explicit completion");
    let labels: Vec<String> = result.labels().into_iter().map(str::to_string).collect();
    assert!(labels.contains(&"obj".to_string()), "explicit requests are not prefix filtered");
    assert!(!has_keyword(&labels));
    assert_eq!((result.from, result.to), (13, 16));
}

#[test]
fn completes_variables() {
    assert_eq!(labels("foo‸"), ["foobar", "foobaz"]);
}

#[test]
fn completes_parameterless_functions() {
    let result = complete_at("sm‸", false).expect("completion");
    let smh = result
        .options
        .iter()
        .find(|option| option.label == "smh()")
        .expect("smh() offered");
    assert_eq!(smh.detail.as_deref(), Some("string"));
    assert_eq!(smh.kind, CompletionKind::Function);
    assert_eq!(smh.apply("sm", result.from, result.to), ("smh()".to_string(), 5));
}

#[test]
fn completes_functions_with_params() {
    let result = complete_at("smash‸", false).expect("completion");
    let smash = result
        .options
        .iter()
        .find(|option| option.label == "smash_my_head(object)")
        .expect("smash_my_head offered");
    assert_eq!(smash.detail, None);
    assert_eq!(
        smash.apply("smash", result.from, result.to),
        ("smash_my_head()".to_string(), 14)
    );
}

#[test]
fn completes_operator_keywords_after_identifiers() {
    assert!(labels("smh s‸").iter().any(|label| label == "starts with"));
}

#[test]
fn completes_operator_keywords_after_parenthesis() {
    assert!(labels("smh() en‸").iter().any(|label| label == "ends with"));
}

#[test]
fn completes_operator_keywords_after_string() {
    let result = complete_at("'foobar' s‸", false).expect("completion");
    assert!(result.labels().contains(&"starts with"));
    assert!(result.is_valid_for("st"));
    assert!(!result.is_valid_for("zz"));
}

#[test]
fn no_completion_inside_open_string() {
    assert_eq!(complete_at("'foobar s‸", false), None);
}

#[test]
fn no_operators_where_identifier_is_expected() {
    assert!(!labels("smash_my_head(a‸)").iter().any(|label| label == "and"));
}

#[test]
fn completes_object_properties_and_methods() {
    let result = complete_at("obj.‸", false).expect("member completion");
    assert_eq!(result.mode, CompletionMode::Member);
    assert_eq!(result.valid_for, ValidFor::Identifier);
    assert_object_members("obj.‸");
}

#[test]
fn completes_object_members_with_partial_key() {
    assert_eq!(labels("obj.property1‸"), ["property11"]);
}

#[test]
fn member_filter_is_case_sensitive() {
    assert_eq!(complete_at("obj.Property‸", false), None);
}

#[test]
fn completes_object_members_after_null_safe_access() {
    assert_object_members("obj?.‸");
}

#[test]
fn completes_object_members_after_function_call() {
    let labels = labels("getObject().‸");
    assert!(labels.contains(&"property11".to_string()));
    assert!(labels.contains(&"firstMethod()".to_string()));
}

#[test]
fn completes_only_operators_after_method_call() {
    let labels = labels("obj.firstMethod() ‸");
    assert!(!labels.contains(&"firstMethod()".to_string()));
    assert!(!labels.contains(&"obj".to_string()));
    assert!(labels.contains(&"starts with".to_string()));
}

#[test]
fn completes_object_members_after_method_call() {
    assert_object_members("obj.firstMethod().‸");
}

#[test]
fn completes_object_members_after_complex_expression() {
    assert_object_members("smash_my_head(obj.firstMethod()) + obj.‸");
}

#[test]
fn no_members_for_types_without_declaration() {
    assert_eq!(complete_at("arr[0].‸", false), None);
}

#[test]
fn no_completion_right_after_numbers() {
    assert_eq!(complete_at("123‸", false), None);
}

#[test]
fn no_completion_right_after_operator_keywords() {
    assert_eq!(complete_at("1 and‸", false), None);
}

#[test]
fn no_completion_right_after_closing_bracket() {
    assert_eq!(complete_at("(1)‸", false), None);
}

#[test]
fn completes_after_ternary_expression() {
    assert_object_members("(foobar ? obj : false).‸");
}

#[test]
fn completes_after_ternary_shortcut() {
    assert_object_members("(foobar ? obj).‸");
}

#[test]
fn completes_after_elvis_operator() {
    assert_object_members("(foobar ?: obj).‸");
}

#[test]
fn no_completion_inside_comment() {
    assert_eq!(complete_at("1 /* o‸ */", false), None);
}

#[test]
fn identifiers_come_before_functions_in_declaration_order() {
    let schema = Schema::new()
        .with_identifier(Identifier::new("sma").with_info("First"))
        .with_function(Function::new("smb").with_info("Between"))
        .with_identifier(Identifier::new("smc"));
    let (text, position) = common::split_cursor("sm‸");
    let result = complete(&parse(&text), &schema, CompletionRequest::at(position))
        .expect("prefix completion");

    assert_eq!(result.labels(), ["sma", "smc", "smb()"]);
    let infos: Vec<_> = result.options.iter().map(|option| option.info.as_deref()).collect();
    assert_eq!(infos, [Some("First"), None, Some("Between")]);
    assert_eq!(result.options[2].kind, CompletionKind::Function);
}
