mod common;

use el_analyzer::{argument_hints, hover, parse, ArgumentHint, Bias, HoverInfo, Selection};

fn hover_at(doc: &str) -> Option<HoverInfo> {
    let (text, position) = common::split_cursor(doc);
    hover(&parse(&text), &common::schema(), position, Bias::Right)
}

fn hints_at(doc: &str) -> Vec<ArgumentHint> {
    let (text, position) = common::split_cursor(doc);
    argument_hints(&parse(&text), &common::schema(), &[Selection::caret(position)])
}

// ============================================================================
// Hover
// ============================================================================

#[test]
fn hover_shows_operator_keyword_info() {
    let info = hover_at("'a' sta‸rts with 'b'").expect("keyword hover");
    assert_eq!(info.content, "Check if a string starts with a specific string");
    assert_eq!((info.from, info.to), (4, 15));
}

#[test]
fn hover_shows_variable_info() {
    let info = hover_at("o‸bj").expect("variable hover");
    assert_eq!(info.content, "The object");
    assert_eq!((info.from, info.to), (0, 3));
}

#[test]
fn hover_shows_function_info() {
    let info = hover_at("s‸mh()").expect("function hover");
    assert_eq!(info.content, "Shakes head");
}

#[test]
fn hover_resolves_members_through_base_type() {
    let info = hover_at("obj.prop‸erty11").expect("property hover");
    assert_eq!(info.content, "First property");
    assert_eq!((info.from, info.to), (4, 14));

    let info = hover_at("obj.first‸Method()").expect("method hover");
    assert_eq!(info.content, "Returns itself");
}

#[test]
fn hover_is_silent_without_documentation() {
    assert_eq!(hover_at("foo‸bar"), None);
    assert_eq!(hover_at("obj.prop‸erty22"), None);
    assert_eq!(hover_at("1 ‸+ 2"), None);
    assert_eq!(hover_at("n‸ot true"), None);
}

// ============================================================================
// Argument hints
// ============================================================================

#[test]
fn hints_first_parameter_in_empty_call() {
    assert_eq!(
        hints_at("smash_my_head(‸)"),
        [ArgumentHint {
            position: 14,
            text: "object".to_string(),
            signature: "smash_my_head(object)".to_string(),
            parameter: 0,
        }]
    );
}

#[test]
fn hints_parameter_at_start_of_argument() {
    let hints = hints_at("any_fn(‸1, 2)");
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].text, "anything");

    let hints = hints_at("any_fn(1, ‸2)");
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].text, "optional");
    assert_eq!(hints[0].parameter, 1);
    assert_eq!(hints[0].signature, "any_fn(anything,optional)");
}

#[test]
fn no_hint_inside_or_after_argument() {
    assert!(hints_at("any_fn(1‸, 2)").is_empty());
    assert!(hints_at("smash_my_head(ob‸j)").is_empty());
}

#[test]
fn no_hint_without_parameters_or_definition() {
    assert!(hints_at("smh(‸)").is_empty());
    assert!(hints_at("obj.firstMethod(‸)").is_empty());
    assert!(hints_at("unknown(‸)").is_empty());
    assert!(hints_at("smh‸").is_empty());
}

#[test]
fn hints_every_caret_and_skips_ranges() {
    let source = "smash_my_head() + any_fn()";
    let tree = parse(source);
    let selections = [
        Selection::caret(14),
        Selection::caret(25),
        Selection {
            anchor: 7,
            head: 25,
        },
    ];
    let hints = argument_hints(&tree, &common::schema(), &selections);
    let texts: Vec<&str> = hints.iter().map(|hint| hint.text.as_str()).collect();
    assert_eq!(texts, ["object", "anything"]);
}
