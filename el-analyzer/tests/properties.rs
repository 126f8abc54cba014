//! Property-based tests for the parser and the analyses built on it.
//!
//! Inputs are random token soups, so most of them are malformed; every
//! entry point has to stay total on them.

mod common;

use el_analyzer::{
    argument_hints, complete, hover, lint, parse, resolve_types, Analyzer, Bias,
    CompletionRequest, ResolveMode, Selection, SyntaxNode,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Tokens that never open a string or comment.
fn plain_token() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("obj".to_string()),
        Just("foobar".to_string()),
        Just("arr".to_string()),
        Just("smh".to_string()),
        Just("any_fn".to_string()),
        Just("property11".to_string()),
        Just("firstMethod".to_string()),
        Just("true".to_string()),
        Just("null".to_string()),
        Just("not".to_string()),
        Just("and".to_string()),
        Just("not in".to_string()),
        Just("starts with".to_string()),
        Just("contains".to_string()),
        "[0-9]{1,3}",
        "[a-z_]{1,6}",
        "(\\.|\\?\\.|\\(|\\)|\\[|\\]|\\{|\\}|,|:|\\?|\\?\\?|\\?:|\\.\\.)",
        "(\\+|-|\\*|\\*\\*|%|~|==|!=|<|>=|!|&&|\\|\\|)",
    ]
}

fn token() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => plain_token(),
        1 => "'[a-z ]{0,4}'?",
        1 => "/\\*[a-z ]{0,4}(\\*/)?",
    ]
}

/// Space or glue separated token soup.
fn source() -> impl Strategy<Value = String> {
    prop::collection::vec((token(), prop::bool::ANY), 0..12).prop_map(|tokens| {
        tokens
            .into_iter()
            .map(|(token, spaced)| if spaced { format!("{token} ") } else { token })
            .collect()
    })
}

fn plain_source() -> impl Strategy<Value = String> {
    prop::collection::vec(plain_token(), 0..10).prop_map(|tokens| tokens.join(" "))
}

fn char_boundaries(source: &str) -> Vec<usize> {
    source
        .char_indices()
        .map(|(index, _)| index)
        .chain(std::iter::once(source.len()))
        .collect()
}

fn all_nodes(root: SyntaxNode<'_>) -> Vec<SyntaxNode<'_>> {
    std::iter::once(root).chain(root.descendants()).collect()
}

// ============================================================================
// Parser
// ============================================================================

proptest! {
    /// Property: parsing is total and every span nests inside its parent
    /// and the source.
    #[test]
    fn spans_nest_within_parents(source in source()) {
        let tree = parse(&source);
        let root = tree.root();
        prop_assert_eq!((root.from(), root.to()), (0, source.len()));

        for node in all_nodes(root) {
            prop_assert!(node.from() <= node.to(), "{:?} is inverted", node);
            prop_assert!(node.to() <= source.len(), "{:?} leaves the source", node);
            if let Some(parent) = node.parent() {
                prop_assert!(
                    parent.from() <= node.from() && node.to() <= parent.to(),
                    "{:?} escapes {:?}",
                    node,
                    parent
                );
            }
        }
    }

    /// Property: resolve_inner always lands on a node touching the position.
    #[test]
    fn resolve_inner_touches_position(source in source()) {
        let tree = parse(&source);
        for pos in char_boundaries(&source) {
            for bias in [Bias::Left, Bias::Right, Bias::Any] {
                let node = tree.resolve_inner(pos, bias);
                prop_assert!(
                    node == tree.root() || (node.from() <= pos && pos <= node.to()),
                    "{:?} does not touch {}",
                    node,
                    pos
                );
            }
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

proptest! {
    /// Property: every node has at least one possible type in both modes.
    #[test]
    fn type_resolution_is_never_empty(source in source()) {
        let schema = common::schema();
        let tree = parse(&source);
        let analyzer = Analyzer::new(&schema);
        for node in all_nodes(tree.root()) {
            prop_assert!(!resolve_types(&schema, node).is_empty());
            prop_assert!(!analyzer.resolve_types(node, ResolveMode::Lenient).is_empty());
        }
    }

    /// Property: linting is deterministic and stays within the source.
    #[test]
    fn lint_is_idempotent(source in source()) {
        let schema = common::schema();
        let tree = parse(&source);
        let first = lint(&tree, &schema);
        let second = lint(&tree, &schema);
        prop_assert_eq!(&first, &second);
        for diagnostic in &first {
            prop_assert!(diagnostic.from <= diagnostic.to && diagnostic.to <= source.len());
        }
    }

    /// Property: code assistance is total at every cursor position.
    #[test]
    fn assistance_is_total(source in source()) {
        let schema = common::schema();
        let tree = parse(&source);
        let positions = char_boundaries(&source);
        for &pos in &positions {
            for explicit in [false, true] {
                let request = CompletionRequest { position: pos, explicit };
                if let Some(result) = complete(&tree, &schema, request) {
                    prop_assert!(result.from <= result.to && result.to == pos);
                    prop_assert!(!result.options.is_empty());
                }
            }
            let _ = hover(&tree, &schema, pos, Bias::Any);
        }
        let selections: Vec<Selection> = positions.iter().copied().map(Selection::caret).collect();
        for hint in argument_hints(&tree, &schema, &selections) {
            prop_assert!(hint.position <= source.len());
        }
    }

    /// Property: nothing is offered inside an unterminated string.
    #[test]
    fn no_completion_inside_open_string(prefix in plain_source(), tail in "[a-z ]{0,8}") {
        let schema = common::schema();
        let source = format!("{prefix} '{tail}");
        let tree = parse(&source);
        let request = CompletionRequest::explicit(source.len());
        prop_assert_eq!(complete(&tree, &schema, request), None);
    }
}
