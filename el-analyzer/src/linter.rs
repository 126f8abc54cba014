use crate::analyzer::{Analyzer, ResolveMode};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::schema::{resolve_identifier, Schema};
use crate::syntax::lexer::{is_identifier_like, normalize_keyword};
use crate::syntax::{Span, SyntaxKind, SyntaxNode, SyntaxTree};
use crate::types::TypeName;

/// Checks `tree` against `schema`, returning diagnostics in document order.
pub fn lint(tree: &SyntaxTree, schema: &Schema) -> Vec<Diagnostic> {
    tracing::debug!(source_len = tree.source().len(), "lint pass started");
    let mut linter = Linter {
        tree,
        analyzer: Analyzer::new(schema),
        diagnostics: Diagnostics::new(),
    };
    for node in tree.root().descendants() {
        linter.check(node);
    }
    tracing::debug!(
        diagnostics = linter.diagnostics.len(),
        errors = linter.diagnostics.has_errors(),
        "lint pass finished"
    );
    linter.diagnostics.into_vec()
}

fn unexpected(text: &str) -> String {
    let class = if is_identifier_like(text) {
        "identifier"
    } else {
        "operator"
    };
    format!("Unexpected {class} `{text}`")
}

struct Linter<'a> {
    tree: &'a SyntaxTree,
    analyzer: Analyzer<'a>,
    diagnostics: Diagnostics,
}

impl Linter<'_> {
    fn check(&mut self, node: SyntaxNode<'_>) {
        match node.kind() {
            SyntaxKind::Error => {
                self.check_error(node);
                return;
            }
            SyntaxKind::Arguments => self.check_arguments(node),
            SyntaxKind::Property | SyntaxKind::Method => self.check_member(node),
            SyntaxKind::Variable | SyntaxKind::Function => self.check_reference(node),
            SyntaxKind::BinaryExpression => self.check_keyword_operands(node),
            _ => {}
        }

        if !node.kind().is_trivia() && node.parent().is_some_and(|parent| parent.is_error()) {
            self.diagnostics.push_error(node.span(), unexpected(node.text()));
        }
    }

    fn check_error(&mut self, node: SyntaxNode<'_>) {
        // An empty document or a broken first token is not worth a squiggle.
        if self.tree.source().is_empty() || node.from() == 0 {
            return;
        }

        let text = node.text();
        if text.is_empty() {
            let to = node
                .parent()
                .and_then(|parent| parent.parent().or(Some(parent)))
                .map_or(node.to(), |enclosing| enclosing.to());
            self.diagnostics
                .push_error(Span::new(node.from(), to), "Expression expected");
        } else {
            self.diagnostics.push_error(node.span(), unexpected(text));
        }
    }

    fn check_arguments(&mut self, node: SyntaxNode<'_>) {
        let Some(callee) = node.prev_significant_sibling() else {
            return;
        };
        let Some(function) = self.analyzer.resolve_function(callee) else {
            return;
        };

        let arity = function.arity();
        let arguments: Vec<SyntaxNode<'_>> = node
            .children()
            .filter(|child| !child.kind().is_trivia())
            .filter(|child| !(child.is_error() && child.span().is_empty()))
            .collect();

        for (index, argument) in arguments.iter().enumerate() {
            if index >= arity.max {
                self.diagnostics.push_warning(
                    argument.span(),
                    format!("Unexpected argument: `{}` takes {arity}", function.name),
                );
                continue;
            }

            let Some(expected) = function.args[index].ty.as_ref() else {
                continue;
            };
            if expected.includes_any() {
                continue;
            }
            let actual = self.analyzer.resolve_types(*argument, ResolveMode::Exact);
            if !expected.accepts(&actual) {
                self.diagnostics.push_error(
                    argument.span(),
                    format!("`{expected}` expected, got `{actual}`"),
                );
            }
        }

        if arguments.len() < arity.min {
            self.diagnostics.push_error(
                node.span(),
                format!("Too few arguments: `{}` takes {arity}", function.name),
            );
        }
    }

    fn check_member(&mut self, node: SyntaxNode<'_>) {
        let Some(types) = self.analyzer.member_base_types(node, ResolveMode::Exact) else {
            return;
        };

        let name = node.text();
        let found = types.iter().any(|ty| {
            self.analyzer.declaration(ty).is_some_and(|declaration| {
                resolve_identifier(node.kind(), name, declaration.as_ref()).is_some()
            })
        });
        if !found {
            let what = if node.kind() == SyntaxKind::Method {
                "Method"
            } else {
                "Property"
            };
            self.diagnostics
                .push_error(node.span(), format!("{what} `{name}` not found in `{types}`"));
        }
    }

    fn check_reference(&mut self, node: SyntaxNode<'_>) {
        let name = node.text();
        if resolve_identifier(node.kind(), name, self.analyzer.schema()).is_some() {
            return;
        }
        let what = if node.kind() == SyntaxKind::Function {
            "Function"
        } else {
            "Variable"
        };
        self.diagnostics
            .push_error(node.span(), format!("{what} `{name}` not found"));
    }

    fn check_keyword_operands(&mut self, node: SyntaxNode<'_>) {
        let Some(operator) = node.operator() else {
            return;
        };
        if operator.kind() != SyntaxKind::OperatorKeyword {
            return;
        }

        let left = node.first_operand();
        let right = node.operands().nth(1);
        match normalize_keyword(operator.text()).as_str() {
            "in" | "not in" => {
                let Some(right) = right else {
                    return;
                };
                let types = self.analyzer.resolve_types(right, ResolveMode::Exact);
                if !types.includes_any() && !types.includes_array() {
                    self.diagnostics.push_error(
                        right.span(),
                        format!("`array` expected, got `{types}`"),
                    );
                }
            }
            "contains" | "starts with" | "ends with" | "matches" => {
                for side in [left, right].into_iter().flatten() {
                    let types = self.analyzer.resolve_types(side, ResolveMode::Exact);
                    if !types.includes_any() && !types.contains(&TypeName::String) {
                        self.diagnostics.push_error(
                            side.span(),
                            format!("`string` expected, got `{types}`"),
                        );
                    }
                }
            }
            _ => {}
        }
    }
}
