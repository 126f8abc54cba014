use serde::Serialize;

use crate::analyzer::{Analyzer, ResolveMode};
use crate::schema::{Schema, Scope};
use crate::syntax::{Bias, SyntaxKind, SyntaxTree};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoverInfo {
    pub from: usize,
    pub to: usize,
    pub content: String,
}

/// Documentation for the operator keyword or reference at `position`.
pub fn hover(tree: &SyntaxTree, schema: &Schema, position: usize, bias: Bias) -> Option<HoverInfo> {
    let node = tree.resolve_inner(position, bias);

    let content = match node.kind() {
        SyntaxKind::OperatorKeyword => schema.operator_keyword(node.text())?.info.clone()?,
        SyntaxKind::Variable | SyntaxKind::Function | SyntaxKind::Property | SyntaxKind::Method => {
            let analyzer = Analyzer::new(schema);
            let name = node.text();
            let infos: Vec<String> = match analyzer.member_base_types(node, ResolveMode::Exact) {
                Some(types) => {
                    let declarations: Vec<_> = types
                        .iter()
                        .filter_map(|ty| analyzer.declaration(ty))
                        .collect();
                    let identifier_infos = declarations
                        .iter()
                        .filter_map(|decl| decl.identifier(name).and_then(|i| i.info.clone()));
                    let function_infos = declarations
                        .iter()
                        .filter_map(|decl| decl.function(name).and_then(|f| f.info.clone()));
                    identifier_infos.chain(function_infos).collect()
                }
                None => {
                    let identifier_info = schema.identifier(name).and_then(|i| i.info.clone());
                    let function_info = schema.function(name).and_then(|f| f.info.clone());
                    identifier_info.into_iter().chain(function_info).collect()
                }
            };
            infos
                .into_iter()
                .filter(|info| !info.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => return None,
    };

    if content.is_empty() {
        return None;
    }
    tracing::debug!(kind = %node.kind(), from = node.from(), "hover");
    Some(HoverInfo {
        from: node.from(),
        to: node.to(),
        content,
    })
}
