use serde::Serialize;

use crate::analyzer::Analyzer;
use crate::schema::Schema;
use crate::syntax::{Bias, SyntaxKind, SyntaxNode, SyntaxTree};

/// An editor selection; `anchor == head` for a bare caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn caret(position: usize) -> Self {
        Self {
            anchor: position,
            head: position,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }
}

/// Name of the parameter the caret is about to fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentHint {
    pub position: usize,
    pub text: String,
    /// Label of the called function, `name(a,b)`.
    pub signature: String,
    /// Index of the hinted parameter.
    pub parameter: usize,
}

/// One hint per caret that sits at the start of an argument slot of a known
/// function. Ranged selections never produce hints.
pub fn argument_hints(
    tree: &SyntaxTree,
    schema: &Schema,
    selections: &[Selection],
) -> Vec<ArgumentHint> {
    let analyzer = Analyzer::new(schema);
    let hints: Vec<ArgumentHint> = selections
        .iter()
        .filter(|selection| selection.is_empty())
        .filter_map(|selection| hint_at(&analyzer, tree, selection.head))
        .collect();
    tracing::debug!(
        selections = selections.len(),
        hints = hints.len(),
        "argument hints"
    );
    hints
}

fn hint_at(analyzer: &Analyzer<'_>, tree: &SyntaxTree, pos: usize) -> Option<ArgumentHint> {
    let node = tree.resolve_inner(pos, Bias::Any);
    let arguments = std::iter::once(node)
        .chain(node.ancestors())
        .find(|candidate| candidate.kind() == SyntaxKind::Arguments)?;
    let callee = arguments.prev_significant_sibling()?;
    let function = analyzer.resolve_function(callee)?;

    let slots: Vec<SyntaxNode<'_>> = arguments
        .children()
        .filter(|child| !child.kind().is_trivia())
        .collect();
    let ordinal = match slots.iter().position(|slot| slot.to() >= pos) {
        Some(index) if slots[index].from() == pos => index,
        Some(_) => return None,
        None if slots.is_empty() => 0,
        None => return None,
    };

    let parameter = function.args.get(ordinal)?;
    Some(ArgumentHint {
        position: pos,
        text: parameter.name.clone(),
        signature: function.label(),
        parameter: ordinal,
    })
}
