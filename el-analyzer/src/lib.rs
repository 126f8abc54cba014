//! Static analysis for an embedded expression language: type inference,
//! diagnostics, completion, hover and argument hints, all driven by a
//! caller supplied [`Schema`].

mod analyzer;
mod completion;
mod diagnostics;
mod error;
mod hints;
mod hover;
mod linter;
pub mod schema;
pub mod syntax;
mod types;

pub use crate::analyzer::{Analyzer, ResolveMode};
pub use crate::completion::{
    complete, Completion, CompletionKind, CompletionMode, CompletionRequest, CompletionResult,
    ValidFor,
};
pub use crate::diagnostics::{Diagnostic, Diagnostics, Severity};
pub use crate::error::{LookupError, SchemaError, TreeError};
pub use crate::hints::{argument_hints, ArgumentHint, Selection};
pub use crate::hover::{hover, HoverInfo};
pub use crate::linter::lint;
pub use crate::schema::{
    Arity, Definition, Function, Identifier, OperatorKeyword, Parameter, Schema, Scope,
    TypeDeclaration, TypeResolver,
};
pub use crate::syntax::{parse, Bias, NodeId, Span, SyntaxKind, SyntaxNode, SyntaxTree, TreeBuilder};
pub use crate::types::{TypeName, TypeSet};

/// Possible result types of `node` against `schema`, in a fresh pass.
pub fn resolve_types(schema: &Schema, node: SyntaxNode<'_>) -> TypeSet {
    Analyzer::new(schema).resolve_types(node, ResolveMode::Exact)
}
