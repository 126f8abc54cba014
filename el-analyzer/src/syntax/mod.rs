//! Concrete syntax tree for expressions.
//!
//! Nodes live in an arena owned by [`SyntaxTree`] and are addressed by
//! [`NodeId`]. Navigation goes through the copyable [`SyntaxNode`] cursor.
//! Trees come from [`parse`] or from a host parser driving [`TreeBuilder`].

pub mod lexer;
mod parser;

use std::fmt;

use serde::Serialize;

use crate::error::TreeError;
use crate::types::TypeName;

pub use parser::{parse, MAX_NESTING};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyntaxKind {
    Expression,
    UnaryExpression,
    BinaryExpression,
    TernaryExpression,
    Variable,
    Function,
    PropertyAccess,
    MethodAccess,
    ArrayAccess,
    Call,
    Application,
    Arguments,
    Array,
    Object,
    Property,
    Method,
    String,
    Number,
    Boolean,
    Null,
    BlockComment,
    OperatorKeyword,
    Operator,
    UnaryOperator,
    MemberOf,
    NullSafeMemberOf,
    Error,
}

impl SyntaxKind {
    /// Type carried by literal nodes regardless of schema.
    pub fn intrinsic_type(self) -> Option<TypeName> {
        match self {
            SyntaxKind::String => Some(TypeName::String),
            SyntaxKind::Number => Some(TypeName::Number),
            SyntaxKind::Boolean => Some(TypeName::Bool),
            SyntaxKind::Null => Some(TypeName::Null),
            SyntaxKind::Array => Some(TypeName::Array),
            SyntaxKind::Object => Some(TypeName::Object),
            _ => None,
        }
    }

    pub fn is_trivia(self) -> bool {
        self == SyntaxKind::BlockComment
    }

    /// Operator and member separator tokens, as opposed to operands.
    pub fn is_operator_token(self) -> bool {
        matches!(
            self,
            SyntaxKind::Operator
                | SyntaxKind::UnaryOperator
                | SyntaxKind::OperatorKeyword
                | SyntaxKind::MemberOf
                | SyntaxKind::NullSafeMemberOf
        )
    }

    pub fn is_member_of(self) -> bool {
        matches!(self, SyntaxKind::MemberOf | SyntaxKind::NullSafeMemberOf)
    }

    pub fn is_member_access(self) -> bool {
        matches!(self, SyntaxKind::PropertyAccess | SyntaxKind::MethodAccess)
    }
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Half-open byte range `[from, to)` into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub from: usize,
    pub to: usize,
}

impl Span {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    pub fn empty(at: usize) -> Self {
        Self { from: at, to: at }
    }

    pub fn len(&self) -> usize {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    pub fn cover(self, other: Span) -> Span {
        Span::new(self.from.min(other.from), self.to.max(other.to))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: SyntaxKind,
    span: Span,
    type_tag: Option<TypeName>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    index: usize,
}

/// Which side of a position a lookup prefers when the position sits on a
/// node boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Enter nodes ending at the position (`from < pos <= to`).
    Left,
    /// Enter nodes starting at the position (`from <= pos < to`).
    Right,
    /// Prefer nodes starting at the position, then nodes ending there.
    Any,
}

#[derive(Debug, Clone)]
pub struct SyntaxTree {
    source: String,
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl SyntaxTree {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> SyntaxNode<'_> {
        self.node(self.root)
    }

    pub fn node(&self, id: NodeId) -> SyntaxNode<'_> {
        SyntaxNode { tree: self, id }
    }

    /// Number of nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    /// Innermost node touching `pos`, entering children according to `bias`.
    pub fn resolve_inner(&self, pos: usize, bias: Bias) -> SyntaxNode<'_> {
        let mut current = self.root();
        loop {
            let next = match bias {
                Bias::Left => current.child_ending_at_or_over(pos),
                Bias::Right => current.child_starting_at_or_over(pos),
                Bias::Any => current
                    .child_starting_at_or_over(pos)
                    .or_else(|| current.child_ending_at_or_over(pos)),
            };
            match next {
                Some(child) => current = child,
                None => return current,
            }
        }
    }

    /// Renders the tree as an indented outline, one node per line.
    pub fn debug_dump(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root(), 0usize)];
        while let Some((node, depth)) = stack.pop() {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&format!("{}@{}..{}", node.kind(), node.from(), node.to()));
            if node.first_child().is_none() && !node.span().is_empty() {
                out.push_str(&format!(" {:?}", node.text()));
            }
            out.push('\n');
            for child in node.children().rev() {
                stack.push((child, depth + 1));
            }
        }
        out
    }
}

#[derive(Clone, Copy)]
pub struct SyntaxNode<'t> {
    tree: &'t SyntaxTree,
    id: NodeId,
}

impl PartialEq for SyntaxNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for SyntaxNode<'_> {}

impl fmt::Debug for SyntaxNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}..{}", self.kind(), self.from(), self.to())
    }
}

impl<'t> SyntaxNode<'t> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'t SyntaxTree {
        self.tree
    }

    pub fn kind(&self) -> SyntaxKind {
        self.tree.data(self.id).kind
    }

    pub fn span(&self) -> Span {
        self.tree.data(self.id).span
    }

    pub fn from(&self) -> usize {
        self.span().from
    }

    pub fn to(&self) -> usize {
        self.span().to
    }

    pub fn text(&self) -> &'t str {
        let span = self.span();
        self.tree.source.get(span.from..span.to).unwrap_or("")
    }

    pub fn type_tag(&self) -> Option<&'t TypeName> {
        self.tree.data(self.id).type_tag.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.kind() == SyntaxKind::Error
    }

    pub fn parent(&self) -> Option<SyntaxNode<'t>> {
        self.tree.data(self.id).parent.map(|id| self.tree.node(id))
    }

    pub fn children(&self) -> impl DoubleEndedIterator<Item = SyntaxNode<'t>> + 't {
        let tree = self.tree;
        tree.data(self.id)
            .children
            .iter()
            .map(move |id| tree.node(*id))
    }

    pub fn first_child(&self) -> Option<SyntaxNode<'t>> {
        self.children().next()
    }

    pub fn last_child(&self) -> Option<SyntaxNode<'t>> {
        self.children().next_back()
    }

    pub fn prev_sibling(&self) -> Option<SyntaxNode<'t>> {
        let parent = self.tree.data(self.id).parent?;
        let index = self.tree.data(self.id).index.checked_sub(1)?;
        self.tree
            .data(parent)
            .children
            .get(index)
            .map(|id| self.tree.node(*id))
    }

    pub fn next_sibling(&self) -> Option<SyntaxNode<'t>> {
        let parent = self.tree.data(self.id).parent?;
        let index = self.tree.data(self.id).index + 1;
        self.tree
            .data(parent)
            .children
            .get(index)
            .map(|id| self.tree.node(*id))
    }

    /// Nearest preceding sibling that is not a comment.
    pub fn prev_significant_sibling(&self) -> Option<SyntaxNode<'t>> {
        let mut current = self.prev_sibling();
        while let Some(node) = current {
            if !node.kind().is_trivia() {
                return Some(node);
            }
            current = node.prev_sibling();
        }
        None
    }

    /// Strict ancestors, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = SyntaxNode<'t>> {
        std::iter::successors(self.parent(), |node| node.parent())
    }

    /// This node and everything below it, in pre-order.
    pub fn descendants(&self) -> Descendants<'t> {
        Descendants { stack: vec![*self] }
    }

    /// Children that are neither comments nor operator tokens.
    pub fn operands(&self) -> impl DoubleEndedIterator<Item = SyntaxNode<'t>> + 't {
        self.children()
            .filter(|child| !child.kind().is_trivia() && !child.kind().is_operator_token())
    }

    pub fn first_operand(&self) -> Option<SyntaxNode<'t>> {
        self.operands().next()
    }

    pub fn last_operand(&self) -> Option<SyntaxNode<'t>> {
        self.operands().next_back()
    }

    /// First operator token among the children.
    pub fn operator(&self) -> Option<SyntaxNode<'t>> {
        self.children().find(|child| {
            matches!(
                child.kind(),
                SyntaxKind::Operator | SyntaxKind::UnaryOperator | SyntaxKind::OperatorKeyword
            )
        })
    }

    fn child_ending_at_or_over(&self, pos: usize) -> Option<SyntaxNode<'t>> {
        self.children()
            .rev()
            .find(|child| child.from() < pos && pos <= child.to())
    }

    fn child_starting_at_or_over(&self, pos: usize) -> Option<SyntaxNode<'t>> {
        self.children()
            .find(|child| child.from() <= pos && pos < child.to())
    }
}

pub struct Descendants<'t> {
    stack: Vec<SyntaxNode<'t>>,
}

impl<'t> Iterator for Descendants<'t> {
    type Item = SyntaxNode<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().rev());
        Some(node)
    }
}

/// Marks a position in the builder's pending node list so a node can later
/// be opened around everything emitted since.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pending: usize,
    depth: usize,
}

#[derive(Debug)]
struct Frame {
    kind: SyntaxKind,
    first_child: usize,
    punct: Option<Span>,
    type_tag: Option<TypeName>,
}

/// Event-style tree construction.
///
/// Leaves are added with [`token`](Self::token) and [`empty`](Self::empty);
/// inner nodes are bracketed by [`start_node`](Self::start_node) (or
/// [`start_node_at`](Self::start_node_at) to wrap already emitted nodes) and
/// [`finish_node`](Self::finish_node). Punctuation that belongs to a node but
/// is not itself a node (parentheses, commas) is recorded with
/// [`punct`](Self::punct) so the node's span still covers it.
#[derive(Debug)]
pub struct TreeBuilder {
    source: String,
    nodes: Vec<NodeData>,
    pending: Vec<NodeId>,
    frames: Vec<Frame>,
    last_end: usize,
}

impl TreeBuilder {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            nodes: Vec::new(),
            pending: Vec::new(),
            frames: Vec::new(),
            last_end: 0,
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pending: self.pending.len(),
            depth: self.frames.len(),
        }
    }

    pub fn token(&mut self, kind: SyntaxKind, span: Span) {
        self.token_with_type(kind, span, kind.intrinsic_type());
    }

    /// Adds a leaf carrying an explicit type tag instead of the kind's own.
    pub fn token_with_type(&mut self, kind: SyntaxKind, span: Span, type_tag: Option<TypeName>) {
        let id = self.alloc(kind, span, type_tag, Vec::new());
        self.pending.push(id);
        self.note_end(span.to);
    }

    pub fn empty(&mut self, kind: SyntaxKind, at: usize) {
        self.token(kind, Span::empty(at));
    }

    pub fn punct(&mut self, span: Span) {
        if let Some(frame) = self.frames.last_mut() {
            frame.punct = Some(match frame.punct {
                Some(existing) => existing.cover(span),
                None => span,
            });
        }
        self.note_end(span.to);
    }

    pub fn start_node(&mut self, kind: SyntaxKind) {
        self.frames.push(Frame {
            kind,
            first_child: self.pending.len(),
            punct: None,
            type_tag: kind.intrinsic_type(),
        });
    }

    /// Opens a node whose first child is the first node emitted after
    /// `checkpoint` was taken.
    pub fn start_node_at(&mut self, checkpoint: Checkpoint, kind: SyntaxKind) -> Result<(), TreeError> {
        let floor = self.frames.last().map_or(0, |frame| frame.first_child);
        if checkpoint.depth != self.frames.len()
            || checkpoint.pending > self.pending.len()
            || checkpoint.pending < floor
        {
            return Err(TreeError::StaleCheckpoint);
        }
        self.frames.push(Frame {
            kind,
            first_child: checkpoint.pending,
            punct: None,
            type_tag: kind.intrinsic_type(),
        });
        Ok(())
    }

    pub fn finish_node(&mut self) -> Result<NodeId, TreeError> {
        self.close().ok_or(TreeError::UnbalancedFinish)
    }

    pub fn finish(self) -> Result<SyntaxTree, TreeError> {
        if !self.frames.is_empty() {
            return Err(TreeError::Unclosed(self.frames.len()));
        }
        if self.pending.len() != 1 {
            return Err(TreeError::RootCount(self.pending.len()));
        }
        let root = self.pending[0];
        let kind = self.nodes[root.index()].kind;
        if kind != SyntaxKind::Expression {
            return Err(TreeError::RootKind(kind));
        }
        Ok(self.into_tree(root))
    }

    /// Opens a node at `checkpoint` without validating it. The parser only
    /// hands out checkpoints taken at the current depth.
    pub(super) fn open_at(&mut self, checkpoint: Checkpoint, kind: SyntaxKind) {
        self.frames.push(Frame {
            kind,
            first_child: checkpoint.pending.min(self.pending.len()),
            punct: None,
            type_tag: kind.intrinsic_type(),
        });
    }

    /// Changes the kind of the innermost open node.
    pub(super) fn retag(&mut self, kind: SyntaxKind) {
        if let Some(frame) = self.frames.last_mut() {
            frame.kind = kind;
            frame.type_tag = kind.intrinsic_type();
        }
    }

    pub(super) fn close(&mut self) -> Option<NodeId> {
        let frame = self.frames.pop()?;
        Some(self.close_frame(frame))
    }

    /// Closes whatever is still open and wraps stray top-level nodes in an
    /// `Expression` root.
    pub(super) fn finish_lenient(mut self) -> SyntaxTree {
        while self.close().is_some() {}
        let single = match self.pending.as_slice() {
            [only] if self.nodes[only.index()].kind == SyntaxKind::Expression => Some(*only),
            _ => None,
        };
        let root = match single {
            Some(root) => root,
            None => self.close_frame(Frame {
                kind: SyntaxKind::Expression,
                first_child: 0,
                punct: None,
                type_tag: None,
            }),
        };
        self.into_tree(root)
    }

    fn into_tree(mut self, root: NodeId) -> SyntaxTree {
        self.nodes[root.index()].span = Span::new(0, self.source.len());
        SyntaxTree {
            source: self.source,
            nodes: self.nodes,
            root,
        }
    }

    fn close_frame(&mut self, frame: Frame) -> NodeId {
        let children: Vec<NodeId> = self.pending.drain(frame.first_child..).collect();

        let mut span = frame.punct;
        for child in &children {
            let child_span = self.nodes[child.index()].span;
            span = Some(match span {
                Some(existing) => existing.cover(child_span),
                None => child_span,
            });
        }
        let span = span.unwrap_or_else(|| Span::empty(self.last_end));

        let id = self.alloc(frame.kind, span, frame.type_tag, children);
        self.pending.push(id);
        id
    }

    fn alloc(
        &mut self,
        kind: SyntaxKind,
        span: Span,
        type_tag: Option<TypeName>,
        children: Vec<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for (index, child) in children.iter().enumerate() {
            let data = &mut self.nodes[child.index()];
            data.parent = Some(id);
            data.index = index;
        }
        self.nodes.push(NodeData {
            kind,
            span,
            type_tag,
            parent: None,
            children,
            index: 0,
        });
        id
    }

    fn note_end(&mut self, end: usize) {
        self.last_end = self.last_end.max(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_tree() -> SyntaxTree {
        // smh(1)
        let mut builder = TreeBuilder::new("smh(1)");
        builder.start_node(SyntaxKind::Expression);
        builder.start_node(SyntaxKind::Call);
        builder.token(SyntaxKind::Function, Span::new(0, 3));
        builder.start_node(SyntaxKind::Arguments);
        builder.punct(Span::new(3, 4));
        builder.token(SyntaxKind::Number, Span::new(4, 5));
        builder.punct(Span::new(5, 6));
        builder.finish_node().unwrap();
        builder.finish_node().unwrap();
        builder.finish_node().unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn builder_links_parents_and_siblings() {
        let tree = call_tree();
        let call = tree.root().first_child().unwrap();
        assert_eq!(call.kind(), SyntaxKind::Call);
        assert_eq!(call.span(), Span::new(0, 6));

        let function = call.first_child().unwrap();
        let arguments = function.next_sibling().unwrap();
        assert_eq!(arguments.kind(), SyntaxKind::Arguments);
        assert_eq!(arguments.span(), Span::new(3, 6));
        assert_eq!(arguments.prev_sibling(), Some(function));
        assert_eq!(function.parent(), Some(call));
        assert_eq!(function.text(), "smh");
    }

    #[test]
    fn literal_leaves_carry_intrinsic_types() {
        let tree = call_tree();
        let number = tree
            .root()
            .descendants()
            .find(|node| node.kind() == SyntaxKind::Number)
            .unwrap();
        assert_eq!(number.type_tag(), Some(&TypeName::Number));
    }

    #[test]
    fn resolve_inner_respects_bias() {
        let tree = call_tree();
        assert_eq!(tree.resolve_inner(3, Bias::Left).kind(), SyntaxKind::Function);
        assert_eq!(tree.resolve_inner(3, Bias::Right).kind(), SyntaxKind::Arguments);
        assert_eq!(tree.resolve_inner(4, Bias::Any).kind(), SyntaxKind::Number);
        assert_eq!(tree.resolve_inner(0, Bias::Left).kind(), SyntaxKind::Expression);
    }

    #[test]
    fn checkpoint_wraps_previous_nodes() {
        let mut builder = TreeBuilder::new("a+b");
        builder.start_node(SyntaxKind::Expression);
        let checkpoint = builder.checkpoint();
        builder.token(SyntaxKind::Variable, Span::new(0, 1));
        builder.token(SyntaxKind::Operator, Span::new(1, 2));
        builder.token(SyntaxKind::Variable, Span::new(2, 3));
        builder
            .start_node_at(checkpoint, SyntaxKind::BinaryExpression)
            .unwrap();
        builder.finish_node().unwrap();
        builder.finish_node().unwrap();
        let tree = builder.finish().unwrap();

        let binary = tree.root().first_child().unwrap();
        assert_eq!(binary.kind(), SyntaxKind::BinaryExpression);
        assert_eq!(binary.operands().count(), 2);
        assert_eq!(binary.operator().map(|op| op.text()), Some("+"));
    }

    #[test]
    fn finish_rejects_unbalanced_builders() {
        let mut builder = TreeBuilder::new("x");
        builder.start_node(SyntaxKind::Expression);
        assert_eq!(builder.finish().unwrap_err(), TreeError::Unclosed(1));

        let mut builder = TreeBuilder::new("x");
        builder.token(SyntaxKind::Variable, Span::new(0, 1));
        assert_eq!(
            builder.finish().unwrap_err(),
            TreeError::RootKind(SyntaxKind::Variable)
        );

        let mut builder = TreeBuilder::new("");
        assert_eq!(
            builder.finish_node().unwrap_err(),
            TreeError::UnbalancedFinish
        );
    }
}
