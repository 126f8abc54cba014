//! Context sensitive completion.
//!
//! The cursor context picks exactly one mode:
//!
//! 1. nothing inside string literals and comments,
//! 2. members of the base type after `.` / `?.`,
//! 3. operator keywords after a completed operand,
//! 4. top-level identifiers and functions where a new operand starts.

use serde::Serialize;

use crate::analyzer::{Analyzer, ResolveMode};
use crate::schema::{Function, Identifier, OperatorKeyword, Schema};
use crate::syntax::lexer::{is_identifier_like, is_word_char, Lexer, TokenKind};
use crate::syntax::{Bias, SyntaxKind, SyntaxTree};
use crate::types::TypeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionRequest {
    pub position: usize,
    /// Explicit requests skip prefix filtering; the host filters instead.
    pub explicit: bool,
}

impl CompletionRequest {
    pub fn at(position: usize) -> Self {
        Self {
            position,
            explicit: false,
        }
    }

    pub fn explicit(position: usize) -> Self {
        Self {
            position,
            explicit: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    Variable,
    Function,
    Keyword,
    Property,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub label: String,
    pub insert_text: String,
    /// Caret position after insertion, relative to the start of `insert_text`.
    pub cursor_offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    pub kind: CompletionKind,
}

impl Completion {
    fn identifier(identifier: &Identifier, kind: CompletionKind) -> Self {
        Self {
            label: identifier.name.clone(),
            insert_text: identifier.name.clone(),
            cursor_offset: identifier.name.len(),
            detail: identifier
                .detail
                .clone()
                .or_else(|| identifier.ty.as_ref().map(TypeSet::to_string)),
            info: identifier.info.clone(),
            kind,
        }
    }

    fn function(function: &Function, kind: CompletionKind) -> Self {
        // Land between the parentheses when there is something to type there.
        let cursor_offset = function.name.len() + if function.args.is_empty() { 2 } else { 1 };
        Self {
            label: function.label(),
            insert_text: format!("{}()", function.name),
            cursor_offset,
            detail: function.return_type.as_ref().map(TypeSet::to_string),
            info: function.info.clone(),
            kind,
        }
    }

    fn keyword(keyword: &OperatorKeyword) -> Self {
        Self {
            label: keyword.name.clone(),
            insert_text: format!("{} ", keyword.name),
            cursor_offset: keyword.name.len() + 1,
            detail: keyword.detail.clone(),
            info: keyword.info.clone(),
            kind: CompletionKind::Keyword,
        }
    }

    /// Replaces `from..to` of `text` with this completion, returning the new
    /// text and caret offset.
    pub fn apply(&self, text: &str, from: usize, to: usize) -> (String, usize) {
        let mut edited = String::with_capacity(text.len() + self.insert_text.len());
        edited.push_str(text.get(..from).unwrap_or(text));
        edited.push_str(&self.insert_text);
        edited.push_str(text.get(to..).unwrap_or(""));
        (edited, from + self.cursor_offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionMode {
    Member,
    OperatorKeyword,
    Identifier,
}

/// Whether a result stays usable while the user keeps typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidFor {
    /// As long as the typed text is still an identifier.
    Identifier,
    /// As long as some keyword contains the typed text.
    Keyword { explicit: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub from: usize,
    pub to: usize,
    pub mode: CompletionMode,
    pub options: Vec<Completion>,
    pub valid_for: ValidFor,
}

impl CompletionResult {
    pub fn is_valid_for(&self, typed: &str) -> bool {
        match self.valid_for {
            ValidFor::Identifier => is_identifier_like(typed),
            ValidFor::Keyword { explicit } => {
                explicit || self.options.iter().any(|option| option.label.contains(typed))
            }
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        self.options.iter().map(|option| option.label.as_str()).collect()
    }
}

pub fn complete(
    tree: &SyntaxTree,
    schema: &Schema,
    request: CompletionRequest,
) -> Option<CompletionResult> {
    let source = tree.source();
    let pos = request.position;
    if pos > source.len() || !source.is_char_boundary(pos) {
        return None;
    }
    if is_inside_literal(source, pos) {
        tracing::trace!(pos, "completion suppressed inside literal");
        return None;
    }

    let analyzer = Analyzer::new(schema);
    let word_start = source[..pos]
        .char_indices()
        .rev()
        .take_while(|(_, ch)| is_word_char(*ch))
        .last()
        .map_or(pos, |(index, _)| index);
    let word = &source[word_start..pos];

    let anchor = skip_trivia_back(tree, word_start);
    let at_anchor = tree.resolve_inner(anchor, Bias::Left);
    if at_anchor.kind().is_member_of() {
        let base = at_anchor.parent().and_then(|access| access.first_operand())?;
        if !matches!(
            base.kind(),
            SyntaxKind::PropertyAccess
                | SyntaxKind::MethodAccess
                | SyntaxKind::ArrayAccess
                | SyntaxKind::Variable
                | SyntaxKind::Call
                | SyntaxKind::Application
        ) {
            return None;
        }
        let types = analyzer.resolve_types(base, ResolveMode::Lenient);
        let options = member_options(&analyzer, &types);
        return finish(CompletionMode::Member, word_start, pos, options, source, request);
    }

    let (mode, from) = if word.is_empty() {
        classify_gap(tree, pos)?
    } else {
        if word.starts_with(|ch: char| ch.is_ascii_digit()) {
            return None;
        }
        let node = tree.resolve_inner(pos, Bias::Left);
        match node.kind() {
            SyntaxKind::Error => (CompletionMode::OperatorKeyword, node.from()),
            SyntaxKind::Variable
            | SyntaxKind::Function
            | SyntaxKind::Boolean
            | SyntaxKind::Null => (CompletionMode::Identifier, node.from()),
            _ => return None,
        }
    };

    let options = match mode {
        CompletionMode::Identifier => identifier_options(schema),
        _ => schema.operator_keywords.iter().map(Completion::keyword).collect(),
    };
    finish(mode, from, pos, options, source, request)
}

/// Picks a mode when nothing is typed yet at `pos`.
fn classify_gap(tree: &SyntaxTree, pos: usize) -> Option<(CompletionMode, usize)> {
    let identifier = Some((CompletionMode::Identifier, pos));
    let anchor = skip_trivia_back(tree, pos);
    if anchor == 0 {
        return identifier;
    }

    let source = tree.source();
    let previous = source[..anchor].chars().next_back()?;
    if "([{,?:".contains(previous) {
        return identifier;
    }

    let node = tree.resolve_inner(anchor, Bias::Left);
    if matches!(
        node.kind(),
        SyntaxKind::Operator | SyntaxKind::UnaryOperator | SyntaxKind::OperatorKeyword
    ) {
        return identifier;
    }
    if anchor == pos {
        // Glued to the previous token, e.g. right after `)` or a number.
        return None;
    }
    if node.is_error() && !is_identifier_like(node.text()) {
        return identifier;
    }
    Some((CompletionMode::OperatorKeyword, pos))
}

fn finish(
    mode: CompletionMode,
    from: usize,
    to: usize,
    mut options: Vec<Completion>,
    source: &str,
    request: CompletionRequest,
) -> Option<CompletionResult> {
    if !request.explicit {
        let prefix = source.get(from..to).unwrap_or("");
        options.retain(|option| option.label.starts_with(prefix));
    }
    if options.is_empty() {
        return None;
    }

    let valid_for = match mode {
        CompletionMode::OperatorKeyword => ValidFor::Keyword {
            explicit: request.explicit,
        },
        _ => ValidFor::Identifier,
    };
    tracing::debug!(?mode, from, to, options = options.len(), "completion");
    Some(CompletionResult {
        from,
        to,
        mode,
        options,
        valid_for,
    })
}

fn identifier_options(schema: &Schema) -> Vec<Completion> {
    let identifiers = schema
        .identifiers
        .iter()
        .map(|identifier| Completion::identifier(identifier, CompletionKind::Variable));
    let functions = schema
        .functions
        .iter()
        .map(|function| Completion::function(function, CompletionKind::Function));
    identifiers.chain(functions).collect()
}

fn member_options(analyzer: &Analyzer<'_>, types: &TypeSet) -> Vec<Completion> {
    let mut options = Vec::new();
    for ty in types {
        let Some(declaration) = analyzer.declaration(ty) else {
            continue;
        };
        options.extend(
            declaration
                .identifiers
                .iter()
                .map(|identifier| Completion::identifier(identifier, CompletionKind::Property)),
        );
        options.extend(
            declaration
                .functions
                .iter()
                .map(|function| Completion::function(function, CompletionKind::Method)),
        );
    }
    options
}

/// Whether `pos` sits inside a string literal or block comment: after its
/// opening delimiter and before its closing one, if it has any. Decided on
/// tokens so strings the parser demoted to `Error` leaves still count.
fn is_inside_literal(source: &str, pos: usize) -> bool {
    Lexer::new(source)
        .tokenize()
        .into_iter()
        .take_while(|token| token.span.from < pos)
        .any(|token| match token.kind {
            TokenKind::String { terminated } | TokenKind::Comment { terminated } => {
                pos < token.span.to || (!terminated && pos == token.span.to)
            }
            _ => false,
        })
}

/// Moves `pos` back over whitespace and block comments.
fn skip_trivia_back(tree: &SyntaxTree, mut pos: usize) -> usize {
    let source = tree.source();
    loop {
        pos = source[..pos].trim_end().len();
        if pos == 0 {
            return pos;
        }
        let node = tree.resolve_inner(pos, Bias::Left);
        if node.kind() == SyntaxKind::BlockComment && node.to() == pos {
            pos = node.from();
            continue;
        }
        return pos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    #[test]
    fn apply_places_cursor_inside_parentheses() {
        let function = Function::new("smash_my_head").with_arg(crate::schema::Parameter::new("object"));
        let completion = Completion::function(&function, CompletionKind::Function);
        assert_eq!(completion.label, "smash_my_head(object)");
        let (text, caret) = completion.apply("1 + sma", 4, 7);
        assert_eq!(text, "1 + smash_my_head()");
        assert_eq!(caret, 18);

        let bare = Completion::function(&Function::new("smh"), CompletionKind::Function);
        let (text, caret) = bare.apply("sm", 0, 2);
        assert_eq!(text, "smh()");
        assert_eq!(caret, 5);
    }

    #[test]
    fn unterminated_comment_suppresses_at_end() {
        assert!(is_inside_literal("1 /* abc", 8));
        assert!(!is_inside_literal("1 /* abc */", 11));
        assert!(is_inside_literal("1 /* abc */", 6));
        assert!(is_inside_literal("a 'abc", 6));
        assert!(!is_inside_literal("'abc'", 5));
    }

    #[test]
    fn valid_for_predicates() {
        let schema = Schema::new();
        let tree = parse("1 ");
        let result = complete(&tree, &schema, CompletionRequest::at(2)).unwrap();
        assert_eq!(result.mode, CompletionMode::OperatorKeyword);
        assert!(result.is_valid_for("with"));
        assert!(!result.is_valid_for("zzz"));

        let tree = parse("");
        let schema = Schema::new().with_identifier(Identifier::new("foo"));
        let result = complete(&tree, &schema, CompletionRequest::at(0)).unwrap();
        assert!(result.is_valid_for("foo_1"));
        assert!(!result.is_valid_for("1foo"));
    }
}
