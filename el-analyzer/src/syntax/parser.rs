use super::lexer::{normalize_keyword, Lexer, Token, TokenKind};
use super::{Span, SyntaxKind, SyntaxTree, TreeBuilder};

const TERNARY_PRECEDENCE: u16 = 1;
const UNARY_NOT_PRECEDENCE: u16 = 50;
const UNARY_SIGN_PRECEDENCE: u16 = 500;

/// Deepest expression nesting the parser builds. Anything below it is left
/// to recovery as flat `Error` leaves, which keeps every recursive walk over
/// the tree within a bounded stack.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

fn binary_precedence(token: &Token, text: &str) -> Option<(u16, Assoc)> {
    let left = |precedence| Some((precedence, Assoc::Left));
    match token.kind {
        TokenKind::Question => Some((TERNARY_PRECEDENCE, Assoc::Right)),
        TokenKind::Keyword => match normalize_keyword(text).as_str() {
            "or" => left(10),
            "xor" => left(12),
            "and" => left(15),
            "in" | "not in" | "contains" | "matches" | "starts with" | "ends with" => left(20),
            _ => None,
        },
        TokenKind::Operator => match text {
            "??" | "?:" => Some((5, Assoc::Right)),
            "||" => left(10),
            "&&" => left(15),
            "|" => left(16),
            "^" => left(17),
            "&" => left(18),
            "==" | "===" | "!=" | "!==" | "<" | ">" | "<=" | ">=" => left(20),
            ".." | "<<" | ">>" => left(25),
            "+" | "-" => left(30),
            "~" => left(40),
            "*" | "/" | "%" => left(60),
            "**" => Some((200, Assoc::Right)),
            _ => None,
        },
        _ => None,
    }
}

/// Parses `source` into a syntax tree. Never fails: malformed input is
/// represented by `Error` nodes.
pub fn parse(source: &str) -> SyntaxTree {
    let tokens = Lexer::new(source).tokenize();
    let mut parser = Parser::new(source, tokens);
    parser.parse_root();
    let tree = parser.builder.finish_lenient();
    tracing::trace!(nodes = tree.node_count(), "parsed expression");
    tree
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
    /// Offset of the most recent empty `Error` placeholder.
    gap_at: Option<usize>,
    builder: TreeBuilder,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            current: 0,
            depth: 0,
            gap_at: None,
            builder: TreeBuilder::new(source),
        }
    }

    fn parse_root(&mut self) {
        self.builder.start_node(SyntaxKind::Expression);
        if self.peek().kind != TokenKind::Eof {
            self.parse_expression(0);
        }

        loop {
            self.flush_comments();
            if self.peek().kind == TokenKind::Eof {
                break;
            }
            self.bump(SyntaxKind::Error);
        }
        self.builder.close();
    }

    fn parse_expression(&mut self, min_precedence: u16) {
        self.flush_comments();
        if self.depth >= MAX_NESTING {
            self.missing();
            return;
        }
        let entry = self.depth;
        self.depth += 1;
        self.parse_binary(min_precedence);
        self.depth = entry;
    }

    fn parse_binary(&mut self, min_precedence: u16) {
        let checkpoint = self.builder.checkpoint();
        if !self.parse_unary() {
            return;
        }

        loop {
            let token = self.peek();
            let Some((precedence, assoc)) = binary_precedence(&token, self.text(&token)) else {
                break;
            };
            if precedence < min_precedence || !self.nest() {
                break;
            }
            let next_min = match assoc {
                Assoc::Left => precedence + 1,
                Assoc::Right => precedence,
            };

            if token.kind == TokenKind::Question {
                self.builder
                    .open_at(checkpoint, SyntaxKind::TernaryExpression);
                self.bump(SyntaxKind::Operator);
                self.parse_expression(0);
                if self.peek().kind == TokenKind::Colon {
                    self.bump(SyntaxKind::Operator);
                    self.parse_expression(next_min);
                } else {
                    self.builder.retag(SyntaxKind::BinaryExpression);
                }
                self.builder.close();
                continue;
            }

            self.builder
                .open_at(checkpoint, SyntaxKind::BinaryExpression);
            let operator = if token.kind == TokenKind::Keyword {
                SyntaxKind::OperatorKeyword
            } else {
                SyntaxKind::Operator
            };
            self.bump(operator);
            self.parse_expression(next_min);
            self.builder.close();
        }
    }

    /// Accounts for one more level of wrapping around the current operand.
    /// Returns `false` once the nesting limit is reached.
    fn nest(&mut self) -> bool {
        if self.depth >= MAX_NESTING {
            return false;
        }
        self.depth += 1;
        true
    }

    /// Returns `false` when no operand could be parsed; an empty `Error`
    /// node stands in for it.
    fn parse_unary(&mut self) -> bool {
        let token = self.peek();
        let text = self.text(&token);
        let (operator, precedence) = match (token.kind, text) {
            (TokenKind::Keyword, "not") => (SyntaxKind::OperatorKeyword, UNARY_NOT_PRECEDENCE),
            (TokenKind::Operator, "!") => (SyntaxKind::UnaryOperator, UNARY_NOT_PRECEDENCE),
            (TokenKind::Operator, "-" | "+") => (SyntaxKind::UnaryOperator, UNARY_SIGN_PRECEDENCE),
            _ => return self.parse_postfix(),
        };

        self.builder.start_node(SyntaxKind::UnaryExpression);
        self.bump(operator);
        self.parse_expression(precedence);
        self.builder.close();
        true
    }

    fn parse_postfix(&mut self) -> bool {
        let checkpoint = self.builder.checkpoint();
        if !self.parse_primary() {
            return false;
        }

        loop {
            let token = self.peek();
            if matches!(token.kind, TokenKind::Dot | TokenKind::QuestionDot | TokenKind::LBracket)
                && !self.nest()
            {
                break;
            }
            match token.kind {
                TokenKind::Dot | TokenKind::QuestionDot => {
                    self.builder
                        .open_at(checkpoint, SyntaxKind::PropertyAccess);
                    let separator = if token.kind == TokenKind::Dot {
                        SyntaxKind::MemberOf
                    } else {
                        SyntaxKind::NullSafeMemberOf
                    };
                    self.bump(separator);

                    if !self.is_member_name(&self.peek()) {
                        self.missing();
                        self.builder.close();
                        break;
                    }

                    if self.peek_nth(1).kind == TokenKind::LParen {
                        self.builder.retag(SyntaxKind::MethodAccess);
                        self.bump(SyntaxKind::Method);
                        self.builder.close();
                        self.builder.open_at(checkpoint, SyntaxKind::Call);
                        self.parse_arguments();
                        self.builder.close();
                    } else {
                        self.bump(SyntaxKind::Property);
                        self.builder.close();
                    }
                }
                TokenKind::LBracket => {
                    self.builder.open_at(checkpoint, SyntaxKind::ArrayAccess);
                    self.bump_punct();
                    if self.peek().kind == TokenKind::RBracket {
                        self.missing();
                    } else {
                        self.parse_expression(0);
                    }
                    self.expect_closer(TokenKind::RBracket);
                    self.builder.close();
                }
                _ => break,
            }
        }
        true
    }

    fn parse_primary(&mut self) -> bool {
        let token = self.peek();
        match token.kind {
            TokenKind::Number => self.bump(SyntaxKind::Number),
            TokenKind::String { .. } => self.bump(SyntaxKind::String),
            TokenKind::Boolean => self.bump(SyntaxKind::Boolean),
            TokenKind::Null => self.bump(SyntaxKind::Null),
            TokenKind::Identifier => {
                if self.peek_nth(1).kind == TokenKind::LParen {
                    self.builder.start_node(SyntaxKind::Call);
                    self.bump(SyntaxKind::Function);
                    self.parse_arguments();
                    self.builder.close();
                } else {
                    self.bump(SyntaxKind::Variable);
                }
            }
            TokenKind::LParen => {
                self.builder.start_node(SyntaxKind::Application);
                self.bump_punct();
                if self.peek().kind == TokenKind::RParen {
                    self.missing();
                } else {
                    self.parse_expression(0);
                }
                self.expect_closer(TokenKind::RParen);
                self.builder.close();
            }
            TokenKind::LBracket => {
                self.builder.start_node(SyntaxKind::Array);
                self.bump_punct();
                let closed = self.parse_list(TokenKind::RBracket, Self::parse_list_element);
                self.builder.close();
                self.mark_unclosed(closed);
            }
            TokenKind::LBrace => {
                self.builder.start_node(SyntaxKind::Object);
                self.bump_punct();
                let closed = self.parse_list(TokenKind::RBrace, Self::parse_object_entry);
                self.builder.close();
                self.mark_unclosed(closed);
            }
            _ => {
                self.missing();
                return false;
            }
        }
        true
    }

    fn parse_arguments(&mut self) {
        self.flush_comments();
        self.builder.start_node(SyntaxKind::Arguments);
        self.bump_punct();
        let closed = self.parse_list(TokenKind::RParen, Self::parse_list_element);
        self.builder.close();
        self.mark_unclosed(closed);
    }

    /// Parses comma separated elements up to `close`. Returns `false` when the
    /// input ends before `close`.
    fn parse_list(&mut self, close: TokenKind, element: fn(&mut Self)) -> bool {
        let mut expect_element = true;
        let mut seen_comma = false;

        loop {
            let token = self.peek();
            if token.kind == close || token.kind == TokenKind::Eof {
                if expect_element && seen_comma {
                    self.missing();
                }
                if token.kind == close {
                    self.bump_punct();
                    return true;
                }
                self.flush_comments();
                return false;
            }

            if token.kind == TokenKind::Comma {
                if expect_element {
                    self.missing();
                }
                self.bump_punct();
                expect_element = true;
                seen_comma = true;
                continue;
            }

            if expect_element {
                element(self);
                expect_element = false;
            } else {
                self.bump(SyntaxKind::Error);
            }
        }
    }

    fn parse_list_element(&mut self) {
        self.parse_expression(0);
    }

    fn parse_object_entry(&mut self) {
        let key = self.peek();
        match key.kind {
            TokenKind::Identifier | TokenKind::String { .. } => self.bump(SyntaxKind::String),
            TokenKind::Number => self.bump(SyntaxKind::Number),
            _ => self.parse_expression(0),
        }

        if self.peek().kind == TokenKind::Colon {
            self.bump_punct();
            self.parse_expression(0);
        } else {
            self.missing();
        }
    }

    /// Skips stray tokens as `Error` leaves until `close`, then consumes it.
    fn expect_closer(&mut self, close: TokenKind) {
        loop {
            let token = self.peek();
            if token.kind == close {
                self.bump_punct();
                return;
            }
            if token.kind == TokenKind::Eof {
                self.flush_comments();
                self.mark_gap(token.span.from);
                return;
            }
            self.bump(SyntaxKind::Error);
        }
    }

    /// Marks a missing operand with an empty `Error` node at the next token.
    fn missing(&mut self) {
        self.flush_comments();
        let at = self.peek().span.from;
        self.builder.empty(SyntaxKind::Error, at);
        self.gap_at = Some(at);
    }

    /// Marks input ending inside an unclosed bracket, unless a missing
    /// operand already left a placeholder at the same offset.
    fn mark_gap(&mut self, at: usize) {
        if self.gap_at != Some(at) {
            self.builder.empty(SyntaxKind::Error, at);
            self.gap_at = Some(at);
        }
    }

    fn mark_unclosed(&mut self, closed: bool) {
        if !closed {
            self.mark_gap(self.source.len());
        }
    }

    fn is_member_name(&self, token: &Token) -> bool {
        match token.kind {
            TokenKind::Identifier | TokenKind::Boolean | TokenKind::Null => true,
            TokenKind::Keyword => !self.text(token).contains(char::is_whitespace),
            _ => false,
        }
    }

    fn flush_comments(&mut self) {
        while let Some(token) = self.tokens.get(self.current).copied() {
            if !matches!(token.kind, TokenKind::Comment { .. }) {
                break;
            }
            self.builder.token(SyntaxKind::BlockComment, token.span);
            self.current += 1;
        }
    }

    fn bump(&mut self, kind: SyntaxKind) {
        self.flush_comments();
        if let Some(token) = self.advance() {
            self.builder.token(kind, token.span);
        }
    }

    fn bump_punct(&mut self) {
        self.flush_comments();
        if let Some(token) = self.advance() {
            self.builder.punct(token.span);
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.current).copied()?;
        if token.kind == TokenKind::Eof {
            return None;
        }
        self.current += 1;
        Some(token)
    }

    fn peek(&self) -> Token {
        self.peek_nth(0)
    }

    /// The `n`th upcoming token, not counting comments.
    fn peek_nth(&self, n: usize) -> Token {
        self.tokens[self.current..]
            .iter()
            .filter(|token| !matches!(token.kind, TokenKind::Comment { .. }))
            .nth(n)
            .copied()
            .unwrap_or(Token {
                kind: TokenKind::Eof,
                span: Span::empty(self.source.len()),
            })
    }

    fn text(&self, token: &Token) -> &'a str {
        token.text(self.source)
    }
}
