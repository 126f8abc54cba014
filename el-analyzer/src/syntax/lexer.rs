use super::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String { terminated: bool },
    Boolean,
    Null,
    /// Word operators: `and`, `or`, `xor`, `not`, `in`, `not in`,
    /// `contains`, `matches`, `starts with`, `ends with`.
    Keyword,
    Operator,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Question,
    Dot,
    QuestionDot,
    Comment { terminated: bool },
    Unknown,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, from: usize, to: usize) -> Self {
        Self {
            kind,
            span: Span::new(from, to),
        }
    }

    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.span.from..self.span.to).unwrap_or("")
    }
}

const OPERATORS: &[&str] = &[
    "===", "!==", "**", "..", "==", "!=", "<=", ">=", "<<", ">>", "||", "&&", "??", "?:", "+",
    "-", "*", "/", "%", "<", ">", "!", "~", "|", "^", "&",
];

const SIMPLE_KEYWORDS: &[&str] = &["and", "or", "xor", "in", "contains", "matches"];

pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    /// Splits the whole input into tokens. Never fails: characters outside
    /// the language become [`TokenKind::Unknown`] tokens. The result always
    /// ends with a single [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.position;
        let Some(ch) = self.peek_char() else {
            return Token::new(TokenKind::Eof, start, start);
        };

        match ch {
            '\'' | '"' => self.lex_string(ch),
            '0'..='9' => self.lex_number(),
            '.' if self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number(),
            'a'..='z' | 'A'..='Z' | '_' => self.lex_word(),
            '/' if self.rest().starts_with("/*") => self.lex_comment(),
            '(' => self.simple_token(TokenKind::LParen),
            ')' => self.simple_token(TokenKind::RParen),
            '[' => self.simple_token(TokenKind::LBracket),
            ']' => self.simple_token(TokenKind::RBracket),
            '{' => self.simple_token(TokenKind::LBrace),
            '}' => self.simple_token(TokenKind::RBrace),
            ',' => self.simple_token(TokenKind::Comma),
            ':' => self.simple_token(TokenKind::Colon),
            '?' => self.lex_question_variants(),
            '.' if !self.rest().starts_with("..") => self.simple_token(TokenKind::Dot),
            _ => self.lex_operator(),
        }
    }

    fn lex_string(&mut self, quote: char) -> Token {
        let start = self.position;
        self.advance_char();
        let mut terminated = false;
        while let Some(ch) = self.advance_char() {
            if ch == '\\' {
                self.advance_char();
            } else if ch == quote {
                terminated = true;
                break;
            }
        }
        Token::new(TokenKind::String { terminated }, start, self.position)
    }

    fn lex_number(&mut self) -> Token {
        let start = self.position;
        self.consume_digits();
        if self.peek_char() == Some('.') && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance_char();
            self.consume_digits();
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_char_at(1), Some('+' | '-')));
            if self.peek_char_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..=sign {
                    self.advance_char();
                }
                self.consume_digits();
            }
        }
        Token::new(TokenKind::Number, start, self.position)
    }

    fn consume_digits(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() || ch == '_' {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn lex_word(&mut self) -> Token {
        let start = self.position;
        self.consume_word();
        let word = &self.input[start..self.position];

        let kind = match word {
            "true" | "TRUE" | "false" | "FALSE" => TokenKind::Boolean,
            "null" | "NULL" => TokenKind::Null,
            "not" => {
                self.try_extend_keyword("in");
                TokenKind::Keyword
            }
            "starts" | "ends" => {
                if self.try_extend_keyword("with") {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                }
            }
            _ if SIMPLE_KEYWORDS.contains(&word) => TokenKind::Keyword,
            _ => TokenKind::Identifier,
        };

        Token::new(kind, start, self.position)
    }

    /// Consumes whitespace followed by `next` when `next` is a whole word.
    fn try_extend_keyword(&mut self, next: &str) -> bool {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        if trimmed.len() == rest.len() || !trimmed.starts_with(next) {
            return false;
        }
        let after = &trimmed[next.len()..];
        if after.chars().next().is_some_and(is_word_char) {
            return false;
        }
        self.position += rest.len() - trimmed.len() + next.len();
        true
    }

    fn consume_word(&mut self) {
        while let Some(ch) = self.peek_char() {
            if is_word_char(ch) {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn lex_comment(&mut self) -> Token {
        let start = self.position;
        self.position += 2;
        match self.rest().find("*/") {
            Some(end) => {
                self.position += end + 2;
                Token::new(TokenKind::Comment { terminated: true }, start, self.position)
            }
            None => {
                self.position = self.input.len();
                Token::new(TokenKind::Comment { terminated: false }, start, self.position)
            }
        }
    }

    fn lex_question_variants(&mut self) -> Token {
        let rest = self.rest();
        if rest.starts_with("?.") && !rest[2..].starts_with(|c: char| c.is_ascii_digit()) {
            let start = self.position;
            self.position += 2;
            return Token::new(TokenKind::QuestionDot, start, self.position);
        }
        if rest.starts_with("??") || rest.starts_with("?:") {
            return self.lex_operator();
        }
        self.simple_token(TokenKind::Question)
    }

    fn lex_operator(&mut self) -> Token {
        let start = self.position;
        let rest = self.rest();
        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            Some(op) => {
                self.position += op.len();
                Token::new(TokenKind::Operator, start, self.position)
            }
            None => {
                self.advance_char();
                Token::new(TokenKind::Unknown, start, self.position)
            }
        }
    }

    fn simple_token(&mut self, kind: TokenKind) -> Token {
        let start = self.position;
        self.advance_char();
        Token::new(kind, start, self.position)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.rest().chars().nth(offset)
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.position += ch.len_utf8();
        Some(ch)
    }
}

pub(crate) fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Collapses the inner whitespace of multi-word keywords (`not   in` -> `not in`).
pub fn normalize_keyword(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `text` reads as an identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier_like(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => chars.all(is_word_char),
        _ => false,
    }
}
