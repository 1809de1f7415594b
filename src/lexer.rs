//! The lexer (§4.1): turns a source byte buffer into an ordered token
//! stream. Never aborts — unrecognized bytes become `ERROR` tokens at
//! the offending position and scanning continues.

use crate::span::{Span, Spanned};
use crate::token::TokenKind;

pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
        }
    }

    /// Lex the whole buffer. The returned stream always ends with
    /// exactly one `EOF` token whose span is `[len, len)`.
    pub fn tokenize(mut self) -> Vec<Spanned<TokenKind>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.node == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn next_token(&mut self) -> Spanned<TokenKind> {
        self.skip_whitespace_and_comments();

        if self.pos >= self.source.len() {
            return self.make(TokenKind::Eof, self.pos, self.pos);
        }

        let start = self.pos;
        let ch = self.source[self.pos];

        if is_ident_start(ch) {
            return self.scan_ident_or_keyword();
        }
        if ch.is_ascii_digit() {
            return self.scan_number();
        }
        if ch == b'"' {
            return self.scan_string();
        }
        self.scan_symbol(start)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.source.len() && matches!(self.source[self.pos], b' ' | b'\t' | b'\r' | b'\n') {
                self.pos += 1;
            }
            // Line comments aren't part of the token set; skip them like
            // whitespace rather than erroring on `/`.
            if self.pos + 1 < self.source.len()
                && self.source[self.pos] == b'/'
                && self.source[self.pos + 1] == b'/'
            {
                while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn scan_ident_or_keyword(&mut self) -> Spanned<TokenKind> {
        let start = self.pos;
        while self.pos < self.source.len() && is_ident_continue(self.source[self.pos]) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        let kind = TokenKind::from_keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()));
        self.make(kind, start, self.pos)
    }

    fn scan_number(&mut self) -> Spanned<TokenKind> {
        let start = self.pos;
        while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos + 1 < self.source.len()
            && self.source[self.pos] == b'.'
            && self.source[self.pos + 1].is_ascii_digit()
        {
            self.pos += 1;
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        self.make(TokenKind::Number(text.to_string()), start, self.pos)
    }

    fn scan_string(&mut self) -> Spanned<TokenKind> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let content_start = self.pos;
        while self.pos < self.source.len() && self.source[self.pos] != b'"' {
            self.pos += 1;
        }
        let content = std::str::from_utf8(&self.source[content_start..self.pos])
            .unwrap()
            .to_string();
        if self.pos < self.source.len() {
            self.pos += 1; // closing quote
        } else {
            return self.make(TokenKind::Error, start, self.pos);
        }
        self.make(TokenKind::String(content), start, self.pos)
    }

    fn scan_symbol(&mut self, start: usize) -> Spanned<TokenKind> {
        let ch = self.source[self.pos];
        self.pos += 1;

        let kind = match ch {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b';' => TokenKind::Semicolon,
            b',' => TokenKind::Comma,
            b':' => TokenKind::Colon,
            b'.' => TokenKind::Dot,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::BangEq
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            // `&` and `|` only form tokens when doubled; a lone one is an
            // error, never a panic.
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.pos += 1;
                    TokenKind::AmpAmp
                } else {
                    TokenKind::Error
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.pos += 1;
                    TokenKind::BarBar
                } else {
                    TokenKind::Error
                }
            }
            _ => TokenKind::Error,
        };

        self.make(kind, start, self.pos)
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn make(&self, kind: TokenKind, start: usize, end: usize) -> Spanned<TokenKind> {
        Spanned::new(kind, Span::new(0, start as u32, end as u32))
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}
