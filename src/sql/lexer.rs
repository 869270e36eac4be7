//! # SQL Lexer
//!
//! Zero-copy tokenizer: identifiers, string and number literals are
//! borrowed slices into the input. Keywords resolve through a
//! compile-time perfect hash map, and the lexer tracks line/column for
//! parse error reporting.
//!
//! Comments (`--` to end of line, `/* ... */`) are skipped as
//! whitespace. Invalid input produces `Token::Error` rather than
//! aborting, which lets the parser attach position information.

use super::token::{Keyword, Token};
use phf::phf_map;

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "AND" => Keyword::And,
    "AS" => Keyword::As,
    "ASC" => Keyword::Asc,
    "BLOB" => Keyword::Blob,
    "BOOL" => Keyword::Bool,
    "BOOLEAN" => Keyword::Boolean,
    "BY" => Keyword::By,
    "CREATE" => Keyword::Create,
    "DELETE" => Keyword::Delete,
    "DESC" => Keyword::Desc,
    "DOUBLE" => Keyword::Double,
    "DROP" => Keyword::Drop,
    "EXISTS" => Keyword::Exists,
    "FALSE" => Keyword::False,
    "FLOAT" => Keyword::Float,
    "FROM" => Keyword::From,
    "IF" => Keyword::If,
    "INDEX" => Keyword::Index,
    "INSERT" => Keyword::Insert,
    "INT" => Keyword::Int,
    "INTEGER" => Keyword::Integer,
    "INTO" => Keyword::Into,
    "KEY" => Keyword::Key,
    "LIMIT" => Keyword::Limit,
    "NOT" => Keyword::Not,
    "NULL" => Keyword::Null,
    "OFFSET" => Keyword::Offset,
    "ON" => Keyword::On,
    "OR" => Keyword::Or,
    "ORDER" => Keyword::Order,
    "PRIMARY" => Keyword::Primary,
    "REAL" => Keyword::Real,
    "SELECT" => Keyword::Select,
    "SET" => Keyword::Set,
    "TABLE" => Keyword::Table,
    "TEXT" => Keyword::Text,
    "TRUE" => Keyword::True,
    "UNIQUE" => Keyword::Unique,
    "UPDATE" => Keyword::Update,
    "VALUES" => Keyword::Values,
    "WHERE" => Keyword::Where,
};

pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace_and_comments();

        if self.is_eof() {
            return Token::Eof;
        }

        let ch = self.current();

        if ch.is_ascii_alphabetic() || ch == b'_' {
            return self.scan_identifier_or_keyword();
        }

        if ch.is_ascii_digit() {
            return self.scan_number();
        }

        match ch {
            b'\'' => self.scan_string(),
            b'=' => {
                self.advance();
                Token::Eq
            }
            b'!' => {
                self.advance();
                if self.current_is(b'=') {
                    self.advance();
                    Token::Neq
                } else {
                    Token::Error("expected '=' after '!'")
                }
            }
            b'<' => {
                self.advance();
                if self.current_is(b'=') {
                    self.advance();
                    Token::LtEq
                } else if self.current_is(b'>') {
                    self.advance();
                    Token::Neq
                } else {
                    Token::Lt
                }
            }
            b'>' => {
                self.advance();
                if self.current_is(b'=') {
                    self.advance();
                    Token::GtEq
                } else {
                    Token::Gt
                }
            }
            b'(' => {
                self.advance();
                Token::LParen
            }
            b')' => {
                self.advance();
                Token::RParen
            }
            b',' => {
                self.advance();
                Token::Comma
            }
            b'.' => {
                self.advance();
                Token::Dot
            }
            b';' => {
                self.advance();
                Token::Semicolon
            }
            b'*' => {
                self.advance();
                Token::Star
            }
            b'-' => {
                self.advance();
                Token::Minus
            }
            _ => {
                self.advance();
                Token::Error("unexpected character")
            }
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn current(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn current_is(&self, ch: u8) -> bool {
        !self.is_eof() && self.current() == ch
    }

    fn peek_char(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            if self.current() == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while !self.is_eof() && self.current().is_ascii_whitespace() {
                self.advance();
            }
            if self.current_is(b'-') && self.peek_char() == Some(b'-') {
                while !self.is_eof() && self.current() != b'\n' {
                    self.advance();
                }
                continue;
            }
            if self.current_is(b'/') && self.peek_char() == Some(b'*') {
                self.advance();
                self.advance();
                while !self.is_eof() {
                    if self.current() == b'*' && self.peek_char() == Some(b'/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn scan_identifier_or_keyword(&mut self) -> Token<'a> {
        let start = self.pos;
        while !self.is_eof() && (self.current().is_ascii_alphanumeric() || self.current() == b'_') {
            self.advance();
        }
        let ident = &self.input[start..self.pos];
        match KEYWORDS.get(ident.to_ascii_uppercase().as_str()) {
            Some(&keyword) => Token::Keyword(keyword),
            None => Token::Ident(ident),
        }
    }

    fn scan_number(&mut self) -> Token<'a> {
        let start = self.pos;
        while !self.is_eof() && self.current().is_ascii_digit() {
            self.advance();
        }
        if self.current_is(b'.') && self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while !self.is_eof() && self.current().is_ascii_digit() {
                self.advance();
            }
        }
        Token::Number(&self.input[start..self.pos])
    }

    fn scan_string(&mut self) -> Token<'a> {
        self.advance();
        let start = self.pos;
        loop {
            if self.is_eof() {
                return Token::Error("unterminated string literal");
            }
            if self.current() == b'\'' {
                // '' inside a string is an escaped quote
                if self.peek_char() == Some(b'\'') {
                    self.advance();
                    self.advance();
                    continue;
                }
                break;
            }
            self.advance();
        }
        let contents = &self.input[start..self.pos];
        self.advance();
        Token::String(contents)
    }
}
