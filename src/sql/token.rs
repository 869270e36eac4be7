//! Token and keyword definitions for the SQL lexer.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    And,
    As,
    Asc,
    Blob,
    Bool,
    Boolean,
    By,
    Create,
    Delete,
    Desc,
    Double,
    Drop,
    Exists,
    False,
    Float,
    From,
    If,
    Index,
    Insert,
    Int,
    Integer,
    Into,
    Key,
    Limit,
    Not,
    Null,
    Offset,
    On,
    Or,
    Order,
    Primary,
    Real,
    Select,
    Set,
    Table,
    Text,
    True,
    Unique,
    Update,
    Values,
    Where,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::And => "AND",
            Keyword::As => "AS",
            Keyword::Asc => "ASC",
            Keyword::Blob => "BLOB",
            Keyword::Bool => "BOOL",
            Keyword::Boolean => "BOOLEAN",
            Keyword::By => "BY",
            Keyword::Create => "CREATE",
            Keyword::Delete => "DELETE",
            Keyword::Desc => "DESC",
            Keyword::Double => "DOUBLE",
            Keyword::Drop => "DROP",
            Keyword::Exists => "EXISTS",
            Keyword::False => "FALSE",
            Keyword::Float => "FLOAT",
            Keyword::From => "FROM",
            Keyword::If => "IF",
            Keyword::Index => "INDEX",
            Keyword::Insert => "INSERT",
            Keyword::Int => "INT",
            Keyword::Integer => "INTEGER",
            Keyword::Into => "INTO",
            Keyword::Key => "KEY",
            Keyword::Limit => "LIMIT",
            Keyword::Not => "NOT",
            Keyword::Null => "NULL",
            Keyword::Offset => "OFFSET",
            Keyword::On => "ON",
            Keyword::Or => "OR",
            Keyword::Order => "ORDER",
            Keyword::Primary => "PRIMARY",
            Keyword::Real => "REAL",
            Keyword::Select => "SELECT",
            Keyword::Set => "SET",
            Keyword::Table => "TABLE",
            Keyword::Text => "TEXT",
            Keyword::True => "TRUE",
            Keyword::Unique => "UNIQUE",
            Keyword::Update => "UPDATE",
            Keyword::Values => "VALUES",
            Keyword::Where => "WHERE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'a> {
    Keyword(Keyword),
    /// Unquoted identifier, borrowed from the input.
    Ident(&'a str),
    /// String literal contents between the quotes, still containing any
    /// doubled-quote escapes; the parser unescapes.
    String(&'a str),
    /// Numeric literal text, integer or decimal.
    Number(&'a str),
    Eq,
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    Star,
    Minus,
    Eof,
    Error(&'static str),
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Keyword(k) => f.write_str(k.as_str()),
            Token::Ident(s) => write!(f, "identifier {s:?}"),
            Token::String(s) => write!(f, "string {s:?}"),
            Token::Number(s) => write!(f, "number {s}"),
            Token::Eq => f.write_str("="),
            Token::Neq => f.write_str("!="),
            Token::Lt => f.write_str("<"),
            Token::LtEq => f.write_str("<="),
            Token::Gt => f.write_str(">"),
            Token::GtEq => f.write_str(">="),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Dot => f.write_str("."),
            Token::Semicolon => f.write_str(";"),
            Token::Star => f.write_str("*"),
            Token::Minus => f.write_str("-"),
            Token::Eof => f.write_str("end of input"),
            Token::Error(msg) => write!(f, "invalid token ({msg})"),
        }
    }
}
