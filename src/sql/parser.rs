//! # SQL Parser
//!
//! Recursive descent parser over the zero-copy lexer. Statement-level
//! parsing dispatches on the leading keyword; expressions use precedence
//! climbing (OR < AND < NOT < comparison < primary).
//!
//! Parse errors carry the line/column of the offending token plus the set
//! of tokens that would have been accepted there, which the interactive
//! shell uses for completion. Parsing never touches storage: a script
//! that fails to parse mutates nothing.
//!
//! `IF NOT EXISTS` / `IF EXISTS` are accepted both before the object name
//! (standard SQL) and after it.

use super::ast::*;
use super::lexer::Lexer;
use super::token::{Keyword, Token};
use crate::error::{Error, Result};
use crate::types::{FieldPath, Value, ValueType};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token<'a>,
}

/// Parses a full script into its statements.
pub fn parse_script(input: &str) -> Result<Vec<Statement>> {
    Parser::new(input).parse_statements()
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Self { lexer, current }
    }

    pub fn parse_statements(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            while self.consume_token(&Token::Semicolon) {}
            if matches!(self.current, Token::Eof) {
                return Ok(statements);
            }
            statements.push(self.parse_statement()?);
            if !matches!(self.current, Token::Semicolon | Token::Eof) {
                return Err(self.unexpected(&[";"]));
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current {
            Token::Keyword(Keyword::Create) => self.parse_create(),
            Token::Keyword(Keyword::Drop) => self.parse_drop(),
            Token::Keyword(Keyword::Insert) => self.parse_insert().map(Statement::Insert),
            Token::Keyword(Keyword::Select) => self.parse_select().map(Statement::Select),
            Token::Keyword(Keyword::Update) => self.parse_update().map(Statement::Update),
            Token::Keyword(Keyword::Delete) => self.parse_delete().map(Statement::Delete),
            _ => Err(self.unexpected(&[
                "CREATE", "DROP", "INSERT", "SELECT", "UPDATE", "DELETE",
            ])),
        }
    }

    fn parse_create(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Create)?;
        if self.consume_keyword(Keyword::Table) {
            return self.parse_create_table().map(Statement::CreateTable);
        }
        let unique = self.consume_keyword(Keyword::Unique);
        if self.consume_keyword(Keyword::Index) {
            return self
                .parse_create_index(unique)
                .map(Statement::CreateIndex);
        }
        if unique {
            Err(self.unexpected(&["INDEX"]))
        } else {
            Err(self.unexpected(&["TABLE", "UNIQUE", "INDEX"]))
        }
    }

    fn parse_create_table(&mut self) -> Result<CreateTableStmt> {
        let mut if_not_exists = self.consume_if_not_exists()?;
        let name = self.expect_ident()?;

        let mut fields = Vec::new();
        if self.consume_token(&Token::LParen) {
            loop {
                fields.push(self.parse_field_def()?);
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
            self.expect_token(&Token::RParen, &[")"])?;
        }

        if !if_not_exists {
            if_not_exists = self.consume_if_not_exists()?;
        }

        if fields.iter().filter(|f| f.primary_key).count() > 1 {
            return Err(Error::Validation(format!(
                "table {name} declares more than one primary key"
            )));
        }

        Ok(CreateTableStmt {
            name,
            fields,
            if_not_exists,
        })
    }

    fn parse_field_def(&mut self) -> Result<FieldDef> {
        let name = self.expect_ident()?;
        let field_type = self.parse_field_type()?;
        let primary_key = if self.consume_keyword(Keyword::Primary) {
            self.expect_keyword(Keyword::Key)?;
            true
        } else {
            false
        };
        Ok(FieldDef {
            name,
            field_type,
            primary_key,
        })
    }

    fn parse_field_type(&mut self) -> Result<ValueType> {
        let ty = match self.current {
            Token::Keyword(Keyword::Int) | Token::Keyword(Keyword::Integer) => ValueType::Int,
            Token::Keyword(Keyword::Float)
            | Token::Keyword(Keyword::Real)
            | Token::Keyword(Keyword::Double) => ValueType::Float,
            Token::Keyword(Keyword::Text) => ValueType::Text,
            Token::Keyword(Keyword::Blob) => ValueType::Blob,
            Token::Keyword(Keyword::Bool) | Token::Keyword(Keyword::Boolean) => ValueType::Bool,
            _ => {
                return Err(self.unexpected(&[
                    "INT", "INTEGER", "FLOAT", "REAL", "DOUBLE", "TEXT", "BLOB", "BOOL",
                ]))
            }
        };
        self.advance();
        Ok(ty)
    }

    fn parse_create_index(&mut self, unique: bool) -> Result<CreateIndexStmt> {
        let mut if_not_exists = self.consume_if_not_exists()?;
        let name = self.expect_ident()?;
        self.expect_keyword(Keyword::On)?;
        let table = self.expect_ident()?;
        self.expect_token(&Token::LParen, &["("])?;
        let mut fields = Vec::new();
        loop {
            fields.push(self.parse_field_path()?);
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        self.expect_token(&Token::RParen, &[")"])?;
        if !if_not_exists {
            if_not_exists = self.consume_if_not_exists()?;
        }
        Ok(CreateIndexStmt {
            name,
            table,
            fields,
            unique,
            if_not_exists,
        })
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Drop)?;
        if self.consume_keyword(Keyword::Table) {
            return self.parse_drop_target().map(Statement::DropTable);
        }
        if self.consume_keyword(Keyword::Index) {
            return self.parse_drop_target().map(Statement::DropIndex);
        }
        Err(self.unexpected(&["TABLE", "INDEX"]))
    }

    fn parse_drop_target(&mut self) -> Result<DropStmt> {
        let mut if_exists = self.consume_if_exists()?;
        let name = self.expect_ident()?;
        if !if_exists {
            if_exists = self.consume_if_exists()?;
        }
        Ok(DropStmt { name, if_exists })
    }

    fn parse_insert(&mut self) -> Result<InsertStmt> {
        self.expect_keyword(Keyword::Insert)?;
        self.expect_keyword(Keyword::Into)?;
        let table = self.expect_ident()?;

        let fields = if self.consume_token(&Token::LParen) {
            let mut names = Vec::new();
            loop {
                names.push(self.expect_ident()?);
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
            self.expect_token(&Token::RParen, &[")"])?;
            Some(names)
        } else {
            None
        };

        self.expect_keyword(Keyword::Values)?;
        let mut rows = Vec::new();
        loop {
            self.expect_token(&Token::LParen, &["("])?;
            let mut row = Vec::new();
            loop {
                row.push(self.parse_expr()?);
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
            self.expect_token(&Token::RParen, &[")"])?;
            rows.push(row);
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }

        Ok(InsertStmt {
            table,
            fields,
            rows,
        })
    }

    fn parse_select(&mut self) -> Result<SelectStmt> {
        self.expect_keyword(Keyword::Select)?;

        let mut projections = Vec::new();
        loop {
            if self.consume_token(&Token::Star) {
                projections.push(Projection::Wildcard);
            } else {
                let expr = self.parse_expr()?;
                let alias = if self.consume_keyword(Keyword::As) {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                projections.push(Projection::Expr { expr, alias });
            }
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }

        self.expect_keyword(Keyword::From)?;
        let table = self.expect_ident()?;

        let where_clause = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let order_by = if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            let field = self.parse_field_path()?;
            let ascending = if self.consume_keyword(Keyword::Desc) {
                false
            } else {
                self.consume_keyword(Keyword::Asc);
                true
            };
            Some(OrderBy { field, ascending })
        } else {
            None
        };

        let limit = if self.consume_keyword(Keyword::Limit) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let offset = if self.consume_keyword(Keyword::Offset) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(SelectStmt {
            projections,
            table,
            where_clause,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_update(&mut self) -> Result<UpdateStmt> {
        self.expect_keyword(Keyword::Update)?;
        let table = self.expect_ident()?;
        self.expect_keyword(Keyword::Set)?;

        let mut assignments = Vec::new();
        loop {
            let path = self.parse_field_path()?;
            self.expect_token(&Token::Eq, &["="])?;
            let expr = self.parse_expr()?;
            assignments.push((path, expr));
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }

        let where_clause = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(UpdateStmt {
            table,
            assignments,
            where_clause,
        })
    }

    fn parse_delete(&mut self) -> Result<DeleteStmt> {
        self.expect_keyword(Keyword::Delete)?;
        self.expect_keyword(Keyword::From)?;
        let table = self.expect_ident()?;
        let where_clause = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(DeleteStmt {
            table,
            where_clause,
        })
    }

    // -- Expressions ------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.consume_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.consume_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.consume_keyword(Keyword::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_primary()?;
        let op = match self.current {
            Token::Eq => BinaryOperator::Eq,
            Token::Neq => BinaryOperator::Neq,
            Token::Lt => BinaryOperator::Lt,
            Token::LtEq => BinaryOperator::LtEq,
            Token::Gt => BinaryOperator::Gt,
            Token::GtEq => BinaryOperator::GtEq,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_primary()?;
        Ok(Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.current {
            Token::Number(text) => {
                self.advance();
                Ok(Expr::Literal(parse_number(text, false)?))
            }
            Token::Minus => {
                self.advance();
                match self.current {
                    Token::Number(text) => {
                        self.advance();
                        Ok(Expr::Literal(parse_number(text, true)?))
                    }
                    _ => Err(self.unexpected(&["number"])),
                }
            }
            Token::String(text) => {
                self.advance();
                Ok(Expr::Literal(Value::Text(unescape(text))))
            }
            Token::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Token::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Token::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_token(&Token::RParen, &[")"])?;
                Ok(inner)
            }
            Token::Ident(name) => {
                self.advance();
                if self.consume_token(&Token::LParen) {
                    let mut args = Vec::new();
                    if !matches!(self.current, Token::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.consume_token(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect_token(&Token::RParen, &[")"])?;
                    return Ok(Expr::Call {
                        name: name.to_ascii_lowercase(),
                        args,
                    });
                }
                let mut segments = vec![name.to_string()];
                while self.consume_token(&Token::Dot) {
                    segments.push(self.expect_ident()?);
                }
                Ok(Expr::Field(FieldPath(segments)))
            }
            _ => Err(self.unexpected(&[
                "literal", "identifier", "NOT", "(", "-",
            ])),
        }
    }

    fn parse_field_path(&mut self) -> Result<FieldPath> {
        let mut segments = vec![self.expect_ident()?];
        while self.consume_token(&Token::Dot) {
            segments.push(self.expect_ident()?);
        }
        Ok(FieldPath(segments))
    }

    // -- Token helpers ----------------------------------------------------

    fn advance(&mut self) -> Token<'a> {
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.current, Token::Keyword(k) if k == keyword)
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&[keyword.as_str()]))
        }
    }

    fn consume_token(&mut self, expected: &Token<'_>) -> bool {
        if std::mem::discriminant(&self.current) == std::mem::discriminant(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, expected: &Token<'_>, expected_text: &[&'static str]) -> Result<()> {
        if self.consume_token(expected) {
            Ok(())
        } else {
            Err(self.unexpected(expected_text))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.current {
            Token::Ident(name) => {
                self.advance();
                Ok(name.to_string())
            }
            _ => Err(self.unexpected(&["identifier"])),
        }
    }

    fn consume_if_not_exists(&mut self) -> Result<bool> {
        if self.consume_keyword(Keyword::If) {
            self.expect_keyword(Keyword::Not)?;
            self.expect_keyword(Keyword::Exists)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn consume_if_exists(&mut self) -> Result<bool> {
        if self.consume_keyword(Keyword::If) {
            self.expect_keyword(Keyword::Exists)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn unexpected(&self, expected: &[&'static str]) -> Error {
        Error::Parse {
            message: format!("unexpected {}", self.current),
            line: self.lexer.line(),
            column: self.lexer.column(),
            expected: expected.to_vec(),
        }
    }
}

fn parse_number(text: &str, negative: bool) -> Result<Value> {
    if text.contains('.') {
        let value: f64 = text
            .parse()
            .map_err(|_| Error::Validation(format!("malformed number literal {text:?}")))?;
        Ok(Value::Float(if negative { -value } else { value }))
    } else if negative {
        // Parse with the sign attached so i64::MIN is representable.
        let value: i64 = format!("-{text}")
            .parse()
            .map_err(|_| Error::Validation(format!("malformed number literal -{text}")))?;
        Ok(Value::Int(value))
    } else {
        let value: i64 = text
            .parse()
            .map_err(|_| Error::Validation(format!("malformed number literal {text:?}")))?;
        Ok(Value::Int(value))
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("''", "'")
}
