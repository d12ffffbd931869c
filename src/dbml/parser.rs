//! DBML parser.
//!
//! Top-level statements are parsed one at a time; a statement that fails is
//! skipped up to its closing brace (or line end) and reported, and parsing
//! resumes with the next one.

use super::lexer::{LexError, Lexer, Spanned, Token};
use crate::diagnostic::{self, Diagnostic, Outcome};
use crate::measure::{FRAGMENT_WIDTH, fragment};
use crate::model::{Column, ColumnRef, Direction, ModelError, Reference, Schema, Table, same_name};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DbmlParseError {
    #[error("Lex error: {0}")]
    Lex(#[from] LexError),
    #[error("Expected {expected}, found `{found}`")]
    Expected {
        expected: &'static str,
        found: String,
    },
    #[error("Unexpected end of input, expected {0}")]
    UnexpectedEof(&'static str),
    #[error("Table {0} is missing its closing brace")]
    Unclosed(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Parse DBML into a Schema.
///
/// Table blocks and Ref statements may come in any order. References whose
/// endpoints are missing are kept in the schema and reported.
pub fn parse_dbml(input: &str) -> Outcome<Schema> {
    tracing::debug!(bytes = input.len(), "parsing DBML");
    let tokens = Lexer::new(input).tokenize();
    let mut parser = Parser::new(input, &tokens);
    parser.parse();
    parser.finish()
}

/// Blocks that carry nothing the schema model stores.
const IGNORED_BLOCKS: &[&str] = &["Enum", "Note", "Project", "TableGroup", "TablePartial"];

static EOF: Token = Token::Eof;

/// `key` or `key: value` inside `[...]`; the value is a token range.
struct Setting {
    key: String,
    value: Option<(usize, usize)>,
}

struct Parser<'a> {
    input: &'a str,
    tokens: &'a [Spanned],
    pos: usize,
    schema: Schema,
    /// Lowercased alias -> table name.
    aliases: HashMap<String, String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, tokens: &'a [Spanned]) -> Self {
        Self {
            input,
            tokens,
            pos: 0,
            schema: Schema::new(),
            aliases: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn peek(&self) -> &'a Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &'a Token {
        self.tokens.get(self.pos + n).map_or(&EOF, |s| &s.token)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.peek().is_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_newlines(&mut self) {
        while *self.peek() == Token::Newline {
            self.advance();
        }
    }

    /// Raw input covered by tokens `from..to`.
    fn text(&self, from: usize, to: usize) -> &'a str {
        let to = to.min(self.tokens.len());
        if from >= to {
            return "";
        }
        &self.input[self.tokens[from].span.start..self.tokens[to - 1].span.end]
    }

    /// Raw input strictly between two bracket tokens.
    fn inner(&self, open: usize, close: usize) -> &'a str {
        self.input[self.tokens[open].span.end..self.tokens[close].span.start].trim()
    }

    fn unexpected(&self, expected: &'static str) -> DbmlParseError {
        match self.peek() {
            Token::Eof => DbmlParseError::UnexpectedEof(expected),
            Token::Invalid(err) => DbmlParseError::Lex(err.clone()),
            _ => DbmlParseError::Expected {
                expected,
                found: self.text(self.pos, self.pos + 1).to_string(),
            },
        }
    }

    fn expect(&mut self, token: Token, what: &'static str) -> Result<(), DbmlParseError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn name(&mut self) -> Result<String, DbmlParseError> {
        match self.peek().name() {
            Some(name) => {
                self.advance();
                Ok(name.to_string())
            }
            None => Err(self.unexpected("name")),
        }
    }

    /// `schema.table` keeps only the last part.
    fn qualified_name(&mut self) -> Result<String, DbmlParseError> {
        let mut name = self.name()?;
        while self.eat(&Token::Dot) {
            name = self.name()?;
        }
        Ok(name)
    }

    fn end_of_line(&mut self) -> Result<(), DbmlParseError> {
        match self.peek() {
            Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::RBrace | Token::Eof => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    /// Consume a bracketed group (`(..)`, `[..]` or `{..}`) and return the
    /// indexes of its first and last token. Only braces may span lines.
    fn skip_group(&mut self) -> Result<(usize, usize), DbmlParseError> {
        let (opener, closer) = match self.peek() {
            Token::LParen => (Token::LParen, Token::RParen),
            Token::LBracket => (Token::LBracket, Token::RBracket),
            Token::LBrace => (Token::LBrace, Token::RBrace),
            _ => return Err(self.unexpected("opening bracket")),
        };
        let open = self.pos;
        let mut depth = 0usize;
        loop {
            let token = self.peek();
            if *token == opener {
                depth += 1;
            } else if *token == closer {
                depth -= 1;
                if depth == 0 {
                    let close = self.pos;
                    self.advance();
                    return Ok((open, close));
                }
            } else {
                match token {
                    Token::Eof => return Err(DbmlParseError::UnexpectedEof("closing bracket")),
                    Token::Invalid(err) => return Err(err.clone().into()),
                    Token::Newline if opener != Token::LBrace => {
                        return Err(DbmlParseError::Expected {
                            expected: "closing bracket",
                            found: "end of line".to_string(),
                        });
                    }
                    _ => {}
                }
            }
            self.advance();
        }
    }

    /// Skip the rest of a line, stopping before a `}` that closes the
    /// enclosing block.
    fn skip_line(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Token::Newline | Token::Eof => return,
                Token::RBrace if depth == 0 => return,
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip a whole top-level statement: to the end of its line, or past the
    /// brace block it opens.
    fn skip_statement(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Token::Eof => return,
                Token::Newline if depth == 0 => return,
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// A line inside a table body that is really the next top-level
    /// statement, meaning the table was never closed.
    fn at_statement_start(&self) -> bool {
        let first = self.peek();
        if first.is_word("Ref") {
            let after_name = if self.peek_at(1).name().is_some() { 2 } else { 1 };
            return matches!(self.peek_at(after_name), Token::Colon | Token::LBrace);
        }
        let opens_block = ["Table", "Enum", "TableGroup", "Project"]
            .iter()
            .any(|w| first.is_word(w));
        opens_block
            && self.tokens[self.pos..]
                .iter()
                .take_while(|s| s.token != Token::Newline)
                .any(|s| s.token == Token::LBrace)
    }

    fn parse(&mut self) {
        loop {
            self.skip_newlines();
            let start = self.pos;
            let result = match self.peek() {
                Token::Eof => break,
                t if t.is_word("Table") => self.table(),
                t if t.is_word("Ref") => self.reference_statement(),
                t if IGNORED_BLOCKS.iter().any(|w| t.is_word(w)) => {
                    self.skip_statement();
                    Ok(())
                }
                _ => Err(self.unexpected("Table, Ref or another top-level block")),
            };

            if let Err(err) = result {
                if !matches!(err, DbmlParseError::Unclosed(_)) {
                    self.pos = start;
                    self.skip_statement();
                }
                let fragment = fragment(self.text(start, self.pos), FRAGMENT_WIDTH);
                let reason = err.to_string();
                tracing::warn!(%fragment, %reason, "skipping DBML statement");
                self.diagnostics
                    .push(Diagnostic::SkippedStatement { fragment, reason });
            }
        }
    }

    fn table(&mut self) -> Result<(), DbmlParseError> {
        self.advance(); // Table
        let name = self.qualified_name()?;
        let alias = if self.eat_word("as") {
            Some(self.name()?)
        } else {
            None
        };
        if *self.peek() == Token::LBracket {
            self.skip_group()?; // headercolor, note
        }
        self.skip_newlines();
        self.expect(Token::LBrace, "{")?;

        let mut table = Table::new(&name)?;
        let mut references = Vec::new();
        loop {
            self.skip_newlines();
            let line = self.pos;
            match self.peek() {
                Token::RBrace => {
                    self.advance();
                    break;
                }
                Token::Eof => return Err(DbmlParseError::Unclosed(name)),
                _ if self.at_statement_start() => return Err(DbmlParseError::Unclosed(name)),
                t if t.is_word("indexes") && *self.peek_at(1) == Token::LBrace => {
                    self.indexes(&mut table)?;
                }
                t if t.is_word("Note") && matches!(self.peek_at(1), Token::Colon | Token::LBrace) => {
                    self.skip_statement();
                }
                _ => {
                    if let Err(err) = self.column_line(&mut table, &mut references) {
                        self.skip_line();
                        self.skipped_definition(&name, line, err);
                    }
                }
            }
        }

        if let Some(alias) = alias {
            self.aliases.insert(alias.to_lowercase(), name.clone());
        }
        let columns = table.columns().len();
        if self.schema.add_table(table).is_err() {
            tracing::warn!(table = %name, "duplicate table ignored");
            self.diagnostics.push(Diagnostic::DuplicateTable(name));
            return Ok(());
        }
        tracing::debug!(table = %name, columns, references = references.len(), "parsed table");
        self.schema.references.extend(references);
        Ok(())
    }

    fn skipped_definition(&mut self, table: &str, line: usize, err: DbmlParseError) {
        let text = self.text(line, self.pos);
        tracing::warn!(table, definition = text, %err, "skipping definition");
        self.diagnostics.push(Diagnostic::SkippedDefinition {
            table: table.to_string(),
            fragment: fragment(text, FRAGMENT_WIDTH),
            reason: err.to_string(),
        });
    }

    /// `name type [settings]`
    fn column_line(
        &mut self,
        table: &mut Table,
        references: &mut Vec<Reference>,
    ) -> Result<(), DbmlParseError> {
        let name = self.name()?;
        let typ = self.column_type()?;
        let mut column = Column::new(&name, &typ)?;
        let mut targets = Vec::new();
        if *self.peek() == Token::LBracket {
            for setting in self.settings()? {
                self.apply_setting(&table.name, &mut column, setting, &mut targets)?;
            }
        }
        self.end_of_line()?;

        if table.column(&name).is_some() {
            tracing::warn!(table = %table.name, column = %name, "duplicate column");
            self.diagnostics.push(Diagnostic::DuplicateColumn {
                table: table.name.clone(),
                column: name,
            });
            return Ok(());
        }
        if column.is_primary_key {
            if let Some(existing) = table.primary_key() {
                self.diagnostics.push(Diagnostic::ConflictingPrimaryKey {
                    table: table.name.clone(),
                    kept: existing.name.clone(),
                    ignored: name.clone(),
                });
                column.is_primary_key = false;
            }
        }
        table.add_column(column)?;

        let source = ColumnRef::new(&table.name, &name);
        references.extend(
            targets
                .into_iter()
                .map(|(direction, target)| Reference::new(source.clone(), direction, target)),
        );
        Ok(())
    }

    /// A type name, optionally schema-qualified or double-quoted, followed by
    /// a verbatim parameter list and `[]`.
    fn column_type(&mut self) -> Result<String, DbmlParseError> {
        let start = self.pos;
        let mut typ = match self.peek() {
            Token::QuotedIdent(s) => {
                self.advance();
                s.clone()
            }
            Token::Ident(_) => {
                self.advance();
                while *self.peek() == Token::Dot && self.peek_at(1).name().is_some() {
                    self.advance();
                    self.advance();
                }
                self.text(start, self.pos).to_string()
            }
            _ => return Err(self.unexpected("column type")),
        };

        if *self.peek() == Token::LParen {
            let (open, close) = self.skip_group()?;
            typ.push_str(self.text(open, close + 1));
        }
        if *self.peek() == Token::LBracket && *self.peek_at(1) == Token::RBracket {
            self.advance();
            self.advance();
            typ.push_str("[]");
        }
        Ok(typ)
    }

    /// `[pk, not null, default: 'a,b', ref: > users.id]`
    fn settings(&mut self) -> Result<Vec<Setting>, DbmlParseError> {
        let (open, close) = self.skip_group()?;
        let mut settings = Vec::new();

        for (from, to) in split_top_level(self.tokens, open + 1, close) {
            let mut words = Vec::new();
            let mut i = from;
            while i < to {
                match &self.tokens[i].token {
                    Token::Ident(word) => words.push(word.to_lowercase()),
                    Token::Colon => break,
                    Token::Newline => {}
                    Token::Invalid(err) => return Err(err.clone().into()),
                    _ => {
                        return Err(DbmlParseError::Expected {
                            expected: "setting",
                            found: self.text(i, i + 1).to_string(),
                        });
                    }
                }
                i += 1;
            }
            if words.is_empty() {
                return Err(DbmlParseError::Expected {
                    expected: "setting",
                    found: self.text(from, to).to_string(),
                });
            }
            settings.push(Setting {
                key: words.join(" "),
                value: (i < to).then_some((i + 1, to)),
            });
        }
        Ok(settings)
    }

    /// Verbatim value text. A lone backtick token is unwrapped.
    fn value(&self, setting: &Setting) -> Result<String, DbmlParseError> {
        let Some((from, to)) = setting.value else {
            return Err(DbmlParseError::Expected {
                expected: "`:` and a value",
                found: setting.key.clone(),
            });
        };
        let value = match &self.tokens[from..to] {
            [Spanned {
                token: Token::Backtick(inner),
                ..
            }] => inner.trim().to_string(),
            _ => self.text(from, to).trim().to_string(),
        };
        if value.is_empty() {
            return Err(DbmlParseError::Expected {
                expected: "value",
                found: setting.key.clone(),
            });
        }
        Ok(value)
    }

    fn apply_setting(
        &mut self,
        table: &str,
        column: &mut Column,
        setting: Setting,
        targets: &mut Vec<(Direction, ColumnRef)>,
    ) -> Result<(), DbmlParseError> {
        match setting.key.as_str() {
            "pk" | "primary key" => column.is_primary_key = true,
            "not null" => column.is_not_null = true,
            "null" => column.is_not_null = false,
            "unique" => column.is_unique = true,
            "increment" => column.is_auto_increment = true,
            "index" => column.is_indexed = true,
            "default" => column.default_value = Some(self.value(&setting)?),
            "check" => column.check_constraint = Some(self.value(&setting)?),
            "note" => {}
            "ref" => {
                let Some((from, to)) = setting.value else {
                    return Err(self.unexpected("ref target"));
                };
                let saved = self.pos;
                self.pos = from;
                let parsed = self.direction().and_then(|d| Ok((d, self.endpoint()?)));
                self.pos = saved;

                match parsed? {
                    (Some(direction), target) => targets.push((direction, target)),
                    (None, _) => {
                        let text = format!("{}.{} {}", table, column.name, self.text(from, to));
                        tracing::warn!(relationship = %text, "unsupported relationship");
                        self.diagnostics.push(Diagnostic::UnsupportedRelationship(text));
                    }
                }
            }
            other => self.diagnostics.push(Diagnostic::Unsupported {
                table: table.to_string(),
                detail: format!("column setting `{}` on {}", other, column.name),
            }),
        }
        Ok(())
    }

    /// `>` and `<` map to a direction; `-` and `<>` parse but are not
    /// representable.
    fn direction(&mut self) -> Result<Option<Direction>, DbmlParseError> {
        let direction = match self.peek() {
            Token::Gt => Some(Direction::ManyToOne),
            Token::Lt => Some(Direction::OneToMany),
            Token::Minus | Token::LtGt => None,
            _ => return Err(self.unexpected("relationship operator")),
        };
        self.advance();
        Ok(direction)
    }

    /// `table.column`, or `schema.table.column`.
    fn endpoint(&mut self) -> Result<ColumnRef, DbmlParseError> {
        let mut parts = vec![self.name()?];
        while self.eat(&Token::Dot) {
            parts.push(self.name()?);
        }
        match parts.as_slice() {
            [.., table, column] => Ok(ColumnRef::new(table, column)),
            _ => Err(self.unexpected("`.` and a column name")),
        }
    }

    /// `Ref [name]: a.x > b.y [options]` or `Ref [name] { ... }`
    fn reference_statement(&mut self) -> Result<(), DbmlParseError> {
        self.advance(); // Ref
        if self.peek().name().is_some() {
            self.advance();
        }
        match self.peek() {
            Token::Colon => {
                self.advance();
                self.relationship()?;
                self.end_of_line()
            }
            Token::LBrace => {
                self.advance();
                loop {
                    self.skip_newlines();
                    if self.eat(&Token::RBrace) {
                        return Ok(());
                    }
                    if *self.peek() == Token::Eof {
                        return Err(self.unexpected("}"));
                    }
                    self.relationship()?;
                    self.end_of_line()?;
                }
            }
            _ => Err(self.unexpected("`:` or `{`")),
        }
    }

    fn relationship(&mut self) -> Result<(), DbmlParseError> {
        let start = self.pos;
        let source = self.endpoint()?;
        let direction = self.direction()?;
        let target = self.endpoint()?;
        let options = if *self.peek() == Token::LBracket {
            let (open, close) = self.skip_group()?;
            Some(self.inner(open, close))
        } else {
            None
        };

        match direction {
            Some(direction) => {
                let mut reference = Reference::new(source, direction, target);
                if let Some(options) = options {
                    reference = reference.with_options(options);
                }
                self.schema.references.push(reference);
            }
            None => {
                let text = self.text(start, self.pos).to_string();
                tracing::warn!(relationship = %text, "unsupported relationship");
                self.diagnostics
                    .push(Diagnostic::UnsupportedRelationship(text));
            }
        }
        Ok(())
    }

    /// `indexes { col [unique] \n (a, b) [pk] }`
    fn indexes(&mut self, table: &mut Table) -> Result<(), DbmlParseError> {
        self.advance(); // indexes
        self.advance(); // {
        loop {
            self.skip_newlines();
            let line = self.pos;
            match self.peek() {
                Token::RBrace => {
                    self.advance();
                    return Ok(());
                }
                Token::Eof => return Err(self.unexpected("}")),
                _ => {}
            }
            if let Err(err) = self.index_line(table) {
                self.skip_line();
                let name = table.name.clone();
                self.skipped_definition(&name, line, err);
            }
        }
    }

    fn index_line(&mut self, table: &mut Table) -> Result<(), DbmlParseError> {
        let start = self.pos;
        let column = match self.peek() {
            Token::Ident(_) | Token::QuotedIdent(_) => Some(self.name()?),
            Token::LParen => {
                self.skip_group()?;
                None
            }
            Token::Backtick(_) => {
                self.advance();
                None
            }
            _ => return Err(self.unexpected("index column")),
        };
        let target = self.text(start, self.pos).to_string();
        let settings = if *self.peek() == Token::LBracket {
            self.settings()?
        } else {
            Vec::new()
        };
        self.end_of_line()?;

        let Some(column) = column else {
            self.diagnostics.push(Diagnostic::Unsupported {
                table: table.name.clone(),
                detail: format!("composite index {}", target),
            });
            return Ok(());
        };

        let has = |key: &str| settings.iter().any(|s| s.key == key);
        if has("pk") || has("primary key") {
            if let Some(existing) = table.primary_key() {
                if !same_name(&existing.name, &column) {
                    self.diagnostics.push(Diagnostic::ConflictingPrimaryKey {
                        table: table.name.clone(),
                        kept: existing.name.clone(),
                        ignored: column,
                    });
                }
                return Ok(());
            }
            table.set_primary_key(&column)?;
            return Ok(());
        }

        let unique = has("unique");
        let Some(col) = table.column_mut(&column) else {
            return Err(ModelError::UnknownColumn {
                table: table.name.clone(),
                column,
            }
            .into());
        };
        col.is_indexed = true;
        col.is_unique |= unique;
        Ok(())
    }

    fn finish(mut self) -> Outcome<Schema> {
        if !self.aliases.is_empty() {
            let mut references = std::mem::take(&mut self.schema.references);
            for reference in &mut references {
                for end in [&mut reference.source, &mut reference.target] {
                    if self.schema.table(&end.table).is_none() {
                        if let Some(table) = self.aliases.get(&end.table.to_lowercase()) {
                            end.table = table.clone();
                        }
                    }
                }
            }
            self.schema.references = references;
        }

        let mut diagnostics = self.diagnostics;
        diagnostics.extend(diagnostic::unresolved_references(&self.schema));
        tracing::debug!(
            tables = self.schema.tables().len(),
            references = self.schema.references.len(),
            diagnostics = diagnostics.len(),
            "DBML import finished"
        );
        Outcome::new(self.schema, diagnostics)
    }
}

/// Token ranges between depth-0 commas of `tokens[from..to]`, empty pieces
/// dropped.
fn split_top_level(tokens: &[Spanned], from: usize, to: usize) -> Vec<(usize, usize)> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = from;
    for i in from..to {
        match tokens[i].token {
            Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 => {
                if i > start {
                    parts.push((start, i));
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if to > start {
        parts.push((start, to));
    }
    parts
}
