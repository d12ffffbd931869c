//! SQL parser for CREATE TABLE statements.
//!
//! Works on the token stream: statements split at `;`, table bodies split at
//! commas outside parentheses. Every nesting walk uses a depth counter, never
//! recursion.

use super::dialect::Dialect;
use super::lexer::{Lexer, Spanned, Token};
use crate::diagnostic::{self, Diagnostic, Outcome};
use crate::measure::{FRAGMENT_WIDTH, fragment};
use crate::model::{
    Column, ColumnRef, Direction, ModelError, Reference, Schema, Table, same_name,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SqlParseError {
    #[error("Expected {expected}, found `{found}`")]
    Expected {
        expected: &'static str,
        found: String,
    },
    #[error("Unexpected end of statement, expected {0}")]
    UnexpectedEnd(&'static str),
    #[error("Unbalanced parentheses")]
    Unbalanced,
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Parse SQL DDL into a Schema.
///
/// Statements that cannot be parsed are skipped and reported; the rest of the
/// input is still imported.
pub fn parse_sql(input: &str, dialect: Dialect) -> Outcome<Schema> {
    let dialect = dialect.resolve(input);
    tracing::debug!(?dialect, bytes = input.len(), "parsing SQL DDL");

    let tokens = Lexer::new(input, dialect).tokenize();
    let mut importer = Importer::new(input);
    for statement in split_statements(&tokens) {
        importer.statement(statement);
    }
    importer.finish()
}

#[derive(Debug, Clone, PartialEq)]
enum TableConstraint {
    PrimaryKey(Vec<String>),
    Unique(Vec<String>),
    Index {
        columns: Vec<String>,
        unique: bool,
    },
    ForeignKey {
        columns: Vec<String>,
        target: String,
        target_columns: Vec<String>,
        options: Option<String>,
    },
    Check(String),
}

enum Definition {
    /// A column plus the constraints its inline modifiers imply.
    Column(Column, Vec<TableConstraint>),
    Constraint(TableConstraint),
}

struct ParsedTable {
    table: Table,
    references: Vec<Reference>,
    diagnostics: Vec<Diagnostic>,
}

enum Statement {
    CreateTable(ParsedTable),
    /// ALTER TABLE .. ADD, CREATE INDEX: applied once every table exists.
    Constraint {
        table: String,
        constraint: TableConstraint,
    },
    Ignored,
}

struct Importer<'a> {
    input: &'a str,
    schema: Schema,
    deferred: Vec<(String, TableConstraint, &'a str)>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Importer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            schema: Schema::new(),
            deferred: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn statement(&mut self, tokens: &'a [Spanned]) {
        let text = source(self.input, tokens);
        let mut parser = Parser::new(self.input, tokens);
        match parser.statement() {
            Ok(Statement::CreateTable(parsed)) => self.add_table(parsed),
            Ok(Statement::Constraint { table, constraint }) => {
                self.deferred.push((table, constraint, text));
            }
            Ok(Statement::Ignored) => {}
            Err(err) => self.skip(text, err.to_string()),
        }
    }

    fn skip(&mut self, text: &str, reason: String) {
        let fragment = fragment(text, FRAGMENT_WIDTH);
        tracing::warn!(%fragment, %reason, "skipping SQL statement");
        self.diagnostics
            .push(Diagnostic::SkippedStatement { fragment, reason });
    }

    fn add_table(&mut self, parsed: ParsedTable) {
        let ParsedTable {
            table,
            references,
            mut diagnostics,
        } = parsed;
        let name = table.name.clone();
        let columns = table.columns().len();

        if self.schema.add_table(table).is_err() {
            tracing::warn!(table = %name, "duplicate table ignored");
            self.diagnostics.push(Diagnostic::DuplicateTable(name));
            return;
        }
        tracing::debug!(table = %name, columns, references = references.len(), "parsed table");
        self.schema.references.extend(references);
        self.diagnostics.append(&mut diagnostics);
    }

    fn finish(mut self) -> Outcome<Schema> {
        for (table_name, constraint, text) in std::mem::take(&mut self.deferred) {
            if let TableConstraint::ForeignKey {
                columns,
                target,
                target_columns,
                options,
            } = constraint
            {
                match foreign_key_references(&table_name, columns, &target, target_columns, options)
                {
                    Ok(refs) => self.schema.references.extend(refs),
                    Err(reason) => self.skip(text, reason),
                }
                continue;
            }

            let Some(table) = self.schema.table_mut(&table_name) else {
                self.skip(text, format!("table {} is not defined", table_name));
                continue;
            };
            let mut references = Vec::new();
            apply_constraint(table, constraint, text, &mut self.diagnostics, &mut references);
        }

        let mut diagnostics = self.diagnostics;
        diagnostics.extend(diagnostic::unresolved_references(&self.schema));
        tracing::debug!(
            tables = self.schema.tables().len(),
            references = self.schema.references.len(),
            diagnostics = diagnostics.len(),
            "SQL import finished"
        );
        Outcome::new(self.schema, diagnostics)
    }
}

/// Raw input covered by a run of tokens.
fn source<'a>(input: &'a str, tokens: &[Spanned]) -> &'a str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => &input[first.span.start..last.span.end],
        _ => "",
    }
}

/// Split at every `;`, and before a CREATE/ALTER that starts a new statement
/// when the previous one was not terminated.
fn split_statements(tokens: &[Spanned]) -> Vec<&[Spanned]> {
    let mut statements = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, spanned) in tokens.iter().enumerate() {
        match spanned.token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Semicolon | Token::Eof => {
                if i > start {
                    statements.push(&tokens[start..i]);
                }
                start = i + 1;
                depth = 0;
            }
            Token::Create | Token::Alter if depth == 0 && i > start => {
                statements.push(&tokens[start..i]);
                start = i;
            }
            _ => {}
        }
    }
    statements
}

/// Split at commas outside parentheses, dropping empty pieces (trailing
/// commas).
fn split_top_level(tokens: &[Spanned]) -> Vec<&[Spanned]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, spanned) in tokens.iter().enumerate() {
        match spanned.token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 => {
                if i > start {
                    parts.push(&tokens[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if tokens.len() > start {
        parts.push(&tokens[start..]);
    }
    parts
}

fn skipped(table: &str, text: &str, reason: String) -> Diagnostic {
    Diagnostic::SkippedDefinition {
        table: table.to_string(),
        fragment: fragment(text, FRAGMENT_WIDTH),
        reason,
    }
}

fn foreign_key_references(
    table: &str,
    columns: Vec<String>,
    target: &str,
    target_columns: Vec<String>,
    options: Option<String>,
) -> Result<Vec<Reference>, String> {
    // REFERENCES t without a column list points at t.id
    let target_columns = if target_columns.is_empty() {
        vec!["id".to_string(); columns.len()]
    } else {
        target_columns
    };
    if columns.is_empty() || columns.len() != target_columns.len() {
        return Err(format!(
            "foreign key ({}) does not match referenced columns ({})",
            columns.join(", "),
            target_columns.join(", ")
        ));
    }

    Ok(columns
        .iter()
        .zip(&target_columns)
        .map(|(column, target_column)| {
            let mut reference = Reference::new(
                ColumnRef::new(table, column),
                Direction::ManyToOne,
                ColumnRef::new(target, target_column),
            );
            reference.options = options.clone();
            reference
        })
        .collect())
}

fn apply_constraint(
    table: &mut Table,
    constraint: TableConstraint,
    text: &str,
    diagnostics: &mut Vec<Diagnostic>,
    references: &mut Vec<Reference>,
) {
    match constraint {
        TableConstraint::PrimaryKey(columns) => {
            let Some(first) = columns.first() else {
                return;
            };
            if let Some(existing) = table.primary_key() {
                if !same_name(&existing.name, first) {
                    diagnostics.push(Diagnostic::ConflictingPrimaryKey {
                        table: table.name.clone(),
                        kept: existing.name.clone(),
                        ignored: columns.join(", "),
                    });
                }
                return;
            }
            if let Err(err) = table.set_primary_key(first) {
                diagnostics.push(skipped(&table.name, text, err.to_string()));
                return;
            }
            if columns.len() > 1 {
                for rest in &columns[1..] {
                    if let Some(col) = table.column_mut(rest) {
                        col.is_not_null = true;
                    }
                }
                diagnostics.push(Diagnostic::CompositeKeyReduced {
                    table: table.name.clone(),
                    columns: columns.join(", "),
                    kept: first.clone(),
                });
            }
        }
        TableConstraint::Unique(columns) => {
            mark_columns(table, &columns, text, "UNIQUE", diagnostics, |c| {
                c.is_unique = true
            });
        }
        TableConstraint::Index { columns, unique } => {
            mark_columns(table, &columns, text, "INDEX", diagnostics, |c| {
                c.is_indexed = true;
                c.is_unique |= unique;
            });
        }
        TableConstraint::ForeignKey {
            columns,
            target,
            target_columns,
            options,
        } => match foreign_key_references(&table.name, columns, &target, target_columns, options) {
            Ok(refs) => references.extend(refs),
            Err(reason) => diagnostics.push(skipped(&table.name, text, reason)),
        },
        TableConstraint::Check(expr) => diagnostics.push(Diagnostic::Unsupported {
            table: table.name.clone(),
            detail: format!("table-level CHECK ({})", expr),
        }),
    }
}

fn mark_columns(
    table: &mut Table,
    columns: &[String],
    text: &str,
    kind: &str,
    diagnostics: &mut Vec<Diagnostic>,
    set: impl Fn(&mut Column),
) {
    match columns {
        [] => {}
        [single] => match table.column_mut(single) {
            Some(column) => set(column),
            None => {
                let reason = format!("column {} is not defined", single);
                diagnostics.push(skipped(&table.name, text, reason));
            }
        },
        _ => diagnostics.push(Diagnostic::Unsupported {
            table: table.name.clone(),
            detail: format!("composite {} ({})", kind, columns.join(", ")),
        }),
    }
}

/// Words that end a column type even though the lexer reports them as plain
/// identifiers.
fn is_type_stop_word(word: &str) -> bool {
    const STOP: &[&str] = &[
        "AS", "CHARACTER", "CHARSET", "COLLATE", "COMMENT", "GENERATED", "IDENTITY",
        "INVISIBLE", "STORED", "VIRTUAL", "VISIBLE",
    ];
    STOP.iter().any(|s| s.eq_ignore_ascii_case(word))
}

fn is_serial(typ: &str) -> bool {
    matches!(
        typ.to_lowercase().as_str(),
        "serial" | "serial2" | "serial4" | "serial8" | "smallserial" | "bigserial"
    )
}

static EOF: Token = Token::Eof;

struct Parser<'a> {
    input: &'a str,
    tokens: &'a [Spanned],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, tokens: &'a [Spanned]) -> Self {
        Self {
            input,
            tokens,
            pos: 0,
        }
    }

    fn current(&self) -> &'a Token {
        self.tokens.get(self.pos).map_or(&EOF, |s| &s.token)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.current() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.current().is_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expected(&self, what: &'static str) -> SqlParseError {
        match self.tokens.get(self.pos) {
            None => SqlParseError::UnexpectedEnd(what),
            Some(tok) => SqlParseError::Expected {
                expected: what,
                found: self.input[tok.span.clone()].to_string(),
            },
        }
    }

    fn expect(&mut self, token: Token, what: &'static str) -> Result<(), SqlParseError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.expected(what))
        }
    }

    /// Raw input of tokens `from..to`.
    fn raw(&self, from: usize, to: usize) -> &'a str {
        source(self.input, &self.tokens[from..to])
    }

    /// Identifier text, or the source text of a keyword used as a name.
    fn name_of(&self, spanned: &'a Spanned) -> Option<&'a str> {
        if spanned.token.is_name_keyword() {
            Some(&self.input[spanned.span.clone()])
        } else {
            spanned.token.name()
        }
    }

    fn name(&mut self) -> Result<String, SqlParseError> {
        match self.tokens.get(self.pos).and_then(|s| self.name_of(s)) {
            Some(name) => {
                self.advance();
                Ok(name.to_string())
            }
            None => Err(self.expected("identifier")),
        }
    }

    /// `key TEXT` and `index INT(11)` are columns; `KEY idx (a)` and
    /// `INDEX idx USING btree (a)` are index definitions.
    fn keyword_is_column(&self) -> bool {
        let ahead = |n: usize| self.tokens.get(self.pos + n).map(|s| &s.token);
        if !matches!(ahead(1), Some(Token::Ident(_))) {
            return false;
        }
        if !matches!(self.current(), Token::Key | Token::Index) {
            return true;
        }
        match ahead(2) {
            Some(Token::LParen) => matches!(ahead(3), Some(Token::Num(_))),
            Some(t) => !t.is_word("USING"),
            None => true,
        }
    }

    /// `schema.table` keeps only the last part.
    fn qualified_name(&mut self) -> Result<String, SqlParseError> {
        let mut name = self.name()?;
        while self.eat(&Token::Dot) {
            name = self.name()?;
        }
        Ok(name)
    }

    fn skip_if_exists(&mut self) {
        if self.eat(&Token::If) {
            self.eat(&Token::Not);
            self.eat(&Token::Exists);
        }
    }

    /// Consume a parenthesized group starting at the current token and return
    /// the indexes of its opening and closing parentheses.
    fn skip_group(&mut self) -> Result<(usize, usize), SqlParseError> {
        if *self.current() != Token::LParen {
            return Err(self.expected("("));
        }
        let open = self.pos;
        let mut depth = 0usize;
        while let Some(spanned) = self.tokens.get(self.pos) {
            match spanned.token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        let close = self.pos;
                        self.advance();
                        return Ok((open, close));
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(SqlParseError::Unbalanced)
    }

    /// Text strictly between the parentheses of a group.
    fn group_inner(&self, open: usize, close: usize) -> &'a str {
        let start = self.tokens[open].span.end;
        let end = self.tokens[close].span.start;
        self.input[start..end].trim()
    }

    fn skip_to_group(&mut self) {
        while !self.at_end() && *self.current() != Token::LParen {
            self.advance();
        }
    }

    /// `(a, b(10) ASC, "c")` as bare names.
    fn name_list(&mut self) -> Result<Vec<String>, SqlParseError> {
        let (open, close) = self.skip_group()?;
        Ok(split_top_level(&self.tokens[open + 1..close])
            .into_iter()
            .filter_map(|item| item.first().and_then(|t| self.name_of(t)))
            .map(str::to_string)
            .collect())
    }

    fn statement(&mut self) -> Result<Statement, SqlParseError> {
        match self.current() {
            Token::Create => {
                self.advance();
                self.create()
            }
            Token::Alter => {
                self.advance();
                self.alter_table()
            }
            _ => Ok(Statement::Ignored),
        }
    }

    fn create(&mut self) -> Result<Statement, SqlParseError> {
        if self.eat_word("OR") {
            self.eat_word("REPLACE");
        }
        while ["TEMP", "TEMPORARY", "UNLOGGED", "GLOBAL", "LOCAL"]
            .iter()
            .any(|w| self.current().is_word(w))
        {
            self.advance();
        }

        match self.current() {
            Token::Table => {
                self.advance();
                self.create_table().map(Statement::CreateTable)
            }
            Token::Unique | Token::Index => self.create_index(),
            // Skip other CREATE statements (VIEW, SEQUENCE, etc.)
            _ => Ok(Statement::Ignored),
        }
    }

    fn create_table(&mut self) -> Result<ParsedTable, SqlParseError> {
        self.skip_if_exists();
        let name = self.qualified_name()?;
        if *self.current() != Token::LParen {
            return Err(self.expected("table body"));
        }
        let (open, close) = self.skip_group()?;
        // Anything after the body is table options (ENGINE=, etc.)

        let mut table = Table::new(&name)?;
        let mut constraints = Vec::new();
        let mut diagnostics = Vec::new();

        for definition in split_top_level(&self.tokens[open + 1..close]) {
            let text = source(self.input, definition);
            match Parser::new(self.input, definition).definition() {
                Ok(Definition::Column(column, implied)) => {
                    let column_name = column.name.clone();
                    if table.add_column(column).is_err() {
                        tracing::warn!(table = %name, column = %column_name, "duplicate column");
                        diagnostics.push(Diagnostic::DuplicateColumn {
                            table: name.clone(),
                            column: column_name,
                        });
                        continue;
                    }
                    constraints.extend(implied.into_iter().map(|c| (c, text)));
                }
                Ok(Definition::Constraint(constraint)) => constraints.push((constraint, text)),
                Err(err) => {
                    tracing::warn!(table = %name, definition = text, %err, "skipping definition");
                    diagnostics.push(skipped(&name, text, err.to_string()));
                }
            }
        }

        let mut references = Vec::new();
        for (constraint, text) in constraints {
            apply_constraint(&mut table, constraint, text, &mut diagnostics, &mut references);
        }

        Ok(ParsedTable {
            table,
            references,
            diagnostics,
        })
    }

    fn definition(&mut self) -> Result<Definition, SqlParseError> {
        let named = self.eat(&Token::Constraint);
        if named && self.current().name().is_some() {
            self.advance();
        }

        match self.current() {
            t if !named && t.is_name_keyword() && self.keyword_is_column() => {
                self.column_definition()
            }
            Token::Primary
            | Token::Foreign
            | Token::Unique
            | Token::Key
            | Token::Index
            | Token::Check => self.table_constraint().map(Definition::Constraint),
            t if !named && (t.is_word("FULLTEXT") || t.is_word("SPATIAL")) => {
                self.advance();
                self.table_constraint().map(Definition::Constraint)
            }
            Token::Ident(_) | Token::QuotedIdent(_) if !named => self.column_definition(),
            _ => Err(self.expected("column or constraint definition")),
        }
    }

    fn table_constraint(&mut self) -> Result<TableConstraint, SqlParseError> {
        match self.current() {
            Token::Primary => {
                self.advance();
                self.expect(Token::Key, "KEY")?;
                self.skip_to_group();
                Ok(TableConstraint::PrimaryKey(self.name_list()?))
            }
            Token::Foreign => {
                self.advance();
                self.expect(Token::Key, "KEY")?;
                self.skip_to_group();
                let columns = self.name_list()?;
                self.expect(Token::References, "REFERENCES")?;
                let (target, target_columns, options) = self.references()?;
                Ok(TableConstraint::ForeignKey {
                    columns,
                    target,
                    target_columns,
                    options,
                })
            }
            Token::Unique => {
                self.advance();
                self.skip_to_group();
                Ok(TableConstraint::Unique(self.name_list()?))
            }
            Token::Key | Token::Index => {
                self.advance();
                self.skip_to_group();
                Ok(TableConstraint::Index {
                    columns: self.name_list()?,
                    unique: false,
                })
            }
            Token::Check => {
                self.advance();
                let (open, close) = self.skip_group()?;
                Ok(TableConstraint::Check(self.group_inner(open, close).to_string()))
            }
            _ => Err(self.expected("table constraint")),
        }
    }

    /// After REFERENCES: target table, optional column list, ON actions.
    fn references(&mut self) -> Result<(String, Vec<String>, Option<String>), SqlParseError> {
        let target = self.qualified_name()?;
        let columns = if *self.current() == Token::LParen {
            self.name_list()?
        } else {
            Vec::new()
        };

        let mut actions = Vec::new();
        loop {
            if self.eat(&Token::On) {
                let event = match self.current() {
                    Token::Delete => "delete",
                    Token::Update => "update",
                    _ => return Err(self.expected("DELETE or UPDATE")),
                };
                self.advance();
                actions.push(format!("{}: {}", event, self.referential_action()?));
            } else if self.eat_word("MATCH") {
                self.advance();
            } else if self.eat_word("DEFERRABLE") || self.eat_word("INITIALLY") {
                self.eat_word("DEFERRED");
                self.eat_word("IMMEDIATE");
            } else if *self.current() == Token::Not
                && self.tokens.get(self.pos + 1).is_some_and(|t| t.token.is_word("DEFERRABLE"))
            {
                self.advance();
                self.advance();
            } else {
                break;
            }
        }

        let options = if actions.is_empty() {
            None
        } else {
            Some(actions.join(", "))
        };
        Ok((target, columns, options))
    }

    /// CASCADE, RESTRICT, SET NULL, SET DEFAULT, NO ACTION
    fn referential_action(&mut self) -> Result<String, SqlParseError> {
        let first = self.action_word()?;
        if first == "set" || first == "no" {
            let second = self.action_word()?;
            return Ok(format!("{} {}", first, second));
        }
        Ok(first)
    }

    fn action_word(&mut self) -> Result<String, SqlParseError> {
        let word = match self.current() {
            Token::Ident(s) => s.to_lowercase(),
            Token::Null => "null".to_string(),
            Token::Default => "default".to_string(),
            _ => return Err(self.expected("referential action")),
        };
        self.advance();
        Ok(word)
    }

    fn column_definition(&mut self) -> Result<Definition, SqlParseError> {
        let name = self.name()?;
        let typ = self.column_type()?;
        let mut column = Column::new(&name, &typ)?;
        column.is_auto_increment = is_serial(&typ);

        let mut implied = Vec::new();
        while !self.at_end() {
            match self.current() {
                Token::Primary => {
                    self.advance();
                    self.eat(&Token::Key);
                    implied.push(TableConstraint::PrimaryKey(vec![name.clone()]));
                }
                Token::Not => {
                    self.advance();
                    if self.eat(&Token::Null) {
                        column.is_not_null = true;
                    }
                }
                Token::Unique => {
                    self.advance();
                    self.eat(&Token::Key);
                    column.is_unique = true;
                }
                Token::AutoIncrement => {
                    self.advance();
                    column.is_auto_increment = true;
                }
                Token::Default => {
                    self.advance();
                    column.default_value = Some(self.default_value()?.to_string());
                }
                Token::Check => {
                    self.advance();
                    let (open, close) = self.skip_group()?;
                    let expr = self.group_inner(open, close);
                    if !expr.is_empty() {
                        column.check_constraint = Some(expr.to_string());
                    }
                }
                Token::References => {
                    self.advance();
                    let (target, target_columns, options) = self.references()?;
                    implied.push(TableConstraint::ForeignKey {
                        columns: vec![name.clone()],
                        target,
                        target_columns,
                        options,
                    });
                }
                Token::Constraint => {
                    self.advance();
                    if self.current().name().is_some() {
                        self.advance();
                    }
                }
                Token::On => {
                    // MySQL: ON UPDATE CURRENT_TIMESTAMP
                    self.advance();
                    self.eat(&Token::Update);
                    self.default_value()?;
                }
                t if t.is_word("IDENTITY") => {
                    self.advance();
                    column.is_auto_increment = true;
                    if *self.current() == Token::LParen {
                        self.skip_group()?;
                    }
                }
                t if t.is_word("GENERATED") => {
                    self.advance();
                    self.generated(&mut column)?;
                }
                t if t.is_word("COMMENT") || t.is_word("COLLATE") || t.is_word("CHARSET") => {
                    self.advance();
                    self.advance();
                }
                t if t.is_word("CHARACTER") => {
                    self.advance();
                    self.eat_word("SET");
                    self.advance();
                }
                Token::LParen => {
                    self.skip_group()?;
                }
                _ => self.advance(),
            }
        }

        Ok(Definition::Column(column, implied))
    }

    /// Type words, then parameters and `[]` copied verbatim:
    /// `DOUBLE PRECISION`, `VARCHAR(255)`, `ENUM('a,b','c')`, `INT(11) UNSIGNED`.
    fn column_type(&mut self) -> Result<String, SqlParseError> {
        let mut typ = String::new();
        loop {
            match self.current() {
                Token::Ident(word) if typ.is_empty() || !is_type_stop_word(word) => {
                    if !typ.is_empty() {
                        typ.push(' ');
                    }
                    typ.push_str(word);
                    self.advance();
                }
                Token::QuotedIdent(word) if typ.is_empty() => {
                    typ.push_str(word);
                    self.advance();
                }
                Token::LParen if !typ.is_empty() => {
                    let (open, close) = self.skip_group()?;
                    typ.push_str(self.raw(open, close + 1));
                }
                Token::ArraySuffix if !typ.is_empty() => {
                    typ.push_str("[]");
                    self.advance();
                }
                _ => break,
            }
        }

        if typ.is_empty() {
            Err(self.expected("column type"))
        } else {
            Ok(typ)
        }
    }

    /// A default expression, verbatim: `'active'`, `-1`, `now()`, `(a + b)`,
    /// `'x'::character varying`.
    fn default_value(&mut self) -> Result<&'a str, SqlParseError> {
        let start = self.pos;
        match self.current() {
            Token::LParen => {
                self.skip_group()?;
            }
            Token::Ident(_) | Token::QuotedIdent(_) => {
                self.advance();
                while self.eat(&Token::Dot) {
                    self.advance();
                }
                if *self.current() == Token::LParen {
                    self.skip_group()?;
                }
            }
            Token::Str(_) | Token::Num(_) | Token::Null => self.advance(),
            Token::Other('+') | Token::Other('-') => {
                self.advance();
                self.advance();
            }
            _ => return Err(self.expected("default value")),
        }

        while self.eat(&Token::DoubleColon) {
            self.column_type()?;
        }

        Ok(self.raw(start, self.pos))
    }

    /// GENERATED {ALWAYS | BY DEFAULT} AS {IDENTITY [(..)] | (expr) [STORED]}
    fn generated(&mut self, column: &mut Column) -> Result<(), SqlParseError> {
        while !self.at_end() {
            match self.current() {
                t if t.is_word("IDENTITY") => {
                    self.advance();
                    column.is_auto_increment = true;
                    if *self.current() == Token::LParen {
                        self.skip_group()?;
                    }
                    break;
                }
                Token::LParen => {
                    self.skip_group()?;
                    break;
                }
                _ => self.advance(),
            }
        }
        Ok(())
    }

    /// ALTER TABLE [ONLY] [IF EXISTS] name ADD [CONSTRAINT n] <constraint>
    fn alter_table(&mut self) -> Result<Statement, SqlParseError> {
        if !self.eat(&Token::Table) {
            return Ok(Statement::Ignored);
        }
        self.skip_if_exists();
        self.eat_word("ONLY");
        let table = self.qualified_name()?;

        if !self.eat(&Token::Add) {
            return Ok(Statement::Ignored);
        }
        if self.eat(&Token::Constraint) && self.current().name().is_some() {
            self.advance();
        }

        match self.current() {
            Token::Primary | Token::Foreign | Token::Unique | Token::Key | Token::Index
            | Token::Check => Ok(Statement::Constraint {
                table,
                constraint: self.table_constraint()?,
            }),
            // ADD COLUMN and friends are not tracked
            _ => Ok(Statement::Ignored),
        }
    }

    /// CREATE [UNIQUE] INDEX [CONCURRENTLY] [IF NOT EXISTS] [name] ON [ONLY] t [USING m] (cols)
    fn create_index(&mut self) -> Result<Statement, SqlParseError> {
        let unique = self.eat(&Token::Unique);
        self.expect(Token::Index, "INDEX")?;
        self.eat_word("CONCURRENTLY");
        self.skip_if_exists();
        if *self.current() != Token::On {
            self.qualified_name()?;
        }
        self.expect(Token::On, "ON")?;
        self.eat_word("ONLY");
        let table = self.qualified_name()?;
        if self.eat_word("USING") {
            self.advance();
        }
        let columns = self.name_list()?;

        Ok(Statement::Constraint {
            table,
            constraint: TableConstraint::Index { columns, unique },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(sql: &str) -> Outcome<Schema> {
        parse_sql(sql, Dialect::Generic)
    }

    fn column<'s>(schema: &'s Schema, table: &str, column: &str) -> &'s Column {
        schema.table(table).unwrap().column(column).unwrap()
    }

    #[test]
    fn test_parse_simple_table() {
        let sql = r#"
            CREATE TABLE users (
                id INT PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE
            );
        "#;

        let outcome = parse(sql);
        assert!(outcome.is_clean());
        let schema = outcome.value;
        assert_eq!(schema.tables().len(), 1);

        let user = &schema.tables()[0];
        assert_eq!(user.name, "users");
        assert_eq!(user.columns().len(), 2);

        assert_eq!(user.columns()[0].name, "id");
        assert!(user.columns()[0].is_primary_key);

        assert_eq!(user.columns()[1].name, "email");
        assert_eq!(user.columns()[1].typ, "VARCHAR(255)");
        assert!(user.columns()[1].is_not_null);
        assert!(user.columns()[1].is_unique);
    }

    #[test]
    fn test_commas_inside_type_parameters_do_not_split() {
        let outcome = parse("CREATE TABLE t (a DECIMAL(10,2), b ENUM('x,y','z'));");
        let table = &outcome.value.tables()[0];

        assert_eq!(table.columns().len(), 2);
        assert_eq!(table.columns()[0].typ, "DECIMAL(10,2)");
        assert_eq!(table.columns()[1].typ, "ENUM('x,y','z')");
    }

    #[test]
    fn test_users_example() {
        let sql = "CREATE TABLE Users (id INT PRIMARY KEY AUTO_INCREMENT, email VARCHAR(255) NOT NULL UNIQUE);";
        let schema = parse(sql).value;

        let id = column(&schema, "Users", "id");
        assert_eq!(id.typ, "INT");
        assert!(id.is_primary_key && id.is_auto_increment);
        assert!(!id.is_not_null && !id.is_unique);

        let email = column(&schema, "Users", "email");
        assert_eq!(email.typ, "VARCHAR(255)");
        assert!(email.is_not_null && email.is_unique && !email.is_primary_key);
    }

    #[test]
    fn test_quoted_identifiers_resolve_to_bare_names() {
        let sql = r#"
            CREATE TABLE `a` (`id` INT);
            CREATE TABLE "b" ("id" INT);
            CREATE TABLE [c] ([id] INT);
            CREATE TABLE public.d (id INT);
        "#;
        let schema = parse(sql).value;
        let names: Vec<_> = schema.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        for table in schema.tables() {
            assert_eq!(table.columns()[0].name, "id");
        }
    }

    #[test]
    fn test_trailing_comma_adds_no_column() {
        let outcome = parse("CREATE TABLE t (a INT, b INT,);");
        assert!(outcome.is_clean());
        assert_eq!(outcome.value.tables()[0].columns().len(), 2);
    }

    #[test]
    fn test_malformed_statement_is_skipped() {
        let sql = r#"
            CREATE TABLE first (id INT);
            CREATE TABLE broken id INT;
            CREATE TABLE unbalanced (id INT;
            CREATE TABLE last (id INT);
        "#;
        let outcome = parse(sql);
        let names: Vec<_> = outcome.value.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["first", "last"]);
        assert_eq!(outcome.diagnostics.len(), 2);
        assert!(matches!(
            &outcome.diagnostics[0],
            Diagnostic::SkippedStatement { fragment, .. } if fragment == "CREATE TABLE broken id INT"
        ));
        assert!(matches!(
            &outcome.diagnostics[1],
            Diagnostic::SkippedStatement { reason, .. } if reason == "Unbalanced parentheses"
        ));
    }

    #[test]
    fn test_other_statements_are_ignored() {
        let sql = r#"
            SET NAMES utf8mb4;
            DROP TABLE IF EXISTS users;
            CREATE TABLE users (id INT);
            INSERT INTO users VALUES (1), (2);
            CREATE VIEW v AS SELECT * FROM users;
        "#;
        let outcome = parse(sql);
        assert!(outcome.is_clean());
        assert_eq!(outcome.value.tables().len(), 1);
    }

    #[test]
    fn test_constraints_in_any_order_and_case() {
        let sql = "create table items (price decimal(8, 2) check (price > 0) default 0 not null unique);";
        let outcome = parse(sql);
        let price = column(&outcome.value, "items", "price");
        assert_eq!(price.typ, "decimal(8, 2)");
        assert_eq!(price.check_constraint.as_deref(), Some("price > 0"));
        assert_eq!(price.default_value.as_deref(), Some("0"));
        assert!(price.is_not_null && price.is_unique);
    }

    #[test]
    fn test_defaults_are_kept_verbatim() {
        let sql = r#"
            CREATE TABLE t (
                status VARCHAR(20) DEFAULT 'active',
                created TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated TIMESTAMP DEFAULT now(),
                score INT DEFAULT -1,
                kind TEXT DEFAULT 'a'::character varying NOT NULL
            );
        "#;
        let schema = parse(sql).value;
        let default = |c: &str| column(&schema, "t", c).default_value.clone().unwrap();
        assert_eq!(default("status"), "'active'");
        assert_eq!(default("created"), "CURRENT_TIMESTAMP");
        assert_eq!(default("updated"), "now()");
        assert_eq!(default("score"), "-1");
        assert_eq!(default("kind"), "'a'::character varying");
        assert!(column(&schema, "t", "kind").is_not_null);
    }

    #[test]
    fn test_table_level_foreign_key() {
        let sql = r#"
            CREATE TABLE customers (id INT PRIMARY KEY);
            CREATE TABLE orders (
                id INT,
                customer_id INT,
                PRIMARY KEY (id),
                CONSTRAINT fk_customer FOREIGN KEY (customer_id) REFERENCES customers(id) ON DELETE CASCADE
            );
        "#;
        let outcome = parse(sql);
        assert!(outcome.is_clean());
        let schema = outcome.value;
        assert!(column(&schema, "orders", "id").is_primary_key);

        assert_eq!(
            schema.references,
            vec![Reference::new(
                ColumnRef::new("orders", "customer_id"),
                Direction::ManyToOne,
                ColumnRef::new("customers", "id"),
            )
            .with_options("delete: cascade")]
        );
    }

    #[test]
    fn test_parse_inline_reference() {
        let sql = r#"
            CREATE TABLE users (id INT PRIMARY KEY);
            CREATE TABLE orders (
                id INT PRIMARY KEY,
                user_id INT REFERENCES users(id) ON UPDATE SET NULL NOT NULL
            );
        "#;

        let schema = parse(sql).value;
        assert_eq!(schema.tables().len(), 2);
        assert_eq!(schema.references.len(), 1);

        let rel = &schema.references[0];
        assert_eq!(rel.owning(), &ColumnRef::new("orders", "user_id"));
        assert_eq!(rel.referenced(), &ColumnRef::new("users", "id"));
        assert_eq!(rel.options.as_deref(), Some("update: set null"));
        assert!(column(&schema, "orders", "user_id").is_not_null);
    }

    #[test]
    fn test_parse_postgres_dump() {
        let sql = r#"
            -- PostgreSQL database dump
            CREATE TABLE public.users (
                id integer NOT NULL,
                tags text[],
                name character varying(100) COLLATE pg_catalog."default"
            );
            CREATE TABLE public.posts (
                id bigserial,
                user_id integer,
                body text DEFAULT ''::text
            );
            ALTER TABLE ONLY public.users ADD CONSTRAINT users_pkey PRIMARY KEY (id);
            ALTER TABLE ONLY public.posts
                ADD CONSTRAINT posts_user_fk FOREIGN KEY (user_id) REFERENCES public.users(id);
            CREATE INDEX posts_user_idx ON public.posts USING btree (user_id);
        "#;

        let outcome = parse_sql(sql, Dialect::Auto);
        assert!(outcome.is_clean(), "{:?}", outcome.diagnostics);
        let schema = outcome.value;

        assert!(column(&schema, "users", "id").is_primary_key);
        assert_eq!(column(&schema, "users", "tags").typ, "text[]");
        assert_eq!(column(&schema, "users", "name").typ, "character varying(100)");
        assert!(column(&schema, "posts", "id").is_auto_increment);
        assert!(column(&schema, "posts", "user_id").is_indexed);
        assert_eq!(column(&schema, "posts", "body").default_value.as_deref(), Some("''::text"));
        assert_eq!(schema.references.len(), 1);
        assert!(schema.is_resolved(&schema.references[0]));
    }

    #[test]
    fn test_parse_mysql_dump() {
        let sql = r#"
            CREATE TABLE `users` (
              `id` int(11) unsigned NOT NULL AUTO_INCREMENT,
              `email` varchar(255) CHARACTER SET utf8mb4 NOT NULL COMMENT 'login, unique',
              `nick` varchar(50) DEFAULT 'it\'s me',
              `updated_at` timestamp NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
              PRIMARY KEY (`id`),
              UNIQUE KEY `users_email` (`email`),
              KEY `users_nick` (`nick`)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#;

        let outcome = parse_sql(sql, Dialect::MySQL);
        assert!(outcome.is_clean(), "{:?}", outcome.diagnostics);
        let schema = outcome.value;

        let id = column(&schema, "users", "id");
        assert_eq!(id.typ, "int(11) unsigned");
        assert!(id.is_primary_key && id.is_auto_increment && id.is_not_null);

        let email = column(&schema, "users", "email");
        assert_eq!(email.typ, "varchar(255)");
        assert!(email.is_unique && email.is_not_null);

        assert_eq!(
            column(&schema, "users", "nick").default_value.as_deref(),
            Some(r"'it\'s me'")
        );
        assert!(column(&schema, "users", "nick").is_indexed);
        assert_eq!(
            column(&schema, "users", "updated_at").default_value.as_deref(),
            Some("CURRENT_TIMESTAMP")
        );
    }

    #[test]
    fn test_sqlite_and_identity_columns() {
        let sql = r#"
            CREATE TABLE a (id INTEGER PRIMARY KEY AUTOINCREMENT);
            CREATE TABLE b (id INT GENERATED ALWAYS AS IDENTITY PRIMARY KEY);
            CREATE TABLE c (id INT IDENTITY(1,1) PRIMARY KEY, total INT GENERATED ALWAYS AS (1 + 1) STORED);
        "#;
        let schema = parse(sql).value;
        for table in ["a", "b", "c"] {
            let id = column(&schema, table, "id");
            assert!(id.is_auto_increment, "{}", table);
            assert!(id.is_primary_key, "{}", table);
        }
        assert!(!column(&schema, "c", "total").is_auto_increment);
        assert_eq!(column(&schema, "c", "id").typ, "INT");
    }

    #[test]
    fn test_composite_primary_key_keeps_first() {
        let outcome = parse("CREATE TABLE m (a INT, b INT, PRIMARY KEY (a, b));");
        let schema = &outcome.value;
        assert!(column(schema, "m", "a").is_primary_key);
        assert!(!column(schema, "m", "b").is_primary_key);
        assert!(column(schema, "m", "b").is_not_null);
        assert_eq!(
            outcome.diagnostics,
            vec![Diagnostic::CompositeKeyReduced {
                table: "m".into(),
                columns: "a, b".into(),
                kept: "a".into(),
            }]
        );
    }

    #[test]
    fn test_second_primary_key_is_reported() {
        let outcome = parse("CREATE TABLE m (a INT PRIMARY KEY, b INT PRIMARY KEY);");
        assert!(column(&outcome.value, "m", "a").is_primary_key);
        assert!(!column(&outcome.value, "m", "b").is_primary_key);
        assert_eq!(
            outcome.diagnostics,
            vec![Diagnostic::ConflictingPrimaryKey {
                table: "m".into(),
                kept: "a".into(),
                ignored: "b".into(),
            }]
        );
    }

    #[test]
    fn test_duplicate_column_keeps_first() {
        let outcome = parse("CREATE TABLE t (a INT, A TEXT);");
        let table = &outcome.value.tables()[0];
        assert_eq!(table.columns().len(), 1);
        assert_eq!(table.columns()[0].typ, "INT");
        assert_eq!(
            outcome.diagnostics,
            vec![Diagnostic::DuplicateColumn {
                table: "t".into(),
                column: "A".into()
            }]
        );
    }

    #[test]
    fn test_unknown_definition_is_skipped_table_kept() {
        let outcome = parse("CREATE TABLE t (a INT, 42 nonsense, b INT);");
        assert_eq!(outcome.value.tables()[0].columns().len(), 2);
        assert!(matches!(
            &outcome.diagnostics[0],
            Diagnostic::SkippedDefinition { table, fragment, .. } if table == "t" && fragment == "42 nonsense"
        ));
    }

    #[test]
    fn test_unique_index_statement() {
        let sql = "CREATE TABLE t (email TEXT); CREATE UNIQUE INDEX t_email ON t (email);";
        let schema = parse(sql).value;
        let email = column(&schema, "t", "email");
        assert!(email.is_indexed && email.is_unique);
    }

    #[test]
    fn test_index_on_missing_table_is_reported() {
        let outcome = parse("CREATE INDEX idx ON ghost (id);");
        assert!(matches!(
            &outcome.diagnostics[0],
            Diagnostic::SkippedStatement { reason, .. } if reason == "table ghost is not defined"
        ));
    }

    #[test]
    fn test_unresolved_foreign_key_is_kept_and_reported() {
        let outcome = parse("CREATE TABLE orders (cust_id INT REFERENCES missing(id));");
        assert_eq!(outcome.value.references.len(), 1);
        assert_eq!(outcome.value.unresolved_references().len(), 1);
        assert!(matches!(
            &outcome.diagnostics[0],
            Diagnostic::UnresolvedReference { reference, .. } if reference == "orders.cust_id > missing.id"
        ));
    }

    #[test]
    fn test_missing_semicolon_between_statements() {
        let schema = parse("CREATE TABLE a (id INT)\nCREATE TABLE b (id INT)").value;
        assert_eq!(schema.tables().len(), 2);
    }

    #[test]
    fn test_deep_nesting_does_not_recurse() {
        let depth = 50_000;
        let sql = format!(
            "CREATE TABLE t (a WEIRD{}{}, b INT);",
            "(".repeat(depth),
            ")".repeat(depth)
        );
        let outcome = parse(&sql);
        let table = &outcome.value.tables()[0];
        assert_eq!(table.columns().len(), 2);
        assert_eq!(table.columns()[0].typ.len(), "WEIRD".len() + 2 * depth);
    }

    #[test]
    fn test_keyword_column_names() {
        let outcome = parse_sql(
            "CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT, update INT, index VARCHAR(20));",
            Dialect::PostgreSQL,
        );
        assert!(outcome.is_clean(), "{:?}", outcome.diagnostics);
        let table = outcome.value.table("settings").unwrap();
        let names: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["key", "value", "update", "index"]);
        assert_eq!(table.primary_key().unwrap().name, "key");
        assert_eq!(table.column("index").unwrap().typ, "VARCHAR(20)");
    }

    #[test]
    fn test_keyword_columns_in_constraints() {
        let sql = "CREATE TABLE kv (key TEXT NOT NULL, KEY idx_key (key), PRIMARY KEY (key));\n\
                   CREATE TABLE refs (k TEXT REFERENCES kv(key));";
        let outcome = parse_sql(sql, Dialect::MySQL);
        assert!(outcome.is_clean(), "{:?}", outcome.diagnostics);
        let kv = outcome.value.table("kv").unwrap();
        assert_eq!(kv.columns().len(), 1);
        assert!(kv.column("key").unwrap().is_primary_key);
        assert_eq!(outcome.value.references[0].target, ColumnRef::new("kv", "key"));
    }
}
