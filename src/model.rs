//! Schema model shared by both parsers and both serializers.
//!
//! Relationship direction follows DBML: `source > target` means the source
//! column holds the foreign key and points at the target column, and
//! `source < target` means the target column holds it. Use
//! [`Reference::owning`] and [`Reference::referenced`] instead of reading
//! `source`/`target` directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Name must not be empty")]
    EmptyName,
    #[error("Column {0} has an empty type")]
    EmptyType(String),
    #[error("Column {column} already exists in table {table}")]
    DuplicateColumn { table: String, column: String },
    #[error("Table {0} already exists")]
    DuplicateTable(String),
    #[error("Column {column} not found in table {table}")]
    UnknownColumn { table: String, column: String },
}

/// Identifier comparison used everywhere in the model.
pub fn same_name(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// True when `name` can be written without quoting in both SQL and DBML.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_not_null: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_auto_increment: bool,
    #[serde(default)]
    pub is_indexed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_constraint: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, typ: impl Into<String>) -> Result<Self, ModelError> {
        let name = name.into().trim().to_string();
        let typ = typ.into().trim().to_string();
        if name.is_empty() {
            return Err(ModelError::EmptyName);
        }
        if typ.is_empty() {
            return Err(ModelError::EmptyType(name));
        }
        Ok(Self {
            name,
            typ,
            is_primary_key: false,
            is_not_null: false,
            is_unique: false,
            is_auto_increment: false,
            is_indexed: false,
            default_value: None,
            check_constraint: None,
        })
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.is_auto_increment = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.is_indexed = true;
        self
    }

    /// Blank values clear the default.
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = non_blank(value.into());
        self
    }

    pub fn with_check(mut self, expr: impl Into<String>) -> Self {
        self.check_constraint = non_blank(expr.into());
        self
    }
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Canvas coordinates. Owned by the editor; converters never read them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    columns: Vec<Column>,
}

/// Wire form of a table, checked against the naming rules before use.
#[derive(Deserialize)]
struct RawTable {
    name: String,
    #[serde(default)]
    position: Option<Position>,
    #[serde(default)]
    columns: Vec<Column>,
}

/// Names are checked like `add_column`, but primary-key flags are kept as
/// sent so extra keys can be reported rather than silently moved.
impl TryFrom<RawTable> for Table {
    type Error = ModelError;

    fn try_from(raw: RawTable) -> Result<Self, ModelError> {
        let mut table = Table::new(raw.name)?;
        table.position = raw.position;
        for column in raw.columns {
            let checked = Column::new(column.name.as_str(), column.typ.as_str())?;
            if table.position_of(&checked.name).is_some() {
                return Err(table.duplicate(&checked.name));
            }
            table.columns.push(Column {
                name: checked.name,
                typ: checked.typ,
                ..column
            });
        }
        Ok(table)
    }
}

impl Table {
    pub fn new(name: impl Into<String>) -> Result<Self, ModelError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ModelError::EmptyName);
        }
        Ok(Self {
            name,
            position: None,
            columns: Vec::new(),
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| same_name(&c.name, name))
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| same_name(&c.name, name))
    }

    fn position_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| same_name(&c.name, name))
    }

    fn unknown(&self, column: &str) -> ModelError {
        ModelError::UnknownColumn {
            table: self.name.clone(),
            column: column.to_string(),
        }
    }

    fn duplicate(&self, column: &str) -> ModelError {
        ModelError::DuplicateColumn {
            table: self.name.clone(),
            column: column.to_string(),
        }
    }

    /// Append a column. A primary-key column takes the key over from any
    /// column that held it.
    pub fn add_column(&mut self, column: Column) -> Result<(), ModelError> {
        if self.position_of(&column.name).is_some() {
            return Err(self.duplicate(&column.name));
        }
        if column.is_primary_key {
            self.clear_primary_key();
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn with_column(mut self, column: Column) -> Result<Self, ModelError> {
        self.add_column(column)?;
        Ok(self)
    }

    /// Replace the column called `name`, keeping its position.
    pub fn update_column(&mut self, name: &str, column: Column) -> Result<(), ModelError> {
        let idx = self.position_of(name).ok_or_else(|| self.unknown(name))?;
        if let Some(other) = self.position_of(&column.name) {
            if other != idx {
                return Err(self.duplicate(&column.name));
            }
        }
        if column.is_primary_key {
            self.clear_primary_key();
        }
        self.columns[idx] = column;
        Ok(())
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), ModelError> {
        let idx = self.position_of(from).ok_or_else(|| self.unknown(from))?;
        let to = to.trim();
        if to.is_empty() {
            return Err(ModelError::EmptyName);
        }
        if let Some(other) = self.position_of(to) {
            if other != idx {
                return Err(self.duplicate(to));
            }
        }
        self.columns[idx].name = to.to_string();
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Result<Column, ModelError> {
        let idx = self.position_of(name).ok_or_else(|| self.unknown(name))?;
        Ok(self.columns.remove(idx))
    }

    /// Make `name` the primary key, clearing the flag everywhere else.
    pub fn set_primary_key(&mut self, name: &str) -> Result<(), ModelError> {
        let idx = self.position_of(name).ok_or_else(|| self.unknown(name))?;
        for (i, col) in self.columns.iter_mut().enumerate() {
            col.is_primary_key = i == idx;
        }
        Ok(())
    }

    pub fn clear_primary_key(&mut self) {
        for col in &mut self.columns {
            col.is_primary_key = false;
        }
    }

    /// Index of the first primary-key column.
    pub fn primary_key_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.is_primary_key)
    }

    /// The first primary-key column. Later ones only exist in tables built
    /// outside the mutation API (deserialized JSON) and are never honored.
    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_primary_key)
    }

    pub fn conflicting_primary_keys(&self) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .skip(1)
            .collect()
    }
}

/// One end of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// `>`: source holds the foreign key.
    #[serde(rename = ">")]
    ManyToOne,
    /// `<`: target holds the foreign key.
    #[serde(rename = "<")]
    OneToMany,
}

impl Direction {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::ManyToOne => ">",
            Self::OneToMany => "<",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            ">" => Some(Self::ManyToOne),
            "<" => Some(Self::OneToMany),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub source: ColumnRef,
    pub target: ColumnRef,
    pub direction: Direction,
    /// Free-form settings carried verbatim, e.g. `delete: cascade`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
}

impl Reference {
    pub fn new(source: ColumnRef, direction: Direction, target: ColumnRef) -> Self {
        Self {
            source,
            target,
            direction,
            options: None,
        }
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = non_blank(options.into());
        self
    }

    /// The endpoint holding the foreign key.
    pub fn owning(&self) -> &ColumnRef {
        match self.direction {
            Direction::ManyToOne => &self.source,
            Direction::OneToMany => &self.target,
        }
    }

    /// The endpoint the foreign key points at.
    pub fn referenced(&self) -> &ColumnRef {
        match self.direction {
            Direction::ManyToOne => &self.target,
            Direction::OneToMany => &self.source,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.source, self.direction.symbol(), self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    MissingTable(String),
    MissingColumn(ColumnRef),
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved => write!(f, "resolved"),
            Self::MissingTable(t) => write!(f, "table {} is not defined", t),
            Self::MissingColumn(c) => write!(f, "column {} is not defined", c),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawSchema")]
pub struct Schema {
    #[serde(default)]
    tables: Vec<Table>,
    #[serde(default)]
    pub references: Vec<Reference>,
}

#[derive(Deserialize)]
struct RawSchema {
    #[serde(default)]
    tables: Vec<Table>,
    #[serde(default)]
    references: Vec<Reference>,
}

impl TryFrom<RawSchema> for Schema {
    type Error = ModelError;

    fn try_from(raw: RawSchema) -> Result<Self, ModelError> {
        let mut schema = Schema::new();
        for table in raw.tables {
            schema.add_table(table)?;
        }
        schema.references = raw.references;
        Ok(schema)
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| same_name(&t.name, name))
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| same_name(&t.name, name))
    }

    pub fn add_table(&mut self, table: Table) -> Result<(), ModelError> {
        if self.table(&table.name).is_some() {
            return Err(ModelError::DuplicateTable(table.name));
        }
        self.tables.push(table);
        Ok(())
    }

    pub fn with_table(mut self, table: Table) -> Result<Self, ModelError> {
        self.add_table(table)?;
        Ok(self)
    }

    pub fn remove_table(&mut self, name: &str) -> Option<Table> {
        let idx = self.tables.iter().position(|t| same_name(&t.name, name))?;
        Some(self.tables.remove(idx))
    }

    pub fn add_reference(&mut self, reference: Reference) {
        self.references.push(reference);
    }

    pub fn resolve(&self, reference: &Reference) -> Resolution {
        for end in [&reference.source, &reference.target] {
            match self.table(&end.table) {
                None => return Resolution::MissingTable(end.table.clone()),
                Some(t) if t.column(&end.column).is_none() => {
                    return Resolution::MissingColumn(end.clone());
                }
                Some(_) => {}
            }
        }
        Resolution::Resolved
    }

    pub fn is_resolved(&self, reference: &Reference) -> bool {
        self.resolve(reference) == Resolution::Resolved
    }

    pub fn unresolved_references(&self) -> Vec<&Reference> {
        self.references
            .iter()
            .filter(|r| !self.is_resolved(r))
            .collect()
    }

    /// Remove every reference whose endpoints do not exist, returning them.
    pub fn drop_unresolved_references(&mut self) -> Vec<Reference> {
        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.references)
            .into_iter()
            .partition(|r| self.is_resolved(r));
        self.references = kept;
        dropped
    }
}
