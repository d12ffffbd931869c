//! Non-fatal problems collected while converting.

use crate::model::{Resolution, Schema};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("Skipped `{fragment}`: {reason}")]
    SkippedStatement { fragment: String, reason: String },
    #[error("Skipped `{fragment}` in table {table}: {reason}")]
    SkippedDefinition {
        table: String,
        fragment: String,
        reason: String,
    },
    #[error("Duplicate column {column} in table {table} ignored")]
    DuplicateColumn { table: String, column: String },
    #[error("Duplicate table {0} ignored")]
    DuplicateTable(String),
    #[error("Table {table} has more than one primary key; kept {kept}, ignored {ignored}")]
    ConflictingPrimaryKey {
        table: String,
        kept: String,
        ignored: String,
    },
    #[error("Composite primary key ({columns}) on table {table} reduced to {kept}")]
    CompositeKeyReduced {
        table: String,
        columns: String,
        kept: String,
    },
    #[error("Table {table}: {detail} is not representable and was ignored")]
    Unsupported { table: String, detail: String },
    #[error("Reference {reference} does not resolve: {reason}")]
    UnresolvedReference { reference: String, reason: String },
    #[error("Unsupported relationship `{0}` skipped")]
    UnsupportedRelationship(String),
}

/// A best-effort result plus everything that went wrong producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        Self { value, diagnostics }
    }

    pub fn clean(value: T) -> Self {
        Self::new(value, Vec::new())
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// Chain another conversion, keeping diagnostics from both steps.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        let mut next = f(self.value);
        let mut diagnostics = self.diagnostics;
        diagnostics.append(&mut next.diagnostics);
        Outcome::new(next.value, diagnostics)
    }

    pub fn messages(&self) -> Vec<String> {
        self.diagnostics.iter().map(|d| d.to_string()).collect()
    }
}

/// One diagnostic per reference whose endpoints are missing.
pub(crate) fn unresolved_references(schema: &Schema) -> Vec<Diagnostic> {
    schema
        .references
        .iter()
        .filter_map(|r| match schema.resolve(r) {
            Resolution::Resolved => None,
            reason => {
                tracing::warn!(reference = %r, %reason, "unresolved reference");
                Some(Diagnostic::UnresolvedReference {
                    reference: r.to_string(),
                    reason: reason.to_string(),
                })
            }
        })
        .collect()
}
