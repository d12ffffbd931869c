pub mod dbml;
pub mod diagnostic;
pub mod measure;
pub mod model;
pub mod sql;

use serde::Serialize;
use thiserror::Error;
use wasm_bindgen::prelude::*;

use diagnostic::Outcome;
use model::Schema;
use sql::Dialect;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Input is empty")]
    EmptyInput,
    #[error("Unknown SQL dialect: {0}")]
    UnknownDialect(String),
    #[error("Invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Converted text plus the diagnostics collected producing it.
#[wasm_bindgen]
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    text: String,
    diagnostics: Vec<String>,
}

#[wasm_bindgen]
impl Conversion {
    #[wasm_bindgen(getter)]
    pub fn text(&self) -> String {
        self.text.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn diagnostics(&self) -> js_sys::Array {
        self.diagnostics
            .iter()
            .map(|d| JsValue::from_str(d))
            .collect()
    }
}

impl Conversion {
    pub fn messages(&self) -> &[String] {
        &self.diagnostics
    }
}

impl From<Outcome<String>> for Conversion {
    fn from(outcome: Outcome<String>) -> Self {
        let diagnostics = outcome.messages();
        Self {
            text: outcome.value,
            diagnostics,
        }
    }
}

#[derive(Serialize)]
struct SchemaResult<'a> {
    schema: &'a Schema,
    diagnostics: Vec<String>,
}

fn non_empty(input: &str) -> Result<&str, ConvertError> {
    if input.trim().is_empty() {
        Err(ConvertError::EmptyInput)
    } else {
        Ok(input)
    }
}

/// `None` and the empty string mean auto-detection.
pub fn parse_dialect(dialect: Option<&str>) -> Result<Dialect, ConvertError> {
    match dialect.map(str::trim) {
        None | Some("") => Ok(Dialect::Auto),
        Some(name) => {
            Dialect::from_str(name).ok_or_else(|| ConvertError::UnknownDialect(name.to_string()))
        }
    }
}

pub fn sql_to_dbml(sql: &str, dialect: Option<&str>) -> Result<Outcome<String>, ConvertError> {
    let dialect = parse_dialect(dialect)?;
    Ok(sql::parse_sql(non_empty(sql)?, dialect).and_then(|schema| dbml::serialize(&schema)))
}

pub fn dbml_to_sql(dbml: &str) -> Result<Outcome<String>, ConvertError> {
    Ok(dbml::parse_dbml(non_empty(dbml)?).and_then(|schema| sql::write_sql(&schema)))
}

pub fn schema_from_json(json: &str) -> Result<Schema, ConvertError> {
    Ok(serde_json::from_str(non_empty(json)?)?)
}

/// Schema plus diagnostics as `{"schema": .., "diagnostics": [..]}`.
pub fn schema_to_json(outcome: &Outcome<Schema>) -> Result<String, ConvertError> {
    let result = SchemaResult {
        schema: &outcome.value,
        diagnostics: outcome.messages(),
    };
    Ok(serde_json::to_string(&result)?)
}

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Convert SQL DDL to DBML
#[wasm_bindgen(js_name = "sqlToDbml")]
pub fn convert_sql_to_dbml(sql: &str, dialect: Option<String>) -> Result<Conversion, String> {
    sql_to_dbml(sql, dialect.as_deref())
        .map(Conversion::from)
        .map_err(|e| e.to_string())
}

/// Convert DBML to SQL DDL
#[wasm_bindgen(js_name = "dbmlToSql")]
pub fn convert_dbml_to_sql(dbml: &str) -> Result<Conversion, String> {
    dbml_to_sql(dbml)
        .map(Conversion::from)
        .map_err(|e| e.to_string())
}

/// Parse SQL DDL into schema JSON
#[wasm_bindgen(js_name = "sqlToSchema")]
pub fn convert_sql_to_schema(sql: &str, dialect: Option<String>) -> Result<String, String> {
    let run = || -> Result<String, ConvertError> {
        let dialect = parse_dialect(dialect.as_deref())?;
        schema_to_json(&sql::parse_sql(non_empty(sql)?, dialect))
    };
    run().map_err(|e| e.to_string())
}

/// Parse DBML into schema JSON
#[wasm_bindgen(js_name = "dbmlToSchema")]
pub fn convert_dbml_to_schema(dbml: &str) -> Result<String, String> {
    let run = || -> Result<String, ConvertError> {
        schema_to_json(&dbml::parse_dbml(non_empty(dbml)?))
    };
    run().map_err(|e| e.to_string())
}

/// Serialize schema JSON to DBML
#[wasm_bindgen(js_name = "schemaToDbml")]
pub fn convert_schema_to_dbml(json: &str) -> Result<Conversion, String> {
    schema_from_json(json)
        .map(|schema| Conversion::from(dbml::serialize(&schema)))
        .map_err(|e| e.to_string())
}

/// Serialize schema JSON to SQL DDL
#[wasm_bindgen(js_name = "schemaToSql")]
pub fn convert_schema_to_sql(json: &str) -> Result<Conversion, String> {
    schema_from_json(json)
        .map(|schema| Conversion::from(sql::write_sql(&schema)))
        .map_err(|e| e.to_string())
}
