//! Serializer for converting a Schema to DBML.

use crate::diagnostic::{self, Diagnostic, Outcome};
use crate::model::{Column, Reference, Schema, Table, is_plain_identifier};

/// Serialize a Schema to DBML.
///
/// Output is deterministic: tables and columns in model order, then one
/// `Ref:` line per resolved reference.
pub fn serialize(schema: &Schema) -> Outcome<String> {
    let mut output = String::new();
    let mut diagnostics = Vec::new();

    for table in schema.tables() {
        serialize_table(&mut output, table, &mut diagnostics);
    }

    for reference in &schema.references {
        if schema.is_resolved(reference) {
            serialize_reference(&mut output, reference);
        }
    }
    diagnostics.extend(diagnostic::unresolved_references(schema));

    Outcome::new(output, diagnostics)
}

fn serialize_table(output: &mut String, table: &Table, diagnostics: &mut Vec<Diagnostic>) {
    let primary = table.primary_key_index();
    let kept = table.primary_key().map(|c| c.name.as_str()).unwrap_or_default();

    output.push_str(&format!("Table {} {{\n", quote_name(&table.name)));
    for (i, column) in table.columns().iter().enumerate() {
        let is_primary = primary == Some(i);
        if column.is_primary_key && !is_primary {
            tracing::warn!(table = %table.name, kept, ignored = %column.name, "dropping extra pk");
            diagnostics.push(Diagnostic::ConflictingPrimaryKey {
                table: table.name.clone(),
                kept: kept.to_string(),
                ignored: column.name.clone(),
            });
        }
        serialize_column(output, column, is_primary);
    }
    output.push_str("}\n\n");
}

fn serialize_column(output: &mut String, column: &Column, is_primary: bool) {
    output.push_str("  ");
    output.push_str(&quote_name(&column.name));
    output.push(' ');
    output.push_str(&quote_type(&column.typ));

    let attrs = attributes(column, is_primary);
    if !attrs.is_empty() {
        output.push_str(" [");
        output.push_str(&attrs.join(", "));
        output.push(']');
    }
    output.push('\n');
}

fn attributes(column: &Column, is_primary: bool) -> Vec<String> {
    let mut attrs = Vec::new();
    if is_primary {
        attrs.push("pk".to_string());
    }
    if column.is_not_null {
        attrs.push("not null".to_string());
    }
    if column.is_unique {
        attrs.push("unique".to_string());
    }
    if column.is_auto_increment {
        attrs.push("increment".to_string());
    }
    if let Some(value) = &column.default_value {
        attrs.push(format!("default: {}", escape_value(value)));
    }
    if column.is_indexed && !is_primary {
        attrs.push("index".to_string());
    }
    if let Some(expr) = &column.check_constraint {
        attrs.push(format!("check: {}", escape_value(expr)));
    }
    attrs
}

fn serialize_reference(output: &mut String, reference: &Reference) {
    output.push_str(&format!(
        "Ref: {}.{} {} {}.{}",
        quote_name(&reference.source.table),
        quote_name(&reference.source.column),
        reference.direction.symbol(),
        quote_name(&reference.target.table),
        quote_name(&reference.target.column)
    ));
    if let Some(options) = reference.options.as_deref().filter(|o| !o.trim().is_empty()) {
        output.push_str(&format!(" [{}]", options.trim()));
    }
    output.push('\n');
}

fn quote_name(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

/// Types containing whitespace outside their parameter list are quoted:
/// `"double precision"`, `"int(11) unsigned"`.
fn quote_type(typ: &str) -> String {
    if has_top_level(typ, |c| c.is_whitespace()) {
        quote(typ)
    } else {
        typ.to_string()
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A value containing a `,` or `]` outside quotes and brackets would end the
/// setting early, and a backslash would be read as an escape. Such values go
/// in backticks with backslashes and backticks escaped.
fn escape_value(value: &str) -> String {
    if value.contains('\n')
        || value.contains('\\')
        || has_top_level(value, |c| c == ',' || c == ']')
    {
        format!("`{}`", value.replace('\\', "\\\\").replace('`', "\\`"))
    } else {
        value.to_string()
    }
}

/// Whether `pred` matches a character outside quotes and brackets.
fn has_top_level(text: &str, pred: impl Fn(char) -> bool) -> bool {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | '}' => depth = depth.saturating_sub(1),
                ']' if depth > 0 => depth -= 1,
                _ if depth == 0 && pred(c) => return true,
                _ => {}
            },
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbml::parse_dbml;
    use crate::model::{ColumnRef, Direction};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn users() -> Table {
        Table::new("Users")
            .unwrap()
            .with_column(Column::new("id", "INT").unwrap().primary_key().auto_increment())
            .unwrap()
            .with_column(Column::new("email", "VARCHAR(255)").unwrap().not_null().unique())
            .unwrap()
    }

    fn shop() -> Schema {
        let customers = Table::new("Customers")
            .unwrap()
            .with_column(Column::new("id", "int").unwrap().primary_key())
            .unwrap()
            .with_column(
                Column::new("name", "varchar(100)")
                    .unwrap()
                    .not_null()
                    .indexed()
                    .with_default("'anonymous, inc'"),
            )
            .unwrap();
        let orders = Table::new("Orders")
            .unwrap()
            .with_column(Column::new("id", "bigint").unwrap().primary_key().auto_increment())
            .unwrap()
            .with_column(Column::new("customer_id", "int").unwrap().not_null())
            .unwrap()
            .with_column(Column::new("total", "decimal(10,2)").unwrap().with_check("total >= 0"))
            .unwrap()
            .with_column(Column::new("tags", "text[]").unwrap().with_default("array[]::text[]"))
            .unwrap()
            .with_column(Column::new("status", "varchar").unwrap().with_default("draft, pending"))
            .unwrap()
            .with_column(Column::new("placed at", "timestamp with time zone").unwrap())
            .unwrap();
        let mut schema = Schema::new()
            .with_table(customers)
            .unwrap()
            .with_table(orders)
            .unwrap()
            .with_table(Table::new("Empty").unwrap())
            .unwrap();
        schema.add_reference(
            Reference::new(
                ColumnRef::new("Orders", "customer_id"),
                Direction::ManyToOne,
                ColumnRef::new("Customers", "id"),
            )
            .with_options("delete: cascade"),
        );
        schema
    }

    #[test]
    fn test_serialize_users() {
        let schema = Schema::new().with_table(users()).unwrap();
        let outcome = serialize(&schema);
        assert!(outcome.is_clean());
        assert_eq!(
            outcome.value,
            indoc! {"
                Table Users {
                  id INT [pk, increment]
                  email VARCHAR(255) [not null, unique]
                }

            "}
        );
    }

    #[test]
    fn test_serialize_full_schema() {
        let outcome = serialize(&shop());
        assert!(outcome.is_clean());
        assert_eq!(
            outcome.value,
            indoc! {r#"
                Table Customers {
                  id int [pk]
                  name varchar(100) [not null, default: 'anonymous, inc', index]
                }

                Table Orders {
                  id bigint [pk, increment]
                  customer_id int [not null]
                  total decimal(10,2) [check: total >= 0]
                  tags text[] [default: array[]::text[]]
                  status varchar [default: `draft, pending`]
                  "placed at" "timestamp with time zone"
                }

                Table Empty {
                }

                Ref: Orders.customer_id > Customers.id [delete: cascade]
            "#}
        );
    }

    #[test]
    fn test_round_trip() {
        let schema = shop();
        let text = serialize(&schema).value;
        let parsed = parse_dbml(&text);
        assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
        assert_eq!(parsed.value, schema);
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let schema = shop();
        assert_eq!(serialize(&schema).value, serialize(&schema).value);
    }

    #[test]
    fn test_users_sql_to_dbml() {
        let sql = "CREATE TABLE Users (id INT PRIMARY KEY AUTO_INCREMENT, email VARCHAR(255) NOT NULL UNIQUE);";
        let outcome = crate::sql::parse_sql(sql, crate::sql::Dialect::Auto).and_then(|s| serialize(&s));
        assert!(outcome.is_clean());
        assert_eq!(outcome.value, serialize(&Schema::new().with_table(users()).unwrap()).value);
    }

    #[test]
    fn test_unresolved_reference_is_dropped() {
        let mut schema = shop();
        schema.add_reference(Reference::new(
            ColumnRef::new("Orders", "cust_id"),
            Direction::ManyToOne,
            ColumnRef::new("Missing", "id"),
        ));
        let outcome = serialize(&schema);
        assert_eq!(outcome.value.matches("Ref:").count(), 1);
        assert!(!outcome.value.contains("Missing"));
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_extra_primary_key_loses_pk() {
        let json = r#"{"tables": [{"name": "t", "columns": [
            {"name": "a", "type": "int", "isPrimaryKey": true},
            {"name": "b", "type": "int", "isPrimaryKey": true, "isIndexed": true}
        ]}]}"#;
        let schema: Schema = serde_json::from_str(json).unwrap();

        let outcome = serialize(&schema);
        assert!(outcome.value.contains("  a int [pk]\n  b int [index]\n"));
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_same_named_primary_keys_serialize_one_pk() {
        let mut schema = Schema::new().with_table(users()).unwrap();
        let renamed = schema.table_mut("Users").unwrap().column_mut("email").unwrap();
        renamed.name = "id".into();
        renamed.is_primary_key = true;

        let outcome = serialize(&schema);
        assert_eq!(outcome.value.matches("pk").count(), 1);
        assert!(outcome.value.contains("  id VARCHAR(255) [not null, unique]\n"));
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value("'a,b'"), "'a,b'");
        assert_eq!(escape_value("now()"), "now()");
        assert_eq!(escape_value("coalesce(a, b)"), "coalesce(a, b)");
        assert_eq!(escape_value("a, b"), "`a, b`");
        assert_eq!(escape_value("x]"), "`x]`");
        assert_eq!(escape_value(r"'C:\'"), r"`'C:\\'`");
        assert_eq!(escape_value("'a`b', 'c'"), r"`'a\`b', 'c'`");
    }

    #[test]
    fn test_backslash_default_round_trips() {
        let sql = r"CREATE TABLE files (id INT PRIMARY KEY, path TEXT DEFAULT 'C:\', name TEXT);";
        let schema = crate::sql::parse_sql(sql, crate::sql::Dialect::PostgreSQL).value;
        assert_eq!(schema.tables()[0].columns()[1].default_value.as_deref(), Some(r"'C:\'"));

        let text = serialize(&schema).value;
        assert!(text.contains(r"  path TEXT [default: `'C:\\'`]"), "{}", text);
        let parsed = parse_dbml(&text);
        assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
        assert_eq!(parsed.value, schema);
    }
}
