//! SQL DDL generation from a Schema.

use crate::diagnostic::{self, Diagnostic, Outcome};
use crate::model::{Column, Reference, Schema, Table, is_plain_identifier};

/// Words that must be quoted when used as a table or column name.
const RESERVED: &[&str] = &[
    "ADD", "ALTER", "AND", "AS", "AUTOINCREMENT", "AUTO_INCREMENT", "BY", "CHECK", "COLUMN",
    "CONSTRAINT", "CREATE", "DEFAULT", "DELETE", "DROP", "EXISTS", "FOREIGN", "FROM", "GROUP",
    "IF", "IN", "INDEX", "INSERT", "INTO", "IS", "JOIN", "KEY", "LIKE", "LIMIT", "NOT", "NULL",
    "ON", "OR", "ORDER", "PRIMARY", "REFERENCES", "SELECT", "SET", "TABLE", "TO", "UNIQUE",
    "UPDATE", "USER", "VALUES", "WHERE",
];

const ACTIONS: &[&str] = &["CASCADE", "RESTRICT", "SET NULL", "SET DEFAULT", "NO ACTION"];

/// Generate CREATE TABLE statements, one index per indexed column, and an
/// ALTER TABLE per resolved reference.
pub fn write_sql(schema: &Schema) -> Outcome<String> {
    let mut output = String::new();
    let mut diagnostics = Vec::new();

    for table in schema.tables() {
        write_table(&mut output, table, &mut diagnostics);
    }

    for reference in &schema.references {
        if schema.is_resolved(reference) {
            write_foreign_key(&mut output, reference);
        }
    }
    diagnostics.extend(diagnostic::unresolved_references(schema));

    Outcome::new(output, diagnostics)
}

fn write_table(output: &mut String, table: &Table, diagnostics: &mut Vec<Diagnostic>) {
    let primary = table.primary_key_index();
    let kept = table.primary_key().map(|c| c.name.as_str()).unwrap_or_default();
    for ignored in table.conflicting_primary_keys() {
        tracing::warn!(table = %table.name, kept, ignored = %ignored.name, "extra primary key written as plain column");
        diagnostics.push(Diagnostic::ConflictingPrimaryKey {
            table: table.name.clone(),
            kept: kept.to_string(),
            ignored: ignored.name.clone(),
        });
    }

    let definitions: Vec<String> = table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| column_definition(c, primary == Some(i)))
        .collect();

    if definitions.is_empty() {
        output.push_str(&format!("CREATE TABLE {} ();\n\n", quote(&table.name)));
    } else {
        output.push_str(&format!("CREATE TABLE {} (\n  ", quote(&table.name)));
        output.push_str(&definitions.join(",\n  "));
        output.push_str("\n);\n\n");
    }

    let mut indexed = false;
    for (i, column) in table.columns().iter().enumerate() {
        if column.is_indexed && primary != Some(i) {
            output.push_str(&format!(
                "CREATE INDEX {} ON {}({});\n",
                quote(&format!("idx_{}_{}", table.name, column.name)),
                quote(&table.name),
                quote(&column.name)
            ));
            indexed = true;
        }
    }
    if indexed {
        output.push('\n');
    }

    tracing::debug!(table = %table.name, columns = definitions.len(), "wrote CREATE TABLE");
}

fn column_definition(column: &Column, is_primary: bool) -> String {
    let mut def = format!("{} {}", quote(&column.name), sql_type(&column.typ));

    if column.is_not_null {
        def.push_str(" NOT NULL");
    }
    if column.is_unique && !is_primary {
        def.push_str(" UNIQUE");
    }
    if is_primary {
        def.push_str(" PRIMARY KEY");
    }
    if column.is_auto_increment {
        def.push_str(" AUTO_INCREMENT");
    }
    if let Some(value) = &column.default_value {
        def.push_str(" DEFAULT ");
        def.push_str(value);
    }
    if let Some(expr) = &column.check_constraint {
        def.push_str(&format!(" CHECK ({})", expr));
    }
    def
}

fn write_foreign_key(output: &mut String, reference: &Reference) {
    let owning = reference.owning();
    let referenced = reference.referenced();

    output.push_str(&format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
        quote(&owning.table),
        quote(&format!("fk_{}_{}", owning.table, owning.column)),
        quote(&owning.column),
        quote(&referenced.table),
        quote(&referenced.column)
    ));

    let options = reference.options.as_deref().unwrap_or_default();
    for event in ["delete", "update"] {
        if let Some(action) = referential_action(options, event) {
            output.push_str(&format!(" ON {} {}", event.to_uppercase(), action));
        }
    }
    output.push_str(";\n");
}

/// Find `event: action` in free-form options such as
/// `delete: cascade, update: set null`.
fn referential_action(options: &str, event: &str) -> Option<String> {
    options.split(',').find_map(|setting| {
        let (key, value) = setting.split_once(':')?;
        if !key.trim().eq_ignore_ascii_case(event) {
            return None;
        }
        let action = value.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        ACTIONS.contains(&action.as_str()).then_some(action)
    })
}

/// Uppercase a type outside quoted literals: `enum('a','b')` -> `ENUM('a','b')`.
fn sql_type(typ: &str) -> String {
    let mut out = String::with_capacity(typ.len());
    let mut quote: Option<char> = None;
    for c in typ.chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if matches!(c, '\'' | '"' | '`') => {
                quote = Some(c);
                out.push(c);
            }
            None => out.extend(c.to_uppercase()),
        }
    }
    out
}

fn quote(name: &str) -> String {
    let reserved = RESERVED.iter().any(|w| w.eq_ignore_ascii_case(name));
    if is_plain_identifier(name) && !reserved {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnRef, Direction};
    use crate::sql::{Dialect, parse_sql};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn shop() -> Schema {
        let customers = Table::new("Customers")
            .unwrap()
            .with_column(Column::new("id", "INT").unwrap().primary_key())
            .unwrap();
        let orders = Table::new("Orders")
            .unwrap()
            .with_column(Column::new("id", "INT").unwrap().primary_key().auto_increment())
            .unwrap()
            .with_column(Column::new("customer_id", "INT").unwrap().not_null().indexed())
            .unwrap();
        let mut schema = Schema::new()
            .with_table(customers)
            .unwrap()
            .with_table(orders)
            .unwrap();
        schema.add_reference(Reference::new(
            ColumnRef::new("Orders", "customer_id"),
            Direction::ManyToOne,
            ColumnRef::new("Customers", "id"),
        ));
        schema
    }

    #[test]
    fn test_users_table() {
        let table = Table::new("Users")
            .unwrap()
            .with_column(Column::new("id", "INT").unwrap().primary_key().auto_increment())
            .unwrap()
            .with_column(Column::new("email", "VARCHAR(255)").unwrap().not_null().unique())
            .unwrap();
        let schema = Schema::new().with_table(table).unwrap();

        let outcome = write_sql(&schema);
        assert!(outcome.is_clean());
        assert_eq!(
            outcome.value,
            indoc! {"
                CREATE TABLE Users (
                  id INT PRIMARY KEY AUTO_INCREMENT,
                  email VARCHAR(255) NOT NULL UNIQUE
                );

            "}
        );
    }

    #[test]
    fn test_foreign_key_comes_from_owning_side() {
        let outcome = write_sql(&shop());
        assert!(outcome.is_clean());
        assert_eq!(
            outcome.value,
            indoc! {"
                CREATE TABLE Customers (
                  id INT PRIMARY KEY
                );

                CREATE TABLE Orders (
                  id INT PRIMARY KEY AUTO_INCREMENT,
                  customer_id INT NOT NULL
                );

                CREATE INDEX idx_Orders_customer_id ON Orders(customer_id);

                ALTER TABLE Orders ADD CONSTRAINT fk_Orders_customer_id FOREIGN KEY (customer_id) REFERENCES Customers(id);
            "}
        );
    }

    #[test]
    fn test_reversed_direction_writes_same_constraint() {
        let mut schema = shop();
        schema.references = vec![Reference::new(
            ColumnRef::new("Customers", "id"),
            Direction::OneToMany,
            ColumnRef::new("Orders", "customer_id"),
        )];
        let sql = write_sql(&schema).value;
        assert!(sql.contains(
            "ALTER TABLE Orders ADD CONSTRAINT fk_Orders_customer_id FOREIGN KEY (customer_id) REFERENCES Customers(id);\n"
        ));
    }

    #[test]
    fn test_referential_actions() {
        let mut schema = shop();
        schema.references[0].options = Some("update: set  null, delete: cascade, note: 'x'".into());
        let sql = write_sql(&schema).value;
        assert!(sql.ends_with("REFERENCES Customers(id) ON DELETE CASCADE ON UPDATE SET NULL;\n"));

        schema.references[0].options = Some("delete: explode".into());
        assert!(write_sql(&schema).value.ends_with("REFERENCES Customers(id);\n"));
    }

    #[test]
    fn test_only_first_primary_key_is_written() {
        // The mutation API never produces this; deserialized input can.
        let json = r#"{"tables": [{"name": "t", "columns": [
            {"name": "a", "type": "int", "isPrimaryKey": true},
            {"name": "b", "type": "int", "isPrimaryKey": true, "isUnique": true}
        ]}]}"#;
        let schema: Schema = serde_json::from_str(json).unwrap();

        let outcome = write_sql(&schema);
        assert_eq!(outcome.value.matches("PRIMARY KEY").count(), 1);
        assert!(outcome.value.contains("  b INT UNIQUE\n"));
        assert_eq!(
            outcome.diagnostics,
            vec![Diagnostic::ConflictingPrimaryKey {
                table: "t".into(),
                kept: "a".into(),
                ignored: "b".into(),
            }]
        );
    }

    #[test]
    fn test_same_named_primary_keys_write_one_key() {
        let table = Table::new("t")
            .unwrap()
            .with_column(Column::new("a", "int").unwrap().primary_key())
            .unwrap()
            .with_column(Column::new("b", "int").unwrap().indexed())
            .unwrap();
        let mut schema = Schema::new().with_table(table).unwrap();
        let renamed = schema.table_mut("t").unwrap().column_mut("b").unwrap();
        renamed.name = "a".into();
        renamed.is_primary_key = true;

        let outcome = write_sql(&schema);
        assert_eq!(outcome.value.matches("PRIMARY KEY").count(), 1);
        assert!(outcome.value.contains("CREATE INDEX idx_t_a ON t(a);\n"));
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_types_uppercased_outside_quotes_and_names_quoted() {
        let table = Table::new("order items")
            .unwrap()
            .with_column(Column::new("status", "enum('new','Done')").unwrap())
            .unwrap()
            .with_column(Column::new("key", "varchar(10)").unwrap().with_default("'a,b'"))
            .unwrap()
            .with_column(Column::new("qty", "int").unwrap().with_check("qty > 0"))
            .unwrap();
        let sql = write_sql(&Schema::new().with_table(table).unwrap()).value;

        assert_eq!(
            sql,
            indoc! {r#"
                CREATE TABLE "order items" (
                  status ENUM('new','Done'),
                  "key" VARCHAR(10) DEFAULT 'a,b',
                  qty INT CHECK (qty > 0)
                );

            "#}
        );
    }

    #[test]
    fn test_unresolved_reference_is_dropped() {
        let mut schema = shop();
        schema.add_reference(Reference::new(
            ColumnRef::new("Orders", "cust_id"),
            Direction::ManyToOne,
            ColumnRef::new("Missing", "id"),
        ));
        let outcome = write_sql(&schema);
        assert_eq!(outcome.value.matches("ALTER TABLE").count(), 1);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_written_sql_parses_back_to_same_schema() {
        let mut schema = shop();
        schema.references[0].options = Some("delete: cascade".into());
        let table = schema.table_mut("Orders").unwrap();
        table
            .add_column(
                Column::new("total", "DECIMAL(10,2)")
                    .unwrap()
                    .with_default("0")
                    .with_check("total >= 0"),
            )
            .unwrap();

        let sql = write_sql(&schema).value;
        let parsed = parse_sql(&sql, Dialect::Generic);
        assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
        assert_eq!(parsed.value, schema);
    }
}
