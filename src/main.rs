use std::env;
use std::fs;
use std::path::Path;
use std::process;

use tablecraft::diagnostic::Outcome;
use tablecraft::model::Schema;
use tablecraft::sql::{self, Dialect};
use tablecraft::{dbml, schema_from_json};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Format {
    Sql,
    Dbml,
    Json,
}

impl Format {
    fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sql" | "ddl" => Some(Self::Sql),
            "dbml" => Some(Self::Dbml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn from_path(path: &str) -> Option<Self> {
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_str)
    }
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <input.sql|input.dbml|input.json> [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -f, --from <format>     Input format: sql, dbml, json (default: from extension)");
    eprintln!("  -t, --to <format>       Output format: sql, dbml, json (default: the other one)");
    eprintln!("  -d, --dialect <name>    SQL dialect: auto, generic, postgres, mysql, sqlite (default: auto)");
    eprintln!("  -o, --output <file>     Output file (default: stdout)");
    eprintln!();
    eprintln!("Set RUST_LOG=debug to trace parsing.");
    process::exit(1);
}

/// argv may be empty when the process is spawned without it.
fn program_name(args: &[String]) -> &str {
    args.first().map_or("tablecraft", String::as_str)
}

fn fail(message: String) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn read(input: &str, from: Format, dialect: Dialect) -> Outcome<Schema> {
    match from {
        Format::Sql => sql::parse_sql(input, dialect),
        Format::Dbml => dbml::parse_dbml(input),
        Format::Json => match schema_from_json(input) {
            Ok(schema) => Outcome::clean(schema),
            Err(e) => fail(e.to_string()),
        },
    }
}

fn write(schema: &Schema, to: Format) -> Outcome<String> {
    match to {
        Format::Sql => sql::write_sql(schema),
        Format::Dbml => dbml::serialize(schema),
        Format::Json => match serde_json::to_string_pretty(schema) {
            Ok(json) => Outcome::clean(json + "\n"),
            Err(e) => fail(format!("Failed to encode schema: {}", e)),
        },
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = program_name(&args);
    let Some(input_path) = args.get(1) else {
        usage(program);
    };
    let mut output_path: Option<String> = None;
    let mut from: Option<Format> = None;
    let mut to: Option<Format> = None;
    let mut dialect = Dialect::Auto;

    let mut i = 2;
    while i < args.len() {
        let flag = args[i].as_str();
        i += 1;
        let Some(value) = args.get(i) else {
            eprintln!("Missing value for {}", flag);
            usage(program);
        };
        match flag {
            "-o" | "--output" => output_path = Some(value.clone()),
            "-f" | "--from" => {
                from = Some(Format::from_str(value).unwrap_or_else(|| {
                    fail(format!("Invalid input format: {}", value))
                }));
            }
            "-t" | "--to" => {
                to = Some(Format::from_str(value).unwrap_or_else(|| {
                    fail(format!("Invalid output format: {}", value))
                }));
            }
            "-d" | "--dialect" => {
                dialect = Dialect::from_str(value)
                    .unwrap_or_else(|| fail(format!("Invalid dialect: {}", value)));
            }
            _ => {
                eprintln!("Unknown option: {}", flag);
                usage(program);
            }
        }
        i += 1;
    }

    let from = from
        .or_else(|| Format::from_path(input_path))
        .unwrap_or_else(|| {
            fail(format!(
                "Cannot tell the format of {}; pass --from sql|dbml|json",
                input_path
            ))
        });
    let to = to.unwrap_or(match from {
        Format::Sql => Format::Dbml,
        Format::Dbml | Format::Json => Format::Sql,
    });

    let input = match fs::read_to_string(input_path) {
        Ok(s) => s,
        Err(e) => fail(format!("Failed to read {}: {}", input_path, e)),
    };
    if input.trim().is_empty() {
        fail(format!("{} is empty", input_path));
    }

    let outcome = read(&input, from, dialect).and_then(|schema| write(&schema, to));
    for message in outcome.messages() {
        eprintln!("warning: {}", message);
    }

    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(&path, &outcome.value) {
                fail(format!("Failed to write {}: {}", path, e));
            }
        }
        None => print!("{}", outcome.value),
    }
}
