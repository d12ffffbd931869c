//! SQL dialect detection and handling.

/// SQL dialect variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Auto-detect from dump content
    #[default]
    Auto,
    /// Standard SQL
    Generic,
    /// PostgreSQL
    PostgreSQL,
    /// MySQL / MariaDB
    MySQL,
    /// SQLite
    SQLite,
}

impl Dialect {
    /// Parse dialect from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "generic" => Some(Self::Generic),
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Detect dialect from SQL content.
    pub fn detect(content: &str) -> Self {
        let lower = content.to_lowercase();

        // Check header comments
        if lower.contains("postgresql database dump")
            || lower.contains("pg_dump")
            || lower.contains("-- postgres")
        {
            return Self::PostgreSQL;
        }
        if lower.contains("mysql dump")
            || lower.contains("mysqldump")
            || lower.contains("mariadb dump")
            || lower.contains("-- mysql")
        {
            return Self::MySQL;
        }

        let code = outside_strings(&lower);
        if has_word(&code, &["pragma", "autoincrement"]) {
            return Self::SQLite;
        }

        // Check type keywords
        if has_word(&code, &["serial", "bigserial", "smallserial", "timestamptz"])
            || code.contains("text[]")
            || code.contains("::text")
        {
            return Self::PostgreSQL;
        }
        if has_word(&code, &["auto_increment", "tinyint", "unsigned"])
            || code.contains("engine=")
            || code.contains('`')
        {
            return Self::MySQL;
        }

        Self::Generic
    }

    /// Resolve Auto to a concrete dialect.
    pub fn resolve(self, content: &str) -> Self {
        match self {
            Self::Auto => Self::detect(content),
            other => other,
        }
    }

    /// Whether `\` escapes the next character inside string literals.
    pub fn backslash_escapes(self) -> bool {
        matches!(self, Self::MySQL)
    }
}

fn has_word(code: &str, words: &[&str]) -> bool {
    code.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|w| words.contains(&w))
}

/// Blank out single-quoted literals so their contents never decide the dialect.
fn outside_strings(text: &str) -> String {
    let mut in_string = false;
    text.chars()
        .map(|c| {
            if c == '\'' {
                in_string = !in_string;
                ' '
            } else if in_string {
                ' '
            } else {
                c
            }
        })
        .collect()
}
