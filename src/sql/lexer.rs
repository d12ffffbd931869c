//! SQL lexer for tokenizing DDL statements.
//!
//! Every token keeps the byte range it came from so the parser can copy type
//! parameters, defaults and CHECK bodies out of the input verbatim.

use super::dialect::Dialect;
use std::iter::Peekable;
use std::ops::Range;
use std::str::CharIndices;

/// SQL token types.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Create,
    Alter,
    Add,
    Table,
    Primary,
    Key,
    Foreign,
    References,
    Not,
    Null,
    Unique,
    Default,
    On,
    Delete,
    Update,
    Constraint,
    Index,
    If,
    Exists,
    AutoIncrement, // AUTO_INCREMENT / AUTOINCREMENT
    Check,

    // Identifiers and literals
    Ident(String),
    QuotedIdent(String),
    Str(String),
    Num(String),

    // Symbols
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,
    DoubleColon,  // ::
    ArraySuffix,  // []
    Other(char),

    // End of input
    Eof,
}

impl Token {
    /// Case-insensitive match against an unquoted word that is not a keyword.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(word))
    }

    /// Keywords that Postgres, SQLite and MySQL all accept as unquoted
    /// column names.
    pub fn is_name_keyword(&self) -> bool {
        matches!(
            self,
            Token::Key | Token::Index | Token::Add | Token::Delete | Token::Update
        )
    }

    /// Identifier text, quoted or not.
    pub fn name(&self) -> Option<&str> {
        match self {
            Token::Ident(s) | Token::QuotedIdent(s) => Some(s),
            _ => None,
        }
    }
}

/// A token and the bytes of input it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Range<usize>,
}

/// SQL lexer.
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    current: Option<(usize, char)>,
    backslash_escapes: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, dialect: Dialect) -> Self {
        let mut chars = input.char_indices().peekable();
        let current = chars.next();
        Self {
            input,
            chars,
            current,
            backslash_escapes: dialect.backslash_escapes(),
        }
    }

    fn advance(&mut self) {
        self.current = self.chars.next();
    }

    fn current_char(&self) -> Option<char> {
        self.current.map(|(_, c)| c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.current.map_or(self.input.len(), |(i, _)| i)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.current_char() {
            self.advance();
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.advance(); // skip /
        self.advance(); // skip *
        while let Some(c) = self.current_char() {
            self.advance();
            if c == '*' && self.current_char() == Some('/') {
                self.advance();
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_quoted_identifier(&mut self, close: char) -> String {
        self.advance(); // skip opening quote
        let mut ident = String::new();
        while let Some(c) = self.current_char() {
            if c == close {
                // Check for escaped quote (doubled)
                if self.peek() == Some(close) {
                    ident.push(c);
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // skip closing quote
                    break;
                }
            } else {
                ident.push(c);
                self.advance();
            }
        }
        ident
    }

    fn read_string(&mut self) -> String {
        self.advance(); // skip opening quote
        let mut s = String::new();
        while let Some(c) = self.current_char() {
            if c == '\'' {
                // Check for escaped quote
                if self.peek() == Some('\'') {
                    s.push(c);
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // skip closing quote
                    break;
                }
            } else if c == '\\' && self.backslash_escapes {
                self.advance();
                if let Some(escaped) = self.current_char() {
                    match escaped {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        'r' => s.push('\r'),
                        _ => s.push(escaped),
                    }
                    self.advance();
                }
            } else {
                s.push(c);
                self.advance();
            }
        }
        s
    }

    fn read_number(&mut self) -> String {
        let mut num = String::new();
        let mut has_dot = false;

        // Handle negative sign
        if self.current_char() == Some('-') {
            num.push('-');
            self.advance();
        }

        while let Some(c) = self.current_char() {
            if c.is_ascii_digit() {
                num.push(c);
                self.advance();
            } else if c == '.' && !has_dot {
                has_dot = true;
                num.push(c);
                self.advance();
            } else {
                break;
            }
        }
        num
    }

    fn keyword_or_ident(&self, s: String) -> Token {
        match s.to_uppercase().as_str() {
            "CREATE" => Token::Create,
            "ALTER" => Token::Alter,
            "ADD" => Token::Add,
            "TABLE" => Token::Table,
            "PRIMARY" => Token::Primary,
            "KEY" => Token::Key,
            "FOREIGN" => Token::Foreign,
            "REFERENCES" => Token::References,
            "NOT" => Token::Not,
            "NULL" => Token::Null,
            "UNIQUE" => Token::Unique,
            "DEFAULT" => Token::Default,
            "ON" => Token::On,
            "DELETE" => Token::Delete,
            "UPDATE" => Token::Update,
            "CONSTRAINT" => Token::Constraint,
            "INDEX" => Token::Index,
            "IF" => Token::If,
            "EXISTS" => Token::Exists,
            "AUTO_INCREMENT" | "AUTOINCREMENT" => Token::AutoIncrement,
            "CHECK" => Token::Check,
            _ => Token::Ident(s),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            self.skip_whitespace();
            match self.current_char() {
                Some('-') if self.peek() == Some('-') => self.skip_line_comment(),
                Some('/') if self.peek() == Some('*') => self.skip_block_comment(),
                Some('#') => self.skip_line_comment(),
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        let c = self.current_char()?;
        let tok = match c {
            '-' if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                Token::Num(self.read_number())
            }
            ':' if self.peek() == Some(':') => {
                self.advance();
                self.advance();
                Token::DoubleColon
            }
            '[' if self.peek() == Some(']') => {
                self.advance();
                self.advance();
                Token::ArraySuffix
            }
            // SQL Server style [identifier]
            '[' => Token::QuotedIdent(self.read_quoted_identifier(']')),
            '"' => Token::QuotedIdent(self.read_quoted_identifier('"')),
            '`' => Token::QuotedIdent(self.read_quoted_identifier('`')),
            '\'' => Token::Str(self.read_string()),
            c if c.is_ascii_digit() => Token::Num(self.read_number()),
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.read_identifier();
                self.keyword_or_ident(ident)
            }
            _ => {
                self.advance();
                match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    ';' => Token::Semicolon,
                    '.' => Token::Dot,
                    other => Token::Other(other),
                }
            }
        };
        Some(tok)
    }

    /// Collect all tokens, ending with `Eof`.
    pub fn tokenize(&mut self) -> Vec<Spanned> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.offset();
            match self.next_token() {
                Some(token) => tokens.push(Spanned {
                    token,
                    span: start..self.offset(),
                }),
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span: start..start,
                    });
                    break;
                }
            }
        }
        tokens
    }
}
