use std::iter::Peekable;
use std::ops::Range;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    QuotedIdent(String), // "order items"
    Str(String),         // 'text' or '''text'''
    Backtick(String),    // `now()`
    Num(String),

    LBrace,   // {
    RBrace,   // }
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Colon,    // :
    Dot,      // .
    Gt,       // >
    Lt,       // <
    LtGt,     // <>
    Minus,    // -
    Newline,
    Other(char),

    /// Lexing failed here; the parser reports it for the enclosing block.
    Invalid(LexError),
    Eof,
}

impl Token {
    /// Case-insensitive match against an unquoted word.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(word))
    }

    /// Identifier text, quoted or not.
    pub fn name(&self) -> Option<&str> {
        match self {
            Token::Ident(s) | Token::QuotedIdent(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("Unterminated string")]
    UnterminatedString,
    #[error("Unterminated comment")]
    UnterminatedComment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Range<usize>,
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.input.len(), |&(i, _)| i)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn rest(&self, from: usize) -> &'a str {
        &self.input[from..]
    }

    /// Skip spaces and comments, stopping at newlines.
    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            let start = self.offset();
            match self.peek_char() {
                Some('\n') => break,
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('/') if self.rest(start).starts_with("//") => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                Some('/') if self.rest(start).starts_with("/*") => {
                    self.chars.next();
                    self.chars.next();
                    let mut closed = false;
                    while let Some((_, c)) = self.chars.next() {
                        if c == '*' && self.peek_char() == Some('/') {
                            self.chars.next();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(LexError::UnterminatedComment);
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn read_ident(&mut self, first: char) -> String {
        let mut s = String::from(first);
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        s
    }

    /// Read up to `close`, honouring backslash escapes. Single-line strings
    /// stop at a newline so one bad literal cannot swallow the file.
    fn read_quoted(&mut self, close: char, multiline: bool) -> Result<String, LexError> {
        let mut s = String::new();
        loop {
            match self.peek_char() {
                Some(c) if c == close => {
                    self.chars.next();
                    return Ok(s);
                }
                Some('\n') if !multiline => return Err(LexError::UnterminatedString),
                Some('\\') => {
                    self.chars.next();
                    if let Some((_, c)) = self.chars.next() {
                        match c {
                            'n' => s.push('\n'),
                            't' => s.push('\t'),
                            _ => s.push(c),
                        }
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.chars.next();
                }
                None => return Err(LexError::UnterminatedString),
            }
        }
    }

    fn read_triple_quoted(&mut self) -> Result<String, LexError> {
        let start = self.offset();
        match self.rest(start).find("'''") {
            Some(len) => {
                let text = self.rest(start)[..len].to_string();
                while self.offset() < start + len + 3 {
                    self.chars.next();
                }
                Ok(text)
            }
            None => {
                while self.chars.next().is_some() {}
                Err(LexError::UnterminatedString)
            }
        }
    }

    fn read_number(&mut self, first: char) -> String {
        let mut s = String::from(first);
        let mut has_dot = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                s.push(c);
                self.chars.next();
            } else if c == '.' && !has_dot {
                has_dot = true;
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        s
    }

    fn next_token(&mut self, start: usize) -> Result<Token, LexError> {
        let c = match self.chars.next() {
            Some((_, c)) => c,
            None => return Ok(Token::Eof),
        };

        let tok = match c {
            '\n' => Token::Newline,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            ':' => Token::Colon,
            '.' => Token::Dot,
            '>' => Token::Gt,
            '-' => Token::Minus,
            '<' => {
                if self.peek_char() == Some('>') {
                    self.chars.next();
                    Token::LtGt
                } else {
                    Token::Lt
                }
            }
            '\'' if self.rest(start).starts_with("'''") => {
                self.chars.next();
                self.chars.next();
                Token::Str(self.read_triple_quoted()?)
            }
            '\'' => Token::Str(self.read_quoted('\'', false)?),
            '"' => Token::QuotedIdent(self.read_quoted('"', false)?),
            '`' => Token::Backtick(self.read_quoted('`', true)?),
            c if c.is_ascii_digit() => Token::Num(self.read_number(c)),
            c if c.is_alphabetic() || c == '_' => Token::Ident(self.read_ident(c)),
            other => Token::Other(other),
        };

        Ok(tok)
    }

    /// Collect all tokens, ending with `Eof`. Lex errors become
    /// `Token::Invalid` so the parser can skip just the affected block.
    pub fn tokenize(mut self) -> Vec<Spanned> {
        let mut tokens = Vec::new();
        loop {
            let before = self.offset();
            if let Err(err) = self.skip_whitespace_and_comments() {
                let end = self.offset();
                tokens.push(Spanned {
                    token: Token::Invalid(err),
                    span: before..end,
                });
                continue;
            }

            let start = self.offset();
            let token = self.next_token(start).unwrap_or_else(Token::Invalid);
            let span = start..self.offset();
            if token == Token::Eof {
                tokens.push(Spanned { token, span });
                break;
            }
            tokens.push(Spanned { token, span });
        }
        tokens
    }
}
