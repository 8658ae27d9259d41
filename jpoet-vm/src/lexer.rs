//! Tokenizer

use crate::ast::Pos;
use jpoet_core::{EvalError, Location};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Keyword(Keyword),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,
    Colon,
    DoubleColon,
    TripleColon,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    Bang,
    AndAnd,
    OrOr,
    Amp,
    Pipe,
    Caret,
    Tilde,
    ShiftLeft,
    ShiftRight,
    Dollar,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Local,
    Function,
    If,
    Then,
    Else,
    True,
    False,
    Null,
    Import,
    ImportStr,
    Error,
    In,
    SelfKw,
    Super,
    Assert,
    For,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Local => "local",
            Keyword::Function => "function",
            Keyword::If => "if",
            Keyword::Then => "then",
            Keyword::Else => "else",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Null => "null",
            Keyword::Import => "import",
            Keyword::ImportStr => "importstr",
            Keyword::Error => "error",
            Keyword::In => "in",
            Keyword::SelfKw => "self",
            Keyword::Super => "super",
            Keyword::Assert => "assert",
            Keyword::For => "for",
        }
    }

    fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "local" => Keyword::Local,
            "function" => Keyword::Function,
            "if" => Keyword::If,
            "then" => Keyword::Then,
            "else" => Keyword::Else,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "null" => Keyword::Null,
            "import" => Keyword::Import,
            "importstr" => Keyword::ImportStr,
            "error" => Keyword::Error,
            "in" => Keyword::In,
            "self" => Keyword::SelfKw,
            "super" => Keyword::Super,
            "assert" => Keyword::Assert,
            "for" => Keyword::For,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: Pos,
}

struct Lexer<'a> {
    file: &'a str,
    chars: Vec<char>,
    idx: usize,
    line: usize,
    column: usize,
}

/// Split `source` into tokens, ending with `Token::Eof`
pub fn tokenize(file: &str, source: &str) -> Result<Vec<Spanned>, EvalError> {
    let mut lexer = Lexer {
        file,
        chars: source.chars().collect(),
        idx: 0,
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        lexer.skip_trivia()?;
        let pos = lexer.pos();
        let Some(c) = lexer.peek() else {
            tokens.push(Spanned { token: Token::Eof, pos });
            return Ok(tokens);
        };
        let token = match c {
            '{' => lexer.single(Token::LBrace),
            '}' => lexer.single(Token::RBrace),
            '[' => lexer.single(Token::LBracket),
            ']' => lexer.single(Token::RBracket),
            '(' => lexer.single(Token::LParen),
            ')' => lexer.single(Token::RParen),
            ',' => lexer.single(Token::Comma),
            ';' => lexer.single(Token::Semicolon),
            '.' => lexer.single(Token::Dot),
            '+' => lexer.single(Token::Plus),
            '-' => lexer.single(Token::Minus),
            '*' => lexer.single(Token::Star),
            '/' => lexer.single(Token::Slash),
            '%' => lexer.single(Token::Percent),
            '$' => lexer.single(Token::Dollar),
            '^' => lexer.single(Token::Caret),
            '~' => lexer.single(Token::Tilde),
            ':' => {
                lexer.bump();
                if lexer.eat(':') {
                    if lexer.eat(':') {
                        Token::TripleColon
                    } else {
                        Token::DoubleColon
                    }
                } else {
                    Token::Colon
                }
            }
            '=' => {
                lexer.bump();
                if lexer.eat('=') { Token::EqEq } else { Token::Assign }
            }
            '!' => {
                lexer.bump();
                if lexer.eat('=') { Token::NotEq } else { Token::Bang }
            }
            '<' => {
                lexer.bump();
                if lexer.eat('=') {
                    Token::Le
                } else if lexer.eat('<') {
                    Token::ShiftLeft
                } else {
                    Token::Lt
                }
            }
            '>' => {
                lexer.bump();
                if lexer.eat('=') {
                    Token::Ge
                } else if lexer.eat('>') {
                    Token::ShiftRight
                } else {
                    Token::Gt
                }
            }
            '&' => {
                lexer.bump();
                if lexer.eat('&') { Token::AndAnd } else { Token::Amp }
            }
            '|' if lexer.peek_at(1) == Some('|') && lexer.peek_at(2) == Some('|') => {
                Token::Str(lexer.text_block()?)
            }
            '|' => {
                lexer.bump();
                if lexer.eat('|') { Token::OrOr } else { Token::Pipe }
            }
            '@' => match lexer.peek_at(1) {
                Some(quote @ ('"' | '\'')) => {
                    lexer.bump();
                    Token::Str(lexer.verbatim_string(quote)?)
                }
                _ => return Err(lexer.error("expected a quote after @", pos)),
            },
            '"' | '\'' => Token::Str(lexer.string(c)?),
            c if c.is_ascii_digit() => Token::Number(lexer.number()?),
            c if c == '_' || c.is_ascii_alphabetic() => {
                let ident = lexer.ident();
                match Keyword::from_ident(&ident) {
                    Some(kw) => Token::Keyword(kw),
                    None => Token::Ident(ident),
                }
            }
            other => return Err(lexer.error(format!("unexpected character {:?}", other), pos)),
        };
        tokens.push(Spanned { token, pos });
    }
}

impl Lexer<'_> {
    fn pos(&self) -> Pos {
        Pos { line: self.line, column: self.column }
    }

    fn error(&self, message: impl Into<String>, pos: Pos) -> EvalError {
        EvalError::parse(
            message,
            Location { file: self.file.to_string(), line: pos.line, column: pos.column },
        )
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.bump();
        token
    }

    fn skip_trivia(&mut self) -> Result<(), EvalError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('#'), _) | (Some('/'), Some('/')) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error("unterminated comment", start)),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_ascii_alphanumeric() {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        ident
    }

    fn number(&mut self) -> Result<f64, EvalError> {
        let start = self.pos();
        let mut text = String::new();
        self.digits(&mut text);
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.bump();
            self.digits(&mut text);
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.bump();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.error("malformed exponent in number literal", start));
            }
            self.digits(&mut text);
        }
        text.parse::<f64>()
            .map_err(|e| self.error(format!("invalid number {}: {}", text, e), start))
    }

    fn digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, EvalError> {
        let start = self.pos();
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string", start)),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let escape_pos = self.pos();
                    match self.bump() {
                        Some('"') => out.push('"'),
                        Some('\'') => out.push('\''),
                        Some('\\') => out.push('\\'),
                        Some('/') => out.push('/'),
                        Some('b') => out.push('\u{8}'),
                        Some('f') => out.push('\u{c}'),
                        Some('n') => out.push('\n'),
                        Some('r') => out.push('\r'),
                        Some('t') => out.push('\t'),
                        Some('u') => out.push(self.unicode_escape(escape_pos)?),
                        Some(other) => {
                            return Err(self.error(format!("unknown escape sequence \\{}", other), escape_pos))
                        }
                        None => return Err(self.error("unterminated string", start)),
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    /// `@'...'`: no escapes except a doubled quote
    fn verbatim_string(&mut self, quote: char) -> Result<String, EvalError> {
        let start = self.pos();
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string", start)),
                Some(c) if c == quote => {
                    if self.eat(quote) {
                        out.push(quote);
                    } else {
                        return Ok(out);
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    /// `|||` text block. The first line's indentation is stripped from every
    /// line; the block ends at the first line indented less, which must hold
    /// the closing `|||`.
    fn text_block(&mut self) -> Result<String, EvalError> {
        let start = self.pos();
        for _ in 0..3 {
            self.bump();
        }
        let chomp = self.eat('-');
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.bump();
        }
        if !self.eat('\n') {
            return Err(self.error("text block requires a new line after |||", start));
        }

        let mut out = String::new();
        // Leading blank lines belong to the block
        while self.peek() == Some('\n') {
            self.bump();
            out.push('\n');
        }
        let mut indent = String::new();
        while let Some(c @ (' ' | '\t')) = self.peek() {
            indent.push(c);
            self.bump();
        }
        if indent.is_empty() {
            return Err(self.error("text block's first line must start with whitespace", start));
        }

        loop {
            while let Some(c) = self.peek() {
                self.bump();
                out.push(c);
                if c == '\n' {
                    break;
                }
            }
            if self.peek().is_none() {
                return Err(self.error("unterminated text block", start));
            }
            while self.peek() == Some('\n') {
                self.bump();
                out.push('\n');
            }
            let rest: String = self.chars[self.idx..].iter().take(indent.chars().count()).collect();
            if rest == indent {
                for _ in 0..indent.chars().count() {
                    self.bump();
                }
                continue;
            }
            while matches!(self.peek(), Some(' ' | '\t')) {
                self.bump();
            }
            if self.peek() == Some('|') && self.peek_at(1) == Some('|') && self.peek_at(2) == Some('|') {
                for _ in 0..3 {
                    self.bump();
                }
                if chomp {
                    while out.ends_with('\n') {
                        out.pop();
                    }
                }
                return Ok(out);
            }
            return Err(self.error("text block not terminated with |||", start));
        }
    }

    fn unicode_escape(&mut self, pos: Pos) -> Result<char, EvalError> {
        let high = self.hex4(pos)?;
        if (0xD800..0xDC00).contains(&high) {
            if self.peek() == Some('\\') && self.peek_at(1) == Some('u') {
                self.bump();
                self.bump();
                let low = self.hex4(pos)?;
                let combined = 0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
                return char::from_u32(combined).ok_or_else(|| self.error("invalid surrogate pair", pos));
            }
            return Err(self.error("unpaired surrogate in unicode escape", pos));
        }
        char::from_u32(high).ok_or_else(|| self.error("invalid unicode escape", pos))
    }

    fn hex4(&mut self, pos: Pos) -> Result<u32, EvalError> {
        let mut value = 0u32;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("truncated unicode escape", pos))?;
            value = value * 16 + digit;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize("test", source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_operators_and_literals() {
        assert_eq!(
            kinds("a::1 <= 2.5e1"),
            vec![
                Token::Ident("a".into()),
                Token::DoubleColon,
                Token::Number(1.0),
                Token::Le,
                Token::Number(25.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\nA""#),
            vec![Token::Str("it's".into()), Token::Str("a\nA".into()), Token::Eof]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("// line\n# hash\n/* block */ null"),
            vec![Token::Keyword(Keyword::Null), Token::Eof]
        );
    }

    #[test]
    fn test_bitwise_operators() {
        assert_eq!(
            kinds("a & b | c ^ ~d << 1 >> 2"),
            vec![
                Token::Ident("a".into()),
                Token::Amp,
                Token::Ident("b".into()),
                Token::Pipe,
                Token::Ident("c".into()),
                Token::Caret,
                Token::Tilde,
                Token::Ident("d".into()),
                Token::ShiftLeft,
                Token::Number(1.0),
                Token::ShiftRight,
                Token::Number(2.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_text_block() {
        let source = "|||\n  line one\n    indented\n\n  last\n|||";
        assert_eq!(
            kinds(source),
            vec![Token::Str("line one\n  indented\n\nlast\n".into()), Token::Eof]
        );
        assert_eq!(kinds("|||-\n  x\n|||"), vec![Token::Str("x".into()), Token::Eof]);
    }

    #[test]
    fn test_verbatim_strings() {
        assert_eq!(
            kinds(r#"@'a\b''c' @"x""y""#),
            vec![Token::Str("a\\b'c".into()), Token::Str("x\"y".into()), Token::Eof]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("test", "1 +\n  x").unwrap();
        assert_eq!(tokens[2].pos, Pos { line: 2, column: 3 });
    }

    #[test]
    fn test_unterminated_string_error() {
        let err = tokenize("main.jsonnet", "'abc").unwrap_err();
        assert!(err.message.contains("unterminated string"));
        assert_eq!(err.location.unwrap().file, "main.jsonnet");
    }
}
