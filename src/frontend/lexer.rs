//! Lexer for the C front end.
//!
//! The lexer converts source text into a stream of tokens. `#pragma` lines are
//! kept as single tokens so pragma placement survives into the AST; every
//! other preprocessor line is skipped.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::errors::{LexerError, LexerErrorKind};
use crate::utils::location::{SourceLocation, Span};
use std::iter::Peekable;
use std::str::Chars;
use unicode_xid::UnicodeXID;

/// A lexer for tokenizing source code.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
    offset: usize,
    line: usize,
    column: usize,
    token_start: SourceLocation,
    /// True until a non-whitespace character is seen on the current line
    at_line_start: bool,
    at_eof: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            offset: 0,
            line: 1,
            column: 1,
            token_start: SourceLocation::start(),
            at_line_start: true,
            at_eof: false,
        }
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.offset)
    }

    fn mark_token_start(&mut self) {
        self.token_start = self.current_location();
    }

    fn make_span(&self) -> Span {
        Span::from_locations(self.token_start, self.current_location())
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.offset..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.at_line_start = true;
        } else {
            self.column += 1;
            if !c.is_whitespace() {
                self.at_line_start = false;
            }
        }
        Some(c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume up to the end of the current line, honouring `\` continuations.
    fn skip_to_line_end(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            if c == '\\' && self.peek_next() == Some('\n') {
                self.advance();
            }
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) -> Result<(), LexerError> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') => {
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance();
                    }
                }
                Some('/') if self.peek_next() == Some('*') => {
                    self.mark_token_start();
                    self.advance();
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(self.make_error(
                                    "Unterminated block comment",
                                    LexerErrorKind::UnterminatedComment,
                                ))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        let span = self.make_span();
        let lexeme = self.source[span.start_offset..span.end_offset].to_string();
        Token::new(kind, span, lexeme)
    }

    fn make_error(&self, message: &str, kind: LexerErrorKind) -> LexerError {
        LexerError {
            message: message.to_string(),
            span: self.make_span(),
            kind,
        }
    }

    fn is_digit_of(c: Option<char>, hex: bool) -> bool {
        match c {
            Some(c) if hex => c.is_ascii_hexdigit(),
            Some(c) => c.is_ascii_digit(),
            None => false,
        }
    }

    fn scan_number(&mut self, first: char) -> Result<Token, LexerError> {
        let hex = first == '0' && matches!(self.peek(), Some('x') | Some('X'));
        if hex {
            self.advance();
            if !Self::is_digit_of(self.peek(), true) {
                return Err(self.make_error("Invalid hexadecimal literal", LexerErrorKind::InvalidNumber));
            }
        }
        while Self::is_digit_of(self.peek(), hex) {
            self.advance();
        }

        let mut is_float = false;
        if !hex && self.peek() == Some('.') {
            is_float = true;
            self.advance();
            while Self::is_digit_of(self.peek(), false) {
                self.advance();
            }
        }
        if !hex && matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            if !Self::is_digit_of(self.peek(), false) {
                return Err(self.make_error(
                    "Invalid floating-point exponent",
                    LexerErrorKind::InvalidNumber,
                ));
            }
            while Self::is_digit_of(self.peek(), false) {
                self.advance();
            }
        }

        // Suffixes: u, l, ul, ll for integers; f, l for floats.
        while let Some(c) = self.peek() {
            match c {
                'u' | 'U' | 'l' | 'L' => {
                    self.advance();
                }
                'f' | 'F' if is_float => {
                    self.advance();
                }
                _ => break,
            }
        }
        if self.peek().map(|c| c.is_xid_continue()).unwrap_or(false) {
            return Err(self.make_error("Invalid number literal", LexerErrorKind::InvalidNumber));
        }

        Ok(self.make_token(if is_float { TokenKind::Float } else { TokenKind::Integer }))
    }

    fn scan_identifier(&mut self) -> Token {
        while self.peek().map(|c| c.is_xid_continue() || c == '_').unwrap_or(false) {
            self.advance();
        }
        let span = self.make_span();
        let lexeme = &self.source[span.start_offset..span.end_offset];
        let kind = TokenKind::keyword(lexeme).unwrap_or(TokenKind::Identifier);
        Token::new(kind, span, lexeme.to_string())
    }

    /// Scan a quoted literal; the opening quote is already consumed.
    fn scan_quoted(&mut self, quote: char, kind: TokenKind) -> Result<Token, LexerError> {
        loop {
            match self.advance() {
                Some(c) if c == quote => break,
                Some('\\') => {
                    if self.advance().is_none() {
                        return Err(self.make_error(
                            "Unterminated literal",
                            LexerErrorKind::UnterminatedLiteral,
                        ));
                    }
                }
                Some('\n') | None => {
                    return Err(self.make_error(
                        "Unterminated literal",
                        LexerErrorKind::UnterminatedLiteral,
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(self.make_token(kind))
    }

    /// Handle a `#` at the start of a line. Returns a token for `#pragma`.
    fn scan_directive(&mut self) -> Option<Token> {
        let rest = &self.source[self.offset..];
        let directive = rest.trim_start_matches([' ', '\t']);
        let is_pragma = directive.starts_with("pragma")
            && !directive["pragma".len()..]
                .chars()
                .next()
                .map(|c| c.is_xid_continue())
                .unwrap_or(false);
        self.skip_to_line_end();
        if is_pragma {
            let mut token = self.make_token(TokenKind::Pragma);
            token.lexeme = token.lexeme.trim_end().to_string();
            Some(token)
        } else {
            None
        }
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        loop {
            self.skip_whitespace()?;
            let line_start = self.at_line_start;
            self.mark_token_start();

            let c = match self.advance() {
                Some(c) => c,
                None => {
                    self.at_eof = true;
                    return Ok(self.make_token(TokenKind::Eof));
                }
            };

            if c == '#' && line_start {
                match self.scan_directive() {
                    Some(token) => return Ok(token),
                    None => continue,
                }
            }

            return self.scan_token(c);
        }
    }

    fn scan_token(&mut self, c: char) -> Result<Token, LexerError> {
        use TokenKind as K;
        let kind = match c {
            '(' => K::LeftParen,
            ')' => K::RightParen,
            '[' => K::LeftBracket,
            ']' => K::RightBracket,
            '{' => K::LeftBrace,
            '}' => K::RightBrace,
            ',' => K::Comma,
            ';' => K::Semicolon,
            ':' => K::Colon,
            '?' => K::Question,
            '~' => K::Tilde,
            '.' if Self::is_digit_of(self.peek(), false) => return self.scan_number('.'),
            '.' => K::Dot,
            '+' if self.match_char('+') => K::PlusPlus,
            '+' if self.match_char('=') => K::PlusEqual,
            '+' => K::Plus,
            '-' if self.match_char('-') => K::MinusMinus,
            '-' if self.match_char('=') => K::MinusEqual,
            '-' if self.match_char('>') => K::Arrow,
            '-' => K::Minus,
            '*' if self.match_char('=') => K::StarEqual,
            '*' => K::Star,
            '/' if self.match_char('=') => K::SlashEqual,
            '/' => K::Slash,
            '%' if self.match_char('=') => K::PercentEqual,
            '%' => K::Percent,
            '=' if self.match_char('=') => K::EqualEqual,
            '=' => K::Equal,
            '!' if self.match_char('=') => K::BangEqual,
            '!' => K::Bang,
            '<' if self.match_char('<') => {
                if self.match_char('=') { K::ShlEqual } else { K::Shl }
            }
            '<' if self.match_char('=') => K::LessEqual,
            '<' => K::Less,
            '>' if self.match_char('>') => {
                if self.match_char('=') { K::ShrEqual } else { K::Shr }
            }
            '>' if self.match_char('=') => K::GreaterEqual,
            '>' => K::Greater,
            '&' if self.match_char('&') => K::AmpAmp,
            '&' if self.match_char('=') => K::AmpEqual,
            '&' => K::Amp,
            '|' if self.match_char('|') => K::PipePipe,
            '|' if self.match_char('=') => K::PipeEqual,
            '|' => K::Pipe,
            '^' if self.match_char('=') => K::CaretEqual,
            '^' => K::Caret,
            '"' => return self.scan_quoted('"', K::String),
            '\'' => return self.scan_quoted('\'', K::Char),
            c if c.is_ascii_digit() => return self.scan_number(c),
            c if c.is_xid_start() || c == '_' => return Ok(self.scan_identifier()),
            _ => {
                return Err(self.make_error(
                    &format!("Unexpected character: '{}'", c),
                    LexerErrorKind::UnexpectedChar,
                ))
            }
        };
        Ok(self.make_token(kind))
    }

    /// Check if we've reached EOF.
    pub fn is_at_end(&self) -> bool {
        self.at_eof
    }

    /// Collect all tokens into a vector.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source).tokenize().unwrap()
    }

    fn token_kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty() {
        let tokens = lex("   \n\t ");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn test_for_header() {
        let kinds = token_kinds("for (int i = 0; i <= n; i += 2)");
        assert_eq!(kinds, vec![
            TokenKind::For,
            TokenKind::LeftParen,
            TokenKind::Int,
            TokenKind::Identifier,
            TokenKind::Equal,
            TokenKind::Integer,
            TokenKind::Semicolon,
            TokenKind::Identifier,
            TokenKind::LessEqual,
            TokenKind::Identifier,
            TokenKind::Semicolon,
            TokenKind::Identifier,
            TokenKind::PlusEqual,
            TokenKind::Integer,
            TokenKind::RightParen,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("42 0x1F 10UL 3.5 1e3 2.0f .5");
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[1].kind, TokenKind::Integer);
        assert_eq!(tokens[1].lexeme, "0x1F");
        assert_eq!(tokens[2].lexeme, "10UL");
        assert_eq!(tokens[3].kind, TokenKind::Float);
        assert_eq!(tokens[4].kind, TokenKind::Float);
        assert_eq!(tokens[5].lexeme, "2.0f");
        assert_eq!(tokens[6].kind, TokenKind::Float);
    }

    #[test]
    fn test_compound_operators() {
        let kinds = token_kinds("++ -- <<= >>= << >> -> && || != ==");
        assert_eq!(kinds[..11], [
            TokenKind::PlusPlus,
            TokenKind::MinusMinus,
            TokenKind::ShlEqual,
            TokenKind::ShrEqual,
            TokenKind::Shl,
            TokenKind::Shr,
            TokenKind::Arrow,
            TokenKind::AmpAmp,
            TokenKind::PipePipe,
            TokenKind::BangEqual,
            TokenKind::EqualEqual,
        ]);
    }

    #[test]
    fn test_pragma_kept_other_directives_skipped() {
        let tokens = lex("#include <stdio.h>\n  #pragma acc parallel loop  \nx;");
        assert_eq!(tokens[0].kind, TokenKind::Pragma);
        assert_eq!(tokens[0].lexeme, "#pragma acc parallel loop");
        assert_eq!(tokens[0].span.start_line, 2);
        assert_eq!(tokens[1].lexeme, "x");
    }

    #[test]
    fn test_comments() {
        let tokens = lex("a /* block\ncomment */ b // line\nc");
        let names: Vec<_> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", ""]);
    }

    #[test]
    fn test_unterminated_comment_is_error() {
        assert!(Lexer::new("a /* never closed").tokenize().is_err());
    }

    #[test]
    fn test_char_and_string_literals() {
        let tokens = lex(r#"'a' '\n' "str\"ing""#);
        assert_eq!(tokens[0].kind, TokenKind::Char);
        assert_eq!(tokens[1].kind, TokenKind::Char);
        assert_eq!(tokens[2].kind, TokenKind::String);
    }

    #[test]
    fn test_offsets() {
        let tokens = lex("ab\n  cd");
        assert_eq!(tokens[1].span.start_offset, 5);
        assert_eq!(tokens[1].span.end_offset, 7);
        assert_eq!(tokens[1].span.start_line, 2);
        assert_eq!(tokens[1].span.start_column, 3);
    }
}
