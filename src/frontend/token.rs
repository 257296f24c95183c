//! Token types for the C front end.

use crate::utils::location::Span;
use std::fmt;

/// A token in the source code.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The source span
    pub span: Span,
    /// The lexeme (raw text)
    pub lexeme: String,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span, lexeme: String) -> Self {
        Self { kind, span, lexeme }
    }

    /// Check if this is an EOF token.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.lexeme)
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    /// Integer literal (decimal, octal or hex, optional u/l suffixes)
    Integer,
    /// Floating-point literal
    Float,
    /// Character literal
    Char,
    /// String literal
    String,

    /// Identifier
    Identifier,

    // Statement keywords
    For,
    While,
    Do,
    If,
    Else,
    Return,
    Break,
    Continue,
    Goto,
    Switch,
    Case,
    Default,

    // Type keywords and qualifiers
    Void,
    CharType,
    Short,
    Int,
    Long,
    FloatType,
    Double,
    Signed,
    Unsigned,
    Const,
    Volatile,
    Static,
    Extern,
    Register,
    Restrict,
    Inline,
    Struct,
    Sizeof,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,

    // Comparison
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Assignment
    Equal,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,
    AmpEqual,
    PipeEqual,
    CaretEqual,
    ShlEqual,
    ShrEqual,

    // Logical and bitwise
    AmpAmp,
    PipePipe,
    Bang,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Semicolon,
    Colon,
    Question,
    Dot,
    Arrow,

    /// `#pragma ...` line (lexeme is the whole line)
    Pragma,

    /// End of file
    Eof,
}

impl TokenKind {
    /// Get the keyword for a string, if it is a keyword.
    pub fn keyword(s: &str) -> Option<TokenKind> {
        use TokenKind::*;
        let kind = match s {
            "for" => For,
            "while" => While,
            "do" => Do,
            "if" => If,
            "else" => Else,
            "return" => Return,
            "break" => Break,
            "continue" => Continue,
            "goto" => Goto,
            "switch" => Switch,
            "case" => Case,
            "default" => Default,
            "void" => Void,
            "char" => CharType,
            "short" => Short,
            "int" => Int,
            "long" => Long,
            "float" => FloatType,
            "double" => Double,
            "signed" => Signed,
            "unsigned" => Unsigned,
            "const" => Const,
            "volatile" => Volatile,
            "static" => Static,
            "extern" => Extern,
            "register" => Register,
            "restrict" => Restrict,
            "inline" => Inline,
            "struct" => Struct,
            "sizeof" => Sizeof,
            _ => return None,
        };
        Some(kind)
    }

    /// Check if this token can start a declaration.
    pub fn starts_declaration(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Void | CharType | Short | Int | Long | FloatType | Double | Signed | Unsigned |
            Const | Volatile | Static | Extern | Register | Inline | Struct
        )
    }

    /// Check if this is an assignment operator.
    pub fn is_assignment(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Equal | PlusEqual | MinusEqual | StarEqual | SlashEqual | PercentEqual |
            AmpEqual | PipeEqual | CaretEqual | ShlEqual | ShrEqual
        )
    }

    /// Get a human-readable name for this token kind.
    pub fn name(&self) -> &'static str {
        use TokenKind::*;
        match self {
            Integer => "integer",
            Float => "float",
            Char => "character",
            String => "string",
            Identifier => "identifier",
            For => "for",
            While => "while",
            Do => "do",
            If => "if",
            Else => "else",
            Return => "return",
            Break => "break",
            Continue => "continue",
            Goto => "goto",
            Switch => "switch",
            Case => "case",
            Default => "default",
            Void => "void",
            CharType => "char",
            Short => "short",
            Int => "int",
            Long => "long",
            FloatType => "float",
            Double => "double",
            Signed => "signed",
            Unsigned => "unsigned",
            Const => "const",
            Volatile => "volatile",
            Static => "static",
            Extern => "extern",
            Register => "register",
            Restrict => "restrict",
            Inline => "inline",
            Struct => "struct",
            Sizeof => "sizeof",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            PlusPlus => "++",
            MinusMinus => "--",
            EqualEqual => "==",
            BangEqual => "!=",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
            Equal => "=",
            PlusEqual => "+=",
            MinusEqual => "-=",
            StarEqual => "*=",
            SlashEqual => "/=",
            PercentEqual => "%=",
            AmpEqual => "&=",
            PipeEqual => "|=",
            CaretEqual => "^=",
            ShlEqual => "<<=",
            ShrEqual => ">>=",
            AmpAmp => "&&",
            PipePipe => "||",
            Bang => "!",
            Amp => "&",
            Pipe => "|",
            Caret => "^",
            Tilde => "~",
            Shl => "<<",
            Shr => ">>",
            LeftParen => "(",
            RightParen => ")",
            LeftBracket => "[",
            RightBracket => "]",
            LeftBrace => "{",
            RightBrace => "}",
            Comma => ",",
            Semicolon => ";",
            Colon => ":",
            Question => "?",
            Dot => ".",
            Arrow => "->",
            Pragma => "#pragma",
            Eof => "end of file",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(TokenKind::keyword("for"), Some(TokenKind::For));
        assert_eq!(TokenKind::keyword("unsigned"), Some(TokenKind::Unsigned));
        assert_eq!(TokenKind::keyword("foobar"), None);
    }

    #[test]
    fn test_declaration_starters() {
        assert!(TokenKind::Int.starts_declaration());
        assert!(TokenKind::Const.starts_declaration());
        assert!(!TokenKind::For.starts_declaration());
        assert!(!TokenKind::Identifier.starts_declaration());
    }

    #[test]
    fn test_assignment_ops() {
        assert!(TokenKind::ShlEqual.is_assignment());
        assert!(TokenKind::Equal.is_assignment());
        assert!(!TokenKind::EqualEqual.is_assignment());
    }
}
