use std::fmt::Display;

use crate::diagnostic::{Diagnostic, Diagnostics, Location};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String(String),
    Number(f64),

    // Keywords
    And,
    Class,
    Else,
    False,
    Fun,
    For,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    // End of file
    Eof,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::LeftParen => write!(f, "("),
            TokenType::RightParen => write!(f, ")"),
            TokenType::LeftBrace => write!(f, "{{"),
            TokenType::RightBrace => write!(f, "}}"),
            TokenType::Comma => write!(f, ","),
            TokenType::Dot => write!(f, "."),
            TokenType::Minus => write!(f, "-"),
            TokenType::Plus => write!(f, "+"),
            TokenType::Semicolon => write!(f, ";"),
            TokenType::Slash => write!(f, "/"),
            TokenType::Star => write!(f, "*"),
            TokenType::Bang => write!(f, "!"),
            TokenType::BangEqual => write!(f, "!="),
            TokenType::Equal => write!(f, "="),
            TokenType::EqualEqual => write!(f, "=="),
            TokenType::Greater => write!(f, ">"),
            TokenType::GreaterEqual => write!(f, ">="),
            TokenType::Less => write!(f, "<"),
            TokenType::LessEqual => write!(f, "<="),
            TokenType::Identifier => write!(f, "identifier"),
            TokenType::String(s) => write!(f, "string \"{s}\""),
            TokenType::Number(n) => write!(f, "number {n}"),
            TokenType::And => write!(f, "and"),
            TokenType::Class => write!(f, "class"),
            TokenType::Else => write!(f, "else"),
            TokenType::False => write!(f, "false"),
            TokenType::Fun => write!(f, "fun"),
            TokenType::For => write!(f, "for"),
            TokenType::If => write!(f, "if"),
            TokenType::Nil => write!(f, "nil"),
            TokenType::Or => write!(f, "or"),
            TokenType::Print => write!(f, "print"),
            TokenType::Return => write!(f, "return"),
            TokenType::Super => write!(f, "super"),
            TokenType::This => write!(f, "this"),
            TokenType::True => write!(f, "true"),
            TokenType::Var => write!(f, "var"),
            TokenType::While => write!(f, "while"),
            TokenType::Eof => write!(f, "end of file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub line: usize,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: impl Into<String>, line: usize) -> Self {
        Self {
            token_type,
            lexeme: lexeme.into(),
            line,
        }
    }

    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenError {
    #[error("Unexpected character.")]
    UnexpectedCharacter(char),
    #[error("Unterminated string.")]
    UnterminatedString,
}

/// Scans the whole source. Lexical errors are reported to `diagnostics` and
/// the offending text is skipped, so the returned tokens always end in a
/// single `Eof`.
pub fn tokens(source: &str, diagnostics: &mut Diagnostics) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut remaining = source;
    let mut line = 1;

    loop {
        while let Some((_, rest)) = maximal(&[whitespace, comment], remaining) {
            line += newlines(&remaining[..remaining.len() - rest.len()]);
            remaining = rest;
        }

        if remaining.is_empty() {
            tokens.push(Token::new(TokenType::Eof, "", line));
            break;
        }

        match token(remaining) {
            Ok((token_type, rest)) => {
                let lexeme = &remaining[..remaining.len() - rest.len()];
                line += newlines(lexeme);
                tokens.push(Token::new(token_type, lexeme, line));
                remaining = rest;
            }
            Err((error, rest)) => {
                line += newlines(&remaining[..remaining.len() - rest.len()]);
                diagnostics.push(Diagnostic::new(line, Location::Line, error));
                remaining = rest;
            }
        }
    }

    tracing::debug!(count = tokens.len(), "tokenized source");
    tokens
}

fn newlines(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}

/// Reads one token from the start of `source`, which must not begin with
/// whitespace or a comment. On error, returns the input left after skipping
/// the bad text.
pub fn token(source: &str) -> Result<(TokenType, &str), (TokenError, &str)> {
    if let Some(matched) = maximal(
        &[
            // Single-character tokens
            left_paren,
            right_paren,
            left_brace,
            right_brace,
            comma,
            dot,
            minus,
            plus,
            semicolon,
            slash,
            star,
            // one or two character tokens
            bang,
            bang_equal,
            equal,
            equal_equal,
            greater,
            greater_equal,
            less,
            less_equal,
            // identifiers and keywords
            identifier,
            // literals
            string,
            number,
        ],
        source,
    ) {
        return Ok(matched);
    }

    match source.chars().next() {
        Some('"') => Err((TokenError::UnterminatedString, "")),
        Some(c) => Err((
            TokenError::UnexpectedCharacter(c),
            &source[c.len_utf8()..],
        )),
        None => Ok((TokenType::Eof, source)),
    }
}

fn maximal<'a, T: std::fmt::Debug>(
    parsers: &[fn(&str) -> Option<(T, &str)>],
    source: &'a str,
) -> Option<(T, &'a str)> {
    let mut min_left = source.len() + 1;
    let mut max_match = None;

    let matching_parsers = parsers.iter().filter_map(|parser| parser(source));
    for (m, rest) in matching_parsers {
        let left = rest.len();
        if left < min_left {
            min_left = left;
            max_match = Some((m, rest));
        }
    }

    max_match
}

fn whitespace(source: &str) -> Option<((), &str)> {
    let len = source
        .chars()
        .take_while(|c| matches!(c, ' ' | '\r' | '\t' | '\n'))
        .count();
    if len > 0 {
        Some(((), &source[len..]))
    } else {
        None
    }
}

fn comment(source: &str) -> Option<((), &str)> {
    if source.starts_with("//") {
        let len = source
            .chars()
            .take_while(|c| *c != '\n')
            .map(char::len_utf8)
            .sum();
        Some(((), &source[len..]))
    } else {
        None
    }
}

macro_rules! match_literal {
    ($name:ident, $word:literal, $token:expr) => {
        fn $name(source: &str) -> Option<(TokenType, &str)> {
            if source.starts_with($word) {
                Some(($token, &source[$word.len()..]))
            } else {
                None
            }
        }
    };
}

match_literal! { left_paren, "(", TokenType::LeftParen }
match_literal! { right_paren, ")", TokenType::RightParen }
match_literal! { left_brace, "{", TokenType::LeftBrace }
match_literal! { right_brace, "}", TokenType::RightBrace }
match_literal! { comma, ",", TokenType::Comma }
match_literal! { dot, ".", TokenType::Dot }
match_literal! { minus, "-", TokenType::Minus }
match_literal! { plus, "+", TokenType::Plus }
match_literal! { semicolon, ";", TokenType::Semicolon }
match_literal! { slash, "/", TokenType::Slash }
match_literal! { star, "*", TokenType::Star }
match_literal! { bang, "!", TokenType::Bang }
match_literal! { equal, "=", TokenType::Equal }
match_literal! { greater, ">", TokenType::Greater }
match_literal! { less, "<", TokenType::Less }
match_literal! { bang_equal, "!=", TokenType::BangEqual }
match_literal! { equal_equal, "==", TokenType::EqualEqual }
match_literal! { greater_equal, ">=", TokenType::GreaterEqual }
match_literal! { less_equal, "<=", TokenType::LessEqual }

fn keyword(word: &str) -> Option<TokenType> {
    let token_type = match word {
        "and" => TokenType::And,
        "class" => TokenType::Class,
        "else" => TokenType::Else,
        "false" => TokenType::False,
        "for" => TokenType::For,
        "fun" => TokenType::Fun,
        "if" => TokenType::If,
        "nil" => TokenType::Nil,
        "or" => TokenType::Or,
        "print" => TokenType::Print,
        "return" => TokenType::Return,
        "super" => TokenType::Super,
        "this" => TokenType::This,
        "true" => TokenType::True,
        "var" => TokenType::Var,
        "while" => TokenType::While,
        _ => return None,
    };
    Some(token_type)
}

fn identifier(source: &str) -> Option<(TokenType, &str)> {
    let mut chars = source.chars();

    let first = chars.next()?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return None;
    }

    let len = first.len_utf8()
        + chars
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .map(char::len_utf8)
            .sum::<usize>();

    let word = &source[..len];
    Some((
        keyword(word).unwrap_or(TokenType::Identifier),
        &source[len..],
    ))
}

fn string(source: &str) -> Option<(TokenType, &str)> {
    let body = source.strip_prefix('"')?;
    let end = body.find('"')?;
    Some((
        TokenType::String(body[..end].to_string()),
        &body[end + 1..],
    ))
}

fn number(source: &str) -> Option<(TokenType, &str)> {
    let digits = |s: &str| s.bytes().take_while(u8::is_ascii_digit).count();

    let mut len = digits(source);
    if len == 0 {
        return None;
    }

    if let Some(fraction) = source[len..].strip_prefix('.') {
        let fraction_len = digits(fraction);
        if fraction_len > 0 {
            len += 1 + fraction_len;
        }
    }

    let value = source[..len].parse().ok()?;
    Some((TokenType::Number(value), &source[len..]))
}

#[cfg(test)]
mod test {
    use super::*;

    fn token_types(source: &str) -> Vec<TokenType> {
        let mut diagnostics = Diagnostics::default();
        let tokens = tokens(source, &mut diagnostics);
        assert!(!diagnostics.has_errors(), "{diagnostics}");
        tokens.into_iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn test_tokens() {
        let source = "var x = 1;";
        let expected = vec![
            TokenType::Var,
            TokenType::Identifier,
            TokenType::Equal,
            TokenType::Number(1.0),
            TokenType::Semicolon,
            TokenType::Eof,
        ];
        assert_eq!(token_types(source), expected);
    }

    #[test]
    fn test_tokens_with_comments() {
        let source = "var x = 1; // comment";
        let expected = vec![
            TokenType::Var,
            TokenType::Identifier,
            TokenType::Equal,
            TokenType::Number(1.0),
            TokenType::Semicolon,
            TokenType::Eof,
        ];
        assert_eq!(token_types(source), expected);
    }

    #[test]
    fn test_tokens_with_string() {
        let source = "var x = \"hello\";";
        let expected = vec![
            TokenType::Var,
            TokenType::Identifier,
            TokenType::Equal,
            TokenType::String("hello".to_string()),
            TokenType::Semicolon,
            TokenType::Eof,
        ];
        assert_eq!(token_types(source), expected);
    }

    #[test]
    fn test_keywords_only_match_whole_words() {
        let source = "or orchid _and classy class";
        let expected = vec![
            TokenType::Or,
            TokenType::Identifier,
            TokenType::Identifier,
            TokenType::Identifier,
            TokenType::Class,
            TokenType::Eof,
        ];
        assert_eq!(token_types(source), expected);
    }

    #[test]
    fn test_double_equal() {
        let source = "a==b != c<=d>=e";
        let expected = vec![
            TokenType::Identifier,
            TokenType::EqualEqual,
            TokenType::Identifier,
            TokenType::BangEqual,
            TokenType::Identifier,
            TokenType::LessEqual,
            TokenType::Identifier,
            TokenType::GreaterEqual,
            TokenType::Identifier,
            TokenType::Eof,
        ];
        assert_eq!(token_types(source), expected);
    }

    #[test]
    fn test_number_forms() {
        let expected = vec![
            TokenType::Number(12.5),
            TokenType::Number(3.0),
            TokenType::Dot,
            TokenType::Dot,
            TokenType::Number(5.0),
            TokenType::Eof,
        ];
        assert_eq!(token_types("12.5 3. .5"), expected);
    }

    #[test]
    fn test_lexemes_and_lines() {
        let mut diagnostics = Diagnostics::default();
        let tokens = tokens("var a;\n// note\n\"two\nlines\" b", &mut diagnostics);
        let summary: Vec<_> = tokens
            .iter()
            .map(|t| (t.lexeme.as_str(), t.line))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("var", 1),
                ("a", 1),
                (";", 1),
                ("\"two\nlines\"", 4),
                ("b", 4),
                ("", 4),
            ]
        );
    }

    #[test]
    fn test_reports_every_unexpected_character() {
        let mut diagnostics = Diagnostics::default();
        let tokens = tokens("a @ b\n# c", &mut diagnostics);
        assert_eq!(
            diagnostics.messages(),
            vec![
                "[line 1] Error: Unexpected character.",
                "[line 2] Error: Unexpected character.",
            ]
        );
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_unterminated_string() {
        let mut diagnostics = Diagnostics::default();
        let tokens = tokens("print \"oops\nstill", &mut diagnostics);
        assert_eq!(
            diagnostics.messages(),
            vec!["[line 2] Error: Unterminated string."]
        );
        let types: Vec<_> = tokens.into_iter().map(|t| t.token_type).collect();
        assert_eq!(types, vec![TokenType::Print, TokenType::Eof]);
    }

    #[test]
    fn test_unicode_whitespace_is_unexpected() {
        let mut diagnostics = Diagnostics::default();
        let tokens = tokens("print\u{a0}1;\u{2003}\u{c}", &mut diagnostics);
        assert_eq!(
            diagnostics.messages(),
            vec![
                "[line 1] Error: Unexpected character.",
                "[line 1] Error: Unexpected character.",
                "[line 1] Error: Unexpected character.",
            ]
        );
        let types: Vec<_> = tokens.into_iter().map(|t| t.token_type).collect();
        assert_eq!(
            types,
            vec![
                TokenType::Print,
                TokenType::Number(1.0),
                TokenType::Semicolon,
                TokenType::Eof
            ]
        );
    }
}
