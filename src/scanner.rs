use std::borrow::Cow;
use std::iter::FusedIterator;

/// Scanner takes source text and spits out tokens, one per call.
///
/// Rather than carrying the classic start/current pointer pair, the consumed
/// prefix is dropped from `input` after every token; `pending` counts the
/// bytes of the token currently being scanned. That is:
/// - `pending` is the classic `current - start`
/// - `self.rest()` is the classic `current`
/// - `self.commit()` is the classic `start = current`
#[derive(Debug)]
pub struct Scanner<'a> {
    input: &'a str,
    pending: usize,
    line: usize,
    ended: bool,
}

/// The kind of a [`Token`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Single-character tokens.
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
    // One or two character tokens.
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    // Literals.
    Identifier,
    String,
    Number,
    // Keywords.
    And,
    Class,
    Else,
    False,
    For,
    Fun,
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

    Error,
    Eof,
}

/// A single token. `raw` borrows the slice of source that produced it,
/// except for `Error` tokens, which carry their message instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// What kind of token this is.
    pub typ: TokenType,
    /// The lexeme, or the message for `Error` tokens.
    pub raw: Cow<'a, str>,
    /// 1-based source line. A string literal spanning lines records the
    /// line it ends on.
    pub line: usize,
}

impl<'a> Scanner<'a> {
    /// Returns a fresh scanner, ready to produce tokens from `source`.
    pub fn new(source: &'a str) -> Scanner<'a> {
        Scanner {
            input: source,
            pending: 0,
            line: 1,
            ended: false,
        }
    }

    /// Returns the next token, advancing the scanner. Scan errors are
    /// represented in-band as `TokenType::Error`. The scanner yields one
    /// `Eof` token, then `None` forever after.
    pub fn next_token(&mut self) -> Option<Token<'a>> {
        self.skip_blanks();
        let c = match self.advance() {
            Some(c) => c,
            None if self.ended => return None,
            None => {
                self.ended = true;
                return Some(Token {
                    typ: TokenType::Eof,
                    raw: Cow::Borrowed(""),
                    line: self.line,
                });
            }
        };
        let token = match c {
            '(' => self.token(TokenType::LeftParen),
            ')' => self.token(TokenType::RightParen),
            '{' => self.token(TokenType::LeftBrace),
            '}' => self.token(TokenType::RightBrace),
            ';' => self.token(TokenType::Semicolon),
            ',' => self.token(TokenType::Comma),
            '.' => self.token(TokenType::Dot),
            '-' => self.token(TokenType::Minus),
            '+' => self.token(TokenType::Plus),
            '/' => self.token(TokenType::Slash),
            '*' => self.token(TokenType::Star),
            '!' => {
                let typ = if self.advance_if('=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                };
                self.token(typ)
            }
            '=' => {
                let typ = if self.advance_if('=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                };
                self.token(typ)
            }
            '<' => {
                let typ = if self.advance_if('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.token(typ)
            }
            '>' => {
                let typ = if self.advance_if('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.token(typ)
            }
            '"' => self.string_literal(),
            '0'..='9' => self.number_literal(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(),
            _ => self.error_token("Unexpected character."),
        };
        self.commit();
        Some(token)
    }

    // The unconsumed remainder of the input.
    fn rest(&self) -> &'a str {
        &self.input[self.pending.min(self.input.len())..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pending += c.len_utf8();
        Some(c)
    }

    fn advance_if(&mut self, wanted: char) -> bool {
        match self.peek() {
            Some(c) if c == wanted => {
                self.pending += c.len_utf8();
                true
            }
            _ => false,
        }
    }

    // Mark the scanned bytes as done by dropping them from the input.
    fn commit(&mut self) {
        self.input = self.rest();
        self.pending = 0;
    }

    // Consume whitespace and line comments before a token. Only space,
    // carriage return, and tab count as blank; a newline also bumps `line`.
    fn skip_blanks(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\r' | '\t') => {
                    self.advance();
                }
                Some('\n') => {
                    self.line += 1;
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    // Leave the newline for the outer loop to count.
                    while !matches!(self.peek(), Some('\n') | None) {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
        self.commit();
    }

    // A token of the given type over the pending bytes. Does not commit;
    // the caller does that once per token.
    fn token(&self, typ: TokenType) -> Token<'a> {
        Token {
            typ,
            raw: Cow::Borrowed(&self.input[..self.pending]),
            line: self.line,
        }
    }

    fn error_token(&self, message: &'static str) -> Token<'a> {
        Token {
            typ: TokenType::Error,
            raw: Cow::Borrowed(message),
            line: self.line,
        }
    }

    // The opening quote has been consumed. Lox strings have no escape
    // sequences, so this runs to the closing quote or the end of input.
    // The raw lexeme keeps both quotes.
    fn string_literal(&mut self) -> Token<'a> {
        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    return self.token(TokenType::String);
                }
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    self.advance();
                }
                None => return self.error_token("Unterminated string."),
            }
        }
    }

    // `1.` is not a literal: the dot only joins the token when a digit
    // follows, so `1.x` scans as number, dot, identifier.
    fn number_literal(&mut self) -> Token<'a> {
        while matches!(self.peek(), Some('0'..='9')) {
            self.advance();
        }
        if self.peek() == Some('.') && matches!(self.peek_next(), Some('0'..='9')) {
            self.advance();
            while matches!(self.peek(), Some('0'..='9')) {
                self.advance();
            }
        }
        self.token(TokenType::Number)
    }

    fn identifier_or_keyword(&mut self) -> Token<'a> {
        while self
            .peek()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        self.token(keyword_or_identifier(&self.input[..self.pending]))
    }
}

// Classify a lexeme as a keyword or an identifier. Dispatches on the first
// character, then requires the remainder to match whole.
fn keyword_or_identifier(text: &str) -> TokenType {
    let mut chars = text.chars();
    match chars.next() {
        Some('a') => keyword_if_equal(&text[1..], "nd", TokenType::And),
        Some('c') => keyword_if_equal(&text[1..], "lass", TokenType::Class),
        Some('e') => keyword_if_equal(&text[1..], "lse", TokenType::Else),
        Some('i') => keyword_if_equal(&text[1..], "f", TokenType::If),
        Some('n') => keyword_if_equal(&text[1..], "il", TokenType::Nil),
        Some('o') => keyword_if_equal(&text[1..], "r", TokenType::Or),
        Some('p') => keyword_if_equal(&text[1..], "rint", TokenType::Print),
        Some('r') => keyword_if_equal(&text[1..], "eturn", TokenType::Return),
        Some('s') => keyword_if_equal(&text[1..], "uper", TokenType::Super),
        Some('v') => keyword_if_equal(&text[1..], "ar", TokenType::Var),
        Some('w') => keyword_if_equal(&text[1..], "hile", TokenType::While),
        Some('f') => match chars.next() {
            Some('a') => keyword_if_equal(&text[2..], "lse", TokenType::False),
            Some('o') => keyword_if_equal(&text[2..], "r", TokenType::For),
            Some('u') => keyword_if_equal(&text[2..], "n", TokenType::Fun),
            _ => TokenType::Identifier,
        },
        Some('t') => match chars.next() {
            Some('h') => keyword_if_equal(&text[2..], "is", TokenType::This),
            Some('r') => keyword_if_equal(&text[2..], "ue", TokenType::True),
            _ => TokenType::Identifier,
        },
        _ => TokenType::Identifier,
    }
}

fn keyword_if_equal(rest: &str, keyword_rest: &str, typ: TokenType) -> TokenType {
    if rest == keyword_rest {
        typ
    } else {
        TokenType::Identifier
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

impl<'a> FusedIterator for Scanner<'a> {}

#[cfg(test)]
mod test {
    use super::*;

    fn token(typ: TokenType, raw: &str, line: usize) -> Token<'_> {
        Token {
            typ,
            raw: raw.into(),
            line,
        }
    }

    fn assert_tokens(input: &str, expected: &[Token<'_>]) {
        let tokens: Vec<Token<'_>> = Scanner::new(input).collect();
        assert_eq!(tokens.len(), expected.len(), "tokens: {:?}", tokens);
        for (i, (got, wanted)) in tokens.iter().zip(expected).enumerate() {
            assert_eq!(got, wanted, "on token number {}", i);
        }
    }

    #[test]
    fn punctuation_and_lines() {
        let input = r#"
( // comment
) ( { != == = = ! = /
123.1= /123
"#;
        assert_tokens(
            input,
            &[
                token(TokenType::LeftParen, "(", 2),
                token(TokenType::RightParen, ")", 3),
                token(TokenType::LeftParen, "(", 3),
                token(TokenType::LeftBrace, "{", 3),
                token(TokenType::BangEqual, "!=", 3),
                token(TokenType::EqualEqual, "==", 3),
                token(TokenType::Equal, "=", 3),
                token(TokenType::Equal, "=", 3),
                token(TokenType::Bang, "!", 3),
                token(TokenType::Equal, "=", 3),
                token(TokenType::Slash, "/", 3),
                token(TokenType::Number, "123.1", 4),
                token(TokenType::Equal, "=", 4),
                token(TokenType::Slash, "/", 4),
                token(TokenType::Number, "123", 4),
                token(TokenType::Eof, "", 5),
            ],
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        let text = "and class else if nil or print return super var while \
                    false for fun true this f t fAlse thIS ifx _x x_1";
        assert_tokens(
            text,
            &[
                token(TokenType::And, "and", 1),
                token(TokenType::Class, "class", 1),
                token(TokenType::Else, "else", 1),
                token(TokenType::If, "if", 1),
                token(TokenType::Nil, "nil", 1),
                token(TokenType::Or, "or", 1),
                token(TokenType::Print, "print", 1),
                token(TokenType::Return, "return", 1),
                token(TokenType::Super, "super", 1),
                token(TokenType::Var, "var", 1),
                token(TokenType::While, "while", 1),
                token(TokenType::False, "false", 1),
                token(TokenType::For, "for", 1),
                token(TokenType::Fun, "fun", 1),
                token(TokenType::True, "true", 1),
                token(TokenType::This, "this", 1),
                token(TokenType::Identifier, "f", 1),
                token(TokenType::Identifier, "t", 1),
                token(TokenType::Identifier, "fAlse", 1),
                token(TokenType::Identifier, "thIS", 1),
                token(TokenType::Identifier, "ifx", 1),
                token(TokenType::Identifier, "_x", 1),
                token(TokenType::Identifier, "x_1", 1),
                token(TokenType::Eof, "", 1),
            ],
        );
    }

    #[test]
    fn string_literal_keeps_quotes_and_counts_lines() {
        assert_tokens(
            "\"two\nlines\" x",
            &[
                token(TokenType::String, "\"two\nlines\"", 2),
                token(TokenType::Identifier, "x", 2),
                token(TokenType::Eof, "", 2),
            ],
        );
    }

    #[test]
    fn unterminated_string() {
        assert_tokens(
            "\"oops",
            &[
                token(TokenType::Error, "Unterminated string.", 1),
                token(TokenType::Eof, "", 1),
            ],
        );
    }

    #[test]
    fn trailing_dot_is_its_own_token() {
        assert_tokens(
            "1. 2.5",
            &[
                token(TokenType::Number, "1", 1),
                token(TokenType::Dot, ".", 1),
                token(TokenType::Number, "2.5", 1),
                token(TokenType::Eof, "", 1),
            ],
        );
    }

    #[test]
    fn comment_at_end_of_input() {
        assert_tokens(
            "1 // no newline after this",
            &[
                token(TokenType::Number, "1", 1),
                token(TokenType::Eof, "", 1),
            ],
        );
    }

    #[test]
    fn unexpected_character() {
        assert_tokens(
            "@",
            &[
                token(TokenType::Error, "Unexpected character.", 1),
                token(TokenType::Eof, "", 1),
            ],
        );
    }
}
