use super::*;

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

static KEYWORDS: Lazy<BTreeMap<&'static str, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ("circuit", TokenKind::KwCircuit),
        ("inputs", TokenKind::KwInputs),
        ("outputs", TokenKind::KwOutputs),
        ("gates", TokenKind::KwGates),
        ("connections", TokenKind::KwConnections),
        ("lookup_tables", TokenKind::KwLookupTables),
        ("import", TokenKind::KwImport),
    ])
});

/// Turns `.circuit` source text into a positioned token stream ending in
/// [`TokenKind::Eof`]. Stops at the first invalid character or unterminated
/// string with a [`Fault::Lexical`].
pub fn tokenize(text: &str) -> Result<Vec<Token>, Fault> {
    Lexer::new(text).tokenize()
}

struct Lexer {
    chars: Vec<char>,
    idx: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    fn new(text: &str) -> Lexer {
        Lexer {
            chars: text.chars().collect(),
            idx: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.idx + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn tokenize(mut self) -> Result<Vec<Token>, Fault> {
        let mut tokens = vec![];
        loop {
            let pos = self.pos();
            let c = match self.peek() {
                Some(c) => c,
                None => {
                    tokens.push(Token::new(TokenKind::Eof, "", pos));
                    return Ok(tokens);
                }
            };

            if c.is_whitespace() {
                self.bump();
            } else if c == '/' && self.peek2() == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else if c == '"' {
                tokens.push(self.scan_string(pos)?);
            } else if c.is_ascii_digit() {
                tokens.push(self.scan_number(pos));
            } else if c.is_alphabetic() || c == '_' {
                tokens.push(self.scan_word(pos));
            } else if let Some(kind) = self.scan_symbol(pos)? {
                tokens.push(kind);
            } else {
                return Err(Fault::Lexical(pos, format!("unexpected character {c:?}")));
            }
        }
    }

    fn scan_string(&mut self, pos: Pos) -> Result<Token, Fault> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(Fault::Lexical(pos, "unterminated string".to_string())),
                Some('\n') => return Err(Fault::Lexical(pos, "unterminated string".to_string())),
                Some('"') => {
                    self.bump();
                    return Ok(Token::new(TokenKind::Str, text, pos));
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    fn scan_number(&mut self, pos: Pos) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            self.bump();
        }
        Token::new(TokenKind::Num, text, pos)
    }

    fn scan_word(&mut self, pos: Pos) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !c.is_alphanumeric() && c != '_' {
                break;
            }
            text.push(c);
            self.bump();
        }
        // Keyword recognition comes after identifier scanning: exact,
        // case-sensitive matches only.
        let kind = KEYWORDS
            .get(text.as_str())
            .copied()
            .unwrap_or(TokenKind::Ident);
        Token::new(kind, text, pos)
    }

    fn scan_symbol(&mut self, pos: Pos) -> Result<Option<Token>, Fault> {
        let c = self.peek().unwrap();
        let kind = match c {
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '=' => TokenKind::Eq,
            '.' => TokenKind::Dot,
            '-' => {
                if self.peek2() != Some('>') {
                    return Err(Fault::Lexical(pos, "unexpected character '-'".to_string()));
                }
                self.bump();
                self.bump();
                return Ok(Some(Token::new(TokenKind::Arrow, "->", pos)));
            }
            _ => return Ok(None),
        };
        self.bump();
        Ok(Some(Token::new(kind, c.to_string(), pos)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_and_positions() {
        let tokens = tokenize("circuit Foo {\n    inputs { a }\n}").unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::KwCircuit,
                TokenKind::Ident,
                TokenKind::LBrace,
                TokenKind::KwInputs,
                TokenKind::LBrace,
                TokenKind::Ident,
                TokenKind::RBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[0].pos, Pos::new(1, 1));
        assert_eq!(tokens[1].text, "Foo");
        assert_eq!(tokens[1].pos, Pos::new(1, 9));
        assert_eq!(tokens[3].pos, Pos::new(2, 5));
        assert_eq!(tokens[5].text, "a");
        assert_eq!(tokens[5].pos, Pos::new(2, 14));
    }

    #[test]
    fn keywords_are_exact() {
        let tokens = tokenize("circuit circuits Circuit lookup_tables").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::KwCircuit);
        assert_eq!(tokens[1].kind, TokenKind::Ident);
        assert_eq!(tokens[2].kind, TokenKind::Ident);
        assert_eq!(tokens[3].kind, TokenKind::KwLookupTables);
    }

    #[test]
    fn symbols_and_comments() {
        let tokens = tokenize("a -> b.in[0] // wired\n, = .").unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::Ident,
                TokenKind::Dot,
                TokenKind::Ident, // `in` is not a keyword
                TokenKind::LBracket,
                TokenKind::Num,
                TokenKind::RBracket,
                TokenKind::Comma,
                TokenKind::Eq,
                TokenKind::Dot,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strings() {
        let tokens = tokenize("import \"half_adder\"").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::KwImport);
        assert_eq!(tokens[1].kind, TokenKind::Str);
        assert_eq!(tokens[1].text, "half_adder");
    }

    #[test]
    fn lexical_faults() {
        match tokenize("a % b") {
            Err(Fault::Lexical(pos, message)) => {
                assert_eq!(pos, Pos::new(1, 3));
                assert!(message.contains('%'));
            }
            other => panic!("expected a lexical fault, got {other:?}"),
        }

        match tokenize("circuit \"oops\nmore") {
            Err(Fault::Lexical(pos, message)) => {
                assert_eq!(pos, Pos::new(1, 9));
                assert_eq!(message, "unterminated string");
            }
            other => panic!("expected a lexical fault, got {other:?}"),
        }
    }
}
