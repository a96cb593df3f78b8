use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Num,
    Str,
    KwCircuit,
    KwInputs,
    KwOutputs,
    KwGates,
    KwConnections,
    KwLookupTables,
    KwImport,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Arrow,
    Comma,
    Eq,
    Dot,
    Eof,
}

/// One positioned token of `.circuit` source.
/// For [`TokenKind::Str`] the text is the string contents without the quotes;
/// for everything else it is the source text verbatim.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Pos,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, pos: Pos) -> Token {
        Token {
            kind,
            text: text.into(),
            pos,
        }
    }

    /// How the token reads in a fault message.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of file".to_string(),
            TokenKind::Str => format!("\"{}\"", self.text),
            _ => format!("`{}`", self.text),
        }
    }
}

impl HasPos for Token {
    fn pos(&self) -> Pos {
        self.pos
    }
}
