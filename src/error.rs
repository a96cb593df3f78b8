use super::*;

/// The things that can go wrong while loading a `.circuit` file.
///
/// Every fault carries the position it was raised at. Parsing stops at the
/// first fault; there is no recovery. Simulation ([`Circuit::tick`]) never
/// faults.
#[derive(Debug, Clone)]
pub enum Fault {
    Lexical(Pos, String),
    Syntax(Pos, String),
    Gate(Pos, String),
    Connection(Pos, String),
    /// An import that failed, wrapping the inner cause when there is one
    /// (I/O failures have no inner fault).
    Import(Pos, String, Option<Box<Fault>>),
}

impl Fault {
    pub fn message(&self) -> &str {
        match self {
            Fault::Lexical(_pos, message) => message,
            Fault::Syntax(_pos, message) => message,
            Fault::Gate(_pos, message) => message,
            Fault::Connection(_pos, message) => message,
            Fault::Import(_pos, message, _cause) => message,
        }
    }

    /// The innermost fault of an import chain; the fault itself otherwise.
    pub fn root_cause(&self) -> &Fault {
        match self {
            Fault::Import(_pos, _message, Some(cause)) => cause.root_cause(),
            _ => self,
        }
    }
}

impl HasPos for Fault {
    fn pos(&self) -> Pos {
        match self {
            Fault::Lexical(pos, _message) => *pos,
            Fault::Syntax(pos, _message) => *pos,
            Fault::Gate(pos, _message) => *pos,
            Fault::Connection(pos, _message) => *pos,
            Fault::Import(pos, _message, _cause) => *pos,
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Fault::Lexical(pos, message) => write!(f, "lexical fault at {pos}: {message}"),
            Fault::Syntax(pos, message) => write!(f, "syntax fault at {pos}: {message}"),
            Fault::Gate(pos, message) => write!(f, "gate fault at {pos}: {message}"),
            Fault::Connection(pos, message) => write!(f, "connection fault at {pos}: {message}"),
            Fault::Import(pos, message, Some(cause)) => {
                write!(f, "import fault at {pos}: {message}: {cause}")
            }
            Fault::Import(pos, message, None) => write!(f, "import fault at {pos}: {message}"),
        }
    }
}
