use std::fmt::{self, Display};

use failure::{Backtrace, Context, Fail};

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error, wrapping an [`ErrorKind`] with failure's context
/// machinery so callers can attach messages without losing the kind.
#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Debug, PartialEq, Fail)]
pub enum ErrorKind {
    #[fail(display = "lex error: {}", _0)]
    Lex(String),
    #[fail(display = "parse error: {}", _0)]
    Parse(String),
    #[fail(display = "codegen error: {}", _0)]
    Codegen(String),
    #[fail(display = "execution error: {}", _0)]
    Exec(String),
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }

    pub fn is_parse(&self) -> bool {
        matches!(self.kind(), ErrorKind::Parse(_))
    }

    pub fn is_codegen(&self) -> bool {
        matches!(self.kind(), ErrorKind::Codegen(_))
    }

    pub fn is_exec(&self) -> bool {
        matches!(self.kind(), ErrorKind::Exec(_))
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error { inner }
    }
}
