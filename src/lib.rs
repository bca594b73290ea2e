//! Incremental compiler and REPL for a small expression-oriented language:
//! numeric literals, variables, user-definable unary/binary operators,
//! calls, `if/then/else`, `for` loops and `var/in` mutable bindings.
//!
//! The pipeline is strict: characters -> tokens ([`lexer`]) -> AST
//! ([`parser`]) -> lowered IR ([`codegen`]) -> execution backend
//! ([`backend`]). Each top-level form becomes one compilation unit; bare
//! expressions are executed and their unit unloaded immediately, while
//! `def`/`extern` stay resident for later calls ([`toplevel`]).

pub mod ast;
pub mod backend;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod passes;
pub mod runtime;
pub mod session;
pub mod token;
pub mod toplevel;

pub use error::{Error, ErrorKind, Result};
pub use toplevel::{Driver, Outcome};
