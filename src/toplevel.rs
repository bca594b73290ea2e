use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use super::ast::ANON_FN;
use super::backend::{ExecutionBackend, Interp};
use super::codegen::Codegen;
use super::error::Result;
use super::lexer;
use super::parser::Parser;
use super::runtime;
use super::session::Session;
use super::token::Token;

/// What one successfully handled top-level form produced. `ir` carries the
/// lowered text of the unit for callers that want to show it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Defined { name: String, ir: String },
    Declared { name: String, ir: String },
    Evaluated { value: f64, ir: String },
}

/// Drives the incremental compile-execute-discard loop: one compilation
/// unit per top-level form, immediately executed and unloaded for bare
/// expressions, kept resident for definitions. The session (operator table
/// and prototype cache) and the backend's symbol table are the only state
/// that survives across units.
pub struct Driver {
    session: Session,
    backend: Box<dyn ExecutionBackend>,
    /// Echo the lowered representation of each compiled form.
    pub dump_ir: bool,
}

impl Driver {
    pub fn new() -> Driver {
        let mut backend = Interp::new();
        runtime::install(&mut backend);
        Driver::with_backend(Box::new(backend))
    }

    /// Build a driver around a caller-supplied backend; tests use this to
    /// observe execution without touching the process's stdout.
    pub fn with_backend(backend: Box<dyn ExecutionBackend>) -> Driver {
        let mut session = Session::new();
        for proto in runtime::prototypes() {
            session.remember_prototype(proto);
        }
        Driver {
            session,
            backend,
            dump_ir: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Compile and (for bare expressions) run every top-level form in
    /// `src`. One result per form; on error the offending token is
    /// discarded and the loop resumes with the next form.
    pub fn run_source(&mut self, src: &str) -> Vec<Result<Outcome>> {
        let tokens = match lexer::lex_all(src) {
            Ok(tokens) => tokens,
            Err(e) => return vec![Err(e)],
        };
        let mut parser = Parser::new(tokens);
        let mut results = Vec::new();

        while !parser.at_eof() {
            let result = match parser.cur() {
                Token::Kwd(';') => {
                    parser.eat();
                    continue;
                }
                Token::Def => self.handle_definition(&mut parser),
                Token::Extern => self.handle_extern(&mut parser),
                _ => self.handle_top_level_expression(&mut parser),
            };
            if result.is_err() {
                // Resynchronise: skip one token and try again.
                parser.eat();
            }
            results.push(result);
        }
        results
    }

    fn handle_definition(&mut self, parser: &mut Parser) -> Result<Outcome> {
        let func = parser.parse_definition(&mut self.session)?;
        debug!(name = %func.proto.name, "parsed a function definition");

        let mut cg = Codegen::new(&mut self.session);
        cg.codegen_function(&func)?;
        let unit = cg.finish();
        let ir = unit.to_string();
        self.backend.add_unit(unit)?;

        Ok(Outcome::Defined {
            name: func.proto.name,
            ir,
        })
    }

    fn handle_extern(&mut self, parser: &mut Parser) -> Result<Outcome> {
        let proto = parser.parse_extern(&mut self.session)?;
        debug!(name = %proto.name, "parsed an extern");

        let mut cg = Codegen::new(&mut self.session);
        cg.codegen_prototype(&proto);
        let ir = cg.finish().to_string();
        self.session.remember_prototype(proto.clone());

        Ok(Outcome::Declared {
            name: proto.name,
            ir,
        })
    }

    fn handle_top_level_expression(&mut self, parser: &mut Parser) -> Result<Outcome> {
        let func = parser.parse_toplevel_expr(&self.session)?;
        debug!("parsed a top-level expression");

        let mut cg = Codegen::new(&mut self.session);
        cg.codegen_function(&func)?;
        let unit = cg.finish();
        let ir = unit.to_string();

        // Add the unit, call its anonymous entry point, then unload it so
        // neither the storage nor the entry name leaks into later units.
        let handle = self.backend.add_unit(unit)?;
        let result = self.backend.call(ANON_FN, &[]);
        self.backend.remove_unit(handle);
        let value = result?;

        Ok(Outcome::Evaluated { value, ir })
    }

    fn report(&self, result: &Result<Outcome>) {
        match result {
            Ok(outcome) => {
                if self.dump_ir {
                    let ir = match outcome {
                        Outcome::Defined { ir, .. }
                        | Outcome::Declared { ir, .. }
                        | Outcome::Evaluated { ir, .. } => ir,
                    };
                    print!("{}", ir);
                }
                if let Outcome::Evaluated { value, .. } = outcome {
                    println!("Evaluated to {}", value);
                }
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }

    /// Interactive loop; reads a line, handles every form on it, prints
    /// results. Language errors never abort the loop.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        let mut editor = DefaultEditor::new()?;
        loop {
            match editor.readline("ready> ") {
                Ok(line) => {
                    editor.add_history_entry(line.as_str())?;
                    for result in self.run_source(&line) {
                        self.report(&result);
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Run a whole script, reporting as the REPL would. Returns false when
    /// any form failed.
    pub fn run_script(&mut self, src: &str) -> bool {
        let mut ok = true;
        for result in self.run_source(src) {
            self.report(&result);
            ok &= result.is_ok();
        }
        ok
    }
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new()
    }
}
