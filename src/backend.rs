use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use super::error::{ErrorKind, Result};
use super::ir::{self, Inst, Terminator};

/// A native helper callable from language code by name.
pub type NativeFn = Box<dyn Fn(&[f64]) -> f64>;

/// Opaque handle to an added compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitHandle(u64);

/// The execution-backend boundary the driver talks to. One unit is added
/// per top-level form; the backend keeps a persistent symbol table across
/// units and removes exactly the symbols a unit contributed when the unit
/// is dropped again.
pub trait ExecutionBackend {
    fn add_unit(&mut self, unit: ir::Unit) -> Result<UnitHandle>;
    fn remove_unit(&mut self, handle: UnitHandle);
    fn lookup(&self, name: &str) -> bool;
    fn call(&mut self, name: &str, args: &[f64]) -> Result<f64>;
}

/// Reference backend: executes lowered IR directly. Slots become a frame
/// array, registers a value array; `phi` reads the predecessor block the
/// frame actually came from.
pub struct Interp {
    functions: HashMap<String, Rc<ir::Function>>,
    natives: HashMap<String, NativeFn>,
    owned: HashMap<UnitHandle, Vec<String>>,
    next_handle: u64,
}

impl Interp {
    pub fn new() -> Interp {
        Interp {
            functions: HashMap::new(),
            natives: HashMap::new(),
            owned: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Register a native function resolvable by `call`. Language-level
    /// definitions of the same name take priority over natives.
    pub fn register_native(&mut self, name: &str, f: impl Fn(&[f64]) -> f64 + 'static) {
        self.natives.insert(name.to_owned(), Box::new(f));
    }

    fn run(&mut self, func: &ir::Function, args: &[f64]) -> Result<f64> {
        let mut regs = vec![0.0f64; func.reg_count as usize];
        for (reg, value) in regs.iter_mut().zip(args.iter()) {
            *reg = *value;
        }
        let mut slots = vec![0.0f64; func.slots.len()];

        let mut block = 0usize;
        let mut pred: Option<usize> = None;
        loop {
            let cur = match func.blocks.get(block) {
                Some(cur) => cur,
                None => {
                    return Err(ErrorKind::Exec(format!(
                        "function '{}': jump out of range",
                        func.name
                    ))
                    .into());
                }
            };

            for inst in &cur.insts {
                match inst {
                    Inst::Const { dst, value } => regs[dst.index()] = *value,
                    Inst::Load { dst, slot } => regs[dst.index()] = slots[slot.index()],
                    Inst::Store { slot, src } => slots[slot.index()] = regs[src.index()],
                    Inst::BinOp { dst, op, lhs, rhs } => {
                        regs[dst.index()] = op.eval(regs[lhs.index()], regs[rhs.index()])
                    }
                    Inst::Call { dst, callee, args } => {
                        let values: Vec<f64> = args.iter().map(|a| regs[a.index()]).collect();
                        regs[dst.index()] = self.call(callee, &values)?;
                    }
                    Inst::Phi { dst, incomings } => {
                        let from = incomings
                            .iter()
                            .find(|(b, _)| Some(b.index()) == pred)
                            .map(|(_, r)| *r);
                        match from {
                            Some(r) => regs[dst.index()] = regs[r.index()],
                            None => {
                                return Err(ErrorKind::Exec(format!(
                                    "function '{}': phi has no edge from predecessor",
                                    func.name
                                ))
                                .into());
                            }
                        }
                    }
                }
            }

            match &cur.term {
                Some(Terminator::Ret(r)) => return Ok(regs[r.index()]),
                Some(Terminator::Br(target)) => {
                    pred = Some(block);
                    block = target.index();
                }
                Some(Terminator::CondBr {
                    cond,
                    then_dest,
                    else_dest,
                }) => {
                    pred = Some(block);
                    block = if regs[cond.index()] != 0.0 {
                        then_dest.index()
                    } else {
                        else_dest.index()
                    };
                }
                None => {
                    return Err(ErrorKind::Exec(format!(
                        "function '{}': block without terminator",
                        func.name
                    ))
                    .into());
                }
            }
        }
    }
}

impl Default for Interp {
    fn default() -> Interp {
        Interp::new()
    }
}

impl ExecutionBackend for Interp {
    fn add_unit(&mut self, unit: ir::Unit) -> Result<UnitHandle> {
        let handle = UnitHandle(self.next_handle);
        self.next_handle += 1;

        let mut names = Vec::new();
        for func in unit.functions {
            if func.is_decl() {
                continue;
            }
            names.push(func.name.clone());
            self.functions.insert(func.name.clone(), Rc::new(func));
        }
        self.owned.insert(handle, names);
        Ok(handle)
    }

    fn remove_unit(&mut self, handle: UnitHandle) {
        if let Some(names) = self.owned.remove(&handle) {
            for name in names {
                self.functions.remove(&name);
            }
        }
    }

    fn lookup(&self, name: &str) -> bool {
        self.functions.contains_key(name) || self.natives.contains_key(name)
    }

    fn call(&mut self, name: &str, args: &[f64]) -> Result<f64> {
        if let Some(func) = self.functions.get(name).cloned() {
            trace!(name, "executing function");
            return self.run(&func, args);
        }
        if let Some(native) = self.natives.get(name) {
            trace!(name, "calling native");
            return Ok(native(args));
        }
        Err(ErrorKind::Exec(format!("symbol not found: {}", name)).into())
    }
}

#[cfg(test)]
mod test {
    use super::super::codegen::Codegen;
    use super::super::lexer::lex_all;
    use super::super::parser::Parser;
    use super::super::session::Session;
    use super::*;
    use std::cell::RefCell;

    fn add_def(backend: &mut Interp, session: &mut Session, src: &str) -> UnitHandle {
        let mut parser = Parser::new(lex_all(src).unwrap());
        let func = parser.parse_definition(session).unwrap();
        let mut cg = Codegen::new(session);
        cg.codegen_function(&func).unwrap();
        backend.add_unit(cg.finish()).unwrap()
    }

    #[test]
    fn test_call_simple_function() {
        let mut backend = Interp::new();
        let mut session = Session::new();
        add_def(&mut backend, &mut session, "def foo(a) a+1");
        assert_eq!(backend.call("foo", &[41.0]).unwrap(), 42.0);
    }

    #[test]
    fn test_branches_take_correct_edge() {
        let mut backend = Interp::new();
        let mut session = Session::new();
        add_def(
            &mut backend,
            &mut session,
            "def pick(a b) if a then (if b then 1 else 2) else 3",
        );
        assert_eq!(backend.call("pick", &[1.0, 1.0]).unwrap(), 1.0);
        assert_eq!(backend.call("pick", &[1.0, 0.0]).unwrap(), 2.0);
        assert_eq!(backend.call("pick", &[0.0, 1.0]).unwrap(), 3.0);
    }

    #[test]
    fn test_recursion() {
        let mut backend = Interp::new();
        let mut session = Session::new();
        add_def(
            &mut backend,
            &mut session,
            "def fib(x) if x < 3 then 1 else fib(x-1)+fib(x-2)",
        );
        assert_eq!(backend.call("fib", &[10.0]).unwrap(), 55.0);
    }

    #[test]
    fn test_remove_unit_evicts_only_its_symbols() {
        let mut backend = Interp::new();
        let mut session = Session::new();
        let kept = add_def(&mut backend, &mut session, "def keep(a) a");
        let dropped = add_def(&mut backend, &mut session, "def drop(a) a");
        backend.remove_unit(dropped);
        assert!(backend.lookup("keep"));
        assert!(!backend.lookup("drop"));
        let _ = kept;
        assert!(backend.call("drop", &[1.0]).unwrap_err().is_exec());
    }

    #[test]
    fn test_native_dispatch() {
        let mut backend = Interp::new();
        let seen = std::rc::Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        backend.register_native("record", move |args| {
            sink.borrow_mut().extend_from_slice(args);
            0.0
        });
        assert_eq!(backend.call("record", &[7.0]).unwrap(), 0.0);
        assert_eq!(*seen.borrow(), vec![7.0]);
    }

    #[test]
    fn test_unknown_symbol() {
        let mut backend = Interp::new();
        assert!(backend.call("nope", &[]).unwrap_err().is_exec());
    }
}
