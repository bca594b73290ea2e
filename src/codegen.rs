use std::collections::HashMap;
use std::mem;

use super::ast::{self, Expr, Prototype, ANON_FN};
use super::error::{Error, ErrorKind, Result};
use super::ir::{self, BinOp, BlockId, Inst, Reg, SlotId, Terminator};
use super::passes;
use super::session::Session;

/// Lowers AST nodes into one compilation unit. A `Codegen` is the open
/// unit: build into it, then `finish()` commits the [`ir::Unit`]; dropping
/// it instead discards everything, which is how the driver abandons a form
/// that failed mid-lowering.
pub struct Codegen<'a> {
    session: &'a mut Session,
    unit: ir::Unit,

    // Builder state for the function currently being lowered.
    blocks: Vec<ir::Block>,
    cur_block: usize,
    reg_count: u32,
    slots: Vec<String>,
    named_slots: HashMap<String, SlotId>,
}

impl<'a> Codegen<'a> {
    pub fn new(session: &'a mut Session) -> Codegen<'a> {
        Codegen {
            session,
            unit: ir::Unit::default(),
            blocks: Vec::new(),
            cur_block: 0,
            reg_count: 0,
            slots: Vec::new(),
            named_slots: HashMap::new(),
        }
    }

    /// Commit the unit built so far.
    pub fn finish(self) -> ir::Unit {
        self.unit
    }

    fn err<T>(msg: impl Into<String>) -> Result<T> {
        Err(ErrorKind::Codegen(msg.into()).into())
    }

    // ---- builder primitives -------------------------------------------------

    fn new_reg(&mut self) -> Reg {
        let r = Reg(self.reg_count);
        self.reg_count += 1;
        r
    }

    /// A fresh mutable slot for a named binding.
    fn new_slot(&mut self, name: &str) -> SlotId {
        let s = SlotId(self.slots.len() as u32);
        self.slots.push(name.to_owned());
        s
    }

    fn new_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks
            .push(ir::Block::new(format!("{}{}", label, self.blocks.len())));
        id
    }

    fn position_at(&mut self, block: BlockId) {
        self.cur_block = block.index();
    }

    fn cur_block_id(&self) -> BlockId {
        BlockId(self.cur_block as u32)
    }

    fn emit(&mut self, inst: Inst) {
        self.blocks[self.cur_block].insts.push(inst);
    }

    fn terminate(&mut self, term: Terminator) {
        debug_assert!(self.blocks[self.cur_block].term.is_none());
        self.blocks[self.cur_block].term = Some(term);
    }

    fn emit_const(&mut self, value: f64) -> Reg {
        let dst = self.new_reg();
        self.emit(Inst::Const { dst, value });
        dst
    }

    fn emit_load(&mut self, slot: SlotId) -> Reg {
        let dst = self.new_reg();
        self.emit(Inst::Load { dst, slot });
        dst
    }

    fn emit_store(&mut self, slot: SlotId, src: Reg) {
        self.emit(Inst::Store { slot, src });
    }

    fn emit_binop(&mut self, op: BinOp, lhs: Reg, rhs: Reg) -> Reg {
        let dst = self.new_reg();
        self.emit(Inst::BinOp { dst, op, lhs, rhs });
        dst
    }

    fn emit_call(&mut self, callee: String, args: Vec<Reg>) -> Reg {
        let dst = self.new_reg();
        self.emit(Inst::Call { dst, callee, args });
        dst
    }

    fn emit_phi(&mut self, incomings: [(BlockId, Reg); 2]) -> Reg {
        let dst = self.new_reg();
        self.emit(Inst::Phi { dst, incomings });
        dst
    }

    // ---- function resolution ------------------------------------------------

    /// Emit a declaration for a prototype unless the unit already carries
    /// the function.
    pub fn codegen_prototype(&mut self, proto: &Prototype) {
        if self.unit.get(&proto.name).is_none() {
            self.unit
                .functions
                .push(ir::Function::declaration(&proto.name, &proto.args));
        }
    }

    /// Resolve a callee's arity: current unit first, then the prototype
    /// cache, declaring the cached signature into the unit on demand.
    fn get_function(&mut self, name: &str) -> Option<usize> {
        if let Some(f) = self.unit.get(name) {
            return Some(f.params.len());
        }
        let proto = self.session.prototype(name)?.clone();
        self.codegen_prototype(&proto);
        Some(proto.args.len())
    }

    // ---- expression lowering ------------------------------------------------

    pub fn codegen_expr(&mut self, expr: &Expr) -> Result<Reg> {
        match expr {
            Expr::Number(n) => Ok(self.emit_const(*n)),
            Expr::Variable(name) => {
                let slot = match self.named_slots.get(name) {
                    Some(slot) => *slot,
                    None => return Self::err(format!("unknown variable name: {}", name)),
                };
                Ok(self.emit_load(slot))
            }
            Expr::Unary(op, operand) => {
                let operand = self.codegen_expr(operand)?;
                let callee = format!("unary{}", op);
                if self.get_function(&callee).is_none() {
                    return Self::err(format!("unknown unary operator '{}'", op));
                }
                Ok(self.emit_call(callee, vec![operand]))
            }
            Expr::Binary(op, lhs, rhs) => self.codegen_binary(*op, lhs, rhs),
            Expr::Call(callee, args) => {
                let arity = match self.get_function(callee) {
                    Some(arity) => arity,
                    None => return Self::err(format!("unknown function referenced: {}", callee)),
                };
                if arity != args.len() {
                    return Self::err(format!(
                        "incorrect number of arguments passed to {}: expected {}, got {}",
                        callee,
                        arity,
                        args.len()
                    ));
                }
                let mut arg_regs = Vec::with_capacity(args.len());
                for arg in args {
                    arg_regs.push(self.codegen_expr(arg)?);
                }
                Ok(self.emit_call(callee.clone(), arg_regs))
            }
            Expr::If(cond, then, els) => self.codegen_if(cond, then, els),
            Expr::For(name, start, end, step, body) => {
                self.codegen_for(name, start, end, step.as_deref(), body)
            }
            Expr::Var(bindings, body) => self.codegen_var(bindings, body),
        }
    }

    fn codegen_binary(&mut self, op: char, lhs: &Expr, rhs: &Expr) -> Result<Reg> {
        // Assignment is not an arithmetic operation: the left-hand side
        // names a slot, it is not evaluated.
        if op == '=' {
            let name = match lhs {
                Expr::Variable(name) => name,
                _ => return Self::err("destination of '=' must be a variable"),
            };
            let value = self.codegen_expr(rhs)?;
            let slot = match self.named_slots.get(name) {
                Some(slot) => *slot,
                None => return Self::err(format!("unknown variable name: {}", name)),
            };
            self.emit_store(slot, value);
            return Ok(value);
        }

        let lhs = self.codegen_expr(lhs)?;
        let rhs = self.codegen_expr(rhs)?;
        match op {
            '+' => Ok(self.emit_binop(BinOp::Add, lhs, rhs)),
            '-' => Ok(self.emit_binop(BinOp::Sub, lhs, rhs)),
            '*' => Ok(self.emit_binop(BinOp::Mul, lhs, rhs)),
            '<' => Ok(self.emit_binop(BinOp::CmpLt, lhs, rhs)),
            _ => {
                let callee = format!("binary{}", op);
                if self.get_function(&callee).is_none() {
                    return Self::err(format!("unknown binary operator '{}'", op));
                }
                Ok(self.emit_call(callee, vec![lhs, rhs]))
            }
        }
    }

    fn codegen_if(&mut self, cond: &Expr, then: &Expr, els: &Expr) -> Result<Reg> {
        let cond = self.codegen_expr(cond)?;
        let zero = self.emit_const(0.0);
        let cond = self.emit_binop(BinOp::CmpNe, cond, zero);

        let then_block = self.new_block("then");
        let else_block = self.new_block("else");
        let merge_block = self.new_block("ifcont");
        self.terminate(Terminator::CondBr {
            cond,
            then_dest: then_block,
            else_dest: else_block,
        });

        self.position_at(then_block);
        let then_value = self.codegen_expr(then)?;
        self.terminate(Terminator::Br(merge_block));
        // Lowering the branch body may have moved the insertion point (a
        // nested if/for ends in its own block); the phi needs the block
        // execution actually arrives from.
        let then_exit = self.cur_block_id();

        self.position_at(else_block);
        let else_value = self.codegen_expr(els)?;
        self.terminate(Terminator::Br(merge_block));
        let else_exit = self.cur_block_id();

        self.position_at(merge_block);
        Ok(self.emit_phi([(then_exit, then_value), (else_exit, else_value)]))
    }

    fn codegen_for(
        &mut self,
        name: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &Expr,
    ) -> Result<Reg> {
        let start = self.codegen_expr(start)?;
        let slot = self.new_slot(name);
        self.emit_store(slot, start);

        // The loop variable shadows any outer binding of the same name for
        // the duration of the loop.
        let shadowed = self.named_slots.insert(name.to_owned(), slot);

        let loop_block = self.new_block("loop");
        self.terminate(Terminator::Br(loop_block));
        self.position_at(loop_block);

        // The body's value is computed and dropped.
        self.codegen_expr(body)?;

        let step = match step {
            Some(step) => self.codegen_expr(step)?,
            None => self.emit_const(1.0),
        };
        let cur = self.emit_load(slot);
        let next = self.emit_binop(BinOp::Add, cur, step);
        self.emit_store(slot, next);

        let end = self.codegen_expr(end)?;
        let zero = self.emit_const(0.0);
        let cond = self.emit_binop(BinOp::CmpNe, end, zero);

        let after_block = self.new_block("afterloop");
        self.terminate(Terminator::CondBr {
            cond,
            then_dest: loop_block,
            else_dest: after_block,
        });
        self.position_at(after_block);

        match shadowed {
            Some(old) => self.named_slots.insert(name.to_owned(), old),
            None => self.named_slots.remove(name),
        };

        // A for expression always yields 0.0.
        Ok(self.emit_const(0.0))
    }

    fn codegen_var(&mut self, bindings: &[(String, Option<Expr>)], body: &Expr) -> Result<Reg> {
        let mut shadowed = Vec::with_capacity(bindings.len());

        // Bindings take effect in order: a later initializer sees the
        // earlier names of the same var expression.
        for (name, init) in bindings {
            let value = match init {
                Some(init) => self.codegen_expr(init)?,
                None => self.emit_const(0.0),
            };
            let slot = self.new_slot(name);
            self.emit_store(slot, value);
            shadowed.push((name, self.named_slots.insert(name.clone(), slot)));
        }

        let body_value = self.codegen_expr(body)?;

        for (name, old) in shadowed.into_iter().rev() {
            match old {
                Some(old) => self.named_slots.insert(name.clone(), old),
                None => self.named_slots.remove(name),
            };
        }

        Ok(body_value)
    }

    // ---- function lowering --------------------------------------------------

    fn begin_function(&mut self, params: &[String]) {
        self.blocks = vec![ir::Block::new("entry")];
        self.cur_block = 0;
        self.reg_count = 0;
        self.slots = Vec::new();
        self.named_slots.clear();

        // Arguments arrive in the first registers and are spilled into
        // slots immediately so parameters are assignable like any binding.
        for name in params {
            let arg = self.new_reg();
            let slot = self.new_slot(name);
            self.emit_store(slot, arg);
            self.named_slots.insert(name.clone(), slot);
        }
    }

    fn clear_builder(&mut self) {
        self.blocks = Vec::new();
        self.cur_block = 0;
        self.reg_count = 0;
        self.slots = Vec::new();
        self.named_slots.clear();
    }

    /// Erase every trace of a function that failed mid-lowering: the
    /// partially built body, and its declaration unless one already
    /// existed before this definition.
    fn discard_function(&mut self, name: &str, predeclared: bool, e: Error) -> Error {
        if !predeclared {
            self.unit.remove(name);
        }
        self.clear_builder();
        e
    }

    pub fn codegen_function(&mut self, func: &ast::Function) -> Result<()> {
        let proto = &func.proto;

        let predeclared = self.unit.get(&proto.name).is_some();
        if !predeclared {
            self.codegen_prototype(proto);
        }

        if proto.is_binary_op() {
            self.session
                .set_precedence(proto.operator_name(), proto.precedence);
        }

        self.begin_function(&proto.args);
        let ret = match self.codegen_expr(&func.body) {
            Ok(reg) => reg,
            Err(e) => return Err(self.discard_function(&proto.name, predeclared, e)),
        };
        self.terminate(Terminator::Ret(ret));

        let mut lowered = ir::Function {
            name: proto.name.clone(),
            params: proto.args.clone(),
            slots: mem::take(&mut self.slots),
            blocks: mem::take(&mut self.blocks),
            reg_count: self.reg_count,
        };
        if let Err(msg) = lowered.verify() {
            let e = ErrorKind::Codegen(msg).into();
            return Err(self.discard_function(&proto.name, predeclared, e));
        }
        passes::optimize(&mut lowered);

        self.unit.define(lowered);
        if proto.name != ANON_FN {
            self.session.remember_prototype(proto.clone());
        }
        Ok(())
    }
}
