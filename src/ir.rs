use std::fmt;

/// A virtual register. Registers are single-assignment: every instruction
/// that produces a value writes a fresh one, and the first `n` registers of
/// a function hold its `n` arguments on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub(crate) u32);

/// A basic block within one function, by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) u32);

/// A mutable slot: addressable storage for one named binding, so that
/// parameters, `var` bindings and loop variables are assignable through
/// plain load/store instead of SSA rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) u32);

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Ordered less-than; the result is normalised to 0.0 / 1.0.
    CmpLt,
    /// Not-equal, used to reduce a value to a branch condition.
    CmpNe,
}

impl BinOp {
    pub fn eval(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinOp::Add => lhs + rhs,
            BinOp::Sub => lhs - rhs,
            BinOp::Mul => lhs * rhs,
            BinOp::CmpLt => {
                if lhs < rhs {
                    1.0
                } else {
                    0.0
                }
            }
            BinOp::CmpNe => {
                if lhs != rhs {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "fadd",
            BinOp::Sub => "fsub",
            BinOp::Mul => "fmul",
            BinOp::CmpLt => "fcmplt",
            BinOp::CmpNe => "fcmpne",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Const {
        dst: Reg,
        value: f64,
    },
    Load {
        dst: Reg,
        slot: SlotId,
    },
    Store {
        slot: SlotId,
        src: Reg,
    },
    BinOp {
        dst: Reg,
        op: BinOp,
        lhs: Reg,
        rhs: Reg,
    },
    Call {
        dst: Reg,
        callee: String,
        args: Vec<Reg>,
    },
    /// Two-way value merge at a join block; picks the register matching the
    /// predecessor the execution arrived from.
    Phi {
        dst: Reg,
        incomings: [(BlockId, Reg); 2],
    },
}

impl Inst {
    /// The register this instruction writes, if any.
    pub fn dst(&self) -> Option<Reg> {
        match *self {
            Inst::Const { dst, .. }
            | Inst::Load { dst, .. }
            | Inst::BinOp { dst, .. }
            | Inst::Call { dst, .. }
            | Inst::Phi { dst, .. } => Some(dst),
            Inst::Store { .. } => None,
        }
    }

    /// Whether removing the instruction can change observable behaviour.
    pub fn has_side_effect(&self) -> bool {
        matches!(self, Inst::Store { .. } | Inst::Call { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Ret(Reg),
    Br(BlockId),
    CondBr {
        cond: Reg,
        then_dest: BlockId,
        else_dest: BlockId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    /// `None` only while the block is being built; `verify` rejects it.
    pub term: Option<Terminator>,
}

impl Block {
    pub fn new(label: impl Into<String>) -> Block {
        Block {
            label: label.into(),
            insts: Vec::new(),
            term: None,
        }
    }
}

/// One lowered function. A declaration (from `extern` or the prototype
/// cache) has no blocks; a definition owns its control-flow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub slots: Vec<String>,
    pub blocks: Vec<Block>,
    pub reg_count: u32,
}

impl Function {
    pub fn declaration(name: impl Into<String>, params: &[String]) -> Function {
        Function {
            name: name.into(),
            params: params.to_vec(),
            slots: Vec::new(),
            blocks: Vec::new(),
            reg_count: 0,
        }
    }

    pub fn is_decl(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Structural check run before a function is considered final: every
    /// block terminated, every referenced register, slot and block in range.
    pub fn verify(&self) -> Result<(), String> {
        let reg_ok = |r: Reg| r.0 < self.reg_count;
        let block_ok = |b: BlockId| (b.0 as usize) < self.blocks.len();
        let slot_ok = |s: SlotId| (s.0 as usize) < self.slots.len();

        for block in &self.blocks {
            for inst in &block.insts {
                let ok = match inst {
                    Inst::Const { dst, .. } => reg_ok(*dst),
                    Inst::Load { dst, slot } => reg_ok(*dst) && slot_ok(*slot),
                    Inst::Store { slot, src } => slot_ok(*slot) && reg_ok(*src),
                    Inst::BinOp { dst, lhs, rhs, .. } => {
                        reg_ok(*dst) && reg_ok(*lhs) && reg_ok(*rhs)
                    }
                    Inst::Call { dst, args, .. } => reg_ok(*dst) && args.iter().all(|a| reg_ok(*a)),
                    Inst::Phi { dst, incomings } => {
                        reg_ok(*dst) && incomings.iter().all(|(b, r)| block_ok(*b) && reg_ok(*r))
                    }
                };
                if !ok {
                    return Err(format!(
                        "function '{}': malformed instruction in block '{}'",
                        self.name, block.label
                    ));
                }
            }
            let term_ok = match &block.term {
                None => {
                    return Err(format!(
                        "function '{}': block '{}' has no terminator",
                        self.name, block.label
                    ));
                }
                Some(Terminator::Ret(r)) => reg_ok(*r),
                Some(Terminator::Br(t)) => block_ok(*t),
                Some(Terminator::CondBr {
                    cond,
                    then_dest,
                    else_dest,
                }) => reg_ok(*cond) && block_ok(*then_dest) && block_ok(*else_dest),
            };
            if !term_ok {
                return Err(format!(
                    "function '{}': malformed terminator in block '{}'",
                    self.name, block.label
                ));
            }
        }
        Ok(())
    }

    fn label(&self, b: BlockId) -> &str {
        self.blocks
            .get(b.0 as usize)
            .map(|b| b.label.as_str())
            .unwrap_or("?")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_decl() {
            return write!(f, "declare @{}({})", self.name, self.params.join(", "));
        }
        writeln!(f, "define @{}({}) {{", self.name, self.params.join(", "))?;
        if !self.slots.is_empty() {
            let slots = self
                .slots
                .iter()
                .enumerate()
                .map(|(i, name)| format!("s{}={}", i, name))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(f, "  ; slots: {}", slots)?;
        }
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for inst in &block.insts {
                match inst {
                    Inst::Const { dst, value } => writeln!(f, "  {} = fconst {}", dst, value)?,
                    Inst::Load { dst, slot } => writeln!(f, "  {} = load {}", dst, slot)?,
                    Inst::Store { slot, src } => writeln!(f, "  store {}, {}", src, slot)?,
                    Inst::BinOp { dst, op, lhs, rhs } => {
                        writeln!(f, "  {} = {} {}, {}", dst, op.mnemonic(), lhs, rhs)?
                    }
                    Inst::Call { dst, callee, args } => {
                        let args = args
                            .iter()
                            .map(|a| a.to_string())
                            .collect::<Vec<_>>()
                            .join(", ");
                        writeln!(f, "  {} = call @{}({})", dst, callee, args)?
                    }
                    Inst::Phi { dst, incomings } => writeln!(
                        f,
                        "  {} = phi [{}: {}, {}: {}]",
                        dst,
                        self.label(incomings[0].0),
                        incomings[0].1,
                        self.label(incomings[1].0),
                        incomings[1].1
                    )?,
                }
            }
            match &block.term {
                Some(Terminator::Ret(r)) => writeln!(f, "  ret {}", r)?,
                Some(Terminator::Br(t)) => writeln!(f, "  br {}", self.label(*t))?,
                Some(Terminator::CondBr {
                    cond,
                    then_dest,
                    else_dest,
                }) => writeln!(
                    f,
                    "  condbr {}, {}, {}",
                    cond,
                    self.label(*then_dest),
                    self.label(*else_dest)
                )?,
                None => writeln!(f, "  <unterminated>")?,
            }
        }
        write!(f, "}}")
    }
}

/// The lowered form of one top-level form: what the driver hands to the
/// execution backend as a single addable/removable batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unit {
    pub functions: Vec<Function>,
}

impl Unit {
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Insert a finished function, replacing a declaration of the same name.
    pub fn define(&mut self, func: Function) {
        match self.functions.iter_mut().find(|f| f.name == func.name) {
            Some(slot) => *slot = func,
            None => self.functions.push(func),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.functions.retain(|f| f.name != name);
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for func in &self.functions {
            if !first {
                writeln!(f)?;
            }
            first = false;
            writeln!(f, "{}", func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn const_fn(name: &str, value: f64) -> Function {
        Function {
            name: name.to_owned(),
            params: Vec::new(),
            slots: Vec::new(),
            blocks: vec![Block {
                label: "entry".to_owned(),
                insts: vec![Inst::Const {
                    dst: Reg(0),
                    value,
                }],
                term: Some(Terminator::Ret(Reg(0))),
            }],
            reg_count: 1,
        }
    }

    #[test]
    fn test_verify_accepts_wellformed() {
        assert!(const_fn("f", 1.0).verify().is_ok());
    }

    #[test]
    fn test_verify_rejects_unterminated_block() {
        let mut f = const_fn("f", 1.0);
        f.blocks[0].term = None;
        assert!(f.verify().unwrap_err().contains("no terminator"));
    }

    #[test]
    fn test_verify_rejects_out_of_range_reg() {
        let mut f = const_fn("f", 1.0);
        f.blocks[0].term = Some(Terminator::Ret(Reg(7)));
        assert!(f.verify().is_err());
    }

    #[test]
    fn test_display_declaration() {
        let d = Function::declaration("putchard", &["x".to_owned()]);
        assert_eq!(d.to_string(), "declare @putchard(x)");
    }

    #[test]
    fn test_display_definition() {
        let text = const_fn("one", 1.0).to_string();
        assert!(text.contains("define @one()"));
        assert!(text.contains("%0 = fconst 1"));
        assert!(text.contains("ret %0"));
    }

    #[test]
    fn test_unit_define_replaces_declaration() {
        let mut unit = Unit::default();
        unit.functions
            .push(Function::declaration("f", &[]));
        unit.define(const_fn("f", 2.0));
        assert_eq!(unit.functions.len(), 1);
        assert!(!unit.get("f").unwrap().is_decl());
    }
}
