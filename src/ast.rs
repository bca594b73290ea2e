/// Name given to the synthetic function wrapping a bare top-level
/// expression. Its compilation unit is removed again right after the call
/// returns, so the name never collides across units.
pub const ANON_FN: &str = "__anon_expr";

/// An expression node. Every node exclusively owns its children; the tree
/// is acyclic and dropped top-down with its compilation unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Unary(char, Box<Expr>),
    /// `=` is reserved as the assignment opcode; every other opcode is
    /// either a built-in or resolved as a user-defined `binary<sym>`.
    Binary(char, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    /// loop variable, start, end, optional step, body
    For(String, Box<Expr>, Box<Expr>, Option<Box<Expr>>, Box<Expr>),
    /// bindings (name, optional initializer), body
    Var(Vec<(String, Option<Expr>)>, Box<Expr>),
}

/// A function signature. Operator overloads are name-encoded as
/// `unary<sym>` / `binary<sym>` and flagged so the argument count can be
/// checked against the operator kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub args: Vec<String>,
    pub is_operator: bool,
    pub precedence: i32,
}

impl Prototype {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Prototype {
        Prototype {
            name: name.into(),
            args,
            is_operator: false,
            precedence: 30,
        }
    }

    pub fn operator(name: impl Into<String>, args: Vec<String>, precedence: i32) -> Prototype {
        Prototype {
            name: name.into(),
            args,
            is_operator: true,
            precedence,
        }
    }

    pub fn is_unary_op(&self) -> bool {
        self.is_operator && self.args.len() == 1
    }

    pub fn is_binary_op(&self) -> bool {
        self.is_operator && self.args.len() == 2
    }

    /// The operator symbol is the last character of the encoded name.
    pub fn operator_name(&self) -> char {
        self.name.chars().last().unwrap_or('\0')
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub proto: Prototype,
    pub body: Expr,
}
