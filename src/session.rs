use std::collections::{BTreeMap, HashMap};

use super::ast::Prototype;

/// Compiler state that outlives individual compilation units: the operator
/// precedence table and the prototype cache. Owned by the driver and passed
/// by reference to the parser and the code generator, so nothing here is a
/// process-wide singleton.
pub struct Session {
    binop_precedence: BTreeMap<char, i32>,
    proto_cache: HashMap<String, Prototype>,
}

impl Session {
    pub fn new() -> Session {
        let mut session = Session {
            binop_precedence: BTreeMap::new(),
            proto_cache: HashMap::new(),
        };
        // Built-in operators, lowest first. `=` must stay below arithmetic.
        session.set_precedence('=', 2);
        session.set_precedence('<', 10);
        session.set_precedence('+', 20);
        session.set_precedence('-', 30);
        session.set_precedence('*', 40);
        session
    }

    /// Precedence of a binary operator, `None` when the character is not an
    /// operator at all.
    pub fn precedence(&self, op: char) -> Option<i32> {
        self.binop_precedence.get(&op).copied()
    }

    pub fn set_precedence(&mut self, op: char, precedence: i32) {
        self.binop_precedence.insert(op, precedence);
    }

    /// A signature retained from an earlier `extern` or function definition,
    /// regardless of which compilation unit it was lowered in.
    pub fn prototype(&self, name: &str) -> Option<&Prototype> {
        self.proto_cache.get(name)
    }

    pub fn remember_prototype(&mut self, proto: Prototype) {
        self.proto_cache.insert(proto.name.clone(), proto);
    }

    pub fn prototype_count(&self) -> usize {
        self.proto_cache.len()
    }
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seeded_operators() {
        let session = Session::new();
        assert_eq!(session.precedence('='), Some(2));
        assert_eq!(session.precedence('*'), Some(40));
        assert_eq!(session.precedence('@'), None);
    }

    #[test]
    fn test_prototype_cache() {
        let mut session = Session::new();
        assert!(session.prototype("foo").is_none());
        session.remember_prototype(Prototype::new("foo", vec!["a".to_owned()]));
        assert_eq!(session.prototype("foo").map(|p| p.args.len()), Some(1));
    }
}
