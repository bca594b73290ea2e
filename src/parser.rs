use super::ast::{Expr, Function, Prototype, ANON_FN};
use super::error::{ErrorKind, Result};
use super::session::Session;
use super::token::Token;

/// Recursive-descent parser with precedence climbing for binary operators.
/// The operator table lives in the [`Session`] so user-defined operators
/// parsed in one top-level form are visible to the next; combinator
/// grammars cannot express that, hence the hand-written core.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser { tokens, pos: 0 }
    }

    pub fn cur(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    /// Advance past the current token. Also the driver's one-token
    /// resynchronisation step after an error.
    pub fn eat(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn err<T>(msg: impl Into<String>) -> Result<T> {
        Err(ErrorKind::Parse(msg.into()).into())
    }

    /// Precedence of the current token, -1 when it is not a binary operator.
    fn tok_precedence(&self, session: &Session) -> i32 {
        match *self.cur() {
            Token::Kwd(c) if c.is_ascii() => session.precedence(c).unwrap_or(-1),
            _ => -1,
        }
    }

    /// expression ::= unary binoprhs
    pub fn parse_expression(&mut self, session: &Session) -> Result<Expr> {
        let lhs = self.parse_unary(session)?;
        self.parse_bin_op_rhs(session, 0, lhs)
    }

    /// binoprhs ::= (operator unary)*
    ///
    /// Classic precedence climbing. Equal-precedence chains fold left; `=`
    /// re-enters at its own precedence so assignment chains nest to the
    /// right without the algorithm special-casing beyond that one opcode.
    fn parse_bin_op_rhs(&mut self, session: &Session, expr_prec: i32, mut lhs: Expr) -> Result<Expr> {
        loop {
            let tok_prec = self.tok_precedence(session);
            if tok_prec < expr_prec {
                return Ok(lhs);
            }
            let bin_op = match *self.cur() {
                Token::Kwd(c) => c,
                _ => return Ok(lhs),
            };
            self.eat();

            let mut rhs = self.parse_unary(session)?;

            let min_rhs_prec = if bin_op == '=' { tok_prec } else { tok_prec + 1 };
            if self.tok_precedence(session) >= min_rhs_prec {
                rhs = self.parse_bin_op_rhs(session, min_rhs_prec, rhs)?;
            }

            lhs = Expr::Binary(bin_op, Box::new(lhs), Box::new(rhs));
        }
    }

    /// unary ::= primary | <op> unary
    ///
    /// Any plain punctuation character other than `(` and `,` is taken as a
    /// prefix opcode; unary operators have no precedence and bind to the
    /// following unary expression.
    fn parse_unary(&mut self, session: &Session) -> Result<Expr> {
        match *self.cur() {
            Token::Kwd(c) if c.is_ascii() && c != '(' && c != ',' => {
                self.eat();
                let operand = self.parse_unary(session)?;
                Ok(Expr::Unary(c, Box::new(operand)))
            }
            _ => self.parse_primary(session),
        }
    }

    /// primary ::= number | identifierexpr | parenexpr | ifexpr | forexpr | varexpr
    fn parse_primary(&mut self, session: &Session) -> Result<Expr> {
        match self.cur().clone() {
            Token::Number(n) => {
                self.eat();
                Ok(Expr::Number(n))
            }
            Token::Ident(name) => {
                self.eat();
                self.parse_identifier_expr(session, name)
            }
            Token::Kwd('(') => self.parse_paren_expr(session),
            Token::If => self.parse_if_expr(session),
            Token::For => self.parse_for_expr(session),
            Token::Var => self.parse_var_expr(session),
            tok => Self::err(format!(
                "unknown token {:?} when expecting an expression",
                tok
            )),
        }
    }

    /// identifierexpr ::= identifier | identifier '(' expression* ')'
    fn parse_identifier_expr(&mut self, session: &Session, name: String) -> Result<Expr> {
        if *self.cur() != Token::Kwd('(') {
            return Ok(Expr::Variable(name));
        }
        self.eat();

        let mut args = Vec::new();
        if *self.cur() != Token::Kwd(')') {
            loop {
                args.push(self.parse_expression(session)?);
                if *self.cur() == Token::Kwd(')') {
                    break;
                }
                if *self.cur() != Token::Kwd(',') {
                    return Self::err("expected ')' or ',' in argument list");
                }
                self.eat();
            }
        }
        self.eat();
        Ok(Expr::Call(name, args))
    }

    /// parenexpr ::= '(' expression ')'
    fn parse_paren_expr(&mut self, session: &Session) -> Result<Expr> {
        self.eat();
        let inner = self.parse_expression(session)?;
        if *self.cur() != Token::Kwd(')') {
            return Self::err("expected ')'");
        }
        self.eat();
        Ok(inner)
    }

    /// ifexpr ::= 'if' expression 'then' expression 'else' expression
    fn parse_if_expr(&mut self, session: &Session) -> Result<Expr> {
        self.eat();
        let cond = self.parse_expression(session)?;

        if *self.cur() != Token::Then {
            return Self::err("expected 'then'");
        }
        self.eat();
        let then = self.parse_expression(session)?;

        if *self.cur() != Token::Else {
            return Self::err("expected 'else'");
        }
        self.eat();
        let els = self.parse_expression(session)?;

        Ok(Expr::If(Box::new(cond), Box::new(then), Box::new(els)))
    }

    /// forexpr ::= 'for' identifier '=' expr ',' expr (',' expr)? 'in' expression
    fn parse_for_expr(&mut self, session: &Session) -> Result<Expr> {
        self.eat();

        let name = match self.cur().clone() {
            Token::Ident(name) => name,
            _ => return Self::err("expected identifier after 'for'"),
        };
        self.eat();

        if *self.cur() != Token::Kwd('=') {
            return Self::err("expected '=' after 'for'");
        }
        self.eat();
        let start = self.parse_expression(session)?;

        if *self.cur() != Token::Kwd(',') {
            return Self::err("expected ',' after for start value");
        }
        self.eat();
        let end = self.parse_expression(session)?;

        let step = if *self.cur() == Token::Kwd(',') {
            self.eat();
            Some(Box::new(self.parse_expression(session)?))
        } else {
            None
        };

        if *self.cur() != Token::In {
            return Self::err("expected 'in' after 'for'");
        }
        self.eat();
        let body = self.parse_expression(session)?;

        Ok(Expr::For(
            name,
            Box::new(start),
            Box::new(end),
            step,
            Box::new(body),
        ))
    }

    /// varexpr ::= 'var' identifier ('=' expression)?
    ///                   (',' identifier ('=' expression)?)* 'in' expression
    fn parse_var_expr(&mut self, session: &Session) -> Result<Expr> {
        self.eat();

        if !matches!(self.cur(), Token::Ident(_)) {
            return Self::err("expected identifier after 'var'");
        }

        let mut bindings = Vec::new();
        loop {
            let name = match self.cur().clone() {
                Token::Ident(name) => name,
                _ => return Self::err("expected identifier list after 'var'"),
            };
            self.eat();

            let init = if *self.cur() == Token::Kwd('=') {
                self.eat();
                Some(self.parse_expression(session)?)
            } else {
                None
            };
            bindings.push((name, init));

            if *self.cur() != Token::Kwd(',') {
                break;
            }
            self.eat();
        }

        if *self.cur() != Token::In {
            return Self::err("expected 'in' keyword after 'var'");
        }
        self.eat();
        let body = self.parse_expression(session)?;

        Ok(Expr::Var(bindings, Box::new(body)))
    }

    /// prototype ::= id '(' id* ')'
    ///             | 'unary' <sym> '(' id ')'
    ///             | 'binary' <sym> number? '(' id id ')'
    ///
    /// Parsing a binary prototype registers its precedence in the session
    /// table, which is what makes the new operator parseable in subsequent
    /// expressions.
    pub fn parse_prototype(&mut self, session: &mut Session) -> Result<Prototype> {
        let mut precedence = 30;
        // 0 = plain function, 1 = unary overload, 2 = binary overload.
        let kind: usize;

        let name = match self.cur().clone() {
            Token::Ident(name) => {
                self.eat();
                kind = 0;
                name
            }
            Token::Unary => {
                self.eat();
                let sym = match *self.cur() {
                    Token::Kwd(c) if c.is_ascii() => c,
                    _ => return Self::err("expected unary operator"),
                };
                self.eat();
                kind = 1;
                format!("unary{}", sym)
            }
            Token::Binary => {
                self.eat();
                let sym = match *self.cur() {
                    Token::Kwd(c) if c.is_ascii() => c,
                    _ => return Self::err("expected binary operator"),
                };
                self.eat();
                kind = 2;

                if let Token::Number(n) = *self.cur() {
                    if n < 1.0 || n > 100.0 {
                        return Self::err("invalid precedence: must be 1..100");
                    }
                    precedence = n as i32;
                    self.eat();
                }
                format!("binary{}", sym)
            }
            _ => return Self::err("expected function name in prototype"),
        };

        if *self.cur() != Token::Kwd('(') {
            return Self::err("expected '(' in prototype");
        }
        self.eat();

        let mut args = Vec::new();
        while let Token::Ident(arg) = self.cur().clone() {
            args.push(arg);
            self.eat();
        }

        if *self.cur() != Token::Kwd(')') {
            return Self::err("expected ')' in prototype");
        }
        self.eat();

        if kind != 0 && args.len() != kind {
            return Self::err("invalid number of operands for operator");
        }

        if kind == 2 {
            let proto = Prototype::operator(name, args, precedence);
            session.set_precedence(proto.operator_name(), precedence);
            Ok(proto)
        } else if kind == 1 {
            Ok(Prototype::operator(name, args, precedence))
        } else {
            Ok(Prototype::new(name, args))
        }
    }

    /// definition ::= 'def' prototype expression
    pub fn parse_definition(&mut self, session: &mut Session) -> Result<Function> {
        self.eat();
        let proto = self.parse_prototype(session)?;
        let body = self.parse_expression(session)?;
        Ok(Function { proto, body })
    }

    /// external ::= 'extern' prototype
    pub fn parse_extern(&mut self, session: &mut Session) -> Result<Prototype> {
        self.eat();
        self.parse_prototype(session)
    }

    /// toplevelexpr ::= expression, wrapped in an anonymous nullary function
    pub fn parse_toplevel_expr(&mut self, session: &Session) -> Result<Function> {
        let body = self.parse_expression(session)?;
        Ok(Function {
            proto: Prototype::new(ANON_FN, Vec::new()),
            body,
        })
    }
}

#[cfg(test)]
mod test {
    use super::super::lexer::lex_all;
    use super::*;

    fn parse_expr(src: &str) -> Result<Expr> {
        let session = Session::new();
        let mut parser = Parser::new(lex_all(src).unwrap());
        parser.parse_expression(&session)
    }

    fn binary(op: char, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    #[test]
    fn test_primary() {
        assert_eq!(parse_expr("1.0").unwrap(), Expr::Number(1.0));
        assert_eq!(parse_expr("y").unwrap(), Expr::Variable("y".to_owned()));
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse_expr("1+2*3").unwrap(),
            binary(
                '+',
                Expr::Number(1.0),
                binary('*', Expr::Number(2.0), Expr::Number(3.0))
            )
        );

        assert_eq!(
            parse_expr("(1+2)*3").unwrap(),
            binary(
                '*',
                binary('+', Expr::Number(1.0), Expr::Number(2.0)),
                Expr::Number(3.0)
            )
        );
    }

    #[test]
    fn test_equal_precedence_folds_left() {
        assert_eq!(
            parse_expr("1-2-3").unwrap(),
            binary(
                '-',
                binary('-', Expr::Number(1.0), Expr::Number(2.0)),
                Expr::Number(3.0)
            )
        );
    }

    #[test]
    fn test_assignment_nests_right() {
        assert_eq!(
            parse_expr("a=b=c").unwrap(),
            binary(
                '=',
                Expr::Variable("a".to_owned()),
                binary(
                    '=',
                    Expr::Variable("b".to_owned()),
                    Expr::Variable("c".to_owned())
                )
            )
        );
    }

    #[test]
    fn test_call() {
        assert_eq!(
            parse_expr("foo(y, 4.0)").unwrap(),
            Expr::Call(
                "foo".to_owned(),
                vec![Expr::Variable("y".to_owned()), Expr::Number(4.0)]
            )
        );
    }

    #[test]
    fn test_unary() {
        assert_eq!(
            parse_expr("!!x").unwrap(),
            Expr::Unary(
                '!',
                Box::new(Expr::Unary('!', Box::new(Expr::Variable("x".to_owned()))))
            )
        );
    }

    #[test]
    fn test_if() {
        assert_eq!(
            parse_expr("if x then 1 else 2").unwrap(),
            Expr::If(
                Box::new(Expr::Variable("x".to_owned())),
                Box::new(Expr::Number(1.0)),
                Box::new(Expr::Number(2.0))
            )
        );
        assert!(parse_expr("if x then 1").unwrap_err().is_parse());
    }

    #[test]
    fn test_for() {
        assert_eq!(
            parse_expr("for i=1, 3 in 3").unwrap(),
            Expr::For(
                "i".to_owned(),
                Box::new(Expr::Number(1.0)),
                Box::new(Expr::Number(3.0)),
                None,
                Box::new(Expr::Number(3.0))
            )
        );

        assert_eq!(
            parse_expr("for i=1, 3, 2 in 3").unwrap(),
            Expr::For(
                "i".to_owned(),
                Box::new(Expr::Number(1.0)),
                Box::new(Expr::Number(3.0)),
                Some(Box::new(Expr::Number(2.0))),
                Box::new(Expr::Number(3.0))
            )
        );
    }

    #[test]
    fn test_var() {
        assert_eq!(
            parse_expr("var x = 5, y in x").unwrap(),
            Expr::Var(
                vec![
                    ("x".to_owned(), Some(Expr::Number(5.0))),
                    ("y".to_owned(), None)
                ],
                Box::new(Expr::Variable("x".to_owned()))
            )
        );
        assert!(parse_expr("var in 1").unwrap_err().is_parse());
    }

    #[test]
    fn test_prototype() {
        let mut session = Session::new();
        let mut parser = Parser::new(lex_all("f(a b)").unwrap());
        let proto = parser.parse_prototype(&mut session).unwrap();
        assert_eq!(proto.name, "f");
        assert_eq!(proto.args, vec!["a".to_owned(), "b".to_owned()]);
        assert!(!proto.is_operator);
    }

    #[test]
    fn test_binary_prototype_registers_precedence() {
        let mut session = Session::new();
        let mut parser = Parser::new(lex_all("binary@ 1 (a b)").unwrap());
        let proto = parser.parse_prototype(&mut session).unwrap();
        assert_eq!(proto.name, "binary@");
        assert!(proto.is_binary_op());
        assert_eq!(proto.operator_name(), '@');
        assert_eq!(session.precedence('@'), Some(1));
    }

    #[test]
    fn test_binary_prototype_default_precedence() {
        let mut session = Session::new();
        let mut parser = Parser::new(lex_all("binary& (a b)").unwrap());
        let proto = parser.parse_prototype(&mut session).unwrap();
        assert_eq!(proto.precedence, 30);
        assert_eq!(session.precedence('&'), Some(30));
    }

    #[test]
    fn test_binary_prototype_precedence_bounds() {
        for src in &["binary@ 0 (a b)", "binary@ 101 (a b)"] {
            let mut session = Session::new();
            let mut parser = Parser::new(lex_all(src).unwrap());
            assert!(parser.parse_prototype(&mut session).unwrap_err().is_parse());
            assert_eq!(session.precedence('@'), None);
        }
    }

    #[test]
    fn test_operator_arity_mismatch() {
        let mut session = Session::new();
        let mut parser = Parser::new(lex_all("binary@ 5 (a)").unwrap());
        assert!(parser.parse_prototype(&mut session).unwrap_err().is_parse());

        let mut parser = Parser::new(lex_all("unary!(a b)").unwrap());
        assert!(parser.parse_prototype(&mut session).unwrap_err().is_parse());
    }

    #[test]
    fn test_definition_and_extern() {
        let mut session = Session::new();
        let mut parser = Parser::new(lex_all("def foo(a) a+1").unwrap());
        let f = parser.parse_definition(&mut session).unwrap();
        assert_eq!(f.proto.name, "foo");

        let mut parser = Parser::new(lex_all("extern sin(x)").unwrap());
        let proto = parser.parse_extern(&mut session).unwrap();
        assert_eq!(proto.name, "sin");
        assert_eq!(proto.args.len(), 1);
    }

    #[test]
    fn test_malformed_prototype() {
        let mut session = Session::new();
        let mut parser = Parser::new(lex_all("def foo( a b").unwrap());
        assert!(parser.parse_definition(&mut session).unwrap_err().is_parse());
    }
}
