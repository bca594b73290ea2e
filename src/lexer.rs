use super::error::{ErrorKind, Result};
use super::token::Token;
use combine::error::ParseError;
use combine::parser::char::{alpha_num, digit, newline, space};
use combine::parser::choice::or;
use combine::parser::repeat::take_until;
use combine::parser::{EasyParser, Parser};
use combine::stream::Stream;
use combine::{any, choice, eof, many1, parser, skip_many, skip_many1, token};

/// Convert a `[0-9.]+` run with strtod semantics: the longest leading
/// prefix that still forms a valid literal wins, anything after a second
/// `.` is swallowed with the run. `1.2.3` therefore yields `1.2`. Loose on
/// purpose; pinned by a test below.
fn parse_double(run: &str) -> f64 {
    if let Ok(v) = run.parse::<f64>() {
        return v;
    }
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in run.char_indices() {
        if c == '.' {
            if seen_dot {
                break;
            }
            seen_dot = true;
        }
        end = i + c.len_utf8();
    }
    run[..end].parse().unwrap_or(0.0)
}

fn number<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(choice((digit(), token('.')))).map(|ns: String| Token::Number(parse_double(&ns)))
}

fn ident<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(alpha_num()).map(|s: String| match s.as_ref() {
        "def" => Token::Def,
        "extern" => Token::Extern,
        "if" => Token::If,
        "then" => Token::Then,
        "else" => Token::Else,
        "for" => Token::For,
        "in" => Token::In,
        "var" => Token::Var,
        "unary" => Token::Unary,
        "binary" => Token::Binary,
        id => Token::Ident(id.to_string()),
    })
}

fn comment<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    skip_many1((
        token('#'),
        take_until::<Vec<_>, _, _>(or(newline().map(|_| ()), eof())),
    ))
}

fn lex_<Input>() -> impl Parser<Input, Output = Option<Token>>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    skip_many(or(space(), newline())).with(choice((
        number().map(Some),
        ident().map(Some),
        comment().with(lex()),
        eof().map(|_| None),
        any().map(|c| Some(Token::Kwd(c))),
    )))
}

parser! {
    pub fn lex[Input]()(Input) -> Option<Token>
        where [Input: Stream<Token=char>]
    {
        lex_()
    }
}

/// Stateful tokenizer over a source buffer. Characters are consumed exactly
/// once; there is no backtracking past a produced token.
pub struct Lexer<'a> {
    rest: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Lexer<'a> {
        Lexer { rest: src }
    }

    /// Produce the next token, or `None` once the buffer is exhausted.
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        match lex().easy_parse(self.rest) {
            Ok((tok, rest)) => {
                self.rest = rest;
                Ok(tok)
            }
            Err(e) => Err(ErrorKind::Lex(e.to_string()).into()),
        }
    }
}

/// Lex a whole source buffer into a token vector.
pub fn lex_all(src: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next_token()? {
        tokens.push(tok);
    }
    Ok(tokens)
}

#[cfg(test)]
mod test {
    use super::super::token::Token::*;
    use super::*;

    #[test]
    fn test_number() {
        assert_eq!(number().easy_parse("1.0").map(|x| x.0), Ok(Number(1.0)));
    }

    #[test]
    fn test_number_loose_dots() {
        // strtod semantics: the run is consumed whole, the value stops at
        // the second dot. Known-loose boundary, kept as-is.
        assert_eq!(number().easy_parse("1.2.3").map(|x| x.0), Ok(Number(1.2)));
        assert_eq!(lex_all("1.2.3").unwrap(), vec![Number(1.2)]);
    }

    #[test]
    fn test_ident() {
        assert_eq!(
            ident().easy_parse("test").map(|x| x.0),
            Ok(Ident("test".to_owned()))
        );

        assert_eq!(ident().easy_parse("def").map(|x| x.0), Ok(Def));
        assert_eq!(ident().easy_parse("var").map(|x| x.0), Ok(Var));
        assert_eq!(ident().easy_parse("binary").map(|x| x.0), Ok(Binary));
    }

    #[test]
    fn test_comment() {
        assert_eq!(comment().easy_parse("#hoge").map(|x| x.0), Ok(()));
    }

    #[test]
    fn test_lex() {
        assert_eq!(
            lex()
                .easy_parse(
                    r#"#comment
1.0
"#
                )
                .map(|x| x.0),
            Ok(Some(Number(1.0)))
        );
    }

    #[test]
    fn test_lex_all() {
        assert_eq!(
            lex_all("def foo(a) a+1;").unwrap(),
            vec![
                Def,
                Ident("foo".to_owned()),
                Kwd('('),
                Ident("a".to_owned()),
                Kwd(')'),
                Ident("a".to_owned()),
                Kwd('+'),
                Number(1.0),
                Kwd(';'),
            ]
        );
    }

    #[test]
    fn test_lex_operator_definition() {
        assert_eq!(
            lex_all("binary@ 1").unwrap(),
            vec![Binary, Kwd('@'), Number(1.0)]
        );
    }
}
