//! Recursive-descent parser. One token of lookahead is enough for every
//! production in Ionia's grammar: there is no operator precedence to
//! resolve, so no Pratt-style machinery is needed, unlike languages that
//! share this crate's pipeline shape but a richer expression grammar.

use std::fmt;

use crate::ast::Ast;
use crate::lexer::Token;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error(parser): {}", self.message)
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub error_count: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser { tokens, pos: 0, error_count: 0 }
    }

    /// Parses a whole program (a flat sequence of statements), accumulating
    /// syntax errors and abandoning only the offending statement.
    pub fn parse_program(source: &str) -> (Vec<Ast>, usize) {
        let (tokens, lex_errors) = crate::lexer::Lexer::lex_all(source);
        let mut parser = Parser::new(tokens);
        let mut statements = Vec::new();
        while !parser.at_end() {
            match parser.parse_statement() {
                Ok(ast) => statements.push(ast),
                Err(err) => {
                    parser.report(err);
                    parser.recover();
                }
            }
        }
        (statements, lex_errors + parser.error_count)
    }

    fn at_end(&self) -> bool {
        matches!(self.current(), Token::End)
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::End)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if !matches!(tok, Token::End) {
            self.pos += 1;
        }
        tok
    }

    fn expect_char(&mut self, c: char) -> PResult<()> {
        match self.advance() {
            Token::Char(found) if found == c => Ok(()),
            other => Err(ParseError { message: format!("expected '{}', found {:?}", c, other) }),
        }
    }

    fn is_char(&self, c: char) -> bool {
        matches!(self.current(), Token::Char(found) if *found == c)
    }

    fn report(&mut self, err: ParseError) {
        eprintln!("{}", err);
        self.error_count += 1;
    }

    /// Skips to the next token that plausibly starts a statement, abandoning
    /// whatever was left of the current one.
    fn recover(&mut self) {
        if !self.at_end() {
            self.advance();
        }
        while !self.at_end() {
            if matches!(self.current(), Token::Id(_)) {
                break;
            }
            self.advance();
        }
    }

    /// `id '=' expr | id '(' argList? ')' chain*`
    fn parse_statement(&mut self) -> PResult<Ast> {
        let name = match self.advance() {
            Token::Id(name) => name,
            other => return Err(ParseError { message: format!("invalid statement, found {:?}", other) }),
        };
        if self.is_char('=') {
            self.advance();
            let expr = self.parse_expr()?;
            return Ok(Ast::define(name, expr));
        }
        if self.is_char('(') {
            return self.parse_funcall_chain(Ast::id(name));
        }
        Err(ParseError { message: format!("invalid statement starting with '{}'", name) })
    }

    /// `expr := '(' paramList? ')' ':' expr | id '(' argList? ')' chain* | id '=' expr | id | number`
    fn parse_expr(&mut self) -> PResult<Ast> {
        match self.current().clone() {
            Token::Char('(') => self.parse_func(),
            Token::Id(name) => {
                self.advance();
                if self.is_char('=') {
                    self.advance();
                    let rhs = self.parse_expr()?;
                    return Ok(Ast::define(name, rhs));
                }
                if self.is_char('(') {
                    return self.parse_funcall_chain(Ast::id(name));
                }
                Ok(Ast::id(name))
            }
            Token::Num(n) => {
                self.advance();
                Ok(Ast::Num(n))
            }
            other => Err(ParseError { message: format!("invalid expression, found {:?}", other) }),
        }
    }

    /// `'(' paramList? ')' ':' expr`
    fn parse_func(&mut self) -> PResult<Ast> {
        self.expect_char('(')?;
        let mut params = Vec::new();
        if !self.is_char(')') {
            loop {
                match self.advance() {
                    Token::Id(name) => params.push(name),
                    other => return Err(ParseError { message: format!("expected parameter name, found {:?}", other) }),
                }
                if self.is_char(',') {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect_char(')')?;
        self.expect_char(':')?;
        let body = self.parse_expr()?;
        Ok(Ast::func(params, body))
    }

    /// `'(' argList? ')'`, then recurses on a further immediate `(` to
    /// build left-associative chained application `f(x)(y)`.
    fn parse_funcall_chain(&mut self, callee: Ast) -> PResult<Ast> {
        self.expect_char('(')?;
        let mut args = Vec::new();
        if !self.is_char(')') {
            loop {
                args.push(self.parse_expr()?);
                if self.is_char(',') {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect_char(')')?;
        let call = Ast::call(callee, args);
        if self.is_char('(') {
            return self.parse_funcall_chain(call);
        }
        Ok(call)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_constant_program() {
        let (stmts, errs) = Parser::parse_program("main() = (): 42\n<<<(main())");
        assert_eq!(errs, 0);
        assert_eq!(stmts.len(), 2);
        assert_eq!(
            stmts[0],
            Ast::define("main", Ast::func(vec![], Ast::Num(42)))
        );
        assert_eq!(stmts[1], Ast::call(Ast::id("<<<"), vec![Ast::call(Ast::id("main"), vec![])]));
    }

    #[test]
    fn parse_chained_application() {
        let (stmts, errs) = Parser::parse_program("adder(3)(4)");
        assert_eq!(errs, 0);
        assert_eq!(
            stmts[0],
            Ast::call(Ast::call(Ast::id("adder"), vec![Ast::Num(3)]), vec![Ast::Num(4)])
        );
    }

    #[test]
    fn parse_nested_define_in_expr() {
        let (stmts, errs) = Parser::parse_program("f(x = 1)");
        assert_eq!(errs, 0);
        assert_eq!(
            stmts[0],
            Ast::call(Ast::id("f"), vec![Ast::define("x", Ast::Num(1))])
        );
    }

    #[test]
    fn parse_error_is_recoverable_at_statement_granularity() {
        let (stmts, errs) = Parser::parse_program(")bad\nok = 1");
        assert_eq!(errs, 1);
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0], Ast::define("ok", Ast::Num(1)));
    }

    #[test]
    fn roundtrip_through_unparse() {
        let source = "mk=(x):(): x\nf=mk(7)\n<<<(f())";
        let (stmts, errs) = Parser::parse_program(source);
        assert_eq!(errs, 0);
        let rendered: Vec<String> = stmts.iter().map(|s| s.to_string()).collect();
        let reparsed = Parser::parse_program(&rendered.join("\n"));
        assert_eq!(reparsed.1, 0);
        assert_eq!(reparsed.0, stmts);
    }
}
