//! Pratt parser for the query language.

use super::ast::{Ast, Comparator};
use super::lexer::{tokenize, Token};
use crate::EvalError;

/// Binding power below which a projection's right-hand side stops.
const PROJECTION_STOP: u8 = 10;

/// Parse a query into an [`Ast`].
///
/// # Errors
/// [`EvalError::Syntax`] for unknown tokens, unbalanced brackets and trailing
/// input.
pub fn parse(expression: &str) -> Result<Ast, EvalError> {
    let mut parser = Parser {
        expression,
        tokens: tokenize(expression)?,
        pos: 0,
    };
    let ast = parser.expr(0)?;
    match parser.peek() {
        None => Ok(ast),
        Some(token) => Err(parser.error(format!("unexpected trailing token {token:?}"))),
    }
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser<'_> {
    // ------------------------------------------------------------------
    // Token stream
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(_, t)| t)
    }

    fn peek_lbp(&self) -> u8 {
        self.peek().map_or(0, Token::lbp)
    }

    fn advance(&mut self) -> Result<Token, EvalError> {
        let token = self
            .tokens
            .get(self.pos)
            .map(|(_, t)| t.clone())
            .ok_or_else(|| self.error("unexpected end of expression".into()))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: &Token) -> Result<(), EvalError> {
        match self.advance()? {
            ref token if token == expected => Ok(()),
            token => Err(self.error(format!("expected {expected:?}, found {token:?}"))),
        }
    }

    fn error(&self, message: String) -> EvalError {
        let offset = self
            .tokens
            .get(self.pos)
            .map_or(self.expression.len(), |(offset, _)| *offset);
        EvalError::Syntax {
            expression: self.expression.to_owned(),
            offset,
            message,
        }
    }

    // ------------------------------------------------------------------
    // Pratt core
    // ------------------------------------------------------------------

    fn expr(&mut self, rbp: u8) -> Result<Ast, EvalError> {
        let mut left = self.nud()?;
        while rbp < self.peek_lbp() {
            left = self.led(left)?;
        }
        Ok(left)
    }

    fn nud(&mut self) -> Result<Ast, EvalError> {
        match self.advance()? {
            Token::Current => Ok(Ast::Identity),
            Token::Identifier(name) => Ok(Ast::Field(name)),
            Token::QuotedIdentifier(name) => {
                if self.peek() == Some(&Token::LParen) {
                    return Err(self.error("quoted identifiers cannot be called".into()));
                }
                Ok(Ast::Field(name))
            }
            Token::Literal(value) => Ok(Ast::Literal(value)),
            Token::RawString(s) => Ok(Ast::Literal(serde_json::Value::String(s))),
            Token::Star => self.wildcard_values(Ast::Identity),
            Token::Flatten => self.flatten(Ast::Identity),
            Token::Filter => self.filter(Ast::Identity),
            Token::LBrace => self.multi_hash(),
            Token::LBracket => match (self.peek(), self.peek_at(1)) {
                (Some(Token::Number(_) | Token::Colon), _) => self.index(Ast::Identity),
                (Some(Token::Star), Some(Token::RBracket)) => {
                    self.pos += 2;
                    self.wildcard_index(Ast::Identity)
                }
                _ => self.multi_list(),
            },
            Token::Ampersand => Ok(Ast::Expref(Box::new(self.expr(0)?))),
            Token::Not => Ok(Ast::Not(Box::new(self.expr(Token::Not.lbp())?))),
            Token::LParen => {
                let inner = self.expr(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            token => {
                self.pos -= 1;
                Err(self.error(format!("unexpected token {token:?}")))
            }
        }
    }

    fn led(&mut self, left: Ast) -> Result<Ast, EvalError> {
        let token = self.advance()?;
        match token {
            Token::Dot => {
                let rhs = self.dot_rhs(Token::Dot.lbp())?;
                Ok(Ast::Subexpr(Box::new(left), Box::new(rhs)))
            }
            Token::LBracket => match (self.peek(), self.peek_at(1)) {
                (Some(Token::Number(_) | Token::Colon), _) => self.index(left),
                (Some(Token::Star), Some(Token::RBracket)) => {
                    self.pos += 2;
                    self.wildcard_index(left)
                }
                _ => Err(self.error("expected an index, a slice or '*'".into())),
            },
            Token::Flatten => self.flatten(left),
            Token::Filter => self.filter(left),
            Token::Pipe => {
                let rhs = self.expr(Token::Pipe.lbp())?;
                Ok(Ast::Subexpr(Box::new(left), Box::new(rhs)))
            }
            Token::Or => {
                let rhs = self.expr(Token::Or.lbp())?;
                Ok(Ast::Or(Box::new(left), Box::new(rhs)))
            }
            Token::And => {
                let rhs = self.expr(Token::And.lbp())?;
                Ok(Ast::And(Box::new(left), Box::new(rhs)))
            }
            Token::LParen => self.function(left),
            Token::Eq => self.comparison(left, Comparator::Eq),
            Token::Ne => self.comparison(left, Comparator::Ne),
            Token::Lt => self.comparison(left, Comparator::Lt),
            Token::Lte => self.comparison(left, Comparator::Lte),
            Token::Gt => self.comparison(left, Comparator::Gt),
            Token::Gte => self.comparison(left, Comparator::Gte),
            token => {
                self.pos -= 1;
                Err(self.error(format!("unexpected token {token:?}")))
            }
        }
    }

    // ------------------------------------------------------------------
    // Productions
    // ------------------------------------------------------------------

    fn comparison(&mut self, left: Ast, comparator: Comparator) -> Result<Ast, EvalError> {
        let rhs = self.expr(Token::Eq.lbp())?;
        Ok(Ast::Comparison {
            comparator,
            lhs: Box::new(left),
            rhs: Box::new(rhs),
        })
    }

    /// What may follow a `.`.
    fn dot_rhs(&mut self, lbp: u8) -> Result<Ast, EvalError> {
        match self.peek() {
            Some(
                Token::Identifier(_)
                | Token::QuotedIdentifier(_)
                | Token::Star
                | Token::LBrace
                | Token::Ampersand,
            ) => self.expr(lbp),
            Some(Token::LBracket) => {
                self.pos += 1;
                self.multi_list()
            }
            _ => Err(self.error("expected an identifier, '*', '[' or '{' after '.'".into())),
        }
    }

    /// What a projection applies to each element.
    fn projection_rhs(&mut self, lbp: u8) -> Result<Ast, EvalError> {
        match self.peek() {
            None => Ok(Ast::Identity),
            Some(token) if token.lbp() < PROJECTION_STOP => Ok(Ast::Identity),
            Some(Token::Dot) => {
                self.pos += 1;
                self.dot_rhs(lbp)
            }
            Some(Token::LBracket | Token::Filter | Token::Flatten) => self.expr(lbp),
            Some(token) => Err(self.error(format!("unexpected token {token:?} after projection"))),
        }
    }

    fn wildcard_values(&mut self, left: Ast) -> Result<Ast, EvalError> {
        let rhs = self.projection_rhs(Token::Star.lbp())?;
        Ok(Ast::Projection {
            lhs: Box::new(Ast::ObjectValues(Box::new(left))),
            rhs: Box::new(rhs),
        })
    }

    /// After `[*]` has been consumed.
    fn wildcard_index(&mut self, left: Ast) -> Result<Ast, EvalError> {
        let rhs = self.projection_rhs(Token::Star.lbp())?;
        Ok(Ast::Projection {
            lhs: Box::new(left),
            rhs: Box::new(rhs),
        })
    }

    fn flatten(&mut self, left: Ast) -> Result<Ast, EvalError> {
        let rhs = self.projection_rhs(Token::Flatten.lbp())?;
        Ok(Ast::Projection {
            lhs: Box::new(Ast::Flatten(Box::new(left))),
            rhs: Box::new(rhs),
        })
    }

    /// After `[?` has been consumed.
    fn filter(&mut self, left: Ast) -> Result<Ast, EvalError> {
        let predicate = self.expr(0)?;
        self.expect(&Token::RBracket)?;
        let then = self.projection_rhs(Token::Filter.lbp())?;
        Ok(Ast::Projection {
            lhs: Box::new(left),
            rhs: Box::new(Ast::Condition {
                predicate: Box::new(predicate),
                then: Box::new(then),
            }),
        })
    }

    /// After `[` has been consumed, with a number or `:` next.
    fn index(&mut self, left: Ast) -> Result<Ast, EvalError> {
        let mut parts: [Option<i64>; 3] = [None, None, None];
        let mut slot = 0;
        loop {
            match self.advance()? {
                Token::Number(n) => {
                    if parts[slot].is_some() {
                        return Err(self.error("expected ':' or ']'".into()));
                    }
                    parts[slot] = Some(n);
                }
                Token::Colon if slot < 2 => slot += 1,
                Token::RBracket => break,
                token => return Err(self.error(format!("unexpected token {token:?} in index"))),
            }
        }

        if slot == 0 {
            let index = parts[0].ok_or_else(|| self.error("empty index".into()))?;
            return Ok(Ast::Subexpr(Box::new(left), Box::new(Ast::Index(index))));
        }

        let [start, stop, step] = parts;
        if step == Some(0) {
            return Err(self.error("slice step cannot be 0".into()));
        }
        let sliced = Ast::Subexpr(Box::new(left), Box::new(Ast::Slice { start, stop, step }));
        let rhs = self.projection_rhs(Token::Star.lbp())?;
        Ok(Ast::Projection {
            lhs: Box::new(sliced),
            rhs: Box::new(rhs),
        })
    }

    /// After `[` has been consumed.
    fn multi_list(&mut self) -> Result<Ast, EvalError> {
        let mut items = Vec::new();
        loop {
            items.push(self.expr(0)?);
            match self.advance()? {
                Token::Comma => continue,
                Token::RBracket => break,
                token => return Err(self.error(format!("expected ',' or ']', found {token:?}"))),
            }
        }
        Ok(Ast::MultiList(items))
    }

    /// After `{` has been consumed.
    fn multi_hash(&mut self) -> Result<Ast, EvalError> {
        let mut pairs = Vec::new();
        loop {
            let key = match self.advance()? {
                Token::Identifier(key) | Token::QuotedIdentifier(key) => key,
                token => return Err(self.error(format!("expected a key, found {token:?}"))),
            };
            self.expect(&Token::Colon)?;
            pairs.push((key, self.expr(0)?));
            match self.advance()? {
                Token::Comma => continue,
                Token::RBrace => break,
                token => return Err(self.error(format!("expected ',' or '}}', found {token:?}"))),
            }
        }
        Ok(Ast::MultiHash(pairs))
    }

    /// After `(` has been consumed; `left` must be the function name.
    fn function(&mut self, left: Ast) -> Result<Ast, EvalError> {
        let Ast::Field(name) = left else {
            return Err(self.error("only named functions can be called".into()));
        };
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.expr(0)?);
                match self.advance()? {
                    Token::Comma => continue,
                    Token::RParen => break,
                    token => {
                        return Err(self.error(format!("expected ',' or ')', found {token:?}")))
                    }
                }
            }
        }
        Ok(Ast::Function { name, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str) -> Box<Ast> {
        Box::new(Ast::Field(name.into()))
    }

    #[test]
    fn dotted_paths_are_left_nested_subexpressions() {
        assert_eq!(
            parse("a.b").unwrap(),
            Ast::Subexpr(field("a"), field("b"))
        );
    }

    #[test]
    fn wildcard_index_projects_the_rest() {
        assert_eq!(
            parse("a[*].b").unwrap(),
            Ast::Projection {
                lhs: field("a"),
                rhs: field("b"),
            }
        );
    }

    #[test]
    fn pipe_stops_a_projection() {
        let ast = parse("a[*].b | [0]").unwrap();
        let Ast::Subexpr(lhs, rhs) = ast else {
            panic!("expected a pipe");
        };
        assert!(matches!(*lhs, Ast::Projection { .. }));
        assert_eq!(
            *rhs,
            Ast::Subexpr(Box::new(Ast::Identity), Box::new(Ast::Index(0)))
        );
    }

    #[test]
    fn filters_wrap_a_condition() {
        let ast = parse("items[?price > `10`].name").unwrap();
        let Ast::Projection { rhs, .. } = ast else {
            panic!("expected a projection");
        };
        assert!(matches!(*rhs, Ast::Condition { .. }));
    }

    #[test]
    fn functions_and_exprefs() {
        assert_eq!(
            parse("sort_by(people, &age)").unwrap(),
            Ast::Function {
                name: "sort_by".into(),
                args: vec![Ast::Field("people".into()), Ast::Expref(field("age"))],
            }
        );
        assert_eq!(
            parse("length(@)").unwrap(),
            Ast::Function {
                name: "length".into(),
                args: vec![Ast::Identity],
            }
        );
    }

    #[test]
    fn multiselect_and_literals() {
        assert_eq!(
            parse("{a: a, b: `[1]`}").unwrap(),
            Ast::MultiHash(vec![
                ("a".into(), Ast::Field("a".into())),
                ("b".into(), Ast::Literal(json!([1]))),
            ])
        );
        assert_eq!(
            parse("[a, 'x']").unwrap(),
            Ast::MultiList(vec![Ast::Field("a".into()), Ast::Literal(json!("x"))])
        );
    }

    #[test]
    fn malformed_queries_are_rejected() {
        for query in ["a.", "a[", "a[0", "(a", "a b", "{a}", "'x'()", "a[1:2:0]", ""] {
            assert!(
                matches!(parse(query), Err(EvalError::Syntax { .. })),
                "{query} should not parse"
            );
        }
    }
}
