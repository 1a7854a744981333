//! Tokenizer for the query language.

use logos::Logos;
use serde_json::Value;

use crate::EvalError;

/// A query token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // === Punctuation ===
    #[token(".")]
    Dot,
    #[token("*")]
    Star,
    #[token("[]")]
    Flatten,
    #[token("[?")]
    Filter,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("@")]
    Current,
    #[token("&")]
    Ampersand,

    // === Operators ===
    #[token("||")]
    Or,
    #[token("|")]
    Pipe,
    #[token("&&")]
    And,
    #[token("!")]
    Not,
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    Lte,
    #[token(">")]
    Gt,
    #[token(">=")]
    Gte,

    // === Atoms ===
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Number(i64),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Identifier(String),

    /// `"quoted identifier"`, JSON string escapes apply.
    #[regex(r#""([^"\\]|\\.)*""#, |lex| serde_json::from_str::<String>(lex.slice()).ok())]
    QuotedIdentifier(String),

    /// `'raw string'`; only `\'` is an escape.
    #[regex(r"'([^'\\]|\\.)*'", |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].replace("\\'", "'")
    })]
    RawString(String),

    /// `` `json literal` ``
    #[regex(r"`([^`\\]|\\.)*`", |lex| {
        let s = lex.slice();
        serde_json::from_str::<Value>(&s[1..s.len() - 1].replace("\\`", "`")).ok()
    })]
    Literal(Value),
}

impl Token {
    /// Left binding power used by the Pratt parser.
    pub fn lbp(&self) -> u8 {
        match self {
            Token::Pipe => 1,
            Token::Or => 2,
            Token::And => 3,
            Token::Eq | Token::Ne | Token::Lt | Token::Lte | Token::Gt | Token::Gte => 5,
            Token::Flatten => 9,
            Token::Star => 20,
            Token::Filter => 21,
            Token::Dot => 40,
            Token::Not => 45,
            Token::LBrace => 50,
            Token::LBracket => 55,
            Token::LParen => 60,
            _ => 0,
        }
    }
}

/// Tokenize a query, pairing every token with its byte offset.
///
/// # Errors
/// [`EvalError::Syntax`] at the first character that does not start a token.
pub fn tokenize(expression: &str) -> Result<Vec<(usize, Token)>, EvalError> {
    let mut lexer = Token::lexer(expression);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        let offset = lexer.span().start;
        match token {
            Ok(token) => tokens.push((offset, token)),
            Err(()) => {
                return Err(EvalError::Syntax {
                    expression: expression.to_owned(),
                    offset,
                    message: format!("unexpected input '{}'", lexer.slice()),
                })
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(expression: &str) -> Vec<Token> {
        tokenize(expression)
            .unwrap()
            .into_iter()
            .map(|(_, t)| t)
            .collect()
    }

    #[test]
    fn punctuation_prefers_longest_match() {
        assert_eq!(
            kinds("a[] || b[?c] | d[0]"),
            vec![
                Token::Identifier("a".into()),
                Token::Flatten,
                Token::Or,
                Token::Identifier("b".into()),
                Token::Filter,
                Token::Identifier("c".into()),
                Token::RBracket,
                Token::Pipe,
                Token::Identifier("d".into()),
                Token::LBracket,
                Token::Number(0),
                Token::RBracket,
            ]
        );
        assert_eq!(kinds("<= >= != =="), vec![Token::Lte, Token::Gte, Token::Ne, Token::Eq]);
    }

    #[test]
    fn literals_and_strings() {
        assert_eq!(
            kinds(r#"`{"a": 1}` 'it\'s' "with space""#),
            vec![
                Token::Literal(json!({ "a": 1 })),
                Token::RawString("it's".into()),
                Token::QuotedIdentifier("with space".into()),
            ]
        );
        assert_eq!(kinds("-3"), vec![Token::Number(-3)]);
    }

    #[test]
    fn invalid_input_reports_offset() {
        let err = tokenize("a.b ^ c").unwrap_err();
        assert!(matches!(err, EvalError::Syntax { offset: 4, .. }));
        assert!(tokenize("`not json`").is_err());
    }
}
