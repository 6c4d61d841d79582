//! Text form of the expressions the DSL accepts in predicates, projections
//! and sort keys.
//!
//! ```text
//! region = 'eu' AND (a = b OR price > 10.5)
//! lower(name) AS lname
//! ts DESC
//! ```

use locus_core::dag::SortKey;
use locus_core::error::{Error, Result};
use locus_core::schema::DataType;
use locus_core::types::{BinaryOp, Expr, Scalar};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Sym(&'static str),
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '.' | '$')) {
                i += 1;
            }
            out.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let tok = if text.contains('.') {
                text.parse().map(Token::Float).map_err(|_| bad_number(&text))?
            } else {
                text.parse().map(Token::Int).map_err(|_| bad_number(&text))?
            };
            out.push(tok);
        } else if c == '\'' {
            let mut s = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(Error::Parse(format!("unterminated string in '{src}'"))),
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                        s.push('\'');
                        i += 2;
                    }
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        s.push(*ch);
                        i += 1;
                    }
                }
            }
            out.push(Token::Str(s));
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            let sym = match two.as_str() {
                "!=" | "<>" => Some("!="),
                "<=" => Some("<="),
                ">=" => Some(">="),
                _ => None,
            };
            if let Some(s) = sym {
                out.push(Token::Sym(s));
                i += 2;
                continue;
            }
            let sym = match c {
                '=' => "=",
                '<' => "<",
                '>' => ">",
                '+' => "+",
                '-' => "-",
                '*' => "*",
                '/' => "/",
                '(' => "(",
                ')' => ")",
                ',' => ",",
                other => {
                    return Err(Error::Parse(format!(
                        "unexpected character '{other}' in '{src}'"
                    )))
                }
            };
            out.push(Token::Sym(sym));
            i += 1;
        }
    }
    Ok(out)
}

fn bad_number(text: &str) -> Error {
    Error::Parse(format!("bad number '{text}'"))
}

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Result<Self> {
        Ok(Self {
            src,
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(kw))
    }

    fn at_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Some(Token::Sym(s)) if *s == sym)
    }

    fn expect_sym(&mut self, sym: &str) -> Result<()> {
        if self.at_sym(sym) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{sym}'")))
        }
    }

    fn error(&self, what: &str) -> Error {
        Error::Parse(format!("{what} at token {} of '{}'", self.pos, self.src))
    }

    fn done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn expr(&mut self) -> Result<Expr> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr> {
        let mut left = self.and()?;
        while self.at_keyword("or") {
            self.pos += 1;
            let right = self.and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut left = self.comparison()?;
        while self.at_keyword("and") {
            self.pos += 1;
            let right = self.comparison()?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Sym("=")) => BinaryOp::Eq,
            Some(Token::Sym("!=")) => BinaryOp::NotEq,
            Some(Token::Sym("<")) => BinaryOp::Lt,
            Some(Token::Sym("<=")) => BinaryOp::LtEq,
            Some(Token::Sym(">")) => BinaryOp::Gt,
            Some(Token::Sym(">=")) => BinaryOp::GtEq,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(Expr::binary(op, left, right))
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym("+")) => BinaryOp::Plus,
                Some(Token::Sym("-")) => BinaryOp::Minus,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.primary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym("*")) => BinaryOp::Multiply,
                Some(Token::Sym("/")) => BinaryOp::Divide,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.primary()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Int(v)) => Ok(Expr::lit(Scalar::I64(v))),
            Some(Token::Float(v)) => Ok(Expr::lit(Scalar::F64(v))),
            Some(Token::Str(s)) => Ok(Expr::lit(Scalar::Str(s))),
            Some(Token::Sym("-")) => match self.next() {
                Some(Token::Int(v)) => Ok(Expr::lit(Scalar::I64(-v))),
                Some(Token::Float(v)) => Ok(Expr::lit(Scalar::F64(-v))),
                _ => Err(self.error("expected a number after '-'")),
            },
            Some(Token::Sym("(")) => {
                let e = self.expr()?;
                self.expect_sym(")")?;
                Ok(e)
            }
            Some(Token::Ident(id)) => {
                match id.to_ascii_lowercase().as_str() {
                    "true" => return Ok(Expr::lit(Scalar::Bool(true))),
                    "false" => return Ok(Expr::lit(Scalar::Bool(false))),
                    "null" => return Ok(Expr::lit(Scalar::Null)),
                    _ => {}
                }
                if !self.at_sym("(") {
                    return Ok(Expr::col(id));
                }
                self.pos += 1;
                let mut args = Vec::new();
                if !self.at_sym(")") {
                    loop {
                        args.push(self.expr()?);
                        if self.at_sym(",") {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect_sym(")")?;
                Ok(Expr::Call {
                    func: id,
                    args,
                    return_type: DataType::Utf8,
                })
            }
            _ => Err(self.error("expected an expression")),
        }
    }
}

/// Parse one scalar expression.
pub fn parse_expr(src: &str) -> Result<Expr> {
    let mut p = Parser::new(src)?;
    let e = p.expr()?;
    if !p.done() {
        return Err(p.error("trailing input"));
    }
    Ok(e)
}

/// `expr [AS name]`; a bare column keeps its own name.
pub fn parse_projection(src: &str) -> Result<(Expr, String)> {
    let mut p = Parser::new(src)?;
    let e = p.expr()?;
    let name = if p.at_keyword("as") {
        p.pos += 1;
        match p.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err(p.error("expected a name after AS")),
        }
    } else {
        match &e {
            Expr::Column(c) => c.clone(),
            _ => return Err(p.error("computed column needs AS name")),
        }
    };
    if !p.done() {
        return Err(p.error("trailing input"));
    }
    Ok((e, name))
}

/// `column [ASC|DESC] [NULLS FIRST|NULLS LAST]`.
pub fn parse_sort_key(src: &str) -> Result<SortKey> {
    let mut p = Parser::new(src)?;
    let column = match p.next() {
        Some(Token::Ident(c)) => c,
        _ => return Err(p.error("expected a column")),
    };
    let mut key = SortKey::asc(column);
    if p.at_keyword("desc") {
        p.pos += 1;
        key.descending = true;
    } else if p.at_keyword("asc") {
        p.pos += 1;
    }
    if p.at_keyword("nulls") {
        p.pos += 1;
        if p.at_keyword("first") {
            key.nulls_first = true;
        } else if !p.at_keyword("last") {
            return Err(p.error("expected FIRST or LAST"));
        }
        p.pos += 1;
    }
    if !p.done() {
        return Err(p.error("trailing input"));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence() {
        let e = parse_expr("a = b AND c = 'x' OR d > 1").unwrap();
        assert_eq!(e.to_string(), "(((a = b) AND (c = 'x')) OR (d > 1))");
    }

    #[test]
    fn equalities_survive_parsing() {
        let e = parse_expr("a = b AND region = 'eu'").unwrap();
        assert_eq!(e.equalities().len(), 2);
    }

    #[test]
    fn projections() {
        assert_eq!(parse_projection("a").unwrap(), (Expr::col("a"), "a".into()));
        assert_eq!(parse_projection("a AS b").unwrap().1, "b");
        assert!(parse_projection("a + 1").is_err());
        let (e, n) = parse_projection("lower(name) as lname").unwrap();
        assert!(matches!(e, Expr::Call { .. }));
        assert_eq!(n, "lname");
    }

    #[test]
    fn sort_keys() {
        let k = parse_sort_key("ts DESC NULLS FIRST").unwrap();
        assert!(k.descending && k.nulls_first);
        assert!(!parse_sort_key("ts").unwrap().descending);
        assert!(parse_sort_key("ts sideways").is_err());
    }

    #[test]
    fn string_escapes_and_errors() {
        assert_eq!(
            parse_expr("n = 'it''s'").unwrap(),
            Expr::eq(Expr::col("n"), Expr::lit(Scalar::Str("it's".into())))
        );
        assert!(parse_expr("n = 'open").is_err());
        assert!(parse_expr("a = ").is_err());
    }
}
