//! Parser for the declarative subset of the build language: assignments of
//! literals, lists, and scopes, plus `kind("name") { ... }` declarations and
//! argument-less directives. Expressions, imports, templates, and control
//! flow belong to the full frontend, which this crate treats as an external
//! collaborator.

use crate::core::source_file::SourceFile;
use crate::util::errors::{ErrorKind, GenError, Location, NgenResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Append,
}

#[derive(Clone, Debug)]
pub enum Expr {
    BoolLiteral(bool),
    IntLiteral(i64),
    StringLiteral(String),
    Ident(String),
    List(Vec<Expr>),
    ScopeBlock(Vec<Statement>),
}

#[derive(Clone, Debug)]
pub enum Statement {
    Assign {
        name: String,
        op: AssignOp,
        value: Expr,
        location: Location,
    },
    Call {
        function: String,
        args: Vec<Expr>,
        block: Option<Vec<Statement>>,
        location: Location,
    },
}

impl Statement {
    pub fn location(&self) -> &Location {
        match self {
            Statement::Assign { location, .. } => location,
            Statement::Call { location, .. } => location,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    Ident(String),
    String(String),
    Int(i64),
    True,
    False,
    Equals,
    PlusEquals,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Comma,
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    location: Location,
}

fn tokenize(input: &str, file: &SourceFile) -> NgenResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut line = 1usize;
    let mut column = 1usize;
    let mut chars = input.char_indices().peekable();

    let loc = |line, column| Location {
        file: *file,
        line,
        column,
    };

    while let Some((start, c)) = chars.next() {
        let token_loc = loc(line, column);
        match c {
            '\n' => {
                line += 1;
                column = 1;
                continue;
            }
            ' ' | '\t' | '\r' => {
                column += 1;
                continue;
            }
            '#' => {
                for (_, c2) in chars.by_ref() {
                    if c2 == '\n' {
                        line += 1;
                        column = 1;
                        break;
                    }
                }
                continue;
            }
            '"' => {
                let mut value = String::new();
                let mut consumed = 1;
                let mut terminated = false;
                while let Some((_, c2)) = chars.next() {
                    consumed += 1;
                    match c2 {
                        '"' => {
                            terminated = true;
                            break;
                        }
                        '\\' => {
                            let escaped = chars.next().map(|(_, e)| e).ok_or_else(|| {
                                parse_error("unterminated escape", token_loc.clone())
                            })?;
                            consumed += 1;
                            match escaped {
                                '"' => value.push('"'),
                                '\\' => value.push('\\'),
                                'n' => value.push('\n'),
                                other => {
                                    // Unknown escapes pass through; "$" and
                                    // friends are literal in this subset.
                                    value.push('\\');
                                    value.push(other);
                                }
                            }
                        }
                        '\n' => {
                            return Err(parse_error("newline in string literal", token_loc));
                        }
                        other => value.push(other),
                    }
                }
                if !terminated {
                    return Err(parse_error("unterminated string literal", token_loc));
                }
                tokens.push(Token {
                    kind: TokenKind::String(value),
                    location: token_loc,
                });
                column += consumed;
            }
            '=' => {
                tokens.push(Token {
                    kind: TokenKind::Equals,
                    location: token_loc,
                });
                column += 1;
            }
            '+' => {
                match chars.peek() {
                    Some((_, '=')) => {
                        chars.next();
                        tokens.push(Token {
                            kind: TokenKind::PlusEquals,
                            location: token_loc,
                        });
                        column += 2;
                    }
                    _ => return Err(parse_error("unexpected '+'", token_loc)),
                }
            }
            '{' => {
                tokens.push(Token {
                    kind: TokenKind::LeftBrace,
                    location: token_loc,
                });
                column += 1;
            }
            '}' => {
                tokens.push(Token {
                    kind: TokenKind::RightBrace,
                    location: token_loc,
                });
                column += 1;
            }
            '[' => {
                tokens.push(Token {
                    kind: TokenKind::LeftBracket,
                    location: token_loc,
                });
                column += 1;
            }
            ']' => {
                tokens.push(Token {
                    kind: TokenKind::RightBracket,
                    location: token_loc,
                });
                column += 1;
            }
            '(' => {
                tokens.push(Token {
                    kind: TokenKind::LeftParen,
                    location: token_loc,
                });
                column += 1;
            }
            ')' => {
                tokens.push(Token {
                    kind: TokenKind::RightParen,
                    location: token_loc,
                });
                column += 1;
            }
            ',' => {
                tokens.push(Token {
                    kind: TokenKind::Comma,
                    location: token_loc,
                });
                column += 1;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut end = start + c.len_utf8();
                while let Some((i, c2)) = chars.peek().copied() {
                    if c2.is_ascii_digit() {
                        end = i + c2.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &input[start..end];
                let value: i64 = text
                    .parse()
                    .map_err(|_| parse_error(&format!("bad integer \"{}\"", text), token_loc.clone()))?;
                tokens.push(Token {
                    kind: TokenKind::Int(value),
                    location: token_loc,
                });
                column += text.len();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start + c.len_utf8();
                while let Some((i, c2)) = chars.peek().copied() {
                    if c2.is_ascii_alphanumeric() || c2 == '_' {
                        end = i + c2.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &input[start..end];
                let kind = match text {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    _ => TokenKind::Ident(text.to_string()),
                };
                tokens.push(Token {
                    kind,
                    location: token_loc,
                });
                column += text.len();
            }
            other => {
                return Err(parse_error(
                    &format!("unexpected character '{}'", other),
                    token_loc,
                ));
            }
        }
    }
    Ok(tokens)
}

fn parse_error(message: &str, location: Location) -> anyhow::Error {
    GenError::new(ErrorKind::Parse, message.to_string())
        .at(Some(location))
        .into()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    eof_location: Location,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn here(&self) -> Location {
        self.peek()
            .map(|t| t.location.clone())
            .unwrap_or_else(|| self.eof_location.clone())
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> NgenResult<Token> {
        match self.next() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(parse_error(
                &format!("expected {} here", what),
                token.location,
            )),
            None => Err(parse_error(
                &format!("expected {}, got end of file", what),
                self.eof_location.clone(),
            )),
        }
    }

    fn parse_statements(&mut self, top_level: bool) -> NgenResult<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            match self.peek() {
                None => {
                    if !top_level {
                        return Err(parse_error(
                            "unterminated block",
                            self.eof_location.clone(),
                        ));
                    }
                    return Ok(statements);
                }
                Some(token) if token.kind == TokenKind::RightBrace => {
                    if top_level {
                        return Err(parse_error("unmatched '}'", token.location.clone()));
                    }
                    return Ok(statements);
                }
                _ => statements.push(self.parse_statement()?),
            }
        }
    }

    fn parse_statement(&mut self) -> NgenResult<Statement> {
        let token = self.next().expect("peeked before call");
        let location = token.location.clone();
        let name = match token.kind {
            TokenKind::Ident(name) => name,
            _ => return Err(parse_error("expected an identifier", location)),
        };

        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Equals) => {
                self.next();
                let value = self.parse_expr()?;
                Ok(Statement::Assign {
                    name,
                    op: AssignOp::Assign,
                    value,
                    location,
                })
            }
            Some(TokenKind::PlusEquals) => {
                self.next();
                let value = self.parse_expr()?;
                Ok(Statement::Assign {
                    name,
                    op: AssignOp::Append,
                    value,
                    location,
                })
            }
            Some(TokenKind::LeftParen) => {
                self.next();
                let mut args = Vec::new();
                loop {
                    match self.peek() {
                        Some(token) if token.kind == TokenKind::RightParen => {
                            self.next();
                            break;
                        }
                        Some(_) => {
                            args.push(self.parse_expr()?);
                            if let Some(token) = self.peek() {
                                if token.kind == TokenKind::Comma {
                                    self.next();
                                }
                            }
                        }
                        None => {
                            return Err(parse_error(
                                "unterminated argument list",
                                self.eof_location.clone(),
                            ))
                        }
                    }
                }
                let block = match self.peek() {
                    Some(token) if token.kind == TokenKind::LeftBrace => {
                        self.next();
                        let statements = self.parse_statements(false)?;
                        self.expect(TokenKind::RightBrace, "'}'")?;
                        Some(statements)
                    }
                    _ => None,
                };
                Ok(Statement::Call {
                    function: name,
                    args,
                    block,
                    location,
                })
            }
            _ => Err(parse_error(
                "expected '=', '+=', or '(' after identifier",
                self.here(),
            )),
        }
    }

    fn parse_expr(&mut self) -> NgenResult<Expr> {
        let token = match self.next() {
            Some(token) => token,
            None => {
                return Err(parse_error(
                    "expected a value, got end of file",
                    self.eof_location.clone(),
                ))
            }
        };
        match token.kind {
            TokenKind::True => Ok(Expr::BoolLiteral(true)),
            TokenKind::False => Ok(Expr::BoolLiteral(false)),
            TokenKind::Int(i) => Ok(Expr::IntLiteral(i)),
            TokenKind::String(s) => Ok(Expr::StringLiteral(s)),
            TokenKind::Ident(name) => Ok(Expr::Ident(name)),
            TokenKind::LeftBracket => {
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        Some(t) if t.kind == TokenKind::RightBracket => {
                            self.next();
                            break;
                        }
                        Some(_) => {
                            items.push(self.parse_expr()?);
                            if let Some(t) = self.peek() {
                                if t.kind == TokenKind::Comma {
                                    self.next();
                                }
                            }
                        }
                        None => {
                            return Err(parse_error(
                                "unterminated list",
                                self.eof_location.clone(),
                            ))
                        }
                    }
                }
                Ok(Expr::List(items))
            }
            TokenKind::LeftBrace => {
                let statements = self.parse_statements(false)?;
                self.expect(TokenKind::RightBrace, "'}'")?;
                Ok(Expr::ScopeBlock(statements))
            }
            _ => Err(parse_error("expected a value", token.location)),
        }
    }
}

/// Parses one build file into statements.
pub fn parse_file(input: &str, file: &SourceFile) -> NgenResult<Vec<Statement>> {
    let tokens = tokenize(input, file)?;
    let eof_location = Location {
        file: *file,
        line: input.lines().count().max(1),
        column: 1,
    };
    let mut parser = Parser {
        tokens,
        pos: 0,
        eof_location,
    };
    parser.parse_statements(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<Statement> {
        parse_file(input, &SourceFile::new("//BUILD.gn")).unwrap()
    }

    #[test]
    fn assignments_and_lists() {
        let statements = parse(
            r#"
            # A comment.
            enable_foo = true
            sources = [ "a.cc", "b.cc" ]
            count = 42
            "#,
        );
        assert_eq!(statements.len(), 3);
        match &statements[1] {
            Statement::Assign { name, value, .. } => {
                assert_eq!(name, "sources");
                assert!(matches!(value, Expr::List(items) if items.len() == 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn declarations() {
        let statements = parse(
            r#"
            executable("foo") {
              sources = [ "foo.cc" ]
              deps = [ "//bar" ]
            }
            set_default_toolchain("//tc:gcc")
            "#,
        );
        assert_eq!(statements.len(), 2);
        match &statements[0] {
            Statement::Call {
                function, block, ..
            } => {
                assert_eq!(function, "executable");
                assert_eq!(block.as_ref().unwrap().len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &statements[1] {
            Statement::Call { function, block, .. } => {
                assert_eq!(function, "set_default_toolchain");
                assert!(block.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn nested_scopes() {
        let statements = parse(
            r#"
            toolchain("gcc") {
              tool("cc") {
                command = "gcc -c {{source}}"
              }
              toolchain_args = {
                is_host = true
              }
            }
            "#,
        );
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn errors_carry_location() {
        let err = parse_file("foo = [\n  %bad\n]", &SourceFile::new("//BUILD.gn")).unwrap_err();
        let gen = err.downcast_ref::<GenError>().unwrap();
        assert_eq!(gen.kind, ErrorKind::Parse);
        assert_eq!(gen.location.as_ref().unwrap().line, 2);
    }

    #[test]
    fn string_escapes() {
        let statements = parse(r#"x = "a\"b\\c""#);
        match &statements[0] {
            Statement::Assign { value, .. } => match value {
                Expr::StringLiteral(s) => assert_eq!(s, "a\"b\\c"),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
