//! Expression parser for the `{{ ... }}` template language
//!
//! The grammar is tiny: an expression is a field path, a literal, a function
//! call with literal/path arguments, or a `|` pipeline of those. Arguments
//! are not nested calls.

use super::TemplateError;

/// A parsed function invocation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub name: String,
    pub args: Vec<Expr>,
}

/// One template expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    /// `.A.B.C` - an empty path is `.`, the whole context.
    Path(Vec<String>),
    Str(String),
    Int(i64),
    Call(Call),
    /// `expr | f1 | f2 arg` - the running value is appended as the last
    /// argument of each stage, Go style.
    Pipeline { first: Box<Expr>, stages: Vec<Call> },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Pipe,
    Str(String),
    Int(i64),
    Ident(String),
    Path(Vec<String>),
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '/'
}

fn tokenize(src: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '|' {
            chars.next();
            tokens.push(Token::Pipe);
        } else if c == '"' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some(other) => s.push(other),
                        None => {
                            return Err(TemplateError::Parse(format!(
                                "unterminated string in {src:?}"
                            )))
                        }
                    },
                    Some(other) => s.push(other),
                    None => {
                        return Err(TemplateError::Parse(format!(
                            "unterminated string in {src:?}"
                        )))
                    }
                }
            }
            tokens.push(Token::Str(s));
        } else if c == '.' {
            chars.next();
            let mut path = Vec::new();
            loop {
                let mut segment = String::new();
                while let Some(&c) = chars.peek() {
                    if is_ident_char(c) {
                        segment.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if segment.is_empty() {
                    if !path.is_empty() {
                        return Err(TemplateError::Parse(format!(
                            "empty path segment in {src:?}"
                        )));
                    }
                    break;
                }
                path.push(segment);
                if chars.peek() == Some(&'.') {
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Path(path));
        } else if c == '-' || c.is_ascii_digit() {
            let mut num = String::new();
            num.push(c);
            chars.next();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    num.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num
                .parse::<i64>()
                .map_err(|_| TemplateError::Parse(format!("invalid integer {num:?}")))?;
            tokens.push(Token::Int(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(ident));
        } else {
            return Err(TemplateError::Parse(format!(
                "unexpected character {c:?} in {src:?}"
            )));
        }
    }

    Ok(tokens)
}

/// An argument may be a literal or a field path, never a nested call.
fn parse_arg(token: &Token, src: &str) -> Result<Expr, TemplateError> {
    match token {
        Token::Path(p) => Ok(Expr::Path(p.clone())),
        Token::Str(s) => Ok(Expr::Str(s.clone())),
        Token::Int(i) => Ok(Expr::Int(*i)),
        Token::Ident(name) => Err(TemplateError::Parse(format!(
            "unexpected identifier {name:?} as argument in {src:?}"
        ))),
        Token::Pipe => Err(TemplateError::Parse(format!("unexpected '|' in {src:?}"))),
    }
}

/// A pipeline stage must be a function call.
fn parse_call(tokens: &[Token], src: &str) -> Result<Call, TemplateError> {
    match tokens.split_first() {
        Some((Token::Ident(name), rest)) => {
            let args = rest
                .iter()
                .map(|t| parse_arg(t, src))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Call {
                name: name.clone(),
                args,
            })
        }
        _ => Err(TemplateError::Parse(format!(
            "expected function call in {src:?}"
        ))),
    }
}

/// The leading stage may additionally be a bare path or literal.
fn parse_first(tokens: &[Token], src: &str) -> Result<Expr, TemplateError> {
    match tokens {
        [] => Err(TemplateError::Parse(format!("empty expression in {src:?}"))),
        [single] if !matches!(single, Token::Ident(_)) => parse_arg(single, src),
        _ => Ok(Expr::Call(parse_call(tokens, src)?)),
    }
}

/// Parse the inside of one `{{ ... }}` block.
pub(crate) fn parse_expr(src: &str) -> Result<Expr, TemplateError> {
    let tokens = tokenize(src)?;

    let mut stages: Vec<&[Token]> = Vec::new();
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if *token == Token::Pipe {
            stages.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    stages.push(&tokens[start..]);

    let first = parse_first(stages[0], src)?;
    if stages.len() == 1 {
        return Ok(first);
    }

    let calls = stages[1..]
        .iter()
        .map(|stage| parse_call(stage, src))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Expr::Pipeline {
        first: Box::new(first),
        stages: calls,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path() {
        let expr = parse_expr(".InvolvedObject.Kind").unwrap();
        assert_eq!(
            expr,
            Expr::Path(vec!["InvolvedObject".to_string(), "Kind".to_string()])
        );
    }

    #[test]
    fn test_parse_dot_is_empty_path() {
        assert_eq!(parse_expr(".").unwrap(), Expr::Path(vec![]));
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(
            parse_expr(r#""hello \"world\"""#).unwrap(),
            Expr::Str("hello \"world\"".to_string())
        );
        assert_eq!(parse_expr("42").unwrap(), Expr::Int(42));
        assert_eq!(parse_expr("-3").unwrap(), Expr::Int(-3));
    }

    #[test]
    fn test_parse_call_with_args() {
        let expr = parse_expr(r#"default "unknown" .Reason"#).unwrap();
        assert_eq!(
            expr,
            Expr::Call(Call {
                name: "default".to_string(),
                args: vec![
                    Expr::Str("unknown".to_string()),
                    Expr::Path(vec!["Reason".to_string()]),
                ],
            })
        );
    }

    #[test]
    fn test_parse_pipeline() {
        let expr = parse_expr(r#".Message | upper | replace "A" "B""#).unwrap();
        match expr {
            Expr::Pipeline { first, stages } => {
                assert_eq!(*first, Expr::Path(vec!["Message".to_string()]));
                assert_eq!(stages.len(), 2);
                assert_eq!(stages[0].name, "upper");
                assert!(stages[0].args.is_empty());
                assert_eq!(stages[1].name, "replace");
                assert_eq!(stages[1].args.len(), 2);
            }
            other => panic!("expected pipeline, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_zero_arg_call() {
        assert_eq!(
            parse_expr("now").unwrap(),
            Expr::Call(Call {
                name: "now".to_string(),
                args: vec![],
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_expr("").is_err());
        assert!(parse_expr(r#""unterminated"#).is_err());
        assert!(parse_expr(".Message |").is_err());
        assert!(parse_expr(".A..B").is_err());
        assert!(parse_expr(".Message | \"text\"").is_err());
    }
}
