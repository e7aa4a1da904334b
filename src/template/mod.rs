//! Minimal Go-compatible template engine
//!
//! Renders the `{{ ... }}` layouts and header values carried over from
//! legacy exporter configurations: field traversal over a context map,
//! string/integer literals, a fixed function vocabulary and `|` pipelines.
//!
//! ```
//! use kubesee::template::{render, Context};
//! use serde_json::json;
//!
//! let ctx = Context::new(json!({"Message": "Pod created"}));
//! assert_eq!(render("msg={{ .Message | upper }}", &ctx).unwrap(), "msg=POD CREATED");
//! ```

mod functions;
mod parser;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use parser::{parse_expr, Call, Expr};

/// Template failure. Callers decide whether it is fatal; header rendering in
/// sinks deliberately swallows it.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),

    #[error("unknown template function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("template render error: {0}")]
    Render(String),
}

/// A lazily evaluated context entry, invoked when a field path reads it.
pub type Callable = Arc<dyn Fn() -> Value + Send + Sync>;

/// The data a template renders against: a JSON value traversed by field
/// paths, plus root-level callable entries. Callables never appear in the
/// JSON value itself, so `toJson` strips them by construction.
#[derive(Clone, Default)]
pub struct Context {
    root: Value,
    callables: HashMap<String, Callable>,
}

impl Context {
    pub fn new(root: Value) -> Self {
        Self {
            root,
            callables: HashMap::new(),
        }
    }

    /// Register a zero-argument function reachable as a root-level field.
    pub fn with_callable<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.callables.insert(name.into(), Arc::new(f));
        self
    }

    /// Resolve a field path. Missing keys yield nil; a root-level callable
    /// leaf is invoked on read.
    fn lookup(&self, path: &[String]) -> Value {
        if let [name] = path {
            if let Some(callable) = self.callables.get(name) {
                return callable();
            }
        }

        let mut current = &self.root;
        for segment in path {
            match current {
                Value::Object(map) => match map.get(segment) {
                    Some(next) => current = next,
                    None => return Value::Null,
                },
                _ => return Value::Null,
            }
        }
        current.clone()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("root", &self.root)
            .field("callables", &self.callables.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A parsed template: literal text interleaved with expressions.
#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Expr(Expr),
}

fn split_segments(template: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(Segment::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::Parse(format!("unclosed '{{{{' in {template:?}")))?;
        segments.push(Segment::Expr(parse_expr(after[..end].trim())?));
        rest = &after[end + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }

    Ok(segments)
}

fn eval(expr: &Expr, ctx: &Context) -> Result<Value, TemplateError> {
    match expr {
        Expr::Path(path) => Ok(ctx.lookup(path)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Int(i) => Ok(Value::Number((*i).into())),
        Expr::Call(call) => eval_call(call, None, ctx),
        Expr::Pipeline { first, stages } => {
            let mut value = eval(first, ctx)?;
            for stage in stages {
                value = eval_call(stage, Some(value), ctx)?;
            }
            Ok(value)
        }
    }
}

/// Evaluate one call; a piped value is appended as the last argument.
fn eval_call(call: &Call, piped: Option<Value>, ctx: &Context) -> Result<Value, TemplateError> {
    let mut args = call
        .args
        .iter()
        .map(|arg| eval(arg, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(value) = piped {
        args.push(value);
    }
    functions::call(&call.name, &args)
}

/// Render a template string against a context.
pub fn render(template: &str, ctx: &Context) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for segment in split_segments(template)? {
        match segment {
            Segment::Text(text) => out.push_str(&text),
            Segment::Expr(expr) => out.push_str(&functions::display(&eval(&expr, ctx)?)),
        }
    }
    Ok(out)
}

/// Render every string leaf of a nested layout as a template, preserving the
/// map/list structure. Non-string scalars pass through unchanged; the first
/// failing leaf aborts the walk.
pub fn render_layout(layout: &Value, ctx: &Context) -> Result<Value, TemplateError> {
    match layout {
        Value::String(template) => Ok(Value::String(render(template, ctx)?)),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), render_layout(value, ctx)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(list) => list.iter().map(|v| render_layout(v, ctx)).collect(),
        other => Ok(other.clone()),
    }
}
