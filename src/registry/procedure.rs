//! Callable procedures and their argument helpers

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while a procedure runs
///
/// Arity and argument helpers raise these too; nothing is validated before
/// the procedure is entered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcedureError {
    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("missing argument {0}")]
    MissingArgument(usize),

    #[error("invalid argument {index} ({value:?}): {reason}")]
    InvalidArgument {
        index: usize,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Failed(String),
}

impl ProcedureError {
    /// Free-form failure raised by a procedure body
    pub fn failed(message: impl Into<String>) -> Self {
        ProcedureError::Failed(message.into())
    }
}

pub type ProcedureResult<T> = Result<T, ProcedureError>;

/// Positional string arguments of one call
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    values: &'a [String],
}

impl<'a> Args<'a> {
    pub fn new(values: &'a [String]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw argument at `index`
    pub fn raw(&self, index: usize) -> Option<&'a str> {
        self.values.get(index).map(String::as_str)
    }

    /// Parse the argument at `index`
    pub fn get<T>(&self, index: usize) -> ProcedureResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let value = self.raw(index).ok_or(ProcedureError::MissingArgument(index))?;
        value.parse().map_err(|e: T::Err| ProcedureError::InvalidArgument {
            index,
            value: value.to_string(),
            reason: e.to_string(),
        })
    }

    /// Fail unless exactly `expected` arguments were supplied
    pub fn expect_len(&self, expected: usize) -> ProcedureResult<()> {
        if self.values.len() != expected {
            return Err(ProcedureError::Arity {
                expected,
                got: self.values.len(),
            });
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> {
        let values = self.values;
        values.iter().map(String::as_str)
    }
}

/// Procedure body
pub type Handler = dyn Fn(Args<'_>) -> ProcedureResult<Value> + Send + Sync;

/// Declared parameter, used for introspection only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Option<String>,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty {
            Some(ty) => write!(f, "{}: {}", self.name, ty),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A named callable plus its declared signature
///
/// Cloning is cheap; the handler is shared.
#[derive(Clone)]
pub struct Procedure {
    name: String,
    params: Vec<Param>,
    returns: Option<String>,
    handler: Arc<Handler>,
}

impl Procedure {
    /// Create a procedure with no declared parameters
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Args<'_>) -> ProcedureResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
            handler: Arc::new(handler),
        }
    }

    /// Declare an untyped parameter
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty: None,
        });
        self
    }

    /// Declare a typed parameter
    pub fn typed_param(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty: Some(ty.into()),
        });
        self
    }

    /// Declare the return type
    pub fn returns(mut self, ty: impl Into<String>) -> Self {
        self.returns = Some(ty.into());
        self
    }

    /// Name the procedure registers under by default
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Human-readable descriptor, e.g. `div(x: f64, y: f64) -> f64`
    pub fn signature(&self, name: &str) -> String {
        let params = self
            .params
            .iter()
            .map(Param::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        match &self.returns {
            Some(ret) => format!("{}({}) -> {}", name, params, ret),
            None => format!("{}({})", name, params),
        }
    }

    /// Shared handle to the body, for running it on another thread
    pub fn handler(&self) -> Arc<Handler> {
        self.handler.clone()
    }

    /// Run the body on the current thread
    pub fn call(&self, arguments: &[String]) -> ProcedureResult<Value> {
        (*self.handler)(Args::new(arguments))
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn add() -> Procedure {
        Procedure::new("add", |args| {
            args.expect_len(2)?;
            let x: i64 = args.get(0)?;
            let y: i64 = args.get(1)?;
            Ok(json!(x + y))
        })
        .param("x")
        .param("y")
    }

    #[test]
    fn test_call_parses_arguments() {
        assert_eq!(add().call(&args(&["2", "3"])), Ok(json!(5)));
    }

    #[test]
    fn test_arity_mismatch_is_a_call_error() {
        assert_eq!(
            add().call(&args(&["1", "2", "3"])),
            Err(ProcedureError::Arity { expected: 2, got: 3 })
        );
    }

    #[test]
    fn test_invalid_argument() {
        let err = add().call(&args(&["2", "three"])).unwrap_err();
        assert!(matches!(err, ProcedureError::InvalidArgument { index: 1, .. }));
        assert!(err.to_string().contains("\"three\""));
    }

    #[test]
    fn test_missing_argument() {
        let values = args(&["1"]);
        let args = Args::new(&values);
        assert_eq!(args.get::<i64>(1), Err(ProcedureError::MissingArgument(1)));
        assert_eq!(args.raw(0), Some("1"));
    }

    #[test]
    fn test_signature_formatting() {
        assert_eq!(add().signature("add"), "add(x, y)");
        assert_eq!(add().signature("plus"), "plus(x, y)");

        let div = Procedure::new("div", |_| Ok(Value::Null))
            .typed_param("x", "f64")
            .typed_param("y", "f64")
            .returns("f64");
        assert_eq!(div.signature("div"), "div(x: f64, y: f64) -> f64");
        assert_eq!(
            div.params(),
            &[
                Param {
                    name: "x".to_string(),
                    ty: Some("f64".to_string()),
                },
                Param {
                    name: "y".to_string(),
                    ty: Some("f64".to_string()),
                },
            ]
        );

        let ping = Procedure::new("ping", |_| Ok(json!("pong")));
        assert_eq!(ping.signature("ping"), "ping()");
    }
}
