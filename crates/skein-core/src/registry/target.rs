//! Callable targets and their parameter descriptors.

use crate::{Result, RpcError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Function invoked when a target is called.
///
/// The closure captures the owning instance, so the instance lives as long as
/// the registry that holds the target.
pub type Callable = Arc<dyn Fn(&Args) -> anyhow::Result<Value> + Send + Sync>;

/// Semantic type of a declared parameter. Drives argument coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    Bool,
    Str,
    /// Raw JSON value, only accepted on the positional call path
    Json,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Int => "int",
            ParamType::Long => "long",
            ParamType::Float => "float",
            ParamType::Double => "double",
            ParamType::Bool => "boolean",
            ParamType::Str => "string",
            ParamType::Json => "json",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared parameter: an optional explicit name plus its semantic type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: Option<String>,
    pub ty: ParamType,
}

impl ParamSpec {
    /// Parameter addressed by an explicit name.
    pub fn named(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }

    /// Parameter whose name is inferred from its position (`arg0`, `arg1`, ...).
    pub fn positional(ty: ParamType) -> Self {
        Self { name: None, ty }
    }
}

/// A decoded, statically typed argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(String),
    Json(Value),
}

impl Arg {
    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Null)
    }
}

/// Ordered argument list handed to a target, with the parameter names used
/// for error reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    names: Vec<String>,
    values: Vec<Arg>,
}

macro_rules! typed_accessor {
    ($fn_name:ident, $variant:ident, $ty:ty, $label:literal) => {
        #[doc = concat!("Get argument `index` as ", $label, ", failing on null or a mismatched type.")]
        pub fn $fn_name(&self, index: usize) -> Result<$ty> {
            match self.require(index)? {
                Arg::$variant(v) => Ok(v.clone()),
                other => Err(RpcError::Invocation(format!(
                    "Argument `{}` is not {}: {:?}",
                    self.name(index),
                    $label,
                    other
                ))),
            }
        }
    };
}

impl Args {
    pub fn new(names: Vec<String>, values: Vec<Arg>) -> Self {
        Self { names, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Arg] {
        &self.values
    }

    fn name(&self, index: usize) -> String {
        self.names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("arg{}", index))
    }

    fn require(&self, index: usize) -> Result<&Arg> {
        match self.values.get(index) {
            Some(arg) if !arg.is_null() => Ok(arg),
            _ => Err(RpcError::NullArgument(self.name(index))),
        }
    }

    typed_accessor!(int, Int, i32, "an int");
    typed_accessor!(long, Long, i64, "a long");
    typed_accessor!(float, Float, f32, "a float");
    typed_accessor!(double, Double, f64, "a double");
    typed_accessor!(boolean, Bool, bool, "a boolean");
    typed_accessor!(string, Str, String, "a string");
    typed_accessor!(json, Json, Value, "a JSON value");
}

/// A registered callable unit: component, method, declared parameters and
/// the callable bound to its owning instance. Immutable once built.
#[derive(Clone)]
pub struct Target {
    component: String,
    method: String,
    params: Vec<ParamSpec>,
    callable: Callable,
}

impl Target {
    pub fn new<F>(
        component: impl Into<String>,
        method: impl Into<String>,
        params: Vec<ParamSpec>,
        callable: F,
    ) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::from_callable(component, method, params, Arc::new(callable))
    }

    pub fn from_callable(
        component: impl Into<String>,
        method: impl Into<String>,
        params: Vec<ParamSpec>,
        callable: Callable,
    ) -> Self {
        Self {
            component: component.into(),
            method: method.into(),
            params,
            callable,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Name used to look up parameter `index` in query strings and bodies.
    pub fn param_name(&self, index: usize) -> String {
        self.params
            .get(index)
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| format!("arg{}", index))
    }

    /// Names of all declared parameters, in order.
    pub fn param_names(&self) -> Vec<String> {
        (0..self.params.len()).map(|i| self.param_name(i)).collect()
    }

    /// Call the target. Whatever the callable raises becomes an `RpcError`.
    pub fn invoke(&self, args: &Args) -> Result<Value> {
        (self.callable)(args).map_err(RpcError::from_invocation)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("component", &self.component)
            .field("method", &self.method)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
