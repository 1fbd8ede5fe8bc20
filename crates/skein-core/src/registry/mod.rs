//! Target registry.
//!
//! Resolves route keys (`path` + `verb`) and bare `component/method` names to
//! callable [`Target`]s. Targets are registered explicitly at startup from
//! [`ComponentDescriptor`]s rather than discovered.

pub mod component_registry;
pub mod route;
pub mod target;

pub use component_registry::{ComponentDescriptor, MethodDescriptor, Registry, RouteMatch};
pub use route::{normalize_path, Route, Verb};
pub use target::{Arg, Args, Callable, ParamSpec, ParamType, Target};
