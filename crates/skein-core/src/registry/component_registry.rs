//! In-memory registry of remotely callable targets.
//!
//! Targets are addressed two ways:
//! - by route: a normalized URI path plus a [`Verb`]
//! - by name: `component/method`
//!
//! Registration normally happens once at startup, but both tables sit behind
//! `RwLock`s so concurrent registration and lookup are safe.

use super::route::{normalize_path, Route, Verb};
use super::target::{Args, Callable, ParamSpec, Target};
use crate::{Result, RpcError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Outcome of a route lookup.
#[derive(Debug, Clone)]
pub enum RouteMatch {
    Found(Arc<Target>),
    /// The path is registered, but not for the requested verb.
    VerbNotSupported,
    NotFound,
}

/// Registration metadata for one remotely callable method.
pub struct MethodDescriptor {
    name: String,
    path: Option<String>,
    verb: Verb,
    params: Vec<ParamSpec>,
    callable: Option<Callable>,
}

impl MethodDescriptor {
    /// Describe a method. Defaults: path = method name, verb = GET.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            verb: Verb::Get,
            params: Vec::new(),
            callable: None,
        }
    }

    /// Path segment under the component's base path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn verb(mut self, verb: Verb) -> Self {
        self.verb = verb;
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Bind the method to a free-standing closure.
    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.callable = Some(Arc::new(f));
        self
    }

    /// Bind the method to a function operating on a shared instance.
    pub fn bind<T>(mut self, instance: Arc<T>, f: fn(&T, &Args) -> anyhow::Result<Value>) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.callable = Some(Arc::new(move |args: &Args| f(&instance, args)));
        self
    }
}

/// Registration metadata for a component and its methods.
pub struct ComponentDescriptor {
    name: String,
    base_path: Option<String>,
    methods: Vec<MethodDescriptor>,
}

impl ComponentDescriptor {
    /// Describe a component. Without a base path, method paths are used as-is.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_path: None,
            methods: Vec::new(),
        }
    }

    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }
}

/// Registry of targets by route and by name.
#[derive(Default)]
pub struct Registry {
    routes: RwLock<HashMap<String, HashMap<Verb, Arc<Target>>>>,
    named: RwLock<HashMap<String, Arc<Target>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn named_key(component: &str, method: &str) -> String {
        format!("{}/{}", component, method)
    }

    fn validate(target: &Target) -> Result<()> {
        if target.component().trim().is_empty() {
            return Err(RpcError::Config {
                message: format!("Method `{}` has no component name", target.method()),
            });
        }
        if target.method().trim().is_empty() {
            return Err(RpcError::Config {
                message: format!("Component `{}` declares a method without a name", target.component()),
            });
        }
        Ok(())
    }

    /// Register a target under a `(path, verb)` route. Last write wins.
    pub fn register_route(&self, route: Route, target: Arc<Target>) -> Result<()> {
        Self::validate(&target)?;
        if route.path.is_empty() {
            return Err(RpcError::Config {
                message: format!(
                    "Method `{}/{}` has no route path",
                    target.component(),
                    target.method()
                ),
            });
        }

        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let previous = routes
            .entry(route.path.clone())
            .or_default()
            .insert(route.verb, target);

        if previous.is_some() {
            warn!("Route {} re-registered, previous target replaced", route);
        } else {
            info!("Registered remote method: {}", route);
        }
        Ok(())
    }

    /// Register a target under its bare `component/method` name. Last write wins.
    pub fn register_named(&self, target: Arc<Target>) -> Result<()> {
        Self::validate(&target)?;
        let key = Self::named_key(target.component(), target.method());
        let mut named = self.named.write().unwrap_or_else(PoisonError::into_inner);
        if named.insert(key.clone(), target).is_some() {
            warn!("Named target {} re-registered, previous target replaced", key);
        } else {
            debug!("Registered named target {}", key);
        }
        Ok(())
    }

    /// Register every method of a component by route and by name.
    ///
    /// Returns the number of methods registered. Fails before touching the
    /// tables if any method lacks a name or a callable.
    pub fn register_component(&self, component: ComponentDescriptor) -> Result<usize> {
        if component.name.trim().is_empty() {
            return Err(RpcError::Config {
                message: "Component name must not be empty".to_string(),
            });
        }

        let mut prepared = Vec::with_capacity(component.methods.len());
        for method in component.methods {
            let callable = method.callable.ok_or_else(|| RpcError::Config {
                message: format!(
                    "Method `{}/{}` has no callable bound",
                    component.name, method.name
                ),
            })?;
            let method_path = method.path.unwrap_or_else(|| method.name.clone());
            let full_path = match &component.base_path {
                Some(base) if !normalize_path(base).is_empty() => {
                    format!("{}/{}", normalize_path(base), normalize_path(&method_path))
                }
                _ => method_path,
            };

            let target = Target::from_callable(&component.name, method.name, method.params, callable);
            Self::validate(&target)?;
            prepared.push((Route::new(&full_path, method.verb), Arc::new(target)));
        }

        let count = prepared.len();
        for (route, target) in prepared {
            self.register_route(route, target.clone())?;
            self.register_named(target)?;
        }
        Ok(count)
    }

    /// Resolve a path (surrounding slashes ignored) and verb.
    pub fn resolve_route(&self, path: &str, verb: Verb) -> RouteMatch {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        match routes.get(&normalize_path(path)) {
            None => RouteMatch::NotFound,
            Some(by_verb) => match by_verb.get(&verb) {
                Some(target) => RouteMatch::Found(target.clone()),
                None => RouteMatch::VerbNotSupported,
            },
        }
    }

    /// Resolve a target by component and method name.
    pub fn resolve_named(&self, component: &str, method: &str) -> Option<Arc<Target>> {
        let named = self.named.read().unwrap_or_else(PoisonError::into_inner);
        named.get(&Self::named_key(component, method)).cloned()
    }

    /// All registered routes, sorted for stable output.
    pub fn routes(&self) -> Vec<Route> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<Route> = routes
            .iter()
            .flat_map(|(path, by_verb)| {
                by_verb.keys().map(move |verb| Route {
                    path: path.clone(),
                    verb: *verb,
                })
            })
            .collect();
        all.sort_by(|a, b| a.path.cmp(&b.path).then(a.verb.as_str().cmp(b.verb.as_str())));
        all
    }

    /// All targets registered by name, sorted by `component/method`.
    pub fn named_targets(&self) -> Vec<Arc<Target>> {
        let named = self.named.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<&String> = named.keys().collect();
        keys.sort();
        keys.into_iter().map(|key| named[key].clone()).collect()
    }
}
