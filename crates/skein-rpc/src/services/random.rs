//! Demo component producing random integers, passwords and usernames.

use rand::Rng;
use serde_json::{json, Value};
use skein_core::{Args, ComponentDescriptor, MethodDescriptor, ParamSpec, ParamType};
use std::sync::Arc;

const PASSWORD_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const USERNAMES: [&str; 5] = ["Alice", "Bob", "Charlie", "David", "Eve"];

/// Stateless random value generator.
#[derive(Debug, Default)]
pub struct RandomService;

impl RandomService {
    /// Registration metadata: every method is a GET under `Random/`.
    pub fn descriptor(instance: Arc<Self>) -> ComponentDescriptor {
        ComponentDescriptor::new("Random")
            .base_path("Random")
            .method(
                MethodDescriptor::new("randomInt")
                    .param(ParamSpec::named("min", ParamType::Int))
                    .param(ParamSpec::named("max", ParamType::Int))
                    .bind(instance.clone(), |svc, args| {
                        Ok(json!(svc.random_int(args.int(0)?, args.int(1)?)))
                    }),
            )
            .method(
                MethodDescriptor::new("randomPassword")
                    .param(ParamSpec::named("length", ParamType::Int))
                    .bind(instance.clone(), |svc, args| {
                        Ok(json!(svc.random_password(args.int(0)?)))
                    }),
            )
            .method(
                MethodDescriptor::new("randomUsername")
                    .bind(instance, |svc, _args: &Args| Ok(Value::from(svc.random_username()))),
            )
    }

    /// Uniform integer in `[min, max]`.
    ///
    /// Computed as `trunc(u * (max - min + 1)) + min` for `u` in `[0, 1)`, so
    /// `min > max` still yields a value instead of failing.
    pub fn random_int(&self, min: i32, max: i32) -> i32 {
        let span = i64::from(max) - i64::from(min) + 1;
        let offset = (rand::rng().random::<f64>() * span as f64) as i64;
        (offset + i64::from(min)) as i32
    }

    /// Alphanumeric password of `length` characters; non-positive lengths give "".
    pub fn random_password(&self, length: i32) -> String {
        let mut rng = rand::rng();
        (0..length.max(0))
            .map(|_| PASSWORD_CHARSET[rng.random_range(0..PASSWORD_CHARSET.len())] as char)
            .collect()
    }

    pub fn random_username(&self) -> &'static str {
        USERNAMES[rand::rng().random_range(0..USERNAMES.len())]
    }
}
