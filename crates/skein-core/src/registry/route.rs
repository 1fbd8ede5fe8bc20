//! Path-and-verb addressing.

use crate::RpcError;
use std::fmt;
use std::str::FromStr;

/// Closed set of verbs a route can be registered for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Verb {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::Patch => "PATCH",
            Verb::Head => "HEAD",
            Verb::Options => "OPTIONS",
        }
    }

    /// Whether a request body is read for this verb on the path+verb call path.
    pub fn carries_body(&self) -> bool {
        matches!(self, Verb::Post | Verb::Put)
    }
}

impl FromStr for Verb {
    type Err = RpcError;

    /// Case-insensitive parse of a verb token.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Verb::Get),
            "POST" => Ok(Verb::Post),
            "PUT" => Ok(Verb::Put),
            "DELETE" => Ok(Verb::Delete),
            "PATCH" => Ok(Verb::Patch),
            "HEAD" => Ok(Verb::Head),
            "OPTIONS" => Ok(Verb::Options),
            _ => Err(RpcError::UnrecognizedVerb(s.to_string())),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a route path: surrounding slashes are not significant.
pub fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// A `(path, verb)` registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub path: String,
    pub verb: Verb,
}

impl Route {
    pub fn new(path: &str, verb: Verb) -> Self {
        Self {
            path: normalize_path(path),
            verb,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} /{}", self.verb, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_roundtrip() {
        for verb in [
            Verb::Get,
            Verb::Post,
            Verb::Put,
            Verb::Delete,
            Verb::Patch,
            Verb::Head,
            Verb::Options,
        ] {
            let parsed: Verb = verb.as_str().parse().expect("Should parse");
            assert_eq!(verb, parsed);
        }
    }

    #[test]
    fn test_verb_parse_is_case_insensitive() {
        assert_eq!("get".parse::<Verb>().unwrap(), Verb::Get);
        assert_eq!("Post".parse::<Verb>().unwrap(), Verb::Post);
    }

    #[test]
    fn test_unknown_verb_is_rejected() {
        let err = "BREW".parse::<Verb>().unwrap_err();
        assert_eq!(err.kind(), "UnrecognizedVerb");
    }

    #[test]
    fn test_route_path_is_normalized() {
        assert_eq!(
            Route::new("/Random/randomInt/", Verb::Get),
            Route::new("Random/randomInt", Verb::Get)
        );
    }
}
