#![forbid(unsafe_code)]

//! The template-evaluator boundary.
//!
//! Configuration fields may contain template expressions evaluated against
//! live entity state (and, for dials, the dial's own local value). The
//! evaluator itself is external; this module defines the contract: source
//! string + context in, rendered string or failure out.
//!
//! Template-eligible fields are represented as [`Templated`], a tagged
//! literal-or-template value classified once at deserialization. Which
//! fields are eligible is fixed by the model types, never decided by name
//! at runtime.

use crate::state::StateCache;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to evaluate a template expression.
///
/// Always recoverable: the resolver degrades the affected field to a safe
/// default and logs a warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("template error: {0}")]
pub struct TemplateError(pub String);

/// The dial-local values exposed to template evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DialSnapshot {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl DialSnapshot {
    /// Look up one of the snapshot fields by its template-visible name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<f64> {
        match name {
            "state" => Some(self.value),
            "min" => Some(self.min),
            "max" => Some(self.max),
            "step" => Some(self.step),
            _ => None,
        }
    }
}

/// Read-only context a template is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub states: &'a StateCache,
    pub dial: Option<DialSnapshot>,
}

impl<'a> TemplateContext<'a> {
    #[must_use]
    pub fn new(states: &'a StateCache) -> Self {
        Self { states, dial: None }
    }

    #[must_use]
    pub fn with_dial(states: &'a StateCache, dial: DialSnapshot) -> Self {
        Self {
            states,
            dial: Some(dial),
        }
    }
}

/// External template evaluator: source + context → rendered string.
pub trait TemplateEngine {
    fn render(&self, source: &str, ctx: &TemplateContext<'_>) -> Result<String, TemplateError>;
}

/// An engine that returns every source verbatim.
///
/// For template-free configurations and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughEngine;

impl TemplateEngine for PassthroughEngine {
    fn render(&self, source: &str, _ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
        Ok(source.to_owned())
    }
}

/// A string field that is either a literal or a template source.
///
/// Classified once, at deserialization: anything containing a Jinja
/// expression or statement marker is a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Templated {
    Literal(String),
    Template(String),
}

impl Templated {
    /// Classify a raw string.
    #[must_use]
    pub fn classify(raw: String) -> Self {
        if raw.contains("{{") || raw.contains("{%") {
            Self::Template(raw)
        } else {
            Self::Literal(raw)
        }
    }

    /// The literal value, if this is not a template.
    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(s) => Some(s),
            Self::Template(_) => None,
        }
    }

    /// The raw source text, template or not.
    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            Self::Literal(s) | Self::Template(s) => s,
        }
    }

    /// Evaluate through the engine boundary.
    ///
    /// Literals never touch the engine.
    pub fn resolve(
        &self,
        engine: &dyn TemplateEngine,
        ctx: &TemplateContext<'_>,
    ) -> Result<String, TemplateError> {
        match self {
            Self::Literal(s) => Ok(s.clone()),
            Self::Template(src) => engine.render(src, ctx),
        }
    }
}

impl From<&str> for Templated {
    fn from(s: &str) -> Self {
        Self::classify(s.to_owned())
    }
}

impl Serialize for Templated {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.source())
    }
}

impl<'de> Deserialize<'de> for Templated {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::classify(raw))
    }
}

/// A delay field: a fixed number of seconds or a template evaluating to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Delay {
    Seconds(f64),
    Expression(Templated),
}

impl Default for Delay {
    fn default() -> Self {
        Self::Seconds(0.0)
    }
}

impl Delay {
    /// Resolve to seconds. A template must evaluate to a number.
    pub fn resolve(
        &self,
        engine: &dyn TemplateEngine,
        ctx: &TemplateContext<'_>,
    ) -> Result<f64, TemplateError> {
        match self {
            Self::Seconds(s) => Ok(*s),
            Self::Expression(t) => {
                let rendered = t.resolve(engine, ctx)?;
                rendered
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| TemplateError(format!("delay is not a number: {rendered:?}")))
            }
        }
    }

    /// Whether this delay is statically known to be zero.
    #[must_use]
    pub fn is_statically_zero(&self) -> bool {
        matches!(self, Self::Seconds(s) if *s <= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(matches!(Templated::from("plain text"), Templated::Literal(_)));
        assert!(matches!(
            Templated::from("{{ states('light.x') }}"),
            Templated::Template(_)
        ));
        assert!(matches!(
            Templated::from("{% if a %}b{% endif %}"),
            Templated::Template(_)
        ));
    }

    #[test]
    fn literal_never_calls_engine() {
        struct Exploding;
        impl TemplateEngine for Exploding {
            fn render(&self, _: &str, _: &TemplateContext<'_>) -> Result<String, TemplateError> {
                panic!("engine must not be called for literals")
            }
        }
        let cache = StateCache::new();
        let ctx = TemplateContext::new(&cache);
        let t = Templated::from("hello");
        assert_eq!(t.resolve(&Exploding, &ctx).unwrap(), "hello");
    }

    #[test]
    fn delay_from_yaml_number_and_string() {
        let d: Delay = serde_json::from_value(serde_json::json!(2.5)).unwrap();
        assert_eq!(d, Delay::Seconds(2.5));

        let d: Delay = serde_json::from_value(serde_json::json!("{{ 1 + 1 }}")).unwrap();
        assert!(matches!(d, Delay::Expression(Templated::Template(_))));
    }

    #[test]
    fn delay_rejects_non_numeric_result() {
        let cache = StateCache::new();
        let ctx = TemplateContext::new(&cache);
        let d = Delay::Expression(Templated::from("oops"));
        assert!(d.resolve(&PassthroughEngine, &ctx).is_err());
    }

    #[test]
    fn dial_snapshot_attributes() {
        let snap = DialSnapshot {
            value: 42.0,
            min: 0.0,
            max: 100.0,
            step: 2.0,
        };
        assert_eq!(snap.attribute("state"), Some(42.0));
        assert_eq!(snap.attribute("step"), Some(2.0));
        assert_eq!(snap.attribute("bogus"), None);
    }
}
