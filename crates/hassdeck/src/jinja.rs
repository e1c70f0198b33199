#![forbid(unsafe_code)]

//! The Jinja template evaluator.
//!
//! Builds a fresh environment per render with helper functions closed over
//! a snapshot of the entity cache (and, for dials, the dial's local
//! values). Templates are user configuration; every failure surfaces as a
//! `TemplateError` for the resolver to degrade on.

use hassdeck_core::state::EntityState;
use hassdeck_core::template::{TemplateContext, TemplateEngine, TemplateError};
use minijinja::value::{Kwargs, Value};
use minijinja::{Environment, Error, ErrorKind};
use std::collections::HashMap;
use std::sync::Arc;

pub struct JinjaEngine;

impl TemplateEngine for JinjaEngine {
    fn render(&self, source: &str, ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
        let env = build_environment(ctx);
        let template = env
            .template_from_str(source)
            .map_err(|e| TemplateError(e.to_string()))?;
        let rendered = template
            .render(minijinja::context! {})
            .map_err(|e| TemplateError(e.to_string()))?;
        Ok(rendered.trim().to_owned())
    }
}

type States = Arc<HashMap<String, EntityState>>;

fn build_environment(ctx: &TemplateContext<'_>) -> Environment<'static> {
    let states: States = Arc::new(
        ctx.states
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect(),
    );
    let dial = ctx.dial;

    let mut env = Environment::new();

    {
        let states = states.clone();
        env.add_function(
            "states",
            move |entity_id: String, kwargs: Kwargs| -> Result<Value, Error> {
                let with_unit = kwargs.get::<Option<bool>>("with_unit")?.unwrap_or(false);
                let rounded = kwargs.get::<Option<bool>>("rounded")?.unwrap_or(false);
                kwargs.assert_all_used()?;
                Ok(state_of(&states, &entity_id, with_unit, rounded))
            },
        );
    }
    {
        let states = states.clone();
        env.add_function("is_state", move |entity_id: String, state: String| -> bool {
            state_of(&states, &entity_id, false, false) == maybe_number(&state)
        });
    }
    {
        let states = states.clone();
        env.add_function("state_attr", move |entity_id: String, attr: String| -> Value {
            attr_of(&states, &entity_id, &attr)
        });
    }
    {
        let states = states.clone();
        env.add_function(
            "is_state_attr",
            move |entity_id: String, attr: String, value: Value| -> bool {
                let current = attr_of(&states, &entity_id, &attr);
                if let Some(s) = value.as_str() {
                    current == maybe_number(s)
                } else {
                    current == value
                }
            },
        );
    }
    env.add_function("dial_value", move || -> f64 {
        dial.map_or(0.0, |d| d.value)
    });
    env.add_function("dial_attr", move |name: String| -> Result<f64, Error> {
        let Some(dial) = dial else {
            return Ok(0.0);
        };
        dial.attribute(&name).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("unknown dial attribute {name:?}"),
            )
        })
    });

    // Two-argument min/max filters: `{{ value | min(10) }}`.
    env.add_filter("min", |value: f64, other: f64| -> f64 { value.min(other) });
    env.add_filter("max", |value: f64, other: f64| -> f64 { value.max(other) });
    env.add_filter("is_number", |value: Value| -> bool {
        maybe_value_number(&value).is_some()
    });

    env
}

fn state_of(states: &States, entity_id: &str, with_unit: bool, rounded: bool) -> Value {
    let Some(entity) = states.get(entity_id) else {
        return Value::from(());
    };
    let mut value = maybe_number(&entity.state);
    if rounded && let Some(n) = maybe_value_number(&value) {
        value = Value::from(n.round() as i64);
    }
    if with_unit
        && let Some(unit) = entity
            .attributes
            .get("unit_of_measurement")
            .and_then(|u| u.as_str())
    {
        return Value::from(format!("{value} {unit}"));
    }
    value
}

fn attr_of(states: &States, entity_id: &str, attr: &str) -> Value {
    let raw = states
        .get(entity_id)
        .and_then(|entity| entity.attributes.get(attr));
    match raw {
        Some(serde_json::Value::String(s)) => maybe_number(s),
        Some(other) => Value::from_serialize(other),
        None => Value::from(()),
    }
}

/// Numeric strings become numbers, everything else passes through.
fn maybe_number(s: &str) -> Value {
    if let Ok(i) = s.trim().parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = s.trim().parse::<f64>() {
        return Value::from(f);
    }
    Value::from(s)
}

fn maybe_value_number(value: &Value) -> Option<f64> {
    if let Ok(f) = f64::try_from(value.clone()) {
        return Some(f);
    }
    value.as_str().and_then(|s| s.trim().parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hassdeck_core::state::StateCache;
    use hassdeck_core::template::DialSnapshot;
    use serde_json::json;

    fn cache() -> StateCache {
        let mut cache = StateCache::new();
        let mut desk = EntityState::new("on");
        desk.attributes.insert("brightness".into(), json!(128));
        cache.apply("light.desk", desk);
        let mut temp = EntityState::new("21.53");
        temp.attributes
            .insert("unit_of_measurement".into(), json!("°C"));
        cache.apply("sensor.temp", temp);
        cache
    }

    fn render(source: &str) -> String {
        let cache = cache();
        let ctx = TemplateContext::new(&cache);
        JinjaEngine.render(source, &ctx).unwrap()
    }

    #[test]
    fn states_and_is_state() {
        assert_eq!(render("{{ states('light.desk') }}"), "on");
        assert_eq!(
            render("{% if is_state('light.desk', 'on') %}yes{% endif %}"),
            "yes"
        );
        assert_eq!(render("{{ states('sensor.missing') }}"), "none");
    }

    #[test]
    fn states_with_unit_and_rounding() {
        assert_eq!(
            render("{{ states('sensor.temp', with_unit=True) }}"),
            "21.53 °C"
        );
        assert_eq!(render("{{ states('sensor.temp', rounded=True) }}"), "22");
    }

    #[test]
    fn state_attr_returns_numbers() {
        assert_eq!(render("{{ state_attr('light.desk', 'brightness') // 2 }}"), "64");
        assert_eq!(
            render("{% if is_state_attr('light.desk', 'brightness', '128') %}y{% endif %}"),
            "y"
        );
    }

    #[test]
    fn dial_helpers_use_the_snapshot() {
        let cache = cache();
        let snap = DialSnapshot { value: 42.0, min: 0.0, max: 255.0, step: 1.0 };
        let ctx = TemplateContext::with_dial(&cache, snap);
        assert_eq!(
            JinjaEngine.render("{{ dial_value() }}", &ctx).unwrap(),
            "42.0"
        );
        assert_eq!(
            JinjaEngine.render("{{ dial_attr('max') }}", &ctx).unwrap(),
            "255.0"
        );
    }

    #[test]
    fn min_max_filters_take_two_arguments() {
        assert_eq!(render("{{ 150 | min(100) }}"), "100.0");
        assert_eq!(render("{{ 3 | max(10) }}"), "10.0");
    }

    #[test]
    fn template_errors_are_reported_not_panicked() {
        let cache = cache();
        let ctx = TemplateContext::new(&cache);
        assert!(JinjaEngine.render("{{ unclosed", &ctx).is_err());
        assert!(JinjaEngine.render("{{ nosuchfn() }}", &ctx).is_err());
    }
}
