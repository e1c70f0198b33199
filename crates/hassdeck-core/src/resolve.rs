#![forbid(unsafe_code)]

//! Resolution: configured control + live state → [`ResolvedSpec`] and
//! service calls.
//!
//! Every field resolves independently. A template failure or unparseable
//! color degrades that one field to its default and logs a warning; it
//! never takes down the whole tile, and one bad tile never takes down the
//! page.

use crate::color::Rgb;
use crate::model::{Button, Dial, PageRef, SpecialAction};
use crate::spec::{Background, IconDescriptor, ResolvedSpec};
use crate::state::{EntityState, StateCache};
use crate::template::{DialSnapshot, TemplateContext, TemplateEngine, Templated};
use serde_json::{Map, Value};
use tracing::warn;

/// Glyph names used when a control with an entity has no icon configured.
const DEFAULT_MDI_ICONS: &[(&str, &str)] = &[
    ("light", "lightbulb"),
    ("switch", "power-socket-eu"),
    ("script", "script"),
];

/// A fully resolved service invocation, ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    /// `domain.service`, e.g. `light.toggle`.
    pub service: String,
    pub data: Map<String, Value>,
    pub target: Option<Map<String, Value>>,
}

/// Resolves controls against one snapshot of entity state.
pub struct Resolver<'a> {
    engine: &'a dyn TemplateEngine,
    states: &'a StateCache,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(engine: &'a dyn TemplateEngine, states: &'a StateCache) -> Self {
        Self { engine, states }
    }

    /// Resolve a button's visual spec.
    #[must_use]
    pub fn button_spec(&self, button: &Button, pressed: bool) -> ResolvedSpec {
        if matches!(button.special, Some(SpecialAction::Empty)) {
            return ResolvedSpec::blank();
        }
        let ctx = TemplateContext::new(self.states);
        let mut spec = match self.visual_spec(&ctx, &Visual::from_button(button)) {
            Ok(spec) => spec,
            Err(()) => return ResolvedSpec::failed(),
        };
        spec.pressed = pressed;
        apply_special_defaults(button, &mut spec);
        spec
    }

    /// Resolve a dial's visual spec against its local value.
    #[must_use]
    pub fn dial_spec(&self, dial: &Dial, snapshot: DialSnapshot) -> ResolvedSpec {
        let ctx = TemplateContext::with_dial(self.states, snapshot);
        self.visual_spec(&ctx, &Visual::from_dial(dial))
            .unwrap_or_else(|()| ResolvedSpec::failed())
    }

    /// Resolve a button's service call, if it has a service.
    #[must_use]
    pub fn button_service_call(&self, button: &Button) -> Option<ServiceCall> {
        let ctx = TemplateContext::new(self.states);
        self.service_call(
            &ctx,
            button.service.as_ref(),
            button.service_data.as_ref(),
            button.target.as_ref(),
            button.entity_id.as_ref(),
        )
    }

    /// Resolve a dial's service call against its local value.
    #[must_use]
    pub fn dial_service_call(&self, dial: &Dial, snapshot: DialSnapshot) -> Option<ServiceCall> {
        let ctx = TemplateContext::with_dial(self.states, snapshot);
        self.service_call(
            &ctx,
            dial.service.as_ref(),
            dial.service_data.as_ref(),
            dial.target.as_ref(),
            dial.entity_id.as_ref(),
        )
    }

    /// The entity a control is bound to, with templated ids resolved.
    #[must_use]
    pub fn entity_state(&self, entity_id: Option<&Templated>) -> Option<&'a EntityState> {
        let ctx = TemplateContext::new(self.states);
        let id = self.resolve_text(&ctx, entity_id?, "entity_id")?;
        self.states.get(&id)
    }

    /// `Err` means the configured icon reference is malformed; the caller
    /// shows the failed tile.
    fn visual_spec(
        &self,
        ctx: &TemplateContext<'_>,
        v: &Visual<'_>,
    ) -> Result<ResolvedSpec, ()> {
        let mut spec = ResolvedSpec {
            text_size: v.text_size,
            text_offset: v.text_offset,
            ..ResolvedSpec::default()
        };

        spec.text = self
            .resolve_text(ctx, v.text, "text")
            .unwrap_or_default();

        let entity = v
            .entity_id
            .and_then(|id| self.resolve_text(ctx, id, "entity_id"))
            .and_then(|id| self.states.get(&id));

        spec.text_color = match v.text_color {
            Some(t) => self
                .resolve_color(ctx, t, "text_color")
                .unwrap_or(Rgb::WHITE),
            None if entity.is_some_and(EntityState::is_on) => Rgb::ON_HIGHLIGHT,
            None => Rgb::WHITE,
        };

        let background = self
            .resolve_color(ctx, v.icon_background_color, "icon_background_color")
            .unwrap_or(Rgb::BLACK);
        spec.background = Background::Flat(background);

        let mut has_raster = false;
        if let Some(icon) = v.icon
            && let Some(raw) = self.resolve_text(ctx, icon, "icon")
            && !raw.is_empty()
        {
            match IconDescriptor::parse(&raw) {
                Ok(IconDescriptor::Ring(pct)) => spec.ring = Some(pct),
                Ok(descriptor) => {
                    spec.background = Background::Raster(descriptor);
                    has_raster = true;
                }
                Err(err) => {
                    warn!(%err, "malformed icon reference");
                    return Err(());
                }
            }
        }

        if !has_raster {
            let glyph = v
                .icon_mdi
                .and_then(|t| self.resolve_text(ctx, t, "icon_mdi"))
                .filter(|name| !name.is_empty())
                .or_else(|| {
                    if v.icon.is_none() && v.icon_mdi.is_none() && entity.is_some() {
                        default_glyph(v.service).map(str::to_owned)
                    } else {
                        None
                    }
                });
            if let Some(name) = glyph {
                let color = match v.icon_mdi_color {
                    Some(t) => self
                        .resolve_color(ctx, t, "icon_mdi_color")
                        .unwrap_or(spec.text_color),
                    None => spec.text_color,
                };
                spec.background = Background::Glyph {
                    name,
                    color,
                    background,
                };
            }
        }

        spec.grayscale = v.icon_gray_when_off && entity.is_some_and(EntityState::is_off);
        Ok(spec)
    }

    fn service_call(
        &self,
        ctx: &TemplateContext<'_>,
        service: Option<&Templated>,
        data: Option<&Map<String, Value>>,
        target: Option<&Map<String, Value>>,
        entity_id: Option<&Templated>,
    ) -> Option<ServiceCall> {
        let service = self.resolve_text(ctx, service?, "service")?;
        if service.is_empty() {
            return None;
        }
        let mut data = data.map_or_else(Map::new, |m| self.resolve_payload(ctx, m));
        if !data.contains_key("entity_id")
            && let Some(id) = entity_id
            && let Some(id) = self.resolve_text(ctx, id, "entity_id")
            && !id.is_empty()
        {
            data.insert("entity_id".to_owned(), Value::String(id));
        }
        let target = target.map(|m| self.resolve_payload(ctx, m));
        Some(ServiceCall {
            service,
            data,
            target,
        })
    }

    /// Render every string leaf of a payload map. A leaf that fails to
    /// render is passed through verbatim.
    fn resolve_payload(
        &self,
        ctx: &TemplateContext<'_>,
        map: &Map<String, Value>,
    ) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let resolved = match value {
                    Value::String(s) => {
                        let templated = Templated::classify(s.clone());
                        match templated.resolve(self.engine, ctx) {
                            Ok(rendered) => coerce_leaf(rendered),
                            Err(err) => {
                                warn!(field = %key, %err, "payload template failed, passing source through");
                                value.clone()
                            }
                        }
                    }
                    other => other.clone(),
                };
                (key.clone(), resolved)
            })
            .collect()
    }

    fn resolve_text(
        &self,
        ctx: &TemplateContext<'_>,
        field: &Templated,
        name: &str,
    ) -> Option<String> {
        match field.resolve(self.engine, ctx) {
            Ok(s) => Some(s),
            Err(err) => {
                warn!(field = name, %err, "template failed, using default");
                None
            }
        }
    }

    fn resolve_color(
        &self,
        ctx: &TemplateContext<'_>,
        field: &Templated,
        name: &str,
    ) -> Option<Rgb> {
        let raw = self.resolve_text(ctx, field, name)?;
        match Rgb::parse(&raw) {
            Ok(rgb) => Some(rgb),
            Err(err) => {
                warn!(field = name, %err, "color ignored");
                None
            }
        }
    }
}

/// Fill in the stock text and glyph of a special button wherever the
/// configuration left the field unset.
fn apply_special_defaults(button: &Button, spec: &mut ResolvedSpec) {
    let Some(action) = &button.special else {
        return;
    };
    let (text, glyph) = match action {
        SpecialAction::NextPage => ("Next\nPage".to_owned(), "chevron-right"),
        SpecialAction::PreviousPage => ("Previous\nPage".to_owned(), "chevron-left"),
        SpecialAction::GoToPage(target) => {
            let name = match target {
                PageRef::Index(i) => i.to_string(),
                PageRef::Name(n) => n.clone(),
            };
            (format!("Go to\nPage\n{name}"), "book-open-page-variant")
        }
        SpecialAction::ClosePage => ("Close\nPage".to_owned(), "arrow-u-left-bottom-bold"),
        SpecialAction::TurnOff => ("Turn off".to_owned(), "power"),
        SpecialAction::Reload => ("Reload\nconfig".to_owned(), "reload"),
        SpecialAction::LightControl(_) => ("Lights".to_owned(), "lightbulb-group"),
        SpecialAction::Empty => return,
    };
    if spec.text.is_empty() {
        spec.text = text;
    }
    if button.icon_mdi.is_none() && button.icon.is_none() {
        spec.background = Background::Glyph {
            name: glyph.to_owned(),
            color: spec.text_color,
            background: match &spec.background {
                Background::Flat(c) | Background::Glyph { background: c, .. } => *c,
                Background::Raster(_) => Rgb::BLACK,
            },
        };
    }
}

/// Numbers rendered by a template come back as strings; the service wire
/// wants real numbers where they parse as such.
fn coerce_leaf(rendered: String) -> Value {
    let trimmed = rendered.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>()
        && let Some(n) = serde_json::Number::from_f64(f)
    {
        return Value::Number(n);
    }
    Value::String(rendered)
}

fn default_glyph(service: Option<&Templated>) -> Option<&'static str> {
    let domain = service?.as_literal()?.split('.').next()?;
    DEFAULT_MDI_ICONS
        .iter()
        .find(|(d, _)| *d == domain)
        .map(|(_, glyph)| *glyph)
}

/// The display fields shared by buttons and dials, borrowed for one
/// resolution pass.
struct Visual<'b> {
    entity_id: Option<&'b Templated>,
    service: Option<&'b Templated>,
    text: &'b Templated,
    text_color: Option<&'b Templated>,
    text_size: u32,
    text_offset: i32,
    icon: Option<&'b Templated>,
    icon_mdi: Option<&'b Templated>,
    icon_background_color: &'b Templated,
    icon_mdi_color: Option<&'b Templated>,
    icon_gray_when_off: bool,
}

impl<'b> Visual<'b> {
    fn from_button(b: &'b Button) -> Self {
        Self {
            entity_id: b.entity_id.as_ref(),
            service: b.service.as_ref(),
            text: &b.text,
            text_color: b.text_color.as_ref(),
            text_size: b.text_size,
            text_offset: b.text_offset,
            icon: b.icon.as_ref(),
            icon_mdi: b.icon_mdi.as_ref(),
            icon_background_color: &b.icon_background_color,
            icon_mdi_color: b.icon_mdi_color.as_ref(),
            icon_gray_when_off: b.icon_gray_when_off,
        }
    }

    fn from_dial(d: &'b Dial) -> Self {
        Self {
            entity_id: d.entity_id.as_ref(),
            service: d.service.as_ref(),
            text: &d.text,
            text_color: d.text_color.as_ref(),
            text_size: d.text_size,
            text_offset: d.text_offset,
            icon: d.icon.as_ref(),
            icon_mdi: d.icon_mdi.as_ref(),
            icon_background_color: &d.icon_background_color,
            icon_mdi_color: d.icon_mdi_color.as_ref(),
            icon_gray_when_off: d.icon_gray_when_off,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityState;
    use crate::template::PassthroughEngine;
    use serde_json::json;

    fn states_with(entity: &str, state: EntityState) -> StateCache {
        let mut cache = StateCache::new();
        cache.apply(entity, state);
        cache
    }

    fn button(value: serde_json::Value) -> Button {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn on_entity_highlights_text() {
        let cache = states_with("light.desk", EntityState::new("on"));
        let resolver = Resolver::new(&PassthroughEngine, &cache);
        let spec = resolver.button_spec(
            &button(json!({"entity_id": "light.desk", "text": "Desk"})),
            false,
        );
        assert_eq!(spec.text_color, Rgb::ON_HIGHLIGHT);

        let cache = states_with("light.desk", EntityState::new("off"));
        let resolver = Resolver::new(&PassthroughEngine, &cache);
        let spec = resolver.button_spec(
            &button(json!({"entity_id": "light.desk", "text": "Desk"})),
            false,
        );
        assert_eq!(spec.text_color, Rgb::WHITE);
    }

    #[test]
    fn explicit_text_color_wins_over_highlight() {
        let cache = states_with("light.desk", EntityState::new("on"));
        let resolver = Resolver::new(&PassthroughEngine, &cache);
        let spec = resolver.button_spec(
            &button(json!({"entity_id": "light.desk", "text_color": "cyan"})),
            false,
        );
        assert_eq!(spec.text_color, Rgb::new(0, 0xff, 0xff));
    }

    #[test]
    fn bad_color_degrades_with_default() {
        let cache = StateCache::new();
        let resolver = Resolver::new(&PassthroughEngine, &cache);
        let spec = resolver.button_spec(
            &button(json!({"text_color": "not-a-color", "icon_background_color": "#112233"})),
            false,
        );
        assert_eq!(spec.text_color, Rgb::WHITE);
        assert_eq!(spec.background, Background::Flat(Rgb::new(0x11, 0x22, 0x33)));
    }

    #[test]
    fn icon_precedence_raster_over_glyph() {
        let cache = StateCache::new();
        let resolver = Resolver::new(&PassthroughEngine, &cache);
        let spec = resolver.button_spec(
            &button(json!({"icon": "pic.png", "icon_mdi": "lightbulb"})),
            false,
        );
        assert_eq!(
            spec.background,
            Background::Raster(IconDescriptor::File("pic.png".into()))
        );
    }

    #[test]
    fn ring_icon_sets_ring_and_keeps_flat_background() {
        let cache = StateCache::new();
        let resolver = Resolver::new(&PassthroughEngine, &cache);
        let spec = resolver.button_spec(&button(json!({"icon": "ring:62"})), false);
        assert_eq!(spec.ring, Some(62.0));
        assert_eq!(spec.background, Background::Flat(Rgb::BLACK));
    }

    #[test]
    fn malformed_icon_shows_the_failed_tile() {
        let cache = StateCache::new();
        let resolver = Resolver::new(&PassthroughEngine, &cache);
        let spec = resolver.button_spec(&button(json!({"icon": "ring:unavailable"})), false);
        assert_eq!(spec, ResolvedSpec::failed());
    }

    #[test]
    fn domain_default_glyph_when_nothing_configured() {
        let cache = states_with("light.desk", EntityState::new("off"));
        let resolver = Resolver::new(&PassthroughEngine, &cache);
        let spec = resolver.button_spec(
            &button(json!({"entity_id": "light.desk", "service": "light.toggle"})),
            false,
        );
        assert!(matches!(
            spec.background,
            Background::Glyph { ref name, .. } if name == "lightbulb"
        ));
    }

    #[test]
    fn grayscale_only_when_off_and_opted_in() {
        let off = states_with("light.desk", EntityState::new("off"));
        let resolver = Resolver::new(&PassthroughEngine, &off);
        let b = button(json!({
            "entity_id": "light.desk",
            "icon": "pic.png",
            "icon_gray_when_off": true
        }));
        assert!(resolver.button_spec(&b, false).grayscale);

        let on = states_with("light.desk", EntityState::new("on"));
        let resolver = Resolver::new(&PassthroughEngine, &on);
        assert!(!resolver.button_spec(&b, false).grayscale);
    }

    #[test]
    fn empty_special_is_blank() {
        let cache = StateCache::new();
        let resolver = Resolver::new(&PassthroughEngine, &cache);
        let mut b = button(json!({"special_type": "empty", "text": "ignored"}));
        b.special = Some(SpecialAction::Empty);
        assert_eq!(resolver.button_spec(&b, false), ResolvedSpec::blank());
    }

    #[test]
    fn special_defaults_fill_unset_fields_only() {
        let cache = StateCache::new();
        let resolver = Resolver::new(&PassthroughEngine, &cache);

        let mut b = button(json!({"special_type": "next-page"}));
        b.special = Some(SpecialAction::NextPage);
        let spec = resolver.button_spec(&b, false);
        assert_eq!(spec.text, "Next\nPage");
        assert!(matches!(
            spec.background,
            Background::Glyph { ref name, .. } if name == "chevron-right"
        ));

        let mut b = button(json!({"special_type": "next-page", "text": "Onward"}));
        b.special = Some(SpecialAction::NextPage);
        assert_eq!(resolver.button_spec(&b, false).text, "Onward");
    }

    #[test]
    fn service_call_autofills_entity_id() {
        let cache = StateCache::new();
        let resolver = Resolver::new(&PassthroughEngine, &cache);
        let call = resolver
            .button_service_call(&button(json!({
                "entity_id": "light.desk",
                "service": "light.toggle"
            })))
            .unwrap();
        assert_eq!(call.service, "light.toggle");
        assert_eq!(call.data.get("entity_id"), Some(&json!("light.desk")));

        // An explicit entity_id in service_data is left alone.
        let call = resolver
            .button_service_call(&button(json!({
                "entity_id": "light.desk",
                "service": "light.toggle",
                "service_data": {"entity_id": "light.other"}
            })))
            .unwrap();
        assert_eq!(call.data.get("entity_id"), Some(&json!("light.other")));
    }

    #[test]
    fn payload_numbers_are_coerced() {
        struct Doubler;
        impl TemplateEngine for Doubler {
            fn render(
                &self,
                source: &str,
                _: &TemplateContext<'_>,
            ) -> Result<String, crate::template::TemplateError> {
                assert_eq!(source, "{{ 2 * 64 }}");
                Ok("128".to_owned())
            }
        }
        let cache = StateCache::new();
        let resolver = Resolver::new(&Doubler, &cache);
        let call = resolver
            .button_service_call(&button(json!({
                "service": "light.turn_on",
                "service_data": {"brightness": "{{ 2 * 64 }}", "transition": 2}
            })))
            .unwrap();
        assert_eq!(call.data.get("brightness"), Some(&json!(128)));
        assert_eq!(call.data.get("transition"), Some(&json!(2)));
    }

    #[test]
    fn no_service_means_no_call() {
        let cache = StateCache::new();
        let resolver = Resolver::new(&PassthroughEngine, &cache);
        assert!(resolver
            .button_service_call(&button(json!({"entity_id": "light.desk"})))
            .is_none());
    }

    #[test]
    fn dial_templates_see_dial_values() {
        struct DialEcho;
        impl TemplateEngine for DialEcho {
            fn render(
                &self,
                source: &str,
                ctx: &TemplateContext<'_>,
            ) -> Result<String, crate::template::TemplateError> {
                assert_eq!(source, "{{ dial_value() }}");
                Ok(ctx.dial.unwrap().value.to_string())
            }
        }
        let cache = StateCache::new();
        let resolver = Resolver::new(&DialEcho, &cache);
        let dial: Dial = serde_json::from_value(json!({
            "entity_id": "light.desk",
            "service": "light.turn_on",
            "service_data": {"brightness": "{{ dial_value() }}"}
        }))
        .unwrap();
        let snap = DialSnapshot { value: 77.0, min: 0.0, max: 100.0, step: 1.0 };
        let call = resolver.dial_service_call(&dial, snap).unwrap();
        assert_eq!(call.data.get("brightness"), Some(&json!(77)));
    }
}
