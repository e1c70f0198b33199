#![forbid(unsafe_code)]

//! The dispatcher: one thread, one event loop, all the semantics.
//!
//! Owns the configuration, entity cache, navigation session, dial-local
//! values, and the pending-action table. Feeds push events in through a
//! channel; delayed actions are deadlines the loop sleeps toward with
//! `recv_timeout`. Service state is resolved at fire time, never captured
//! at press time.

use crate::device::DeckDevice;
use crate::pending::{ControlId, PendingActions};
use crate::remote::RemoteClient;
use hassdeck_core::config::Config;
use hassdeck_core::event::{InputEvent, RuntimeEvent, TouchKind};
use hassdeck_core::lightpage::light_page;
use hassdeck_core::model::{Dial, DialAttributes, DialEventType, PageRef, SpecialAction};
use hassdeck_core::resolve::{Resolver, ServiceCall};
use hassdeck_core::session::Session;
use hassdeck_core::spec::ResolvedSpec;
use hassdeck_core::state::{EntityState, StateCache};
use hassdeck_core::template::{DialSnapshot, TemplateContext, TemplateEngine, Templated};
use hassdeck_render::{IconProvider, RenderEngine};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration loading is the binary's concern; the dispatcher only
/// re-runs it on demand.
pub type ConfigLoader =
    Box<dyn FnMut() -> Result<Config, Box<dyn std::error::Error + Send + Sync>> + Send>;

/// Everything the dispatcher needs at construction.
pub struct DispatcherOptions {
    pub config: Config,
    pub template: Box<dyn TemplateEngine + Send>,
    pub render: RenderEngine,
    pub icons: Box<dyn IconProvider>,
    pub deck: Box<dyn DeckDevice>,
    pub remote: Box<dyn RemoteClient>,
    /// Re-reads the configuration document for reloads; `None` disables
    /// reloading entirely.
    pub loader: Option<ConfigLoader>,
}

pub struct Dispatcher {
    config: Config,
    session: Session,
    states: StateCache,
    template: Box<dyn TemplateEngine + Send>,
    render: RenderEngine,
    icons: Box<dyn IconProvider>,
    deck: Box<dyn DeckDevice>,
    remote: Box<dyn RemoteClient>,
    loader: Option<ConfigLoader>,
    pending: PendingActions,
    dials: Vec<DialSnapshot>,
    pressed: Vec<bool>,
    rendered_keys: Vec<Option<ResolvedSpec>>,
    rendered_dials: Vec<Option<ResolvedSpec>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(options: DispatcherOptions) -> Self {
        let layout = options.deck.layout();
        let mut dispatcher = Self {
            config: options.config,
            session: Session::new(),
            states: StateCache::new(),
            template: options.template,
            render: options.render,
            icons: options.icons,
            deck: options.deck,
            remote: options.remote,
            loader: options.loader,
            pending: PendingActions::new(),
            dials: Vec::new(),
            pressed: vec![false; usize::from(layout.key_count)],
            rendered_keys: vec![None; usize::from(layout.key_count)],
            rendered_dials: vec![None; usize::from(layout.dial_count)],
        };
        dispatcher.init_dial_locals();
        dispatcher
    }

    /// Seed the entity cache from the initial full-state snapshot.
    pub fn seed_states(&mut self, states: StateCache) {
        self.states = states;
        self.init_dial_locals();
    }

    /// Run until the channel closes or a shutdown event arrives.
    pub fn run(mut self, events: &Receiver<RuntimeEvent>) {
        self.set_brightness(self.config.brightness);
        self.render_all();
        loop {
            let event = match self.pending.next_deadline() {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline <= now {
                        self.fire_due();
                        continue;
                    }
                    match events.recv_timeout(deadline - now) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => {
                            self.fire_due();
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
                None => match events.recv() {
                    Ok(event) => event,
                    Err(_) => return,
                },
            };
            if !self.handle_event(event) {
                return;
            }
        }
    }

    /// Handle one event. Returns false on shutdown.
    pub fn handle_event(&mut self, event: RuntimeEvent) -> bool {
        match event {
            RuntimeEvent::Input(input) => {
                if !self.session.is_awake() {
                    if input.is_activation() {
                        // Waking consumes the event.
                        self.wake_up(true);
                    }
                    return true;
                }
                self.dispatch_input(input);
                true
            }
            RuntimeEvent::StateChanged { entity_id, state } => {
                self.apply_state(entity_id, state);
                true
            }
            RuntimeEvent::ConfigTouched => {
                if self.config.auto_reload {
                    self.reload();
                } else {
                    debug!("config touched, auto_reload disabled");
                }
                true
            }
            RuntimeEvent::Shutdown => {
                info!("shutting down");
                self.pending.cancel_all();
                self.session.sleep();
                self.render_all();
                self.set_brightness(0);
                false
            }
        }
    }

    /// Fire every pending action whose deadline has passed.
    pub fn fire_due(&mut self) {
        for control in self.pending.take_due(Instant::now()) {
            match control {
                ControlId::Key(index) => self.fire_key(index),
                ControlId::Dial(index) => self.fire_dial(index),
            }
        }
    }

    fn dispatch_input(&mut self, input: InputEvent) {
        match input {
            InputEvent::Key { index, pressed: true } => {
                if let Some(slot) = self.pressed.get_mut(usize::from(index)) {
                    *slot = true;
                }
                self.handle_key_press(index);
            }
            InputEvent::Key { index, pressed: false } => {
                if let Some(slot) = self.pressed.get_mut(usize::from(index)) {
                    *slot = false;
                }
                self.render_key(index);
            }
            InputEvent::DialTurn { index, delta } => self.handle_dial_turn(index, delta),
            InputEvent::DialPush { index, pressed: true } => self.handle_dial_push(index),
            InputEvent::DialPush { pressed: false, .. } => {}
            InputEvent::Touch { x, kind } => self.handle_touch(x, kind),
        }
    }

    fn handle_key_press(&mut self, index: u8) {
        let Some(button) = self
            .session
            .current_page(&self.config)
            .button(usize::from(index))
            .cloned()
        else {
            return;
        };

        if let Some(action) = button.special.clone() {
            match action {
                SpecialAction::NextPage => {
                    self.session.next_page(self.config.pages.len());
                    self.page_changed();
                }
                SpecialAction::PreviousPage => {
                    self.session.previous_page(self.config.pages.len());
                    self.page_changed();
                }
                SpecialAction::GoToPage(target) => {
                    self.go_to(&target);
                    self.page_changed();
                }
                SpecialAction::ClosePage => {
                    if self.session.close_page() {
                        self.page_changed();
                    }
                }
                SpecialAction::TurnOff => self.turn_off(true),
                SpecialAction::Reload => self.reload(),
                SpecialAction::LightControl(options) => {
                    let entity_id = button
                        .entity_id
                        .as_ref()
                        .and_then(Templated::as_literal)
                        .unwrap_or_default()
                        .to_owned();
                    self.session.open_detached(light_page(&entity_id, &options));
                    self.page_changed();
                }
                SpecialAction::Empty => {}
            }
            return;
        }

        if button.service.is_none() {
            self.render_key(index);
            return;
        }

        let ctx = TemplateContext::new(&self.states);
        let delay = button
            .delay
            .resolve(self.template.as_ref(), &ctx)
            .unwrap_or_else(|err| {
                warn!(%err, "delay failed to resolve, firing immediately");
                0.0
            });

        if delay > 0.0 {
            // Arming replaces any running timer: a re-press restarts the
            // countdown rather than stacking a second call.
            self.pending
                .arm(ControlId::Key(index), Duration::from_secs_f64(delay));
            self.render_key(index);
        } else {
            self.fire_key(index);
        }
    }

    fn handle_dial_turn(&mut self, index: u8, delta: i32) {
        let page = self.session.current_page(&self.config);
        let Some(dial) = page.dial(usize::from(index)) else {
            return;
        };
        let fires_on_turn =
            dial.dial_event_type == DialEventType::Turn && dial.service.is_some();
        let window = self.dial_window(dial);

        if let Some(local) = self.dials.get_mut(usize::from(index)) {
            let next = local.value + f64::from(delta) * local.step;
            local.value = snap(next, local.min, local.max, local.step);
        }
        // The strip always tracks the local value immediately, even while
        // the remote call is still coalescing.
        self.render_dial(index);

        if !fires_on_turn {
            return;
        }
        if window > 0.0 {
            // Each turn restarts the window; only the final value is sent.
            self.pending
                .arm(ControlId::Dial(index), Duration::from_secs_f64(window));
        } else {
            self.fire_dial(index);
        }
    }

    fn handle_dial_push(&mut self, index: u8) {
        let page = self.session.current_page(&self.config);
        let Some(dial) = page.dial(usize::from(index)) else {
            return;
        };
        if dial.dial_event_type == DialEventType::Push && dial.service.is_some() {
            self.fire_dial(index);
        }
    }

    fn handle_touch(&mut self, x: i32, kind: TouchKind) {
        if let TouchKind::Drag { to_x } = kind {
            if to_x > x {
                self.session.next_page(self.config.pages.len());
            } else {
                self.session.previous_page(self.config.pages.len());
            }
            self.page_changed();
            return;
        }

        let Some(index) = self.deck.layout().dial_at(x) else {
            return;
        };
        let page = self.session.current_page(&self.config);
        let Some(dial) = page.dial(usize::from(index)) else {
            return;
        };
        if !dial.allow_touchscreen_events {
            return;
        }
        let fires_on_turn =
            dial.dial_event_type == DialEventType::Turn && dial.service.is_some();
        let window = self.dial_window(dial);

        if let Some(local) = self.dials.get_mut(usize::from(index)) {
            local.value = match kind {
                TouchKind::Tap => local.min,
                TouchKind::Hold => local.max,
                TouchKind::Drag { .. } => unreachable!("handled above"),
            };
        }
        self.render_dial(index);
        if !fires_on_turn {
            return;
        }
        if window > 0.0 {
            self.pending
                .arm(ControlId::Dial(index), Duration::from_secs_f64(window));
        } else {
            self.fire_dial(index);
        }
    }

    fn apply_state(&mut self, entity_id: String, state: EntityState) {
        // Mirror a configured input_boolean into the sleep state.
        if self.config.state_entity_id.as_deref() == Some(entity_id.as_str()) {
            if state.is_off() && self.session.is_awake() {
                self.turn_off(false);
            } else if state.is_on() && !self.session.is_awake() {
                self.wake_up(false);
            }
        }

        self.states.apply(entity_id.clone(), state);

        // Refresh dial locals bound to this entity, unless the user is
        // mid-interaction.
        let page = self.session.current_page(&self.config).clone();
        for (index, dial) in page.dials.iter().enumerate() {
            if dial.references_entity(&entity_id)
                && !self.pending.is_pending(ControlId::Dial(index as u8))
            {
                let snapshot = self.dial_snapshot(dial);
                if let Some(slot) = self.dials.get_mut(index) {
                    *slot = snapshot;
                }
            }
        }

        self.render_dirty();
    }

    fn reload(&mut self) {
        let Some(loader) = self.loader.as_mut() else {
            warn!("no config loader wired, reload skipped");
            return;
        };
        let mut next = match loader() {
            Ok(config) => config,
            Err(err) => {
                warn!(%err, "config reload failed, keeping current configuration");
                return;
            }
        };
        if let Err(err) = next.validate() {
            warn!(%err, "reloaded config invalid, keeping current configuration");
            return;
        }
        info!(pages = next.pages.len(), "configuration reloaded");
        self.config = next;
        self.pending.cancel_all();
        self.session.after_reload(self.config.pages.len());
        self.page_changed();
        self.set_brightness(self.config.brightness);
    }

    fn go_to(&mut self, target: &PageRef) {
        match target {
            PageRef::Index(index) => {
                self.session.go_to_index(*index, self.config.pages.len());
            }
            PageRef::Name(name) => {
                if let Some(index) = self.config.page_index(name) {
                    self.session.go_to_index(index, self.config.pages.len());
                } else if let Some(page) = self.config.anonymous_page(name) {
                    self.session.open_detached(page.clone());
                } else {
                    // Validation guarantees the target exists; a detached
                    // page built at runtime is the only way here.
                    warn!(page = %name, "go-to-page target missing");
                }
            }
        }
    }

    fn turn_off(&mut self, sync: bool) {
        self.pending.cancel_all();
        self.session.sleep();
        self.render_all();
        self.set_brightness(0);
        if sync {
            self.sync_state_entity("off");
        }
    }

    fn wake_up(&mut self, sync: bool) {
        self.session.wake();
        self.set_brightness(self.config.brightness);
        self.render_all();
        if sync {
            self.sync_state_entity("on");
        }
    }

    fn sync_state_entity(&mut self, to: &str) {
        let Some(entity_id) = self.config.state_entity_id.clone() else {
            return;
        };
        let mut data = serde_json::Map::new();
        data.insert("entity_id".to_owned(), serde_json::Value::String(entity_id));
        let call = ServiceCall {
            service: format!("input_boolean.turn_{to}"),
            data,
            target: None,
        };
        if let Err(err) = self.remote.call_service(&call) {
            warn!(%err, "state entity sync failed");
        }
    }

    fn fire_key(&mut self, index: u8) {
        let call = {
            let page = self.session.current_page(&self.config);
            let Some(button) = page.button(usize::from(index)) else {
                return;
            };
            let resolver = Resolver::new(self.template.as_ref(), &self.states);
            resolver.button_service_call(button)
        };
        if let Some(call) = call {
            debug!(service = %call.service, "calling service");
            if let Err(err) = self.remote.call_service(&call) {
                warn!(%err, "service call failed");
            }
        }
        // A detached page is one-shot for key actions: once the action has
        // fired, return to the page it was opened from.
        if self.session.close_page() {
            self.page_changed();
        } else {
            self.render_key(index);
        }
    }

    fn fire_dial(&mut self, index: u8) {
        let call = {
            let page = self.session.current_page(&self.config);
            let Some(dial) = page.dial(usize::from(index)) else {
                return;
            };
            let Some(snapshot) = self.dials.get(usize::from(index)).copied() else {
                return;
            };
            let resolver = Resolver::new(self.template.as_ref(), &self.states);
            resolver.dial_service_call(dial, snapshot)
        };
        if let Some(call) = call {
            debug!(service = %call.service, "calling service");
            if let Err(err) = self.remote.call_service(&call) {
                warn!(%err, "service call failed");
            }
        }
        self.render_dial(index);
    }

    /// Timers are scoped to the page that armed them.
    fn page_changed(&mut self) {
        self.pending.cancel_all();
        self.init_dial_locals();
        self.render_all();
    }

    fn init_dial_locals(&mut self) {
        let page = self.session.current_page(&self.config).clone();
        let count = usize::from(self.deck.layout().dial_count);
        self.dials = (0..count)
            .map(|i| {
                page.dial(i)
                    .map(|dial| self.dial_snapshot(dial))
                    .unwrap_or(DialSnapshot { value: 0.0, min: 0.0, max: 100.0, step: 1.0 })
            })
            .collect();
    }

    /// Build a dial's local snapshot from its configuration and the bound
    /// entity's current state.
    fn dial_snapshot(&self, dial: &Dial) -> DialSnapshot {
        let resolver = Resolver::new(self.template.as_ref(), &self.states);
        let entity = resolver.entity_state(dial.entity_id.as_ref());

        let attrs = dial.attributes.unwrap_or_else(|| {
            entity
                .map(|e| DialAttributes {
                    min: e.numeric_attribute("min").unwrap_or(0.0),
                    max: e.numeric_attribute("max").unwrap_or(100.0),
                    step: e.numeric_attribute("step").unwrap_or(1.0),
                })
                .unwrap_or_default()
        });

        let value = entity
            .and_then(|e| match &dial.state_attribute {
                Some(name) => e.numeric_attribute(name),
                None => e.numeric_state(),
            })
            .unwrap_or(attrs.min)
            .clamp(attrs.min, attrs.max);

        DialSnapshot {
            value,
            min: attrs.min,
            max: attrs.max,
            step: attrs.step,
        }
    }

    fn dial_window(&self, dial: &Dial) -> f64 {
        let ctx = TemplateContext::new(&self.states);
        dial.delay
            .resolve(self.template.as_ref(), &ctx)
            .unwrap_or_else(|err| {
                warn!(%err, "dial window failed to resolve, firing immediately");
                0.0
            })
    }

    fn key_spec(&self, index: u8) -> ResolvedSpec {
        if !self.session.is_awake() {
            return ResolvedSpec::blank();
        }
        let page = self.session.current_page(&self.config);
        let Some(button) = page.button(usize::from(index)) else {
            return ResolvedSpec::blank();
        };
        if let Some((remaining, total)) =
            self.pending.remaining(ControlId::Key(index), Instant::now())
        {
            return ResolvedSpec::countdown(remaining.as_secs_f64(), total.as_secs_f64());
        }
        let pressed = self.pressed.get(usize::from(index)).copied().unwrap_or(false);
        let resolver = Resolver::new(self.template.as_ref(), &self.states);
        resolver.button_spec(button, pressed)
    }

    fn dial_spec(&self, index: u8) -> ResolvedSpec {
        if !self.session.is_awake() {
            return ResolvedSpec::blank();
        }
        let page = self.session.current_page(&self.config);
        let Some(dial) = page.dial(usize::from(index)) else {
            return ResolvedSpec::blank();
        };
        let snapshot = self.dials.get(usize::from(index)).copied().unwrap_or(
            DialSnapshot { value: 0.0, min: 0.0, max: 100.0, step: 1.0 },
        );
        let resolver = Resolver::new(self.template.as_ref(), &self.states);
        resolver.dial_spec(dial, snapshot)
    }

    fn render_key(&mut self, index: u8) {
        let spec = self.key_spec(index);
        let slot = usize::from(index);
        if self.rendered_keys.get(slot).is_some_and(|r| r.as_ref() == Some(&spec)) {
            return;
        }
        let size = self.deck.layout().key_size;
        let image = self.render.render(&spec, size, self.icons.as_ref());
        if let Err(err) = self.deck.set_key_image(index, &image) {
            warn!(key = index, %err, "key image write failed");
        }
        if let Some(slot) = self.rendered_keys.get_mut(slot) {
            *slot = Some(spec);
        }
    }

    fn render_dial(&mut self, index: u8) {
        let spec = self.dial_spec(index);
        let slot = usize::from(index);
        if self.rendered_dials.get(slot).is_some_and(|r| r.as_ref() == Some(&spec)) {
            return;
        }
        let size = self.deck.layout().dial_size;
        let image = self.render.render(&spec, size, self.icons.as_ref());
        if let Err(err) = self.deck.set_dial_image(index, &image) {
            warn!(dial = index, %err, "dial image write failed");
        }
        if let Some(slot) = self.rendered_dials.get_mut(slot) {
            *slot = Some(spec);
        }
    }

    fn render_all(&mut self) {
        let layout = self.deck.layout();
        // Drop the dirty cache so every tile repaints.
        self.rendered_keys = vec![None; usize::from(layout.key_count)];
        self.rendered_dials = vec![None; usize::from(layout.dial_count)];
        for index in 0..layout.key_count {
            self.render_key(index);
        }
        for index in 0..layout.dial_count {
            self.render_dial(index);
        }
    }

    /// Repaint only the tiles whose resolved spec changed.
    fn render_dirty(&mut self) {
        let layout = self.deck.layout();
        for index in 0..layout.key_count {
            self.render_key(index);
        }
        for index in 0..layout.dial_count {
            self.render_dial(index);
        }
    }

    fn set_brightness(&mut self, percent: u8) {
        if let Err(err) = self.deck.set_brightness(percent) {
            warn!(%err, "brightness write failed");
        }
    }
}

/// Clamp to the range and snap onto the step grid anchored at `min`.
fn snap(value: f64, min: f64, max: f64, step: f64) -> f64 {
    let clamped = value.clamp(min, max);
    if step <= 0.0 {
        return clamped;
    }
    let steps = ((clamped - min) / step).round();
    (min + steps * step).clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::snap;

    #[test]
    fn snap_clamps_and_grids() {
        assert_eq!(snap(7.4, 0.0, 100.0, 5.0), 5.0);
        assert_eq!(snap(7.6, 0.0, 100.0, 5.0), 10.0);
        assert_eq!(snap(-3.0, 0.0, 100.0, 5.0), 0.0);
        assert_eq!(snap(250.0, 0.0, 100.0, 5.0), 100.0);
        // Grid anchored at min, not zero.
        assert_eq!(snap(3.0, 1.0, 10.0, 2.0), 3.0);
    }
}
