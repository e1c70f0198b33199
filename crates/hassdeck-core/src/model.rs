#![forbid(unsafe_code)]

//! Configuration tree: buttons, dials, and pages.
//!
//! These types deserialize straight from the YAML configuration document.
//! String display fields are template-eligible ([`Templated`]); structural
//! fields (sizes, flags, special types) are taken literally. Unknown keys
//! are rejected so typos fail at load time rather than rendering blanks.

use crate::color::Rgb;
use crate::template::{Delay, Templated};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_text_size() -> u32 {
    12
}

fn default_background() -> Templated {
    Templated::Literal("#000000".to_owned())
}

impl Default for Templated {
    fn default() -> Self {
        Self::Literal(String::new())
    }
}

/// A button bound to a key position on a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Button {
    /// Entity this button controls; re-rendered when its state changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Templated>,
    /// Secondary entity that also triggers re-render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_entity: Option<Templated>,
    /// Service called on activation, e.g. `light.toggle`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Templated>,
    /// Data passed to the service. String leaves are template-eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_data: Option<Map<String, Value>>,
    /// Target selector passed to the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Map<String, Value>>,
    /// Text drawn on the key. Explicit `\n` breaks lines; no auto-reflow.
    #[serde(default)]
    pub text: Templated,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<Templated>,
    #[serde(default = "default_text_size")]
    pub text_size: u32,
    /// Vertical shift of the text block in pixels; positive moves up.
    #[serde(default)]
    pub text_offset: i32,
    /// Icon reference: local path, `url:`, `ring:NN`, or `scheme:id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Templated>,
    /// Material Design Icon glyph name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_mdi: Option<Templated>,
    #[serde(default = "default_background")]
    pub icon_background_color: Templated,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_mdi_color: Option<Templated>,
    /// Convert the icon to grayscale while the bound entity is "off".
    #[serde(default)]
    pub icon_gray_when_off: bool,
    /// Seconds between press and service call; re-press restarts the timer.
    #[serde(default)]
    pub delay: Delay,
    /// Raw special-type tag; resolved into [`SpecialAction`] at validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_type_data: Option<Value>,
    /// Parsed special action, filled in by `Config::validate`.
    #[serde(skip)]
    pub special: Option<SpecialAction>,
}

impl Button {
    /// The service domain (`light` of `light.toggle`), if a service is set
    /// and literal.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.service
            .as_ref()
            .and_then(Templated::as_literal)
            .and_then(|s| s.split('.').next())
    }

    /// Whether this control references `entity_id` (directly or linked).
    ///
    /// Comparison is on the raw field source; a templated entity id is not
    /// statically trackable and never matches.
    #[must_use]
    pub fn references_entity(&self, entity_id: &str) -> bool {
        references(self.entity_id.as_ref(), entity_id)
            || references(self.linked_entity.as_ref(), entity_id)
    }
}

fn references(field: Option<&Templated>, entity_id: &str) -> bool {
    field.and_then(Templated::as_literal) == Some(entity_id)
}

/// Which dial gesture activates the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DialEventType {
    #[default]
    Turn,
    Push,
}

/// The numeric range of a dial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DialAttributes {
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_dial_max")]
    pub max: f64,
    #[serde(default = "default_dial_step")]
    pub step: f64,
}

fn default_dial_max() -> f64 {
    100.0
}

fn default_dial_step() -> f64 {
    1.0
}

impl Default for DialAttributes {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: default_dial_max(),
            step: default_dial_step(),
        }
    }
}

/// A dial (rotary encoder) with a strip of touchscreen above it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Templated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_entity: Option<Templated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Templated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Map<String, Value>>,
    #[serde(default)]
    pub text: Templated,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<Templated>,
    #[serde(default = "default_text_size")]
    pub text_size: u32,
    #[serde(default)]
    pub text_offset: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Templated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_mdi: Option<Templated>,
    #[serde(default = "default_background")]
    pub icon_background_color: Templated,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_mdi_color: Option<Templated>,
    #[serde(default)]
    pub icon_gray_when_off: bool,
    /// Coalescing window: turns within this many seconds are bundled into
    /// one service call carrying the final value.
    #[serde(default)]
    pub delay: Delay,
    /// Gesture this dial's service responds to.
    #[serde(default)]
    pub dial_event_type: DialEventType,
    /// Entity attribute used to initialize the dial's local value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_attribute: Option<String>,
    /// Explicit min/max/step; when absent, taken from the entity's attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<DialAttributes>,
    /// Allow tap (→ min) and hold (→ max) on the touchscreen strip.
    #[serde(default)]
    pub allow_touchscreen_events: bool,
}

impl Dial {
    /// Whether this control references `entity_id` (directly or linked).
    #[must_use]
    pub fn references_entity(&self, entity_id: &str) -> bool {
        references(self.entity_id.as_ref(), entity_id)
            || references(self.linked_entity.as_ref(), entity_id)
    }
}

/// Reference to a page, by position or name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRef {
    Index(usize),
    Name(String),
}

/// Options for a generated light-control page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightControlOptions {
    /// Explicit color swatches. Generated uniformly when empty.
    pub colors: Vec<Rgb>,
    /// Color-temperature swatches in Kelvin.
    pub color_temp_kelvin: Vec<u32>,
}

/// Parsed special behavior of a button.
///
/// Resolved once at configuration validation, never re-parsed per press.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecialAction {
    NextPage,
    PreviousPage,
    GoToPage(PageRef),
    ClosePage,
    TurnOff,
    LightControl(LightControlOptions),
    Reload,
    Empty,
}

impl SpecialAction {
    /// Parse the raw `special_type` / `special_type_data` pair.
    ///
    /// Errors are plain messages; the caller attaches the field path.
    pub fn parse(tag: &str, data: Option<&Value>) -> Result<Self, String> {
        let no_data = |action: Self| -> Result<Self, String> {
            if data.is_some() {
                Err(format!("special_type_data must be empty for {tag:?}"))
            } else {
                Ok(action)
            }
        };
        match tag {
            "next-page" => no_data(Self::NextPage),
            "previous-page" => no_data(Self::PreviousPage),
            "close-page" => no_data(Self::ClosePage),
            "turn-off" => no_data(Self::TurnOff),
            "empty" => no_data(Self::Empty),
            "reload" => no_data(Self::Reload),
            "go-to-page" => match data {
                Some(Value::Number(n)) => n
                    .as_u64()
                    .map(|i| Self::GoToPage(PageRef::Index(i as usize)))
                    .ok_or_else(|| "go-to-page index must be a non-negative integer".to_owned()),
                Some(Value::String(name)) => Ok(Self::GoToPage(PageRef::Name(name.clone()))),
                _ => Err("go-to-page requires an integer or page-name string".to_owned()),
            },
            "light-control" => Self::parse_light_control(data),
            other => Err(format!("unknown special_type {other:?}")),
        }
    }

    fn parse_light_control(data: Option<&Value>) -> Result<Self, String> {
        let mut options = LightControlOptions::default();
        let Some(value) = data else {
            return Ok(Self::LightControl(options));
        };
        let Value::Object(map) = value else {
            return Err("light-control data must be a mapping".to_owned());
        };
        for (key, entry) in map {
            match key.as_str() {
                "colors" => {
                    let Value::Array(items) = entry else {
                        return Err("colors must be a list of hex colors".to_owned());
                    };
                    for item in items {
                        let Value::String(s) = item else {
                            return Err("colors entries must be strings".to_owned());
                        };
                        let rgb =
                            Rgb::parse(s).map_err(|e| format!("colors entry invalid: {e}"))?;
                        options.colors.push(rgb);
                    }
                }
                "color_temp_kelvin" => {
                    let Value::Array(items) = entry else {
                        return Err("color_temp_kelvin must be a list of integers".to_owned());
                    };
                    for item in items {
                        let kelvin = item
                            .as_u64()
                            .ok_or_else(|| "color_temp_kelvin entries must be integers".to_owned())?;
                        options.color_temp_kelvin.push(kelvin as u32);
                    }
                }
                // Colormap sampling is out of scope; reject loudly rather
                // than silently ignoring the key.
                "colormap" => return Err("colormap is not supported; use colors".to_owned()),
                other => return Err(format!("unknown light-control key {other:?}")),
            }
        }
        Ok(Self::LightControl(options))
    }

    /// Whether this action navigates between pages.
    #[must_use]
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Self::NextPage
                | Self::PreviousPage
                | Self::GoToPage(_)
                | Self::ClosePage
                | Self::LightControl(_)
        )
    }
}

/// A named page of buttons and dials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Page {
    pub name: String,
    #[serde(default)]
    pub buttons: Vec<Button>,
    #[serde(default)]
    pub dials: Vec<Dial>,
}

impl Page {
    #[must_use]
    pub fn button(&self, index: usize) -> Option<&Button> {
        self.buttons.get(index)
    }

    #[must_use]
    pub fn dial(&self, index: usize) -> Option<&Dial> {
        self.dials.get(index)
    }
}
