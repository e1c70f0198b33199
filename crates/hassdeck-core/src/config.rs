#![forbid(unsafe_code)]

//! Top-level configuration document and its validation pass.
//!
//! Deserialization gets the shapes right; [`Config::validate`] enforces the
//! cross-cutting rules deserialization cannot express (page-name
//! uniqueness, navigation targets that resolve, well-formed special types)
//! and fills in the parsed [`SpecialAction`] on every button. A document
//! that fails validation is rejected whole; there is no partial load.

use crate::model::{Page, PageRef, SpecialAction};
use crate::template::Delay;
use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_brightness() -> u8 {
    100
}

fn default_auto_reload() -> bool {
    true
}

fn default_touch_hold_ms() -> u64 {
    500
}

/// The whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Ordered pages reachable by next/previous navigation.
    #[serde(default)]
    pub pages: Vec<Page>,
    /// Pages reachable only by explicit go-to-page; outside the cycle.
    #[serde(default)]
    pub anonymous_pages: Vec<Page>,
    /// Screen brightness percentage applied at startup and on wake.
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    /// Optional `input_boolean` mirrored to the awake/asleep state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_entity_id: Option<String>,
    /// Reload the configuration when the file changes on disk.
    #[serde(default = "default_auto_reload")]
    pub auto_reload: bool,
    /// Touch duration in milliseconds from which a touch counts as a hold.
    #[serde(default = "default_touch_hold_ms")]
    pub touch_hold_ms: u64,
}

/// A configuration rejected by validation. The message carries the path of
/// the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("duplicate page name {name:?}")]
    DuplicatePageName { name: String },
    #[error("{path}: {message}")]
    InvalidField { path: String, message: String },
    #[error("{path}: go-to-page target {target:?} does not exist")]
    UnknownPage { path: String, target: String },
    #[error("configuration has no pages")]
    Empty,
}

impl Config {
    /// Validate the document and resolve every button's special action.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.pages.is_empty() {
            return Err(ConfigError::Empty);
        }

        if self.brightness > 100 {
            return Err(ConfigError::InvalidField {
                path: "brightness".to_owned(),
                message: format!("must be between 0 and 100, got {}", self.brightness),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for page in self.pages.iter().chain(&self.anonymous_pages) {
            if !seen.insert(page.name.as_str()) {
                return Err(ConfigError::DuplicatePageName {
                    name: page.name.clone(),
                });
            }
        }

        // Split borrow: special-action targets are checked against the page
        // lists while buttons are mutated, so collect names up front.
        let page_count = self.pages.len();
        let known_names: Vec<String> = self
            .pages
            .iter()
            .chain(&self.anonymous_pages)
            .map(|p| p.name.clone())
            .collect();

        for (group, pages) in [("pages", &mut self.pages), ("anonymous_pages", &mut self.anonymous_pages)]
        {
            for (page_idx, page) in pages.iter_mut().enumerate() {
                for (button_idx, button) in page.buttons.iter_mut().enumerate() {
                    let path = format!("{group}[{page_idx}].buttons[{button_idx}]");
                    if let Some(tag) = &button.special_type {
                        let action =
                            SpecialAction::parse(tag, button.special_type_data.as_ref()).map_err(
                                |message| ConfigError::InvalidField {
                                    path: format!("{path}.special_type"),
                                    message,
                                },
                            )?;
                        if let SpecialAction::GoToPage(target) = &action {
                            check_target(target, page_count, &known_names, &path)?;
                        }
                        button.special = Some(action);
                    } else if button.special_type_data.is_some() {
                        return Err(ConfigError::InvalidField {
                            path: format!("{path}.special_type_data"),
                            message: "special_type_data without special_type".to_owned(),
                        });
                    }
                    check_delay(&button.delay, &path)?;
                }
                for (dial_idx, dial) in page.dials.iter_mut().enumerate() {
                    let path = format!("{group}[{page_idx}].dials[{dial_idx}]");
                    check_delay(&dial.delay, &path)?;
                    if let Some(attrs) = &dial.attributes
                        && (attrs.max < attrs.min || attrs.step <= 0.0)
                    {
                        return Err(ConfigError::InvalidField {
                            path: format!("{path}.attributes"),
                            message: format!(
                                "range [{}, {}] step {} is not usable",
                                attrs.min, attrs.max, attrs.step
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Position of a named page within the ordered cycle.
    #[must_use]
    pub fn page_index(&self, name: &str) -> Option<usize> {
        self.pages.iter().position(|p| p.name == name)
    }

    /// An anonymous page by name.
    #[must_use]
    pub fn anonymous_page(&self, name: &str) -> Option<&Page> {
        self.anonymous_pages.iter().find(|p| p.name == name)
    }
}

fn check_target(
    target: &PageRef,
    page_count: usize,
    known_names: &[String],
    path: &str,
) -> Result<(), ConfigError> {
    match target {
        PageRef::Index(i) if *i < page_count => Ok(()),
        PageRef::Index(i) => Err(ConfigError::UnknownPage {
            path: format!("{path}.special_type_data"),
            target: i.to_string(),
        }),
        PageRef::Name(name) if known_names.iter().any(|n| n == name) => Ok(()),
        PageRef::Name(name) => Err(ConfigError::UnknownPage {
            path: format!("{path}.special_type_data"),
            target: name.clone(),
        }),
    }
}

fn check_delay(delay: &Delay, path: &str) -> Result<(), ConfigError> {
    match delay {
        Delay::Seconds(s) if *s < 0.0 || !s.is_finite() => Err(ConfigError::InvalidField {
            path: format!("{path}.delay"),
            message: format!("delay must be a finite non-negative number, got {s}"),
        }),
        // A literal string that is neither a number nor a template can
        // never resolve; catch it at load time.
        Delay::Expression(t) => match t.as_literal() {
            Some(s) if s.trim().parse::<f64>().is_err() => Err(ConfigError::InvalidField {
                path: format!("{path}.delay"),
                message: format!("delay is not a number: {s:?}"),
            }),
            _ => Ok(()),
        },
        Delay::Seconds(_) => Ok(()),
    }
}
