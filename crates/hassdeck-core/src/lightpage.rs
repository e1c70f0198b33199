#![forbid(unsafe_code)]

//! Generated light-control page.
//!
//! A `light-control` button opens a detached page built here: a block of
//! color swatches, optional color-temperature swatches, a brightness row,
//! and a close-page button. Each swatch is an ordinary button calling
//! `light.turn_on`, so the rest of the pipeline treats the page like any
//! other.

use crate::color::{Rgb, kelvin_to_rgb, uniform_colors};
use crate::model::{Button, LightControlOptions, Page, SpecialAction};
use crate::template::Templated;
use serde_json::{Map, Value, json};

/// Swatch count when no explicit color list is configured.
const DEFAULT_COLOR_COUNT: usize = 9;

const BRIGHTNESS_STEPS: [u8; 5] = [0, 10, 30, 60, 100];

/// Build the detached page controlling `entity_id`.
#[must_use]
pub fn light_page(entity_id: &str, options: &LightControlOptions) -> Page {
    let colors: Vec<Rgb> = if options.colors.is_empty() {
        uniform_colors(DEFAULT_COLOR_COUNT)
    } else {
        options.colors.clone()
    };

    let mut buttons = Vec::new();

    for color in colors {
        buttons.push(swatch(
            entity_id,
            color,
            None,
            json!({ "rgb_color": [color.r, color.g, color.b] }),
        ));
    }

    for &kelvin in &options.color_temp_kelvin {
        buttons.push(swatch(
            entity_id,
            kelvin_to_rgb(kelvin),
            None,
            json!({ "color_temp_kelvin": kelvin }),
        ));
    }

    for pct in BRIGHTNESS_STEPS {
        let background = Rgb::WHITE.scaled(f32::from(pct) / 100.0);
        buttons.push(swatch(
            entity_id,
            background,
            Some(format!("{pct}%")),
            json!({ "brightness_pct": pct }),
        ));
    }

    buttons.push(Button {
        special_type: Some("close-page".to_owned()),
        special: Some(SpecialAction::ClosePage),
        ..Button::default()
    });

    Page {
        name: "Lights".to_owned(),
        buttons,
        dials: Vec::new(),
    }
}

fn swatch(entity_id: &str, background: Rgb, text: Option<String>, extra: Value) -> Button {
    let mut data = Map::new();
    data.insert("entity_id".to_owned(), Value::String(entity_id.to_owned()));
    if let Value::Object(extra) = extra {
        data.extend(extra);
    }
    let text_color = background.max_contrast();
    Button {
        service: Some(Templated::from("light.turn_on")),
        service_data: Some(data),
        icon_background_color: Templated::from(background.to_hex().as_str()),
        text: text
            .as_deref()
            .map(Templated::from)
            .unwrap_or_default(),
        text_color: text
            .is_some()
            .then(|| Templated::from(text_color.to_hex().as_str())),
        ..Button::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_counts() {
        let page = light_page("light.desk", &LightControlOptions::default());
        // 9 color swatches, 5 brightness steps, 1 close button.
        assert_eq!(page.buttons.len(), 15);
        assert_eq!(
            page.buttons.last().unwrap().special,
            Some(SpecialAction::ClosePage)
        );
    }

    #[test]
    fn explicit_colors_and_kelvin_replace_defaults() {
        let options = LightControlOptions {
            colors: vec![Rgb::new(255, 0, 0), Rgb::new(0, 0, 255)],
            color_temp_kelvin: vec![2700, 4000, 6500],
        };
        let page = light_page("light.desk", &options);
        assert_eq!(page.buttons.len(), 2 + 3 + 5 + 1);
    }

    #[test]
    fn swatches_target_the_entity() {
        let page = light_page("light.desk", &LightControlOptions::default());
        let first = &page.buttons[0];
        let data = first.service_data.as_ref().unwrap();
        assert_eq!(data.get("entity_id"), Some(&json!("light.desk")));
        assert!(data.contains_key("rgb_color"));
        assert_eq!(
            first.service.as_ref().and_then(Templated::as_literal),
            Some("light.turn_on")
        );
    }

    #[test]
    fn brightness_text_contrasts_with_background() {
        let page = light_page("light.desk", &LightControlOptions::default());
        let dark = page
            .buttons
            .iter()
            .find(|b| b.text.source() == "0%")
            .unwrap();
        assert_eq!(
            dark.text_color.as_ref().and_then(Templated::as_literal),
            Some("#ffffff")
        );
        let bright = page
            .buttons
            .iter()
            .find(|b| b.text.source() == "100%")
            .unwrap();
        assert_eq!(
            bright.text_color.as_ref().and_then(Templated::as_literal),
            Some("#000000")
        );
    }
}
