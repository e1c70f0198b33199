#![forbid(unsafe_code)]

//! A simulated deck driven from stdin.
//!
//! Stands in for real hardware: tile images optionally land as PNGs in a
//! directory, and input events are typed as text commands. One command per
//! line:
//!
//! ```text
//! press <key>        tap a key (press and release)
//! turn <dial> <n>    turn a dial by n detents (negative for left)
//! push <dial>        push a dial
//! tap <x>            tap the touchscreen at column x
//! hold <x>           long-press the touchscreen at column x
//! drag <x> <x2>      drag across the touchscreen
//! quit               shut down
//! ```

use hassdeck_core::event::{InputEvent, RuntimeEvent, TouchKind};
use hassdeck_runtime::{DeckDevice, DeckLayout, DeviceError, Feed, StopSignal};
use image::RgbImage;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use tracing::{debug, info, warn};

pub struct SimDeck {
    layout: DeckLayout,
    output: Option<PathBuf>,
}

impl SimDeck {
    pub fn new(key_count: u8, dial_count: u8, output: Option<PathBuf>) -> Self {
        Self {
            layout: DeckLayout {
                key_count,
                dial_count,
                key_size: (96, 96),
                dial_size: (200, 100),
                touchscreen_width: 200 * u32::from(dial_count),
            },
            output,
        }
    }

    fn dump(&self, kind: &str, index: u8, image: &RgbImage) -> Result<(), DeviceError> {
        let Some(dir) = &self.output else {
            return Ok(());
        };
        std::fs::create_dir_all(dir).map_err(|e| DeviceError::Backend(e.to_string()))?;
        let path = dir.join(format!("{kind}-{index:02}.png"));
        image
            .save(&path)
            .map_err(|e| DeviceError::Backend(e.to_string()))
    }
}

impl DeckDevice for SimDeck {
    fn layout(&self) -> DeckLayout {
        self.layout
    }

    fn set_key_image(&mut self, index: u8, image: &RgbImage) -> Result<(), DeviceError> {
        if index >= self.layout.key_count {
            return Err(DeviceError::BadIndex(index));
        }
        self.dump("key", index, image)
    }

    fn set_dial_image(&mut self, index: u8, image: &RgbImage) -> Result<(), DeviceError> {
        if index >= self.layout.dial_count {
            return Err(DeviceError::BadIndex(index));
        }
        self.dump("dial", index, image)
    }

    fn set_brightness(&mut self, percent: u8) -> Result<(), DeviceError> {
        debug!(percent, "brightness");
        Ok(())
    }
}

/// Reads simulated input commands from stdin.
pub struct StdinFeed;

impl Feed for StdinFeed {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn run(self: Box<Self>, sender: mpsc::Sender<RuntimeEvent>, stop: StopSignal) {
        info!("type `press <key>`, `turn <dial> <n>`, ... or `quit`");
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if stop.is_stopped() {
                return;
            }
            let Ok(line) = line else { break };
            for event in parse_command(line.trim()) {
                if sender.send(event).is_err() {
                    return;
                }
            }
        }
        // stdin closed; treat it like a quit.
        let _ = sender.send(RuntimeEvent::Shutdown);
    }
}

/// One command can expand to a press and release pair.
fn parse_command(line: &str) -> Vec<RuntimeEvent> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Vec::new();
    };
    let arg = |w: Option<&str>| w.and_then(|v| v.parse::<i64>().ok());
    let first = arg(words.next());
    let second = arg(words.next());

    let input = |event: InputEvent| vec![RuntimeEvent::Input(event)];
    match (verb, first, second) {
        ("press", Some(index), None) => {
            let index = index as u8;
            vec![
                RuntimeEvent::Input(InputEvent::Key { index, pressed: true }),
                RuntimeEvent::Input(InputEvent::Key { index, pressed: false }),
            ]
        }
        ("turn", Some(index), Some(delta)) => input(InputEvent::DialTurn {
            index: index as u8,
            delta: delta as i32,
        }),
        ("push", Some(index), None) => {
            let index = index as u8;
            vec![
                RuntimeEvent::Input(InputEvent::DialPush { index, pressed: true }),
                RuntimeEvent::Input(InputEvent::DialPush { index, pressed: false }),
            ]
        }
        ("tap", Some(x), None) => input(InputEvent::Touch {
            x: x as i32,
            kind: TouchKind::Tap,
        }),
        ("hold", Some(x), None) => input(InputEvent::Touch {
            x: x as i32,
            kind: TouchKind::Hold,
        }),
        ("drag", Some(x), Some(to_x)) => input(InputEvent::Touch {
            x: x as i32,
            kind: TouchKind::Drag { to_x: to_x as i32 },
        }),
        ("quit", None, None) => vec![RuntimeEvent::Shutdown],
        _ => {
            warn!(line, "unrecognized command");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_expands_to_press_and_release() {
        let events = parse_command("press 3");
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            RuntimeEvent::Input(InputEvent::Key { index: 3, pressed: true })
        ));
        assert!(matches!(
            events[1],
            RuntimeEvent::Input(InputEvent::Key { index: 3, pressed: false })
        ));
    }

    #[test]
    fn turn_carries_signed_deltas() {
        let events = parse_command("turn 1 -4");
        assert!(matches!(
            events[0],
            RuntimeEvent::Input(InputEvent::DialTurn { index: 1, delta: -4 })
        ));
    }

    #[test]
    fn touch_commands_map_to_kinds() {
        assert!(matches!(
            parse_command("drag 300 50")[0],
            RuntimeEvent::Input(InputEvent::Touch {
                x: 300,
                kind: TouchKind::Drag { to_x: 50 }
            })
        ));
        assert!(matches!(
            parse_command("hold 10")[0],
            RuntimeEvent::Input(InputEvent::Touch { x: 10, kind: TouchKind::Hold })
        ));
    }

    #[test]
    fn garbage_produces_nothing() {
        assert!(parse_command("").is_empty());
        assert!(parse_command("press").is_empty());
        assert!(parse_command("press nine").is_empty());
        assert!(parse_command("levitate 3").is_empty());
    }

    #[test]
    fn quit_is_a_shutdown() {
        assert!(matches!(parse_command("quit")[0], RuntimeEvent::Shutdown));
    }

    #[test]
    fn sim_deck_rejects_out_of_range_indices() {
        let mut deck = SimDeck::new(4, 2, None);
        let image = RgbImage::new(96, 96);
        assert!(deck.set_key_image(3, &image).is_ok());
        assert!(matches!(
            deck.set_key_image(4, &image),
            Err(DeviceError::BadIndex(4))
        ));
    }
}
