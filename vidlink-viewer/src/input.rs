//! Local input commands → [`InputEvent`] conversion.
//!
//! The viewer reads one command per line:
//!
//! ```text
//! key down 65
//! key up 65
//! move 0.5 0.25
//! button down left
//! button up right
//! ```

use vidlink_core::{InputEvent, PointerButton};

use crate::config::InputConfig;

/// Why a command line could not be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    BadArgument(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::Unknown(cmd) => write!(f, "unknown command: {cmd}"),
            Self::BadArgument(arg) => write!(f, "bad argument: {arg}"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Parse one command line.
pub fn parse_command(line: &str) -> Result<InputEvent, CommandError> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or(CommandError::Empty)?;

    match verb.to_ascii_lowercase().as_str() {
        "key" => {
            let pressed = press(words.next())?;
            let code = arg(words.next())?;
            let code = code
                .parse::<u32>()
                .map_err(|_| CommandError::BadArgument(code.into()))?;
            Ok(if pressed {
                InputEvent::KeyDown(code)
            } else {
                InputEvent::KeyUp(code)
            })
        }
        "move" => {
            let x = coordinate(words.next())?;
            let y = coordinate(words.next())?;
            Ok(InputEvent::pointer(x, y))
        }
        "button" => {
            let pressed = press(words.next())?;
            let name = arg(words.next())?;
            let button = name
                .parse::<PointerButton>()
                .map_err(|_| CommandError::BadArgument(name.into()))?;
            Ok(if pressed {
                InputEvent::ButtonDown(button)
            } else {
                InputEvent::ButtonUp(button)
            })
        }
        other => Err(CommandError::Unknown(other.into())),
    }
}

/// Whether the configuration allows forwarding this event.
pub fn is_forwarded(event: &InputEvent, config: &InputConfig) -> bool {
    match event {
        InputEvent::KeyDown(_) | InputEvent::KeyUp(_) => config.forward_keyboard,
        InputEvent::PointerMove { .. } | InputEvent::ButtonDown(_) | InputEvent::ButtonUp(_) => {
            config.forward_pointer
        }
    }
}

fn arg(word: Option<&str>) -> Result<&str, CommandError> {
    word.ok_or_else(|| CommandError::BadArgument("missing argument".into()))
}

fn press(word: Option<&str>) -> Result<bool, CommandError> {
    match arg(word)? {
        "down" | "press" => Ok(true),
        "up" | "release" => Ok(false),
        other => Err(CommandError::BadArgument(other.into())),
    }
}

fn coordinate(word: Option<&str>) -> Result<f32, CommandError> {
    let word = arg(word)?;
    word.parse::<f32>()
        .map_err(|_| CommandError::BadArgument(word.into()))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys() {
        assert_eq!(parse_command("key down 65"), Ok(InputEvent::KeyDown(65)));
        assert_eq!(parse_command("  KEY release 13 "), Ok(InputEvent::KeyUp(13)));
    }

    #[test]
    fn parses_pointer() {
        assert_eq!(
            parse_command("move 0.5 0.25"),
            Ok(InputEvent::PointerMove { x: 0.5, y: 0.25 })
        );
        assert_eq!(
            parse_command("move 2 -1"),
            Ok(InputEvent::PointerMove { x: 1.0, y: 0.0 })
        );
        assert_eq!(
            parse_command("button down left"),
            Ok(InputEvent::ButtonDown(PointerButton::Left))
        );
        assert_eq!(
            parse_command("button up m"),
            Ok(InputEvent::ButtonUp(PointerButton::Middle))
        );
    }

    #[test]
    fn rejects_bad_lines() {
        assert_eq!(parse_command("   "), Err(CommandError::Empty));
        assert_eq!(parse_command("scroll 3"), Err(CommandError::Unknown("scroll".into())));
        assert!(matches!(parse_command("key down"), Err(CommandError::BadArgument(_))));
        assert!(matches!(parse_command("key sideways 1"), Err(CommandError::BadArgument(_))));
        assert!(matches!(parse_command("move x 1"), Err(CommandError::BadArgument(_))));
        assert!(matches!(parse_command("button down thumb"), Err(CommandError::BadArgument(_))));
    }

    #[test]
    fn filtering_follows_config() {
        let config = InputConfig {
            forward_pointer: false,
            forward_keyboard: true,
        };
        assert!(is_forwarded(&InputEvent::KeyDown(1), &config));
        assert!(!is_forwarded(&InputEvent::pointer(0.1, 0.1), &config));
        assert!(!is_forwarded(&InputEvent::ButtonUp(PointerButton::Right), &config));
    }
}
