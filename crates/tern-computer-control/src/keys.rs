//! Key chords such as `ctrl+shift+t` and their per-backend spellings.

use std::fmt;
use std::str::FromStr;

use crate::AutomationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    /// Command on macOS, the Windows key elsewhere.
    Super,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    pub modifiers: Vec<Modifier>,
    /// Lower-cased key name: a single character or a named key like `enter`.
    pub key: String,
}

const NAMED_KEYS: &[&str] = &[
    "enter", "tab", "space", "backspace", "delete", "escape", "up", "down", "left", "right",
    "home", "end", "pageup", "pagedown", "insert", "f1", "f2", "f3", "f4", "f5", "f6", "f7",
    "f8", "f9", "f10", "f11", "f12",
];

fn canonical_key(raw: &str) -> Option<String> {
    let lower = raw.to_lowercase();
    let name = match lower.as_str() {
        "return" => "enter",
        "esc" => "escape",
        "del" => "delete",
        "bksp" => "backspace",
        "pgup" => "pageup",
        "pgdn" => "pagedown",
        other => other,
    };
    if NAMED_KEYS.contains(&name) || name.chars().count() == 1 {
        Some(name.to_string())
    } else {
        None
    }
}

impl FromStr for KeyChord {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('+').map(str::trim).collect();
        let invalid = || AutomationError::InvalidArgument(format!("invalid key chord '{}'", s));

        let (key_part, modifier_parts) = parts.split_last().ok_or_else(invalid)?;
        if key_part.is_empty() {
            return Err(invalid());
        }

        let mut modifiers = Vec::new();
        for part in modifier_parts {
            let modifier = match part.to_lowercase().as_str() {
                "ctrl" | "control" => Modifier::Ctrl,
                "alt" | "option" | "opt" => Modifier::Alt,
                "shift" => Modifier::Shift,
                "super" | "cmd" | "command" | "meta" | "win" => Modifier::Super,
                other => {
                    return Err(AutomationError::InvalidArgument(format!(
                        "unknown modifier '{}' in key chord '{}'",
                        other, s
                    )))
                }
            };
            if !modifiers.contains(&modifier) {
                modifiers.push(modifier);
            }
        }
        modifiers.sort();

        let key = canonical_key(key_part).ok_or_else(|| {
            AutomationError::InvalidArgument(format!("unknown key '{}' in key chord '{}'", key_part, s))
        })?;

        Ok(KeyChord { modifiers, key })
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            let name = match m {
                Modifier::Ctrl => "ctrl",
                Modifier::Alt => "alt",
                Modifier::Shift => "shift",
                Modifier::Super => "super",
            };
            write!(f, "{}+", name)?;
        }
        write!(f, "{}", self.key)
    }
}

impl KeyChord {
    /// xdotool keysym syntax, e.g. `ctrl+shift+Return`.
    pub fn to_xdotool(&self) -> String {
        let key = match self.key.as_str() {
            "enter" => "Return".to_string(),
            "tab" => "Tab".to_string(),
            "space" => "space".to_string(),
            "backspace" => "BackSpace".to_string(),
            "delete" => "Delete".to_string(),
            "escape" => "Escape".to_string(),
            "up" => "Up".to_string(),
            "down" => "Down".to_string(),
            "left" => "Left".to_string(),
            "right" => "Right".to_string(),
            "home" => "Home".to_string(),
            "end" => "End".to_string(),
            "pageup" => "Prior".to_string(),
            "pagedown" => "Next".to_string(),
            "insert" => "Insert".to_string(),
            k if k.starts_with('f') && k.len() > 1 => k.to_uppercase(),
            k => k.to_string(),
        };
        let mut parts: Vec<String> = self
            .modifiers
            .iter()
            .map(|m| {
                match m {
                    Modifier::Ctrl => "ctrl",
                    Modifier::Alt => "alt",
                    Modifier::Shift => "shift",
                    Modifier::Super => "super",
                }
                .to_string()
            })
            .collect();
        parts.push(key);
        parts.join("+")
    }

    /// AppleScript `System Events` statement pressing this chord.
    pub fn to_applescript(&self) -> String {
        let using = if self.modifiers.is_empty() {
            String::new()
        } else {
            let names: Vec<&str> = self
                .modifiers
                .iter()
                .map(|m| match m {
                    Modifier::Ctrl => "control down",
                    Modifier::Alt => "option down",
                    Modifier::Shift => "shift down",
                    Modifier::Super => "command down",
                })
                .collect();
            format!(" using {{{}}}", names.join(", "))
        };

        match mac_key_code(&self.key) {
            Some(code) => format!("key code {}{}", code, using),
            None => format!("keystroke \"{}\"{}", applescript_escape(&self.key), using),
        }
    }

    /// `System.Windows.Forms.SendKeys` syntax, e.g. `^+t`.
    pub fn to_sendkeys(&self) -> Result<String, AutomationError> {
        let mut out = String::new();
        for m in &self.modifiers {
            match m {
                Modifier::Ctrl => out.push('^'),
                Modifier::Alt => out.push('%'),
                Modifier::Shift => out.push('+'),
                Modifier::Super => {
                    return Err(AutomationError::InvalidArgument(
                        "the Windows key cannot be sent through SendKeys".to_string(),
                    ))
                }
            }
        }
        let key = match self.key.as_str() {
            "enter" => "{ENTER}".to_string(),
            "tab" => "{TAB}".to_string(),
            "space" => " ".to_string(),
            "backspace" => "{BACKSPACE}".to_string(),
            "delete" => "{DELETE}".to_string(),
            "escape" => "{ESC}".to_string(),
            "up" => "{UP}".to_string(),
            "down" => "{DOWN}".to_string(),
            "left" => "{LEFT}".to_string(),
            "right" => "{RIGHT}".to_string(),
            "home" => "{HOME}".to_string(),
            "end" => "{END}".to_string(),
            "pageup" => "{PGUP}".to_string(),
            "pagedown" => "{PGDN}".to_string(),
            "insert" => "{INSERT}".to_string(),
            k if k.starts_with('f') && k.len() > 1 => format!("{{{}}}", k.to_uppercase()),
            k => sendkeys_escape(k),
        };
        out.push_str(&key);
        Ok(out)
    }
}

fn mac_key_code(key: &str) -> Option<u32> {
    let code = match key {
        "enter" => 36,
        "tab" => 48,
        "space" => 49,
        "backspace" => 51,
        "escape" => 53,
        "delete" => 117,
        "home" => 115,
        "pageup" => 116,
        "end" => 119,
        "pagedown" => 121,
        "left" => 123,
        "right" => 124,
        "down" => 125,
        "up" => 126,
        "f1" => 122,
        "f2" => 120,
        "f3" => 99,
        "f4" => 118,
        "f5" => 96,
        "f6" => 97,
        "f7" => 98,
        "f8" => 100,
        "f9" => 101,
        "f10" => 109,
        "f11" => 103,
        "f12" => 111,
        _ => return None,
    };
    Some(code)
}

pub(crate) fn applescript_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escape characters SendKeys treats as syntax.
pub(crate) fn sendkeys_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '+' | '^' | '%' | '~' | '(' | ')' | '[' | ']' | '{' | '}' => {
                out.push('{');
                out.push(c);
                out.push('}');
            }
            '\n' => out.push_str("{ENTER}"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chord_normalises_modifiers() {
        let chord: KeyChord = "Shift+CTRL+t".parse().unwrap();
        assert_eq!(chord.modifiers, vec![Modifier::Ctrl, Modifier::Shift]);
        assert_eq!(chord.key, "t");
        assert_eq!(chord.to_string(), "ctrl+shift+t");
    }

    #[test]
    fn test_parse_named_keys_and_aliases() {
        assert_eq!("Return".parse::<KeyChord>().unwrap().key, "enter");
        assert_eq!("cmd+esc".parse::<KeyChord>().unwrap().modifiers, vec![Modifier::Super]);
    }

    #[test]
    fn test_invalid_chords() {
        assert!("".parse::<KeyChord>().is_err());
        assert!("ctrl+".parse::<KeyChord>().is_err());
        assert!("hyper+a".parse::<KeyChord>().is_err());
        assert!("ctrl+banana".parse::<KeyChord>().is_err());
    }

    #[test]
    fn test_backend_spellings() {
        let chord: KeyChord = "ctrl+shift+enter".parse().unwrap();
        assert_eq!(chord.to_xdotool(), "ctrl+shift+Return");
        assert_eq!(chord.to_applescript(), "key code 36 using {control down, shift down}");
        assert_eq!(chord.to_sendkeys().unwrap(), "^+{ENTER}");

        let plain: KeyChord = "cmd+c".parse().unwrap();
        assert_eq!(plain.to_applescript(), "keystroke \"c\" using {command down}");
        assert!(plain.to_sendkeys().is_err());
    }

    #[test]
    fn test_sendkeys_escape() {
        assert_eq!(sendkeys_escape("a+b{c}"), "a{+}b{{}c{}}");
    }
}
