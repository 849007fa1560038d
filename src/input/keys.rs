use crate::error::InputError;

/// Virtual-key codes the Executor may name in a chord.
const VK_TABLE: &[(&str, u16)] = &[
    ("enter", 0x0D),
    ("tab", 0x09),
    ("escape", 0x1B),
    ("esc", 0x1B),
    ("windows", 0x5B),
    ("win", 0x5B),
    ("ctrl", 0x11),
    ("alt", 0x12),
    ("shift", 0x10),
    ("f4", 0x73),
    ("c", 0x43),
    ("v", 0x56),
    ("t", 0x54),
    ("w", 0x57),
    ("f", 0x46),
    ("l", 0x4C),
    ("r", 0x52),
    ("backspace", 0x08),
    ("delete", 0x2E),
    ("space", 0x20),
    ("home", 0x24),
    ("end", 0x23),
    ("pageup", 0x21),
    ("pagedown", 0x22),
    ("left", 0x25),
    ("up", 0x26),
    ("right", 0x27),
    ("down", 0x28),
];

pub fn lookup(token: &str) -> Option<u16> {
    VK_TABLE
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, vk)| *vk)
}

/// A `+`-separated key combination resolved up front, so a chord with any
/// unknown token never reaches the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    text: String,
    keys: Vec<u16>,
}

impl KeyChord {
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let lowered = raw.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split('+')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return Err(InputError::EmptyChord);
        }

        let keys = tokens
            .iter()
            .map(|t| lookup(t).ok_or_else(|| InputError::UnknownKey(t.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            text: tokens.join("+"),
            keys,
        })
    }

    /// Normalized form, e.g. `ctrl+c`.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Keys in press order. Release happens in reverse.
    pub fn keys(&self) -> &[u16] {
        &self.keys
    }
}
