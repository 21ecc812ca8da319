//! Structured hook names.
//!
//! Scripts expose hooks as plain functions whose names follow a fixed
//! grammar:
//!
//! ```text
//! request | response                          intercept hooks
//! (req|res)_edit_(in|out)[_<tab>]             editor hooks
//! ```
//!
//! Names are parsed once into a [`HookKey`]; everything else works on keys.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::interpreter::Callable;

/// Which HTTP message a hook handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
}

impl MessageKind {
    fn intercept_name(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }

    fn editor_prefix(self) -> &'static str {
        match self {
            Self::Request => "req_edit_",
            Self::Response => "res_edit_",
        }
    }
}

/// Direction of an editor hook.
///
/// `In` renders a message for display, `Out` turns the edited text back
/// into a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// A recognized hook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HookKey {
    /// Called for every proxied message of this kind.
    Intercept { kind: MessageKind },
    /// Called by an editor tab; `tab` is `None` for the default tab.
    Editor {
        kind: MessageKind,
        direction: Direction,
        tab: Option<String>,
    },
}

impl HookKey {
    pub fn intercept(kind: MessageKind) -> Self {
        Self::Intercept { kind }
    }

    pub fn editor(kind: MessageKind, direction: Direction, tab: Option<&str>) -> Self {
        Self::Editor {
            kind,
            direction,
            tab: tab.map(str::to_string),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Intercept { kind } | Self::Editor { kind, .. } => *kind,
        }
    }

    /// Name of the script function implementing this hook.
    pub fn function_name(&self) -> String {
        match self {
            Self::Intercept { kind } => kind.intercept_name().to_string(),
            Self::Editor {
                kind,
                direction,
                tab,
            } => {
                let mut name = format!("{}{}", kind.editor_prefix(), direction.as_str());
                if let Some(tab) = tab {
                    name.push('_');
                    name.push_str(tab);
                }
                name
            }
        }
    }

    /// Parse a function name, returning `None` if it is not a hook.
    pub fn parse(name: &str) -> Option<Self> {
        for kind in [MessageKind::Request, MessageKind::Response] {
            if name == kind.intercept_name() {
                return Some(Self::intercept(kind));
            }

            let Some(rest) = name.strip_prefix(kind.editor_prefix()) else {
                continue;
            };
            for direction in [Direction::In, Direction::Out] {
                let Some(suffix) = rest.strip_prefix(direction.as_str()) else {
                    continue;
                };
                if suffix.is_empty() {
                    return Some(Self::editor(kind, direction, None));
                }
                return match suffix.strip_prefix('_') {
                    Some(tab) if !tab.is_empty() => Some(Self::editor(kind, direction, Some(tab))),
                    _ => None,
                };
            }
        }
        None
    }
}

impl fmt::Display for HookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.function_name())
    }
}

/// Whether `name` follows the hook naming grammar.
pub fn is_hook_name(name: &str) -> bool {
    HookKey::parse(name).is_some()
}

/// An editor tab the script provides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorTab {
    pub kind: MessageKind,
    /// `None` for the default tab.
    pub name: Option<String>,
    pub has_in: bool,
    pub has_out: bool,
}

impl EditorTab {
    /// A tab without an `in` hook has nothing to display.
    pub fn is_displayable(&self) -> bool {
        self.has_in
    }

    /// A tab with both hooks round-trips edits back into the message.
    pub fn is_editable(&self) -> bool {
        self.has_in && self.has_out
    }
}

/// The hooks implemented by one loaded script.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    hooks: FxHashMap<HookKey, String>,
}

impl HookRegistry {
    /// Index the hook-named functions among `callables`.
    pub fn from_callables(callables: &[Callable]) -> Self {
        let hooks = callables
            .iter()
            .filter_map(|c| HookKey::parse(&c.name).map(|key| (key, c.name.clone())))
            .collect();
        Self { hooks }
    }

    pub fn contains(&self, key: &HookKey) -> bool {
        self.hooks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// All implemented hooks, in a stable order.
    pub fn keys(&self) -> Vec<HookKey> {
        let mut keys: Vec<_> = self.hooks.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether the script intercepts messages of `kind`.
    pub fn intercepts(&self, kind: MessageKind) -> bool {
        self.contains(&HookKey::intercept(kind))
    }

    /// Editor tabs for `kind`, sorted with the default tab first.
    pub fn editor_tabs(&self, kind: MessageKind) -> Vec<EditorTab> {
        let mut tabs: FxHashMap<Option<String>, EditorTab> = FxHashMap::default();
        for key in self.hooks.keys() {
            let HookKey::Editor {
                kind: k,
                direction,
                tab,
            } = key
            else {
                continue;
            };
            if *k != kind {
                continue;
            }
            let entry = tabs.entry(tab.clone()).or_insert_with(|| EditorTab {
                kind,
                name: tab.clone(),
                has_in: false,
                has_out: false,
            });
            match direction {
                Direction::In => entry.has_in = true,
                Direction::Out => entry.has_out = true,
            }
        }

        let mut tabs: Vec<_> = tabs.into_values().collect();
        tabs.sort_by(|a, b| a.name.cmp(&b.name));
        tabs
    }
}
