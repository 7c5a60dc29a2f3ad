use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of user interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    /// Debounced text entry
    Typing,
    /// Final value committed by a change event
    Input,
    Navigation,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Typing => "typing",
            ActionKind::Input => "input",
            ActionKind::Navigation => "navigation",
        }
    }
}

/// How an element looked when an interaction was recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub css_selector_guess: String,
    pub human_readable_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_kind: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer_html: Option<String>,
}

/// One user interaction. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvent {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub timestamp: u64,
    pub page_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ActionEvent {
    pub fn navigation(url: impl Into<String>, timestamp: u64) -> Self {
        Self {
            kind: ActionKind::Navigation,
            timestamp,
            page_url: url.into(),
            element: None,
            value: None,
        }
    }
}
