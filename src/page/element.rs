//! Element snapshots reported by the page and the descriptors derived from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::action::ElementDescriptor;
use crate::util::truncate_chars;

const OUTER_HTML_MAX_CHARS: usize = 500;
const ELLIPSIS: &str = "...";

/// Key used to debounce typing per element. Elements without stable
/// identifiers fall back to tag plus position among siblings.
pub type ElementKey = String;

/// The parts of a DOM element the recorder looks at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    /// Tag name as the DOM reports it (usually upper case)
    pub tag_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text_content: Option<String>,
    /// Live `value` property, which may differ from the attribute
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub is_content_editable: bool,
    #[serde(default)]
    pub sibling_index: Option<usize>,
    #[serde(default)]
    pub outer_html: Option<String>,
}

impl ElementSnapshot {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn content_editable(mut self) -> Self {
        self.is_content_editable = true;
        self
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.sibling_index = Some(index);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn non_empty_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).filter(|v| !v.is_empty())
    }

    pub fn id(&self) -> Option<&str> {
        self.non_empty_attr("id")
    }

    pub fn tag_lower(&self) -> String {
        self.tag_name.to_ascii_lowercase()
    }

    pub fn input_type(&self) -> Option<&str> {
        self.attr("type")
    }

    pub fn is_password(&self) -> bool {
        self.input_type()
            .is_some_and(|ty| ty.eq_ignore_ascii_case("password"))
    }

    /// Inputs, textareas and contenteditable regions produce typing actions
    pub fn is_text_entry(&self) -> bool {
        self.tag_name.eq_ignore_ascii_case("input")
            || self.tag_name.eq_ignore_ascii_case("textarea")
            || self.is_content_editable
    }

    pub fn key(&self) -> ElementKey {
        if let Some(id) = self.id() {
            return id.to_string();
        }
        if let Some(name) = self.non_empty_attr("name") {
            return name.to_string();
        }
        match self.sibling_index {
            Some(index) => format!("{}_{}", self.tag_name.to_ascii_uppercase(), index),
            None => format!("{}_-1", self.tag_name.to_ascii_uppercase()),
        }
    }

    /// Best human-facing label, in a fixed priority order.
    pub fn readable_name(&self, max_chars: usize) -> String {
        if let Some(text) = self.text_content.as_deref().map(str::trim) {
            if !text.is_empty() {
                if text.chars().count() <= max_chars {
                    return text.to_string();
                }
                let keep = max_chars.saturating_sub(ELLIPSIS.len());
                return format!("{}{}", truncate_chars(text, keep), ELLIPSIS);
            }
        }

        for name in ["aria-label", "title", "placeholder"] {
            if let Some(label) = self.attr(name) {
                return label.to_string();
            }
        }
        if let Some(value) = self.non_empty_attr("value") {
            return value.to_string();
        }
        if let Some(alt) = self.attr("alt") {
            return alt.to_string();
        }
        if let Some(id) = self.id() {
            return format!("#{id}");
        }
        if let Some(name) = self.attr("name") {
            return name.to_string();
        }
        if let Some(ty) = self.input_type() {
            return format!("{}[type=\"{}\"]", self.tag_lower(), ty);
        }
        self.tag_lower()
    }

    pub fn selector_guess(&self) -> String {
        if let Some(id) = self.id() {
            return format!("#{id}");
        }
        let tag = self.tag_lower();
        match self.non_empty_attr("class") {
            Some(class) => {
                let classes: Vec<&str> = class.split_whitespace().collect();
                format!("{}.{}", tag, classes.join("."))
            }
            None => tag,
        }
    }

    pub fn describe(&self, readable_max_chars: usize) -> ElementDescriptor {
        let input_kind = if self.tag_name.eq_ignore_ascii_case("input") {
            Some(self.input_type().unwrap_or("text").to_string())
        } else {
            None
        };
        ElementDescriptor {
            tag: self.tag_lower(),
            id: self.id().map(str::to_string),
            class_name: self.non_empty_attr("class").map(str::to_string),
            css_selector_guess: self.selector_guess(),
            human_readable_name: self.readable_name(readable_max_chars),
            input_kind,
            attributes: self.attributes.clone(),
            outer_html: self.outer_html.as_deref().map(cap_outer_html),
        }
    }
}

fn cap_outer_html(html: &str) -> String {
    if html.chars().count() <= OUTER_HTML_MAX_CHARS {
        return html.to_string();
    }
    let keep = OUTER_HTML_MAX_CHARS - ELLIPSIS.len();
    format!("{}{}", truncate_chars(html, keep), ELLIPSIS)
}
