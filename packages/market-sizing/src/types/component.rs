//! Components: the atomic quantities a formula needs.

use serde::{Deserialize, Serialize};

/// A named atomic quantity referenced by a formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Component {
    /// Variable name exactly as it appears in the formula.
    pub name: String,

    /// What the quantity measures, in plain language.
    pub description: String,

    /// Expected unit (e.g. "schools", "USD per year").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Component {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            unit: None,
        }
    }

    /// A component described only by its variable name.
    pub fn from_variable(name: impl Into<String>) -> Self {
        let name = name.into();
        let description = humanize(&name);
        Self::new(name, description)
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Query sent to the web search adapter for this component.
    pub fn search_query(&self) -> String {
        let description = self.description.trim();
        if description.is_empty() {
            humanize(&self.name)
        } else {
            description.to_string()
        }
    }
}

/// Turn a variable identifier into words: `spend_per_school` → "spend per school".
pub fn humanize(name: &str) -> String {
    let mut words = String::with_capacity(name.len());
    let mut previous: Option<char> = None;

    for c in name.chars() {
        if c == '_' || c == '-' {
            if !words.ends_with(' ') && !words.is_empty() {
                words.push(' ');
            }
        } else {
            // Split camelCase boundaries.
            if c.is_uppercase() && previous.is_some_and(|p| p.is_lowercase()) {
                words.push(' ');
            }
            words.extend(c.to_lowercase());
        }
        previous = Some(c);
    }

    words.trim().to_string()
}
