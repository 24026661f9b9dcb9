//! Turns events into HTML-flavored chat text.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::base::{config::Config, types::Res};

use super::{Event, template::TemplateRegistry};

/// Renders events with the template registry, falling back to a debug message.
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    registry: TemplateRegistry,
    /// Fields supplied by the relay rather than the event; these win over event data.
    injected: Vec<(&'static str, String)>,
}

impl MessageRenderer {
    pub fn new(registry: TemplateRegistry, webview_url: impl Into<String>, webswview_url: impl Into<String>) -> Self {
        Self {
            registry,
            injected: vec![("webview_url", webview_url.into()), ("webswview_url", webswview_url.into())],
        }
    }

    /// Build the renderer from the built-in templates plus any configured overrides.
    pub fn from_config(config: &Config) -> Res<Self> {
        let registry = TemplateRegistry::with_overrides(&config.templates)?;

        Ok(Self::new(registry, config.webview_url.trim_end_matches('/'), config.webswview_url.trim_end_matches('/')))
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Render an event for display. Never fails: unknown tags and missing
    /// fields produce the fallback text instead.
    pub fn to_display_text(&self, event: &Event) -> String {
        let tag_variant = event.tag_variant();

        let lookup = |name: &str| {
            self.injected
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| escape_html(value))
                .or_else(|| event.data.get(name).map(|value| escape_html(&display_value(value))))
        };

        match self.registry.render(&tag_variant, lookup) {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("No template for `{}`, using fallback text.", tag_variant);
                fallback_text(&event.tag, &event.data)
            }
            Err(err) => {
                warn!("Could not render `{}`: {}", tag_variant, err);
                fallback_text(&event.tag, &event.data)
            }
        }
    }
}

// Helpers.

/// The generic message for events without a usable template.
pub fn fallback_text(tag: &str, data: &Map<String, Value>) -> String {
    let data = serde_json::to_string(data).unwrap_or_else(|_| format!("{data:?}"));

    format!("Received event type <code>{}</code> with data <code>{}</code>", escape_html(tag), escape_html(&data))
}

/// Strings render verbatim; everything else renders as compact JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }

    out
}

// Tests.
