//! Chat component JSON
//!
//! Disconnect reasons and chat lines travel as JSON text components.
//! Reasons that are client translation keys are sent as `translate`
//! components so the client shows them in its own language.

use serde::{Deserialize, Serialize};

/// A minimal text component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatComponent {
    Translate { translate: String },
    Text { text: String },
}

impl ChatComponent {
    pub fn text(text: impl Into<String>) -> Self {
        ChatComponent::Text { text: text.into() }
    }

    pub fn translate(key: impl Into<String>) -> Self {
        ChatComponent::Translate {
            translate: key.into(),
        }
    }

    /// Build the component for a disconnect reason
    pub fn reason(reason: &str) -> Self {
        if is_translation_key(reason) {
            Self::translate(reason)
        } else {
            Self::text(reason)
        }
    }

    pub fn to_json(&self) -> String {
        // A struct of plain strings always serializes
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{\"text\":\"\"}"))
    }

    /// Plain text of the component (the key for translations)
    pub fn plain(&self) -> &str {
        match self {
            ChatComponent::Translate { translate } => translate,
            ChatComponent::Text { text } => text,
        }
    }
}

fn is_translation_key(reason: &str) -> bool {
    (reason.starts_with("multiplayer.") || reason.starts_with("disconnect."))
        && !reason.contains(char::is_whitespace)
}
