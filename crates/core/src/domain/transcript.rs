use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Lenient mapping for labels coming from the chat widget. Anything that is not
    /// recognisably the assistant is treated as the customer speaking.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "assistant" | "agent" | "bot" => Self::Assistant,
            _ => Self::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

/// Role/text history of one conversation. Rebuilt on every request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the transcript from prior turns and appends the current user message last.
    pub fn from_chat<I, R, C>(history: I, user_message: &str) -> Self
    where
        I: IntoIterator<Item = (R, C)>,
        R: AsRef<str>,
        C: Into<String>,
    {
        let mut transcript = Self::new();
        for (role, content) in history {
            transcript.push(Role::from_label(role.as_ref()), content);
        }
        transcript.push(Role::User, user_message);
        transcript
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push(TranscriptEntry { role, content: content.into() });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.user_messages_newest_first().next()
    }

    pub fn user_messages_newest_first(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .rev()
            .filter(|entry| entry.role == Role::User)
            .map(|entry| entry.content.as_str())
    }

    /// `role: text` lines joined by newlines, the format handed to the model.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("{}: {}", entry.role.as_str(), entry.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
