//! Conversation State
//!
//! One chat lifetime as a single record, changed only through [`Session::reduce`].
//! The queue worker is the only caller, so every change is serialized by
//! construction.

use serde::Serialize;
use uuid::Uuid;

use crate::models::Message;

pub const DATASET_LOADED_TEXT: &str =
    "CSV data loaded successfully! Try asking me questions about the data. Type \"help\" to see what I can do.";

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    /// Dataset backing every question; `None` until the first successful upload
    pub storage_key: Option<String>,
    /// Append-only, in conversation order
    pub messages: Vec<Message>,
    /// True exactly while an analysis call is in flight
    pub is_loading: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SessionAction {
    /// Optimistic append of a question as it is enqueued
    UserMessageAppended(Message),
    AnalysisStarted,
    AnalysisSettled {
        reply: Message,
        /// False when the reply is the fallback text
        answered: bool,
    },
    UploadSucceeded {
        storage_key: String,
        greeting: Message,
    },
    UploadFailed {
        error: String,
    },
    Reset,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            storage_key: None,
            messages: Vec::new(),
            is_loading: false,
            last_error: None,
        }
    }

    pub fn has_dataset(&self) -> bool {
        self.storage_key.is_some()
    }

    pub fn reduce(mut self, action: SessionAction) -> Self {
        match action {
            SessionAction::UserMessageAppended(message) => {
                self.messages.push(message);
            }
            SessionAction::AnalysisStarted => {
                self.is_loading = true;
            }
            SessionAction::AnalysisSettled { reply, answered } => {
                self.messages.push(reply);
                self.is_loading = false;
                if answered {
                    self.last_error = None;
                }
            }
            SessionAction::UploadSucceeded { storage_key, greeting } => {
                self.storage_key = Some(storage_key);
                self.messages.push(greeting);
                self.last_error = None;
            }
            SessionAction::UploadFailed { error } => {
                self.last_error = Some(error);
            }
            SessionAction::Reset => return Session::new(),
        }
        self
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
