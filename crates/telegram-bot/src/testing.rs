//! In-memory chat transport for handler and sink tests.

use crate::telegram::{ChatApi, InlineKeyboardMarkup, Message, TelegramError};
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text { text: String, with_keyboard: bool },
    Edit { message_id: i64, text: String },
    Answer(String),
    Photo { file_name: String, caption: String },
}

#[derive(Default)]
pub struct FakeChat {
    pub fail_photo: bool,
    pub fail_text: bool,
    pub log: Mutex<Vec<Sent>>,
}

impl FakeChat {
    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn photos(&self) -> Vec<(String, String)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Photo { file_name, caption } => Some((file_name, caption)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) {
        self.log.lock().unwrap().push(sent);
    }
}

#[async_trait]
impl ChatApi for FakeChat {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        if self.fail_text {
            return Err(TelegramError::Http("timed out".into()));
        }
        self.record(Sent::Text {
            text: text.to_string(),
            with_keyboard: keyboard.is_some(),
        });
        Ok(serde_json::from_value(serde_json::json!({
            "message_id": 100, "chat": { "id": chat_id }, "text": text
        }))
        .unwrap())
    }

    async fn edit_message_text(&self, _chat_id: i64, message_id: i64, text: &str) -> Result<(), TelegramError> {
        self.record(Sent::Edit {
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str) -> Result<(), TelegramError> {
        self.record(Sent::Answer(callback_id.to_string()));
        Ok(())
    }

    async fn send_photo(
        &self,
        _chat_id: i64,
        _bytes: Vec<u8>,
        file_name: &str,
        caption: &str,
    ) -> Result<(), TelegramError> {
        if self.fail_photo {
            return Err(TelegramError::Api {
                code: 413,
                description: "Request Entity Too Large".into(),
            });
        }
        self.record(Sent::Photo {
            file_name: file_name.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }
}
