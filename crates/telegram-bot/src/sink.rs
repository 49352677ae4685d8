use crate::telegram::ChatApi;
use async_trait::async_trait;
use report_core::{ReportArtifact, ReportError, ReportSink};
use std::sync::Arc;

/// Bot API limit for a message body, in UTF-16 code units
pub const MAX_MESSAGE_CHARS: usize = 4096;
/// Bot API limit for a photo caption, in UTF-16 code units
pub const MAX_CAPTION_CHARS: usize = 1024;

/// Delivers report artifacts into one Telegram chat
pub struct ChatSink {
    chat: Arc<dyn ChatApi>,
    chat_id: i64,
}

impl ChatSink {
    pub fn new(chat: Arc<dyn ChatApi>, chat_id: i64) -> Self {
        Self { chat, chat_id }
    }
}

#[async_trait]
impl ReportSink for ChatSink {
    async fn deliver(&self, artifact: &ReportArtifact) -> Result<(), ReportError> {
        if let Some(image) = &artifact.image {
            let caption = truncate_chars(&image.caption, MAX_CAPTION_CHARS);
            let sent = self
                .chat
                .send_photo(self.chat_id, image.bytes.clone(), &image.file_name, &caption)
                .await;

            if let Err(e) = sent {
                tracing::warn!("Photo upload to chat {} failed: {}", self.chat_id, e);
                // Without a body the caption is all the user would get
                if artifact.text.trim().is_empty() {
                    let fallback = format!("이미지 전송 지연으로 링크로 안내합니다.\n{}", image.caption);
                    return self.send_text(&fallback).await;
                }
            }
        }

        if artifact.text.trim().is_empty() {
            return Ok(());
        }
        self.send_text(&artifact.text).await
    }
}

impl ChatSink {
    async fn send_text(&self, text: &str) -> Result<(), ReportError> {
        for chunk in chunk_text(text, MAX_MESSAGE_CHARS) {
            self.chat
                .send_message(self.chat_id, &chunk, None)
                .await
                .map_err(|e| ReportError::Dispatch(e.to_string()))?;
        }
        Ok(())
    }
}

/// Length as the Bot API counts it, in UTF-16 code units
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Split on line boundaries into pieces of at most `limit` UTF-16 units.
/// A single line longer than `limit` is cut mid-line.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = utf16_len(line);
        let needed = if current.is_empty() { line_len } else { line_len + 1 };

        if current_len + needed <= limit {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len += needed;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        for c in line.chars() {
            let width = c.len_utf16();
            if current_len + width > limit && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(c);
            current_len += width;
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Cut to at most `limit` UTF-16 units, marking the cut with an ellipsis
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if utf16_len(text) <= limit {
        return text.to_string();
    }
    let budget = limit.saturating_sub(1);
    let mut cut = String::new();
    let mut used = 0;
    for c in text.chars() {
        if used + c.len_utf16() > budget {
            break;
        }
        used += c.len_utf16();
        cut.push(c);
    }
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeChat;
    use report_core::ImageAttachment;

    fn artifact_with_image(text: &str) -> ReportArtifact {
        ReportArtifact::text(text).with_image(ImageAttachment {
            bytes: vec![1, 2, 3],
            file_name: "kospi_marketmap.jpg".into(),
            caption: "KOSPI 마켓맵 (출처: 한국경제)\nhttps://markets.hankyung.com/marketmap/kospi".into(),
        })
    }

    #[test]
    fn test_chunk_text_respects_limit_and_lines() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(chunk_text(text, 9), vec!["aaaa\nbbbb", "cccc"]);
        assert_eq!(chunk_text(text, 100), vec![text]);
    }

    #[test]
    fn test_chunk_text_splits_long_line_by_chars() {
        let long = "가".repeat(10);
        let chunks = chunk_text(&format!("{}\n끝", long), 4);
        assert_eq!(chunks, vec!["가가가가", "가가가가", "가가\n끝"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    }

    #[test]
    fn test_chunk_text_counts_emoji_as_two_units() {
        let line = "📊".repeat(3000);
        let chunks = chunk_text(&line, MAX_MESSAGE_CHARS);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| utf16_len(c) <= MAX_MESSAGE_CHARS));
        assert_eq!(chunks[0].chars().count(), 2048);
        assert_eq!(chunks.concat(), line);

        let mixed = format!("{}\n{}", "가".repeat(4000), "💡".repeat(100));
        let chunks = chunk_text(&mixed, MAX_MESSAGE_CHARS);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| utf16_len(c) <= MAX_MESSAGE_CHARS));
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("", 10).is_empty());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("짧음", 10), "짧음");
        let cut = truncate_chars(&"x".repeat(2000), MAX_CAPTION_CHARS);
        assert_eq!(cut.chars().count(), MAX_CAPTION_CHARS);
        assert!(cut.ends_with('…'));

        let cut = truncate_chars(&"✅📈".repeat(600), MAX_CAPTION_CHARS);
        assert!(utf16_len(&cut) <= MAX_CAPTION_CHARS);
    }

    #[tokio::test]
    async fn test_deliver_photo_then_text() {
        let chat = Arc::new(FakeChat::default());
        let sink = ChatSink::new(chat.clone(), 42);

        sink.deliver(&artifact_with_image("본문")).await.unwrap();

        assert_eq!(chat.photos().len(), 1);
        assert_eq!(chat.texts(), vec!["본문".to_string()]);
    }

    #[tokio::test]
    async fn test_photo_failure_falls_back_to_link() {
        let chat = Arc::new(FakeChat {
            fail_photo: true,
            ..FakeChat::default()
        });
        let sink = ChatSink::new(chat.clone(), 42);

        sink.deliver(&artifact_with_image("")).await.unwrap();

        let texts = chat.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("https://markets.hankyung.com/marketmap/kospi"));
    }

    #[tokio::test]
    async fn test_text_failure_is_dispatch_error() {
        let chat = Arc::new(FakeChat {
            fail_text: true,
            ..FakeChat::default()
        });
        let sink = ChatSink::new(chat, 42);

        let err = sink.deliver(&ReportArtifact::text("본문")).await.unwrap_err();

        assert!(matches!(err, ReportError::Dispatch(_)));
    }
}
