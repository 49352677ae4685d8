use thiserror::Error;

/// Failures raised by the market data source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("No data: {0}")]
    Empty(String),
}

/// Request-level error taxonomy.
///
/// `NotFound` and `DataUnavailable` abort a request; `Render` and `Ai` only
/// remove the affected part of the report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    #[error("No listing matches '{query}'")]
    NotFound {
        query: String,
        suggestions: Vec<String>,
    },

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Chart render failed: {0}")]
    Render(String),

    #[error("AI summary failed: {0}")]
    Ai(String),

    #[error("Market map capture failed: {0}")]
    Capture(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

impl ReportError {
    pub fn not_found(query: impl Into<String>) -> Self {
        ReportError::NotFound {
            query: query.into(),
            suggestions: Vec::new(),
        }
    }

    /// Short message shown to the chat user
    pub fn user_message(&self) -> String {
        match self {
            ReportError::NotFound { query, suggestions } => {
                let mut msg = if query.trim().is_empty() {
                    "정확한 종목명을 입력해주세요. (예: 삼성전자, NAVER, 에코프로비엠)".to_string()
                } else {
                    format!("🔍 '{}' 종목을 찾을 수 없습니다 (not found).", query)
                };
                if !suggestions.is_empty() {
                    msg.push_str("\n혹시 이 중에 있나요? ");
                    msg.push_str(&suggestions.join(", "));
                } else if !query.trim().is_empty() {
                    msg.push_str("\nKRX에 등록된 정확한 종목명을 입력해주세요.");
                }
                msg
            }
            ReportError::DataUnavailable(_) => {
                "KRX 데이터를 가져오지 못했습니다. 잠시 후 다시 시도해주세요.".to_string()
            }
            ReportError::Render(_) => "차트 생성에 실패했습니다.".to_string(),
            ReportError::Ai(_) => "AI 리포트를 생성하지 못했습니다.".to_string(),
            ReportError::Capture(_) => {
                "마켓맵 이미지를 생성하지 못했습니다. 링크로 확인해주세요.".to_string()
            }
            ReportError::Dispatch(_) => "메시지 전송에 실패했습니다.".to_string(),
        }
    }

    /// Whether the pipeline must stop on this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReportError::NotFound { .. } | ReportError::DataUnavailable(_)
        )
    }
}

impl From<DataError> for ReportError {
    fn from(e: DataError) -> Self {
        ReportError::DataUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_has_indicator() {
        let err = ReportError::not_found("NOT_A_REAL_TICKER");
        let msg = err.user_message();
        assert!(msg.contains("not found"));
        assert!(msg.contains("NOT_A_REAL_TICKER"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_not_found_lists_suggestions() {
        let err = ReportError::NotFound {
            query: "삼성전지".to_string(),
            suggestions: vec!["삼성전자".to_string(), "삼성전기".to_string()],
        };
        assert!(err.user_message().contains("삼성전자, 삼성전기"));
    }

    #[test]
    fn test_soft_errors_are_not_fatal() {
        assert!(!ReportError::Render("x".into()).is_fatal());
        assert!(!ReportError::Ai("x".into()).is_fatal());
        assert!(ReportError::from(DataError::Empty("x".into())).is_fatal());
    }
}
