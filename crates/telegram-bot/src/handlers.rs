//! Command routing: turns updates into orchestrator calls and chat replies.

use crate::sink::ChatSink;
use crate::telegram::{CallbackQuery, ChatApi, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update};
use report_core::{Market, Query};
use report_orchestrator::ReportOrchestrator;
use std::sync::Arc;

const MENU_TEXT: &str = "메뉴를 선택하세요. (마켓맵은 영역만 캡처하여 전송합니다)";
const ASK_NAME_TEXT: &str = "🔍 KRX에서 분석할 정확한 종목명을 입력해주세요.\n(예: 삼성전자, NAVER, 에코프로비엠)";
const MARKET_PROGRESS_TEXT: &str = "📈 KRX 시장 데이터 분석 중...";

/// What a message or button asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Menu,
    AskForName,
    Analyze(String),
    MarketOverview,
    MarketMap(Market),
}

/// Route a text message. Unknown commands fall back to the menu.
pub fn parse_message(text: &str) -> Action {
    let text = text.trim();
    let Some(command_line) = text.strip_prefix('/') else {
        return match Query::parse(text) {
            Query::Company(name) if name.is_empty() => Action::Menu,
            Query::Company(name) => Action::Analyze(name),
            Query::MarketOverview(_) => Action::MarketOverview,
        };
    };

    let (command, args) = match command_line.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (command_line, ""),
    };
    // `/analyze@SomeBot` in group chats
    let command = command.split('@').next().unwrap_or(command).to_ascii_lowercase();

    match command.as_str() {
        "start" | "help" | "menu" => Action::Menu,
        "analyze" | "analysis" if args.is_empty() => Action::AskForName,
        "analyze" | "analysis" => Action::Analyze(args.to_string()),
        "market" => Action::MarketOverview,
        "map" if args.is_empty() => Action::MarketMap(Market::Kospi),
        "map" => Market::parse(args).map(Action::MarketMap).unwrap_or(Action::Menu),
        _ => Action::Menu,
    }
}

pub fn parse_callback(data: &str) -> Action {
    match data {
        "btn_analysis" => Action::AskForName,
        "btn_market" => Action::MarketOverview,
        "map_kospi" => Action::MarketMap(Market::Kospi),
        "map_kosdaq" => Action::MarketMap(Market::Kosdaq),
        _ => Action::Menu,
    }
}

pub fn home_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::callback("📊 기업 분석", "btn_analysis")],
            vec![InlineKeyboardButton::callback("📈 시장 현황", "btn_market")],
            vec![
                InlineKeyboardButton::callback("🗺️ 코스피", "map_kospi"),
                InlineKeyboardButton::callback("🗺️ 코스닥", "map_kosdaq"),
            ],
        ],
    }
}

/// Where a progress notice goes: a fresh message, or the menu message a button was pressed on
enum Origin {
    Message,
    Button { message_id: i64 },
}

pub struct BotHandler {
    chat: Arc<dyn ChatApi>,
    orchestrator: Arc<ReportOrchestrator>,
}

impl BotHandler {
    pub fn new(chat: Arc<dyn ChatApi>, orchestrator: Arc<ReportOrchestrator>) -> Self {
        Self { chat, orchestrator }
    }

    pub async fn handle_update(&self, update: Update) {
        if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
        } else if let Some(message) = update.message {
            self.handle_message(message).await;
        }
    }

    async fn handle_message(&self, message: Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let action = parse_message(text);
        tracing::info!("Chat {}: {:?}", message.chat.id, action);
        self.perform(message.chat.id, action, Origin::Message).await;
    }

    async fn handle_callback(&self, callback: CallbackQuery) {
        if let Err(e) = self.chat.answer_callback_query(&callback.id).await {
            tracing::warn!("Failed to answer callback {}: {}", callback.id, e);
        }

        let Some(message) = callback.message else {
            return;
        };
        let action = parse_callback(callback.data.as_deref().unwrap_or_default());
        tracing::info!("Chat {} button: {:?}", message.chat.id, action);
        let origin = Origin::Button {
            message_id: message.message_id,
        };
        self.perform(message.chat.id, action, origin).await;
    }

    async fn perform(&self, chat_id: i64, action: Action, origin: Origin) {
        match action {
            Action::Menu => {}
            Action::AskForName => {
                self.notify(chat_id, &origin, ASK_NAME_TEXT).await;
                return;
            }
            Action::Analyze(name) => {
                let progress = format!("🔍 '{}' KRX 데이터 조회 중...\n(잠시만 기다려주세요)", name);
                self.notify(chat_id, &origin, &progress).await;
                let sink = ChatSink::new(self.chat.clone(), chat_id);
                self.orchestrator.process(&Query::Company(name), &sink).await;
            }
            Action::MarketOverview => {
                self.notify(chat_id, &origin, MARKET_PROGRESS_TEXT).await;
                let sink = ChatSink::new(self.chat.clone(), chat_id);
                self.orchestrator
                    .process(&Query::MarketOverview(Market::Kospi), &sink)
                    .await;
            }
            Action::MarketMap(market) => {
                let progress = format!("🗺️ {} 마켓맵 렌더링 중... 잠시만요.", market);
                self.notify(chat_id, &origin, &progress).await;
                let sink = ChatSink::new(self.chat.clone(), chat_id);
                self.orchestrator.capture_market_map(market, &sink).await;
            }
        }
        self.send_menu(chat_id).await;
    }

    async fn notify(&self, chat_id: i64, origin: &Origin, text: &str) {
        let sent = match origin {
            Origin::Message => self.chat.send_message(chat_id, text, None).await.map(|_| ()),
            Origin::Button { message_id } => self.chat.edit_message_text(chat_id, *message_id, text).await,
        };
        if let Err(e) = sent {
            tracing::warn!("Failed to send progress to chat {}: {}", chat_id, e);
        }
    }

    async fn send_menu(&self, chat_id: i64) {
        if let Err(e) = self
            .chat
            .send_message(chat_id, MENU_TEXT, Some(&home_keyboard()))
            .await
        {
            tracing::warn!("Failed to send menu to chat {}: {}", chat_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChat, Sent};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use report_core::{
        Bar, ChartRenderer, DataError, Identifier, MarketData, MarketMapCapture, PriceSeries, ReportError,
        Summarizer, ValuationRow,
    };
    use report_orchestrator::ReportConfig;

    struct StubData;

    #[async_trait]
    impl MarketData for StubData {
        async fn listings(&self) -> Result<Vec<Identifier>, DataError> {
            Ok(vec![Identifier {
                code: "005930".into(),
                isin: "KR7005930003".into(),
                name: "삼성전자".into(),
                market: Market::Kospi,
            }])
        }

        async fn valuations(
            &self,
            _id: &Identifier,
            _from: NaiveDate,
            to: NaiveDate,
        ) -> Result<Vec<ValuationRow>, DataError> {
            Ok(vec![ValuationRow {
                date: to,
                per: Some(13.5),
                pbr: Some(1.2),
                ..ValuationRow::default()
            }])
        }

        async fn daily_bars(&self, _id: &Identifier, _from: NaiveDate, _to: NaiveDate) -> Result<Vec<Bar>, DataError> {
            Ok(Vec::new())
        }

        async fn index_bars(&self, _market: Market, _from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, DataError> {
            Ok(vec![Bar {
                date: to,
                open: 2700.0,
                high: 2770.0,
                low: 2690.0,
                close: 2758.42,
                volume: 1.0,
            }])
        }
    }

    struct StubChart;

    #[async_trait]
    impl ChartRenderer for StubChart {
        async fn render(&self, _title: &str, _series: &PriceSeries) -> Result<Vec<u8>, ReportError> {
            Ok(vec![1])
        }
    }

    struct StubSummarizer;

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, _prompt: &str) -> Result<String, ReportError> {
            Ok("📊 3줄 요약".into())
        }
    }

    struct StubMap;

    #[async_trait]
    impl MarketMapCapture for StubMap {
        async fn capture(&self, _market: Market) -> Result<Vec<u8>, ReportError> {
            Ok(vec![0xFF, 0xD8])
        }
    }

    // A Wednesday
    fn wednesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()
    }

    fn handler() -> (BotHandler, Arc<FakeChat>) {
        let orchestrator = ReportOrchestrator::new(
            Arc::new(StubData),
            Arc::new(StubChart),
            Arc::new(StubSummarizer),
            Arc::new(StubMap),
            ReportConfig::default(),
        )
        .with_clock(wednesday);
        let chat = Arc::new(FakeChat::default());
        (BotHandler::new(chat.clone(), Arc::new(orchestrator)), chat)
    }

    fn text_update(text: &str) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "message": { "message_id": 7, "chat": { "id": 42 }, "text": text }
        }))
        .unwrap()
    }

    fn button_update(data: &str) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-1",
                "data": data,
                "message": { "message_id": 9, "chat": { "id": 42 }, "text": MENU_TEXT }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_message_commands() {
        assert_eq!(parse_message("/start"), Action::Menu);
        assert_eq!(parse_message("/help"), Action::Menu);
        assert_eq!(parse_message("/analyze 삼성전자"), Action::Analyze("삼성전자".into()));
        assert_eq!(parse_message("/analyze@KrxReportBot 005930"), Action::Analyze("005930".into()));
        assert_eq!(parse_message("/analyze"), Action::AskForName);
        assert_eq!(parse_message("/market"), Action::MarketOverview);
        assert_eq!(parse_message("/map kosdaq"), Action::MarketMap(Market::Kosdaq));
        assert_eq!(parse_message("/map"), Action::MarketMap(Market::Kospi));
        assert_eq!(parse_message("/map konex"), Action::Menu);
        assert_eq!(parse_message("/unknown"), Action::Menu);
    }

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(parse_message(" NAVER "), Action::Analyze("NAVER".into()));
        assert_eq!(parse_message("시장 현황"), Action::MarketOverview);
        assert_eq!(parse_message("   "), Action::Menu);
    }

    #[test]
    fn test_parse_callback() {
        assert_eq!(parse_callback("btn_analysis"), Action::AskForName);
        assert_eq!(parse_callback("btn_market"), Action::MarketOverview);
        assert_eq!(parse_callback("map_kosdaq"), Action::MarketMap(Market::Kosdaq));
        assert_eq!(parse_callback("stale"), Action::Menu);
    }

    #[tokio::test]
    async fn test_start_sends_menu_with_keyboard() {
        let (handler, chat) = handler();

        handler.handle_update(text_update("/start")).await;

        assert_eq!(
            chat.sent(),
            vec![Sent::Text {
                text: MENU_TEXT.to_string(),
                with_keyboard: true
            }]
        );
    }

    #[tokio::test]
    async fn test_plain_text_runs_company_report() {
        let (handler, chat) = handler();

        handler.handle_update(text_update("삼성전자")).await;

        let texts = chat.texts();
        assert!(texts[0].starts_with("🔍 '삼성전자' KRX 데이터 조회 중"));
        assert!(texts.iter().any(|t| t.contains("■ PER: 13.50배")));
        assert_eq!(texts.last().map(String::as_str), Some(MENU_TEXT));
    }

    #[tokio::test]
    async fn test_unknown_name_reports_not_found() {
        let (handler, chat) = handler();

        handler.handle_update(text_update("NOT_A_REAL_TICKER")).await;

        assert!(chat.texts().iter().any(|t| t.contains("not found")));
    }

    #[tokio::test]
    async fn test_map_button_answers_edits_and_sends_photo() {
        let (handler, chat) = handler();

        handler.handle_update(button_update("map_kospi")).await;

        let sent = chat.sent();
        assert_eq!(sent[0], Sent::Answer("cb-1".into()));
        assert!(matches!(&sent[1], Sent::Edit { message_id: 9, text } if text.contains("KOSPI 마켓맵 렌더링")));
        let photos = chat.photos();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].0, "kospi_marketmap.jpg");
        assert!(matches!(sent.last(), Some(Sent::Text { with_keyboard: true, .. })));
    }

    #[tokio::test]
    async fn test_analysis_button_asks_for_name_without_menu() {
        let (handler, chat) = handler();

        handler.handle_update(button_update("btn_analysis")).await;

        let sent = chat.sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[1], Sent::Edit { text, .. } if text == ASK_NAME_TEXT));
    }

    #[tokio::test]
    async fn test_market_button_sends_index_report() {
        let (handler, chat) = handler();

        handler.handle_update(button_update("btn_market")).await;

        assert!(chat
            .texts()
            .iter()
            .any(|t| t.starts_with("📈 현재 코스피 지수: 2,758.42 (기준일: 2024-06-12)")));
    }
}
