//! Report text assembly.

use crate::prompts::index_line;
use report_core::format::{fmt_pct, group_thousands, safe_num};
use report_core::{IndexSnapshot, Market, QuoteSnapshot};

const KRX_SOURCE: &str = "(출처: KRX 정보데이터시스템)";
const PRICE_UNKNOWN: &str = "확인불가";

/// Numeric block of a company report
pub fn snapshot_text(snapshot: &QuoteSnapshot) -> String {
    let id = &snapshot.identifier;
    let price = snapshot
        .close
        .filter(|v| v.is_finite())
        .map(|v| group_thousands(&format!("{:.0}", v)))
        .unwrap_or_else(|| PRICE_UNKNOWN.to_string());

    format!(
        "■ 종목명: {} ({} / {})\n\
         ■ 기준일: {} (최근 영업일)\n\
         ■ 현재가: {}원\n\
         ■ PER: {}배\n\
         ■ PBR: {}배\n\
         ■ EPS: {}원\n\
         ■ BPS: {}원\n\
         ■ 배당수익률: {}\n\
         {}",
        id.name,
        id.code,
        id.market,
        snapshot.as_of.format("%Y-%m-%d"),
        price,
        safe_num(snapshot.per, 2),
        safe_num(snapshot.pbr, 2),
        safe_num(snapshot.eps, 2),
        safe_num(snapshot.bps, 2),
        fmt_pct(snapshot.dividend_yield),
        KRX_SOURCE,
    )
}

/// Numeric block followed by the narrative, when there is one
pub fn company_report_text(snapshot: &QuoteSnapshot, narrative: Option<&str>) -> String {
    with_narrative(snapshot_text(snapshot), narrative)
}

pub fn market_report_text(index: &IndexSnapshot, narrative: Option<&str>) -> String {
    with_narrative(format!("📈 {}\n{}", index_line(index), KRX_SOURCE), narrative)
}

pub fn chart_caption(snapshot: &QuoteSnapshot) -> String {
    format!("📈 {} 일봉 차트", snapshot.identifier.name)
}

pub fn market_map_caption(market: Market) -> String {
    format!("{} 마켓맵 (출처: 한국경제)\n{}", market, market.map_url())
}

/// Text sent instead of the image when the capture failed
pub fn market_map_fallback(market: Market, message: &str) -> String {
    format!("{}\n{}", message, market.map_url())
}

fn with_narrative(body: String, narrative: Option<&str>) -> String {
    match narrative.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => format!("{}\n\n{}", body, n),
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use report_core::Identifier;

    fn snapshot() -> QuoteSnapshot {
        QuoteSnapshot {
            identifier: Identifier {
                code: "005930".into(),
                isin: "KR7005930003".into(),
                name: "삼성전자".into(),
                market: Market::Kospi,
            },
            as_of: NaiveDate::from_ymd_opt(2024, 6, 14).unwrap(),
            open: Some(78_500.0),
            high: Some(79_300.0),
            low: Some(78_100.0),
            close: Some(78_600.0),
            per: Some(36.93),
            pbr: Some(1.46),
            eps: Some(2131.0),
            bps: Some(53_705.0),
            dividend_yield: Some(1.84),
        }
    }

    #[test]
    fn test_snapshot_text_lines() {
        let text = snapshot_text(&snapshot());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "■ 종목명: 삼성전자 (005930 / KOSPI)");
        assert_eq!(lines[1], "■ 기준일: 2024-06-14 (최근 영업일)");
        assert_eq!(lines[2], "■ 현재가: 78,600원");
        assert_eq!(lines[3], "■ PER: 36.93배");
        assert_eq!(lines[5], "■ EPS: 2,131원");
        assert_eq!(lines[7], "■ 배당수익률: 1.84%");
        assert_eq!(lines[8], KRX_SOURCE);
    }

    #[test]
    fn test_missing_values() {
        let mut snap = snapshot();
        snap.close = None;
        snap.per = None;
        snap.dividend_yield = None;
        let text = snapshot_text(&snap);
        assert!(text.contains("■ 현재가: 확인불가원"));
        assert!(text.contains("■ PER: 정보없음배"));
        assert!(text.contains("■ 배당수익률: 정보없음"));
    }

    #[test]
    fn test_narrative_is_appended_after_blank_line() {
        let text = company_report_text(&snapshot(), Some("  📊 3줄 요약 \n"));
        assert!(text.ends_with(&format!("{}\n\n📊 3줄 요약", KRX_SOURCE)));

        let bare = company_report_text(&snapshot(), Some("   "));
        assert_eq!(bare, snapshot_text(&snapshot()));
    }

    #[test]
    fn test_market_texts() {
        let index = IndexSnapshot {
            market: Market::Kospi,
            as_of: NaiveDate::from_ymd_opt(2024, 6, 14).unwrap(),
            close: 2758.42,
        };
        assert!(market_report_text(&index, None).starts_with("📈 현재 코스피 지수: 2,758.42"));
        assert_eq!(
            market_map_caption(Market::Kosdaq),
            "KOSDAQ 마켓맵 (출처: 한국경제)\nhttps://markets.hankyung.com/marketmap/kosdaq"
        );
        assert!(market_map_fallback(Market::Kospi, "실패").ends_with("/marketmap/kospi"));
    }
}
