use report_core::format::safe_num;
use report_core::IndexSnapshot;

/// Analyst persona and report outline sent ahead of every request
pub const SYSTEM_PROMPT: &str = "[SYSTEM]
당신은 월스트리트 20년 경력의 시니어 애널리스트입니다.
제공된 [KRX 공식 데이터]를 철저하게 분석하여 조언합니다.
데이터의 '기준일'을 최우선으로 고려하세요.

[보고서 양식]

📊 3줄 요약: (KRX 데이터 기반 현재 상황 압축)
💡 핵심 투자 포인트: (중요 이유 3가지)
📈 펀더멘탈 분석: (제공된 PER, PBR, EPS 수치를 동종업계/과거와 비교 평가)
✅ 실행 체크리스트: (매수/보류/매도 행동 지침)
주의: '[OUTPUT FORMAT]' 같은 제목은 출력하지 마세요.";

/// Company report request built around the numeric data block
pub fn company_prompt(subject: &str, facts: &str) -> String {
    format!(
        "{}\n\n[분석대상] {}\n[KRX 공식 데이터]\n{}\n\n\
         위 팩트 데이터를 기반으로 투자자를 위한 리포트를 작성하세요.\n\
         데이터에 '정보없음'이나 0이 많다면 그 이유도 설명하세요.",
        SYSTEM_PROMPT, subject, facts
    )
}

/// One-line index summary shared by the market prompt and report text
pub fn index_line(index: &IndexSnapshot) -> String {
    format!(
        "현재 {} 지수: {} (기준일: {})",
        index.market.korean_name(),
        safe_num(Some(index.close), 2),
        index.as_of.format("%Y-%m-%d")
    )
}

pub fn market_prompt(index: &IndexSnapshot) -> String {
    format!(
        "{}\n\n[정보] {}\n오늘 한국 증시 시황을 요약하고 간단히 전망해주세요.",
        SYSTEM_PROMPT,
        index_line(index)
    )
}
