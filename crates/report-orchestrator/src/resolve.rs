use report_core::{Identifier, ReportError};
use strsim::normalized_levenshtein;

const MAX_SUGGESTIONS: usize = 5;
const SUGGESTION_CUTOFF: f64 = 0.6;

/// Pick the listing a user query refers to.
///
/// Exact code first, then exact name, then the shortest name containing the
/// query. Names compare case-insensitively; KOSPI wins ties over KOSDAQ.
pub fn match_listing<'a>(listings: &'a [Identifier], query: &str) -> Result<&'a Identifier, ReportError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ReportError::not_found(query));
    }

    if let Some(hit) = listings.iter().find(|l| l.code.eq_ignore_ascii_case(query)) {
        return Ok(hit);
    }

    let wanted = query.to_lowercase();
    let exact = listings
        .iter()
        .filter(|l| l.name.to_lowercase() == wanted)
        .min_by_key(|l| (l.market, l.code.as_str()));
    if let Some(hit) = exact {
        return Ok(hit);
    }

    let partial = listings
        .iter()
        .filter(|l| l.name.to_lowercase().contains(&wanted))
        .min_by_key(|l| (l.name.chars().count(), l.market, l.code.as_str()));
    if let Some(hit) = partial {
        return Ok(hit);
    }

    Err(ReportError::NotFound {
        query: query.to_string(),
        suggestions: suggest(listings, &wanted),
    })
}

/// Up to five listing names that look like a typo of `wanted`, best first
fn suggest(listings: &[Identifier], wanted: &str) -> Vec<String> {
    let mut scored: Vec<(f64, &str)> = listings
        .iter()
        .map(|l| (normalized_levenshtein(wanted, &l.name.to_lowercase()), l.name.as_str()))
        .filter(|(score, _)| *score >= SUGGESTION_CUTOFF)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    let mut names: Vec<String> = Vec::with_capacity(MAX_SUGGESTIONS);
    for (_, name) in scored {
        if names.len() == MAX_SUGGESTIONS {
            break;
        }
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use report_core::Market;

    fn listing(code: &str, name: &str, market: Market) -> Identifier {
        Identifier {
            code: code.to_string(),
            isin: format!("KR7{}003", code),
            name: name.to_string(),
            market,
        }
    }

    fn listings() -> Vec<Identifier> {
        vec![
            listing("005930", "삼성전자", Market::Kospi),
            listing("005935", "삼성전자우", Market::Kospi),
            listing("009150", "삼성전기", Market::Kospi),
            listing("035420", "NAVER", Market::Kospi),
            listing("247540", "에코프로비엠", Market::Kosdaq),
            listing("086520", "에코프로", Market::Kosdaq),
        ]
    }

    #[test]
    fn test_code_match() {
        let all = listings();
        assert_eq!(match_listing(&all, " 005930 ").unwrap().name, "삼성전자");
    }

    #[test]
    fn test_exact_name_is_case_insensitive() {
        let all = listings();
        assert_eq!(match_listing(&all, "naver").unwrap().code, "035420");
    }

    #[test]
    fn test_exact_name_beats_longer_partial() {
        let all = listings();
        assert_eq!(match_listing(&all, "에코프로").unwrap().code, "086520");
    }

    #[test]
    fn test_partial_prefers_shortest_name() {
        let all = listings();
        assert_eq!(match_listing(&all, "삼성").unwrap().code, "005930");
        assert_eq!(match_listing(&all, "프로비").unwrap().code, "247540");
    }

    #[test]
    fn test_exact_name_tie_prefers_kospi() {
        let all = vec![
            listing("900001", "동명", Market::Kosdaq),
            listing("100001", "동명", Market::Kospi),
        ];
        assert_eq!(match_listing(&all, "동명").unwrap().market, Market::Kospi);
    }

    #[test]
    fn test_not_found_with_suggestions() {
        let all = listings();
        match match_listing(&all, "삼성전지") {
            Err(ReportError::NotFound { query, suggestions }) => {
                assert_eq!(query, "삼성전지");
                assert!(suggestions.contains(&"삼성전자".to_string()));
                assert!(suggestions.contains(&"삼성전기".to_string()));
                assert!(suggestions.len() <= MAX_SUGGESTIONS);
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_unrelated_query_has_no_suggestions() {
        let all = listings();
        match match_listing(&all, "NOT_A_REAL_TICKER") {
            Err(ReportError::NotFound { suggestions, .. }) => assert!(suggestions.is_empty()),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_query() {
        assert!(matches!(
            match_listing(&listings(), "   "),
            Err(ReportError::NotFound { .. })
        ));
    }
}
