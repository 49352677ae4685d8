use async_trait::async_trait;
use chrono::NaiveDate;
use report_core::{Bar, DataError, Identifier, Market, MarketData, ValuationRow};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://data.krx.co.kr/comm/bldAttendant/getJsonData.cmd";
const REFERER: &str = "https://data.krx.co.kr/contents/MDC/MDI/mdiLoader";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

const BLD_FINDER: &str = "dbms/comm/finder/finder_stkisu";
const BLD_VALUATION: &str = "dbms/MDC/STAT/standard/MDCSTAT03502";
const BLD_DAILY_OHLCV: &str = "dbms/MDC/STAT/standard/MDCSTAT01701";
const BLD_INDEX_OHLCV: &str = "dbms/MDC/STAT/standard/MDCSTAT00301";

/// Client for the KRX market data portal's JSON endpoint
#[derive(Clone)]
pub struct KrxClient {
    base_url: String,
    client: Client,
}

impl KrxClient {
    pub fn new() -> Self {
        let base_url = std::env::var("KRX_API_URL").unwrap_or_else(|_| BASE_URL.to_string());
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// POST one `bld` query and return the decoded JSON body.
    async fn query(&self, bld: &str, params: &[(&str, &str)]) -> Result<serde_json::Value, DataError> {
        let mut form: Vec<(&str, &str)> = Vec::with_capacity(params.len() + 1);
        form.push(("bld", bld));
        form.extend_from_slice(params);

        tracing::debug!("KRX query {} ({} params)", bld, params.len());

        let response = self
            .client
            .post(&self.base_url)
            .header(reqwest::header::REFERER, REFERER)
            .form(&form)
            .send()
            .await
            .map_err(|e| DataError::Http(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::Status {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| DataError::Decode(e.without_url().to_string()))
    }
}

impl Default for KrxClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketData for KrxClient {
    async fn listings(&self) -> Result<Vec<Identifier>, DataError> {
        let body = self
            .query(BLD_FINDER, &[("mktsel", "ALL"), ("searchText", ""), ("typeNo", "0")])
            .await?;
        parse_listings(body)
    }

    async fn valuations(
        &self,
        id: &Identifier,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ValuationRow>, DataError> {
        let (from, to) = (krx_date(from), krx_date(to));
        let body = self
            .query(
                BLD_VALUATION,
                &[
                    ("searchType", "2"),
                    ("mktId", "ALL"),
                    ("isuCd", id.isin.as_str()),
                    ("strtDd", from.as_str()),
                    ("endDd", to.as_str()),
                ],
            )
            .await?;
        parse_valuations(body)
    }

    async fn daily_bars(
        &self,
        id: &Identifier,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, DataError> {
        let (from, to) = (krx_date(from), krx_date(to));
        let body = self
            .query(
                BLD_DAILY_OHLCV,
                &[
                    ("isuCd", id.isin.as_str()),
                    ("strtDd", from.as_str()),
                    ("endDd", to.as_str()),
                    ("adjStkPrc", "2"),
                    ("adjStkPrc_check", "Y"),
                ],
            )
            .await?;
        parse_daily_bars(body)
    }

    async fn index_bars(
        &self,
        market: Market,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, DataError> {
        // "1001" is sent as group "1" + series "001"
        let (group, series) = market.index_code().split_at(1);
        let (from, to) = (krx_date(from), krx_date(to));
        let body = self
            .query(
                BLD_INDEX_OHLCV,
                &[
                    ("indIdx", group),
                    ("indIdx2", series),
                    ("strtDd", from.as_str()),
                    ("endDd", to.as_str()),
                ],
            )
            .await?;
        parse_index_bars(body)
    }
}

fn krx_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// KRX renders numbers as comma-grouped strings and missing values as `-` or blank.
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_date(raw: &str) -> Result<NaiveDate, DataError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y/%m/%d")
        .map_err(|e| DataError::Decode(format!("bad trade date '{}': {}", raw, e)))
}

fn parse_listings(body: serde_json::Value) -> Result<Vec<Identifier>, DataError> {
    let response: FinderResponse =
        serde_json::from_value(body).map_err(|e| DataError::Decode(e.to_string()))?;

    Ok(response
        .block1
        .into_iter()
        .filter_map(|entry| {
            // KONEX and other boards are not covered
            let market = Market::parse(&entry.market_code)
                .or_else(|| Market::parse(&entry.market_eng_name));
            let Some(market) = market else {
                tracing::debug!(
                    "Skipping listing {} ({}): market {}/{}",
                    entry.short_code,
                    entry.code_name,
                    entry.market_code,
                    entry.market_eng_name
                );
                return None;
            };
            Some(Identifier {
                code: entry.short_code,
                isin: entry.full_code,
                name: entry.code_name,
                market,
            })
        })
        .collect())
}

fn parse_valuations(body: serde_json::Value) -> Result<Vec<ValuationRow>, DataError> {
    let response: OutputResponse<ValuationEntry> =
        serde_json::from_value(body).map_err(|e| DataError::Decode(e.to_string()))?;

    let mut rows = response
        .output
        .into_iter()
        .map(|r| {
            Ok(ValuationRow {
                date: parse_date(&r.trd_dd)?,
                per: parse_number(&r.per),
                pbr: parse_number(&r.pbr),
                eps: parse_number(&r.eps),
                bps: parse_number(&r.bps),
                dividend_yield: parse_number(&r.dvd_yld),
            })
        })
        .collect::<Result<Vec<_>, DataError>>()?;

    rows.sort_by_key(|r| r.date);
    Ok(rows)
}

fn parse_daily_bars(body: serde_json::Value) -> Result<Vec<Bar>, DataError> {
    let response: OutputResponse<DailyEntry> =
        serde_json::from_value(body).map_err(|e| DataError::Decode(e.to_string()))?;

    let mut bars = Vec::with_capacity(response.output.len());
    for r in response.output {
        let date = parse_date(&r.trd_dd)?;
        // Suspended days come back with blank prices
        let (Some(open), Some(high), Some(low), Some(close)) = (
            parse_number(&r.tdd_opnprc),
            parse_number(&r.tdd_hgprc),
            parse_number(&r.tdd_lwprc),
            parse_number(&r.tdd_clsprc),
        ) else {
            continue;
        };
        bars.push(Bar {
            date,
            open,
            high,
            low,
            close,
            volume: parse_number(&r.acc_trdvol).unwrap_or(0.0),
        });
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

fn parse_index_bars(body: serde_json::Value) -> Result<Vec<Bar>, DataError> {
    let response: OutputResponse<IndexEntry> =
        serde_json::from_value(body).map_err(|e| DataError::Decode(e.to_string()))?;

    let mut bars = Vec::with_capacity(response.output.len());
    for r in response.output {
        let date = parse_date(&r.trd_dd)?;
        let Some(close) = parse_number(&r.clsprc_idx) else {
            continue;
        };
        bars.push(Bar {
            date,
            open: parse_number(&r.opnprc_idx).unwrap_or(close),
            high: parse_number(&r.hgprc_idx).unwrap_or(close),
            low: parse_number(&r.lwprc_idx).unwrap_or(close),
            close,
            volume: parse_number(&r.acc_trdvol).unwrap_or(0.0),
        });
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

// Response structures
#[derive(Debug, Deserialize)]
struct FinderResponse {
    #[serde(default)]
    block1: Vec<FinderEntry>,
}

#[derive(Debug, Deserialize)]
struct FinderEntry {
    full_code: String,
    short_code: String,
    #[serde(rename = "codeName")]
    code_name: String,
    /// STK, KSQ or KNX
    #[serde(rename = "marketCode", default)]
    market_code: String,
    #[serde(rename = "marketEngName", default)]
    market_eng_name: String,
}

#[derive(Debug, Deserialize)]
struct OutputResponse<T> {
    #[serde(default = "Vec::new")]
    output: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ValuationEntry {
    trd_dd: String,
    #[serde(default)]
    eps: String,
    #[serde(default)]
    per: String,
    #[serde(default)]
    bps: String,
    #[serde(default)]
    pbr: String,
    #[serde(default)]
    dvd_yld: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct DailyEntry {
    trd_dd: String,
    #[serde(default)]
    tdd_opnprc: String,
    #[serde(default)]
    tdd_hgprc: String,
    #[serde(default)]
    tdd_lwprc: String,
    #[serde(default)]
    tdd_clsprc: String,
    #[serde(default)]
    acc_trdvol: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct IndexEntry {
    trd_dd: String,
    #[serde(default)]
    clsprc_idx: String,
    #[serde(default)]
    opnprc_idx: String,
    #[serde(default)]
    hgprc_idx: String,
    #[serde(default)]
    lwprc_idx: String,
    #[serde(default)]
    acc_trdvol: String,
}
