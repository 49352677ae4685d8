use async_trait::async_trait;
use plotters::prelude::*;
use report_core::{Bar, ChartRenderer, PriceSeries, ReportError};
use std::path::{Path, PathBuf};

mod indicators;

pub use indicators::sma;

const UP_COLOR: RGBColor = RGBColor(38, 166, 91);
const DOWN_COLOR: RGBColor = RGBColor(232, 65, 66);
const MA_COLORS: [RGBColor; 4] = [
    RGBColor(255, 145, 0),
    RGBColor(41, 98, 255),
    RGBColor(142, 36, 170),
    RGBColor(96, 125, 139),
];

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("No data to chart")]
    NoData,
    #[error("Drawing failed: {0}")]
    Draw(String),
    #[error("Chart file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Render task failed: {0}")]
    Task(String),
}

/// Fixed look of the daily chart
#[derive(Debug, Clone)]
pub struct ChartStyle {
    pub width: u32,
    pub height: u32,
    /// Moving-average windows drawn over the candles
    pub moving_averages: Vec<usize>,
    /// Share of the height used by the price panel; the rest holds volume
    pub price_panel_ratio: f64,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: 1500,
            height: 900,
            moving_averages: vec![5, 20, 60],
            price_panel_ratio: 0.72,
        }
    }
}

/// Candlestick + moving averages + volume, encoded as PNG
#[derive(Debug, Clone, Default)]
pub struct CandleChartRenderer {
    style: ChartStyle,
}

impl CandleChartRenderer {
    pub fn new(style: ChartStyle) -> Self {
        Self { style }
    }

    pub async fn render_png(&self, title: &str, bars: &[Bar]) -> Result<Vec<u8>, ChartError> {
        if bars.is_empty() {
            return Err(ChartError::NoData);
        }

        let title = title.to_string();
        let bars = bars.to_vec();
        let style = self.style.clone();

        tokio::task::spawn_blocking(move || render_to_bytes(&title, &bars, &style))
            .await
            .map_err(|e| ChartError::Task(e.to_string()))?
    }
}

#[async_trait]
impl ChartRenderer for CandleChartRenderer {
    async fn render(&self, title: &str, series: &PriceSeries) -> Result<Vec<u8>, ReportError> {
        let png = self
            .render_png(title, &series.bars)
            .await
            .map_err(|e| ReportError::Render(e.to_string()))?;
        tracing::debug!("Rendered chart for {} ({} bars, {} bytes)", series.identifier.code, series.bars.len(), png.len());
        Ok(png)
    }
}

fn temp_chart_path() -> PathBuf {
    let stamp = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    std::env::temp_dir().join(format!("krx_chart_{}_{}.png", std::process::id(), stamp))
}

fn render_to_bytes(title: &str, bars: &[Bar], style: &ChartStyle) -> Result<Vec<u8>, ChartError> {
    let path = temp_chart_path();
    let drawn = draw_chart(&path, title, bars, style);
    let bytes = drawn.and_then(|_| std::fs::read(&path).map_err(ChartError::from));
    let _ = std::fs::remove_file(&path);
    bytes
}

fn draw_err<E: std::fmt::Display>(e: E) -> ChartError {
    ChartError::Draw(e.to_string())
}

fn draw_chart(path: &Path, title: &str, bars: &[Bar], style: &ChartStyle) -> Result<(), ChartError> {
    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let price_height = (style.height as f64 * style.price_panel_ratio) as u32;
    let (upper, lower) = root.split_vertically(price_height);

    let n = bars.len();
    let x_range = -0.5f64..(n as f64 - 0.5);
    let (low, high) = bars
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), b| (lo.min(b.low), hi.max(b.high)));
    let pad = ((high - low) * 0.05).max(high.abs() * 0.001).max(1e-6);

    let mut price = ChartBuilder::on(&upper)
        .caption(title, ("sans-serif", 30))
        .margin(12)
        .x_label_area_size(0)
        .y_label_area_size(90)
        .build_cartesian_2d(x_range.clone(), (low - pad)..(high + pad))
        .map_err(draw_err)?;

    price
        .configure_mesh()
        .disable_x_mesh()
        .y_labels(8)
        .y_label_formatter(&|v| format_price(*v))
        .draw()
        .map_err(draw_err)?;

    let candle_px = ((style.width as f64 * 0.85) / n as f64 * 0.7).clamp(1.0, 15.0) as u32;
    price
        .draw_series(bars.iter().enumerate().map(|(i, b)| {
            CandleStick::new(
                i as f64,
                b.open,
                b.high,
                b.low,
                b.close,
                UP_COLOR.filled(),
                DOWN_COLOR.filled(),
                candle_px,
            )
        }))
        .map_err(draw_err)?;

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    for (&period, color) in style.moving_averages.iter().zip(MA_COLORS) {
        let values = sma(&closes, period);
        if values.is_empty() {
            continue;
        }
        let offset = period - 1;
        price
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, v)| ((i + offset) as f64, *v)),
                color.stroke_width(2),
            ))
            .map_err(draw_err)?
            .label(format!("MA{}", period))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    price
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(draw_err)?;

    let max_volume = bars.iter().map(|b| b.volume).fold(0.0, f64::max).max(1.0);
    let mut volume = ChartBuilder::on(&lower)
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(90)
        .build_cartesian_2d(x_range, 0f64..max_volume * 1.1)
        .map_err(draw_err)?;

    volume
        .configure_mesh()
        .disable_x_mesh()
        .y_labels(3)
        .y_label_formatter(&|v| format_volume(*v))
        .x_labels(8)
        .x_label_formatter(&|x| date_label(bars, *x))
        .draw()
        .map_err(draw_err)?;

    volume
        .draw_series(bars.iter().enumerate().map(|(i, b)| {
            let color = if b.close >= b.open { UP_COLOR } else { DOWN_COLOR };
            let x = i as f64;
            Rectangle::new([(x - 0.35, 0.0), (x + 0.35, b.volume)], color.mix(0.6).filled())
        }))
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

fn format_price(v: f64) -> String {
    if v.abs() >= 1000.0 {
        report_core::format::group_thousands(&format!("{:.0}", v))
    } else {
        format!("{:.2}", v)
    }
}

fn format_volume(v: f64) -> String {
    if v >= 1_000_000_000.0 {
        format!("{:.1}B", v / 1_000_000_000.0)
    } else if v >= 1_000_000.0 {
        format!("{:.1}M", v / 1_000_000.0)
    } else if v >= 1_000.0 {
        format!("{:.1}K", v / 1_000.0)
    } else {
        format!("{:.0}", v)
    }
}

/// `MM/DD` of the bar nearest to an x-axis position
fn date_label(bars: &[Bar], x: f64) -> String {
    let i = x.round();
    if i < 0.0 || i >= bars.len() as f64 {
        return String::new();
    }
    bars[i as usize].date.format("%m/%d").to_string()
}
