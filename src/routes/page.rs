//! `GET /` - server-rendered dashboard page.
//!
//! The page reloads itself every refresh interval; each load renders whatever
//! the poller last published. Charts are inline SVG: the series in green, the
//! threshold as a dashed red line and exceeded points as red dots.

use std::fmt::Write;

use axum::{extract::State, response::Html, routing::get, Router};

use crate::dashboard::{DashboardView, MetricAlert, MetricSeries, SharedView, Snapshot};
use crate::models::{Metric, MetricStatus, TIMESTAMP_FORMAT};
use crate::Config;

// ---

const CHART_W: f64 = 360.0;
const CHART_H: f64 = 160.0;
const CHART_PAD: f64 = 20.0;

pub fn router() -> Router<(SharedView, Config)> {
    // ---
    Router::new().route("/", get(handler))
}

async fn handler(State((view, config)): State<(SharedView, Config)>) -> Html<String> {
    // ---
    let view = view.read().await;
    Html(render_page(&view, config.refresh.as_secs()))
}

/// Render the whole page for one view.
pub fn render_page(view: &DashboardView, refresh_secs: u64) -> String {
    // ---
    let mut out = String::with_capacity(16 * 1024);
    let _ = write!(
        out,
        r#"<!doctype html>
<html lang="es">
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="{refresh_secs}">
<title>Dashboard Viñedo</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 1.5rem; color: #222; }}
.grid {{ display: grid; grid-template-columns: repeat(3, 1fr); gap: 1rem; }}
.alert {{ font-weight: bold; padding: .4rem .6rem; border-radius: 6px; }}
.normal {{ background: #C6EFCE; color: #006100; }}
.out_of_range {{ background: #FFC7CE; color: #9C0006; }}
.no_data {{ background: #eee; color: #555; }}
table {{ border-collapse: collapse; }}
td, th {{ border: 1px solid #ccc; padding: .2rem .5rem; text-align: right; }}
th {{ background: #1F4E78; color: white; }}
.info {{ background: #e8f0fe; padding: 1rem; border-radius: 6px; }}
</style>
</head>
<body>
<h1>Dashboard en tiempo real - Viñedo</h1>
"#
    );

    match view {
        DashboardView::Idle => {
            out.push_str(
                r#"<p class="info">Aún no hay datos. Ejecuta el simulador para iniciar el flujo en tiempo real…</p>
"#,
            );
        }
        DashboardView::Rendering(snapshot) => render_snapshot(&mut out, snapshot),
    }

    let _ = write!(
        out,
        "<p><small>Auto-actualizando cada {refresh_secs} s…</small></p>\n</body>\n</html>\n"
    );
    out
}

fn render_snapshot(out: &mut String, snap: &Snapshot) {
    // ---
    let latest = snap
        .latest_timestamp
        .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string());
    let _ = writeln!(
        out,
        "<p>{} lecturas · última: {}</p>",
        snap.total_rows,
        html_escape(&latest)
    );

    out.push_str("<h2>Alertas en vivo</h2>\n<div class=\"grid\">\n");
    for alert in &snap.alerts {
        let _ = writeln!(
            out,
            "<div class=\"alert {}\">{}</div>",
            status_class(alert.status),
            html_escape(&alert_text(alert))
        );
    }
    out.push_str("</div>\n");

    out.push_str("<h2>Gráficos por sensor</h2>\n<div class=\"grid\">\n");
    for series in &snap.series {
        let _ = writeln!(
            out,
            "<div><h3>{}</h3>{}</div>",
            html_escape(series.label),
            chart_svg(series)
        );
    }
    out.push_str("</div>\n");

    out.push_str("<h2>Histórico reciente</h2>\n<table>\n<tr><th>timestamp</th>");
    for m in Metric::ALL {
        let _ = write!(out, "<th>{}</th>", m.column());
    }
    out.push_str("</tr>\n");
    for row in &snap.history {
        let ts = row
            .timestamp
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default();
        let _ = write!(out, "<tr><td>{}</td>", html_escape(&ts));
        for m in Metric::ALL {
            let _ = write!(out, "<td>{}</td>", fmt_value(row.get(m)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");

    out.push_str(
        "<h2>Leyenda de umbrales</h2>\n<table>\n<tr><th>Sensor</th><th>Umbral Máximo Permitido</th></tr>\n",
    );
    for entry in &snap.legend {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td></tr>",
            html_escape(entry.label),
            entry.threshold
        );
    }
    out.push_str("</table>\n");
}

/// Alert panel text for one metric.
pub fn alert_text(alert: &MetricAlert) -> String {
    // ---
    match (alert.status, alert.value) {
        (MetricStatus::OutOfRange, Some(v)) => format!(
            "🔴 {}: {} > {} (FUERA DE LO NORMAL)",
            alert.label, v, alert.threshold
        ),
        (MetricStatus::Normal, Some(v)) => {
            format!("🟢 {}: {} ≤ {} (NORMAL)", alert.label, v, alert.threshold)
        }
        _ => format!("⛔ {}: sin dato", alert.label),
    }
}

fn status_class(status: MetricStatus) -> &'static str {
    match status {
        MetricStatus::Normal => "normal",
        MetricStatus::OutOfRange => "out_of_range",
        MetricStatus::NoData => "no_data",
    }
}

fn fmt_value(v: Option<f64>) -> String {
    match v {
        Some(x) if !x.is_nan() => x.to_string(),
        _ => "-".to_string(),
    }
}

fn chart_svg(series: &MetricSeries) -> String {
    // ---
    let valid: Vec<(usize, f64, bool)> = series
        .points
        .iter()
        .enumerate()
        .filter_map(|(i, p)| match p.value {
            Some(v) if !v.is_nan() => Some((i, v, p.exceeded)),
            _ => None,
        })
        .collect();

    if valid.is_empty() {
        return "<p>sin datos</p>".to_string();
    }

    let mut lo = series.threshold;
    let mut hi = series.threshold;
    for (_, v, _) in &valid {
        lo = lo.min(*v);
        hi = hi.max(*v);
    }
    if (hi - lo).abs() < f64::EPSILON {
        lo -= 1.0;
        hi += 1.0;
    }

    let span_x = (series.points.len().max(2) - 1) as f64;
    let x = |i: usize| CHART_PAD + i as f64 * (CHART_W - 2.0 * CHART_PAD) / span_x;
    let y = |v: f64| CHART_H - CHART_PAD - (v - lo) / (hi - lo) * (CHART_H - 2.0 * CHART_PAD);

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg viewBox="0 0 {CHART_W} {CHART_H}" width="{CHART_W}" height="{CHART_H}" xmlns="http://www.w3.org/2000/svg">"#
    );

    let line: Vec<String> = valid
        .iter()
        .map(|(i, v, _)| format!("{:.1},{:.1}", x(*i), y(*v)))
        .collect();
    let _ = write!(
        svg,
        r##"<polyline fill="none" stroke="#2E8B57" stroke-width="2" points="{}"/>"##,
        line.join(" ")
    );

    let ty = y(series.threshold);
    let _ = write!(
        svg,
        r#"<line x1="{CHART_PAD}" x2="{:.1}" y1="{ty:.1}" y2="{ty:.1}" stroke="red" stroke-dasharray="6 4"/>"#,
        CHART_W - CHART_PAD
    );
    let _ = write!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" font-size="10" fill="red" text-anchor="end">Umbral {}</text>"#,
        CHART_W - CHART_PAD,
        ty - 3.0,
        series.threshold
    );

    for (i, v, exceeded) in &valid {
        if *exceeded {
            let _ = write!(
                svg,
                r#"<circle class="exceeded" cx="{:.1}" cy="{:.1}" r="4" fill="red"/>"#,
                x(*i),
                y(*v)
            );
        }
    }

    svg.push_str("</svg>");
    svg
}

/// Escape HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::dashboard::compute_snapshot;
    use crate::models::FeedRow;
    use crate::thresholds::ThresholdConfig;

    fn rows() -> Vec<FeedRow> {
        vec![
            FeedRow {
                timestamp: None,
                values: [Some(20.0), Some(20.0), Some(6.0), Some(50.0), Some(20.0), Some(100.0)],
            },
            FeedRow {
                timestamp: None,
                values: [Some(36.0), None, Some(6.0), Some(50.0), Some(20.0), Some(100.0)],
            },
        ]
    }

    #[test]
    fn test_idle_page() {
        // ---
        let html = render_page(&DashboardView::Idle, 2);
        assert!(html.contains("Aún no hay datos"));
        assert!(html.contains(r#"content="2""#));
        assert!(!html.contains("<svg"));
    }

    #[test]
    fn test_rendering_page() {
        // ---
        let snap = compute_snapshot(&rows(), &ThresholdConfig::default(), 50).unwrap();
        assert_eq!(
            alert_text(&snap.alerts[0]),
            "🔴 Humedad Suelo (%): 36 > 35 (FUERA DE LO NORMAL)"
        );

        let html = render_page(&DashboardView::Rendering(snap), 5);
        assert!(html.contains("🔴 Humedad Suelo (%): 36 &gt; 35 (FUERA DE LO NORMAL)"));
        assert!(html.contains("⛔ Temperatura Suelo (°C): sin dato"));
        assert!(html.contains("🟢 pH Suelo: 6 ≤ 7.5 (NORMAL)"));
        assert_eq!(html.matches("<svg").count(), 6);
        assert_eq!(html.matches(r#"class="exceeded""#).count(), 1);
        assert!(html.contains("Leyenda de umbrales"));
    }

    #[test]
    fn test_chart_without_values() {
        // ---
        let series = MetricSeries {
            metric: Metric::SoilPh,
            label: Metric::SoilPh.label(),
            threshold: 7.5,
            points: vec![],
        };
        assert_eq!(chart_svg(&series), "<p>sin datos</p>");
    }

    #[test]
    fn test_html_escape() {
        // ---
        assert_eq!(html_escape("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
