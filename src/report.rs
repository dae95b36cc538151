//! Excel report for a finished walk.
//!
//! Two sheets:
//! - `Datos`: every reading in log column order, one constant `umbral_*` column
//!   per metric, status colouring and one chart per metric against its
//!   threshold.
//! - `Resumen`: alert count per metric with a recommendation and a column
//!   chart.
//!
//! An empty reading list still produces both sheets: headers, a "Sin lecturas"
//! note on `Datos`, and a `Resumen` listing every metric with zero alerts.
//! Charts and conditional formats are left out in that case.

use std::path::Path;

use rust_xlsxwriter::{
    Chart, ChartDataLabel, ChartFormat, ChartLegendPosition, ChartLine, ChartLineDashType,
    ChartMarker, ChartMarkerType, ChartSolidFill, ChartType, Color, ConditionalFormat3ColorScale,
    ConditionalFormatText, ConditionalFormatTextRule, Format, FormatAlign, FormatBorder, Workbook,
    Worksheet, XlsxError,
};
use serde::Serialize;

use crate::models::{Metric, Reading, TIMESTAMP_FORMAT};
use crate::store::HEADER;
use crate::thresholds::ThresholdConfig;

// ---

pub const DATA_SHEET: &str = "Datos";
pub const SUMMARY_SHEET: &str = "Resumen";

/// Rows between consecutive charts on the data sheet.
const CHART_STRIDE: u32 = 17;

/// Column holding the `alerta` status.
const STATUS_COL: u16 = 9;

/// First `umbral_*` column, right after the log columns.
const THRESHOLD_COL: u16 = HEADER.len() as u16;

/// First column used for charts, leaving one blank column after the data.
const CHART_COL: u16 = THRESHOLD_COL + Metric::ALL.len() as u16 + 1;

/// Follow-up advice bucketed by alert count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recommendation {
    HighPriority,
    Moderate,
    Normal,
}

impl Recommendation {
    // ---
    pub fn for_count(alerts: usize) -> Self {
        match alerts {
            0 => Recommendation::Normal,
            1 | 2 => Recommendation::Moderate,
            _ => Recommendation::HighPriority,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Recommendation::HighPriority => {
                "Revisar con prioridad (posible condición fuera de control)."
            }
            Recommendation::Moderate => "Atención moderada; verificar condiciones.",
            Recommendation::Normal => "Dentro de valores normales.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub metric: Metric,
    pub alerts: usize,
    pub recommendation: Recommendation,
}

/// Alert count per metric, in metric order.
pub fn summarize(readings: &[Reading]) -> Vec<SummaryRow> {
    // ---
    Metric::ALL
        .into_iter()
        .map(|metric| {
            let alerts = readings
                .iter()
                .filter(|r| r.violated.contains(&metric))
                .count();
            SummaryRow {
                metric,
                alerts,
                recommendation: Recommendation::for_count(alerts),
            }
        })
        .collect()
}

struct Formats {
    header: Format,
    cell: Format,
    ok: Format,
    bad: Format,
    title: Format,
}

impl Formats {
    fn new() -> Self {
        // ---
        Formats {
            header: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0x1F4E78))
                .set_font_color(Color::White)
                .set_border(FormatBorder::Thin)
                .set_align(FormatAlign::Center),
            cell: Format::new().set_border(FormatBorder::Thin),
            ok: Format::new()
                .set_background_color(Color::RGB(0xC6EFCE))
                .set_font_color(Color::RGB(0x006100)),
            bad: Format::new()
                .set_background_color(Color::RGB(0xFFC7CE))
                .set_font_color(Color::RGB(0x9C0006)),
            title: Format::new().set_bold().set_font_size(14),
        }
    }
}

/// Build the workbook in memory.
pub fn build(readings: &[Reading], thresholds: &ThresholdConfig) -> Result<Workbook, XlsxError> {
    // ---
    let formats = Formats::new();
    let mut workbook = Workbook::new();
    workbook.push_worksheet(data_sheet(readings, thresholds, &formats)?);
    workbook.push_worksheet(summary_sheet(
        &summarize(readings),
        readings.is_empty(),
        &formats,
    )?);
    Ok(workbook)
}

/// Build the workbook and save it to `path`.
pub fn write(
    readings: &[Reading],
    thresholds: &ThresholdConfig,
    path: impl AsRef<Path>,
) -> Result<(), XlsxError> {
    // ---
    let mut workbook = build(readings, thresholds)?;
    workbook.save(path.as_ref())?;
    tracing::info!(
        "Report written to {} ({} readings)",
        path.as_ref().display(),
        readings.len()
    );
    Ok(())
}

fn data_sheet(
    readings: &[Reading],
    thresholds: &ThresholdConfig,
    formats: &Formats,
) -> Result<Worksheet, XlsxError> {
    // ---
    let mut ws = Worksheet::new();
    ws.set_name(DATA_SHEET)?;

    for (col, name) in HEADER.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *name, &formats.header)?;
    }
    for (i, m) in Metric::ALL.iter().enumerate() {
        let name = format!("umbral_{}", m.column());
        ws.write_string_with_format(0, THRESHOLD_COL + i as u16, name, &formats.header)?;
    }

    ws.set_column_width(0, 19)?;
    ws.set_column_width(1, 9)?;
    ws.set_column_width(2, 9)?;
    for col in 3..9 {
        ws.set_column_width(col, 18)?;
    }
    ws.set_column_width(STATUS_COL, 22)?;
    ws.set_column_width(10, 40)?;

    for (i, r) in readings.iter().enumerate() {
        let row = i as u32 + 1;
        let ts = r.timestamp.format(TIMESTAMP_FORMAT).to_string();
        ws.write_string_with_format(row, 0, ts, &formats.cell)?;
        ws.write_number_with_format(row, 1, r.row as f64, &formats.cell)?;
        ws.write_number_with_format(row, 2, r.col as f64, &formats.cell)?;
        for (j, m) in Metric::ALL.iter().enumerate() {
            ws.write_number_with_format(row, 3 + j as u16, r.values.get(*m), &formats.cell)?;
            ws.write_number(row, THRESHOLD_COL + j as u16, thresholds.max_for(*m))?;
        }
        ws.write_string_with_format(row, STATUS_COL, r.status.as_str(), &formats.cell)?;
        ws.write_string_with_format(row, 10, r.violated_names(), &formats.cell)?;
    }

    if readings.is_empty() {
        ws.write_string_with_format(1, 0, "Sin lecturas", &formats.title)?;
        return Ok(ws);
    }

    let last = readings.len() as u32;

    // "FUERA DE LO NORMAL" also contains "NORMAL", so green only matches a
    // cell that starts with it.
    let bad = ConditionalFormatText::new()
        .set_rule(ConditionalFormatTextRule::Contains("FUERA".to_string()))
        .set_format(&formats.bad);
    let ok = ConditionalFormatText::new()
        .set_rule(ConditionalFormatTextRule::BeginsWith("NORMAL".to_string()))
        .set_format(&formats.ok);
    ws.add_conditional_format(1, STATUS_COL, last, STATUS_COL, &bad)?;
    ws.add_conditional_format(1, STATUS_COL, last, STATUS_COL, &ok)?;

    let caption = "Gráficos individuales con umbral";
    ws.write_string_with_format(1, CHART_COL, caption, &formats.title)?;

    let mut chart_row = 3;
    for (i, m) in Metric::ALL.iter().enumerate() {
        let chart = metric_chart(*m, 3 + i as u16, THRESHOLD_COL + i as u16, last);
        ws.insert_chart(chart_row, CHART_COL, &chart)?;
        chart_row += CHART_STRIDE;
    }

    let caption = "Leyenda de colores";
    ws.write_string_with_format(chart_row + 2, CHART_COL, caption, &formats.title)?;
    let legend = [
        ("Color / Línea", "Significado"),
        ("Verde", "Dentro de los valores normales"),
        ("Rojo", "Valor fuera del rango permitido"),
        ("Línea roja discontinua", "Umbral máximo permitido"),
    ];
    for (i, (a, b)) in legend.iter().enumerate() {
        let fmt = if i == 0 { &formats.header } else { &formats.cell };
        let row = chart_row + 4 + i as u32;
        ws.write_string_with_format(row, CHART_COL, *a, fmt)?;
        ws.write_string_with_format(row, CHART_COL + 1, *b, fmt)?;
    }

    Ok(ws)
}

fn metric_chart(metric: Metric, value_col: u16, threshold_col: u16, last: u32) -> Chart {
    // ---
    let mut chart = Chart::new(ChartType::ScatterStraightWithMarkers);
    let series_name = format!("{} (Normal)", metric.label());

    chart
        .add_series()
        .set_name(series_name.as_str())
        .set_categories((DATA_SHEET, 1, 0, last, 0))
        .set_values((DATA_SHEET, 1, value_col, last, value_col))
        .set_marker(
            ChartMarker::new()
                .set_type(ChartMarkerType::Circle)
                .set_size(5)
                .set_format(
                    ChartFormat::new()
                        .set_solid_fill(ChartSolidFill::new().set_color(Color::Green))
                        .set_border(ChartLine::new().set_color(Color::Green)),
                ),
        )
        .set_format(
            ChartFormat::new().set_line(ChartLine::new().set_color(Color::RGB(0x70AD47))),
        );

    chart
        .add_series()
        .set_name("Umbral")
        .set_categories((DATA_SHEET, 1, 0, last, 0))
        .set_values((DATA_SHEET, 1, threshold_col, last, threshold_col))
        .set_format(
            ChartFormat::new().set_line(
                ChartLine::new()
                    .set_color(Color::Red)
                    .set_dash_type(ChartLineDashType::Dash),
            ),
        );

    chart.title().set_name(metric.label());
    chart.set_style(10);
    chart.set_width(600).set_height(300);
    chart.legend().set_position(ChartLegendPosition::Bottom);
    chart.y_axis().set_major_gridlines(false);
    chart
}

fn summary_sheet(
    summary: &[SummaryRow],
    no_readings: bool,
    formats: &Formats,
) -> Result<Worksheet, XlsxError> {
    // ---
    let mut ws = Worksheet::new();
    ws.set_name(SUMMARY_SHEET)?;

    ws.set_column_width(0, 22)?;
    ws.set_column_width(1, 12)?;
    ws.set_column_width(2, 60)?;
    ws.write_string_with_format(0, 0, "Sensor", &formats.header)?;
    ws.write_string_with_format(0, 1, "Alertas", &formats.header)?;
    ws.write_string_with_format(0, 2, "Recomendación", &formats.header)?;

    for (i, s) in summary.iter().enumerate() {
        let row = i as u32 + 1;
        ws.write_string(row, 0, s.metric.alert_name())?;
        ws.write_number(row, 1, s.alerts as f64)?;
        ws.write_string(row, 2, s.recommendation.text())?;
    }

    if no_readings {
        return Ok(ws);
    }

    let last = summary.len() as u32;
    let scale = ConditionalFormat3ColorScale::new()
        .set_minimum_color(Color::RGB(0xC6EFCE))
        .set_midpoint_color(Color::RGB(0xFFEB84))
        .set_maximum_color(Color::RGB(0xF4B084));
    ws.add_conditional_format(1, 1, last, 1, &scale)?;

    let mut bar = Chart::new(ChartType::Column);
    bar.add_series()
        .set_name("Alertas")
        .set_categories((SUMMARY_SHEET, 1, 0, last, 0))
        .set_values((SUMMARY_SHEET, 1, 1, last, 1))
        .set_data_label(ChartDataLabel::new().show_value());
    bar.title().set_name("Alertas por sensor");
    bar.y_axis().set_major_gridlines(false);
    bar.legend().set_hidden();
    ws.insert_chart(1, 4, &bar)?;

    Ok(ws)
}
