use crate::engine::{SampleReport, SamplingStats};
use crate::table::Record;
use crate::SamplingError;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

const SUMMARY_SHEET: &str = "Summary";
const DETAIL_SHEET: &str = "Detail";
const STATISTICS_SHEET: &str = "Statistics";
const EXCEL_CELL_CHAR_LIMIT: usize = 32_767;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Detail sheets split once they exceed this many rows.
    pub detail_chunk_rows: usize,
    /// Wall-clock budget for cosmetic formatting; once spent, remaining cells
    /// are written unformatted.
    pub format_budget: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            detail_chunk_rows: 5000,
            format_budget: Duration::from_secs(30),
        }
    }
}

/// Discrete export milestones, reported between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    Validated,
    DataWritten,
    Saved,
}

/// Export a sampling report to an `.xlsx` workbook.
///
/// The destination is checked for writability before any workbook work; the
/// workbook is written to a temporary sibling path and renamed into place on
/// success, so a failed export never leaves a partial file behind.
pub fn export_report(
    report: &SampleReport,
    path: &Path,
    opts: &ExportOptions,
) -> Result<(), SamplingError> {
    export_with_control(report, path, opts, None, |_| {})
}

/// Export with cooperative cancellation and phase reporting; used by the
/// background worker.
pub fn export_with_control(
    report: &SampleReport,
    path: &Path,
    opts: &ExportOptions,
    cancel: Option<&AtomicBool>,
    mut on_phase: impl FnMut(ExportPhase),
) -> Result<(), SamplingError> {
    if report.summary.is_empty() {
        return Err(SamplingError::EmptySelection);
    }
    let cancelled = || cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false);

    check_writable(path)?;
    on_phase(ExportPhase::Validated);
    if cancelled() {
        return Err(SamplingError::Cancelled);
    }

    let mut budget = FormatBudget::new(opts.format_budget);
    let mut workbook = match build_workbook(report, opts, &mut budget) {
        Ok(wb) => wb,
        Err(e) => {
            // Defensive fallback: an id-only workbook beats no workbook.
            warn!(error = %e, "full workbook construction failed, writing minimal output");
            build_minimal_workbook(report)
                .map_err(|e| SamplingError::ExportWrite(e.to_string()))?
        }
    };
    on_phase(ExportPhase::DataWritten);
    if cancelled() {
        return Err(SamplingError::Cancelled);
    }

    let tmp = temp_sibling(path);
    if let Err(e) = workbook.save(&tmp) {
        fs::remove_file(&tmp).ok();
        return Err(SamplingError::ExportWrite(e.to_string()));
    }
    // Rename first: if the swap fails outright, any pre-existing workbook is
    // still intact. Only when `rename` refuses to replace the destination
    // (not guaranteed on every platform) remove it and retry.
    if fs::rename(&tmp, path).is_err() {
        let retry = if path.exists() {
            fs::remove_file(path).and_then(|()| fs::rename(&tmp, path))
        } else {
            fs::rename(&tmp, path)
        };
        if let Err(e) = retry {
            fs::remove_file(&tmp).ok();
            return Err(SamplingError::ExportWrite(e.to_string()));
        }
    }
    on_phase(ExportPhase::Saved);
    Ok(())
}

/// Fail before touching the workbook writer when the destination cannot be
/// written (e.g. the file is open in another application).
fn check_writable(path: &Path) -> Result<(), SamplingError> {
    if path.is_dir() {
        return Err(SamplingError::ExportPrecondition(format!(
            "{} is a directory",
            path.display()
        )));
    }
    if path.exists() {
        OpenOptions::new().append(true).open(path).map_err(|e| {
            SamplingError::ExportPrecondition(format!(
                "cannot open {} for writing: {e}",
                path.display()
            ))
        })?;
    } else {
        File::create(path).map_err(|e| {
            SamplingError::ExportPrecondition(format!(
                "cannot create {}: {e}",
                path.display()
            ))
        })?;
        fs::remove_file(path).ok();
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    name.push_str(".tmp");
    path.with_file_name(name)
}

/// Wall-clock budget for cosmetic formatting. Expiry is logged once; data
/// writing continues unformatted.
struct FormatBudget {
    deadline: Instant,
    logged: bool,
}

impl FormatBudget {
    fn new(budget: Duration) -> Self {
        FormatBudget {
            deadline: Instant::now() + budget,
            logged: false,
        }
    }

    fn active(&mut self) -> bool {
        if Instant::now() < self.deadline {
            true
        } else {
            if !self.logged {
                warn!("formatting budget exhausted, remaining cells written unformatted");
                self.logged = true;
            }
            false
        }
    }
}

fn header_format(fill: u32) -> Format {
    Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(fill))
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin)
}

fn data_format() -> Format {
    Format::new().set_border(FormatBorder::Thin)
}

fn zebra_format(fill: u32) -> Format {
    Format::new()
        .set_border(FormatBorder::Thin)
        .set_background_color(Color::RGB(fill))
}

/// Keep cell text inside Excel's limits: BMP characters only, capped length.
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| (c as u32) < 0x10000)
        .take(EXCEL_CELL_CHAR_LIMIT)
        .collect()
}

fn write_cell(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    value: &str,
    fmt: Option<&Format>,
) -> Result<(), XlsxError> {
    let value = sanitize_cell(value);
    match fmt {
        Some(f) => ws.write_string_with_format(row, col, &value, f)?,
        None => ws.write_string(row, col, &value)?,
    };
    Ok(())
}

fn build_workbook(
    report: &SampleReport,
    opts: &ExportOptions,
    budget: &mut FormatBudget,
) -> Result<Workbook, XlsxError> {
    let mut wb = Workbook::new();

    let ws = wb.add_worksheet().set_name(SUMMARY_SHEET)?;
    write_summary(ws, report, budget)?;

    if report.rows.is_empty() {
        let ws = wb.add_worksheet().set_name(DETAIL_SHEET)?;
        write_detail(ws, &report.headers, &[], budget)?;
    } else {
        for (i, chunk) in report.rows.chunks(opts.detail_chunk_rows).enumerate() {
            let name = if i == 0 {
                DETAIL_SHEET.to_string()
            } else {
                format!("{DETAIL_SHEET}_{}", i + 1)
            };
            let ws = wb.add_worksheet().set_name(&name)?;
            write_detail(ws, &report.headers, chunk, budget)?;
        }
    }

    let ws = wb.add_worksheet().set_name(STATISTICS_SHEET)?;
    write_statistics(ws, &report.stats, budget)?;
    Ok(wb)
}

fn write_summary(
    ws: &mut Worksheet,
    report: &SampleReport,
    budget: &mut FormatBudget,
) -> Result<(), XlsxError> {
    let mut headers = vec![report.id_column.as_str(), crate::engine::REASONS_COLUMN];
    if report.date_column.is_some() {
        headers.push("Date");
    }
    let hfmt = header_format(0x4472C4);
    for (c, h) in headers.iter().enumerate() {
        let fmt = budget.active().then_some(&hfmt);
        write_cell(ws, 0, c as u16, h, fmt)?;
    }
    if budget.active() {
        ws.set_column_width(0, 20)?;
        ws.set_column_width(1, 60)?;
        if report.date_column.is_some() {
            ws.set_column_width(2, 15)?;
        }
    }
    let dfmt = data_format();
    let zfmt = zebra_format(0xE9EDF4);
    for (i, row) in report.summary.iter().enumerate() {
        let fmt = budget
            .active()
            .then(|| if i % 2 == 1 { &zfmt } else { &dfmt });
        let r = (i + 1) as u32;
        write_cell(ws, r, 0, &row.declaration, fmt)?;
        write_cell(ws, r, 1, &row.reasons, fmt)?;
        if report.date_column.is_some() {
            write_cell(ws, r, 2, row.date.as_deref().unwrap_or(""), fmt)?;
        }
    }
    Ok(())
}

fn write_detail(
    ws: &mut Worksheet,
    headers: &[String],
    rows: &[Record],
    budget: &mut FormatBudget,
) -> Result<(), XlsxError> {
    let hfmt = header_format(0x5B9BD5);
    for (c, h) in headers.iter().enumerate() {
        let fmt = budget.active().then_some(&hfmt);
        write_cell(ws, 0, c as u16, h, fmt)?;
    }
    if budget.active() {
        for c in 0..headers.len().min(10) {
            ws.set_column_width(c as u16, 15)?;
        }
    }
    let dfmt = data_format();
    let zfmt = zebra_format(0xDEEBF7);
    for (i, row) in rows.iter().enumerate() {
        let fmt = budget
            .active()
            .then(|| if i % 2 == 1 { &zfmt } else { &dfmt });
        for (c, h) in headers.iter().enumerate() {
            let value = row.get(h).unwrap_or("");
            write_cell(ws, (i + 1) as u32, c as u16, value, fmt)?;
        }
    }
    Ok(())
}

fn write_statistics(
    ws: &mut Worksheet,
    stats: &SamplingStats,
    budget: &mut FormatBudget,
) -> Result<(), XlsxError> {
    let hfmt = header_format(0x70AD47);
    for (c, h) in ["Statistic", "Value"].iter().enumerate() {
        let fmt = budget.active().then_some(&hfmt);
        write_cell(ws, 0, c as u16, h, fmt)?;
    }
    if budget.active() {
        ws.set_column_width(0, 25)?;
        ws.set_column_width(1, 15)?;
    }
    let pct = (stats.selection_percentage() * 100.0).round() / 100.0;
    let rows: [(&str, f64); 4] = [
        ("Total declarations", stats.total_declarations as f64),
        ("Selected declarations", stats.selected_count as f64),
        ("Target sample count", stats.target_sample_count as f64),
        ("Selection percentage (%)", pct),
    ];
    for (i, (label, value)) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        write_cell(ws, r, 0, label, None)?;
        ws.write_number(r, 1, *value)?;
    }
    Ok(())
}

/// Last-resort output: declaration ids and the run statistics, nothing else.
fn build_minimal_workbook(report: &SampleReport) -> Result<Workbook, XlsxError> {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet().set_name(SUMMARY_SHEET)?;
    ws.write_string(0, 0, report.id_column.as_str())?;
    for (i, row) in report.summary.iter().enumerate() {
        ws.write_string((i + 1) as u32, 0, sanitize_cell(&row.declaration))?;
    }
    let mut budget = FormatBudget::new(Duration::ZERO);
    let ws = wb.add_worksheet().set_name(STATISTICS_SHEET)?;
    write_statistics(ws, &report.stats, &mut budget)?;
    Ok(wb)
}
