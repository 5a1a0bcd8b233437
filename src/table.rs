use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    path::Path,
};

/// One line item of a declaration. Many rows may carry the same declaration
/// number; declaration-level attributes are expected to repeat across them.
#[derive(Debug, Clone)]
pub struct Record {
    pub values: HashMap<String, String>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }
}

/// Raw line-item table as loaded from disk. Columns are discovered by name
/// at runtime (see `columns`); the only hard requirement downstream is a
/// declaration-number column.
#[derive(Debug, Clone)]
pub struct DeclarationTable {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
}

impl DeclarationTable {
    /// Distinct values of `column` across all rows, first-appearance order,
    /// blanks skipped.
    pub fn distinct_values(&self, column: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for r in &self.rows {
            if let Some(v) = r.get(column) {
                let v = v.trim();
                if !v.is_empty() && seen.insert(v) {
                    out.push(v.to_string());
                }
            }
        }
        out
    }

    /// Distinct declaration ids among rows matching `pred`, first-appearance order.
    pub fn declarations_where<F>(&self, id_column: &str, pred: F) -> Vec<String>
    where
        F: Fn(&Record) -> bool,
    {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for r in &self.rows {
            if !pred(r) {
                continue;
            }
            if let Some(id) = r.get(id_column) {
                let id = id.trim();
                if !id.is_empty() && seen.insert(id) {
                    out.push(id.to_string());
                }
            }
        }
        out
    }

    /// Declaration ids whose rows have `column == value` (trimmed comparison).
    pub fn declarations_with_value(&self, id_column: &str, column: &str, value: &str) -> Vec<String> {
        self.declarations_where(id_column, |r| {
            r.get(column).map(|v| v.trim() == value).unwrap_or(false)
        })
    }

    /// Per-declaration sum of a numeric column, first-appearance order of the
    /// declaration ids. Unparseable cells count as zero.
    pub fn sum_by_declaration(&self, id_column: &str, value_column: &str) -> Vec<(String, f64)> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut out: Vec<(String, f64)> = Vec::new();
        for r in &self.rows {
            let Some(id) = r.get(id_column) else { continue };
            let id = id.trim();
            if id.is_empty() {
                continue;
            }
            let amount = r.get(value_column).map(parse_number).unwrap_or(0.0);
            match index.get(id) {
                Some(&i) => out[i].1 += amount,
                None => {
                    index.insert(id.to_string(), out.len());
                    out.push((id.to_string(), amount));
                }
            }
        }
        out
    }

    /// First row per distinct declaration id, in table order. This is the
    /// unique-declaration table: declaration-level attributes are taken from
    /// whichever line item appeared first.
    pub fn unique_declarations(&self, id_column: &str) -> Vec<Record> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for r in &self.rows {
            if let Some(id) = r.get(id_column) {
                let id = id.trim();
                if !id.is_empty() && seen.insert(id.to_string()) {
                    out.push(r.clone());
                }
            }
        }
        out
    }
}

fn normalize_header(h: &str) -> String {
    h.trim().to_string()
}

fn cell_to_string<T: calamine::DataType>(cell: &T) -> String {
    // Render datetime cells as ISO dates; never reinterpret plain numerics.
    if cell.is_datetime() || cell.is_datetime_iso() {
        if let Some(dt) = cell.as_date() {
            return dt.format("%Y-%m-%d").to_string();
        }
    }
    if let Some(s) = cell.as_string() {
        return s;
    }
    if let Some(i) = cell.as_i64() {
        return i.to_string();
    }
    if let Some(f) = cell.as_f64() {
        if f.fract().abs() < f64::EPSILON {
            return format!("{}", f as i64);
        }
        return f.to_string();
    }
    if let Some(b) = cell.get_bool() {
        return b.to_string();
    }
    String::new()
}

fn load_excel(path: &Path) -> Result<DeclarationTable> {
    let mut wb = open_workbook_auto(path)
        .with_context(|| format!("failed to open Excel file: {}", path.display()))?;
    let sheet_names = wb.sheet_names().to_owned();
    let name = sheet_names
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("workbook has no readable sheets"))?;
    let range = wb.worksheet_range(&name)?;

    let mut rows_iter = range.rows();
    let headers_row = rows_iter
        .next()
        .ok_or_else(|| anyhow::anyhow!("missing header row"))?;
    let headers: Vec<String> = headers_row
        .iter()
        .map(cell_to_string)
        .map(|s| normalize_header(&s))
        .collect();

    let mut rows: Vec<Record> = Vec::new();
    for r in rows_iter {
        let mut map: HashMap<String, String> = HashMap::new();
        for (i, cell) in r.iter().enumerate() {
            if let Some(h) = headers.get(i) {
                map.insert(h.clone(), cell_to_string(cell));
            }
        }
        if map.values().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(Record { values: map });
    }
    Ok(DeclarationTable { headers, rows })
}

fn load_csv(path: &Path) -> Result<DeclarationTable> {
    let file =
        File::open(path).with_context(|| format!("failed to open CSV file: {}", path.display()))?;
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(file);
    let headers = rdr
        .headers()?
        .iter()
        .map(normalize_header)
        .collect::<Vec<_>>();
    let mut rows: Vec<Record> = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let mut map: HashMap<String, String> = HashMap::new();
        for (i, v) in rec.iter().enumerate() {
            if let Some(h) = headers.get(i) {
                map.insert(h.clone(), v.trim().to_string());
            }
        }
        if map.values().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(Record { values: map });
    }
    Ok(DeclarationTable { headers, rows })
}

/// Load a line-item table from Excel or CSV, picked by extension, falling back
/// to trying both for unknown extensions.
pub fn load_table(path: &Path) -> Result<DeclarationTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "xlsx" | "xlsm" | "xls" => load_excel(path),
        "csv" => load_csv(path),
        _ => {
            if path.is_file() {
                load_excel(path).or_else(|_| load_csv(path))
            } else {
                Err(anyhow::anyhow!("unsupported file type: {}", path.display()))
            }
        }
    }
}

/// Parse a numeric cell tolerating thousands separators, currency symbols and
/// accounting-style parentheses. Unparseable input yields 0.0.
pub fn parse_number(s: &str) -> f64 {
    let mut t = s.trim().replace(',', "");
    let has_paren = t.starts_with('(') && t.ends_with(')');
    if has_paren {
        t = t.trim_matches(|c: char| c == '(' || c == ')').to_string();
    }
    t = t
        .trim_start_matches(|c: char| c == '₺' || c == '$' || c == '€')
        .to_string();
    let v = t.parse::<f64>().unwrap_or(0.0);
    if has_paren { -v } else { v }
}

#[cfg(test)]
pub(crate) fn test_table(headers: &[&str], rows: &[&[&str]]) -> DeclarationTable {
    let headers: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    let rows = rows
        .iter()
        .map(|cells| {
            let mut map = HashMap::new();
            for (h, v) in headers.iter().zip(cells.iter()) {
                map.insert(h.clone(), v.to_string());
            }
            Record { values: map }
        })
        .collect();
    DeclarationTable { headers, rows }
}
