//! Display formatting for tabular results. Raw cells are never modified.

use sqlsage_core::models::{CellValue, ColumnKind, ResultColumn, TabularResult};

/// Display strings for every cell, same shape as `result.rows`.
pub fn display_rows(result: &TabularResult) -> Vec<Vec<String>> {
    result
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(&result.columns)
                .map(|(cell, column)| format_cell(column, cell))
                .collect()
        })
        .collect()
}

pub fn format_cell(column: &ResultColumn, cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        CellValue::Timestamp(ts) => ts.format("%Y-%m-%d").to_string(),
        CellValue::Bool(b) => b.to_string(),
        CellValue::Text(s) => s.clone(),
        CellValue::Int(_) | CellValue::Float(_) | CellValue::Numeric(_) => match cell.as_f64() {
            Some(value) if column.kind == ColumnKind::Numeric => {
                if column.name.to_lowercase().contains("amount") {
                    format!("${}", with_thousands(value))
                } else {
                    with_thousands(value)
                }
            }
            _ => numeric_text(cell),
        },
    }
}

fn numeric_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Int(i) => i.to_string(),
        CellValue::Float(f) => f.to_string(),
        CellValue::Numeric(s) => s.clone(),
        _ => String::new(),
    }
}

/// Two decimal places with comma thousands separators: `1234.5` → `1,234.50`.
pub fn with_thousands(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && fixed.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, frac_part)
}
