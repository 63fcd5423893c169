use serde::Serialize;

use crate::config::ColumnMapping;
use crate::record::{CellValue, Record};

/// One labelled line of the employee detail card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardLine {
    pub label: String,
    pub value: String,
}

/// Build the detail card of an employee
///
/// Lines follow `mapping.card_fields`. Missing values read `N/A`, the band
/// percentage gets one decimal and a `%` sign, and salary amounts are shown
/// as Brazilian currency.
pub fn card_lines(record: &Record, mapping: &ColumnMapping) -> Vec<CardLine> {
    mapping
        .card_fields
        .iter()
        .map(|field| CardLine {
            label: field.clone(),
            value: format_value(field, record.value(field), mapping),
        })
        .collect()
}

fn format_value(field: &str, value: &CellValue, mapping: &ColumnMapping) -> String {
    if value.is_blank() {
        return "N/A".to_string();
    }

    if field == mapping.calculated {
        if let Some(n) = value.as_number() {
            return format!("{:.1}%", n);
        }
    }

    if mapping.is_currency_field(field) {
        if let CellValue::Number(n) = value {
            return format_brl(*n);
        }
    }

    value.to_string()
}

/// Format an amount as `R$ 1.234,56`
pub fn format_brl(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let units = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, ch) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}R$ {},{:02}", sign, grouped, fraction)
}
