use serde::Serialize;
use std::collections::HashSet;

use crate::config::ColumnMapping;
use crate::record::{NodeId, Record};

/// Outcome of validating an uploaded sheet
///
/// Bad spreadsheet content is an expected, user-facing condition, so it is
/// reported through this value rather than as an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

// Data rows start on spreadsheet line 2, below the header.
fn sheet_line(index: usize) -> usize {
    index + 2
}

fn check_shape(records: &[Record], required: &[&str]) -> Option<ValidationResult> {
    let Some(first) = records.first() else {
        return Some(ValidationResult::from_errors(vec![
            "A planilha parece estar vazia.".to_string(),
        ]));
    };

    let errors: Vec<String> = required
        .iter()
        .filter(|col| !first.contains(col))
        .map(|col| format!("Coluna obrigatória não encontrada: \"{}\".", col))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(ValidationResult::from_errors(errors))
    }
}

/// Validate the organogram sheet
///
/// Checks run in phases and a failing structural phase stops the run:
/// 1. the sheet must have at least one row;
/// 2. the id, parent and display-name columns must exist on the first row;
/// 3. every row must have an id, ids must be unique and every non-blank
///    parent must refer to an existing id (one message per offending row);
/// 4. exactly one row must have a blank parent.
///
/// Errors from phases 3 and 4 accumulate. The blank-id and duplicate-id
/// checks of phase 3 are stricter than the parent and root checks require:
/// a sheet that fails only them would still build a tree, with the later of
/// two duplicate rows shadowing the earlier one.
///
/// # Arguments
/// * `records` - Data rows of the sheet
/// * `mapping` - Column configuration
///
/// # Returns
/// * `ValidationResult` - Validity flag and the list of human-readable errors
pub fn validate_organogram(records: &[Record], mapping: &ColumnMapping) -> ValidationResult {
    if let Some(result) = check_shape(records, &mapping.required_org_columns()) {
        return result;
    }

    let all_ids: HashSet<NodeId> = records
        .iter()
        .filter_map(|r| NodeId::from_cell(r.value(&mapping.id)))
        .collect();

    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut root_count = 0usize;

    for (index, employee) in records.iter().enumerate() {
        match NodeId::from_cell(employee.value(&mapping.id)) {
            None => errors.push(format!(
                "Erro na Linha {}: O ID do colaborador está em branco.",
                sheet_line(index)
            )),
            Some(id) => {
                if !seen.insert(id.clone()) {
                    errors.push(format!(
                        "Erro na Linha {}: O ID \"{}\" está duplicado na planilha.",
                        sheet_line(index),
                        id
                    ));
                }
            }
        }

        match NodeId::from_cell(employee.value(&mapping.parent)) {
            None => root_count += 1,
            Some(parent) if !all_ids.contains(&parent) => errors.push(format!(
                "Erro na Linha {}: O gestor com ID \"{}\" não foi encontrado na planilha.",
                sheet_line(index),
                parent
            )),
            Some(_) => {}
        }
    }

    if root_count == 0 {
        errors.push(
            "Erro de Hierarquia: Nenhum funcionário raiz (CEO) foi encontrado. \
             Verifique se o campo de gestor do CEO está em branco."
                .to_string(),
        );
    }
    if root_count > 1 {
        errors.push(format!(
            "Erro de Hierarquia: {} funcionários raiz (CEO) foram encontrados, mas apenas um é permitido.",
            root_count
        ));
    }

    ValidationResult::from_errors(errors)
}

/// Validate the grade sheet: non-empty, with grade, floor and ceiling columns
pub fn validate_grades(records: &[Record], mapping: &ColumnMapping) -> ValidationResult {
    check_shape(records, &mapping.required_grade_columns())
        .unwrap_or_else(|| ValidationResult::from_errors(Vec::new()))
}
