use std::collections::HashMap;

use crate::calculations::band_percentage_cells;
use crate::config::ColumnMapping;
use crate::record::{CellValue, Record};

/// Join employees with their grade band and attach the band percentage
///
/// Grades are indexed by grade code (a later row with the same code replaces
/// an earlier one). For an employee whose grade is found, every grade column
/// the employee does not already fill is copied over, and the calculated
/// field is set from the merged salary, floor and ceiling (`Empty` when the
/// band position cannot be computed). Employees without a matching grade are
/// returned untouched.
///
/// # Arguments
/// * `employees` - Rows of the organogram sheet
/// * `grades` - Rows of the grade sheet
/// * `mapping` - Column configuration
///
/// # Returns
/// * `Vec<Record>` - The employees, in their original order
pub fn merge_grades(
    employees: Vec<Record>,
    grades: &[Record],
    mapping: &ColumnMapping,
) -> Vec<Record> {
    let grade_map: HashMap<String, &Record> = grades
        .iter()
        .filter_map(|g| g.value(&mapping.grade).as_key().map(|code| (code, g)))
        .collect();

    employees
        .into_iter()
        .map(|employee| {
            let grade = employee
                .value(&mapping.grade)
                .as_key()
                .and_then(|code| grade_map.get(&code).copied());
            match grade {
                Some(grade) => merge_one(employee, grade, mapping),
                None => employee,
            }
        })
        .collect()
}

fn merge_one(mut employee: Record, grade: &Record, mapping: &ColumnMapping) -> Record {
    for (key, value) in grade.iter() {
        if employee.value(key).is_blank() {
            employee.set(key, value.clone());
        }
    }

    let percentage = band_percentage_cells(
        employee.value(&mapping.salary),
        employee.value(&mapping.salary_floor),
        employee.value(&mapping.salary_ceiling),
    );
    employee.set(
        mapping.calculated.clone(),
        percentage.map_or(CellValue::Empty, CellValue::Number),
    );
    employee
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee(id: i64, grade: &str, salary: f64) -> Record {
        let m = ColumnMapping::default();
        [
            (m.id.clone(), CellValue::from(id)),
            (m.grade.clone(), CellValue::from(grade)),
            (m.salary.clone(), CellValue::Number(salary)),
        ]
        .into_iter()
        .collect()
    }

    fn grade(code: &str, floor: f64, ceiling: f64) -> Record {
        let m = ColumnMapping::default();
        [
            (m.grade.clone(), CellValue::from(code)),
            (m.salary_floor.clone(), CellValue::Number(floor)),
            (m.salary_ceiling.clone(), CellValue::Number(ceiling)),
            ("Descrição da Grade".to_string(), CellValue::from("Analyst")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn attaches_band_percentage() {
        let m = ColumnMapping::default();
        let merged = merge_grades(
            vec![employee(1, "G1", 1000.0), employee(2, "G1", 1500.0), employee(3, "G1", 2000.0)],
            &[grade("G1", 1000.0, 2000.0)],
            &m,
        );
        let percentages: Vec<_> = merged.iter().map(|r| r.value(&m.calculated).clone()).collect();
        assert_eq!(
            percentages,
            vec![CellValue::Number(80.0), CellValue::Number(100.0), CellValue::Number(120.0)]
        );
        assert_eq!(merged[0].value("Descrição da Grade"), &CellValue::from("Analyst"));
    }

    #[test]
    fn unknown_grade_passes_through() {
        let m = ColumnMapping::default();
        let original = employee(1, "G9", 1000.0);
        let merged = merge_grades(vec![original.clone()], &[grade("G1", 1000.0, 2000.0)], &m);
        assert_eq!(merged[0], original);
        assert!(!merged[0].contains(&m.calculated));
    }

    #[test]
    fn employee_fields_win_over_grade_fields() {
        let m = ColumnMapping::default();
        let mut e = employee(1, "G1", 1500.0);
        e.set(m.salary_floor.clone(), CellValue::Number(500.0));
        e.set("Descrição da Grade", CellValue::Empty);
        let merged = merge_grades(vec![e], &[grade("G1", 1000.0, 2000.0)], &m);
        assert_eq!(merged[0].value(&m.salary_floor), &CellValue::Number(500.0));
        assert_eq!(merged[0].value("Descrição da Grade"), &CellValue::from("Analyst"));
        // band 500..2000, midpoint 1250, 1500 lies above it
        assert_eq!(merged[0].value(&m.calculated), &CellValue::Number(100.0 + 250.0 / 750.0 * 20.0));
    }

    #[test]
    fn last_grade_row_wins_and_degenerate_band_is_empty() {
        let m = ColumnMapping::default();
        let merged = merge_grades(
            vec![employee(1, "G1", 1500.0)],
            &[grade("G1", 1000.0, 2000.0), grade("G1", 2000.0, 2000.0)],
            &m,
        );
        assert_eq!(merged[0].value(&m.salary_ceiling), &CellValue::Number(2000.0));
        assert_eq!(merged[0].get(&m.calculated), Some(&CellValue::Empty));
    }

    #[test]
    fn numeric_grade_codes_join_text_codes() {
        let m = ColumnMapping::default();
        let mut e = employee(1, "", 1500.0);
        e.set(m.grade.clone(), CellValue::Number(7.0));
        let merged = merge_grades(vec![e], &[grade("7", 1000.0, 2000.0)], &m);
        assert_eq!(merged[0].value(&m.calculated), &CellValue::Number(100.0));
    }
}
