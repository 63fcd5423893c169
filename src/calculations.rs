use crate::record::CellValue;

/// Band position of a salary sitting exactly on the floor
pub const FLOOR_POINTS: f64 = 80.0;
/// Band position of a salary sitting exactly on the midpoint
pub const MIDPOINT_POINTS: f64 = 100.0;
/// Band position of a salary sitting exactly on the ceiling
pub const CEILING_POINTS: f64 = 120.0;

const SEGMENT_POINTS: f64 = MIDPOINT_POINTS - FLOOR_POINTS;

/// Position a salary within its grade band
///
/// The band is mapped linearly onto a scale where the floor is 80, the
/// midpoint `(floor + ceiling) / 2` is 100 and the ceiling is 120. Salaries
/// outside the band are extrapolated with the slope of the nearest half.
///
/// # Arguments
/// * `salary` - The employee's current salary
/// * `floor` - Lower bound of the grade band
/// * `ceiling` - Upper bound of the grade band
///
/// # Returns
/// * `Option<f64>` - The band position, or `None` when any input is NaN or
///   the band is degenerate (`floor >= ceiling`)
///
/// # Examples
/// ```
/// use orgchart::calculations::band_percentage;
///
/// assert_eq!(band_percentage(1500.0, 1000.0, 2000.0), Some(100.0));
/// assert_eq!(band_percentage(1250.0, 1000.0, 2000.0), Some(90.0));
/// assert_eq!(band_percentage(1500.0, 2000.0, 1000.0), None);
/// ```
pub fn band_percentage(salary: f64, floor: f64, ceiling: f64) -> Option<f64> {
    if salary.is_nan() || floor.is_nan() || ceiling.is_nan() || floor >= ceiling {
        return None;
    }

    let midpoint = (floor + ceiling) / 2.0;

    if salary == floor {
        return Some(FLOOR_POINTS);
    }
    if salary == ceiling {
        return Some(CEILING_POINTS);
    }
    if salary == midpoint {
        return Some(MIDPOINT_POINTS);
    }

    if salary > floor && salary < midpoint {
        let progress = (salary - floor) / (midpoint - floor);
        return Some(FLOOR_POINTS + progress * SEGMENT_POINTS);
    }
    if salary > midpoint && salary < ceiling {
        let progress = (salary - midpoint) / (ceiling - midpoint);
        return Some(MIDPOINT_POINTS + progress * SEGMENT_POINTS);
    }

    if salary < floor {
        let per_point = (midpoint - floor) / SEGMENT_POINTS;
        if per_point == 0.0 {
            return None;
        }
        return Some(FLOOR_POINTS - (floor - salary) / per_point);
    }

    if salary > ceiling {
        let per_point = (ceiling - midpoint) / SEGMENT_POINTS;
        if per_point == 0.0 {
            return None;
        }
        return Some(CEILING_POINTS + (salary - ceiling) / per_point);
    }

    None
}

/// Band position computed from raw spreadsheet cells
///
/// Cells are coerced with [`CellValue::as_number`]; a non-numeric cell makes
/// the result `None`.
pub fn band_percentage_cells(
    salary: &CellValue,
    floor: &CellValue,
    ceiling: &CellValue,
) -> Option<f64> {
    band_percentage(salary.as_number()?, floor.as_number()?, ceiling.as_number()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_map_to_80_100_120() {
        for (floor, ceiling) in [(1000.0, 2000.0), (0.5, 0.75), (-100.0, 300.0)] {
            let mid = (floor + ceiling) / 2.0;
            assert_eq!(band_percentage(floor, floor, ceiling), Some(80.0));
            assert_eq!(band_percentage(mid, floor, ceiling), Some(100.0));
            assert_eq!(band_percentage(ceiling, floor, ceiling), Some(120.0));
        }
    }

    #[test]
    fn interpolates_inside_the_band() {
        assert_eq!(band_percentage(1250.0, 1000.0, 2000.0), Some(90.0));
        assert_eq!(band_percentage(1750.0, 1000.0, 2000.0), Some(110.0));
    }

    #[test]
    fn extrapolates_outside_the_band() {
        // 500 below the floor at 25 per point
        assert_eq!(band_percentage(500.0, 1000.0, 2000.0), Some(60.0));
        assert_eq!(band_percentage(2500.0, 1000.0, 2000.0), Some(140.0));
        assert_eq!(band_percentage(0.0, 1000.0, 2000.0), Some(40.0));
    }

    #[test]
    fn degenerate_bands_are_not_computable() {
        assert_eq!(band_percentage(1000.0, 1000.0, 1000.0), None);
        assert_eq!(band_percentage(1500.0, 2000.0, 1000.0), None);
        assert_eq!(band_percentage(f64::NAN, 1000.0, 2000.0), None);
        assert_eq!(band_percentage(1500.0, f64::NAN, 2000.0), None);
    }

    #[test]
    fn monotonic_in_salary() {
        let (floor, ceiling) = (1000.0, 2000.0);
        let mut previous = f64::NEG_INFINITY;
        let mut salary = -500.0;
        while salary <= 3500.0 {
            let value = band_percentage(salary, floor, ceiling).unwrap();
            assert!(value >= previous, "{} < {} at salary {}", value, previous, salary);
            previous = value;
            salary += 37.5;
        }
    }

    #[test]
    fn cells_are_coerced_leniently() {
        let result = band_percentage_cells(
            &CellValue::from("1500"),
            &CellValue::Number(1000.0),
            &CellValue::from("2000 BRL"),
        );
        assert_eq!(result, Some(100.0));
        assert_eq!(
            band_percentage_cells(&CellValue::from("n/a"), &1000.0.into(), &2000.0.into()),
            None
        );
        assert_eq!(
            band_percentage_cells(&CellValue::Empty, &1000.0.into(), &2000.0.into()),
            None
        );
    }
}
