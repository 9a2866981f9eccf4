// Row decimation: keep 1 in N rows so the output fits a row cap

/// No row limit.
pub const ROW_LIMIT_NONE: u64 = 0;
/// OpenOffice Calc and Excel before 2007.
pub const ROW_LIMIT_CALC: u64 = 65_536;
/// Excel 2007 and later.
pub const ROW_LIMIT_EXCEL: u64 = 1_048_576;
/// Quattro Pro.
pub const ROW_LIMIT_QUATTRO: u64 = 1_000_000;

/// Named row limits accepted by [`parse_row_limit`].
pub const ROW_LIMIT_PRESETS: [(&str, u64); 4] = [
    ("none", ROW_LIMIT_NONE),
    ("calc", ROW_LIMIT_CALC),
    ("excel", ROW_LIMIT_EXCEL),
    ("quattro", ROW_LIMIT_QUATTRO),
];

/// At most this many leading digits are read from a row limit string.
const MAX_LIMIT_DIGITS: usize = 20;

/// Smallest stride `d >= 1` with `ceil(total_rows / d) <= row_cap`.
///
/// Returns 1 when `row_cap` is 0 (no limit) or the rows already fit. The
/// decimator knows nothing about header lines: callers that let a header
/// consume one slot of the cap must add it to `total_rows` themselves.
pub fn stride(total_rows: u64, row_cap: u64) -> u64 {
    if row_cap == 0 || total_rows <= row_cap {
        return 1;
    }
    // ceil(t / d) <= c  <=>  d >= t / c, so the smallest such d is ceil(t / c).
    total_rows.div_ceil(row_cap)
}

/// Rows left after keeping every `stride`-th row starting with the first.
pub fn retained_rows(total_rows: u64, stride: u64) -> u64 {
    total_rows.div_ceil(stride.max(1))
}

/// Parse a row limit: a preset name, or the leading digits of the text.
///
/// `"65536 (OpenOffice, Excel)"` gives 65536; text with no leading digit
/// gives 0, meaning no limit.
pub fn parse_row_limit(text: &str) -> u64 {
    let text = text.trim();
    if let Some((_, limit)) = ROW_LIMIT_PRESETS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(text))
    {
        return *limit;
    }

    let digits: String = text
        .chars()
        .take(MAX_LIMIT_DIGITS)
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return ROW_LIMIT_NONE;
    }
    // Only overflow can fail here
    digits.parse().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ceil_div(a: u64, b: u64) -> u64 {
        (a + b - 1) / b
    }

    #[test]
    fn test_worked_example() {
        assert_eq!(stride(200, 50), 4);
        assert!(ceil_div(200, 3) > 50);
    }

    #[test]
    fn test_no_decimation() {
        assert_eq!(stride(1_000_000, 0), 1);
        assert_eq!(stride(50, 50), 1);
        assert_eq!(stride(10, 50), 1);
        assert_eq!(stride(0, 50), 1);
    }

    #[test]
    fn test_stride_is_minimal_and_fits() {
        for total in 1..400u64 {
            for cap in 1..total {
                let d = stride(total, cap);
                assert!(ceil_div(total, d) <= cap, "total {} cap {} stride {}", total, cap, d);
                if d > 1 {
                    assert!(
                        ceil_div(total, d - 1) > cap,
                        "total {} cap {} stride {} not minimal",
                        total,
                        cap,
                        d
                    );
                }
            }
        }
    }

    #[test]
    fn test_stride_large_values() {
        assert_eq!(stride(u64::MAX, 1), u64::MAX);
        assert_eq!(stride(u64::MAX, ROW_LIMIT_EXCEL), u64::MAX.div_ceil(ROW_LIMIT_EXCEL));
    }

    #[test]
    fn test_header_slot_changes_stride() {
        // 200 data rows plus a header line against a cap of 50
        assert_eq!(stride(201, 50), 5);
    }

    #[test]
    fn test_retained_rows() {
        assert_eq!(retained_rows(200, 4), 50);
        assert_eq!(retained_rows(201, 4), 51);
        assert_eq!(retained_rows(7, 1), 7);
        assert_eq!(retained_rows(0, 3), 0);
    }

    #[test]
    fn test_parse_row_limit() {
        assert_eq!(parse_row_limit("65536 (OpenOffice, Excel)"), 65536);
        assert_eq!(parse_row_limit("1048576"), ROW_LIMIT_EXCEL);
        assert_eq!(parse_row_limit("excel"), ROW_LIMIT_EXCEL);
        assert_eq!(parse_row_limit("Quattro"), ROW_LIMIT_QUATTRO);
        assert_eq!(parse_row_limit("No limit"), 0);
        assert_eq!(parse_row_limit(""), 0);
        assert_eq!(parse_row_limit("  250 "), 250);
    }

    #[test]
    fn test_parse_row_limit_overflow_saturates() {
        assert_eq!(parse_row_limit("99999999999999999999"), u64::MAX);
    }
}
