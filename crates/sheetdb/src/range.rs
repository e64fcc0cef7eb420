//! A1-style cell addressing shared by the workbook writer and remote stores

/// Column letters for a 1-based column index: 1 -> A, 26 -> Z, 27 -> AA
///
/// Index 0 has no letter and yields an empty string.
pub fn column_letter(index: usize) -> String {
    let mut n = index;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Cell reference for 1-based row and column, e.g. (2, 3) -> "C2"
pub fn cell_ref(row: usize, column: usize) -> String {
    format!("{}{}", column_letter(column), row)
}

/// Row-spanning range such as "A2:C2"
pub fn row_range(row: usize, width: usize) -> String {
    format!("A{}:{}", row, cell_ref(row, width.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "");
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(53), "BA");
        assert_eq!(column_letter(702), "ZZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn test_cell_ref() {
        assert_eq!(cell_ref(1, 1), "A1");
        assert_eq!(cell_ref(2, 3), "C2");
        assert_eq!(cell_ref(10, 28), "AB10");
    }

    #[test]
    fn test_row_range() {
        assert_eq!(row_range(2, 3), "A2:C2");
        assert_eq!(row_range(5, 30), "A5:AD5");
        assert_eq!(row_range(4, 0), "A4:A4");
    }
}
