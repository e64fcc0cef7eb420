//! A1 ranges with sheet names

use sheetdb::range::row_range;

/// Sheet name as it must appear in an A1 range: always quoted, `'` doubled
pub fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// The whole sheet
pub fn whole_sheet(sheet: &str) -> String {
    quote_sheet(sheet)
}

/// Header row
pub fn header_row(sheet: &str) -> String {
    format!("{}!1:1", quote_sheet(sheet))
}

/// Anchor for appends: the API finds the end of the table itself
pub fn append_anchor(sheet: &str) -> String {
    format!("{}!A1", quote_sheet(sheet))
}

/// One row, `width` columns wide from column A
pub fn row(sheet: &str, row_number: usize, width: usize) -> String {
    format!("{}!{}", quote_sheet(sheet), row_range(row_number, width))
}

/// Rows `first..=last`, every column
pub fn rows(sheet: &str, first: usize, last: usize) -> String {
    format!("{}!{}:{}", quote_sheet(sheet), first, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_sheet() {
        assert_eq!(quote_sheet("Users"), "'Users'");
        assert_eq!(quote_sheet("Q1 Sales"), "'Q1 Sales'");
        assert_eq!(quote_sheet("Bob's"), "'Bob''s'");
    }

    #[test]
    fn test_ranges() {
        assert_eq!(header_row("Users"), "'Users'!1:1");
        assert_eq!(append_anchor("Users"), "'Users'!A1");
        assert_eq!(row("Users", 3, 3), "'Users'!A3:C3");
        assert_eq!(row("Wide", 2, 28), "'Wide'!A2:AB2");
        assert_eq!(rows("Users", 2, 10), "'Users'!2:10");
    }
}
