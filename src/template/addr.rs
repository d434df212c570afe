//! A1-style cell address helpers.

/// Letters for a 0-based column index (`0 -> "A"`, `26 -> "AA"`).
pub(crate) fn column_letters(col: u32) -> String {
    let mut n = col + 1;
    let mut out = String::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        out.insert(0, (b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    out
}

/// A1 reference for a 1-based row and 0-based column.
pub(crate) fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{row}", column_letters(col))
}

/// Parse an A1 reference into `(row, col)` — row 1-based, column 0-based.
pub(crate) fn parse_cell_ref(r: &str) -> Option<(u32, u32)> {
    let digits_at = r.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = r.split_at(digits_at);
    if letters.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row, col - 1))
}
