/// Flattens a text fact for tabular output.
///
/// Line breaks are dropped, ideographic spaces become two ASCII spaces and no-break spaces
/// become one.
pub fn normalize_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .fold(String::with_capacity(raw.len()), |mut out, c| {
            match c {
                '\u{3000}' => out.push_str("  "),
                '\u{a0}' => out.push(' '),
                other => out.push(other),
            }
            out
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(normalize_text("株式会社\u{3000}テスト\n"), "株式会社  テスト");
        assert_eq!(normalize_text("a\u{a0}b"), "a b");
    }
}
