//! Text normalisation applied before files reach a Linux host.

const BOM: char = '\u{feff}';

/// Normalises text for upload: strips a leading byte-order mark, converts
/// CRLF and lone CR line endings to LF, and optionally expands tabs.
///
/// Tabs are expanded to the next multiple of `tab_stop` columns when
/// `tab_stop` is non-zero.
#[must_use]
pub fn normalize(text: &str, tab_stop: usize) -> String {
    let body = text.strip_prefix(BOM).unwrap_or(text);
    let unified = body.replace("\r\n", "\n").replace('\r', "\n");
    if tab_stop == 0 {
        return unified;
    }
    expand_tabs(&unified, tab_stop)
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tab stops are defined as column multiples"
)]
fn expand_tabs(text: &str, tab_stop: usize) -> String {
    let mut expanded = String::with_capacity(text.len());
    let mut column = 0_usize;
    for ch in text.chars() {
        match ch {
            '\t' => {
                let width = tab_stop - column % tab_stop;
                expanded.extend(std::iter::repeat_n(' ', width));
                column += width;
            }
            '\n' => {
                expanded.push(ch);
                column = 0;
            }
            _ => {
                expanded.push(ch);
                column += 1;
            }
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a\r\nb\rc\n", 0, "a\nb\nc\n")]
    #[case("\u{feff}hello\n", 0, "hello\n")]
    #[case("\tx\n", 4, "    x\n")]
    #[case("ab\tc\n\td", 4, "ab  c\n    d")]
    #[case("a\tb", 0, "a\tb")]
    fn normalize_handles_line_endings_bom_and_tabs(
        #[case] input: &str,
        #[case] tab_stop: usize,
        #[case] expected: &str,
    ) {
        assert_eq!(normalize(input, tab_stop), expected);
    }
}
