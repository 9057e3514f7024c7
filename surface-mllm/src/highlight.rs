//! Colour highlighting for parenthetical variation annotations

/// Background colours assigned to successive top-level groups
pub const PALETTE: [&str; 6] = [
    "#faedcb", "#c9e4de", "#c6def1", "#dbcdf0", "#f2c6de", "#f7d9c4",
];

/// Wrap each top-level `( ... )` group of `text` in a coloured inline span
///
/// The colour advances one palette step per top-level group. Nested groups
/// stay verbatim inside their outer span. An unterminated group is appended
/// unwrapped from its opening parenthesis to the end of the text.
pub fn highlight(text: &str) -> String {
    highlight_with(text, |index, group| {
        let mut out = String::with_capacity(group.len() + 80);
        push_span(&mut out, group, PALETTE[index % PALETTE.len()]);
        out
    })
}

/// Same scan as [`highlight`] with a caller-supplied wrapper
///
/// `wrap` receives the 0-based ordinal of the top-level group and its text,
/// parentheses included.
pub fn highlight_with<F>(text: &str, mut wrap: F) -> String
where
    F: FnMut(usize, &str) -> String,
{
    if !text.contains('(') {
        return text.to_string();
    }

    let mut result = String::with_capacity(text.len() + 64);
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut group_index = 0usize;

    for (i, c) in text.char_indices() {
        match c {
            '(' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        result.push_str(&wrap(group_index, &text[s..=i]));
                        group_index += 1;
                    }
                }
            }
            _ if depth == 0 => result.push(c),
            _ => {}
        }
    }

    if let Some(s) = start {
        result.push_str(&text[s..]);
    }

    result
}

fn push_span(out: &mut String, group: &str, color: &str) {
    out.push_str("<span style=\"background-color: ");
    out.push_str(color);
    out.push_str("; padding: 2px 4px; border-radius: 3px;\">");
    out.push_str(group);
    out.push_str("</span>");
}
