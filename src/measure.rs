use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Display columns a quoted source fragment may take in a diagnostic.
pub const FRAGMENT_WIDTH: usize = 60;

pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Collapse whitespace runs and cut `text` to at most `max_width` display
/// columns, marking a cut with `...`.
pub fn fragment(text: &str, max_width: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if display_width(&collapsed) <= max_width {
        return collapsed;
    }

    let budget = max_width.saturating_sub(3);
    let mut out = String::new();
    let mut width = 0;
    for c in collapsed.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        out.push(c);
    }
    out.push_str("...");
    out
}
