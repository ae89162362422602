use std::collections::HashSet;

/// Strips all HTML tags from single-line input (titles, names) and returns
/// plain text. Templates escape on output, so entities are decoded back here.
pub fn strip_all_html(input: &str) -> String {
    let cleaned = ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string();
    html_escape::decode_html_entities(&cleaned).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_removed_and_text_kept() {
        assert_eq!(strip_all_html("<b>Bold</b> move"), "Bold move");
        assert_eq!(strip_all_html("<script>alert(1)</script>Hi"), "Hi");
    }

    #[test]
    fn entities_are_not_left_escaped() {
        assert_eq!(strip_all_html("Tom & Jerry"), "Tom & Jerry");
        assert_eq!(strip_all_html("  spaced  "), "spaced");
    }
}
