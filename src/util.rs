pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

pub fn format_ttl(ttl: Option<i64>, original: Option<i64>) -> String {
    match (ttl, original) {
        (Some(ttl), Some(original)) => format!("{ttl}/{original}"),
        (Some(ttl), None) => ttl.to_string(),
        (None, _) => "-".to_owned(),
    }
}

pub fn clip_text(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let clipped = chars.by_ref().take(max_chars).collect::<String>();
    if chars.next().is_some() {
        format!("{clipped}…")
    } else {
        clipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_respect_char_boundaries() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("H1"), "H1");
        assert_eq!(short_id("ハブハブハブハブハブ"), "ハブハブハブハブ");
    }

    #[test]
    fn ttl_and_clipping() {
        assert_eq!(format_ttl(Some(2), Some(5)), "2/5");
        assert_eq!(format_ttl(None, Some(5)), "-");
        assert_eq!(clip_text("hello", 10), "hello");
        assert_eq!(clip_text("hello world", 5), "hello…");
    }
}
