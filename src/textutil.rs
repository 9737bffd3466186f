/// Collapses whitespace runs to single spaces and cuts to `max_chars` characters,
/// appending `…` when anything was dropped.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if max_chars == 0 {
        return String::new();
    }
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::preview;

    #[test]
    fn short_text_is_flattened_only() {
        assert_eq!(preview("  Allô\n  toi!  ", 40), "Allô toi!");
    }

    #[test]
    fn long_text_is_cut_on_char_boundaries() {
        let out = preview("ééééé ééééé", 6);
        assert_eq!(out, "ééééé…");
        assert_eq!(out.chars().count(), 6);
    }

    #[test]
    fn zero_budget_gives_empty() {
        assert_eq!(preview("anything", 0), "");
    }
}
