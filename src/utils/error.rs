/// Collapse a remote error body (ClickHouse exception text, HTML error pages) into a single
/// bounded line suitable for a warning log.
pub fn compact_error_message(message: &str, max_len: usize) -> String {
    let mut raw = message;
    // ClickHouse appends "(version x.y.z (official build))" and stack traces after the code.
    if let Some((head, _)) = raw.split_once("Stack trace:") {
        raw = head;
    }
    if let Some((head, _)) = raw.split_once("<!DOCTYPE") {
        raw = head;
    }

    let mut compact = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.len() <= max_len {
        return compact;
    }
    let mut cut = max_len;
    while cut > 0 && !compact.is_char_boundary(cut) {
        cut -= 1;
    }
    compact.truncate(cut);
    compact.push_str("...(truncated)");
    compact
}

#[cfg(test)]
mod tests {
    use super::compact_error_message;

    #[test]
    fn test_compact_error_message_drops_stack_trace() {
        let raw = "Code: 60. DB::Exception: Table default.x does not exist.\n Stack trace:\n0. frame";
        let compact = compact_error_message(raw, 260);
        assert_eq!(compact, "Code: 60. DB::Exception: Table default.x does not exist.");
    }

    #[test]
    fn test_compact_error_message_truncates_on_char_boundary() {
        let raw = "é".repeat(20);
        let compact = compact_error_message(&raw, 5);
        assert!(compact.ends_with("...(truncated)"));
        assert!(compact.starts_with("éé"));
    }
}
