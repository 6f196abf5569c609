//! Time formatting helpers.

/// Format a millisecond duration to a human-readable string.
pub fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1_000;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_magnitude() {
        assert_eq!(format_duration_ms(45_000), "45s");
        assert_eq!(format_duration_ms(600_000), "10m 0s");
        assert_eq!(format_duration_ms(6 * 3_600_000), "6h 0m");
        assert_eq!(format_duration_ms(36 * 3_600_000), "1d 12h");
    }
}
