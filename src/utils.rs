//! # Utility Functions Module
//!
//! Small formatting helpers shared by the progress reporting and the host binary.

/// Human readable byte size, e.g. `1.50 KB`
pub fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit_index = 0;

    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit_index])
    }
}

/// Percentage of `original_size` saved by `new_size`. Growth counts as zero.
pub fn reduction_percent(original_size: u64, new_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    original_size.saturating_sub(new_size) as f64 / original_size as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_reduction_percent() {
        assert_eq!(reduction_percent(1000, 500), 50.0);
        assert_eq!(reduction_percent(1000, 1200), 0.0);
        assert_eq!(reduction_percent(0, 0), 0.0);
    }
}
