use std::time::{Duration, Instant};

/// Format a `Duration` as a human-readable string with automatic unit scaling.
///
/// Produces output like `1.94ms`, `2.34s`, `150.00µs` using Rust's Debug format.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Log a warning if the elapsed time since `start` exceeds `threshold`.
pub fn log_if_slow(start: Instant, threshold: Duration, label: &str) {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(duration = fmt_duration(elapsed), "slow operation: {label}");
    }
}

/// Substitute `{name}` placeholders in a URL template.
///
/// `{base}` is substituted verbatim; every other value is percent-encoded.
/// Unknown placeholders are left untouched.
pub fn render_template(template: &str, base: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.replace("{base}", base.trim_end_matches('/'));
    for (name, value) in vars {
        let needle = format!("{{{name}}}");
        if out.contains(&needle) {
            out = out.replace(&needle, &urlencoding::encode(value));
        }
    }
    out
}

/// Collapse runs of whitespace (including newlines from nested tags) into single spaces.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template_encodes_values() {
        let url = render_template(
            "{base}/courses/{unit}?page={page}",
            "https://api.madgrades.com/",
            &[("unit", "COMP SCI"), ("page", "2")],
        );
        assert_eq!(url, "https://api.madgrades.com/courses/COMP%20SCI?page=2");
    }

    #[test]
    fn test_render_template_leaves_unknown_placeholders() {
        assert_eq!(render_template("a/{missing}", "", &[("unit", "CS")]), "a/{missing}");
    }

    #[test]
    fn test_squash_whitespace() {
        assert_eq!(squash_whitespace("  CS 106A:\n\t Programming  "), "CS 106A: Programming");
    }
}
