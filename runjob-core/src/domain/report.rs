//! Log report domain type

use chrono::{DateTime, Utc};

/// Logs of every replica of a run, captured once at terminal time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReport {
    pub recorded_at: DateTime<Utc>,
    /// Raw output of each replica, concatenated in listing order
    pub body: String,
}

impl LogReport {
    pub fn new(recorded_at: DateTime<Utc>, body: impl Into<String>) -> Self {
        Self {
            recorded_at,
            body: body.into(),
        }
    }

    /// Builds a report from raw replica bytes
    ///
    /// Invalid UTF-8 is replaced rather than rejected; replica output is not
    /// guaranteed to be text.
    pub fn from_bytes(recorded_at: DateTime<Utc>, body: &[u8]) -> Self {
        Self::new(recorded_at, String::from_utf8_lossy(body))
    }

    pub fn header(&self) -> String {
        format!("Recorded: {}\n\n", self.recorded_at.format("%Y-%m-%d %H:%M:%S%.f UTC"))
    }

    /// Header followed by the body
    pub fn render(&self) -> String {
        format!("{}{}", self.header(), self.body)
    }
}

impl std::fmt::Display for LogReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_puts_header_before_body() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let report = LogReport::new(at, "hello\n");

        assert_eq!(report.header(), "Recorded: 2024-05-01 12:30:00 UTC\n\n");
        assert_eq!(report.render(), "Recorded: 2024-05-01 12:30:00 UTC\n\nhello\n");
    }

    #[test]
    fn test_empty_body_renders_header_only() {
        let report = LogReport::new(Utc::now(), "");
        assert_eq!(report.render(), report.header());
    }

    #[test]
    fn test_from_bytes_replaces_invalid_utf8() {
        let report = LogReport::from_bytes(Utc::now(), &[b'o', b'k', 0xff]);
        assert_eq!(report.body, "ok\u{fffd}");
    }
}
