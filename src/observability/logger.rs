//! Structured JSON logger
//!
//! One line per event: `event`, then `severity`, then the fields in key
//! order. Lines are written synchronously. The minimum severity comes from
//! `MIRRORDB_LOG` and is read once (default INFO).

use std::fmt;
use std::io::{self, Write};
use std::sync::OnceLock;

/// Environment variable holding the minimum severity to emit
pub const LOG_LEVEL_ENV: &str = "MIRRORDB_LOG";

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-record and per-query detail
    Trace,
    Info,
    /// A result was returned with something missing
    Warn,
    /// A request was rejected
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// Parses a level name, ignoring case and surrounding whitespace
    pub fn parse(name: &str) -> Option<Self> {
        [Severity::Trace, Severity::Info, Severity::Warn, Severity::Error]
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static MIN_SEVERITY: OnceLock<Severity> = OnceLock::new();

/// A single JSON log line
struct LogLine<'a> {
    severity: Severity,
    event: &'a str,
    fields: Vec<&'a (&'a str, &'a str)>,
}

impl<'a> LogLine<'a> {
    fn new(severity: Severity, event: &'a str, fields: &'a [(&'a str, &'a str)]) -> Self {
        let mut fields: Vec<_> = fields.iter().collect();
        fields.sort_by_key(|(key, _)| *key);
        Self {
            severity,
            event,
            fields,
        }
    }

    fn render(&self) -> String {
        let mut pairs = vec![
            json_pair("event", self.event),
            json_pair("severity", self.severity.as_str()),
        ];
        pairs.extend(self.fields.iter().map(|(key, value)| json_pair(key, value)));
        format!("{{{}}}\n", pairs.join(","))
    }
}

fn json_pair(key: &str, value: &str) -> String {
    let quote = |s: &str| serde_json::Value::from(s).to_string();
    format!("{}:{}", quote(key), quote(value))
}

/// Process-wide JSON line logger; errors go to stderr, the rest to stdout
pub struct Logger;

impl Logger {
    /// Returns whether a line at `severity` would be written
    pub fn enabled(severity: Severity) -> bool {
        let min = *MIN_SEVERITY.get_or_init(|| {
            std::env::var(LOG_LEVEL_ENV)
                .ok()
                .and_then(|level| Severity::parse(&level))
                .unwrap_or(Severity::Info)
        });
        severity >= min
    }

    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(severity) {
            return;
        }
        let line = LogLine::new(severity, event, fields);
        if severity >= Severity::Error {
            Self::write_line(&line, &mut io::stderr().lock());
        } else {
            Self::write_line(&line, &mut io::stdout().lock());
        }
    }

    fn write_line<W: Write>(line: &LogLine<'_>, writer: &mut W) {
        // Logging never fails the operation being logged
        let _ = writer.write_all(line.render().as_bytes());
        let _ = writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut buffer = Vec::new();
        Logger::write_line(&LogLine::new(severity, event, fields), &mut buffer);
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("trace"), Some(Severity::Trace));
        assert_eq!(Severity::parse(" Warn "), Some(Severity::Warn));
        assert_eq!(Severity::parse("verbose"), None);
    }

    #[test]
    fn test_line_is_json() {
        let output = capture(Severity::Info, "QUERY_EXECUTED", &[("rows", "3")]);

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "QUERY_EXECUTED");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["rows"], "3");
    }

    #[test]
    fn test_field_order_is_stable() {
        let a = capture(Severity::Info, "E", &[("zebra", "1"), ("apple", "2")]);
        let b = capture(Severity::Info, "E", &[("apple", "2"), ("zebra", "1")]);
        assert_eq!(a, b);
        assert_eq!(
            a,
            "{\"event\":\"E\",\"severity\":\"INFO\",\"apple\":\"2\",\"zebra\":\"1\"}\n"
        );
    }

    #[test]
    fn test_values_are_escaped() {
        let output = capture(Severity::Warn, "E", &[("reason", "say \"hi\"\nbye")]);

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["reason"], "say \"hi\"\nbye");
        assert_eq!(output.matches('\n').count(), 1);
    }
}
