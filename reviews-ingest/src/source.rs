//! Newline-delimited JSON record source
//!
//! Yields one [`SourceLine`] per non-blank input line, lazily. Blank and
//! whitespace-only lines are skipped but still advance the line counter, so
//! reported line numbers match the file.

use reviews_common::{Error, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// A parsed input line
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    /// 1-based line number in the input
    pub line_number: usize,
    /// Raw JSON value, not yet normalized
    pub value: Value,
}

/// Lazy iterator over the JSON objects of a line-delimited stream
///
/// Invalid JSON yields `Err(Error::MalformedRecord)` for that line and the
/// iterator continues; read failures yield `Err(Error::Io)`.
pub struct JsonLineSource<R> {
    reader: R,
    line_number: usize,
    buf: String,
    finished: bool,
}

impl<R: BufRead> JsonLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buf: String::new(),
            finished: false,
        }
    }
}

impl JsonLineSource<Box<dyn BufRead + Send>> {
    /// Open a file, or stdin when `path` is `-`
    pub fn open(path: &Path) -> Result<Self> {
        let reader: Box<dyn BufRead + Send> = if path.as_os_str() == "-" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let file = File::open(path).map_err(|e| {
                Error::Io(io::Error::new(
                    e.kind(),
                    format!("cannot open input {}: {}", path.display(), e),
                ))
            })?;
            Box::new(BufReader::new(file))
        };
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> Iterator for JsonLineSource<R> {
    type Item = Result<SourceLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {
                    self.line_number += 1;
                    let line = self.buf.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let line_number = self.line_number;
                    return Some(
                        serde_json::from_str(line)
                            .map(|value| SourceLine { line_number, value })
                            .map_err(|e| Error::MalformedRecord {
                                line: line_number,
                                reason: format!("invalid JSON: {}", e),
                            }),
                    );
                }
                Err(e) => {
                    // A failed read leaves the stream position undefined
                    self.finished = true;
                    return Some(Err(Error::Io(e)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn collect(input: &str) -> Vec<Result<SourceLine>> {
        JsonLineSource::new(Cursor::new(input.to_string())).collect()
    }

    #[test]
    fn test_blank_lines_are_skipped_but_counted() {
        let lines = collect("{\"asin\":\"A\"}\n\n   \n\t\n{\"asin\":\"B\"}\n");

        assert_eq!(lines.len(), 2);
        let first = lines[0].as_ref().unwrap();
        let second = lines[1].as_ref().unwrap();
        assert_eq!(first.line_number, 1);
        assert_eq!(first.value, json!({"asin": "A"}));
        assert_eq!(second.line_number, 5);
    }

    #[test]
    fn test_missing_trailing_newline() {
        let lines = collect("{\"a\":1}\n{\"a\":2}");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].as_ref().unwrap().value, json!({"a": 2}));
    }

    #[test]
    fn test_crlf_line_endings() {
        let lines = collect("{\"a\":1}\r\n\r\n{\"a\":2}\r\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].as_ref().unwrap().line_number, 3);
    }

    #[test]
    fn test_invalid_json_reports_line_and_continues() {
        let lines = collect("{\"a\":1}\n{not json\n{\"a\":3}\n");

        assert_eq!(lines.len(), 3);
        match &lines[1] {
            Err(Error::MalformedRecord { line, reason }) => {
                assert_eq!(*line, 2);
                assert!(reason.starts_with("invalid JSON"));
            }
            other => panic!("expected malformed record, got {:?}", other),
        }
        assert_eq!(lines[2].as_ref().unwrap().line_number, 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(collect("").is_empty());
        assert!(collect("\n\n  \n").is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = JsonLineSource::open(Path::new("/nonexistent/reviews.jsonl"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
