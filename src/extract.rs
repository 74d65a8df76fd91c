//! Pulls the problem object out of whatever bytes the browser helper sent.
//!
//! The helper's payload is a JSON object surrounded by bytes we do not care
//! about (an HTTP request line and headers, stray newlines, ...). The first
//! `{` starts the object and its matching closer ends it. Open braces and
//! brackets are kept on a stack so a closer of the wrong kind is reported
//! where it appears; string literals are skipped. The exact slice is then
//! handed to `serde_json`.

use std::{error::Error as StdError, fmt, ops::Range};

use crate::problem::Problem;

#[derive(Debug)]
pub enum ExtractError {
    NoObjectStart,
    Unterminated,
    Mismatched { offset: usize, found: u8 },
    Decode(serde_json::Error),
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoObjectStart => write!(f, "no object start"),
            Self::Unterminated => write!(f, "unterminated object"),
            Self::Mismatched { offset, found } => {
                write!(f, "mismatched `{}` at byte {offset}", *found as char)
            }
            Self::Decode(err) => write!(f, "invalid problem json: {err}"),
        }
    }
}

impl StdError for ExtractError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Decode(err) => Some(err),
            Self::NoObjectStart | Self::Unterminated | Self::Mismatched { .. } => None,
        }
    }
}

/// Incremental scanner for the first top-level object in a byte stream.
///
/// `scan` may be called again with a longer buffer holding the same prefix;
/// it picks up where the previous call stopped, so reading a socket chunk by
/// chunk stays linear in the payload size. Once the object is closed, or a
/// mismatched closer is found, every later call returns the same answer.
#[derive(Debug, Default)]
pub struct ObjectScanner {
    pos: usize,
    start: Option<usize>,
    end: Option<usize>,
    mismatch: Option<(usize, u8)>,
    closers: Vec<u8>,
    in_string: bool,
    escaped: bool,
}

impl ObjectScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an opening `{` has been seen yet.
    pub fn started(&self) -> bool {
        self.start.is_some()
    }

    /// Returns the byte range of the object once its closer has been seen,
    /// `Ok(None)` while more input is needed.
    pub fn scan(&mut self, buf: &[u8]) -> Result<Option<Range<usize>>, ExtractError> {
        if let Some((offset, found)) = self.mismatch {
            return Err(ExtractError::Mismatched { offset, found });
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            return Ok(Some(start..end));
        }

        let start = match self.start {
            Some(start) => start,
            None => {
                let Some(offset) = buf[self.pos..].iter().position(|&byte| byte == b'{') else {
                    self.pos = buf.len();
                    return Ok(None);
                };
                let start = self.pos + offset;
                self.start = Some(start);
                self.closers.push(b'}');
                self.pos = start + 1;
                start
            }
        };

        while self.pos < buf.len() {
            let byte = buf[self.pos];
            self.pos += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.closers.push(b'}'),
                b'[' => self.closers.push(b']'),
                b'}' | b']' => {
                    if self.closers.last() != Some(&byte) {
                        let offset = self.pos - 1;
                        self.mismatch = Some((offset, byte));
                        return Err(ExtractError::Mismatched {
                            offset,
                            found: byte,
                        });
                    }
                    self.closers.pop();
                    if self.closers.is_empty() {
                        self.end = Some(self.pos);
                        return Ok(Some(start..self.pos));
                    }
                }
                _ => {}
            }
        }

        Ok(None)
    }
}

/// Locates the first complete top-level object in `bytes`.
pub fn locate_object(bytes: &[u8]) -> Result<Range<usize>, ExtractError> {
    let mut scanner = ObjectScanner::new();
    match scanner.scan(bytes)? {
        Some(range) => Ok(range),
        None if scanner.started() => Err(ExtractError::Unterminated),
        None => Err(ExtractError::NoObjectStart),
    }
}

/// Finds the problem object inside `bytes` and decodes it.
pub fn extract(bytes: &[u8]) -> Result<Problem, ExtractError> {
    let range = locate_object(bytes)?;
    serde_json::from_slice(&bytes[range]).map_err(ExtractError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &str = "POST / HTTP/1.1\r\n\
        Host: localhost:9999\r\n\
        Content-Type: application/json\r\n\r\n";

    #[test]
    fn junk_around_object() {
        let payload = b"\x00\x17garbage{\"name\":\"1234A-B\",\"tests\":[{\"input\":\"1\\n\",\"output\":\"2\\n\"}]}more junk";
        let problem = extract(payload).unwrap();

        assert_eq!(problem.name, "1234A-B");
        assert_eq!(problem.tests.len(), 1);
        assert_eq!(problem.tests[0].input, "1\n");
        assert_eq!(problem.tests[0].output, "2\n");
    }

    #[test]
    fn http_envelope() {
        let body = r#"{"name":"A. Watermelon","group":"Codeforces Beta Round #4","url":"https://codeforces.com/problemset/problem/4/A","interactive":false,"memoryLimit":64,"timeLimit":1000,"tests":[{"input":"8\n","output":"YES\n"}],"testType":"single"}"#;
        let payload = format!("{POST}{body}");
        let problem = extract(payload.as_bytes()).unwrap();

        assert_eq!(problem.memory_limit, 64);
        assert_eq!(problem.time_limit, 1000);
        assert_eq!(problem.tests[0].output, "YES\n");
    }

    #[test]
    fn tests_need_not_be_last() {
        let payload = br#"{"tests":[{"input":"a","output":"b"}],"name":"C. Last","timeLimit":2000}"#;
        let problem = extract(payload).unwrap();

        assert_eq!(problem.name, "C. Last");
        assert_eq!(problem.time_limit, 2000);
    }

    #[test]
    fn brackets_inside_strings() {
        let payload = br#"xx{"name":"D. ]}{[","tests":[{"input":"[1, 2]\n{\"q\"}","output":"}"}]}"#;
        let problem = extract(payload).unwrap();

        assert_eq!(problem.name, "D. ]}{[");
        assert_eq!(problem.tests[0].input, "[1, 2]\n{\"q\"}");
        assert_eq!(problem.tests[0].output, "}");
    }

    #[test]
    fn escaped_backslash_before_quote() {
        let payload = br#"{"name":"E","tests":[{"input":"\\","output":"\\\\"}]}"#;
        let problem = extract(payload).unwrap();

        assert_eq!(problem.tests[0].input, "\\");
        assert_eq!(problem.tests[0].output, "\\\\");
    }

    #[test]
    fn no_object_start() {
        assert!(matches!(
            extract(b"tests ] only"),
            Err(ExtractError::NoObjectStart)
        ));
        assert!(matches!(extract(b""), Err(ExtractError::NoObjectStart)));
    }

    #[test]
    fn unterminated() {
        assert!(matches!(
            extract(br#"{"name":"F","tests":[{"input":"1"#),
            Err(ExtractError::Unterminated)
        ));
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        assert!(matches!(
            extract(b"junk{\"name\": nope, \"tests\": [oops]}tail"),
            Err(ExtractError::Decode(_))
        ));
        assert!(matches!(
            extract(br#"{"name":"G","tests":[{"input":1,"output":"2"}]}"#),
            Err(ExtractError::Decode(_))
        ));
    }

    #[test]
    fn mismatched_closer() {
        assert!(matches!(
            locate_object(br#"{"tests":[1}"#),
            Err(ExtractError::Mismatched {
                offset: 11,
                found: b'}'
            })
        ));

        let err = extract(b"junk{\"name\": nope ]tail").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Mismatched {
                offset: 18,
                found: b']'
            }
        ));
        assert_eq!(err.to_string(), "mismatched `]` at byte 18");
    }

    #[test]
    fn mismatch_sticks_across_chunks() {
        let payload = br#"{"tests":[{"input":"1"}}] and more"#;
        let mut scanner = ObjectScanner::new();

        assert_eq!(scanner.scan(&payload[..20]).unwrap(), None);
        assert!(matches!(
            scanner.scan(payload),
            Err(ExtractError::Mismatched { offset: 23, found: b'}' })
        ));
        assert!(matches!(
            scanner.scan(payload),
            Err(ExtractError::Mismatched { offset: 23, .. })
        ));
    }

    #[test]
    fn scanner_resumes_across_chunks() {
        let payload = br#"noise {"name":"H","tests":[{"input":"}","output":"]"}]} tail"#;
        let mut scanner = ObjectScanner::new();

        assert_eq!(scanner.scan(&payload[..3]).unwrap(), None);
        assert!(!scanner.started());
        assert_eq!(scanner.scan(&payload[..20]).unwrap(), None);
        assert!(scanner.started());
        assert_eq!(scanner.scan(&payload[..45]).unwrap(), None);

        let range = scanner.scan(payload).unwrap().unwrap();
        assert_eq!(&payload[range.clone()], &payload[6..payload.len() - 5]);
        assert_eq!(scanner.scan(payload).unwrap(), Some(range));
    }
}
