//! Incremental JSON parser (§4.7): tokenizes and parses a byte stream into a
//! partial value tree one `feed()` call at a time, so a tool-call argument
//! object can be emitted to the client before the upstream JSON completes.

use super::value::JsonValue;
use crate::error::ParserError;
use std::time::{Duration, Instant};

const DEFAULT_BUFFER_CAP: usize = 1024 * 1024;
const DEFAULT_NESTING_CAP: usize = 64;
const DEFAULT_WALL_CLOCK_CAP: Duration = Duration::from_secs(30);

/// Early hint that a function-call object's `name` field has completed,
/// reported before the rest of the object (e.g. `arguments`) has streamed in.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    pub detected: bool,
}

/// Result of one `feed()` call (§4.7).
#[derive(Clone, Debug)]
pub struct FeedResult {
    /// Best-effort materialized view of everything parsed so far. Control
    /// characters found unescaped inside strings are replaced with spaces
    /// here; `delta` below is untouched.
    pub object: serde_json::Value,
    pub is_complete: bool,
    /// Exactly the substring of the input fed since the previous call.
    pub delta: String,
    pub delta_start: usize,
    pub delta_end: usize,
    pub tool_info: Option<ToolInfo>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ObjMode {
    Empty,
    Key,
    Colon,
    Value,
    CommaOrEnd,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ArrMode {
    Empty,
    Value,
    CommaOrEnd,
}

enum Frame {
    Object {
        entries: Vec<(String, JsonValue)>,
        pending_key: Option<String>,
        mode: ObjMode,
    },
    Array {
        items: Vec<JsonValue>,
        mode: ArrMode,
    },
}

enum Pending {
    None,
    Str {
        buf: String,
        escape: bool,
        unicode_remaining: u8,
        unicode_buf: String,
    },
    Num {
        buf: String,
    },
    Lit {
        buf: String,
        target: &'static str,
    },
}

fn is_number_continuation(ch: char) -> bool {
    ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-')
}

/// Streaming, resumable JSON parser with bounded memory, nesting, and
/// wall-clock usage (§4.7 Safety).
pub struct StreamingJsonParser {
    buffer_cap: usize,
    nesting_cap: usize,
    wall_clock_cap: Duration,
    started_at: Option<Instant>,
    offset: usize,
    stack: Vec<Frame>,
    pending: Pending,
    root: Option<JsonValue>,
    tool_info_reported: bool,
    fatal_error: Option<ParserError>,
}

impl StreamingJsonParser {
    pub fn new() -> Self {
        Self {
            buffer_cap: DEFAULT_BUFFER_CAP,
            nesting_cap: DEFAULT_NESTING_CAP,
            wall_clock_cap: DEFAULT_WALL_CLOCK_CAP,
            started_at: None,
            offset: 0,
            stack: Vec::new(),
            pending: Pending::None,
            root: None,
            tool_info_reported: false,
            fatal_error: None,
        }
    }

    pub fn with_caps(buffer_cap: usize, nesting_cap: usize, wall_clock_cap: Duration) -> Self {
        Self {
            buffer_cap,
            nesting_cap,
            wall_clock_cap,
            ..Self::new()
        }
    }

    /// Resets all parsing state so the parser can start on an independent
    /// stream (§4.7: "malformed input leaves the parser in a resettable
    /// state").
    pub fn reset(&mut self) {
        self.started_at = None;
        self.offset = 0;
        self.stack.clear();
        self.pending = Pending::None;
        self.root = None;
        self.tool_info_reported = false;
        self.fatal_error = None;
    }

    pub fn is_complete(&self) -> bool {
        self.root.is_some()
    }

    /// Feeds the next chunk of input. Returns the fatal error (repeatedly,
    /// until `reset()`) once the parser has entered an error state.
    pub fn feed(&mut self, chunk: &str) -> Result<FeedResult, ParserError> {
        if let Some(err) = &self.fatal_error {
            return Err(err.clone());
        }
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }

        let delta_start = self.offset;
        let mut newly_detected_tool = None;

        if !self.is_complete() {
            let mut chars = chunk.chars().peekable();
            'outer: while let Some(&ch) = chars.peek() {
                self.check_timeout()?;

                match std::mem::replace(&mut self.pending, Pending::None) {
                    Pending::Str {
                        mut buf,
                        mut escape,
                        mut unicode_remaining,
                        mut unicode_buf,
                    } => {
                        chars.next();
                        if unicode_remaining > 0 {
                            unicode_buf.push(ch);
                            unicode_remaining -= 1;
                            if unicode_remaining == 0 {
                                let code = u32::from_str_radix(&unicode_buf, 16)
                                    .map_err(|_| self.malformed("invalid \\u escape"))?;
                                buf.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                                self.check_cap(buf.len())?;
                            }
                            self.pending = Pending::Str {
                                buf,
                                escape,
                                unicode_remaining,
                                unicode_buf,
                            };
                            continue;
                        }
                        if escape {
                            match ch {
                                '"' => buf.push('"'),
                                '\\' => buf.push('\\'),
                                '/' => buf.push('/'),
                                'b' => buf.push('\u{8}'),
                                'f' => buf.push('\u{c}'),
                                'n' => buf.push('\n'),
                                'r' => buf.push('\r'),
                                't' => buf.push('\t'),
                                'u' => {
                                    self.pending = Pending::Str {
                                        buf,
                                        escape: false,
                                        unicode_remaining: 4,
                                        unicode_buf: String::new(),
                                    };
                                    continue;
                                }
                                other => return Err(self.malformed(&format!("invalid escape \\{other}"))),
                            }
                            self.check_cap(buf.len())?;
                            escape = false;
                            self.pending = Pending::Str {
                                buf,
                                escape,
                                unicode_remaining,
                                unicode_buf,
                            };
                            continue;
                        }
                        match ch {
                            '"' => {
                                self.complete_value(JsonValue::String(buf), &mut newly_detected_tool)?;
                            }
                            '\\' => {
                                self.pending = Pending::Str {
                                    buf,
                                    escape: true,
                                    unicode_remaining,
                                    unicode_buf,
                                };
                            }
                            c if (c as u32) < 0x20 => {
                                buf.push(' ');
                                self.check_cap(buf.len())?;
                                self.pending = Pending::Str {
                                    buf,
                                    escape,
                                    unicode_remaining,
                                    unicode_buf,
                                };
                            }
                            c => {
                                buf.push(c);
                                self.check_cap(buf.len())?;
                                self.pending = Pending::Str {
                                    buf,
                                    escape,
                                    unicode_remaining,
                                    unicode_buf,
                                };
                            }
                        }
                    }
                    Pending::Num { mut buf } => {
                        if is_number_continuation(ch) {
                            chars.next();
                            buf.push(ch);
                            self.check_cap(buf.len())?;
                            self.pending = Pending::Num { buf };
                        } else {
                            let n: f64 = buf
                                .parse()
                                .map_err(|_| self.malformed(&format!("invalid number literal '{buf}'")))?;
                            self.complete_value(JsonValue::Number(n), &mut newly_detected_tool)?;
                        }
                    }
                    Pending::Lit { mut buf, target } => {
                        let expected = target.as_bytes()[buf.len()] as char;
                        if ch != expected {
                            return Err(self.malformed(&format!("invalid literal, expected '{target}'")));
                        }
                        chars.next();
                        buf.push(ch);
                        if buf.len() == target.len() {
                            let value = match target {
                                "true" => JsonValue::Bool(true),
                                "false" => JsonValue::Bool(false),
                                _ => JsonValue::Null,
                            };
                            self.complete_value(value, &mut newly_detected_tool)?;
                        } else {
                            self.pending = Pending::Lit { buf, target };
                        }
                    }
                    Pending::None => {
                        if ch.is_whitespace() {
                            chars.next();
                            continue 'outer;
                        }
                        match ch {
                            '{' => {
                                self.start_value(true)?;
                                chars.next();
                                self.stack.push(Frame::Object {
                                    entries: Vec::new(),
                                    pending_key: None,
                                    mode: ObjMode::Empty,
                                });
                                self.check_nesting()?;
                            }
                            '[' => {
                                self.start_value(false)?;
                                chars.next();
                                self.stack.push(Frame::Array {
                                    items: Vec::new(),
                                    mode: ArrMode::Empty,
                                });
                                self.check_nesting()?;
                            }
                            '}' => {
                                chars.next();
                                self.close_object(&mut newly_detected_tool)?;
                            }
                            ']' => {
                                chars.next();
                                self.close_array(&mut newly_detected_tool)?;
                            }
                            ':' => {
                                chars.next();
                                self.expect_colon()?;
                            }
                            ',' => {
                                chars.next();
                                self.expect_comma()?;
                            }
                            '"' => {
                                self.start_value(true)?;
                                chars.next();
                                self.pending = Pending::Str {
                                    buf: String::new(),
                                    escape: false,
                                    unicode_remaining: 0,
                                    unicode_buf: String::new(),
                                };
                            }
                            't' => {
                                self.start_value(false)?;
                                chars.next();
                                self.pending = Pending::Lit {
                                    buf: "t".to_string(),
                                    target: "true",
                                };
                            }
                            'f' => {
                                self.start_value(false)?;
                                chars.next();
                                self.pending = Pending::Lit {
                                    buf: "f".to_string(),
                                    target: "false",
                                };
                            }
                            'n' => {
                                self.start_value(false)?;
                                chars.next();
                                self.pending = Pending::Lit {
                                    buf: "n".to_string(),
                                    target: "null",
                                };
                            }
                            '-' => {
                                self.start_value(false)?;
                                chars.next();
                                self.pending = Pending::Num { buf: "-".to_string() };
                            }
                            c if c.is_ascii_digit() => {
                                self.start_value(false)?;
                                chars.next();
                                self.pending = Pending::Num { buf: c.to_string() };
                            }
                            other => {
                                return Err(self.malformed(&format!("unexpected character '{other}'")));
                            }
                        }
                    }
                }
            }
        }

        let consumed_len = chunk.chars().count().min(chunk.len());
        let _ = consumed_len;
        self.offset += chunk.len();
        let delta_end = self.offset;

        Ok(FeedResult {
            object: self.snapshot().to_serde(),
            is_complete: self.is_complete(),
            delta: chunk.to_string(),
            delta_start,
            delta_end,
            tool_info: newly_detected_tool,
        })
    }

    fn check_timeout(&mut self) -> Result<(), ParserError> {
        if let Some(start) = self.started_at {
            if start.elapsed() > self.wall_clock_cap {
                let err = ParserError::Timeout {
                    limit_ms: self.wall_clock_cap.as_millis() as u64,
                };
                self.fatal_error = Some(err.clone());
                return Err(err);
            }
        }
        Ok(())
    }

    fn check_cap(&mut self, len: usize) -> Result<(), ParserError> {
        if len > self.buffer_cap {
            let err = ParserError::BufferOverflow {
                limit: self.buffer_cap,
            };
            self.fatal_error = Some(err.clone());
            return Err(err);
        }
        Ok(())
    }

    fn check_nesting(&mut self) -> Result<(), ParserError> {
        if self.stack.len() > self.nesting_cap {
            let err = ParserError::NestingExceeded {
                limit: self.nesting_cap,
            };
            self.fatal_error = Some(err.clone());
            return Err(err);
        }
        Ok(())
    }

    fn malformed(&mut self, reason: &str) -> ParserError {
        let err = ParserError::Malformed {
            offset: self.offset,
            reason: reason.to_string(),
        };
        self.fatal_error = Some(err.clone());
        err
    }

    /// Validates that a value (or, if `could_be_key`, possibly an object key)
    /// is expected right now, before a new token begins.
    fn start_value(&mut self, is_string: bool) -> Result<(), ParserError> {
        if self.root.is_some() {
            return Err(self.malformed("unexpected trailing value"));
        }
        match self.stack.last() {
            None => Ok(()),
            Some(Frame::Object { mode, .. }) => match mode {
                ObjMode::Empty | ObjMode::Key => {
                    if is_string {
                        Ok(())
                    } else {
                        Err(self.malformed("object key must be a string"))
                    }
                }
                ObjMode::Value => Ok(()),
                ObjMode::Colon | ObjMode::CommaOrEnd => Err(self.malformed("value not expected here")),
            },
            Some(Frame::Array { mode, .. }) => match mode {
                ArrMode::Empty | ArrMode::Value => Ok(()),
                ArrMode::CommaOrEnd => Err(self.malformed("value not expected here")),
            },
        }
    }

    fn expect_colon(&mut self) -> Result<(), ParserError> {
        match self.stack.last_mut() {
            Some(Frame::Object { mode: mode @ ObjMode::Colon, .. }) => {
                *mode = ObjMode::Value;
                Ok(())
            }
            _ => Err(self.malformed("unexpected ':'")),
        }
    }

    fn expect_comma(&mut self) -> Result<(), ParserError> {
        match self.stack.last_mut() {
            Some(Frame::Object { mode: mode @ ObjMode::CommaOrEnd, .. }) => {
                *mode = ObjMode::Key;
                Ok(())
            }
            Some(Frame::Array { mode: mode @ ArrMode::CommaOrEnd, .. }) => {
                *mode = ArrMode::Value;
                Ok(())
            }
            _ => Err(self.malformed("unexpected ','")),
        }
    }

    fn close_object(&mut self, newly_detected_tool: &mut Option<ToolInfo>) -> Result<(), ParserError> {
        match self.stack.last() {
            Some(Frame::Object { mode, .. }) if *mode == ObjMode::Empty || *mode == ObjMode::CommaOrEnd => {}
            _ => return Err(self.malformed("unexpected '}'")),
        }
        let Some(Frame::Object { entries, .. }) = self.stack.pop() else {
            unreachable!()
        };
        self.complete_value(JsonValue::Object(entries), newly_detected_tool)
    }

    fn close_array(&mut self, newly_detected_tool: &mut Option<ToolInfo>) -> Result<(), ParserError> {
        match self.stack.last() {
            Some(Frame::Array { mode, .. }) if *mode == ArrMode::Empty || *mode == ArrMode::CommaOrEnd => {}
            _ => return Err(self.malformed("unexpected ']'")),
        }
        let Some(Frame::Array { items, .. }) = self.stack.pop() else {
            unreachable!()
        };
        self.complete_value(JsonValue::Array(items), newly_detected_tool)
    }

    fn complete_value(
        &mut self,
        value: JsonValue,
        newly_detected_tool: &mut Option<ToolInfo>,
    ) -> Result<(), ParserError> {
        let Some(top) = self.stack.last_mut() else {
            self.root = Some(value);
            return Ok(());
        };
        match top {
            Frame::Object {
                pending_key, mode, ..
            } if *mode == ObjMode::Empty || *mode == ObjMode::Key => {
                let JsonValue::String(s) = value else {
                    return Err(self.malformed("object key must be a string"));
                };
                *pending_key = Some(s);
                *mode = ObjMode::Colon;
                Ok(())
            }
            Frame::Object {
                entries,
                pending_key,
                mode,
            } if *mode == ObjMode::Value => {
                let key = pending_key.take().expect("pending_key set before Value mode");
                if key == "name" && !self.tool_info_reported {
                    if let JsonValue::String(ref s) = value {
                        self.tool_info_reported = true;
                        *newly_detected_tool = Some(ToolInfo {
                            name: s.clone(),
                            detected: true,
                        });
                    }
                }
                entries.push((key, value));
                *mode = ObjMode::CommaOrEnd;
                Ok(())
            }
            Frame::Array { items, mode } if *mode == ArrMode::Empty || *mode == ArrMode::Value => {
                items.push(value);
                *mode = ArrMode::CommaOrEnd;
                Ok(())
            }
            _ => Err(self.malformed("value not expected here")),
        }
    }

    /// Reconstructs the value tree as if every currently-open container
    /// closed right now, for progressive inspection (§4.7 `object`).
    fn snapshot(&self) -> JsonValue {
        if let Some(root) = &self.root {
            return root.clone();
        }
        let Some((innermost, ancestors)) = self.stack.split_last() else {
            return JsonValue::Null;
        };
        let mut current = materialize(innermost);
        for frame in ancestors.iter().rev() {
            current = attach(frame, current);
        }
        current
    }
}

fn materialize(frame: &Frame) -> JsonValue {
    match frame {
        Frame::Object { entries, .. } => JsonValue::Object(entries.clone()),
        Frame::Array { items, .. } => JsonValue::Array(items.clone()),
    }
}

fn attach(parent: &Frame, child: JsonValue) -> JsonValue {
    match parent {
        Frame::Object {
            entries, pending_key, ..
        } => {
            let mut entries = entries.clone();
            if let Some(k) = pending_key {
                entries.push((k.clone(), child));
            }
            JsonValue::Object(entries)
        }
        Frame::Array { items, .. } => {
            let mut items = items.clone();
            items.push(child);
            JsonValue::Array(items)
        }
    }
}

impl Default for StreamingJsonParser {
    fn default() -> Self {
        Self::new()
    }
}
