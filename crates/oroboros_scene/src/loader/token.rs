//! # Token Stream
//!
//! Walks a JSON document with `serde_json` and hands every token to a
//! [`Sink`] together with the breadcrumb stack of enclosing keys and array
//! indices. Nothing is materialized: the visitor below returns `()` for every
//! value, so a document of any size is processed in constant memory beyond
//! its nesting depth.

use std::fmt;

use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};

use crate::error::{SceneError, SceneResult};

/// Longest object key captured in a breadcrumb frame.
pub const KEY_CAPACITY: usize = 32;

/// A JSON number as the parser reported it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    /// Non-negative integer.
    U64(u64),
    /// Negative integer.
    I64(i64),
    /// Anything with a fraction or exponent.
    F64(f64),
}

impl Number {
    /// The value as an unsigned integer, `None` if negative or fractional.
    #[must_use]
    pub fn as_u64(self) -> Option<u64> {
        match self {
            Self::U64(value) => Some(value),
            Self::I64(_) => None,
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            Self::F64(value) => (value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64).then_some(value as u64),
        }
    }

    /// The value as a float.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::U64(value) => value as f64,
            Self::I64(value) => value as f64,
            Self::F64(value) => value,
        }
    }
}

/// One token of the document.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event<'a> {
    /// `{`
    ObjectBegin,
    /// `}` after `members` key/value pairs.
    ObjectEnd {
        /// Members seen.
        members: usize,
    },
    /// `[`
    ArrayBegin,
    /// `]` after `len` items.
    ArrayEnd {
        /// Items seen.
        len: usize,
    },
    /// A string value (keys are reported through the breadcrumbs).
    Str(&'a str),
    /// A number.
    Number(Number),
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
}

/// An object key, captured inline up to [`KEY_CAPACITY`] bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Key {
    bytes: [u8; KEY_CAPACITY],
    len: u8,
    truncated: bool,
}

impl Key {
    /// Captures `text`, cutting it at a character boundary if too long.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut len = text.len().min(KEY_CAPACITY);
        while !text.is_char_boundary(len) {
            len -= 1;
        }
        let mut bytes = [0u8; KEY_CAPACITY];
        bytes[..len].copy_from_slice(&text.as_bytes()[..len]);
        Self { bytes, len: len as u8, truncated: len < text.len() }
    }

    /// The captured text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    /// Returns whether the key was longer than [`KEY_CAPACITY`].
    #[inline]
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())?;
        if self.truncated {
            f.write_str("…")?;
        }
        Ok(())
    }
}

/// One breadcrumb frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Position inside an array.
    Index(u32),
    /// Member of an object.
    Key(Key),
}

impl Segment {
    /// The array index, if this frame is one.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> Option<u32> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Key(_) => None,
        }
    }

    /// The full key, `None` for indices and truncated keys.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Key(key) if !key.is_truncated() => Some(key.as_str()),
            _ => None,
        }
    }
}

/// Path from the document root to the current token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Breadcrumbs {
    frames: Vec<Segment>,
}

impl Breadcrumbs {
    /// Empty path (the root value).
    #[must_use]
    pub fn new() -> Self {
        Self { frames: Vec::with_capacity(16) }
    }

    /// Builds a path from keys and indices, mainly for tests.
    #[must_use]
    pub fn from_segments(frames: &[Segment]) -> Self {
        Self { frames: frames.to_vec() }
    }

    /// Depth.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns whether this is the root.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at `depth`.
    #[inline]
    #[must_use]
    pub fn get(&self, depth: usize) -> Option<&Segment> {
        self.frames.get(depth)
    }

    /// Innermost frame.
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&Segment> {
        self.frames.last()
    }

    /// All frames, outermost first.
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.frames
    }

    fn push(&mut self, segment: Segment) {
        self.frames.push(segment);
    }

    fn pop(&mut self) {
        self.frames.pop();
    }
}

impl fmt::Display for Breadcrumbs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            return f.write_str("<root>");
        }
        for (depth, frame) in self.frames.iter().enumerate() {
            match frame {
                Segment::Index(index) => write!(f, "[{index}]")?,
                Segment::Key(key) => {
                    if depth > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(key.as_str())?;
                    if key.is_truncated() {
                        f.write_str("…")?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Receives the token stream.
pub trait Sink {
    /// Handles one token. Container begin/end events carry the container's own
    /// path; values carry the path including their key or index.
    ///
    /// # Errors
    ///
    /// Any error aborts the walk and is returned from [`drive`].
    fn event(&mut self, event: Event<'_>, crumbs: &Breadcrumbs) -> SceneResult<()>;
}

/// Walks `json` and feeds every token to `sink`.
///
/// # Errors
///
/// Returns the first sink error, or `Parse` with the position of malformed
/// input.
pub fn drive<S: Sink>(json: &[u8], sink: &mut S) -> SceneResult<()> {
    let mut context = Context { sink, crumbs: Breadcrumbs::new(), error: None };
    let mut deserializer = serde_json::Deserializer::from_slice(json);

    let walked = Walker(&mut context).deserialize(&mut deserializer);
    let result = walked.and_then(|()| deserializer.end());
    match result {
        Ok(()) => Ok(()),
        Err(error) => Err(context.error.take().unwrap_or_else(|| parse_error(json, &error))),
    }
}

fn parse_error(json: &[u8], error: &serde_json::Error) -> SceneError {
    let (line, column) = (error.line(), error.column());
    let line_start = if line <= 1 {
        0
    } else {
        json.iter()
            .enumerate()
            .filter(|(_, &byte)| byte == b'\n')
            .nth(line - 2)
            .map_or(json.len(), |(at, _)| at + 1)
    };
    let offset = (line_start + column.saturating_sub(1)).min(json.len());

    let text = error.to_string();
    let message = text.split(" at line ").next().unwrap_or(&text).to_string();
    tracing::debug!("document parse error at byte {}: {}", offset, message);
    SceneError::Parse { line, column, offset, message }
}

struct Context<'s, S> {
    sink: &'s mut S,
    crumbs: Breadcrumbs,
    error: Option<SceneError>,
}

impl<S: Sink> Context<'_, S> {
    fn emit<E: de::Error>(&mut self, event: Event<'_>) -> Result<(), E> {
        self.sink.event(event, &self.crumbs).map_err(|error| {
            self.error = Some(error);
            E::custom("aborted by sink")
        })
    }
}

/// Visits one value of any shape.
struct Walker<'c, 's, S>(&'c mut Context<'s, S>);

impl<'de, S: Sink> DeserializeSeed<'de> for Walker<'_, '_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de, S: Sink> Visitor<'de> for Walker<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<(), E> {
        self.0.emit(Event::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<(), E> {
        self.0.emit(Event::Number(Number::I64(value)))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<(), E> {
        self.0.emit(Event::Number(Number::U64(value)))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<(), E> {
        self.0.emit(Event::Number(Number::F64(value)))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<(), E> {
        self.0.emit(Event::Str(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        self.0.emit(Event::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let context = self.0;
        context.emit(Event::ArrayBegin)?;
        let mut len = 0usize;
        loop {
            context.crumbs.push(Segment::Index(len as u32));
            let item = seq.next_element_seed(Walker(&mut *context))?;
            context.crumbs.pop();
            if item.is_none() {
                break;
            }
            len += 1;
        }
        context.emit(Event::ArrayEnd { len })
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let context = self.0;
        context.emit(Event::ObjectBegin)?;
        let mut members = 0usize;
        while let Some(key) = map.next_key_seed(KeySeed)? {
            context.crumbs.push(Segment::Key(key));
            map.next_value_seed(Walker(&mut *context))?;
            context.crumbs.pop();
            members += 1;
        }
        context.emit(Event::ObjectEnd { members })
    }
}

/// Captures an object key without allocating.
struct KeySeed;

impl<'de> DeserializeSeed<'de> for KeySeed {
    type Value = Key;

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<Key, D::Error> {
        deserializer.deserialize_str(self)
    }
}

impl<'de> Visitor<'de> for KeySeed {
    type Value = Key;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object key")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Key, E> {
        Ok(Key::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        lines: Vec<String>,
    }

    impl Sink for Recorder {
        fn event(&mut self, event: Event<'_>, crumbs: &Breadcrumbs) -> SceneResult<()> {
            self.lines.push(format!("{crumbs} {event:?}"));
            Ok(())
        }
    }

    #[test]
    fn test_events_carry_paths() {
        let mut recorder = Recorder::default();
        drive(br#"{"a":[1,{"b":"x"}],"c":null}"#, &mut recorder).unwrap();
        assert_eq!(
            recorder.lines,
            vec![
                "<root> ObjectBegin",
                "a ArrayBegin",
                "a[0] Number(U64(1))",
                "a[1] ObjectBegin",
                "a[1].b Str(\"x\")",
                "a[1] ObjectEnd { members: 1 }",
                "a ArrayEnd { len: 2 }",
                "c Null",
                "<root> ObjectEnd { members: 2 }",
            ]
        );
    }

    #[test]
    fn test_long_keys_are_truncated() {
        let key = Key::new(&"k".repeat(40));
        assert!(key.is_truncated());
        assert_eq!(key.as_str().len(), KEY_CAPACITY);
        assert_eq!(Segment::Key(key).key(), None);
        assert_eq!(Segment::Key(Key::new("name")).key(), Some("name"));
    }

    #[test]
    fn test_parse_error_offset() {
        let mut recorder = Recorder::default();
        let json = b"{\n  \"a\": [1, 2,, 3]\n}";
        match drive(json, &mut recorder) {
            Err(SceneError::Parse { line, offset, .. }) => {
                assert_eq!(line, 2);
                // The second comma of ",," sits at byte 15.
                assert!((14..=16).contains(&offset), "offset {offset}");
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_trailing_garbage_is_an_error() {
        let mut recorder = Recorder::default();
        assert!(matches!(drive(b"{} x", &mut recorder), Err(SceneError::Parse { .. })));
    }

    #[test]
    fn test_sink_error_is_returned() {
        struct Refuse;
        impl Sink for Refuse {
            fn event(&mut self, event: Event<'_>, crumbs: &Breadcrumbs) -> SceneResult<()> {
                match event {
                    Event::Bool(_) => Err(SceneError::InvalidValue { path: crumbs.to_string(), message: "no".into() }),
                    _ => Ok(()),
                }
            }
        }
        let result = drive(br#"{"flags":[true]}"#, &mut Refuse);
        assert!(matches!(result, Err(SceneError::InvalidValue { ref path, .. }) if path == "flags[0]"));
    }

    #[test]
    fn test_number_conversions() {
        assert_eq!(Number::U64(3).as_u64(), Some(3));
        assert_eq!(Number::I64(-1).as_u64(), None);
        assert_eq!(Number::F64(2.0).as_u64(), Some(2));
        assert_eq!(Number::F64(2.5).as_u64(), None);
        assert!((Number::I64(-2).as_f64() + 2.0).abs() < f64::EPSILON);
    }
}
