//! Pass 1: measures the document without writing anything.

use crate::error::{SceneError, SceneResult};
use crate::gobj::{Counts, SceneArray};

use super::fixups::placeholder_scene_name;
use super::rules::{self, Field, Trigger};
use super::token::{Breadcrumbs, Event, Sink};

/// Tallies element counts, string-pool bytes and raw payload bytes.
#[derive(Debug, Default)]
pub struct Counter {
    counts: Counts,
    scene_named: bool,
}

impl Counter {
    /// Empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The tally so far.
    #[must_use]
    pub const fn counts(&self) -> &Counts {
        &self.counts
    }

    /// Consumes the counter.
    #[must_use]
    pub const fn into_counts(self) -> Counts {
        self.counts
    }

    fn string(&mut self, field: Field, text: &str) -> SceneResult<()> {
        if field == Field::Name(SceneArray::Scene) {
            self.scene_named = true;
        }
        if field.is_pooled() {
            self.counts.add(SceneArray::Strings, text.len() + 1)?;
        }
        Ok(())
    }
}

impl Sink for Counter {
    fn event(&mut self, event: Event<'_>, crumbs: &Breadcrumbs) -> SceneResult<()> {
        match event {
            Event::ArrayEnd { len } => {
                if let Some(array) = rules::child_element(crumbs) {
                    self.counts.add(array, len)?;
                }
            }
            Event::ObjectBegin => {
                if rules::find(Trigger::Object, crumbs) == Some(Field::Element(SceneArray::Scene)) {
                    self.scene_named = false;
                }
            }
            Event::ObjectEnd { members } => {
                if let Some(array) = rules::child_element(crumbs) {
                    self.counts.add(array, members)?;
                }
                if rules::find(Trigger::Object, crumbs) == Some(Field::Element(SceneArray::Scene)) && !self.scene_named {
                    let index = crumbs.get(1).and_then(|segment| segment.index()).unwrap_or(0);
                    self.counts.add(SceneArray::Strings, placeholder_scene_name(index as usize).len() + 1)?;
                }
            }
            Event::Str(text) => {
                if let Some(field) = rules::find(Trigger::Str, crumbs) {
                    self.string(field, text)?;
                }
            }
            Event::Number(number) => {
                if rules::find(Trigger::Num, crumbs) == Some(Field::BufferByteLength) {
                    let len = number.as_u64().ok_or_else(|| SceneError::InvalidValue {
                        path: crumbs.to_string(),
                        message: "byteLength must be a non-negative integer".to_string(),
                    })?;
                    let len = u32::try_from(len).map_err(|_| SceneError::InvalidValue {
                        path: crumbs.to_string(),
                        message: format!("byteLength {len} does not fit in 32 bits"),
                    })?;
                    self.counts.add(SceneArray::RawData, len as usize)?;
                }
            }
            Event::ArrayBegin | Event::Bool(_) | Event::Null => {}
        }
        Ok(())
    }
}

/// Runs pass 1 over a JSON document.
///
/// # Errors
///
/// Returns `Parse` for malformed JSON, and `InvalidValue` for a buffer length
/// that is not a 32-bit integer or totals that overflow.
pub fn count(json: &[u8]) -> SceneResult<Counts> {
    let mut counter = Counter::new();
    super::token::drive(json, &mut counter)?;
    Ok(counter.into_counts())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_collections_and_nested() {
        let json = br#"{
            "meshes": [
                {"primitives": [
                    {"attributes": {"POSITION": 0, "NORMAL": 1}, "targets": [{"POSITION": 2}]},
                    {"attributes": {"POSITION": 0}}
                ]}
            ],
            "nodes": [{"children": [1, 2]}, {}, {"mesh": 0}],
            "scenes": [{"nodes": [0]}],
            "skins": [{"joints": [1, 2]}]
        }"#;
        let counts = count(json).unwrap();
        assert_eq!(counts.get(SceneArray::Mesh), 1);
        assert_eq!(counts.get(SceneArray::MeshPrimitive), 2);
        assert_eq!(counts.get(SceneArray::MeshAttribute), 3);
        assert_eq!(counts.get(SceneArray::MeshTarget), 1);
        assert_eq!(counts.get(SceneArray::Node), 3);
        assert_eq!(counts.get(SceneArray::NodeRef), 5);
        assert_eq!(counts.get(SceneArray::Scene), 1);
        assert_eq!(counts.get(SceneArray::Skin), 1);
        // Placeholder name for the unnamed scene.
        assert_eq!(counts.get(SceneArray::Strings), "scene_0".len() + 1);
    }

    #[test]
    fn test_counts_strings_and_raw() {
        let json = br#"{
            "asset": {"version": "2.0", "generator": "gen"},
            "buffers": [{"byteLength": 10, "name": "a"}, {"byteLength": 6, "uri": "b.bin"}],
            "accessors": [{"type": "VEC3"}],
            "scenes": [{"name": "main"}]
        }"#;
        let counts = count(json).unwrap();
        assert_eq!(counts.get(SceneArray::RawData), 16);
        assert_eq!(counts.get(SceneArray::Buffer), 2);
        assert_eq!(counts.get(SceneArray::Strings), 4 + 4 + 2 + 6 + 5);
    }

    #[test]
    fn test_rejects_negative_byte_length() {
        let json = br#"{"buffers": [{"byteLength": -1}]}"#;
        assert!(matches!(count(json), Err(SceneError::InvalidValue { .. })));
    }

    #[test]
    fn test_rejects_byte_length_past_32_bits() {
        let json = br#"{"buffers": [{"byteLength": 4294967296}]}"#;
        let Err(SceneError::InvalidValue { path, .. }) = count(json) else {
            panic!("expected an invalid value");
        };
        assert!(path.contains("byteLength"));
        assert!(count(br#"{"buffers": [{"byteLength": 4294967295}]}"#).is_ok());
    }
}
