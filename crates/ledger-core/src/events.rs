//! Collaborators that feed the ledger.
//!
//! The ledger accepts any serializable payload. This module holds the
//! shapes the tracking service records, a pull-style [`EventSource`] with a
//! [`pump`] that drains it into a ledger, and the [`ContentGenerator`] seam
//! for narrative add-ons. An annotation is computed once, before hashing,
//! and travels inside the payload like any other field.

use crate::{Block, Ledger, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::debug;

/// Events recorded by the activity tracking service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    CalorieLogged {
        user_id: String,
        calories: u32,
    },
    ActivityRecorded {
        user_id: String,
        activity: String,
        duration_minutes: u32,
        calories_burned: u32,
    },
    Custom {
        data: Value,
    },
}

pub trait EventSource {
    type Event: Serialize;

    fn next_event(&mut self) -> Option<Self::Event>;
}

impl<T: Serialize> EventSource for VecDeque<T> {
    type Event = T;

    fn next_event(&mut self) -> Option<T> {
        self.pop_front()
    }
}

/// Append every event `source` yields, stopping at the first failure.
pub fn pump<S: EventSource + ?Sized>(
    source: &mut S,
    ledger: &Ledger,
    difficulty: u32,
) -> Result<Vec<Block>> {
    let mut appended = Vec::new();
    while let Some(event) = source.next_event() {
        appended.push(ledger.append(&event, difficulty)?);
    }
    debug!(count = appended.len(), "event source drained");
    Ok(appended)
}

pub trait ContentGenerator {
    /// Optional extra content for an event, given its JSON form.
    fn annotate(&self, event: &Value) -> Option<Value>;
}

/// Generator that never adds anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoContent;

impl ContentGenerator for NoContent {
    fn annotate(&self, _event: &Value) -> Option<Value> {
        None
    }
}

/// An event together with whatever its generator produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Annotated<E> {
    pub event: E,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Value>,
}

impl<E: Serialize> Annotated<E> {
    /// Run `generator` over the event's JSON form. An event with no JSON
    /// form is left unannotated; appending it then fails with
    /// [`crate::LedgerError::PayloadSerialization`] before any mining.
    pub fn new(event: E, generator: &dyn ContentGenerator) -> Self {
        let annotation = match serde_json::to_value(&event) {
            Ok(value) => generator.annotate(&value),
            Err(e) => {
                debug!(error = %e, "event has no JSON form, skipping annotation");
                None
            }
        };
        Self { event, annotation }
    }
}

/// Wraps a source so each event is annotated as it is pulled.
pub struct Annotating<S, G> {
    source: S,
    generator: G,
}

impl<S, G> Annotating<S, G> {
    pub fn new(source: S, generator: G) -> Self {
        Self { source, generator }
    }
}

impl<S: EventSource, G: ContentGenerator> EventSource for Annotating<S, G> {
    type Event = Annotated<S::Event>;

    fn next_event(&mut self) -> Option<Self::Event> {
        self.source
            .next_event()
            .map(|event| Annotated::new(event, &self.generator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LedgerConfig, LedgerError};
    use serde_json::json;
    use std::cell::Cell;
    use std::collections::BTreeMap;

    fn ledger() -> Ledger {
        let ledger = Ledger::new(LedgerConfig::default());
        ledger.initialize().unwrap();
        ledger
    }

    struct Motivation {
        calls: Cell<u32>,
    }

    impl ContentGenerator for Motivation {
        fn annotate(&self, event: &Value) -> Option<Value> {
            self.calls.set(self.calls.get() + 1);
            let calories = event.get("calories")?.as_u64()?;
            Some(json!({ "note": format!("{calories} kcal logged") }))
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = LedgerEvent::CalorieLogged {
            user_id: "u-1".into(),
            calories: 420,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "calorie_logged", "user_id": "u-1", "calories": 420 })
        );
        let custom = LedgerEvent::Custom {
            data: json!({ "event": "test" }),
        };
        assert_eq!(
            serde_json::to_value(&custom).unwrap(),
            json!({ "type": "custom", "data": { "event": "test" } })
        );
    }

    #[test]
    fn pump_drains_source_in_order() {
        let ledger = ledger();
        let mut source: VecDeque<LedgerEvent> = VecDeque::from(vec![
            LedgerEvent::CalorieLogged {
                user_id: "u-1".into(),
                calories: 300,
            },
            LedgerEvent::ActivityRecorded {
                user_id: "u-1".into(),
                activity: "cycling".into(),
                duration_minutes: 45,
                calories_burned: 510,
            },
        ]);
        let blocks = pump(&mut source, &ledger, 1).unwrap();
        assert!(source.is_empty());
        assert_eq!(
            blocks.iter().map(Block::index).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(blocks[1].payload().as_value()["activity"], "cycling");
        assert!(ledger.validate_chain().valid);
    }

    #[test]
    fn pump_stops_at_first_error() {
        let ledger = ledger();
        let mut source = VecDeque::from(vec![json!({ "n": 1 }), json!({ "n": 2 })]);
        assert!(matches!(
            pump(&mut source, &ledger, 0),
            Err(LedgerError::InvalidDifficulty(0))
        ));
        assert_eq!(source.len(), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn annotation_travels_inside_payload() {
        let ledger = ledger();
        let generator = Motivation { calls: Cell::new(0) };
        let source = VecDeque::from(vec![LedgerEvent::CalorieLogged {
            user_id: "u-2".into(),
            calories: 250,
        }]);
        let mut source = Annotating::new(source, generator);
        let blocks = pump(&mut source, &ledger, 1).unwrap();

        let payload = blocks[0].payload().as_value();
        assert_eq!(payload["event"]["calories"], 250);
        assert_eq!(payload["annotation"]["note"], "250 kcal logged");
        assert!(blocks[0].is_valid());
        // annotated once, never again during validation
        assert!(ledger.validate_chain().valid);
        assert_eq!(source.generator.calls.get(), 1);
    }

    #[test]
    fn unserializable_event_is_reported_by_append() {
        let ledger = ledger();
        let generator = Motivation { calls: Cell::new(0) };
        let mut event = BTreeMap::new();
        event.insert(vec![1u8], 1u32);
        let mut source = Annotating::new(VecDeque::from(vec![event]), generator);

        assert!(matches!(
            pump(&mut source, &ledger, 1),
            Err(LedgerError::PayloadSerialization(_))
        ));
        assert_eq!(source.generator.calls.get(), 0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn no_content_leaves_annotation_out() {
        let annotated = Annotated::new(json!({ "event": "test" }), &NoContent);
        assert_eq!(
            serde_json::to_value(&annotated).unwrap(),
            json!({ "event": { "event": "test" } })
        );
    }
}
