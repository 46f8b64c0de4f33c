//! Change notifications pushed by maps and the map collection.
//!
//! The core never talks to a UI directly. Anything interested in changes
//! implements [`EventSink`] (a `Mutex<mpsc::Sender<MapEvent>>` already does) and is
//! attached to a [`MapCollection`](crate::collection::MapCollection).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{mpsc, Arc, Mutex};

use crate::map::Pixel;

/// Identity of a map inside a collection. Never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapId(pub u32);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A typed change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapEvent {
    MapAdded(MapId),
    MapRemoved(MapId),
    SelectedMapChanged(Option<MapId>),
    FitChanged { map: MapId, pixel: Pixel },
    FocusChanged(MapId),
    IntervalChanged(MapId),
    SelectedDataChanged(MapId),
    SpectrumChanged { map: MapId, pixel: Pixel },
    GeometryChanged(MapId),
}

/// Receiver of change notifications.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: MapEvent);
}

impl EventSink for Mutex<mpsc::Sender<MapEvent>> {
    fn publish(&self, event: MapEvent) {
        if let Ok(sender) = self.lock() {
            // A dropped receiver just means nobody is listening any more
            let _ = sender.send(event);
        }
    }
}

impl EventSink for mpsc::SyncSender<MapEvent> {
    fn publish(&self, event: MapEvent) {
        let _ = self.try_send(event);
    }
}

/// Sink that records every event, for inspection.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<MapEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the events recorded so far.
    pub fn drain(&self) -> Vec<MapEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl EventSink for EventLog {
    fn publish(&self, event: MapEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Connection of a map to its collection's sink.
#[derive(Clone, Default)]
pub(crate) struct Notifier {
    id: Option<MapId>,
    sink: Option<Arc<dyn EventSink>>,
}

impl Notifier {
    pub(crate) fn attached(id: MapId, sink: Option<Arc<dyn EventSink>>) -> Self {
        Self { id: Some(id), sink }
    }

    pub(crate) fn id(&self) -> Option<MapId> {
        self.id
    }

    /// Publish the event built for this map's id, if the map is attached.
    pub(crate) fn emit(&self, event: impl FnOnce(MapId) -> MapEvent) {
        if let (Some(id), Some(sink)) = (self.id, &self.sink) {
            sink.publish(event(id));
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("id", &self.id)
            .field("attached", &self.sink.is_some())
            .finish()
    }
}
