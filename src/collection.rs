//! Registry of loaded maps.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::{MapError, Result};
use crate::events::{EventSink, MapEvent, MapId, Notifier};
use crate::map::SpectralMap;

/// Owns every loaded map under an id that is never reused, and tracks the
/// selected map.
#[derive(Default)]
pub struct MapCollection {
    maps: BTreeMap<MapId, SpectralMap>,
    next_id: u32,
    selected: Option<MapId>,
    sink: Option<Arc<dyn EventSink>>,
}

impl MapCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection publishing its own and its maps' events to `sink`.
    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::default()
        }
    }

    fn publish(&self, event: MapEvent) {
        if let Some(sink) = &self.sink {
            sink.publish(event);
        }
    }

    /// Take ownership of a map and return its new id.
    pub fn add(&mut self, mut map: SpectralMap) -> MapId {
        let id = MapId(self.next_id);
        self.next_id += 1;

        map.attach(Notifier::attached(id, self.sink.clone()));
        log::debug!("Added map '{}' as {}", map.name(), id);
        self.maps.insert(id, map);
        self.publish(MapEvent::MapAdded(id));
        id
    }

    /// Remove a map and hand it back, detached. Clears the selection if the
    /// map was selected.
    pub fn remove(&mut self, id: MapId) -> Result<SpectralMap> {
        let mut map = self.maps.remove(&id).ok_or(MapError::UnknownMap(id.0))?;
        map.attach(Notifier::default());

        if self.selected == Some(id) {
            self.selected = None;
            self.publish(MapEvent::SelectedMapChanged(None));
        }
        self.publish(MapEvent::MapRemoved(id));
        Ok(map)
    }

    pub fn select(&mut self, id: MapId) -> Result<()> {
        if !self.maps.contains_key(&id) {
            return Err(MapError::UnknownMap(id.0));
        }
        if self.selected != Some(id) {
            self.selected = Some(id);
            self.publish(MapEvent::SelectedMapChanged(Some(id)));
        }
        Ok(())
    }

    pub fn deselect(&mut self) {
        if self.selected.take().is_some() {
            self.publish(MapEvent::SelectedMapChanged(None));
        }
    }

    pub fn get(&self, id: MapId) -> Result<&SpectralMap> {
        self.maps.get(&id).ok_or(MapError::UnknownMap(id.0))
    }

    pub fn get_mut(&mut self, id: MapId) -> Result<&mut SpectralMap> {
        self.maps.get_mut(&id).ok_or(MapError::UnknownMap(id.0))
    }

    /// All maps in id order.
    pub fn all(&self) -> impl Iterator<Item = (MapId, &SpectralMap)> {
        self.maps.iter().map(|(&id, map)| (id, map))
    }

    pub fn ids(&self) -> Vec<MapId> {
        self.maps.keys().copied().collect()
    }

    pub fn count(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn selected_id(&self) -> Option<MapId> {
        self.selected
    }

    pub fn selected(&self) -> Option<&SpectralMap> {
        self.selected.and_then(|id| self.maps.get(&id))
    }

    pub fn selected_mut(&mut self) -> Option<&mut SpectralMap> {
        self.selected.and_then(|id| self.maps.get_mut(&id))
    }

    /// Write the selected map as a JSON snapshot.
    pub fn save_selected<W: Write>(&self, writer: W) -> Result<()> {
        let map = self.selected().ok_or_else(|| {
            MapError::InvalidParameter("No map is selected".to_string())
        })?;
        map.save_json(writer)
    }

    /// Read a JSON snapshot and add it as a new map.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<MapId> {
        let map = SpectralMap::load_json(reader)?;
        Ok(self.add(map))
    }
}

impl fmt::Debug for MapCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapCollection")
            .field("maps", &self.ids())
            .field("next_id", &self.next_id)
            .field("selected", &self.selected)
            .finish()
    }
}
