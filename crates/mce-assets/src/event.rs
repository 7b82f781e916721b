//! Asset events for polling consumers.

/// Events emitted by the asset server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetEvent {
    /// An asset finished loading.
    Ready {
        /// The asset name.
        name: String,
        /// Size of the loaded bytes.
        size: usize,
    },

    /// An asset failed to load.
    Failed {
        /// The asset name.
        name: String,
        /// Error message.
        error: String,
    },

    /// An asset was removed from the cache.
    Removed {
        /// The asset name.
        name: String,
    },

    /// A load unit pin completed on every loader.
    LoadUnitPinned {
        /// The load unit name.
        name: String,
    },

    /// A load unit pin failed.
    LoadUnitFailed {
        /// The load unit name.
        name: String,
        /// Error message.
        error: String,
    },

    /// A load unit pin was released.
    LoadUnitUnpinned {
        /// The load unit name.
        name: String,
    },
}

impl AssetEvent {
    /// The asset or load unit name this event relates to.
    pub fn name(&self) -> &str {
        match self {
            AssetEvent::Ready { name, .. }
            | AssetEvent::Failed { name, .. }
            | AssetEvent::Removed { name }
            | AssetEvent::LoadUnitPinned { name }
            | AssetEvent::LoadUnitFailed { name, .. }
            | AssetEvent::LoadUnitUnpinned { name } => name,
        }
    }

    /// Check if this is an asset ready event.
    pub fn is_ready(&self) -> bool {
        matches!(self, AssetEvent::Ready { .. })
    }

    /// Check if this is an asset or load unit failure event.
    pub fn is_failed(&self) -> bool {
        matches!(self, AssetEvent::Failed { .. } | AssetEvent::LoadUnitFailed { .. })
    }

    /// Check if this event is about a load unit.
    pub fn is_load_unit(&self) -> bool {
        matches!(
            self,
            AssetEvent::LoadUnitPinned { .. }
                | AssetEvent::LoadUnitFailed { .. }
                | AssetEvent::LoadUnitUnpinned { .. }
        )
    }
}

/// A buffer of asset events that can be drained each frame.
#[derive(Debug, Default)]
pub struct AssetEventBuffer {
    events: Vec<AssetEvent>,
}

impl AssetEventBuffer {
    /// Create a new empty event buffer.
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Push an event to the buffer.
    pub fn push(&mut self, event: AssetEvent) {
        self.events.push(event);
    }

    /// Drain all events from the buffer.
    pub fn drain(&mut self) -> impl Iterator<Item = AssetEvent> + '_ {
        self.events.drain(..)
    }

    /// Get an iterator over events without draining.
    pub fn iter(&self) -> impl Iterator<Item = &AssetEvent> {
        self.events.iter()
    }

    /// Check if there are any events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get the number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Clear all events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_buffer() {
        let mut buffer = AssetEventBuffer::new();
        assert!(buffer.is_empty());

        buffer.push(AssetEvent::Ready {
            name: "a".to_string(),
            size: 3,
        });
        buffer.push(AssetEvent::LoadUnitFailed {
            name: "terrain".to_string(),
            error: "missing".to_string(),
        });
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.iter().filter(|e| e.is_failed()).count(), 1);

        let drained: Vec<_> = buffer.drain().collect();
        assert_eq!(drained[1].name(), "terrain");
        assert!(drained[1].is_load_unit());
        assert!(buffer.is_empty());
    }
}
