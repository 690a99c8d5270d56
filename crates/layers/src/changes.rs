use std::collections::VecDeque;

use crate::layer::LayerId;
use crate::overlay::OverlayId;
use crate::vector::FeatureId;

pub const DEFAULT_CHANGE_LOG_CAPACITY: usize = 4096;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LayerProperty {
    Visible,
    Opacity,
    ZIndex,
    Extent,
    Source,
}

/// One observable mutation of the 2D map.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MapChange {
    LayerAdded(LayerId),
    LayerRemoved(LayerId),
    LayerMoved(LayerId),
    LayerChanged {
        layer: LayerId,
        property: LayerProperty,
    },
    FeatureAdded {
        layer: LayerId,
        feature: FeatureId,
    },
    FeatureRemoved {
        layer: LayerId,
        feature: FeatureId,
    },
    FeatureChanged {
        layer: LayerId,
        feature: FeatureId,
    },
    OverlayAdded(OverlayId),
    OverlayRemoved(OverlayId),
    OverlayChanged(OverlayId),
}

impl MapChange {
    /// Add, remove and move change which layers exist or their order.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            MapChange::LayerAdded(_) | MapChange::LayerRemoved(_) | MapChange::LayerMoved(_)
        )
    }
}

/// Read position of one consumer in a [`ChangeLog`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChangeCursor {
    next_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeBatch {
    Changes(Vec<MapChange>),
    /// Entries the cursor had not read yet were evicted; the consumer must
    /// reconcile against the full map state.
    Lagged,
}

/// Bounded append-only log of map changes, read through cursors.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    entries: VecDeque<MapChange>,
    /// Sequence number of `entries[0]`.
    first_seq: u64,
    capacity: usize,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANGE_LOG_CAPACITY)
    }
}

impl ChangeLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            first_seq: 0,
            capacity: capacity.max(1),
        }
    }

    fn end_seq(&self) -> u64 {
        self.first_seq + self.entries.len() as u64
    }

    pub fn push(&mut self, change: MapChange) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.first_seq += 1;
        }
        self.entries.push_back(change);
    }

    /// A cursor that sees only changes appended from now on.
    pub fn cursor(&self) -> ChangeCursor {
        ChangeCursor {
            next_seq: self.end_seq(),
        }
    }

    pub fn read(&self, cursor: &mut ChangeCursor) -> ChangeBatch {
        let end = self.end_seq();
        if cursor.next_seq < self.first_seq {
            cursor.next_seq = end;
            return ChangeBatch::Lagged;
        }
        let start = (cursor.next_seq - self.first_seq) as usize;
        let changes = self.entries.iter().skip(start).copied().collect();
        cursor.next_seq = end;
        ChangeBatch::Changes(changes)
    }

    pub fn has_unread(&self, cursor: &ChangeCursor) -> bool {
        cursor.next_seq < self.end_seq()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
