use std::collections::BTreeMap;

use scene::{BoundingFailure, BoundingSphere, BoundingSphereQuery, DataSourceDisplay, EntityId};
use tracing::debug;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BoundingVolumeState {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BoundingVolumeFailure {
    MissingEntity,
    NoPosition,
    /// Still pending after the configured number of polls.
    Timeout,
}

impl From<BoundingFailure> for BoundingVolumeFailure {
    fn from(value: BoundingFailure) -> Self {
        match value {
            BoundingFailure::MissingEntity => BoundingVolumeFailure::MissingEntity,
            BoundingFailure::NoPosition => BoundingVolumeFailure::NoPosition,
        }
    }
}

/// Result of one bounding-volume request. `Done` and `Failed` are final.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BoundingVolume {
    Pending,
    Done(BoundingSphere),
    Failed(BoundingVolumeFailure),
}

impl BoundingVolume {
    pub fn state(&self) -> BoundingVolumeState {
        match self {
            BoundingVolume::Pending => BoundingVolumeState::Pending,
            BoundingVolume::Done(_) => BoundingVolumeState::Done,
            BoundingVolume::Failed(_) => BoundingVolumeState::Failed,
        }
    }
}

#[derive(Debug, Clone)]
struct Request {
    result: BoundingVolume,
    pending_polls: u32,
}

/// Bounding-volume requests keyed by entity, advanced by polling the
/// data-source display once per frame.
#[derive(Debug, Clone)]
pub struct BoundingVolumeResolver {
    requests: BTreeMap<EntityId, Request>,
    max_pending_frames: u32,
}

impl BoundingVolumeResolver {
    pub fn new(max_pending_frames: u32) -> Self {
        Self {
            requests: BTreeMap::new(),
            max_pending_frames: max_pending_frames.max(1),
        }
    }

    /// Starts a request for `entity`, or returns the existing one unchanged.
    pub fn compute(&mut self, entity: EntityId, display: &DataSourceDisplay) -> BoundingVolume {
        if let Some(request) = self.requests.get(&entity) {
            return request.result;
        }
        let mut request = Request {
            result: BoundingVolume::Pending,
            pending_polls: 0,
        };
        Self::advance(entity, &mut request, display, self.max_pending_frames);
        let result = request.result;
        self.requests.insert(entity, request);
        result
    }

    /// Advances every pending request. Returns the requests that reached a
    /// final state during this poll.
    pub fn poll(&mut self, display: &DataSourceDisplay) -> Vec<(EntityId, BoundingVolume)> {
        let mut settled = Vec::new();
        for (entity, request) in self.requests.iter_mut() {
            if request.result != BoundingVolume::Pending {
                continue;
            }
            Self::advance(*entity, request, display, self.max_pending_frames);
            if request.result != BoundingVolume::Pending {
                settled.push((*entity, request.result));
            }
        }
        settled
    }

    pub fn state(&self, entity: EntityId) -> Option<BoundingVolume> {
        self.requests.get(&entity).map(|r| r.result)
    }

    /// Forgets the request; a later `compute` starts over.
    pub fn cancel(&mut self, entity: EntityId) -> bool {
        self.requests.remove(&entity).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.requests
            .values()
            .filter(|r| r.result == BoundingVolume::Pending)
            .count()
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }

    fn advance(entity: EntityId, request: &mut Request, display: &DataSourceDisplay, max_pending: u32) {
        request.result = match display.bounding_sphere(entity) {
            BoundingSphereQuery::Ready(sphere) => BoundingVolume::Done(sphere),
            BoundingSphereQuery::Failed(reason) => BoundingVolume::Failed(reason.into()),
            BoundingSphereQuery::Pending => {
                request.pending_polls += 1;
                if request.pending_polls > max_pending {
                    BoundingVolume::Failed(BoundingVolumeFailure::Timeout)
                } else {
                    BoundingVolume::Pending
                }
            }
        };
        debug!(%entity, state = ?request.result.state(), "bounding volume polled");
    }
}
