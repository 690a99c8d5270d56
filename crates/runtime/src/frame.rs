use foundation::time::Time;

/// Metadata for one tick of the host animation clock.
///
/// The host drives frames (one per animation-frame callback); the runtime
/// never reads a wall clock itself, so a recorded sequence of timestamps
/// replays identically.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based frame index.
    pub index: u64,
    /// Seconds since the previous frame (0 for the first one).
    pub dt_s: f64,
    /// Host time at the start of the frame.
    pub time: Time,
}

impl Frame {
    pub fn first(time: Time) -> Self {
        Self {
            index: 0,
            dt_s: 0.0,
            time,
        }
    }

    /// Next frame at `time`. A host clock that runs backwards yields `dt_s == 0`.
    pub fn advance(self, time: Time) -> Self {
        Self {
            index: self.index + 1,
            dt_s: (time.0 - self.time.0).max(0.0),
            time,
        }
    }
}
