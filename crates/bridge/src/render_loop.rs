use foundation::time::Time;
use tracing::debug;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FrameRate {
    Unbounded,
    Fps(f64),
}

impl FrameRate {
    pub fn interval_ms(self) -> Option<f64> {
        match self {
            FrameRate::Unbounded => None,
            FrameRate::Fps(fps) => Some(1000.0 / fps),
        }
    }
}

/// Lets a host frame through only when the target interval has elapsed.
///
/// The remainder of the elapsed time is carried over so the average rate
/// matches the target even when host frames do not line up with it.
#[derive(Debug, Clone)]
pub struct FrameRateLimiter {
    rate: FrameRate,
    last_ms: Option<f64>,
}

impl FrameRateLimiter {
    pub fn new(rate: FrameRate) -> Self {
        Self {
            rate,
            last_ms: None,
        }
    }

    pub fn rate(&self) -> FrameRate {
        self.rate
    }

    pub fn set_rate(&mut self, rate: FrameRate) {
        self.rate = rate;
    }

    pub fn should_run(&mut self, now_ms: f64) -> bool {
        let Some(interval) = self.rate.interval_ms() else {
            self.last_ms = Some(now_ms);
            return true;
        };
        let Some(last) = self.last_ms else {
            self.last_ms = Some(now_ms);
            return true;
        };
        let delta = now_ms - last;
        if delta < interval {
            return false;
        }
        self.last_ms = Some(now_ms - delta % interval);
        true
    }
}

/// Skips redraws of a static scene.
///
/// Anything that can change the picture marks the loop dirty; a frame is
/// drawn only when dirty or while the scene still has loading work.
#[derive(Debug, Clone, Default)]
pub struct AutoRenderLoop {
    dirty: bool,
    running: bool,
    last_render: Option<Time>,
    rendered: u64,
    skipped: u64,
}

impl AutoRenderLoop {
    pub fn new() -> Self {
        Self {
            dirty: true,
            running: true,
            ..Self::default()
        }
    }

    pub fn notify_repaint_required(&mut self) {
        self.dirty = true;
    }

    /// Resets the bookkeeping and resumes; the next frame always draws.
    pub fn restart_render_loop(&mut self) {
        self.running = true;
        self.dirty = true;
    }

    pub fn destroy(&mut self) {
        self.running = false;
        self.dirty = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Decides for this frame. A positive answer must be followed by
    /// [`AutoRenderLoop::rendered`] once the frame is drawn.
    pub fn should_render(&mut self, pending_work: bool) -> bool {
        if !self.running {
            return false;
        }
        let render = self.dirty || pending_work;
        if !render {
            self.skipped += 1;
            debug!(skipped = self.skipped, "auto render loop idle");
        }
        render
    }

    pub fn rendered(&mut self, time: Time) {
        self.dirty = false;
        self.rendered += 1;
        self.last_render = Some(time);
    }

    pub fn last_render(&self) -> Option<Time> {
        self.last_render
    }

    pub fn rendered_frames(&self) -> u64 {
        self.rendered
    }

    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }
}
