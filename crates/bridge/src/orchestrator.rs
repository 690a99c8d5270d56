//! The bridge: owns the 2D map and the globe scene, and drives camera
//! hand-off, synchronization and rendering from the host frame clock.

use foundation::math::{Geodetic, geodetic_to_ecef};
use foundation::time::Time;
use gpu::{RenderSink, Renderer};
use layers::{FeatureId, Map2d, View2d};
use runtime::{EventBus, Frame, FrameBudget, Metrics};
use scene::{Activation, DataSourceCollection, DataSourceDisplay, EntityId, Scene3d};
use tracing::{debug, info};

use crate::bounding::BoundingVolumeResolver;
use crate::camera::{Authority, CameraBridge};
use crate::config::BridgeOptions;
use crate::error::BridgeError;
use crate::render_loop::{AutoRenderLoop, FrameRate, FrameRateLimiter};
use crate::synchronizer::{LayerSynchronizer, SyncContext, SyncReport};
use crate::tracking::{Tracker, TrackingUpdate};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WarmUpEnd {
    /// Tiles and synchronization settled before the timeout.
    Completed,
    /// The timeout ran out; in-flight work was torn down.
    TimedOut,
}

#[derive(Debug, Copy, Clone)]
struct WarmUp {
    timeout_ms: f64,
    /// Host time of the last frame before the call, or of the first
    /// warm-up frame when none ran yet.
    started_ms: Option<f64>,
    rendered: bool,
}

/// What one [`Bridge::tick`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub frame: Frame,
    /// Skipped by the frame-rate limiter.
    pub throttled: bool,
    /// The globe camera changed during this frame.
    pub camera_moved: bool,
    pub sync: SyncReport,
    pub tracking: TrackingUpdate,
    pub rendered: bool,
    pub warm_up: Option<WarmUpEnd>,
}

impl TickReport {
    fn idle(frame: Frame) -> Self {
        Self {
            frame,
            throttled: false,
            camera_moved: false,
            sync: SyncReport::default(),
            tracking: TrackingUpdate::Idle,
            rendered: false,
            warm_up: None,
        }
    }
}

/// Keeps a 2D map and a globe scene consistent, so either can be shown.
///
/// While 3D is disabled the 2D view owns the camera and every view change
/// is read into the globe camera. While enabled the globe camera owns it and
/// camera moves are pushed down into the 2D view. Switching modes never
/// releases 3D resources; only [`Bridge::destroy`] does.
pub struct Bridge {
    options: BridgeOptions,
    map: Map2d,
    scene: Scene3d,
    camera: CameraBridge,
    synchronizers: Vec<LayerSynchronizer>,
    authority: Authority,
    enabled: bool,
    destroyed: bool,
    block_rendering: bool,
    auto_render_loop: Option<AutoRenderLoop>,
    limiter: FrameRateLimiter,
    resolver: BoundingVolumeResolver,
    tracker: Tracker,
    warm_up: Option<WarmUp>,
    frame: Option<Frame>,
    last_camera_revision: Option<u64>,
    /// 2D interaction state to restore when leaving over-map mode.
    paused_interactions: Option<bool>,
    pointer_propagation_stopped: bool,
    bus: EventBus,
    metrics: Metrics,
    sink: Option<Box<dyn RenderSink>>,
}

impl Bridge {
    pub fn new(map: Map2d, scene: Scene3d, options: BridgeOptions) -> Result<Self, BridgeError> {
        Self::with_synchronizers(map, scene, options, LayerSynchronizer::defaults)
    }

    /// Like [`Bridge::new`] with `create` building the synchronizers instead
    /// of the default raster, vector and overlay ones. They run in the
    /// returned order, which is also their relative draw order.
    pub fn with_synchronizers(
        map: Map2d,
        mut scene: Scene3d,
        options: BridgeOptions,
        create: impl FnOnce(&Map2d) -> Vec<LayerSynchronizer>,
    ) -> Result<Self, BridgeError> {
        options.validate()?;
        scene.set_resolution_scale(options.render.resolution_scale)?;

        let mut camera = CameraBridge::new(options.camera.clone());
        camera.set_refresh_on_move_end_only(options.render.refresh_2d_after_camera_move_end_only);
        camera.read_from_view(map.view(), &mut scene)?;

        let synchronizers = create(&map);
        info!(
            synchronizers = synchronizers.len(),
            overlay = options.is_overlay(),
            "bridge created"
        );
        Ok(Self {
            block_rendering: options.render.block_rendering,
            auto_render_loop: options.render.auto_render_loop.then(AutoRenderLoop::new),
            limiter: FrameRateLimiter::new(options.frame_rate()),
            resolver: BoundingVolumeResolver::new(options.tracking.max_pending_frames),
            options,
            map,
            scene,
            camera,
            synchronizers,
            authority: Authority::TwoD,
            enabled: false,
            destroyed: false,
            tracker: Tracker::default(),
            warm_up: None,
            frame: None,
            last_camera_revision: None,
            paused_interactions: None,
            pointer_propagation_stopped: false,
            bus: EventBus::new(),
            metrics: Metrics::new(),
            sink: None,
        })
    }

    // ---- mode ----

    pub fn get_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enable: bool) -> Result<(), BridgeError> {
        self.ensure_alive()?;
        if enable == self.enabled {
            return Ok(());
        }
        if enable {
            if self.warm_up.take().is_some() {
                debug!("warm-up superseded by enable");
            }
            self.camera.read_from_view(self.map.view(), &mut self.scene)?;
            self.camera.record_snapshot(&self.scene);
            self.authority = Authority::ThreeD;
            self.scene.set_activation(Activation::Visible);
            if self.options.is_overlay() {
                self.paused_interactions = Some(self.map.interactions_active());
                self.map.set_interactions_active(false);
                self.pointer_propagation_stopped = self.options.stop_pointer_propagation;
            }
            if let Some(lp) = self.auto_render_loop.as_mut() {
                lp.restart_render_loop();
            }
            self.enabled = true;
            info!("3D enabled");
        } else {
            // Resume 2D where the globe camera left it.
            self.camera.update_view(self.map.view_mut(), &self.scene)?;
            self.authority = Authority::TwoD;
            self.scene.set_activation(Activation::Inactive);
            if let Some(active) = self.paused_interactions.take() {
                self.map.set_interactions_active(active);
            }
            self.pointer_propagation_stopped = false;
            self.enabled = false;
            info!("3D disabled");
        }
        Ok(())
    }

    /// Runs the globe off-screen at no less than `height` meters until tiles
    /// and synchronization settle or `timeout_ms` elapses, whichever comes
    /// first. The timeout counts from the last host frame, so the scene is
    /// inactive again at most one frame after it runs out.
    pub fn warm_up(&mut self, height: f64, timeout_ms: f64) -> Result<(), BridgeError> {
        self.ensure_alive()?;
        if self.enabled {
            return Err(BridgeError::WarmUpWhileEnabled);
        }
        if self.warm_up.is_some() {
            return Err(BridgeError::WarmUpInProgress);
        }
        if !(height.is_finite() && timeout_ms.is_finite() && timeout_ms >= 0.0) {
            return Err(BridgeError::InvalidWarmUp { height, timeout_ms });
        }

        self.camera.read_from_view(self.map.view(), &mut self.scene)?;
        let camera = self.scene.camera_mut();
        let position = camera.position_geodetic();
        if position.alt_m < height {
            camera.set_position(geodetic_to_ecef(Geodetic {
                alt_m: height,
                ..position
            }))?;
        }
        self.scene.set_activation(Activation::OffScreen);
        self.warm_up = Some(WarmUp {
            timeout_ms,
            started_ms: self.frame.map(|f| f.time.as_millis()),
            rendered: false,
        });
        info!(height, timeout_ms, "warm-up started");
        Ok(())
    }

    pub fn is_warming_up(&self) -> bool {
        self.warm_up.is_some()
    }

    /// Releases every synchronized primitive and the scene. Idempotent;
    /// every other operation fails afterwards.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        let released: usize = self
            .synchronizers
            .iter_mut()
            .map(|s| s.destroy_all(&mut self.scene))
            .sum();
        self.tracker.stop(&mut self.scene, &mut self.resolver);
        self.resolver.clear();
        self.camera.destroy();
        if let Some(lp) = self.auto_render_loop.as_mut() {
            lp.destroy();
        }
        if let Some(active) = self.paused_interactions.take() {
            self.map.set_interactions_active(active);
        }
        self.warm_up = None;
        self.scene.destroy();
        self.enabled = false;
        self.pointer_propagation_stopped = false;
        self.destroyed = true;
        info!(released, "bridge destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    // ---- frame ----

    /// One host animation frame at `now_ms`.
    ///
    /// Order within an active frame: tracked-feature follow, camera-change
    /// detection, layer synchronization, then the render decision.
    pub fn tick(&mut self, now_ms: f64) -> Result<TickReport, BridgeError> {
        self.ensure_alive()?;
        let time = Time::from_millis(now_ms);
        let frame = match self.frame {
            Some(previous) => previous.advance(time),
            None => Frame::first(time),
        };
        self.frame = Some(frame);

        if self.warm_up.is_some() {
            return self.warm_up_frame(frame, now_ms);
        }
        let mut report = TickReport::idle(frame);
        if !self.enabled {
            self.camera
                .sync_from_view(self.authority, self.map.view(), &mut self.scene)?;
            return Ok(report);
        }
        if !self.limiter.should_run(now_ms) {
            report.throttled = true;
            return Ok(report);
        }

        report.tracking = self.follow_tracked(frame);
        self.camera
            .check_camera_change(self.authority, self.map.view_mut(), &self.scene)?;
        report.camera_moved = self.observe_camera();
        report.sync = self.synchronize(frame);
        self.scene.display_mut().update(time);

        if report.camera_moved || report.sync.changed() || report.tracking == TrackingUpdate::Following {
            self.request_render();
        }
        report.rendered = self.render_if_needed(time, report.sync.pending > 0)?;
        self.metrics.inc_counter("frames.ticked", 1);
        Ok(report)
    }

    fn warm_up_frame(&mut self, frame: Frame, now_ms: f64) -> Result<TickReport, BridgeError> {
        let mut report = TickReport::idle(frame);
        let Some(mut warm) = self.warm_up else {
            return Ok(report);
        };
        let started = *warm.started_ms.get_or_insert(now_ms);

        if now_ms - started < warm.timeout_ms {
            report.sync = self.synchronize(frame);
            self.scene.display_mut().update(frame.time);
            self.scene.render(frame.time)?;
            warm.rendered = true;
            report.rendered = true;
        }
        let settled = warm.rendered
            && report.sync.pending == 0
            && !self.synchronizers.iter().any(|s| s.has_pending_work())
            && self.scene.globe().tiles_loaded();
        let timed_out = now_ms - started >= warm.timeout_ms;

        if !(settled || timed_out) {
            self.warm_up = Some(warm);
            return Ok(report);
        }
        let end = if settled { WarmUpEnd::Completed } else { WarmUpEnd::TimedOut };
        if end == WarmUpEnd::TimedOut {
            let cancelled = self.scene.globe_mut().cancel_pending();
            let mut released = 0;
            for sync in self.synchronizers.iter_mut().filter(|s| s.has_pending_work()) {
                released += sync.destroy_all(&mut self.scene);
            }
            self.bus.info(
                Some(frame),
                "warmup.timed_out",
                format!("cancelled {cancelled} tile loads, released {released} partial layers"),
            );
        }
        self.scene.set_activation(Activation::Inactive);
        self.warm_up = None;
        // Drop the warm-up height and pick up 2D edits made meanwhile.
        self.camera.read_from_view(self.map.view(), &mut self.scene)?;
        report.warm_up = Some(end);
        info!(?end, elapsed_ms = now_ms - started, "warm-up finished");
        Ok(report)
    }

    fn follow_tracked(&mut self, frame: Frame) -> TrackingUpdate {
        let feature = self.tracker.feature();
        match self.tracker.update(&self.map, &mut self.scene, &mut self.resolver) {
            Ok(TrackingUpdate::Dropped(reason)) => {
                self.bus.warn(
                    Some(frame),
                    "tracking.dropped",
                    format!("stopped following {feature:?}: {reason:?}"),
                );
                TrackingUpdate::Dropped(reason)
            }
            Ok(update) => update,
            Err(err) => {
                self.tracker.stop(&mut self.scene, &mut self.resolver);
                self.bus.warn(
                    Some(frame),
                    "tracking.failed",
                    format!("stopped following {feature:?}: {err}"),
                );
                TrackingUpdate::Idle
            }
        }
    }

    /// Any camera mutation since the last frame, however small.
    fn observe_camera(&mut self) -> bool {
        let revision = self.scene.camera().revision();
        if self.last_camera_revision == Some(revision) {
            return false;
        }
        self.last_camera_revision = Some(revision);
        for sync in &mut self.synchronizers {
            sync.camera_changed(&mut self.scene);
        }
        true
    }

    fn synchronize(&mut self, frame: Frame) -> SyncReport {
        let units = u32::try_from(self.options.sync.vector_features_per_frame).unwrap_or(u32::MAX);
        let mut budget = FrameBudget::new(units);
        let mut ctx = SyncContext {
            map: &self.map,
            scene: &mut self.scene,
            bus: &mut self.bus,
            metrics: &mut self.metrics,
            frame,
            budget: &mut budget,
        };
        let mut total = SyncReport::default();
        for sync in &mut self.synchronizers {
            total.merge(sync.synchronize(&mut ctx));
        }
        if total.changed() {
            debug!(
                created = total.created,
                updated = total.updated,
                destroyed = total.destroyed,
                pending = total.pending,
                budget_spent = budget.spent_units(),
                "synchronized"
            );
        }
        total
    }

    fn render_if_needed(&mut self, time: Time, sync_pending: bool) -> Result<bool, BridgeError> {
        if self.block_rendering {
            return Ok(false);
        }
        let pending = sync_pending || self.scene.has_pending_work();
        if let Some(lp) = self.auto_render_loop.as_mut()
            && !lp.should_render(pending)
        {
            return Ok(false);
        }
        self.scene.render(time)?;
        if let Some(lp) = self.auto_render_loop.as_mut() {
            lp.rendered(time);
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.present(&Renderer::collect(&self.scene, time));
        }
        self.metrics.inc_counter("frames.rendered", 1);
        Ok(true)
    }

    // ---- settings ----

    pub fn set_block_rendering(&mut self, block: bool) -> Result<(), BridgeError> {
        self.ensure_alive()?;
        self.block_rendering = block;
        if !block {
            self.request_render();
        }
        Ok(())
    }

    pub fn block_rendering(&self) -> bool {
        self.block_rendering
    }

    /// Switches to redrawing only when something changed. Stays on once
    /// enabled.
    pub fn enable_auto_render_loop(&mut self) -> Result<(), BridgeError> {
        self.ensure_alive()?;
        if self.auto_render_loop.is_none() {
            self.auto_render_loop = Some(AutoRenderLoop::new());
        }
        Ok(())
    }

    pub fn auto_render_loop(&self) -> Option<&AutoRenderLoop> {
        self.auto_render_loop.as_ref()
    }

    /// Marks the scene dirty so the next active frame redraws.
    pub fn request_render(&mut self) {
        if let Some(lp) = self.auto_render_loop.as_mut() {
            lp.notify_repaint_required();
        }
    }

    pub fn resolution_scale(&self) -> f64 {
        self.scene.resolution_scale()
    }

    pub fn set_resolution_scale(&mut self, scale: f64) -> Result<(), BridgeError> {
        self.ensure_alive()?;
        if !(scale.is_finite() && scale > 0.0 && scale <= 1.0) {
            return Err(BridgeError::InvalidResolutionScale(scale));
        }
        self.scene.set_resolution_scale(scale)?;
        self.request_render();
        Ok(())
    }

    pub fn target_frame_rate(&self) -> FrameRate {
        self.limiter.rate()
    }

    pub fn set_target_frame_rate(&mut self, rate: FrameRate) -> Result<(), BridgeError> {
        self.ensure_alive()?;
        if let FrameRate::Fps(fps) = rate
            && !(fps.is_finite() && fps > 0.0)
        {
            return Err(BridgeError::InvalidFrameRate(fps));
        }
        self.limiter.set_rate(rate);
        Ok(())
    }

    pub fn refresh_2d_after_camera_move_end_only(&self) -> bool {
        self.camera.refresh_on_move_end_only()
    }

    pub fn set_refresh_2d_after_camera_move_end_only(&mut self, enabled: bool) -> Result<(), BridgeError> {
        self.ensure_alive()?;
        self.camera.set_refresh_on_move_end_only(enabled);
        Ok(())
    }

    pub fn set_render_sink(&mut self, sink: Box<dyn RenderSink>) {
        self.sink = Some(sink);
    }

    // ---- camera ----

    pub fn set_tilt(&mut self, tilt: f64) -> Result<bool, BridgeError> {
        self.ensure_alive()?;
        self.camera.set_tilt(tilt, &mut self.scene)
    }

    pub fn set_distance(&mut self, distance: f64) -> Result<bool, BridgeError> {
        self.ensure_alive()?;
        self.camera.set_distance(distance, &mut self.scene)
    }

    pub fn set_heading(&mut self, heading: f64) -> Result<bool, BridgeError> {
        self.ensure_alive()?;
        self.camera.set_heading(heading, &mut self.scene)
    }

    // ---- tracking ----

    pub fn tracked_feature(&self) -> Option<FeatureId> {
        self.tracker.feature()
    }

    /// Follows a point feature with the globe camera, or stops following
    /// with `None`. Unknown and non-point features are rejected here; later
    /// failures drop tracking and go to the event bus.
    pub fn set_tracked_feature(&mut self, feature: Option<FeatureId>) -> Result<(), BridgeError> {
        self.ensure_alive()?;
        match feature {
            Some(fid) => {
                self.tracker
                    .start(fid, &self.map, &mut self.scene, &mut self.resolver)?;
            }
            None => {
                self.tracker.stop(&mut self.scene, &mut self.resolver);
            }
        }
        Ok(())
    }

    pub fn tracked_entity(&self) -> Option<EntityId> {
        self.tracker.entity()
    }

    // ---- accessors ----

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn camera(&self) -> &CameraBridge {
        &self.camera
    }

    pub fn map(&self) -> &Map2d {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut Map2d {
        &mut self.map
    }

    pub fn view(&self) -> &View2d {
        self.map.view()
    }

    pub fn scene(&self) -> &Scene3d {
        &self.scene
    }

    /// Direct scene access for composition. Changes made here are not
    /// tracked by the synchronizers.
    pub fn scene_mut(&mut self) -> &mut Scene3d {
        &mut self.scene
    }

    pub fn data_sources(&self) -> &DataSourceCollection {
        self.scene.data_sources()
    }

    pub fn data_source_display(&self) -> &DataSourceDisplay {
        self.scene.display()
    }

    pub fn synchronizers(&self) -> &[LayerSynchronizer] {
        &self.synchronizers
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn pointer_propagation_stopped(&self) -> bool {
        self.pointer_propagation_stopped
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn ensure_alive(&self) -> Result<(), BridgeError> {
        if self.destroyed {
            return Err(BridgeError::Destroyed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Bridge, WarmUpEnd};
    use crate::camera::Authority;
    use crate::config::BridgeOptions;
    use crate::error::BridgeError;
    use crate::render_loop::FrameRate;
    use crate::synchronizer::{LayerSynchronizer, SyncContext, SyncReport, Synchronizer};
    use crate::testing::{empty_map, map_with_rasters, osm_layer, scene};
    use crate::tracking::TrackingUpdate;
    use approx::assert_abs_diff_eq;
    use gpu::{FrameRecorder, RenderFrame, RenderSink};
    use layers::{Feature, Geometry2d, LayerNode, Map2d};
    use scene::{Activation, Scene3d};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn bridge(map: Map2d) -> Bridge {
        Bridge::new(map, scene(), BridgeOptions::default()).unwrap()
    }

    #[test]
    fn raster_scenario_end_to_end() {
        let (map, l1, l2) = map_with_rasters();
        let mut bridge = bridge(map);
        bridge.set_enabled(true).unwrap();
        bridge.tick(0.0).unwrap();
        assert_eq!(bridge.scene().imagery().len(), 1);
        let first = bridge.scene().imagery().iter().next().unwrap().clone();
        assert_eq!(first.alpha, 1.0);

        bridge.map_mut().set_visible(l2, true).unwrap();
        bridge.tick(16.0).unwrap();
        assert_eq!(bridge.scene().imagery().len(), 2);
        assert!(bridge.scene().imagery().get(first.id).is_some());

        bridge.map_mut().remove_layer(l1).unwrap();
        bridge.tick(32.0).unwrap();
        assert_eq!(bridge.scene().imagery().len(), 1);
        assert!(bridge.scene().imagery().get(first.id).is_none());
    }

    #[test]
    fn idle_frames_do_not_touch_the_scene() {
        let (map, _, _) = map_with_rasters();
        let mut bridge = bridge(map);
        bridge.set_enabled(true).unwrap();
        assert!(bridge.tick(0.0).unwrap().sync.changed());
        let report = bridge.tick(16.0).unwrap();
        assert!(!report.sync.changed());
        assert!(!report.camera_moved);
        assert_eq!(bridge.metrics().counter("frames.ticked"), 2);
        assert_eq!(bridge.metrics().gauge("raster.imagery_layers"), Some(1));
    }

    fn scene_counts(bridge: &Bridge) -> (usize, usize, usize) {
        (
            bridge.scene().imagery().len(),
            bridge.scene().primitives().len(),
            bridge.scene().primitives().primitive_count(),
        )
    }

    #[test]
    fn re_enabling_does_not_duplicate_primitives() {
        let build = || {
            let (mut map, _, _) = map_with_rasters();
            let layer = map.add_layer(LayerNode::vector()).unwrap();
            map.add_feature(layer, Feature::new(Geometry2d::Point([0.0, 0.0])))
                .unwrap();
            (map, layer)
        };

        let (map, layer) = build();
        let mut toggled = bridge(map);
        toggled.set_enabled(true).unwrap();
        toggled.tick(0.0).unwrap();
        toggled.set_enabled(false).unwrap();
        toggled
            .map_mut()
            .add_feature(layer, Feature::new(Geometry2d::Point([10.0, 0.0])))
            .unwrap();
        toggled.tick(16.0).unwrap();
        toggled.set_enabled(true).unwrap();
        toggled.tick(32.0).unwrap();

        let (map, layer) = build();
        let mut continuous = bridge(map);
        continuous.set_enabled(true).unwrap();
        continuous.tick(0.0).unwrap();
        continuous
            .map_mut()
            .add_feature(layer, Feature::new(Geometry2d::Point([10.0, 0.0])))
            .unwrap();
        continuous.tick(16.0).unwrap();
        continuous.tick(32.0).unwrap();

        assert_eq!(scene_counts(&toggled), scene_counts(&continuous));
        assert_eq!(scene_counts(&toggled), (1, 1, 2));
    }

    #[test]
    fn warm_up_ends_within_timeout_plus_one_frame() {
        let (map, _, _) = map_with_rasters();
        let mut bridge = bridge(map);
        bridge.scene_mut().globe_mut().request_tiles(10_000);
        bridge.warm_up(500_000.0, 100.0).unwrap();
        assert_eq!(bridge.scene().activation(), Activation::OffScreen);
        assert!(bridge.scene().camera().position_geodetic().alt_m >= 500_000.0 - 1e-3);

        assert_eq!(bridge.tick(1000.0).unwrap().warm_up, None);
        assert_eq!(bridge.tick(1050.0).unwrap().warm_up, None);
        let report = bridge.tick(1116.0).unwrap();
        assert_eq!(report.warm_up, Some(WarmUpEnd::TimedOut));
        assert!(!report.rendered);
        assert_eq!(bridge.scene().activation(), Activation::Inactive);
        assert_eq!(bridge.scene().globe().pending_tiles(), 0);
        assert!(!bridge.is_warming_up());
        assert_eq!(bridge.bus().count_kind("warmup.timed_out"), 1);
    }

    #[test]
    fn warm_up_timeout_counts_from_the_call() {
        let (map, _, _) = map_with_rasters();
        let mut bridge = bridge(map);
        bridge.tick(0.0).unwrap();
        bridge.scene_mut().globe_mut().request_tiles(10_000);
        bridge.warm_up(1000.0, 100.0).unwrap();

        let mut ended = None;
        for i in 1..20 {
            let t = f64::from(i) * 16.0;
            if let Some(end) = bridge.tick(t).unwrap().warm_up {
                ended = Some((t, end));
                break;
            }
        }
        let (t, end) = ended.unwrap();
        assert_eq!(end, WarmUpEnd::TimedOut);
        assert!(t <= 100.0 + 16.0, "warm-up ended at {t}");
        assert_eq!(bridge.scene().activation(), Activation::Inactive);
    }

    #[test]
    fn view_edits_during_warm_up_reach_the_camera() {
        let mut bridge = bridge(empty_map());
        bridge.tick(0.0).unwrap();
        bridge.scene_mut().globe_mut().request_tiles(10_000);
        bridge.warm_up(1_000_000.0, 50.0).unwrap();
        bridge.map_mut().view_mut().set_center([1.0e6, 0.0]).unwrap();

        bridge.tick(16.0).unwrap();
        assert!(bridge.scene().camera().position_geodetic().alt_m >= 1_000_000.0 - 1e-3);
        assert_eq!(bridge.tick(64.0).unwrap().warm_up, Some(WarmUpEnd::TimedOut));

        let position = bridge.scene().camera().position_geodetic();
        assert!(position.alt_m < 1_000_000.0);
        assert_abs_diff_eq!(position.lon_rad, 1.0e6 / 6_378_137.0, epsilon = 1e-6);
        // Already in step with the view: the next 2D frame leaves it alone.
        let before = bridge.scene().camera().position();
        bridge.tick(80.0).unwrap();
        assert_eq!(bridge.scene().camera().position(), before);
    }

    #[test]
    fn warm_up_completes_early_when_settled() {
        let (map, _, _) = map_with_rasters();
        let mut bridge = bridge(map);
        bridge.warm_up(1000.0, 10_000.0).unwrap();
        let report = bridge.tick(0.0).unwrap();
        assert_eq!(report.warm_up, Some(WarmUpEnd::Completed));
        assert!(report.rendered);
        // The warmed imagery survives for the real session.
        assert_eq!(bridge.scene().imagery().len(), 1);
        assert!(!bridge.get_enabled());
    }

    #[test]
    fn warm_up_misuse_is_rejected() {
        let mut bridge = bridge(empty_map());
        assert!(matches!(
            bridge.warm_up(f64::NAN, 10.0),
            Err(BridgeError::InvalidWarmUp { .. })
        ));
        bridge.warm_up(100.0, 10.0).unwrap();
        assert!(matches!(bridge.warm_up(100.0, 10.0), Err(BridgeError::WarmUpInProgress)));
        bridge.set_enabled(true).unwrap();
        assert!(!bridge.is_warming_up());
        assert!(matches!(bridge.warm_up(100.0, 10.0), Err(BridgeError::WarmUpWhileEnabled)));
    }

    #[test]
    fn clearing_tracked_feature_stops_follow_next_frame() {
        let mut map = empty_map();
        let layer = map.add_layer(LayerNode::vector()).unwrap();
        let fid = map
            .add_feature(layer, Feature::new(Geometry2d::Point([50_000.0, 50_000.0])))
            .unwrap();
        let mut bridge = bridge(map);
        bridge.set_enabled(true).unwrap();
        bridge.set_tracked_feature(Some(fid)).unwrap();
        assert!(bridge.tracked_entity().is_some());

        assert_eq!(bridge.tick(0.0).unwrap().tracking, TrackingUpdate::Waiting);
        assert_eq!(bridge.tick(16.0).unwrap().tracking, TrackingUpdate::Following);

        bridge.set_tracked_feature(None).unwrap();
        assert!(bridge.tracked_entity().is_none());
        bridge.map_mut().set_feature_geometry(fid, Some(Geometry2d::Point([0.0, 0.0]))).unwrap();
        let before = bridge.scene().camera().position();
        let report = bridge.tick(32.0).unwrap();
        assert_eq!(report.tracking, TrackingUpdate::Idle);
        assert_eq!(bridge.scene().camera().position(), before);
        assert_eq!(bridge.data_source_display().entity_count(), 0);
    }

    #[test]
    fn removed_tracked_feature_is_reported_not_raised() {
        let mut map = empty_map();
        let layer = map.add_layer(LayerNode::vector()).unwrap();
        let fid = map
            .add_feature(layer, Feature::new(Geometry2d::Point([0.0, 0.0])))
            .unwrap();
        let mut bridge = bridge(map);
        bridge.set_enabled(true).unwrap();
        bridge.set_tracked_feature(Some(fid)).unwrap();
        bridge.map_mut().remove_feature(fid).unwrap();
        let report = bridge.tick(0.0).unwrap();
        assert!(matches!(report.tracking, TrackingUpdate::Dropped(_)));
        assert!(bridge.tracked_feature().is_none());
        assert_eq!(bridge.bus().count_kind("tracking.dropped"), 1);
    }

    #[test]
    fn authority_follows_mode_and_disable_pushes_camera_down() {
        let mut bridge = bridge(empty_map());
        assert_eq!(bridge.authority(), Authority::TwoD);
        bridge.set_enabled(true).unwrap();
        assert_eq!(bridge.authority(), Authority::ThreeD);

        // 2D writes are ignored while the globe owns the camera.
        let camera_before = bridge.scene().camera().position();
        bridge.map_mut().view_mut().set_center([1.0e6, 0.0]).unwrap();
        bridge.tick(0.0).unwrap();
        assert_eq!(bridge.scene().camera().position(), camera_before);

        let resolution = bridge.view().resolution();
        bridge.set_distance(2.0 * bridge.camera().distance()).unwrap();
        bridge.tick(16.0).unwrap();
        assert_abs_diff_eq!(bridge.view().resolution(), 2.0 * resolution, epsilon = 1e-6 * resolution);

        bridge.set_enabled(false).unwrap();
        assert_eq!(bridge.authority(), Authority::TwoD);
        assert_abs_diff_eq!(bridge.view().center()[0], 0.0, epsilon = 1e-3);

        // Back in 2D: view changes reach the camera.
        bridge.map_mut().view_mut().set_resolution(10.0).unwrap();
        let before = bridge.scene().camera().position();
        bridge.tick(32.0).unwrap();
        assert_ne!(bridge.scene().camera().position(), before);
    }

    #[derive(Clone, Default)]
    struct SharedRecorder(Rc<RefCell<FrameRecorder>>);

    impl RenderSink for SharedRecorder {
        fn present(&mut self, frame: &RenderFrame) {
            self.0.borrow_mut().present(frame);
        }
    }

    #[test]
    fn frame_rate_limit_throttles_whole_frames() {
        let mut bridge = bridge(empty_map());
        let recorder = SharedRecorder::default();
        bridge.set_render_sink(Box::new(recorder.clone()));
        bridge.set_target_frame_rate(FrameRate::Fps(10.0)).unwrap();
        bridge.set_enabled(true).unwrap();

        let rendered: Vec<bool> = [0.0, 40.0, 80.0, 110.0, 150.0]
            .into_iter()
            .map(|t| bridge.tick(t).unwrap().rendered)
            .collect();
        assert_eq!(rendered, vec![true, false, false, true, false]);
        assert_eq!(recorder.0.borrow().presented, 2);
        assert!(matches!(
            bridge.set_target_frame_rate(FrameRate::Fps(0.0)),
            Err(BridgeError::InvalidFrameRate(_))
        ));
    }

    #[test]
    fn auto_render_loop_skips_static_frames() {
        let mut bridge = bridge(empty_map());
        bridge.enable_auto_render_loop().unwrap();
        bridge.set_enabled(true).unwrap();
        assert!(bridge.tick(0.0).unwrap().rendered);
        assert!(!bridge.tick(16.0).unwrap().rendered);

        bridge.map_mut().add_layer(osm_layer()).unwrap();
        assert!(bridge.tick(32.0).unwrap().rendered);
        // Tiles requested by the new layer load during that render.
        assert!(!bridge.tick(48.0).unwrap().rendered);

        bridge.request_render();
        assert!(bridge.tick(64.0).unwrap().rendered);
        assert_eq!(bridge.auto_render_loop().unwrap().skipped_frames(), 2);
    }

    #[test]
    fn blocked_rendering_keeps_synchronizing() {
        let (map, _, _) = map_with_rasters();
        let mut bridge = bridge(map);
        bridge.set_block_rendering(true).unwrap();
        bridge.set_enabled(true).unwrap();
        let report = bridge.tick(0.0).unwrap();
        assert!(!report.rendered);
        assert_eq!(bridge.scene().imagery().len(), 1);
        assert_eq!(bridge.scene().frames_rendered(), 0);
    }

    #[test]
    fn over_map_mode_pauses_2d_interactions() {
        let options = BridgeOptions {
            stop_pointer_propagation: true,
            ..BridgeOptions::default()
        };
        let mut bridge = Bridge::new(empty_map(), scene(), options).unwrap();
        bridge.set_enabled(true).unwrap();
        assert!(!bridge.map().interactions_active());
        assert!(bridge.pointer_propagation_stopped());
        bridge.set_enabled(false).unwrap();
        assert!(bridge.map().interactions_active());
        assert!(!bridge.pointer_propagation_stopped());
    }

    #[test]
    fn settings_validate_their_input() {
        let mut bridge = bridge(empty_map());
        assert!(matches!(
            bridge.set_resolution_scale(1.5),
            Err(BridgeError::InvalidResolutionScale(_))
        ));
        bridge.set_resolution_scale(0.5).unwrap();
        assert_eq!(bridge.scene().drawing_buffer_size(), (512, 384));
        bridge.set_refresh_2d_after_camera_move_end_only(true).unwrap();
        assert!(bridge.refresh_2d_after_camera_move_end_only());
    }

    #[test]
    fn destroy_releases_everything_and_is_terminal() {
        let (mut map, _, hidden) = map_with_rasters();
        map.set_visible(hidden, true).unwrap();
        let layer = map.add_layer(LayerNode::vector()).unwrap();
        map.add_feature(layer, Feature::new(Geometry2d::Point([0.0, 0.0])))
            .unwrap();
        let mut bridge = bridge(map);
        bridge.set_enabled(true).unwrap();
        bridge.tick(0.0).unwrap();

        bridge.destroy();
        bridge.destroy();
        assert!(bridge.is_destroyed());
        assert_eq!(scene_counts(&bridge), (0, 0, 0));
        assert!(matches!(bridge.tick(16.0), Err(BridgeError::Destroyed)));
        assert!(matches!(bridge.set_enabled(true), Err(BridgeError::Destroyed)));
    }

    #[derive(Default)]
    struct Counting {
        calls: Rc<RefCell<u32>>,
    }

    impl Synchronizer for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn synchronize(&mut self, _ctx: &mut SyncContext<'_>) -> SyncReport {
            *self.calls.borrow_mut() += 1;
            SyncReport::default()
        }

        fn destroy_all(&mut self, _scene: &mut Scene3d) -> usize {
            0
        }
    }

    #[test]
    fn custom_synchronizers_replace_defaults() {
        let (map, _, _) = map_with_rasters();
        let calls = Rc::new(RefCell::new(0));
        let counting = Counting {
            calls: Rc::clone(&calls),
        };
        let mut bridge = Bridge::with_synchronizers(map, scene(), BridgeOptions::default(), |_| {
            vec![LayerSynchronizer::Custom(Box::new(counting))]
        })
        .unwrap();
        bridge.set_enabled(true).unwrap();
        bridge.tick(0.0).unwrap();
        bridge.tick(16.0).unwrap();
        assert_eq!(*calls.borrow(), 2);
        assert_eq!(bridge.synchronizers()[0].name(), "counting");
        assert!(bridge.scene().imagery().is_empty());
    }
}
