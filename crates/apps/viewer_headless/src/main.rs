use std::cell::RefCell;
use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::rc::Rc;

use bridge::{Bridge, TickReport, WarmUpEnd};
use clap::Parser;
use gpu::{FrameRecorder, RenderFrame, RenderSink};
use layers::Feature;
use scene::Scene3d;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod session;

use session::{Action, Handles, Session};

#[derive(Parser, Debug)]
#[command(author, version, about = "Replays a map/globe session script without a window")]
struct Args {
    /// Session script (JSON)
    session: PathBuf,

    /// Host frame interval in milliseconds
    #[arg(long, default_value_t = 16.0)]
    interval_ms: f64,

    /// Number of host frames to run
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// Host time of the first frame in milliseconds
    #[arg(long, default_value_t = 0.0)]
    start_ms: f64,
}

/// Forwards presented frames to a shared recorder so the summary can read
/// them after the bridge took ownership of the sink.
struct SharedSink(Rc<RefCell<FrameRecorder>>);

impl RenderSink for SharedSink {
    fn present(&mut self, frame: &RenderFrame) {
        debug!(
            commands = frame.commands.len(),
            width = frame.width,
            height = frame.height,
            "frame presented"
        );
        self.0.borrow_mut().present(frame);
    }
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    frames: u64,
    throttled: u64,
    rendered: u64,
    camera_moves: u64,
    created: usize,
    updated: usize,
    destroyed: usize,
    skipped: usize,
    warm_up: Option<String>,
    rejected_actions: u64,
    enabled: bool,
    bridge_destroyed: bool,
    authority: String,
    view_center: [f64; 2],
    view_resolution: f64,
    imagery_layers: usize,
    primitive_collections: usize,
    anchors: usize,
    presented: u64,
    last_frame_commands: usize,
    events: BTreeMap<&'static str, usize>,
    events_dropped: u64,
    counters: BTreeMap<&'static str, u64>,
    gauges: BTreeMap<&'static str, i64>,
}

impl Summary {
    fn record(&mut self, report: &TickReport) {
        self.frames += 1;
        self.throttled += u64::from(report.throttled);
        self.rendered += u64::from(report.rendered);
        self.camera_moves += u64::from(report.camera_moved);
        self.created += report.sync.created;
        self.updated += report.sync.updated;
        self.destroyed += report.sync.destroyed;
        self.skipped += report.sync.skipped;
        if let Some(end) = report.warm_up {
            self.warm_up = Some(
                match end {
                    WarmUpEnd::Completed => "completed",
                    WarmUpEnd::TimedOut => "timed_out",
                }
                .to_string(),
            );
        }
    }

    fn finish(&mut self, bridge: &Bridge, recorder: &FrameRecorder) {
        self.enabled = bridge.get_enabled();
        self.bridge_destroyed = bridge.is_destroyed();
        self.authority = format!("{:?}", bridge.authority());
        self.view_center = bridge.view().center();
        self.view_resolution = bridge.view().resolution();
        self.imagery_layers = bridge.scene().imagery().len();
        self.primitive_collections = bridge.scene().primitives().len();
        self.anchors = bridge.scene().anchors().len();
        self.presented = recorder.presented;
        self.last_frame_commands = recorder.last.as_ref().map_or(0, |f| f.commands.len());
        for event in bridge.bus().events() {
            *self.events.entry(event.kind).or_insert(0) += 1;
        }
        self.events_dropped = bridge.bus().dropped();
        let snapshot = bridge.metrics().snapshot();
        self.counters = snapshot.counters.into_iter().collect();
        self.gauges = snapshot.gauges.into_iter().collect();
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let text = std::fs::read_to_string(&args.session)
        .map_err(|err| format!("reading {}: {err}", args.session.display()))?;
    let mut session = Session::from_json(&text)?;

    // Environment overrides for quick experiments without editing the script.
    let render = &mut session.options.render;
    render.resolution_scale = env_var_f64("BRIDGE_RESOLUTION_SCALE", render.resolution_scale);
    let fps = env_var_f64("BRIDGE_TARGET_FPS", render.target_frame_rate.unwrap_or(0.0));
    render.target_frame_rate = (fps > 0.0).then_some(fps);
    session.options.validate()?;

    let (map, mut handles) = session.build_map()?;
    let [width, height] = session.canvas;
    let scene = Scene3d::new(width, height)?;
    let mut bridge = Bridge::new(map, scene, session.options.clone())?;
    let recorder = Rc::new(RefCell::new(FrameRecorder::default()));
    bridge.set_render_sink(Box::new(SharedSink(Rc::clone(&recorder))));

    info!(
        session = %args.session.display(),
        frames = args.frames,
        interval_ms = args.interval_ms,
        layers = session.layers.len(),
        "replaying session"
    );

    let mut summary = Summary::default();
    for index in 0..args.frames {
        for scripted in session.actions.iter().filter(|a| a.frame == index) {
            if let Err(err) = apply(&mut bridge, &mut handles, &scripted.action) {
                warn!(frame = index, action = ?scripted.action, %err, "action rejected");
                summary.rejected_actions += 1;
            }
        }
        if bridge.is_destroyed() {
            info!(frame = index, "bridge destroyed, stopping");
            break;
        }
        let now_ms = args.start_ms + f64::from(index) * args.interval_ms;
        let report = bridge.tick(now_ms)?;
        summary.record(&report);
    }

    summary.finish(&bridge, &recorder.borrow());
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn apply(bridge: &mut Bridge, handles: &mut Handles, action: &Action) -> Result<(), Box<dyn Error>> {
    match action {
        Action::Enable => bridge.set_enabled(true)?,
        Action::Disable => bridge.set_enabled(false)?,
        Action::WarmUp { height, timeout_ms } => bridge.warm_up(*height, *timeout_ms)?,
        Action::Track { layer, index } => {
            let feature = handles.feature(layer, *index)?;
            bridge.set_tracked_feature(Some(feature))?;
        }
        Action::Untrack => bridge.set_tracked_feature(None)?,
        Action::Tilt { tilt } => {
            bridge.set_tilt(*tilt)?;
        }
        Action::Heading { heading } => {
            bridge.set_heading(*heading)?;
        }
        Action::Distance { distance } => {
            bridge.set_distance(*distance)?;
        }
        Action::Pan { center } => bridge.map_mut().view_mut().set_center(*center)?,
        Action::Zoom { resolution } => bridge.map_mut().view_mut().set_resolution(*resolution)?,
        Action::Show { layer } => {
            let id = handles.layer(layer)?;
            bridge.map_mut().set_visible(id, true)?;
        }
        Action::Hide { layer } => {
            let id = handles.layer(layer)?;
            bridge.map_mut().set_visible(id, false)?;
        }
        Action::Opacity { layer, opacity } => {
            let id = handles.layer(layer)?;
            bridge.map_mut().set_opacity(id, *opacity)?;
        }
        Action::RemoveLayer { layer } => {
            let id = handles.layer(layer)?;
            bridge.map_mut().remove_layer(id)?;
        }
        Action::AddFeature { layer, geometry } => {
            let id = handles.layer(layer)?;
            let feature = bridge
                .map_mut()
                .add_feature(id, Feature::new(geometry.clone().into()))?;
            handles.push_feature(layer, feature);
        }
        Action::RequestRender => bridge.request_render(),
        Action::Destroy => bridge.destroy(),
    }
    Ok(())
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
