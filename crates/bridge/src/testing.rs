//! Shared fixtures for the crate's unit tests.

use foundation::math::Projection;
use foundation::time::Time;
use layers::{LayerId, LayerNode, Map2d, TileSource, View2d};
use runtime::{EventBus, Frame, FrameBudget, Metrics};
use scene::Scene3d;

use crate::synchronizer::{SyncContext, SyncReport, Synchronizer};

pub fn empty_map() -> Map2d {
    let view = View2d::new(Projection::WebMercator, [0.0, 0.0], 100.0).unwrap();
    Map2d::new(view)
}

pub fn scene() -> Scene3d {
    Scene3d::new(1024, 768).unwrap()
}

pub fn osm_layer() -> LayerNode {
    LayerNode::tile(TileSource::xyz("https://tile.example.org/{z}/{x}/{y}.png")).named("osm")
}

/// A map with one visible and one hidden tile layer, bottom to top.
pub fn map_with_rasters() -> (Map2d, LayerId, LayerId) {
    let mut map = empty_map();
    let visible = map.add_layer(osm_layer()).unwrap();
    let hidden = map
        .add_layer(
            LayerNode::tile(TileSource::wms("https://wms.example.org", "roads"))
                .named("roads")
                .with_visible(false),
        )
        .unwrap();
    (map, visible, hidden)
}

pub fn sync_once(
    sync: &mut dyn Synchronizer,
    map: &Map2d,
    scene: &mut Scene3d,
    bus: &mut EventBus,
) -> SyncReport {
    sync_with_budget(sync, map, scene, bus, FrameBudget::unlimited())
}

pub fn sync_with_budget(
    sync: &mut dyn Synchronizer,
    map: &Map2d,
    scene: &mut Scene3d,
    bus: &mut EventBus,
    mut budget: FrameBudget,
) -> SyncReport {
    let mut metrics = Metrics::new();
    let mut ctx = SyncContext {
        map,
        scene,
        bus,
        metrics: &mut metrics,
        frame: Frame::first(Time(0.0)),
        budget: &mut budget,
    };
    sync.synchronize(&mut ctx)
}
