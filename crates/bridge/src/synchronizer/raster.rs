use std::collections::BTreeMap;

use foundation::Aabb2;
use foundation::math::Projection;
use layers::{ChangeCursor, FlatLayer, LayerId, LayerKind, Map2d, TileSource, TileSourceKind};
use scene::{ImageryLayerId, ImageryProvider, Rectangle, Scene3d};
use tracing::debug;

use super::{SyncContext, SyncReport, Synchronizer, is_layer_change, order_differs, read_changes};

/// Tile requests issued to the globe when imagery is created or reloaded.
const TILE_REQUESTS_PER_LOAD: u32 = 4;

#[derive(Debug, Clone)]
struct RasterEntry {
    imagery: ImageryLayerId,
    provider: ImageryProvider,
    extent: Option<Aabb2>,
    revision: u64,
}

/// One imagery layer per tile layer, created the first time the layer is
/// visible.
#[derive(Debug)]
pub struct RasterSynchronizer {
    cursor: ChangeCursor,
    reconcile_pending: bool,
    entries: BTreeMap<LayerId, RasterEntry>,
    /// Source revision last reported as unsupported, per layer.
    reported: BTreeMap<LayerId, u64>,
}

impl RasterSynchronizer {
    pub fn new(map: &Map2d) -> Self {
        Self {
            cursor: map.subscribe(),
            reconcile_pending: true,
            entries: BTreeMap::new(),
            reported: BTreeMap::new(),
        }
    }

    pub fn imagery_layer(&self, layer: LayerId) -> Option<ImageryLayerId> {
        self.entries.get(&layer).map(|e| e.imagery)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn reconcile(&mut self, ctx: &mut SyncContext<'_>) -> SyncReport {
        let mut report = SyncReport::default();
        let map = ctx.map;
        let flat: Vec<FlatLayer> = map
            .flatten()
            .into_iter()
            .filter(|l| l.kind == LayerKind::Tile)
            .collect();

        let gone: Vec<LayerId> = self
            .entries
            .keys()
            .copied()
            .filter(|id| !flat.iter().any(|l| l.id == *id))
            .collect();
        for id in gone {
            self.reported.remove(&id);
            if let Some(entry) = self.entries.remove(&id) {
                ctx.scene.imagery_mut().remove(entry.imagery);
                report.destroyed += 1;
                debug!(layer = %id, imagery = %entry.imagery, "imagery layer destroyed");
            }
        }

        let projection = map.view().projection();
        for layer in &flat {
            let Some(source) = map.layer(layer.id).and_then(|n| n.tile_source()) else {
                continue;
            };
            self.sync_layer(ctx, projection, layer, source, &mut report);
        }

        let desired: Vec<ImageryLayerId> = flat
            .iter()
            .filter_map(|l| self.entries.get(&l.id).map(|e| e.imagery))
            .collect();
        let imagery = ctx.scene.imagery_mut();
        if order_differs(&imagery.ids(), &desired) {
            for id in &desired {
                imagery.raise_to_top(*id);
            }
            report.updated += 1;
            debug!(layers = desired.len(), "imagery reordered");
        }
        report
    }

    fn sync_layer(
        &mut self,
        ctx: &mut SyncContext<'_>,
        projection: Projection,
        layer: &FlatLayer,
        source: &TileSource,
        report: &mut SyncReport,
    ) {
        let Some(provider) = provider_for(source) else {
            if let Some(entry) = self.entries.remove(&layer.id) {
                ctx.scene.imagery_mut().remove(entry.imagery);
                report.destroyed += 1;
            }
            if self.reported.get(&layer.id) != Some(&source.revision) {
                self.reported.insert(layer.id, source.revision);
                report.skipped += 1;
                ctx.bus.warn(
                    Some(ctx.frame),
                    "raster.unsupported",
                    format!("{} has a tile source with no imagery counterpart", layer.id),
                );
            }
            return;
        };
        let rectangle = layer.extent.map(|e| rectangle_for(projection, e));

        let Some(entry) = self.entries.get_mut(&layer.id) else {
            if !layer.visible {
                return;
            }
            let imagery = ctx.scene.imagery_mut().add(provider.clone(), rectangle);
            if let Some(created) = ctx.scene.imagery_mut().get_mut(imagery) {
                created.alpha = layer.opacity;
            }
            ctx.scene.globe_mut().request_tiles(TILE_REQUESTS_PER_LOAD);
            self.entries.insert(
                layer.id,
                RasterEntry {
                    imagery,
                    provider,
                    extent: layer.extent,
                    revision: source.revision,
                },
            );
            report.created += 1;
            debug!(layer = %layer.id, %imagery, "imagery layer created");
            return;
        };

        let imagery = ctx.scene.imagery_mut();
        let mut touched = false;
        if entry.extent != layer.extent {
            // Extents are fixed at creation: replace in place.
            let index = imagery.index_of(entry.imagery).unwrap_or(imagery.len());
            imagery.remove(entry.imagery);
            entry.imagery = imagery.insert(index, provider.clone(), rectangle);
            entry.extent = layer.extent;
            entry.provider = provider;
            entry.revision = source.revision;
            touched = true;
            ctx.scene.globe_mut().request_tiles(TILE_REQUESTS_PER_LOAD);
            debug!(layer = %layer.id, imagery = %entry.imagery, "imagery layer recreated for new extent");
        } else if entry.provider != provider {
            imagery.set_provider(entry.imagery, provider.clone());
            entry.provider = provider;
            entry.revision = source.revision;
            touched = true;
            ctx.scene.globe_mut().request_tiles(TILE_REQUESTS_PER_LOAD);
        } else if entry.revision != source.revision {
            imagery.reload(entry.imagery);
            entry.revision = source.revision;
            touched = true;
            ctx.scene.globe_mut().request_tiles(TILE_REQUESTS_PER_LOAD);
        }

        if let Some(existing) = ctx.scene.imagery_mut().get_mut(entry.imagery)
            && (existing.show != layer.visible || existing.alpha != layer.opacity)
        {
            existing.show = layer.visible;
            existing.alpha = layer.opacity;
            touched = true;
        }
        if touched {
            report.updated += 1;
        }
    }
}

impl Synchronizer for RasterSynchronizer {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn synchronize(&mut self, ctx: &mut SyncContext<'_>) -> SyncReport {
        match read_changes(ctx.map, &mut self.cursor) {
            None => self.reconcile_pending = true,
            Some(changes) => {
                if changes.iter().any(is_layer_change) {
                    self.reconcile_pending = true;
                }
            }
        }
        if !self.reconcile_pending {
            return SyncReport::default();
        }
        self.reconcile_pending = false;
        let report = self.reconcile(ctx);
        ctx.metrics.set_gauge("raster.imagery_layers", self.entries.len() as i64);
        report
    }

    fn destroy_all(&mut self, scene: &mut Scene3d) -> usize {
        let released = self.entries.len();
        for (_, entry) in std::mem::take(&mut self.entries) {
            scene.imagery_mut().remove(entry.imagery);
        }
        self.reported.clear();
        self.reconcile_pending = true;
        if released > 0 {
            debug!(released, "raster synchronizer cleared");
        }
        released
    }
}

fn provider_for(source: &TileSource) -> Option<ImageryProvider> {
    match &source.kind {
        TileSourceKind::Xyz { url } => Some(ImageryProvider::UrlTemplate { url: url.clone() }),
        TileSourceKind::Wms { url, layers } => Some(ImageryProvider::Wms {
            url: url.clone(),
            layers: layers.clone(),
        }),
        TileSourceKind::Custom { .. } => None,
    }
}

fn rectangle_for(projection: Projection, extent: Aabb2) -> Rectangle {
    let [west, south] = projection.to_lon_lat(extent.min);
    let [east, north] = projection.to_lon_lat(extent.max);
    Rectangle::from_degrees(west, south, east, north)
}

#[cfg(test)]
mod tests {
    use super::RasterSynchronizer;
    use crate::synchronizer::Synchronizer;
    use crate::testing::{map_with_rasters, osm_layer, scene, sync_once};
    use foundation::Aabb2;
    use layers::{LayerNode, TileSource};
    use runtime::EventBus;

    #[test]
    fn visible_layer_materializes_and_hidden_waits() {
        let (mut map, visible, hidden) = map_with_rasters();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = RasterSynchronizer::new(&map);

        let report = sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!(report.created, 1);
        assert_eq!(scene.imagery().len(), 1);
        let first = sync.imagery_layer(visible).unwrap();
        assert_eq!(scene.imagery().get(first).unwrap().alpha, 1.0);
        assert!(sync.imagery_layer(hidden).is_none());

        map.set_visible(hidden, true).unwrap();
        let report = sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!((report.created, report.destroyed), (1, 0));
        assert_eq!(sync.imagery_layer(visible), Some(first));
        assert_eq!(scene.imagery().ids(), vec![first, sync.imagery_layer(hidden).unwrap()]);

        map.remove_layer(visible).unwrap();
        let report = sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!(report.destroyed, 1);
        assert_eq!(scene.imagery().len(), 1);
        assert!(sync.imagery_layer(hidden).is_some());
    }

    #[test]
    fn second_pass_without_changes_is_a_no_op() {
        let (map, _, _) = map_with_rasters();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = RasterSynchronizer::new(&map);
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        let before = scene.imagery().ids();
        let report = sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert!(!report.changed());
        assert_eq!(scene.imagery().ids(), before);
    }

    #[test]
    fn hiding_and_fading_update_in_place() {
        let (mut map, visible, _) = map_with_rasters();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = RasterSynchronizer::new(&map);
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        let imagery = sync.imagery_layer(visible).unwrap();

        map.set_opacity(visible, 0.25).unwrap();
        map.set_visible(visible, false).unwrap();
        let report = sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!((report.created, report.updated), (0, 1));
        let layer = scene.imagery().get(imagery).unwrap();
        assert!(!layer.show);
        assert_eq!(layer.alpha, 0.25);
    }

    #[test]
    fn reorder_follows_z_index() {
        let mut map = crate::testing::empty_map();
        let low = map.add_layer(osm_layer()).unwrap();
        let high = map.add_layer(osm_layer()).unwrap();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = RasterSynchronizer::new(&map);
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        let (low_img, high_img) = (sync.imagery_layer(low).unwrap(), sync.imagery_layer(high).unwrap());

        map.set_z_index(low, Some(5)).unwrap();
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!(scene.imagery().ids(), vec![high_img, low_img]);
    }

    #[test]
    fn extent_change_recreates_at_same_position() {
        let mut map = crate::testing::empty_map();
        let bottom = map.add_layer(osm_layer()).unwrap();
        let top = map.add_layer(osm_layer()).unwrap();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = RasterSynchronizer::new(&map);
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        let old = sync.imagery_layer(bottom).unwrap();

        let extent = Aabb2::new([-1.0e6, -1.0e6], [1.0e6, 1.0e6]);
        map.set_extent(bottom, Some(extent)).unwrap();
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        let new = sync.imagery_layer(bottom).unwrap();
        assert_ne!(old, new);
        assert_eq!(scene.imagery().index_of(new), Some(0));
        assert!(scene.imagery().get(new).unwrap().rectangle().is_some());
        assert_eq!(scene.imagery().index_of(sync.imagery_layer(top).unwrap()), Some(1));
    }

    #[test]
    fn source_refresh_reloads_without_recreating() {
        let (mut map, visible, _) = map_with_rasters();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = RasterSynchronizer::new(&map);
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        let imagery = sync.imagery_layer(visible).unwrap();

        map.refresh_source(visible).unwrap();
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!(sync.imagery_layer(visible), Some(imagery));
        assert_eq!(scene.imagery().get(imagery).unwrap().texture_revision(), 1);
    }

    #[test]
    fn unsupported_source_is_reported_once_per_revision() {
        let mut map = crate::testing::empty_map();
        let layer = map
            .add_layer(LayerNode::tile(TileSource::custom("canvas")))
            .unwrap();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = RasterSynchronizer::new(&map);

        let report = sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!((report.created, report.skipped), (0, 1));
        map.set_opacity(layer, 0.5).unwrap();
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!(bus.count_kind("raster.unsupported"), 1);

        map.refresh_source(layer).unwrap();
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!(bus.count_kind("raster.unsupported"), 2);
        assert!(scene.imagery().is_empty());
    }

    #[test]
    fn destroy_all_leaves_no_imagery_and_is_idempotent() {
        let (mut map, _, hidden) = map_with_rasters();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = RasterSynchronizer::new(&map);
        map.set_visible(hidden, true).unwrap();
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        let foreign = scene
            .imagery_mut()
            .add(scene::ImageryProvider::UrlTemplate { url: "base".into() }, None);

        assert_eq!(sync.destroy_all(&mut scene), 2);
        assert_eq!(sync.destroy_all(&mut scene), 0);
        assert_eq!(scene.imagery().ids(), vec![foreign]);
        assert!(sync.is_empty());
    }
}
