use std::collections::{BTreeMap, BTreeSet, VecDeque};

use layers::{ChangeCursor, FeatureId, FlatLayer, LayerId, LayerKind, Map2d, MapChange};
use scene::{PrimitiveCollectionId, PrimitiveId, Scene3d};
use tracing::debug;

use super::{SyncContext, SyncReport, Synchronizer, is_layer_change, order_differs, read_changes};
use crate::convert::geometry_to_primitives;

#[derive(Debug, Clone)]
struct FeatureCounterpart {
    primitives: Vec<PrimitiveId>,
    revision: u64,
}

#[derive(Debug, Clone)]
struct VectorLayerEntry {
    collection: PrimitiveCollectionId,
    features: BTreeMap<FeatureId, FeatureCounterpart>,
}

/// One primitive collection per vector layer, kept in sync feature by
/// feature.
///
/// Feature work goes through a queue drained against the frame budget, one
/// unit per feature, so a large layer converges over several frames.
#[derive(Debug)]
pub struct VectorSynchronizer {
    cursor: ChangeCursor,
    reconcile_pending: bool,
    layers: BTreeMap<LayerId, VectorLayerEntry>,
    queue: VecDeque<(LayerId, FeatureId)>,
    queued: BTreeSet<(LayerId, FeatureId)>,
}

impl VectorSynchronizer {
    pub fn new(map: &Map2d) -> Self {
        Self {
            cursor: map.subscribe(),
            reconcile_pending: true,
            layers: BTreeMap::new(),
            queue: VecDeque::new(),
            queued: BTreeSet::new(),
        }
    }

    pub fn collection(&self, layer: LayerId) -> Option<PrimitiveCollectionId> {
        self.layers.get(&layer).map(|e| e.collection)
    }

    /// Primitives currently standing for `feature`.
    pub fn primitives_of(&self, layer: LayerId, feature: FeatureId) -> &[PrimitiveId] {
        self.layers
            .get(&layer)
            .and_then(|e| e.features.get(&feature))
            .map(|c| c.primitives.as_slice())
            .unwrap_or(&[])
    }

    pub fn queued_features(&self) -> usize {
        self.queue.len()
    }

    fn enqueue(&mut self, layer: LayerId, feature: FeatureId) {
        if self.queued.insert((layer, feature)) {
            self.queue.push_back((layer, feature));
        }
    }

    fn forget_layer(&mut self, layer: LayerId) {
        self.queue.retain(|(l, _)| *l != layer);
        self.queued.retain(|(l, _)| *l != layer);
    }

    fn reconcile_layers(&mut self, ctx: &mut SyncContext<'_>, report: &mut SyncReport) {
        let map = ctx.map;
        let flat: Vec<FlatLayer> = map
            .flatten()
            .into_iter()
            .filter(|l| l.kind == LayerKind::Vector)
            .collect();

        let gone: Vec<LayerId> = self
            .layers
            .keys()
            .copied()
            .filter(|id| !flat.iter().any(|l| l.id == *id))
            .collect();
        for id in gone {
            self.forget_layer(id);
            if let Some(entry) = self.layers.remove(&id) {
                ctx.scene.primitives_mut().remove(entry.collection);
                report.destroyed += 1 + entry.features.len();
                debug!(layer = %id, collection = %entry.collection, "primitive collection destroyed");
            }
        }

        for layer in &flat {
            let Some(source) = map.layer(layer.id).and_then(|n| n.vector_source()) else {
                continue;
            };
            let mut work = Vec::new();
            match self.layers.get(&layer.id) {
                Some(entry) => {
                    // Only features whose counterpart is missing or stale.
                    for (fid, feature) in source.iter() {
                        if entry.features.get(&fid).is_none_or(|c| c.revision != feature.revision) {
                            work.push(fid);
                        }
                    }
                    work.extend(entry.features.keys().filter(|fid| source.get(**fid).is_none()));
                    if let Some(collection) = ctx.scene.primitives_mut().get_mut(entry.collection)
                        && (collection.show != layer.visible || collection.alpha != layer.opacity)
                    {
                        collection.show = layer.visible;
                        collection.alpha = layer.opacity;
                        report.updated += 1;
                    }
                }
                None => {
                    if !layer.visible {
                        continue;
                    }
                    let collection = ctx.scene.primitives_mut().add();
                    if let Some(created) = ctx.scene.primitives_mut().get_mut(collection) {
                        created.alpha = layer.opacity;
                    }
                    self.layers.insert(
                        layer.id,
                        VectorLayerEntry {
                            collection,
                            features: BTreeMap::new(),
                        },
                    );
                    report.created += 1;
                    debug!(layer = %layer.id, %collection, features = source.len(), "primitive collection created");
                    work.extend(source.ids());
                }
            }
            for fid in work {
                self.enqueue(layer.id, fid);
            }
        }

        let desired: Vec<PrimitiveCollectionId> = flat
            .iter()
            .filter_map(|l| self.layers.get(&l.id).map(|e| e.collection))
            .collect();
        let collections = ctx.scene.primitives_mut();
        if order_differs(&collections.ids(), &desired) {
            for id in &desired {
                collections.raise_to_top(*id);
            }
            report.updated += 1;
        }
    }

    fn drain(&mut self, ctx: &mut SyncContext<'_>, report: &mut SyncReport) {
        while let Some(&(layer, feature)) = self.queue.front() {
            if !ctx.budget.try_consume(1) {
                break;
            }
            self.queue.pop_front();
            self.queued.remove(&(layer, feature));
            self.sync_feature(ctx, layer, feature, report);
        }
    }

    fn sync_feature(
        &mut self,
        ctx: &mut SyncContext<'_>,
        layer: LayerId,
        fid: FeatureId,
        report: &mut SyncReport,
    ) {
        let map = ctx.map;
        let Some(entry) = self.layers.get_mut(&layer) else {
            return;
        };
        let Some(collection) = ctx.scene.primitives_mut().get_mut(entry.collection) else {
            return;
        };
        let feature = map
            .layer(layer)
            .and_then(|n| n.vector_source())
            .and_then(|s| s.get(fid));

        let Some(feature) = feature else {
            if let Some(old) = entry.features.remove(&fid) {
                for id in old.primitives {
                    collection.remove(id);
                }
                report.destroyed += 1;
            }
            return;
        };
        if entry
            .features
            .get(&fid)
            .is_some_and(|c| c.revision == feature.revision)
        {
            return;
        }

        let converted = match &feature.geometry {
            Some(geometry) => geometry_to_primitives(
                geometry,
                &feature.style.unwrap_or_default(),
                map.view().projection(),
            ),
            None => Ok(Vec::new()),
        };
        let previous = entry.features.remove(&fid);
        let had_primitives = previous.as_ref().is_some_and(|p| !p.primitives.is_empty());
        for id in previous.iter().flat_map(|p| p.primitives.iter()) {
            collection.remove(*id);
        }

        let primitives = match converted {
            Ok(primitives) => {
                if previous.is_some() {
                    report.updated += 1;
                } else {
                    report.created += 1;
                }
                primitives.into_iter().map(|p| collection.add(p)).collect()
            }
            Err(err) => {
                if had_primitives {
                    report.destroyed += 1;
                }
                report.skipped += 1;
                ctx.bus.warn(
                    Some(ctx.frame),
                    "feature.skipped",
                    format!("{fid} in {layer}: {err}"),
                );
                Vec::new()
            }
        };
        // Malformed features keep an empty counterpart so they are retried
        // only when they change.
        entry.features.insert(
            fid,
            FeatureCounterpart {
                primitives,
                revision: feature.revision,
            },
        );
    }
}

impl Synchronizer for VectorSynchronizer {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn synchronize(&mut self, ctx: &mut SyncContext<'_>) -> SyncReport {
        let mut report = SyncReport::default();
        match read_changes(ctx.map, &mut self.cursor) {
            None => self.reconcile_pending = true,
            Some(changes) => {
                for change in changes {
                    match change {
                        MapChange::FeatureAdded { layer, feature }
                        | MapChange::FeatureChanged { layer, feature }
                        | MapChange::FeatureRemoved { layer, feature } => {
                            if self.layers.contains_key(&layer) {
                                self.enqueue(layer, feature);
                            }
                        }
                        other if is_layer_change(&other) => self.reconcile_pending = true,
                        _ => {}
                    }
                }
            }
        }
        if self.reconcile_pending {
            self.reconcile_pending = false;
            self.reconcile_layers(ctx, &mut report);
        }
        self.drain(ctx, &mut report);
        report.pending = self.queue.len();

        let features: usize = self.layers.values().map(|e| e.features.len()).sum();
        ctx.metrics.set_gauge("vector.features", features as i64);
        ctx.metrics.set_gauge("vector.queued", self.queue.len() as i64);
        report
    }

    fn destroy_all(&mut self, scene: &mut Scene3d) -> usize {
        let released = self.layers.len();
        for (_, entry) in std::mem::take(&mut self.layers) {
            scene.primitives_mut().remove(entry.collection);
        }
        self.queue.clear();
        self.queued.clear();
        self.reconcile_pending = true;
        if released > 0 {
            debug!(released, "vector synchronizer cleared");
        }
        released
    }

    fn has_pending_work(&self) -> bool {
        !self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::VectorSynchronizer;
    use crate::synchronizer::Synchronizer;
    use crate::testing::{empty_map, scene, sync_once, sync_with_budget};
    use layers::{Feature, Geometry2d, LayerNode};
    use runtime::{EventBus, FrameBudget};

    fn square(offset: f64) -> Geometry2d {
        Geometry2d::Polygon(vec![vec![
            [offset, 0.0],
            [offset + 1000.0, 0.0],
            [offset + 1000.0, 1000.0],
            [offset, 1000.0],
        ]])
    }

    #[test]
    fn features_get_per_feature_primitives() {
        let mut map = empty_map();
        let layer = map.add_layer(LayerNode::vector()).unwrap();
        let point = map
            .add_feature(layer, Feature::new(Geometry2d::Point([10.0, 10.0])))
            .unwrap();
        let area = map.add_feature(layer, Feature::new(square(0.0))).unwrap();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = VectorSynchronizer::new(&map);

        let report = sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!(report.created, 3);
        assert_eq!(scene.primitives().primitive_count(), 2);
        assert_eq!(sync.primitives_of(layer, point).len(), 1);

        // Changing one feature leaves the other's primitive alone.
        let kept = sync.primitives_of(layer, area).to_vec();
        map.set_feature_geometry(point, Some(Geometry2d::Point([20.0, 20.0])))
            .unwrap();
        let report = sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!((report.created, report.updated), (0, 1));
        assert_eq!(sync.primitives_of(layer, area), kept.as_slice());

        map.remove_feature(point).unwrap();
        let report = sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!(report.destroyed, 1);
        assert_eq!(scene.primitives().primitive_count(), 1);
    }

    #[test]
    fn malformed_feature_is_skipped_and_reported() {
        let mut map = empty_map();
        let layer = map.add_layer(LayerNode::vector()).unwrap();
        map.add_feature(layer, Feature::new(Geometry2d::LineString(vec![[0.0, 0.0]])))
            .unwrap();
        map.add_feature(layer, Feature::new(Geometry2d::Point([0.0, 0.0])))
            .unwrap();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = VectorSynchronizer::new(&map);

        let report = sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!(report.skipped, 1);
        assert_eq!(scene.primitives().primitive_count(), 1);
        assert_eq!(bus.count_kind("feature.skipped"), 1);

        // Not retried until it changes.
        map.set_opacity(layer, 0.5).unwrap();
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!(bus.count_kind("feature.skipped"), 1);
    }

    #[test]
    fn large_layers_converge_over_several_frames() {
        let mut map = empty_map();
        let layer = map.add_layer(LayerNode::vector()).unwrap();
        for i in 0..10 {
            map.add_feature(layer, Feature::new(Geometry2d::Point([f64::from(i), 0.0])))
                .unwrap();
        }
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = VectorSynchronizer::new(&map);

        let report = sync_with_budget(&mut sync, &map, &mut scene, &mut bus, FrameBudget::new(4));
        assert_eq!(report.pending, 6);
        assert!(sync.has_pending_work());
        sync_with_budget(&mut sync, &map, &mut scene, &mut bus, FrameBudget::new(4));
        let report = sync_with_budget(&mut sync, &map, &mut scene, &mut bus, FrameBudget::new(4));
        assert_eq!(report.pending, 0);
        assert_eq!(scene.primitives().primitive_count(), 10);
    }

    #[test]
    fn hidden_layer_is_not_materialized_until_shown() {
        let mut map = empty_map();
        let layer = map
            .add_layer(LayerNode::vector().with_visible(false))
            .unwrap();
        map.add_feature(layer, Feature::new(Geometry2d::Point([0.0, 0.0])))
            .unwrap();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = VectorSynchronizer::new(&map);

        sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert!(sync.collection(layer).is_none());
        map.set_visible(layer, true).unwrap();
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert_eq!(scene.primitives().primitive_count(), 1);

        map.set_visible(layer, false).unwrap();
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        let collection = sync.collection(layer).unwrap();
        assert!(!scene.primitives().get(collection).unwrap().show);
    }

    #[test]
    fn repeated_synchronize_is_idempotent() {
        let mut map = empty_map();
        let layer = map.add_layer(LayerNode::vector()).unwrap();
        map.add_feature(layer, Feature::new(square(0.0))).unwrap();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = VectorSynchronizer::new(&map);
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        let report = sync_once(&mut sync, &map, &mut scene, &mut bus);
        assert!(!report.changed());
        assert_eq!(scene.primitives().primitive_count(), 1);
    }

    #[test]
    fn destroy_all_after_churn_leaves_nothing() {
        let mut map = empty_map();
        let a = map.add_layer(LayerNode::vector()).unwrap();
        let b = map.add_layer(LayerNode::vector()).unwrap();
        map.add_feature(a, Feature::new(square(0.0))).unwrap();
        map.add_feature(b, Feature::new(square(5000.0))).unwrap();
        let mut scene = scene();
        let mut bus = EventBus::new();
        let mut sync = VectorSynchronizer::new(&map);
        sync_once(&mut sync, &map, &mut scene, &mut bus);
        map.remove_layer(a).unwrap();
        let c = map.add_layer(LayerNode::vector()).unwrap();
        map.add_feature(c, Feature::new(Geometry2d::Point([1.0, 1.0])))
            .unwrap();
        sync_once(&mut sync, &map, &mut scene, &mut bus);

        assert_eq!(sync.destroy_all(&mut scene), 2);
        assert_eq!(sync.destroy_all(&mut scene), 0);
        assert!(scene.primitives().is_empty());
    }
}
