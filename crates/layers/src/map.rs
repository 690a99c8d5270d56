use std::collections::BTreeMap;

use foundation::bounds::Aabb2;
use foundation::ids::IdAllocator;

use crate::changes::{ChangeBatch, ChangeCursor, ChangeLog, LayerProperty, MapChange};
use crate::layer::{FlatLayer, LayerContent, LayerId, LayerNode};
use crate::overlay::{Overlay, OverlayId, Positioning};
use crate::raster::TileSource;
use crate::symbology::FeatureStyle;
use crate::vector::{Feature, FeatureId, Geometry2d};
use crate::view::View2d;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("view center {0:?} is not finite")]
    InvalidCenter([f64; 2]),
    #[error("resolution must be finite and positive, got {0}")]
    InvalidResolution(f64),
    #[error("rotation must be finite, got {0}")]
    InvalidRotation(f64),
    #[error("unknown layer {0}")]
    UnknownLayer(LayerId),
    #[error("{0} is not a group layer")]
    NotAGroup(LayerId),
    #[error("{0} is not a tile layer")]
    NotATileLayer(LayerId),
    #[error("{0} is not a vector layer")]
    NotAVectorLayer(LayerId),
    #[error("cannot move {0} into its own subtree")]
    Cycle(LayerId),
    #[error("the root group cannot be removed or moved")]
    RootLayer,
    #[error("extent is inverted or not finite")]
    InvalidExtent,
    #[error("unknown feature {0}")]
    UnknownFeature(FeatureId),
    #[error("unknown overlay {0}")]
    UnknownOverlay(OverlayId),
}

/// The 2D map: a view, a layer tree rooted in a group, and overlays.
///
/// Every effective mutation is appended to the change log; setting a value
/// to what it already is records nothing.
#[derive(Debug, Clone)]
pub struct Map2d {
    ids: IdAllocator,
    view: View2d,
    root: LayerId,
    layers: BTreeMap<LayerId, LayerNode>,
    parents: BTreeMap<LayerId, LayerId>,
    feature_index: BTreeMap<FeatureId, LayerId>,
    overlays: BTreeMap<OverlayId, Overlay>,
    changes: ChangeLog,
    interactions_active: bool,
}

impl Map2d {
    pub fn new(view: View2d) -> Self {
        Self::with_change_log(view, ChangeLog::default())
    }

    pub fn with_change_log(view: View2d, changes: ChangeLog) -> Self {
        let mut ids = IdAllocator::new();
        let root = LayerId(ids.next_raw());
        let mut layers = BTreeMap::new();
        layers.insert(root, LayerNode::group().named("root"));
        Self {
            ids,
            view,
            root,
            layers,
            parents: BTreeMap::new(),
            feature_index: BTreeMap::new(),
            overlays: BTreeMap::new(),
            changes,
            interactions_active: true,
        }
    }

    pub fn view(&self) -> &View2d {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut View2d {
        &mut self.view
    }

    pub fn root(&self) -> LayerId {
        self.root
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerNode> {
        self.layers.get(&id)
    }

    pub fn parent(&self, id: LayerId) -> Option<LayerId> {
        self.parents.get(&id).copied()
    }

    /// Number of layers, groups included, root excluded.
    pub fn layer_count(&self) -> usize {
        self.layers.len() - 1
    }

    // ---- layer tree ----

    /// Adds `node` on top of the root group.
    pub fn add_layer(&mut self, node: LayerNode) -> Result<LayerId, MapError> {
        self.add_layer_to(self.root, node)
    }

    /// Adds `node` on top of the group `parent`.
    pub fn add_layer_to(&mut self, parent: LayerId, node: LayerNode) -> Result<LayerId, MapError> {
        let index = self
            .children_of(parent)
            .ok_or_else(|| self.not_a_group(parent))?
            .len();
        self.insert_layer(parent, index, node)
    }

    /// Inserts `node` at `index` (clamped) among `parent`'s children, 0 being
    /// the bottom.
    pub fn insert_layer(
        &mut self,
        parent: LayerId,
        index: usize,
        node: LayerNode,
    ) -> Result<LayerId, MapError> {
        if self.children_of(parent).is_none() {
            return Err(self.not_a_group(parent));
        }
        if let Some(extent) = node.props.extent
            && !extent.is_valid()
        {
            return Err(MapError::InvalidExtent);
        }

        let id = LayerId(self.ids.next_raw());
        let mut node = node;
        // Features carried in by a prebuilt vector source get fresh ids.
        if let LayerContent::Vector(source) = &mut node.content {
            let carried = std::mem::take(&mut source.features);
            for (_, feature) in carried {
                let fid = FeatureId(self.ids.next_raw());
                source.features.insert(fid, feature);
                self.feature_index.insert(fid, id);
            }
        }

        self.layers.insert(id, node);
        self.parents.insert(id, parent);
        if let Some(children) = self.children_of_mut(parent) {
            let index = index.min(children.len());
            children.insert(index, id);
        }
        self.changes.push(MapChange::LayerAdded(id));
        Ok(id)
    }

    /// Removes `id` and its whole subtree, returning the detached node.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<LayerNode, MapError> {
        if id == self.root {
            return Err(MapError::RootLayer);
        }
        let parent = self.parent(id).ok_or(MapError::UnknownLayer(id))?;
        if let Some(children) = self.children_of_mut(parent) {
            children.retain(|c| *c != id);
        }

        let mut removed = None;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.layers.remove(&current) else {
                continue;
            };
            self.parents.remove(&current);
            match &node.content {
                LayerContent::Group(children) => stack.extend(children.iter().copied()),
                LayerContent::Vector(source) => {
                    for fid in source.features.keys() {
                        self.feature_index.remove(fid);
                    }
                }
                LayerContent::Tile(_) => {}
            }
            self.changes.push(MapChange::LayerRemoved(current));
            if current == id {
                removed = Some(node);
            }
        }
        removed.ok_or(MapError::UnknownLayer(id))
    }

    /// Moves `id` to `index` (clamped) among `new_parent`'s children.
    pub fn move_layer(
        &mut self,
        id: LayerId,
        new_parent: LayerId,
        index: usize,
    ) -> Result<(), MapError> {
        if id == self.root {
            return Err(MapError::RootLayer);
        }
        let old_parent = self.parent(id).ok_or(MapError::UnknownLayer(id))?;
        if self.children_of(new_parent).is_none() {
            return Err(self.not_a_group(new_parent));
        }
        let mut ancestor = Some(new_parent);
        while let Some(a) = ancestor {
            if a == id {
                return Err(MapError::Cycle(id));
            }
            ancestor = self.parent(a);
        }

        let old_index = self
            .children_of(old_parent)
            .and_then(|c| c.iter().position(|x| *x == id));
        if let Some(children) = self.children_of_mut(old_parent) {
            children.retain(|c| *c != id);
        }
        let Some(children) = self.children_of_mut(new_parent) else {
            return Err(MapError::NotAGroup(new_parent));
        };
        let index = index.min(children.len());
        children.insert(index, id);
        self.parents.insert(id, new_parent);

        if old_parent != new_parent || old_index != Some(index) {
            self.changes.push(MapChange::LayerMoved(id));
        }
        Ok(())
    }

    pub fn set_visible(&mut self, id: LayerId, visible: bool) -> Result<(), MapError> {
        let node = self.layer_mut(id)?;
        if node.props.visible != visible {
            node.props.visible = visible;
            self.layer_changed(id, LayerProperty::Visible);
        }
        Ok(())
    }

    /// Clamped into `[0, 1]`; non-finite values are ignored.
    pub fn set_opacity(&mut self, id: LayerId, opacity: f64) -> Result<(), MapError> {
        let node = self.layer_mut(id)?;
        if !opacity.is_finite() {
            return Ok(());
        }
        let opacity = opacity.clamp(0.0, 1.0);
        if node.props.opacity != opacity {
            node.props.opacity = opacity;
            self.layer_changed(id, LayerProperty::Opacity);
        }
        Ok(())
    }

    pub fn set_z_index(&mut self, id: LayerId, z_index: Option<i32>) -> Result<(), MapError> {
        let node = self.layer_mut(id)?;
        if node.props.z_index != z_index {
            node.props.z_index = z_index;
            self.layer_changed(id, LayerProperty::ZIndex);
        }
        Ok(())
    }

    pub fn set_extent(&mut self, id: LayerId, extent: Option<Aabb2>) -> Result<(), MapError> {
        if let Some(e) = extent
            && !e.is_valid()
        {
            return Err(MapError::InvalidExtent);
        }
        let node = self.layer_mut(id)?;
        if node.props.extent != extent {
            node.props.extent = extent;
            self.layer_changed(id, LayerProperty::Extent);
        }
        Ok(())
    }

    /// Replaces the tile source. The new source's revision continues from
    /// the old one so observers always see it increase.
    pub fn set_tile_source(&mut self, id: LayerId, source: TileSource) -> Result<(), MapError> {
        let node = self.layer_mut(id)?;
        let LayerContent::Tile(current) = &mut node.content else {
            return Err(MapError::NotATileLayer(id));
        };
        if current.kind == source.kind {
            return Ok(());
        }
        let revision = current.revision.max(source.revision) + 1;
        *current = TileSource { revision, ..source };
        self.layer_changed(id, LayerProperty::Source);
        Ok(())
    }

    /// Invalidates cached tiles of a tile layer.
    pub fn refresh_source(&mut self, id: LayerId) -> Result<(), MapError> {
        let node = self.layer_mut(id)?;
        let LayerContent::Tile(current) = &mut node.content else {
            return Err(MapError::NotATileLayer(id));
        };
        current.revision += 1;
        self.layer_changed(id, LayerProperty::Source);
        Ok(())
    }

    // ---- features ----

    pub fn add_feature(&mut self, layer: LayerId, feature: Feature) -> Result<FeatureId, MapError> {
        let fid = FeatureId(self.ids.next_raw());
        let node = self.layer_mut(layer)?;
        let LayerContent::Vector(source) = &mut node.content else {
            return Err(MapError::NotAVectorLayer(layer));
        };
        source.features.insert(fid, feature);
        self.feature_index.insert(fid, layer);
        self.changes.push(MapChange::FeatureAdded {
            layer,
            feature: fid,
        });
        Ok(fid)
    }

    pub fn remove_feature(&mut self, fid: FeatureId) -> Result<Feature, MapError> {
        let layer = self.feature_layer(fid).ok_or(MapError::UnknownFeature(fid))?;
        let feature = self
            .vector_features_mut(layer)
            .and_then(|features| features.remove(&fid))
            .ok_or(MapError::UnknownFeature(fid))?;
        self.feature_index.remove(&fid);
        self.changes.push(MapChange::FeatureRemoved {
            layer,
            feature: fid,
        });
        Ok(feature)
    }

    pub fn set_feature_geometry(
        &mut self,
        fid: FeatureId,
        geometry: Option<Geometry2d>,
    ) -> Result<(), MapError> {
        self.update_feature(fid, |f| {
            if f.geometry == geometry {
                return false;
            }
            f.geometry = geometry;
            true
        })
    }

    pub fn set_feature_style(
        &mut self,
        fid: FeatureId,
        style: Option<FeatureStyle>,
    ) -> Result<(), MapError> {
        self.update_feature(fid, |f| {
            if f.style == style {
                return false;
            }
            f.style = style;
            true
        })
    }

    pub fn feature(&self, fid: FeatureId) -> Option<&Feature> {
        let layer = self.feature_layer(fid)?;
        self.layer(layer)?.vector_source()?.get(fid)
    }

    /// The vector layer currently holding `fid`.
    pub fn feature_layer(&self, fid: FeatureId) -> Option<LayerId> {
        self.feature_index.get(&fid).copied()
    }

    // ---- overlays ----

    pub fn add_overlay(&mut self, overlay: Overlay) -> OverlayId {
        let id = OverlayId(self.ids.next_raw());
        self.overlays.insert(id, overlay);
        self.changes.push(MapChange::OverlayAdded(id));
        id
    }

    pub fn remove_overlay(&mut self, id: OverlayId) -> Result<Overlay, MapError> {
        let overlay = self.overlays.remove(&id).ok_or(MapError::UnknownOverlay(id))?;
        self.changes.push(MapChange::OverlayRemoved(id));
        Ok(overlay)
    }

    pub fn set_overlay_position(
        &mut self,
        id: OverlayId,
        position: Option<[f64; 2]>,
    ) -> Result<(), MapError> {
        let overlay = self
            .overlays
            .get_mut(&id)
            .ok_or(MapError::UnknownOverlay(id))?;
        if overlay.position != position {
            overlay.position = position;
            self.changes.push(MapChange::OverlayChanged(id));
        }
        Ok(())
    }

    pub fn set_overlay_positioning(
        &mut self,
        id: OverlayId,
        positioning: Positioning,
    ) -> Result<(), MapError> {
        let overlay = self
            .overlays
            .get_mut(&id)
            .ok_or(MapError::UnknownOverlay(id))?;
        if overlay.positioning != positioning {
            overlay.positioning = positioning;
            self.changes.push(MapChange::OverlayChanged(id));
        }
        Ok(())
    }

    pub fn set_overlay_size(&mut self, id: OverlayId, size: [f64; 2]) -> Result<(), MapError> {
        let overlay = self
            .overlays
            .get_mut(&id)
            .ok_or(MapError::UnknownOverlay(id))?;
        if overlay.size != size {
            overlay.size = size;
            self.changes.push(MapChange::OverlayChanged(id));
        }
        Ok(())
    }

    pub fn overlay(&self, id: OverlayId) -> Option<&Overlay> {
        self.overlays.get(&id)
    }

    pub fn overlays(&self) -> impl Iterator<Item = (OverlayId, &Overlay)> + '_ {
        self.overlays.iter().map(|(id, o)| (*id, o))
    }

    // ---- observation ----

    /// Leaf layers bottom to top: depth-first, groups flattened, then a
    /// stable sort by z-index.
    ///
    /// A layer without a z-index inherits its closest ancestor's (0 at the
    /// root). Extents inherit the same way.
    pub fn flatten(&self) -> Vec<FlatLayer> {
        struct Pending {
            id: LayerId,
            visible: bool,
            opacity: f64,
            z_index: i32,
            extent: Option<Aabb2>,
        }

        let mut out = Vec::new();
        let Some(root) = self.layers.get(&self.root) else {
            return out;
        };
        let mut stack = Vec::new();
        let push_children = |stack: &mut Vec<Pending>, parent: &Pending, children: &[LayerId]| {
            // Reverse so the bottom-most child is popped first.
            for child in children.iter().rev() {
                let Some(node) = self.layers.get(child) else {
                    continue;
                };
                let props = node.props();
                stack.push(Pending {
                    id: *child,
                    visible: parent.visible && props.visible,
                    opacity: parent.opacity * props.opacity,
                    z_index: props.z_index.unwrap_or(parent.z_index),
                    extent: props.extent.or(parent.extent),
                });
            }
        };

        let root_state = Pending {
            id: self.root,
            visible: root.props.visible,
            opacity: root.props.opacity,
            z_index: root.props.z_index.unwrap_or(0),
            extent: root.props.extent,
        };
        if let Some(children) = root.children() {
            push_children(&mut stack, &root_state, children);
        }

        while let Some(current) = stack.pop() {
            let Some(node) = self.layers.get(&current.id) else {
                continue;
            };
            match node.children() {
                Some(children) => push_children(&mut stack, &current, children),
                None => out.push(FlatLayer {
                    id: current.id,
                    kind: node.kind(),
                    visible: current.visible,
                    opacity: current.opacity,
                    z_index: current.z_index,
                    extent: current.extent,
                }),
            }
        }
        out.sort_by_key(|l| l.z_index);
        out
    }

    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    /// A cursor positioned after every change recorded so far.
    pub fn subscribe(&self) -> ChangeCursor {
        self.changes.cursor()
    }

    pub fn read_changes(&self, cursor: &mut ChangeCursor) -> ChangeBatch {
        self.changes.read(cursor)
    }

    pub fn interactions_active(&self) -> bool {
        self.interactions_active
    }

    pub fn set_interactions_active(&mut self, active: bool) {
        self.interactions_active = active;
    }

    // ---- internals ----

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut LayerNode, MapError> {
        self.layers.get_mut(&id).ok_or(MapError::UnknownLayer(id))
    }

    fn layer_changed(&mut self, layer: LayerId, property: LayerProperty) {
        self.changes.push(MapChange::LayerChanged { layer, property });
    }

    fn children_of(&self, id: LayerId) -> Option<&[LayerId]> {
        self.layers.get(&id)?.children()
    }

    fn children_of_mut(&mut self, id: LayerId) -> Option<&mut Vec<LayerId>> {
        match &mut self.layers.get_mut(&id)?.content {
            LayerContent::Group(children) => Some(children),
            _ => None,
        }
    }

    fn not_a_group(&self, id: LayerId) -> MapError {
        if self.layers.contains_key(&id) {
            MapError::NotAGroup(id)
        } else {
            MapError::UnknownLayer(id)
        }
    }

    fn vector_features_mut(&mut self, layer: LayerId) -> Option<&mut BTreeMap<FeatureId, Feature>> {
        match &mut self.layers.get_mut(&layer)?.content {
            LayerContent::Vector(source) => Some(&mut source.features),
            _ => None,
        }
    }

    fn update_feature(
        &mut self,
        fid: FeatureId,
        apply: impl FnOnce(&mut Feature) -> bool,
    ) -> Result<(), MapError> {
        let layer = self.feature_layer(fid).ok_or(MapError::UnknownFeature(fid))?;
        let feature = self
            .vector_features_mut(layer)
            .and_then(|features| features.get_mut(&fid))
            .ok_or(MapError::UnknownFeature(fid))?;
        if apply(feature) {
            feature.revision += 1;
            self.changes.push(MapChange::FeatureChanged {
                layer,
                feature: fid,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Map2d, MapError};
    use crate::changes::{ChangeBatch, LayerProperty, MapChange};
    use crate::layer::{LayerKind, LayerNode};
    use crate::raster::TileSource;
    use crate::vector::{Feature, Geometry2d};
    use crate::view::View2d;
    use foundation::math::Projection;
    use pretty_assertions::assert_eq;

    fn map() -> Map2d {
        Map2d::new(View2d::new(Projection::WebMercator, [0.0, 0.0], 1000.0).unwrap())
    }

    fn osm() -> LayerNode {
        LayerNode::tile(TileSource::xyz("https://tile.example/{z}/{x}/{y}.png"))
    }

    #[test]
    fn flatten_folds_group_state() {
        let mut m = map();
        let base = m.add_layer(osm()).unwrap();
        let group = m.add_layer(LayerNode::group().with_opacity(0.5).with_visible(false)).unwrap();
        let inner = m.add_layer_to(group, LayerNode::vector().with_opacity(0.5)).unwrap();

        let flat = m.flatten();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].id, base);
        assert_eq!(flat[0].kind, LayerKind::Tile);
        assert!(flat[0].visible);
        assert_eq!(flat[1].id, inner);
        assert!(!flat[1].visible);
        assert_eq!(flat[1].opacity, 0.25);
    }

    #[test]
    fn flatten_sorts_stably_by_z_index() {
        let mut m = map();
        let a = m.add_layer(osm().with_z_index(5)).unwrap();
        let b = m.add_layer(osm()).unwrap();
        let group = m.add_layer(LayerNode::group().with_z_index(-1)).unwrap();
        let c = m.add_layer_to(group, osm()).unwrap();
        let d = m.add_layer(osm()).unwrap();

        let order: Vec<_> = m.flatten().into_iter().map(|l| l.id).collect();
        assert_eq!(order, vec![c, b, d, a]);
    }

    #[test]
    fn mutations_are_logged_once() {
        let mut m = map();
        let mut cursor = m.subscribe();
        let id = m.add_layer(osm()).unwrap();
        m.set_visible(id, true).unwrap();
        m.set_visible(id, false).unwrap();
        m.set_opacity(id, 0.3).unwrap();
        m.set_opacity(id, 0.3).unwrap();

        assert_eq!(
            m.read_changes(&mut cursor),
            ChangeBatch::Changes(vec![
                MapChange::LayerAdded(id),
                MapChange::LayerChanged {
                    layer: id,
                    property: LayerProperty::Visible
                },
                MapChange::LayerChanged {
                    layer: id,
                    property: LayerProperty::Opacity
                },
            ])
        );
    }

    #[test]
    fn removing_a_group_removes_its_subtree() {
        let mut m = map();
        let group = m.add_layer(LayerNode::group()).unwrap();
        let vector = m.add_layer_to(group, LayerNode::vector()).unwrap();
        let fid = m.add_feature(vector, Feature::new(Geometry2d::Point([1.0, 2.0]))).unwrap();
        assert_eq!(m.feature_layer(fid), Some(vector));

        m.remove_layer(group).unwrap();
        assert_eq!(m.layer_count(), 0);
        assert!(m.layer(vector).is_none());
        assert!(m.feature(fid).is_none());
        assert_eq!(m.remove_layer(group), Err(MapError::UnknownLayer(group)));
        assert_eq!(m.remove_layer(m.root()), Err(MapError::RootLayer));
    }

    #[test]
    fn move_layer_rejects_cycles_and_reorders() {
        let mut m = map();
        let a = m.add_layer(osm()).unwrap();
        let group = m.add_layer(LayerNode::group()).unwrap();
        let child = m.add_layer_to(group, LayerNode::group()).unwrap();
        assert_eq!(m.move_layer(group, child, 0), Err(MapError::Cycle(group)));

        m.move_layer(a, m.root(), 10).unwrap();
        let order: Vec<_> = m.layer(m.root()).unwrap().children().unwrap().to_vec();
        assert_eq!(order, vec![group, a]);
    }

    #[test]
    fn feature_edits_bump_revision() {
        let mut m = map();
        let layer = m.add_layer(LayerNode::vector()).unwrap();
        let fid = m.add_feature(layer, Feature::new(Geometry2d::Point([0.0, 0.0]))).unwrap();
        m.set_feature_geometry(fid, Some(Geometry2d::Point([0.0, 0.0]))).unwrap();
        assert_eq!(m.feature(fid).unwrap().revision, 0);
        m.set_feature_geometry(fid, Some(Geometry2d::Point([3.0, 0.0]))).unwrap();
        assert_eq!(m.feature(fid).unwrap().revision, 1);

        assert_eq!(
            m.add_feature(m.root(), Feature::empty()),
            Err(MapError::NotAVectorLayer(m.root()))
        );
        m.remove_feature(fid).unwrap();
        assert_eq!(m.remove_feature(fid), Err(MapError::UnknownFeature(fid)));
    }

    #[test]
    fn tile_source_revision_always_increases() {
        let mut m = map();
        let id = m.add_layer(osm()).unwrap();
        m.refresh_source(id).unwrap();
        m.set_tile_source(id, TileSource::wms("https://wms.example", "roads")).unwrap();
        assert_eq!(m.layer(id).unwrap().tile_source().unwrap().revision, 2);
    }
}
