//! JSON session scripts: the initial map, the bridge options and the
//! actions to replay at given frames.

use std::collections::BTreeMap;
use std::error::Error;

use bridge::BridgeOptions;
use foundation::math::Projection;
use layers::{
    Feature, FeatureId, Geometry2d, LayerId, LayerNode, Map2d, Overlay, Positioning, TileSource, View2d,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub options: BridgeOptions,
    #[serde(default)]
    pub projection: ProjectionSpec,
    pub view: ViewSpec,
    #[serde(default = "default_canvas")]
    pub canvas: [u32; 2],
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub overlays: Vec<OverlaySpec>,
    #[serde(default)]
    pub actions: Vec<ScriptedAction>,
}

fn default_canvas() -> [u32; 2] {
    [1024, 768]
}

fn yes() -> bool {
    true
}

fn opaque() -> f64 {
    1.0
}

#[derive(Debug, Copy, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionSpec {
    #[default]
    WebMercator,
    Geographic,
}

impl From<ProjectionSpec> for Projection {
    fn from(spec: ProjectionSpec) -> Self {
        match spec {
            ProjectionSpec::WebMercator => Projection::WebMercator,
            ProjectionSpec::Geographic => Projection::Geographic,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ViewSpec {
    pub center: [f64; 2],
    pub resolution: f64,
    #[serde(default)]
    pub rotation: f64,
}

#[derive(Debug, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default = "opaque")]
    pub opacity: f64,
    #[serde(default)]
    pub z_index: Option<i32>,
    pub source: SourceSpec,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSpec {
    Xyz { url: String },
    Wms { url: String, layers: String },
    Custom { name: String },
    Vector {
        #[serde(default)]
        features: Vec<GeometrySpec>,
    },
}

/// GeoJSON-shaped geometry in map units.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum GeometrySpec {
    Point([f64; 2]),
    MultiPoint(Vec<[f64; 2]>),
    LineString(Vec<[f64; 2]>),
    MultiLineString(Vec<Vec<[f64; 2]>>),
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl From<GeometrySpec> for Geometry2d {
    fn from(spec: GeometrySpec) -> Self {
        match spec {
            GeometrySpec::Point(p) => Geometry2d::Point(p),
            GeometrySpec::MultiPoint(ps) => Geometry2d::MultiPoint(ps),
            GeometrySpec::LineString(ps) => Geometry2d::LineString(ps),
            GeometrySpec::MultiLineString(ls) => Geometry2d::MultiLineString(ls),
            GeometrySpec::Polygon(rings) => Geometry2d::Polygon(rings),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OverlaySpec {
    pub element: String,
    #[serde(default)]
    pub position: Option<[f64; 2]>,
    #[serde(default)]
    pub offset: [f64; 2],
    #[serde(default)]
    pub positioning: PositioningSpec,
    #[serde(default)]
    pub size: [f64; 2],
}

#[derive(Debug, Copy, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositioningSpec {
    #[default]
    TopLeft,
    TopCenter,
    CenterCenter,
    BottomCenter,
    BottomLeft,
}

impl From<PositioningSpec> for Positioning {
    fn from(spec: PositioningSpec) -> Self {
        match spec {
            PositioningSpec::TopLeft => Positioning::TopLeft,
            PositioningSpec::TopCenter => Positioning::TopCenter,
            PositioningSpec::CenterCenter => Positioning::CenterCenter,
            PositioningSpec::BottomCenter => Positioning::BottomCenter,
            PositioningSpec::BottomLeft => Positioning::BottomLeft,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScriptedAction {
    pub frame: u32,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Enable,
    Disable,
    WarmUp { height: f64, timeout_ms: f64 },
    /// Follow the `index`-th feature the script added to `layer`.
    Track { layer: String, index: usize },
    Untrack,
    Tilt { tilt: f64 },
    Heading { heading: f64 },
    Distance { distance: f64 },
    Pan { center: [f64; 2] },
    Zoom { resolution: f64 },
    Show { layer: String },
    Hide { layer: String },
    Opacity { layer: String, opacity: f64 },
    RemoveLayer { layer: String },
    AddFeature { layer: String, geometry: GeometrySpec },
    RequestRender,
    Destroy,
}

/// Ids handed out while building the map, addressable by layer name.
#[derive(Debug, Default)]
pub struct Handles {
    layers: BTreeMap<String, LayerId>,
    features: BTreeMap<String, Vec<FeatureId>>,
}

impl Handles {
    pub fn layer(&self, name: &str) -> Result<LayerId, Box<dyn Error>> {
        self.layers
            .get(name)
            .copied()
            .ok_or_else(|| format!("no layer named {name:?}").into())
    }

    pub fn feature(&self, layer: &str, index: usize) -> Result<FeatureId, Box<dyn Error>> {
        self.features
            .get(layer)
            .and_then(|ids| ids.get(index))
            .copied()
            .ok_or_else(|| format!("layer {layer:?} has no feature {index}").into())
    }

    pub fn push_feature(&mut self, layer: &str, id: FeatureId) {
        self.features.entry(layer.to_string()).or_default().push(id);
    }
}

impl Session {
    pub fn from_json(text: &str) -> Result<Self, Box<dyn Error>> {
        let session: Self = serde_json::from_str(text)?;
        session.options.validate()?;
        Ok(session)
    }

    /// Builds the 2D map the script starts from.
    pub fn build_map(&self) -> Result<(Map2d, Handles), Box<dyn Error>> {
        let mut view = View2d::new(self.projection.into(), self.view.center, self.view.resolution)?;
        view.set_rotation(self.view.rotation)?;
        let mut map = Map2d::new(view);
        let mut handles = Handles::default();

        for spec in &self.layers {
            if handles.layers.contains_key(&spec.name) {
                return Err(format!("duplicate layer name {:?}", spec.name).into());
            }
            let node = match &spec.source {
                SourceSpec::Xyz { url } => LayerNode::tile(TileSource::xyz(url.as_str())),
                SourceSpec::Wms { url, layers } => {
                    LayerNode::tile(TileSource::wms(url.as_str(), layers.as_str()))
                }
                SourceSpec::Custom { name } => LayerNode::tile(TileSource::custom(name.as_str())),
                SourceSpec::Vector { .. } => LayerNode::vector(),
            };
            let mut node = node
                .named(spec.name.as_str())
                .with_visible(spec.visible)
                .with_opacity(spec.opacity);
            if let Some(z) = spec.z_index {
                node = node.with_z_index(z);
            }
            let id = map.add_layer(node)?;
            handles.layers.insert(spec.name.clone(), id);

            if let SourceSpec::Vector { features } = &spec.source {
                for geometry in features {
                    let fid = map.add_feature(id, Feature::new(geometry.clone().into()))?;
                    handles.push_feature(&spec.name, fid);
                }
            }
        }

        for spec in &self.overlays {
            let mut overlay = Overlay::new(spec.element.as_str())
                .with_offset(spec.offset)
                .with_positioning(spec.positioning.into())
                .with_size(spec.size);
            if let Some(position) = spec.position {
                overlay = overlay.at(position);
            }
            map.add_overlay(overlay);
        }
        Ok((map, handles))
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, Session};
    use layers::LayerKind;
    use pretty_assertions::assert_eq;

    const SCRIPT: &str = r#"{
        "options": { "target": "globe", "render": { "target_frame_rate": 30 } },
        "view": { "center": [0, 0], "resolution": 100 },
        "layers": [
            { "name": "osm", "source": { "type": "xyz", "url": "https://tile.example.org/{z}/{x}/{y}.png" } },
            { "name": "sites", "visible": false, "source": { "type": "vector", "features": [
                { "type": "Point", "coordinates": [1000, 2000] },
                { "type": "LineString", "coordinates": [[0, 0], [10, 10]] }
            ] } }
        ],
        "overlays": [ { "element": "popup", "position": [0, 0], "positioning": "bottom-center", "size": [120, 60] } ],
        "actions": [
            { "frame": 0, "action": "enable" },
            { "frame": 3, "action": "track", "layer": "sites", "index": 0 },
            { "frame": 9, "action": "warm_up", "height": 5000, "timeout_ms": 200 }
        ]
    }"#;

    #[test]
    fn script_builds_map_and_actions() {
        let session = Session::from_json(SCRIPT).unwrap();
        assert_eq!(session.options.render.target_frame_rate, Some(30.0));
        assert_eq!(session.actions.len(), 3);
        assert!(matches!(
            session.actions[1].action,
            Action::Track { ref layer, index: 0 } if layer == "sites"
        ));

        let (map, handles) = session.build_map().unwrap();
        let osm = handles.layer("osm").unwrap();
        let sites = handles.layer("sites").unwrap();
        assert_eq!(map.layer(osm).unwrap().kind(), LayerKind::Tile);
        assert!(!map.layer(sites).unwrap().props().visible);
        let point = handles.feature("sites", 0).unwrap();
        assert_eq!(
            map.feature(point).unwrap().geometry.as_ref().and_then(|g| g.as_point()),
            Some([1000.0, 2000.0])
        );
        assert!(handles.feature("sites", 2).is_err());
        let (_, overlay) = map.overlays().next().unwrap();
        assert_eq!(overlay.placement_shift(), [-60.0, -60.0]);
    }

    #[test]
    fn bundled_demo_session_builds() {
        let session = Session::from_json(include_str!("../sessions/demo.json")).unwrap();
        let (map, handles) = session.build_map().unwrap();
        assert_eq!(map.overlays().count(), 1);
        assert!(handles.feature("sites", 3).is_ok());
        assert!(session.actions.iter().all(|a| a.frame < 120));
    }

    #[test]
    fn invalid_options_are_rejected() {
        let script = r#"{ "options": { "render": { "resolution_scale": 2.0 } },
                          "view": { "center": [0, 0], "resolution": 1 } }"#;
        assert!(Session::from_json(script).is_err());
    }

    #[test]
    fn duplicate_layer_names_are_rejected() {
        let script = r#"{ "view": { "center": [0, 0], "resolution": 1 },
                          "layers": [
                            { "name": "a", "source": { "type": "vector" } },
                            { "name": "a", "source": { "type": "vector" } } ] }"#;
        let session = Session::from_json(script).unwrap();
        assert!(session.build_map().is_err());
    }
}
