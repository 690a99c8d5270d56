use std::collections::BTreeMap;

use foundation::define_id;

use crate::symbology::FeatureStyle;

define_id!(FeatureId);

/// Feature geometry in view projection units.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry2d {
    Point([f64; 2]),
    MultiPoint(Vec<[f64; 2]>),
    LineString(Vec<[f64; 2]>),
    MultiLineString(Vec<Vec<[f64; 2]>>),
    /// Exterior ring first, then holes. Rings may or may not repeat the
    /// first vertex at the end.
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl Geometry2d {
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry2d::Point(_) => "Point",
            Geometry2d::MultiPoint(_) => "MultiPoint",
            Geometry2d::LineString(_) => "LineString",
            Geometry2d::MultiLineString(_) => "MultiLineString",
            Geometry2d::Polygon(_) => "Polygon",
        }
    }

    pub fn as_point(&self) -> Option<[f64; 2]> {
        match self {
            Geometry2d::Point(p) => Some(*p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry2d>,
    /// `None` uses the layer default.
    pub style: Option<FeatureStyle>,
    /// Bumped by every geometry or style change.
    pub revision: u64,
}

impl Feature {
    pub fn new(geometry: Geometry2d) -> Self {
        Self {
            geometry: Some(geometry),
            style: None,
            revision: 0,
        }
    }

    pub fn empty() -> Self {
        Self {
            geometry: None,
            style: None,
            revision: 0,
        }
    }

    pub fn with_style(mut self, style: FeatureStyle) -> Self {
        self.style = Some(style);
        self
    }
}

/// Features of one vector layer, keyed by stable identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorSource {
    pub(crate) features: BTreeMap<FeatureId, Feature>,
}

impl VectorSource {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, &Feature)> + '_ {
        self.features.iter().map(|(id, f)| (*id, f))
    }

    pub fn ids(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.features.keys().copied()
    }
}
