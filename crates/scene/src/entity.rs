use std::collections::BTreeMap;

use foundation::define_id;
use foundation::math::Vec3;

define_id!(EntityId);
define_id!(DataSourceId);

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PointGraphics {
    pub pixel_size: f32,
    pub color: [f32; 4],
}

/// A scene object with an optional ECEF position.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: Option<String>,
    pub position: Option<Vec3>,
    pub point: Option<PointGraphics>,
    pub show: bool,
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            name: None,
            position: None,
            point: None,
            show: true,
        }
    }
}

impl Entity {
    pub fn at(position: Vec3) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn with_point(mut self, point: PointGraphics) -> Self {
        self.point = Some(point);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A named set of entities.
#[derive(Debug, Clone, Default)]
pub struct DataSource {
    pub name: String,
    pub show: bool,
    pub(crate) entities: BTreeMap<EntityId, Entity>,
}

impl DataSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            show: true,
            entities: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> + '_ {
        self.entities.iter().map(|(id, e)| (*id, e))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Data sources added on top of the display's default one, in add order.
#[derive(Debug, Clone, Default)]
pub struct DataSourceCollection {
    pub(crate) sources: Vec<(DataSourceId, DataSource)>,
}

impl DataSourceCollection {
    pub fn get(&self, id: DataSourceId) -> Option<&DataSource> {
        self.sources.iter().find(|(sid, _)| *sid == id).map(|(_, s)| s)
    }

    pub(crate) fn get_mut(&mut self, id: DataSourceId) -> Option<&mut DataSource> {
        self.sources
            .iter_mut()
            .find(|(sid, _)| *sid == id)
            .map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DataSourceId, &DataSource)> + '_ {
        self.sources.iter().map(|(id, s)| (*id, s))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
