use std::collections::{BTreeMap, BTreeSet};

use foundation::ids::IdAllocator;
use foundation::math::Vec3;
use foundation::time::Time;

use crate::entity::{DataSource, DataSourceCollection, DataSourceId, Entity, EntityId};
use crate::scene::SceneError;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BoundingFailure {
    MissingEntity,
    NoPosition,
}

/// Answer of [`DataSourceDisplay::bounding_sphere`] at one instant.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BoundingSphereQuery {
    /// The entity has not been visualized yet.
    Pending,
    Ready(BoundingSphere),
    Failed(BoundingFailure),
}

/// Visualizes entities of the default data source and of every added data
/// source. Entities become measurable only after an [`update`] has seen them.
///
/// [`update`]: DataSourceDisplay::update
#[derive(Debug, Clone)]
pub struct DataSourceDisplay {
    ids: IdAllocator,
    default_source: DataSource,
    collection: DataSourceCollection,
    /// Which source owns each entity; `None` is the default source.
    index: BTreeMap<EntityId, Option<DataSourceId>>,
    visualized: BTreeSet<EntityId>,
    last_update: Option<Time>,
}

impl Default for DataSourceDisplay {
    fn default() -> Self {
        Self {
            ids: IdAllocator::new(),
            default_source: DataSource::new("default"),
            collection: DataSourceCollection::default(),
            index: BTreeMap::new(),
            visualized: BTreeSet::new(),
            last_update: None,
        }
    }
}

impl DataSourceDisplay {
    pub fn default_data_source(&self) -> &DataSource {
        &self.default_source
    }

    pub fn data_sources(&self) -> &DataSourceCollection {
        &self.collection
    }

    pub fn add_data_source(&mut self, source: DataSource) -> DataSourceId {
        let id = DataSourceId(self.ids.next_raw());
        let mut source = source;
        // Entities carried in get display-wide ids.
        let carried = std::mem::take(&mut source.entities);
        for (_, entity) in carried {
            let eid = EntityId(self.ids.next_raw());
            source.entities.insert(eid, entity);
            self.index.insert(eid, Some(id));
        }
        self.collection.sources.push((id, source));
        id
    }

    pub fn remove_data_source(&mut self, id: DataSourceId) -> Option<DataSource> {
        let index = self.collection.sources.iter().position(|(sid, _)| *sid == id)?;
        let (_, source) = self.collection.sources.remove(index);
        for eid in source.entities.keys() {
            self.index.remove(eid);
            self.visualized.remove(eid);
        }
        Some(source)
    }

    /// Adds `entity` to `target`, or to the default source when `None`.
    pub fn add_entity(
        &mut self,
        target: Option<DataSourceId>,
        entity: Entity,
    ) -> Result<EntityId, SceneError> {
        let eid = EntityId(self.ids.next_raw());
        let source = match target {
            None => &mut self.default_source,
            Some(id) => self
                .collection
                .get_mut(id)
                .ok_or(SceneError::UnknownDataSource(id))?,
        };
        source.entities.insert(eid, entity);
        self.index.insert(eid, target);
        Ok(eid)
    }

    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let owner = self.index.remove(&id)?;
        self.visualized.remove(&id);
        self.source_mut(owner)?.entities.remove(&id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.lookup(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let owner = *self.index.get(&id)?;
        self.source_mut(owner)?.entities.get_mut(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.index.len()
    }

    /// Visualizes every known entity. Returns true when nothing is left
    /// pending.
    pub fn update(&mut self, time: Time) -> bool {
        self.visualized.extend(self.index.keys().copied());
        self.last_update = Some(time);
        self.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.visualized.len() == self.index.len()
    }

    pub fn last_update(&self) -> Option<Time> {
        self.last_update
    }

    pub fn bounding_sphere(&self, id: EntityId) -> BoundingSphereQuery {
        let Some(entity) = self.lookup(id) else {
            return BoundingSphereQuery::Failed(BoundingFailure::MissingEntity);
        };
        if !self.visualized.contains(&id) {
            return BoundingSphereQuery::Pending;
        }
        match entity.position {
            // Point graphics are sized in pixels, so the sphere has no extent.
            Some(center) => BoundingSphereQuery::Ready(BoundingSphere {
                center,
                radius: 0.0,
            }),
            None => BoundingSphereQuery::Failed(BoundingFailure::NoPosition),
        }
    }

    pub fn clear(&mut self) {
        self.default_source.entities.clear();
        self.collection.sources.clear();
        self.index.clear();
        self.visualized.clear();
    }

    fn lookup(&self, id: EntityId) -> Option<&Entity> {
        match *self.index.get(&id)? {
            None => self.default_source.get(id),
            Some(owner) => self.collection.get(owner)?.get(id),
        }
    }

    fn source_mut(&mut self, owner: Option<DataSourceId>) -> Option<&mut DataSource> {
        match owner {
            None => Some(&mut self.default_source),
            Some(id) => self.collection.get_mut(id),
        }
    }
}
