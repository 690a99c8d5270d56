use std::collections::BTreeMap;

use foundation::define_id;
use foundation::ids::IdAllocator;
use foundation::math::Vec3;

define_id!(PrimitiveCollectionId);
define_id!(PrimitiveId);

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Point {
        position: Vec3,
        color: [f32; 4],
        pixel_size: f32,
    },
    Polyline {
        positions: Vec<Vec3>,
        color: [f32; 4],
        width: f32,
    },
    /// Triangulated surface in ECEF with its outline rings.
    Polygon {
        positions: Vec<Vec3>,
        indices: Vec<u32>,
        fill: [f32; 4],
        outline: Vec<Vec<Vec3>>,
        outline_color: [f32; 4],
    },
}

impl Primitive {
    pub fn kind(&self) -> &'static str {
        match self {
            Primitive::Point { .. } => "point",
            Primitive::Polyline { .. } => "polyline",
            Primitive::Polygon { .. } => "polygon",
        }
    }
}

/// A group of primitives drawn together, with collection-wide show/alpha.
#[derive(Debug, Clone)]
pub struct PrimitiveCollection {
    pub id: PrimitiveCollectionId,
    pub show: bool,
    pub alpha: f64,
    ids: IdAllocator,
    items: BTreeMap<PrimitiveId, Primitive>,
}

impl PrimitiveCollection {
    fn new(id: PrimitiveCollectionId) -> Self {
        Self {
            id,
            show: true,
            alpha: 1.0,
            ids: IdAllocator::new(),
            items: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, primitive: Primitive) -> PrimitiveId {
        let id = PrimitiveId(self.ids.next_raw());
        self.items.insert(id, primitive);
        id
    }

    pub fn replace(&mut self, id: PrimitiveId, primitive: Primitive) -> bool {
        match self.items.get_mut(&id) {
            Some(slot) => {
                *slot = primitive;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: PrimitiveId) -> Option<Primitive> {
        self.items.remove(&id)
    }

    pub fn get(&self, id: PrimitiveId) -> Option<&Primitive> {
        self.items.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PrimitiveId, &Primitive)> + '_ {
        self.items.iter().map(|(id, p)| (*id, p))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Primitive collections in draw order, bottom to top.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveCollections {
    ids: IdAllocator,
    collections: Vec<PrimitiveCollection>,
}

impl PrimitiveCollections {
    pub fn add(&mut self) -> PrimitiveCollectionId {
        let id = PrimitiveCollectionId(self.ids.next_raw());
        self.collections.push(PrimitiveCollection::new(id));
        id
    }

    pub fn remove(&mut self, id: PrimitiveCollectionId) -> Option<PrimitiveCollection> {
        let index = self.index_of(id)?;
        Some(self.collections.remove(index))
    }

    pub fn get(&self, id: PrimitiveCollectionId) -> Option<&PrimitiveCollection> {
        self.collections.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: PrimitiveCollectionId) -> Option<&mut PrimitiveCollection> {
        self.collections.iter_mut().find(|c| c.id == id)
    }

    pub fn index_of(&self, id: PrimitiveCollectionId) -> Option<usize> {
        self.collections.iter().position(|c| c.id == id)
    }

    pub fn raise_to_top(&mut self, id: PrimitiveCollectionId) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let collection = self.collections.remove(index);
        self.collections.push(collection);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrimitiveCollection> + '_ {
        self.collections.iter()
    }

    pub fn ids(&self) -> Vec<PrimitiveCollectionId> {
        self.collections.iter().map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Primitives across every collection.
    pub fn primitive_count(&self) -> usize {
        self.collections.iter().map(PrimitiveCollection::len).sum()
    }

    pub fn clear(&mut self) {
        self.collections.clear();
    }
}
