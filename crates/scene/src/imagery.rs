use foundation::define_id;
use foundation::ids::IdAllocator;

define_id!(ImageryLayerId);

/// Imagery tile endpoint understood by the globe.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageryProvider {
    UrlTemplate { url: String },
    Wms { url: String, layers: String },
}

/// Geographic rectangle in radians.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rectangle {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Rectangle {
    pub fn from_degrees(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west: west.to_radians(),
            south: south.to_radians(),
            east: east.to_radians(),
            north: north.to_radians(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageryLayer {
    pub id: ImageryLayerId,
    pub provider: ImageryProvider,
    /// Fixed at creation; a different extent needs a new layer.
    rectangle: Option<Rectangle>,
    pub alpha: f64,
    pub show: bool,
    /// Bumped by [`ImageryLayerCollection::reload`].
    texture_revision: u64,
}

impl ImageryLayer {
    pub fn rectangle(&self) -> Option<Rectangle> {
        self.rectangle
    }

    pub fn texture_revision(&self) -> u64 {
        self.texture_revision
    }
}

/// Imagery layers draped on the globe, bottom to top.
#[derive(Debug, Clone, Default)]
pub struct ImageryLayerCollection {
    ids: IdAllocator,
    layers: Vec<ImageryLayer>,
}

impl ImageryLayerCollection {
    /// Adds a layer on top.
    pub fn add(&mut self, provider: ImageryProvider, rectangle: Option<Rectangle>) -> ImageryLayerId {
        let index = self.layers.len();
        self.insert(index, provider, rectangle)
    }

    /// Inserts a layer at `index` (clamped), 0 being the bottom.
    pub fn insert(
        &mut self,
        index: usize,
        provider: ImageryProvider,
        rectangle: Option<Rectangle>,
    ) -> ImageryLayerId {
        let id = ImageryLayerId(self.ids.next_raw());
        let index = index.min(self.layers.len());
        self.layers.insert(
            index,
            ImageryLayer {
                id,
                provider,
                rectangle,
                alpha: 1.0,
                show: true,
                texture_revision: 0,
            },
        );
        id
    }

    pub fn remove(&mut self, id: ImageryLayerId) -> Option<ImageryLayer> {
        let index = self.index_of(id)?;
        Some(self.layers.remove(index))
    }

    pub fn get(&self, id: ImageryLayerId) -> Option<&ImageryLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: ImageryLayerId) -> Option<&mut ImageryLayer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn index_of(&self, id: ImageryLayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn raise_to_top(&mut self, id: ImageryLayerId) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let layer = self.layers.remove(index);
        self.layers.push(layer);
        true
    }

    /// Swaps the provider in place; cached textures are invalidated.
    pub fn set_provider(&mut self, id: ImageryLayerId, provider: ImageryProvider) -> bool {
        let Some(layer) = self.get_mut(id) else {
            return false;
        };
        layer.provider = provider;
        layer.texture_revision += 1;
        true
    }

    /// Drops cached textures so tiles are fetched again.
    pub fn reload(&mut self, id: ImageryLayerId) -> bool {
        let Some(layer) = self.get_mut(id) else {
            return false;
        };
        layer.texture_revision += 1;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageryLayer> + '_ {
        self.layers.iter()
    }

    pub fn ids(&self) -> Vec<ImageryLayerId> {
        self.layers.iter().map(|l| l.id).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{ImageryLayerCollection, ImageryProvider};

    fn provider(name: &str) -> ImageryProvider {
        ImageryProvider::UrlTemplate {
            url: format!("https://{name}/{{z}}/{{x}}/{{y}}.png"),
        }
    }

    #[test]
    fn insert_and_raise_keep_order() {
        let mut layers = ImageryLayerCollection::default();
        let a = layers.add(provider("a"), None);
        let b = layers.add(provider("b"), None);
        let c = layers.insert(0, provider("c"), None);
        assert_eq!(layers.ids(), vec![c, a, b]);

        assert!(layers.raise_to_top(c));
        assert_eq!(layers.ids(), vec![a, b, c]);
        assert_eq!(layers.index_of(b), Some(1));
    }

    #[test]
    fn reload_bumps_texture_revision() {
        let mut layers = ImageryLayerCollection::default();
        let a = layers.add(provider("a"), None);
        assert!(layers.reload(a));
        assert!(layers.set_provider(a, provider("z")));
        assert_eq!(layers.get(a).unwrap().texture_revision(), 2);

        layers.remove(a);
        assert!(!layers.reload(a));
        assert!(layers.is_empty());
    }
}
