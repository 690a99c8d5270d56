use foundation::bounds::Aabb2;
use foundation::define_id;

use crate::raster::TileSource;
use crate::vector::VectorSource;

define_id!(LayerId);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Tile,
    Vector,
    Group,
}

/// Properties shared by every node of the layer tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerProps {
    pub visible: bool,
    pub opacity: f64,
    pub z_index: Option<i32>,
    pub extent: Option<Aabb2>,
}

impl Default for LayerProps {
    fn default() -> Self {
        Self {
            visible: true,
            opacity: 1.0,
            z_index: None,
            extent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerContent {
    Tile(TileSource),
    Vector(VectorSource),
    /// Children ordered bottom to top.
    Group(Vec<LayerId>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerNode {
    pub name: Option<String>,
    pub(crate) props: LayerProps,
    pub(crate) content: LayerContent,
}

impl LayerNode {
    pub fn tile(source: TileSource) -> Self {
        Self::with_content(LayerContent::Tile(source))
    }

    pub fn vector() -> Self {
        Self::with_content(LayerContent::Vector(VectorSource::default()))
    }

    pub fn group() -> Self {
        Self::with_content(LayerContent::Group(Vec::new()))
    }

    fn with_content(content: LayerContent) -> Self {
        Self {
            name: None,
            props: LayerProps::default(),
            content,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.props.visible = visible;
        self
    }

    /// Clamped into `[0, 1]`; non-finite values fall back to fully opaque.
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.props.opacity = if opacity.is_finite() {
            opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.props.z_index = Some(z_index);
        self
    }

    pub fn with_extent(mut self, extent: Aabb2) -> Self {
        self.props.extent = Some(extent);
        self
    }

    pub fn kind(&self) -> LayerKind {
        match self.content {
            LayerContent::Tile(_) => LayerKind::Tile,
            LayerContent::Vector(_) => LayerKind::Vector,
            LayerContent::Group(_) => LayerKind::Group,
        }
    }

    pub fn props(&self) -> &LayerProps {
        &self.props
    }

    pub fn content(&self) -> &LayerContent {
        &self.content
    }

    pub fn tile_source(&self) -> Option<&TileSource> {
        match &self.content {
            LayerContent::Tile(source) => Some(source),
            _ => None,
        }
    }

    pub fn vector_source(&self) -> Option<&VectorSource> {
        match &self.content {
            LayerContent::Vector(source) => Some(source),
            _ => None,
        }
    }

    pub fn children(&self) -> Option<&[LayerId]> {
        match &self.content {
            LayerContent::Group(children) => Some(children),
            _ => None,
        }
    }
}

/// A leaf layer as seen after flattening the tree: ancestor visibility and
/// opacity folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatLayer {
    pub id: LayerId,
    pub kind: LayerKind,
    /// Own visibility AND every ancestor's.
    pub visible: bool,
    /// Own opacity times every ancestor's.
    pub opacity: f64,
    /// Own extent, or the closest ancestor's.
    pub extent: Option<Aabb2>,
    pub z_index: i32,
}
