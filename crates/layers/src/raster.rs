/// Where a tile layer's imagery comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TileSourceKind {
    /// `{z}/{x}/{y}` URL template.
    Xyz { url: String },
    Wms { url: String, layers: String },
    /// A source with no 3D imagery counterpart (canvas-rendered, custom loader).
    Custom { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileSource {
    pub kind: TileSourceKind,
    /// Bumped whenever cached tiles must be reloaded.
    pub revision: u64,
}

impl TileSource {
    pub fn new(kind: TileSourceKind) -> Self {
        Self { kind, revision: 0 }
    }

    pub fn xyz(url: impl Into<String>) -> Self {
        Self::new(TileSourceKind::Xyz { url: url.into() })
    }

    pub fn wms(url: impl Into<String>, layers: impl Into<String>) -> Self {
        Self::new(TileSourceKind::Wms {
            url: url.into(),
            layers: layers.into(),
        })
    }

    pub fn custom(name: impl Into<String>) -> Self {
        Self::new(TileSourceKind::Custom { name: name.into() })
    }

    pub fn url(&self) -> Option<&str> {
        match &self.kind {
            TileSourceKind::Xyz { url } | TileSourceKind::Wms { url, .. } => Some(url),
            TileSourceKind::Custom { .. } => None,
        }
    }
}
