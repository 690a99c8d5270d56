pub const DEFAULT_TILES_PER_RENDER: u32 = 8;

/// Tile-load bookkeeping of the globe surface. Loading itself is external;
/// each render completes at most `tiles_per_render` pending loads.
#[derive(Debug, Clone, PartialEq)]
pub struct Globe {
    pub show: bool,
    pending_tiles: u32,
    loaded_tiles: u64,
    tiles_per_render: u32,
}

impl Default for Globe {
    fn default() -> Self {
        Self {
            show: true,
            pending_tiles: 0,
            loaded_tiles: 0,
            tiles_per_render: DEFAULT_TILES_PER_RENDER,
        }
    }
}

impl Globe {
    pub fn with_tiles_per_render(tiles_per_render: u32) -> Self {
        Self {
            tiles_per_render: tiles_per_render.max(1),
            ..Self::default()
        }
    }

    pub fn request_tiles(&mut self, count: u32) {
        self.pending_tiles = self.pending_tiles.saturating_add(count);
    }

    pub fn pending_tiles(&self) -> u32 {
        self.pending_tiles
    }

    pub fn loaded_tiles(&self) -> u64 {
        self.loaded_tiles
    }

    pub fn tiles_loaded(&self) -> bool {
        self.pending_tiles == 0
    }

    /// Completes up to `tiles_per_render` loads; returns how many.
    pub(crate) fn advance(&mut self) -> u32 {
        let n = self.pending_tiles.min(self.tiles_per_render);
        self.pending_tiles -= n;
        self.loaded_tiles += u64::from(n);
        n
    }

    /// Drops in-flight loads; returns how many were dropped.
    pub fn cancel_pending(&mut self) -> u32 {
        std::mem::take(&mut self.pending_tiles)
    }
}

#[cfg(test)]
mod tests {
    use super::Globe;

    #[test]
    fn advance_is_bounded_per_render() {
        let mut globe = Globe::with_tiles_per_render(3);
        globe.request_tiles(7);
        assert_eq!(globe.advance(), 3);
        assert_eq!(globe.advance(), 3);
        assert!(!globe.tiles_loaded());
        assert_eq!(globe.advance(), 1);
        assert!(globe.tiles_loaded());
        assert_eq!(globe.loaded_tiles(), 7);
    }

    #[test]
    fn cancel_drops_pending() {
        let mut globe = Globe::default();
        globe.request_tiles(5);
        assert_eq!(globe.cancel_pending(), 5);
        assert!(globe.tiles_loaded());
        assert_eq!(globe.loaded_tiles(), 0);
    }
}
