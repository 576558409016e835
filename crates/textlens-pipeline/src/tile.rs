//! Block-tiled parallel execution for neighbourhood filters.
//!
//! Median and averaging cost `O(width * height * strength²)`, which on
//! a full-size photo takes seconds. [`TileExecutor`] splits the output
//! into square tiles of [`block_size`](TileExecutor::block_size) pixels
//! and renders each tile as one rayon task.
//!
//! Every task reads the shared, immutable input through the kernel
//! closure (its neighbourhood may reach past the tile edge) and
//! produces pixels for its own tile only. Tiles are disjoint, so the
//! stitched output is a pure function of the input and the pixel
//! coordinates: block size and scheduling order cannot change a single
//! byte of the result.

use image::Rgba;
use rayon::prelude::*;

use crate::cancel::Cancellation;
use crate::types::{CHANNELS, PipelineConfig, PipelineError, PixelBuffer};

/// A rectangular region of the output, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in pixels (at most the block size).
    pub width: u32,
    /// Height in pixels (at most the block size).
    pub height: u32,
}

impl Tile {
    const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Copy a tile's rendered samples into its region of `output`.
    fn blit(self, output: &mut PixelBuffer, samples: &[u8]) {
        let stride = output.width() as usize * CHANNELS;
        let row_len = self.width as usize * CHANNELS;
        let raw: &mut [u8] = output;
        for (row, src) in samples.chunks_exact(row_len).enumerate() {
            let start = (self.y as usize + row) * stride + self.x as usize * CHANNELS;
            raw[start..start + row_len].copy_from_slice(src);
        }
    }
}

/// Runs a per-pixel kernel over an image, one parallel task per tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileExecutor {
    block_size: u32,
}

impl Default for TileExecutor {
    fn default() -> Self {
        Self {
            block_size: PipelineConfig::DEFAULT_BLOCK_SIZE,
        }
    }
}

impl TileExecutor {
    /// Create an executor with the given tile side length.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `block_size` is zero.
    pub fn new(block_size: u32) -> Result<Self, PipelineError> {
        if block_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "block_size must be at least 1".to_owned(),
            ));
        }
        Ok(Self { block_size })
    }

    /// Build an executor from a pipeline config.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the config's block
    /// size is zero.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(config.block_size)
    }

    /// Tile side length in pixels.
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Partition a `width` x `height` image into row-major tiles.
    ///
    /// Edge tiles are truncated to the image bounds.
    pub fn tiles(&self, width: u32, height: u32) -> impl Iterator<Item = Tile> + use<> {
        let block = self.block_size;
        (0..height).step_by(block as usize).flat_map(move |y| {
            (0..width).step_by(block as usize).map(move |x| Tile {
                x,
                y,
                width: block.min(width - x),
                height: block.min(height - y),
            })
        })
    }

    /// Render every output pixel with `kernel(x, y)`.
    ///
    /// `cancel` is polled once before each tile starts. If any tile
    /// observes cancellation the partial output is dropped and
    /// [`PipelineError::Cancelled`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] when cancellation was
    /// requested before all tiles finished.
    pub fn execute<C, K>(
        &self,
        width: u32,
        height: u32,
        cancel: &C,
        kernel: K,
    ) -> Result<PixelBuffer, PipelineError>
    where
        C: Cancellation + ?Sized,
        K: Fn(u32, u32) -> Rgba<u8> + Sync,
    {
        let tiles: Vec<Tile> = self.tiles(width, height).collect();
        tracing::trace!(
            tiles = tiles.len(),
            block_size = self.block_size,
            width,
            height,
            "running tiled kernel"
        );

        let rendered: Vec<Option<(Tile, Vec<u8>)>> = tiles
            .into_par_iter()
            .map(|tile| {
                if cancel.is_cancelled() {
                    return None;
                }
                let mut samples = Vec::with_capacity(tile.pixel_count() * CHANNELS);
                for y in tile.y..tile.y + tile.height {
                    for x in tile.x..tile.x + tile.width {
                        samples.extend_from_slice(&kernel(x, y).0);
                    }
                }
                Some((tile, samples))
            })
            .collect();

        let mut output = PixelBuffer::new(width, height);
        for entry in rendered {
            let (tile, samples) = entry.ok_or(PipelineError::Cancelled)?;
            tile.blit(&mut output, &samples);
        }
        Ok(output)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::cancel::Never;

    fn coordinate_kernel(x: u32, y: u32) -> Rgba<u8> {
        Rgba([x as u8, y as u8, (x ^ y) as u8, 255])
    }

    #[test]
    fn zero_block_size_rejected() {
        assert!(matches!(
            TileExecutor::new(0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn tiles_cover_image_exactly_once() {
        let exec = TileExecutor::new(4).unwrap();
        let tiles: Vec<Tile> = exec.tiles(10, 7).collect();
        // ceil(10/4) * ceil(7/4) = 3 * 2
        assert_eq!(tiles.len(), 6);
        let covered: usize = tiles.iter().map(|t| t.pixel_count()).sum();
        assert_eq!(covered, 70);
        assert_eq!(
            tiles[2],
            Tile {
                x: 8,
                y: 0,
                width: 2,
                height: 4
            }
        );
        assert_eq!(
            tiles[5],
            Tile {
                x: 8,
                y: 4,
                width: 2,
                height: 3
            }
        );
    }

    #[test]
    fn empty_image_has_no_tiles() {
        let exec = TileExecutor::default();
        assert_eq!(exec.tiles(0, 0).count(), 0);
        let out = exec.execute(0, 0, &Never, coordinate_kernel).unwrap();
        assert_eq!(out.dimensions(), (0, 0));
    }

    #[test]
    fn every_pixel_written_at_its_coordinates() {
        let exec = TileExecutor::new(3).unwrap();
        let out = exec.execute(11, 5, &Never, coordinate_kernel).unwrap();
        for (x, y, p) in out.enumerate_pixels() {
            assert_eq!(*p, coordinate_kernel(x, y), "mismatch at ({x},{y})");
        }
    }

    #[test]
    fn output_independent_of_block_size() {
        let reference = TileExecutor::new(1)
            .unwrap()
            .execute(23, 17, &Never, coordinate_kernel)
            .unwrap();
        for block in [2, 5, 16, 100] {
            let out = TileExecutor::new(block)
                .unwrap()
                .execute(23, 17, &Never, coordinate_kernel)
                .unwrap();
            assert_eq!(out, reference, "block size {block} diverged");
        }
    }

    #[test]
    fn cancelled_before_start_returns_cancelled() {
        let flag = AtomicBool::new(true);
        let result = TileExecutor::new(2)
            .unwrap()
            .execute(8, 8, &flag, coordinate_kernel);
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn cancellation_mid_run_skips_remaining_tiles() {
        let flag = AtomicBool::new(false);
        let calls = AtomicUsize::new(0);
        let result = TileExecutor::new(1).unwrap().execute(20, 20, &flag, |x, y| {
            if calls.fetch_add(1, Ordering::SeqCst) == 10 {
                flag.store(true, Ordering::SeqCst);
            }
            coordinate_kernel(x, y)
        });
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(calls.load(Ordering::SeqCst) < 400);
    }
}
