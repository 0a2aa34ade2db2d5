use anyhow::Result;

use super::frame::{PixelFrame, CHANNELS};
use crate::video::source::VideoSource;

/// Draws the video frame at the current playback position into a raster.
pub trait FrameRenderer {
    fn draw(&mut self, source: &mut dyn VideoSource, target: &mut PixelFrame) -> Result<()>;
}

/// Copies the source raster into the target, resampling with nearest
/// neighbour when the target has a different size.
#[derive(Debug, Default)]
pub struct RasterRenderer {
    /// Source column for each target column, rebuilt when sizes change.
    column_map: Vec<usize>,
    mapped: Option<(u32, u32)>,
}

impl RasterRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn columns_for(&mut self, src_width: u32, dst_width: u32) -> &[usize] {
        if self.mapped != Some((src_width, dst_width)) {
            self.column_map = (0..dst_width as usize)
                .map(|x| x * src_width as usize / dst_width as usize)
                .collect();
            self.mapped = Some((src_width, dst_width));
        }
        &self.column_map
    }
}

impl FrameRenderer for RasterRenderer {
    fn draw(&mut self, source: &mut dyn VideoSource, target: &mut PixelFrame) -> Result<()> {
        let (src_width, src_height) = source.dimensions();
        let pixels = source.frame()?;
        let expected = src_width as usize * src_height as usize * CHANNELS;
        anyhow::ensure!(
            pixels.len() == expected,
            "Source frame has {} bytes, expected {} for {}x{}",
            pixels.len(),
            expected,
            src_width,
            src_height
        );

        if target.width() == src_width && target.height() == src_height {
            target.data_mut().copy_from_slice(pixels);
            return Ok(());
        }

        let (dst_width, dst_height) = (target.width(), target.height());
        let src_row = src_width as usize * CHANNELS;
        let dst_row = target.row_bytes();
        let columns = self.columns_for(src_width, dst_width);
        let out = target.data_mut();

        for y in 0..dst_height as usize {
            let sy = y * src_height as usize / dst_height as usize;
            let src = &pixels[sy * src_row..(sy + 1) * src_row];
            let dst = &mut out[y * dst_row..(y + 1) * dst_row];
            for (x, &sx) in columns.iter().enumerate() {
                dst[x * CHANNELS..(x + 1) * CHANNELS]
                    .copy_from_slice(&src[sx * CHANNELS..(sx + 1) * CHANNELS]);
            }
        }

        Ok(())
    }
}

/// Analysis raster size for a requested width, keeping the aspect ratio.
pub fn scaled_dimensions(width: u32, height: u32, target_width: Option<u32>) -> (u32, u32) {
    match target_width {
        Some(w) if w > 0 && w < width => {
            let h = ((height as u64 * w as u64) / width as u64).max(1) as u32;
            (w, h)
        }
        _ => (width, height),
    }
}
