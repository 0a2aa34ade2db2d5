use anyhow::Result;

/// Interleaved RGBA: three color channels plus alpha.
pub const CHANNELS: usize = 4;

/// A rectangular raster of interleaved RGBA samples.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelFrame {
    /// Allocate a zeroed (transparent black) frame.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        anyhow::ensure!(
            width > 0 && height > 0,
            "Frame dimensions must be positive, got {}x{}",
            width,
            height
        );
        Ok(Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * CHANNELS],
        })
    }

    #[allow(dead_code)]
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        anyhow::ensure!(
            width > 0 && height > 0 && data.len() == expected,
            "RGBA buffer of {} bytes does not match {}x{} ({} bytes)",
            data.len(),
            width,
            height,
            expected
        );
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * CHANNELS
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn same_shape(&self, other: &PixelFrame) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Current and previous capture buffers owned by the sampler.
///
/// The previous frame is a value copy of the last committed current frame,
/// so the two buffers never alias.
#[derive(Debug)]
pub struct FramePair {
    current: PixelFrame,
    previous: Option<PixelFrame>,
}

impl FramePair {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            current: PixelFrame::new(width, height)?,
            previous: None,
        })
    }

    /// Forget the previous frame and resize the current one if needed.
    pub fn reset(&mut self, width: u32, height: u32) -> Result<()> {
        if self.current.width != width || self.current.height != height {
            self.current = PixelFrame::new(width, height)?;
        }
        self.previous = None;
        Ok(())
    }

    #[allow(dead_code)]
    pub fn current(&self) -> &PixelFrame {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut PixelFrame {
        &mut self.current
    }

    #[allow(dead_code)]
    pub fn previous(&self) -> Option<&PixelFrame> {
        self.previous.as_ref()
    }

    /// Both buffers, once a previous frame exists.
    pub fn both(&self) -> Option<(&PixelFrame, &PixelFrame)> {
        self.previous.as_ref().map(|prev| (&self.current, prev))
    }

    /// Copy the current frame into the previous slot.
    pub fn commit(&mut self) {
        match self.previous {
            Some(ref mut prev) if prev.same_shape(&self.current) => {
                prev.data.copy_from_slice(&self.current.data);
            }
            _ => self.previous = Some(self.current.clone()),
        }
    }
}
