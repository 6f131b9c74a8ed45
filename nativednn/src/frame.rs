use std::fmt;

/// Pixel layouts understood by [`crate::DefaultFrameProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray8,
    GrayF32,
    Rgb24,
    RgbF32,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 | PixelFormat::GrayF32 => 1,
            PixelFormat::Rgb24 | PixelFormat::RgbF32 => 3,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            PixelFormat::Gray8 | PixelFormat::Rgb24 => 1,
            PixelFormat::GrayF32 | PixelFormat::RgbF32 => 4,
        }
    }

    pub fn is_float(self) -> bool {
        self.bytes_per_sample() == 4
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Gray8 => "gray8",
            PixelFormat::GrayF32 => "grayf32",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::RgbF32 => "rgbf32",
        };
        f.write_str(name)
    }
}

/// A packed image. `data` holds `height` rows of `width * channels` samples
/// with no row padding; float formats store native-endian f32.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: usize, height: usize, format: PixelFormat) -> Self {
        let len = width * height * format.channels() * format.bytes_per_sample();
        Self {
            width,
            height,
            format,
            data: vec![0; len],
        }
    }

    pub fn from_bytes(width: usize, height: usize, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn from_f32(width: usize, height: usize, format: PixelFormat, samples: &[f32]) -> Self {
        Self::from_bytes(width, height, format, bytemuck::cast_slice(samples).to_vec())
    }

    /// Expected byte size for the current geometry.
    pub fn byte_len(&self) -> usize {
        self.width * self.height * self.format.channels() * self.format.bytes_per_sample()
    }

    /// Samples of a float frame.
    pub fn to_f32(&self) -> Vec<f32> {
        self.data
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Set new geometry and size `data` to match, zero-filling.
    pub fn reshape(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(self.byte_len(), 0);
    }
}
