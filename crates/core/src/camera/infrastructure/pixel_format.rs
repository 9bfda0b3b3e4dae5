//! Conversion of native sensor pixel formats to packed RGB.
//!
//! Industrial cameras deliver whatever their sensor is configured for; the
//! rest of the pipeline only sees 3-channel RGB.

/// GenICam pixel formats the industrial backend can convert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
    Mono8,
    BayerRg8,
    BayerGb8,
    BayerGr8,
    BayerBg8,
}

impl PixelFormat {
    /// Parses a GenICam `PixelFormat` enum entry name.
    pub fn from_genicam(name: &str) -> Option<Self> {
        match name {
            "RGB8" | "RGB8Packed" => Some(Self::Rgb8),
            "BGR8" | "BGR8Packed" => Some(Self::Bgr8),
            "Mono8" => Some(Self::Mono8),
            "BayerRG8" => Some(Self::BayerRg8),
            "BayerGB8" => Some(Self::BayerGb8),
            "BayerGR8" => Some(Self::BayerGr8),
            "BayerBG8" => Some(Self::BayerBg8),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgb8 | Self::Bgr8 => 3,
            _ => 1,
        }
    }
}

/// Converts a tightly packed buffer in `format` to RGB24.
pub fn to_rgb(src: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<Vec<u8>, String> {
    let w = width as usize;
    let h = height as usize;
    let expected = w * h * format.bytes_per_pixel();
    if src.len() < expected {
        return Err(format!(
            "buffer holds {} bytes, {width}x{height} {format:?} needs {expected}",
            src.len()
        ));
    }

    let rgb = match format {
        PixelFormat::Rgb8 => src[..expected].to_vec(),
        PixelFormat::Bgr8 => src[..expected]
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
        PixelFormat::Mono8 => src[..expected].iter().flat_map(|&v| [v, v, v]).collect(),
        bayer => demosaic(src, w, h, bayer),
    };
    Ok(rgb)
}

/// Nearest-neighbour demosaic: every pixel of a 2x2 cell takes the cell's
/// red, averaged green, and blue samples.
fn demosaic(src: &[u8], w: usize, h: usize, format: PixelFormat) -> Vec<u8> {
    let mut out = vec![0u8; w * h * 3];
    let at = |x: usize, y: usize| src[y.min(h - 1) * w + x.min(w - 1)] as u16;

    for y in 0..h {
        let by = y & !1;
        for x in 0..w {
            let bx = x & !1;
            let (tl, tr, bl, br) = (at(bx, by), at(bx + 1, by), at(bx, by + 1), at(bx + 1, by + 1));
            let (r, g, b) = match format {
                PixelFormat::BayerRg8 => (tl, (tr + bl) / 2, br),
                PixelFormat::BayerGb8 => (bl, (tl + br) / 2, tr),
                PixelFormat::BayerGr8 => (tr, (tl + br) / 2, bl),
                PixelFormat::BayerBg8 => (br, (tr + bl) / 2, tl),
                _ => unreachable!("demosaic called with non-Bayer format"),
            };
            let o = (y * w + x) * 3;
            out[o] = r as u8;
            out[o + 1] = g as u8;
            out[o + 2] = b as u8;
        }
    }
    out
}
