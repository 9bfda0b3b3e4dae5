//! Bitmap text drawing with the 8×8 public-domain font.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};

/// Side of one unscaled glyph cell in pixels.
pub const GLYPH_SIZE: u32 = 8;

/// Width in pixels of `text` drawn at `scale`.
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH_SIZE * scale
}

/// Height in pixels of one line drawn at `scale`.
pub fn text_height(scale: u32) -> u32 {
    GLYPH_SIZE * scale
}

/// Draws `text` with its top-left corner at `(x, y)`.
///
/// Each glyph pixel becomes a `scale`×`scale` block. Characters outside
/// basic Latin render as `?`; pixels outside the image are skipped.
pub fn draw_text(image: &mut RgbImage, x: i32, y: i32, scale: u32, color: Rgb<u8>, text: &str) {
    let scale = scale.max(1) as i32;
    let cell = GLYPH_SIZE as i32 * scale;
    let (width, height) = (image.width() as i32, image.height() as i32);

    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            continue;
        };
        let origin_x = x + i as i32 * cell;
        if origin_x >= width {
            break;
        }

        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE as i32 {
                // bit 0 is the leftmost pixel
                if bits & (1 << col) == 0 {
                    continue;
                }
                let px = origin_x + col * scale;
                let py = y + row as i32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        let (tx, ty) = (px + dx, py + dy);
                        if tx >= 0 && ty >= 0 && tx < width && ty < height {
                            image.put_pixel(tx as u32, ty as u32, color);
                        }
                    }
                }
            }
        }
    }
}
