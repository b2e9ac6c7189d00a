//! Debug tile grid: a border plus the tile address drawn with a small
//! built-in glyph set, overlaid on data tiles or served standalone.

use crate::engine::RenderedImage;

/// Overlay and label color.
const GRID_COLOR: [u8; 4] = [220, 40, 40, 255];

/// Glyphs are 3x5 bitmaps, one row per byte, low 3 bits used.
const GLYPH_WIDTH: u32 = 3;
const GLYPH_SCALE: u32 = 2;
const LABEL_MARGIN: u32 = 4;

fn glyph_rows(c: char) -> Option<[u8; 5]> {
    let rows = match c {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        _ => return None,
    };
    Some(rows)
}

/// Draw a 1-pixel border and the tile address in the top-left corner.
pub fn draw_debug_overlay(image: &mut RenderedImage, label: &str) {
    let (w, h) = (image.width, image.height);
    if w == 0 || h == 0 {
        return;
    }
    for x in 0..w {
        image.set_pixel(x, 0, GRID_COLOR);
        image.set_pixel(x, h - 1, GRID_COLOR);
    }
    for y in 0..h {
        image.set_pixel(0, y, GRID_COLOR);
        image.set_pixel(w - 1, y, GRID_COLOR);
    }
    draw_label(image, LABEL_MARGIN, LABEL_MARGIN, label);
}

/// A standalone debug tile: transparent except for border and label.
pub fn debug_tile(label: &str, size: u32) -> RenderedImage {
    let mut image = RenderedImage::transparent(size, size);
    draw_debug_overlay(&mut image, label);
    image
}

fn draw_label(image: &mut RenderedImage, x: u32, y: u32, label: &str) {
    let advance = (GLYPH_WIDTH + 1) * GLYPH_SCALE;
    let mut cursor = x;
    for c in label.chars() {
        if let Some(rows) = glyph_rows(c) {
            draw_glyph(image, cursor, y, &rows);
        }
        // Unknown characters still advance so spacing stays readable.
        cursor += advance;
    }
}

fn draw_glyph(image: &mut RenderedImage, x: u32, y: u32, rows: &[u8; 5]) {
    for (row_idx, row) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if row & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            for dy in 0..GLYPH_SCALE {
                for dx in 0..GLYPH_SCALE {
                    image.set_pixel(
                        x + col * GLYPH_SCALE + dx,
                        y + row_idx as u32 * GLYPH_SCALE + dy,
                        GRID_COLOR,
                    );
                }
            }
        }
    }
}
