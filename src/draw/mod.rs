//! Drawing helpers for annotating frames
//!
//! Shapes go through `imageproc`; thickness is emulated by stroking
//! neighbouring outlines. Text uses the bitmap glyphs in [`font`].
//! Points are `(x, y)` in pixels and may fall outside the frame.

pub mod font;

use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_rect_mut,
    draw_line_segment_mut,
};
use imageproc::rect::Rect;

use font::{glyph_bits, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};

pub type Color = Rgb<u8>;
pub type Point = (i32, i32);

pub const BLUE: Color = Rgb([0, 0, 255]);
pub const GREEN: Color = Rgb([0, 255, 0]);
pub const RED: Color = Rgb([255, 0, 0]);
pub const WHITE: Color = Rgb([255, 255, 255]);

/// Pass as thickness to fill a shape
pub const FILLED: i32 = -1;

/// Named color lookup; unknown names fall back to green
pub fn select_color(name: &str) -> Color {
    match name.to_lowercase().as_str() {
        "blue" => BLUE,
        "green" => GREEN,
        "red" => RED,
        "white" => WHITE,
        _ => GREEN,
    }
}

/// Axis-aligned rectangle between two corners
pub fn rectangle(frame: &mut RgbImage, p1: Point, p2: Point, color: Color, thickness: i32) {
    // Corners far off the frame are pulled in to just past its edge, keeping
    // the size arithmetic in range without changing the visible pixels.
    let (width, height) = (extent(frame.width()), extent(frame.height()));
    let thickness = thickness.min(width.max(height));
    let pad = thickness.max(1) + 1;
    let cx = |x: i32| x.clamp(-pad, width + pad);
    let cy = |y: i32| y.clamp(-pad, height + pad);
    let (left, right) = (cx(p1.0.min(p2.0)), cx(p1.0.max(p2.0)));
    let (top, bottom) = (cy(p1.1.min(p2.1)), cy(p1.1.max(p2.1)));

    if thickness < 0 {
        let rect = Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
        draw_filled_rect_mut(frame, rect, color);
        return;
    }

    let (inner, outer) = stroke_span(thickness);
    for d in -inner..=outer {
        let (l, t, r, b) = (left - d, top - d, right + d, bottom + d);
        if r < l || b < t {
            continue;
        }
        let rect = Rect::at(l, t).of_size((r - l + 1) as u32, (b - t + 1) as u32);
        draw_hollow_rect_mut(frame, rect, color);
    }
}

/// Straight line segment
pub fn line(frame: &mut RgbImage, p1: Point, p2: Point, color: Color, thickness: i32) {
    let (dx, dy) = ((p2.0 - p1.0) as f32, (p2.1 - p1.1) as f32);
    let length = (dx * dx + dy * dy).sqrt();
    // unit normal
    let (nx, ny) = if length > 0.0 {
        (-dy / length, dx / length)
    } else {
        (0.0, 0.0)
    };

    let (inner, outer) = stroke_span(thickness.max(1));
    for d in -inner..=outer {
        let off = (nx * d as f32, ny * d as f32);
        draw_line_segment_mut(
            frame,
            (p1.0 as f32 + off.0, p1.1 as f32 + off.1),
            (p2.0 as f32 + off.0, p2.1 as f32 + off.1),
            color,
        );
    }
}

/// Line from `p1` to `p2` with an arrow head at `p2`. `tip_length` is a
/// fraction of the segment length.
pub fn arrowed_line(
    frame: &mut RgbImage,
    p1: Point,
    p2: Point,
    color: Color,
    thickness: i32,
    tip_length: f32,
) {
    line(frame, p1, p2, color, thickness);

    let (dx, dy) = ((p1.0 - p2.0) as f32, (p1.1 - p2.1) as f32);
    let tip_size = (dx * dx + dy * dy).sqrt() * tip_length;
    if tip_size < 1.0 {
        return;
    }
    let angle = dy.atan2(dx);
    for side in [std::f32::consts::FRAC_PI_4, -std::f32::consts::FRAC_PI_4] {
        let end = (
            (p2.0 as f32 + tip_size * (angle + side).cos()).round() as i32,
            (p2.1 as f32 + tip_size * (angle + side).sin()).round() as i32,
        );
        line(frame, p2, end, color, thickness);
    }
}

/// Circle outline, or a disc when `thickness` is negative
pub fn circle(frame: &mut RgbImage, center: Point, radius: i32, color: Color, thickness: i32) {
    if thickness < 0 {
        draw_filled_circle_mut(frame, center, radius, color);
        return;
    }
    let (inner, outer) = stroke_span(thickness);
    for d in -inner..=outer {
        let r = radius + d;
        if r >= 0 {
            draw_hollow_circle_mut(frame, center, r, color);
        }
    }
}

/// Pixel size of one glyph dot at a given font scale
fn dot_size(scale: f32) -> u32 {
    (scale * 1.5).round().max(1.0) as u32
}

/// `(width, height)` of a rendered string
pub fn text_size(text: &str, scale: f32, thickness: i32) -> (u32, u32) {
    let dot = dot_size(scale);
    let extra = thickness.max(1) as u32 - 1;
    let chars = text.chars().count() as u32;
    if chars == 0 {
        return (0, 0);
    }
    let width = (chars - 1) * GLYPH_ADVANCE * dot + GLYPH_WIDTH * dot + extra;
    let height = GLYPH_HEIGHT * dot + extra;
    (width, height)
}

/// Render text with its bottom-left corner at `origin`. Characters without
/// a glyph advance the cursor blank.
pub fn put_text(
    frame: &mut RgbImage,
    text: &str,
    origin: Point,
    scale: f32,
    color: Color,
    thickness: i32,
) {
    let dot = dot_size(scale) as i32;
    let extra = thickness.max(1) - 1;
    let top = origin.1 - GLYPH_HEIGHT as i32 * dot - extra;
    let (width, height) = (frame.width() as i32, frame.height() as i32);

    let mut cursor = origin.0;
    for ch in text.chars() {
        if let Some(rows) = glyph_bits(ch) {
            for (row, pattern) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH as i32 {
                    if (pattern >> (GLYPH_WIDTH as i32 - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    let x0 = cursor + col * dot;
                    let y0 = top + row as i32 * dot;
                    for py in y0..y0 + dot + extra {
                        for px in x0..x0 + dot + extra {
                            if px >= 0 && py >= 0 && px < width && py < height {
                                frame.put_pixel(px as u32, py as u32, color);
                            }
                        }
                    }
                }
            }
        }
        cursor += GLYPH_ADVANCE as i32 * dot;
    }
}

/// Offsets on either side of the nominal outline for a stroke width
fn extent(size: u32) -> i32 {
    size.min(i32::MAX as u32 / 4) as i32
}

fn stroke_span(thickness: i32) -> (i32, i32) {
    let thickness = thickness.max(1);
    let inner = (thickness - 1) / 2;
    (inner, thickness - 1 - inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_color() {
        assert_eq!(select_color("blue"), BLUE);
        assert_eq!(select_color("Red"), RED);
        assert_eq!(select_color("yellow"), GREEN);
    }

    #[test]
    fn test_rectangle_outline() {
        let mut frame = RgbImage::new(20, 20);
        rectangle(&mut frame, (2, 2), (10, 10), GREEN, 1);
        assert_eq!(*frame.get_pixel(2, 2), GREEN);
        assert_eq!(*frame.get_pixel(10, 6), GREEN);
        assert_eq!(*frame.get_pixel(6, 6), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_rectangle_filled_and_clipped() {
        let mut frame = RgbImage::new(10, 10);
        rectangle(&mut frame, (-5, -5), (4, 4), RED, FILLED);
        assert_eq!(*frame.get_pixel(0, 0), RED);
        assert_eq!(*frame.get_pixel(4, 4), RED);
        assert_eq!(*frame.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_rectangle_extreme_corners() {
        let mut frame = RgbImage::new(10, 10);
        rectangle(&mut frame, (0, 0), (i32::MAX, 5), GREEN, 2);
        assert_eq!(*frame.get_pixel(0, 0), GREEN);
        assert_eq!(*frame.get_pixel(9, 5), GREEN);
        assert_eq!(*frame.get_pixel(5, 3), Rgb([0, 0, 0]));

        let mut filled = RgbImage::new(4, 4);
        rectangle(&mut filled, (i32::MIN, i32::MIN), (i32::MAX, i32::MAX), BLUE, -1);
        assert_eq!(*filled.get_pixel(3, 3), BLUE);

        rectangle(&mut frame, (0, 0), (4, 4), RED, i32::MAX);
    }

    #[test]
    fn test_thick_line() {
        let mut frame = RgbImage::new(20, 20);
        line(&mut frame, (0, 10), (19, 10), BLUE, 3);
        assert_eq!(*frame.get_pixel(5, 9), BLUE);
        assert_eq!(*frame.get_pixel(5, 10), BLUE);
        assert_eq!(*frame.get_pixel(5, 11), BLUE);
        assert_eq!(*frame.get_pixel(5, 13), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_arrow_head_drawn_at_end() {
        let mut frame = RgbImage::new(40, 40);
        arrowed_line(&mut frame, (0, 20), (30, 20), RED, 1, 0.2);
        // head strokes run back from the tip above and below the shaft
        let above = (20..30).any(|x| frame.get_pixel(x, 16) == &RED);
        let below = (20..30).any(|x| frame.get_pixel(x, 24) == &RED);
        assert!(above && below);
    }

    #[test]
    fn test_circle() {
        let mut frame = RgbImage::new(30, 30);
        circle(&mut frame, (15, 15), 5, GREEN, 1);
        assert_eq!(*frame.get_pixel(20, 15), GREEN);
        assert_eq!(*frame.get_pixel(15, 15), Rgb([0, 0, 0]));

        circle(&mut frame, (15, 15), 3, RED, FILLED);
        assert_eq!(*frame.get_pixel(15, 15), RED);
    }

    #[test]
    fn test_text_size() {
        assert_eq!(text_size("", 1.0, 1), (0, 0));
        // scale 2.0 -> 3 px dots
        assert_eq!(text_size("AB", 2.0, 1), (6 * 3 + 5 * 3, 7 * 3));
        assert_eq!(text_size("A", 1.0, 2), (5 * 2 + 1, 7 * 2 + 1));
    }

    #[test]
    fn test_put_text_baseline() {
        let mut frame = RgbImage::new(20, 20);
        put_text(&mut frame, "I", (0, 10), 0.5, WHITE, 1);
        // top bar of the I sits on the first glyph row
        assert_eq!(*frame.get_pixel(1, 3), WHITE);
        assert_eq!(*frame.get_pixel(2, 9), WHITE);
        assert_eq!(*frame.get_pixel(2, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_put_text_off_frame_is_clipped() {
        let mut frame = RgbImage::new(5, 5);
        put_text(&mut frame, "HELLO", (-20, 100), 3.0, WHITE, 2);
        put_text(&mut frame, "HELLO", (3, 3), 3.0, WHITE, 2);
    }
}
