//! Synthetic scenes for model tests.

use crate::shared::frame::Frame;

pub fn solid(width: u32, height: u32, value: u8) -> Frame {
    Frame::new(vec![value; (width * height * 3) as usize], width, height, 3, 0)
}

/// `background` everywhere except a `size`×`size` square of `foreground`
/// with its top-left corner at `(x, y)`.
pub fn square(
    width: u32,
    height: u32,
    background: u8,
    foreground: u8,
    (x, y): (u32, u32),
    size: u32,
) -> Frame {
    let mut frame = solid(width, height, background);
    let w = width as usize;
    let data = frame.data_mut();
    for row in y..(y + size).min(height) {
        for col in x..(x + size).min(width) {
            let offset = (row as usize * w + col as usize) * 3;
            data[offset..offset + 3].fill(foreground);
        }
    }
    frame
}

pub fn count_value(mask: &crate::shared::mask::Mask, value: u8) -> usize {
    mask.data().iter().filter(|&&v| v == value).count()
}
