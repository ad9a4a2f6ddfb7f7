//! Binary morphology with a square structuring element.
//!
//! Samples outside the image are ignored by both operations, so erosion
//! and dilation stay adjoint and openings and closings are idempotent.

use crate::shared::mask::Mask;

#[derive(Clone, Copy)]
enum Extremum {
    Min,
    Max,
}

fn filter_1d(src: &[u8], width: usize, height: usize, radius: usize, horizontal: bool, op: Extremum) -> Vec<u8> {
    let mut dst = vec![0u8; src.len()];
    for y in 0..height {
        for x in 0..width {
            let (pos, len) = if horizontal { (x, width) } else { (y, height) };
            let lo = pos.saturating_sub(radius);
            let hi = (pos + radius).min(len - 1);
            let window = (lo..=hi).map(|p| {
                if horizontal {
                    src[y * width + p]
                } else {
                    src[p * width + x]
                }
            });
            dst[y * width + x] = match op {
                Extremum::Min => window.min().unwrap_or(0),
                Extremum::Max => window.max().unwrap_or(0),
            };
        }
    }
    dst
}

fn separable(mask: &Mask, kernel_size: usize, op: Extremum) -> Mask {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    if w == 0 || h == 0 {
        return mask.clone();
    }
    let radius = kernel_size / 2;
    let rows = filter_1d(mask.data(), w, h, radius, true, op);
    let data = filter_1d(&rows, w, h, radius, false, op);
    Mask::new(data, mask.width(), mask.height())
}

pub fn erode(mask: &Mask, kernel_size: usize) -> Mask {
    separable(mask, kernel_size, Extremum::Min)
}

pub fn dilate(mask: &Mask, kernel_size: usize) -> Mask {
    separable(mask, kernel_size, Extremum::Max)
}

/// Erosion followed by dilation: removes components smaller than the element.
pub fn open(mask: &Mask, kernel_size: usize) -> Mask {
    dilate(&erode(mask, kernel_size), kernel_size)
}

/// Dilation followed by erosion: fills gaps smaller than the element.
pub fn close(mask: &Mask, kernel_size: usize) -> Mask {
    erode(&dilate(mask, kernel_size), kernel_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::mask::FOREGROUND;

    fn dot(width: u32, height: u32, x: u32, y: u32) -> Mask {
        Mask::from_fn(width, height, |cx, cy| if (cx, cy) == (x, y) { FOREGROUND } else { 0 })
    }

    #[test]
    fn test_dilate_grows_point_to_kernel() {
        let grown = dilate(&dot(7, 7, 3, 3), 3);
        assert_eq!(grown.foreground_count(), 9);
        assert_eq!(grown.get(2, 2), FOREGROUND);
        assert_eq!(grown.get(1, 1), 0);
    }

    #[test]
    fn test_erode_removes_point() {
        assert_eq!(erode(&dot(7, 7, 3, 3), 3).foreground_count(), 0);
    }

    #[test]
    fn test_full_mask_survives_erosion_at_borders() {
        let full = Mask::filled(5, 4, FOREGROUND);
        assert_eq!(erode(&full, 3), full);
    }

    #[test]
    fn test_dilate_at_corner_is_clipped() {
        let grown = dilate(&dot(5, 5, 0, 0), 3);
        assert_eq!(grown.foreground_count(), 4);
    }

    #[test]
    fn test_close_fills_single_pixel_hole() {
        let holed = Mask::from_fn(9, 9, |x, y| if (x, y) == (4, 4) { 0 } else { FOREGROUND });
        assert_eq!(close(&holed, 3).foreground_count(), 81);
    }

    #[test]
    fn test_kernel_of_one_is_identity() {
        let m = dot(4, 4, 1, 2);
        assert_eq!(open(&m, 1), m);
        assert_eq!(close(&m, 1), m);
    }
}
