use ndarray::{Axis, Zip};

use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::mask::{Mask, FOREGROUND};

/// Keeps the pixels of `frame` where `mask` is foreground and zeroes the
/// rest. Every channel of a pixel is treated alike.
pub fn compose(frame: &Frame, mask: &Mask) -> Result<Frame, PipelineError> {
    if frame.dimensions() != mask.dimensions() {
        return Err(PipelineError::ShapeMismatch {
            expected: frame.dimensions(),
            actual: mask.dimensions(),
        });
    }

    let mut out = frame.clone();
    Zip::from(out.as_ndarray_mut().lanes_mut(Axis(2)))
        .and(mask.as_ndarray())
        .for_each(|mut pixel, &m| {
            if m != FOREGROUND {
                pixel.fill(0);
            }
        });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::mask::{BACKGROUND, SHADOW};

    fn gradient(width: u32, height: u32) -> Frame {
        let data = (0..width * height * 3).map(|v| (v % 251) as u8 + 1).collect();
        Frame::new(data, width, height, 3, 7)
    }

    #[test]
    fn test_empty_mask_blacks_out_frame() {
        let frame = gradient(6, 4);
        let out = compose(&frame, &Mask::background(6, 4)).unwrap();
        assert!(out.data().iter().all(|&v| v == 0));
        assert_eq!(out.dimensions(), (6, 4));
    }

    #[test]
    fn test_full_mask_keeps_frame() {
        let frame = gradient(6, 4);
        let out = compose(&frame, &Mask::filled(6, 4, FOREGROUND)).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_partial_mask_selects_pixels() {
        let frame = gradient(4, 2);
        let mask = Mask::from_fn(4, 2, |x, y| match (x, y) {
            (1, 0) => FOREGROUND,
            (2, 1) => SHADOW,
            _ => BACKGROUND,
        });
        let out = compose(&frame, &mask).unwrap();

        let px = |f: &Frame, x: usize, y: usize| {
            let o = (y * 4 + x) * 3;
            f.data()[o..o + 3].to_vec()
        };
        assert_eq!(px(&out, 1, 0), px(&frame, 1, 0));
        assert_eq!(px(&out, 2, 1), vec![0, 0, 0]);
        assert_eq!(px(&out, 0, 0), vec![0, 0, 0]);
        assert_eq!(out.index(), 7);
    }

    #[test]
    fn test_grayscale_frame_supported() {
        let frame = Frame::new(vec![9; 4], 2, 2, 1, 0);
        let mask = Mask::from_fn(2, 2, |x, _| if x == 0 { FOREGROUND } else { BACKGROUND });
        let out = compose(&frame, &mask).unwrap();
        assert_eq!(out.data(), &[9, 0, 9, 0]);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let result = compose(&gradient(6, 4), &Mask::background(4, 6));
        assert!(matches!(
            result,
            Err(PipelineError::ShapeMismatch { expected: (6, 4), actual: (4, 6) })
        ));
    }
}
