use ndarray::ArrayView2;

/// Cell value for background pixels.
pub const BACKGROUND: u8 = 0;
/// Cell value some models emit for pixels classified as shadow.
pub const SHADOW: u8 = 127;
/// Cell value for foreground pixels.
pub const FOREGROUND: u8 = 255;

/// Single-channel per-pixel classification with the spatial shape of a
/// [`Frame`](crate::shared::frame::Frame).
///
/// Raw masks straight from a background model may contain [`SHADOW`];
/// cleaned masks contain only [`BACKGROUND`] and [`FOREGROUND`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Mask {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize),
            "mask length must equal width * height"
        );
        Self {
            data,
            width,
            height,
        }
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self::new(
            vec![value; (width as usize) * (height as usize)],
            width,
            height,
        )
    }

    pub fn background(width: u32, height: u32) -> Self {
        Self::filled(width, height, BACKGROUND)
    }

    /// Builds a mask by evaluating `f(x, y)` for every cell.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> u8) -> Self {
        let mut data = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self::new(data, width, height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y as usize) * (self.width as usize) + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let idx = (y as usize) * (self.width as usize) + x as usize;
        self.data[idx] = value;
    }

    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&v| v == FOREGROUND).count()
    }

    pub fn foreground_ratio(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.foreground_count() as f64 / self.data.len() as f64
    }

    /// True when every cell is either background or foreground.
    pub fn is_binary(&self) -> bool {
        self.data
            .iter()
            .all(|&v| v == BACKGROUND || v == FOREGROUND)
    }

    pub fn as_ndarray(&self) -> ArrayView2<'_, u8> {
        ArrayView2::from_shape((self.height as usize, self.width as usize), &self.data)
            .expect("Mask data length must match dimensions")
    }
}
