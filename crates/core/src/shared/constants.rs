pub const DEFAULT_HISTORY: i64 = 500;
pub const DEFAULT_DETECT_SHADOWS: bool = true;

/// Side of the square structuring element used for mask cleanup.
pub const DEFAULT_KERNEL_SIZE: usize = 3;

pub const DEFAULT_CAMERA_INDEX: u32 = 0;

/// Outputs buffered between the driver and a threaded presenter.
pub const DEFAULT_PRESENTER_QUEUE_CAPACITY: usize = 4;

/// Back-off before retrying a failed live read.
pub const DEFAULT_TRANSIENT_RETRY_DELAY_MS: u64 = 10;

pub const SAMPLE_VIDEO_NAME: &str = "video_teste.avi";
pub const SAMPLE_VIDEO_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/master/samples/data/vtest.avi";
pub const SAMPLE_VIDEO_DIR: &str = "videos";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
