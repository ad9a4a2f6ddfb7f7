use std::fmt;
use std::str::FromStr;

use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::StreamMetadata;

/// Where frames come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// A capture device. Reads may fail transiently; rewinding is impossible.
    Live,
    /// A decoded file. Exhaustion is a normal event and the source can rewind.
    File,
}

impl SourceKind {
    pub const NAMES: &[&str] = &["camera", "arquivo"];
}

impl FromStr for SourceKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "camera" => Ok(SourceKind::Live),
            "arquivo" => Ok(SourceKind::File),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown source '{other}', expected one of: {}",
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Live => write!(f, "camera"),
            SourceKind::File => write!(f, "arquivo"),
        }
    }
}

/// Result of pulling from a [`FrameSource`].
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    /// The stream is exhausted. File sources can be rewound afterwards.
    EndOfStream,
    /// A live read failed; the next pull may succeed.
    Unavailable,
}

/// Sequential supply of frames from a device or a file.
///
/// Implementations validate and open their handle at construction, so a
/// value of this type is always backed by an open (or explicitly closed)
/// resource.
pub trait FrameSource: Send {
    fn kind(&self) -> SourceKind;

    fn metadata(&self) -> &StreamMetadata;

    /// Pulls the next frame. Only real I/O faults on file-backed sources are
    /// returned as errors; exhaustion and live hiccups are outcomes.
    fn next(&mut self) -> Result<ReadOutcome, PipelineError>;

    /// Rewinds to the first frame. Live sources answer `NotSeekable`.
    fn reset(&mut self) -> Result<(), PipelineError>;

    /// Releases the underlying handle. Safe to call more than once.
    fn close(&mut self);

    fn is_seekable(&self) -> bool {
        self.kind() == SourceKind::File
    }
}
