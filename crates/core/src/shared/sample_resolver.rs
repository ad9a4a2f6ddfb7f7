use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::{SAMPLE_VIDEO_DIR, SAMPLE_VIDEO_NAME, SAMPLE_VIDEO_URL};

#[derive(Error, Debug)]
pub enum SampleResolveError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write sample to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Result of preparing the sample workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleLayout {
    pub videos_dir: PathBuf,
    pub sample_path: PathBuf,
    pub downloaded: bool,
}

/// Prepares `root` for a demo run: creates the `videos/` directory and
/// fetches the sample clip into `root` unless it is already there.
pub fn prepare_sample(
    root: &Path,
    progress: Option<ProgressFn>,
) -> Result<SampleLayout, SampleResolveError> {
    let videos_dir = root.join(SAMPLE_VIDEO_DIR);
    fs::create_dir_all(&videos_dir).map_err(|e| SampleResolveError::CreateDir {
        path: videos_dir.clone(),
        source: e,
    })?;

    let sample_path = root.join(SAMPLE_VIDEO_NAME);
    if sample_path.exists() {
        log::info!("Sample video already present: {}", sample_path.display());
        return Ok(SampleLayout {
            videos_dir,
            sample_path,
            downloaded: false,
        });
    }

    log::info!("Downloading sample video from {SAMPLE_VIDEO_URL}");
    download(SAMPLE_VIDEO_URL, &sample_path, progress)?;
    Ok(SampleLayout {
        videos_dir,
        sample_path,
        downloaded: true,
    })
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), SampleResolveError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| SampleResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let bytes = response.bytes().map_err(|e| SampleResolveError::Download {
        url: url.to_string(),
        source: e,
    })?;

    // Write to a temp file first, then rename for atomicity
    let temp_path = dest.with_extension("part");
    let mut file = fs::File::create(&temp_path).map_err(|e| SampleResolveError::Write {
        path: temp_path.clone(),
        source: e,
    })?;

    let chunk_size = 256 * 1024;
    for chunk in bytes.chunks(chunk_size) {
        file.write_all(chunk).map_err(|e| SampleResolveError::Write {
            path: temp_path.clone(),
            source: e,
        })?;
        downloaded += chunk.len() as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(|e| SampleResolveError::Write {
        path: temp_path.clone(),
        source: e,
    })?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|e| SampleResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
