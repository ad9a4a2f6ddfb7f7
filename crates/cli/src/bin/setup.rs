use std::path::PathBuf;
use std::process;

use clap::Parser;

use motion_segment_core::shared::sample_resolver::prepare_sample;

/// Prepares a working directory for a demo run: creates `videos/` and
/// downloads the sample clip.
#[derive(Parser)]
#[command(name = "motion-segment-setup")]
struct Cli {
    /// Directory to prepare.
    #[arg(default_value = ".")]
    root: PathBuf,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let layout = prepare_sample(&cli.root, Some(Box::new(download_progress)))?;
    if layout.downloaded {
        eprintln!();
    }
    log::info!("Videos directory: {}", layout.videos_dir.display());
    println!("{}", layout.sample_path.display());
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading sample video... {pct}%");
    } else {
        eprint!("\rDownloading sample video... {downloaded} bytes");
    }
}
