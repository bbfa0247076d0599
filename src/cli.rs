// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for barcode scanning
//!
//! This module provides command-line functionality for:
//! - Scanning still images
//! - Streaming a directory of images through the live analyzer
//! - Listing formats and printing the configuration

use barcode_scanner::backends::camera::{CaptureLoopController, LoopAction, PixelFormat};
use barcode_scanner::backends::virtual_camera;
use barcode_scanner::constants;
use barcode_scanner::frame_processor::dispatch::Haptics;
use barcode_scanner::frame_processor::symbology;
use barcode_scanner::frame_processor::{
    BarcodeAnalyzer, BarcodeFormats, DetectionEvent, FixedOrientation, scan_still_image,
};
use barcode_scanner::media::DisplayRotation;
use barcode_scanner::{Config, QrDetector};
use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};

/// Scan each file once and print one JSON line per file
pub fn scan_files(files: &[PathBuf], config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let paths = collect_image_paths(files)?;
    if paths.is_empty() {
        return Err("No supported images found in input".into());
    }

    symbology::set_supported_formats(config.format_mask()?);
    let detector = QrDetector::new().with_max_dimension(config.max_detection_dimension);

    let rt = tokio::runtime::Runtime::new()?;
    let mut failed = 0usize;

    for path in &paths {
        let outcome = rt.block_on(async {
            let bytes = tokio::fs::read(path).await?;
            scan_still_image(&detector, &bytes).await
        });

        match outcome {
            Ok(results) => {
                let line = serde_json::json!({
                    "file": path.display().to_string(),
                    "results": results,
                });
                println!("{}", line);
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", path.display(), e);
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} files could not be scanned", failed, paths.len()).into());
    }
    Ok(())
}

/// Replay a directory as a camera feed until Ctrl+C
pub fn watch_directory(
    dir: &Path,
    fps: Option<u32>,
    evidence_dir: Option<PathBuf>,
    pixel_format: &str,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = PixelFormat::from_name(pixel_format)
        .ok_or_else(|| format!("Unknown pixel format '{}'", pixel_format))?;

    symbology::set_supported_formats(config.format_mask()?);
    let source = virtual_camera::open_directory(dir, format, fps)?;
    let pool = source.pool();

    if let Some(evidence_dir) = evidence_dir.as_ref() {
        std::fs::create_dir_all(evidence_dir)?;
    }

    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    let mut options = config.to_analyzer_options();
    options.return_barcode_image |= evidence_dir.is_some();

    let detector = Arc::new(QrDetector::new().with_max_dimension(config.max_detection_dimension));
    let orientation = Arc::new(FixedOrientation {
        auto_rotate: config.auto_rotate,
        rotation: DisplayRotation::Rotation0,
    });
    let (analyzer, delivery) = BarcodeAnalyzer::with_orientation(detector, options, orientation)?;
    let analyzer = Arc::new(analyzer);

    let session = analyzer.session();
    let mut delivery = delivery.with_haptics(Arc::new(TerminalBell));
    delivery.set_handler(move |event| {
        report_event(&event, evidence_dir.as_deref());
        // Re-arm for the next code
        session.set_scanning_enabled(true);
    });
    let delivery_task = rt.spawn(delivery.run());

    let frame_analyzer = Arc::clone(&analyzer);
    let mut controller = CaptureLoopController::start("virtual-camera", source, move |frame| {
        frame_analyzer.on_frame(frame);
        LoopAction::Continue
    })?;

    // Ctrl+C stops the camera worker
    let stop_signal = controller.stop_signal();
    ctrlc::set_handler(move || {
        stop_signal.store(true, Ordering::SeqCst);
    })?;

    println!("Watching {} (press Ctrl+C to stop)", dir.display());
    while controller.is_running() {
        std::thread::sleep(constants::virtual_camera::WATCH_POLL_INTERVAL);
    }

    controller.stop();
    rt.block_on(analyzer.wait_idle());
    analyzer.shutdown();
    drop(analyzer);

    // Drain whatever was emitted before the session stopped
    match rt.block_on(tokio::time::timeout(Duration::from_secs(1), delivery_task)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Delivery task failed"),
        Err(_) => warn!("Delivery did not finish in time"),
    }

    info!(
        delivered = pool.delivered(),
        released = pool.released(),
        "Virtual camera stopped"
    );
    if pool.outstanding() > 0 {
        warn!(outstanding = pool.outstanding(), "Frames were not released");
    }

    Ok(())
}

/// List every known format with its detector code
pub fn list_formats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let selected = config.format_mask()?;

    println!("{:<20} {:>6}  selected", "format", "code");
    for (name, format) in BarcodeFormats::all().iter_names() {
        let code = symbology::format_to_capability(format)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mark = if selected.contains(format) { "yes" } else { "no" };
        println!("{:<20} {:>6}  {}", name, code, mark);
    }

    println!();
    println!("The bundled detector decodes QR_CODE only.");
    Ok(())
}

/// Print the effective configuration, optionally writing it back
pub fn show_config(
    config: &Config,
    path: Option<PathBuf>,
    save: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        let saved = match path {
            Some(path) => {
                config.save_to(&path)?;
                path
            }
            None => config.save()?,
        };
        eprintln!("Saved to: {}", saved.display());
    }
    Ok(())
}

/// Rings the terminal bell in place of a vibration motor
struct TerminalBell;

impl Haptics for TerminalBell {
    fn pulse(&self, _duration: Duration) -> Result<(), String> {
        let mut stderr = std::io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|e| e.to_string())
    }
}

/// Print an event as a JSON line and save its evidence image
fn report_event(event: &DetectionEvent, evidence_dir: Option<&Path>) {
    let evidence_path = match (evidence_dir, event.evidence_image.as_ref()) {
        (Some(dir), Some(jpeg)) => save_evidence(dir, jpeg),
        _ => None,
    };

    let line = serde_json::json!({
        "frame": event.frame_sequence,
        "results": event.results,
        "evidence": evidence_path.map(|p| p.display().to_string()),
    });
    println!("{}", line);
}

fn save_evidence(dir: &Path, jpeg: &[u8]) -> Option<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
    let path = dir.join(format!("evidence_{}.jpg", timestamp));

    match std::fs::write(&path, jpeg) {
        Ok(()) => Some(path),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to save evidence image");
            None
        }
    }
}

/// Collect image paths from input (files or directories)
fn collect_image_paths(input: &[PathBuf]) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths = Vec::new();

    for path in input {
        if path.is_dir() {
            paths.extend(virtual_camera::list_image_files(path)?);
        } else {
            paths.push(path.clone());
        }
    }

    Ok(paths)
}
