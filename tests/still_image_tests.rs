// SPDX-License-Identifier: MPL-2.0

//! Integration tests for still image scans

use barcode_scanner::errors::ScanError;
use barcode_scanner::frame_processor::{
    AnalyzerOptions, BarcodeAnalyzer, BarcodeFormats, BarcodeType, DetectionCapability,
    DetectionCompletion, RawBarcode, scan_still_image,
};
use barcode_scanner::media::DetectorImage;
use barcode_scanner::QrDetector;
use qrcode::{Color, QrCode};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reports one Code 128 symbol for any image
#[derive(Default)]
struct Code128 {
    calls: AtomicUsize,
}

impl DetectionCapability for Code128 {
    fn formats(&self) -> BarcodeFormats {
        BarcodeFormats::CODE_128
    }

    fn detect(&self, _image: DetectorImage, completion: DetectionCompletion) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        completion(Ok(vec![RawBarcode {
            format_code: 1,
            value_type_code: 7,
            raw_value: Some("0123456789".into()),
            display_value: Some("0123456789".into()),
            corner_points: vec![(10, 10), (90, 10), (90, 40), (10, 40)],
            raw_bytes: None,
        }]));
    }
}

fn encoded(format: image::ImageFormat) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(100, 50, image::Rgb([240, 240, 240]));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

fn jpeg_bytes() -> Vec<u8> {
    encoded(image::ImageFormat::Jpeg)
}

/// PNG of `content` as a QR symbol, 6px modules and a 4 module quiet zone
fn qr_png(content: &str) -> Vec<u8> {
    let code = QrCode::new(content.as_bytes()).unwrap();
    let modules = code.width() as u32;
    let module = 6;
    let side = (modules + 8) * module;
    let mut image = image::GrayImage::from_pixel(side, side, image::Luma([255]));

    for (i, color) in code.to_colors().into_iter().enumerate() {
        if !matches!(color, Color::Dark) {
            continue;
        }
        let (mx, my) = (i as u32 % modules + 4, i as u32 / modules + 4);
        for y in my * module..(my + 1) * module {
            for x in mx * module..(mx + 1) * module {
                image.put_pixel(x, y, image::Luma([0]));
            }
        }
    }

    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

#[tokio::test]
async fn test_code128_still_image() {
    let capability = Code128::default();
    let results = scan_still_image(&capability, &jpeg_bytes()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].format, BarcodeFormats::CODE_128);
    assert_eq!(results[0].value_type, BarcodeType::Text);
    assert_eq!(results[0].raw_value, "0123456789");
    assert_eq!(results[0].corner_points.len(), 4);
}

#[tokio::test]
async fn test_still_image_ignores_live_session_state() {
    let capability = Arc::new(Code128::default());
    let (analyzer, _delivery) =
        BarcodeAnalyzer::new(capability.clone(), AnalyzerOptions::default()).unwrap();
    analyzer.set_scanning_enabled(false);
    analyzer.shutdown();

    // Same capability instance the paused, torn down analyzer holds
    for expected in 1..=3 {
        let results = scan_still_image(&*capability, &jpeg_bytes()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(capability.calls.load(Ordering::SeqCst), expected);
    }
}

#[tokio::test]
async fn test_truncated_image_rejected() {
    let capability = Code128::default();
    let bytes = encoded(image::ImageFormat::Png);
    let result = scan_still_image(&capability, &bytes[..bytes.len() / 4]).await;

    assert!(matches!(result, Err(ScanError::InvalidImage(_))));
    assert_eq!(capability.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_qr_detector_decodes_still_image() {
    let detector = QrDetector::with_formats(BarcodeFormats::QR_CODE);
    let results = scan_still_image(&detector, &qr_png("https://example.com/item/42"))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].raw_value, "https://example.com/item/42");
    assert_eq!(results[0].display_value, "https://example.com/item/42");
    assert_eq!(results[0].format, BarcodeFormats::QR_CODE);
    assert_eq!(results[0].value_type, BarcodeType::Url);
    assert_eq!(results[0].corner_points.len(), 4);
}

#[tokio::test]
async fn test_qr_detector_blank_image() {
    let detector = QrDetector::with_formats(BarcodeFormats::QR_CODE);
    let results = scan_still_image(&detector, &jpeg_bytes()).await.unwrap();
    assert!(results.is_empty());
}
