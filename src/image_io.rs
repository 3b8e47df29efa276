//! Image decode & ROI crop (C1, spec §4.2).

use image::{GenericImageView, GrayImage};

use crate::error::{DartVisionError, Result};
use crate::types::Roi;

/// One camera's decoded, ROI-cropped frame plus the offset needed to
/// lift later pixel coordinates back into full-image space.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub image: GrayImage,
    /// Top-left corner of the crop, in full-image pixel coordinates.
    pub roi_offset: (i64, i64),
    pub roi_fallback: bool,
}

/// Decodes one JPEG/PNG byte buffer and crops it to `roi`. Falls back to
/// the full decoded image (with `roi_fallback = true`) when the ROI is
/// empty or falls entirely outside the image.
pub fn decode_and_crop(bytes: &[u8], roi: Roi, camera_id: &str) -> Result<DecodedFrame> {
    if bytes.len() < 8 {
        return Err(DartVisionError::DecodeFailed {
            camera_id: camera_id.to_string(),
            detail: "buffer too small to be a valid image".to_string(),
        });
    }

    let decoded = image::load_from_memory(bytes).map_err(|e| DartVisionError::DecodeFailed {
        camera_id: camera_id.to_string(),
        detail: e.to_string(),
    })?;
    let gray = decoded.to_luma8();
    let (img_w, img_h) = gray.dimensions();

    let degenerate = roi.width == 0
        || roi.height == 0
        || roi.x >= img_w as i64
        || roi.y >= img_h as i64
        || roi.x + roi.width as i64 <= 0
        || roi.y + roi.height as i64 <= 0;

    if degenerate {
        return Ok(DecodedFrame {
            image: gray,
            roi_offset: (0, 0),
            roi_fallback: true,
        });
    }

    let x0 = roi.x.max(0);
    let y0 = roi.y.max(0);
    let x1 = (roi.x + roi.width as i64).min(img_w as i64);
    let y1 = (roi.y + roi.height as i64).min(img_h as i64);
    let crop_w = (x1 - x0).max(0) as u32;
    let crop_h = (y1 - y0).max(0) as u32;

    if crop_w == 0 || crop_h == 0 {
        return Ok(DecodedFrame {
            image: gray,
            roi_offset: (0, 0),
            roi_fallback: true,
        });
    }

    let cropped = gray.view(x0 as u32, y0 as u32, crop_w, crop_h).to_image();
    Ok(DecodedFrame {
        image: cropped,
        roi_offset: (x0, y0),
        roi_fallback: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};
    use std::io::Cursor;

    fn encode_png(w: u32, h: u32) -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(w, h, |x, y| Luma([((x + y) % 255) as u8]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn crops_to_roi() {
        let bytes = encode_png(100, 100);
        let roi = Roi { x: 10, y: 10, width: 30, height: 40 };
        let frame = decode_and_crop(&bytes, roi, "cam0").unwrap();
        assert!(!frame.roi_fallback);
        assert_eq!(frame.image.dimensions(), (30, 40));
        assert_eq!(frame.roi_offset, (10, 10));
    }

    #[test]
    fn falls_back_when_roi_outside_image() {
        let bytes = encode_png(50, 50);
        let roi = Roi { x: 1000, y: 1000, width: 30, height: 30 };
        let frame = decode_and_crop(&bytes, roi, "cam0").unwrap();
        assert!(frame.roi_fallback);
        assert_eq!(frame.image.dimensions(), (50, 50));
    }

    #[test]
    fn falls_back_when_roi_empty() {
        let bytes = encode_png(50, 50);
        let roi = Roi { x: 0, y: 0, width: 0, height: 0 };
        let frame = decode_and_crop(&bytes, roi, "cam0").unwrap();
        assert!(frame.roi_fallback);
    }

    #[test]
    fn decode_failed_on_garbage_bytes() {
        let err = decode_and_crop(&[1, 2, 3, 4, 5, 6, 7, 8, 9], Roi { x: 0, y: 0, width: 1, height: 1 }, "cam0")
            .unwrap_err();
        assert!(matches!(err, DartVisionError::DecodeFailed { .. }));
    }
}
