//! Image decoding and tensor preparation.

use image::imageops::{self, FilterType};

use crate::config::Normalization;
use crate::error::InferenceError;

/// A single `size x size x 3` image in row-major HWC order.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub size: u32,
    pub data: Vec<f32>,
}

impl Tensor {
    /// Rows of RGB triples, the nested layout TF Serving expects.
    pub fn rows(&self) -> Vec<Vec<[f32; 3]>> {
        self.data
            .chunks_exact(3)
            .map(|px| [px[0], px[1], px[2]])
            .collect::<Vec<_>>()
            .chunks(self.size as usize)
            .map(<[[f32; 3]]>::to_vec)
            .collect()
    }
}

/// Decode `bytes` (PNG, JPEG, BMP or TIFF), convert to RGB, resize
/// bilinearly to `size x size` and normalise.
///
/// CPU-bound; call from `spawn_blocking`.
pub fn preprocess(
    bytes: &[u8],
    size: u32,
    normalization: Normalization,
) -> Result<Tensor, InferenceError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| InferenceError::InvalidImage(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(InferenceError::InvalidImage("image has no pixels".to_string()));
    }

    let rgb = decoded.to_rgb8();
    let resized = imageops::resize(&rgb, size, size, FilterType::Triangle);

    let data: Vec<f32> = resized
        .as_raw()
        .iter()
        .map(|&v| normalization.apply(v))
        .collect();
    if data.iter().any(|v| !v.is_finite()) {
        return Err(InferenceError::InvalidImage(
            "preprocessed image contains NaN or Inf values".to_string(),
        ));
    }

    Ok(Tensor { size, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32, colour: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, Rgb(colour));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn resizes_to_square_input() {
        let tensor = preprocess(&png_bytes(64, 32, [10, 20, 30]), 16, Normalization::Passthrough)
            .unwrap();
        assert_eq!(tensor.size, 16);
        assert_eq!(tensor.data.len(), 16 * 16 * 3);
        assert_eq!(&tensor.data[..3], &[10.0, 20.0, 30.0]);
    }

    #[test]
    fn symmetric_normalization_applied() {
        let tensor =
            preprocess(&png_bytes(4, 4, [255, 0, 255]), 2, Normalization::Symmetric).unwrap();
        assert_eq!(&tensor.data[..3], &[1.0, -1.0, 1.0]);
    }

    #[test]
    fn garbage_bytes_are_invalid_image() {
        let err = preprocess(b"definitely not an image", 8, Normalization::Passthrough)
            .unwrap_err();
        assert_matches!(err, InferenceError::InvalidImage(_));
        assert!(err.is_invalid_input());
    }

    #[test]
    fn rows_follow_hwc_layout() {
        let tensor = preprocess(&png_bytes(2, 2, [1, 2, 3]), 2, Normalization::Passthrough)
            .unwrap();
        let rows = tensor.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[1][1], [1.0, 2.0, 3.0]);
    }
}
