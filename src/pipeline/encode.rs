//! Image encoding: uploaded bytes → base64 payload wrapped for the vision API.
//!
//! Vision APIs accept images as base64 data-URIs embedded in the JSON
//! request body. The upload is sent exactly as received: no re-encoding, so
//! a JPEG stays a JPEG and decoding the payload gives back the original
//! bytes. The image is still fully decoded once to reject non-image and
//! truncated files before any network call is made.
//!
//! `detail: "high"` asks GPT-4-class models to tile the image at full
//! resolution; small print on lab slips is lost at low detail.

use crate::error::StageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::debug;

/// Image formats the upload control accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// MIME type for the data URI.
    pub fn media_type(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
        }
    }
}

/// A base64 payload ready to embed in a vision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Standard-alphabet base64 of the original bytes.
    pub data: String,
    /// Detected encoding of the original bytes.
    pub kind: ImageKind,
    /// Size of the original image in bytes.
    pub byte_len: usize,
}

impl EncodedImage {
    pub fn media_type(&self) -> &'static str {
        self.kind.media_type()
    }

    /// `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type(), self.data)
    }

    /// Provider attachment at high detail.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.data.clone(), self.media_type()).with_detail("high")
    }
}

/// Validate an uploaded image and base64-encode its bytes.
///
/// # Errors
/// [`StageError::ImageDecode`] when the bytes are not a JPEG or PNG image,
/// or when the image header is fine but the pixel data is corrupt.
pub fn encode_image(bytes: &[u8]) -> Result<EncodedImage, StageError> {
    if bytes.is_empty() {
        return Err(StageError::ImageDecode {
            detail: "file is empty".into(),
        });
    }

    let kind = match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => ImageKind::Jpeg,
        Ok(ImageFormat::Png) => ImageKind::Png,
        Ok(other) => {
            return Err(StageError::ImageDecode {
                detail: format!("unsupported image format {other:?}; expected JPEG or PNG"),
            })
        }
        Err(_) => {
            return Err(StageError::ImageDecode {
                detail: "file is not a recognised image".into(),
            })
        }
    };

    image::load_from_memory_with_format(bytes, kind.image_format()).map_err(|e| {
        StageError::ImageDecode {
            detail: e.to_string(),
        }
    })?;

    let data = STANDARD.encode(bytes);
    debug!(
        "Encoded {} image: {} bytes → {} bytes base64",
        kind.media_type(),
        bytes.len(),
        data.len()
    );

    Ok(EncodedImage {
        data,
        kind,
        byte_len: bytes.len(),
    })
}

/// Same as [`encode_image`], reading the bytes from a file-like handle first.
pub fn encode_reader<R: Read>(mut reader: R) -> Result<EncodedImage, StageError> {
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .map_err(|e| StageError::ImageDecode {
            detail: format!("could not read image: {e}"),
        })?;
    encode_image(&buf)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    /// A small, valid image in the requested format.
    pub(crate) fn sample_image(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 8, Rgb([200, 30, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format)
            .expect("encode sample");
        buf
    }

    #[test]
    fn png_round_trips_exactly() {
        let bytes = sample_image(ImageFormat::Png);
        let enc = encode_image(&bytes).expect("png should encode");
        assert_eq!(enc.kind, ImageKind::Png);
        assert_eq!(enc.byte_len, bytes.len());
        assert_eq!(STANDARD.decode(&enc.data).unwrap(), bytes);
    }

    #[test]
    fn jpeg_keeps_its_format() {
        let bytes = sample_image(ImageFormat::Jpeg);
        let enc = encode_image(&bytes).expect("jpeg should encode");
        assert_eq!(enc.media_type(), "image/jpeg");
        assert_eq!(STANDARD.decode(&enc.data).unwrap(), bytes);
        assert!(enc.data_uri().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn text_disguised_as_image_is_rejected() {
        let err = encode_image(b"Hemoglobin: 13.2 g/dL\n").unwrap_err();
        assert!(matches!(err, StageError::ImageDecode { .. }));
    }

    #[test]
    fn truncated_png_is_rejected() {
        let bytes = sample_image(ImageFormat::Png);
        let err = encode_image(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, StageError::ImageDecode { .. }), "got {err:?}");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(encode_image(&[]).is_err());
    }

    #[test]
    fn reader_matches_slice() {
        let bytes = sample_image(ImageFormat::Png);
        let a = encode_image(&bytes).unwrap();
        let b = encode_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn image_data_is_high_detail() {
        let enc = encode_image(&sample_image(ImageFormat::Png)).unwrap();
        let data = enc.to_image_data();
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(data.data, enc.data);
        assert_eq!(data.detail.as_deref(), Some("high"));
    }
}
