//! Conversion of supported image encodings into the canonical lossless WebP form

use crate::error::NormalizeError;
use crate::types::CANONICAL_FORMAT;
use bytes::Bytes;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

/// Output of a successful normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Canonical (lossless WebP) bytes
    pub data: Bytes,
    /// Tag of the encoding the input was detected as
    pub source_format: String,
}

/// Whether a format tag already names the canonical encoding
pub fn is_canonical(format: &str) -> bool {
    format.eq_ignore_ascii_case(CANONICAL_FORMAT)
}

/// Decode `raw` in any supported encoding and re-encode it as lossless WebP.
///
/// Input that is already WebP is validated and returned as-is, which makes
/// `normalize(normalize(x).data)` equal to `normalize(x)` byte for byte.
pub fn normalize(raw: Bytes) -> Result<Normalized, NormalizeError> {
    let format =
        image::guess_format(&raw).map_err(|e| NormalizeError::NotAnImage(e.to_string()))?;
    let source_format = format_tag(format).ok_or_else(|| {
        NormalizeError::NotAnImage(format!("unsupported encoding {:?}", format))
    })?;

    let decoded = image::load_from_memory_with_format(&raw, format)
        .map_err(|e| NormalizeError::NotAnImage(e.to_string()))?;

    if format == ImageFormat::WebP {
        return Ok(Normalized {
            data: raw,
            source_format: source_format.to_string(),
        });
    }

    let rgba = decoded.to_rgba8();
    let mut buf = Vec::new();
    WebPEncoder::new_lossless(&mut buf)
        .write_image(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| NormalizeError::Encode(e.to_string()))?;

    Ok(Normalized {
        data: Bytes::from(buf),
        source_format: source_format.to_string(),
    })
}

fn format_tag(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("jpeg"),
        ImageFormat::Png => Some("png"),
        ImageFormat::Gif => Some("gif"),
        ImageFormat::WebP => Some(CANONICAL_FORMAT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{jpeg_bytes, png_bytes};

    #[test]
    fn test_png_becomes_webp() {
        let out = normalize(png_bytes(8, 6)).unwrap();
        assert_eq!(out.source_format, "png");
        assert_eq!(
            image::guess_format(&out.data).unwrap(),
            ImageFormat::WebP
        );
    }

    #[test]
    fn test_jpeg_source_tag() {
        let out = normalize(jpeg_bytes(16, 16)).unwrap();
        assert_eq!(out.source_format, "jpeg");
        assert_eq!(
            image::guess_format(&out.data).unwrap(),
            ImageFormat::WebP
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let first = normalize(png_bytes(5, 7)).unwrap();
        let second = normalize(first.data.clone()).unwrap();

        assert_eq!(second.data, first.data);
        assert_eq!(second.source_format, CANONICAL_FORMAT);
    }

    #[test]
    fn test_conversion_is_lossless() {
        let png = png_bytes(4, 4);
        let original = image::load_from_memory(&png).unwrap().to_rgba8();

        let out = normalize(png).unwrap();
        let roundtrip = image::load_from_memory(&out.data).unwrap().to_rgba8();

        assert_eq!(roundtrip.dimensions(), original.dimensions());
        assert_eq!(roundtrip.as_raw(), original.as_raw());
    }

    #[test]
    fn test_text_is_not_an_image() {
        let result = normalize(Bytes::from_static(b"just some text, not pixels"));
        assert!(matches!(result, Err(NormalizeError::NotAnImage(_))));
    }

    #[test]
    fn test_truncated_png_is_not_an_image() {
        let png = png_bytes(8, 8);
        let truncated = png.slice(..png.len() / 2);
        assert!(matches!(
            normalize(truncated),
            Err(NormalizeError::NotAnImage(_))
        ));
    }

    #[test]
    fn test_is_canonical() {
        assert!(is_canonical("webp"));
        assert!(is_canonical("WebP"));
        assert!(!is_canonical("jpeg"));
    }
}
