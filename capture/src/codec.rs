//! Image decoding (BMP, JPEG, PNG) and encoding (JPEG, deflate TIFF).
//!
//! Both directions report the time they took; those durations end up in
//! the per-tick metric.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use tiff::encoder::compression::Deflate;
use tiff::encoder::{colortype, TiffEncoder};

use ipeye_common::config::OutputFormat;

use crate::error::CaptureError;
use crate::timing::Timed;

pub const JPEG_QUALITY: u8 = 90;

/// Formats the decoder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFormat {
    Bmp,
    Jpeg,
    Png,
}

impl DecodeFormat {
    fn image_format(self) -> ImageFormat {
        match self {
            Self::Bmp => ImageFormat::Bmp,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Bmp => "BMP",
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
        }
    }
}

/// What the response's `Content-Type` declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFormat {
    Supported(DecodeFormat),
    Unsupported(String),
}

impl SourceFormat {
    /// Parameters such as `; charset=…` are ignored, case is not significant.
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "image/bmp" | "image/x-ms-bmp" => Self::Supported(DecodeFormat::Bmp),
            "image/jpeg" | "image/jpg" => Self::Supported(DecodeFormat::Jpeg),
            "image/png" => Self::Supported(DecodeFormat::Png),
            _ => Self::Unsupported(content_type.to_string()),
        }
    }
}

/// Decode `bytes` as the declared format.
pub fn decode(bytes: &[u8], format: DecodeFormat) -> Timed<Result<DynamicImage, CaptureError>> {
    Timed::measure(|| {
        image::load_from_memory_with_format(bytes, format.image_format()).map_err(|source| {
            CaptureError::Decode {
                format: format.label(),
                source,
            }
        })
    })
}

/// Encode `image` into the target format.
pub fn encode(image: &DynamicImage, format: OutputFormat) -> Timed<Result<Vec<u8>, CaptureError>> {
    Timed::measure(|| match format {
        OutputFormat::Jpeg => encode_jpeg(image),
        OutputFormat::Tiff => encode_tiff(image),
    })
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, CaptureError> {
    let fail = |e: image::ImageError| CaptureError::Encode {
        format: "JPEG",
        reason: e.to_string(),
    };

    let mut out = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
        match image {
            DynamicImage::ImageLuma8(gray) => encoder.encode_image(gray).map_err(fail)?,
            // JPEG has no alpha channel.
            other => encoder.encode_image(&other.to_rgb8()).map_err(fail)?,
        }
    }
    Ok(out)
}

fn encode_tiff(image: &DynamicImage) -> Result<Vec<u8>, CaptureError> {
    let fail = |e: tiff::TiffError| CaptureError::Encode {
        format: "TIFF",
        reason: e.to_string(),
    };

    let (width, height) = (image.width(), image.height());
    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut out).map_err(fail)?;
        let compression = Deflate::default();
        match image {
            DynamicImage::ImageLuma8(gray) => encoder
                .write_image_with_compression::<colortype::Gray8, _>(
                    width,
                    height,
                    compression,
                    gray.as_raw(),
                )
                .map_err(fail)?,
            DynamicImage::ImageLuma16(gray) => encoder
                .write_image_with_compression::<colortype::Gray16, _>(
                    width,
                    height,
                    compression,
                    gray.as_raw(),
                )
                .map_err(fail)?,
            DynamicImage::ImageRgb16(rgb) => encoder
                .write_image_with_compression::<colortype::RGB16, _>(
                    width,
                    height,
                    compression,
                    rgb.as_raw(),
                )
                .map_err(fail)?,
            DynamicImage::ImageRgba16(rgba) => encoder
                .write_image_with_compression::<colortype::RGBA16, _>(
                    width,
                    height,
                    compression,
                    rgba.as_raw(),
                )
                .map_err(fail)?,
            DynamicImage::ImageLumaA16(_) => encoder
                .write_image_with_compression::<colortype::RGBA16, _>(
                    width,
                    height,
                    compression,
                    image.to_rgba16().as_raw(),
                )
                .map_err(fail)?,
            other if other.color().has_alpha() => encoder
                .write_image_with_compression::<colortype::RGBA8, _>(
                    width,
                    height,
                    compression,
                    other.to_rgba8().as_raw(),
                )
                .map_err(fail)?,
            other => encoder
                .write_image_with_compression::<colortype::RGB8, _>(
                    width,
                    height,
                    compression,
                    other.to_rgb8().as_raw(),
                )
                .map_err(fail)?,
        }
    }
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn to_bytes(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_source_format_from_content_type() {
        let supported = SourceFormat::Supported;
        assert_eq!(SourceFormat::from_content_type("image/bmp"), supported(DecodeFormat::Bmp));
        assert_eq!(
            SourceFormat::from_content_type("image/x-ms-bmp"),
            supported(DecodeFormat::Bmp)
        );
        assert_eq!(SourceFormat::from_content_type("image/jpg"), supported(DecodeFormat::Jpeg));
        assert_eq!(SourceFormat::from_content_type("Image/JPEG"), supported(DecodeFormat::Jpeg));
        assert_eq!(
            SourceFormat::from_content_type("image/png; charset=binary"),
            supported(DecodeFormat::Png)
        );
        assert_eq!(
            SourceFormat::from_content_type("image/gif"),
            SourceFormat::Unsupported("image/gif".into())
        );
        assert_eq!(
            SourceFormat::from_content_type(""),
            SourceFormat::Unsupported(String::new())
        );
    }

    #[test]
    fn test_decode_supported_formats() {
        let img = DynamicImage::ImageRgb8(gradient(16, 9));
        for (format, source) in [
            (ImageFormat::Png, DecodeFormat::Png),
            (ImageFormat::Bmp, DecodeFormat::Bmp),
            (ImageFormat::Jpeg, DecodeFormat::Jpeg),
        ] {
            let decoded = decode(&to_bytes(&img, format), source).value.unwrap();
            assert_eq!((decoded.width(), decoded.height()), (16, 9));
        }
    }

    #[test]
    fn test_decode_malformed() {
        let timed = decode(b"definitely not a png", DecodeFormat::Png);
        assert!(matches!(timed.value, Err(CaptureError::Decode { format: "PNG", .. })));
    }

    #[test]
    fn test_tiff_round_trip_is_lossless() {
        let original = gradient(40, 30);
        let bytes = encode(&DynamicImage::ImageRgb8(original.clone()), OutputFormat::Tiff)
            .value
            .unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Tiff).unwrap();
        assert_eq!(decoded.to_rgb8(), original);
    }

    #[test]
    fn test_tiff_keeps_gray_and_alpha() {
        let gray = GrayImage::from_fn(8, 8, |x, y| Luma([(x * 30 + y) as u8]));
        let bytes = encode(&DynamicImage::ImageLuma8(gray.clone()), OutputFormat::Tiff)
            .value
            .unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Tiff).unwrap();
        assert_eq!(decoded.to_luma8(), gray);

        let rgba = RgbaImage::from_fn(8, 8, |x, y| Rgba([x as u8, y as u8, 200, (x * y) as u8]));
        let bytes = encode(&DynamicImage::ImageRgba8(rgba.clone()), OutputFormat::Tiff)
            .value
            .unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Tiff).unwrap();
        assert_eq!(decoded.to_rgba8(), rgba);
    }

    #[test]
    fn test_tiff_keeps_16_bit() {
        let rgb = ImageBuffer::<Rgb<u16>, Vec<u16>>::from_fn(6, 4, |x, y| {
            Rgb([1000 + x as u16, 2000 + y as u16, 3001])
        });
        let bytes = encode(&DynamicImage::ImageRgb16(rgb.clone()), OutputFormat::Tiff)
            .value
            .unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Tiff).unwrap();
        assert!(matches!(decoded, DynamicImage::ImageRgb16(_)));
        assert_eq!(decoded.to_rgb16(), rgb);

        let gray = ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(5, 5, |x, y| {
            Luma([(x * 10_000 + y) as u16])
        });
        let bytes = encode(&DynamicImage::ImageLuma16(gray.clone()), OutputFormat::Tiff)
            .value
            .unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Tiff).unwrap();
        assert_eq!(decoded.to_luma16(), gray);

        let rgba = ImageBuffer::<Rgba<u16>, Vec<u16>>::from_pixel(3, 3, Rgba([1, 258, 65_000, 4097]));
        let bytes = encode(&DynamicImage::ImageRgba16(rgba.clone()), OutputFormat::Tiff)
            .value
            .unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Tiff).unwrap();
        assert_eq!(decoded.to_rgba16(), rgba);
    }

    #[test]
    fn test_jpeg_round_trip_keeps_dimensions() {
        let rgba = RgbaImage::from_pixel(33, 17, Rgba([10, 120, 240, 128]));
        let bytes = encode(&DynamicImage::ImageRgba8(rgba), OutputFormat::Jpeg)
            .value
            .unwrap();
        let decoded = decode(&bytes, DecodeFormat::Jpeg).value.unwrap();
        assert_eq!((decoded.width(), decoded.height()), (33, 17));
    }
}
