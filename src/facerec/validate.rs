use image::ImageFormat;
use zune_jpeg::JpegDecoder;
use zune_jpeg::zune_core::colorspace::ColorSpace;

use crate::errors::RecognizeError;

pub const MIN_DIMENSION: u32 = 300;
pub const MAX_DIMENSION: u32 = 5000;

/// Cheap pre-check of an uploaded photo before any extraction work.
///
/// Only the header is parsed, never the full pixel data. The image must be
/// a JPEG within the accepted dimension range, stored in the YCbCr color
/// model; grayscale and Adobe CMYK/YCCK files are rejected. The declared
/// input colorspace matters here, which is why this reads the header
/// through zune-jpeg instead of a decoder that has already converted
/// everything to RGB. Header parsing is orders of magnitude cheaper than
/// face extraction, so this runs before a job is even queued.
pub fn validate_image(data: &[u8]) -> Result<(), RecognizeError> {
    let format = image::guess_format(data).map_err(|_| RecognizeError::BadImage)?;
    if format != ImageFormat::Jpeg {
        return Err(RecognizeError::BadImage);
    }

    let mut decoder = JpegDecoder::new(data);
    decoder.decode_headers().map_err(|_| RecognizeError::BadImage)?;

    let (width, height) = decoder.dimensions().ok_or(RecognizeError::BadImage)?;
    let (width, height) = (width as u32, height as u32);
    if width < MIN_DIMENSION
        || height < MIN_DIMENSION
        || width > MAX_DIMENSION
        || height > MAX_DIMENSION
    {
        return Err(RecognizeError::BadImage);
    }

    if decoder.get_input_colorspace() != Some(ColorSpace::YCbCr) {
        return Err(RecognizeError::BadImage);
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::testimg::*;
    use super::*;

    #[rstest]
    #[case(MIN_DIMENSION, MIN_DIMENSION)]
    #[case(MIN_DIMENSION, MAX_DIMENSION / 4)]
    #[case(1024, 768)]
    fn accepts_color_jpeg_within_range(#[case] width: u32, #[case] height: u32) {
        assert!(validate_image(&jpeg(width, height, 0)).is_ok());
    }

    #[rstest]
    #[case(MIN_DIMENSION - 1, MIN_DIMENSION)]
    #[case(MIN_DIMENSION, MIN_DIMENSION - 1)]
    #[case(MAX_DIMENSION + 1, MIN_DIMENSION)]
    #[case(10, 10)]
    fn rejects_out_of_range_dimensions(#[case] width: u32, #[case] height: u32) {
        assert!(matches!(validate_image(&jpeg(width, height, 0)), Err(RecognizeError::BadImage)));
    }

    #[test]
    fn rejects_grayscale_jpeg() {
        let data = gray_jpeg(400, 400);
        assert!(matches!(validate_image(&data), Err(RecognizeError::BadImage)));
    }

    #[test]
    fn rejects_four_component_jpeg() {
        let data = cmyk_jpeg(400, 400);
        assert!(matches!(validate_image(&data), Err(RecognizeError::BadImage)));
    }

    #[test]
    fn rejects_wrong_format() {
        let data = png(400, 400);
        assert!(matches!(validate_image(&data), Err(RecognizeError::BadImage)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(validate_image(b"not an image"), Err(RecognizeError::BadImage)));
        assert!(matches!(validate_image(&[]), Err(RecognizeError::BadImage)));
    }
}
