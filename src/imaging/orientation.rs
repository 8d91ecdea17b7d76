use super::codec::save_png;
use crate::error::ProofResult;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::path::{Path, PathBuf};

/// Orientation recorded in the file's metadata, `NoTransforms` when absent
pub fn read_orientation(path: &Path) -> ProofResult<Orientation> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    Ok(decoder.orientation()?)
}

/// Horizontal flip for front-sensor captures
pub fn unmirror(image: &DynamicImage) -> DynamicImage {
    image.fliph()
}

/// Bake metadata orientation (and optional un-mirroring) into the pixels
///
/// The result is written to `output` as PNG, which carries no orientation tag. When the
/// source is already upright and no mirroring is requested, nothing is written and
/// `input` is returned.
pub fn normalize_orientation(input: &Path, output: &Path, unmirror_front: bool) -> ProofResult<PathBuf> {
    let mut decoder = ImageReader::open(input)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;

    if matches!(orientation, Orientation::NoTransforms) && !unmirror_front {
        return Ok(input.to_path_buf());
    }

    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    if unmirror_front {
        image = unmirror(&image);
    }

    save_png(&image, output)?;
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::codec::{decode, encode_jpeg};
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn marked_source(dir: &Path) -> PathBuf {
        // Red marker in the top-left corner, everything else blue
        let image = RgbImage::from_fn(6, 4, |x, y| {
            if x == 0 && y == 0 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let path = dir.join("source.png");
        image.save(&path).unwrap();
        path
    }

    #[test]
    fn test_upright_source_is_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let source = marked_source(temp_dir.path());
        let output = temp_dir.path().join("01_normalize.png");

        assert!(matches!(read_orientation(&source).unwrap(), Orientation::NoTransforms));
        let result = normalize_orientation(&source, &output, false).unwrap();
        assert_eq!(result, source);
        assert!(!output.exists());
    }

    #[test]
    fn test_unmirror_moves_marker() {
        let temp_dir = TempDir::new().unwrap();
        let source = marked_source(temp_dir.path());
        let output = temp_dir.path().join("01_normalize.png");

        let result = normalize_orientation(&source, &output, true).unwrap();
        assert_eq!(result, output);

        let flipped = decode(&output).unwrap().to_rgb8();
        assert_eq!(flipped.dimensions(), (6, 4));
        assert_eq!(flipped.get_pixel(5, 0), &Rgb([255, 0, 0]));
        assert_eq!(flipped.get_pixel(0, 0), &Rgb([0, 0, 255]));
    }

    /// JPEG whose APP1 segment carries only an orientation tag
    fn jpeg_with_orientation(dir: &Path, orientation: u8) -> PathBuf {
        // Red top-left quadrant on blue, large enough to survive compression
        let image = RgbImage::from_fn(60, 40, |x, y| {
            if x < 30 && y < 20 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let jpeg = encode_jpeg(&DynamicImage::ImageRgb8(image), 95).unwrap();

        let mut exif = b"Exif\0\0".to_vec();
        // Little-endian TIFF header, first IFD at offset 8
        exif.extend_from_slice(&[0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00]);
        // One entry: tag 0x0112 (Orientation), SHORT, count 1
        exif.extend_from_slice(&[0x01, 0x00]);
        exif.extend_from_slice(&[0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00]);
        exif.extend_from_slice(&[orientation, 0x00, 0x00, 0x00]);
        // No next IFD
        exif.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let segment_len = (exif.len() + 2) as u16;
        let mut bytes = jpeg[..2].to_vec();
        bytes.extend_from_slice(&[0xFF, 0xE1]);
        bytes.extend_from_slice(&segment_len.to_be_bytes());
        bytes.extend_from_slice(&exif);
        bytes.extend_from_slice(&jpeg[2..]);

        let path = dir.join("rotated.jpg");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_exif_rotation_is_baked_into_pixels() {
        let temp_dir = TempDir::new().unwrap();
        let source = jpeg_with_orientation(temp_dir.path(), 6);
        let output = temp_dir.path().join("01_normalize.png");

        assert!(matches!(read_orientation(&source).unwrap(), Orientation::Rotate90));
        let result = normalize_orientation(&source, &output, false).unwrap();
        assert_eq!(result, output);
        assert!(matches!(read_orientation(&output).unwrap(), Orientation::NoTransforms));

        let upright = decode(&output).unwrap().to_rgb8();
        assert_eq!(upright.dimensions(), (40, 60));
        // Quarter turn clockwise: the top-left block ends up top-right
        let moved = upright.get_pixel(35, 5);
        assert!(moved[0] > 200 && moved[2] < 60, "got {:?}", moved);
        let vacated = upright.get_pixel(5, 5);
        assert!(vacated[2] > 200 && vacated[0] < 60, "got {:?}", vacated);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("broken.jpg");
        std::fs::write(&source, [0u8; 32]).unwrap();
        let output = temp_dir.path().join("out.png");

        assert!(normalize_orientation(&source, &output, false).is_err());
    }
}
