use image::imageops::FilterType;
use image::DynamicImage;

const PIXELS_PER_MEGAPIXEL: u64 = 1_000_000;

/// Dimensions after applying the megapixel cap, or `None` when already within it
///
/// Both sides scale by `sqrt(cap / pixels)` and round down, never below 1px.
pub fn capped_dimensions(width: u32, height: u32, max_megapixels: u32) -> Option<(u32, u32)> {
    let pixels = width as u64 * height as u64;
    let cap = max_megapixels as u64 * PIXELS_PER_MEGAPIXEL;
    if pixels <= cap {
        return None;
    }

    let factor = (cap as f64 / pixels as f64).sqrt();
    let mut new_width = ((width as f64 * factor).floor() as u32).max(1);
    let mut new_height = ((height as f64 * factor).floor() as u32).max(1);

    // Float error can leave the product a hair over the cap
    // (and clamping a collapsed side up to 1px can push it further over)
    if new_width as u64 * new_height as u64 > cap {
        if new_width >= new_height {
            new_width = ((cap / new_height as u64) as u32).max(1);
        } else {
            new_height = ((cap / new_width as u64) as u32).max(1);
        }
    }

    Some((new_width, new_height))
}

/// Downscale so width * height fits in `max_megapixels`, Lanczos3 resampling
pub fn cap_megapixels(image: DynamicImage, max_megapixels: u32) -> DynamicImage {
    match capped_dimensions(image.width(), image.height(), max_megapixels) {
        Some((width, height)) => image.resize_exact(width, height, FilterType::Lanczos3),
        None => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_within_cap_is_noop() {
        assert_eq!(capped_dimensions(4000, 3000, 12), None);
        assert_eq!(capped_dimensions(100, 100, 1), None);

        let image = DynamicImage::ImageRgb8(RgbImage::new(300, 200));
        let result = cap_megapixels(image, 1);
        assert_eq!((result.width(), result.height()), (300, 200));
    }

    #[test]
    fn test_over_cap_fits_and_keeps_aspect() {
        for (width, height, cap) in [(4000u32, 3000u32, 2u32), (1600, 1200, 1), (5000, 1000, 3), (4001, 2999, 11)] {
            let (new_width, new_height) = capped_dimensions(width, height, cap).unwrap();
            assert!(new_width as u64 * new_height as u64 <= cap as u64 * PIXELS_PER_MEGAPIXEL);

            let expected_height = new_width as f64 * height as f64 / width as f64;
            assert!(
                (new_height as f64 - expected_height).abs() <= 1.0,
                "{}x{} -> {}x{}",
                width,
                height,
                new_width,
                new_height
            );
        }
    }

    #[test]
    fn test_extreme_aspect_never_hits_zero() {
        let (width, height) = capped_dimensions(10_000_000, 1, 1).unwrap();
        assert_eq!(height, 1);
        assert!(width >= 1 && width as u64 <= PIXELS_PER_MEGAPIXEL);
    }

    #[test]
    fn test_cap_megapixels_resizes() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(1600, 1200));
        let result = cap_megapixels(image, 1);
        assert_eq!((result.width(), result.height()), (1154, 866));
    }
}
