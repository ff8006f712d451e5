use image::{GrayImage, RgbImage};

/// Normalised intensity in `[0, 1]` of a grayscale pixel.
pub fn intensity(img: &GrayImage, x: u32, y: u32) -> f32 {
    img.get_pixel(x, y)[0] as f32 / 255.0
}

pub fn get_pixel_rgb(img: &RgbImage, x: u32, y: u32) -> [u8; 3] {
    img.get_pixel(x, y).0
}

pub fn convert_rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    image::imageops::grayscale(rgb)
}

/// Bilinearly interpolated intensity in `[0, 1]` at continuous coordinates.
///
/// Pixel centres sit at `+0.5`. Returns `None` unless all four contributing
/// pixels are inside the image, which leaves a one pixel margin along the
/// right and bottom borders.
pub fn sample_bilinear(img: &GrayImage, x: f64, y: f64) -> Option<f32> {
    let fx = x - 0.5;
    let fy = y - 0.5;
    let u = fx.floor();
    let v = fy.floor();
    if !(u >= 0.0 && v >= 0.0) {
        return None;
    }
    let (u, v) = (u as u64, v as u64);
    if u + 1 >= img.width() as u64 || v + 1 >= img.height() as u64 {
        return None;
    }
    let (u, v) = (u as u32, v as u32);

    let dx = (fx - u as f64) as f32;
    let dy = (fy - v as f64) as f32;

    let i00 = intensity(img, u, v);
    let i10 = intensity(img, u + 1, v);
    let i01 = intensity(img, u, v + 1);
    let i11 = intensity(img, u + 1, v + 1);

    let top = i00 * (1.0 - dx) + i10 * dx;
    let bottom = i01 * (1.0 - dx) + i11 * dx;
    Some(top * (1.0 - dy) + bottom * dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn ramp() -> GrayImage {
        GrayImage::from_fn(4, 4, |x, _| Luma([(x * 50) as u8]))
    }

    #[test]
    fn test_sample_bilinear_at_pixel_centre() {
        let img = ramp();
        let v = sample_bilinear(&img, 1.5, 1.5).unwrap();
        assert!((v - 50.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_sample_bilinear_between_pixels() {
        let img = ramp();
        let v = sample_bilinear(&img, 2.0, 1.5).unwrap();
        assert!((v - 75.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_sample_bilinear_border() {
        let img = ramp();
        assert!(sample_bilinear(&img, 0.2, 1.5).is_none());
        assert!(sample_bilinear(&img, 3.6, 1.5).is_none());
        assert!(sample_bilinear(&img, 1.5, -4.0).is_none());
        assert!(sample_bilinear(&img, f64::NAN, 1.5).is_none());
        assert!(sample_bilinear(&img, 3.4, 3.4).is_some());
    }
}
