use image::{
    imageops::{self, FilterType},
    RgbaImage,
};
use ndarray::{Array3, Axis};
use tracing::instrument;

/// Longest side the detector input is scaled down to. Images already smaller
/// are never upscaled.
pub const DET_TARGET_SIZE: u32 = 960;
/// The detector requires both axes padded to a multiple of this stride.
pub const DET_STRIDE: u32 = 32;
/// Border color of the letterbox padding, before normalization.
const PAD_VALUE: f32 = 114.0;

/// Resize/padding bookkeeping for one detector pass. The box fitter uses it
/// to map boxes from probability-field coordinates back into original-image
/// pixel space.
#[derive(Debug, Clone, Copy)]
pub struct Letterbox {
    /// Original-to-resized scale factor, always <= 1.
    pub scale: f32,
    /// Total horizontal padding, split evenly on both sides.
    pub pad_x: u32,
    /// Total vertical padding, split evenly on both sides.
    pub pad_y: u32,
    /// Padded tensor width.
    pub width: u32,
    /// Padded tensor height.
    pub height: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Letterbox {
    /// Identity letterbox, for probability fields that were never resized.
    pub fn none(width: u32, height: u32) -> Self {
        Self {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
            width,
            height,
            scaled_width: width,
            scaled_height: height,
        }
    }
}

/// Computes the letterbox geometry for an input image: scale the longest side
/// down to [`DET_TARGET_SIZE`], then pad both axes up to the next multiple of
/// [`DET_STRIDE`].
pub fn letterbox_dims(img_w: u32, img_h: u32) -> Letterbox {
    let mut w = img_w;
    let mut h = img_h;
    let mut scale = 1.0f32;
    if img_w.max(img_h) > DET_TARGET_SIZE {
        if img_w > img_h {
            scale = DET_TARGET_SIZE as f32 / img_w as f32;
            w = DET_TARGET_SIZE;
            h = ((img_h as f32 * scale) as u32).max(1);
        } else {
            scale = DET_TARGET_SIZE as f32 / img_h as f32;
            h = DET_TARGET_SIZE;
            w = ((img_w as f32 * scale) as u32).max(1);
        }
    }

    let pad_x = w.div_ceil(DET_STRIDE) * DET_STRIDE - w;
    let pad_y = h.div_ceil(DET_STRIDE) * DET_STRIDE - h;
    Letterbox {
        scale,
        pad_x,
        pad_y,
        width: w + pad_x,
        height: h + pad_y,
        scaled_width: w,
        scaled_height: h,
    }
}

/// Builds the detector input: bilinear resize, RGBA to BGR, letterbox padding
/// with the constant border, then `(v - mean) * norm` per channel, planar CHW.
#[instrument(level = "trace", skip(image))]
pub fn detector_tensor(
    image: &RgbaImage,
    letterbox: &Letterbox,
    mean: &[f32; 3],
    norm: &[f32; 3],
) -> Array3<f32> {
    let resized = imageops::resize(
        image,
        letterbox.scaled_width,
        letterbox.scaled_height,
        FilterType::Triangle,
    );

    let mut tensor = Array3::zeros((3, letterbox.height as usize, letterbox.width as usize));
    for (channel, (&m, &n)) in mean.iter().zip(norm.iter()).enumerate() {
        tensor
            .index_axis_mut(Axis(0), channel)
            .fill((PAD_VALUE - m) * n);
    }

    let left = (letterbox.pad_x / 2) as usize;
    let top = (letterbox.pad_y / 2) as usize;
    for (x, y, px) in resized.enumerate_pixels() {
        let [r, g, b, _] = px.0;
        let bgr = [b as f32, g as f32, r as f32];
        for (channel, value) in bgr.into_iter().enumerate() {
            tensor[[channel, top + y as usize, left + x as usize]] =
                (value - mean[channel]) * norm[channel];
        }
    }
    tensor
}

/// In-place `(v - mean) * norm` per channel on a planar CHW tensor.
pub fn normalize_planar(tensor: &mut Array3<f32>, mean: &[f32; 3], norm: &[f32; 3]) {
    for (channel, (&m, &n)) in mean.iter().zip(norm.iter()).enumerate() {
        tensor
            .index_axis_mut(Axis(0), channel)
            .mapv_inplace(|v| (v - m) * n);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn small_images_only_pad() {
        let lb = letterbox_dims(100, 100);
        assert_relative_eq!(lb.scale, 1.0);
        assert_eq!((lb.scaled_width, lb.scaled_height), (100, 100));
        assert_eq!((lb.pad_x, lb.pad_y), (28, 28));
        assert_eq!((lb.width, lb.height), (128, 128));
    }

    #[test]
    fn large_images_scale_longest_side_to_target() {
        let lb = letterbox_dims(1920, 1080);
        assert_relative_eq!(lb.scale, 0.5);
        assert_eq!((lb.scaled_width, lb.scaled_height), (960, 540));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 4));
        assert_eq!((lb.width, lb.height), (960, 544));
        assert_eq!(lb.width % DET_STRIDE, 0);
        assert_eq!(lb.height % DET_STRIDE, 0);
    }

    #[test]
    fn stride_aligned_input_needs_no_padding() {
        let lb = letterbox_dims(960, 960);
        assert_eq!((lb.pad_x, lb.pad_y), (0, 0));
        assert_eq!((lb.width, lb.height), (960, 960));
    }

    #[test]
    fn detector_tensor_is_bgr_planar_and_padded() {
        // A 2x2 pure-red image inside a 100x100 canvas checks channel order.
        let mut image = RgbaImage::new(100, 100);
        for px in image.pixels_mut() {
            *px = image::Rgba([255, 0, 0, 255]);
        }
        let lb = letterbox_dims(100, 100);
        let mean = [0.0, 0.0, 0.0];
        let norm = [1.0, 1.0, 1.0];
        let tensor = detector_tensor(&image, &lb, &mean, &norm);
        assert_eq!(tensor.shape(), &[3, 128, 128]);

        let left = (lb.pad_x / 2) as usize;
        let top = (lb.pad_y / 2) as usize;
        // Red lands in the last (R) plane of the BGR tensor.
        assert_relative_eq!(tensor[[0, top + 1, left + 1]], 0.0);
        assert_relative_eq!(tensor[[2, top + 1, left + 1]], 255.0);
        // Padding keeps the border constant.
        assert_relative_eq!(tensor[[0, 0, 0]], 114.0);
        assert_relative_eq!(tensor[[2, 127, 127]], 114.0);
    }

    #[test]
    fn normalize_planar_applies_per_channel() {
        let mut tensor = Array3::from_elem((3, 2, 2), 255.0);
        normalize_planar(&mut tensor, &[127.5, 127.5, 127.5], &[
            1.0 / 127.5,
            1.0 / 127.5,
            1.0 / 127.5,
        ]);
        assert_relative_eq!(tensor[[1, 0, 0]], 1.0);
    }
}
