//! Rectification tests on synthetic RGBA frames: strip sizing, the corner
//! triplet protocol per orientation, and off-image failure.

use frameocr::geometry::{rectify_region, Point, RotatedRect, Size, STRIP_HEIGHT};
use frameocr::{Error, Object, Orientation};

fn solid_frame(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba.repeat((width * height) as usize)
}

fn object(cx: f32, cy: f32, w: f32, h: f32, angle: f32, orientation: Orientation) -> Object {
    Object {
        rrect: RotatedRect {
            center: Point { x: cx, y: cy },
            size: Size {
                width: w,
                height: h,
            },
            angle,
        },
        orientation,
        prob: 1.0,
        text: Vec::new(),
    }
}

#[test]
fn constant_region_rectifies_to_a_constant_strip() {
    let frame = solid_frame(60, 60, [10, 20, 30, 255]);
    let obj = object(30.0, 30.0, 8.0, 20.0, 90.0, Orientation::Horizontal);

    let strip = rectify_region(&frame, 60, 60, &obj).unwrap();
    // Width follows height/width * 48 = 20 * 48 / 8.
    assert_eq!(strip.shape(), &[3, STRIP_HEIGHT, 120]);

    // BGR planar: plane 0 carries the source blue channel.
    for (&expected, channel) in [30.0, 20.0, 10.0].iter().zip(0..3) {
        for &v in strip.index_axis(ndarray::Axis(0), channel).iter() {
            assert!((v - expected).abs() < 1e-3);
        }
    }
}

#[test]
fn horizontal_strips_read_left_to_right() {
    // Left half red, right half blue.
    let mut frame = solid_frame(60, 60, [255, 0, 0, 255]);
    for y in 0..60usize {
        for x in 30..60usize {
            let off = (y * 60 + x) * 4;
            frame[off..off + 4].copy_from_slice(&[0, 0, 255, 255]);
        }
    }
    // Upright horizontal box in normal form (angle 90): spans x 20..40.
    let obj = object(30.0, 30.0, 8.0, 20.0, 90.0, Orientation::Horizontal);
    let strip = rectify_region(&frame, 60, 60, &obj).unwrap();

    // Column 2 samples near image x=20 (red), column 117 near x=40 (blue).
    assert!((strip[[2, 24, 2]] - 255.0).abs() < 1.0);
    assert!(strip[[0, 24, 2]] < 1.0);
    assert!((strip[[0, 24, 117]] - 255.0).abs() < 1.0);
    assert!(strip[[2, 24, 117]] < 1.0);
}

#[test]
fn vertical_strips_read_top_to_bottom() {
    // Top half green, bottom half magenta.
    let mut frame = solid_frame(60, 60, [0, 255, 0, 255]);
    for y in 30..60usize {
        for x in 0..60usize {
            let off = (y * 60 + x) * 4;
            frame[off..off + 4].copy_from_slice(&[255, 0, 255, 255]);
        }
    }
    // Tall vertical box in normal form (angle 0): spans y 20..40.
    let obj = object(30.0, 30.0, 8.0, 20.0, 0.0, Orientation::Vertical);
    let strip = rectify_region(&frame, 60, 60, &obj).unwrap();
    assert_eq!(strip.shape(), &[3, STRIP_HEIGHT, 120]);

    // The strip's x axis runs down the image: green first, magenta last.
    assert!((strip[[1, 24, 2]] - 255.0).abs() < 1.0);
    assert!(strip[[1, 24, 117]] < 1.0);
    assert!((strip[[0, 24, 117]] - 255.0).abs() < 1.0);
    assert!((strip[[2, 24, 117]] - 255.0).abs() < 1.0);
}

#[test]
fn strip_width_is_capped() {
    let frame = solid_frame(120, 120, [128, 128, 128, 255]);
    let obj = object(60.0, 60.0, 1.0, 100.0, 0.0, Orientation::Horizontal);
    let strip = rectify_region(&frame, 120, 120, &obj).unwrap();
    assert_eq!(strip.shape(), &[3, STRIP_HEIGHT, 2048]);
}

#[test]
fn strip_width_is_floored() {
    let frame = solid_frame(120, 120, [128, 128, 128, 255]);
    let obj = object(60.0, 60.0, 100.0, 10.0, 0.0, Orientation::Horizontal);
    let strip = rectify_region(&frame, 120, 120, &obj).unwrap();
    assert_eq!(strip.shape(), &[3, STRIP_HEIGHT, 16]);
}

#[test]
fn off_image_region_is_an_error() {
    let frame = solid_frame(60, 60, [0, 0, 0, 255]);
    let obj = object(1000.0, 1000.0, 10.0, 10.0, 90.0, Orientation::Horizontal);
    let err = rectify_region(&frame, 60, 60, &obj).unwrap_err();
    assert!(matches!(err, Error::RegionOutsideImage));
}
