use std::time::Instant;

use frameocr::FrameOCRBuilder;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

fn main() {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let image_path = args
        .next()
        .unwrap_or_else(|| "tests/data/test_image.png".to_string());

    let image = image::open(&image_path)
        .expect("failed to load input image")
        .to_rgba8();

    let ocr = FrameOCRBuilder::new()
        .det_model("models/PP-OCRv5_mobile_det.onnx")
        .rec_model(
            "models/PP-OCRv5_mobile_rec.onnx",
            "models/ppocrv5_dict.txt",
        )
        .build()
        .expect("failed to build engine");
    ocr.warmup().expect("warmup failed");

    let start = Instant::now();
    let json = ocr
        .detect_json(image.as_raw(), image.width(), image.height())
        .expect("detection failed");
    log::debug!("{:?}", start.elapsed());
    println!("{json}");
}
