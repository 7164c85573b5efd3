use criterion::{black_box, criterion_group, criterion_main, Criterion};
use page_capture::{encode_image, Config, ImageFormat, SettlePolicy, SettleTracker};
use std::time::Duration;
use tokio::time::Instant;

#[cfg(feature = "chrome_tests")]
use tokio::runtime::Runtime;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

fn benchmark_settle_tracker(c: &mut Criterion) {
    let mut group = c.benchmark_group("settle_tracker");
    configure_fast_group(&mut group);

    let request_ids: Vec<String> = (0..200).map(|i| format!("1000.{i}")).collect();

    group.bench_function("200_requests", |b| {
        b.iter(|| {
            let start = Instant::now();
            let mut tracker = SettleTracker::new(SettlePolicy::default());
            tracker.start_navigation(start).unwrap();
            for id in &request_ids {
                tracker.request_started(id);
            }
            tracker.navigation_succeeded(start).unwrap();
            for id in &request_ids {
                tracker.request_finished(id, start);
            }
            black_box(tracker.poll(start + Duration::from_millis(400)));
        });
    });

    group.finish();
}

fn benchmark_image_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("image_encoding");
    configure_fast_group(&mut group);

    let img = image::RgbaImage::from_pixel(1280, 800, image::Rgba([240, 240, 240, 255]));
    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    group.bench_function("png_to_jpeg_1280x800", |b| {
        b.iter(|| {
            let jpeg = encode_image(png.clone(), ImageFormat::Jpeg).unwrap();
            black_box(jpeg);
        });
    });

    group.finish();
}

fn benchmark_config_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    configure_fast_group(&mut group);

    let json = r#"{"viewport": {"width": 1200}, "settle": {"max_wait_ms": 3000}}"#;

    group.bench_function("from_json", |b| {
        b.iter(|| {
            let config: Config = serde_json::from_str(black_box(json)).unwrap();
            black_box(config);
        });
    });

    group.finish();
}

// === INTEGRATION BENCHMARKS (require Chrome) ===

#[cfg(feature = "chrome_tests")]
fn benchmark_real_capture(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = std::env::temp_dir().join("page-capture-bench");
    let mut group = c.benchmark_group("real_capture");
    configure_fast_group(&mut group);

    group.bench_function("example_com", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result =
                    page_capture::capture("https://example.com", dir.join("example"), Config::default())
                        .await;
                black_box(result.is_ok());
            })
        });
    });

    group.finish();
}

#[cfg(not(feature = "chrome_tests"))]
criterion_group!(
    benches,
    benchmark_settle_tracker,
    benchmark_image_encoding,
    benchmark_config_parsing
);

#[cfg(feature = "chrome_tests")]
criterion_group!(
    benches,
    benchmark_settle_tracker,
    benchmark_image_encoding,
    benchmark_config_parsing,
    benchmark_real_capture
);

criterion_main!(benches);
