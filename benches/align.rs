use criterion::{criterion_group, criterion_main, Criterion};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roialign::image::to_gray;
use roialign::{
    AlignmentPipeline, CorrespondenceMatcher, ExtractorConfig, FeatureExtractor, MatcherConfig,
    PipelineConfig, RansacConfig, Region,
};
use std::hint::black_box;

fn make_scene(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = RgbImage::from_fn(width, height, |x, y| {
        let v = ((x * 3 + y * 2) % 64) as u8 + 96;
        Rgb([v, v, v])
    });
    for _ in 0..60 {
        let color = Rgb([rng.random(), rng.random(), rng.random()]);
        let x = rng.random_range(0..width as i32 - 8);
        let y = rng.random_range(0..height as i32 - 8);
        if rng.random_bool(0.5) {
            let w = rng.random_range(6..40);
            let h = rng.random_range(6..40);
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(w, h), color);
        } else {
            let r = rng.random_range(3..16);
            draw_filled_circle_mut(&mut img, (x, y), r, color);
        }
    }
    img
}

fn bench_align(c: &mut Criterion) {
    let template = make_scene(320, 240, 11);
    let candidate = rotate_about_center(&template, 0.05, Interpolation::Bilinear, Rgb([0, 0, 0]));
    let template_gray = to_gray(&template);
    let candidate_gray = to_gray(&candidate);

    let extractor = FeatureExtractor::new(ExtractorConfig::default()).unwrap();
    c.bench_function("extract_320x240", |b| {
        b.iter(|| black_box(extractor.extract(&template_gray).unwrap()));
    });

    let template_features = extractor.extract(&template_gray).unwrap();
    let candidate_features = extractor.extract(&candidate_gray).unwrap();
    let matcher = CorrespondenceMatcher::new(MatcherConfig::default()).unwrap();
    c.bench_function("match_kdforest", |b| {
        b.iter(|| {
            black_box(
                matcher
                    .match_features(&template_features, &candidate_features)
                    .unwrap(),
            )
        });
    });

    let regions = vec![
        Region::new("r1", "left", (40, 40), (140, 120)),
        Region::new("r2", "right", (280, 200), (180, 110)),
    ];
    let cfg = PipelineConfig {
        ransac: RansacConfig {
            seed: Some(7),
            ..RansacConfig::default()
        },
        ..PipelineConfig::default()
    };
    let pipeline = AlignmentPipeline::new(template.clone(), regions.clone(), cfg.clone()).unwrap();
    c.bench_function("align_sequential", |b| {
        b.iter(|| black_box(pipeline.align("candidate", &candidate).unwrap()));
    });

    let parallel = AlignmentPipeline::new(
        template,
        regions,
        PipelineConfig {
            parallel: true,
            ..cfg
        },
    )
    .unwrap();
    c.bench_function("align_parallel", |b| {
        b.iter(|| black_box(parallel.align("candidate", &candidate).unwrap()));
    });
}

criterion_group!(benches, bench_align);
criterion_main!(benches);
