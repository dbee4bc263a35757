mod common;

use common::textured_scene;
use image::imageops;
use roialign::image::to_gray;
use roialign::{
    CorrespondenceMatcher, ExtractorConfig, FeatureExtractor, FeatureSet, MatcherConfig,
};

fn extract(img: &image::RgbImage, parallel: bool) -> FeatureSet {
    FeatureExtractor::new(ExtractorConfig::default())
        .unwrap()
        .with_parallel(parallel)
        .extract(&to_gray(img))
        .unwrap()
}

#[test]
fn extraction_is_deterministic_and_parallel_safe() {
    let scene = textured_scene(320, 240, 4);
    let a = extract(&scene, false);
    let b = extract(&scene, false);
    let c = extract(&scene, true);
    assert!(a.len() > 50, "only {} features", a.len());
    assert_eq!(a.keypoints(), b.keypoints());
    assert_eq!(a.descriptors(), b.descriptors());
    assert_eq!(a.keypoints(), c.keypoints());
    assert_eq!(a.descriptors(), c.descriptors());
}

#[test]
fn keypoints_lie_inside_the_image() {
    let scene = textured_scene(320, 240, 4);
    let features = extract(&scene, false);
    for kp in features.keypoints() {
        assert!(kp.x >= 0.0 && kp.x < 320.0 && kp.y >= 0.0 && kp.y < 240.0, "{kp:?}");
        assert!(kp.size > 0.0);
        assert!((0.0..std::f32::consts::TAU).contains(&kp.angle), "{kp:?}");
    }
}

#[test]
fn self_matching_pairs_identical_keypoints() {
    let features = extract(&textured_scene(320, 240, 4), false);
    let matcher = CorrespondenceMatcher::new(MatcherConfig::default()).unwrap();
    let matches = matcher.match_features(&features, &features).unwrap();

    assert!(matches.len() >= 11, "{} matches", matches.len());
    let identical = matches
        .iter()
        .filter(|m| m.template_idx == m.candidate_idx)
        .count();
    assert!(identical * 10 >= matches.len() * 9, "{identical}/{}", matches.len());
    assert!(matches.windows(2).all(|w| w[0].template_idx < w[1].template_idx));
}

#[test]
fn upside_down_candidate_matches_rotated_positions() {
    let scene = textured_scene(320, 240, 4);
    let flipped = imageops::rotate180(&scene);
    let template = extract(&scene, false);
    let candidate = extract(&flipped, false);
    let matches = CorrespondenceMatcher::new(MatcherConfig::default())
        .unwrap()
        .match_features(&template, &candidate)
        .unwrap();

    let consistent = matches
        .iter()
        .filter(|m| {
            let t = template.keypoints()[m.template_idx];
            let c = candidate.keypoints()[m.candidate_idx];
            (319.0 - t.x - c.x).abs() < 2.0 && (239.0 - t.y - c.y).abs() < 2.0
        })
        .count();
    assert!(consistent >= 11, "{consistent}/{} consistent", matches.len());
    assert!(consistent * 2 >= matches.len(), "{consistent}/{}", matches.len());
}

#[test]
fn empty_sets_produce_no_matches() {
    let features = extract(&textured_scene(160, 120, 1), false);
    let empty = FeatureSet::default();
    let matcher = CorrespondenceMatcher::new(MatcherConfig::default()).unwrap();
    assert!(matcher.match_features(&empty, &features).unwrap().is_empty());
    assert!(matcher.match_features(&features, &empty).unwrap().is_empty());
}

#[test]
fn invalid_ratio_is_rejected() {
    let cfg = MatcherConfig {
        ratio: 1.5,
        ..MatcherConfig::default()
    };
    assert!(CorrespondenceMatcher::new(cfg).is_err());
}
