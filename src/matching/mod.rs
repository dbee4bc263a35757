//! Descriptor correspondence search with Lowe's ratio test.
//!
//! The candidate descriptors are indexed once in a randomized kd-forest and
//! every template descriptor queries its two nearest neighbors. A pair is
//! accepted only when the nearest neighbor is strictly closer than `ratio`
//! times the second nearest.

pub mod kdforest;

use crate::features::{FeatureSet, DESCRIPTOR_LEN};
use crate::trace::{trace_event, trace_span};
use crate::util::{AlignError, AlignResult};
use kdforest::KdForest;
use rayon::prelude::*;

/// A template/candidate keypoint pairing accepted by the ratio test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    /// Index into the template feature set.
    pub template_idx: usize,
    /// Index into the candidate feature set.
    pub candidate_idx: usize,
    /// Euclidean descriptor distance of the pair.
    pub distance: f32,
}

/// Configuration for the approximate matcher.
#[derive(Clone, Debug)]
pub struct MatcherConfig {
    /// Number of randomized kd-trees.
    pub trees: usize,
    /// Distance evaluations allowed per query.
    pub checks: usize,
    /// Lowe ratio; a match needs `d1 < ratio * d2`.
    pub ratio: f32,
    /// Maximum points per kd-tree leaf.
    pub leaf_size: usize,
    /// Seed for tree randomization.
    pub index_seed: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            trees: 5,
            checks: 500,
            ratio: 0.7,
            leaf_size: 4,
            index_seed: 0x5EED_1D3C,
        }
    }
}

impl MatcherConfig {
    pub(crate) fn validate(&self) -> AlignResult<()> {
        if self.trees == 0 {
            return Err(AlignError::InvalidConfig("trees must be at least 1".into()));
        }
        if self.checks == 0 {
            return Err(AlignError::InvalidConfig("checks must be at least 1".into()));
        }
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(AlignError::InvalidConfig(format!(
                "ratio must be in (0, 1], got {}",
                self.ratio
            )));
        }
        Ok(())
    }
}

/// Finds ratio-test filtered correspondences between two feature sets.
#[derive(Clone, Debug)]
pub struct CorrespondenceMatcher {
    cfg: MatcherConfig,
    parallel: bool,
}

impl CorrespondenceMatcher {
    pub fn new(cfg: MatcherConfig) -> AlignResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            parallel: false,
        })
    }

    /// Enables rayon parallelism across template queries.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.cfg
    }

    /// Returns accepted correspondences ordered by template index.
    pub fn match_features(
        &self,
        template: &FeatureSet,
        candidate: &FeatureSet,
    ) -> AlignResult<Vec<Correspondence>> {
        let _span = trace_span!(
            "match",
            template = template.len(),
            candidate = candidate.len()
        )
        .entered();

        if template.is_empty() || candidate.len() < 2 {
            trace_event!("correspondences", accepted = 0usize);
            return Ok(Vec::new());
        }

        let forest = KdForest::build(
            candidate.descriptors(),
            DESCRIPTOR_LEN,
            self.cfg.trees,
            self.cfg.leaf_size,
            self.cfg.index_seed,
        )?;

        let query = |template_idx: usize| -> Option<Correspondence> {
            let descriptor = template.descriptor(template_idx)?;
            let neighbors = forest.knn(descriptor, 2, self.cfg.checks);
            let (first, second) = match neighbors.as_slice() {
                [first, second, ..] => (first, second),
                _ => return None,
            };
            (first.distance < self.cfg.ratio * second.distance).then_some(Correspondence {
                template_idx,
                candidate_idx: first.index,
                distance: first.distance,
            })
        };

        let accepted: Vec<Correspondence> = if self.parallel {
            (0..template.len())
                .into_par_iter()
                .filter_map(query)
                .collect()
        } else {
            (0..template.len()).filter_map(query).collect()
        };

        trace_event!(
            "correspondences",
            queried = template.len(),
            accepted = accepted.len()
        );
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::{CorrespondenceMatcher, MatcherConfig};
    use crate::features::{FeatureSet, Keypoint, DESCRIPTOR_LEN};

    fn keypoint(i: usize) -> Keypoint {
        Keypoint {
            x: i as f32,
            y: 0.0,
            size: 20.0,
            angle: 0.0,
            response: 1.0,
            octave: 0,
        }
    }

    /// Unit vectors along distinct axes: every pair is equally far apart.
    fn axis_set(axes: &[usize]) -> FeatureSet {
        let mut descriptors = vec![0.0f32; axes.len() * DESCRIPTOR_LEN];
        for (row, &axis) in axes.iter().enumerate() {
            descriptors[row * DESCRIPTOR_LEN + axis] = 1.0;
        }
        let keypoints = (0..axes.len()).map(keypoint).collect();
        FeatureSet::new(keypoints, descriptors).unwrap()
    }

    #[test]
    fn exact_duplicates_pass_ratio_test() {
        let template = axis_set(&[3, 9, 40]);
        let candidate = axis_set(&[40, 3, 9, 77]);
        let matcher = CorrespondenceMatcher::new(MatcherConfig::default()).unwrap();
        let pairs = matcher.match_features(&template, &candidate).unwrap();
        let indices: Vec<_> = pairs
            .iter()
            .map(|c| (c.template_idx, c.candidate_idx))
            .collect();
        assert_eq!(indices, vec![(0, 1), (1, 2), (2, 0)]);
        assert!(pairs.iter().all(|c| c.distance == 0.0));
    }

    #[test]
    fn ambiguous_matches_are_rejected() {
        // Query is equidistant from both candidates, so d1 == d2.
        let template = axis_set(&[5]);
        let candidate = axis_set(&[6, 7]);
        let matcher = CorrespondenceMatcher::new(MatcherConfig::default()).unwrap();
        assert!(matcher
            .match_features(&template, &candidate)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn too_few_candidates_yield_nothing() {
        let matcher = CorrespondenceMatcher::new(MatcherConfig::default()).unwrap();
        let single = axis_set(&[1]);
        assert!(matcher.match_features(&single, &single).unwrap().is_empty());
        let empty = FeatureSet::default();
        assert!(matcher
            .match_features(&empty, &axis_set(&[1, 2]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn parallel_matches_sequential() {
        let template = axis_set(&[0, 10, 20, 30, 40, 50]);
        let candidate = axis_set(&[50, 40, 30, 20, 10, 0, 99]);
        let seq = CorrespondenceMatcher::new(MatcherConfig::default()).unwrap();
        let par = seq.clone().with_parallel(true);
        assert_eq!(
            seq.match_features(&template, &candidate).unwrap(),
            par.match_features(&template, &candidate).unwrap()
        );
    }

    #[test]
    fn ratio_above_one_is_rejected() {
        let cfg = MatcherConfig {
            ratio: 1.5,
            ..MatcherConfig::default()
        };
        assert!(CorrespondenceMatcher::new(cfg).is_err());
    }
}
