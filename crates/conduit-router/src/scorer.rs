//! Multi-factor candidate scoring.

use crate::config::ScoringSettings;
use crate::health::AvailabilitySnapshot;
use crate::types::{ModelCandidate, PreferenceProfile, ScoreWeights, ScoredCandidate};
use std::cmp::Ordering;
use std::sync::Arc;

/// Ranks eligible candidates under a preference profile.
///
/// Cost and latency are min-max normalised across the eligible set; quality
/// is absolute; availability comes from the health snapshot. The output is
/// a total order, best first.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    settings: ScoringSettings,
}

impl Scorer {
    /// Creates a scorer.
    #[must_use]
    pub fn new(settings: ScoringSettings) -> Self {
        Self { settings }
    }

    /// Scores `candidates` under `preference`.
    ///
    /// # Arguments
    /// * `candidates` - Eligible candidates in registration order
    /// * `estimated_costs` - Estimated request cost per candidate, same order
    /// * `availability` - Provider availability captured for this request
    /// * `preference` - Active preference profile
    #[must_use]
    pub fn score(
        &self,
        candidates: &[Arc<ModelCandidate>],
        estimated_costs: &[f64],
        availability: &AvailabilitySnapshot,
        preference: PreferenceProfile,
    ) -> Vec<ScoredCandidate> {
        self.score_with_weights(candidates, estimated_costs, availability, preference, &preference.weights())
    }

    /// Scores with explicit weights; `preference` only labels the rationale.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score_with_weights(
        &self,
        candidates: &[Arc<ModelCandidate>],
        estimated_costs: &[f64],
        availability: &AvailabilitySnapshot,
        preference: PreferenceProfile,
        weights: &ScoreWeights,
    ) -> Vec<ScoredCandidate> {
        debug_assert_eq!(candidates.len(), estimated_costs.len());

        let latencies: Vec<f64> = candidates.iter().map(|c| c.baseline_latency_ms as f64).collect();
        let cost_scores = self.inverted_normalised(estimated_costs);
        let latency_scores = self.inverted_normalised(&latencies);

        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .zip(estimated_costs.iter())
            .enumerate()
            .map(|(index, (candidate, &estimated_cost_usd))| {
                let cost_score = cost_scores[index];
                let latency_score = latency_scores[index];
                // quality is validated on registration, availability comes from the tracker
                let quality_score = candidate.baseline_quality;
                let availability_score = availability.get(&candidate.provider);
                debug_assert!((0.0..=1.0).contains(&quality_score) && (0.0..=1.0).contains(&availability_score));
                let final_score = weights.combine(cost_score, latency_score, quality_score, availability_score);

                let mut entry = ScoredCandidate {
                    candidate: Arc::clone(candidate),
                    registration_index: index,
                    estimated_cost_usd,
                    cost_score,
                    latency_score,
                    quality_score,
                    availability_score,
                    final_score,
                    rationale: String::new(),
                };
                entry.rationale = rationale(&entry, weights, preference);
                entry
            })
            .collect();

        self.rank(&mut scored);
        scored
    }

    /// `1 - normalise(x)` over the set.
    ///
    /// A singleton scores 1.0; a set where every value ties scores
    /// `uniform_axis_score`.
    fn inverted_normalised(&self, values: &[f64]) -> Vec<f64> {
        if values.len() == 1 {
            return vec![1.0];
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if !range.is_finite() || range <= f64::EPSILON * max.abs().max(1.0) {
            return vec![self.settings.uniform_axis_score.clamp(0.0, 1.0); values.len()];
        }
        values.iter().map(|v| (1.0 - (v - min) / range).clamp(0.0, 1.0)).collect()
    }

    /// Sorts best first. Scores within `tie_epsilon` of their neighbour fall
    /// back to quality, then estimated cost, then registration order.
    fn rank(&self, scored: &mut [ScoredCandidate]) {
        scored.sort_by(|a, b| b.final_score.total_cmp(&a.final_score).then_with(|| tie_break(a, b)));

        let epsilon = self.settings.tie_epsilon;
        let mut start = 0;
        while start < scored.len() {
            let mut end = start + 1;
            while end < scored.len() && (scored[end - 1].final_score - scored[end].final_score).abs() <= epsilon {
                end += 1;
            }
            if end - start > 1 {
                scored[start..end].sort_by(tie_break);
            }
            start = end;
        }
    }
}

fn tie_break(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.quality_score
        .total_cmp(&a.quality_score)
        .then_with(|| a.estimated_cost_usd.total_cmp(&b.estimated_cost_usd))
        .then_with(|| a.registration_index.cmp(&b.registration_index))
}

/// Explains the score through its largest weighted contribution.
fn rationale(entry: &ScoredCandidate, weights: &ScoreWeights, preference: PreferenceProfile) -> String {
    let contributions = [
        (weights.cost * entry.cost_score, "cost"),
        (weights.latency * entry.latency_score, "latency"),
        (weights.quality * entry.quality_score, "quality"),
        (weights.availability * entry.availability_score, "availability"),
    ];
    let dominant = contributions
        .iter()
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map_or("quality", |&(_, axis)| axis);

    let reason = match dominant {
        "cost" => format!("low estimated cost (${:.6})", entry.estimated_cost_usd),
        "latency" => format!("fast baseline latency ({} ms)", entry.candidate.baseline_latency_ms),
        "availability" => format!("reliable provider {} ({:.2})", entry.candidate.provider, entry.availability_score),
        _ => format!("high baseline quality ({:.2})", entry.quality_score),
    };

    format!(
        "{} chosen for {} under '{}' preference: {}; scores cost={:.2} latency={:.2} quality={:.2} availability={:.2}, final={:.3}",
        entry.candidate.id,
        preference.focus(),
        preference,
        reason,
        entry.cost_score,
        entry.latency_score,
        entry.quality_score,
        entry.availability_score,
        entry.final_score,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pricing;
    use conduit_abstraction::TaskKind;

    fn candidate(id: &str, provider: &str, latency_ms: u64, quality: f64) -> Arc<ModelCandidate> {
        Arc::new(ModelCandidate::new(
            id,
            provider,
            [TaskKind::Chat],
            1000,
            1000,
            Pricing { input_per_1k: 0.0, output_per_1k: 0.0 },
            latency_ms,
            quality,
        ))
    }

    fn ids(scored: &[ScoredCandidate]) -> Vec<&str> {
        scored.iter().map(ScoredCandidate::model_id).collect()
    }

    #[test]
    fn test_singleton_scores_full_on_normalised_axes() {
        let scorer = Scorer::default();
        let scored = scorer.score(
            &[candidate("only", "p", 900, 0.4)],
            &[5.0],
            &AvailabilitySnapshot::default(),
            PreferenceProfile::Balanced,
        );
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].cost_score, 1.0);
        assert_eq!(scored[0].latency_score, 1.0);
        assert_eq!(scored[0].quality_score, 0.4);
    }

    #[test]
    fn test_unhealthy_cheaper_candidate_loses_under_cheap() {
        let scorer = Scorer::default();
        let candidates = [
            candidate("healthy", "h", 100, 0.7),
            candidate("unhealthy", "u", 100, 0.7),
            candidate("slow", "s", 600, 0.5),
        ];
        let availability = AvailabilitySnapshot::from_scores([("h", 1.0), ("u", 0.0), ("s", 1.0)]);
        let scored = scorer.score(&candidates, &[1.1, 1.0, 2.0], &availability, PreferenceProfile::Cheap);

        assert_eq!(ids(&scored), ["healthy", "unhealthy", "slow"]);
        assert!((scored[0].cost_score - 0.9).abs() < 1e-9);
        assert!((scored[0].final_score - 0.91).abs() < 1e-9);
        assert!((scored[1].final_score - 0.87).abs() < 1e-9);
        assert!((scored[2].final_score - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_availability_penalty_outweighs_small_cost_advantage() {
        let weights = PreferenceProfile::Cheap.weights();
        let healthy = weights.combine(0.9, 0.8, 0.7, 1.0);
        let unhealthy = weights.combine(1.0, 0.8, 0.7, 0.0);
        assert!(healthy > unhealthy);
        assert!((healthy - 0.87).abs() < 1e-9);
        assert!((unhealthy - 0.83).abs() < 1e-9);
    }

    #[test]
    fn test_scores_are_bounded() {
        let scorer = Scorer::default();
        let candidates = [candidate("a", "p", 10, 1.0), candidate("b", "p", 5000, 0.0), candidate("c", "q", 700, 0.6)];
        let availability = AvailabilitySnapshot::from_scores([("p", 0.3), ("q", 1.0)]);
        for preference in PreferenceProfile::ALL {
            for scored in scorer.score(&candidates, &[0.0, 10.0, 0.5], &availability, preference) {
                for value in [
                    scored.cost_score,
                    scored.latency_score,
                    scored.quality_score,
                    scored.availability_score,
                    scored.final_score,
                ] {
                    assert!((0.0..=1.0).contains(&value), "{value} out of range");
                }
            }
        }
    }

    #[test]
    fn test_uniform_axis_uses_configured_score() {
        let scorer = Scorer::new(ScoringSettings { uniform_axis_score: 0.5, ..ScoringSettings::default() });
        let candidates = [candidate("a", "p", 100, 0.5), candidate("b", "p", 100, 0.5)];
        let scored = scorer.score(&candidates, &[1.0, 1.0], &AvailabilitySnapshot::default(), PreferenceProfile::Fast);
        assert!(scored.iter().all(|s| s.cost_score == 0.5 && s.latency_score == 0.5));
    }

    #[test]
    fn test_tie_breaks_by_quality_then_cost_then_order() {
        let scorer = Scorer::default();
        let weights = ScoreWeights::new(0.0, 0.0, 0.0, 1.0).unwrap();
        let candidates = [
            candidate("first", "p", 100, 0.5),
            candidate("second", "p", 200, 0.5),
            candidate("better", "p", 300, 0.9),
            candidate("cheaper", "p", 400, 0.5),
        ];
        let scored = scorer.score_with_weights(
            &candidates,
            &[2.0, 2.0, 5.0, 1.0],
            &AvailabilitySnapshot::default(),
            PreferenceProfile::Balanced,
            &weights,
        );
        assert_eq!(ids(&scored), ["better", "cheaper", "first", "second"]);
    }

    #[test]
    fn test_deterministic() {
        let scorer = Scorer::default();
        let candidates = [candidate("a", "p", 300, 0.8), candidate("b", "q", 200, 0.8), candidate("c", "r", 100, 0.6)];
        let availability = AvailabilitySnapshot::from_scores([("q", 0.4)]);
        let first = scorer.score(&candidates, &[0.3, 0.2, 0.1], &availability, PreferenceProfile::Balanced);
        let second = scorer.score(&candidates, &[0.3, 0.2, 0.1], &availability, PreferenceProfile::Balanced);
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_monotone_in_cost_and_latency() {
        let scorer = Scorer::default();
        let base = [candidate("a", "p", 100, 0.5), candidate("b", "p", 300, 0.5), candidate("c", "p", 500, 0.5)];
        let slower = [candidate("a", "p", 100, 0.5), candidate("b", "p", 450, 0.5), candidate("c", "p", 500, 0.5)];
        let none = AvailabilitySnapshot::default();

        let find = |scored: Vec<ScoredCandidate>| scored.into_iter().find(|s| s.model_id() == "b").unwrap();
        let before = find(scorer.score(&base, &[1.0, 2.0, 3.0], &none, PreferenceProfile::Balanced));
        let pricier = find(scorer.score(&base, &[1.0, 2.5, 3.0], &none, PreferenceProfile::Balanced));
        let slowed = find(scorer.score(&slower, &[1.0, 2.0, 3.0], &none, PreferenceProfile::Balanced));

        assert!(pricier.cost_score <= before.cost_score);
        assert!(slowed.latency_score <= before.latency_score);
    }

    #[test]
    fn test_rationale_names_dominant_factor() {
        let scorer = Scorer::default();
        let candidates = [candidate("fast", "p", 50, 0.5), candidate("slow", "p", 2000, 0.5)];
        let scored = scorer.score(&candidates, &[1.0, 1.0], &AvailabilitySnapshot::default(), PreferenceProfile::Fast);
        assert_eq!(scored[0].model_id(), "fast");
        assert!(scored[0].rationale.contains("fast baseline latency (50 ms)"));
        assert!(scored[0].rationale.contains("'fast' preference"));
    }
}
