use super::decode::Candidate;

/// Keep candidates with `score >= threshold`, preserving emission order.
pub fn filter(mut candidates: Vec<Candidate>, threshold: f32) -> Vec<Candidate> {
    candidates.retain(|c| c.score >= threshold);
    candidates
}
