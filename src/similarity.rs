//! Cosine similarity between face embeddings.
//!
//! Sums are accumulated in `f64` and the norm product is taken as
//! `sqrt(|a|² · |b|²)`, which makes `similarity(a, a)` exactly `1.0` and the
//! function exactly symmetric.

use crate::error::{FaceMatchError, Result};

/// Reject vectors that can never take part in a comparison.
pub fn validate(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(FaceMatchError::InvalidEmbedding("embedding is empty".into()));
    }
    if let Some(pos) = embedding.iter().position(|x| !x.is_finite()) {
        return Err(FaceMatchError::InvalidEmbedding(format!(
            "non-finite value at position {pos}"
        )));
    }
    Ok(())
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(FaceMatchError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(FaceMatchError::InvalidEmbedding(
            "zero-norm embedding has no direction".into(),
        ));
    }
    let sim = dot / (norm_a * norm_b).sqrt();
    if !sim.is_finite() {
        return Err(FaceMatchError::InvalidEmbedding(
            "similarity is not a finite number".into(),
        ));
    }
    Ok(sim.clamp(-1.0, 1.0))
}

/// `1 - cosine_similarity(a, b)`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f64> {
    Ok(1.0 - cosine_similarity(a, b)?)
}

/// Result of comparing two embeddings directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub similarity: f64,
    pub distance: f64,
    /// similarity as a percentage
    pub confidence: f64,
}

pub fn compare(a: &[f32], b: &[f32]) -> Result<Comparison> {
    validate(a)?;
    validate(b)?;
    let similarity = cosine_similarity(a, b)?;
    Ok(Comparison {
        similarity,
        distance: 1.0 - similarity,
        confidence: similarity * 100.0,
    })
}
