use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::similarity::{cosine_similarity, validate};

/// How matching faces are turned into results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RankingMode {
    /// One result per matching face; a photo can appear several times.
    #[serde(alias = "allMatches", alias = "all_matches")]
    AllMatches,
    /// At most one result per photo: its closest face, if that one matches.
    #[serde(alias = "bestPerPhoto", alias = "best_per_photo")]
    BestPerPhoto,
}

impl RankingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingMode::AllMatches => "all-matches",
            RankingMode::BestPerPhoto => "best-per-photo",
        }
    }
}

impl std::str::FromStr for RankingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all-matches" | "allMatches" | "all_matches" | "all" => Ok(RankingMode::AllMatches),
            "best-per-photo" | "bestPerPhoto" | "best_per_photo" | "best" => {
                Ok(RankingMode::BestPerPhoto)
            }
            other => Err(format!("unknown ranking mode: {other}")),
        }
    }
}

/// A face stored against a candidate photo. Only the embedding takes part in
/// matching; faces without one are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CandidateFace {
    pub embedding: Option<Vec<f32>>,
    pub confidence: Option<f32>,
    pub bounding_box: Option<Vec<f32>>,
}

/// An already-extracted photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    #[serde(alias = "photoId", alias = "photo_id", deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub faces: Vec<CandidateFace>,
}

fn id_string<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
        Uint(u64),
    }
    Ok(match Id::deserialize(de)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
        Id::Uint(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub photo_id: String,
    pub face_index: usize,
    pub similarity: f64,
    pub distance: f64,
    pub confidence: f64,
}

impl MatchResult {
    fn new(photo_id: &str, face_index: usize, similarity: f64) -> Self {
        Self {
            photo_id: photo_id.to_string(),
            face_index,
            similarity,
            distance: 1.0 - similarity,
            confidence: similarity * 100.0,
        }
    }

    /// Ascending distance, then photo id, then face index.
    pub fn rank(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.photo_id.cmp(&other.photo_id))
            .then_with(|| self.face_index.cmp(&other.face_index))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub matches: Vec<MatchResult>,
    /// Every face visited, including the ones without an embedding.
    pub faces_searched: usize,
}

/// Compare `query` against every face of every candidate. A face matches
/// when its distance is strictly below `threshold`.
pub fn find_matches(
    query: &[f32],
    candidates: &[Photo],
    threshold: f64,
    mode: RankingMode,
) -> Result<MatchOutcome> {
    validate(query)?;

    let mut matches = Vec::new();
    let mut faces_searched = 0;

    for photo in candidates {
        let mut best: Option<MatchResult> = None;

        for (face_index, face) in photo.faces.iter().enumerate() {
            faces_searched += 1;
            let embedding = match face.embedding.as_deref() {
                Some(e) if !e.is_empty() => e,
                _ => continue,
            };

            let similarity = cosine_similarity(query, embedding)?;
            let candidate = MatchResult::new(&photo.id, face_index, similarity);
            match mode {
                RankingMode::AllMatches => {
                    if candidate.distance < threshold {
                        matches.push(candidate);
                    }
                }
                RankingMode::BestPerPhoto => {
                    if best.as_ref().map_or(true, |b| candidate.distance < b.distance) {
                        best = Some(candidate);
                    }
                }
            }
        }

        if let Some(best) = best {
            if best.distance < threshold {
                matches.push(best);
            } else {
                log::debug!(
                    "near miss: photo {} distance={:.3} threshold={}",
                    best.photo_id,
                    best.distance,
                    threshold
                );
            }
        }
    }

    matches.sort_by(MatchResult::rank);
    Ok(MatchOutcome {
        matches,
        faces_searched,
    })
}
