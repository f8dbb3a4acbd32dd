//! Newline-delimited JSON requests and responses.
//!
//! ```text
//! -> {"requestId": 7, "command": "extractSelfie", "args": ["/tmp/selfie.jpg"]}
//! <- {"requestId": 7, "result": {"success": true, "embedding": [...], ...}}
//! ```

use std::str::FromStr;

use facematch_vision::Face;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{FaceMatchError, Result};
use crate::matcher::{MatchResult, RankingMode};
use crate::similarity::Comparison;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ExtractSelfie,
    ExtractPhoto,
    ExtractEmbedding,
    Match,
    MatchFromFile,
    Compare,
    Status,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::ExtractSelfie => "extractSelfie",
            Command::ExtractPhoto => "extractPhoto",
            Command::ExtractEmbedding => "extractEmbedding",
            Command::Match => "match",
            Command::MatchFromFile => "matchFromFile",
            Command::Compare => "compare",
            Command::Status => "status",
        }
    }
}

impl FromStr for Command {
    type Err = FaceMatchError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "extractSelfie" | "extract_selfie" => Command::ExtractSelfie,
            "extractPhoto" | "extract_photo" => Command::ExtractPhoto,
            "extractEmbedding" | "extract_embedding" => Command::ExtractEmbedding,
            "match" => Command::Match,
            "matchFromFile" | "match_from_file" => Command::MatchFromFile,
            "compare" => Command::Compare,
            "status" => Command::Status,
            other => return Err(FaceMatchError::UnknownCommand(other.to_string())),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub request_id: Value,
    pub command: Command,
    pub args: Vec<Value>,
}

/// A line that could not be turned into a [`Request`], with whatever id
/// could be salvaged from it (`null` when none).
#[derive(Debug)]
pub struct Rejected {
    pub request_id: Value,
    pub error: FaceMatchError,
}

pub fn parse_request(line: &str) -> std::result::Result<Request, Rejected> {
    let reject = |request_id: Value, error: FaceMatchError| Rejected { request_id, error };

    let value: Value = serde_json::from_str(line)
        .map_err(|e| reject(Value::Null, FaceMatchError::malformed(format!("invalid JSON: {e}"))))?;
    let Value::Object(mut obj) = value else {
        return Err(reject(
            Value::Null,
            FaceMatchError::malformed("request must be a JSON object"),
        ));
    };

    let request_id = obj.remove("requestId").unwrap_or(Value::Null);
    let command = match obj.remove("command") {
        Some(Value::String(name)) => match name.parse() {
            Ok(command) => command,
            Err(error) => return Err(reject(request_id, error)),
        },
        Some(_) => {
            let error = FaceMatchError::malformed("command must be a string");
            return Err(reject(request_id, error));
        }
        None => return Err(reject(request_id, FaceMatchError::malformed("missing command"))),
    };
    let args = match obj.remove("args") {
        Some(Value::Array(args)) => args,
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            let error = FaceMatchError::malformed("args must be an array");
            return Err(reject(request_id, error));
        }
    };

    Ok(Request {
        request_id,
        command,
        args,
    })
}

/// Positional argument access with uniform error messages.
pub struct Args<'a> {
    command: Command,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub fn new(command: Command, values: &'a [Value]) -> Self {
        Self { command, values }
    }

    fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index).filter(|v| !v.is_null())
    }

    fn required(&self, index: usize, name: &str) -> Result<&'a Value> {
        self.get(index).ok_or_else(|| {
            FaceMatchError::malformed(format!(
                "{} expects argument {} ({})",
                self.command.as_str(),
                index + 1,
                name
            ))
        })
    }

    pub fn string(&self, index: usize, name: &str) -> Result<&'a str> {
        self.required(index, name)?
            .as_str()
            .ok_or_else(|| FaceMatchError::malformed(format!("{name} must be a string")))
    }

    /// A structured argument given either inline or as a JSON-encoded string.
    pub fn json<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T> {
        let value = self.required(index, name)?;
        let parsed = match value {
            Value::String(text) => serde_json::from_str(text),
            other => serde_json::from_value(other.clone()),
        };
        parsed.map_err(|e| FaceMatchError::malformed(format!("invalid {name}: {e}")))
    }

    pub fn optional_number(&self, index: usize, name: &str) -> Result<Option<f64>> {
        let Some(value) = self.get(index) else {
            return Ok(None);
        };
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        match number {
            Some(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(FaceMatchError::malformed(format!("{name} must be a number"))),
        }
    }

    pub fn optional_mode(&self, index: usize) -> Result<Option<RankingMode>> {
        match self.get(index) {
            None => Ok(None),
            Some(Value::String(s)) => s.parse().map(Some).map_err(FaceMatchError::MalformedRequest),
            Some(_) => Err(FaceMatchError::malformed("mode must be a string")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingPayload {
    pub embedding: Vec<f32>,
    pub confidence: f32,
    pub face_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacePayload {
    pub face_index: usize,
    pub embedding: Vec<f32>,
    pub bounding_box: [f32; 4],
    pub confidence: f32,
}

impl From<Face> for FacePayload {
    fn from(face: Face) -> Self {
        Self {
            face_index: face.index,
            embedding: face.embedding,
            bounding_box: face.bounding_box,
            confidence: face.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacesPayload {
    pub faces: Vec<FacePayload>,
    pub faces_detected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchesPayload {
    pub matched_photos: Vec<MatchResult>,
    pub total_matches: usize,
    pub total_faces_searched: usize,
    pub threshold_used: f64,
    pub mode: RankingMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonPayload {
    pub similarity: f64,
    pub distance: f64,
    pub confidence: f64,
}

impl From<Comparison> for ComparisonPayload {
    fn from(c: Comparison) -> Self {
        Self {
            similarity: c.similarity,
            distance: c.distance,
            confidence: c.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub model_loaded: bool,
    pub state: String,
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Embedding(EmbeddingPayload),
    Faces(FacesPayload),
    Matches(MatchesPayload),
    Comparison(ComparisonPayload),
    Status(StatusPayload),
}

/// The `result` half of a response line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    pub fn success(payload: Payload, seconds: f64) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            processing_time: Some((seconds * 1000.0).round() / 1000.0),
            error: None,
        }
    }

    pub fn failure(error: &FaceMatchError) -> Self {
        Self {
            success: false,
            payload: None,
            processing_time: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub request_id: Value,
    pub result: Outcome,
}

impl Response {
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
