//! The resident request loop.
//!
//! Reads one JSON request per line, dispatches it against the shared model
//! and writes exactly one response line back. Per-request failures become
//! `success: false` responses; only a model that cannot be loaded stops the
//! loop.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use facematch_vision::{load_image, Face};
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::{FaceMatchError, Result};
use crate::extractor::{most_confident_face, single_face, FaceExtractor};
use crate::matcher::{find_matches, Photo, RankingMode};
use crate::model::ModelHandle;
use crate::protocol::{
    parse_request, Args, Command, ComparisonPayload, EmbeddingPayload, FacesPayload,
    MatchesPayload, Outcome, Payload, Request, Response, StatusPayload,
};
use crate::similarity::compare;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// The model has not been built yet.
    Uninitialized,
    /// The model is loaded; no request loop is running.
    Ready,
    /// A request loop is running.
    Serving,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Uninitialized => "uninitialized",
            ServerState::Ready => "ready",
            ServerState::Serving => "serving",
        }
    }
}

/// What handling a single line produced.
#[derive(Debug)]
pub enum Handled {
    Reply(Response),
    /// The model could not be built. The response still goes out, then the
    /// loop ends.
    Fatal(Response, FaceMatchError),
}

impl Handled {
    pub fn response(&self) -> &Response {
        match self {
            Handled::Reply(r) | Handled::Fatal(r, _) => r,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeSummary {
    pub handled: usize,
    pub failed: usize,
}

impl ServeSummary {
    fn record(&mut self, handled: &Handled) {
        self.handled += 1;
        if !handled.response().result.success {
            self.failed += 1;
        }
    }
}

/// Body of a `matchFromFile` input.
#[derive(Debug, Deserialize)]
struct MatchFile {
    #[serde(alias = "user_embedding", alias = "userEmbedding")]
    query: Vec<f32>,
    #[serde(alias = "event_photos", alias = "eventPhotos")]
    photos: Vec<Photo>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    mode: Option<RankingMode>,
}

pub struct Server<E> {
    config: Config,
    model: ModelHandle<E>,
    serving: AtomicBool,
}

impl<E: FaceExtractor> Server<E> {
    pub fn new(config: Config, model: ModelHandle<E>) -> Self {
        Self {
            config,
            model,
            serving: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ServerState {
        if self.serving.load(Ordering::SeqCst) {
            ServerState::Serving
        } else if self.model.is_loaded() {
            ServerState::Ready
        } else {
            ServerState::Uninitialized
        }
    }

    /// Load the model now. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<()> {
        self.model.initialize()
    }

    /// Parse, dispatch and answer one request line.
    pub fn handle_line(&self, line: &str) -> Handled {
        match parse_request(line) {
            Ok(request) => self.handle(&request),
            Err(rejected) => {
                log::warn!("rejected request {}: {}", rejected.request_id, rejected.error);
                Handled::Reply(Response {
                    request_id: rejected.request_id,
                    result: Outcome::failure(&rejected.error),
                })
            }
        }
    }

    pub fn handle(&self, request: &Request) -> Handled {
        log::debug!(
            "request {}: {} ({} args)",
            request.request_id,
            request.command.as_str(),
            request.args.len()
        );
        let started = Instant::now();
        let result = self.dispatch(request.command, &request.args);
        let respond = |result| Response {
            request_id: request.request_id.clone(),
            result,
        };

        match result {
            Ok(payload) => Handled::Reply(respond(Outcome::success(
                payload,
                started.elapsed().as_secs_f64(),
            ))),
            Err(err) if err.is_fatal() => {
                log::error!("{}", err);
                Handled::Fatal(respond(Outcome::failure(&err)), err)
            }
            Err(err) => {
                log::warn!(
                    "request {} ({}) failed: {}",
                    request.request_id,
                    request.command.as_str(),
                    err
                );
                Handled::Reply(respond(Outcome::failure(&err)))
            }
        }
    }

    pub fn dispatch(&self, command: Command, values: &[Value]) -> Result<Payload> {
        let args = Args::new(command, values);
        match command {
            Command::ExtractSelfie => {
                let face = single_face(self.extract(args.string(0, "image path")?)?)?;
                Ok(embedding_payload(face))
            }
            Command::ExtractEmbedding => {
                let face = most_confident_face(self.extract(args.string(0, "image path")?)?)?;
                Ok(embedding_payload(face))
            }
            Command::ExtractPhoto => {
                let faces = self.extract(args.string(0, "image path")?)?;
                Ok(Payload::Faces(FacesPayload {
                    faces_detected: faces.len(),
                    faces: faces.into_iter().map(Into::into).collect(),
                }))
            }
            Command::Match => {
                let query: Vec<f32> = args.json(0, "query embedding")?;
                let photos: Vec<Photo> = args.json(1, "photos")?;
                let threshold = args.optional_number(2, "threshold")?;
                let mode = args.optional_mode(3)?;
                self.run_match(&query, &photos, threshold, mode)
            }
            Command::MatchFromFile => {
                let file = self.read_match_file(Path::new(args.string(0, "match file")?))?;
                self.run_match(&file.query, &file.photos, file.threshold, file.mode)
            }
            Command::Compare => {
                let a: Vec<f32> = args.json(0, "first embedding")?;
                let b: Vec<f32> = args.json(1, "second embedding")?;
                Ok(Payload::Comparison(ComparisonPayload::from(compare(&a, &b)?)))
            }
            Command::Status => Ok(Payload::Status(StatusPayload {
                model_loaded: self.model.is_loaded(),
                state: self.state().as_str().to_string(),
                workers: self.config.server.workers.max(1),
            })),
        }
    }

    fn extract(&self, path: &str) -> Result<Vec<Face>> {
        // decoding happens outside the model lock
        let image = load_image(Path::new(path), self.config.detection.max_dimension)?;
        self.model.with(|extractor| extractor.extract_all(&image))
    }

    fn run_match(
        &self,
        query: &[f32],
        photos: &[Photo],
        threshold: Option<f64>,
        mode: Option<RankingMode>,
    ) -> Result<Payload> {
        let threshold = threshold
            .or(self.config.matching.threshold)
            .ok_or_else(|| {
                FaceMatchError::malformed("no match threshold given and none configured")
            })?;
        if !threshold.is_finite() {
            return Err(FaceMatchError::malformed("threshold must be finite"));
        }
        let mode = mode.or(self.config.matching.mode).ok_or_else(|| {
            FaceMatchError::malformed("no ranking mode given and none configured")
        })?;

        let outcome = find_matches(query, photos, threshold, mode)?;
        log::debug!(
            "matched {} of {} faces across {} photos",
            outcome.matches.len(),
            outcome.faces_searched,
            photos.len()
        );
        Ok(Payload::Matches(MatchesPayload {
            total_matches: outcome.matches.len(),
            total_faces_searched: outcome.faces_searched,
            matched_photos: outcome.matches,
            threshold_used: threshold,
            mode,
        }))
    }

    fn read_match_file(&self, path: &Path) -> Result<MatchFile> {
        let contents = std::fs::read_to_string(path);
        if self.config.server.cleanup_match_files && contents.is_ok() {
            remove_input(path);
        }
        let contents = contents.map_err(|e| {
            FaceMatchError::malformed(format!("cannot read match file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            FaceMatchError::malformed(format!("invalid match file {}: {}", path.display(), e))
        })
    }

    /// Serve until `input` is exhausted, answering on `output`.
    pub fn run<R: BufRead, W: Write + Send>(&self, input: R, output: W) -> Result<ServeSummary> {
        if self.config.server.eager_init || self.config.server.workers > 1 {
            self.initialize()?;
        }
        log::info!(
            "serving requests ({} worker{})",
            self.config.server.workers.max(1),
            if self.config.server.workers > 1 { "s" } else { "" }
        );

        self.serving.store(true, Ordering::SeqCst);
        let summary = if self.config.server.workers > 1 {
            self.serve_pool(input, output, self.config.server.workers)
        } else {
            self.serve_sequential(input, output)
        };
        self.serving.store(false, Ordering::SeqCst);

        if let Ok(summary) = &summary {
            log::info!(
                "input closed after {} requests ({} failed)",
                summary.handled,
                summary.failed
            );
        }
        summary
    }

    fn serve_sequential<R: BufRead, W: Write>(
        &self,
        mut input: R,
        mut output: W,
    ) -> Result<ServeSummary> {
        let mut summary = ServeSummary::default();
        let mut buf = Vec::new();
        while let Some(line) = next_line(&mut input, &mut buf)? {
            if line.trim().is_empty() {
                continue;
            }
            let handled = self.handle_line(&line);
            summary.record(&handled);
            write_response(&mut output, handled.response())?;
            if let Handled::Fatal(_, err) = handled {
                return Err(err);
            }
        }
        Ok(summary)
    }

    /// Bounded pool: a reader feeds lines to `workers` threads, a writer
    /// emits responses as they complete. Ids let the caller reorder.
    fn serve_pool<R: BufRead, W: Write + Send>(
        &self,
        mut input: R,
        mut output: W,
        workers: usize,
    ) -> Result<ServeSummary> {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<String>(workers * 2);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<Handled>(workers * 2);
        let halted = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for line in job_rx {
                        if done_tx.send(self.handle_line(&line)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(done_tx);

            let halted = &halted;
            let writer = scope.spawn(move || -> Result<ServeSummary> {
                let mut summary = ServeSummary::default();
                for handled in done_rx {
                    summary.record(&handled);
                    let written = write_response(&mut output, handled.response());
                    if let Err(err) = written {
                        halted.store(true, Ordering::SeqCst);
                        return Err(err);
                    }
                    if let Handled::Fatal(_, err) = handled {
                        halted.store(true, Ordering::SeqCst);
                        return Err(err);
                    }
                }
                Ok(summary)
            });

            // a halted writer makes every later send fail, so the reader
            // stops at its next line at the latest
            let mut read_error = None;
            let mut buf = Vec::new();
            while !halted.load(Ordering::SeqCst) {
                match next_line(&mut input, &mut buf) {
                    Ok(None) => break,
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        if job_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        read_error = Some(err);
                        break;
                    }
                }
            }
            drop(job_tx);

            let summary = writer.join().unwrap_or_else(|_| {
                Err(FaceMatchError::Extraction("writer thread panicked".into()))
            });
            match read_error {
                Some(err) => Err(err.into()),
                None => summary,
            }
        })
    }
}

fn embedding_payload(face: Face) -> Payload {
    Payload::Embedding(EmbeddingPayload {
        embedding: face.embedding,
        confidence: face.confidence,
        face_detected: true,
    })
}

/// Read one request line. Bytes that are not UTF-8 are replaced rather
/// than rejected, so a garbled line still gets a (failed) response.
fn next_line<R: BufRead>(input: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>> {
    buf.clear();
    if input.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

fn write_response<W: Write>(output: &mut W, response: &Response) -> Result<()> {
    let line = response.to_line()?;
    writeln!(output, "{}", line)?;
    output.flush()?;
    Ok(())
}

/// Best-effort removal of a caller-supplied input file.
fn remove_input(path: &Path) {
    if let Err(source) = std::fs::remove_file(path) {
        let err = FaceMatchError::ResourceCleanup {
            path: PathBuf::from(path),
            source,
        };
        log::warn!("{}", err);
    }
}
