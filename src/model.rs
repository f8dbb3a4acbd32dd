use std::sync::{Mutex, MutexGuard};

use facematch_vision::FaceAnalyzer;
use once_cell::sync::OnceCell;

use crate::config::Config;
use crate::error::{FaceMatchError, Result};
use crate::extractor::FaceExtractor;

type Loader<E> = Box<dyn Fn() -> Result<E> + Send + Sync>;

/// The one expensive extractor a server owns. It is built at most once,
/// the first time [`ModelHandle::initialize`] or [`ModelHandle::with`] runs,
/// and every inference call holds its lock, so calls never overlap.
pub struct ModelHandle<E> {
    loader: Loader<E>,
    cell: OnceCell<Mutex<E>>,
}

impl<E: FaceExtractor> ModelHandle<E> {
    pub fn new(loader: impl Fn() -> Result<E> + Send + Sync + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            cell: OnceCell::new(),
        }
    }

    /// A handle whose extractor already exists.
    pub fn ready(extractor: E) -> Self {
        let handle = Self::new(|| {
            Err(FaceMatchError::ModelInitialization(
                "extractor was supplied pre-built".into(),
            ))
        });
        // a fresh cell always accepts its first value
        let _ = handle.cell.set(Mutex::new(extractor));
        handle
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Build the extractor unless that already happened. Concurrent callers
    /// block until the first one finishes; later calls are no-ops.
    pub fn initialize(&self) -> Result<()> {
        self.cell()?;
        Ok(())
    }

    /// Run `f` with exclusive access to the extractor.
    pub fn with<R>(&self, f: impl FnOnce(&mut E) -> Result<R>) -> Result<R> {
        let mut guard = lock(self.cell()?);
        f(&mut *guard)
    }

    fn cell(&self) -> Result<&Mutex<E>> {
        self.cell.get_or_try_init(|| {
            log::info!("initializing face model");
            match (self.loader)() {
                Ok(extractor) => Ok(Mutex::new(extractor)),
                Err(err @ FaceMatchError::ModelInitialization(_)) => Err(err),
                Err(other) => Err(FaceMatchError::ModelInitialization(other.to_string())),
            }
        })
    }
}

fn lock<E>(m: &Mutex<E>) -> MutexGuard<'_, E> {
    // A panic mid-inference leaves no state behind that later calls depend on.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle that loads and warms up the ONNX analyzer described by `config`.
pub fn onnx_model(config: &Config) -> ModelHandle<FaceAnalyzer> {
    let paths = config.model_paths();
    let options = config.analyzer_options();
    ModelHandle::new(move || {
        let mut analyzer = FaceAnalyzer::load(&paths, options)?;
        analyzer.warm_up()?;
        Ok(analyzer)
    })
}
