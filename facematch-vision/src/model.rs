use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
};

use crate::error::{VisionError, VisionResult};

/// Locations of the two ONNX graphs the analyzer needs.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

pub fn session_builder() -> Result<SessionBuilder> {
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

/// Load one ONNX graph from disk. A missing file or a graph the runtime
/// rejects both surface as [`VisionError::ModelInit`].
pub fn load_session(path: &Path) -> VisionResult<Session> {
    let load = || -> Result<Session> {
        if !path.is_file() {
            anyhow::bail!("model file does not exist");
        }
        session_builder()?
            .commit_from_file(path)
            .context("commit session")
    };
    load().map_err(|source| VisionError::ModelInit {
        path: path.to_path_buf(),
        source,
    })
}
