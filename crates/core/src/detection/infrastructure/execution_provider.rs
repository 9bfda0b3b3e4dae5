use std::path::Path;
use std::sync::Once;

use ort::execution_providers::ExecutionProviderDispatch;
use ort::session::Session;

use crate::detection::domain::object_detector::DetectorError;

static LOG_DEVICE: Once = Once::new();

/// Return the preferred ONNX execution providers for the current platform.
///
/// ONNX Runtime falls back to CPU if a listed provider is unavailable. The
/// choice is logged once per process.
pub fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    let providers = platform_providers();
    LOG_DEVICE.call_once(|| log::info!("Inference device: {}", device_name()));
    providers
}

#[cfg(target_os = "macos")]
fn platform_providers() -> Vec<ExecutionProviderDispatch> {
    vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
}

#[cfg(target_os = "windows")]
fn platform_providers() -> Vec<ExecutionProviderDispatch> {
    vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
}

#[cfg(all(not(any(target_os = "macos", target_os = "windows")), feature = "cuda"))]
fn platform_providers() -> Vec<ExecutionProviderDispatch> {
    vec![ort::execution_providers::CUDAExecutionProvider::default().build()]
}

#[cfg(all(not(any(target_os = "macos", target_os = "windows")), not(feature = "cuda")))]
fn platform_providers() -> Vec<ExecutionProviderDispatch> {
    vec![]
}

/// Human-readable name of the accelerator requested, or `CPU`.
pub fn device_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "CoreML (CPU fallback)"
    } else if cfg!(target_os = "windows") {
        "DirectML (CPU fallback)"
    } else if cfg!(feature = "cuda") {
        "CUDA (CPU fallback)"
    } else {
        "CPU"
    }
}

/// Builds an ONNX Runtime session for `model_path` with the preferred
/// providers.
pub fn build_session(model_path: &Path) -> Result<Session, DetectorError> {
    log::debug!("Loading model {}", model_path.display());
    let load_error = |e: String| -> DetectorError {
        format!("failed to load {}: {e}", model_path.display()).into()
    };
    Session::builder()
        .map_err(|e| load_error(e.to_string()))?
        .with_execution_providers(preferred_execution_providers())
        .map_err(|e| load_error(e.to_string()))?
        .commit_from_file(model_path)
        .map_err(|e| load_error(e.to_string()))
}
