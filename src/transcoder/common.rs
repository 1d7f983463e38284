// src/transcoder/common.rs
//
// Shared codec plumbing. The mozjpeg bindings report fatal codec errors by
// unwinding, so every FFI-backed encode/decode runs behind a panic shield
// that converts the unwind into an error value.

use crate::error::{ImagePipelineError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `op` and convert any panic into an Internal error tagged with `stage`.
pub fn run_shielded<T>(stage: &'static str, op: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(op)) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(ImagePipelineError::internal(format!(
                "{stage} panicked: {message}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_shielded_passes_through_ok() {
        let result = run_shielded("test", || Ok(7u32));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_run_shielded_passes_through_err() {
        let result: Result<()> = run_shielded("test", || {
            Err(ImagePipelineError::decode_failed("expected"))
        });
        assert!(matches!(
            result.unwrap_err(),
            ImagePipelineError::DecodeFailed { .. }
        ));
    }

    #[test]
    fn test_run_shielded_converts_panic() {
        let result: Result<()> = run_shielded("test:stage", || panic!("boom"));
        let err = result.unwrap_err();
        assert!(matches!(err, ImagePipelineError::Internal { .. }));
        assert!(err.to_string().contains("test:stage"));
        assert!(err.to_string().contains("boom"));
    }
}
