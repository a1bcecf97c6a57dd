//! Checkpoint file resolution for local directories and Hub repositories.

use crate::config::ModelArguments;
use crate::error::{Result, TuneError};
use hf_hub::api::sync::ApiBuilder;
use std::path::{Path, PathBuf};

/// Preferred checkpoint filename.
pub const SAFE_WEIGHTS_NAME: &str = "model.safetensors";

/// Legacy pickle checkpoint filename.
pub const WEIGHTS_NAME: &str = "pytorch_model.bin";

/// Turns a `(path_or_repo_id, filename)` pair into a readable local file.
pub trait CheckpointResolver {
    fn resolve(&self, path_or_repo_id: &str, filename: &str) -> Result<PathBuf>;
}

/// Resolves against a local directory first, then the Hugging Face Hub.
#[derive(Debug, Clone, Default)]
pub struct HubResolver {
    cache_dir: Option<PathBuf>,
    token: Option<String>,
}

impl HubResolver {
    pub fn new(cache_dir: Option<PathBuf>, token: Option<String>) -> Self {
        Self { cache_dir, token }
    }

    pub fn from_args(args: &ModelArguments) -> Self {
        Self::new(args.cache_dir.clone(), args.hf_hub_token.clone())
    }

    fn fetch(&self, repo_id: &str, filename: &str) -> Result<PathBuf> {
        let mut builder = ApiBuilder::new()
            .with_progress(false)
            .with_token(self.token.clone());
        if let Some(cache_dir) = &self.cache_dir {
            builder = builder.with_cache_dir(cache_dir.clone());
        }
        let api = builder.build()?;
        tracing::debug!(repo_id, filename, "Fetching checkpoint file from the Hub");
        Ok(api.model(repo_id.to_string()).get(filename)?)
    }
}

impl CheckpointResolver for HubResolver {
    fn resolve(&self, path_or_repo_id: &str, filename: &str) -> Result<PathBuf> {
        let local = Path::new(path_or_repo_id);
        if local.is_dir() {
            let candidate = local.join(filename);
            return if candidate.is_file() {
                Ok(candidate)
            } else {
                Err(TuneError::not_found(format!(
                    "{path_or_repo_id} does not appear to have a file named {filename}"
                )))
            };
        }
        self.fetch(path_or_repo_id, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_local_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SAFE_WEIGHTS_NAME), b"stub").unwrap();

        let resolver = HubResolver::default();
        let id = dir.path().to_str().unwrap();
        let path = resolver.resolve(id, SAFE_WEIGHTS_NAME).unwrap();
        assert_eq!(path, dir.path().join(SAFE_WEIGHTS_NAME));
    }

    #[test]
    fn test_resolve_local_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = HubResolver::default();
        let id = dir.path().to_str().unwrap();
        let err = resolver.resolve(id, WEIGHTS_NAME).unwrap_err();
        assert!(matches!(err, TuneError::NotFound(_)));
        assert!(err.to_string().contains(WEIGHTS_NAME));
    }
}
