use std::env;
use std::env::current_exe;
use std::fs::read_to_string;
use std::path::Path;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use tracing::info;

use crate::exception;
use crate::exception::CoreRsResult;
use crate::json::from_json;

const CONF_PATH_ENV: &str = "CONF_PATH";

/// Loads the app config, `CONF_PATH` takes precedence over the bundled asset.
pub fn load<T>(asset: &str) -> CoreRsResult<T>
where
    T: DeserializeOwned,
{
    let path = match env::var(CONF_PATH_ENV) {
        Ok(path) => PathBuf::from(path),
        Err(_) => asset_path(asset)?,
    };
    info!("load config, path={}", path.to_string_lossy());
    load_file(&path)
}

pub fn load_file<T>(path: &Path) -> CoreRsResult<T>
where
    T: DeserializeOwned,
{
    let json = read_to_string(path).map_err(|err| {
        exception!(
            message = format!("failed to read file, path={}", path.to_string_lossy()),
            source = err
        )
    })?;
    from_json(&json)
}

pub fn asset_path(path: &str) -> CoreRsResult<PathBuf> {
    let exe_path = current_exe()?;
    let candidates = candidate_paths(&exe_path, path);
    candidates.iter().find(|candidate| candidate.exists()).cloned().ok_or_else(|| {
        exception!(
            message = format!(
                "asset not found, asset={path}, searched={:?}, exe={}",
                candidates,
                exe_path.to_string_lossy()
            )
        )
    })
}

fn candidate_paths(exe_path: &Path, path: &str) -> Vec<PathBuf> {
    let mut candidates = vec![exe_path.with_file_name(path)];
    // cargo run from source tree, assets stay in the crate folder
    if cfg!(debug_assertions)
        && let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR")
    {
        candidates.push(PathBuf::from(manifest_dir).join(path));
    }
    candidates
}
