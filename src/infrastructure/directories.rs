use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::config::DirectoryConfig;

const EXPORTS_SUBDIR: &str = "exports";

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub logs_dir: PathBuf,
    pub data_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub db_path: PathBuf,
}

pub fn ensure_directories(cfg: &DirectoryConfig) -> Result<ResolvedPaths> {
    let logs_dir = ensure_dir(&cfg.logs_dir)?;
    let data_dir = ensure_dir(&cfg.data_dir)?;
    let exports_dir = ensure_dir(&data_dir.join(EXPORTS_SUBDIR).to_string_lossy())?;
    let db_path = data_dir.join(&cfg.db_filename);

    let probe_file = exports_dir.join(".write-test");
    fs::write(&probe_file, b"ok")
        .with_context(|| format!("export directory {} is not writable", exports_dir.display()))?;
    fs::remove_file(&probe_file)?;

    clear_stale_exports(&exports_dir);

    Ok(ResolvedPaths {
        logs_dir,
        data_dir,
        exports_dir,
        db_path,
    })
}

fn ensure_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    if !dir.exists() {
        fs::create_dir_all(&dir).with_context(|| format!("failed to create directory {}", path))?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(&dir) {
            let mut perms = metadata.permissions();
            perms.set_mode(0o755);
            let _ = fs::set_permissions(&dir, perms);
        }
    }
    Ok(dir.canonicalize().unwrap_or(dir))
}

/// Export files left behind by a crash mid-delivery.
fn clear_stale_exports(exports_dir: &Path) {
    let Ok(entries) = fs::read_dir(exports_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_export = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("archive-") && name.ends_with(".json"));
        if is_export {
            if let Err(err) = fs::remove_file(&path) {
                tracing::warn!(
                    target: "lifecycle",
                    path = %path.display(),
                    error = %err,
                    "failed to remove stale export"
                );
            }
        }
    }
}
