use chrono::Local;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info};

use crate::config::Config;
use crate::error::CredtrackError;
use crate::service::job_lock::JobLock;
use crate::service::rotation::{self, FilePattern};

const DATABASE_PLACEHOLDER: &str = "{database}";

pub fn backup_pattern() -> FilePattern {
    FilePattern::new("backup-", ".sql")
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub removed: Vec<PathBuf>,
}

/// Dump the database to a new file under the backup dir, then keep only the
/// `keep` most recent dumps. A failed or empty dump is deleted and reported.
pub async fn run_backup(cfg: &Config, keep: usize) -> Result<BackupReport, CredtrackError> {
    let _lock = JobLock::acquire(
        &cfg.basic.run_dir,
        "db-backup",
        cfg.basic.lock_stale_after(),
    )?;

    let database = cfg.database_path().ok_or_else(|| {
        CredtrackError::BackupFailed("database_url does not point at a database file".into())
    })?;

    fs::create_dir_all(&cfg.backup.dir)?;
    let path = cfg.backup.dir.join(format!(
        "backup-{}.sql",
        Local::now().format("%Y%m%d-%H%M%S-%3f")
    ));

    if let Err(e) = dump(cfg, &database, &path).await {
        discard(&path);
        error!(path = %path.display(), error = %e, "database dump failed");
        return Err(e);
    }

    let bytes = fs::metadata(&path)?.len();
    if bytes == 0 {
        discard(&path);
        error!(path = %path.display(), "database dump produced an empty file");
        return Err(CredtrackError::BackupFailed("dump produced an empty file".into()));
    }

    let removed = rotation::prune(&cfg.backup.dir, &backup_pattern(), keep.max(1))?;
    info!(
        path = %path.display(),
        bytes,
        removed = removed.len(),
        "database backup written"
    );
    Ok(BackupReport {
        path,
        bytes,
        removed,
    })
}

async fn dump(cfg: &Config, database: &Path, out: &Path) -> Result<(), CredtrackError> {
    let file = File::create(out)?;
    let database = database.to_string_lossy();
    let args: Vec<String> = cfg
        .backup
        .dump_args
        .iter()
        .map(|arg| arg.replace(DATABASE_PLACEHOLDER, &database))
        .collect();

    let output = Command::new(&cfg.backup.dump_program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(file))
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            CredtrackError::BackupFailed(format!(
                "failed to run `{}`: {e}",
                cfg.backup.dump_program
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CredtrackError::BackupFailed(format!(
            "`{}` exited with {}: {}",
            cfg.backup.dump_program,
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

fn discard(path: &Path) {
    if path.exists()
        && let Err(e) = fs::remove_file(path)
    {
        error!(path = %path.display(), error = %e, "failed to remove partial backup");
    }
}
