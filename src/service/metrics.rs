use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::db::{CredentialFilter, Storage, Trashed};
use crate::domain::{CredentialStatus, CredentialType, Secrecy};
use crate::error::CredtrackError;
use crate::service::job_lock::JobLock;
use crate::service::rotation::{self, FilePattern};

const LATEST: &str = "latest.json";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserCounts {
    pub active: i64,
    pub trashed: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CredentialCounts {
    pub active: i64,
    pub trashed: i64,
    pub by_status: BTreeMap<&'static str, i64>,
    pub by_type: BTreeMap<&'static str, i64>,
    pub by_secrecy: BTreeMap<&'static str, i64>,
    pub expiring_window_days: u32,
    pub expiring: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub collected_at: DateTime<Utc>,
    pub reference_date: NaiveDate,
    pub users: UserCounts,
    pub credentials: CredentialCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub path: PathBuf,
    pub snapshot: MetricsSnapshot,
    pub removed: Vec<PathBuf>,
}

fn zeroed<K: Ord>(keys: impl IntoIterator<Item = K>) -> BTreeMap<K, i64> {
    keys.into_iter().map(|k| (k, 0)).collect()
}

/// Aggregate counts over active rows; trashed rows are only counted.
pub async fn collect(
    storage: &Storage,
    today: NaiveDate,
    window_days: u32,
) -> Result<MetricsSnapshot, CredtrackError> {
    let users = UserCounts {
        active: storage.count_users(Trashed::Without).await?,
        trashed: storage.count_users(Trashed::Only).await?,
    };

    let active = storage.list_credentials(CredentialFilter::default()).await?;
    let horizon = today
        .checked_add_days(Days::new(u64::from(window_days)))
        .unwrap_or(NaiveDate::MAX);

    let mut by_status = zeroed(CredentialStatus::ALL.map(CredentialStatus::label));
    let mut by_type = zeroed(CredentialType::ALL.map(CredentialType::as_str));
    let mut by_secrecy = zeroed(Secrecy::ALL.map(Secrecy::as_str));
    let mut expiring = 0;

    for credential in &active {
        *by_status.entry(credential.status(today).label()).or_default() += 1;
        *by_type.entry(credential.fields.kind.as_str()).or_default() += 1;
        *by_secrecy.entry(credential.fields.secrecy.as_str()).or_default() += 1;
        if credential
            .fields
            .validity
            .is_some_and(|v| v >= today && v <= horizon)
        {
            expiring += 1;
        }
    }

    Ok(MetricsSnapshot {
        collected_at: Utc::now(),
        reference_date: today,
        users,
        credentials: CredentialCounts {
            active: active.len() as i64,
            trashed: storage.count_trashed_credentials().await?,
            by_status,
            by_type,
            by_secrecy,
            expiring_window_days: window_days,
            expiring,
        },
    })
}

/// Collect, write a timestamped snapshot plus `latest.json`, rotate old snapshots.
pub async fn run_collect(
    storage: &Storage,
    cfg: &Config,
    today: NaiveDate,
) -> Result<MetricsReport, CredtrackError> {
    let _lock = JobLock::acquire(
        &cfg.basic.run_dir,
        "metrics-collect",
        cfg.basic.lock_stale_after(),
    )?;
    let snapshot = collect(storage, today, cfg.metrics.expiring_window_days).await?;

    let dir = &cfg.metrics.dir;
    fs::create_dir_all(dir)?;
    let json = serde_json::to_vec_pretty(&snapshot)?;

    let path = dir.join(format!(
        "metrics-{}.json",
        Local::now().format("%Y%m%d-%H%M%S-%3f")
    ));
    fs::write(&path, &json)?;

    let tmp = dir.join(format!("{LATEST}.tmp"));
    fs::write(&tmp, &json)?;
    fs::rename(&tmp, dir.join(LATEST))?;

    let removed = rotation::prune(
        dir,
        &FilePattern::new("metrics-", ".json"),
        cfg.metrics.keep.max(1),
    )?;
    info!(
        path = %path.display(),
        users = snapshot.users.active,
        credentials = snapshot.credentials.active,
        "metrics snapshot written"
    );
    Ok(MetricsReport {
        path,
        snapshot,
        removed,
    })
}
