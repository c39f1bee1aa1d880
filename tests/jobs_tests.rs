use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use credtrack::CredtrackError;
use credtrack::config::Config;
use credtrack::db::Storage;
use credtrack::domain::validation::{CredentialInput, UserInput};
use credtrack::service::backup::{backup_pattern, run_backup};
use credtrack::service::notify::{NotifyOptions, notify_expiring};
use credtrack::service::rotation::list_newest_first;
use credtrack::service::{CredentialService, UserService, metrics};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn reference_day() -> NaiveDate {
    date(2024, 12, 1)
}

fn test_config(dir: &TempDir) -> Config {
    let root = dir.path();
    let mut cfg = Config::default();
    cfg.basic.database_url = format!("sqlite://{}", root.join("credtrack.sqlite").display());
    cfg.basic.run_dir = root.join("run");
    cfg.logging.dir = None;
    cfg.backup.dir = root.join("backups");
    cfg.metrics.dir = root.join("metrics");
    cfg
}

fn credential(user_id: i64, kind: &str, fscs: Option<&str>, concession: Option<NaiveDate>) -> CredentialInput {
    CredentialInput {
        user_id: Some(user_id),
        fscs: fscs.map(str::to_string),
        kind: Some(kind.to_string()),
        secrecy: Some("S".to_string()),
        concession,
        ..Default::default()
    }
}

/// One holder with a credential in each interesting state, plus one trashed.
async fn seeded_storage() -> (Storage, i64) {
    let storage = Storage::connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    let users = UserService::new(storage.clone());
    let holder = users
        .create(
            UserInput {
                name: Some("holder".into()),
                full_name: Some("Holder Person".into()),
                email: Some("holder@example.org".into()),
                ..Default::default()
            },
            &BTreeSet::new(),
        )
        .await
        .expect("failed to create user");
    let user_id = holder.user.id;

    let credentials = CredentialService::new(storage.clone());
    let today = reference_day();
    let inputs = [
        // validity 2024-12-31, inside a 30 day window
        credential(user_id, "TCMS", Some("11111"), Some(date(2024, 3, 1))),
        // validity 2022-01-01, already expired
        credential(user_id, "CRED", Some("22222"), Some(date(2020, 1, 1))),
        credential(user_id, "CRED", Some("00000"), None),
    ];
    for input in inputs {
        credentials
            .create(input, None, today)
            .await
            .expect("failed to create credential");
    }
    let trashed = credentials
        .create(credential(user_id, "CRED", None, None), None, today)
        .await
        .expect("failed to create credential");
    credentials
        .delete(trashed.credential.id, None)
        .await
        .expect("failed to delete credential");

    (storage, user_id)
}

fn age(path: &Path, secs_ago: u64) {
    let file = File::options()
        .write(true)
        .open(path)
        .expect("failed to open file");
    file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
        .expect("failed to set mtime");
}

#[tokio::test]
async fn metrics_snapshot_counts_by_status_type_and_secrecy() {
    let (storage, _) = seeded_storage().await;
    let snapshot = metrics::collect(&storage, reference_day(), 30)
        .await
        .expect("collect failed");

    assert_eq!(snapshot.users.active, 1);
    assert_eq!(snapshot.users.trashed, 0);
    assert_eq!(snapshot.credentials.active, 3);
    assert_eq!(snapshot.credentials.trashed, 1);
    assert_eq!(snapshot.credentials.by_status["Em Processamento"], 1);
    assert_eq!(snapshot.credentials.by_status["Vencida"], 1);
    assert_eq!(snapshot.credentials.by_status["Negada"], 1);
    assert_eq!(snapshot.credentials.by_status["Válida"], 0);
    assert_eq!(snapshot.credentials.by_type["CRED"], 2);
    assert_eq!(snapshot.credentials.by_type["TCMS"], 1);
    assert_eq!(snapshot.credentials.by_secrecy["S"], 3);
    assert_eq!(snapshot.credentials.by_secrecy["AR"], 0);
    assert_eq!(snapshot.credentials.expiring, 1);
}

#[tokio::test]
async fn metrics_and_notices_skip_credentials_of_trashed_holders() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let cfg = test_config(&dir);
    let (storage, user_id) = seeded_storage().await;
    UserService::new(storage.clone())
        .delete(user_id)
        .await
        .expect("failed to delete user");

    let snapshot = metrics::collect(&storage, reference_day(), 30)
        .await
        .expect("collect failed");
    assert_eq!(snapshot.users.trashed, 1);
    assert_eq!(snapshot.credentials.active, 0);
    assert_eq!(snapshot.credentials.trashed, 4);
    assert_eq!(snapshot.credentials.expiring, 0);

    let dry = notify_expiring(&storage, &cfg, reference_day(), NotifyOptions { days: 30, dry_run: true })
        .await
        .expect("dry run failed");
    assert!(dry.notices.is_empty());
}

#[tokio::test]
async fn metrics_run_writes_latest_and_rotates() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let mut cfg = test_config(&dir);
    cfg.metrics.keep = 2;
    let (storage, _) = seeded_storage().await;

    for _ in 0..3 {
        metrics::run_collect(&storage, &cfg, reference_day())
            .await
            .expect("metrics run failed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let latest = fs::read_to_string(cfg.metrics.dir.join("latest.json")).expect("latest.json missing");
    let latest: serde_json::Value = serde_json::from_str(&latest).expect("latest.json is not json");
    assert_eq!(latest["reference_date"], "2024-12-01");

    let pattern = credtrack::service::rotation::FilePattern::new("metrics-", ".json");
    let kept = list_newest_first(&cfg.metrics.dir, &pattern).expect("list failed");
    assert_eq!(kept.len(), 2);
    assert!(!cfg.basic.run_dir.join(".metrics-collect.lock").exists());
}

#[tokio::test]
async fn notify_dry_run_records_nothing_then_real_run_is_idempotent() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let cfg = test_config(&dir);
    let (storage, user_id) = seeded_storage().await;
    let today = reference_day();

    let dry = notify_expiring(&storage, &cfg, today, NotifyOptions { days: 30, dry_run: true })
        .await
        .expect("dry run failed");
    assert_eq!(dry.notices.len(), 1);
    assert_eq!(dry.notices[0].validity, date(2024, 12, 31));
    assert_eq!(dry.notices[0].days_left, 30);
    assert_eq!(dry.recorded, 0);
    assert!(
        storage
            .notifications_for_user(user_id)
            .await
            .expect("query failed")
            .is_empty()
    );

    let real = notify_expiring(&storage, &cfg, today, NotifyOptions { days: 30, dry_run: false })
        .await
        .expect("notify failed");
    assert_eq!(real.recorded, 1);
    assert!(!real.webhook_delivered);

    let again = notify_expiring(&storage, &cfg, today, NotifyOptions { days: 30, dry_run: false })
        .await
        .expect("notify failed");
    assert_eq!(again.recorded, 0);
    assert_eq!(again.already_notified, 1);
    assert_eq!(
        storage
            .notifications_for_user(user_id)
            .await
            .expect("query failed")
            .len(),
        1
    );

    let narrow = notify_expiring(&storage, &cfg, today, NotifyOptions { days: 7, dry_run: true })
        .await
        .expect("dry run failed");
    assert!(narrow.notices.is_empty());
}

#[tokio::test]
async fn backup_writes_dump_and_keeps_newest() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let mut cfg = test_config(&dir);
    cfg.backup.dump_program = "sh".into();
    cfg.backup.dump_args = vec!["-c".into(), "echo 'dump of {database}'".into()];

    fs::create_dir_all(&cfg.backup.dir).expect("failed to create backup dir");
    for i in 0..6u64 {
        let old = cfg.backup.dir.join(format!("backup-20240101-00000{i}-000.sql"));
        fs::write(&old, "old").expect("failed to write old backup");
        age(&old, 3600 * (i + 1));
    }
    let unrelated = cfg.backup.dir.join("notes.txt");
    fs::write(&unrelated, "keep me").expect("failed to write unrelated file");

    let report = run_backup(&cfg, 5).await.expect("backup failed");
    assert!(report.bytes > 0);
    let contents = fs::read_to_string(&report.path).expect("dump missing");
    assert!(contents.contains("credtrack.sqlite"));
    assert_eq!(report.removed.len(), 2);

    let kept = list_newest_first(&cfg.backup.dir, &backup_pattern()).expect("list failed");
    assert_eq!(kept.len(), 5);
    assert_eq!(kept[0], report.path);
    assert!(unrelated.exists());
}

#[tokio::test]
async fn backup_fails_closed() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let mut cfg = test_config(&dir);

    // non-zero exit
    cfg.backup.dump_program = "false".into();
    cfg.backup.dump_args = vec![];
    let err = run_backup(&cfg, 5).await.unwrap_err();
    assert!(matches!(err, CredtrackError::BackupFailed(_)));

    // success with no output
    cfg.backup.dump_program = "true".into();
    let err = run_backup(&cfg, 5).await.unwrap_err();
    assert!(matches!(err, CredtrackError::BackupFailed(_)));

    cfg.backup.dump_program = "definitely-not-a-dump-tool".into();
    let err = run_backup(&cfg, 5).await.unwrap_err();
    assert!(matches!(err, CredtrackError::BackupFailed(_)));

    let left = list_newest_first(&cfg.backup.dir, &backup_pattern()).expect("list failed");
    assert!(left.is_empty());
}

#[tokio::test]
async fn backup_refuses_in_memory_database_and_concurrent_runs() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let mut cfg = test_config(&dir);
    cfg.basic.database_url = "sqlite::memory:".into();
    let err = run_backup(&cfg, 5).await.unwrap_err();
    assert!(matches!(err, CredtrackError::BackupFailed(_)));

    let cfg = test_config(&dir);
    fs::create_dir_all(&cfg.basic.run_dir).expect("failed to create run dir");
    let lock = cfg.basic.run_dir.join(".db-backup.lock");
    fs::write(&lock, std::process::id().to_string()).expect("failed to write lock");
    let err = run_backup(&cfg, 5).await.unwrap_err();
    assert!(matches!(err, CredtrackError::JobLocked(_)));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn backup_reclaims_lock_left_by_dead_run() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let mut cfg = test_config(&dir);
    cfg.backup.dump_program = "sh".into();
    cfg.backup.dump_args = vec!["-c".into(), "echo 'dump of {database}'".into()];

    fs::create_dir_all(&cfg.basic.run_dir).expect("failed to create run dir");
    let lock = cfg.basic.run_dir.join(".db-backup.lock");
    fs::write(&lock, "4194305\n").expect("failed to write lock");

    let report = run_backup(&cfg, 5).await.expect("backup failed");
    assert!(report.bytes > 0);
    assert!(!lock.exists());
}
