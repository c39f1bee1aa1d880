use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::db::notifications::CREDENTIAL_EXPIRING;
use crate::db::{ExpiringCredential, Storage};
use crate::domain::{CredentialStatus, CredentialType, Secrecy};
use crate::error::CredtrackError;
use crate::service::job_lock::JobLock;

#[derive(Debug, Clone, Copy)]
pub struct NotifyOptions {
    pub days: u32,
    pub dry_run: bool,
}

/// One credential about to expire, as reported and delivered.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExpiringNotice {
    pub credential_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub full_name: String,
    pub email: String,
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub secrecy: Secrecy,
    pub credential: Option<String>,
    pub validity: NaiveDate,
    pub days_left: i64,
    pub status: CredentialStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyReport {
    pub window_end: NaiveDate,
    pub dry_run: bool,
    pub notices: Vec<ExpiringNotice>,
    /// Notices recorded in this run (always zero for dry runs).
    pub recorded: usize,
    /// Notices skipped because the same credential/validity was already notified.
    pub already_notified: usize,
    pub webhook_delivered: bool,
}

fn notice(row: ExpiringCredential, today: NaiveDate) -> Option<ExpiringNotice> {
    let status = row.credential.status(today);
    let validity = row.credential.fields.validity?;
    (status != CredentialStatus::Denied).then(|| ExpiringNotice {
        credential_id: row.credential.id,
        user_id: row.credential.user_id,
        user_name: row.user_name,
        full_name: row.user_full_name,
        email: row.user_email,
        kind: row.credential.fields.kind,
        secrecy: row.credential.fields.secrecy,
        credential: row.credential.fields.credential,
        validity,
        days_left: (validity - today).num_days(),
        status,
    })
}

/// Find active credentials whose validity ends within `days` and record one
/// notification per credential/validity pair, delivering new ones to the
/// configured webhook first.
pub async fn notify_expiring(
    storage: &Storage,
    cfg: &Config,
    today: NaiveDate,
    opts: NotifyOptions,
) -> Result<NotifyReport, CredtrackError> {
    let _lock = JobLock::acquire(
        &cfg.basic.run_dir,
        "credentials-notify-expiring",
        cfg.basic.lock_stale_after(),
    )?;

    let window_end = today
        .checked_add_days(Days::new(u64::from(opts.days)))
        .unwrap_or(NaiveDate::MAX);
    let notices: Vec<ExpiringNotice> = storage
        .expiring_credentials(today, window_end)
        .await?
        .into_iter()
        .filter_map(|row| notice(row, today))
        .collect();

    let mut fresh = Vec::new();
    let mut already_notified = 0;
    for n in &notices {
        if storage
            .notification_exists(n.credential_id, CREDENTIAL_EXPIRING, n.validity)
            .await?
        {
            already_notified += 1;
        } else {
            fresh.push(n.clone());
        }
    }

    let mut report = NotifyReport {
        window_end,
        dry_run: opts.dry_run,
        notices,
        recorded: 0,
        already_notified,
        webhook_delivered: false,
    };
    if opts.dry_run {
        info!(candidates = report.notices.len(), new = fresh.len(), "dry run; nothing recorded");
        return Ok(report);
    }

    if let Some(url) = cfg.notify.webhook_url.as_ref()
        && !fresh.is_empty()
    {
        deliver_webhook(url, &fresh).await?;
        report.webhook_delivered = true;
    }

    for n in &fresh {
        let payload = serde_json::to_value(n)?;
        if storage
            .insert_notification(n.user_id, n.credential_id, CREDENTIAL_EXPIRING, n.validity, &payload)
            .await?
        {
            report.recorded += 1;
            info!(
                target: "audit",
                user_id = n.user_id,
                credential_id = n.credential_id,
                validity = %n.validity,
                "expiring credential notified"
            );
        }
    }

    info!(
        candidates = report.notices.len(),
        recorded = report.recorded,
        already_notified = report.already_notified,
        "expiring credential notification run finished"
    );
    Ok(report)
}

async fn deliver_webhook(url: &Url, notices: &[ExpiringNotice]) -> Result<(), CredtrackError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("credtrack/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(15))
        .build()?;

    let body = json!({
        "event": "credentials.expiring",
        "generated_at": Utc::now(),
        "notices": notices,
    });
    let resp = client.post(url.clone()).json(&body).send().await?;
    if let Err(e) = resp.error_for_status_ref() {
        warn!(url = %url, status = %resp.status(), "webhook rejected notification batch");
        return Err(e.into());
    }
    Ok(())
}
