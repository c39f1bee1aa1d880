use chrono::{Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::Metadata;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::CredtrackError;
use crate::service::rotation::{self, FilePattern};

/// Source of the current local date; swapped out in tests.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

struct Current {
    date: NaiveDate,
    file: File,
}

struct Channel {
    dir: PathBuf,
    name: &'static str,
    retain: usize,
    clock: Clock,
    current: Mutex<Current>,
}

fn open_dated(dir: &Path, name: &str, date: NaiveDate) -> io::Result<File> {
    let path = dir.join(format!("{name}-{}.log", date.format("%Y-%m-%d")));
    OpenOptions::new().create(true).append(true).open(path)
}

impl Channel {
    fn prune(&self) {
        let pattern = FilePattern::new(format!("{}-", self.name), ".log");
        // Not through tracing: the channel lock is held while this runs.
        if let Err(e) = rotation::prune(&self.dir, &pattern, self.retain.max(1)) {
            eprintln!("failed to prune {} log files: {e}", self.name);
        }
    }

    fn append(&self, buf: &[u8]) -> io::Result<()> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let today = (self.clock)();
        if today != current.date {
            current.file = open_dated(&self.dir, self.name, today)?;
            current.date = today;
            self.prune();
        }
        current.file.write_all(buf)?;
        current.file.flush()
    }
}

/// `MakeWriter` for one dated channel file (`<name>-YYYY-MM-DD.log`).
///
/// The file is reopened on the first event after the local date changes, and
/// files beyond `retain` are pruned at that point.
#[derive(Clone)]
pub struct DailyFile {
    channel: Arc<Channel>,
}

impl DailyFile {
    pub fn new(dir: &Path, name: &'static str, retain: usize) -> Result<Self, CredtrackError> {
        Self::with_clock(dir, name, retain, Arc::new(local_today))
    }

    pub fn with_clock(
        dir: &Path,
        name: &'static str,
        retain: usize,
        clock: Clock,
    ) -> Result<Self, CredtrackError> {
        fs::create_dir_all(dir)?;
        let date = clock();
        let file = open_dated(dir, name, date)?;
        let channel = Channel {
            dir: dir.to_path_buf(),
            name,
            retain,
            clock,
            current: Mutex::new(Current { date, file }),
        };
        channel.prune();
        Ok(Self {
            channel: Arc::new(channel),
        })
    }
}

impl<'a> MakeWriter<'a> for DailyFile {
    type Writer = DailyWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DailyWriter {
            channel: Arc::clone(&self.channel),
            buf: Vec::with_capacity(256),
        }
    }
}

/// Buffers one formatted event and appends it to the channel on drop.
pub struct DailyWriter {
    channel: Arc<Channel>,
    buf: Vec<u8>,
}

impl Write for DailyWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for DailyWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        if let Err(e) = self.channel.append(&self.buf) {
            eprintln!("failed to write {} log: {e}", self.channel.name);
        }
    }
}

fn is_channel(meta: &Metadata<'_>, channel: &'static str) -> bool {
    meta.target() == channel
}

/// Install the global subscriber: stdout plus, when a log dir is configured,
/// one dated file per channel. Everything goes to `daily`; `audit` and
/// `security` also get their own file, selected by event target.
pub fn init(cfg: &Config) -> Result<(), CredtrackError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));

    let stdout = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_target(false);

    let Some(dir) = cfg.logging.dir.as_deref() else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout)
            .init();
        return Ok(());
    };

    let retain = cfg.logging.retain;
    let daily = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(DailyFile::new(dir, "daily", retain)?);
    let audit = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(DailyFile::new(dir, "audit", retain)?)
        .with_filter(filter_fn(|meta| is_channel(meta, "audit")));
    let security = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(DailyFile::new(dir, "security", retain)?)
        .with_filter(filter_fn(|meta| is_channel(meta, "security")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout)
        .with(daily)
        .with(audit)
        .with(security)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::{Duration, SystemTime};

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap() + chrono::Days::new(offset as u64)
    }

    fn log_line(writer: &DailyFile, line: &str) {
        let mut w = writer.make_writer();
        w.write_all(line.as_bytes()).unwrap();
    }

    fn age(path: &Path, secs: u64) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn switches_file_when_the_date_changes_and_prunes_old_days() {
        let dir = tempfile::tempdir().unwrap();
        let offset = Arc::new(AtomicI64::new(0));
        let clock: Clock = {
            let offset = Arc::clone(&offset);
            Arc::new(move || day(offset.load(Ordering::SeqCst)))
        };
        let writer = DailyFile::with_clock(dir.path(), "audit", 2, clock).unwrap();
        let path = |offset: i64| dir.path().join(format!("audit-{}.log", day(offset).format("%Y-%m-%d")));

        log_line(&writer, "first\n");
        age(&path(0), 3 * 86_400);

        offset.store(1, Ordering::SeqCst);
        log_line(&writer, "second\n");
        age(&path(1), 2 * 86_400);
        assert_eq!(fs::read_to_string(path(0)).unwrap(), "first\n");
        assert_eq!(fs::read_to_string(path(1)).unwrap(), "second\n");

        offset.store(2, Ordering::SeqCst);
        log_line(&writer, "third\n");
        assert!(!path(0).exists());
        assert!(path(1).exists());
        assert_eq!(fs::read_to_string(path(2)).unwrap(), "third\n");
    }

    #[test]
    fn same_day_events_append_to_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer =
            DailyFile::with_clock(dir.path(), "daily", 5, Arc::new(|| day(0))).unwrap();
        log_line(&writer, "a\n");
        log_line(&writer, "b\n");
        let contents = fs::read_to_string(dir.path().join("daily-2026-03-01.log")).unwrap();
        assert_eq!(contents, "a\nb\n");
    }
}
