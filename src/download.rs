//! Download sink boundary.
//!
//! The queue built by a refresh (or by `relmon download`) is handed to a
//! [`DownloadSink`] item by item. Every queued item is appended to
//! `queue.csv` and every failed one to `failed.csv` in the data directory;
//! `download --retry-failed` reads the latter back.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{
    Error, Res,
    config::{self, Config},
    notify::{self, Notifier},
    refresh::queue::{Digest, QueueItem, QueueRecord},
};

/// Consecutive failed logins after which the rest of the run is skipped.
pub const MAX_LOGIN_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("login failed: {0}")]
    Auth(String),

    #[error("download failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn login(&self) -> Result<(), SinkError>;

    async fn download(&self, item: &QueueItem) -> Result<(), SinkError>;
}

/// Runs an external download executable once per item:
/// `<program> --url URL --bitrate CODE --path DIR`, with the credential in
/// `RELMON_ARL`.
pub struct CommandSink {
    program: PathBuf,
    arl: Option<String>,
}

impl CommandSink {
    pub fn new(program: PathBuf, arl: Option<String>) -> Self {
        Self { program, arl }
    }

    pub fn from_config(config: &Config) -> Result<Self, crate::error::ConfigError> {
        let program = config
            .downloader
            .clone()
            .ok_or_else(|| crate::error::ConfigError::MissingValue("RELMON_DOWNLOADER".to_string()))?;
        Ok(Self::new(program, config.arl.clone()))
    }
}

#[async_trait]
impl DownloadSink for CommandSink {
    async fn login(&self) -> Result<(), SinkError> {
        match &self.arl {
            Some(arl) if !arl.trim().is_empty() => Ok(()),
            _ => Err(SinkError::Auth("no ARL configured".to_string())),
        }
    }

    async fn download(&self, item: &QueueItem) -> Result<(), SinkError> {
        let arl = self
            .arl
            .as_deref()
            .ok_or_else(|| SinkError::Auth("no ARL configured".to_string()))?;

        let output = Command::new(&self.program)
            .arg("--url")
            .arg(item.url())
            .arg("--bitrate")
            .arg(item.bitrate().code().to_string())
            .arg("--path")
            .arg(item.download_path())
            .env("RELMON_ARL", arl)
            .output()
            .await
            .map_err(|e| SinkError::Failed(format!("cannot run {}: {}", self.program.display(), e)))?;

        match output.status.code() {
            Some(0) => Ok(()),
            // The downloader signals a rejected credential with 77 (EX_NOPERM).
            Some(77) => Err(SinkError::Auth(String::from_utf8_lossy(&output.stderr).trim().to_string())),
            _ => Err(SinkError::Failed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

/// CSV audit files of queued and failed items.
pub struct AuditTrail {
    queue_path: PathBuf,
    failed_path: PathBuf,
}

impl AuditTrail {
    pub fn new(queue_path: PathBuf, failed_path: PathBuf) -> Self {
        Self {
            queue_path,
            failed_path,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config::queue_audit_path(config), config::failed_audit_path(config))
    }

    pub async fn record_queued(&self, items: &[QueueItem]) -> Res<()> {
        append_records(&self.queue_path, items).await
    }

    pub async fn record_failed(&self, items: &[QueueItem]) -> Res<()> {
        append_records(&self.failed_path, items).await
    }

    /// Failed items, re-validated. Malformed lines are logged and skipped.
    pub async fn read_failed(&self) -> Res<Vec<QueueItem>> {
        let content = match async_fs::read_to_string(&self.failed_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut items = Vec::new();
        for (number, line) in content.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let parsed = QueueRecord::from_fields(&parse_csv_line(line)).and_then(QueueItem::try_from);
            match parsed {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping line {} of {}: {}", number + 1, self.failed_path.display(), e),
            }
        }
        Ok(items)
    }

    pub async fn clear_failed(&self) -> Res<()> {
        match async_fs::remove_file(&self.failed_path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

async fn append_records(path: &PathBuf, items: &[QueueItem]) -> Res<()> {
    if items.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent).await?;
    }

    let mut content = match async_fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if content.is_empty() {
        content.push_str(&QueueRecord::HEADER.join(","));
        content.push('\n');
    }
    for item in items {
        let fields = QueueRecord::from(item).to_fields();
        content.push_str(&to_csv_line(&fields));
        content.push('\n');
    }

    async_fs::write(path, content).await?;
    Ok(())
}

fn to_csv_line(fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| {
            let field = field.replace(['\n', '\r'], " ");
            if field.contains([',', '"']) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub downloaded: usize,
    pub failed: Vec<QueueItem>,
}

/// Hands `queue` to `sink` in order.
///
/// A failed item is logged and recorded without blocking the others. After
/// [`MAX_LOGIN_ATTEMPTS`] consecutive failed logins the remaining items are
/// recorded as failed and [`Error::Authentication`] is returned.
pub async fn dispatch(queue: &[QueueItem], sink: &dyn DownloadSink, audit: &AuditTrail) -> Res<DispatchReport> {
    let mut report = DispatchReport::default();
    if queue.is_empty() {
        return Ok(report);
    }
    audit.record_queued(queue).await?;

    let mut login_failures = 0;
    let mut logged_in = false;

    for (index, item) in queue.iter().enumerate() {
        if !logged_in {
            match sink.login().await {
                Ok(()) => {
                    logged_in = true;
                    login_failures = 0;
                }
                Err(e) => {
                    login_failures += 1;
                    warn!("Download login failed ({}/{}): {}", login_failures, MAX_LOGIN_ATTEMPTS, e);
                    if login_failures >= MAX_LOGIN_ATTEMPTS {
                        report.failed.extend(queue[index..].iter().cloned());
                        audit.record_failed(&report.failed).await?;
                        return Err(Error::Authentication {
                            attempts: login_failures,
                        });
                    }
                    report.failed.push(item.clone());
                    continue;
                }
            }
        }

        match sink.download(item).await {
            Ok(()) => {
                debug!("Downloaded {}", item.label());
                report.downloaded += 1;
            }
            Err(SinkError::Auth(reason)) => {
                warn!("Credential rejected while downloading {}: {}", item.label(), reason);
                logged_in = false;
                report.failed.push(item.clone());
            }
            Err(e) => {
                warn!("Cannot download {}: {}", item.label(), e);
                report.failed.push(item.clone());
            }
        }
    }

    audit.record_failed(&report.failed).await?;
    Ok(report)
}

/// Dispatches `queue` to `sink` when there is one, then sends `digest`.
///
/// The digest goes out even when the sink gives up on its login; the
/// dispatch error is returned once the notifiers have run.
pub async fn deliver(
    queue: &[QueueItem],
    digest: &Digest,
    sink: Option<&dyn DownloadSink>,
    audit: &AuditTrail,
    notifiers: &[&dyn Notifier],
) -> Res<Option<DispatchReport>> {
    let dispatched = match sink {
        Some(sink) if !queue.is_empty() => Some(dispatch(queue, sink, audit).await),
        _ => None,
    };
    let sent = notify::send_digest(digest, notifiers).await;

    let report = dispatched.transpose()?;
    sent?;
    Ok(report)
}
