//! Node password file synchronization.
//!
//! The file holds one `password,name,<reserved>,<reserved>` record per
//! line and is read by tooling outside this process. Records whose
//! password no longer matches the live Instance are dropped by rewriting
//! the file through a temporary sibling and an atomic rename.

use std::collections::HashMap;
use std::fs::Permissions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// Number of comma-separated fields in a well-formed record
const RECORD_FIELDS: usize = 4;

/// Result of one synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No record disagreed with the live passwords; the file was left alone
    Unchanged,
    /// The file was rewritten without `removed` records
    Replaced { removed: usize },
}

/// Keeps the credential file consistent with known Instance passwords
#[derive(Debug)]
pub struct CredentialSync {
    path: PathBuf,
    tmp_path: PathBuf,
    lock: Mutex<()>,
}

impl CredentialSync {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp_path: PathBuf::from(tmp),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop records whose password differs from `passwords[name]`
    ///
    /// Records for names missing from `passwords` are kept as they are.
    /// Malformed records are dropped whenever the file is rewritten.
    pub async fn sync(&self, passwords: &HashMap<String, String>) -> std::io::Result<SyncOutcome> {
        let _guard = self.lock.lock().await;

        let source = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Credential file {} does not exist", self.path.display());
                return Ok(SyncOutcome::Unchanged);
            }
            Err(e) => return Err(e),
        };

        let permissions = source.metadata().await?.permissions();
        let filtered = self.write_filtered(source, permissions, passwords).await;
        let (mismatched, malformed) = match filtered {
            Ok(counts) => counts,
            Err(e) => {
                let _ = fs::remove_file(&self.tmp_path).await;
                return Err(e);
            }
        };

        if mismatched == 0 {
            fs::remove_file(&self.tmp_path).await?;
            return Ok(SyncOutcome::Unchanged);
        }

        fs::rename(&self.tmp_path, &self.path).await?;
        info!(
            "Replaced credential file {} ({} stale, {} malformed record(s) removed)",
            self.path.display(),
            mismatched,
            malformed
        );
        Ok(SyncOutcome::Replaced {
            removed: mismatched + malformed,
        })
    }

    /// Streams the kept records into the temporary file; returns the
    /// number of mismatched and malformed records
    ///
    /// The temporary file takes `permissions` from the original. Lines that
    /// are not UTF-8 count as malformed.
    async fn write_filtered(
        &self,
        source: File,
        permissions: Permissions,
        passwords: &HashMap<String, String>,
    ) -> std::io::Result<(usize, usize)> {
        let mut lines = BufReader::new(source).split(b'\n');
        let tmp = File::create(&self.tmp_path).await?;
        tmp.set_permissions(permissions).await?;
        let mut writer = BufWriter::new(tmp);
        let mut mismatched = 0;
        let mut malformed = 0;

        while let Some(raw) = lines.next_segment().await? {
            let Some((password, name)) = parse_record(&raw) else {
                malformed += 1;
                continue;
            };
            if passwords.get(name).is_some_and(|live| live != password) {
                warn!("Credential record for {} does not match its Instance", name);
                mismatched += 1;
                continue;
            }
            writer.write_all(&raw).await?;
            writer.write_all(b"\n").await?;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        if malformed > 0 {
            debug!("Skipped {} malformed credential record(s)", malformed);
        }
        Ok((mismatched, malformed))
    }
}

/// `(password, name)` of a well-formed record
fn parse_record(raw: &[u8]) -> Option<(&str, &str)> {
    let line = std::str::from_utf8(raw).ok()?;
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != RECORD_FIELDS {
        return None;
    }
    Some((fields[0], fields[1]))
}

/// Generation counter bumped each time the credential file is replaced
#[derive(Debug, Clone)]
pub struct ReloadSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for ReloadSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Announce a replacement
    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passwords(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(n, p)| ((*n).to_string(), (*p).to_string()))
            .collect()
    }

    async fn write_file(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("node-passwd");
        fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_mismatch_rewrites_file_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "p1,workers-a,workers-a,\np2,workers-b,workers-b,\nold,workers-c,workers-c,\np9,other-x,other-x,\n",
        )
        .await;

        let sync = CredentialSync::new(&path);
        let outcome = sync
            .sync(&passwords(&[("workers-a", "p1"), ("workers-b", "p2"), ("workers-c", "new")]))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Replaced { removed: 1 });
        let content = fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            content,
            "p1,workers-a,workers-a,\np2,workers-b,workers-b,\np9,other-x,other-x,\n"
        );
        assert!(!dir.path().join("node-passwd.tmp").exists());
    }

    #[tokio::test]
    async fn test_no_mismatch_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let original = "p1,workers-a,workers-a,\nmalformed line\n";
        let path = write_file(&dir, original).await;

        let sync = CredentialSync::new(&path);
        let outcome = sync.sync(&passwords(&[("workers-a", "p1")])).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&path).await.unwrap(), original);
        assert!(!dir.path().join("node-passwd.tmp").exists());
    }

    #[tokio::test]
    async fn test_malformed_records_dropped_on_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "old,workers-a,workers-a,\ntoo,few\np2,workers-b,workers-b,\n").await;

        let sync = CredentialSync::new(&path);
        let outcome = sync.sync(&passwords(&[("workers-a", "new")])).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Replaced { removed: 2 });
        assert_eq!(
            fs::read_to_string(&path).await.unwrap(),
            "p2,workers-b,workers-b,\n"
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_records_dropped_on_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node-passwd");
        fs::write(&path, b"old,workers-a,workers-a,\n\xff\xfe,junk,x,y\np2,workers-b,workers-b,\n")
            .await
            .unwrap();

        let sync = CredentialSync::new(&path);
        let outcome = sync.sync(&passwords(&[("workers-a", "new")])).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Replaced { removed: 2 });
        assert_eq!(
            fs::read_to_string(&path).await.unwrap(),
            "p2,workers-b,workers-b,\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rewrite_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "old,workers-a,workers-a,\n").await;
        fs::set_permissions(&path, Permissions::from_mode(0o600)).await.unwrap();

        let sync = CredentialSync::new(&path);
        let outcome = sync.sync(&passwords(&[("workers-a", "new")])).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Replaced { removed: 1 });
        let mode = fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_missing_file_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sync = CredentialSync::new(dir.path().join("absent"));
        let outcome = sync.sync(&passwords(&[("workers-a", "p1")])).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
    }

    #[test]
    fn test_reload_signal_counts_generations() {
        let signal = ReloadSignal::new();
        let rx = signal.subscribe();
        signal.notify();
        signal.notify();
        assert_eq!(signal.generation(), 2);
        assert_eq!(*rx.borrow(), 2);
    }
}
