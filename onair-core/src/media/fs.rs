use std::{
    io,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use onair_model::MediaStatus;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::MediaProbe;
use crate::clock::SharedClock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaCheckSettings {
    pub root: PathBuf,
    /// Files modified more recently than this are reported as
    /// [`MediaStatus::Grace`]. Zero disables the check.
    pub grace_secs: u64,
    pub check_timeout_ms: u64,
}

impl Default for MediaCheckSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("media"),
            grace_secs: 10,
            check_timeout_ms: 2_000,
        }
    }
}

/// Stats media files relative to a configured root.
#[derive(Debug, Clone)]
pub struct FsMediaChecker {
    root: PathBuf,
    grace: Duration,
    timeout: Duration,
    clock: SharedClock,
}

impl FsMediaChecker {
    pub fn new(settings: &MediaCheckSettings, clock: SharedClock) -> Self {
        Self {
            root: settings.root.clone(),
            grace: Duration::from_secs(settings.grace_secs),
            timeout: Duration::from_millis(settings.check_timeout_ms),
            clock,
        }
    }

    /// Joins `media_ref` onto the root, refusing anything that could escape it.
    fn resolve(&self, media_ref: &str) -> Option<PathBuf> {
        let relative = Path::new(media_ref);
        if media_ref.is_empty() || relative.is_absolute() {
            return None;
        }
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        contained.then(|| self.root.join(relative))
    }

    fn classify_age(&self, modified: DateTime<Utc>) -> MediaStatus {
        if self.grace.is_zero() {
            return MediaStatus::Present;
        }
        let now = self.clock.now();
        // Clock skew can put mtime ahead of now; that is not settled either.
        match (now - modified).to_std() {
            Ok(age) if age >= self.grace => MediaStatus::Present,
            _ => MediaStatus::Grace,
        }
    }
}

#[async_trait]
impl MediaProbe for FsMediaChecker {
    async fn check(&self, media_ref: &str) -> MediaStatus {
        let Some(path) = self.resolve(media_ref) else {
            warn!(media_ref, "media reference escapes media root; treating as missing");
            return MediaStatus::Missing;
        };

        let metadata =
            match tokio::time::timeout(self.timeout, tokio::fs::metadata(&path)).await {
                Ok(Ok(metadata)) => metadata,
                Ok(Err(err)) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(media_ref, "media file not found");
                    return MediaStatus::Missing;
                }
                Ok(Err(err)) => {
                    warn!(media_ref, error = %err, "media stat failed; treating as missing");
                    return MediaStatus::Missing;
                }
                Err(_) => {
                    warn!(
                        media_ref,
                        timeout = ?self.timeout,
                        "media stat timed out; treating as missing"
                    );
                    return MediaStatus::Missing;
                }
            };

        if !metadata.is_file() {
            warn!(media_ref, "media reference is not a regular file");
            return MediaStatus::Missing;
        }

        match metadata.modified() {
            Ok(modified) => self.classify_age(DateTime::<Utc>::from(modified)),
            Err(err) => {
                debug!(media_ref, error = %err, "mtime unavailable; skipping grace check");
                MediaStatus::Present
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use std::{fs::File, sync::Arc, time::SystemTime};

    fn checker(root: &Path, grace_secs: u64, clock: SharedClock) -> FsMediaChecker {
        let settings = MediaCheckSettings {
            root: root.to_path_buf(),
            grace_secs,
            check_timeout_ms: 1_000,
        };
        FsMediaChecker::new(&settings, clock)
    }

    fn write_with_age(root: &Path, name: &str, age: Duration) {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[tokio::test]
    async fn settled_file_is_present() {
        let dir = tempfile::tempdir().unwrap();
        write_with_age(dir.path(), "shows/morning.mp3", Duration::from_secs(3_600));
        let checker = checker(dir.path(), 10, Arc::new(SystemClock));

        assert_eq!(checker.check("shows/morning.mp3").await, MediaStatus::Present);
    }

    #[tokio::test]
    async fn absent_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker(dir.path(), 10, Arc::new(SystemClock));

        assert_eq!(checker.check("shows/nope.mp3").await, MediaStatus::Missing);
    }

    #[tokio::test]
    async fn recently_modified_file_is_in_grace() {
        let dir = tempfile::tempdir().unwrap();
        write_with_age(dir.path(), "fresh.mp3", Duration::from_secs(2));
        let checker = checker(dir.path(), 10, Arc::new(SystemClock));

        assert_eq!(checker.check("fresh.mp3").await, MediaStatus::Grace);
    }

    #[tokio::test]
    async fn zero_grace_trusts_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        write_with_age(dir.path(), "fresh.mp3", Duration::from_secs(0));
        let checker = checker(dir.path(), 0, Arc::new(SystemClock));

        assert_eq!(checker.check("fresh.mp3").await, MediaStatus::Present);
    }

    #[tokio::test]
    async fn grace_follows_injected_clock() {
        let dir = tempfile::tempdir().unwrap();
        write_with_age(dir.path(), "a.mp3", Duration::from_secs(0));
        let clock = ManualClock::new(Utc::now());
        let checker = checker(dir.path(), 30, clock.shared());

        assert_eq!(checker.check("a.mp3").await, MediaStatus::Grace);
        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(checker.check("a.mp3").await, MediaStatus::Present);
    }

    #[tokio::test]
    async fn escaping_references_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker(dir.path(), 0, Arc::new(SystemClock));

        assert_eq!(checker.check("../etc/passwd").await, MediaStatus::Missing);
        assert_eq!(checker.check("/etc/passwd").await, MediaStatus::Missing);
        assert_eq!(checker.check("").await, MediaStatus::Missing);
    }

    #[tokio::test]
    async fn directories_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("shows")).unwrap();
        let checker = checker(dir.path(), 0, Arc::new(SystemClock));

        assert_eq!(checker.check("shows").await, MediaStatus::Missing);
    }
}
