//! [`MemoryStore`] – one pretty-printed JSON file per user.
//!
//! Records live at `<root>/<encoded user id>.json` (see [`encode_user_id`]).
//! Every save writes a sibling `.tmp` file, syncs it and renames it over the
//! target, so a failed write never damages the previously saved record.  A
//! record file marked read-only is never replaced.
//!
//! When the root directory cannot be created, or a later write fails, the
//! store keeps working in session-only mode: [`MemoryStore::save`] reports
//! [`SaveStatus::Skipped`] and records a warning instead of returning an
//! error, and the caller's in-memory record stays authoritative.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use platewise_types::PlateError;
use tracing::{debug, info, warn};

use crate::record::{ActiveSignal, MemoryRecord, PreferenceUpdate};

/// Outcome of [`MemoryStore::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Saved(PathBuf),
    /// Nothing was written; the record only lives in memory.
    Skipped { reason: String },
}

impl SaveStatus {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveStatus::Saved(_))
    }
}

/// Map a user id onto a file stem.  `[A-Za-z0-9_-]` is kept as is and every
/// other byte becomes `%XX`, so distinct ids never share a file.  The empty
/// id maps to a lone `%`, which no encoded id can produce.
pub fn encode_user_id(user_id: &str) -> String {
    if user_id.is_empty() {
        return "%".to_string();
    }
    let mut stem = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryStore
// ─────────────────────────────────────────────────────────────────────────────

/// File-backed store of [`MemoryRecord`]s.
#[derive(Debug)]
pub struct MemoryStore {
    /// `None` in session-only mode.
    root: Option<PathBuf>,
    warnings: Vec<String>,
}

impl MemoryStore {
    /// Open (creating if needed) a store rooted at `root`.  Never fails: an
    /// unusable root yields a session-only store with a recorded warning.
    pub fn open(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        match fs::create_dir_all(root) {
            Ok(()) => {
                info!(root = %root.display(), "memory store opened");
                Self {
                    root: Some(root.to_path_buf()),
                    warnings: Vec::new(),
                }
            }
            Err(e) => {
                let msg = format!(
                    "memory directory {} unavailable ({e}); memory is session-only",
                    root.display()
                );
                warn!(root = %root.display(), error = %e, "memory store is session-only");
                Self {
                    root: None,
                    warnings: vec![msg],
                }
            }
        }
    }

    /// A store that never touches the filesystem.
    pub fn session_only() -> Self {
        Self {
            root: None,
            warnings: Vec::new(),
        }
    }

    pub fn is_durable(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// File that holds `user_id`'s record, if the store is durable.
    pub fn path_for(&self, user_id: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{}.json", encode_user_id(user_id))))
    }

    /// Warnings recorded so far (degraded mode, failed writes).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Load `user_id`'s record.  A user with no saved record gets a fresh,
    /// empty one.
    ///
    /// # Errors
    ///
    /// [`PlateError::MemoryRead`] when a record file exists but cannot be
    /// read or parsed, or belongs to a different user.
    pub fn load(&self, user_id: &str) -> Result<MemoryRecord, PlateError> {
        let Some(path) = self.path_for(user_id) else {
            return Ok(MemoryRecord::new(user_id));
        };
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(user_id, "no stored memory, starting fresh");
                return Ok(MemoryRecord::new(user_id));
            }
            Err(e) => {
                return Err(PlateError::MemoryRead(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        let record: MemoryRecord = serde_json::from_str(&text).map_err(|e| {
            PlateError::MemoryRead(format!("corrupt record {}: {e}", path.display()))
        })?;
        if record.user_id != user_id {
            return Err(PlateError::MemoryRead(format!(
                "{} holds the record of `{}`, not `{user_id}`",
                path.display(),
                record.user_id
            )));
        }
        debug!(user_id, path = %path.display(), "memory loaded");
        Ok(record)
    }

    /// Persist `record`, reporting any failure as an error.
    pub fn try_save(&self, record: &MemoryRecord) -> Result<PathBuf, PlateError> {
        let path = self
            .path_for(&record.user_id)
            .ok_or_else(|| PlateError::MemoryWrite("memory store is session-only".into()))?;
        write_atomic(&path, record)
            .map_err(|e| PlateError::MemoryWrite(format!("{}: {e}", path.display())))?;
        debug!(user_id = %record.user_id, path = %path.display(), "memory saved");
        Ok(path)
    }

    /// Persist `record`.  Failures degrade to a no-op with a warning; a
    /// store that failed once still retries on the next save.
    pub fn save(&mut self, record: &MemoryRecord) -> SaveStatus {
        if self.root.is_none() {
            return SaveStatus::Skipped {
                reason: "memory store is session-only".into(),
            };
        }
        match self.try_save(record) {
            Ok(path) => SaveStatus::Saved(path),
            Err(e) => {
                warn!(user_id = %record.user_id, error = %e, "memory not persisted");
                let reason = e.to_string();
                self.warnings.push(reason.clone());
                SaveStatus::Skipped { reason }
            }
        }
    }

    /// Apply session-scoped signals to `record` in place.  Does not save.
    pub fn update_active<'r, I>(&self, record: &'r mut MemoryRecord, signals: I) -> &'r mut MemoryRecord
    where
        I: IntoIterator<Item = ActiveSignal>,
    {
        for signal in signals {
            record.apply_active(signal);
        }
        record
    }

    /// Apply durable preference updates to `record` in place.  Does not save.
    pub fn update_permanent<'r, I>(
        &self,
        record: &'r mut MemoryRecord,
        updates: I,
    ) -> &'r mut MemoryRecord
    where
        I: IntoIterator<Item = PreferenceUpdate>,
    {
        for update in updates {
            record.apply_permanent(update);
        }
        record
    }
}

fn write_atomic(path: &Path, record: &MemoryRecord) -> std::io::Result<()> {
    // A read-only record stays untouched even when its directory is writable.
    match fs::metadata(path) {
        Ok(meta) if meta.permissions().readonly() => {
            return Err(std::io::Error::new(
                ErrorKind::PermissionDenied,
                "record file is read-only",
            ));
        }
        _ => {}
    }
    let json = serde_json::to_vec_pretty(record).map_err(std::io::Error::other)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use platewise_types::{Dish, Feedback};

    fn populated(user: &str) -> MemoryRecord {
        let mut r = MemoryRecord::new(user);
        r.apply_active(ActiveSignal::Query("something spicy".into()));
        r.apply_active(ActiveSignal::Shown(vec!["D011".into(), "D016".into()]));
        r.apply_permanent(PreferenceUpdate::Set {
            key: "spice_preference".into(),
            value: "High".into(),
        });
        r.apply_permanent(PreferenceUpdate::Feedback {
            dish: Dish::new("D011", "Fish Curry", "Coastal", 400.0, 4.6).with_tags(["Spicy"]),
            feedback: Feedback::like().with_rating(5.0).with_comment("fiery"),
        });
        r
    }

    #[test]
    fn encodes_ids() {
        assert_eq!(encode_user_id("user_demo-001"), "user_demo-001");
        assert_eq!(encode_user_id("../etc/passwd"), "%2E%2E%2Fetc%2Fpasswd");
        assert_eq!(encode_user_id("100%"), "100%25");
        assert_eq!(encode_user_id(""), "%");
    }

    #[test]
    fn similar_ids_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::open(dir.path());
        let ids = ["a_b", "a.b", "a b", "a%2Eb"];
        let paths: std::collections::HashSet<_> =
            ids.iter().filter_map(|id| store.path_for(id)).collect();
        assert_eq!(paths.len(), ids.len());

        let underscore = populated("a_b");
        assert!(store.save(&underscore).is_saved());
        let dotted = store.load("a.b").unwrap();
        assert_eq!(dotted.user_id, "a.b");
        assert!(dotted.permanent.is_empty());
        assert_eq!(store.load("a_b").unwrap(), underscore);
    }

    #[test]
    fn record_of_another_user_is_memory_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::open(dir.path());
        assert!(store.save(&populated("frida")).is_saved());
        fs::rename(dir.path().join("frida.json"), dir.path().join("gus.json")).unwrap();
        assert!(matches!(store.load("gus"), Err(PlateError::MemoryRead(_))));
    }

    #[cfg(unix)]
    #[test]
    fn read_only_record_is_skipped_with_warning() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::open(dir.path());
        let first = populated("hal");
        assert!(store.save(&first).is_saved());
        let path = dir.path().join("hal.json");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();

        let mut second = first.clone();
        second.apply_active(ActiveSignal::Query("later".into()));
        assert!(matches!(store.save(&second), SaveStatus::Skipped { .. }));
        assert_eq!(store.warnings().len(), 1);

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o444);
        assert_eq!(store.load("hal").unwrap(), first);
        assert!(!dir.path().join("hal.json.tmp").exists());
    }

    #[test]
    fn unknown_user_loads_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path());
        let r = store.load("new-user").unwrap();
        assert_eq!(r.user_id, "new-user");
        assert!(r.permanent.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::open(dir.path());
        let record = populated("alice");
        let status = store.save(&record);
        assert!(status.is_saved());
        assert_eq!(store.load("alice").unwrap(), record);
        assert!(!dir.path().join("alice.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_memory_read_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bob.json"), "{ not json").unwrap();
        let store = MemoryStore::open(dir.path());
        assert!(matches!(store.load("bob"), Err(PlateError::MemoryRead(_))));
    }

    #[test]
    fn failed_write_is_skipped_with_warning_and_keeps_old_record() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("mem");
        let mut store = MemoryStore::open(&root);
        let first = populated("carol");
        assert!(store.save(&first).is_saved());

        // Swap the directory for a plain file so every write fails.
        let saved = fs::read_to_string(root.join("carol.json")).unwrap();
        fs::remove_dir_all(&root).unwrap();
        fs::write(&root, "").unwrap();

        let mut second = first.clone();
        second.apply_active(ActiveSignal::Query("again".into()));
        let status = store.save(&second);
        assert!(matches!(status, SaveStatus::Skipped { .. }));
        assert_eq!(store.warnings().len(), 1);

        // Restore the directory with the old file: still the first record.
        fs::remove_file(&root).unwrap();
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("carol.json"), saved).unwrap();
        assert_eq!(store.load("carol").unwrap(), first);
        // And the store recovers once the medium is writable again.
        assert!(store.save(&second).is_saved());
    }

    #[test]
    fn unusable_root_opens_session_only() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        let mut store = MemoryStore::open(blocker.join("memory"));
        assert!(!store.is_durable());
        assert_eq!(store.warnings().len(), 1);
        let r = populated("dave");
        assert!(!store.save(&r).is_saved());
        assert!(store.load("dave").unwrap().permanent.is_empty());
    }

    #[test]
    fn try_save_reports_session_only() {
        let store = MemoryStore::session_only();
        let err = store.try_save(&MemoryRecord::new("x")).unwrap_err();
        assert!(matches!(err, PlateError::MemoryWrite(_)));
    }

    #[test]
    fn updates_mutate_in_place_without_saving() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path());
        let mut r = MemoryRecord::new("erin");
        store
            .update_active(&mut r, [ActiveSignal::Query("thai".into())])
            .apply_active(ActiveSignal::Shown(vec!["D014".into()]));
        store.update_permanent(&mut r, [PreferenceUpdate::PriceCeiling(Some(200.0))]);
        assert_eq!(r.active.query_count, 1);
        assert!(r.was_shown("D014"));
        assert_eq!(r.permanent.price_ceiling, Some(200.0));
        assert!(!dir.path().join("erin.json").exists());
    }
}
