//! On-disk stage checkpoints.
//!
//! A [`Checkpoint`] is one persisted stage output plus a `.fingerprint` sidecar.
//! The fingerprint is a SHA-256 over the stage name, the configuration values
//! the stage depends on, and the size and modification time of each input file
//! (contents are not hashed; the inputs are multi-gigabyte dumps).
//!
//! Before doing any work a stage asks [`Checkpoint::usable`]; a present
//! checkpoint is reloaded instead of recomputed. A checkpoint whose sidecar is
//! missing is trusted as-is. A checkpoint whose sidecar disagrees is handled per
//! [`StalePolicy`].
//!
//! Writes go to a temporary sibling and are renamed into place, so an
//! interrupted run never leaves a half-written checkpoint behind.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::config::StalePolicy;
use crate::error::{CheckpointError, DistillResult};

/// Hex-encoded SHA-256 identifying the inputs a checkpoint was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Start a fingerprint for the named stage.
    pub fn builder(stage: &str) -> FingerprintBuilder {
        let mut hasher = Sha256::new();
        hasher.update(b"kgd-stage\0");
        hasher.update(stage.as_bytes());
        FingerprintBuilder { hasher }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accumulates the values a stage output depends on.
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    /// Mix in a named configuration value.
    pub fn field(mut self, key: &str, value: impl Display) -> Self {
        self.hasher.update(b"\0field\0");
        self.hasher.update(key.as_bytes());
        self.hasher.update(b"=");
        self.hasher.update(value.to_string().as_bytes());
        self
    }

    /// Mix in an input file's path, size and modification time.
    pub fn input(mut self, path: &Path) -> Self {
        self.hasher.update(b"\0input\0");
        self.hasher.update(path.display().to_string().as_bytes());
        match std::fs::metadata(path) {
            Ok(meta) => {
                self.hasher.update(meta.len().to_le_bytes());
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                self.hasher.update(mtime.to_le_bytes());
            }
            Err(_) => self.hasher.update(b"<missing>"),
        }
        self
    }

    /// Mix in every input of a pool.
    pub fn inputs<'a>(self, paths: impl IntoIterator<Item = &'a PathBuf>) -> Self {
        paths.into_iter().fold(self, |b, p| b.input(p))
    }

    /// Chain another fingerprint, for stages derived from an earlier stage.
    pub fn upstream(mut self, fingerprint: &Fingerprint) -> Self {
        self.hasher.update(b"\0upstream\0");
        self.hasher.update(fingerprint.0.as_bytes());
        self
    }

    pub fn finish(self) -> Fingerprint {
        let digest = self.hasher.finalize();
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect();
        Fingerprint(hex)
    }
}

/// Whether a checkpoint exists and matches its fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    Missing,
    /// Present, no sidecar to compare against.
    Unverified,
    Fresh,
    Stale,
}

impl Display for CheckpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointState::Missing => write!(f, "missing"),
            CheckpointState::Unverified => write!(f, "present (unverified)"),
            CheckpointState::Fresh => write!(f, "present"),
            CheckpointState::Stale => write!(f, "present (stale)"),
        }
    }
}

/// One persisted stage output.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
    fingerprint: Option<Fingerprint>,
}

impl Checkpoint {
    /// A checkpoint verified against `fingerprint`.
    pub fn new(path: impl Into<PathBuf>, fingerprint: Fingerprint) -> Self {
        Self {
            path: path.into(),
            fingerprint: Some(fingerprint),
        }
    }

    /// A checkpoint without a sidecar; existence is the only check.
    pub fn unfingerprinted(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fingerprint: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    fn sidecar(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".fingerprint");
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Compare the on-disk sidecar with the expected fingerprint.
    pub fn state(&self) -> CheckpointState {
        if !self.exists() {
            return CheckpointState::Missing;
        }
        let Some(expected) = &self.fingerprint else {
            return CheckpointState::Unverified;
        };
        match std::fs::read_to_string(self.sidecar()) {
            Ok(stored) if stored.trim() == expected.as_str() => CheckpointState::Fresh,
            Ok(_) => CheckpointState::Stale,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckpointState::Unverified,
            Err(_) => CheckpointState::Stale,
        }
    }

    /// Whether the stage should reload this checkpoint instead of rebuilding.
    pub fn usable(&self, policy: StalePolicy) -> bool {
        match self.state() {
            CheckpointState::Missing => false,
            CheckpointState::Fresh | CheckpointState::Unverified => true,
            CheckpointState::Stale => match policy {
                StalePolicy::Accept => true,
                StalePolicy::Warn => {
                    tracing::warn!(
                        path = %self.path.display(),
                        "checkpoint was built from different inputs or settings; reusing it anyway"
                    );
                    true
                }
                StalePolicy::Rebuild => {
                    tracing::warn!(
                        path = %self.path.display(),
                        "checkpoint is stale; rebuilding"
                    );
                    false
                }
            },
        }
    }

    /// Write the output through `write`, then move it into place and seal it.
    pub fn write_with<F>(&self, write: F) -> DistillResult<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
    {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        if let Err(e) = stage_and_rename(&tmp, &self.path, write) {
            let _ = std::fs::remove_file(&tmp);
            return Err(CheckpointError::Write {
                path: self.display(),
                source: e,
            }
            .into());
        }

        if let Some(fp) = &self.fingerprint {
            std::fs::write(self.sidecar(), fp.as_str()).map_err(|e| CheckpointError::Write {
                path: self.sidecar().display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Persist a value as pretty JSON.
    pub fn save_json<T: Serialize>(&self, value: &T) -> DistillResult<()> {
        self.write_with(|out| {
            serde_json::to_writer_pretty(&mut *out, value).map_err(std::io::Error::other)?;
            out.write_all(b"\n")
        })
    }

    /// Load a JSON checkpoint.
    pub fn load_json<T: DeserializeOwned>(&self) -> DistillResult<T> {
        let file = self.open()?;
        serde_json::from_reader(file).map_err(|e| {
            CheckpointError::Corrupt {
                path: self.display(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Persist one item per line.
    pub fn save_lines<I>(&self, lines: I) -> DistillResult<()>
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.write_with(|out| {
            for line in lines {
                writeln!(out, "{line}")?;
            }
            Ok(())
        })
    }

    /// Stream the checkpoint's non-empty lines with their 1-based line numbers.
    pub fn for_each_line<F>(&self, mut f: F) -> DistillResult<()>
    where
        F: FnMut(usize, &str) -> DistillResult<()>,
    {
        let mut reader = self.open()?;
        let mut buf = String::new();
        let mut line_no = 0;
        loop {
            buf.clear();
            let n = reader.read_line(&mut buf).map_err(|e| CheckpointError::Read {
                path: self.display(),
                source: e,
            })?;
            if n == 0 {
                return Ok(());
            }
            line_no += 1;
            let line = buf.trim();
            if !line.is_empty() {
                f(line_no, line)?;
            }
        }
    }

    /// Load a one-token-per-line checkpoint as an ordered set.
    pub fn load_set(&self) -> DistillResult<BTreeSet<String>> {
        let mut set = BTreeSet::new();
        self.for_each_line(|_, line| {
            set.insert(line.to_owned());
            Ok(())
        })?;
        Ok(set)
    }

    fn open(&self) -> DistillResult<BufReader<File>> {
        let file = File::open(&self.path).map_err(|e| CheckpointError::Read {
            path: self.display(),
            source: e,
        })?;
        Ok(BufReader::new(file))
    }
}

fn stage_and_rename<F>(tmp: &Path, dest: &Path, write: F) -> std::io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let mut out = BufWriter::new(File::create(tmp)?);
    write(&mut out)?;
    out.flush()?;
    drop(out);
    std::fs::rename(tmp, dest)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn fp(tag: &str) -> Fingerprint {
        Fingerprint::builder("test").field("tag", tag).finish()
    }

    #[test]
    fn failed_write_leaves_no_temporary_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let tmp = dir.path().join("out.txt.tmp");

        let cp = Checkpoint::new(dir.path().join("out.txt"), fp("a"));
        let err = cp
            .write_with(|_| Err(std::io::Error::other("disk full")))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::DistillError::Checkpoint(CheckpointError::Write { .. })
        ));
        assert!(!tmp.exists());
        assert!(!cp.exists());

        // Renaming onto a non-empty directory fails after the data is staged.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), "x").unwrap();
        let cp = Checkpoint::unfingerprinted(&blocked);
        assert!(cp.save_lines(["a", "b"]).is_err());
        assert!(!dir.path().join("blocked.tmp").exists());
        assert!(blocked.join("keep").is_file());
    }

    #[test]
    fn fingerprint_depends_on_fields() {
        assert_eq!(fp("a"), fp("a"));
        assert_ne!(fp("a"), fp("b"));
        assert_eq!(fp("a").as_str().len(), 64);
    }

    #[test]
    fn fingerprint_tracks_input_size() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.nt");
        std::fs::write(&input, "<a> <b> <c> .\n").unwrap();
        let before = Fingerprint::builder("s").input(&input).finish();
        std::fs::write(&input, "<a> <b> <c> .\n<d> <e> <f> .\n").unwrap();
        let after = Fingerprint::builder("s").input(&input).finish();
        assert_ne!(before, after);
    }

    #[test]
    fn json_round_trip_and_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let cp = Checkpoint::new(dir.path().join("map.json"), fp("a"));
        assert_eq!(cp.state(), CheckpointState::Missing);
        assert!(!cp.usable(StalePolicy::Accept));

        let mut map = BTreeMap::new();
        map.insert("k".to_string(), vec!["v1".to_string(), "v2".to_string()]);
        cp.save_json(&map).unwrap();

        assert_eq!(cp.state(), CheckpointState::Fresh);
        let loaded: BTreeMap<String, Vec<String>> = cp.load_json().unwrap();
        assert_eq!(loaded, map);
        assert!(!dir.path().join("map.json.tmp").exists());
    }

    #[test]
    fn stale_policy_decides_reuse() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lines.txt");
        Checkpoint::new(&path, fp("old")).save_lines(["x"]).unwrap();

        let current = Checkpoint::new(&path, fp("new"));
        assert_eq!(current.state(), CheckpointState::Stale);
        assert!(current.usable(StalePolicy::Accept));
        assert!(current.usable(StalePolicy::Warn));
        assert!(!current.usable(StalePolicy::Rebuild));
    }

    #[test]
    fn checkpoint_without_sidecar_is_trusted() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("legacy.txt");
        std::fs::write(&path, "a\nb\n").unwrap();

        let cp = Checkpoint::new(&path, fp("any"));
        assert_eq!(cp.state(), CheckpointState::Unverified);
        assert!(cp.usable(StalePolicy::Rebuild));
    }

    #[test]
    fn lines_skip_blanks_and_keep_numbers() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("l.txt");
        std::fs::write(&path, "a 0\n\n  b 1  \n").unwrap();

        let mut seen = Vec::new();
        Checkpoint::unfingerprinted(&path)
            .for_each_line(|n, line| {
                seen.push((n, line.to_string()));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![(1, "a 0".to_string()), (3, "b 1".to_string())]);
    }

    #[test]
    fn corrupt_json_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ \"a\": [").unwrap();
        let err = Checkpoint::unfingerprinted(&path)
            .load_json::<BTreeMap<String, Vec<String>>>()
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::DistillError::Checkpoint(CheckpointError::Corrupt { .. })
        ));
    }
}
