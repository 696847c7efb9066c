//! Per-file version store.
//!
//! Every versioned file `P` owns a sibling directory `.<basename(P)>_versions/`
//! holding numbered copies named `v<N>_<unix_ts>[_<tag>].backup`. Version
//! numbers only grow: the next number is always `max(existing) + 1`, so a
//! restore never reuses a number. The live file is never stored here; a
//! synthetic `current` entry is surfaced by [`VersionStore::list_versions`].
//!
//! No locking happens at this layer. Two writers racing on the same path can
//! pick the same next number; callers serialize per path (see
//! `infra::lock::with_path_lock`).

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};
use tracing::{debug, info};

use crate::{
    core::error::{EditError, StorageContext},
    infra::io::{
        copy_durable, format_unix, human_size, mtime_secs, stream_blake3, unix_now, write_atomic,
    },
};

/// Suffix of every version directory name
pub const VERSIONS_SUFFIX: &str = "_versions";

/// Extension of every stored copy
pub const BACKUP_EXT: &str = ".backup";

static BACKUP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v(\d+)_(\d+)(?:_(.+))?\.backup$").expect("backup name pattern")
});

// Numbering considers anything that looks used, even foreign names
static VERSION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v(\d+)_").expect("version prefix pattern"));

/// Which version an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SelectorRepr", into = "SelectorRepr")]
pub enum VersionSelector {
    /// The live file
    Current,
    /// A stored backup
    Number(u64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SelectorRepr {
    Number(u64),
    Text(String),
}

impl From<VersionSelector> for SelectorRepr {
    fn from(sel: VersionSelector) -> Self {
        match sel {
            VersionSelector::Current => SelectorRepr::Text("current".into()),
            VersionSelector::Number(n) => SelectorRepr::Number(n),
        }
    }
}

impl TryFrom<SelectorRepr> for VersionSelector {
    type Error = EditError;

    fn try_from(repr: SelectorRepr) -> Result<Self, Self::Error> {
        match repr {
            SelectorRepr::Number(0) => Err(EditError::Validation(
                "version numbers start at 1".into(),
            )),
            SelectorRepr::Number(n) => Ok(VersionSelector::Number(n)),
            SelectorRepr::Text(s) => s.parse(),
        }
    }
}

impl FromStr for VersionSelector {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("current") {
            return Ok(VersionSelector::Current);
        }
        let digits = t.strip_prefix('v').unwrap_or(t);
        match digits.parse::<u64>() {
            Ok(0) => Err(EditError::Validation("version numbers start at 1".into())),
            Ok(n) => Ok(VersionSelector::Number(n)),
            Err(_) => Err(EditError::Validation(format!(
                "version must be 'current' or a positive integer, got '{s}'"
            ))),
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Current => f.write_str("current"),
            VersionSelector::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Metadata for one stored copy (or the synthetic current entry)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub version: VersionSelector,
    /// Creation time for backups, mtime for `current`
    pub timestamp: i64,
    pub size: u64,
    pub path: PathBuf,
    pub change_tag: Option<String>,
    /// Only filled for a backup created by this call
    pub checksum: Option<String>,
}

impl Version {
    /// Stored version number; `None` for the synthetic current entry
    pub fn number(&self) -> Option<u64> {
        match self.version {
            VersionSelector::Number(n) => Some(n),
            VersionSelector::Current => None,
        }
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut st = s.serialize_struct("Version", 8)?;
        st.serialize_field("version", &self.version)?;
        st.serialize_field("timestamp", &self.timestamp)?;
        st.serialize_field("date", &format_unix(self.timestamp))?;
        st.serialize_field("size", &self.size)?;
        st.serialize_field("size_human", &human_size(self.size))?;
        st.serialize_field("path", &self.path)?;
        match &self.change_tag {
            Some(tag) => st.serialize_field("change_tag", tag)?,
            None => st.skip_field("change_tag")?,
        }
        match &self.checksum {
            Some(sum) => st.serialize_field("checksum", sum)?,
            None => st.skip_field("checksum")?,
        }
        st.end()
    }
}

/// Parsed `v<N>_<ts>[_<tag>].backup` file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupName {
    pub version: u64,
    pub timestamp: i64,
    pub tag: Option<String>,
}

impl BackupName {
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = BACKUP_NAME.captures(file_name)?;
        let version = caps.get(1)?.as_str().parse().ok()?;
        let timestamp = caps.get(2)?.as_str().parse().ok()?;
        let tag = caps.get(3).map(|m| m.as_str().to_string());
        Some(Self {
            version,
            timestamp,
            tag,
        })
    }

    pub fn file_name(&self) -> String {
        match &self.tag {
            Some(tag) => format!("v{}_{}_{}{}", self.version, self.timestamp, tag, BACKUP_EXT),
            None => format!("v{}_{}{}", self.version, self.timestamp, BACKUP_EXT),
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`, whitespace
/// included. Only the empty tag becomes `None`.
pub fn sanitize_tag(tag: &str) -> Option<String> {
    if tag.is_empty() {
        return None;
    }
    Some(
        tag.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
    )
}

/// Version directory for `file`: `<parent>/.<name>_versions`
pub fn version_dir_for(file: &Path) -> Result<PathBuf, EditError> {
    let name = file.file_name().ok_or_else(|| {
        EditError::Validation(format!("{} has no file name", file.display()))
    })?;
    let dir_name = format!(".{}{}", name.to_string_lossy(), VERSIONS_SUFFIX);
    Ok(match file.parent() {
        Some(parent) => parent.join(dir_name),
        None => PathBuf::from(dir_name),
    })
}

/// Inverse of [`version_dir_for`]: the file a version directory belongs to
pub fn original_for_version_dir(dir: &Path) -> Option<PathBuf> {
    let name = dir.file_name()?.to_str()?;
    let inner = name.strip_prefix('.')?.strip_suffix(VERSIONS_SUFFIX)?;
    if inner.is_empty() {
        return None;
    }
    Some(match dir.parent() {
        Some(parent) => parent.join(inner),
        None => PathBuf::from(inner),
    })
}

/// What a restore did
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub restored: VersionSelector,
    /// Backup of the pre-restore state, when one was taken
    pub backup: Option<Version>,
}

/// Handle on one file's version store
#[derive(Debug, Clone)]
pub struct VersionStore {
    file: PathBuf,
    dir: PathBuf,
}

impl VersionStore {
    /// Handle for `file` (expected normalized); touches nothing on disk
    pub fn for_path(file: &Path) -> Result<Self, EditError> {
        Ok(Self {
            file: file.to_path_buf(),
            dir: version_dir_for(file)?,
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Idempotently create the version directory; never touches the file.
    pub fn ensure(&self) -> Result<&Path, EditError> {
        fs::create_dir_all(&self.dir)
            .storage(|| format!("create version dir {}", self.dir.display()))?;
        Ok(&self.dir)
    }

    /// `1` for an empty store, else `max(existing) + 1`
    pub fn next_version_number(&self) -> Result<u64, EditError> {
        if !self.dir.is_dir() {
            return Ok(1);
        }
        let mut highest = 0u64;
        for entry in fs::read_dir(&self.dir)
            .storage(|| format!("list version dir {}", self.dir.display()))?
        {
            let entry = entry.storage(|| format!("list version dir {}", self.dir.display()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(n) = VERSION_PREFIX
                .captures(name)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
            {
                highest = highest.max(n);
            }
        }
        highest
            .checked_add(1)
            .ok_or_else(|| std::io::Error::other("version number overflow"))
            .storage(|| format!("number next version in {}", self.dir.display()))
    }

    /// Copy the current bytes into a new numbered backup.
    ///
    /// Fails with `NotFound` when there is nothing to back up. Returns only
    /// after the copy and its directory entry are synced.
    pub fn create_backup(&self, tag: Option<&str>) -> Result<Version, EditError> {
        let meta = match fs::metadata(&self.file) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EditError::NotFound(format!(
                    "File not found: {}",
                    self.file.display()
                )));
            }
            Err(e) => {
                return Err(e).storage(|| format!("stat {}", self.file.display()));
            }
        };
        if !meta.is_file() {
            return Err(EditError::Validation(format!(
                "{} is not a regular file",
                self.file.display()
            )));
        }

        self.ensure()?;
        let name = BackupName {
            version: self.next_version_number()?,
            timestamp: unix_now(),
            tag: tag.and_then(sanitize_tag),
        };
        let backup_path = self.dir.join(name.file_name());

        let size = copy_durable(&self.file, &backup_path)?;
        let checksum = stream_blake3(&backup_path)?;

        info!(
            file = %self.file.display(),
            version = name.version,
            tag = name.tag.as_deref().unwrap_or(""),
            "created backup"
        );

        Ok(Version {
            version: VersionSelector::Number(name.version),
            timestamp: name.timestamp,
            size,
            path: backup_path,
            change_tag: name.tag,
            checksum: Some(checksum),
        })
    }

    /// Stored versions only, newest (highest number) first
    pub fn stored_versions(&self) -> Result<Vec<Version>, EditError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .storage(|| format!("list version dir {}", self.dir.display()))?
        {
            let entry = entry.storage(|| format!("list version dir {}", self.dir.display()))?;
            let name = entry.file_name();
            let Some(parsed) = name.to_str().and_then(BackupName::parse) else {
                continue;
            };
            let meta = entry
                .metadata()
                .storage(|| format!("stat {}", entry.path().display()))?;
            if !meta.is_file() {
                continue;
            }
            out.push(Version {
                version: VersionSelector::Number(parsed.version),
                timestamp: parsed.timestamp,
                size: meta.len(),
                path: entry.path(),
                change_tag: parsed.tag,
                checksum: None,
            });
        }
        out.sort_by(|a, b| b.number().cmp(&a.number()));
        Ok(out)
    }

    /// Newest first, with a synthetic `current` entry when the file exists
    pub fn list_versions(&self) -> Result<Vec<Version>, EditError> {
        let mut versions = self.stored_versions()?;
        if let Ok(meta) = fs::metadata(&self.file)
            && meta.is_file()
        {
            versions.insert(
                0,
                Version {
                    version: VersionSelector::Current,
                    timestamp: mtime_secs(&meta),
                    size: meta.len(),
                    path: self.file.clone(),
                    change_tag: None,
                    checksum: None,
                },
            );
        }
        Ok(versions)
    }

    /// Metadata for `selector`, or `NotFound`
    pub fn find_version(&self, selector: VersionSelector) -> Result<Version, EditError> {
        self.list_versions()?
            .into_iter()
            .find(|v| v.version == selector)
            .ok_or_else(|| match selector {
                VersionSelector::Current => {
                    EditError::NotFound(format!("File not found: {}", self.file.display()))
                }
                VersionSelector::Number(n) => EditError::NotFound(format!(
                    "Version {n} not found for {}",
                    self.file.display()
                )),
            })
    }

    /// Raw bytes of the selected version
    pub fn read_version(&self, selector: VersionSelector) -> Result<Vec<u8>, EditError> {
        let v = self.find_version(selector)?;
        fs::read(&v.path).storage(|| format!("read {}", v.path.display()))
    }

    /// Back up the current state (tagged with `tag`), then overwrite the file
    /// with the selected version. `current` is a no-op.
    pub fn restore_version(
        &self,
        selector: VersionSelector,
        tag: Option<&str>,
    ) -> Result<RestoreOutcome, EditError> {
        let target = self.find_version(selector)?;
        if selector == VersionSelector::Current {
            debug!(file = %self.file.display(), "restore of current is a no-op");
            return Ok(RestoreOutcome {
                restored: selector,
                backup: None,
            });
        }

        // Read first so a missing backup aborts before anything is touched
        let bytes = fs::read(&target.path).storage(|| format!("read {}", target.path.display()))?;

        let backup = if self.file.exists() {
            Some(self.create_backup(tag)?)
        } else {
            None
        };

        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)
                .storage(|| format!("create parent dir {}", parent.display()))?;
        }
        write_atomic(&self.file, &bytes)?;

        info!(
            file = %self.file.display(),
            restored = %selector,
            backup = backup.as_ref().and_then(Version::number).unwrap_or(0),
            "restored version"
        );

        Ok(RestoreOutcome {
            restored: selector,
            backup,
        })
    }
}
