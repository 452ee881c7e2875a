//! Local durable mirror of governance requests.
//!
//! Each request is one YAML document at `<root>/<shelf>/<request_id>.yaml`,
//! where the shelf is `pending` for live requests and `completed` for terminal
//! ones. A request is kept on exactly one shelf.

use std::fs;
use std::path::{Path, PathBuf};

use govern_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::record::GovernanceRequest;

const FILE_EXTENSION: &str = "yaml";

/// One of the two storage areas of the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shelf {
    Pending,
    Completed,
}

impl Shelf {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn for_pending(pending: bool) -> Self {
        if pending {
            Self::Pending
        } else {
            Self::Completed
        }
    }

    fn other(&self) -> Self {
        match self {
            Self::Pending => Self::Completed,
            Self::Completed => Self::Pending,
        }
    }
}

/// A record as loaded from the mirror, tagged with where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub record: GovernanceRequest,
    pub shelf: Shelf,
    pub path: PathBuf,
}

/// File-backed mirror store.
///
/// Assumes a single writer per request id; concurrent writers racing on the
/// same id are not coordinated.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    /// Create a store rooted at the approvals directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shelf_dir(&self, shelf: Shelf) -> PathBuf {
        self.root.join(shelf.as_str())
    }

    /// Deterministic path of a request on a shelf.
    pub fn path_for(&self, request_id: &str, shelf: Shelf) -> Result<PathBuf> {
        validate_id(request_id)?;
        Ok(self
            .shelf_dir(shelf)
            .join(format!("{request_id}.{FILE_EXTENSION}")))
    }

    /// Write the full record, replacing any previous copy on either shelf.
    pub fn save(&self, request_id: &str, record: &GovernanceRequest, pending: bool) -> Result<PathBuf> {
        let shelf = Shelf::for_pending(pending);
        let path = self.path_for(request_id, shelf)?;
        let dir = self.shelf_dir(shelf);
        fs::create_dir_all(&dir).map_err(|e| Error::persistence(&dir, e))?;

        let content = serde_yaml::to_string(&record.without_annotations())
            .map_err(|e| Error::persistence(&path, e))?;

        // Write to a sibling temp file and rename so readers never see a partial document.
        let tmp = dir.join(format!(".{request_id}.{FILE_EXTENSION}.tmp"));
        fs::write(&tmp, content).map_err(|e| Error::persistence(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| Error::persistence(&path, e))?;

        let stale = self.path_for(request_id, shelf.other())?;
        if stale.exists() {
            fs::remove_file(&stale).map_err(|e| Error::persistence(&stale, e))?;
        }

        tracing::debug!(request_id, shelf = shelf.as_str(), path = %path.display(), "Mirror saved");
        Ok(path)
    }

    /// Load a record, searching the pending shelf first.
    pub fn load(&self, request_id: &str) -> Result<Option<StoredRecord>> {
        for shelf in [Shelf::Pending, Shelf::Completed] {
            let path = self.path_for(request_id, shelf)?;
            if path.exists() {
                let record = read_record(&path)?;
                return Ok(Some(StoredRecord {
                    record,
                    shelf,
                    path,
                }));
            }
        }
        Ok(None)
    }

    /// Move a record from pending to completed. No-op when it is not pending.
    pub fn move_to_completed(&self, request_id: &str) -> Result<bool> {
        let pending = self.path_for(request_id, Shelf::Pending)?;
        if !pending.exists() {
            return Ok(false);
        }

        let dir = self.shelf_dir(Shelf::Completed);
        fs::create_dir_all(&dir).map_err(|e| Error::persistence(&dir, e))?;
        let completed = self.path_for(request_id, Shelf::Completed)?;
        fs::rename(&pending, &completed).map_err(|e| Error::persistence(&completed, e))?;

        tracing::info!(request_id, "Mirror moved to completed shelf");
        Ok(true)
    }

    /// All readable records on a shelf, ordered by file name.
    ///
    /// A missing shelf directory is an empty shelf. Files that fail to parse
    /// are skipped with a warning.
    pub fn list_shelf(&self, shelf: Shelf) -> Result<Vec<StoredRecord>> {
        let dir = self.shelf_dir(shelf);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::persistence(&dir, e)),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension().and_then(|ext| ext.to_str()) == Some(FILE_EXTENSION)
                    && path.is_file()
            })
            .collect();
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            match read_record(&path) {
                Ok(record) => records.push(StoredRecord {
                    record,
                    shelf,
                    path,
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable mirror file");
                }
            }
        }
        Ok(records)
    }
}

fn read_record(path: &Path) -> Result<GovernanceRequest> {
    let content = fs::read_to_string(path).map_err(|e| Error::persistence(path, e))?;
    serde_yaml::from_str(&content).map_err(|e| Error::persistence(path, e))
}

/// Ids become file names, so anything that could escape the shelf is refused.
fn validate_id(request_id: &str) -> Result<()> {
    let bad = request_id.is_empty()
        || request_id.starts_with('.')
        || request_id
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
    if bad {
        return Err(Error::Validation(format!("Invalid request id: {request_id:?}")));
    }
    Ok(())
}
