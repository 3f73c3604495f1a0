//! Stored artifacts: job output files copied under the agent storage directory.
//!
//! Files land in `<base>/<job_name>/<job_instance_id>/<timestamp>/` and the
//! resulting paths are reported to rstats as ordinary statistics.

use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use collect_agent_types::Statistics;
use tracing::debug;

use crate::session::Identity;
use crate::utils::{display_path, file_name_of};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStore {
    base: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory holding the files a job instance stored at `timestamp`.
    #[must_use]
    pub fn run_dir(&self, identity: &Identity, timestamp: i64) -> PathBuf {
        self.base
            .join(&identity.job_name)
            .join(identity.job_instance_id.to_string())
            .join(timestamp.to_string())
    }

    /// Copy `source` into the run directory and return where it landed.
    ///
    /// The file name is checked before anything is created. A partially
    /// written destination is left in place when the copy fails.
    ///
    /// # Errors
    ///
    /// `Error::Filename` if `source` has no path separator, `Error::Filesystem`
    /// if the run directory cannot be created, `Error::Copy` if the copy fails.
    pub fn store_file(&self, identity: &Identity, timestamp: i64, source: &str) -> Result<PathBuf> {
        let name = file_name_of(source).ok_or_else(|| Error::Filename(source.to_string()))?;

        let dir = self.run_dir(identity, timestamp);
        make_path(&dir)?;

        let destination = dir.join(name);
        copy_file(Path::new(source), &destination)?;
        debug!("Stored {source} as {}", destination.display());
        Ok(destination)
    }

    /// Build the statistics describing a set of stored files.
    ///
    /// With `copy` each source is stored and its destination recorded;
    /// without it the source paths are recorded as given and the filesystem
    /// is not touched.
    ///
    /// # Errors
    ///
    /// Stops at the first file that fails to store, see [`FileStore::store_file`].
    pub fn collect_files<I, K, V>(
        &self,
        identity: &Identity,
        timestamp: i64,
        files: I,
        copy: bool,
    ) -> Result<Statistics>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut statistics = Statistics::new();
        for (name, source) in files {
            let source = source.as_ref();
            let recorded = if copy {
                display_path(&self.store_file(identity, timestamp, source)?)
            } else {
                source.to_string()
            };
            statistics.insert(name, recorded);
        }
        Ok(statistics)
    }
}

/// Create `path`, creating missing parents as needed.
///
/// An existing directory is not an error, so concurrent callers targeting
/// the same run directory all succeed.
///
/// # Errors
///
/// Returns `Error::Filesystem` for any failure other than the directory
/// already existing.
pub fn make_path(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                make_path(parent)?;
            }
            match fs::create_dir(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
                Err(source) => Err(filesystem_error(path, source)),
            }
        }
        Err(source) => Err(filesystem_error(path, source)),
    }
}

fn filesystem_error(path: &Path, source: io::Error) -> Error {
    Error::Filesystem {
        path: path.to_path_buf(),
        source,
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    let copy_error = |source: io::Error| Error::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let mut input = File::open(from).map_err(copy_error)?;
    let mut output = File::create(to).map_err(copy_error)?;
    io::copy(&mut input, &mut output).map_err(copy_error)?;
    output.sync_all().map_err(copy_error)?;
    Ok(())
}
