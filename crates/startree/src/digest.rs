//! Integrity fingerprints for sealed segment directories.
//!
//! A segment directory is fingerprinted by streaming every regular file
//! beneath it, in sorted path order, through a hasher. The segment creation
//! metadata file is excluded so that rewriting it does not change the
//! fingerprint.
//!
//! Two outputs are provided:
//!
//! - [`SegmentDigest::compute_checksum`]: Adler-32, a cheap rolling checksum
//! - [`SegmentDigest::compute_digest`]: MD5 as upper-case hex
//!
//! Both match the fingerprints other replicas compute for the same segment,
//! so they can be compared directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_startree::digest::SegmentDigest;
//!
//! let digest = SegmentDigest::for_all_files_in_folder(&segment_dir)?;
//! let checksum = digest.compute_checksum()?;
//! let md5 = digest.compute_digest()?;
//! ```

use crate::error::Result;
use adler::Adler32;
use md5::{Digest, Md5};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name excluded from every fingerprint.
pub const SEGMENT_CREATION_META: &str = "creation.meta";

/// Read buffer size used while streaming files.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Sorted set of files making up a segment fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDigest {
    files: Vec<PathBuf>,
}

impl SegmentDigest {
    /// Collects every regular file beneath `dir`, recursively, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::IoError` if the directory tree cannot be read.
    pub fn for_all_files_in_folder(dir: impl AsRef<Path>) -> Result<Self> {
        let mut files = Vec::new();
        collect_files(dir.as_ref(), &mut files)?;
        files.sort();
        Ok(Self { files })
    }

    /// Fingerprints an explicit list of files, in the given order.
    pub fn from_files(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    /// Files included in the fingerprint.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Adler-32 over the concatenated file contents.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::IoError` if any file cannot be read.
    pub fn compute_checksum(&self) -> Result<u64> {
        let mut adler = Adler32::new();
        self.stream(|chunk| adler.write_slice(chunk))?;
        let checksum = u64::from(adler.checksum());
        debug!("Computed checksum {} over {} files", checksum, self.files.len());
        Ok(checksum)
    }

    /// MD5 over the concatenated file contents, as upper-case hex.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::IoError` if any file cannot be read.
    pub fn compute_digest(&self) -> Result<String> {
        let mut hasher = Md5::new();
        self.stream(|chunk| hasher.update(chunk))?;
        let digest: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();
        debug!("Computed digest {} over {} files", digest, self.files.len());
        Ok(digest)
    }

    fn stream(&self, mut sink: impl FnMut(&[u8])) -> Result<()> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        for path in &self.files {
            let mut file = File::open(path)?;
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                sink(&buf[..n]);
            }
        }
        Ok(())
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_files(&path, files)?;
        } else if file_type.is_file() && entry.file_name() != SEGMENT_CREATION_META {
            files.push(path);
        }
    }
    Ok(())
}
