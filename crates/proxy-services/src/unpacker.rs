//! Image unpacker.
//!
//! Unpacks a downloaded service archive into the image store. Archives are
//! tar, optionally gzip-compressed; the destination directory is named after
//! the archive digest so repeated requests for the same artifact land in the
//! same place.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};

/// The only artifact kind currently defined by the control plane.
pub const CONTENT_TYPE_SERVICE: &str = "service";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct ImageUnpacker {
    store_dir: PathBuf,
}

impl ImageUnpacker {
    pub fn new(store_dir: impl Into<PathBuf>) -> Result<Self, UnpackError> {
        let store_dir = store_dir.into();
        std::fs::create_dir_all(&store_dir)?;

        Ok(Self { store_dir })
    }

    /// Unpack `archive` and return the directory holding its contents.
    ///
    /// Blocking: run on the blocking pool when called from async code.
    pub fn unpack(&self, archive: &Path, content_type: &str) -> Result<PathBuf, UnpackError> {
        if content_type != CONTENT_TYPE_SERVICE {
            return Err(UnpackError::UnsupportedContentType(content_type.to_string()));
        }

        let data = std::fs::read(archive)?;
        let dest = self.store_dir.join(hex::encode(Sha256::digest(&data)));

        // A previous unpack of the same artifact may have been interrupted;
        // start from a clean directory either way.
        if dest.exists() {
            std::fs::remove_dir_all(&dest)?;
        }
        std::fs::create_dir_all(&dest)?;

        if data.starts_with(&GZIP_MAGIC) {
            unpack_tar(GzDecoder::new(&data[..]), &dest)?;
        } else {
            unpack_tar(&data[..], &dest)?;
        }

        tracing::debug!(archive = %archive.display(), dest = %dest.display(), "image unpacked");

        Ok(dest)
    }
}

fn unpack_tar<R: Read>(reader: R, dest: &Path) -> std::io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);
    archive.unpack(dest)
}
