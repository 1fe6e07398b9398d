//! File chunker.
//!
//! Walks an unpacked image tree and produces the content manifest plus
//! fixed-size data parts that the proxy streams back to the service manager.

use std::path::Path;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Size of one content part. Must leave room for the protobuf envelope and
/// the inner header inside a single 64 KiB mux frame.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Manifest entry for one file of the unpacked tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub relative_path: String,
    pub sha256: [u8; 32],
    pub size: u64,
}

/// One data part of one file. Parts are numbered 1..=parts_count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub request_id: u64,
    pub relative_path: String,
    pub parts_count: u64,
    pub part: u64,
    pub data: Bytes,
}

/// Everything the proxy sends in answer to one image-content request.
#[derive(Debug, Clone, Default)]
pub struct ContentInfo {
    pub request_id: u64,
    pub image_files: Vec<ImageFile>,
    pub image_parts: Vec<ImagePart>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("failed to walk image tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("non-utf8 path in image tree: {0}")]
    BadPath(std::path::PathBuf),
}

/// Chunk every regular file under `root`.
///
/// Files are visited in sorted order so the manifest and part sequence are
/// deterministic for a given tree. Blocking: run on the blocking pool when
/// called from async code.
pub fn chunk_files(root: &Path, request_id: u64) -> Result<ContentInfo, ChunkError> {
    let mut info = ContentInfo {
        request_id,
        ..Default::default()
    };

    let walker = WalkDir::new(root).sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative_path = entry
            .path()
            .strip_prefix(root)
            .expect("walked path is under root")
            .to_str()
            .ok_or_else(|| ChunkError::BadPath(entry.path().to_path_buf()))?
            .to_string();

        let data = std::fs::read(entry.path())?;

        info.image_files.push(ImageFile {
            relative_path: relative_path.clone(),
            sha256: Sha256::digest(&data).into(),
            size: data.len() as u64,
        });

        let parts_count = data.len().div_ceil(CHUNK_SIZE) as u64;

        for (index, part_data) in data.chunks(CHUNK_SIZE).enumerate() {
            info.image_parts.push(ImagePart {
                request_id,
                relative_path: relative_path.clone(),
                parts_count,
                part: index as u64 + 1,
                data: Bytes::copy_from_slice(part_data),
            });
        }
    }

    Ok(info)
}
