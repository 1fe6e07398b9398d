//! proxy-services — the proxy's external-collaborator subsystems: artifact
//! downloader, image unpacker, file chunker, and certificate provider.

pub mod certs;
pub mod chunker;
pub mod downloader;
pub mod unpacker;

pub use certs::{CertError, CertInfo, CertProvider, FileCertProvider, IamCertProvider, MtlsMaterials};
pub use chunker::{chunk_files, ChunkError, ContentInfo, ImageFile, ImagePart, CHUNK_SIZE};
pub use downloader::{DownloadError, Downloader};
pub use unpacker::{ImageUnpacker, UnpackError, CONTENT_TYPE_SERVICE};
