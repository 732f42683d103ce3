//! File hashing: the transform run by the CLI's hashing stage.

use anyhow::{Context, Result};
use blake3::Hasher;
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::FileDigest;
use crate::utils::config::HashingConsts;

/// Hash a file with blake3. Memory-mapped above the threshold, chunked reads below.
pub fn hash_file(path: &Path) -> Result<(u64, [u8; 32])> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let size = file.metadata().context("read metadata")?.len();
    let mut hasher = Hasher::new();

    if size > HashingConsts::HASH_MMAP_THRESHOLD {
        let mmap = unsafe { Mmap::map(&file)? };
        hasher.update(&mmap);
    } else {
        let mut reader =
            std::io::BufReader::with_capacity(HashingConsts::HASH_READ_CHUNK_SIZE, file);
        let mut buffer = vec![0u8; HashingConsts::HASH_READ_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
    }

    Ok((size, *hasher.finalize().as_bytes()))
}

/// Stage transform: never fails. An unreadable file becomes a digest carrying the error,
/// so one bad path does not fault the whole run.
pub fn digest_path(path: PathBuf) -> anyhow::Result<FileDigest> {
    let digest = match hash_file(&path) {
        Ok((size, hash)) => {
            log::debug!("{} ==> {}", path.display(), to_hex(&hash));
            FileDigest {
                path,
                size,
                hash: Some(to_hex(&hash)),
                error: None,
            }
        }
        Err(e) => {
            log::debug!("{} ==> {:#}", path.display(), e);
            FileDigest {
                path,
                size: 0,
                hash: None,
                error: Some(format!("{:#}", e)),
            }
        }
    };
    Ok(digest)
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
