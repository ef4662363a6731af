//! Fingerprinter: SHA-256 of the post-state artifact.
//!
//! Fingerprinting never fails an attempt. A missing or unreadable post-state
//! yields no digest and the result record carries `"post-hash": null`.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Output artifact written by the transition command
pub const POST_STATE_FILE: &str = "post.ssz";

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Stream a file through SHA-256
pub async fn digest_file(path: &Path) -> io::Result<[u8; 32]> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_BYTES];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finalize().into())
}

/// Digest of `<staging_path>/post.ssz`, if it exists and is readable
pub async fn digest(staging_path: &Path) -> Option<[u8; 32]> {
    let path = staging_path.join(POST_STATE_FILE);
    match digest_file(&path).await {
        Ok(hash) => {
            debug!(path = %path.display(), digest = %hex::encode(hash), "Fingerprinted post-state");
            Some(hash)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No post-state produced");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read post-state for hashing");
            None
        }
    }
}

/// `0x`-prefixed lowercase hex
pub fn format_digest(digest: Option<&[u8; 32]>) -> Option<String> {
    digest.map(|bytes| format!("0x{}", hex::encode(bytes)))
}
