use std::io::SeekFrom;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Hard ceiling on a single provider archive, hosted or mirrored.
pub const MAX_PACKAGE_SIZE: u64 = 256 * 1024 * 1024;

/// An upload drained into an anonymous temp file, rewound for reading.
pub(crate) struct Spooled {
    pub file: File,
    pub digest: [u8; 32],
    pub size: u64,
}

/// Copies `reader` into a temp file while hashing it. Reads at most one byte
/// past `limit` to detect oversized input. `what` names the upload in errors.
pub(crate) async fn spool_and_hash(
    reader: &mut (dyn AsyncRead + Send + Unpin),
    limit: u64,
    what: &str,
) -> Result<Spooled> {
    let mut file = File::from_std(tempfile::tempfile()?);
    let mut limited = reader.take(limit + 1);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size: u64 = 0;

    loop {
        let n = limited.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        size += n as u64;
        if size > limit {
            return Err(Error::invalid(format!("{what} exceeds {limit} bytes")));
        }
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n]).await?;
    }

    file.flush().await?;
    file.seek(SeekFrom::Start(0)).await?;

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    Ok(Spooled { file, digest, size })
}
