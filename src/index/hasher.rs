//! Content fingerprints for change detection and duplicate lookup.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::IndexError;

/// Hex-encoded SHA-256 over the full contents of `path`.
///
/// Fails if the file cannot be opened or if fewer bytes are read than the
/// file held when it was opened, so a file truncated or replaced mid-read
/// never yields a digest.
pub fn hash_file(path: &Path) -> Result<String, IndexError> {
    let file = File::open(path).map_err(|err| IndexError::io(path, err))?;
    let expected = file
        .metadata()
        .map_err(|err| IndexError::io(path, err))?
        .len();

    let mut hasher = Sha256::new();
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let read = io::copy(&mut reader, &mut hasher).map_err(|err| IndexError::io(path, err))?;

    if read != expected {
        return Err(IndexError::io(
            path,
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read {read} of {expected} bytes"),
            ),
        ));
    }

    Ok(hex::encode(hasher.finalize()))
}
