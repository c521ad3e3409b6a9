use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::{io_error, ReproError};

/// Hex encoded SHA-256 of a file's contents, read in 8 KiB chunks.
pub fn sha256_file(path: &Path) -> Result<String, ReproError> {
    let file = File::open(path).map_err(|err| io_error("repro.hash_open", path, err))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = reader
            .read(&mut buf)
            .map_err(|err| io_error("repro.hash_read", path, err))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
