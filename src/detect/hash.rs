use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const CHUNK_SIZE: usize = 64 * 1024;

pub fn hash_pair(path: &Path) -> Result<(String, String)> {
    let mut file = File::open(path).map_err(|e| Error::file_access(path, &e))?;

    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::file_access(path, &e)),
        };
        md5.update(&buf[..read]);
        sha256.update(&buf[..read]);
    }

    Ok((hex::encode(md5.finalize()), hex::encode(sha256.finalize())))
}
