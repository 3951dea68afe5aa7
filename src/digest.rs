use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::process::Command;

use log::{info, trace, warn};
use sha2::{Digest, Sha256};

use crate::cli::DigestMethod;
use crate::error::{child_failed, Abort};

const SHA256SUM: &str = "sha256sum";

/// Print the SHA256 checksum of the file at `path` to `out`, formatted like sha256sum(1).
pub fn report(
    path: impl AsRef<Path>,
    method: DigestMethod,
    out: &mut impl Write,
) -> Result<(), Abort> {
    let path = path.as_ref();
    info!("Computing SHA256 checksum of {}.", path.to_string_lossy());

    let digest_err = |source| Abort::Digest {
        path: path.to_owned(),
        source,
    };

    let line = match method {
        DigestMethod::External => sha256sum(path).map_err(digest_err)?,
        DigestMethod::Builtin => {
            let digest = sha256(path).map_err(digest_err)?;
            format!("{}  {}\n", digest, path.display()).into_bytes()
        }
    };

    out.write_all(&line).map_err(Abort::Report)?;
    out.flush().map_err(Abort::Report)
}

/// Hex encoded SHA256 checksum of a file at `path`.
pub fn sha256(path: impl AsRef<Path>) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    let result = hasher.finalize();

    trace!("Calculated: {:x?}", result);

    Ok(hex::encode(result))
}

/// Run sha256sum(1) on `path` and hand back its stdout.
fn sha256sum(path: &Path) -> io::Result<Vec<u8>> {
    let output = Command::new(SHA256SUM).arg(path).output()?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        warn!("{SHA256SUM} stderr: {}", stderr.trim_end());
    }
    if !output.status.success() {
        return Err(child_failed(SHA256SUM, output.status));
    }

    Ok(output.stdout)
}
