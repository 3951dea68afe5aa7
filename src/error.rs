use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::strategy::Strategy;

/// A decompression went wrong.
///
/// Malformed input, I/O errors and a failing `gunzip` all end up here alike.
#[derive(Debug, Error)]
#[error("decompression failed")]
pub struct DecodeFailure(#[from] io::Error);

/// Everything that stops a run.
#[derive(Debug, Error)]
pub enum Abort {
    #[error("no strategy {0}, expected 0 to 5")]
    Selector(u8),

    #[error("no tarball destination for {}, expected a .tgz or .tar.gz file", .0.display())]
    Suffix(PathBuf),

    #[error("couldn't warm the page cache with {}", .path.display())]
    Warm {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("strategy {strategy} couldn't decompress {}", .path.display())]
    Decode {
        strategy: Strategy,
        path: PathBuf,
        #[source]
        source: DecodeFailure,
    },

    #[error("couldn't compute the digest of {}", .path.display())]
    Digest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't write the report")]
    Report(#[source] io::Error),

    #[error("couldn't start the runtime")]
    Runtime(#[source] io::Error),
}

impl Abort {
    /// Whether the abort stems from bad arguments rather than a failed run.
    pub fn is_usage(&self) -> bool {
        matches!(self, Abort::Selector(_) | Abort::Suffix(_))
    }
}

/// Turn a failed child process into an I/O error.
pub fn child_failed(program: &str, status: std::process::ExitStatus) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("{program} exited with {status}"),
    )
}
