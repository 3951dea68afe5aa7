use std::fmt;
use std::fs::File;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::runtime::{Builder, Runtime};

use crate::cli::DigestMethod;
use crate::digest;
use crate::error::Abort;
use crate::strategy::{Decompress, Strategy};

/// Suffixes of gzip compressed tarballs and what they turn into once decompressed.
const SUFFIXES: [(&str, &str); 2] = [(".tar.gz", ".tar"), (".tgz", ".tar")];

/// Where the harness is allowed to schedule its own work.
///
/// The run itself is synchronous and always executes on the thread calling
/// [`ExecutionContext::block_on`]. The contexts differ in whether the host
/// runtime keeps worker threads around next to it, and where tasks spawned on
/// the runtime end up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Everything runs on the calling thread.
    #[default]
    Confined,
    /// The host runtime may use a pool of worker threads.
    Unconfined,
}

impl ExecutionContext {
    fn runtime(self) -> io::Result<Runtime> {
        match self {
            ExecutionContext::Confined => Builder::new_current_thread().build(),
            ExecutionContext::Unconfined => Builder::new_multi_thread().build(),
        }
    }

    /// Drive `future` to completion inside this context.
    pub fn block_on<F: Future>(self, future: F) -> Result<F::Output, Abort> {
        debug!("Starting {self:?} runtime.");
        let runtime = self.runtime().map_err(Abort::Runtime)?;
        Ok(runtime.block_on(future))
    }
}

/// The time one decompression took.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Measurement {
    pub source: PathBuf,
    pub strategy: Strategy,
    pub elapsed: Duration,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:  {:?}", self.source.display(), self.elapsed)
    }
}

/// Replace the compressed tarball suffix of `source` with a plain tarball one.
pub fn destination_path(source: impl AsRef<Path>) -> Option<PathBuf> {
    let source = source.as_ref().to_str()?;
    SUFFIXES.iter().find_map(|(compressed, plain)| {
        source
            .strip_suffix(compressed)
            .filter(|stem| !stem.is_empty() && !stem.ends_with('/'))
            .map(|stem| PathBuf::from(format!("{stem}{plain}")))
    })
}

/// Read the whole file at `path` once so that it sits in the page cache.
pub fn warm(path: impl AsRef<Path>) -> Result<u64, Abort> {
    let path = path.as_ref();
    let warm_err = |source| Abort::Warm {
        path: path.to_owned(),
        source,
    };

    let mut file = File::open(path).map_err(warm_err)?;
    let bytes = io::copy(&mut file, &mut io::sink()).map_err(warm_err)?;
    debug!("Warmed {} bytes of {}.", bytes, path.to_string_lossy());

    Ok(bytes)
}

/// Run `f`, returning its result and the wall-clock time it took.
pub fn measure<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

/// One benchmark run: a source tarball, a strategy and how to check the result.
#[derive(Clone, Debug)]
pub struct Harness {
    source: PathBuf,
    destination: PathBuf,
    strategy: Strategy,
    digest: DigestMethod,
}

impl Harness {
    pub fn new(
        source: impl Into<PathBuf>,
        strategy: Strategy,
        digest: DigestMethod,
    ) -> Result<Self, Abort> {
        let source = source.into();
        let destination = destination_path(&source).ok_or_else(|| Abort::Suffix(source.clone()))?;

        Ok(Self {
            source,
            destination,
            strategy,
            digest,
        })
    }

    /// Time the decompression with the strategy's own decompressor.
    pub fn run(&self, out: &mut impl Write) -> Result<Measurement, Abort> {
        self.run_with(self.strategy.decompressor(), out)
    }

    /// Warm the cache, time `decompressor`, then report the time and the digest to `out`.
    pub fn run_with(
        &self,
        decompressor: &dyn Decompress,
        out: &mut impl Write,
    ) -> Result<Measurement, Abort> {
        warm(&self.source)?;

        info!(
            "Decompressing {} to {} with strategy {}.",
            self.source.to_string_lossy(),
            self.destination.to_string_lossy(),
            self.strategy
        );
        let (result, elapsed) =
            measure(|| decompressor.decompress(&self.source, &self.destination));
        result.map_err(|source| Abort::Decode {
            strategy: self.strategy,
            path: self.source.clone(),
            source,
        })?;

        let measurement = Measurement {
            source: self.source.clone(),
            strategy: self.strategy,
            elapsed,
        };
        writeln!(out, "{measurement}\n").map_err(Abort::Report)?;

        digest::report(&self.destination, self.digest, out)?;

        Ok(measurement)
    }
}
