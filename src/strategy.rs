use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};

use flate2::bufread::MultiGzDecoder;
use log::{trace, warn};

use crate::error::{child_failed, DecodeFailure};

mod parallel;
mod zlib;

pub use parallel::{ParallelConfig, ParallelGzDecoder};
pub use zlib::ZlibGzDecoder;

const GUNZIP: &str = "gunzip";

/// Something that turns a gzip file into its decompressed twin.
pub trait Decompress: Sync {
    fn decompress(&self, source: &Path, destination: &Path) -> Result<(), DecodeFailure>;
}

/// The decompression strategies, in selector order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Pipe the file through gunzip(1).
    External,
    /// Stream the file through a gzip decoder.
    Stream,
    /// Read the whole file, then stream it through a gzip decoder.
    BufferedInput,
    /// Read the whole file and decompress it in-memory.
    Buffered,
    /// Stream the file through the system zlib.
    Zlib,
    /// Stream the file through a multi-threaded decoding pipeline.
    Parallel,
}

static DECOMPRESSORS: [&dyn Decompress; 6] = [
    &External,
    &Stream,
    &BufferedInput,
    &Buffered,
    &Zlib,
    &Parallel(ParallelConfig::DEFAULT),
];

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::External,
        Strategy::Stream,
        Strategy::BufferedInput,
        Strategy::Buffered,
        Strategy::Zlib,
        Strategy::Parallel,
    ];

    /// Look up the strategy with selector `id`.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::External => "external",
            Strategy::Stream => "stream",
            Strategy::BufferedInput => "buffered-input",
            Strategy::Buffered => "buffered",
            Strategy::Zlib => "zlib",
            Strategy::Parallel => "parallel",
        }
    }

    pub fn decompressor(self) -> &'static dyn Decompress {
        DECOMPRESSORS[self as usize]
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id(), self.name())
    }
}

/// Copy everything `decoder` produces into a freshly created `destination`.
fn copy_to(decoder: &mut impl Read, destination: &Path) -> io::Result<u64> {
    let mut output = File::create(destination)?;
    let written = io::copy(decoder, &mut output)?;
    trace!(
        "Wrote {} bytes to {}.",
        written,
        destination.to_string_lossy()
    );
    Ok(written)
}

/// Hands both files to gunzip(1), the payload never passes through us.
pub struct External;

impl Decompress for External {
    fn decompress(&self, source: &Path, destination: &Path) -> Result<(), DecodeFailure> {
        let input = File::open(source)?;
        let output = File::create(destination)?;

        let child = Command::new(GUNZIP)
            .stdin(input)
            .stdout(output)
            .stderr(Stdio::piped())
            .output()?;

        let stderr = String::from_utf8_lossy(&child.stderr);
        if !stderr.is_empty() {
            warn!("{GUNZIP} stderr: {}", stderr.trim_end());
        }
        if !child.status.success() {
            return Err(child_failed(GUNZIP, child.status).into());
        }

        Ok(())
    }
}

/// The idiomatic way: reader chained into a decoder chained into a copy.
pub struct Stream;

impl Decompress for Stream {
    fn decompress(&self, source: &Path, destination: &Path) -> Result<(), DecodeFailure> {
        let tar_gz = BufReader::new(File::open(source)?);
        let mut tar = MultiGzDecoder::new(tar_gz);
        copy_to(&mut tar, destination)?;

        Ok(())
    }
}

/// Compressed file in memory, decompressed output streamed.
pub struct BufferedInput;

impl Decompress for BufferedInput {
    fn decompress(&self, source: &Path, destination: &Path) -> Result<(), DecodeFailure> {
        let tar_gz = fs::read(source)?;
        trace!("Read {} compressed bytes.", tar_gz.len());

        let mut tar = MultiGzDecoder::new(tar_gz.as_slice());
        copy_to(&mut tar, destination)?;

        Ok(())
    }
}

/// Both the compressed and the decompressed file in memory.
pub struct Buffered;

impl Decompress for Buffered {
    fn decompress(&self, source: &Path, destination: &Path) -> Result<(), DecodeFailure> {
        let tar_gz = fs::read(source)?;
        trace!("Read {} compressed bytes.", tar_gz.len());

        let mut tar = Vec::new();
        MultiGzDecoder::new(tar_gz.as_slice()).read_to_end(&mut tar)?;
        trace!("Decompressed into {} bytes.", tar.len());

        fs::write(destination, &tar)?;

        Ok(())
    }
}

/// Like [`Stream`], but inflating with the system zlib.
pub struct Zlib;

impl Decompress for Zlib {
    fn decompress(&self, source: &Path, destination: &Path) -> Result<(), DecodeFailure> {
        let tar_gz = BufReader::new(File::open(source)?);
        let mut tar = ZlibGzDecoder::new(tar_gz)?;
        copy_to(&mut tar, destination)?;

        Ok(())
    }
}

/// Like [`Stream`], but reading and inflating on worker threads.
pub struct Parallel(pub ParallelConfig);

impl Decompress for Parallel {
    fn decompress(&self, source: &Path, destination: &Path) -> Result<(), DecodeFailure> {
        let tar_gz = File::open(source)?;
        let mut tar = ParallelGzDecoder::new(tar_gz, self.0)?;
        copy_to(&mut tar, destination)?;

        Ok(())
    }
}
