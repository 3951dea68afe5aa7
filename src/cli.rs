use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Decompression strategy to time (0-5)
    pub strategy: u8,
    /// Gzip compressed tarball (.tgz or .tar.gz)
    pub source: PathBuf,
    /// Enable debugs
    #[arg(short, long)]
    pub debug: bool,
    /// How to compute the digest of the decompressed tarball
    #[arg(long, value_enum, default_value_t = DigestMethod::External)]
    pub digest: DigestMethod,
    /// Allow the host runtime to use more than one thread
    #[arg(long)]
    pub unconfined: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DigestMethod {
    /// Run sha256sum(1)
    #[default]
    External,
    /// Hash in-process
    Builtin,
}
