//! Pipelined gzip decoding.
//!
//! Deflate streams can't be split, so the parallelism lies in overlapping the
//! work: one thread reads compressed blocks ahead, a second one inflates them,
//! and the caller only picks up finished blocks of decompressed data. Blocks
//! travel over bounded channels, so at most `blocks` of them are in flight
//! between two stages.

use std::io::{self, BufReader, Read};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use flate2::bufread::MultiGzDecoder;
use log::{trace, warn};

type Block = io::Result<Vec<u8>>;

/// Tunables of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Size of a single block, both compressed and decompressed.
    pub block_size: usize,
    /// Number of blocks that may be queued between two stages.
    pub blocks: usize,
}

impl ParallelConfig {
    pub const DEFAULT: Self = Self {
        block_size: 1 << 20,
        blocks: 4,
    };
}

/// Reads blocks coming out of a channel as one contiguous stream.
struct ChannelReader {
    receiver: Receiver<Block>,
    current: Vec<u8>,
    position: usize,
    done: bool,
}

impl ChannelReader {
    fn new(receiver: Receiver<Block>) -> Self {
        Self {
            receiver,
            current: Vec::new(),
            position: 0,
            done: false,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position == self.current.len() {
            if self.done {
                return Ok(0);
            }
            match self.receiver.recv() {
                Ok(Ok(block)) => {
                    self.current = block;
                    self.position = 0;
                }
                Ok(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                // Senders hang up after the last block.
                Err(_) => self.done = true,
            }
        }

        let n = buf.len().min(self.current.len() - self.position);
        buf[..n].copy_from_slice(&self.current[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

/// Fill `buffer` from `source` as far as possible, returning the number of bytes read.
fn fill_block(source: &mut impl Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buffer.len() {
        match source.read(&mut buffer[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Keep pushing blocks of `source` into `sender` until EOF, an error or a hang up.
fn pump(mut source: impl Read, sender: SyncSender<Block>, block_size: usize, stage: &str) {
    loop {
        let mut block = vec![0u8; block_size];
        match fill_block(&mut source, &mut block) {
            Ok(0) => {
                trace!("{stage} stage reached the end of its input.");
                return;
            }
            Ok(n) => {
                block.truncate(n);
                if sender.send(Ok(block)).is_err() {
                    trace!("{stage} stage lost its consumer.");
                    return;
                }
            }
            Err(e) => {
                let _ = sender.send(Err(e));
                return;
            }
        }
    }
}

/// A gzip decoder that reads and inflates on worker threads.
pub struct ParallelGzDecoder {
    output: Option<ChannelReader>,
    workers: Vec<JoinHandle<()>>,
}

impl ParallelGzDecoder {
    pub fn new<R: Read + Send + 'static>(source: R, config: ParallelConfig) -> io::Result<Self> {
        let ParallelConfig { block_size, blocks } = config;
        if block_size == 0 || blocks == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "block size and block count must be positive",
            ));
        }

        let (compressed_tx, compressed_rx) = mpsc::sync_channel(blocks);
        let (decompressed_tx, decompressed_rx) = mpsc::sync_channel(blocks);

        let reader = thread::Builder::new()
            .name("gzrace-read".to_owned())
            .spawn(move || pump(source, compressed_tx, block_size, "Read"))?;

        let inflater = thread::Builder::new()
            .name("gzrace-inflate".to_owned())
            .spawn(move || {
                let compressed =
                    BufReader::with_capacity(block_size, ChannelReader::new(compressed_rx));
                pump(
                    MultiGzDecoder::new(compressed),
                    decompressed_tx,
                    block_size,
                    "Inflate",
                )
            });
        let inflater = match inflater {
            Ok(handle) => handle,
            Err(e) => {
                // The reader notices the missing consumer on its next send.
                let _ = reader.join();
                return Err(e);
            }
        };

        Ok(Self {
            output: Some(ChannelReader::new(decompressed_rx)),
            workers: vec![reader, inflater],
        })
    }
}

impl Read for ParallelGzDecoder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.output {
            Some(output) => output.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for ParallelGzDecoder {
    fn drop(&mut self) {
        // Hanging up first lets blocked workers run into a failed send.
        self.output.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("A decompression worker panicked.");
            }
        }
    }
}
