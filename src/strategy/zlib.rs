//! Streaming gzip decoding backed by the system zlib.

use std::ffi::CStr;
use std::io::{self, BufRead, Read};
use std::mem;
use std::os::raw::c_int;
use std::ptr;

use libz_sys::{
    inflate, inflateEnd, inflateInit2_, inflateReset, uInt, voidpf, z_stream, zlibVersion,
    Z_BUF_ERROR, Z_NO_FLUSH, Z_OK, Z_STREAM_END,
};
use log::trace;

/// Window bits for a 32K window, +16 asks zlib to expect a gzip wrapper.
const GZIP_WINDOW_BITS: c_int = 15 + 16;

// SAFETY: zlib calls these hooks with element counts and sizes it computed itself
// and only ever frees pointers it got from `zalloc`.
unsafe extern "C" fn zalloc(_opaque: voidpf, items: uInt, size: uInt) -> voidpf {
    libc::calloc(items as libc::size_t, size as libc::size_t)
}

unsafe extern "C" fn zfree(_opaque: voidpf, address: voidpf) {
    libc::free(address)
}

/// A gzip decoder reading compressed bytes from `R` and inflating them with zlib.
///
/// Concatenated gzip members are decoded one after the other.
pub struct ZlibGzDecoder<R> {
    inner: R,
    // zlib keeps a pointer back to the stream, so it must not move.
    stream: Box<z_stream>,
    member_done: bool,
}

impl<R: BufRead> ZlibGzDecoder<R> {
    pub fn new(inner: R) -> io::Result<Self> {
        let mut stream = Box::new(z_stream {
            next_in: ptr::null_mut(),
            avail_in: 0,
            total_in: 0,
            next_out: ptr::null_mut(),
            avail_out: 0,
            total_out: 0,
            msg: ptr::null_mut(),
            state: ptr::null_mut(),
            zalloc,
            zfree,
            opaque: ptr::null_mut(),
            data_type: 0,
            adler: 0,
            reserved: 0,
        });

        // SAFETY: `stream` is fully initialized with valid allocator hooks, and the
        // version and size passed are the ones `libz_sys` was built against. The box
        // is stored in `Self` and never replaced, so the address zlib remembers stays valid.
        let ret = unsafe {
            inflateInit2_(
                &mut *stream,
                GZIP_WINDOW_BITS,
                zlibVersion(),
                mem::size_of::<z_stream>() as c_int,
            )
        };
        if ret != Z_OK {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("inflateInit2 failed with code {ret}"),
            ));
        }

        Ok(Self {
            inner,
            stream,
            member_done: false,
        })
    }

    fn zlib_error(&self, code: c_int) -> io::Error {
        let msg = if self.stream.msg.is_null() {
            format!("zlib error code {code}")
        } else {
            // SAFETY: a non-null `msg` points at a static, nul terminated zlib string.
            unsafe { CStr::from_ptr(self.stream.msg) }
                .to_string_lossy()
                .into_owned()
        };
        io::Error::new(io::ErrorKind::InvalidData, msg)
    }
}

impl<R: BufRead> Read for ZlibGzDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.member_done {
                if self.inner.fill_buf()?.is_empty() {
                    return Ok(0);
                }
                trace!("Another gzip member follows, resetting inflate state.");
                // SAFETY: the stream was initialized in `new` and has not been ended.
                let ret = unsafe { inflateReset(&mut *self.stream) };
                if ret != Z_OK {
                    return Err(self.zlib_error(ret));
                }
                self.member_done = false;
            }

            let input = self.inner.fill_buf()?;
            let eof = input.is_empty();
            let avail_in = input.len().min(uInt::MAX as usize);
            let avail_out = buf.len().min(uInt::MAX as usize);

            self.stream.next_in = input.as_ptr() as *mut _;
            self.stream.avail_in = avail_in as uInt;
            self.stream.next_out = buf.as_mut_ptr();
            self.stream.avail_out = avail_out as uInt;

            // SAFETY: `next_in` and `next_out` point into `input` and `buf`, which both
            // outlive the call and hold at least `avail_in` and `avail_out` bytes. zlib
            // only reads from `next_in`.
            let ret = unsafe { inflate(&mut *self.stream, Z_NO_FLUSH) };

            let consumed = avail_in - self.stream.avail_in as usize;
            let produced = avail_out - self.stream.avail_out as usize;
            // Neither buffer may be referenced once `consume` lets `inner` refill its buffer.
            self.stream.next_in = ptr::null_mut();
            self.stream.avail_in = 0;
            self.stream.next_out = ptr::null_mut();
            self.stream.avail_out = 0;
            self.inner.consume(consumed);

            match ret {
                Z_STREAM_END => {
                    self.member_done = true;
                    if produced > 0 {
                        return Ok(produced);
                    }
                }
                Z_OK | Z_BUF_ERROR => {
                    if produced > 0 {
                        return Ok(produced);
                    }
                    if eof {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "gzip stream ended early",
                        ));
                    }
                }
                code => return Err(self.zlib_error(code)),
            }
        }
    }
}

impl<R> Drop for ZlibGzDecoder<R> {
    fn drop(&mut self) {
        // SAFETY: a `ZlibGzDecoder` only exists once `inflateInit2_` succeeded, and
        // this is the only place the stream gets ended.
        unsafe {
            inflateEnd(&mut *self.stream);
        }
    }
}
