//! Closable-stream composition.
//!
//! Rust spells "close" as `Drop`, which cannot fail. [`Close`] makes the
//! failure path explicit for streams that buffer or encode, and [`Nested`]
//! fixes the teardown order when one closable stream feeds another: outer
//! first, inner second, stopping on the first error.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

/// Explicit, fallible close.
pub trait Close {
    /// Finalizes the stream and releases what it holds.
    ///
    /// # Errors
    ///
    /// Returns the error that prevented a clean close; the stream should be
    /// considered unusable afterwards either way.
    fn close(&mut self) -> io::Result<()>;
}

/// The descriptor itself is released on drop; this impl is a no-op hook so
/// a file can terminate a [`Nested`] chain.
impl Close for File {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<R: Read + Close> Close for BufReader<R> {
    fn close(&mut self) -> io::Result<()> {
        self.get_mut().close()
    }
}

/// Flushes buffered data, then closes the inner writer.
impl<W: Write + Close> Close for BufWriter<W> {
    fn close(&mut self) -> io::Result<()> {
        self.flush()?;
        self.get_mut().close()
    }
}

/// Composes an outer stream over an inner one.
///
/// Reads and writes go through the outer stream only. [`Close::close`]
/// closes the outer stream first and the inner one second; if the outer
/// close fails, the inner stream is left open.
#[derive(Debug)]
pub struct Nested<O, I> {
    outer: O,
    inner: I,
}

impl<O, I> Nested<O, I> {
    /// Composes `outer` over `inner`.
    pub fn new(outer: O, inner: I) -> Self {
        Self { outer, inner }
    }

    /// The outer stream.
    pub fn outer_mut(&mut self) -> &mut O {
        &mut self.outer
    }

    /// Decomposes into the outer and inner streams without closing either.
    pub fn into_parts(self) -> (O, I) {
        (self.outer, self.inner)
    }
}

impl<O: Read, I> Read for Nested<O, I> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.outer.read(buf)
    }
}

impl<O: Write, I> Write for Nested<O, I> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.outer.flush()
    }
}

impl<O: Close, I: Close> Close for Nested<O, I> {
    fn close(&mut self) -> io::Result<()> {
        self.outer.close()?;
        self.inner.close()
    }
}

/// Gives a close-less stream a no-op [`Close`] so it can participate in a
/// [`Nested`] chain.
#[derive(Debug)]
pub struct NopClose<T>(pub T);

impl<T: Read> Read for NopClose<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<T: Write> Write for NopClose<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<T> Close for NopClose<T> {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Records close order and optionally fails its own close.
    struct Tracked {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Tracked {
        fn new(name: &'static str, fail: bool, log: &Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                name,
                fail,
                log: Arc::clone(log),
            }
        }
    }

    impl Close for Tracked {
        fn close(&mut self) -> io::Result<()> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(io::Error::other(format!("{} close failed", self.name)))
            } else {
                Ok(())
            }
        }
    }

    impl Write for Tracked {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn close_runs_outer_then_inner() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut nested = Nested::new(
            Tracked::new("outer", false, &log),
            Tracked::new("inner", false, &log),
        );

        nested.close().unwrap();
        assert_eq!(*log.lock().unwrap(), ["outer", "inner"]);
    }

    #[test]
    fn failed_outer_close_leaves_inner_open() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut nested = Nested::new(
            Tracked::new("outer", true, &log),
            Tracked::new("inner", false, &log),
        );

        assert!(nested.close().is_err());
        assert_eq!(*log.lock().unwrap(), ["outer"]);
    }

    #[test]
    fn inner_close_error_surfaces() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut nested = Nested::new(
            Tracked::new("outer", false, &log),
            Tracked::new("inner", true, &log),
        );

        assert!(nested.close().is_err());
        assert_eq!(*log.lock().unwrap(), ["outer", "inner"]);
    }

    #[test]
    fn reads_and_writes_reach_the_outer_stream() {
        let mut reader = Nested::new(NopClose(Cursor::new(b"abc".to_vec())), NopClose(()));
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "abc");
        reader.close().unwrap();

        let mut writer = Nested::new(NopClose(Vec::new()), NopClose(()));
        writer.write_all(b"xyz").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.outer_mut().0, b"xyz");
        writer.close().unwrap();
    }

    #[test]
    fn buf_writer_flushes_before_closing_inner() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut writer = BufWriter::new(Tracked::new("sink", false, &log));

        writer.write_all(b"buffered").unwrap();
        writer.close().unwrap();
        assert_eq!(*log.lock().unwrap(), ["sink"]);
    }

    #[test]
    fn chains_terminate_at_a_file() {
        let file = tempfile::tempfile().unwrap();
        let mut nested = Nested::new(NopClose(Vec::new()), file);
        nested.write_all(b"data").unwrap();
        nested.close().unwrap();
    }
}
