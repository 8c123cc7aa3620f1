//! Line-oriented command execution over an async byte stream

use std::io;
use tokio::io::{ AsyncRead, AsyncWrite, AsyncReadExt, AsyncWriteExt };
use tracing::debug;

/// Writes terminated command lines to an instrument and reads back `LF`-terminated replies
///
/// Creating the underlying stream is not handled here so that instruments are not tied to a
/// particular transport. A raw TCP socket to a LAN instrument, a serial line or a GPIB bridge all work
/// as long as they speak line-terminated text.
pub struct Executor<T>
{
    line_ending: &'static str,
    io_handle: T,
    read_buf: Vec<u8>,
    /// Queries written whose reply has not been read yet
    ///
    /// Nonzero between queries only when a query was dropped mid-flight, e.g. by a timeout. Those
    /// late replies are skipped so they are never taken as the answer to a later query.
    unanswered: usize,
}

impl <T> Executor<T>
    where T: AsyncRead + AsyncWrite + Unpin + Send
{
    pub fn with(line_ending: &'static str, io_handle: T) -> Self
    {
        Self {
            line_ending: line_ending,
            io_handle: io_handle,
            read_buf: Vec::with_capacity(128),
            unanswered: 0,
        }
    }

    /// Drops the first `n` bytes from the read buffer
    ///
    /// Drops all bytes if `n >= self.read_buf.len()`
    fn drop_first(&mut self, n: usize)
    {
        if n >= self.read_buf.len() {
            self.read_buf.clear();
        }
        else {
            self.read_buf.drain(..n);
            self.read_buf.shrink_to(128);
        }
    }

    /// Returns the index of the first linefeed in the read buffer at or after `start_hint`
    fn find_line_ending(&self, start_hint: usize) -> Option<usize>
    {
        self.read_buf
            .iter()
            .skip(start_hint)
            .position(|byte| *byte == b'\n')
            .map(|offset| offset + start_hint)
    }

    /// Reads until a full line is buffered and returns its length including the linefeed
    ///
    /// # Cancel Safety
    /// This function is cancel safe e.g. when used inside of a `tokio::select!` or a timeout. This is
    /// because this will never destroy contents of the read buffer -- only append.
    async fn read_line(&mut self) -> io::Result<usize>
    {
        let mut searched = 0;

        loop {
            if let Some(index) = self.find_line_ending(searched) {
                return Ok(index + 1);
            }
            searched = self.read_buf.len();

            let mut temp_buf = [0u8; 64];
            let bytes_read = self.io_handle.read(&mut temp_buf[..]).await?;
            if bytes_read == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
            self.read_buf.extend_from_slice(&temp_buf[..bytes_read]);
        }
    }

    /// Sends one command line. Nothing is read back.
    pub async fn write_line(&mut self, cmd: &str) -> io::Result<()>
    {
        let serialized = format!("{}{}", cmd, self.line_ending);
        self.io_handle.write_all(serialized.as_bytes()).await?;
        self.io_handle.flush().await
    }

    /// Sends a query and returns the reply line with the terminator stripped
    ///
    /// # Cancel Safety
    /// Dropping this future after the query was written leaves its reply owed. The next query reads and
    /// discards owed replies before returning its own.
    pub async fn query(&mut self, cmd: &str) -> io::Result<String>
    {
        self.write_line(cmd).await?;
        self.unanswered += 1;

        loop {
            let reply = self.read_reply().await?;
            self.unanswered -= 1;
            if self.unanswered == 0 {
                return Ok(reply);
            }
            debug!(cmd, stale = %reply, "late reply discarded");
        }
    }

    /// Reads the next reply line with the terminator stripped
    pub async fn read_reply(&mut self) -> io::Result<String>
    {
        let reply_len = self.read_line().await?;
        let reply = String::from_utf8_lossy(&self.read_buf[..reply_len])
            .trim_end_matches(&['\r', '\n'][..])
            .to_string();
        self.drop_first(reply_len);

        Ok(reply)
    }
}
