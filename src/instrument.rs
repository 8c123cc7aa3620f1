//! The capability every instrument backend provides to the sweep procedures
//!
//! Procedures never know whether they are talking to a bench instrument or to a recorded fixture.
//! They see only [`Instrument`]: fire-and-forget commands, queries with a text reply, a discovery
//! probe and a connectivity flag. Settling dwells go through [`Instrument::settle`] so that a
//! simulated backend skips them while following exactly the same control path.

use std::{ io, time::Duration };
use async_trait::async_trait;
use tokio::io::{ AsyncRead, AsyncWrite };
use tracing::debug;
use crate::{ cmd::CmdSet, executor::Executor };

#[async_trait]
pub trait Instrument: Send
{
    /// Send a command which has no reply
    async fn send(&mut self, cmd: &str) -> io::Result<()>;

    /// Send a query and return the raw reply text
    async fn query(&mut self, cmd: &str) -> io::Result<String>;

    /// Probe whether the instrument answers, updating [`Instrument::status`]
    async fn find(&mut self) -> bool;

    /// Connectivity as of the last [`Instrument::find`]
    fn status(&self) -> bool;

    /// Wait for the instrument to settle after being reprogrammed
    ///
    /// The default does not wait at all, which is what simulated backends want.
    async fn settle(&mut self, _dwell: Duration)
    {
    }
}

/// A live instrument reached over a line-oriented byte stream
pub struct BusInstrument<T>
{
    name: String,
    executor: Executor<T>,
    reply_timeout: Duration,
    found: bool,
}

impl <T> BusInstrument<T>
    where T: AsyncRead + AsyncWrite + Unpin + Send
{
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Wrap an already opened stream
    pub fn with(name: impl Into<String>, io_handle: T) -> Self
    {
        Self {
            name: name.into(),
            executor: Executor::with("\n", io_handle),
            reply_timeout: Self::DEFAULT_TIMEOUT,
            found: false,
        }
    }

    pub fn reply_timeout(mut self, timeout: Duration) -> Self
    {
        self.reply_timeout = timeout;
        self
    }
}

#[async_trait]
impl <T> Instrument for BusInstrument<T>
    where T: AsyncRead + AsyncWrite + Unpin + Send
{
    async fn send(&mut self, cmd: &str) -> io::Result<()>
    {
        debug!(instrument = %self.name, cmd, "send");
        self.executor.write_line(cmd).await
    }

    async fn query(&mut self, cmd: &str) -> io::Result<String>
    {
        let reply = tokio::time::timeout(self.reply_timeout, self.executor.query(cmd))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("no reply to {:?}", cmd)))??;
        debug!(instrument = %self.name, cmd, reply = %reply, "query");

        Ok(reply)
    }

    async fn find(&mut self) -> bool
    {
        self.found = match self.query(&CmdSet::Identify.to_string()).await {
            Ok(idn) => !idn.trim().is_empty(),
            Err(err) => {
                debug!(instrument = %self.name, %err, "not found");
                false
            }
        };
        self.found
    }

    fn status(&self) -> bool
    {
        self.found
    }

    async fn settle(&mut self, dwell: Duration)
    {
        tokio::time::sleep(dwell).await;
    }
}

#[cfg(test)]
mod tests
{
    use std::time::Duration;
    use super::{ BusInstrument, Instrument };
    use tokio::io::{ AsyncBufReadExt, AsyncWriteExt, BufReader };

    #[tokio::test]
    async fn find_sets_status_from_idn()
    {
        let (client, server) = tokio::io::duplex(256);
        let mut analyzer = BusInstrument::with("analyzer", client);
        assert!(!analyzer.status());

        let responder = tokio::spawn(async move {
            let mut lines = BufReader::new(server);
            let mut line = String::new();
            lines.read_line(&mut line).await.unwrap();
            assert_eq!(&line, "*IDN?\n");
            lines.get_mut().write_all(b"Agilent Technologies,N9030A\n").await.unwrap();
            lines
        });

        assert!(analyzer.find().await);
        assert!(analyzer.status());
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn silent_instrument_times_out()
    {
        let (client, _server) = tokio::io::duplex(256);
        let mut meter = BusInstrument::with("meter", client).reply_timeout(Duration::from_millis(20));

        let err = meter.query("MEAS:CURR:DC? 1A,DEF").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert!(!meter.find().await);
    }

    #[tokio::test]
    async fn late_reply_is_not_taken_for_the_next_one()
    {
        let (client, server) = tokio::io::duplex(256);
        let mut analyzer = BusInstrument::with("analyzer", client).reply_timeout(Duration::from_millis(30));

        let responder = tokio::spawn(async move {
            let mut lines = BufReader::new(server);
            let mut line = String::new();
            lines.read_line(&mut line).await.unwrap();
            tokio::time::sleep(Duration::from_millis(80)).await;
            lines.get_mut().write_all(b"-11.0\n").await.unwrap();

            line.clear();
            lines.read_line(&mut line).await.unwrap();
            lines.get_mut().write_all(b"-22.0\n").await.unwrap();
            lines
        });

        let err = analyzer.query(":CALCulate:MARKer:Y?").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert_eq!(&analyzer.query(":CALCulate:MARKer:Y?").await.unwrap(), "-22.0");
        responder.await.unwrap();
    }
}
