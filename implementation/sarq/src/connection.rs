use bytes::Bytes;
use futures::{
    prelude::*,
    sync::{mpsc, oneshot},
};
use std::{
    io::{self, Error, ErrorKind, Read, Write},
    thread,
};
use tokio::{
    self,
    io::{AsyncRead, AsyncWrite},
    runtime::TaskExecutor,
};

use crate::{
    config::Config,
    driver::{Driver, Request, INBOUND_QUEUE_SIZE},
    pump::{ReceivePump, TransmitPump},
};

const DRIVER_AWAY: &str = "driver has gone away";

/// A future spawned for a connection.
type Task = Box<dyn Future<Item = (), Error = ()> + Send>;

/// A reliable, ordered, full-duplex byte stream on top of an unreliable
/// duplex channel.
///
/// The connection runs three tasks on a tokio executor: a receive pump
/// decoding frames off the raw channel, a transmit pump encoding frames onto
/// it, and a driver owning all protocol state. This handle merely sends
/// requests to the driver and waits for the replies, which makes its `Read`
/// and `Write` implementations blocking. They must not be used from within
/// the executor's own threads.
///
/// Handles can be cloned and shared. The tasks keep running until every
/// handle has been dropped and all written data has been acknowledged, or
/// the raw channel is gone.
#[derive(Clone, Debug)]
pub struct Connection {
    config: Config,
    requests: mpsc::UnboundedSender<Request>,
}

impl Connection {
    /// Starts a connection over `channel` on the default executor.
    ///
    /// # Panics
    ///
    /// Panics if not called from within a tokio executor.
    pub fn spawn<T>(channel: T, config: Config) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::start(channel, config, |task| {
            tokio::spawn(task);
        })
    }

    /// Starts a connection over `channel` on the given executor.
    pub fn spawn_on<T>(channel: T, config: Config, executor: &TaskExecutor) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::start(channel, config, |task| executor.spawn(task))
    }

    fn start<T, S>(channel: T, config: Config, mut spawn: S) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
        S: FnMut(Task),
    {
        let (reader, writer) = channel.split();
        let (requests_tx, requests_rx) = mpsc::unbounded();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);

        // A rendezvous channel, so the driver notices when the transmit
        // pump is busy.
        let (transmit_tx, transmit_rx) = mpsc::channel(0);

        spawn(Box::new(ReceivePump::new(reader, inbound_tx)));
        spawn(Box::new(TransmitPump::new(writer, transmit_rx)));
        spawn(Box::new(Driver::new(&config, requests_rx, inbound_rx, transmit_tx)));

        Connection {
            config,
            requests: requests_tx,
        }
    }

    /// Gets the configuration the connection was started with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sends a request to the driver and blocks until it has replied.
    fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<io::Result<T>>) -> Request,
    ) -> io::Result<T> {
        let (reply, rx) = oneshot::channel();

        self.requests
            .unbounded_send(make(reply))
            .map_err(|_| Error::new(ErrorKind::Other, DRIVER_AWAY))?;

        rx.wait()
            .map_err(|_| Error::new(ErrorKind::Other, DRIVER_AWAY))?
    }
}

impl<'a> Read for &'a Connection {
    /// Blocks until at least one byte is available.
    ///
    /// While nothing has arrived, the inbound buffer is polled at twice the
    /// retry interval. Returns `Ok(0)` once the raw channel has ended and all
    /// received data has been read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let max = buf.len();
        loop {
            match self.request(|reply| Request::Read { max, reply })? {
                Some(ref data) if data.is_empty() => {
                    thread::sleep(self.config.retry() * 2);
                }
                Some(data) => {
                    buf[..data.len()].copy_from_slice(&data);
                    return Ok(data.len());
                }
                None => return Ok(0),
            }
        }
    }
}

impl<'a> Write for &'a Connection {
    /// Appends the data to the outbound buffer.
    ///
    /// This returns as soon as the data has been buffered, it does not wait
    /// for it to be delivered.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let data = Bytes::from(buf);
        self.request(|reply| Request::Write { data, reply })
    }

    /// Blocks until all data written so far has been acknowledged by the peer.
    fn flush(&mut self) -> io::Result<()> {
        self.request(|reply| Request::Flush { reply })
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self).read(buf)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self).flush()
    }
}
