#![allow(dead_code)]

use futures::{
    prelude::*,
    task::{self, Task},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sarq::{Config, Connection};
use std::{
    cmp,
    collections::VecDeque,
    fmt::Debug,
    io::{self, ErrorKind, Read, Write},
    sync::{mpsc, Arc, Mutex},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    runtime::Runtime,
};

pub fn run_timed<
    E: 'static + Debug + Send,
    F: 'static + Send + FnOnce(mpsc::Sender<E>),
>(
    duration: Duration,
    func: F,
) {
    let (err_tx, err_rx) = mpsc::channel();

    func(err_tx);

    match err_rx.recv_timeout(duration) {
        Ok(err) => panic!("{:?}", err),
        Err(mpsc::RecvTimeoutError::Timeout) => panic!("timed out"),
        Err(mpsc::RecvTimeoutError::Disconnected) => {}
    }
}

/// Faults applied to every byte written into a pipe.
#[derive(Copy, Clone, Debug, Default)]
pub struct Faults {
    /// Probability of a byte getting lost.
    pub loss: f64,

    /// Probability of a single bit in a byte getting flipped.
    pub corruption: f64,
}

/// One direction of a pipe.
#[derive(Debug, Default)]
struct Lane {
    bytes: VecDeque<u8>,
    reader: Option<Task>,
}

/// One end of an in-memory, order-preserving duplex byte channel.
pub struct End {
    faults: Faults,
    incoming: Arc<Mutex<Lane>>,
    outgoing: Arc<Mutex<Lane>>,
    rng: StdRng,
    tap: Option<Arc<Mutex<Vec<u8>>>>,
}

/// Creates a pipe whose ends apply `faults` to the bytes they write.
pub fn pipe(faults: Faults) -> (End, End) {
    let a_to_b = Arc::new(Mutex::new(Lane::default()));
    let b_to_a = Arc::new(Mutex::new(Lane::default()));

    let end = |incoming: Arc<Mutex<Lane>>, outgoing: Arc<Mutex<Lane>>| End {
        faults,
        incoming,
        outgoing,
        rng: StdRng::from_rng(rand::thread_rng()).expect("failed to seed rng"),
        tap: None,
    };

    (end(b_to_a.clone(), a_to_b.clone()), end(a_to_b, b_to_a))
}

impl End {
    /// Records every byte this end writes, before faults are applied.
    pub fn tap(&mut self) -> Arc<Mutex<Vec<u8>>> {
        self.tap
            .get_or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }
}

impl Read for End {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut lane = self.incoming.lock().unwrap();

        if lane.bytes.is_empty() {
            lane.reader = Some(task::current());
            return Err(ErrorKind::WouldBlock.into());
        }

        let len = cmp::min(buf.len(), lane.bytes.len());
        for (dst, src) in buf.iter_mut().zip(lane.bytes.drain(..len)) {
            *dst = src;
        }

        Ok(len)
    }
}

impl Write for End {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(tap) = &self.tap {
            tap.lock().unwrap().extend_from_slice(buf);
        }

        let mut lane = self.outgoing.lock().unwrap();
        for &byte in buf {
            if self.rng.gen_bool(self.faults.loss) {
                continue;
            }

            let byte = if self.rng.gen_bool(self.faults.corruption) {
                byte ^ (1u8 << self.rng.gen_range(0u32, 8))
            } else {
                byte
            };
            lane.bytes.push_back(byte);
        }

        if let Some(reader) = lane.reader.take() {
            reader.notify();
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncRead for End {}

impl AsyncWrite for End {
    fn shutdown(&mut self) -> Poll<(), io::Error> {
        Ok(Async::Ready(()))
    }
}

/// Two connections talking to each other over a pipe.
pub struct Pair {
    pub a: Connection,
    pub b: Connection,

    /// Everything `a` put onto the wire.
    pub a_tap: Arc<Mutex<Vec<u8>>>,

    runtime: Runtime,
}

impl Pair {
    pub fn new(faults: Faults, config: Config) -> Self {
        let (mut end_a, end_b) = pipe(faults);
        let a_tap = end_a.tap();

        let runtime = Runtime::new().unwrap();
        let a = Connection::spawn_on(end_a, config, &runtime.executor());
        let b = Connection::spawn_on(end_b, config, &runtime.executor());

        Pair { a, b, a_tap, runtime }
    }

    /// Stops all connection tasks.
    pub fn shutdown(self) {
        self.runtime.shutdown_now().wait().unwrap();
    }
}

/// Reads exactly `len` bytes off the connection.
pub fn read_len(conn: &Connection, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; len];
    let mut reader = conn;
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
