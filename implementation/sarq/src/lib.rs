//! A reliable, ordered, full-duplex byte stream on top of an unreliable
//! duplex byte channel.
//!
//! The channel may corrupt, delay or drop bytes, but must not reorder them.
//! Data is cut into checksummed frames of at most `mtu` bytes, and a
//! stop-and-wait ARQ scheme with a fixed retransmission interval makes sure
//! every frame arrives exactly once.
//!
//! ```rust,no_run
//! use std::io::{Read, Write};
//! use tokio::{net::TcpStream, runtime::Runtime};
//!
//! let mut runtime = Runtime::new().unwrap();
//! let addr = "127.0.0.1:12345".parse().unwrap();
//! let socket = runtime.block_on(TcpStream::connect(&addr)).unwrap();
//!
//! let config = sarq::Config::new();
//! let mut conn = sarq::Connection::spawn_on(socket, config, &runtime.executor());
//! conn.write_all(b"Hello World!").unwrap();
//!
//! let mut buf = [0; 12];
//! conn.read_exact(&mut buf).unwrap();
//! ```

mod codec;
mod config;
mod connection;
mod driver;
mod frame;
mod pump;
mod sequencer;
mod state;

pub use crate::codec::FrameCodec;
pub use crate::config::{Config, DEFAULT_MTU, DEFAULT_RETRY};
pub use crate::connection::Connection;
pub use crate::frame::{Frame, FrameError, FrameKind, HEADER_LEN, MAX_PAYLOAD, START, TRAILER_LEN};
pub use crate::sequencer::Sequencer;
