use futures::prelude::*;
use log::{info, warn};
use sarq::{Config, Connection};
use std::{
    io::{self, Write},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    thread,
};
use tokio::{self, net::TcpListener};

/// Copies everything read from the connection back into it.
fn echo(conn: &Connection) -> io::Result<u64> {
    let (mut reader, mut writer) = (conn, conn);
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(copied)
}

pub fn serve(port: u16, config: Config) {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);

    let listener = TcpListener::bind(&addr).expect("failed to bind TCP socket");
    let local_addr = listener.local_addr().expect("failed to get local address");

    let server_future = listener
        .incoming()
        .for_each(move |socket| {
            let peer = match socket.peer_addr() {
                Ok(addr) => addr,
                Err(e) => {
                    warn!("dropping socket without peer address: {}", e);
                    return Ok(());
                }
            };
            info!("accepting connection from {}", peer);

            let conn = Connection::spawn(socket, config);

            // The connection handle blocks, keep it off the executor.
            thread::spawn(move || match echo(&conn) {
                Ok(n) => info!("connection to {} closed after {} bytes", peer, n),
                Err(e) => warn!("error while echoing to {}: {}", peer, e),
            });

            Ok(())
        })
        .map_err(|e| panic!("listener error: {:?}", e));

    info!("starting echo server on {} with {:?}", local_addr, config);
    tokio::run(server_future);
}
