mod common;

use crate::common::{read_len, run_timed, Faults, Pair};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::Rng;
use sarq::{Config, Connection};
use std::{
    collections::HashSet,
    io::Write,
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

fn fast_config(mtu: u8) -> Config {
    Config::new().with_mtu(mtu).with_retry(Duration::from_millis(2))
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

/// Writes `data` in randomly sized chunks.
fn write_chunked(conn: &Connection, data: &[u8]) -> Result<(), String> {
    let mut rng = rand::thread_rng();
    let mut writer = conn;
    let mut pos = 0;

    while pos < data.len() {
        let end = rng.gen_range(pos, data.len()) + 1;
        writer
            .write_all(&data[pos..end])
            .map_err(|e| format!("write failed: {}", e))?;
        pos = end;
    }

    Ok(())
}

/// Sends `data` from `a` to `b` and checks that it arrives unchanged.
fn transfer(a: &Connection, b: &Connection, data: &[u8]) -> Result<(), String> {
    write_chunked(a, data)?;

    let received = read_len(b, data.len()).map_err(|e| format!("read failed: {}", e))?;
    if received != data {
        let first_diff = received.iter().zip(data).position(|(x, y)| x != y);
        return Err(format!("data mismatch, first difference at {:?}", first_diff));
    }

    Ok(())
}

/// Runs `transfer` on a background thread, guarded by a timeout.
fn transfer_timed(pair: Pair, data: Vec<u8>, timeout: Duration) {
    let pair = Arc::new(pair);

    run_timed(timeout, move |err_tx: mpsc::Sender<String>| {
        thread::spawn(move || {
            if let Err(e) = transfer(&pair.a, &pair.b, &data) {
                err_tx.send(e).unwrap();
            }
        });
    });
}

#[test]
fn clean_channel() {
    let _ = env_logger::try_init();

    let pair = Pair::new(Faults::default(), fast_config(200));
    transfer_timed(pair, random_bytes(10_000), Duration::from_secs(10));
}

#[test]
fn ten_percent_byte_loss() {
    let _ = env_logger::try_init();

    let faults = Faults {
        loss: 0.1,
        ..Faults::default()
    };
    let data: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();

    let pair = Pair::new(faults, fast_config(8));
    transfer_timed(pair, data, Duration::from_secs(120));
}

#[test]
fn bit_corruption() {
    let _ = env_logger::try_init();

    let faults = Faults {
        corruption: 0.01,
        ..Faults::default()
    };

    let pair = Pair::new(faults, fast_config(32));
    transfer_timed(pair, random_bytes(4000), Duration::from_secs(60));
}

#[test]
fn both_directions_at_once() {
    let _ = env_logger::try_init();

    let faults = Faults {
        loss: 0.01,
        corruption: 0.01,
    };
    let pair = Arc::new(Pair::new(faults, fast_config(64)));

    run_timed(Duration::from_secs(60), move |err_tx: mpsc::Sender<String>| {
        for &forward in &[true, false] {
            let pair = pair.clone();
            let err_tx = err_tx.clone();
            let data = random_bytes(5000);

            thread::spawn(move || {
                let result = if forward {
                    transfer(&pair.a, &pair.b, &data)
                } else {
                    transfer(&pair.b, &pair.a, &data)
                };
                if let Err(e) = result {
                    err_tx.send(e).unwrap();
                }
            });
        }
    });
}

/// Both sides keep incrementing a counter they pass back and forth.
#[test]
fn counter_ping_pong() {
    const MAX: i64 = 100;

    let _ = env_logger::try_init();

    let faults = Faults {
        loss: 0.02,
        ..Faults::default()
    };
    let pair = Arc::new(Pair::new(faults, fast_config(16)));

    fn play(name: &str, conn: &Connection) -> Result<(), String> {
        let mut stream = conn;
        let mut seen = HashSet::new();

        stream
            .write_i64::<LittleEndian>(0)
            .map_err(|e| format!("[{}] write failed: {}", name, e))?;

        loop {
            let n = stream
                .read_i64::<LittleEndian>()
                .map_err(|e| format!("[{}] read failed: {}", name, e))?;

            if !seen.insert(n) {
                return Err(format!("[{}] already seen {}", name, n));
            }

            stream
                .write_i64::<LittleEndian>(n + 1)
                .map_err(|e| format!("[{}] write failed: {}", name, e))?;

            if n == MAX {
                return Ok(());
            }
        }
    }

    run_timed(Duration::from_secs(60), move |err_tx: mpsc::Sender<String>| {
        for &name in &["A", "B"] {
            let pair = pair.clone();
            let err_tx = err_tx.clone();

            thread::spawn(move || {
                let conn = if name == "A" { &pair.a } else { &pair.b };
                if let Err(e) = play(name, conn) {
                    err_tx.send(e).unwrap();
                }
            });
        }
    });
}

#[test]
fn flush_waits_for_acknowledgment() {
    let _ = env_logger::try_init();

    let faults = Faults {
        loss: 0.05,
        ..Faults::default()
    };
    let pair = Arc::new(Pair::new(faults, fast_config(16)));
    let data = random_bytes(512);

    run_timed(Duration::from_secs(60), move |err_tx: mpsc::Sender<String>| {
        thread::spawn(move || {
            let result = (|| -> Result<(), String> {
                let mut writer = &pair.a;
                writer.write_all(&data).map_err(|e| e.to_string())?;
                writer.flush().map_err(|e| e.to_string())?;

                // Everything has been acknowledged, so the peer has it all.
                let received = read_len(&pair.b, data.len()).map_err(|e| e.to_string())?;
                if received != data {
                    return Err("data mismatch".to_owned());
                }
                Ok(())
            })();

            if let Err(e) = result {
                err_tx.send(e).unwrap();
            }
        });
    });
}
