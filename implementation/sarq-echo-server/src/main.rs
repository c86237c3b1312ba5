//! A server that accepts TCP connections, runs a reliable stream over each of
//! them and echoes every byte back to the sender.

mod server;

use clap::{
    app_from_crate, crate_authors, crate_description, crate_name, crate_version,
    AppSettings, Arg,
};
use env_logger;
use log::LevelFilter;
use sarq::Config;
use std::{str::FromStr, time::Duration};

const PORT_ARG: &str = "PORT";
const MTU_ARG: &str = "MTU";
const RETRY_ARG: &str = "RETRY_MS";

fn number<T: FromStr>(val: String) -> Result<(), String> {
    val.parse::<T>()
        .map(|_| ())
        .map_err(|_| format!("'{}' cannot be parsed as number.", val))
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter(Some("sarq_echo_server"), LevelFilter::Info)
        .init();

    let matches = app_from_crate!()
        .setting(AppSettings::GlobalVersion)
        .arg(
            Arg::with_name(PORT_ARG)
                .short("p")
                .long("port")
                .default_value("12345")
                .takes_value(true)
                .validator(number::<u16>)
                .help("The TCP port to listen on."),
        )
        .arg(
            Arg::with_name(MTU_ARG)
                .short("m")
                .long("mtu")
                .default_value("200")
                .takes_value(true)
                .validator(|val| match val.parse::<u8>() {
                    Ok(0) => Err("the MTU must be at least 1.".to_owned()),
                    Ok(_) => Ok(()),
                    Err(_) => Err(format!("'{}' cannot be parsed as number.", val)),
                })
                .help("The maximum payload size of a single frame."),
        )
        .arg(
            Arg::with_name(RETRY_ARG)
                .short("r")
                .long("retry-ms")
                .default_value("10")
                .takes_value(true)
                .validator(|val| match val.parse::<u64>() {
                    Ok(0) => Err("the retry interval must be positive.".to_owned()),
                    Ok(_) => Ok(()),
                    Err(_) => Err(format!("'{}' cannot be parsed as number.", val)),
                })
                .help("The retransmission interval in milliseconds."),
        )
        .get_matches();

    // The validators have already checked the values.
    let port = matches.value_of(PORT_ARG).unwrap().parse().unwrap();
    let mtu = matches.value_of(MTU_ARG).unwrap().parse().unwrap();
    let retry = matches.value_of(RETRY_ARG).unwrap().parse().unwrap();

    let config = Config::new()
        .with_mtu(mtu)
        .with_retry(Duration::from_millis(retry));

    server::serve(port, config);
}
