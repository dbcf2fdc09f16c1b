/// Modbus/TCP client polling a Heliotherm heat pump
use std::path::PathBuf;

use clap::Parser;
use heliotherm_modbus::codec::WriteValue;
use heliotherm_modbus::{GatewayConfig, Hub, RegisterTable};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
struct Args {
    /// TOML config file, overridden by HELIOTHERM_* variables and the flags below
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long, env = "HELIOTHERM_HOST")]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    unit_id: Option<u8>,
    /// Write `key=value` once after the first cycle
    #[arg(short, long)]
    write: Vec<String>,
    /// Number of cycles to print before exiting, 0 runs forever
    #[arg(short = 'n', long, default_value_t = 0)]
    cycles: usize,
}

fn parse_write(arg: &str) -> Option<(&str, WriteValue)> {
    let (key, value) = arg.split_once('=')?;
    let value = match value {
        "true" => WriteValue::Bool(true),
        "false" => WriteValue::Bool(false),
        other => match other.parse::<f64>() {
            Ok(number) => WriteValue::Number(number),
            Err(_) => WriteValue::Text(other.to_string()),
        },
    };
    Some((key, value))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config: GatewayConfig = GatewayConfig::figment(args.config.as_deref()).extract()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(unit_id) = args.unit_id {
        config.unit_id = unit_id;
    }
    config.validate()?;

    let hub = Hub::from_config(&config, RegisterTable::heliotherm()?)?;
    println!("{:#?}", hub.descriptions());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = hub.subscribe(move || {
        let _ = tx.send(());
    });

    let mut cycle = 0;
    while rx.recv().await.is_some() {
        cycle += 1;
        let data = hub.data();
        let mut keys: Vec<_> = data.keys().collect();
        keys.sort();
        for key in keys {
            println!("{key:>32} = {}", data[key]);
        }
        println!();

        if cycle == 1 {
            for arg in &args.write {
                let Some((key, value)) = parse_write(arg) else {
                    eprintln!("ignoring `{arg}`, expected key=value");
                    continue;
                };
                match hub.write(key, value).await {
                    Ok(receipt) => println!("wrote {key}: {receipt:?}"),
                    Err(err) => eprintln!("writing {key} failed: {err}"),
                }
            }
        }
        if args.cycles != 0 && cycle >= args.cycles {
            break;
        }
    }

    hub.unsubscribe(id).await;
    Ok(())
}
