/// Polling hub running against the in-memory heat pump
use std::time::Duration;

use heliotherm_modbus::simulator::SimulatedDevice;
use heliotherm_modbus::{Hub, RegisterTable};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const KEYS: [&str; 5] = [
    "temp_aussen",
    "temp_vorlauf",
    "verdichter",
    "select_betriebsart",
    "climate_ruecklaufsolltemperatur",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let table = RegisterTable::heliotherm()?;
    let device = SimulatedDevice::from_table(&table);
    let outdoor = table.get("temp_aussen").map(|e| e.entry.clone());
    let flow = table.get("temp_vorlauf").map(|e| e.entry.clone());
    let compressor = table.get("verdichter").map(|e| e.entry.clone());
    let hub = Hub::new("simulated", table, device.clone(), Duration::from_secs(5));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = hub.subscribe(move || {
        let _ = tx.send(());
    });

    for cycle in 0..4i64 {
        if let (Some(outdoor), Some(flow), Some(compressor)) = (&outdoor, &flow, &compressor) {
            device.set(outdoor, -35 + 10 * cycle);
            device.set(flow, 320 + 5 * cycle);
            device.set(compressor, cycle % 2);
        }
        if rx.recv().await.is_none() {
            break;
        }
        for key in KEYS {
            if let Some(value) = hub.value(key) {
                println!("{key:>32} = {value}");
            }
        }
        println!();

        if cycle == 1 {
            let receipt = hub.write("climate_ruecklaufsolltemperatur", 42.5).await?;
            println!("{receipt:?}");
            let receipt = hub.write("select_betriebsart", "Kühlen").await?;
            println!("{receipt:?}");
            println!("device writes: {:?}", device.writes());
        }
    }

    hub.unsubscribe(id).await;
    Ok(())
}
