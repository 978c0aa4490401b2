//! BLE probe for lazyble devices
//!
//! Scans for the peripheral, reads its characteristics, watches its
//! notifications, and waits for the dynamic service to be advertised.

use clap::{Parser, Subcommand};
use serde::Serialize;

use lazyble_probe::ble::{self, DeviceReport};

#[derive(Parser)]
#[command(name = "lazyble-probe")]
#[command(about = "BLE probe for lazyble devices")]
struct Cli {
    /// Device name or address to connect to (default: any lazyble device)
    #[arg(short, long, global = true, env = "LAZYBLE_TARGET")]
    device: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for devices and show which services they advertise
    Scan {
        /// Scan duration in seconds
        #[arg(short = 't', long, default_value = "5")]
        duration: u64,
        /// Also list devices that are not lazyble peripherals
        #[arg(short, long)]
        all: bool,
    },
    /// Connect and read every readable characteristic
    Inspect,
    /// Subscribe to notifications and print them as they arrive
    Watch {
        /// How long to listen, in seconds
        #[arg(short = 't', long, default_value = "30")]
        duration: u64,
    },
    /// Wait until the device advertises the dynamic service
    WaitDynamic {
        /// Give up after this many seconds
        #[arg(short = 't', long, default_value = "60")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let target = cli.device.as_deref();

    match cli.command {
        Commands::Scan { duration, all } => {
            if !cli.json {
                println!("Scanning for lazyble devices ({} seconds)...", duration);
            }
            let devices: Vec<DeviceReport> = ble::scan(duration)
                .await?
                .into_iter()
                .filter(|d| all || d.is_lazyble)
                .collect();

            if cli.json {
                return print_json(&devices);
            }
            println!("\nFound {} devices:", devices.len());
            for device in &devices {
                print_device(device);
            }
        }
        Commands::Inspect => {
            if !cli.json {
                println!("Connecting...");
            }
            let reports = ble::inspect(target).await?;

            if cli.json {
                return print_json(&reports);
            }
            for r in &reports {
                let value = match (&r.value, &r.error) {
                    (Some(v), _) => format!("\"{}\"", v),
                    (None, Some(e)) => format!("<{}>", e),
                    (None, None) => "-".to_string(),
                };
                println!(
                    "  {} / {} [{}] {}",
                    r.service, r.characteristic, r.properties, value
                );
            }
        }
        Commands::Watch { duration } => {
            let json = cli.json;
            if !json {
                println!("Watching notifications for {} seconds...", duration);
            }
            let received = ble::watch(target, duration, |n| {
                if !json {
                    println!("  {}: {}", n.characteristic, n.value);
                }
            })
            .await?;

            if json {
                return print_json(&received);
            }
            println!("Received {} notifications.", received.len());
        }
        Commands::WaitDynamic { timeout } => {
            if !cli.json {
                println!("Waiting up to {} seconds for the dynamic service...", timeout);
            }
            let device = ble::wait_dynamic(target, timeout).await?;

            if cli.json {
                return print_json(&device);
            }
            println!("Dynamic service is advertised:");
            print_device(&device);
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_device(device: &DeviceReport) {
    let rssi = device
        .rssi
        .map(|r| format!("{} dBm", r))
        .unwrap_or_else(|| "N/A".to_string());
    let marker = if device.dynamic_active { " [DYNAMIC]" } else { "" };

    println!(
        "  {} ({}) RSSI: {} services: [{}]{}",
        device.name,
        device.address,
        rssi,
        device.services.join(", "),
        marker
    );
}
