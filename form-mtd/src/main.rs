use std::{net::Ipv4Addr, path::PathBuf};

use clap::Parser;
use form_mtd::{
    packet::IP_PROTO_ICMP, BufferId, ChannelControlPlane, Ipv4Header, MtdConfig, MtdController,
    Packet, PacketIn,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file. The built-in deployment is used when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Print the current mapping as JSON and exit.
    #[arg(long)]
    print_mapping: bool,

    /// Run a synthetic IPv4 packet-in towards this destination (repeatable).
    #[arg(long, short = 't')]
    send_to: Vec<Ipv4Addr>,

    /// Source address of the synthetic packets.
    #[arg(long, short, default_value = "10.0.0.1")]
    source: Ipv4Addr,

    #[arg(long, short)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug { log::Level::Debug } else { log::Level::Info };
    simple_logger::init_with_level(level)?;

    let config = match &cli.config {
        Some(path) => {
            log::info!("Loading config from {}", path.display());
            MtdConfig::from_file(path)?
        }
        None => {
            log::warn!("No config file given, using built-in deployment");
            MtdConfig::default()
        }
    };

    let (control, mut rx) = ChannelControlPlane::channel();
    let transport_handle = tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            for command in batch {
                match serde_json::to_string(&command) {
                    Ok(json) => log::info!("switch <- {json}"),
                    Err(e) => log::error!("Unable to encode command {command:?}: {e}"),
                }
            }
        }
    });

    let mut controller = MtdController::new(&config, control)?;

    if cli.print_mapping {
        println!("{}", serde_json::to_string_pretty(&*controller.mapping())?);
        drop(controller);
        transport_handle.await?;
        return Ok(());
    }

    for (i, destination) in cli.send_to.iter().enumerate() {
        let event = PacketIn::new(
            Packet::Ipv4(Ipv4Header::new(cli.source, *destination, IP_PROTO_ICMP)),
            BufferId(i as u32),
            0,
        );
        let decision = controller.handle_packet_in(&event)?;
        log::info!("{} -> {destination}: {decision:?}", cli.source);
    }

    drop(controller);
    transport_handle.await?;

    Ok(())
}
