//! Loopback demo: two connections over an in-memory transport.
//!
//! The left side speaks the current protocol, the right side announces the
//! version given on the command line. Packets injected into the left
//! interface are expected to come out of the right one.

mod cli;

use std::{error::Error, time::Duration};

use clap::Parser;
use wsvpn::{
    Connection,
    ConnectionConfig,
    Feature,
    ProtocolVersion,
    adapter::memory,
    iface::memory::MemoryInterface,
};

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let fragmentation = !cli.no_fragmentation;

    let (left_adapter, right_adapter) = memory::pair(Some(cli.max_message_size));
    let (left_iface, left_tap) = MemoryInterface::with_tap();
    let (right_iface, mut right_tap) = MemoryInterface::with_tap();

    let left = Connection::builder(left_adapter)
        .interface(left_iface, true)
        .local_feature(Feature::FRAGMENTATION, fragmentation)
        .build();
    let right = Connection::builder(right_adapter)
        .interface(right_iface, true)
        .local_feature(Feature::FRAGMENTATION, fragmentation)
        .config(
            ConnectionConfig::default()
                .with_protocol_version(ProtocolVersion::new(cli.peer_protocol)),
        )
        .build();

    left.serve().await?;
    right.serve().await?;
    tokio::time::timeout(STEP_TIMEOUT, async {
        tokio::join!(left.wait_ready(), right.wait_ready());
    })
    .await?;
    tracing::info!(policy = ?left.link_policy(), "link established");

    let mut delivered = 0_usize;
    for n in 0..cli.packets {
        #[expect(clippy::cast_possible_truncation, reason = "filler pattern wraps")]
        let packet: Vec<u8> = (0..cli.packet_size).map(|i| (i + n) as u8).collect();
        left_tap.inject(packet.clone());
        match tokio::time::timeout(STEP_TIMEOUT, right_tap.recv()).await {
            Ok(Some(received)) if received.as_ref() == packet.as_slice() => delivered += 1,
            Ok(Some(received)) => {
                tracing::warn!(packet = n, len = received.len(), "packet corrupted");
            }
            Ok(None) | Err(_) => tracing::warn!(packet = n, "packet lost"),
        }
    }

    left.close().await;
    right.close().await;
    left.wait().await;
    right.wait().await;

    println!("delivered {delivered}/{} packets", cli.packets);
    Ok(())
}
