//! Command line interface for the loopback demo binary.
//!
//! Kept free of crate dependencies so `build.rs` can render the man page.

use clap::Parser;

/// Run two tunnel endpoints against each other in memory and push packets
/// through them.
#[derive(Debug, Parser)]
#[command(name = "wsvpn", version, about = "Loopback demo of the wsvpn protocol engine")]
pub struct Cli {
    /// Protocol version announced by the emulated peer.
    #[arg(long, default_value_t = 12)]
    pub peer_protocol: u32,
    /// Largest message the in-memory transport accepts, in bytes.
    #[arg(long, default_value_t = 1400)]
    pub max_message_size: usize,
    /// Do not offer fragmentation on either side.
    #[arg(long)]
    pub no_fragmentation: bool,
    /// Number of packets to send.
    #[arg(short = 'n', long, default_value_t = 10)]
    pub packets: usize,
    /// Size of each packet, in bytes.
    #[arg(short = 's', long, default_value_t = 1800)]
    pub packet_size: usize,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn defaults_emulate_current_peer() {
        let cli = Cli::parse_from(["wsvpn"]);
        assert_eq!(cli.peer_protocol, 12);
        assert_eq!(cli.max_message_size, 1400);
        assert!(!cli.no_fragmentation);
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::parse_from([
            "wsvpn",
            "--peer-protocol",
            "10",
            "--no-fragmentation",
            "-n",
            "3",
            "-s",
            "64",
        ]);
        assert_eq!(cli.peer_protocol, 10);
        assert!(cli.no_fragmentation);
        assert_eq!(cli.packets, 3);
        assert_eq!(cli.packet_size, 64);
    }
}
