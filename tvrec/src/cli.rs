use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "tvrec",
    version,
    about = "Record live TV locally with ffmpeg or remotely on a TVHeadend DVR"
)]
pub struct Args {
    /// Configuration file (defaults to <config dir>/tvrec/config.toml)
    #[arg(short, long, global = true, env = "TVREC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture a channel to a local file until Ctrl-C
    Record {
        /// Channel display name
        channel: String,

        /// Backend channel uuid (TVHeadend sources)
        #[arg(long)]
        id: Option<String>,

        /// Direct stream URI, bypassing the playlist lookup
        #[arg(long)]
        uri: Option<String>,

        /// Output file; the extension selects the container
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Streaming profile to request from the backend
        #[arg(long)]
        profile: Option<String>,
    },

    /// Schedule a recording on the backend DVR, starting now
    Schedule {
        /// Channel display name
        channel: String,

        /// Backend channel uuid
        #[arg(long)]
        id: String,

        /// Recording length in minutes
        #[arg(short, long, default_value_t = 60)]
        minutes: u32,

        /// Entry title (defaults to "Manual Recording - <channel>")
        #[arg(long)]
        title: Option<String>,
    },

    /// Stop a backend recording
    Stop {
        /// Backend entry uuid
        #[arg(long, conflicts_with = "channel", required_unless_present = "channel")]
        id: Option<String>,

        /// Stop whatever the backend is recording on this channel
        #[arg(long)]
        channel: Option<String>,
    },

    /// Show the backend DVR status
    Entries,

    /// List channels of the configured M3U playlist
    Channels,

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long, conflicts_with = "show")]
        reset: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn stop_needs_a_target() {
        assert!(Args::try_parse_from(["tvrec", "stop"]).is_err());

        let args = Args::try_parse_from(["tvrec", "stop", "--channel", "News1"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Stop { id: None, channel: Some(ref c) } if c == "News1"
        ));
    }
}
