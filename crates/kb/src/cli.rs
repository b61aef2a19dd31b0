use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "kb",
    about = "Slack knowledge base: extract, classify and search team knowledge",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Filter an exported channel list down to channels with enough members.
    FilterChannels {
        #[arg(long, default_value = "channels.json")]
        input: PathBuf,
        #[arg(long, default_value = "filtered-channels.json")]
        output: PathBuf,
        #[arg(long, default_value_t = 2)]
        min_members: u32,
    },
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["kb"]).expect("parse");
        assert_eq!(cli.command(), &Command::Serve);
    }

    #[test]
    fn filter_channels_takes_paths_and_threshold() {
        let cli = Cli::try_parse_from([
            "kb",
            "filter-channels",
            "--input",
            "in.json",
            "--output",
            "out.json",
            "--min-members",
            "5",
        ])
        .expect("parse");
        assert_eq!(
            cli.command(),
            &Command::FilterChannels {
                input: PathBuf::from("in.json"),
                output: PathBuf::from("out.json"),
                min_members: 5,
            }
        );
    }

    #[test]
    fn rejects_non_numeric_threshold() {
        assert!(Cli::try_parse_from(["kb", "filter-channels", "--min-members", "many"]).is_err());
    }
}
