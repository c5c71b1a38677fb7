use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Semantic vacancy matching service", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct BoundsArgs {
    /// Candidates taken from the vector index (1..=2000)
    #[clap(long)]
    pub k_faiss: Option<usize>,

    /// Survivors of the title round (1..=200)
    #[clap(long)]
    pub k_stage1: Option<usize>,

    /// Final results (1..=100)
    #[clap(long)]
    pub k_stage2: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the vector index, then serve the HTTP API.
    Serve {
        /// Overrides server.host
        #[clap(long)]
        host: Option<String>,

        /// Overrides server.port and PORT
        #[clap(short, long)]
        port: Option<u16>,
    },

    /// Run one match and print the JSON response.
    Match {
        /// Resume text
        #[clap(short, long, conflicts_with = "resume_file", required_unless_present = "resume_file")]
        resume: Option<String>,

        /// Read the resume from a file ("-" for stdin)
        #[clap(short = 'f', long)]
        resume_file: Option<PathBuf>,

        #[command(flatten)]
        bounds: BoundsArgs,
    },

    /// Build the vector index and print its statistics.
    IndexStats {},
}
