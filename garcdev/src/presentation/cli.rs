use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "garcdev: game archive inspector", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Default)]
pub struct SchemeArgs {
    /// CBOR scheme catalog with game titles and index layouts
    #[arg(long)]
    pub schemes: Option<PathBuf>,

    /// Ask on stdin for a scheme title when the game cannot be identified
    #[arg(long)]
    pub ask: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the registered archive and image formats
    Formats,

    /// List archive contents, ordered by offset
    List {
        archive: PathBuf,

        #[command(flatten)]
        schemes: SchemeArgs,
    },

    /// Extract an archive, or every archive under a directory
    Extract {
        input: PathBuf,
        dest: PathBuf,

        /// Descend into subdirectories when `input` is a directory
        #[arg(long)]
        recursive: bool,

        #[command(flatten)]
        schemes: SchemeArgs,
    },

    /// Decode a standalone image or an archive entry and write it out
    Image {
        input: PathBuf,
        out: PathBuf,

        /// Entry name inside the archive
        #[arg(long)]
        entry: Option<String>,

        #[command(flatten)]
        schemes: SchemeArgs,
    },
}
