pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use garc_core::error::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Formats => handlers::handle_formats(),
        Commands::List { archive, schemes } => handlers::handle_list(archive, schemes),
        Commands::Extract {
            input,
            dest,
            recursive,
            schemes,
        } => handlers::handle_extract(input, dest, recursive, schemes),
        Commands::Image {
            input,
            out,
            entry,
            schemes,
        } => handlers::handle_image(input, out, entry, schemes),
    }
}
