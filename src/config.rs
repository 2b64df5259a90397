use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::{ImportImagesCommand, ImportProfilesCommand, ServeCommand};

#[derive(Parser, Debug)]
#[command(name = "idolrec", version, about)]
pub struct Opts {
    /// Sqlite database file
    #[arg(short, long, global = true, default_value = "idolrec.db")]
    pub db: PathBuf,

    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Start the recognition and profiles API server
    Serve(ServeCommand),
    /// Import reference images into the training data
    ImportImages(ImportImagesCommand),
    /// Import profiles from a directory of JSON files
    ImportProfiles(ImportProfilesCommand),
}
