use clap::Parser;
use idolrec::cli::SubCommandExtend;
use idolrec::config::{Opts, SubCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::Serve(cmd) => cmd.run(&opts).await,
        SubCommand::ImportImages(cmd) => cmd.run(&opts).await,
        SubCommand::ImportProfiles(cmd) => cmd.run(&opts).await,
    }
}
