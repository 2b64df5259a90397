use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::cache::Cache;
use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::{db, profiles};

#[derive(Parser, Debug, Clone)]
pub struct ImportProfilesCommand {
    /// Directory of profile JSON files, laid out as band/index.json plus
    /// one file per idol
    pub path: PathBuf,
}

impl SubCommandExtend for ImportProfilesCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pool = db::init_db(&opts.db).await.context("error initializing database")?;
        let parsed = profiles::read_profiles(&self.path).context("error reading profiles")?;
        profiles::update_profiles(&pool, &Cache::new(), &parsed)
            .await
            .context("error updating profiles")?;
        Ok(())
    }
}
