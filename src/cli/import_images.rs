use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::engine::TractEngine;
use crate::{db, import};

#[derive(Parser, Debug, Clone)]
pub struct ImportImagesCommand {
    /// Directory tree of reference images, laid out as band/idol/file
    pub path: PathBuf,
    /// Directory holding detector.onnx and embedder.onnx
    #[arg(long, default_value = "models")]
    pub models: PathBuf,
    /// Only import the named bands
    #[arg(short, long = "band")]
    pub bands: Vec<String>,
}

impl SubCommandExtend for ImportImagesCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pool = db::init_db(&opts.db).await.context("error initializing database")?;
        let engine =
            TractEngine::open(&self.models).context("error initializing face recognizer")?;

        import::import_images(&pool, &engine, &self.path, &self.bands).await?;
        info!("import finished, {} faces total", db::count_faces(&pool).await?);
        Ok(())
    }
}
