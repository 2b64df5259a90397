use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use crate::cache::Cache;
use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::db;
use crate::engine::TractEngine;
use crate::facerec::Coordinator;
use crate::server::{AppState, create_app};

#[derive(Parser, Debug, Clone)]
pub struct ServeCommand {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// Directory holding detector.onnx and embedder.onnx
    #[arg(long, default_value = "models")]
    pub models: PathBuf,
    /// Recognition queue bound; a full queue suspends new submissions
    #[arg(long, default_value_t = 256)]
    pub recognize_queue: usize,
}

impl SubCommandExtend for ServeCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pool = db::init_db(&opts.db).await.context("error initializing database")?;
        let engine =
            TractEngine::open(&self.models).context("error initializing face recognizer")?;

        let cache = Arc::new(Cache::new());
        let coordinator =
            Coordinator::start(Box::new(engine), pool.clone(), cache.clone(), self.recognize_queue)?;
        let state = AppState::new(pool, cache, coordinator);
        let app = create_app(state);

        info!("server listening at http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}
