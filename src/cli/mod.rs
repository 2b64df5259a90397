mod import_images;
mod import_profiles;
mod serve;

pub use import_images::*;
pub use import_profiles::*;
pub use serve::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
