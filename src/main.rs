use crate::cli::run;

pub mod cli;
mod config;
pub mod device;
pub mod domain;
pub mod playlist;
pub mod reconcile;
pub mod storage;
pub mod sync;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run()
}
