pub mod config;
pub mod database_ops;
pub mod logging;
pub mod normalization;
pub mod orchestrator;
pub mod top5;

pub mod util {
    pub mod env;
}
