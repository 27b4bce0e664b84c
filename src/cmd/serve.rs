//! Record store server command — `shutterboard serve`.

use std::path::PathBuf;

use anyhow::Result;

use shutterboard::config::BoardConfig;
use shutterboard::server::{ServerConfig, start_server};

pub async fn cmd_serve(
    config: &BoardConfig,
    port: Option<u16>,
    db: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    let server = ServerConfig {
        port: port.unwrap_or(config.server.port),
        db_path: db.unwrap_or_else(|| config.server.db_path.clone()),
        code_prefix: config.server.code_prefix.clone(),
        dev_mode: dev,
    };
    start_server(server).await
}
