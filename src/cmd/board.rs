//! One-shot board view command — `shutterboard board`.
//!
//! Runs a full client sync cycle against a running server (including the
//! auto-expiry sweep) and prints the resulting columns.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};

use shutterboard::board::sync::BoardSession;
use shutterboard::board::{BoardCommand, BoardEvent};
use shutterboard::client::{HttpStore, RecordStore};
use shutterboard::config::BoardConfig;
use shutterboard::models::{Record, Status};

pub async fn cmd_board(config: &BoardConfig, url: Option<&str>, query: &str) -> Result<()> {
    let base = url.unwrap_or(&config.client.base_url);
    let store: Arc<dyn RecordStore> = Arc::new(HttpStore::new(base));
    let mut session =
        BoardSession::with_debounce(store, Duration::from_millis(config.client.debounce_ms));
    session.ctx.query = query.to_string();

    let events = session.handle(BoardCommand::Refresh).await;
    match events.first() {
        Some(BoardEvent::SyncCompleted { total, lapsed }) => {
            for status in Status::ALL {
                let column = session.ctx.columns.column(status);
                println!("{} ({})", status, column.len());
                for record in column {
                    println!("  {}", card_line(record));
                }
            }
            println!("\n{} records", total);
            if *lapsed > 0 {
                println!(
                    "{} lapsed record(s) moved to LOST; re-run to see them in place",
                    lapsed
                );
            }
            Ok(())
        }
        Some(BoardEvent::SyncFailed { reason }) => bail!("Sync failed: {}", reason),
        other => bail!("Unexpected sync outcome: {:?}", other),
    }
}

fn card_line(record: &Record) -> String {
    let code = record.project_code.as_deref().unwrap_or("-");
    let schedule = match record.start_date {
        Some(start) => format!(
            "{} {} -> {} {}",
            start,
            record.start_session,
            record
                .end_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| start.to_string()),
            record.end_session
        ),
        None => "unscheduled".to_string(),
    };
    format!("{}  {}  {:.0}  {}", code, record.name, record.amount, schedule)
}
