use super::BoardSession;
use crate::error::{BoardError, Result};
use crate::feed::{pump_feed, WsFeed};

/// Handle `kb watch`: redraw the board on every committed change until
/// Ctrl-C or the server closes the feed.
pub async fn handle_watch(session: &BoardSession, format: &str) -> Result<()> {
    let reconciler = session.reconciler.clone();
    reconciler.subscribe(&session.project_id).await;

    let feed = WsFeed::new(
        &session.config.server_url,
        &session.project_id,
        session.config.user_id.clone(),
    );
    tracing::info!(url = feed.url(), "Watching project");
    let (mut feed_task, rx) = feed.spawn();
    let pump = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { pump_feed(&reconciler, rx).await })
    };

    let mut changes = reconciler.changes();
    session.print(format).await?;

    let outcome = loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                session.print(format).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, leaving watch");
                break Ok(());
            }
            joined = &mut feed_task => {
                break match joined {
                    Ok(result) => result,
                    Err(e) => Err(BoardError::Feed(e.to_string())),
                };
            }
        }
    };

    reconciler.unsubscribe().await;
    pump.abort();
    outcome
}
