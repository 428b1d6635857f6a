//! Replays a JSON-lines file of orders onto a topic.
//!
//! The aggregate has no persistence; after a restart it is rebuilt by
//! replaying retained history. This reads that history from a file, one
//! `{"orderId": .., "product": .., "price": ..}` object per line. A line
//! without `orderId` gets a generated id.

use std::path::Path;

use orderflow_core::Order;
use tracing::{info, warn};

use super::OutboundRecord;
use crate::traits::EventBroker;

/// Counts from a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub published: usize,
    pub skipped: usize,
}

/// Publishes every order in the file at `path` to `topic`.
///
/// Blank lines are ignored. Lines that do not parse as an order are logged
/// and counted as skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a publish fails.
pub async fn replay_json_lines(
    broker: &dyn EventBroker,
    topic: &str,
    path: &Path,
) -> anyhow::Result<ReplayReport> {
    let contents = tokio::fs::read_to_string(path).await?;
    let mut report = ReplayReport::default();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Order>(line) {
            Ok(order) => {
                broker.publish(topic, OutboundRecord::for_order(order)).await?;
                report.published += 1;
            }
            Err(err) => {
                warn!(line = index + 1, error = %err, "skipping unparseable order line");
                report.skipped += 1;
            }
        }
    }

    info!(
        path = %path.display(),
        topic,
        published = report.published,
        skipped = report.skipped,
        "replay complete"
    );
    Ok(report)
}
