//! `orderflow` binary: consumes orders, aggregates prices, serves stats.

use clap::Parser;
use orderflow_server::broker::replay_json_lines;
use orderflow_server::observability::{init_tracing, install_metrics_exporter};
use orderflow_server::{OrderflowApp, ServerConfig, StatsReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_tracing(config.log_format);
    config.validate()?;

    if let Some(addr) = config.metrics_addr {
        install_metrics_exporter(addr)?;
    }

    info!(
        node_id = %config.node_id,
        orders_topic = %config.orders_topic,
        dead_letter_topic = %config.dead_letter_topic,
        avg_prices_topic = %config.avg_prices_topic,
        partitions = config.partitions,
        max_attempts = config.max_attempts,
        "starting orderflow"
    );

    let app = OrderflowApp::build(config.clone())?;
    let consumers = app.start_consumers()?;

    let mut network = app.network_module();
    let port = network.start().await?;
    info!(port, "HTTP read side listening");

    if let Some(path) = config.replay.clone() {
        let broker = app.broker();
        let topic = config.orders_topic.clone();
        tokio::spawn(async move {
            if let Err(e) = replay_json_lines(broker.as_ref(), &topic, &path).await {
                error!(path = %path.display(), error = %e, "replay failed");
            }
        });
    }

    let controller = app.shutdown_controller();
    let on_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C; shutting down");
        }
        info!("shutdown signal received");
        controller.trigger_shutdown();
    };

    network.serve(on_signal).await?;

    for summary in consumers.join().await? {
        info!(
            partition = summary.partition,
            succeeded = summary.succeeded,
            retried = summary.retried,
            dead_lettered = summary.dead_lettered,
            abandoned = summary.abandoned,
            "partition summary"
        );
    }

    let stats = app.aggregator().stats();
    info!(
        total_orders = stats.total_orders,
        total_value = %stats.total_value,
        running_average_price = %stats.running_average_price,
        "orderflow stopped"
    );
    Ok(())
}
