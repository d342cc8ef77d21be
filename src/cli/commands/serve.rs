//! Serve command - run the protocol session on stdin/stdout

use crate::backend::create_backend;
use crate::config::Config;
use crate::error::CacheResult;
use crate::metrics::{LatencyTracker, Stats};
use crate::protocol::{CacheProg, READ_BUFFER_SIZE};
use console::style;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;

/// Execute the serve command
pub async fn execute(config: &Config) -> CacheResult<()> {
    let tracker = config
        .logging
        .stats
        .then(|| Arc::new(LatencyTracker::new()));
    let backend = create_backend(config, tracker.clone()).await?;
    info!(
        backend = backend.name(),
        cache_dir = %config.cache_dir().display(),
        "Serving cache protocol on stdin/stdout"
    );

    let reader = BufReader::with_capacity(READ_BUFFER_SIZE, tokio::io::stdin());
    let mut session = CacheProg::new(reader, tokio::io::stdout(), backend);
    if let Some(ref tracker) = tracker {
        session = session.with_tracker(Arc::clone(tracker));
    }

    let result = session.run().await;

    if let Some(tracker) = tracker {
        eprintln!("{}", format_stats(&tracker.all_stats()));
    }
    result
}

/// Render the end-of-session latency report
fn format_stats(stats: &[Stats]) -> String {
    let mut out = style("Latency stats:").bold().to_string();
    if stats.is_empty() {
        out.push_str("\n  no operations recorded");
    }
    for entry in stats {
        out.push('\n');
        out.push_str(&entry.to_string());
    }
    out
}
