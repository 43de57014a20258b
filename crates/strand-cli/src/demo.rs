//! Simulated request: one root coroutine fanning out shard queries.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strand_runtime::{
    current, BoxError, CoroutineError, CoroutineManager, CoroutineStats, Rebind, Resource,
    ResourceError,
};
use strand_types::CoroutineId;
use tracing::{debug, info};

/// Shape of one demo run.
#[derive(Debug, Clone, Copy)]
pub struct DemoOptions {
    pub fan_out: usize,
    pub delay: Duration,
    /// Shard whose query fails on purpose.
    pub fail_at: Option<usize>,
}

/// Connection handed to each shard query.
struct SimulatedConnection {
    shard: usize,
    open: AtomicBool,
}

impl SimulatedConnection {
    fn open(shard: usize) -> Arc<Self> {
        Arc::new(Self {
            shard,
            open: AtomicBool::new(true),
        })
    }
}

impl Resource for SimulatedConnection {
    fn force_release(&self) -> Result<(), ResourceError> {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!(shard = self.shard, "Connection returned to pool");
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "simulated-connection"
    }
}

/// Result of one shard query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRow {
    pub shard: usize,
    pub coroutine: CoroutineId,
    pub rows: u64,
    /// Receiving coroutine, filled in when the row crosses the channel.
    pub delivered_to: Option<CoroutineId>,
    #[serde(skip)]
    pub backtrace: Option<String>,
}

impl Rebind for QueryRow {
    fn release(&mut self, _from: CoroutineId) {
        self.delivered_to = None;
    }

    fn rebind(&mut self, new_owner: CoroutineId) {
        self.delivered_to = Some(new_owner);
    }
}

/// Everything the CLI prints.
#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub request: String,
    pub root: CoroutineId,
    pub rows: Vec<QueryRow>,
    pub stats: CoroutineStats,
}

/// Runs one root coroutine that queries `fan_out` shards in parallel.
///
/// Later shards finish first; the rows still come back in shard order.
pub async fn run(
    manager: &CoroutineManager,
    request: &str,
    options: DemoOptions,
) -> Result<DemoReport, CoroutineError> {
    let worker = manager.clone();
    let request_path = request.to_string();

    let (root, rows) = manager
        .init(request_path.clone(), async move {
            let root = current()?.id();
            info!(request = %request_path, fan_out = options.fan_out, "Request started");

            let queries = (0..options.fan_out).map(|shard| {
                let shard_worker = worker.clone();
                query_shard(shard_worker, shard, options)
            });
            let rows = worker.execute_multi(queries).await?;
            Ok::<_, CoroutineError>((root, rows))
        })
        .await?;

    Ok(DemoReport {
        request: request.to_string(),
        root,
        rows,
        stats: manager.stats(),
    })
}

async fn query_shard(
    manager: CoroutineManager,
    shard: usize,
    options: DemoOptions,
) -> Result<QueryRow, BoxError> {
    let ctx = current()?;
    ctx.assign_connection(SimulatedConnection::open(shard))?;

    let path = ctx.binding::<String>()?.unwrap_or_default();
    let remaining = options.fan_out.saturating_sub(shard) as u32;
    tokio::time::sleep(options.delay * remaining).await;

    if options.fail_at == Some(shard) {
        return Err(format!("shard {shard} rejected query for {path}").into());
    }

    let backtrace = match shard {
        0 => Some(manager.get_full_backtrace(ctx.id())?.to_string()),
        _ => None,
    };

    Ok(QueryRow {
        shard,
        coroutine: ctx.id(),
        rows: (path.len() * (shard + 1)) as u64,
        delivered_to: None,
        backtrace,
    })
}
