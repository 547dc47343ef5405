use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use taskctx_core::config::{ConfigError, SchedulerConfig};
use taskctx_core::impls::ThreadPoolScheduler;
use taskctx_core::{
    BatchReport, BoxError, Cancelled, Flow, ForAll, TaskFactory, TaskHandle, TaskOptions,
};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,taskctx_core=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// 設定ファイルは任意（第 1 引数）。環境変数が最後に上書きする
fn load_config() -> Result<SchedulerConfig, ConfigError> {
    let config = match std::env::args().nth(1) {
        Some(path) => SchedulerConfig::from_json_file(path)?,
        None => SchedulerConfig::default(),
    };
    config.with_env_overrides()
}

fn main() -> ExitCode {
    init_tracing();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid scheduler config");
            return ExitCode::FAILURE;
        }
    };

    // (A) 既定 scheduler は起動時に 1 回だけ作り、factory に渡す
    let pool = match ThreadPoolScheduler::new(&config) {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            tracing::error!(error = %e, "failed to start thread pool");
            return ExitCode::FAILURE;
        }
    };
    let factory = TaskFactory::new(pool.clone());

    let outcome = pool.block_on(run_demo(&factory));

    // runtime の停止は async context の外で行う
    pool.shutdown(Duration::from_secs(1));

    match outcome {
        Ok(summary) => {
            println!("{summary:#}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "demo failed");
            ExitCode::FAILURE
        }
    }
}

/// 数値として読めない record は集めて、残りを合計する
fn sum_records(records: Vec<&str>) -> (BatchReport<String>, u64) {
    let mut total = 0u64;
    let report = ForAll::new(records)
        .with_state(|raw: &&str, index: usize| format!("record #{index} ({raw})"))
        .run_report(|ctx| {
            let value: u64 = ctx
                .item()
                .parse()
                .map_err(|e| format!("{}: {e}", ctx.state()))?;
            total += value;
            Ok::<_, String>(Flow::Continue)
        });
    (report, total)
}

async fn run_demo(factory: &TaskFactory) -> Result<Value, BoxError> {
    // (B) 結果を返す task。state は callback が読んだ時点で作られる
    let state_builds = Arc::new(AtomicUsize::new(0));
    let builds = Arc::clone(&state_builds);
    let sum_task = factory.submit_with_state(
        move |task: &TaskHandle| {
            builds.fetch_add(1, Ordering::SeqCst);
            tracing::info!(task_id = %task.id(), "building sum input");
            (1..=10u64).collect::<Vec<_>>()
        },
        TaskOptions::new().name("sum"),
        |ctx| async move { Ok::<_, BoxError>(ctx.state_cached().iter().sum::<u64>()) },
    )?;
    let sum_id = sum_task.id();
    let sum = sum_task.result().await?;
    tracing::info!(task_id = %sum_id, sum, "sum task finished");

    // (C) 取消を poll する task
    let poller = factory.submit_with_state(
        |_task: &TaskHandle| (),
        TaskOptions::new().name("poller"),
        |ctx| async move {
            let mut ticks = 0u64;
            while !ctx.is_cancellation_requested() {
                ticks += 1;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tracing::info!(ticks, "poller observed cancellation");
            Err::<u64, BoxError>(Cancelled.into())
        },
    )?;
    let poller_id = poller.id();
    tokio::time::sleep(Duration::from_millis(50)).await;
    poller.cancel();
    let poller_state = poller.wait().await;
    let poller_result = poller.result().await;
    tracing::info!(state = ?poller_state, cancelled = poller_result.is_err(), "poller stopped");

    // (D) blocking callback
    let checksum_task = factory.submit_blocking(|ctx| {
        ctx.check_cancelled()?;
        let checksum = b"taskctx"
            .iter()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(*b)));
        Ok::<_, BoxError>(checksum)
    })?;
    let checksum = checksum_task.result().await?;

    // (E) 一括走査。失敗した item があっても最後まで進む
    let (report, total) = sum_records(vec!["42", "7", "oops", "13"]);

    let failed_indices = match &report.failures {
        Some(failures) => {
            for failure in failures.errors() {
                tracing::warn!(%failure, "batch item failed");
            }
            failures.failed_indices()
        }
        None => Vec::new(),
    };

    Ok(json!({
        "sum": {
            "task_id": sum_id.to_string(),
            "value": sum,
            "state_builds": state_builds.load(Ordering::SeqCst),
        },
        "poller": {
            "task_id": poller_id.to_string(),
            "state": poller_state,
        },
        "checksum": checksum,
        "batch": {
            "walk_id": report.walk_id.to_string(),
            "processed": report.processed,
            "end": report.end,
            "failed_indices": failed_indices,
            "total": total,
        },
    }))
}
