//! Record command implementation

use anyhow::{Context, Result};
use prizeflow::prelude::*;
use std::path::PathBuf;

pub fn execute(data_dir: PathBuf, config: PrizeflowConfig, once: bool) -> Result<()> {
    let db = PrizeflowDb::open_with_config(&data_dir, config).context("Failed to open database")?;
    let recorder = db.recorder();

    if once {
        println!("Draining grant queue...");
        let mut handled = 0;
        loop {
            let n = recorder.drain_batch().context("Recorder failed")?;
            if n == 0 {
                break;
            }
            handled += n;
        }
        print_stats(handled, &recorder.stats());
        return Ok(());
    }

    println!("Recording continuously... (Press Ctrl+C to stop)");

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    runtime.block_on(async {
        let handle = recorder.shutdown_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, stopping recorder");
                handle.shutdown();
            }
        });

        recorder.run().await.context("Recorder failed")
    })?;

    let stats = recorder.stats();
    print_stats(stats.recorded as usize, &stats);
    Ok(())
}

fn print_stats(handled: usize, stats: &prizeflow::RecorderStatsSnapshot) {
    println!(
        "✓ Handled {} deliveries: {} recorded ({} duplicates), {} retried, {} dead-lettered",
        handled, stats.recorded, stats.duplicates, stats.retried, stats.dead_lettered
    );
}
