//! CPU load generator for exercising the autoscaler.
//!
//! Each worker thread spins on a floating-point product until killed (or
//! until `rounds` is reached). Run it inside the guest to push idle time
//! below the low threshold.

use std::hint::black_box;
use std::thread;

use tracing::{debug, info};

/// One round of busy work: the running product of `(i - 1) / i`.
pub fn burn_round() -> f64 {
    let mut result = 1.0_f64;
    for i in 200..2_000_000_u32 {
        result *= f64::from(i - 1) / f64::from(i);
    }
    black_box(result)
}

/// Spin `threads` workers. `rounds = None` runs forever.
pub fn run(threads: usize, rounds: Option<u64>) -> anyhow::Result<()> {
    let threads = threads.max(1);
    info!(threads, ?rounds, "load generator started");

    let handles: Vec<_> = (0..threads)
        .map(|worker| {
            thread::Builder::new()
                .name(format!("vscale-load-{worker}"))
                .spawn(move || {
                    let mut done = 0_u64;
                    while rounds.is_none_or(|limit| done < limit) {
                        let result = burn_round();
                        done += 1;
                        debug!(worker, round = done, result, "load round");
                    }
                })
        })
        .collect::<Result<_, _>>()?;

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("load worker panicked"))?;
    }
    Ok(())
}
