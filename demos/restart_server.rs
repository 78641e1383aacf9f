//! Random-failure workload under a handoff supervisor.
//!
//! Every five seconds the worker draws a number in `0..20`:
//! - `0`  → emits a fault; the supervisor forks a successor and hands off;
//! - `19` → signals done; the supervisor shuts down cleanly;
//! - anything else → keeps ticking.
//!
//! Try it:
//! ```text
//! cargo run --example restart_server
//! curl localhost:8008/hello        # answers with the serving pid
//! kill -HUP  <pid>                 # restart with handoff
//! kill -USR2 <pid>                 # restart, both generations keep serving
//! kill -INT  <pid>                 # graceful shutdown
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::broadcast;

use handoff::{Config, Fault, FaultHandle, Subordinate, Supervisor};

struct FlakyWorker {
    handle: FaultHandle,
    wait: Duration,
}

#[async_trait]
impl Subordinate for FlakyWorker {
    async fn initiate(&self) {
        tracing::info!("worker warming up");
    }

    async fn run(&self) {
        loop {
            let n: u32 = rand::thread_rng().gen_range(0..20);
            tracing::info!(n, "tick");
            match n {
                0 => {
                    self.handle.fault(Fault::new("n == 0"));
                    return;
                }
                19 => {
                    self.handle.done();
                    return;
                }
                _ => {}
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    fn faults(&self) -> broadcast::Receiver<Option<Fault>> {
        self.handle.subscribe_faults()
    }

    fn done(&self) -> broadcast::Receiver<bool> {
        self.handle.subscribe_done()
    }

    fn restart_delay(&self) -> Duration {
        self.wait
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = Config {
        address: "127.0.0.1:8008".into(),
        ..Config::default()
    };
    let supervisor = Supervisor::bind(cfg)?;
    let worker = Arc::new(FlakyWorker {
        handle: FaultHandle::new(8),
        wait: Duration::from_secs(15),
    });
    supervisor.run(worker).await?;
    tracing::info!("exiting");
    Ok(())
}
