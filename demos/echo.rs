//! Echo worker - serves requests on every inherited channel.
//!
//! This example demonstrates:
//! - Reading the startup configuration from the environment
//! - One session per worker thread, each on its own current-thread runtime
//! - Replying with info and body, and forwarding a call elsewhere
//!
//! # Running under a supervisor
//!
//! The supervisor starts the binary with `SERVLINK_PROTOCOL`,
//! `SERVLINK_BUFFER_SIZE` and `SERVLINK_THREAD_COUNT` set, and one connected
//! socket per thread starting at descriptor 3:
//!
//! ```text
//! SERVLINK_PROTOCOL=tcp SERVLINK_BUFFER_SIZE=65536 SERVLINK_THREAD_COUNT=2 \
//!     ./target/debug/examples/echo
//! ```

use std::thread;

use servlink::{Config, Outcome, Session};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("servlink=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;

    let workers: Vec<_> = (0..config.thread_count)
        .map(|index| {
            let config = config.clone();
            thread::spawn(move || run_worker(config, index))
        })
        .collect();

    for (index, worker) in workers.into_iter().enumerate() {
        match worker.join() {
            Ok(Ok(())) => tracing::info!(thread = index, "channel closed"),
            Ok(Err(e)) => tracing::error!(thread = index, "worker failed: {}", e),
            Err(_) => tracing::error!(thread = index, "worker panicked"),
        }
    }

    Ok(())
}

fn run_worker(config: Config, thread_index: u32) -> servlink::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        // SAFETY: the supervisor opens one channel per thread at 3 + index,
        // and each index is opened exactly once.
        let mut session = unsafe { Session::open(&config, thread_index) }.await?;

        session
            .subscribe("echo/post", |_session, request| {
                Box::pin(async move {
                    let info = request.info_key_values();
                    tracing::debug!(name = %request.name, keys = info.len(), "echo");
                    Ok(Outcome::reply((request.request_info, request.request)))
                })
            })
            .await?;

        session
            .subscribe("echo/redirect", |session, request| {
                let target = format!("{}echo/post", session.prefix());
                Box::pin(async move { Ok(Outcome::forward(target, &request)) })
            })
            .await?;

        while session.poll().await?.is_some() {}
        Ok(())
    })
}
