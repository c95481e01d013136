use clap::{Parser, Subcommand};
use futures::stream::{FuturesUnordered, StreamExt};
use loadpool::{
    background::{self, BackgroundTaskRunner},
    isolated::{self, IsolatedTaskRunner},
    worker,
};
use std::time::Instant;
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;


#[derive(Parser)]
#[command(author, version, about = "Concurrent load against a shared counter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive both pools and print the totals
    Demo {
        /// Increments per submission path
        #[arg(long, default_value_t = 100)]
        increments: usize,
        /// Jitter tasks sent to the process pool
        #[arg(long, default_value_t = 10)]
        jitters: usize,
    },
    /// Serve the process-pool protocol on stdin/stdout
    Worker,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Demo { increments: 100, jitters: 10 }) {
        Commands::Worker => {
            worker::serve_stdio()?;
            Ok(())
        }
        Commands::Demo { increments, jitters } => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_writer(std::io::stderr)
                .init();
            demo(increments, jitters)
        }
    }
}

fn demo(increments: usize, jitters: usize) -> Result<(), Box<dyn std::error::Error>> {
    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        let now = Instant::now();
        let background = BackgroundTaskRunner::new(background::Config::default());
        for _ in 0..increments {
            background.increment_synchronously(1)?;
            background.increment_in_background_thread(1);
            background.increment_in_pool(1);
        }
        background.wait_idle().await;
        let metrics = background.metrics();
        tracing::info!(
            total = background.value()?,
            completed = metrics.completed_tasks,
            failed = metrics.failed_tasks,
            "increments finished"
        );
        background.shutdown().await;

        let isolated = IsolatedTaskRunner::new(isolated::Config::default())?;
        let mut pending: FuturesUnordered<_> = (0..jitters).map(|_| isolated.submit_jitter()).collect();
        let mut longest = std::time::Duration::ZERO;
        while let Some(res) = pending.next().await {
            longest = longest.max(res?);
        }
        tracing::info!(?longest, launched = isolated.metrics().processes_launched, "jitter tasks finished");
        isolated.shutdown().await;

        println!("counter: {} elapsed: {:?}", background.value()?, now.elapsed());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
