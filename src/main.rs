use std::env;
use std::error::Error;
use std::process;

use payline::run;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run_app().await {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

async fn run_app() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        return Err("Usage: cargo run -- operations.csv".into());
    }

    run(args[1].clone(), std::io::stdout()).await
}
