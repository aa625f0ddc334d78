use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;
mod commands;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = args::Cli::parse();
    if let Err(e) = commands::dispatch(cli).await {
        eprintln!("fatal: {e:?}");
        std::process::exit(1);
    }
}
