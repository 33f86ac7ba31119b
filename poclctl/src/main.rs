use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = poclctl::Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    if let Err(err) = poclctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
