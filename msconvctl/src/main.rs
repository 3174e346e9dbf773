use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = msconvctl::Cli::parse();
    msconvctl::init_tracing(cli.verbose);
    if let Err(err) = msconvctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
