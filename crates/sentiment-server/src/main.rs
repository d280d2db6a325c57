use clap::Parser;

use sentiment_server::cli::ServerArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    let telemetry = sentiment_server::init_logging(&args.telemetry)?;
    sentiment_server::serve(args, telemetry).await
}
