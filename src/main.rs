use std::sync::Arc;

use clap::Parser;
use grainbooth::config::{redact, setup_logging};
use grainbooth::generate::ReplicateGenerator;
use grainbooth::imaging::compositor::Compositor;
use grainbooth::imaging::pipeline::Pipeline;
use grainbooth::imaging::retrieval::{ImageSource, Retriever};
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = grainbooth::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    info!(
        "Initializing Replicate with API token: {}",
        redact(&cli.replicate_api_token)
    );
    let client = reqwest::Client::new();
    let retriever = Retriever::new(client.clone());

    let grain_source = match ImageSource::parse(&cli.grain_texture) {
        Ok(source) => source,
        Err(err) => {
            error!("Invalid grain texture location: {}", err);
            return;
        }
    };
    // has to finish before the listener binds
    let grain = match Pipeline::load_grain(&retriever, &grain_source).await {
        Ok(grain) => grain,
        Err(err) => {
            error!(
                "Failed to load grain texture {}: {}",
                grain_source.describe(),
                err
            );
            return;
        }
    };
    info!(
        "Loaded grain texture {} ({}x{})",
        grain_source.describe(),
        grain.width(),
        grain.height()
    );

    let pipeline = Pipeline::new(retriever, Compositor::new(grain, cli.grain_settings()));
    let generator = Arc::new(ReplicateGenerator::new(
        client,
        &cli.replicate_api_base,
        &cli.replicate_api_token,
    ));

    if let Err(err) = grainbooth::web::setup_server(
        &cli.listen_address,
        cli.port,
        generator,
        pipeline,
        cli.generation_options(),
    )
    .await
    {
        error!("Application error: {}", err);
    }
}
