use api_server::standalone;
use std::env;

const DEFAULT_CONFIG_PATH: &str = "config.ini";

#[tokio::main]
async fn main() {
    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var("CAPTION_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    if let Err(e) = standalone::start_server(config_path).await {
        eprintln!("Error starting standalone server: {:?}", e);
        std::process::exit(1);
    }
}
