#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = memeforge::run().await {
        log::error!("error while running memeforge: {}", e);
        std::process::exit(1);
    }
}
