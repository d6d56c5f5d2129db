use std::process;

use assetstore::{cli, factory};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, span, Instrument, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let span = span!(Level::INFO, "main", context = "main");

    let code = async {
        info!("called");

        let matches = cli::command().get_matches();
        let (config, action) = match cli::parse(&matches) {
            Err(err) => {
                error!(error_message=%err, error_group="parse_args");
                return 2;
            }
            Ok(parsed) => parsed,
        };

        let store = match factory::create_store(&config) {
            Err(err) => {
                error!(error_message=%err, error_group="create_store");
                return 2;
            }
            Ok(store) => store,
        };

        let ct = CancellationToken::new();
        let on_signal = ct.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });

        if let Err(err) = store.initialize(&ct).await {
            error!(error_message=%err, error_group="initialize");
            return 1;
        }

        match cli::run(store.as_ref(), action, &ct).await {
            Err(err) => {
                error!(error_message=%err, error_kind=?err.kind(), error_group="run");
                1
            }
            Ok(_) => 0,
        }
    }
    .instrument(span)
    .await;

    process::exit(code);
}
