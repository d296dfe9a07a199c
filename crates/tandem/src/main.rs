use std::process;

use tandem::cli::{build_cli, handlers};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout stays machine-readable JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();

    if let Err(err) = handlers::dispatch(&matches).await {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Error: {err:#}");
        }

        let core = err.downcast_ref::<tandem_core::Error>();

        // Conflicting holders stay machine-readable for the caller
        if let Some(conflicts) = core.and_then(tandem_core::Error::conflicts) {
            if let Ok(json) = serde_json::to_string_pretty(conflicts) {
                println!("{json}");
            }
        }

        let code = core.map_or(1, tandem_core::Error::exit_code);

        #[allow(clippy::exit)]
        process::exit(code);
    }
}
