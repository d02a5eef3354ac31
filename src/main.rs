use std::env;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let raw_args: Vec<String> = env::args().collect();
    let command = raw_args.get(1).cloned();
    match command.as_deref() {
        Some("serve") => {
            let port = raw_args
                .get(2)
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            if let Err(e) = loanwise::api::run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Some("sweep") => {
            let args: Vec<String> = std::iter::once(raw_args[0].clone())
                .chain(raw_args[2..].iter().cloned())
                .collect();
            let result = tokio::task::spawn_blocking(move || loanwise::api::run_sweep_cli(args))
                .await
                .unwrap_or_else(|e| Err(format!("Sweep task failed: {e}")));
            print_or_exit(result);
        }
        _ => {
            let result =
                tokio::task::spawn_blocking(move || loanwise::api::run_simulate_cli(raw_args))
                    .await
                    .unwrap_or_else(|e| Err(format!("Simulation task failed: {e}")));
            print_or_exit(result);
        }
    }
}

fn print_or_exit(result: Result<String, String>) {
    match result {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
