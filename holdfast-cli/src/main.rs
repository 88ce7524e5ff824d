mod handlers;
mod server;

use clap::{Parser, Subcommand};

use holdfast_core::client::ClientConfig;
use holdfast_core::gate::RetentionGate;
use holdfast_core::infrastructure::now_ms;
use holdfast_core::optimistic::RetryPolicy;

use crate::handlers::{GateRequest, GateResponse};
use crate::server::ServeOptions;

#[derive(Parser)]
#[command(
    name = "holdfast",
    about = "Holdfast: retention policies and holds for immutable object storage",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Holdfast HTTP service
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3100")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Storage backend: "memory" or "sqlite:<path>"
        #[arg(long, default_value = "memory", env = "HOLDFAST_STORAGE")]
        storage: String,

        /// Attempts per mutation when a precondition race is lost
        #[arg(long, default_value = "1", env = "HOLDFAST_MAX_ATTEMPTS")]
        max_attempts: u32,

        /// Per store call timeout in milliseconds
        #[arg(long, env = "HOLDFAST_CALL_TIMEOUT_MS")]
        call_timeout_ms: Option<u64>,

        /// Requests handled concurrently before new ones queue
        #[arg(long, default_value = "256", env = "HOLDFAST_MAX_IN_FLIGHT")]
        max_in_flight: usize,
    },

    /// Evaluate the retention gate on a JSON snapshot (stdin)
    Check,

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            storage,
            max_attempts,
            call_timeout_ms,
            max_in_flight,
        } => {
            let options = ServeOptions {
                host,
                port,
                storage,
                config: ClientConfig {
                    retry: RetryPolicy::attempts(max_attempts),
                    call_timeout_ms,
                },
                max_in_flight,
            };
            if let Err(e) = server::run(options).await {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Check => {
            eprintln!("Reading gate snapshot from stdin...");
            match check(std::io::stdin()) {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Version => {
            println!("holdfast {}", env!("CARGO_PKG_VERSION"));
            println!("Retention and hold lifecycle kernel for object storage");
        }
    }
}

fn check(mut input: impl std::io::Read) -> Result<String, String> {
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .map_err(|e| format!("Failed to read stdin: {}", e))?;

    let req: GateRequest =
        serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON snapshot: {}", e))?;
    let now = req.now_ms.unwrap_or_else(now_ms);

    let response = GateResponse {
        now_ms: now,
        decision: RetentionGate::can_delete(&req.object, req.policy.as_ref(), now),
        retention_expiry_ms: RetentionGate::retention_expiry(&req.object, req.policy.as_ref()),
    };
    serde_json::to_string_pretty(&response).map_err(|e| e.to_string())
}
