use clap::Parser;
use client::network::{run_load_test, LoadConfig};
use log::info;
use shared::{RunReport, DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT))]
    server: String,

    /// Number of concurrent client connections
    #[arg(short = 'c', long, default_value = "50")]
    clients: u32,

    /// Messages to send per connection
    #[arg(short = 'm', long, default_value = "1")]
    messages: u32,

    /// Message text (each client appends its own id)
    #[arg(long, default_value = "Hello server")]
    message: String,

    /// Seconds to wait for each echo response
    #[arg(short = 't', long, default_value = "5")]
    timeout: u64,

    /// Maximum random start delay per client in milliseconds
    #[arg(short = 'j', long, default_value = "25")]
    jitter_ms: u64,

    /// Print the run report as JSON instead of plain text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = LoadConfig {
        server: args.server,
        clients: args.clients,
        messages_per_client: args.messages,
        message: args.message,
        response_timeout: Duration::from_secs(args.timeout),
        start_jitter: Duration::from_millis(args.jitter_ms),
    };

    info!(
        "Starting load test: {} client(s) x {} message(s) against {}",
        config.clients, config.messages_per_client, config.server
    );

    let report = run_load_test(&config).await;
    info!("Load test finished, all clients have completed");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "Responses: {} ok, {} failed ({:.2}% success)",
        report.responses_ok, report.responses_failed, report.success_rate_percent
    );
    println!("Total latency: {:.6}ms", report.latency_total_ms);
    match (
        report.latency_mean_ms,
        report.latency_min_ms,
        report.latency_max_ms,
    ) {
        (Some(mean), Some(min), Some(max)) => {
            println!("Average latency: {:.6}ms", mean);
            println!("Min latency: {:.6}ms", min);
            println!("Max latency: {:.6}ms", max);
        }
        _ => println!("No successful responses, no latency statistics"),
    }
}
