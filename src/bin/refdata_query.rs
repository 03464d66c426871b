//! refdata-query: reference client for the tunnel server.
//!
//! Builds a `[securities, fields]` request from the command line, sends it
//! to a tunnel server, and prints the reply. An empty reply means the
//! server rejected the request or could not reach its backend.

use clap::Parser;
use refdata_tunnel::client;

/// Command-line arguments for the reference client
#[derive(Parser, Debug)]
#[command(name = "refdata-query")]
#[command(version = "0.1.0")]
#[command(about = "Send a reference-data lookup to a tunnel server", long_about = None)]
struct Args {
    /// Tunnel server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Tunnel server port
    #[arg(short, long, default_value_t = 2600)]
    port: u16,

    /// Field names to resolve, e.g. PX_LAST
    #[arg(short, long, required = true, num_args = 1..)]
    fields: Vec<String>,

    /// Security identifiers to look up, e.g. "XS1084818464 Corp"
    #[arg(required = true)]
    securities: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let request = serde_json::to_vec(&(&args.securities, &args.fields))?;
    let chunks = client::send(&args.host, args.port, &request).await?;

    for chunk in &chunks {
        print!("{}", String::from_utf8_lossy(chunk));
    }
    println!();

    Ok(())
}
