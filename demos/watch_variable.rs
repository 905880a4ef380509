//! Follow pimatic variables and print their changes.
//!
//! Demonstrates:
//! - Building a Controller from command-line settings
//! - Subscribing to variables and receiving notifications
//! - Reading a variable through a remote call
//! - Closing the connection with the last subscription
//!
//! Usage:
//!   cargo run --example watch_variable -- --host pimatic.local --port 8080 temperature
//!   cargo run --example watch_variable -- --user admin --password secret temperature humidity
//!   cargo run --example watch_variable -- --debug temperature

// ============================================================================
// Imports
// ============================================================================

use pimatic_bridge::{Controller, Notification, Result, Subscriber};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Arguments
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
struct Args {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    debug: bool,
    variables: Vec<String>,
}

impl Args {
    /// Parse command-line arguments.
    fn parse() -> Self {
        let mut args = Self::default();
        let mut iter = std::env::args().skip(1);

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--host" => args.host = iter.next(),
                "--port" => args.port = iter.next().and_then(|p| p.parse().ok()),
                "--user" => args.username = iter.next(),
                "--password" => args.password = iter.next(),
                "--debug" => args.debug = true,
                _ => args.variables.push(arg),
            }
        }

        if args.variables.is_empty() {
            args.variables.push("temperature".to_string());
        }
        args
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Watch Variables ===\n");

    let mut builder = Controller::builder();
    if let Some(host) = args.host {
        builder = builder.host(host);
    }
    if let Some(port) = args.port {
        builder = builder.port(port);
    }
    if let (Some(user), Some(password)) = (args.username, args.password) {
        builder = builder.credentials(user, password);
    }
    let controller = builder.build()?;
    println!("[Setup] Endpoint: {}\n", controller.endpoint());

    let (subscriber, mut notifications) = Subscriber::channel();
    for name in &args.variables {
        controller.register_variable(name, &subscriber);
        println!("[Subscribe] {name}");
    }
    println!("\nPress Ctrl+C to exit...\n");

    let mut first_read = true;
    loop {
        tokio::select! {
            notification = notifications.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                match notification {
                    Notification::Connected => println!("[Connected]"),
                    Notification::ConnectionError(message) => println!("[Error] {message}"),
                    Notification::NotFound(name) => println!("[Missing] {name}"),
                    Notification::ValueChanged(variable) => {
                        println!("[Value] {} = {} {}", variable.name, variable.value, variable.unit);

                        if first_read {
                            first_read = false;
                            let fresh = controller.get_variable_value(&variable.name).await?;
                            println!("[Read] {} = {} (via call)", fresh.name, fresh.value);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    controller.deregister_all();
    println!("\n[Done] Connection state: {:?}", controller.connection_state());
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "pimatic_bridge=debug"
    } else {
        "pimatic_bridge=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
