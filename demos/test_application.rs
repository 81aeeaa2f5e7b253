use clap::Parser;
use richlink::{EventHandlers, RpcClient, RpcConfig};
use std::io::BufRead;
use std::sync::mpsc;
use std::time::Duration;

/// Interactive Rich Presence smoke test
///
/// Publishes a fixed presence and prints every event until ENTER is pressed.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Discord Application Client ID
    #[arg(short, long)]
    client_id: Option<String>,

    /// Register a `discord-<id>://` launcher with the OS
    #[arg(long)]
    register: bool,

    /// Steam app id to launch through instead of this executable
    #[arg(long)]
    steam_id: Option<String>,
}

fn wait_for_enter() {
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists (optional)
    let _ = dotenvy::dotenv();
    env_logger::init();

    let args = Args::parse();

    let client_id = args
        .client_id
        .or_else(|| std::env::var("DISCORD_CLIENT_ID").ok())
        .unwrap_or_else(|| {
            eprintln!("Error: DISCORD_CLIENT_ID is required!");
            eprintln!("Provide it via:");
            eprintln!("  - Command line: cargo run --example test_application -- --client-id YOUR_ID");
            eprintln!("  - Environment: DISCORD_CLIENT_ID=YOUR_ID cargo run --example test_application");
            std::process::exit(1);
        });

    println!("Hello! Press ENTER to start Rich Presence.");
    println!("Don't forget to add this process to \"Discord Games\" if it is not working.");
    wait_for_enter();

    let handlers = EventHandlers::new()
        .on_ready(|user| println!("✓ Connected as {} ({})", user.username, user.id))
        .on_disconnected(|code, message| println!("✗ Disconnected ({}): {}", code, message))
        .on_errored(|code, message| eprintln!("✗ Error ({}): {}", code, message))
        .on_join_game(|secret| println!("→ Join requested with secret {}", secret))
        .on_spectate_game(|secret| println!("→ Spectate requested with secret {}", secret))
        .on_join_request(|user| println!("→ {} asked to join", user.username));

    let mut client = RpcClient::new(RpcConfig::default());
    client.initialize(&client_id, handlers, args.register, args.steam_id.as_deref())?;

    client.draft_mut().state = Some("Testing!".to_string());
    client.draft_mut().details = Some("Presence in Rust".to_string());
    client.publish()?;

    println!("Rich Presence should now be working! Press ENTER to stop.");

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        wait_for_enter();
        let _ = tx.send(());
    });

    while rx.try_recv().is_err() {
        client.run_callbacks();
        std::thread::sleep(Duration::from_millis(100));
    }

    if client.dropped_events() > 0 {
        println!("{} events were dropped", client.dropped_events());
    }
    client.shutdown();
    println!("✓ Presence cleared, goodbye");
    Ok(())
}
