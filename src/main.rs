use anyhow::{Context, Result};
use chefbyte::api_connection::Provider;
use chefbyte::cli::{parse_args, Command, ProfileAction};
use chefbyte::inventory::write_csv;
use chefbyte::{logger, AppConfig, Assistant, Conversation, InventoryLine, Reconciler, Store};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const QUIT_COMMAND: &str = "/quit";

fn print_inventory(lines: &[InventoryLine]) {
    println!("\nYour Pantry");
    if lines.is_empty() {
        println!("  (empty)");
        return;
    }
    let name_width = lines
        .iter()
        .map(|l| l.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Name".len());
    println!("  {:<name_width$}  {:>8}  Expiration", "Name", "Quantity");
    for line in lines {
        println!(
            "  {:<name_width$}  {:>8}  {}",
            line.name,
            line.quantity,
            line.expiration_label()
        );
    }
}

fn read_payload(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file '{}'", path)),
        None => Ok(arg.to_string()),
    }
}

async fn run_chat(store: &Store, config: &AppConfig) -> Result<()> {
    let provider = Provider::from_config(config);
    tracing::info!(
        "Chatting with {} ({} batches)",
        provider.model(),
        config.batch_mode
    );
    let assistant = Assistant::new(provider, store, config.batch_mode);
    let mut conversation = Conversation::new();

    print_inventory(&store.list_all()?);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nWhat would you like to do? > ");
        std::io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == QUIT_COMMAND {
            break;
        }

        let now = chrono::Local::now().naive_local();
        match assistant.handle_turn(&mut conversation, input, now).await {
            Ok(reply) => {
                println!("\n{}", reply.text);
                if reply.outcome.is_some() {
                    match &reply.inventory {
                        Ok(lines) => print_inventory(lines),
                        Err(e) => eprintln!("\nCould not read the pantry: {}", e),
                    }
                }
            }
            Err(e) => {
                tracing::error!("Turn failed: {}", e);
                eprintln!("\nError: {}", e);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args();
    logger::init_logger(cli.verbose);

    let (model, atomic) = match &cli.command {
        Command::Chat { model, atomic } => (model.clone(), *atomic),
        Command::Apply { atomic, .. } => (None, *atomic),
        _ => (None, false),
    };
    let config = AppConfig::from_env()
        .context("Invalid configuration")?
        .with_overrides(cli.db.clone(), model, atomic);

    let store = Store::open(&config.db_path)
        .with_context(|| format!("Failed to open pantry database '{}'", config.db_path.display()))?;

    match cli.command {
        Command::Chat { .. } => run_chat(&store, &config).await?,
        Command::Apply { payload, .. } => {
            let payload = read_payload(&payload)?;
            let outcome = Reconciler::with_mode(&store, config.batch_mode).reconcile(&payload);
            println!("{}", outcome.message());
            print_inventory(&store.list_all()?);
            if !outcome.is_applied() {
                std::process::exit(2);
            }
        }
        Command::Inventory { csv } => {
            let lines = store.list_all()?;
            if csv {
                write_csv(&lines, std::io::stdout()).context("Failed to write CSV")?;
            } else {
                print_inventory(&lines);
            }
        }
        Command::Profile { action } => match action {
            ProfileAction::Show => {
                let profile = store.current_taste_profile()?;
                if profile.is_empty() {
                    println!("(no taste profile saved)");
                } else {
                    println!("{}", profile);
                }
            }
            ProfileAction::Set { text } => {
                store.save_taste_profile(&text)?;
                println!("Taste profile saved.");
            }
        },
        Command::Clear => {
            let removed = store.clear_all()?;
            println!("Inventory cleared successfully ({} lines removed).", removed);
        }
    }

    Ok(())
}
