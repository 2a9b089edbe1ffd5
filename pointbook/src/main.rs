//! pointbook - Command-line client for the Pointbook state store
//!
//! Each invocation opens the saved state, runs one command through the
//! store, writes the result back and exits.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};
use libpointbook::storage::{FileStore, KeyValueStore};
use libpointbook::{
    Action, AppState, Bet, BetSpec, CartItem, Config, ItemId, PointbookError, Result,
    ShippingInfo, Store,
};

#[derive(Parser, Debug)]
#[command(name = "pointbook")]
#[command(version)]
#[command(about = "Manage points, bets, raffle entries and the merch cart")]
#[command(long_about = "\
pointbook - Manage points, bets, raffle entries and the merch cart

DESCRIPTION:
    pointbook is a command-line client for the Pointbook state store. Every
    command loads the saved state, applies one change, and saves it again.

COMMANDS:
    status      Show balance, bets, raffle entries and cart
    points      Add or subtract points
    bet         Place, settle or list bets
    raffle      Buy raffle entries
    cart        Manage the merchandise cart
    shipping    Set the shipping address
    dispatch    Apply a raw JSON action
    reset       Delete the saved state

USAGE EXAMPLES:
    # Place a bet of 100 points that pays 250
    pointbook bet place --amount 100 --potential-win 250 --detail team=Lions

    # Settle it as a win
    pointbook bet settle <BET_ID> --won

    # Show everything as JSON
    pointbook status --format json

    # Apply a raw action
    pointbook dispatch '{\"type\":\"ADD_USER_POINTS\",\"payload\":50}'

CONFIGURATION:
    Configuration file: ~/.config/pointbook/config.toml
    Data directory: ~/.local/share/pointbook

    Override with environment variables:
        POINTBOOK_CONFIG      - Path to config file
        POINTBOOK_DATA_DIR    - Path to data directory
        POINTBOOK_LOG_FORMAT  - Log format (text, json, pretty)
        POINTBOOK_LOG_LEVEL   - Log level (default: warn)

EXIT CODES:
    0 - Success
    1 - Storage or snapshot error
    2 - Configuration error
    3 - Invalid input (bad amount, unknown bet ID, malformed action, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the saved state (overrides [storage].path)
    #[arg(long, global = true, env = "POINTBOOK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the current state
    Status {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Adjust the points balance
    Points {
        #[command(subcommand)]
        command: PointsCommand,
    },

    /// Place, settle or list bets
    Bet {
        #[command(subcommand)]
        command: BetCommand,
    },

    /// Raffle entries
    Raffle {
        #[command(subcommand)]
        command: RaffleCommand,
    },

    /// Merchandise cart
    Cart {
        #[command(subcommand)]
        command: CartCommand,
    },

    /// Shipping address
    Shipping {
        #[command(subcommand)]
        command: ShippingCommand,
    },

    /// Apply a raw JSON action ({"type": ..., "payload": ...})
    Dispatch {
        /// Action as JSON
        action: String,
    },

    /// Delete the saved state
    Reset,
}

#[derive(Subcommand, Debug)]
enum PointsCommand {
    /// Add points to the balance
    Add { amount: i64 },

    /// Subtract points from the balance
    Subtract { amount: i64 },
}

#[derive(Subcommand, Debug)]
enum BetCommand {
    /// Place a bet; prints the new bet ID
    Place {
        /// Points wagered
        #[arg(long)]
        amount: i64,

        /// Points paid out if the bet wins
        #[arg(long)]
        potential_win: i64,

        /// Extra bet details as key=value (repeatable)
        #[arg(long = "detail", value_parser = parse_detail)]
        details: Vec<(String, serde_json::Value)>,
    },

    /// Settle an active bet
    #[command(group(ArgGroup::new("outcome").required(true).args(["won", "lost"])))]
    Settle {
        /// Bet ID
        bet_id: i64,

        /// The bet won
        #[arg(long)]
        won: bool,

        /// The bet lost
        #[arg(long)]
        lost: bool,
    },

    /// List bets
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// List settled bets instead of active ones
        #[arg(long)]
        completed: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RaffleCommand {
    /// Buy one raffle entry
    Enter,
}

#[derive(Subcommand, Debug)]
enum CartCommand {
    /// Add an item to the cart
    Add {
        /// Item ID (number or text)
        id: String,

        /// Item fields as key=value (repeatable)
        #[arg(long = "detail", value_parser = parse_detail)]
        details: Vec<(String, serde_json::Value)>,
    },

    /// Remove an item from the cart
    Remove {
        /// Item ID (number or text)
        id: String,
    },

    /// Empty the cart
    Clear,
}

#[derive(Subcommand, Debug)]
enum ShippingCommand {
    /// Replace the shipping address
    Set {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long, default_value = "")]
        state: String,
        #[arg(long, default_value = "")]
        zip: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libpointbook::logging::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.path = dir.to_string_lossy().into_owned();
    }
    tracing::debug!(data_dir = %config.storage_dir().display(), "Using data directory");

    if let Commands::Reset = cli.command {
        let storage = FileStore::new(config.storage_dir());
        storage.remove(&config.storage.key).await?;
        println!("Saved state removed from {}", storage.dir().display());
        return Ok(());
    }

    let store = Store::from_config(&config).await?;
    let result = execute(&store, cli.command);

    // Persist whatever the command changed, even when it then failed
    let flushed = match &result {
        Ok(false) => Ok(()),
        _ => store.flush().await,
    };
    store.shutdown();

    result?;
    flushed
}

/// Run one command; returns whether the state may have changed
fn execute(store: &Store, command: Commands) -> Result<bool> {
    match command {
        Commands::Status { format } => {
            cmd_status(store, &format)?;
            Ok(false)
        }
        Commands::Points { command } => {
            cmd_points(store, command)?;
            Ok(true)
        }
        Commands::Bet { command } => cmd_bet(store, command),
        Commands::Raffle {
            command: RaffleCommand::Enter,
        } => {
            store.add_raffle_entry();
            println!("Raffle entries: {}", store.raffle_entries());
            Ok(true)
        }
        Commands::Cart { command } => {
            cmd_cart(store, command)?;
            Ok(true)
        }
        Commands::Shipping {
            command:
                ShippingCommand::Set {
                    name,
                    address,
                    city,
                    state,
                    zip,
                },
        } => {
            store.update_shipping_info(ShippingInfo {
                name,
                address,
                city,
                state,
                zip_code: zip,
            });
            Ok(true)
        }
        Commands::Dispatch { action } => cmd_dispatch(store, &action),
        // Handled before the store is opened
        Commands::Reset => Ok(false),
    }
}

/// Show the current state
fn cmd_status(store: &Store, format: &str) -> Result<()> {
    validate_format(format)?;
    let state = store.state();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        output_status_text(&state);
    }
    Ok(())
}

fn output_status_text(state: &AppState) {
    println!("Points: {}", state.user_points);
    println!(
        "Active bets: {} ({} points at stake)",
        state.user_bets.len(),
        state.points_at_stake()
    );
    println!("Completed bets: {}", state.completed_bets.len());
    println!("Raffle entries: {}", state.raffle_entries);
    println!("Cart items: {}", state.cart.len());

    let ship = &state.shipping_info;
    if ship.name.is_empty() && ship.address.is_empty() {
        println!("Ship to: (not set)");
    } else {
        println!(
            "Ship to: {}, {}, {} {} {}",
            ship.name, ship.address, ship.city, ship.state, ship.zip_code
        );
    }
}

fn cmd_points(store: &Store, command: PointsCommand) -> Result<()> {
    match command {
        PointsCommand::Add { amount } => {
            require_non_negative("amount", amount)?;
            store.add_points(amount);
        }
        PointsCommand::Subtract { amount } => {
            require_non_negative("amount", amount)?;
            store.subtract_points(amount);
        }
    }
    println!("{}", store.points());
    Ok(())
}

fn cmd_bet(store: &Store, command: BetCommand) -> Result<bool> {
    match command {
        BetCommand::Place {
            amount,
            potential_win,
            details,
        } => {
            if amount <= 0 {
                return Err(PointbookError::InvalidInput(format!(
                    "Bet amount must be positive, got {}",
                    amount
                )));
            }
            require_non_negative("potential win", potential_win)?;

            let spec = details
                .into_iter()
                .fold(BetSpec::new(amount, potential_win), |spec, (key, value)| {
                    spec.with_detail(key, value)
                });
            let bet = store.place_bet(spec);
            println!("{}", bet.id);
            Ok(true)
        }
        BetCommand::Settle { bet_id, won, .. } => {
            let bet = store.simulate_bet_completion(bet_id, won).ok_or_else(|| {
                PointbookError::InvalidInput(format!("No active bet with ID {}", bet_id))
            })?;
            println!("{}", bet.result.as_deref().unwrap_or_default());
            Ok(true)
        }
        BetCommand::List { format, completed } => {
            validate_format(&format)?;
            let bets = if completed {
                store.completed_bets()
            } else {
                store.active_bets()
            };

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&bets)?);
            } else {
                output_bets_text(&bets);
            }
            Ok(false)
        }
    }
}

fn output_bets_text(bets: &[Bet]) {
    for bet in bets {
        println!(
            "{} | {} | {} -> {} | {}",
            bet.id,
            bet.status,
            bet.amount,
            bet.potential_win,
            bet.time_placed.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

fn cmd_cart(store: &Store, command: CartCommand) -> Result<()> {
    match command {
        CartCommand::Add { id, details } => {
            let item = details
                .into_iter()
                .fold(CartItem::new(ItemId::parse(&id)), |item, (key, value)| {
                    item.with_field(key, value)
                });
            if !store.add_to_cart(item) {
                return Err(PointbookError::InvalidInput(format!(
                    "Item {} is already in the cart",
                    id
                )));
            }
        }
        CartCommand::Remove { id } => {
            if !store.remove_from_cart(ItemId::parse(&id)) {
                return Err(PointbookError::InvalidInput(format!(
                    "No cart item with ID {}",
                    id
                )));
            }
        }
        CartCommand::Clear => store.clear_cart(),
    }
    println!("Cart items: {}", store.cart().len());
    Ok(())
}

fn cmd_dispatch(store: &Store, text: &str) -> Result<bool> {
    let action = Action::from_json_str(text)
        .map_err(|e| PointbookError::InvalidInput(format!("Malformed action: {}", e)))?;

    if action == Action::Unknown {
        eprintln!("Ignored unknown action");
        return Ok(false);
    }

    let kind = action.kind();
    let changed = store.dispatch(action);
    println!("{} {}", kind, if changed { "applied" } else { "had no effect" });
    Ok(changed)
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(PointbookError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

fn require_non_negative(what: &str, value: i64) -> Result<()> {
    if value < 0 {
        return Err(PointbookError::InvalidInput(format!(
            "{} must not be negative, got {}",
            what, value
        )));
    }
    Ok(())
}

/// Parse `key=value`; the value is read as JSON when it parses, text otherwise
fn parse_detail(s: &str) -> std::result::Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_detail() {
        assert_eq!(parse_detail("team=Lions").unwrap(), ("team".to_string(), json!("Lions")));
        assert_eq!(parse_detail("odds=2.5").unwrap(), ("odds".to_string(), json!(2.5)));
        assert_eq!(parse_detail("note=a=b").unwrap(), ("note".to_string(), json!("a=b")));
        assert!(parse_detail("novalue").is_err());
        assert!(parse_detail("=x").is_err());
    }

    #[test]
    fn test_validate_format() {
        assert!(validate_format("text").is_ok());
        assert!(validate_format("json").is_ok());
        assert_eq!(validate_format("xml").unwrap_err().exit_code(), 3);
    }

    #[test]
    fn test_cli_parses_settle_outcome() {
        let cli = Cli::try_parse_from(["pointbook", "bet", "settle", "42", "--won"]).unwrap();
        match cli.command {
            Commands::Bet {
                command: BetCommand::Settle { bet_id, won, lost },
            } => {
                assert_eq!(bet_id, 42);
                assert!(won);
                assert!(!lost);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["pointbook", "bet", "settle", "42"]).is_err());
        assert!(Cli::try_parse_from(["pointbook", "bet", "settle", "42", "--won", "--lost"]).is_err());
    }
}
