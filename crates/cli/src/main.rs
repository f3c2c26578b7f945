//! Denim CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! denim-cli migrate
//!
//! # Grant or revoke admin access
//! denim-cli admin grant -e owner@example.com
//! denim-cli admin revoke -e owner@example.com
//!
//! # Set a customer's wallet balance (major units)
//! denim-cli wallet set -e customer@example.com -a 1500.00
//!
//! # Delete every product and its stored images
//! denim-cli products purge --yes
//!
//! # Follow the live order feed (needs DENIM_SESSION_COOKIE)
//! denim-cli orders watch --url http://localhost:3000
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "denim-cli")]
#[command(author, version, about = "Denim storefront CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage administrator access
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Manage wallet balances
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
    /// Catalog maintenance
    Products {
        #[command(subcommand)]
        action: ProductAction,
    },
    /// Live order feed
    Orders {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Give a profile access to the back office
    Grant {
        /// Profile email address
        #[arg(short, long)]
        email: String,
    },
    /// Remove back office access
    Revoke {
        /// Profile email address
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// Set the wallet balance
    Set {
        /// Profile email address
        #[arg(short, long)]
        email: String,

        /// New balance in major units, e.g. 1500.00
        #[arg(short, long)]
        amount: String,
    },
}

#[derive(Subcommand)]
enum ProductAction {
    /// Delete all products and their stored images
    Purge {
        /// Confirm the purge
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Log the order list whenever it changes
    Watch {
        /// Storefront base URL
        #[arg(long, default_value = "http://localhost:3000")]
        url: String,

        /// Only follow this customer's orders
        #[arg(long)]
        user_id: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Grant { email } => commands::users::set_admin(&email, true).await?,
            AdminAction::Revoke { email } => commands::users::set_admin(&email, false).await?,
        },
        Commands::Wallet { action } => match action {
            WalletAction::Set { email, amount } => {
                commands::users::set_wallet(&email, &amount).await?;
            }
        },
        Commands::Products { action } => match action {
            ProductAction::Purge { yes } => {
                if !yes {
                    return Err("Refusing to purge without --yes".into());
                }
                commands::products::purge().await?;
            }
        },
        Commands::Orders { action } => match action {
            OrderAction::Watch { url, user_id } => {
                commands::orders::watch(&url, user_id.as_deref()).await?;
            }
        },
    }
    Ok(())
}
