//! storefront-access - Admin section gates and checkout pricing from the shell

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use storefront_access::api::{HttpStorefrontApi, StorefrontApi};
use storefront_access::config::ClientConfig;
use storefront_access::domain::aggregates::discount::{parse_day, today};
use storefront_access::session::{AdminSession, CustomerSession};
use storefront_access::{CartLine, DiscountInput, Role, Section};
use strum::IntoEnumIterator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "storefront-access", version, about = "Storefront permission gates and discount pricing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve page access and CRUD affordances for admin sections
    Gate {
        #[arg(long, env = "STOREFRONT_ACTOR_ID")]
        actor_id: String,
        #[arg(long, env = "STOREFRONT_ACTOR_ROLE", default_value = "employee")]
        role: Role,
        /// Comma-separated sections; every section when omitted
        #[arg(long, value_delimiter = ',')]
        section: Vec<Section>,
    },
    /// Price a cart for a customer, optionally placing the order
    Checkout {
        #[arg(long)]
        customer: String,
        /// JSON array of `{ "product_id", "price", "quantity" }`
        #[arg(long)]
        cart: PathBuf,
        /// Pricing day, defaults to today (UTC)
        #[arg(long, value_parser = parse_day)]
        on: Option<NaiveDate>,
        #[arg(long)]
        submit: bool,
    },
    /// Replace or remove a customer's discount
    Discount {
        #[arg(long, env = "STOREFRONT_ACTOR_ID")]
        actor_id: String,
        #[arg(long, env = "STOREFRONT_ACTOR_ROLE", default_value = "admin")]
        role: Role,
        #[arg(long)]
        customer: String,
        #[arg(long, required_unless_present = "remove")]
        percentage: Option<Decimal>,
        #[arg(long, value_parser = parse_day, required_unless_present = "remove")]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_day, required_unless_present = "remove")]
        to: Option<NaiveDate>,
        #[arg(long)]
        inactive: bool,
        #[arg(long, conflicts_with_all = ["percentage", "from", "to", "inactive"])]
        remove: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    let api: Arc<dyn StorefrontApi> = Arc::new(HttpStorefrontApi::from_config(&config)?);
    tracing::info!(api = %config.api_url, "storefront-access ready");

    match cli.command {
        Command::Gate { actor_id, role, section } => gate(api, actor_id, role, section).await,
        Command::Checkout { customer, cart, on, submit } => checkout(api, &config, customer, cart, on.unwrap_or_else(today), submit).await,
        Command::Discount { actor_id, role, customer, percentage, from, to, inactive, remove } => {
            let session = AdminSession::new(api, actor_id, role);
            let mut slot = session.customer_discount(&customer).await?;
            if remove {
                session.remove_discount(&mut slot).await?;
                println!("{}", json!({ "customer": customer, "discount": null }));
            } else {
                let input = DiscountInput {
                    discount_percentage: percentage.context("--percentage is required")?,
                    start_date: from.context("--from is required")?,
                    end_date: to.context("--to is required")?,
                    is_active: !inactive,
                };
                let saved = session.save_discount(&mut slot, input).await?;
                println!("{}", serde_json::to_string_pretty(&json!({ "customer": customer, "discount": saved }))?);
            }
            session.logout();
            Ok(())
        }
    }
}

async fn gate(api: Arc<dyn StorefrontApi>, actor_id: String, role: Role, sections: Vec<Section>) -> Result<()> {
    let sections = if sections.is_empty() { Section::iter().collect() } else { sections };
    let session = AdminSession::new(api, actor_id, role);
    let mut report = Vec::with_capacity(sections.len());
    for section in sections {
        // One section failing must not hide the others.
        let entry = match session.open_section(section).await {
            Ok(page) => json!({ "section": section, "state": page.gate().state().to_string(), "affordances": page.gate().affordances() }),
            Err(e) => json!({ "section": section, "error": e.to_string(), "retryable": e.is_retryable() }),
        };
        report.push(entry);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    session.logout();
    Ok(())
}

async fn checkout(api: Arc<dyn StorefrontApi>, config: &ClientConfig, customer: String, cart: PathBuf, day: NaiveDate, submit: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(&cart).await.with_context(|| format!("reading cart {}", cart.display()))?;
    let lines: Vec<CartLine> = serde_json::from_str(&raw).with_context(|| format!("parsing cart {}", cart.display()))?;
    let session = CustomerSession::new(api, customer, &config.currency);
    let mut cart = session.cart();
    lines.into_iter().for_each(|l| cart.add_line(l));

    let summary = session.checkout_summary(&cart, day).await?.rounded();
    let badge = session.discount_badge(day).await?;
    println!("{}", serde_json::to_string_pretty(&json!({ "customer": session.customer_id(), "day": day, "badge": badge, "summary": summary }))?);

    if submit {
        let (order, receipt) = session.place_order(&cart, day).await?;
        println!("{}", serde_json::to_string_pretty(&json!({ "order": order, "receipt": receipt }))?);
    }
    Ok(())
}
