mod api;
mod cache;
mod config;
mod session;
mod store;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use api::{CachedPosClient, PosClient};
use cache::{CacheHandle, CacheLayer, SqliteStorage};
use config::Config;
use session::{CheckoutOutcome, PosSession};
use store::{CartStore, SqliteKv};
use sync::{ConnectivityMonitor, OfflineQueue};

#[derive(Parser, Debug)]
#[command(name = "tillsync")]
#[command(about = "Offline-first persistence and sync engine for a retail POS client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tillsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Treat the session as disconnected; mutations queue for later replay
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show cart, queue, and cache status
  Status,
  /// Add a product to the cart by id
  Add {
    product_id: String,
    #[arg(default_value_t = 1)]
    quantity: u32,
    #[arg(short, long)]
    notes: Option<String>,
  },
  /// Remove a product from the cart
  Remove { product_id: String },
  /// Set the quantity of a cart line (0 removes it)
  Qty { product_id: String, quantity: u32 },
  /// Drop the current cart session (history is kept)
  Clear,
  /// List the product catalog (cache-first)
  Catalog,
  /// List the employee roster (cache-first)
  Roster,
  /// Show the recovery history for the current session
  History,
  /// Finalize the current cart
  Checkout,
  /// Write a recovery snapshot to a file, or stdout by default
  Export {
    #[arg(short, long)]
    out: Option<PathBuf>,
  },
  /// Restore a previously exported snapshot
  Import { file: PathBuf },
  /// Replay queued offline mutations now
  Drain,
  /// Warm the cache for the critical endpoints
  Prefetch,
  /// Wipe the response cache
  ClearCache,
}

/// Log to a rolling file under the data directory, falling back to stderr
/// when the directory cannot be created. RUST_LOG controls the level.
fn init_tracing(log_dir: &Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  match std::fs::create_dir_all(log_dir) {
    Ok(()) => {
      let appender = tracing_appender::rolling::daily(log_dir, "tillsync.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
      Some(guard)
    }
    Err(_) => {
      tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
      None
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let data_dir = config.data_dir()?;
  let _log_guard = init_tracing(&data_dir.join("logs"));
  info!("tillsync starting");

  let kv = Arc::new(SqliteKv::open(&config.store_db_path()?)?);
  let store = CartStore::new(Arc::clone(&kv))
    .with_employee(config.employee_id.clone())
    .with_location(config.location.clone());
  let queue = Arc::new(OfflineQueue::new(kv));
  let monitor = Arc::new(ConnectivityMonitor::new(!args.offline));

  let client = PosClient::new(&config.api.base_url)?;
  let layer = CacheLayer::new(SqliteStorage::open(&config.cache_db_path()?)?);
  let fetch_client = client.clone();
  let cache = cache::worker::spawn(layer, move |path| {
    let client = fetch_client.clone();
    async move { client.get_raw(&path).await }
  });

  let session = PosSession::new(
    store,
    queue,
    Arc::clone(&monitor),
    client,
    CachedPosClient::new(cache.clone()),
  );
  session.start_sync();

  let result = run_command(args.command, &session, &cache).await;
  cache.shutdown();
  result
}

async fn run_command(
  command: Command,
  session: &PosSession<SqliteKv>,
  cache: &CacheHandle,
) -> Result<()> {
  match command {
    Command::Status => {
      match session.cart() {
        Some(cart) => {
          println!("Cart session {} ({} items, {:.2} total)", cart.session_id, cart.total_items, cart.total_value);
          for item in &cart.items {
            println!("  {:>3} x {} @ {:.2}", item.quantity, item.product.name, item.product.price);
          }
        }
        None => println!("No active cart session"),
      }

      let pending = session.queue().items();
      if pending.is_empty() {
        println!("No pending offline mutations");
      } else {
        println!("Pending offline mutations: {}", pending.len());
        for item in &pending {
          println!("  {} (retries: {})", item.op.kind(), item.retry_count);
        }
      }

      let stats = cache.status().await;
      println!(
        "Cache entries: {} api, {} static, {} main ({} total)",
        stats.api, stats.static_entries, stats.main, stats.total
      );
      println!(
        "Connectivity: {}",
        if session.monitor().is_online() { "online" } else { "offline" }
      );
    }

    Command::Add {
      product_id,
      quantity,
      notes,
    } => {
      let listing = session.products().await?;
      if listing.is_offline() {
        println!("(catalog served from cache)");
      }
      match listing.items.iter().find(|p| p.id == product_id) {
        Some(product) => {
          if session.add_item(product, quantity, notes.as_deref()).await {
            println!("Added {} x {}", quantity, product.name);
          } else {
            println!("Could not add item (storage unavailable?)");
          }
        }
        None => println!("Product {} not found in catalog", product_id),
      }
    }

    Command::Remove { product_id } => {
      if session.remove_item(&product_id).await {
        println!("Removed {}", product_id);
      } else {
        println!("{} is not in the cart", product_id);
      }
    }

    Command::Qty {
      product_id,
      quantity,
    } => {
      if session.set_quantity(&product_id, quantity).await {
        println!("Set {} to {}", product_id, quantity);
      } else {
        println!("{} is not in the cart", product_id);
      }
    }

    Command::Clear => {
      if session.store().clear() {
        println!("Cart cleared (history kept)");
      } else {
        println!("Could not clear cart");
      }
    }

    Command::Catalog => {
      let listing = session.products().await?;
      if listing.is_offline() {
        match listing.cached_at {
          Some(at) => println!("(served from cache, as of {})", at.format("%Y-%m-%d %H:%M")),
          None => println!("(offline, nothing cached)"),
        }
      }
      for product in &listing.items {
        println!("{:<12} {:>8.2}  {}", product.id, product.price, product.name);
      }
      if listing.items.is_empty() {
        println!("Catalog is empty");
      }
    }

    Command::Roster => {
      let listing = session.employees().await?;
      if listing.is_offline() {
        match listing.cached_at {
          Some(at) => println!("(served from cache, as of {})", at.format("%Y-%m-%d %H:%M")),
          None => println!("(offline, nothing cached)"),
        }
      }
      for employee in &listing.items {
        println!(
          "{:<12} {} {}",
          employee.id,
          employee.name,
          employee.role.as_deref().unwrap_or("")
        );
      }
      if listing.items.is_empty() {
        println!("Roster is empty");
      }
    }

    Command::History => {
      let history = session.store().history();
      if history.is_empty() {
        println!("No recovery history");
      }
      for (n, entry) in history.iter().enumerate() {
        println!(
          "{:>2}. {}: {} items, {:.2} total",
          n + 1,
          entry.saved_at.format("%Y-%m-%d %H:%M:%S"),
          entry.state.total_items,
          entry.state.total_value
        );
      }
    }

    Command::Checkout => match session.checkout().await {
      CheckoutOutcome::Completed => println!("Checkout completed"),
      CheckoutOutcome::Queued => println!("Checkout queued for sync"),
      CheckoutOutcome::Empty => println!("Nothing to check out"),
      CheckoutOutcome::Failed => println!("Checkout failed; cart left untouched"),
    },

    Command::Export { out } => match session.store().export_snapshot() {
      Some(snapshot) => match out {
        Some(path) => {
          std::fs::write(&path, snapshot)?;
          println!("Snapshot written to {}", path.display());
        }
        None => println!("{}", snapshot),
      },
      None => println!("Nothing to export"),
    },

    Command::Import { file } => {
      let payload = std::fs::read_to_string(&file)?;
      if session.store().import_snapshot(&payload) {
        println!("Snapshot imported");
      } else {
        println!("Snapshot rejected: not a recognizable export document");
      }
    }

    Command::Drain => {
      let outcome = session.drain_now().await;
      println!(
        "Drained {} mutation(s); {} still pending",
        outcome.processed, outcome.remaining
      );
    }

    Command::Prefetch => {
      cache.prefetch();
      // Give the fire-and-forget warm-up a moment before the process exits.
      tokio::time::sleep(Duration::from_secs(2)).await;
      let stats = cache.status().await;
      println!("Cache warmed: {} entries", stats.total);
    }

    Command::ClearCache => {
      if cache.clear().await {
        println!("Response cache cleared");
      } else {
        println!("Could not clear response cache");
      }
    }
  }

  Ok(())
}
