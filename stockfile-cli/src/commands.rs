//! Subcommand definitions and dispatch

use std::cmp::Ordering;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Subcommand, ValueEnum};
use tracing::info;

use stockfile_engine::audit::{AuditCategory, AuditLog};
use stockfile_engine::{Field, Record, RecordStore, StoreConfig};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create (or truncate) the data file
    Create,
    /// Remove the data file from disk
    Drop,
    /// Remove every record, keeping the file
    Clear,
    /// Flush the data file to disk
    Save,
    /// Add a product
    Add {
        #[arg(long)]
        id: i32,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 0)]
        quantity: i32,
        #[arg(long, default_value_t = 0.0)]
        price: f64,
        #[arg(long, default_value = "")]
        supplier: String,
    },
    /// Delete a product by id
    Delete { id: i32 },
    /// Delete every product whose field equals the value
    DeleteWhere { field: String, value: String },
    /// Set `field` to `value` on every product matching the where clause
    Update {
        field: String,
        value: String,
        #[arg(long = "where", default_value = "id")]
        where_field: String,
        #[arg(long = "is")]
        where_value: String,
    },
    /// Increase a product's quantity
    Supply { id: i32, amount: i32 },
    /// Decrease a product's quantity
    Sell { id: i32, amount: i32 },
    /// Search products by field
    Search {
        field: String,
        value: String,
        /// One of =, <, <=, >, >= (ranges apply to quantity and price)
        #[arg(long, default_value = "=")]
        op: String,
    },
    /// List every product
    List {
        /// Sort by this field
        #[arg(long)]
        sort: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
    },
    /// Inventory aggregates
    Stats {
        /// Quantity below which a product counts as low stock
        #[arg(long)]
        threshold: Option<i32>,
    },
    /// Copy the data file to `dest`
    Backup { dest: PathBuf },
    /// Replace the data file with `src` and reload
    Restore { src: PathBuf },
    /// Write live products to a semicolon-separated file
    Export { dest: PathBuf },
    /// Insert products from a semicolon-separated file
    Import { src: PathBuf },
    /// Show the audit trail
    Log {
        #[arg(long)]
        category: Option<CategoryArg>,
        /// Only show the last N entries
        #[arg(long)]
        tail: Option<usize>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum CategoryArg {
    Add,
    Delete,
    Update,
    Supply,
    Sell,
    Service,
    Other,
}

impl From<CategoryArg> for AuditCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Add => AuditCategory::Add,
            CategoryArg::Delete => AuditCategory::Delete,
            CategoryArg::Update => AuditCategory::Update,
            CategoryArg::Supply => AuditCategory::Supply,
            CategoryArg::Sell => AuditCategory::Sell,
            CategoryArg::Service => AuditCategory::Service,
            CategoryArg::Other => AuditCategory::Other,
        }
    }
}

/// Execute one subcommand against `store`
pub fn run(store: &RecordStore, config: &StoreConfig, command: Command) -> Result<()> {
    // Commands that work on the file itself rather than its contents
    match command {
        Command::Create => {
            store.create_new(&config.data_file)?;
            println!("created {}", config.data_file.display());
            return Ok(());
        }
        Command::Drop => {
            store.delete_database()?;
            println!("removed {}", config.data_file.display());
            return Ok(());
        }
        Command::Log { category, tail } => {
            return print_log(&AuditLog::new(config.audit_log.clone()), category, tail);
        }
        _ => {}
    }

    let count = store.load()?;
    info!("Loaded {} records", count);

    match command {
        Command::Create | Command::Drop | Command::Log { .. } => unreachable!(),
        Command::Clear => {
            store.clear()?;
            println!("cleared");
        }
        Command::Save => {
            store.flush()?;
            println!("saved");
        }
        Command::Add {
            id,
            name,
            quantity,
            price,
            supplier,
        } => {
            if !store.insert(Record::new(id, name, quantity, price, supplier))? {
                bail!("not added: id {} already exists or name is blank", id);
            }
            println!("added {}", id);
        }
        Command::Delete { id } => {
            if !store.delete_by_id(id)? {
                bail!("no product with id {}", id);
            }
            println!("deleted {}", id);
        }
        Command::DeleteWhere { field, value } => {
            let count = store.delete_where(&field, &value)?;
            println!("deleted {} products", count);
        }
        Command::Update {
            field,
            value,
            where_field,
            where_value,
        } => {
            let count = store.update(&field, &value, &where_field, &where_value)?;
            println!("updated {} products", count);
        }
        Command::Supply { id, amount } => {
            if !store.supply(id, amount)? {
                bail!("supply rejected for id {}", id);
            }
            println!("supplied {} to {}", amount, id);
        }
        Command::Sell { id, amount } => {
            if !store.sell(id, amount)? {
                bail!("sale rejected for id {}: unknown product or not enough stock", id);
            }
            println!("sold {} of {}", amount, id);
        }
        Command::Search { field, value, op } => {
            print_records(&store.search(&field, &value, &op)?);
        }
        Command::List { sort, desc } => {
            let mut records = store.get_all()?;
            if let Some(name) = sort {
                let Some(field) = Field::parse(&name) else {
                    bail!("unknown sort field {:?}", name);
                };
                sort_records(&mut records, field, desc);
            }
            print_records(&records);
        }
        Command::Stats { threshold } => {
            let stats = store.stats(threshold.unwrap_or(store.low_stock_threshold()))?;
            println!("records:        {}", stats.total_records);
            println!("total quantity: {}", stats.total_quantity);
            println!("total value:    {:.2}", stats.total_value);
            println!("low stock:      {}", stats.low_stock);
        }
        Command::Backup { dest } => {
            store.backup(&dest)?;
            println!("backed up to {}", dest.display());
        }
        Command::Restore { src } => {
            let count = store.restore(&src)?;
            println!("restored {} products from {}", count, src.display());
        }
        Command::Export { dest } => {
            let count = store.export_csv(&dest)?;
            println!("exported {} products to {}", count, dest.display());
        }
        Command::Import { src } => {
            let (inserted, rejected) = store.import_csv(&src)?;
            println!("imported {} products, {} rejected", inserted, rejected);
        }
    }

    Ok(())
}

/// Sort records by one column. Stable, so equal keys keep file order.
pub fn sort_records(records: &mut [Record], field: Field, descending: bool) {
    records.sort_by(|a, b| {
        let ordering = match field {
            Field::Id => a.id.cmp(&b.id),
            Field::Name => a.name.cmp(&b.name),
            Field::Quantity => a.quantity.cmp(&b.quantity),
            Field::Price => a.price.total_cmp(&b.price),
            Field::Supplier => a.supplier.cmp(&b.supplier),
        };
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn print_records(records: &[Record]) {
    if records.is_empty() {
        println!("(no products)");
        return;
    }
    println!("{:>8}  {:<30}  {:>8}  {:>12}  {}", "ID", "NAME", "QTY", "PRICE", "SUPPLIER");
    for r in records {
        println!(
            "{:>8}  {:<30}  {:>8}  {:>12.2}  {}",
            r.id, r.name, r.quantity, r.price, r.supplier
        );
    }
}

fn print_log(log: &AuditLog, category: Option<CategoryArg>, tail: Option<usize>) -> Result<()> {
    if log.path().is_none() {
        bail!("audit trail is disabled");
    }
    let wanted = category.map(AuditCategory::from);
    let entries: Vec<_> = log
        .entries()?
        .into_iter()
        .filter(|e| wanted.map_or(true, |c| e.category == c))
        .collect();
    let skip = tail.map_or(0, |n| entries.len().saturating_sub(n));
    for entry in &entries[skip..] {
        println!("{:<8} [{}] {}", format!("{:?}", entry.category), entry.timestamp, entry.message);
    }
    Ok(())
}
