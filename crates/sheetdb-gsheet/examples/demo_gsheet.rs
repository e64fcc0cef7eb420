//! Walk through every operation against a real spreadsheet.
//!
//! Needs `SERVICE_ACCOUNT_FILE` and `SPREADSHEET_ID` (and optionally
//! `GOOGLE_SCOPES`) in the environment or a `.env` file:
//!
//! ```text
//! cargo run -p sheetdb-gsheet --example demo_gsheet
//! ```

use serde::{Deserialize, Serialize};
use serde_json::json;
use sheetdb::{Column, ColumnType, Filter, Query, SheetDbError, SheetModel};
use sheetdb_gsheet::{AsyncGoogleSheetDb, Credentials, GSheetConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: i64,
    name: String,
    email: String,
}

impl SheetModel for User {
    fn sheet_name() -> &'static str {
        "Users"
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", ColumnType::int()).header("User ID"),
            Column::new("name", ColumnType::string()).header("Full Name"),
            Column::new("email", ColumnType::Email).header("Email Address"),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Product {
    id: i64,
    name: String,
    price: f64,
}

impl SheetModel for Product {
    fn sheet_name() -> &'static str {
        "Products"
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", ColumnType::int()).header("Product ID"),
            Column::new("name", ColumnType::string()).header("Product Name"),
            // "999,95" in the sheet reads as 999.95
            Column::new("price", ColumnType::float()).header("Price"),
        ]
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = GSheetConfig::from_env()?;
    let spreadsheet_id = config.spreadsheet_id.clone();
    let db = AsyncGoogleSheetDb::new(move || Credentials::from_config(&config), spreadsheet_id)?;

    db.insert(&User {
        id: 1,
        name: "Alice".into(),
        email: "alice@example.com".into(),
    })
    .await?;

    let users = vec![
        User {
            id: 2,
            name: "Bob".into(),
            email: "bob@example.com".into(),
        },
        User {
            id: 3,
            name: "Charlie".into(),
            email: "charlie@example.com".into(),
        },
    ];
    let inserted = db.insert_many(&users).await?;
    println!("Inserted {} users.", inserted);

    db.insert(&Product {
        id: 1,
        name: "Laptop".into(),
        price: 999.95,
    })
    .await?;

    println!("All products:");
    for product in db.get_all::<Product>(&Query::new()).await? {
        println!("  {} ({})", product.name, product.price);
    }

    println!("All users:");
    for user in db.get_all::<User>(&Query::new()).await? {
        println!("  {} ({})", user.name, user.email);
    }

    let by_email = Filter::by("email", "alice@example.com");
    println!("Users with email alice@example.com:");
    for user in db.get_all::<User>(&by_email.clone().into()).await? {
        println!("  {} ({})", user.name, user.email);
    }

    match db.get_one::<User>(&by_email).await? {
        Some(alice) => println!("Found user: {}", alice.name),
        None => println!("User not found"),
    }

    match db
        .update::<User>(
            &by_email.clone().and("name", "Alice"),
            json!({"name": "Alice Wonderland", "email": "alice.wonderland@example.com"}),
        )
        .await
    {
        Ok(user) => println!("Updated user: {} ({})", user.name, user.email),
        Err(SheetDbError::NotFound(_)) => println!("User not found"),
        Err(e) => return Err(e.into()),
    }

    match db
        .delete::<User>(&Filter::by("email", "charlie@example.com"))
        .await
    {
        Ok(user) => println!("Deleted user: {} ({})", user.name, user.email),
        Err(SheetDbError::NotFound(_)) => println!("User not found"),
        Err(e) => return Err(e.into()),
    }

    let cleared = db.delete_all::<Product>().await?;
    println!("Products sheet cleared ({} rows).", cleared);

    Ok(())
}
