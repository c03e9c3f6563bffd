use crate::db::SqliteStore;
use crate::error::Result;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings()?;
    let db_path = settings.db_path();

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Log level:  {}", settings.log_level);

    if db_path.exists() {
        let store = SqliteStore::open(&db_path)?;
        let conn = store.conn()?;
        let count = |table: &str| -> Result<i64> {
            Ok(conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))?)
        };
        let failed: i64 = conn.query_row(
            "SELECT count(*) FROM import_submissions WHERE status = 'failed'",
            [],
            |r| r.get(0),
        )?;

        println!();
        println!("Accounts:      {}", count("accounts")?);
        println!("Transactions:  {}", count("transactions")?);
        println!("Balances:      {}", count("balances")?);
        println!("Imports:       {} ({failed} failed)", count("import_submissions")?);
        println!("Budgets:       {}", count("budgets")?);
    } else {
        println!();
        println!("Database not found. Run `cashbook init` to set up.");
    }

    Ok(())
}
