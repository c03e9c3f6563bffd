use comfy_table::{Cell, Table};

use crate::cli::open_store;
use crate::error::Result;
use crate::store::CategoryRepository;

pub fn list() -> Result<()> {
    let (_, store) = open_store()?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name"]);
    for c in store.list_categories()? {
        table.add_row(vec![Cell::new(c.id), Cell::new(c.name)]);
    }
    println!("Categories\n{table}");
    Ok(())
}

pub fn add(name: &str) -> Result<()> {
    let (_, store) = open_store()?;
    let id = store.add_category(name)?;
    println!("Added category {id}: {name}");
    Ok(())
}
