use crate::db::SqliteStore;
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings()?;
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    std::fs::create_dir_all(&settings.data_dir)?;

    let db_path = settings.db_path();
    SqliteStore::open(&db_path)?;
    save_settings(&settings)?;

    println!("Initialized cashbook at {}", db_path.display());
    Ok(())
}
