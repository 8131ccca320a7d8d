//! Compact command implementation.

use datasync_storage::FileRepository;
use std::path::Path;

/// Runs the compact command.
pub fn run(data: &Path, table: &str) -> Result<(), Box<dyn std::error::Error>> {
    let dir = data.join(table);
    if !dir.is_dir() {
        return Err(format!("no file table at {}", dir.display()).into());
    }

    let repository = FileRepository::open(&dir)?;
    let before = repository.journal_len();
    let dropped = repository.compact()?;

    println!("Compacted {}", dir.display());
    println!("  Records before: {before}");
    println!("  Records after:  {}", repository.journal_len());
    println!("  Dropped:        {dropped}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasync_core::TableData;
    use datasync_storage::Repository;

    #[test]
    fn compacts_existing_table() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = FileRepository::open(&dir.path().join("movies")).unwrap();
            repo.create(TableData::new("m1")).unwrap();
            repo.replace(TableData::new("m1"), None).unwrap();
        }
        run(dir.path(), "movies").unwrap();

        let repo = FileRepository::open(&dir.path().join("movies")).unwrap();
        assert_eq!(repo.journal_len(), 1);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn missing_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path(), "movies").is_err());
    }
}
