//! Dump command implementation.

use super::{open_repository, Backend};
use chrono::SecondsFormat;
use datasync_core::TableData;
use datasync_storage::Repository;
use std::path::Path;

/// Runs the dump command.
pub fn run(
    backend: Backend,
    data: &Path,
    table: &str,
    json: bool,
    include_deleted: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if backend == Backend::Memory {
        return Err("nothing to dump from the memory backend".into());
    }
    let repository = open_repository(backend, Some(data), table)?;
    let entities = collect(repository.as_ref(), include_deleted)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entities)?);
    } else {
        print_text_output(table, &entities);
    }
    Ok(())
}

/// Loads the entities to print, oldest change first.
fn collect(
    repository: &dyn Repository,
    include_deleted: bool,
) -> Result<Vec<TableData>, Box<dyn std::error::Error>> {
    let mut entities: Vec<TableData> = repository
        .query()?
        .into_iter()
        .filter(|entity| include_deleted || !entity.deleted)
        .collect();
    entities.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));
    Ok(entities)
}

fn print_text_output(table: &str, entities: &[TableData]) {
    println!("Table: {table} ({} entities)", entities.len());
    println!();
    for entity in entities {
        println!("{}", text_line(entity));
    }
}

fn text_line(entity: &TableData) -> String {
    format!(
        "{:<24} {} {:<14} {}{}",
        entity.id,
        entity.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        entity.version.to_base64(),
        if entity.deleted { "[deleted] " } else { "" },
        serde_json::Value::Object(entity.properties.clone()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasync_storage::InMemoryRepository;

    #[test]
    fn collect_orders_and_filters() {
        let repo = InMemoryRepository::new();
        repo.create(TableData::new("b")).unwrap();
        repo.create(TableData::new("a")).unwrap();
        let mut gone = repo.create(TableData::new("c")).unwrap();
        gone.deleted = true;
        repo.replace(gone, None).unwrap();

        let live = collect(&repo, false).unwrap();
        assert_eq!(live.len(), 2);
        assert!(live[0].updated_at <= live[1].updated_at);

        let all = collect(&repo, true).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].id, "c");
    }

    #[test]
    fn text_line_shape() {
        let mut entity = TableData::new("m1").with_property("title", "Heat");
        entity.deleted = true;
        let line = text_line(&entity);
        assert!(line.starts_with("m1 "));
        assert!(line.contains("1970-01-01T00:00:00.000Z"));
        assert!(line.contains("[deleted] {\"title\":\"Heat\"}"));
    }

    #[test]
    fn memory_backend_has_nothing_to_dump() {
        assert!(run(Backend::Memory, Path::new("."), "movies", false, false).is_err());
    }
}
