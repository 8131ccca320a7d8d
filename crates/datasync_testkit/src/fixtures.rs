//! Test fixtures and repository helpers.
//!
//! Provides a small movie catalogue and repositories over every backend,
//! with automatic cleanup of on-disk state.

use datasync_core::{TableData, TableOptions};
use datasync_server::TableController;
use datasync_storage::{
    FileRepository, FileRepositoryConfig, InMemoryRepository, Repository, SqliteRepository,
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Name of the fixture table.
pub const MOVIES: &str = "movies";

/// Number of entities in [`movies`].
pub const MOVIE_COUNT: usize = 16;

// (title, year, duration, rating, best picture, release date)
const CATALOGUE: [(&str, u16, u16, Option<&str>, bool, &str); MOVIE_COUNT] = [
    ("The Shawshank Redemption", 1994, 142, Some("R"), false, "1994-10-14"),
    ("The Godfather", 1972, 175, Some("R"), true, "1972-03-24"),
    ("The Godfather: Part II", 1974, 200, Some("R"), true, "1974-12-20"),
    ("Pulp Fiction", 1994, 168, Some("R"), false, "1994-10-14"),
    ("The Good, the Bad and the Ugly", 1966, 161, None, false, "1967-12-29"),
    ("12 Angry Men", 1957, 96, None, false, "1957-04-10"),
    ("The Dark Knight", 2008, 152, Some("PG-13"), false, "2008-07-18"),
    ("Schindler's List", 1993, 195, Some("R"), true, "1993-12-15"),
    ("The Lord of the Rings: The Return of the King", 2003, 201, Some("PG-13"), true, "2003-12-17"),
    ("Fight Club", 1999, 139, Some("R"), false, "1999-10-15"),
    ("Star Wars: Episode V - The Empire Strikes Back", 1980, 127, Some("PG"), false, "1980-05-21"),
    ("One Flew Over the Cuckoo's Nest", 1975, 133, None, true, "1975-11-21"),
    ("The Lord of the Rings: The Fellowship of the Ring", 2001, 178, Some("PG-13"), false, "2001-12-19"),
    ("Inception", 2010, 148, Some("PG-13"), false, "2010-07-16"),
    ("Goodfellas", 1990, 146, Some("R"), false, "1990-09-19"),
    ("Star Wars", 1977, 121, Some("PG"), false, "1977-05-25"),
];

/// Returns the fixture movies, ids `id-000` to `id-015`, unstamped.
pub fn movies() -> Vec<TableData> {
    CATALOGUE
        .iter()
        .enumerate()
        .map(|(n, (title, year, duration, rating, winner, released))| {
            TableData::new(movie_id(n))
                .with_property("title", *title)
                .with_property("year", *year)
                .with_property("duration", *duration)
                .with_property("rating", rating.map_or(Value::Null, Value::from))
                .with_property("bestPictureWinner", *winner)
                .with_property("releaseDate", format!("{released}T00:00:00.000Z"))
        })
        .collect()
}

/// Returns the id of the `n`th fixture movie.
pub fn movie_id(n: usize) -> String {
    format!("id-{n:03}")
}

/// Stores every fixture movie in `repo`, returning the stored copies.
pub fn seed_movies(repo: &dyn Repository) -> Vec<TableData> {
    movies()
        .into_iter()
        .map(|movie| repo.create(movie).expect("Failed to seed movie"))
        .collect()
}

/// A test repository with automatic cleanup.
pub struct TestRepository {
    /// The repository instance.
    pub repo: Arc<dyn Repository>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestRepository {
    /// Creates an empty in-memory repository.
    pub fn memory() -> Self {
        Self {
            repo: Arc::new(InMemoryRepository::new()),
            _temp_dir: None,
        }
    }

    /// Creates an empty SQLite repository in a temporary directory.
    pub fn sqlite() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let repo = SqliteRepository::open(&temp_dir.path().join("tables.db"), MOVIES)
            .expect("Failed to open sqlite repository");
        Self {
            repo: Arc::new(repo),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Creates an empty journal-file repository in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = FileRepositoryConfig::default().with_sync_on_write(false);
        let repo = FileRepository::open_with_config(&temp_dir.path().join(MOVIES), config)
            .expect("Failed to open file repository");
        Self {
            repo: Arc::new(repo),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Seeds the fixture movies.
    #[must_use]
    pub fn with_movies(self) -> Self {
        seed_movies(self.repo.as_ref());
        self
    }

    /// Returns the temporary directory if on disk, None if in memory.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Wraps the repository in a `movies` controller.
    pub fn controller(&self, options: TableOptions) -> TableController {
        TableController::new(MOVIES, Arc::clone(&self.repo)).with_options(options)
    }
}

impl std::ops::Deref for TestRepository {
    type Target = dyn Repository;

    fn deref(&self) -> &Self::Target {
        self.repo.as_ref()
    }
}

/// Runs a test against a seeded in-memory repository.
pub fn with_movies<F, R>(f: F) -> R
where
    F: FnOnce(&dyn Repository) -> R,
{
    let test_repo = TestRepository::memory().with_movies();
    f(test_repo.repo.as_ref())
}

/// Runs a test once per backend, each seeded with the fixture movies.
pub fn for_each_backend<F>(mut f: F)
where
    F: FnMut(&str, &dyn Repository),
{
    for (name, test_repo) in [
        ("memory", TestRepository::memory()),
        ("sqlite", TestRepository::sqlite()),
        ("file", TestRepository::file()),
    ] {
        let test_repo = test_repo.with_movies();
        f(name, test_repo.repo.as_ref());
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A `movies` controller over seeded in-memory storage.
    pub fn movie_table(options: TableOptions) -> TableController {
        TestRepository::memory().with_movies().controller(options)
    }

    /// A repository holding `count` generated entities `e-0000`, `e-0001`, ...
    pub fn populated_repository(count: usize) -> TestRepository {
        let test_repo = TestRepository::memory();
        for i in 0..count {
            test_repo
                .repo
                .create(TableData::new(format!("e-{i:04}")).with_property("index", i))
                .expect("Failed to create entity");
        }
        test_repo
    }

    /// Soft-deletes the given fixture movies in place.
    pub fn tombstone(repo: &dyn Repository, ids: &[&str]) {
        for id in ids {
            let mut entity = repo.read(id).expect("Failed to read entity");
            entity.deleted = true;
            repo.replace(entity, None).expect("Failed to delete entity");
        }
    }
}
