use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use crate::models::Recipe;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// Column order shared by every SELECT and by `recipe_from_row`.
const RECIPE_COLUMNS: &str = "uid, name, rating, photo_hash, on_favorites, photo, scale,
    ingredients, is_pinned, source, total_time, hash, description, source_url, difficulty,
    on_grocery_list, in_trash, directions, categories, photo_url, cook_time, created, notes,
    photo_large, image_url, prep_time, servings, nutritional_info, has_nutrition_info,
    is_modified";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection is not open")]
    ConnectionNotOpen,

    #[error("database connection is already open")]
    ConnectionAlreadyOpen,

    #[error("database operation failed: {0}")]
    OperationFailed(#[from] rusqlite::Error),

    #[error("{0}")]
    Generic(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Whether an upsert created a row or replaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Updated,
}

/// One open/close bracket around a single store operation.
struct Session<'a> {
    path: &'a Path,
    conn: Option<Connection>,
}

impl<'a> Session<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, conn: None }
    }

    fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Err(StoreError::ConnectionAlreadyOpen);
        }
        let conn = Connection::open(self.path).map_err(|e| {
            StoreError::Generic(format!(
                "failed to open database {}: {e}",
                self.path.display()
            ))
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        self.conn = Some(conn);
        Ok(())
    }

    fn conn(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(StoreError::ConnectionNotOpen)
    }

    fn close(&mut self) -> Result<()> {
        let conn = self.conn.take().ok_or(StoreError::ConnectionNotOpen)?;
        conn.close().map_err(|(_, e)| StoreError::OperationFailed(e))
    }
}

/// Recipe storage over a single SQLite file.
///
/// A connection is opened and closed around every public operation. Writers
/// are serialized by `write_lock`; readers never take it. Share one `Store`
/// (behind an `Arc`) between every agent so they all contend on the same lock.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Store {
    /// Open (creating if needed) the database file and bring its schema up to date.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Generic(format!(
                    "failed to create data directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let store = Self {
            path,
            write_lock: Mutex::new(()),
        };
        store.with_session(migrate)?;
        Ok(store)
    }

    /// Run `op` between an open and a close. If `op` fails the connection is
    /// still closed and `op`'s error wins.
    fn with_session<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut session = Session::new(&self.path);
        session.open()?;
        let result = session.conn().and_then(op);
        match result {
            Ok(value) => {
                session.close()?;
                Ok(value)
            }
            Err(e) => {
                let _ = session.close();
                Err(e)
            }
        }
    }

    /// Insert the recipe, or overwrite every column of the row with the same `uid`.
    pub fn upsert(&self, recipe: &Recipe) -> Result<Upserted> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.with_session(|conn| {
            let tx = conn.transaction()?;
            let exists = tx
                .query_row(
                    "SELECT 1 FROM recipes WHERE uid = ?1",
                    params![recipe.uid],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            let categories = serde_json::to_string(&recipe.categories)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            let outcome = if exists {
                tx.execute(
                    "UPDATE recipes SET name=?2, rating=?3, photo_hash=?4, on_favorites=?5,
                     photo=?6, scale=?7, ingredients=?8, is_pinned=?9, source=?10,
                     total_time=?11, hash=?12, description=?13, source_url=?14,
                     difficulty=?15, on_grocery_list=?16, in_trash=?17, directions=?18,
                     categories=?19, photo_url=?20, cook_time=?21, created=?22, notes=?23,
                     photo_large=?24, image_url=?25, prep_time=?26, servings=?27,
                     nutritional_info=?28, has_nutrition_info=?29, is_modified=?30
                     WHERE uid=?1",
                    params![
                        recipe.uid,
                        recipe.name,
                        recipe.rating,
                        recipe.photo_hash,
                        recipe.on_favorites,
                        recipe.photo,
                        recipe.scale,
                        recipe.ingredients,
                        recipe.is_pinned,
                        recipe.source,
                        recipe.total_time,
                        recipe.content_hash,
                        recipe.description,
                        recipe.source_url,
                        recipe.difficulty,
                        recipe.on_grocery_list,
                        recipe.in_trash,
                        recipe.directions,
                        categories,
                        recipe.photo_url,
                        recipe.cook_time,
                        recipe.created,
                        recipe.notes,
                        recipe.photo_large,
                        recipe.image_url,
                        recipe.prep_time,
                        recipe.servings,
                        recipe.nutritional_info,
                        i64::from(recipe.has_nutrition_info),
                        i64::from(recipe.is_modified),
                    ],
                )?;
                Upserted::Updated
            } else {
                tx.execute(
                    &format!(
                        "INSERT INTO recipes ({RECIPE_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                                 ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
                                 ?27, ?28, ?29, ?30)"
                    ),
                    params![
                        recipe.uid,
                        recipe.name,
                        recipe.rating,
                        recipe.photo_hash,
                        recipe.on_favorites,
                        recipe.photo,
                        recipe.scale,
                        recipe.ingredients,
                        recipe.is_pinned,
                        recipe.source,
                        recipe.total_time,
                        recipe.content_hash,
                        recipe.description,
                        recipe.source_url,
                        recipe.difficulty,
                        recipe.on_grocery_list,
                        recipe.in_trash,
                        recipe.directions,
                        categories,
                        recipe.photo_url,
                        recipe.cook_time,
                        recipe.created,
                        recipe.notes,
                        recipe.photo_large,
                        recipe.image_url,
                        recipe.prep_time,
                        recipe.servings,
                        recipe.nutritional_info,
                        i64::from(recipe.has_nutrition_info),
                        i64::from(recipe.is_modified),
                    ],
                )?;
                Upserted::Inserted
            };
            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Read one recipe. `Ok(None)` when no row has this `uid`.
    pub fn read(&self, uid: &str) -> Result<Option<Recipe>> {
        self.with_session(|conn| {
            let recipe = conn
                .query_row(
                    &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE uid = ?1"),
                    params![uid],
                    recipe_from_row,
                )
                .optional()?;
            Ok(recipe)
        })
    }

    /// Every stored `uid`, sorted. Any failure yields an error, never a partial list.
    pub fn list_uids(&self) -> Result<Vec<String>> {
        self.with_session(|conn| {
            let mut stmt = conn.prepare("SELECT uid FROM recipes ORDER BY uid")?;
            let uids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(uids)
        })
    }

    pub fn count(&self) -> Result<usize> {
        self.with_session(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM recipes", [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
    }
}

fn migrate(conn: &mut Connection) -> Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    // WAL lets readers proceed while the single serialized writer commits.
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS recipes (
                uid TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                rating INTEGER NOT NULL DEFAULT 0,
                photo_hash TEXT NOT NULL DEFAULT '',
                on_favorites INTEGER NOT NULL DEFAULT 0,
                photo TEXT NOT NULL DEFAULT '',
                scale TEXT NOT NULL DEFAULT '',
                ingredients TEXT NOT NULL DEFAULT '',
                is_pinned INTEGER NOT NULL DEFAULT 0,
                source TEXT NOT NULL DEFAULT '',
                total_time TEXT NOT NULL DEFAULT '',
                hash TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                source_url TEXT NOT NULL DEFAULT '',
                difficulty TEXT NOT NULL DEFAULT '',
                on_grocery_list INTEGER NOT NULL DEFAULT 0,
                in_trash INTEGER NOT NULL DEFAULT 0,
                directions TEXT NOT NULL DEFAULT '',
                categories TEXT NOT NULL DEFAULT '[]',
                photo_url TEXT,
                cook_time TEXT NOT NULL DEFAULT '',
                created TEXT NOT NULL DEFAULT '',
                notes TEXT NOT NULL DEFAULT '',
                photo_large TEXT,
                image_url TEXT NOT NULL DEFAULT '',
                prep_time TEXT NOT NULL DEFAULT '',
                servings TEXT NOT NULL DEFAULT '',
                nutritional_info TEXT NOT NULL DEFAULT '',
                has_nutrition_info INTEGER NOT NULL DEFAULT 0,
                is_modified INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_recipes_nutrition ON recipes(has_nutrition_info);

            PRAGMA user_version = 1;",
        )?;
    }

    Ok(())
}

fn recipe_from_row(row: &Row) -> rusqlite::Result<Recipe> {
    let categories_json: String = row.get(18)?;
    let categories: Vec<String> = serde_json::from_str(&categories_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(18, Type::Text, Box::new(e)))?;
    Ok(Recipe {
        uid: row.get(0)?,
        name: row.get(1)?,
        rating: row.get(2)?,
        photo_hash: row.get(3)?,
        on_favorites: row.get::<_, i64>(4)? != 0,
        photo: row.get(5)?,
        scale: row.get(6)?,
        ingredients: row.get(7)?,
        is_pinned: row.get::<_, i64>(8)? != 0,
        source: row.get(9)?,
        total_time: row.get(10)?,
        content_hash: row.get(11)?,
        description: row.get(12)?,
        source_url: row.get(13)?,
        difficulty: row.get(14)?,
        on_grocery_list: row.get::<_, i64>(15)? != 0,
        in_trash: row.get::<_, i64>(16)? != 0,
        directions: row.get(17)?,
        categories,
        photo_url: row.get(19)?,
        cook_time: row.get(20)?,
        created: row.get(21)?,
        notes: row.get(22)?,
        photo_large: row.get(23)?,
        image_url: row.get(24)?,
        prep_time: row.get(25)?,
        servings: row.get(26)?,
        nutritional_info: row.get(27)?,
        has_nutrition_info: row.get::<_, i64>(28)? != 0,
        is_modified: row.get::<_, i64>(29)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;
    use crate::test_support::{sample_recipe, temp_store};

    #[test]
    fn test_upsert_and_read_roundtrip() {
        let (_dir, store) = temp_store();
        let mut recipe = sample_recipe("A1");
        recipe.photo_url = Some("https://example.com/chili.jpg".to_string());
        recipe.on_favorites = true;
        recipe.is_modified = true;
        recipe.has_nutrition_info = true;
        recipe.refresh_hash().unwrap();

        assert_eq!(store.upsert(&recipe).unwrap(), Upserted::Inserted);
        let fetched = store.read("A1").unwrap().unwrap();
        assert_eq!(fetched, recipe);
        assert_eq!(fetched.categories, vec!["Dinner", "Slow Cooker"]);
        assert!(fetched.photo_large.is_none());
    }

    #[test]
    fn test_hash_survives_roundtrip() {
        let (_dir, store) = temp_store();
        let mut recipe = sample_recipe("A1");
        recipe.refresh_hash().unwrap();
        store.upsert(&recipe).unwrap();
        let fetched = store.read("A1").unwrap().unwrap();
        assert_eq!(fetched.compute_hash().unwrap(), recipe.content_hash);
    }

    #[test]
    fn test_upsert_same_uid_updates_in_place() {
        let (_dir, store) = temp_store();
        let mut recipe = sample_recipe("A1");
        store.upsert(&recipe).unwrap();
        recipe.name = "Chili (Updated)".to_string();
        recipe.categories.clear();
        assert_eq!(store.upsert(&recipe).unwrap(), Upserted::Updated);

        assert_eq!(store.list_uids().unwrap(), vec!["A1"]);
        assert_eq!(store.count().unwrap(), 1);
        let fetched = store.read("A1").unwrap().unwrap();
        assert_eq!(fetched.name, "Chili (Updated)");
        assert!(fetched.categories.is_empty());
    }

    #[test]
    fn test_read_missing_returns_none() {
        let (_dir, store) = temp_store();
        assert!(store.read("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_uids_sorted() {
        let (_dir, store) = temp_store();
        assert!(store.list_uids().unwrap().is_empty());
        for uid in ["C", "A", "B"] {
            store.upsert(&sample_recipe(uid)).unwrap();
        }
        assert_eq!(store.list_uids().unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_store_persists_across_instances() {
        let (dir, store) = temp_store();
        store.upsert(&sample_recipe("A1")).unwrap();
        drop(store);
        let reopened = Store::open(dir.path().join("mealprep.db")).unwrap();
        assert!(reopened.read("A1").unwrap().is_some());
    }

    #[test]
    fn test_corrupt_categories_column_is_an_error() {
        let (dir, store) = temp_store();
        store.upsert(&sample_recipe("A1")).unwrap();
        let conn = Connection::open(dir.path().join("mealprep.db")).unwrap();
        conn.execute("UPDATE recipes SET categories = 'not json' WHERE uid = 'A1'", [])
            .unwrap();
        drop(conn);

        let err = store.read("A1").unwrap_err();
        assert!(matches!(
            err,
            StoreError::OperationFailed(rusqlite::Error::FromSqlConversionFailure(18, _, _))
        ));
    }

    #[test]
    fn test_session_misuse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.db");
        let mut session = Session::new(&path);
        assert!(matches!(session.close(), Err(StoreError::ConnectionNotOpen)));
        assert!(matches!(session.conn(), Err(StoreError::ConnectionNotOpen)));
        session.open().unwrap();
        assert!(matches!(
            session.open(),
            Err(StoreError::ConnectionAlreadyOpen)
        ));
        session.close().unwrap();
        assert!(matches!(session.close(), Err(StoreError::ConnectionNotOpen)));
    }

    #[test]
    fn test_unopenable_path_is_generic_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let path = blocker.join("mealprep.db");

        let mut session = Session::new(&path);
        assert!(matches!(session.open(), Err(StoreError::Generic(_))));
        assert!(matches!(Store::open(path.clone()), Err(StoreError::Generic(_))));
    }

    #[test]
    fn test_concurrent_upserts_never_mix_fields() {
        let (_dir, store) = temp_store();
        let store = Arc::new(store);

        let mut first = sample_recipe("SAME");
        first.name = "First".to_string();
        first.directions = "first directions".to_string();
        first.categories = vec!["one".to_string()];
        let mut second = sample_recipe("SAME");
        second.name = "Second".to_string();
        second.directions = "second directions".to_string();
        second.categories = vec!["two".to_string()];

        for _ in 0..10 {
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = [first.clone(), second.clone()]
                .into_iter()
                .map(|recipe| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        store.upsert(&recipe).unwrap();
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let stored = store.read("SAME").unwrap().unwrap();
            assert!(stored == first || stored == second, "mixed row: {stored:?}");
            assert_eq!(store.count().unwrap(), 1);
        }
    }
}
