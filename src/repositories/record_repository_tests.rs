// src/repositories/record_repository_tests.rs
//
// Record + repository behavior against a real pooled database file

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use tempfile::TempDir;

    use crate::db::{ConnectionPool, DatabaseConfig, SqlExecutor};
    use crate::error::DbResult;
    use crate::record::{Model, Record};
    use crate::repositories::RecordRepository;
    use crate::rowset::Value;
    use crate::scheduler::Scheduler;

    // ========================================================================
    // TEST HELPERS
    // ========================================================================

    struct User {
        record: Record,
        display: String,
    }

    impl User {
        fn balance(&self) -> DbResult<i64> {
            self.record.get_long("balance")
        }
    }

    impl Model for User {
        const TABLE: &'static str = "users";
        const PRIMARY_KEY: &'static str = "id";

        fn record(&self) -> &Record {
            &self.record
        }

        fn record_mut(&mut self) -> &mut Record {
            &mut self.record
        }

        fn on_populated(&mut self) {
            self.display = self.record.get_string("name").unwrap_or_default();
        }
    }

    fn setup(dir: &TempDir) -> (Arc<ConnectionPool>, RecordRepository<User>) {
        let scheduler = Arc::new(Scheduler::new().unwrap());
        let config = DatabaseConfig::new("main", dir.path().join("main.db"));
        let pool = Arc::new(ConnectionPool::open(config, scheduler).unwrap());
        pool.try_execute(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                balance INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL DEFAULT 'now',
                note TEXT DEFAULT 'dflt'
             )",
            &[],
        )
        .unwrap();

        let db: Arc<dyn SqlExecutor> = pool.clone();
        let repo = RecordRepository::new(db, |record| User {
            record,
            display: String::new(),
        });
        (pool, repo)
    }

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    // ========================================================================
    // UPSERT
    // ========================================================================

    #[test]
    fn test_get_or_insert_then_add() {
        let dir = TempDir::new().unwrap();
        let (pool, repo) = setup(&dir);

        let mut ann = repo
            .get_or_insert_with(&[("name", "Ann".into()), ("balance", 0.into())], 7)
            .unwrap();
        assert!(ann.exists());
        assert_eq!(ann.record().get_int("id").unwrap(), 7);
        assert_eq!(ann.display, "Ann");
        assert_eq!(ann.balance().unwrap(), 0);
        // Server default picked up by the re-fetch
        assert_eq!(ann.record().get_string("created").as_deref(), Some("now"));

        ann.record_mut().add_sync("balance", 50).unwrap();
        assert_eq!(ann.balance().unwrap(), 50);

        let mut rs = pool.query("SELECT balance FROM users WHERE id = ?", &[7.into()]).unwrap();
        assert!(rs.first());
        assert_eq!(rs.get_long("balance"), 50);
    }

    #[test]
    fn test_get_or_insert_twice_is_stable() {
        let dir = TempDir::new().unwrap();
        let (_pool, repo) = setup(&dir);

        let first = repo.get_or_insert_with(&[("name", "Ann".into())], 3).unwrap();
        let second = repo.get_or_insert_with(&[("name", "Other".into())], 3).unwrap();

        assert_eq!(first.record().columns(), second.record().columns());
        assert_eq!(repo.all().unwrap().len(), 1);
    }

    #[test]
    fn test_get_or_insert_where() {
        let dir = TempDir::new().unwrap();
        let (_pool, repo) = setup(&dir);
        let by_name = [Value::from("Bea")];

        let bea = repo
            .get_or_insert_where(&[("name", "Bea".into()), ("balance", 5.into())], "WHERE name = ?", &by_name)
            .unwrap()
            .unwrap();
        let again = repo
            .get_or_insert_where(&[("name", "Bea".into())], "WHERE name = ?", &by_name)
            .unwrap()
            .unwrap();

        assert_eq!(bea.record().get("id"), again.record().get("id"));
        assert_eq!(again.balance().unwrap(), 5);
        assert_eq!(repo.all().unwrap().len(), 1);
    }

    #[test]
    fn test_get_or_insert_where_unmatched_defaults_insert_once() {
        let dir = TempDir::new().unwrap();
        let (_pool, repo) = setup(&dir);

        // Defaults never satisfy the case-sensitive filter
        let found = repo
            .get_or_insert_where(&[("name", "Ann".into())], "WHERE name = ?", &[Value::from("ann")])
            .unwrap();

        assert!(found.is_none());
        assert_eq!(repo.all().unwrap().len(), 1);
    }

    // ========================================================================
    // INSERT / GET / FIND / DELETE
    // ========================================================================

    #[test]
    fn test_insert_writes_explicit_null() {
        let dir = TempDir::new().unwrap();
        let (_pool, repo) = setup(&dir);

        let cleared = repo
            .get_or_insert_with(&[("name", "Ann".into()), ("note", Value::Null)], 1)
            .unwrap();
        assert_eq!(cleared.record().get("note"), Some(&Value::Null));

        let defaulted = repo.get_or_insert_with(&[("name", "Bob".into())], 2).unwrap();
        assert_eq!(defaulted.record().get_string("note").as_deref(), Some("dflt"));
    }

    #[test]
    fn test_insert_round_trips_quotes() {
        let dir = TempDir::new().unwrap();
        let (_pool, repo) = setup(&dir);

        let mut user = repo.create();
        user.record_mut().set("id", 11);
        user.record_mut().set("name", "O'Brien; DROP TABLE users; --");
        user.record_mut().set("balance", 9);
        assert_eq!(repo.insert(&user).unwrap(), 1);

        let loaded = repo.get(11).unwrap();
        assert_eq!(
            loaded.record().get_string("name").as_deref(),
            Some("O'Brien; DROP TABLE users; --")
        );
        assert_eq!(loaded.balance().unwrap(), 9);
    }

    #[test]
    fn test_duplicate_insert_is_classified() {
        let dir = TempDir::new().unwrap();
        let (_pool, repo) = setup(&dir);

        let mut user = repo.create();
        user.record_mut().set("id", 1);
        repo.insert(&user).unwrap();
        assert!(repo.insert(&user).unwrap_err().is_duplicate_key());
    }

    #[test]
    fn test_get_into_miss_keeps_target_unpopulated() {
        let dir = TempDir::new().unwrap();
        let (_pool, repo) = setup(&dir);

        let mut target = repo.create();
        repo.get_into(&mut target, 404).unwrap();
        assert!(!target.exists());
    }

    #[test]
    fn test_find_order_and_delete() {
        let dir = TempDir::new().unwrap();
        let (_pool, repo) = setup(&dir);
        for (id, name, balance) in [(1, "Ann", 10), (2, "Bob", 30), (3, "Cy", 20)] {
            repo.get_or_insert_with(&[("name", name.into()), ("balance", balance.into())], id)
                .unwrap();
        }

        let rich = repo
            .find("WHERE balance >= ? ORDER BY balance DESC", &[15.into()])
            .unwrap();
        let names: Vec<&str> = rich.iter().map(|u| u.display.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Cy"]);

        let first = repo.find_first("ORDER BY id", &[]).unwrap().unwrap();
        assert_eq!(first.display, "Ann");

        repo.delete("WHERE balance < ?", &[25.into()]);
        let left = repo.all().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].display, "Bob");

        // Broken filter: logged and dropped
        repo.delete("WHERE nope(", &[]);
        assert!(repo.find_first("WHERE id = ?", &[404.into()]).unwrap().is_none());
    }

    // ========================================================================
    // RECORD PERSISTENCE
    // ========================================================================

    #[test]
    fn test_background_set_is_persisted() {
        let dir = TempDir::new().unwrap();
        let (_pool, repo) = setup(&dir);

        let mut user = repo.get_or_insert_with(&[("name", "Ann".into())], 5).unwrap();
        user.record_mut().set("name", "Annie");
        assert_eq!(user.record().get_string("name").as_deref(), Some("Annie"));

        assert!(wait_for(|| {
            repo.get(5)
                .map(|u| u.display == "Annie")
                .unwrap_or(false)
        }));
    }

    #[test]
    fn test_set_sync_is_visible_immediately() {
        let dir = TempDir::new().unwrap();
        let (_pool, repo) = setup(&dir);

        let mut user = repo.get_or_insert(8).unwrap();
        user.record_mut().set_sync("name", "Dee").unwrap();
        user.record_mut().set_sync("id", 80).unwrap();

        assert_eq!(repo.get(8).unwrap().display, "Dee");
        assert!(!repo.get(80).unwrap().exists());
    }

    #[test]
    fn test_delta_keeps_concurrent_writes() {
        let dir = TempDir::new().unwrap();
        let (pool, repo) = setup(&dir);

        let mut user = repo.get_or_insert_with(&[("balance", 100.into())], 2).unwrap();
        // Another writer moves the balance behind the record's back
        pool.try_execute("UPDATE users SET balance = balance + 7 WHERE id = ?", &[2.into()])
            .unwrap();

        user.record_mut().sub_sync("balance", 30).unwrap();
        assert_eq!(user.balance().unwrap(), 70);
        assert_eq!(repo.get(2).unwrap().balance().unwrap(), 77);
    }
}
