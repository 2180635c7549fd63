//! Integration tests for the storage schema upgrade.
//!
//! These tests drive the public ag-storage API against real SQLite and
//! DuckDB databases, wrapping them where a test needs to observe or perturb
//! what the engine sends to the backend.

use ag_core::SchemaVersion;
use ag_db::{Database, DbError, DbResult, DuckDbBackend, SqliteBackend, Transaction};
use ag_storage::migration::current_version;
use ag_storage::version::{ensure_config_table, set_config_value, SCHEMA_CATEGORY, VERSION_KEY};
use ag_storage::{upgrade, MigrationRegistry, MigrationStep, StorageError, StorageProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Helpers ────────────────────────────────────────────────────────────

fn backends() -> Vec<Arc<dyn Database>> {
    vec![
        Arc::new(SqliteBackend::in_memory().unwrap()),
        Arc::new(DuckDbBackend::in_memory().unwrap()),
    ]
}

/// Version 1 creates two tables and an index, version 2 changes nothing.
fn scenario_registry() -> MigrationRegistry {
    MigrationRegistry::new(vec![
        MigrationStep::new(1)
            .table(
                "users_info",
                "CREATE TABLE {table} (username VARCHAR(100) PRIMARY KEY, email VARCHAR(255))",
            )
            .table(
                "identity_verification",
                "CREATE TABLE {table} (token VARCHAR(512), username VARCHAR(100))",
            )
            .index(
                "identity_verification_token_idx",
                "identity_verification",
                &["token"],
            ),
        MigrationStep::new(2),
    ])
    .unwrap()
}

fn set_version(db: &dyn Database, value: &str) {
    let mut tx = db.begin().unwrap();
    ensure_config_table(tx.as_mut()).unwrap();
    set_config_value(tx.as_mut(), SCHEMA_CATEGORY, VERSION_KEY, value).unwrap();
    tx.commit().unwrap();
}

/// Transaction wrapper that records executed SQL, can report a stale
/// table list, and can fail statements with a given prefix.
struct WrappedTransaction<'a> {
    inner: Box<dyn Transaction + 'a>,
    executed: &'a Mutex<Vec<String>>,
    stale_tables: Option<Vec<String>>,
    fail_prefix: Option<&'static str>,
}

impl Transaction for WrappedTransaction<'_> {
    fn execute(&mut self, sql: &str, params: &[&str]) -> DbResult<usize> {
        self.executed.lock().unwrap().push(sql.to_string());
        if let Some(prefix) = self.fail_prefix.filter(|p| sql.starts_with(p)) {
            return Err(DbError::ExecutionError(format!("refused: {prefix}")));
        }
        self.inner.execute(sql, params)
    }

    fn query_optional_string(&mut self, sql: &str, params: &[&str]) -> DbResult<Option<String>> {
        self.inner.query_optional_string(sql, params)
    }

    fn query_count(&mut self, sql: &str) -> DbResult<usize> {
        self.inner.query_count(sql)
    }

    fn table_names(&mut self) -> DbResult<Vec<String>> {
        match &self.stale_tables {
            Some(tables) => Ok(tables.clone()),
            None => self.inner.table_names(),
        }
    }

    fn index_names(&mut self) -> DbResult<Vec<String>> {
        self.inner.index_names()
    }

    fn commit(self: Box<Self>) -> DbResult<()> {
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> DbResult<()> {
        self.inner.rollback()
    }
}

/// Database wrapper that can claim another backend identity, and can
/// simulate a peer process that commits a step just before ours begins.
struct WrappedDatabase {
    inner: Arc<dyn Database>,
    identity: &'static str,
    executed: Mutex<Vec<String>>,
    begins: AtomicUsize,
    /// On this `begin` call (1-based), run `peer` first and then report
    /// `stale_tables` as the catalog.
    stale_on_begin: Option<usize>,
    stale_tables: Vec<String>,
    peer: Option<MigrationRegistry>,
    fail_prefix: Option<&'static str>,
}

impl WrappedDatabase {
    fn new(inner: Arc<dyn Database>, identity: &'static str) -> Self {
        Self {
            inner,
            identity,
            executed: Mutex::new(Vec::new()),
            begins: AtomicUsize::new(0),
            stale_on_begin: None,
            stale_tables: Vec::new(),
            peer: None,
            fail_prefix: None,
        }
    }

    fn failing(mut self, prefix: &'static str) -> Self {
        self.fail_prefix = Some(prefix);
        self
    }

    fn stale_on_begin(
        mut self,
        n: usize,
        tables: &[&str],
        peer: Option<MigrationRegistry>,
    ) -> Self {
        self.stale_on_begin = Some(n);
        self.stale_tables = tables.iter().map(|t| t.to_string()).collect();
        self.peer = peer;
        self
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl Database for WrappedDatabase {
    fn begin(&self) -> DbResult<Box<dyn Transaction + '_>> {
        let n = self.begins.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stale_tables = None;
        if self.stale_on_begin == Some(n) {
            stale_tables = Some(self.stale_tables.clone());
            if let Some(peer) = &self.peer {
                upgrade(self.inner.as_ref(), peer).unwrap();
            }
        }
        Ok(Box::new(WrappedTransaction {
            inner: self.inner.begin()?,
            executed: &self.executed,
            stale_tables,
            fail_prefix: self.fail_prefix,
        }))
    }

    fn db_type(&self) -> &'static str {
        self.identity
    }
}

// ── Testable properties ───────────────────────────────────────────────

#[test]
fn test_idempotent_rerun() {
    for db in backends() {
        let registry = MigrationRegistry::builtin();
        let first = upgrade(db.as_ref(), &registry).unwrap();
        let tables = db.table_names().unwrap();
        let indexes = db.index_names().unwrap();

        let second = upgrade(db.as_ref(), &registry).unwrap();
        assert_eq!(second.to, first.to);
        assert!(second.applied.is_empty());
        assert_eq!(db.table_names().unwrap(), tables);
        assert_eq!(db.index_names().unwrap(), indexes);
    }
}

#[test]
fn test_partial_failure_leaves_previous_version() {
    for db in backends() {
        let registry = MigrationRegistry::new(vec![
            MigrationStep::new(1).table("users_info", "CREATE TABLE {table} (username VARCHAR(100))"),
            MigrationStep::new(2)
                .table("identity_verification", "CREATE TABLE {table} (token VARCHAR(512))")
                .index("identity_verification_token_idx", "identity_verification", &["token"])
                .statement("deliberate failure", "INSERT INTO identity_verification VALUES (1, 2, 3)"),
        ])
        .unwrap();

        let err = upgrade(db.as_ref(), &registry).unwrap_err();
        assert!(
            matches!(err, StorageError::Step { version, .. } if version == SchemaVersion::new(2)),
            "got {err:?}"
        );
        assert_eq!(current_version(db.as_ref()).unwrap(), SchemaVersion::new(1));
        assert!(!db
            .table_names()
            .unwrap()
            .contains(&"identity_verification".to_string()));
        assert!(db.index_names().unwrap().is_empty());
    }
}

#[test]
fn test_version_is_monotonic_across_runs() {
    for db in backends() {
        let steps = vec![
            MigrationStep::new(1).table("users_info", "CREATE TABLE {table} (username VARCHAR(100))"),
            MigrationStep::new(2),
            MigrationStep::new(3).table("identity_verification", "CREATE TABLE {table} (token VARCHAR(512))"),
        ];

        let mut observed = vec![current_version(db.as_ref()).unwrap()];
        for n in 1..=steps.len() {
            let registry = MigrationRegistry::new(steps[..n].to_vec()).unwrap();
            let report = upgrade(db.as_ref(), &registry).unwrap();
            // Exactly the one new version, never a skip.
            assert_eq!(report.applied, vec![SchemaVersion::new(n as u32)]);
            observed.push(current_version(db.as_ref()).unwrap());
        }

        assert_eq!(
            observed,
            (0..=3).map(SchemaVersion::new).collect::<Vec<_>>()
        );
    }
}

#[test]
fn test_index_skipped_without_conditional_index_support() {
    for inner in backends() {
        let native = inner.db_type();
        let disguised = WrappedDatabase::new(inner, "mysql");

        let report = upgrade(&disguised, &scenario_registry()).unwrap();
        assert_eq!(report.backend, "mysql");
        assert_eq!(report.to, SchemaVersion::new(2));
        assert_eq!(
            report.skipped_indexes,
            vec![(
                SchemaVersion::new(1),
                "identity_verification_token_idx".to_string()
            )]
        );
        assert!(
            disguised
                .executed()
                .iter()
                .all(|sql| !sql.contains("CREATE INDEX")),
            "{native}: index statement attempted"
        );
        assert!(disguised.index_names().unwrap().is_empty());
    }
}

#[test]
fn test_index_created_with_conditional_index_support() {
    for inner in backends() {
        let identity = inner.db_type();
        let wrapped = WrappedDatabase::new(inner, identity);

        let report = upgrade(&wrapped, &scenario_registry()).unwrap();
        assert!(report.skipped_indexes.is_empty());
        assert!(wrapped
            .executed()
            .iter()
            .any(|sql| sql.starts_with("CREATE INDEX IF NOT EXISTS identity_verification_token_idx")));
        assert_eq!(
            wrapped.index_names().unwrap(),
            vec!["identity_verification_token_idx".to_string()]
        );
    }
}

#[test]
fn test_failed_version_write_rolls_back_step() {
    for inner in backends() {
        let identity = inner.db_type();
        let wrapped = WrappedDatabase::new(inner, identity).failing("UPDATE config");

        let err = upgrade(&wrapped, &scenario_registry()).unwrap_err();
        match &err {
            StorageError::Step { version, source } => {
                assert_eq!(*version, SchemaVersion::new(1));
                assert!(
                    matches!(
                        source.as_ref(),
                        StorageError::Finalization { version, .. } if *version == SchemaVersion::new(1)
                    ),
                    "{identity}: got {source:?}"
                );
            }
            other => panic!("{identity}: unexpected error: {other:?}"),
        }

        assert_eq!(current_version(&wrapped).unwrap(), SchemaVersion::ZERO);
        assert_eq!(wrapped.table_names().unwrap(), vec!["config"], "{identity}");
        assert!(wrapped.index_names().unwrap().is_empty(), "{identity}");
    }
}

#[test]
fn test_noop_version_bump() {
    for db in backends() {
        let registry = scenario_registry();
        let v1_only = MigrationRegistry::new(registry.steps()[..1].to_vec()).unwrap();
        upgrade(db.as_ref(), &v1_only).unwrap();
        let tables = db.table_names().unwrap();
        let indexes = db.index_names().unwrap();

        let report = upgrade(db.as_ref(), &registry).unwrap();
        assert_eq!(report.applied, vec![SchemaVersion::new(2)]);
        assert_eq!(current_version(db.as_ref()).unwrap(), SchemaVersion::new(2));
        assert_eq!(db.table_names().unwrap(), tables);
        assert_eq!(db.index_names().unwrap(), indexes);
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────

#[test]
fn test_scenario_fresh_database() {
    for db in backends() {
        let report = upgrade(db.as_ref(), &scenario_registry()).unwrap();
        assert_eq!(report.from, SchemaVersion::ZERO);
        assert_eq!(report.to, SchemaVersion::new(2));
        assert_eq!(current_version(db.as_ref()).unwrap(), SchemaVersion::new(2));
        assert_eq!(
            db.table_names().unwrap(),
            vec!["config", "identity_verification", "users_info"]
        );
        assert_eq!(
            db.index_names().unwrap(),
            vec!["identity_verification_token_idx".to_string()]
        );
    }
}

#[test]
fn test_scenario_resume_from_version_one() {
    for db in backends() {
        {
            let mut tx = db.begin().unwrap();
            tx.execute(
                "CREATE TABLE users_info (username VARCHAR(100) PRIMARY KEY, email VARCHAR(255))",
                &[],
            )
            .unwrap();
            tx.execute(
                "INSERT INTO users_info VALUES (?, ?)",
                &["john", "john@example.com"],
            )
            .unwrap();
            tx.execute(
                "CREATE TABLE identity_verification (token VARCHAR(512), username VARCHAR(100))",
                &[],
            )
            .unwrap();
            tx.commit().unwrap();
        }
        set_version(db.as_ref(), "1");

        let wrapped = WrappedDatabase::new(Arc::clone(&db), db.db_type());
        let report = upgrade(&wrapped, &scenario_registry()).unwrap();
        assert_eq!(report.from, SchemaVersion::new(1));
        assert_eq!(report.applied, vec![SchemaVersion::new(2)]);
        assert!(wrapped
            .executed()
            .iter()
            .all(|sql| !sql.starts_with("CREATE TABLE users_info")
                && !sql.starts_with("CREATE TABLE identity_verification")));

        let mut tx = db.begin().unwrap();
        assert_eq!(
            tx.query_optional_string("SELECT email FROM users_info WHERE username = ?", &["john"])
                .unwrap()
                .as_deref(),
            Some("john@example.com")
        );
    }
}

#[test]
fn test_scenario_schema_from_newer_release() {
    for db in backends() {
        set_version(db.as_ref(), "3");
        let err = upgrade(db.as_ref(), &scenario_registry()).unwrap_err();
        assert!(matches!(err, StorageError::SchemaTooNew { .. }), "got {err:?}");
        assert!(err.to_string().contains("newer than the latest supported version 2"));
    }
}

#[test]
fn test_scenario_corrupt_version_record() {
    for db in backends() {
        set_version(db.as_ref(), "-1");
        let err = upgrade(db.as_ref(), &scenario_registry()).unwrap_err();
        assert!(matches!(err, StorageError::CorruptVersion { .. }), "got {err:?}");
    }
}

// ── Concurrent peers ──────────────────────────────────────────────────

#[test]
fn test_step_committed_by_peer_is_adopted() {
    for inner in backends() {
        let identity = inner.db_type();
        let registry = scenario_registry();
        let peer = MigrationRegistry::new(registry.steps()[..1].to_vec()).unwrap();

        // begin #1 reads the version, #2 bootstraps config, #3 applies version 1.
        let wrapped = WrappedDatabase::new(inner, identity).stale_on_begin(3, &["config"], Some(peer));

        let report = upgrade(&wrapped, &registry).unwrap();
        assert_eq!(report.adopted, vec![SchemaVersion::new(1)]);
        assert_eq!(report.applied, vec![SchemaVersion::new(2)]);
        assert_eq!(report.to, SchemaVersion::new(2));
        assert_eq!(current_version(&wrapped).unwrap(), SchemaVersion::new(2));
    }
}

/// Version 1 as in the scenarios, version 2 seeds a row.
fn seeding_registry() -> MigrationRegistry {
    let registry = scenario_registry();
    MigrationRegistry::new(vec![
        registry.steps()[0].clone(),
        MigrationStep::new(2).statement(
            "seed admin",
            "INSERT INTO users_info (username) VALUES ('admin')",
        ),
    ])
    .unwrap()
}

fn admin_rows(db: &dyn Database) -> usize {
    let mut tx = db.begin().unwrap();
    tx.query_count("SELECT * FROM users_info WHERE username = 'admin'")
        .unwrap()
}

#[test]
fn test_stale_initial_read_does_not_reapply_steps() {
    for inner in backends() {
        let identity = inner.db_type();
        upgrade(inner.as_ref(), &seeding_registry()).unwrap();

        // The initial version read predates the peer's commit.
        let wrapped = WrappedDatabase::new(inner, identity).stale_on_begin(1, &[], None);
        let report = upgrade(&wrapped, &seeding_registry()).unwrap();

        assert_eq!(report.from, SchemaVersion::ZERO);
        assert!(report.applied.is_empty(), "{identity}: {report:?}");
        assert_eq!(report.adopted, vec![SchemaVersion::new(1), SchemaVersion::new(2)]);
        assert_eq!(report.to, SchemaVersion::new(2));
        assert!(wrapped
            .executed()
            .iter()
            .all(|sql| !sql.starts_with("INSERT INTO users_info") && !sql.starts_with("UPDATE config")));
        assert_eq!(admin_rows(&wrapped), 1, "{identity}");
        assert_eq!(current_version(&wrapped).unwrap(), SchemaVersion::new(2));
    }
}

#[test]
fn test_stale_initial_read_by_older_release_keeps_version() {
    for inner in backends() {
        let identity = inner.db_type();
        upgrade(inner.as_ref(), &seeding_registry()).unwrap();
        let older = MigrationRegistry::new(seeding_registry().steps()[..1].to_vec()).unwrap();

        let wrapped = WrappedDatabase::new(inner, identity).stale_on_begin(1, &[], None);
        let err = upgrade(&wrapped, &older).unwrap_err();

        assert!(
            matches!(
                err,
                StorageError::SchemaTooNew { current, latest }
                    if current == SchemaVersion::new(2) && latest == SchemaVersion::new(1)
            ),
            "{identity}: got {err:?}"
        );
        assert_eq!(current_version(&wrapped).unwrap(), SchemaVersion::new(2));
        assert_eq!(admin_rows(&wrapped), 1, "{identity}");
    }
}

#[test]
fn test_duplicate_without_peer_commit_is_fatal() {
    for inner in backends() {
        let identity = inner.db_type();
        {
            let mut tx = inner.begin().unwrap();
            tx.execute("CREATE TABLE users_info (username VARCHAR(100))", &[])
                .unwrap();
            tx.commit().unwrap();
        }

        // The step sees an empty catalog but nobody recorded version 1.
        let wrapped = WrappedDatabase::new(inner, identity).stale_on_begin(3, &["config"], None);
        let err = upgrade(&wrapped, &scenario_registry()).unwrap_err();
        match &err {
            StorageError::Step { version, source } => {
                assert_eq!(*version, SchemaVersion::new(1));
                assert!(matches!(
                    source.as_ref(),
                    StorageError::TableCreation { table, .. } if table == "users_info"
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_benign_duplicate());
        assert_eq!(current_version(&wrapped).unwrap(), SchemaVersion::ZERO);
    }
}

// ── Provider ──────────────────────────────────────────────────────────

#[test]
fn test_provider_refuses_newer_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authgate.sqlite3");
    {
        let db = SqliteBackend::from_path(&path, std::time::Duration::from_secs(5)).unwrap();
        set_version(&db, "99");
    }

    let config = ag_core::StorageConfig {
        path: path.display().to_string(),
        ..ag_core::StorageConfig::default()
    };
    let err = StorageProvider::open(&config).unwrap_err();
    assert!(matches!(err, StorageError::SchemaTooNew { .. }), "got {err:?}");
}
