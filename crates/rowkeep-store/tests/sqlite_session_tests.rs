// Integration tests running the persistence session against a SQLite file

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, TimeZone, Utc};
use rowkeep_core::{
    ColumnSpec, DeployAction, DeployFlags, Entity, EntityMetadata, FieldMeta, Managed, Persisted,
    RkErrorKind, Session, SqlType, TableMeta, Value,
};
use rowkeep_store::{SqliteConnectionFactory, SqliteConverter, StoreConfig};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
struct Note {
    id: i64,
    title: String,
    body: Option<String>,
    pinned: bool,
    mood: String,
    created: DateTime<Utc>,
}

impl Default for Note {
    fn default() -> Self {
        Self {
            id: 0,
            title: String::new(),
            body: None,
            pinned: false,
            mood: "CALM".to_string(),
            created: DateTime::default(),
        }
    }
}

impl Entity for Note {
    fn metadata() -> EntityMetadata<Self> {
        EntityMetadata::new()
            .table(TableMeta::new("NOTE"))
            .field(
                FieldMeta::new(
                    "id",
                    SqlType::BigInt,
                    |n: &Note| Value::from(n.id),
                    |n, v| {
                        n.id = v.try_into()?;
                        Ok(())
                    },
                )
                .column(
                    ColumnSpec::new()
                        .not_null()
                        .insertable(false)
                        .populate_on_insert(),
                )
                .id(),
            )
            .field(
                FieldMeta::new(
                    "title",
                    SqlType::Text,
                    |n: &Note| Value::from(n.title.clone()),
                    |n, v| {
                        n.title = v.try_into()?;
                        Ok(())
                    },
                )
                .column(ColumnSpec::new().not_null()),
            )
            .field(
                FieldMeta::new(
                    "body",
                    SqlType::LongText,
                    |n: &Note| Value::from(n.body.clone()),
                    |n, v| {
                        n.body = v.into_option()?;
                        Ok(())
                    },
                )
                .column(ColumnSpec::new()),
            )
            .field(
                FieldMeta::new(
                    "pinned",
                    SqlType::Bool,
                    |n: &Note| Value::from(n.pinned),
                    |n, v| {
                        n.pinned = v.try_into()?;
                        Ok(())
                    },
                )
                .column(ColumnSpec::new().not_null()),
            )
            .field(
                FieldMeta::new(
                    "mood",
                    SqlType::enumeration(["CALM", "BUSY"]),
                    |n: &Note| Value::from(n.mood.clone()),
                    |n, v| {
                        n.mood = v.try_into()?;
                        Ok(())
                    },
                )
                .column(ColumnSpec::new().not_null()),
            )
            .field(
                FieldMeta::new(
                    "created",
                    SqlType::Timestamp,
                    |n: &Note| Value::from(n.created),
                    |n, v| {
                        n.created = v.try_into()?;
                        Ok(())
                    },
                )
                .column(ColumnSpec::new().not_null().updatable(false)),
            )
            .with_default_constructor()
    }
}

fn setup() -> (TempDir, Session) {
    let dir = TempDir::new().unwrap();
    let factory = SqliteConnectionFactory::new(dir.path().join("notes.db"));
    let mut session = Session::new(factory.into_shared()).with_converter(Arc::new(SqliteConverter));
    session.register::<Note>().unwrap();
    session.deploy().unwrap().into_result().unwrap();
    (dir, session)
}

fn note(title: &str) -> Managed<Note> {
    Managed::new(Note {
        title: title.to_string(),
        created: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
        ..Note::default()
    })
}

#[test]
fn test_insert_then_load_in_new_session() {
    let (dir, mut session) = setup();

    let mut first = note("groceries");
    first.body = Some("milk".to_string());
    first.pinned = true;
    let outcome = session.persist(&mut first).unwrap();
    assert_eq!(
        outcome,
        Persisted::Inserted {
            key: Some(Value::Int(1))
        }
    );
    assert_eq!(first.id, 1);

    let factory = SqliteConnectionFactory::new(dir.path().join("notes.db"));
    let mut other = Session::new(factory.into_shared()).with_converter(Arc::new(SqliteConverter));
    other.register::<Note>().unwrap();
    let loaded = other.find_by_key::<Note>(1i64).unwrap().expect("row");

    assert_eq!(*loaded, *first);
    assert!(other.is_tracked(&loaded));
}

#[test]
fn test_dirty_update_and_refresh() {
    let (_dir, mut session) = setup();
    let mut item = note("draft");
    session.persist(&mut item).unwrap();

    item.title = "final".to_string();
    item.mood = "BUSY".to_string();
    let outcome = session.persist(&mut item).unwrap();
    assert_eq!(
        outcome,
        Persisted::Updated {
            columns: vec!["TITLE".to_string(), "MOOD".to_string()]
        }
    );

    item.title = "scratch".to_string();
    session.refresh(&mut item).unwrap();
    assert_eq!(item.title, "final");
    assert_eq!(item.mood, "BUSY");
    assert_eq!(session.persist(&mut item).unwrap(), Persisted::Unchanged);
}

#[test]
fn test_non_updatable_change_rejected() {
    let (_dir, mut session) = setup();
    let mut item = note("dated");
    session.persist(&mut item).unwrap();

    item.created = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let err = session.persist(&mut item).unwrap_err();

    assert_eq!(err.kind(), RkErrorKind::ConstraintViolation);
}

#[test]
fn test_find_by_field_and_find_all() {
    let (_dir, mut session) = setup();
    for title in ["a", "b", "c"] {
        session.persist(&mut note(title)).unwrap();
    }

    let b = session
        .find_by_field::<Note>("TITLE", "b")
        .unwrap()
        .expect("row");
    assert_eq!(b.id, 2);

    let rest = session
        .find_all::<Note>(
            "SELECT ID, TITLE, BODY, PINNED, MOOD, CREATED FROM NOTE WHERE ID > ? ORDER BY ID",
            &[Value::Int(1)],
        )
        .unwrap();
    let titles: Vec<&str> = rest.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["b", "c"]);
}

#[test]
fn test_remove_deletes_row() {
    let (_dir, mut session) = setup();
    let mut item = note("gone");
    session.persist(&mut item).unwrap();

    assert_eq!(session.remove(&mut item).unwrap(), 1);
    assert!(!session.is_tracked(&item));
    assert!(session.find_by_key::<Note>(item.id).unwrap().is_none());
}

#[test]
fn test_rolled_back_transaction_leaves_no_row() {
    let (_dir, mut session) = setup();

    let mut tx = session.begin().unwrap();
    let mut item = note("temporary");
    session.persist_in(tx.connection(), &mut item).unwrap();
    session.rollback(tx).unwrap();

    assert!(session.find_by_key::<Note>(item.id).unwrap().is_none());

    let mut tx = session.begin().unwrap();
    let mut kept = note("kept");
    session.persist_in(tx.connection(), &mut kept).unwrap();
    session.commit(tx).unwrap();

    assert!(session.find_by_key::<Note>(kept.id).unwrap().is_some());
}

#[test]
fn test_redeploy_migrates_columns() {
    let (dir, _session) = setup();
    let path = dir.path().join("notes.db");
    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute_batch("ALTER TABLE NOTE DROP COLUMN BODY; ALTER TABLE NOTE ADD COLUMN LEGACY TEXT")
        .unwrap();
    drop(raw);

    let config = StoreConfig::from_yaml_str(&format!(
        "path: {}\ntables:\n  NOTE:\n    migrate: true\n",
        path.display()
    ))
    .unwrap();
    let factory = SqliteConnectionFactory::from_config(&config).unwrap();
    let mut session = Session::new(factory.into_shared()).with_converter(Arc::new(SqliteConverter));
    session.register::<Note>().unwrap();
    config.apply_to(&mut session);

    let outcomes = session.deploy().unwrap().into_result().unwrap();

    assert_eq!(
        outcomes[0].actions(),
        &[
            DeployAction::DroppedColumns(vec!["LEGACY".to_string()]),
            DeployAction::AddedColumns(vec!["BODY".to_string()]),
        ]
    );
    assert_eq!(
        outcomes[0].statements(),
        &[
            "ALTER TABLE NOTE DROP COLUMN LEGACY".to_string(),
            "ALTER TABLE NOTE ADD COLUMN BODY TEXT NULL".to_string(),
        ]
    );
}

#[test]
fn test_truncate_override_empties_table() {
    let (dir, mut session) = setup();
    session.persist(&mut note("one")).unwrap();

    let factory = SqliteConnectionFactory::new(dir.path().join("notes.db"));
    let mut fresh = Session::new(factory.into_shared()).with_converter(Arc::new(SqliteConverter));
    fresh.register::<Note>().unwrap();
    fresh.override_deploy_flags("NOTE", DeployFlags::default().with_truncate(true));
    fresh.deploy().unwrap().into_result().unwrap();

    assert!(fresh.find_by_key::<Note>(1i64).unwrap().is_none());
}
