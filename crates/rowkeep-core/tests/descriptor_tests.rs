#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{Account, Tag, User};
use rowkeep_core::ddl::create_table_sql;
use rowkeep_core::{
    ColumnSpec, EntityDescriptor, EntityMetadata, FieldMeta, IndexMeta, MySqlConverter,
    RkErrorKind, SqlType, TableMeta, Value,
};

#[test]
fn test_user_descriptor_fields() {
    let descriptor = EntityDescriptor::<User>::of().unwrap();
    let schema = descriptor.schema();

    assert_eq!(schema.table().name(), "USER");
    let id = &schema.fields()[0];
    assert_eq!(id.name(), "ID");
    assert!(id.is_primary_key());
    assert!(!id.is_updatable());
    assert!(!id.is_insertable());
    assert!(id.populates_on_insert());
    assert_eq!(schema.generated_key_field(), Some(0));
}

#[test]
fn test_implicit_key_column() {
    let descriptor = EntityDescriptor::<Account>::of().unwrap();
    let number = &descriptor.schema().fields()[0];

    assert_eq!(number.name(), "NUMBER");
    assert!(!number.is_nullable());
    assert!(number.is_insertable());
    assert!(!number.is_updatable());
    assert!(!number.populates_on_insert());
    assert_eq!(descriptor.schema().generated_key_field(), None);
}

#[test]
fn test_create_table_is_deterministic() {
    let first = EntityDescriptor::<User>::of().unwrap();
    let second = EntityDescriptor::<User>::of().unwrap();

    let sql = create_table_sql(first.schema(), &MySqlConverter).unwrap();
    assert_eq!(
        sql,
        "CREATE TABLE USER (ID BIGINT NOT NULL, NAME VARCHAR(255) NOT NULL, AGE INT NOT NULL, PRIMARY KEY (ID))"
    );
    assert_eq!(sql, create_table_sql(second.schema(), &MySqlConverter).unwrap());
}

#[test]
fn test_create_table_with_enum_and_nullable_columns() {
    let descriptor = EntityDescriptor::<Account>::of().unwrap();
    let sql = create_table_sql(descriptor.schema(), &MySqlConverter).unwrap();

    assert_eq!(
        sql,
        "CREATE TABLE ACCOUNT (NUMBER VARCHAR(255) NOT NULL, OWNER VARCHAR(255) NULL, \
         OPENED_BY VARCHAR(255) NULL, STATUS ENUM('OPEN','FROZEN','CLOSED') NOT NULL, \
         PRIMARY KEY (NUMBER))"
    );
}

#[derive(Default)]
struct Event {
    day: i32,
    seq: i32,
    payload: String,
}

fn event_metadata() -> EntityMetadata<Event> {
    EntityMetadata::new()
        .table(
            TableMeta::new("EVENT")
                .index(IndexMeta::new("", true, "BODY"))
                .index(IndexMeta::new("", false, "DAY, BODY"))
                .creation_suffix("ENGINE=InnoDB DEFAULT CHARSET=utf8"),
        )
        .field(
            FieldMeta::new(
                "day",
                SqlType::Int,
                |e: &Event| Value::from(e.day),
                |e, v| {
                    e.day = v.try_into()?;
                    Ok(())
                },
            )
            .id(),
        )
        .field(
            FieldMeta::new(
                "seq",
                SqlType::Int,
                |e: &Event| Value::from(e.seq),
                |e, v| {
                    e.seq = v.try_into()?;
                    Ok(())
                },
            )
            .id(),
        )
        .field(
            FieldMeta::new(
                "payload",
                SqlType::LongText,
                |e: &Event| Value::from(e.payload.clone()),
                |e, v| {
                    e.payload = v.try_into()?;
                    Ok(())
                },
            )
            .column(ColumnSpec::named("BODY").definition("MEDIUMTEXT")),
        )
        .with_default_constructor()
}

#[test]
fn test_composite_key_create_table() {
    let descriptor = EntityDescriptor::build(event_metadata()).unwrap();
    let sql = create_table_sql(descriptor.schema(), &MySqlConverter).unwrap();

    assert_eq!(
        sql,
        "CREATE TABLE EVENT (DAY INT NOT NULL, SEQ INT NOT NULL, BODY MEDIUMTEXT, \
         PRIMARY KEY (DAY, SEQ), UNIQUE KEY EVENT_uniq1 (BODY), KEY EVENT_uniq2 (DAY, BODY)) \
         ENGINE=InnoDB DEFAULT CHARSET=utf8"
    );
}

#[test]
fn test_composite_key_templates_are_cardinality_errors() {
    let descriptor = EntityDescriptor::build(event_metadata()).unwrap();
    let schema = descriptor.schema();

    assert_eq!(
        schema.insert_sql(),
        "INSERT INTO EVENT (DAY, SEQ, BODY) VALUES (?, ?, ?)"
    );
    assert_eq!(
        schema.select_by_key_sql().unwrap_err().kind(),
        RkErrorKind::Cardinality
    );
    assert_eq!(
        schema.delete_by_key_sql().unwrap_err().kind(),
        RkErrorKind::Cardinality
    );
    assert_eq!(
        schema.select_by_field_sql("BODY").unwrap(),
        "SELECT DAY, SEQ, BODY FROM EVENT WHERE BODY=?"
    );
}

#[test]
fn test_templates_are_memoized() {
    let descriptor = EntityDescriptor::<User>::of().unwrap();
    let schema = descriptor.schema();

    assert_eq!(schema.insert_sql(), "INSERT INTO USER (NAME, AGE) VALUES (?, ?)");
    assert!(std::ptr::eq(schema.insert_sql(), schema.insert_sql()));
    assert!(std::ptr::eq(
        schema.select_by_key_sql().unwrap(),
        schema.select_by_key_sql().unwrap()
    ));
    assert_eq!(
        schema.select_by_field_sql("NAME").unwrap(),
        schema.select_by_field_sql("NAME").unwrap()
    );
}

#[test]
fn test_templates_shared_across_threads() {
    let descriptor = std::sync::Arc::new(EntityDescriptor::<User>::of().unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let descriptor = descriptor.clone();
            std::thread::spawn(move || descriptor.schema().select_by_key_sql().unwrap().to_string())
        })
        .collect();

    for handle in handles {
        assert_eq!(
            handle.join().unwrap(),
            "SELECT ID, NAME, AGE FROM USER WHERE ID=?"
        );
    }
}

#[test]
fn test_tag_without_primary_key() {
    let descriptor = EntityDescriptor::<Tag>::of().unwrap();
    let schema = descriptor.schema();

    assert!(schema.primary_keys().is_empty());
    assert_eq!(
        schema.single_primary_key().unwrap_err().kind(),
        RkErrorKind::Cardinality
    );
}

#[test]
fn test_missing_metadata_is_configuration_error() {
    let no_table = EntityMetadata::<Event>::new().with_default_constructor();
    assert_eq!(
        EntityDescriptor::build(no_table).unwrap_err().kind(),
        RkErrorKind::Configuration
    );

    let no_constructor = EntityMetadata::<Event>::new().table(TableMeta::new("EVENT"));
    let err = EntityDescriptor::build(no_constructor).unwrap_err();
    assert_eq!(err.kind(), RkErrorKind::Configuration);
    assert_eq!(err.code(), "ERR_CONFIGURATION");
}
