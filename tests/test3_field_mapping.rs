use std::sync::Arc;

use mysql_queryset::prelude::*;
use mysql_queryset::test_utils::MemoryServer;
use tokio::runtime::Runtime;

fn settings() -> Arc<Settings> {
    // "created" is structured: aliased in SELECT output, formatted on read.
    let doc = r#"
    {
        "CONNECTION": {
            "HOST": "127.0.0.1", "PORT": 3306,
            "USER": "app", "PASSWORD": "secret",
            "DATABASE": "app", "COLLATION": "utf8"
        },
        "TABLES": {
            "posts": {
                "TABLE_NAME": "posts",
                "FIELDS": [
                    "id",
                    "title",
                    {"name": "created", "alias": "created_at"}
                ],
                "FIELDS_MUTEABLE": ["title", "created"]
            }
        }
    }
    "#;
    Arc::new(Settings::from_json_str(doc).expect("settings parse"))
}

async fn queryset(server: &MemoryServer) -> Result<Queryset, QuerysetError> {
    server.create_table("posts");
    let source = ConnectionSource::pooled(server.factory(), 1).await?;
    Queryset::new(settings(), source, Some("posts"))
}

#[test]
fn aliased_fields_surface_under_their_alias() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        let qs = queryset(&server).await?;

        let mut record = Record::new()
            .with_field("title", FieldValue::string("hello"))
            .with_field("created", FieldValue::int(1_700_000_000));
        assert_eq!(qs.create_one(&mut record).await?, CrudStatus::Created);

        let ReadOutcome::Found(Row::Dict(row)) =
            qs.read_one(&SqlValue::Int(record.id().unwrap())).await?
        else {
            panic!("expected a dict row");
        };
        let names: Vec<&str> = row.column_names().iter().map(String::as_str).collect();
        assert_eq!(names, vec!["id", "title", "created_at"]);
        assert_eq!(*row.get("created_at").unwrap().as_int().unwrap(), 1_700_000_000);
        assert!(row.get("created").is_none());

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn compound_field_kinds_never_reach_the_database() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        let qs = queryset(&server).await?;

        for kind in [
            FieldKind::List,
            FieldKind::SortedList,
            FieldKind::Dict,
            FieldKind::MultiValueDict,
            FieldKind::Embedded,
            FieldKind::GeoPoint,
        ] {
            let mut record = Record::new()
                .with_field("title", FieldValue::new(kind, SqlValue::Null));
            let err = qs.create_one(&mut record).await.unwrap_err();
            match err {
                QuerysetError::UnsupportedFieldType { field, kind: got } => {
                    assert_eq!(field, "title");
                    assert_eq!(got, kind);
                }
                other => panic!("unexpected error: {other}"),
            }

            let err = qs.update_one(&record.with_id(1)).await.unwrap_err();
            assert!(matches!(err, QuerysetError::UnsupportedFieldType { .. }));
        }
        // Nothing was written on any of those paths.
        assert_eq!(server.row_count("posts"), 0);

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn datetimes_store_as_epoch_strings() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        let qs = queryset(&server).await?;

        let when = chrono::NaiveDate::from_ymd_opt(2012, 6, 1)
            .unwrap()
            .and_hms_micro_opt(8, 30, 0, 250)
            .unwrap();
        let mut record = Record::new()
            .with_field("title", FieldValue::string("dated"))
            .with_field("created", FieldValue::datetime(when));
        qs.create_one(&mut record).await?;

        let stored = server
            .row("posts", record.id().unwrap())
            .and_then(|row| row.get("created").cloned())
            .expect("created column stored");
        let expected = format!("{}.250", when.and_utc().timestamp());
        assert_eq!(stored, SqlValue::Text(expected));

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn legacy_muteable_spelling_is_accepted() -> Result<(), Box<dyn std::error::Error>> {
    // The settings document above deliberately uses FIELDS_MUTEABLE.
    let settings = settings();
    let table = settings.table("posts")?;
    assert_eq!(table.fields_mutable, ["title", "created"]);
    Ok(())
}
