use std::sync::Arc;

use mysql_queryset::prelude::*;
use mysql_queryset::test_utils::MemoryServer;
use tokio::runtime::Runtime;

fn settings() -> Arc<Settings> {
    let doc = r#"
    {
        "CONNECTION": {
            "HOST": "127.0.0.1", "PORT": 3306,
            "USER": "app", "PASSWORD": "secret",
            "DATABASE": "app", "COLLATION": "utf8"
        },
        "TABLES": {
            "items": {
                "TABLE_NAME": "items",
                "FIELDS": ["id", "title", "rank", "price", "active"],
                "FIELDS_MUTABLE": ["title", "rank", "price", "active"]
            }
        }
    }
    "#;
    Arc::new(Settings::from_json_str(doc).expect("settings parse"))
}

async fn pooled_queryset(server: &MemoryServer) -> Result<Queryset, QuerysetError> {
    server.create_table("items");
    let source = ConnectionSource::pooled(server.factory(), 2).await?;
    Queryset::new(settings(), source, Some("items"))
}

fn item(title: &str, rank: i64) -> Record {
    Record::new()
        .with_field("title", FieldValue::string(title))
        .with_field("rank", FieldValue::int(rank))
        .with_field("price", FieldValue::float(9.75))
        .with_field("active", FieldValue::boolean(true))
}

#[test]
fn create_then_read_round_trips() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        let qs = pooled_queryset(&server).await?;

        let mut record = item("first", 3);
        let status = qs.create_one(&mut record).await?;
        assert_eq!(status, CrudStatus::Created);
        let id = record.id().expect("generated key written back");

        let outcome = qs.read_one(&SqlValue::Int(id)).await?;
        let ReadOutcome::Found(Row::Dict(row)) = outcome else {
            panic!("expected a dict row");
        };
        assert_eq!(row.get("title").unwrap().as_text().unwrap(), "first");
        assert_eq!(*row.get("rank").unwrap().as_int().unwrap(), 3);
        assert_eq!(row.get("price").unwrap().as_float().unwrap(), 9.75);
        assert!(*row.get("active").unwrap().as_bool().unwrap());

        // A string id works as long as it is integer-like.
        assert!(qs.read_one(&SqlValue::Text(id.to_string())).await?.is_found());
        let err = qs.read_one(&SqlValue::Text("abc".into())).await.unwrap_err();
        assert!(matches!(err, QuerysetError::SqlFormatting(_)));

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn upsert_distinguishes_created_updated_nochanges() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        let qs = pooled_queryset(&server).await?;

        let mut record = item("stable", 1);
        assert_eq!(qs.create_one(&mut record).await?, CrudStatus::Created);

        // Same key, identical mutable values: the statement is a no-op.
        assert_eq!(qs.create_one(&mut record).await?, CrudStatus::NoChanges);

        // Same key, different values: the duplicate-key arm updates.
        record.set_field("title", FieldValue::string("renamed"));
        assert_eq!(qs.create_one(&mut record).await?, CrudStatus::Updated);

        let id = record.id().unwrap();
        let ReadOutcome::Found(Row::Dict(row)) = qs.read_one(&SqlValue::Int(id)).await? else {
            panic!("expected a dict row");
        };
        assert_eq!(row.get("title").unwrap().as_text().unwrap(), "renamed");

        // An explicit fresh key inserts rather than updates.
        let mut explicit = item("explicit", 2).with_id(42);
        assert_eq!(qs.create_one(&mut explicit).await?, CrudStatus::Created);
        assert_eq!(explicit.id(), Some(42));

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn destroy_then_read_reports_not_found() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        let qs = pooled_queryset(&server).await?;

        let mut record = item("short-lived", 9);
        qs.create_one(&mut record).await?;
        let id = record.id().unwrap();

        let (status, returned_id) = qs.destroy_one(&SqlValue::Int(id)).await?;
        assert_eq!(status, CrudStatus::Updated);
        assert_eq!(returned_id, id);

        match qs.read_one(&SqlValue::Int(id)).await? {
            ReadOutcome::NotFound(missing) => assert_eq!(missing, id),
            ReadOutcome::Found(_) => panic!("row should be gone"),
        }

        // Deleting a missing row is a Failed status, not an error.
        let (status, _) = qs.destroy_one(&SqlValue::Int(id)).await?;
        assert_eq!(status, CrudStatus::Failed);

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn escaping_is_injection_safe() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        let qs = pooled_queryset(&server).await?;

        let hostile = "'; DROP TABLE x; --";
        let mut record = item(hostile, 0);
        assert_eq!(qs.create_one(&mut record).await?, CrudStatus::Created);
        let id = record.id().unwrap();

        let ReadOutcome::Found(Row::Dict(row)) = qs.read_one(&SqlValue::Int(id)).await? else {
            panic!("expected a dict row");
        };
        assert_eq!(row.get("title").unwrap().as_text().unwrap(), hostile);
        // The statement stayed a single statement; the table is intact.
        assert_eq!(server.row_count("items"), 1);

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn many_forms_apply_sequentially() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        let qs = pooled_queryset(&server).await?;

        let mut records = vec![item("a", 1), item("b", 2), item("c", 3)];
        let statuses = qs.create_many(&mut records).await?;
        assert_eq!(
            statuses,
            vec![CrudStatus::Created, CrudStatus::Created, CrudStatus::Created]
        );
        let ids: Vec<SqlValue> = records
            .iter()
            .map(|r| SqlValue::Int(r.id().unwrap()))
            .collect();

        let all = qs.read_all().await?;
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|(status, _)| *status == CrudStatus::Ok));

        let outcomes = qs.read_many(&ids).await?;
        assert!(outcomes.iter().all(ReadOutcome::is_found));

        records[1].set_field("rank", FieldValue::int(20));
        let statuses = qs.update_many(&records).await?;
        assert_eq!(
            statuses,
            vec![
                CrudStatus::NoChanges,
                CrudStatus::Updated,
                CrudStatus::NoChanges
            ]
        );

        let destroyed = qs.destroy_many(&ids).await?;
        assert!(destroyed.iter().all(|(s, _)| *s == CrudStatus::Updated));
        assert_eq!(server.row_count("items"), 0);

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn update_one_reports_nochanges_and_failed() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        let qs = pooled_queryset(&server).await?;

        let mut record = item("target", 5);
        qs.create_one(&mut record).await?;

        // Identical values: zero rows changed, but the row exists.
        assert_eq!(qs.update_one(&record).await?, CrudStatus::NoChanges);

        record.set_field("title", FieldValue::string("moved"));
        assert_eq!(qs.update_one(&record).await?, CrudStatus::Updated);

        let ghost = item("ghost", 0).with_id(999);
        assert_eq!(qs.update_one(&ghost).await?, CrudStatus::Failed);

        let no_id = item("no-id", 0);
        let err = qs.update_one(&no_id).await.unwrap_err();
        assert!(matches!(err, QuerysetError::SqlFormatting(_)));

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn unconfigured_table_fails_fast() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        server.create_table("items");
        let source = ConnectionSource::pooled(server.factory(), 1).await?;
        let qs = Queryset::new(settings(), source, None)?;

        let err = qs.read_all().await.unwrap_err();
        assert!(matches!(err, QuerysetError::Configuration(_)));
        let err = qs
            .read_one(&SqlValue::Int(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QuerysetError::Configuration(_)));

        // Unknown tag fails at construction.
        let source = ConnectionSource::pooled(server.factory(), 1).await?;
        let err = Queryset::new(settings(), source, Some("nope")).unwrap_err();
        assert!(matches!(err, QuerysetError::Configuration(_)));

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}
