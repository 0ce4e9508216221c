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
            "notes": {
                "TABLE_NAME": "notes",
                "FIELDS": ["id", "body"],
                "FIELDS_MUTABLE": ["body"]
            }
        }
    }
    "#;
    Arc::new(Settings::from_json_str(doc).expect("settings parse"))
}

fn note(body: &str) -> Record {
    Record::new().with_field("body", FieldValue::string(body))
}

#[test]
fn auto_commit_commits_each_statement() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        server.create_table("notes");
        let source = ConnectionSource::pooled(server.factory(), 1).await?;
        let qs = Queryset::new(settings(), source, Some("notes"))?;

        let mut record = note("kept");
        qs.create_one(&mut record).await?;
        assert_eq!(server.commit_count(), 1);
        assert_eq!(server.rollback_count(), 0);

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn execution_errors_roll_back_and_propagate() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        server.create_table("notes");
        let source = ConnectionSource::pooled(server.factory(), 1).await?;
        let qs = Queryset::new(settings(), source, Some("notes"))?;

        let err = qs
            .execute("OPTIMIZE TABLE `notes`", &SqlArgs::empty(), false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QuerysetError::Execution(_)));
        assert_eq!(server.rollback_count(), 1);
        assert_eq!(server.commit_count(), 0);

        // The connection went back to the pool on the error path too.
        let mut record = note("still works");
        assert_eq!(qs.create_one(&mut record).await?, CrudStatus::Created);

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn disabled_auto_commit_defers_to_explicit_commit() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let server = MemoryServer::new();
        server.create_table("notes");
        let source = ConnectionSource::pooled(server.factory(), 1).await?;
        let qs = Queryset::new(settings(), source, Some("notes"))?.with_auto_commit(false);

        let mut record = note("deferred");
        qs.create_one(&mut record).await?;
        assert_eq!(server.commit_count(), 0);

        qs.commit().await?;
        assert_eq!(server.commit_count(), 1);

        // A per-call override beats the queryset default.
        let mut record = note("forced");
        qs.create_one_with_commit(&mut record, Some(true)).await?;
        assert_eq!(server.commit_count(), 2);

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}
