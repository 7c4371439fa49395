//! Postgres backend integration tests
//!
//! Require a reachable database; skipped unless TEST_DATABASE_URL (or
//! DATABASE_URL) is set. Slugs are prefixed per run so parallel runs and
//! leftovers from aborted runs cannot collide.

#[cfg(feature = "database")]
mod pg_tests {
    use anyhow::Result;
    use serde_json::json;
    use sqlx::PgPool;
    use uuid::Uuid;

    use dynapi::definition::{ApiDocument, FilterNode};
    use dynapi::store::{ApiDefinitionStore, DefinitionBackend, MemoryCache, PgBackend};
    use dynapi::schema::{AttrKind, AttributeDef, Schema, SchemaRegistry};

    struct TestDb {
        backend: PgBackend,
        prefix: String,
    }

    impl TestDb {
        async fn new() -> Result<Option<Self>> {
            let Ok(url) =
                std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL"))
            else {
                eprintln!("TEST_DATABASE_URL not set, skipping");
                return Ok(None);
            };
            let pool = PgPool::connect(&url).await?;
            let backend = PgBackend::new(pool);
            backend.ensure_schema().await?;
            let prefix = format!("t{}", &Uuid::new_v4().simple().to_string()[..8]);
            Ok(Some(Self { backend, prefix }))
        }

        fn slug(&self, base: &str) -> String {
            format!("{}_{}", self.prefix, base)
        }

        async fn cleanup(&self) -> Result<()> {
            sqlx::query("DELETE FROM api_definition WHERE slug LIKE $1")
                .bind(format!("{}%", self.prefix))
                .execute(self.backend.pool())
                .await?;
            Ok(())
        }
    }

    fn registry() -> SchemaRegistry {
        let mut reg = SchemaRegistry::new();
        reg.register(Schema::new(
            "crm",
            "person",
            vec![
                AttributeDef::scalar("id", AttrKind::Integer),
                AttributeDef::scalar("name", AttrKind::String),
                AttributeDef::scalar("age", AttrKind::Integer),
            ],
        ));
        reg
    }

    fn doc(slug: &str) -> ApiDocument {
        serde_json::from_value(json!({
            "slug": slug, "app": "crm", "model": "person", "operation": "list",
            "summary": "all people",
            "ordering": ["name", "-age"],
            "parameter": [
                {"name": "page", "type": "page_idx", "required": false, "default": 0},
                {"name": "criteria", "type": "json", "required": false, "children": [
                    {"name": "min_age", "type": "int", "required": false}
                ]}
            ],
            "filter": [
                {"operator": "or", "children": [
                    {"field": "age", "operator": ">", "value": 18},
                    {"field": "name", "operator": "startswith", "value": "A"}
                ]}
            ],
            "displayfield": ["name", "age"]
        }))
        .expect("document literal")
    }

    #[tokio::test]
    async fn round_trip_preserves_both_trees() -> Result<()> {
        let Some(db) = TestDb::new().await? else {
            return Ok(());
        };
        let slug = db.slug("rt");
        db.backend.persist(&doc(&slug)).await?;

        let loaded = db.backend.fetch(&slug).await?.expect("stored doc");
        assert_eq!(loaded.ordering, vec!["name", "-age"]);
        assert_eq!(loaded.parameter.len(), 2);
        assert_eq!(loaded.parameter[1].children.len(), 1);
        assert_eq!(loaded.parameter[1].children[0].name, "min_age");
        let FilterNode::Container { children, .. } = &loaded.filter[0] else {
            panic!("expected container root, got {:?}", loaded.filter[0]);
        };
        assert_eq!(children.len(), 2);
        assert_eq!(loaded.display_field.len(), 2);

        db.cleanup().await
    }

    #[tokio::test]
    async fn persist_is_replace_by_slug() -> Result<()> {
        let Some(db) = TestDb::new().await? else {
            return Ok(());
        };
        let slug = db.slug("rep");
        db.backend.persist(&doc(&slug)).await?;

        let mut updated = doc(&slug);
        updated.summary = Some("v2".to_string());
        updated.parameter.truncate(1);
        db.backend.persist(&updated).await?;

        let loaded = db.backend.fetch(&slug).await?.expect("stored doc");
        assert_eq!(loaded.summary.as_deref(), Some("v2"));
        // Old child rows are gone, not merged
        assert_eq!(loaded.parameter.len(), 1);

        db.cleanup().await
    }

    #[tokio::test]
    async fn remove_reports_existence() -> Result<()> {
        let Some(db) = TestDb::new().await? else {
            return Ok(());
        };
        let slug = db.slug("rm");
        db.backend.persist(&doc(&slug)).await?;
        assert!(db.backend.remove(&slug).await?);
        assert!(!db.backend.remove(&slug).await?);
        assert!(db.backend.fetch(&slug).await?.is_none());

        db.cleanup().await
    }

    #[tokio::test]
    async fn store_flow_over_postgres() -> Result<()> {
        let Some(db) = TestDb::new().await? else {
            return Ok(());
        };
        let slug = db.slug("store");
        let store = ApiDefinitionStore::new(db.backend, MemoryCache::new(), registry());

        store.save(&doc(&slug)).await?;
        let def = store.load(&slug).await?;
        assert_eq!(def.display_fields.len(), 2);

        store.delete(&slug).await?;
        assert!(store.load(&slug).await.is_err());
        Ok(())
    }
}
