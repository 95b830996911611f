use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::errors::SchemaError;

/// Migrations embedded at compile time from `migrations/`.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(config: &Config) -> anyhow::Result<PgPool> {
    info!("Connecting to PostgreSQL at {}...", config.describe_target());

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(config.connect_options()?)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Applies every pending migration.
pub async fn apply_migrations(pool: &PgPool) -> Result<(), SchemaError> {
    info!("Applying migrations...");
    MIGRATOR.run(pool).await?;
    info!("Schema is up to date");
    Ok(())
}

/// Reverts every applied migration, dropping all resume tables.
pub async fn teardown(pool: &PgPool) -> Result<(), SchemaError> {
    info!("Reverting all migrations...");
    MIGRATOR.undo(pool, 0).await?;
    info!("Schema torn down");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: String,
    pub applied: bool,
    pub installed_on: Option<DateTime<Utc>>,
}

/// Embedded migrations and whether each one has been applied.
pub async fn migration_status(pool: &PgPool) -> Result<Vec<MigrationStatus>, SchemaError> {
    let tracked: bool =
        sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
            .fetch_one(pool)
            .await?;

    let applied: Vec<(i64, DateTime<Utc>)> = if tracked {
        sqlx::query_as("SELECT version, installed_on FROM _sqlx_migrations WHERE success")
            .fetch_all(pool)
            .await?
    } else {
        Vec::new()
    };

    Ok(MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .map(|m| {
            let installed_on = applied
                .iter()
                .find(|(version, _)| *version == m.version)
                .map(|(_, at)| *at);
            MigrationStatus {
                version: m.version,
                description: m.description.to_string(),
                applied: installed_on.is_some(),
                installed_on,
            }
        })
        .collect())
}

/// Server version string, as reported by `SELECT version()`.
pub async fn server_version(pool: &PgPool) -> Result<String, SchemaError> {
    Ok(sqlx::query_scalar("SELECT version()")
        .fetch_one(pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ConstraintKind, ConstraintViolation};
    use crate::schema::graph::cascade_closure;
    use crate::schema::introspect::{diff, verify, PgIntrospector};
    use crate::schema::resume_catalog;
    use sqlx::postgres::PgQueryResult;
    use uuid::Uuid;

    async fn insert_user(pool: &PgPool, email: &str) -> sqlx::Result<Uuid> {
        sqlx::query_scalar(
            "INSERT INTO users (email, full_name, password_hash) VALUES ($1, 'Test User', 'x') RETURNING id",
        )
        .bind(email)
        .fetch_one(pool)
        .await
    }

    async fn insert_skill(
        pool: &PgPool,
        user_id: Uuid,
        title: &str,
        skill_type: &str,
        years: Option<i32>,
    ) -> sqlx::Result<Uuid> {
        sqlx::query_scalar(
            r#"
            INSERT INTO skills (user_id, title, skill_type, skill_level, years_experience)
            VALUES ($1, $2, $3, 'Advanced', $4)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(skill_type)
        .bind(years)
        .fetch_one(pool)
        .await
    }

    async fn insert_summary(pool: &PgPool, user_id: Uuid) -> sqlx::Result<PgQueryResult> {
        sqlx::query(
            "INSERT INTO summaries (user_id, title, blurb) VALUES ($1, 'Backend', 'Builds APIs')",
        )
        .bind(user_id)
        .execute(pool)
        .await
    }

    fn violation(result: sqlx::Result<impl std::fmt::Debug>) -> ConstraintViolation {
        let err = result.expect_err("write should have been rejected");
        ConstraintViolation::from_sqlx(&err).expect("constraint violation")
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    #[ignore = "requires a PostgreSQL instance (DATABASE_URL)"]
    async fn test_duplicate_email_is_rejected(pool: PgPool) -> sqlx::Result<()> {
        insert_user(&pool, "ada@example.com").await?;
        let v = violation(insert_user(&pool, "ada@example.com").await);
        assert_eq!(v.kind, ConstraintKind::Unique);
        assert_eq!(v.constraint.as_deref(), Some("uq_users_email"));
        Ok(())
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    #[ignore = "requires a PostgreSQL instance (DATABASE_URL)"]
    async fn test_skill_type_outside_value_set_is_rejected(pool: PgPool) -> sqlx::Result<()> {
        let user = insert_user(&pool, "grace@example.com").await?;
        let v = violation(insert_skill(&pool, user, "COBOL", "Magic", None).await);
        assert_eq!(v.kind, ConstraintKind::Check);
        assert_eq!(v.constraint.as_deref(), Some("ck_skills_skill_type"));
        Ok(())
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    #[ignore = "requires a PostgreSQL instance (DATABASE_URL)"]
    async fn test_negative_years_is_rejected(pool: PgPool) -> sqlx::Result<()> {
        let user = insert_user(&pool, "linus@example.com").await?;
        let v = violation(insert_skill(&pool, user, "C", "Technical", Some(-1)).await);
        assert_eq!(v.kind, ConstraintKind::Check);
        assert_eq!(v.constraint.as_deref(), Some("ck_skills_years_experience"));

        insert_skill(&pool, user, "C", "Technical", Some(0)).await?;
        Ok(())
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    #[ignore = "requires a PostgreSQL instance (DATABASE_URL)"]
    async fn test_summary_titles_are_unique_per_user(pool: PgPool) -> sqlx::Result<()> {
        let first = insert_user(&pool, "a@example.com").await?;
        let second = insert_user(&pool, "b@example.com").await?;
        insert_summary(&pool, first).await?;
        insert_summary(&pool, second).await?;
        let v = violation(insert_summary(&pool, first).await);
        assert_eq!(v.kind, ConstraintKind::Unique);
        assert_eq!(v.constraint.as_deref(), Some("uq_summaries_user_id_title"));
        Ok(())
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    #[ignore = "requires a PostgreSQL instance (DATABASE_URL)"]
    async fn test_missing_blurb_reports_column(pool: PgPool) -> sqlx::Result<()> {
        let user = insert_user(&pool, "c@example.com").await?;
        let result = sqlx::query("INSERT INTO summaries (user_id, title) VALUES ($1, 'Draft')")
            .bind(user)
            .execute(&pool)
            .await;
        let v = violation(result);
        assert_eq!(v.kind, ConstraintKind::NotNull);
        assert_eq!(v.column.as_deref(), Some("blurb"));
        Ok(())
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    #[ignore = "requires a PostgreSQL instance (DATABASE_URL)"]
    async fn test_unknown_owner_is_rejected(pool: PgPool) -> sqlx::Result<()> {
        let v = violation(insert_skill(&pool, Uuid::new_v4(), "Go", "Technical", None).await);
        assert_eq!(v.kind, ConstraintKind::ForeignKey);
        assert_eq!(v.constraint.as_deref(), Some("fk_skills_user_id"));
        Ok(())
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    #[ignore = "requires a PostgreSQL instance (DATABASE_URL)"]
    async fn test_deleting_user_cascades_everywhere(pool: PgPool) -> sqlx::Result<()> {
        let user = insert_user(&pool, "owner@example.com").await?;
        let keep = insert_user(&pool, "bystander@example.com").await?;

        sqlx::query("INSERT INTO education (user_id, institution_name, date_started, gpa, details) VALUES ($1, 'MIT', '2010-09-01', 3.80, '{\"honors\": true}')")
            .bind(user)
            .execute(&pool)
            .await?;
        sqlx::query("INSERT INTO job_experience (user_id, company_name, date_started) VALUES ($1, 'Acme', '2015-01-05')")
            .bind(user)
            .execute(&pool)
            .await?;
        sqlx::query("INSERT INTO summaries (user_id, title, blurb, is_active) VALUES ($1, 'Main', 'Engineer', TRUE)")
            .bind(user)
            .execute(&pool)
            .await?;
        sqlx::query("INSERT INTO websites (user_id, label, url, is_primary) VALUES ($1, 'Blog', 'https://example.com', TRUE)")
            .bind(user)
            .execute(&pool)
            .await?;

        let skill = insert_skill(&pool, user, "Rust", "Technical", Some(4)).await?;
        insert_skill(&pool, keep, "Rust", "Technical", Some(1)).await?;
        let experience: Uuid = sqlx::query_scalar(
            "INSERT INTO experiences (user_id, title, situation, result) VALUES ($1, 'Migration', 'Legacy DB', 'Zero downtime') RETURNING id",
        )
        .bind(user)
        .fetch_one(&pool)
        .await?;
        let certification: Uuid = sqlx::query_scalar(
            "INSERT INTO certifications (user_id, title, issuer, date_issued) VALUES ($1, 'CKA', 'CNCF', '2021-03-01') RETURNING id",
        )
        .bind(user)
        .fetch_one(&pool)
        .await?;
        sqlx::query("INSERT INTO experience_skills (experience_id, skill_id) VALUES ($1, $2)")
            .bind(experience)
            .bind(skill)
            .execute(&pool)
            .await?;
        sqlx::query("INSERT INTO certification_skills (certification_id, skill_id) VALUES ($1, $2)")
            .bind(certification)
            .bind(skill)
            .execute(&pool)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user)
            .execute(&pool)
            .await?;

        let catalog = resume_catalog();
        let dependents = cascade_closure(&catalog, "users").expect("users is in the catalog");
        assert_eq!(dependents.len(), 9);
        for table in dependents {
            let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&pool)
                .await?;
            let expected = if table == "skills" { 1 } else { 0 };
            assert_eq!(total, expected, "{table}");
        }
        Ok(())
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    #[ignore = "requires a PostgreSQL instance (DATABASE_URL)"]
    async fn test_live_schema_matches_catalog_until_teardown(pool: PgPool) -> anyhow::Result<()> {
        let catalog = resume_catalog();
        let introspector = PgIntrospector::new(pool.clone());

        let report = verify(&catalog, &introspector).await?;
        assert!(report.is_clean(), "{report}");

        let status = migration_status(&pool).await?;
        assert!(status.iter().all(|m| m.applied));

        teardown(&pool).await?;
        let live = crate::schema::introspect::SchemaSource::load(&introspector).await?;
        assert_eq!(diff(&catalog, &live).missing_tables.len(), 10);
        assert!(migration_status(&pool).await?.iter().all(|m| !m.applied));
        Ok(())
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    #[ignore = "requires a PostgreSQL instance (DATABASE_URL)"]
    async fn test_redefined_objects_are_reported(pool: PgPool) -> anyhow::Result<()> {
        for statement in [
            "ALTER TABLE education DROP CONSTRAINT fk_education_user_id",
            "ALTER TABLE education ADD CONSTRAINT fk_education_user_id \
             FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE RESTRICT",
            "ALTER TABLE skills DROP CONSTRAINT ck_skills_skill_type",
            "ALTER TABLE skills ADD CONSTRAINT ck_skills_skill_type CHECK (skill_type IS NOT NULL)",
            "ALTER TABLE summaries DROP CONSTRAINT uq_summaries_user_id_title",
            "ALTER TABLE summaries ADD CONSTRAINT uq_summaries_user_id_title UNIQUE (id)",
            "ALTER TABLE users ALTER COLUMN email TYPE VARCHAR(3)",
        ] {
            sqlx::query(statement).execute(&pool).await?;
        }

        let report = verify(&resume_catalog(), &PgIntrospector::new(pool.clone())).await?;
        assert!(!report.is_clean());
        let objects: Vec<&str> = report
            .definition_mismatches
            .iter()
            .map(|m| m.object.as_str())
            .collect();
        assert_eq!(
            objects,
            ["fk_education_user_id", "ck_skills_skill_type", "uq_summaries_user_id_title"],
            "{report}"
        );
        assert_eq!(report.type_mismatches.len(), 1, "{report}");
        assert_eq!(report.type_mismatches[0].column, "users.email");
        assert_eq!(report.type_mismatches[0].actual, "character varying(3)");
        Ok(())
    }
}
