use super::enums::{SkillLevel, SkillType};
use super::{
    Catalog, CheckRule, Column, ColumnDefault, ColumnType, OnDelete, Table, OWNER_COLUMN,
    OWNER_TABLE,
};

const NAME: ColumnType = ColumnType::Varchar(255);
const SHORT_NAME: ColumnType = ColumnType::Varchar(100);

/// The resume store: users, their owned entities, and the two skill junctions.
/// Declaration order is also a valid creation order.
pub fn resume_catalog() -> Catalog {
    Catalog::new(vec![
        users(),
        education(),
        job_experience(),
        skills(),
        experiences(),
        certifications(),
        summaries(),
        websites(),
        junction("experience_skills", "experience_id", "experiences"),
        junction("certification_skills", "certification_id", "certifications"),
    ])
}

fn id() -> Column {
    Column::required("id", ColumnType::Uuid).default_to(ColumnDefault::GeneratedUuid)
}

fn timestamp(name: &'static str) -> Column {
    Column::required(name, ColumnType::Timestamptz).default_to(ColumnDefault::Now)
}

fn with_timestamps(table: Table) -> Table {
    table
        .with_column(timestamp("created_at"))
        .with_column(timestamp("updated_at"))
}

/// Table keyed by a generated `id` and owned by a user. Deleting the user
/// deletes the row.
fn owned(name: &'static str) -> Table {
    Table::new(name)
        .with_column(id())
        .with_column(Column::required(OWNER_COLUMN, ColumnType::Uuid))
        .with_primary_key(&["id"])
        .with_foreign_key(OWNER_COLUMN, OWNER_TABLE, "id", OnDelete::Cascade)
        .with_index(&[OWNER_COLUMN])
}

fn users() -> Table {
    let table = Table::new(OWNER_TABLE)
        .with_column(id())
        .with_column(Column::required("email", NAME))
        .with_column(Column::optional("full_name", NAME))
        .with_column(Column::required("password_hash", NAME));
    with_timestamps(table)
        .with_primary_key(&["id"])
        .with_unique(&["email"])
}

fn education() -> Table {
    let table = owned("education")
        .with_column(Column::required("institution_name", NAME))
        .with_column(Column::optional("location", NAME))
        .with_column(Column::required("date_started", ColumnType::Date))
        .with_column(Column::optional("date_finished", ColumnType::Date))
        .with_column(Column::optional("major", NAME))
        .with_column(Column::optional("minor", NAME))
        .with_column(Column::optional(
            "gpa",
            ColumnType::Numeric {
                precision: 3,
                scale: 2,
            },
        ))
        .with_column(Column::optional("details", ColumnType::Jsonb));
    with_timestamps(table)
}

fn job_experience() -> Table {
    let table = owned("job_experience")
        .with_column(Column::required("company_name", NAME))
        .with_column(Column::optional("job_title", NAME))
        .with_column(Column::optional("location", NAME))
        .with_column(Column::required("date_started", ColumnType::Date))
        .with_column(Column::optional("date_left", ColumnType::Date))
        .with_column(Column::optional("details", ColumnType::Jsonb));
    with_timestamps(table)
}

fn skills() -> Table {
    let table = owned("skills")
        .with_column(Column::required("title", NAME))
        .with_column(Column::optional("category", SHORT_NAME))
        .with_column(Column::required("skill_type", ColumnType::Text))
        .with_column(Column::optional("skill_level", ColumnType::Text))
        .with_column(Column::optional("years_experience", ColumnType::Integer));
    with_timestamps(table)
        .with_unique(&[OWNER_COLUMN, "title"])
        .with_check("skill_type", CheckRule::OneOf(SkillType::LABELS))
        .with_check("skill_level", CheckRule::OneOf(SkillLevel::LABELS))
        .with_check("years_experience", CheckRule::NonNegative)
}

/// STAR-style narrative: situation, task, action, result.
fn experiences() -> Table {
    let table = owned("experiences")
        .with_column(Column::required("title", NAME))
        .with_column(Column::optional("situation", ColumnType::Text))
        .with_column(Column::optional("task", ColumnType::Text))
        .with_column(Column::optional("action", ColumnType::Text))
        .with_column(Column::optional("result", ColumnType::Text))
        .with_column(Column::optional("details", ColumnType::Jsonb));
    with_timestamps(table)
}

fn certifications() -> Table {
    let table = owned("certifications")
        .with_column(Column::required("title", NAME))
        .with_column(Column::optional("issuer", NAME))
        .with_column(Column::optional("date_issued", ColumnType::Date))
        .with_column(Column::optional("date_expires", ColumnType::Date))
        .with_column(Column::optional("credential_id", NAME))
        .with_column(Column::optional("credential_url", ColumnType::Text));
    with_timestamps(table)
}

fn summaries() -> Table {
    let table = owned("summaries")
        .with_column(Column::required("title", NAME))
        .with_column(Column::required("blurb", ColumnType::Text))
        .with_column(
            Column::required("is_active", ColumnType::Boolean)
                .default_to(ColumnDefault::Bool(false)),
        );
    with_timestamps(table).with_unique(&[OWNER_COLUMN, "title"])
}

fn websites() -> Table {
    let table = owned("websites")
        .with_column(Column::optional("label", SHORT_NAME))
        .with_column(Column::required("url", ColumnType::Text))
        .with_column(
            Column::required("is_primary", ColumnType::Boolean)
                .default_to(ColumnDefault::Bool(false)),
        );
    with_timestamps(table).with_unique(&[OWNER_COLUMN, "url"])
}

/// Many-to-many link between `parent` and `skills`; removing either side
/// removes the link.
fn junction(name: &'static str, parent_column: &'static str, parent: &'static str) -> Table {
    Table::new(name)
        .with_column(Column::required(parent_column, ColumnType::Uuid))
        .with_column(Column::required("skill_id", ColumnType::Uuid))
        .with_column(timestamp("created_at"))
        .with_primary_key(&[parent_column, "skill_id"])
        .with_foreign_key(parent_column, parent, "id", OnDelete::Cascade)
        .with_foreign_key("skill_id", "skills", "id", OnDelete::Cascade)
        .with_index(&["skill_id"])
}
