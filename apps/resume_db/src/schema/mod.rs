//! Typed schema catalog for the resume store.
//!
//! The catalog is the single source of truth for the DDL: the migrations under
//! `migrations/` are its rendered output, and the live database is verified
//! against it. Constraint and index names are derived from the table and
//! column names so they are stable across renders.

pub mod catalog;
pub mod ddl;
pub mod enums;
pub mod graph;
pub mod introspect;
pub mod validate;

use serde::Serialize;

pub use catalog::resume_catalog;
pub use ddl::UuidStrategy;

/// The table every owned entity hangs off.
pub const OWNER_TABLE: &str = "users";
/// Column carrying the owner reference on every owned table.
pub const OWNER_COLUMN: &str = "user_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Uuid,
    Varchar(u16),
    Text,
    Integer,
    Boolean,
    Date,
    Timestamptz,
    Numeric { precision: u8, scale: u8 },
    Jsonb,
}

impl ColumnType {
    /// Type as written in a column definition.
    pub fn sql(&self) -> String {
        match self {
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Varchar(len) => format!("VARCHAR({len})"),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Timestamptz => "TIMESTAMPTZ".to_string(),
            ColumnType::Numeric { precision, scale } => format!("NUMERIC({precision}, {scale})"),
            ColumnType::Jsonb => "JSONB".to_string(),
        }
    }

    /// Type as reported by `information_schema.columns.data_type`.
    pub fn information_schema_name(&self) -> &'static str {
        match self {
            ColumnType::Uuid => "uuid",
            ColumnType::Varchar(_) => "character varying",
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Timestamptz => "timestamp with time zone",
            ColumnType::Numeric { .. } => "numeric",
            ColumnType::Jsonb => "jsonb",
        }
    }

    /// `information_schema` type with its length or precision, e.g.
    /// `character varying(255)`. Compared against the live column.
    pub fn information_schema_signature(&self) -> String {
        match self {
            ColumnType::Varchar(len) => format!("character varying({len})"),
            ColumnType::Numeric { precision, scale } => format!("numeric({precision},{scale})"),
            other => other.information_schema_name().to_string(),
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnType::Varchar(_) | ColumnType::Text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDefault {
    /// Server-generated random UUID; the function depends on the [`UuidStrategy`].
    GeneratedUuid,
    Now,
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
}

impl Column {
    /// A `NOT NULL` column.
    pub fn required(name: &'static str, ty: ColumnType) -> Self {
        Column {
            name,
            ty,
            nullable: false,
            default: None,
        }
    }

    pub fn optional(name: &'static str, ty: ColumnType) -> Self {
        Column {
            name,
            ty,
            nullable: true,
            default: None,
        }
    }

    pub fn default_to(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl OnDelete {
    pub fn sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::NoAction => "NO ACTION",
        }
    }

    /// `pg_constraint.confdeltype` code for this action.
    pub fn action_code(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "c",
            OnDelete::SetNull => "n",
            OnDelete::Restrict => "r",
            OnDelete::NoAction => "a",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
    pub referenced_column: &'static str,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRule {
    /// Value must be one of a fixed set of labels (NULL passes, as in SQL).
    OneOf(&'static [&'static str]),
    NonNegative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub column: &'static str,
    pub rule: CheckRule,
}

impl Check {
    /// Boolean expression placed inside `CHECK (...)`.
    pub fn expression(&self) -> String {
        match self.rule {
            CheckRule::OneOf(values) => {
                let quoted: Vec<String> = values
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect();
                format!("{} IN ({})", self.column, quoted.join(", "))
            }
            CheckRule::NonNegative => format!("{} >= 0", self.column),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    name: &'static str,
    columns: Vec<Column>,
    primary_key: Vec<&'static str>,
    foreign_keys: Vec<ForeignKey>,
    uniques: Vec<Vec<&'static str>>,
    checks: Vec<Check>,
    indexes: Vec<Vec<&'static str>>,
}

impl Table {
    pub fn new(name: &'static str) -> Self {
        Table {
            name,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            uniques: Vec::new(),
            checks: Vec::new(),
            indexes: Vec::new(),
        }
    }

    // ── builder ─────────────────────────────────────────────────────────────

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_primary_key(mut self, columns: &[&'static str]) -> Self {
        self.primary_key = columns.to_vec();
        self
    }

    pub fn with_foreign_key(
        mut self,
        column: &'static str,
        references: &'static str,
        referenced_column: &'static str,
        on_delete: OnDelete,
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            column,
            references,
            referenced_column,
            on_delete,
        });
        self
    }

    pub fn with_unique(mut self, columns: &[&'static str]) -> Self {
        self.uniques.push(columns.to_vec());
        self
    }

    pub fn with_check(mut self, column: &'static str, rule: CheckRule) -> Self {
        self.checks.push(Check { column, rule });
        self
    }

    pub fn with_index(mut self, columns: &[&'static str]) -> Self {
        self.indexes.push(columns.to_vec());
        self
    }

    // ── accessors ───────────────────────────────────────────────────────────

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> &[&'static str] {
        &self.primary_key
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    pub fn uniques(&self) -> &[Vec<&'static str>] {
        &self.uniques
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn indexes(&self) -> &[Vec<&'static str>] {
        &self.indexes
    }

    /// The `user_id -> users` reference, if this table is owned by a user.
    pub fn owner_fk(&self) -> Option<&ForeignKey> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.column == OWNER_COLUMN && fk.references == OWNER_TABLE)
    }

    /// A junction table's primary key is made up entirely of foreign-key columns.
    pub fn is_junction(&self) -> bool {
        self.primary_key.len() > 1
            && self
                .primary_key
                .iter()
                .all(|pk| self.foreign_keys.iter().any(|fk| fk.column == *pk))
    }

    // ── derived names ───────────────────────────────────────────────────────

    pub fn primary_key_name(&self) -> String {
        format!("pk_{}", self.name)
    }

    pub fn foreign_key_name(&self, fk: &ForeignKey) -> String {
        format!("fk_{}_{}", self.name, fk.column)
    }

    pub fn unique_name(&self, columns: &[&str]) -> String {
        format!("uq_{}_{}", self.name, columns.join("_"))
    }

    pub fn check_name(&self, check: &Check) -> String {
        format!("ck_{}_{}", self.name, check.column)
    }

    pub fn index_name(&self, columns: &[&str]) -> String {
        format!("idx_{}_{}", self.name, columns.join("_"))
    }

    /// Every named constraint the rendered DDL declares for this table.
    pub fn constraint_names(&self) -> Vec<String> {
        let mut names = vec![self.primary_key_name()];
        names.extend(self.foreign_keys.iter().map(|fk| self.foreign_key_name(fk)));
        names.extend(self.uniques.iter().map(|u| self.unique_name(u)));
        names.extend(self.checks.iter().map(|c| self.check_name(c)));
        names
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.iter().map(|i| self.index_name(i)).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    tables: Vec<Table>,
}

impl Catalog {
    pub fn new(tables: Vec<Table>) -> Self {
        Catalog { tables }
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        self.tables.iter().map(|t| t.name).collect()
    }
}
