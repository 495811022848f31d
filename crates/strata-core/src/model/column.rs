//! Column definitions and their diffs.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::sql;

static NEXTVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*nextval\(\s*'((?:[^']|'')+)'(?:::regclass)?\s*\)\s*$")
        .expect("nextval pattern is valid")
});

/// Semantic description of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// SQL type as written by the caller or rendered by `format_type()`.
    pub sql_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default expression, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// One difference between two definitions of the same column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnChange {
    /// Change the type, optionally with an explicit `USING` expression.
    Type {
        sql_type: String,
        using: Option<String>,
    },
    /// Set (`Some`) or drop (`None`) the default.
    Default(Option<String>),
    /// Allow (`true`) or forbid (`false`) NULL.
    Nullability(bool),
}

impl ColumnDef {
    /// Create a nullable column without default.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            default: None,
        }
    }

    /// Forbid NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default expression.
    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Type with aliases and serial pseudo-types folded into canonical form.
    pub fn normalized_type(&self) -> String {
        normalize_type(&self.sql_type)
    }

    /// Whether the declared type is one of the `serial` pseudo-types.
    pub fn is_serial(&self) -> bool {
        matches!(
            self.sql_type.trim().to_ascii_lowercase().as_str(),
            "serial" | "serial4" | "bigserial" | "serial8" | "smallserial" | "serial2"
        )
    }

    /// Concrete storage type; `serial` pseudo-types resolve to their integer type.
    pub fn storage_type(&self) -> String {
        if self.is_serial() {
            self.normalized_type()
        } else {
            self.sql_type.clone()
        }
    }

    /// The sequence a `nextval('…')` default draws from, as written in the default.
    pub fn sequence_default(&self) -> Option<String> {
        self.default
            .as_deref()
            .and_then(|expr| NEXTVAL.captures(expr))
            .map(|caps| caps[1].replace("''", "'"))
    }

    /// Whether the column gets its values from a sequence.
    pub fn draws_from_sequence(&self) -> bool {
        self.is_serial() || self.sequence_default().is_some()
    }

    /// Same name, equivalent type.
    pub fn same_shape(&self, other: &ColumnDef) -> bool {
        self.name == other.name && self.normalized_type() == other.normalized_type()
    }

    /// Changes needed to turn this definition into `target`.
    pub fn diff(&self, target: &ColumnDef) -> Vec<ColumnChange> {
        let mut changes = Vec::new();

        if self.normalized_type() != target.normalized_type() {
            changes.push(ColumnChange::Type {
                sql_type: target.storage_type(),
                using: None,
            });
        }

        // A serial target keeps whatever sequence default the column already has.
        if !target.is_serial() {
            let current = self.default.as_deref().map(str::trim);
            let wanted = target.default.as_deref().map(str::trim);
            if current != wanted {
                changes.push(ColumnChange::Default(target.default.clone()));
            }
        }

        if self.nullable != target.nullable {
            changes.push(ColumnChange::Nullability(target.nullable));
        }

        changes
    }

    /// Column clause for `CREATE TABLE` / `ADD COLUMN`.
    pub fn to_sql(&self) -> String {
        let mut clause = format!("{} {}", sql::ident(&self.name), self.sql_type);
        if !self.nullable {
            clause.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            clause.push_str(" DEFAULT ");
            clause.push_str(default);
        }
        clause
    }

    /// The definition this column takes in the history layer.
    ///
    /// History columns are always nullable and never draw from a sequence:
    /// identities are assigned once, in the current layer.
    pub fn history_mirror(&self) -> ColumnDef {
        let default = if self.draws_from_sequence() {
            None
        } else {
            self.default.clone()
        };

        ColumnDef {
            name: self.name.clone(),
            sql_type: self.storage_type(),
            nullable: true,
            default,
        }
    }
}

impl ColumnChange {
    /// `ALTER COLUMN` clause applying this change to `column`.
    pub fn to_sql(&self, column: &str) -> String {
        let col = sql::ident(column);
        match self {
            ColumnChange::Type { sql_type, using } => {
                let using = using
                    .clone()
                    .unwrap_or_else(|| format!("{}::{}", col, sql_type));
                format!("ALTER COLUMN {} TYPE {} USING {}", col, sql_type, using)
            }
            ColumnChange::Default(Some(expr)) => {
                format!("ALTER COLUMN {} SET DEFAULT {}", col, expr)
            }
            ColumnChange::Default(None) => format!("ALTER COLUMN {} DROP DEFAULT", col),
            ColumnChange::Nullability(true) => format!("ALTER COLUMN {} DROP NOT NULL", col),
            ColumnChange::Nullability(false) => format!("ALTER COLUMN {} SET NOT NULL", col),
        }
    }

    /// Whether the change must also be applied to the history layer.
    pub fn mirrors_to_history(&self) -> bool {
        !matches!(self, ColumnChange::Nullability(_))
    }
}

/// Fold common type aliases into the spelling `format_type()` produces.
pub fn normalize_type(sql_type: &str) -> String {
    let lowered = sql_type
        .trim()
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let (body, array) = match lowered.strip_suffix("[]") {
        Some(body) => (body.trim_end().to_string(), "[]"),
        None => (lowered, ""),
    };

    let (base, modifier) = match body.find('(') {
        Some(idx) => {
            let modifier: String = body[idx..].chars().filter(|c| !c.is_whitespace()).collect();
            (body[..idx].trim_end().to_string(), modifier)
        }
        None => (body, String::new()),
    };

    let canonical = match base.as_str() {
        "int" | "int4" | "integer" | "serial" | "serial4" => "integer",
        "int8" | "bigint" | "bigserial" | "serial8" => "bigint",
        "int2" | "smallint" | "smallserial" | "serial2" => "smallint",
        "float" | "float8" | "double precision" => "double precision",
        "float4" | "real" => "real",
        "varchar" | "character varying" => "character varying",
        "char" | "character" | "bpchar" => "character",
        "bool" | "boolean" => "boolean",
        "decimal" | "numeric" => "numeric",
        "timestamptz" | "timestamp with time zone" => "timestamp with time zone",
        "timestamp" | "timestamp without time zone" => "timestamp without time zone",
        "timetz" | "time with time zone" => "time with time zone",
        "time" | "time without time zone" => "time without time zone",
        other => other,
    };

    format!("{}{}{}", canonical, modifier, array)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_aliases() {
        assert_eq!(normalize_type("int"), "integer");
        assert_eq!(normalize_type("SERIAL"), "integer");
        assert_eq!(normalize_type("float"), "double precision");
        assert_eq!(normalize_type("varchar(255)"), "character varying(255)");
        assert_eq!(normalize_type("numeric(10, 2)"), "numeric(10,2)");
        assert_eq!(normalize_type("int[]"), "integer[]");
        assert_eq!(normalize_type("timestamptz"), "timestamp with time zone");
        assert_eq!(normalize_type("jsonb"), "jsonb");
    }

    #[test]
    fn test_sequence_default_detection() {
        let owned = ColumnDef::new("id", "integer")
            .with_default("nextval('orders_id_seq'::regclass)");
        assert_eq!(owned.sequence_default().as_deref(), Some("orders_id_seq"));

        let unowned = ColumnDef::new("id", "integer")
            .with_default("nextval('temporal.foobar'::regclass)");
        assert_eq!(unowned.sequence_default().as_deref(), Some("temporal.foobar"));

        let plain = ColumnDef::new("total", "numeric").with_default("0");
        assert_eq!(plain.sequence_default(), None);
        assert!(!plain.draws_from_sequence());
    }

    #[test]
    fn test_history_mirror_strips_sequences_and_not_null() {
        let id = ColumnDef::new("id", "serial").not_null();
        let mirrored = id.history_mirror();
        assert_eq!(mirrored.sql_type, "integer");
        assert!(mirrored.nullable);
        assert!(mirrored.default.is_none());

        let status = ColumnDef::new("status", "text")
            .not_null()
            .with_default("'new'::text");
        let mirrored = status.history_mirror();
        assert_eq!(mirrored.default.as_deref(), Some("'new'::text"));
        assert!(mirrored.nullable);
    }

    #[test]
    fn test_diff_reports_each_change() {
        let current = ColumnDef::new("foo", "integer");
        let target = ColumnDef::new("foo", "float").not_null().with_default("1.5");

        let changes = current.diff(&target);
        assert_eq!(
            changes,
            vec![
                ColumnChange::Type {
                    sql_type: "float".to_string(),
                    using: None
                },
                ColumnChange::Default(Some("1.5".to_string())),
                ColumnChange::Nullability(false),
            ]
        );
    }

    #[test]
    fn test_diff_equivalent_types_is_empty() {
        let current = ColumnDef::new("foo", "double precision");
        let target = ColumnDef::new("foo", "float8");
        assert!(current.diff(&target).is_empty());
    }

    #[test]
    fn test_change_sql() {
        let change = ColumnChange::Type {
            sql_type: "double precision".to_string(),
            using: None,
        };
        assert_eq!(
            change.to_sql("foo"),
            "ALTER COLUMN foo TYPE double precision USING foo::double precision"
        );
        assert_eq!(
            ColumnChange::Default(None).to_sql("order"),
            "ALTER COLUMN \"order\" DROP DEFAULT"
        );
        assert!(!ColumnChange::Nullability(false).mirrors_to_history());
    }

    #[test]
    fn test_column_clause() {
        let col = ColumnDef::new("label", "character varying")
            .not_null()
            .with_default("''::character varying");
        assert_eq!(
            col.to_sql(),
            "label character varying NOT NULL DEFAULT ''::character varying"
        );
    }
}
