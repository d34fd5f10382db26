//! Identifier assertion.
//!
//! Object names that have to be interpolated into SQL text (a table in
//! `SELECT COUNT(1) FROM ...`, a role in `SET ROLE ...`) are parsed with
//! [sqlparser](https://docs.rs/sqlparser/) using the backend's dialect, then
//! resolved against the catalog. Only the catalog's own spelling, quoted, is
//! ever interpolated.

use crate::db::session::DbSession;
use crate::db::shape::Fetch;
use crate::db::types::Value;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam, Statement};
use sqlparser::ast::{Ident, ObjectNamePart};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use tracing::debug;

/// Get the appropriate SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// `database.schema.table` on PostgreSQL, `schema.table` elsewhere.
fn max_parts(db_type: DatabaseType) -> usize {
    match db_type {
        DatabaseType::PostgreSQL => 3,
        DatabaseType::MySQL | DatabaseType::SQLite => 2,
    }
}

/// Spelling of one parsed identifier as the catalog stores it.
///
/// PostgreSQL folds unquoted identifiers to lower case; quoted ones keep
/// their exact spelling. The other backends keep what was written.
fn stored_spelling(ident: Ident, db_type: DatabaseType) -> String {
    match (db_type, ident.quote_style) {
        (DatabaseType::PostgreSQL, None) => ident.value.to_ascii_lowercase(),
        _ => ident.value,
    }
}

/// A syntactically valid, possibly qualified object name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// Parts as stored in the catalog, outermost first.
    parts: Vec<String>,
    db_type: DatabaseType,
}

impl QualifiedName {
    /// Parse `name` as exactly one object name and nothing else.
    pub fn parse(name: &str, db_type: DatabaseType) -> DbResult<Self> {
        let invalid = |reason: String| DbError::invalid_identifier(name, reason);

        let dialect = get_dialect(db_type);
        let mut parser = Parser::new(dialect.as_ref())
            .try_with_sql(name)
            .map_err(|e| invalid(e.to_string()))?;
        let object = parser
            .parse_object_name(false)
            .map_err(|e| invalid(e.to_string()))?;
        if parser.peek_token().token != Token::EOF {
            return Err(invalid("unexpected text after the object name".to_string()));
        }

        let parts = object
            .0
            .into_iter()
            .map(|part| match part {
                ObjectNamePart::Identifier(ident) => Ok(stored_spelling(ident, db_type)),
                #[allow(unreachable_patterns)]
                other => Err(invalid(format!("unsupported name part: {other}"))),
            })
            .collect::<DbResult<Vec<_>>>()?;

        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("empty name part".to_string()));
        }
        if parts.len() > max_parts(db_type) {
            return Err(invalid(format!(
                "at most {} name parts are allowed",
                max_parts(db_type)
            )));
        }

        Ok(Self { parts, db_type })
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// The unqualified object name.
    pub fn object(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// The qualifier directly in front of the object, if any.
    pub fn schema(&self) -> Option<&str> {
        let n = self.parts.len();
        (n >= 2).then(|| self.parts[n - 2].as_str())
    }

    /// Every part quoted for the backend, joined with dots.
    pub fn quoted(&self) -> String {
        self.parts
            .iter()
            .map(|p| quote_identifier(p, self.db_type))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Quote one identifier, doubling any embedded quote character.
pub fn quote_identifier(ident: &str, db_type: DatabaseType) -> String {
    match db_type {
        DatabaseType::MySQL => format!("`{}`", ident.replace('`', "``")),
        DatabaseType::PostgreSQL | DatabaseType::SQLite => {
            format!("\"{}\"", ident.replace('"', "\"\""))
        }
    }
}

/// Assert a role name and return it quoted for `SET ROLE`.
pub fn assert_role(name: &str, db_type: DatabaseType) -> DbResult<String> {
    let parsed = QualifiedName::parse(name, db_type)?;
    if parsed.parts().len() != 1 {
        return Err(DbError::invalid_identifier(
            name,
            "a role name cannot be qualified",
        ));
    }
    Ok(parsed.quoted())
}

/// Resolve a table or view name in the catalog.
///
/// Returns the catalog's canonical, quoted spelling, suitable for
/// interpolation. Unknown objects are reported as invalid identifiers.
pub(crate) async fn resolve_table(session: &mut DbSession, name: &str) -> DbResult<String> {
    let db_type = session.database_type();
    let parsed = QualifiedName::parse(name, db_type)?;
    let not_found = || DbError::invalid_identifier(name, "no such table or view");

    let canonical = match db_type {
        DatabaseType::PostgreSQL => {
            let stmt = Statement::prepared(
                "SELECT CAST(to_regclass($1) AS TEXT)",
                vec![QueryParam::from(parsed.quoted())],
            );
            // to_regclass already renders the name quoted where needed
            first_value(session, &stmt)
                .await
                .map_err(|e| match e {
                    // e.g. a cross-database reference
                    DbError::Database { message, .. } => DbError::invalid_identifier(name, message),
                    other => other,
                })?
                .ok_or_else(not_found)?
        }
        DatabaseType::MySQL => {
            let stmt = Statement::prepared(
                "SELECT table_schema, table_name FROM information_schema.tables \
                 WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ?",
                vec![
                    QueryParam::from(parsed.schema().map(str::to_string)),
                    QueryParam::from(parsed.object()),
                ],
            );
            let row = session
                .fetch_rows(&stmt, Fetch::First)
                .await?
                .into_iter()
                .next()
                .ok_or_else(not_found)?;
            let mut values = row.values.iter().map(catalog_text);
            match (values.next().flatten(), values.next().flatten()) {
                (Some(schema), Some(table)) => format!(
                    "{}.{}",
                    quote_identifier(&schema, db_type),
                    quote_identifier(&table, db_type)
                ),
                _ => return Err(not_found()),
            }
        }
        DatabaseType::SQLite => {
            let schema = match parsed.schema() {
                Some(schema) => assert_schema(session, schema).await?,
                None => "main".to_string(),
            };
            let stmt = Statement::prepared(
                format!(
                    "SELECT name FROM {}.sqlite_master \
                     WHERE type IN ('table', 'view') AND name = ? COLLATE NOCASE",
                    quote_identifier(&schema, db_type)
                ),
                vec![QueryParam::from(parsed.object())],
            );
            let table = first_value(session, &stmt).await?.ok_or_else(not_found)?;
            format!(
                "{}.{}",
                quote_identifier(&schema, db_type),
                quote_identifier(&table, db_type)
            )
        }
    };

    debug!(name = %name, canonical = %canonical, "Resolved object name");
    Ok(canonical)
}

/// Assert that a SQLite schema (an attached database) exists.
///
/// Returns the catalog's spelling of the schema name.
pub(crate) async fn assert_schema(session: &mut DbSession, schema: &str) -> DbResult<String> {
    let stmt = Statement::prepared(
        "SELECT name FROM pragma_database_list WHERE name = ? COLLATE NOCASE",
        vec![QueryParam::from(schema)],
    );
    first_value(session, &stmt)
        .await?
        .ok_or_else(|| DbError::invalid_identifier(schema, "no such schema"))
}

/// First column of the first row, as text.
async fn first_value(session: &mut DbSession, stmt: &Statement) -> DbResult<Option<String>> {
    let rows = session.fetch_rows(stmt, Fetch::First).await?;
    Ok(rows
        .into_iter()
        .next()
        .and_then(|row| row.values.first().and_then(catalog_text)))
}

/// Catalog names may come back as binary strings on some MySQL versions.
fn catalog_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PG: DatabaseType = DatabaseType::PostgreSQL;

    #[test]
    fn test_parse_simple_name() {
        let name = QualifiedName::parse("orders", PG).unwrap();
        assert_eq!(name.parts(), ["orders"]);
        assert_eq!(name.object(), "orders");
        assert_eq!(name.schema(), None);
    }

    #[test]
    fn test_parse_qualified_name() {
        let name = QualifiedName::parse("etl.trips", PG).unwrap();
        assert_eq!(name.schema(), Some("etl"));
        assert_eq!(name.object(), "trips");
        assert_eq!(name.quoted(), "\"etl\".\"trips\"");
    }

    #[test]
    fn test_postgres_folds_unquoted_parts() {
        let name = QualifiedName::parse("Etl.\"Trips\"", PG).unwrap();
        assert_eq!(name.parts(), ["etl", "Trips"]);
        assert_eq!(name.quoted(), "\"etl\".\"Trips\"");
        assert_eq!(QualifiedName::parse("Orders", PG).unwrap().quoted(), "\"orders\"");
        assert_eq!(
            QualifiedName::parse("Orders", DatabaseType::MySQL)
                .unwrap()
                .quoted(),
            "`Orders`"
        );
    }

    #[test]
    fn test_parse_quoted_name_keeps_spaces() {
        let name = QualifiedName::parse("\"Trip Data\"", DatabaseType::SQLite).unwrap();
        assert_eq!(name.object(), "Trip Data");
    }

    #[test]
    fn test_parse_rejects_trailing_statement() {
        let err = QualifiedName::parse("orders; DROP TABLE orders", PG).unwrap_err();
        assert!(matches!(err, DbError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_parse_rejects_semicolon() {
        assert!(QualifiedName::parse("orders;", DatabaseType::MySQL).is_err());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(QualifiedName::parse("", PG).is_err());
        assert!(QualifiedName::parse("   ", DatabaseType::SQLite).is_err());
    }

    #[test]
    fn test_parse_rejects_too_many_parts() {
        assert!(QualifiedName::parse("a.b.c", DatabaseType::MySQL).is_err());
        assert!(QualifiedName::parse("a.b.c", PG).is_ok());
        assert!(QualifiedName::parse("a.b.c.d", PG).is_err());
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(quote_identifier("a\"b", PG), "\"a\"\"b\"");
        assert_eq!(quote_identifier("a`b", DatabaseType::MySQL), "`a``b`");
    }

    #[test]
    fn test_assert_role() {
        assert_eq!(assert_role("etl_admin", PG).unwrap(), "\"etl_admin\"");
        assert!(assert_role("public.admin", PG).is_err());
        assert!(assert_role("admin; RESET ROLE", PG).is_err());
    }

    #[test]
    fn test_catalog_text_decodes_bytes() {
        assert_eq!(
            catalog_text(&Value::Bytes(b"trips".to_vec())),
            Some("trips".to_string())
        );
        assert_eq!(catalog_text(&Value::Null), None);
    }
}
