// SQL predicate construction for LanceDB filters
// The engine takes filters as SQL strings, so every literal derived from ids or
// file paths is escaped here before interpolation.


use itertools::Itertools;

use super::{FILE_PATH_COLUMN, ID_COLUMN};

/// Escape a string for use inside a single-quoted SQL literal
#[inline]
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Escape a string for use inside a single-quoted `LIKE` pattern
///
/// Quotes are doubled first, then backslashes, then the `%` and `_`
/// wildcards, so none of the later steps can reinterpret an earlier escape.
#[inline]
pub fn escape_sql_like_pattern(value: &str) -> String {
    escape_sql_string(value)
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `id IN ('a', 'b')`
#[inline]
pub fn ids_in<I, S>(ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    in_list(ID_COLUMN, ids)
}

/// `` `filePath` IN ('a', 'b') ``
#[inline]
pub fn file_paths_in<I, S>(paths: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    in_list(&quoted_column(FILE_PATH_COLUMN), paths)
}

/// `` `filePath` LIKE 'prefix%' ``
#[inline]
pub fn file_path_starts_with(prefix: &str) -> String {
    format!(
        "{} LIKE '{}%'",
        quoted_column(FILE_PATH_COLUMN),
        escape_sql_like_pattern(prefix)
    )
}

/// `key = 'value'` against the metadata table
#[inline]
pub fn metadata_key_eq(key: &str) -> String {
    format!("key = '{}'", escape_sql_string(key))
}

fn in_list<I, S>(column: &str, values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let literals = values
        .into_iter()
        .map(|value| format!("'{}'", escape_sql_string(value.as_ref())))
        .join(", ");
    format!("{column} IN ({literals})")
}

// Mixed-case column names must be backtick-quoted or the filter parser folds them to lowercase
fn quoted_column(column: &str) -> String {
    format!("`{column}`")
}
