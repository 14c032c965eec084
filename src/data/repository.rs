use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::AppError;
use crate::models::indexed_file::{FileType, IndexedFile};
use crate::scope_path;

const FILE_COLUMNS: &str =
    "path, description, file_type, size_bytes, last_modified, indexed_at, updated_at, symlink_target";

fn row_to_file(row: &Row) -> rusqlite::Result<IndexedFile> {
    let file_type: String = row.get(2)?;
    let size: i64 = row.get(3)?;
    Ok(IndexedFile {
        path: row.get(0)?,
        description: row.get(1)?,
        file_type: file_type.parse().unwrap_or(FileType::Other),
        size: size.max(0) as u64,
        last_modified: row.get(4)?,
        indexed_at: row.get(5)?,
        updated_at: row.get(6)?,
        symlink_target: row.get(7)?,
    })
}

/// Inserts or replaces the row for `file.path`. `indexed_at` of an existing
/// row is preserved.
pub fn upsert_file(conn: &Connection, file: &IndexedFile) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO indexed_files (path, description, file_type, size_bytes, last_modified, indexed_at, updated_at, symlink_target)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(path) DO UPDATE SET
            description = excluded.description,
            file_type = excluded.file_type,
            size_bytes = excluded.size_bytes,
            last_modified = excluded.last_modified,
            updated_at = excluded.updated_at,
            symlink_target = excluded.symlink_target",
        params![
            file.path,
            file.description,
            file.file_type.to_string(),
            file.size as i64,
            file.last_modified,
            file.indexed_at,
            file.updated_at,
            file.symlink_target,
        ],
    )?;
    Ok(())
}

pub fn get_by_path(conn: &Connection, path: &str) -> Result<Option<IndexedFile>, AppError> {
    let file = conn
        .query_row(
            &format!("SELECT {FILE_COLUMNS} FROM indexed_files WHERE path = ?1"),
            params![path],
            row_to_file,
        )
        .optional()?;
    Ok(file)
}

pub fn get_last_modified(conn: &Connection, path: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    let modified = conn
        .query_row(
            "SELECT last_modified FROM indexed_files WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )
        .optional()?;
    Ok(modified)
}

pub fn delete_by_path(conn: &Connection, path: &str) -> Result<usize, AppError> {
    let count = conn.execute("DELETE FROM indexed_files WHERE path = ?1", params![path])?;
    Ok(count)
}

/// Rows at `directory` or beneath it. The prefix is separator-terminated so
/// `/home/doc` never matches `/home/documents`.
pub fn list_under(conn: &Connection, directory: &str) -> Result<Vec<IndexedFile>, AppError> {
    let exact = scope_path::clean(std::path::Path::new(directory))
        .to_string_lossy()
        .to_string();
    let prefix = scope_path::dir_prefix(directory);
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM indexed_files
         WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2
         ORDER BY path ASC"
    ))?;

    let files = stmt
        .query_map(params![exact, prefix], row_to_file)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(files)
}

pub fn all_paths(conn: &Connection) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare("SELECT path FROM indexed_files ORDER BY path ASC")?;
    let paths = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(paths)
}

/// Moves a row to a new key and refreshes its filesystem metadata. The
/// description and type are left alone. A stale row already holding
/// `new_path` is replaced.
pub fn rewrite_path(
    conn: &Connection,
    old_path: &str,
    new_path: &str,
    size: u64,
    last_modified: DateTime<Utc>,
    symlink_target: Option<&str>,
) -> Result<usize, AppError> {
    let count = conn.execute(
        "UPDATE OR REPLACE indexed_files
         SET path = ?1, size_bytes = ?2, last_modified = ?3, updated_at = ?4, symlink_target = ?5
         WHERE path = ?6",
        params![
            new_path,
            size as i64,
            last_modified,
            Utc::now(),
            symlink_target,
            old_path
        ],
    )?;
    Ok(count)
}

pub fn update_description(
    conn: &Connection,
    path: &str,
    description: &str,
    last_modified: DateTime<Utc>,
) -> Result<usize, AppError> {
    let count = conn.execute(
        "UPDATE indexed_files SET description = ?1, last_modified = ?2, updated_at = ?3
         WHERE path = ?4",
        params![description, last_modified, Utc::now(), path],
    )?;
    Ok(count)
}

pub fn delete_under(conn: &Connection, directory: &str) -> Result<usize, AppError> {
    let exact = scope_path::clean(std::path::Path::new(directory))
        .to_string_lossy()
        .to_string();
    let prefix = scope_path::dir_prefix(directory);
    let count = conn.execute(
        "DELETE FROM indexed_files WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2",
        params![exact, prefix],
    )?;
    Ok(count)
}

pub fn count_by_type(conn: &Connection, directory: &str) -> Result<Vec<(String, usize)>, AppError> {
    let exact = scope_path::clean(std::path::Path::new(directory))
        .to_string_lossy()
        .to_string();
    let prefix = scope_path::dir_prefix(directory);
    let mut stmt = conn.prepare(
        "SELECT file_type, COUNT(*) FROM indexed_files
         WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2
         GROUP BY file_type ORDER BY file_type ASC",
    )?;
    let counts = stmt
        .query_map(params![exact, prefix], |row| {
            let count: i64 = row.get(1)?;
            Ok((row.get::<_, String>(0)?, count.max(0) as usize))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::migrations::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn sample_file(path: &str) -> IndexedFile {
        let now = Utc::now();
        IndexedFile {
            path: path.to_string(),
            description: "project readme".to_string(),
            file_type: FileType::Text,
            size: 1024,
            last_modified: now,
            indexed_at: now,
            updated_at: now,
            symlink_target: None,
        }
    }

    #[test]
    fn test_file_crud() {
        let conn = setup_db();
        let file = sample_file("/home/user/docs/readme.md");

        upsert_file(&conn, &file).unwrap();

        let fetched = get_by_path(&conn, &file.path).unwrap().unwrap();
        assert_eq!(fetched.description, "project readme");
        assert_eq!(fetched.size, 1024);
        assert_eq!(fetched.last_modified, file.last_modified);

        let count = delete_by_path(&conn, &file.path).unwrap();
        assert_eq!(count, 1);
        assert!(get_by_path(&conn, &file.path).unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_fields() {
        let conn = setup_db();
        let mut file = sample_file("/home/user/docs/readme.md");

        upsert_file(&conn, &file).unwrap();
        file.size = 2048;
        file.symlink_target = Some("../other.md".to_string());
        upsert_file(&conn, &file).unwrap();

        let fetched = get_by_path(&conn, &file.path).unwrap().unwrap();
        assert_eq!(fetched.size, 2048);
        assert_eq!(fetched.symlink_target.as_deref(), Some("../other.md"));
        assert_eq!(all_paths(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_list_under_ignores_sibling_prefix() {
        let conn = setup_db();
        upsert_file(&conn, &sample_file("/home/user/doc/a.txt")).unwrap();
        upsert_file(&conn, &sample_file("/home/user/doc/sub/b.txt")).unwrap();
        upsert_file(&conn, &sample_file("/home/user/documents/c.txt")).unwrap();

        let listed: Vec<String> = list_under(&conn, "/home/user/doc")
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(listed, vec!["/home/user/doc/a.txt", "/home/user/doc/sub/b.txt"]);

        let trailing = list_under(&conn, "/home/user/doc/").unwrap();
        assert_eq!(trailing.len(), 2);
    }

    #[test]
    fn test_list_under_treats_wildcards_literally() {
        let conn = setup_db();
        upsert_file(&conn, &sample_file("/data/100%_done/a.txt")).unwrap();
        upsert_file(&conn, &sample_file("/data/100x_done/b.txt")).unwrap();

        let listed = list_under(&conn, "/data/100%_done").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "/data/100%_done/a.txt");
    }

    #[test]
    fn test_rewrite_path_keeps_description() {
        let conn = setup_db();
        upsert_file(&conn, &sample_file("/base/a.txt")).unwrap();

        let mtime = Utc::now();
        let updated = rewrite_path(&conn, "/base/a.txt", "/base/sub/a.txt", 7, mtime, None).unwrap();
        assert_eq!(updated, 1);

        assert!(get_by_path(&conn, "/base/a.txt").unwrap().is_none());
        let moved = get_by_path(&conn, "/base/sub/a.txt").unwrap().unwrap();
        assert_eq!(moved.description, "project readme");
        assert_eq!(moved.size, 7);
        assert_eq!(moved.last_modified, mtime);
    }

    #[test]
    fn test_delete_under_and_counts() {
        let conn = setup_db();
        upsert_file(&conn, &sample_file("/base/a.txt")).unwrap();
        let mut image = sample_file("/base/pics/b.png");
        image.file_type = FileType::Image;
        upsert_file(&conn, &image).unwrap();
        upsert_file(&conn, &sample_file("/elsewhere/c.txt")).unwrap();

        let counts = count_by_type(&conn, "/base").unwrap();
        assert_eq!(counts, vec![("image".to_string(), 1), ("text".to_string(), 1)]);

        assert_eq!(delete_under(&conn, "/base").unwrap(), 2);
        assert_eq!(all_paths(&conn).unwrap(), vec!["/elsewhere/c.txt"]);
    }

    #[test]
    fn test_update_description() {
        let conn = setup_db();
        upsert_file(&conn, &sample_file("/base/a.txt")).unwrap();
        let mtime = Utc::now();
        update_description(&conn, "/base/a.txt", "tax return", mtime).unwrap();

        let fetched = get_by_path(&conn, "/base/a.txt").unwrap().unwrap();
        assert_eq!(fetched.description, "tax return");
        assert_eq!(get_last_modified(&conn, "/base/a.txt").unwrap(), Some(mtime));
    }
}
