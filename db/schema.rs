// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Forward-only, idempotent schema migrations, tracked in a single-row
//! `meta` table rather than `pragma user_version` so the current version is
//! visible with a plain `select` when debugging.

use base::{Error, ErrorKind};

const CURRENT_VERSION: i32 = 1;

const V1: &str = r#"
create table meta (
  id integer primary key check (id = 0),
  version integer not null
);
insert into meta (id, version) values (0, 1);

create table camera (
  id integer primary key,
  name text not null,
  kind text not null check (kind in ('onvif', 'rtsp', 'uvc')),
  host text,
  port integer,
  username text,
  password text,
  xaddr text,
  stream_path text,
  device_node text,
  pixel_format text,
  width integer,
  height integer,
  fps integer
);

create table recording (
  id integer primary key,
  camera_id integer not null,
  filename text not null,
  start_time_secs integer not null,
  end_time_secs integer not null check (end_time_secs >= start_time_secs),
  thumbnail_filename text
);
create index recording_camera on recording (camera_id);

create table schedule (
  id integer primary key,
  camera_id integer not null,
  name text not null,
  cron_expr text not null,
  duration_minutes integer not null check (duration_minutes > 0),
  fps_override integer,
  enabled integer not null check (enabled in (0, 1)),
  next_run_secs integer
);
create index schedule_camera on schedule (camera_id);
"#;

/// Returns the schema version, or `None` if the database has never been
/// initialized (no `meta` table yet).
pub fn get_schema_version(conn: &rusqlite::Connection) -> Result<Option<i32>, Error> {
    let exists: bool = conn
        .query_row(
            "select count(*) > 0 from sqlite_master where type = 'table' and name = 'meta'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::wrap(ErrorKind::Internal, "checking for meta table", e))?;
    if !exists {
        return Ok(None);
    }
    let v = conn
        .query_row("select version from meta where id = 0", [], |row| {
            row.get(0)
        })
        .map_err(|e| Error::wrap(ErrorKind::Internal, "reading schema version", e))?;
    Ok(Some(v))
}

/// Brings `conn`'s schema up to `CURRENT_VERSION`. Safe to call on an
/// already-current database (a no-op) and on a brand new one.
pub fn init(conn: &mut rusqlite::Connection) -> Result<(), Error> {
    let cur = get_schema_version(conn)?;
    match cur {
        None => {
            let tx = conn
                .transaction()
                .map_err(|e| Error::wrap(ErrorKind::Internal, "starting migration", e))?;
            tx.execute_batch(V1)
                .map_err(|e| Error::wrap(ErrorKind::Internal, "applying schema v1", e))?;
            tx.commit()
                .map_err(|e| Error::wrap(ErrorKind::Internal, "committing schema v1", e))?;
            tracing::info!(version = CURRENT_VERSION, "database initialized");
        }
        Some(v) if v == CURRENT_VERSION => {
            tracing::debug!(version = v, "database already at current schema version");
        }
        Some(v) if v > CURRENT_VERSION => {
            return Err(Error::new(
                ErrorKind::Internal,
                format!(
                    "database schema version {v} is newer than this binary supports ({CURRENT_VERSION})"
                ),
            ));
        }
        Some(v) => {
            // Forward-only migrations beyond v1 would be added here, one
            // `vN_to_vN+1` step at a time, matching this same pattern.
            return Err(Error::new(
                ErrorKind::Internal,
                format!("no migration path from schema version {v}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        init(&mut conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(CURRENT_VERSION));
        // Calling again must not error or re-apply the schema.
        init(&mut conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(CURRENT_VERSION));
    }

    #[test]
    fn fresh_database_has_no_version() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), None);
    }
}
