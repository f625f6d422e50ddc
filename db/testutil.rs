// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Test fixtures shared by this crate's own tests and the binary crate's.

use crate::Store;

/// A `Store` backed by a temp-directory database file, torn down when
/// dropped.
pub struct TestDb {
    pub store: Store,
    _dir: tempfile::TempDir,
}

impl TestDb {
    pub async fn new() -> TestDb {
        let dir = tempfile::tempdir().expect("creating temp dir for test db");
        let store = Store::open(&dir.path().join("db.sqlite")).expect("opening test db");
        TestDb { store, _dir: dir }
    }
}
