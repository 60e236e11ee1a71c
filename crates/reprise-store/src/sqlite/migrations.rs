// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded schema migrations.
//!
//! SQL files under `migrations/` are compiled in with `embed_migrations!` and
//! applied on open. Refinery records progress in `refinery_schema_history`.

use reprise_core::RepriseError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), RepriseError> {
    embedded::migrations::runner()
        .run(conn)
        .map_err(RepriseError::storage)?;
    Ok(())
}
