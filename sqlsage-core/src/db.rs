//! Short-lived connections to the target database.
//!
//! There is no pool: every catalog extraction and every statement execution opens its
//! own connection and closes it before returning. Dropping a `PgConnection` also closes
//! the socket, so early returns via `?` release it too.

use sqlx::postgres::PgConnection;
use sqlx::Connection;

pub async fn connect(uri: &str) -> Result<PgConnection, sqlx::Error> {
    PgConnection::connect(uri).await
}

/// Close a connection, logging instead of failing if the server already hung up.
pub async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "Connection close reported an error");
    }
}
