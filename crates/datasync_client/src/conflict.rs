//! Conflict resolution for writes that lose an optimistic concurrency check.

use datasync_core::TableData;
use tracing::debug;

/// What to do when the server rejects a write with `409` or `412`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the server entity; the local change is dropped.
    #[default]
    ServerWins,
    /// Retry the local change against the server's current version.
    ClientWins,
    /// Keep whichever side was modified most recently.
    LastWriteWins,
    /// Surface the conflict to the caller.
    Manual,
}

/// The outcome of applying a [`ConflictPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Accept the server entity.
    UseServer(TableData),
    /// Write this entity again; it carries the server version.
    Retry(TableData),
    /// Leave the conflict to the caller.
    Unresolved,
}

impl ConflictPolicy {
    /// Decides between the `local` write and the `server` entity.
    ///
    /// For [`ConflictPolicy::LastWriteWins`] the local `updated_at` is the
    /// time of the local modification; ties go to the server.
    pub fn resolve(self, local: &TableData, server: &TableData) -> Resolution {
        let client_wins = match self {
            Self::ServerWins => false,
            Self::ClientWins => true,
            Self::LastWriteWins => local.updated_at > server.updated_at,
            Self::Manual => {
                debug!(id = %server.id, "conflict left to caller");
                return Resolution::Unresolved;
            }
        };
        debug!(id = %server.id, policy = ?self, client_wins, "conflict resolved");

        if client_wins {
            let mut retry = local.clone();
            retry.version = server.version.clone();
            Resolution::Retry(retry)
        } else {
            Resolution::UseServer(server.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use datasync_core::Version;

    fn pair() -> (TableData, TableData) {
        let now = Utc::now();
        let mut local = TableData::new("m1").with_property("title", "local");
        local.version = Version::new(vec![1]);
        local.updated_at = now;
        let mut server = TableData::new("m1").with_property("title", "server");
        server.version = Version::new(vec![2]);
        server.updated_at = now - Duration::seconds(10);
        (local, server)
    }

    #[test]
    fn server_wins_keeps_server() {
        let (local, server) = pair();
        assert_eq!(
            ConflictPolicy::ServerWins.resolve(&local, &server),
            Resolution::UseServer(server)
        );
    }

    #[test]
    fn client_wins_takes_server_version() {
        let (local, server) = pair();
        let Resolution::Retry(retry) = ConflictPolicy::ClientWins.resolve(&local, &server) else {
            panic!("expected retry");
        };
        assert_eq!(retry.version, server.version);
        assert_eq!(retry.property("title"), Some(&"local".into()));
    }

    #[test]
    fn last_write_wins_compares_timestamps() {
        let (local, mut server) = pair();
        assert!(matches!(
            ConflictPolicy::LastWriteWins.resolve(&local, &server),
            Resolution::Retry(_)
        ));

        server.updated_at = local.updated_at;
        assert!(matches!(
            ConflictPolicy::LastWriteWins.resolve(&local, &server),
            Resolution::UseServer(_)
        ));
    }

    #[test]
    fn manual_is_unresolved() {
        let (local, server) = pair();
        assert_eq!(
            ConflictPolicy::Manual.resolve(&local, &server),
            Resolution::Unresolved
        );
    }
}
