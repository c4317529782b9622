/// Structured failures raised while mirroring. Each variant keeps the path it
/// concerns and the underlying message so the summary and the failure report
/// can render them without re-parsing strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    /// Remote directory missing or inaccessible.
    Navigation(String, String),
    /// Directory listing failed after a successful change of directory.
    Listing(String, String),
    /// Local directory or file could not be created.
    LocalIo(String, String),
    /// Fetch failed; the remote file is left for a future run.
    Transfer(String, String),
    /// Remote file or directory removal failed.
    Removal(String, String),
    /// Transport connect/authentication failure or connection lost mid-run.
    Connection(String, String),
    /// Remote-command session failure.
    Session(String, String),
}

impl std::fmt::Display for MirrorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use MirrorError::*;
        match self {
            Navigation(p, m) => write!(f, "cannot enter remote directory {}: {}", p, m),
            Listing(p, m) => write!(f, "cannot list remote directory {}: {}", p, m),
            LocalIo(p, m) => write!(f, "local filesystem error at {}: {}", p, m),
            Transfer(p, m) => write!(f, "fetch failed for {}: {}", p, m),
            Removal(p, m) => write!(f, "remote removal failed for {}: {}", p, m),
            Connection(a, m) => write!(f, "connection to {} failed: {}", a, m),
            Session(a, m) => write!(f, "remote session on {} failed: {}", a, m),
        }
    }
}

impl std::error::Error for MirrorError {}

impl MirrorError {
    /// Whether the failure must abort the whole run and hand control to the
    /// recovery loop. Everything else is contained to one file or subtree.
    pub fn escalates(&self) -> bool {
        matches!(self, MirrorError::Connection(..) | MirrorError::Session(..))
    }

    pub fn variant(&self) -> &'static str {
        use MirrorError::*;
        match self {
            Navigation(..) => "Navigation",
            Listing(..) => "Listing",
            LocalIo(..) => "LocalIo",
            Transfer(..) => "Transfer",
            Removal(..) => "Removal",
            Connection(..) => "Connection",
            Session(..) => "Session",
        }
    }

    pub fn path(&self) -> &str {
        use MirrorError::*;
        match self {
            Navigation(p, _) | Listing(p, _) | LocalIo(p, _) | Transfer(p, _) | Removal(p, _)
            | Connection(p, _) | Session(p, _) => p,
        }
    }

    pub fn message(&self) -> &str {
        use MirrorError::*;
        match self {
            Navigation(_, m) | Listing(_, m) | LocalIo(_, m) | Transfer(_, m) | Removal(_, m)
            | Connection(_, m) | Session(_, m) => m,
        }
    }

    /// JSON object written to the failure report, one per line.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "variant": self.variant(),
            "path": self.path(),
            "message": self.message(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_level_failures_escalate() {
        assert!(MirrorError::Connection("h:22".into(), "refused".into()).escalates());
        assert!(MirrorError::Session("h:22".into(), "auth".into()).escalates());
        assert!(!MirrorError::Navigation("/x".into(), "no such file".into()).escalates());
        assert!(!MirrorError::Listing("/x".into(), "eof".into()).escalates());
        assert!(!MirrorError::LocalIo("/x".into(), "denied".into()).escalates());
        assert!(!MirrorError::Transfer("/x".into(), "eof".into()).escalates());
        assert!(!MirrorError::Removal("/x".into(), "denied".into()).escalates());
    }

    #[test]
    fn json_carries_variant_path_and_message() {
        let e = MirrorError::Removal("/data/a.txt".into(), "permission denied".into());
        let v = e.to_json();
        assert_eq!(v["variant"], "Removal");
        assert_eq!(v["path"], "/data/a.txt");
        assert_eq!(v["message"], "permission denied");
        assert!(e.to_string().contains("/data/a.txt"));
    }
}
