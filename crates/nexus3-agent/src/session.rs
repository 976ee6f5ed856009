//! Session file persistence (§4.7, §4.10): a JSON snapshot of an agent's
//! context and metadata under `~/.nexus3/sessions/<name>.json`, written with
//! mode 0600 and refusing to follow a symlink at the target path.

use std::fs::OpenOptions;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use nexus3_core::Message;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session name: {0}")]
    InvalidName(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed session file: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
}

/// Session names are validated the same way agent ids are, so a session
/// filename can never traverse outside the sessions directory.
fn validate_name(name: &str) -> Result<(), SessionError> {
    if name.is_empty() || name.len() > 64 {
        return Err(SessionError::InvalidName(name.to_string()));
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
        return Err(SessionError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub fn sessions_dir() -> PathBuf {
    dirs_home().join(".nexus3").join("sessions")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn session_path(name: &str) -> Result<PathBuf, SessionError> {
    validate_name(name)?;
    Ok(sessions_dir().join(format!("{name}.json")))
}

/// Writes `snapshot` to its session file, refusing to follow an existing
/// symlink and creating the file with mode 0600.
pub fn save(snapshot: &SessionSnapshot) -> Result<(), SessionError> {
    let dir = sessions_dir();
    std::fs::create_dir_all(&dir)?;
    let path = session_path(&snapshot.name)?;

    if path.symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false) {
        return Err(SessionError::Io(io::Error::new(
            io::ErrorKind::Other,
            "refusing to write through a symlink",
        )));
    }

    let body = serde_json::to_vec_pretty(snapshot)?;
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
        opts.custom_flags(libc::O_NOFOLLOW);
    }
    let mut file = opts.open(&path)?;
    file.write_all(&body)?;
    Ok(())
}

pub fn load(name: &str) -> Result<SessionSnapshot, SessionError> {
    let path = session_path(name)?;
    let body = std::fs::read(path)?;
    Ok(serde_json::from_slice(&body)?)
}

pub fn exists(name: &str) -> bool {
    session_path(name).map(|p| p.exists()).unwrap_or(false)
}

pub fn delete(name: &str) -> Result<(), SessionError> {
    let path = session_path(name)?;
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn list() -> Vec<String> {
    let dir = sessions_dir();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                path.file_stem().and_then(|s| s.to_str()).map(String::from)
            } else {
                None
            }
        })
        .collect()
}

/// Builds a snapshot from the given context state, stamping both timestamps
/// to `now` — used both at creation and on every subsequent save.
pub fn snapshot(
    name: impl Into<String>,
    created_at: impl Into<String>,
    now: impl Into<String>,
    system_prompt: Option<String>,
    messages: Vec<Message>,
) -> SessionSnapshot {
    SessionSnapshot {
        name: name.into(),
        created_at: created_at.into(),
        updated_at: now.into(),
        system_prompt,
        messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static HOME_GUARD: Mutex<()> = Mutex::new(());

    fn with_temp_home<T>(f: impl FnOnce() -> T) -> T {
        let _guard = HOME_GUARD.lock().unwrap();
        let dir = std::env::temp_dir().join(format!("nexus3-session-test-{:?}", std::thread::current().id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let prev = std::env::var_os("HOME");
        std::env::set_var("HOME", &dir);
        let result = f();
        match prev {
            Some(p) => std::env::set_var("HOME", p),
            None => std::env::remove_var("HOME"),
        }
        let _ = std::fs::remove_dir_all(&dir);
        result
    }

    #[test]
    fn rejects_path_traversal_names() {
        assert!(session_path("../etc/passwd").is_err());
        assert!(session_path("a/b").is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        with_temp_home(|| {
            let snap = snapshot(
                "my-session",
                "2026-01-01T00:00:00Z",
                "2026-01-01T00:00:00Z",
                Some("be helpful".to_string()),
                vec![Message::user("hi")],
            );
            save(&snap).unwrap();
            assert!(exists("my-session"));
            let loaded = load("my-session").unwrap();
            assert_eq!(loaded.messages.len(), 1);
            assert_eq!(loaded.system_prompt.as_deref(), Some("be helpful"));
        });
    }

    #[test]
    fn refuses_to_follow_symlink() {
        with_temp_home(|| {
            let dir = sessions_dir();
            std::fs::create_dir_all(&dir).unwrap();
            let target = dir.join("real.json");
            std::fs::write(&target, "{}").unwrap();
            #[cfg(unix)]
            {
                let link = dir.join("evil.json");
                std::os::unix::fs::symlink(&target, &link).unwrap();
                let snap = snapshot("evil", "t", "t", None, vec![]);
                assert!(save(&snap).is_err());
            }
        });
    }

    #[test]
    fn list_finds_saved_sessions() {
        with_temp_home(|| {
            let snap = snapshot("listed", "t", "t", None, vec![]);
            save(&snap).unwrap();
            assert!(list().contains(&"listed".to_string()));
        });
    }

    #[test]
    fn delete_is_idempotent() {
        with_temp_home(|| {
            assert!(delete("never-existed").is_ok());
        });
    }
}
