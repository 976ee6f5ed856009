//! Bearer-token auth (§4.12, §6): the server mints a random token per port
//! and writes it to a file with owner-only permissions; every request must
//! present it via `Authorization: Bearer <token>`.

use std::io::Write as _;
use std::path::PathBuf;

use ring::rand::{SecureRandom, SystemRandom};

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[derive(Clone, Debug)]
pub struct ServerAuth {
    token: String,
}

impl ServerAuth {
    /// Generates a fresh token and persists it to `~/.nexus3/server.{port}.key`
    /// with mode 0600, per §6.
    pub fn generate(port: u16) -> std::io::Result<Self> {
        let mut bytes = [0u8; 32];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "failed to generate random token"))?;
        let token = hex_encode(&bytes);
        let auth = Self { token };
        auth.persist(port)?;
        Ok(auth)
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    fn persist(&self, port: u16) -> std::io::Result<()> {
        let path = token_file_path(port);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(&path)?;
        file.write_all(self.token.as_bytes())?;
        Ok(())
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Verifies an `Authorization: Bearer <token>` header value.
    pub fn verify_header(&self, header: Option<&str>) -> bool {
        match header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(provided) => constant_time_eq(provided.as_bytes(), self.token.as_bytes()),
            None => false,
        }
    }
}

pub fn token_file_path(port: u16) -> PathBuf {
    home_dir().join(".nexus3").join(format!("server.{port}.key"))
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_header_accepts_matching_token() {
        let auth = ServerAuth::from_token("secret-token");
        assert!(auth.verify_header(Some("Bearer secret-token")));
    }

    #[test]
    fn verify_header_rejects_wrong_token() {
        let auth = ServerAuth::from_token("secret-token");
        assert!(!auth.verify_header(Some("Bearer wrong")));
    }

    #[test]
    fn verify_header_rejects_missing_header() {
        let auth = ServerAuth::from_token("secret-token");
        assert!(!auth.verify_header(None));
    }

    #[test]
    fn verify_header_rejects_malformed_scheme() {
        let auth = ServerAuth::from_token("secret-token");
        assert!(!auth.verify_header(Some("secret-token")));
    }
}
