use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

/// Hex sha256 of an access code, as kept in the events table.
pub fn hash_access_code(code: &str) -> String {
    let digest = Sha256::digest(code.trim().as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn check_credentials(expected_hash: &str, supplied: &str) -> bool {
    let got = hash_access_code(supplied);
    if got.len() != expected_hash.len() {
        return false;
    }
    got.bytes()
        .zip(expected_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub username: String,
    /// Event name this operator is routed to after login.
    pub event: Option<String>,
}

struct UserEntry {
    password_hash: String,
    event: Option<String>,
}

/// Operator accounts read from a `username,password[,event]` sheet export.
#[derive(Default)]
pub struct UserDirectory {
    users: HashMap<String, UserEntry>,
}

impl UserDirectory {
    pub fn from_path(path: &Path) -> Result<Self, csv::Error> {
        let rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        Self::from_csv(rdr)
    }

    pub fn from_reader(r: impl std::io::Read) -> Result<Self, csv::Error> {
        let rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(r);
        Self::from_csv(rdr)
    }

    fn from_csv<R: std::io::Read>(mut rdr: csv::Reader<R>) -> Result<Self, csv::Error> {
        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        let col = |name: &str| headers.iter().position(|h| h == name);
        let (Some(user_col), Some(pass_col)) = (col("username"), col("password")) else {
            return Ok(Self::default());
        };
        let event_col = col("event");

        let mut users = HashMap::new();
        for row in rdr.records() {
            let row = row?;
            let username = row.get(user_col).unwrap_or("").trim().to_lowercase();
            let password = row.get(pass_col).unwrap_or("").trim();
            if username.is_empty() || password.is_empty() {
                continue;
            }
            let event = event_col
                .and_then(|c| row.get(c))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            users.insert(
                username,
                UserEntry {
                    password_hash: hash_access_code(password),
                    event,
                },
            );
        }
        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn check(&self, username: &str, password: &str) -> Option<Operator> {
        let key = username.trim().to_lowercase();
        let entry = self.users.get(&key)?;
        if !check_credentials(&entry.password_hash, password) {
            return None;
        }
        Some(Operator {
            username: key,
            event: entry.event.clone(),
        })
    }
}
