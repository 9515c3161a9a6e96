// dbvault/src/utils/pgpass.rs
//! Lookup in a libpq password file (`hostname:port:database:username:password`).
//! The dump tools read the file themselves; this is only for the probe.
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgPassEntry {
    pub host: String,
    pub port: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl PgPassEntry {
    fn matches(&self, host: &str, port: u16, database: &str, user: &str) -> bool {
        let field = |pattern: &str, value: &str| pattern == "*" || pattern == value;
        field(&self.host, host)
            && field(&self.port, &port.to_string())
            && field(&self.database, database)
            && field(&self.user, user)
    }
}

/// Splits on unescaped `:`; `\:` and `\\` are literal.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.extend(chars.next()),
            ':' if fields.len() < 4 => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

pub fn parse_pgpass(contents: &str) -> Vec<PgPassEntry> {
    contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = split_fields(line).into_iter();
            Some(PgPassEntry {
                host: fields.next()?,
                port: fields.next()?,
                database: fields.next()?,
                user: fields.next()?,
                password: fields.next()?,
            })
        })
        .collect()
}

/// First matching password, as libpq picks it.
pub fn lookup_password(passfile: &Path, host: &str, port: u16, database: &str, user: &str) -> Option<String> {
    let contents = match fs::read_to_string(passfile) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("No usable password file at {}: {}", passfile.display(), e);
            return None;
        }
    };
    parse_pgpass(&contents)
        .into_iter()
        .find(|entry| entry.matches(host, port, database, user))
        .map(|entry| entry.password)
}
