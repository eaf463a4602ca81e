use std::path::Path;

use tracing::info;

use crate::error::LoadError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Reads `username password` pairs, one per line. Blank lines and lines
/// starting with `#` are skipped.
pub fn load(path: &Path) -> Result<Vec<Credentials>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::CredentialsRead {
        path: path.to_path_buf(),
        source,
    })?;

    let credentials = parse(&content, path)?;
    info!("Loaded {} test users from {:?}", credentials.len(), path);
    Ok(credentials)
}

fn parse(content: &str, path: &Path) -> Result<Vec<Credentials>, LoadError> {
    let mut credentials = Vec::new();

    for (index, line) in content.lines().enumerate() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let (username, password) = line.split_once(' ').ok_or_else(|| {
            LoadError::MalformedCredentials {
                path: path.to_path_buf(),
                line: index + 1,
            }
        })?;

        credentials.push(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
    }

    if credentials.is_empty() {
        return Err(LoadError::NoCredentials(path.to_path_buf()));
    }

    Ok(credentials)
}

/// Hands out credentials round-robin, one per simulated user.
pub fn assign(credentials: &[Credentials], users: usize) -> Vec<&Credentials> {
    credentials.iter().cycle().take(users).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_skips_comments() {
        let file = write_file("# test accounts\nalice p1\n\nbob secret phrase\n");
        let credentials = load(file.path()).unwrap();

        assert_eq!(credentials.len(), 2);
        assert_eq!(credentials[0].username, "alice");
        assert_eq!(credentials[0].password, "p1");
        // Everything after the first space belongs to the password.
        assert_eq!(credentials[1].password, "secret phrase");
    }

    #[test]
    fn test_assign_cycles_when_short() {
        let file = write_file("alice p1\nbob p2");
        let credentials = load(file.path()).unwrap();

        let assigned = assign(&credentials, 3);
        assert_eq!(assigned.len(), 3);
        assert_eq!(assigned[0].username, "alice");
        assert_eq!(assigned[1].username, "bob");
        assert_eq!(assigned[2], &credentials[0]);
        assert_eq!(assigned[2].password, "p1");
    }

    #[test]
    fn test_missing_password_is_rejected() {
        let file = write_file("alice p1\nbob\n");
        let err = load(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::MalformedCredentials { line: 2, .. }));
    }

    #[test]
    fn test_comment_only_file_is_rejected() {
        let file = write_file("# nobody here\n");
        assert!(matches!(
            load(file.path()).unwrap_err(),
            LoadError::NoCredentials(_)
        ));
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("users.txt")).unwrap_err();
        assert!(matches!(err, LoadError::CredentialsRead { .. }));
    }
}
