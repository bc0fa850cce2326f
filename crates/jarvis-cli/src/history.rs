//! Loading prior conversation turns from disk.

use jarvis_llm::Turn;
use std::fs;
use std::path::Path;

/// Read a JSON array of turns.
pub(crate) fn load(path: &Path) -> miette::Result<Vec<Turn>> {
    let content = fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read history {}: {}", path.display(), e))?;

    serde_json::from_str(&content)
        .map_err(|e| miette::miette!("Invalid history file {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_llm::Role;
    use tempfile::tempdir;

    #[test]
    fn test_load_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(
            &path,
            r#"[{"role":"user","text":"hi"},{"role":"assistant","text":"hello"}]"#,
        )
        .unwrap();

        let turns = load(&path).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].text, "hello");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, r#"[{"role":"system","text":"be nice"}]"#).unwrap();

        assert!(load(&path).is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(load(&dir.path().join("nope.json")).is_err());
    }
}
