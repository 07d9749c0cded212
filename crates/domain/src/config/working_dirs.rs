use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// working_dirs[] — multi-directory mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingDir {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// `--working-dirs name=path` (repeatable) overrides the config file's
/// `working_dirs[]` for one invocation, collapsing to single-dir mode
/// when exactly one is given.
pub fn parse_cli_override(entries: &[String]) -> Result<Vec<WorkingDir>, String> {
    entries
        .iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(name, path)| WorkingDir {
                    name: name.to_string(),
                    path: path.to_string(),
                    description: None,
                })
                .ok_or_else(|| format!("invalid --working-dirs entry (expected name=path): {entry}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_entry() {
        let dirs = parse_cli_override(&["main=/srv/app".to_string()]).unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].name, "main");
        assert_eq!(dirs[0].path, "/srv/app");
    }

    #[test]
    fn rejects_entry_without_equals() {
        assert!(parse_cli_override(&["no-equals-here".to_string()]).is_err());
    }

    #[test]
    fn empty_entries_collapse_to_empty_vec() {
        let dirs = parse_cli_override(&[]).unwrap();
        assert!(dirs.is_empty());
    }
}
