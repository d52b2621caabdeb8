//! Skill configuration discovery and loading
//!
//! Finds SKILL.md by walking up from the working directory, loads an
//! adjacent `.env` file into the process environment, and parses the
//! frontmatter.

use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

use super::parser::{parse_skill_md, SkillConfig};

/// A loaded skill configuration together with its resolved path
#[derive(Debug, Clone)]
pub struct LoadedSkill {
    pub config: SkillConfig,
    pub path: PathBuf,
}

/// Find SKILL.md by walking up the directory tree.
///
/// At each level, checks for `SKILL.md` directly, then for
/// `.claude/skills/*/SKILL.md`.
pub fn find_skill_md(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    loop {
        let direct = current.join("SKILL.md");
        if direct.is_file() {
            return Some(direct);
        }

        let skills_dir = current.join(".claude").join("skills");
        if let Ok(entries) = std::fs::read_dir(&skills_dir) {
            let mut candidates: Vec<PathBuf> = entries
                .flatten()
                .filter(|e| e.path().is_dir())
                .map(|e| e.path().join("SKILL.md"))
                .filter(|p| p.is_file())
                .collect();
            // Deterministic pick when several skills exist
            candidates.sort();
            if let Some(found) = candidates.into_iter().next() {
                return Some(found);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load and parse a skill configuration from a path, or by searching upward
/// from the current directory when no path is given.
pub fn load_skill(config_path: Option<&Path>) -> Result<LoadedSkill> {
    let skill_path = match config_path {
        Some(path) => {
            let path = path.to_path_buf();
            if !path.is_file() {
                return Err(Error::ConfigNotFound(path.display().to_string()));
            }
            path
        }
        None => {
            let cwd = std::env::current_dir()?;
            find_skill_md(&cwd).ok_or(Error::SkillNotFound)?
        }
    };

    // Load .env next to SKILL.md before parsing, so substitution sees it
    load_env_file(&skill_path);

    let content = std::fs::read_to_string(&skill_path).map_err(|e| Error::FileRead {
        path: skill_path.display().to_string(),
        error: e.to_string(),
    })?;
    let config = parse_skill_md(&content)?;

    Ok(LoadedSkill {
        config,
        path: skill_path,
    })
}

/// Load a `.env` file from the SKILL.md directory into the process
/// environment. Variables already set in the environment win.
fn load_env_file(skill_path: &Path) {
    let Some(dir) = skill_path.parent() else {
        return;
    };
    let env_path = dir.join(".env");
    let Ok(content) = std::fs::read_to_string(&env_path) else {
        return;
    };

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(eq) = trimmed.find('=') {
            let key = trimmed[..eq].trim();
            let value = trimmed[eq + 1..].trim();
            if !key.is_empty() && std::env::var_os(key).is_none() {
                std::env::set_var(key, value);
            }
        }
    }
}
