//! SKILL.md frontmatter parsing
//!
//! A skill file is a markdown document with a YAML frontmatter block listing
//! the MCP servers the skill uses:
//!
//! ```text
//! ---
//! name: my-skill
//! description: Does things
//! mcp-servers:
//!   - name: sqlite
//!     command: mcp-server-sqlite
//!     args: ["--db", "data.sqlite"]
//!     env:
//!       API_TOKEN: "${API_TOKEN}"
//! ---
//! ...markdown body (ignored)...
//! ```

use std::collections::HashMap;

use serde::Deserialize;

use crate::common::{Error, Result};

/// One MCP server entry from the skill frontmatter
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Unique server name, used as the pool key
    pub name: String,
    /// Command to spawn
    pub command: String,
    /// Arguments to pass to the command
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides; values may contain `${VAR}` placeholders
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Parsed skill configuration
#[derive(Debug, Clone)]
pub struct SkillConfig {
    pub name: String,
    pub description: String,
    pub servers: Vec<ServerConfig>,
}

/// Raw frontmatter shape before validation
#[derive(Debug, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
    #[serde(rename = "mcp-servers", default)]
    mcp_servers: Vec<RawServer>,
}

#[derive(Debug, Deserialize)]
struct RawServer {
    name: Option<String>,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Parse SKILL.md content and extract the skill configuration
pub fn parse_skill_md(content: &str) -> Result<SkillConfig> {
    let yaml = extract_frontmatter(content)?;

    let frontmatter: Frontmatter = serde_yaml::from_str(yaml)
        .map_err(|e| Error::SkillParse(format!("invalid frontmatter: {}", e)))?;

    let name = frontmatter
        .name
        .ok_or_else(|| Error::SkillParse("missing \"name\" field in frontmatter".to_string()))?;
    let description = frontmatter.description.ok_or_else(|| {
        Error::SkillParse("missing \"description\" field in frontmatter".to_string())
    })?;

    let mut servers = Vec::with_capacity(frontmatter.mcp_servers.len());
    for raw in frontmatter.mcp_servers {
        let server_name = raw
            .name
            .ok_or_else(|| Error::SkillParse("each mcp-server needs a \"name\" field".to_string()))?;
        let command = raw.command.ok_or_else(|| {
            Error::SkillParse(format!(
                "mcp-server \"{}\" needs a \"command\" field",
                server_name
            ))
        })?;
        servers.push(ServerConfig {
            name: server_name,
            command,
            args: raw.args,
            env: raw.env,
        });
    }

    Ok(SkillConfig {
        name,
        description,
        servers,
    })
}

/// Pull the YAML document out of the `---` fences at the top of the file
fn extract_frontmatter(content: &str) -> Result<&str> {
    let rest = content
        .strip_prefix("---")
        .ok_or_else(|| Error::SkillParse("missing frontmatter block".to_string()))?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))
        .ok_or_else(|| Error::SkillParse("missing frontmatter block".to_string()))?;

    for fence in ["\n---\n", "\n---\r\n", "\r\n---\r\n", "\r\n---\n"] {
        if let Some(end) = rest.find(fence) {
            return Ok(&rest[..end]);
        }
    }
    // Frontmatter may also end at a closing fence on the last line
    if let Some(stripped) = rest.strip_suffix("---").or_else(|| rest.strip_suffix("---\n")) {
        return Ok(stripped);
    }

    Err(Error::SkillParse("unterminated frontmatter block".to_string()))
}
