//! Environment variable substitution for skill configuration values
//!
//! Supports `${VAR}` syntax. A referenced variable that is not set in the
//! process environment is an error, so misconfigured secrets fail loudly at
//! spawn time instead of being passed through empty.

use std::collections::HashMap;

use crate::common::{Error, Result};

/// Substitute `${VAR}` references in a string against the process environment
pub fn substitute(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| Error::SkillParse(format!("unterminated ${{...}} in '{}'", value)))?;
        let name = &after[..end];
        let resolved =
            std::env::var(name).map_err(|_| Error::EnvVarNotSet(name.to_string()))?;
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Substitute `${VAR}` references in all values of a map
pub fn substitute_map(map: &HashMap<String, String>) -> Result<HashMap<String, String>> {
    let mut result = HashMap::with_capacity(map.len());
    for (key, value) in map {
        result.insert(key.clone(), substitute(value)?);
    }
    Ok(result)
}
