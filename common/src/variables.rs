use crate::job::GlobalVariable;
use anyhow::{anyhow, Result};

/// Parses a `KEY=VALUE` assignment. The split happens at the first `=`, so values
/// may themselves contain `=`.
pub fn parse_variable(s: &str) -> Result<GlobalVariable> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid variable '{}'. Use KEY=VALUE", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Variable name missing in '{}'", s));
    }
    let var = GlobalVariable::new(key, value);
    if var.is_bare_prefix() && !var.is_placeholder() {
        return Err(anyhow!("Variable name missing after '{}' in '{}'", key, s));
    }
    Ok(var)
}

/// Parses every assignment in order, dropping empty placeholders like `$G_=`.
pub fn parse_variables<I, S>(items: I) -> Result<Vec<GlobalVariable>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut vars = Vec::new();
    for item in items {
        let var = parse_variable(item.as_ref())?;
        if !var.is_placeholder() {
            vars.push(var);
        }
    }
    Ok(vars)
}
