use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_yaml::Value;

/// Body of the first ```` ```yaml ```` block in a model response. A block
/// the model forgot to close runs to the end of the response.
pub(crate) fn yaml_block(response: &str) -> Result<&str> {
    let re = Regex::new(r"(?s)```ya?ml[^\n]*\n(.*?)(?:```|\z)").context("yaml fence re")?;
    let body = re
        .captures(response)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| anyhow!("response contains no ```yaml block"))?;
    Ok(body.as_str().trim())
}

pub(crate) fn parse_yaml<T: DeserializeOwned>(response: &str) -> Result<T> {
    let block = yaml_block(response)?;
    serde_yaml::from_str(block).with_context(|| format!("malformed YAML in response:\n{block}"))
}

/// Reads an index written either as a bare integer or as `"3 # Name"`.
pub(crate) fn parse_index(value: &Value) -> Result<usize> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| anyhow!("index {n} is not a non-negative integer")),
        Value::String(s) => {
            let head = s.split('#').next().unwrap_or_default().trim();
            head.parse::<usize>()
                .with_context(|| format!("cannot parse index from '{s}'"))
        }
        other => bail!("cannot parse index from {other:?}"),
    }
}

/// [`parse_index`] plus a `< len` bound check.
pub(crate) fn parse_bounded_index(value: &Value, len: usize, what: &str) -> Result<usize> {
    let index = parse_index(value)?;
    if index >= len {
        bail!(
            "{what} index {index} is out of range (max {})",
            len.saturating_sub(1)
        );
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_block_extraction() {
        let response = "Sure!\n```yaml\n- 1 # Flow\n- 0 # Node\n```\nDone.";
        assert_eq!(yaml_block(response).unwrap(), "- 1 # Flow\n- 0 # Node");
    }

    #[test]
    fn test_unclosed_block_runs_to_end() {
        let response = "```yaml\ncontent: |\n  text\n";
        assert_eq!(yaml_block(response).unwrap(), "content: |\n  text");
    }

    #[test]
    fn test_missing_block() {
        assert!(yaml_block("no fences here").is_err());
    }

    #[test]
    fn test_index_forms() {
        let values: Vec<Value> = serde_yaml::from_str("[3, '4 # Flow', ' 5 ', -1, x]").unwrap();
        assert_eq!(parse_index(&values[0]).unwrap(), 3);
        assert_eq!(parse_index(&values[1]).unwrap(), 4);
        assert_eq!(parse_index(&values[2]).unwrap(), 5);
        assert!(parse_index(&values[3]).is_err());
        assert!(parse_index(&values[4]).is_err());
    }

    #[test]
    fn test_comment_after_index_is_yaml_comment() {
        let values: Vec<Value> = parse_yaml("```yaml\n- 0 # src/lib.rs\n- 2 # src/flow.rs\n```").unwrap();
        assert_eq!(parse_bounded_index(&values[1], 3, "file").unwrap(), 2);
        assert!(parse_bounded_index(&values[1], 2, "file").is_err());
    }
}
