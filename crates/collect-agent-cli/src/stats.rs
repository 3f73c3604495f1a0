//! Parsing of statistics and stored files given on the command line.

use anyhow::{Context, Result, bail};
use collect_agent_core::{StatValue, Statistics};

/// Parse `NAME=VALUE` arguments into statistics.
///
/// A value that reads as JSON keeps its JSON type (`rtt=12.5` is a float,
/// `ok=true` a boolean); anything else is sent as a string.
pub fn parse_statistics(pairs: &[String]) -> Result<Statistics> {
    let mut statistics = Statistics::new();
    for pair in pairs {
        let (name, raw) = split_pair(pair)?;
        statistics.insert(name, parse_value(raw)?);
    }
    Ok(statistics)
}

/// Parse `NAME=PATH` arguments naming files to store.
pub fn parse_files(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            let (name, path) = split_pair(pair)?;
            if path.is_empty() {
                bail!("Missing path for stored file {name:?}");
            }
            Ok((name.to_string(), path.to_string()))
        })
        .collect()
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    let (name, value) = pair
        .split_once('=')
        .with_context(|| format!("Expected NAME=VALUE, got {pair:?}"))?;
    if name.is_empty() {
        bail!("Missing name in {pair:?}");
    }
    Ok((name, value))
}

fn parse_value(raw: &str) -> Result<StatValue> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => StatValue::try_from(value)
            .with_context(|| format!("Unsupported statistic value {raw:?}")),
        Err(_) => Ok(StatValue::from(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_values_keep_json_types() {
        let stats = parse_statistics(&args(&[
            "rtt=12.5",
            "loss=0",
            "up=true",
            "host=10.0.0.1",
            "flows=[1,2]",
        ]))
        .unwrap();

        assert_eq!(stats.get("rtt"), Some(&StatValue::Float(12.5)));
        assert_eq!(stats.get("loss"), Some(&StatValue::Int(0)));
        assert_eq!(stats.get("up"), Some(&StatValue::Bool(true)));
        assert_eq!(stats.get("host"), Some(&StatValue::from("10.0.0.1")));
        assert_eq!(
            stats.get("flows"),
            Some(&StatValue::Array(vec![StatValue::Int(1), StatValue::Int(2)]))
        );
    }

    #[test]
    fn test_value_may_contain_equals() {
        let stats = parse_statistics(&args(&["query=a=b"])).unwrap();
        assert_eq!(stats.get("query"), Some(&StatValue::from("a=b")));
    }

    #[test]
    fn test_pair_without_equals_is_rejected() {
        assert!(parse_statistics(&args(&["rtt"])).is_err());
        assert!(parse_statistics(&args(&["=3"])).is_err());
    }

    #[test]
    fn test_out_of_range_integer_is_rejected() {
        assert!(parse_statistics(&args(&["big=18446744073709551615"])).is_err());
    }

    #[test]
    fn test_parse_files() {
        let files = parse_files(&args(&["capture=/tmp/a.pcap", "log=C:\\logs\\job.log"])).unwrap();
        assert_eq!(
            files,
            vec![
                ("capture".to_string(), "/tmp/a.pcap".to_string()),
                ("log".to_string(), "C:\\logs\\job.log".to_string()),
            ]
        );
        assert!(parse_files(&args(&["capture="])).is_err());
    }
}
