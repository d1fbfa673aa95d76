//! Driver address strings.
//!
//! Devices are selected with comma-separated `key=value` pairs such as
//! `"type=b200,serial=31A4"`. An empty string selects the first device
//! the driver finds.

use cmdq_common::{CmdqError, CmdqResult};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Parsed device address arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceArgs {
    pairs: BTreeMap<String, String>,
}

impl DeviceArgs {
    /// No arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no arguments were given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    /// Value for `key` parsed as `T`; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`CmdqError::InvalidArgs`] when the value does not parse.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> CmdqResult<Option<T>> {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| CmdqError::InvalidArgs(format!("bad value for {key}: '{raw}'")))
            })
            .transpose()
    }

    /// Insert or replace a pair.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.insert(key.into(), value.into());
    }

    /// Iterate pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromStr for DeviceArgs {
    type Err = CmdqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut args = DeviceArgs::new();

        for token in s.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (token, ""),
            };
            if key.is_empty() {
                return Err(CmdqError::InvalidArgs(format!("missing key in '{token}'")));
            }
            args.insert(key, value);
        }

        Ok(args)
    }
}

impl fmt::Display for DeviceArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.pairs {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_args() {
        let args: DeviceArgs = "".parse().unwrap();
        assert!(args.is_empty());
        assert_eq!(args.to_string(), "");

        let args: DeviceArgs = " , ,".parse().unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn test_parse_pairs() {
        let args: DeviceArgs = "type=b200, serial = 31A4 ,master_clock_rate=32e6"
            .parse()
            .unwrap();
        assert_eq!(args.get("type"), Some("b200"));
        assert_eq!(args.get("serial"), Some("31A4"));
        assert_eq!(args.get_parsed::<f64>("master_clock_rate").unwrap(), Some(32e6));
        assert_eq!(args.get("addr"), None);
    }

    #[test]
    fn test_bare_key_and_duplicates() {
        let args: DeviceArgs = "skip_dram,addr=10.0.0.2,addr=10.0.0.3".parse().unwrap();
        assert_eq!(args.get("skip_dram"), Some(""));
        assert_eq!(args.get("addr"), Some("10.0.0.3"));
    }

    #[test]
    fn test_missing_key() {
        let err = "type=x200,=5".parse::<DeviceArgs>().unwrap_err();
        assert!(matches!(err, CmdqError::InvalidArgs(_)));
    }

    #[test]
    fn test_bad_parsed_value() {
        let args: DeviceArgs = "queue_depth=lots".parse().unwrap();
        assert!(args.get_parsed::<usize>("queue_depth").is_err());
        assert_eq!(args.get_parsed::<usize>("channels").unwrap(), None);
    }

    #[test]
    fn test_display_is_canonical() {
        let args: DeviceArgs = "serial=1, type=b200".parse().unwrap();
        let text = args.to_string();
        assert_eq!(text, "serial=1,type=b200");
        assert_eq!(text.parse::<DeviceArgs>().unwrap(), args);
    }
}
