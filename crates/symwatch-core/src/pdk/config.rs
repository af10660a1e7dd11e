use std::{collections::HashMap, fmt::Display, str::FromStr};

use thiserror::Error;

/// Raw settings of a module, as flat `key = value` strings.
///
/// Lists are encoded as comma separated values. Values are parsed on access
/// with [`FromStr`], so every module decides the types of its own fields.
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    values: HashMap<String, String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{value} is not a valid value for field {field}: {err}")]
    InvalidValue {
        field: String,
        value: String,
        err: String,
    },
}

impl ModuleConfig {
    /// Parses `field` when present.
    pub fn optional<T>(&self, field: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.values
            .get(field)
            .map(|value| parse_value(field, value))
            .transpose()
    }

    /// Parses `field`, returning `default` when missing.
    pub fn with_default<T>(&self, field: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.optional(field).map(|value| value.unwrap_or(default))
    }

    /// Parses every item of a comma separated `field`.
    ///
    /// Items are trimmed and blank ones skipped. A missing field is an empty list.
    pub fn get_list<T>(&self, field: &str) -> Result<Vec<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(list) = self.values.get(field) else {
            return Ok(Vec::new());
        };
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| parse_value(field, item))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ModuleConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        }
    }
}

fn parse_value<T>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|err: T::Err| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        err: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_trimmed_and_skip_empty_items() {
        let config: ModuleConfig = [("watched_symbols", "open, close,,write ")]
            .into_iter()
            .collect();
        let list: Vec<String> = config.get_list("watched_symbols").unwrap();
        assert_eq!(list, vec!["open", "close", "write"]);
    }

    #[test]
    fn missing_list_is_empty() {
        let config = ModuleConfig::default();
        let list: Vec<String> = config.get_list("whitelist").unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn invalid_list_item() {
        let config: ModuleConfig = [("ports", "80,http")].into_iter().collect();
        assert_eq!(
            config.get_list::<u16>("ports"),
            Err(ConfigError::InvalidValue {
                field: "ports".to_string(),
                value: "http".to_string(),
                err: "invalid digit found in string".to_string(),
            })
        );
    }

    #[test]
    fn typed_values() {
        let config: ModuleConfig = [("capacity", "42"), ("broken", "forty")]
            .into_iter()
            .collect();
        assert_eq!(config.optional::<u64>("capacity"), Ok(Some(42)));
        assert_eq!(config.optional::<u64>("missing"), Ok(None));
        assert_eq!(config.with_default::<u64>("missing", 7), Ok(7));
        assert_eq!(config.with_default::<u64>("capacity", 7), Ok(42));
        assert!(matches!(
            config.with_default::<u64>("broken", 7),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
