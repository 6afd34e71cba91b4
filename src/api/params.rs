//! Typed access to the dynamically typed parameter map.
//!
//! Each helper produces either the coerced value or a classified error:
//! absence reports `parameter-missing`, a wrong wire type reports
//! `parameter-type`, and structured access-settings maps go through the
//! settings validator.

use std::collections::HashMap;
use std::time::Duration;

use lily_api_types::{AccessSettings, Clearance, SessionId};
use lily_protocol::Value;

use crate::LilyError;

pub struct Params(HashMap<String, Value>);

impl Params {
    pub fn new(map: HashMap<String, Value>) -> Self {
        Self(map)
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    fn required(&self, name: &str) -> Result<&Value, LilyError> {
        self.get(name)
            .ok_or_else(|| LilyError::MissingParameter(name.to_string()))
    }

    pub fn str(&self, name: &str) -> Result<&str, LilyError> {
        self.required(name)?
            .as_str()
            .ok_or_else(|| LilyError::ParameterType(name.to_string(), "string"))
    }

    pub fn opt_str(&self, name: &str) -> Result<Option<&str>, LilyError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| LilyError::ParameterType(name.to_string(), "string")),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, LilyError> {
        self.required(name)?
            .as_int()
            .ok_or_else(|| LilyError::ParameterType(name.to_string(), "int"))
    }

    pub fn opt_int(&self, name: &str, default: i64) -> Result<i64, LilyError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_int()
                .ok_or_else(|| LilyError::ParameterType(name.to_string(), "int")),
        }
    }

    pub fn opt_bool(&self, name: &str, default: bool) -> Result<bool, LilyError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| LilyError::ParameterType(name.to_string(), "bool")),
        }
    }

    pub fn duration(&self, name: &str) -> Result<Duration, LilyError> {
        self.required(name)?
            .as_duration()
            .ok_or_else(|| LilyError::ParameterType(name.to_string(), "duration"))
    }

    pub fn opt_duration(&self, name: &str) -> Result<Option<Duration>, LilyError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_duration()
                .map(Some)
                .ok_or_else(|| LilyError::ParameterType(name.to_string(), "duration")),
        }
    }

    pub fn str_list(&self, name: &str) -> Result<Vec<String>, LilyError> {
        let items = self
            .required(name)?
            .as_list()
            .ok_or_else(|| LilyError::ParameterType(name.to_string(), "list of strings"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| LilyError::ParameterType(name.to_string(), "list of strings"))
            })
            .collect()
    }

    pub fn int_list(&self, name: &str) -> Result<Vec<i64>, LilyError> {
        let items = self
            .required(name)?
            .as_list()
            .ok_or_else(|| LilyError::ParameterType(name.to_string(), "list of ints"))?;
        items
            .iter()
            .map(|item| {
                item.as_int()
                    .ok_or_else(|| LilyError::ParameterType(name.to_string(), "list of ints"))
            })
            .collect()
    }

    /// Optional numeric list, defaulting every entry to `default` when the
    /// parameter is absent.
    pub fn opt_int_list(
        &self,
        name: &str,
        len: usize,
        default: i64,
    ) -> Result<Vec<i64>, LilyError> {
        match self.get(name) {
            None => Ok(vec![default; len]),
            Some(_) => {
                let list = self.int_list(name)?;
                if list.len() != len {
                    return Err(LilyError::InvalidParameters(format!(
                        "'{}' must have one entry per path",
                        name
                    )));
                }
                Ok(list)
            }
        }
    }

    pub fn opt_bool_list(
        &self,
        name: &str,
        len: usize,
        default: bool,
    ) -> Result<Vec<bool>, LilyError> {
        match self.get(name) {
            None => Ok(vec![default; len]),
            Some(value) => {
                let items = value
                    .as_list()
                    .ok_or_else(|| LilyError::ParameterType(name.to_string(), "list of bools"))?;
                let list: Result<Vec<bool>, LilyError> = items
                    .iter()
                    .map(|item| {
                        item.as_bool().ok_or_else(|| {
                            LilyError::ParameterType(name.to_string(), "list of bools")
                        })
                    })
                    .collect();
                let list = list?;
                if list.len() != len {
                    return Err(LilyError::InvalidParameters(format!(
                        "'{}' must have one entry per path",
                        name
                    )));
                }
                Ok(list)
            }
        }
    }

    pub fn opt_settings(&self, name: &str) -> Result<Option<AccessSettings>, LilyError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => settings_from_value(value).map(Some),
        }
    }

    pub fn settings(&self, name: &str) -> Result<AccessSettings, LilyError> {
        settings_from_value(self.required(name)?)
    }

    pub fn opt_settings_list(
        &self,
        name: &str,
        len: usize,
    ) -> Result<Option<Vec<AccessSettings>>, LilyError> {
        let value = match self.get(name) {
            None => return Ok(None),
            Some(value) => value,
        };
        let items = value
            .as_list()
            .ok_or_else(|| LilyError::ParameterType(name.to_string(), "list of settings"))?;
        if items.len() != len {
            return Err(LilyError::InvalidParameters(format!(
                "'{}' must have one entry per path",
                name
            )));
        }
        items.iter().map(settings_from_value).collect::<Result<Vec<_>, _>>().map(Some)
    }

    pub fn session_ids(&self, name: &str) -> Result<Vec<SessionId>, LilyError> {
        self.str_list(name)?
            .iter()
            .map(|raw| {
                raw.parse().map_err(|_| {
                    LilyError::InvalidParameters(format!("malformed session id '{}'", raw))
                })
            })
            .collect()
    }
}

/// Convert a structured settings map into validated [`AccessSettings`].
/// Out-of-range clearance pairs and malformed lists report as invalid
/// access settings.
pub fn settings_from_value(value: &Value) -> Result<AccessSettings, LilyError> {
    let map = value
        .as_map()
        .ok_or_else(|| LilyError::InvalidAccessSettings("expected a map".to_string()))?;

    let clearance = |key: &str| -> Result<Clearance, LilyError> {
        let level = map
            .get(key)
            .and_then(Value::as_int)
            .ok_or_else(|| LilyError::InvalidAccessSettings(format!("missing '{}'", key)))?;
        Clearance::from_level(level)
            .map_err(|err| LilyError::InvalidAccessSettings(err.to_string()))
    };

    let mut settings = AccessSettings::new(clearance("access")?, clearance("modify")?)
        .map_err(|err| LilyError::InvalidAccessSettings(err.to_string()))?;

    let mut fill = |key: &str, apply: &mut dyn FnMut(&mut AccessSettings, &str)| -> Result<(), LilyError> {
        if let Some(value) = map.get(key) {
            let names = value
                .as_list()
                .ok_or_else(|| LilyError::InvalidAccessSettings(format!("'{}' must be a list", key)))?;
            for name in names {
                let name = name.as_str().ok_or_else(|| {
                    LilyError::InvalidAccessSettings(format!("'{}' must list strings", key))
                })?;
                apply(&mut settings, name);
            }
        }
        Ok(())
    };

    fill("accesswhitelist", &mut |s, n| s.add_whitelist(false, n))?;
    fill("modifywhitelist", &mut |s, n| s.add_whitelist(true, n))?;
    fill("accessblacklist", &mut |s, n| s.add_blacklist(false, n))?;
    fill("modifyblacklist", &mut |s, n| s.add_blacklist(true, n))?;

    Ok(settings)
}

/// Render settings as response data.
pub fn settings_to_value(settings: &AccessSettings) -> Value {
    let list = |names: &std::collections::BTreeSet<String>| {
        Value::List(names.iter().map(|n| Value::Str(n.clone())).collect())
    };

    let mut map = HashMap::new();
    map.insert(
        "access".to_string(),
        Value::Int(settings.access().level() as i64),
    );
    map.insert(
        "modify".to_string(),
        Value::Int(settings.modify().level() as i64),
    );
    map.insert(
        "accesswhitelist".to_string(),
        list(settings.whitelist(false)),
    );
    map.insert("modifywhitelist".to_string(), list(settings.whitelist(true)));
    map.insert(
        "accessblacklist".to_string(),
        list(settings.blacklist(false)),
    );
    map.insert("modifyblacklist".to_string(), list(settings.blacklist(true)));
    Value::Map(map)
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use lily_api_types::Clearance;
    use lily_protocol::Value;

    use super::{settings_from_value, settings_to_value, Params};
    use crate::LilyError;

    fn params(entries: &[(&str, Value)]) -> Params {
        Params::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_presence_and_type_errors() {
        let params = params(&[("drive", Value::Str("main".into()))]);

        assert_eq!(params.str("drive").unwrap(), "main");
        assert!(matches!(
            params.str("missing"),
            Err(LilyError::MissingParameter(_))
        ));
        assert!(matches!(
            params.int("drive"),
            Err(LilyError::ParameterType(..))
        ));
    }

    #[test]
    fn test_list_defaults() {
        let params = params(&[(
            "paths",
            Value::List(vec!["/a".into(), "/b".into()]),
        )]);

        let paths = params.str_list("paths").unwrap();
        assert_eq!(paths.len(), 2);

        assert_eq!(params.opt_int_list("start", 2, 0).unwrap(), vec![0, 0]);
        assert_eq!(
            params.opt_bool_list("clear", 2, false).unwrap(),
            vec![false, false]
        );
    }

    #[test]
    fn test_settings_validation() {
        let mut map = HashMap::new();
        map.insert("access".to_string(), Value::Int(1));
        map.insert("modify".to_string(), Value::Int(2));
        map.insert(
            "accesswhitelist".to_string(),
            Value::List(vec!["a".into()]),
        );
        let settings = settings_from_value(&Value::Map(map.clone())).unwrap();
        assert_eq!(settings.access(), Clearance::Level1);
        assert!(settings.whitelist(false).contains("a"));

        // round trip through response rendering
        let rendered = settings_to_value(&settings);
        let again = settings_from_value(&rendered).unwrap();
        assert_eq!(again, settings);

        // access > modify is an invalid settings map
        map.insert("access".to_string(), Value::Int(4));
        assert!(matches!(
            settings_from_value(&Value::Map(map.clone())),
            Err(LilyError::InvalidAccessSettings(_))
        ));

        map.insert("access".to_string(), Value::Int(9));
        assert!(matches!(
            settings_from_value(&Value::Map(map)),
            Err(LilyError::InvalidAccessSettings(_))
        ));
    }
}
