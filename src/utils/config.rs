//! Configuration parameters struct parsing helper.

use crate::utils::RepliKvError;

use serde::de::DeserializeOwned;

/// Composes a configuration struct from its default values, then overwrites
/// fields present in the given TOML string if it is not `None`. Unknown field
/// names in the string are rejected (the config structs carry
/// `#[serde(default, deny_unknown_fields)]`).
///
/// Example:
/// ```ignore
/// let config: MyConfig = parsed_config(config_str)?;
/// ```
pub fn parsed_config<C>(config_str: Option<&str>) -> Result<C, RepliKvError>
where
    C: Default + DeserializeOwned,
{
    match config_str {
        None => Ok(C::default()),
        Some(s) => Ok(toml::from_str(s)?),
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(default, deny_unknown_fields)]
    struct TestConfig {
        abc: u16,
        hij: String,
        lmn: f64,
    }

    impl Default for TestConfig {
        fn default() -> Self {
            TestConfig {
                abc: 7,
                hij: "summer".into(),
                lmn: 6.18,
            }
        }
    }

    #[test]
    fn parse_from_none() -> Result<(), RepliKvError> {
        let config: TestConfig = parsed_config(None)?;
        assert_eq!(config, TestConfig::default());
        Ok(())
    }

    #[test]
    fn parse_from_partial() -> Result<(), RepliKvError> {
        let config: TestConfig = parsed_config(Some("hij = 'nice'"))?;
        let ref_config = TestConfig {
            abc: 7,
            hij: "nice".into(),
            lmn: 6.18,
        };
        assert_eq!(config, ref_config);
        Ok(())
    }

    #[test]
    fn parse_invalid_field() {
        assert!(parsed_config::<TestConfig>(Some("xyz = 999")).is_err());
    }

    #[test]
    fn parse_invalid_value() {
        assert!(parsed_config::<TestConfig>(Some("abc = 'not a number'")).is_err());
    }
}
