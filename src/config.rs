//! Receiver configuration.
//!
//! [`Config`] is built once at start-up, either from a flat key-value map with
//! [`Config::from_pairs`] or with [`Config::new`] and direct field updates.
//! It is never modified by the receiver, so the same value can be cloned into
//! any number of independent [`Osnma`](crate::Osnma) instances.

use crate::tesla::KeyIndexScheme;
use std::collections::HashMap;
use std::path::PathBuf;

/// Default name of the Merkle tree file.
pub const DEFAULT_MERKLE_NAME: &str = "OSNMA_MerkleTree.xml";

/// Receiver configuration.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Config {
    /// Directory holding the key material files.
    pub exec_path: PathBuf,
    /// Merkle tree file name, relative to `exec_path`.
    pub merkle_name: String,
    /// Public key file name, relative to `exec_path`.
    pub pubk_name: Option<String>,
    /// Stored DSM-KROOT file name, relative to `exec_path`.
    pub kroot_name: Option<String>,
    /// Minimum time in seconds between the completion of a navigation data
    /// block and the GST of the key that authenticates it.
    pub tl: u32,
    /// Number of satellites.
    pub ns: usize,
    /// Number of authenticated tag bits needed to consider a data block
    /// authenticated.
    pub tag_length: u16,
    /// Extract the tags of MACK messages with missing pages.
    pub do_mack_partial: bool,
    /// Store the intermediate keys derived when verifying a TESLA key.
    pub do_tesla_key_regen: bool,
    /// Reuse data blocks linked by a previous tag with a larger COP.
    pub do_cop_link_optimization: bool,
    /// Use the words received on E5b-I as well as E1-B.
    pub do_dual_frequency: bool,
    /// Recover missing CED words with the Reed-Solomon parity words.
    pub do_reed_solomon: bool,
    /// Stop at the first authenticated fix.
    pub stop_at_faf: bool,
    /// Interpretation of the TESLA key index.
    pub key_index_scheme: KeyIndexScheme,
    /// A failed tag whose data is older than this number of subframes is
    /// reported as stale.
    pub stale_data_subframes: u32,
    /// Write newly verified key material to `exec_path`.
    pub write_key_material: bool,
}

impl Config {
    /// Creates a configuration with default values for every key except
    /// `exec_path`.
    pub fn new(exec_path: impl Into<PathBuf>) -> Config {
        Config {
            exec_path: exec_path.into(),
            merkle_name: DEFAULT_MERKLE_NAME.to_string(),
            pubk_name: None,
            kroot_name: None,
            tl: 30,
            ns: crate::types::NUM_SVNS,
            tag_length: 40,
            do_mack_partial: true,
            do_tesla_key_regen: true,
            do_cop_link_optimization: false,
            do_dual_frequency: false,
            do_reed_solomon: false,
            stop_at_faf: false,
            key_index_scheme: KeyIndexScheme::default(),
            stale_data_subframes: 1,
            write_key_material: true,
        }
    }

    /// Builds a configuration from key-value pairs.
    ///
    /// `exec_path` is mandatory. Recognized keys override the defaults of
    /// [`Config::new`] and unknown keys are ignored.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Config, ConfigError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().trim().to_string(), v.as_ref().trim().to_string()))
            .collect();
        let exec_path = map.get("exec_path").ok_or(ConfigError::MissingExecPath)?;
        let mut config = Config::new(exec_path);

        macro_rules! apply_override {
            ($field:ident, $parser:ident) => {
                if let Some(value) = map.get(stringify!($field)) {
                    config.$field = $parser(stringify!($field), value)?;
                }
            };
        }

        apply_override!(merkle_name, parse_string);
        apply_override!(tl, parse_value);
        apply_override!(ns, parse_value);
        apply_override!(tag_length, parse_value);
        apply_override!(do_mack_partial, parse_bool);
        apply_override!(do_tesla_key_regen, parse_bool);
        apply_override!(do_cop_link_optimization, parse_bool);
        apply_override!(do_dual_frequency, parse_bool);
        apply_override!(do_reed_solomon, parse_bool);
        apply_override!(stop_at_faf, parse_bool);
        apply_override!(key_index_scheme, parse_value);
        apply_override!(stale_data_subframes, parse_value);
        apply_override!(write_key_material, parse_bool);
        if let Some(name) = map.get("pubk_name") {
            config.pubk_name = Some(name.clone());
        }
        if let Some(name) = map.get("kroot_name") {
            config.kroot_name = Some(name.clone());
        }
        if config.ns == 0 || config.ns > crate::types::NUM_SVNS {
            return Err(ConfigError::InvalidValue {
                key: "ns",
                value: config.ns.to_string(),
            });
        }
        log::debug!("configuration: {config:?}");
        Ok(config)
    }

    /// Path of the Merkle tree file.
    pub fn merkle_path(&self) -> PathBuf {
        self.exec_path.join(&self.merkle_name)
    }

    /// Path of the public key file, if one is configured.
    pub fn pubk_path(&self) -> Option<PathBuf> {
        self.pubk_name.as_ref().map(|name| self.exec_path.join(name))
    }

    /// Path of the stored DSM-KROOT file, if one is configured.
    pub fn kroot_path(&self) -> Option<PathBuf> {
        self.kroot_name.as_ref().map(|name| self.exec_path.join(name))
    }
}

fn parse_string(_key: &'static str, value: &str) -> Result<String, ConfigError> {
    Ok(value.to_string())
}

fn parse_value<T: core::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Eq, PartialEq, Hash, thiserror::Error)]
pub enum ConfigError {
    /// The mandatory `exec_path` key is missing.
    #[error("missing mandatory key exec_path")]
    MissingExecPath,
    /// A recognized key has a value that cannot be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Key.
        key: &'static str,
        /// Value as given.
        value: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::from_pairs([("exec_path", "/tmp/osnma")]).unwrap();
        assert_eq!(config, Config::new("/tmp/osnma"));
        assert_eq!(config.tl, 30);
        assert_eq!(config.ns, 36);
        assert_eq!(config.tag_length, 40);
        assert!(config.do_mack_partial);
        assert!(!config.do_reed_solomon);
        assert_eq!(config.key_index_scheme, KeyIndexScheme::PerSubframe);
        assert_eq!(config.merkle_path(), PathBuf::from("/tmp/osnma/OSNMA_MerkleTree.xml"));
        assert_eq!(config.pubk_path(), None);
    }

    #[test]
    fn overrides() {
        let config = Config::from_pairs([
            ("exec_path", "keys"),
            ("tl", "60"),
            ("tag_length", " 80 "),
            ("do_cop_link_optimization", "True"),
            ("do_mack_partial", "0"),
            ("key_index_scheme", "mack_block"),
            ("pubk_name", "OSNMA_PublicKey_1.xml"),
            ("some_unknown_key", "whatever"),
        ])
        .unwrap();
        assert_eq!(config.tl, 60);
        assert_eq!(config.tag_length, 80);
        assert!(config.do_cop_link_optimization);
        assert!(!config.do_mack_partial);
        assert_eq!(config.key_index_scheme, KeyIndexScheme::PerMackBlock);
        assert_eq!(
            config.pubk_path(),
            Some(PathBuf::from("keys/OSNMA_PublicKey_1.xml"))
        );
    }

    #[test]
    fn errors() {
        assert_eq!(
            Config::from_pairs([("tl", "30")]),
            Err(ConfigError::MissingExecPath)
        );
        assert!(matches!(
            Config::from_pairs([("exec_path", "."), ("stop_at_faf", "maybe")]),
            Err(ConfigError::InvalidValue {
                key: "stop_at_faf",
                ..
            })
        ));
        assert!(matches!(
            Config::from_pairs([("exec_path", "."), ("ns", "40")]),
            Err(ConfigError::InvalidValue { key: "ns", .. })
        ));
    }
}
