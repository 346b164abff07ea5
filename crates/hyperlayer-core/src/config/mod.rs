// Hyperlayer Config API
// TOML profile definitions and key string parsing

pub mod key_parser;
pub mod parser;

pub use key_parser::{parse_key_string, KeyParseError, ParsedKey};
pub use parser::{default_path, load_profile, parse_profile, ConfigError, ProfileToml};
