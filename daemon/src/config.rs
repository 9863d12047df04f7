use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::MediaError;

pub const DEFAULT_MAX_LENGTH: usize = 43;
pub const DEFAULT_FORMAT: &str = "{icon} {artist} - {title}";
pub const DEFAULT_PAUSED_PREFIX: &str = "󰏤 ";
pub const DEFAULT_LOW_THRESHOLD: u32 = 30;
pub const DEFAULT_MEDIUM_THRESHOLD: u32 = 70;
/// Icon key that is only ever used as the fallback glyph, never as a pattern.
pub const DEFAULT_ICON_KEY: &str = "default";
/// Priority key that matches every source identity.
pub const WILDCARD_PRIORITY: &str = "default";

/// Root configuration, stored as JSON in the waybar config directory.
///
/// User files are merged over the compiled-in defaults one top-level key at a
/// time: a section present in the user file replaces the whole default section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub icons: IconMap,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub click_actions: ClickActions,
    #[serde(default)]
    pub prioritization: Prioritization,
}

/// A user `display` section replaces the default one, so optional fields the
/// user leaves out are off or empty rather than the compiled-in values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Maximum rendered length in characters, ellipsis included.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub show_volume: bool,
    /// Appends ` [identity]` to the rendered text.
    #[serde(default)]
    pub show_player_name: bool,
    #[serde(default)]
    pub paused_prefix: String,
    /// Template with `{icon}`, `{artist}`, `{title}` and `{player}` placeholders.
    pub format: String,
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            show_volume: true,
            show_player_name: false,
            paused_prefix: DEFAULT_PAUSED_PREFIX.to_string(),
            format: DEFAULT_FORMAT.to_string(),
        }
    }
}

/// Ordered substring → glyph mapping.
///
/// Order follows the JSON document so the first matching key wins. The
/// `default` entry is mandatory.
#[derive(Debug, Clone, PartialEq)]
pub struct IconMap {
    entries: Vec<(String, String)>,
    fallback: String,
}

impl IconMap {
    /// Builds a mapping from ordered pairs. Returns `None` when no `default`
    /// entry is present.
    pub fn from_pairs<I, K, V>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let fallback = entries
            .iter()
            .find(|(k, _)| k == DEFAULT_ICON_KEY)
            .map(|(_, v)| v.clone())?;
        Some(Self { entries, fallback })
    }

    /// Returns the glyph of the first key contained (case-insensitively) in
    /// `identity`, or the default glyph.
    pub fn icon_for(&self, identity: &str) -> &str {
        let identity = identity.to_lowercase();
        self.entries
            .iter()
            .filter(|(key, _)| key != DEFAULT_ICON_KEY)
            .find(|(key, _)| identity.contains(&key.to_lowercase()))
            .map(|(_, glyph)| glyph.as_str())
            .unwrap_or(self.fallback())
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }
}

impl Default for IconMap {
    fn default() -> Self {
        Self {
            entries: [
                ("spotify", " "),
                ("vivaldi", " "),
                ("chromium", " "),
                ("firefox", " "),
                ("brave", " "),
                ("edge", "󰇩 "),
                ("safari", "裏 "),
                (DEFAULT_ICON_KEY, " "),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            fallback: " ".to_string(),
        }
    }
}

impl Serialize for IconMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, glyph) in &self.entries {
            map.serialize_entry(key, glyph)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IconMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IconMapVisitor;

        impl<'de> Visitor<'de> for IconMapVisitor {
            type Value = IconMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping player name substrings to icons")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<IconMap, A::Error> {
                let mut pairs: Vec<(String, String)> = Vec::new();
                while let Some((key, glyph)) = access.next_entry::<String, String>()? {
                    pairs.push((key, glyph));
                }
                IconMap::from_pairs(pairs).ok_or_else(|| {
                    serde::de::Error::custom("icons must contain a \"default\" entry")
                })
            }
        }

        deserializer.deserialize_map(IconMapVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub enabled: bool,
    #[serde(default)]
    pub show_percentage: bool,
    /// Percentages below this use the `low` glyph.
    pub low_threshold: u32,
    /// Percentages below this (and at or above `low_threshold`) use `medium`.
    pub medium_threshold: u32,
    pub icons: VolumeIcons,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_percentage: true,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            medium_threshold: DEFAULT_MEDIUM_THRESHOLD,
            icons: VolumeIcons::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeIcons {
    pub muted: String,
    pub low: String,
    pub medium: String,
    pub high: String,
}

impl Default for VolumeIcons {
    fn default() -> Self {
        Self {
            muted: "󰝟 ".to_string(),
            low: "󰖀 ".to_string(),
            medium: "󰕾 ".to_string(),
            high: "󰕾 ".to_string(),
        }
    }
}

impl VolumeConfig {
    /// Picks the glyph for a volume percentage.
    pub fn icon_for(&self, percent: i64) -> &str {
        if percent <= 0 {
            &self.icons.muted
        } else if percent < i64::from(self.low_threshold) {
            &self.icons.low
        } else if percent < i64::from(self.medium_threshold) {
            &self.icons.medium
        } else {
            &self.icons.high
        }
    }
}

/// Bar click bindings. The bar itself invokes the binary with these action
/// names; the daemon only stores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickActions {
    #[serde(default)]
    pub left_click: String,
    #[serde(default)]
    pub right_click: String,
    #[serde(default)]
    pub scroll_up: String,
    #[serde(default)]
    pub scroll_down: String,
}

impl Default for ClickActions {
    fn default() -> Self {
        Self {
            left_click: "play_pause".to_string(),
            right_click: "show_menu".to_string(),
            scroll_up: "next".to_string(),
            scroll_down: "previous".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prioritization {
    /// Any `Playing` source beats every priority tier.
    pub prefer_playing: bool,
    /// Case-insensitive identity substrings, highest priority first.
    pub priority_order: Vec<String>,
}

impl Default for Prioritization {
    fn default() -> Self {
        Self {
            prefer_playing: true,
            priority_order: ["spotify", "firefox", "chromium", "vivaldi", "brave", WILDCARD_PRIORITY]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Loads the config at `path`, merging it over the defaults.
///
/// When the file does not exist the defaults are written to `path` (creating
/// the parent directory) and returned. A file that exists but cannot be read
/// or parsed is an error; the caller decides whether to fall back.
pub fn load_or_create(path: &Path) -> Result<Config, MediaError> {
    let config_error = |message: String| MediaError::Config {
        path: path.to_path_buf(),
        message,
    };

    if !path.exists() {
        let defaults = Config::default();
        persist(path, &defaults)?;
        tracing::info!("Created default configuration file at {}", path.display());
        return Ok(defaults);
    }

    let content = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
    let user: Value = serde_json::from_str(&content).map_err(|e| config_error(e.to_string()))?;
    let Value::Object(user) = user else {
        return Err(config_error("top-level value must be an object".to_string()));
    };
    let config = merge_over_defaults(user).map_err(|e| config_error(e.to_string()))?;
    tracing::info!("Configuration loaded from {}", path.display());
    Ok(config)
}

/// Writes `config` as indented JSON, creating the parent directory if needed.
pub fn persist(path: &Path, config: &Config) -> Result<(), MediaError> {
    let config_error = |message: String| MediaError::Config {
        path: path.to_path_buf(),
        message,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| config_error(e.to_string()))?;
    }
    let content =
        serde_json::to_string_pretty(config).map_err(|e| config_error(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| config_error(e.to_string()))
}

/// Replaces each default top-level section with the user's, wholesale.
fn merge_over_defaults(user: Map<String, Value>) -> Result<Config, serde_json::Error> {
    let mut merged = match serde_json::to_value(Config::default())? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (section, value) in user {
        merged.insert(section, value);
    }
    serde_json::from_value(Value::Object(merged))
}
