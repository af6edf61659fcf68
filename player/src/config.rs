use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::bus::SignalBus;
use crate::event::AppEvent;
use crate::paths;

pub const DEFAULT_VOLUME: u32 = 30;
pub const DEFAULT_PLAY_SPEED: f32 = 1.0;
pub const DEFAULT_THEME_COLOR: Color = Color { r: 0x00, g: 0x9f, b: 0xaa };

/// Inclusive bounds a numeric setting is clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Range<T> {
    /// Clamps `value` into the range. Values that compare with nothing
    /// (NaN) become `min`.
    pub fn correct(&self, value: T) -> T {
        if !(value >= self.min) {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}

pub const VOLUME_RANGE: Range<u32> = Range { min: 0, max: 100 };
pub const PLAY_SPEED_RANGE: Range<f32> = Range { min: 0.5, max: 2.0 };

#[derive(Debug, Error, PartialEq)]
#[error("Unknown option '{0}'")]
pub struct UnknownOption(pub String);

/// Declares a settings enum stored as a fixed set of strings. Unknown strings
/// in the file fall back to the default variant instead of failing the load.
macro_rules! options_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
        default $default:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Accepted spellings, for messages: `a, b, c`.
            pub fn expected() -> String {
                Self::ALL.iter().map(|option| option.as_str()).collect::<Vec<_>>().join(", ")
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl FromStr for $name {
            type Err = UnknownOption;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownOption(other.to_string())),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Ok(raw.parse().unwrap_or_else(|e| {
                    log::warn!(
                        "[config] {e} for {} (expected one of {}); using '{}'",
                        stringify!($name),
                        $name::expected(),
                        $name::$default.as_str()
                    );
                    $name::$default
                }))
            }
        }
    };
}

options_enum! {
    /// Order in which the playlist advances.
    PlayMode {
        Sequential => "sequential",
        ListLoop => "list-loop",
        SingleLoop => "single-loop",
        Random => "random",
    }
    default Sequential
}

options_enum! {
    Theme {
        Light => "Light",
        Dark => "Dark",
        Auto => "Auto",
    }
    default Light
}

options_enum! {
    /// Interface language. `Auto` follows the system locale.
    Language {
        ChineseSimplified => "zh",
        ChineseTraditional => "hk",
        English => "en",
        Auto => "Auto",
    }
    default Auto
}

/// 24-bit RGB color, stored as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = UnknownOption;

    /// Accepts `#rrggbb` and `#rgb`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || UnknownOption(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
        match hex.len() {
            6 => Ok(Color {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
            }),
            3 => Ok(Color {
                r: channel(&hex[0..1])? * 0x11,
                g: channel(&hex[1..2])? * 0x11,
                b: channel(&hex[2..3])? * 0x11,
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Older files store colors as `[r, g, b]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawColor {
    Hex(String),
    Rgb([u8; 3]),
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match RawColor::deserialize(deserializer)? {
            RawColor::Rgb([r, g, b]) => Color { r, g, b },
            RawColor::Hex(hex) => hex.parse().unwrap_or_else(|e| {
                log::warn!("[config] {e} for theme color; using {DEFAULT_THEME_COLOR}");
                DEFAULT_THEME_COLOR
            }),
        })
    }
}

/// Interface scale: `Auto` or one of the fixed factors in [`DpiScale::FACTORS`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DpiScale {
    #[default]
    Auto,
    Factor(f32),
}

impl DpiScale {
    pub const FACTORS: [f32; 5] = [1.0, 1.25, 1.5, 1.75, 2.0];

    /// Unsupported factors become `Auto`.
    pub fn correct(self) -> Self {
        match self {
            DpiScale::Factor(f) if Self::FACTORS.contains(&f) => self,
            DpiScale::Factor(f) => {
                log::warn!("[config] Unsupported dpi scale {f}; using Auto");
                DpiScale::Auto
            }
            DpiScale::Auto => DpiScale::Auto,
        }
    }
}

impl Serialize for DpiScale {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DpiScale::Auto => serializer.serialize_str("Auto"),
            DpiScale::Factor(f) => serializer.serialize_f32(*f),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDpiScale {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for DpiScale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match RawDpiScale::deserialize(deserializer)? {
            RawDpiScale::Number(n) => DpiScale::Factor(n as f32).correct(),
            RawDpiScale::Text(text) if text == "Auto" => DpiScale::Auto,
            RawDpiScale::Text(text) => match text.parse::<f32>() {
                Ok(n) => DpiScale::Factor(n).correct(),
                Err(_) => {
                    log::warn!("[config] Unknown dpi scale '{text}'; using Auto");
                    DpiScale::Auto
                }
            },
        })
    }
}

/// Root configuration structure. Deserialized from `<app_data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub folders: FolderConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub appearance: AppearanceConfig,
}

/// Library locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderConfig {
    /// Folders scanned for music. Entries that do not exist are dropped.
    #[serde(default = "default_music_folders")]
    pub music_folders: Vec<PathBuf>,
    /// Where downloaded songs go. Created if missing.
    #[serde(default = "paths::download_dir")]
    pub download_folder: PathBuf,
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            music_folders: default_music_folders(),
            download_folder: paths::download_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Clamped to [0, 100].
    #[serde(default = "default_volume")]
    pub volume: u32,
    #[serde(default)]
    pub play_mode: PlayMode,
    /// Playback rate multiplier. Clamped to [0.5, 2.0].
    #[serde(default = "default_play_speed")]
    pub play_speed: f32,
    #[serde(default = "default_true")]
    pub minimize_to_tray: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            play_mode: PlayMode::default(),
            play_speed: DEFAULT_PLAY_SPEED,
            minimize_to_tray: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppearanceConfig {
    #[serde(default)]
    pub theme: Theme,
    /// Takes effect after a restart.
    #[serde(default)]
    pub language: Language,
    #[serde(default = "default_theme_color")]
    pub theme_color: Color,
    /// Takes effect after a restart.
    #[serde(default)]
    pub dpi_scale: DpiScale,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            language: Language::default(),
            theme_color: DEFAULT_THEME_COLOR,
            dpi_scale: DpiScale::default(),
        }
    }
}

impl Config {
    /// Brings every value back into its valid domain: numbers are clamped,
    /// missing music folders are dropped, the download folder is created and
    /// all folders are made absolute.
    pub fn correct(mut self) -> Self {
        self.player.volume = VOLUME_RANGE.correct(self.player.volume);
        self.player.play_speed = PLAY_SPEED_RANGE.correct(self.player.play_speed);
        self.appearance.dpi_scale = self.appearance.dpi_scale.correct();

        self.folders.music_folders = self
            .folders
            .music_folders
            .into_iter()
            .filter(|folder| folder.is_dir())
            .map(|folder| absolute(&folder))
            .collect();

        if let Err(e) = std::fs::create_dir_all(&self.folders.download_folder) {
            log::warn!(
                "[config] Failed to create download folder {}: {e}",
                self.folders.download_folder.display()
            );
        }
        self.folders.download_folder = absolute(&self.folders.download_folder);
        self
    }
}

/// Returns true if switching from `old` to `new` only takes effect after a restart.
pub fn restart_required(old: &Config, new: &Config) -> bool {
    old.appearance.language != new.appearance.language
        || old.appearance.dpi_scale != new.appearance.dpi_scale
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config.correct())
}

/// Writes `config` to `path` as TOML, creating the parent directory if needed.
pub fn save(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

/// Watches the parent directory of `path`. Whenever the config file is
/// created or modified, reloads it and publishes `ConfigReloaded` on `bus`.
///
/// Returns once the bus is closed; watcher setup failures are returned as errors.
pub async fn watch_config(path: PathBuf, bus: SignalBus) -> Result<()> {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    )
    .context("Failed to create config file watcher")?;

    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let watch_dir = path
        .parent()
        .map(Path::to_path_buf)
        .context("Config path has no parent directory")?;
    std::fs::create_dir_all(&watch_dir)
        .with_context(|| format!("Failed to create config directory: {}", watch_dir.display()))?;
    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch config directory: {}", watch_dir.display()))?;

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if !bus.publish(AppEvent::ConfigReloaded(config)).await {
                        break;
                    }
                }
                Err(e) => log::warn!("[config] Failed to reload config: {e:#}"),
            }
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn default_music_folders() -> Vec<PathBuf> {
    paths::music_dir().into_iter().collect()
}

fn default_volume() -> u32 {
    DEFAULT_VOLUME
}

fn default_play_speed() -> f32 {
    DEFAULT_PLAY_SPEED
}

fn default_true() -> bool {
    true
}

fn default_theme_color() -> Color {
    DEFAULT_THEME_COLOR
}
