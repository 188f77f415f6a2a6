use crate::error::ConfigError;
use crate::ini::{Document, Section};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const GENERAL_SECTION: &str = "general";
const LEGACY_GENERAL_SECTION: &str = "chrandr";

const PROFILE_KEYS: [&str; 4] = ["title", "ports", "icon", "commands"];
const GENERAL_KEYS: [&str; 8] = [
    "initial",
    "prefer",
    "status_file",
    "on_failure",
    "command_timeout",
    "shell",
    "query",
    "menu",
];

pub const EXAMPLE_CONFIG: &str = r#"# chrandr configuration
#
# Every section except [general] is a profile. A profile is offered only when
# all of its ports are connected (see `xrandr --query`).

[general]
# profile highlighted when nothing was applied before
initial = laptop
# what to do when a command fails: continue or abort
on_failure = continue
# dmenu-style launcher; leave unset to pick from the terminal
# menu = rofi -dmenu -p screens

[vga_laptop]
title = Laptop and VGA screen
ports = VGA-1, LVDS-1
commands:
    xrandr --output LVDS-1 --auto --output VGA-1 --auto --right-of LVDS-1

[laptop]
title = Laptop only
ports = LVDS-1
commands:
    xrandr --output VGA-1 --off --output LVDS-1 --auto
    amixer set Master unmute
"#;

/// What to do with the remaining command lines when one of them fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    #[default]
    Continue,
    Abort,
}

/// Tool used to find out which ports are connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryBackend {
    #[default]
    Xrandr,
    Hyprctl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: String,
    pub title: String,
    pub ports: Vec<String>,
    pub icon: Option<PathBuf>,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct General {
    pub initial: Option<String>,
    pub prefer: Option<String>,
    pub status_file: Option<PathBuf>,
    pub on_failure: FailurePolicy,
    pub command_timeout: Option<Duration>,
    pub shell: String,
    pub query: QueryBackend,
    pub menu: Option<String>,
}

impl Default for General {
    fn default() -> Self {
        Self {
            initial: None,
            prefer: None,
            status_file: None,
            on_failure: FailurePolicy::default(),
            command_timeout: None,
            shell: "/bin/sh".to_string(),
            query: QueryBackend::default(),
            menu: None,
        }
    }
}

/// Loaded once at startup and never modified afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub general: General,
    profiles: Vec<Profile>,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("chrandr/chrandr.conf"))
    }

    pub fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        path.map(PathBuf::from)
            .or_else(Self::default_path)
            .ok_or(ConfigError::NoConfigPath)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::resolve_path(path)?;
        debug!("Loading configuration from {:?}", path);

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.clone(),
            source,
        })?;

        let config = Self::parse(&content)?;
        info!(
            "Loaded {} profile(s) from {:?}",
            config.profiles.len(),
            path
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let document = Document::parse(content)?;

        let mut general = General::default();
        let mut general_seen = false;
        let mut profiles = Vec::new();

        for section in &document.sections {
            if section.name == GENERAL_SECTION || section.name == LEGACY_GENERAL_SECTION {
                if general_seen {
                    return Err(ConfigError::DuplicateSection {
                        section: section.name.clone(),
                        line: section.line,
                    });
                }
                general_seen = true;
                general = parse_general(section)?;
            } else {
                let profile = parse_profile(section)?;
                debug!("Profile {} needs ports: {:?}", profile.id, profile.ports);
                profiles.push(profile);
            }
        }

        if profiles.is_empty() {
            return Err(ConfigError::NoProfiles);
        }

        for (key, id) in [("initial", &general.initial), ("prefer", &general.prefer)] {
            if let Some(id) = id {
                if !profiles.iter().any(|p| &p.id == id) {
                    return Err(ConfigError::UnknownProfile {
                        key: key.to_string(),
                        id: id.clone(),
                    });
                }
            }
        }

        Ok(Self { general, profiles })
    }

    /// Profiles in file order.
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn generate_example(path: Option<&Path>, force: bool) -> Result<PathBuf, ConfigError> {
        let path = Self::resolve_path(path)?;

        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path));
        }

        let write_err = |source: std::io::Error| ConfigError::Write {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&path, EXAMPLE_CONFIG).map_err(write_err)?;

        info!("Example configuration written to {:?}", path);
        Ok(path)
    }
}

fn reject_unknown_keys(section: &Section, known: &[&str]) -> Result<(), ConfigError> {
    match section.entries.iter().find(|e| !known.contains(&e.key.as_str())) {
        Some(entry) => Err(ConfigError::UnknownKey {
            section: section.name.clone(),
            key: entry.key.clone(),
            line: entry.line,
        }),
        None => Ok(()),
    }
}

fn required<'a>(section: &'a Section, key: &str) -> Result<&'a str, ConfigError> {
    section.get(key).ok_or_else(|| ConfigError::MissingKey {
        section: section.name.clone(),
        key: key.to_string(),
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn expand_path(value: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(value).into_owned())
}

fn invalid(section: &Section, key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.name.clone(),
        key: key.to_string(),
        message: message.into(),
    }
}

pub fn split_ports(raw: &str) -> Vec<String> {
    let mut ports: Vec<String> = Vec::new();
    for port in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if !ports.iter().any(|p| p == port) {
            ports.push(port.to_string());
        }
    }
    ports
}

pub fn split_commands(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .map(|line| line.strip_suffix(',').unwrap_or(line).trim_end())
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

fn parse_profile(section: &Section) -> Result<Profile, ConfigError> {
    reject_unknown_keys(section, &PROFILE_KEYS)?;

    let title = required(section, "title")?.trim();
    if title.is_empty() {
        return Err(invalid(section, "title", "title must not be empty"));
    }

    Ok(Profile {
        id: section.name.clone(),
        title: title.to_string(),
        ports: split_ports(required(section, "ports")?),
        icon: non_empty(section.get("icon")).map(|v| expand_path(&v)),
        commands: split_commands(required(section, "commands")?),
    })
}

fn parse_general(section: &Section) -> Result<General, ConfigError> {
    reject_unknown_keys(section, &GENERAL_KEYS)?;

    let defaults = General::default();

    let on_failure = match non_empty(section.get("on_failure")).as_deref() {
        None | Some("continue") => FailurePolicy::Continue,
        Some("abort") => FailurePolicy::Abort,
        Some(other) => {
            return Err(invalid(
                section,
                "on_failure",
                format!("expected 'continue' or 'abort', found '{}'", other),
            ));
        }
    };

    let query = match non_empty(section.get("query")).as_deref() {
        None | Some("xrandr") => QueryBackend::Xrandr,
        Some("hyprctl") => QueryBackend::Hyprctl,
        Some(other) => {
            return Err(invalid(
                section,
                "query",
                format!("expected 'xrandr' or 'hyprctl', found '{}'", other),
            ));
        }
    };

    let command_timeout = match non_empty(section.get("command_timeout")) {
        None => None,
        Some(raw) => {
            let secs: f64 = raw
                .parse()
                .map_err(|_| invalid(section, "command_timeout", format!("'{}' is not a number", raw)))?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err(invalid(section, "command_timeout", "must be a positive number of seconds"));
            }
            let timeout = Duration::try_from_secs_f64(secs)
                .map_err(|_| invalid(section, "command_timeout", format!("'{}' is too large", raw)))?;
            Some(timeout)
        }
    };

    Ok(General {
        initial: non_empty(section.get("initial")),
        prefer: non_empty(section.get("prefer")),
        status_file: non_empty(section.get("status_file")).map(|v| expand_path(&v)),
        on_failure,
        command_timeout,
        shell: non_empty(section.get("shell")).unwrap_or(defaults.shell),
        query,
        menu: non_empty(section.get("menu")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PROFILES: &str = "\
[general]
initial = laptop

[vga_laptop]
title = VGA and laptop
ports = VGA-1,LVDS-1
commands:
    xrandr --output VGA-1 --auto
[laptop]
title = Laptop
ports = LVDS-1
commands : xrandr --output VGA-1 --off,
    amixer set Master unmute
";

    #[test]
    fn test_parse_profiles_in_file_order() {
        let config = Config::parse(TWO_PROFILES).unwrap();
        let ids: Vec<_> = config.profiles().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["vga_laptop", "laptop"]);

        let laptop = config.profile("laptop").unwrap();
        assert_eq!(laptop.title, "Laptop");
        assert_eq!(laptop.ports, ["LVDS-1"]);
        assert_eq!(
            laptop.commands,
            ["xrandr --output VGA-1 --off", "amixer set Master unmute"]
        );
        assert_eq!(config.general.initial.as_deref(), Some("laptop"));
        assert_eq!(config.general.on_failure, FailurePolicy::Continue);
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = Config::parse(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.profiles().len(), 2);
        assert_eq!(config.profile("vga_laptop").unwrap().ports, ["VGA-1", "LVDS-1"]);
    }

    #[test]
    fn test_no_profiles_is_an_error() {
        assert!(matches!(Config::parse(""), Err(ConfigError::NoProfiles)));
        assert!(matches!(
            Config::parse("[general]\non_failure = abort\n"),
            Err(ConfigError::NoProfiles)
        ));
    }

    #[test]
    fn test_missing_required_key() {
        let err = Config::parse("[a]\ntitle = A\nports = X\n").unwrap_err();
        match err {
            ConfigError::MissingKey { section, key } => {
                assert_eq!(section, "a");
                assert_eq!(key, "commands");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Config::parse("[a]\ntitle = A\nports =\ncommands =\ncolour = red\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { ref key, line: 5, .. } if key == "colour"));

        let err = Config::parse("[general]\nprefer1 = a\n[a]\ntitle = A\nports =\ncommands =\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { ref key, .. } if key == "prefer1"));
    }

    #[test]
    fn test_empty_ports_and_commands_are_allowed() {
        let config = Config::parse("[noop]\ntitle = Nothing\nports =\ncommands =\n").unwrap();
        let noop = config.profile("noop").unwrap();
        assert!(noop.ports.is_empty());
        assert!(noop.commands.is_empty());
    }

    #[test]
    fn test_empty_title_is_rejected() {
        let err = Config::parse("[a]\ntitle =\nports =\ncommands =\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "title"));
    }

    #[test]
    fn test_initial_must_exist() {
        let err = Config::parse("[general]\ninitial = gone\n[a]\ntitle = A\nports =\ncommands =\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile { ref id, .. } if id == "gone"));
    }

    #[test]
    fn test_legacy_general_section_name() {
        let config = Config::parse(
            "[chrandr]\nstatus_file = /tmp/chrandr.state\n[a]\ntitle = A\nports =\ncommands =\n",
        )
        .unwrap();
        assert_eq!(
            config.general.status_file.as_deref(),
            Some(Path::new("/tmp/chrandr.state"))
        );
        assert_eq!(config.profiles().len(), 1);
    }

    #[test]
    fn test_general_options() {
        let config = Config::parse(
            "[general]\non_failure = abort\ncommand_timeout = 2.5\nshell = /bin/bash\nquery = hyprctl\nmenu = rofi -dmenu\nprefer = a\n\
             [a]\ntitle = A\nports =\ncommands =\n",
        )
        .unwrap();
        let general = &config.general;
        assert_eq!(general.on_failure, FailurePolicy::Abort);
        assert_eq!(general.command_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(general.shell, "/bin/bash");
        assert_eq!(general.query, QueryBackend::Hyprctl);
        assert_eq!(general.menu.as_deref(), Some("rofi -dmenu"));
        assert_eq!(general.prefer.as_deref(), Some("a"));
    }

    #[test]
    fn test_invalid_general_values() {
        let tail = "[a]\ntitle = A\nports =\ncommands =\n";
        for general in [
            "on_failure = retry",
            "query = wlr-randr",
            "command_timeout = soon",
            "command_timeout = 0",
            "command_timeout = 1e20",
        ] {
            let input = format!("[general]\n{general}\n{tail}");
            assert!(
                matches!(Config::parse(&input), Err(ConfigError::InvalidValue { .. })),
                "{general} should be rejected"
            );
        }
    }

    #[test]
    fn test_general_and_legacy_section_together() {
        let input = "[general]\ninitial = a\n[chrandr]\nprefer = a\n[a]\ntitle = A\nports =\ncommands =\n";
        let err = Config::parse(input).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSection { ref section, line: 3 } if section == "chrandr"));

        let config = Config::parse("[chrandr]\ninitial = a\n[a]\ntitle = A\nports =\ncommands =\n").unwrap();
        assert_eq!(config.general.initial.as_deref(), Some("a"));
    }

    #[test]
    fn test_profile_serializes_to_json() {
        let config = Config::parse(TWO_PROFILES).unwrap();
        let value = serde_json::to_value(config.profile("vga_laptop").unwrap()).unwrap();
        assert_eq!(value["id"], "vga_laptop");
        assert_eq!(value["ports"], serde_json::json!(["VGA-1", "LVDS-1"]));
        assert!(value["icon"].is_null());
    }

    #[test]
    fn test_split_ports_dedups_and_trims() {
        assert_eq!(split_ports(" VGA-1 , ,LVDS-1,VGA-1"), ["VGA-1", "LVDS-1"]);
        assert!(split_ports("").is_empty());
    }

    #[test]
    fn test_split_commands_strips_trailing_commas() {
        assert_eq!(
            split_commands("echo a,\n\necho b ,\necho 'c, d'"),
            ["echo a", "echo b", "echo 'c, d'"]
        );
    }

    #[test]
    fn test_icon_is_tilde_expanded() {
        let config =
            Config::parse("[a]\ntitle = A\nports =\nicon = ~/icons/a.png\ncommands =\n").unwrap();
        let icon = config.profile("a").unwrap().icon.clone().unwrap();
        assert!(!icon.starts_with("~"));
        assert!(icon.ends_with("icons/a.png"));
    }

    #[test]
    fn test_load_missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.conf"))).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }

    #[test]
    fn test_generate_example_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/chrandr.conf");

        let written = Config::generate_example(Some(&path), false).unwrap();
        assert_eq!(written, path);
        assert!(Config::load(Some(&path)).is_ok());

        assert!(matches!(
            Config::generate_example(Some(&path), false),
            Err(ConfigError::AlreadyExists(_))
        ));
        assert!(Config::generate_example(Some(&path), true).is_ok());
    }
}
