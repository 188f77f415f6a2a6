use crate::config::{Config, Profile};
use crate::ports::AvailablePorts;
use serde::Serialize;
use std::path::PathBuf;

impl Profile {
    /// A profile is eligible when every port it needs is connected.
    pub fn is_eligible(&self, ports: &AvailablePorts) -> bool {
        self.ports.iter().all(|port| ports.contains(port))
    }

    pub fn missing_ports<'a>(&'a self, ports: &AvailablePorts) -> Vec<&'a str> {
        self.ports
            .iter()
            .filter(|port| !ports.contains(port))
            .map(String::as_str)
            .collect()
    }
}

/// Eligible profiles, in configuration file order.
pub fn eligible<'a>(config: &'a Config, ports: &AvailablePorts) -> Vec<&'a Profile> {
    config
        .profiles()
        .iter()
        .filter(|profile| profile.is_eligible(ports))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileInfo {
    pub id: String,
    pub title: String,
    pub ports: Vec<String>,
    pub icon: Option<PathBuf>,
    pub commands: Vec<String>,
    pub eligible: bool,
    pub is_current: bool,
}

/// Every profile with its eligibility. `ports` is `None` when the display
/// query failed, in which case nothing is eligible.
pub fn profile_infos(
    config: &Config,
    ports: Option<&AvailablePorts>,
    current: Option<&str>,
) -> Vec<ProfileInfo> {
    config
        .profiles()
        .iter()
        .map(|profile| ProfileInfo {
            id: profile.id.clone(),
            title: profile.title.clone(),
            ports: profile.ports.clone(),
            icon: profile.icon.clone(),
            commands: profile.commands.clone(),
            eligible: ports.is_some_and(|p| profile.is_eligible(p)),
            is_current: current == Some(profile.id.as_str()),
        })
        .collect()
}

pub fn print_list(infos: &[ProfileInfo], ports: Option<&AvailablePorts>) {
    match ports {
        Some(ports) => println!("\nConnected ports: {}", ports),
        None => println!("\nConnected ports: unknown (display query failed)"),
    }
    println!("{}", "-".repeat(50));

    for info in infos {
        let current = if info.is_current { ">" } else { " " };
        let eligible = if info.eligible { "*" } else { " " };
        println!("[{}{}] {} ({})", current, eligible, info.title, info.id);
        if info.ports.is_empty() {
            println!("    Ports: any");
        } else {
            println!("    Ports: {}", info.ports.join(", "));
        }
        println!("    Commands: {}", info.commands.len());
    }
    println!("\n* available   > last applied\n");
}
