// ABOUTME: Capability interface for OS package and service management.
// ABOUTME: Per-OS implementations build command plans, then run them in order.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

/// Errors from system setup steps. The driver treats all of them as soft.
#[derive(Error, Debug)]
pub enum SystemError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: String },

    #[error("{0}")]
    Unsupported(String),
}

/// Install packages and keep services running on the host.
pub trait SystemSetup {
    /// Install packages by their Debian-style names; implementations map them.
    fn install_packages(&self, packages: &[&str]) -> Result<(), SystemError>;

    /// Start `name` now and at boot.
    fn ensure_service_running(&self, name: &str) -> Result<(), SystemError>;

    /// Name of the SSH server service on this host.
    fn ssh_service_name(&self) -> &'static str;
}

/// A single external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Prefix with `sudo` when requested.
    pub fn elevated(self, use_sudo: bool) -> Self {
        if !use_sudo {
            return self;
        }
        let mut args = vec![self.program];
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
        }
    }

    pub fn run(&self) -> Result<(), SystemError> {
        tracing::info!(command = %self, "running");
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .map_err(|e| SystemError::Spawn {
                command: self.to_string(),
                source: e,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(SystemError::Failed {
                command: self.to_string(),
                status: status.to_string(),
            })
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn run_all(plan: &[Invocation]) -> Result<(), SystemError> {
    plan.iter().try_for_each(Invocation::run)
}

fn on_path(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Linux package managers, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Zypper,
    Apk,
}

impl PackageManager {
    const ALL: [PackageManager; 6] = [
        Self::Apt,
        Self::Dnf,
        Self::Yum,
        Self::Pacman,
        Self::Zypper,
        Self::Apk,
    ];

    pub fn binary(&self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Pacman => "pacman",
            Self::Zypper => "zypper",
            Self::Apk => "apk",
        }
    }

    pub fn detect() -> Option<Self> {
        Self::ALL.into_iter().find(|pm| on_path(pm.binary()))
    }

    /// Distribution package name for a Debian-style name.
    fn package_name<'a>(&self, package: &'a str) -> &'a str {
        match (self, package) {
            (Self::Pacman | Self::Zypper | Self::Apk, "openssh-server") => "openssh",
            _ => package,
        }
    }

    pub fn install_plan(&self, packages: &[&str]) -> Vec<Invocation> {
        let names: Vec<&str> = packages.iter().map(|p| self.package_name(p)).collect();
        let bin = self.binary();
        match self {
            Self::Apt => vec![
                Invocation::new(bin, ["update"]),
                Invocation::new(bin, ["install", "-y"].into_iter().chain(names)),
            ],
            Self::Dnf | Self::Yum => {
                vec![Invocation::new(bin, ["install", "-y"].into_iter().chain(names))]
            }
            Self::Pacman => vec![Invocation::new(
                bin,
                ["-S", "--needed", "--noconfirm"].into_iter().chain(names),
            )],
            Self::Zypper => vec![Invocation::new(
                bin,
                ["--non-interactive", "install"].into_iter().chain(names),
            )],
            Self::Apk => vec![Invocation::new(bin, ["add"].into_iter().chain(names))],
        }
    }
}

/// Linux service managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceManager {
    Systemd,
    OpenRc,
    SysV,
}

impl ServiceManager {
    pub fn detect() -> Option<Self> {
        if on_path("systemctl") {
            Some(Self::Systemd)
        } else if on_path("rc-service") {
            Some(Self::OpenRc)
        } else if on_path("service") {
            Some(Self::SysV)
        } else {
            None
        }
    }

    pub fn start_plan(&self, name: &str) -> Vec<Invocation> {
        match self {
            Self::Systemd => vec![Invocation::new("systemctl", ["enable", "--now", name])],
            Self::OpenRc => vec![
                Invocation::new("rc-update", ["add", name, "default"]),
                Invocation::new("rc-service", [name, "start"]),
            ],
            Self::SysV => vec![Invocation::new("service", [name, "start"])],
        }
    }
}

/// Linux hosts.
#[derive(Debug, Clone)]
pub struct LinuxSystem {
    pub packages: Option<PackageManager>,
    pub services: Option<ServiceManager>,
    pub use_sudo: bool,
}

impl LinuxSystem {
    pub fn detect(use_sudo: bool) -> Self {
        Self {
            packages: PackageManager::detect(),
            services: ServiceManager::detect(),
            use_sudo,
        }
    }

    pub fn install_plan(&self, packages: &[&str]) -> Result<Vec<Invocation>, SystemError> {
        let pm = self.packages.ok_or_else(|| {
            SystemError::Unsupported("no supported package manager found".to_string())
        })?;
        Ok(pm
            .install_plan(packages)
            .into_iter()
            .map(|inv| inv.elevated(self.use_sudo))
            .collect())
    }

    pub fn service_plan(&self, name: &str) -> Result<Vec<Invocation>, SystemError> {
        let sm = self.services.ok_or_else(|| {
            SystemError::Unsupported("no supported service manager found".to_string())
        })?;
        Ok(sm
            .start_plan(name)
            .into_iter()
            .map(|inv| inv.elevated(self.use_sudo))
            .collect())
    }
}

impl SystemSetup for LinuxSystem {
    fn install_packages(&self, packages: &[&str]) -> Result<(), SystemError> {
        run_all(&self.install_plan(packages)?)
    }

    fn ensure_service_running(&self, name: &str) -> Result<(), SystemError> {
        run_all(&self.service_plan(name)?)
    }

    fn ssh_service_name(&self) -> &'static str {
        // Debian and derivatives name the unit `ssh`.
        match self.packages {
            Some(PackageManager::Apt) => "ssh",
            _ => "sshd",
        }
    }
}

/// macOS hosts. OpenSSH ships with the OS; mosh comes from Homebrew.
#[derive(Debug, Clone)]
pub struct MacSystem {
    pub brew: Option<PathBuf>,
    pub use_sudo: bool,
}

impl MacSystem {
    pub fn detect(use_sudo: bool) -> Self {
        Self {
            brew: which::which("brew").ok(),
            use_sudo,
        }
    }

    pub fn install_plan(&self, packages: &[&str]) -> Result<Vec<Invocation>, SystemError> {
        let wanted: Vec<&str> = packages
            .iter()
            .copied()
            .filter(|p| *p != "openssh-server")
            .collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let brew = self
            .brew
            .as_ref()
            .ok_or_else(|| SystemError::Unsupported("Homebrew is not installed".to_string()))?;
        // Homebrew refuses to run as root.
        Ok(vec![Invocation::new(
            &brew.to_string_lossy(),
            ["install"].into_iter().chain(wanted),
        )])
    }

    pub fn service_plan(&self, name: &str) -> Result<Vec<Invocation>, SystemError> {
        if name != "ssh" {
            return Err(SystemError::Unsupported(format!(
                "managing service {name} is not supported on macOS"
            )));
        }
        Ok(vec![Invocation::new(
            "systemsetup",
            ["-setremotelogin", "on"],
        )
        .elevated(self.use_sudo)])
    }
}

impl SystemSetup for MacSystem {
    fn install_packages(&self, packages: &[&str]) -> Result<(), SystemError> {
        run_all(&self.install_plan(packages)?)
    }

    fn ensure_service_running(&self, name: &str) -> Result<(), SystemError> {
        run_all(&self.service_plan(name)?)
    }

    fn ssh_service_name(&self) -> &'static str {
        "ssh"
    }
}

/// Windows hosts, driven through PowerShell. mosh has no Windows server.
#[derive(Debug, Clone, Default)]
pub struct WindowsSystem;

impl WindowsSystem {
    fn powershell(script: &str) -> Invocation {
        Invocation::new(
            "powershell",
            ["-NoProfile", "-NonInteractive", "-Command", script],
        )
    }

    pub fn install_plan(&self, packages: &[&str]) -> Result<Vec<Invocation>, SystemError> {
        let mut plan = Vec::new();
        for package in packages {
            match *package {
                "openssh-server" => plan.push(Self::powershell(
                    "Add-WindowsCapability -Online -Name OpenSSH.Server~~~~0.0.1.0",
                )),
                other => {
                    tracing::warn!(package = other, "package not available on Windows, skipping")
                }
            }
        }
        Ok(plan)
    }

    pub fn service_plan(&self, name: &str) -> Result<Vec<Invocation>, SystemError> {
        Ok(vec![
            Self::powershell(&format!("Set-Service -Name {name} -StartupType Automatic")),
            Self::powershell(&format!("Start-Service {name}")),
        ])
    }
}

impl SystemSetup for WindowsSystem {
    fn install_packages(&self, packages: &[&str]) -> Result<(), SystemError> {
        run_all(&self.install_plan(packages)?)
    }

    fn ensure_service_running(&self, name: &str) -> Result<(), SystemError> {
        run_all(&self.service_plan(name)?)
    }

    fn ssh_service_name(&self) -> &'static str {
        "sshd"
    }
}

/// The implementation for the OS this binary runs on.
pub fn for_host(use_sudo: bool) -> Box<dyn SystemSetup> {
    if cfg!(target_os = "macos") {
        Box::new(MacSystem::detect(use_sudo))
    } else if cfg!(windows) {
        Box::new(WindowsSystem)
    } else {
        Box::new(LinuxSystem::detect(use_sudo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(plan: &[Invocation]) -> Vec<String> {
        plan.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_elevated_prefixes_sudo() {
        let inv = Invocation::new("apt-get", ["install", "-y", "mosh"]).elevated(true);
        assert_eq!(inv.to_string(), "sudo apt-get install -y mosh");

        let plain = Invocation::new("apt-get", ["update"]).elevated(false);
        assert_eq!(plain.to_string(), "apt-get update");
    }

    #[test]
    fn test_apt_install_plan() {
        let linux = LinuxSystem {
            packages: Some(PackageManager::Apt),
            services: Some(ServiceManager::Systemd),
            use_sudo: true,
        };
        let plan = linux
            .install_plan(&["openssh-server", "mosh"])
            .expect("should plan");
        assert_eq!(
            rendered(&plan),
            vec![
                "sudo apt-get update",
                "sudo apt-get install -y openssh-server mosh",
            ]
        );
        assert_eq!(linux.ssh_service_name(), "ssh");
    }

    #[test]
    fn test_pacman_maps_openssh_name() {
        let plan = PackageManager::Pacman.install_plan(&["openssh-server", "mosh"]);
        assert_eq!(
            rendered(&plan),
            vec!["pacman -S --needed --noconfirm openssh mosh"]
        );
    }

    #[test]
    fn test_service_plans() {
        assert_eq!(
            rendered(&ServiceManager::Systemd.start_plan("sshd")),
            vec!["systemctl enable --now sshd"]
        );
        assert_eq!(
            rendered(&ServiceManager::OpenRc.start_plan("sshd")),
            vec!["rc-update add sshd default", "rc-service sshd start"]
        );
        assert_eq!(
            rendered(&ServiceManager::SysV.start_plan("ssh")),
            vec!["service ssh start"]
        );
    }

    #[test]
    fn test_linux_without_managers_is_unsupported() {
        let linux = LinuxSystem {
            packages: None,
            services: None,
            use_sudo: false,
        };
        assert!(matches!(
            linux.install_plan(&["mosh"]),
            Err(SystemError::Unsupported(_))
        ));
        assert!(matches!(
            linux.service_plan("sshd"),
            Err(SystemError::Unsupported(_))
        ));
        assert_eq!(linux.ssh_service_name(), "sshd");
    }

    #[test]
    fn test_mac_skips_bundled_openssh_and_never_sudos_brew() {
        let mac = MacSystem {
            brew: Some(PathBuf::from("/opt/homebrew/bin/brew")),
            use_sudo: true,
        };
        let plan = mac
            .install_plan(&["openssh-server", "mosh"])
            .expect("should plan");
        assert_eq!(rendered(&plan), vec!["/opt/homebrew/bin/brew install mosh"]);

        let only_ssh = mac.install_plan(&["openssh-server"]).expect("should plan");
        assert!(only_ssh.is_empty());

        let service = mac.service_plan("ssh").expect("should plan");
        assert_eq!(rendered(&service), vec!["sudo systemsetup -setremotelogin on"]);
    }

    #[test]
    fn test_mac_without_brew() {
        let mac = MacSystem {
            brew: None,
            use_sudo: false,
        };
        assert!(matches!(
            mac.install_plan(&["mosh"]),
            Err(SystemError::Unsupported(_))
        ));
    }

    #[test]
    fn test_windows_plans() {
        let win = WindowsSystem;
        let install = win
            .install_plan(&["openssh-server", "mosh"])
            .expect("should plan");
        assert_eq!(install.len(), 1, "mosh is skipped on Windows");
        assert!(install[0].args.iter().any(|a| a.contains("OpenSSH.Server")));

        let service = win.service_plan("sshd").expect("should plan");
        assert_eq!(service.len(), 2);
        assert!(service[1].to_string().ends_with("Start-Service sshd"));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let inv = Invocation::new("nomad-definitely-not-a-real-binary", ["--version"]);
        assert!(matches!(inv.run(), Err(SystemError::Spawn { .. })));
    }
}
