use std::path::PathBuf;
use std::process::Command;

use crate::domain::{DomainDescriptor, RunState, WakeAction};
use crate::hypervisor::{ControlPlaneError, Connector, Session};

/// Talks to libvirt through the `virsh` client.
#[derive(Debug, Clone)]
pub struct VirshConnector {
    program: PathBuf,
    uri: String,
}

impl VirshConnector {
    pub fn new(uri: &str) -> Self {
        Self { program: PathBuf::from("virsh"), uri: uri.to_string() }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl Connector for VirshConnector {
    type Session = VirshSession;

    fn connect(&self) -> Result<VirshSession, ControlPlaneError> {
        let session = VirshSession { program: self.program.clone(), uri: self.uri.clone() };

        // virsh has no persistent connection, so probe the daemon once up front
        session.run(&["uri"]).map_err(|e| ControlPlaneError::Connect {
            uri: self.uri.clone(),
            reason: e.to_string(),
        })?;
        log::trace!("[virsh] connected to {}", self.uri);

        Ok(session)
    }
}

#[derive(Debug)]
pub struct VirshSession {
    program: PathBuf,
    uri: String,
}

impl VirshSession {
    fn run(&self, args: &[&str]) -> Result<String, ControlPlaneError> {
        log::trace!("[virsh] -c {} {}", self.uri, args.join(" "));

        let mut cmd = Command::new(&self.program);
        // state names are parsed, so they must not be translated
        cmd.env("LC_ALL", "C").arg("-c").arg(&self.uri).args(args);

        // keep a Ctrl-C at the terminal from reaching virsh mid-call
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let output = cmd.output()?;

        if !output.status.success() {
            return Err(ControlPlaneError::Command {
                command: format!("virsh {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_uuid_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

fn wake_command(action: WakeAction) -> &'static str {
    match action {
        WakeAction::Start => "start",
        WakeAction::Resume => "resume",
        WakeAction::PmWakeup => "dompmwakeup",
    }
}

impl Session for VirshSession {
    // Domains are addressed by UUID throughout: virsh tries `--domain` as
    // an ID, then a UUID, then a name, so a guest named "3" is ambiguous.
    fn domains(&self) -> Result<Vec<DomainDescriptor>, ControlPlaneError> {
        let uuids = parse_uuid_list(&self.run(&["list", "--all", "--uuid"])?);

        uuids
            .iter()
            .map(|uuid| {
                let xml = self.run(&["dumpxml", "--domain", uuid.as_str()])?;
                DomainDescriptor::from_xml(&xml)
                    .map_err(|source| ControlPlaneError::Descriptor { domain: uuid.clone(), source })
            })
            .collect()
    }

    fn state(&self, domain: &DomainDescriptor) -> Result<RunState, ControlPlaneError> {
        let out = self.run(&["domstate", "--domain", domain.uuid.as_str()])?;
        Ok(RunState::parse(out.lines().next().unwrap_or_default()))
    }

    fn wake(&self, domain: &DomainDescriptor, action: WakeAction) -> Result<(), ControlPlaneError> {
        match self.run(&[wake_command(action), "--domain", domain.uuid.as_str()]) {
            Ok(_) => Ok(()),
            Err(ControlPlaneError::Command { stderr, .. }) => Err(ControlPlaneError::Wake {
                domain: domain.name.clone(),
                action,
                reason: stderr,
            }),
            Err(e) => Err(e),
        }
    }
}
