//! Shared fixtures for cluster integration tests

use fleetcmd_core::ClusterCommand;
use fleetcmd_exec::{ExecEnv, HostTarget};

/// Stand-in SSH client: drops host and flags, runs the command locally
pub const FAKE_SSH: &str = r#"sh -c 'while [ $# -gt 1 ]; do case "$1" in -p|-i) shift 2 ;; *) shift ;; esac; done; exec sh -c "$1"' fake-ssh"#;

/// Quiet cluster over `hosts` that runs everything through [`FAKE_SSH`]
pub fn fake_cluster(hosts: &[&str]) -> ClusterCommand {
    ClusterCommand::new(hosts)
        .with_client(FAKE_SSH)
        .configure_runners(|config| {
            config.mute_stdout = true;
            config.mute_stderr = true;
            config.mute_echo = true;
        })
}

/// Quiet cluster over fully described targets
#[allow(dead_code)]
pub fn fake_cluster_from(targets: Vec<HostTarget>) -> ClusterCommand {
    ClusterCommand::from_targets(targets, &ExecEnv::from_env())
        .with_client(FAKE_SSH)
        .configure_runners(|config| {
            config.mute_stdout = true;
            config.mute_stderr = true;
            config.mute_echo = true;
        })
}
