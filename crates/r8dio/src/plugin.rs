//! `plugin:/<name>/<arg>` station URLs.
//!
//! Some stations have no fixed stream URL (tokenised or rotating ones). For
//! those the playlist names an executable in the plugins directory; it is
//! run as `<dir>/<name> <arg>` and the first non-empty line it prints is the
//! URL handed to mpv.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use r8dio_proto::config::PluginsConfig;
use r8dio_proto::stations::Station;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("plugin {0} not found")]
    NotFound(PathBuf),
    #[error("failed to run plugin: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("plugin exited with {0}")]
    Failed(ExitStatus),
    #[error("plugin timed out after {0:?}")]
    Timeout(Duration),
    #[error("plugin printed no URL")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct PluginResolver {
    dir: PathBuf,
    timeout: Duration,
}

impl PluginResolver {
    pub fn new(config: &PluginsConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// The URL to hand to mpv for `station`.
    pub async fn resolve(&self, station: &Station) -> Result<String, ResolveError> {
        match station.plugin() {
            Some((name, arg)) => self.run(name, arg).await,
            None => Ok(station.url.clone()),
        }
    }

    async fn run(&self, name: &str, arg: &str) -> Result<String, ResolveError> {
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(ResolveError::NotFound(path));
        }
        debug!("plugin: {} {}", path.display(), arg);

        let output = Command::new(&path)
            .arg(arg)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| ResolveError::Timeout(self.timeout))?
            .map_err(ResolveError::Spawn)?;

        if !output.status.success() {
            return Err(ResolveError::Failed(output.status));
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or(ResolveError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &std::path::Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    // One test so the scripts are all written before anything is exec'd.
    #[tokio::test]
    async fn test_resolve() {
        let dir = tempfile::TempDir::new().unwrap();
        script(dir.path(), "echo", "echo\necho \"  http://resolved/$1  \"\necho second");
        script(dir.path(), "fail", "exit 3");
        script(dir.path(), "silent", "true");
        script(dir.path(), "slow", "sleep 5");

        let resolver = PluginResolver::new(&PluginsConfig {
            dir: dir.path().to_path_buf(),
            timeout_secs: 1,
        });

        let plain = Station::new("Plain", "http://direct/stream");
        assert_eq!(resolver.resolve(&plain).await.unwrap(), "http://direct/stream");

        let st = Station::new("Echo", "plugin:/echo/AFN_TKO");
        assert_eq!(resolver.resolve(&st).await.unwrap(), "http://resolved/AFN_TKO");

        let st = Station::new("Fail", "plugin:/fail/x");
        assert!(matches!(resolver.resolve(&st).await, Err(ResolveError::Failed(_))));

        let st = Station::new("Silent", "plugin:/silent/x");
        assert!(matches!(resolver.resolve(&st).await, Err(ResolveError::Empty)));

        let st = Station::new("Missing", "plugin:/nope/x");
        assert!(matches!(resolver.resolve(&st).await, Err(ResolveError::NotFound(_))));

        let st = Station::new("Slow", "plugin:/slow/x");
        assert!(matches!(resolver.resolve(&st).await, Err(ResolveError::Timeout(_))));
    }
}
