use std::path::PathBuf;

pub fn default_mpv_socket_path() -> PathBuf {
    std::env::temp_dir().join("r8dio-mpv.sock")
}

pub fn data_dir() -> PathBuf {
    // ~/.local/share/r8dio/ (XDG layout, same on every unix)
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".local")
        .join("share")
        .join("r8dio")
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("r8dio")
}

pub fn mpv_binary_name() -> &'static str {
    "mpv"
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    for dir in path.split(':') {
        for name in names {
            let p = PathBuf::from(dir).join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

/// Find the mpv binary.
/// An explicit configured path wins; otherwise `/usr/bin/mpv`, then PATH.
pub fn find_mpv_binary(configured: Option<&std::path::Path>) -> Option<PathBuf> {
    if let Some(p) = configured {
        return p.exists().then(|| p.to_path_buf());
    }

    let system = PathBuf::from("/usr/bin").join(mpv_binary_name());
    if system.exists() {
        return Some(system);
    }

    find_on_path(&[mpv_binary_name()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_are_namespaced() {
        assert!(data_dir().ends_with("share/r8dio"));
        assert!(config_dir().ends_with(".config/r8dio"));
    }

    #[test]
    fn test_configured_mpv_must_exist() {
        let missing = std::path::Path::new("/definitely/not/here/mpv");
        assert_eq!(find_mpv_binary(Some(missing)), None);
    }
}
