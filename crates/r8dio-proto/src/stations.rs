use std::path::Path;

/// Visible width of the display, in characters.
pub const NAME_WIDTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    /// Padded to at least [`NAME_WIDTH`] characters.
    pub name: String,
    pub url: String,
}

impl Station {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: pad_name(name),
            url: url.to_string(),
        }
    }

    /// `plugin:/<name>/<arg>` URLs, split into plugin name and argument.
    pub fn plugin(&self) -> Option<(&str, &str)> {
        let rest = self.url.strip_prefix("plugin:/")?;
        let (name, arg) = rest.split_once('/').unwrap_or((rest, ""));
        (!name.is_empty()).then_some((name, arg))
    }
}

/// Right-pad short names with spaces; longer names are left alone and
/// truncated by the display.
fn pad_name(name: &str) -> String {
    let len = name.chars().count();
    if len < NAME_WIDTH {
        format!("{}{}", name, " ".repeat(NAME_WIDTH - len))
    } else {
        name.to_string()
    }
}

/// The station name on an `#EXTINF:` line follows the last `/`; lines
/// without one fall back to the usual m3u `,title`.
fn extinf_name(line: &str) -> String {
    let rest = match line.split_once("#EXTINF:") {
        Some((_, rest)) => rest,
        None => line,
    };
    let name = match rest.rsplit_once('/') {
        Some((_, name)) => name,
        None => rest.split_once(',').map(|(_, n)| n).unwrap_or(rest),
    };
    name.trim_matches(' ').to_string()
}

pub fn parse_playlist(content: &str) -> Vec<Station> {
    let mut stations = Vec::new();
    let mut pending_name: Option<String> = None;

    for line in content.lines() {
        if line.contains("#EXTINF:") {
            pending_name = Some(extinf_name(line));
            continue;
        }

        let url = line.trim();
        if url.is_empty() {
            continue;
        }
        if let Some(name) = pending_name.take() {
            stations.push(Station::new(&name, url));
        }
    }

    stations
}

pub fn load_playlist(path: &Path) -> anyhow::Result<Vec<Station>> {
    let content = std::fs::read_to_string(path)?;
    let stations = parse_playlist(&content);
    if stations.is_empty() {
        anyhow::bail!("no stations in {}", path.display());
    }
    Ok(stations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_names_are_padded() {
        let st = Station::new("NHK", "http://x");
        assert_eq!(st.name, "NHK     ");
        assert_eq!(Station::new("ﾗｼﾞｵ", "u").name.chars().count(), 8);
        assert_eq!(Station::new("LongerThan8", "u").name, "LongerThan8");
    }

    #[test]
    fn test_extinf_name_after_last_slash() {
        assert_eq!(extinf_name("#EXTINF:-1, radiko/JP13/ TBS "), "TBS");
        assert_eq!(extinf_name("#EXTINF:-1,Plain Title"), "Plain Title");
    }

    #[test]
    fn test_plugin_split() {
        let st = Station::new("AFN", "plugin:/afn.py/AFN_TKO");
        assert_eq!(st.plugin(), Some(("afn.py", "AFN_TKO")));
        assert_eq!(Station::new("x", "http://a/b").plugin(), None);
    }
}
