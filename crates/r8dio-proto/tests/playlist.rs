use r8dio_proto::stations::{load_playlist, parse_playlist};
use std::io::Write;

const PLAYLIST: &str = "#EXTM3U
#EXTINF:-1, radiko/TBS
http://example.invalid/tbs

#EXTINF:-1, afn/AFN Tokyo Eagle
plugin:/afn.py/AFN_TKO
#EXTINF:-1, dangling/Nobody
#EXTINF:-1, net/Soma

https://ice.example.invalid/groovesalad
http://orphan.example.invalid/no-extinf
";

#[test]
fn test_parse_playlist_pairs_names_with_next_url() {
    let stations = parse_playlist(PLAYLIST);
    let pairs: Vec<(&str, &str)> = stations
        .iter()
        .map(|s| (s.name.as_str(), s.url.as_str()))
        .collect();

    assert_eq!(
        pairs,
        vec![
            ("TBS     ", "http://example.invalid/tbs"),
            ("AFN Tokyo Eagle", "plugin:/afn.py/AFN_TKO"),
            ("Soma    ", "https://ice.example.invalid/groovesalad"),
        ]
    );
}

#[test]
fn test_load_playlist_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("radio.m3u");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(PLAYLIST.as_bytes()).unwrap();

    let stations = load_playlist(&path).unwrap();
    assert_eq!(stations.len(), 3);
    assert_eq!(stations[1].plugin(), Some(("afn.py", "AFN_TKO")));
}

#[test]
fn test_empty_playlist_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("empty.m3u");
    std::fs::write(&path, "#EXTM3U\n").unwrap();

    let err = load_playlist(&path).unwrap_err();
    assert!(err.to_string().contains("no stations"));
}
