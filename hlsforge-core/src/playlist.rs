use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use crate::ladder::{RenditionDescriptor, RenditionLadder};

pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";
pub const LOW_MASTER_PLAYLIST_NAME: &str = "low_master.m3u8";

const HLS_VERSION: u32 = 4;

#[derive(Debug, Error)]
#[error("failed to write playlist {path}: {source}")]
pub struct AssemblyError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

#[derive(Debug, Clone)]
pub struct MasterPlaylists {
    pub master: PathBuf,
    pub low_master: PathBuf,
}

/// Renders a master playlist listing `renditions` in the given order.
pub fn render_master<'a, I>(renditions: I) -> String
where
    I: IntoIterator<Item = &'a RenditionDescriptor>,
{
    let mut playlist = String::new();
    playlist.push_str("#EXTM3U\n");
    playlist.push_str(&format!("#EXT-X-VERSION:{HLS_VERSION}\n"));
    for rendition in renditions {
        playlist.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}\n",
            rendition.bandwidth_bps(),
            rendition.width,
            rendition.height
        ));
        playlist.push_str(&rendition.playlist_uri());
        playlist.push('\n');
    }
    playlist
}

/// Writes `master.m3u8` (every tier) and `low_master.m3u8` (lower and
/// super_low only) into `output_dir`.
pub fn write_master_playlists(
    ladder: &RenditionLadder,
    output_dir: &Path,
) -> Result<MasterPlaylists, AssemblyError> {
    let master = output_dir.join(MASTER_PLAYLIST_NAME);
    write_atomically(&master, &render_master(ladder))?;
    info!(path = %master.display(), renditions = ladder.renditions().len(), "master playlist written");

    let low_master = output_dir.join(LOW_MASTER_PLAYLIST_NAME);
    let low_renditions: Vec<_> = ladder.low_bandwidth().collect();
    write_atomically(&low_master, &render_master(low_renditions.iter().copied()))?;
    info!(path = %low_master.display(), renditions = low_renditions.len(), "low master playlist written");

    Ok(MasterPlaylists { master, low_master })
}

/// Readers see either no file or the complete document.
fn write_atomically(path: &Path, contents: &str) -> Result<(), AssemblyError> {
    let wrap = |source: std::io::Error| AssemblyError {
        path: path.to_path_buf(),
        source,
    };
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(directory).map_err(wrap)?;
    file.write_all(contents.as_bytes()).map_err(wrap)?;
    file.as_file().sync_all().map_err(wrap)?;
    file.persist(path).map_err(|err| wrap(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::{plan_ladder, SourceDimensions};
    use tempfile::tempdir;

    fn ladder() -> RenditionLadder {
        plan_ladder(SourceDimensions::new(1920, 1080)).unwrap()
    }

    #[test]
    fn master_lists_every_rendition_in_ladder_order() {
        let playlist = render_master(&ladder());
        let lines: Vec<&str> = playlist.lines().collect();
        assert_eq!(lines.len(), 2 + 2 * 3);
        assert_eq!(
            lines,
            vec![
                "#EXTM3U",
                "#EXT-X-VERSION:4",
                "#EXT-X-STREAM-INF:BANDWIDTH=423000,RESOLUTION=1344x756",
                "super_low/index.m3u8",
                "#EXT-X-STREAM-INF:BANDWIDTH=737000,RESOLUTION=1536x864",
                "lower/index.m3u8",
                "#EXT-X-STREAM-INF:BANDWIDTH=1296000,RESOLUTION=1920x1080",
                "low/index.m3u8",
            ]
        );
    }

    #[test]
    fn writes_both_playlists() {
        let temp = tempdir().unwrap();
        let written = write_master_playlists(&ladder(), temp.path()).unwrap();

        let master = std::fs::read_to_string(&written.master).unwrap();
        assert_eq!(master.lines().count(), 8);

        let low = std::fs::read_to_string(&written.low_master).unwrap();
        let lines: Vec<&str> = low.lines().collect();
        assert_eq!(lines.len(), 2 + 2 * 2);
        assert!(lines.contains(&"super_low/index.m3u8"));
        assert!(lines.contains(&"lower/index.m3u8"));
        assert!(!lines.contains(&"low/index.m3u8"));

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 2);
    }

    #[test]
    fn missing_output_directory_is_an_assembly_error() {
        let temp = tempdir().unwrap();
        let err = write_master_playlists(&ladder(), &temp.path().join("absent")).unwrap_err();
        assert!(err.path.ends_with("master.m3u8"));
    }

    #[test]
    fn rewriting_replaces_previous_document() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(MASTER_PLAYLIST_NAME), "stale").unwrap();
        write_master_playlists(&ladder(), temp.path()).unwrap();
        let master = std::fs::read_to_string(temp.path().join(MASTER_PLAYLIST_NAME)).unwrap();
        assert!(master.starts_with("#EXTM3U\n"));
    }
}
