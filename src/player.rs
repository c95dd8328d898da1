use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::catalog::Video;

const URL_PLACEHOLDER: &str = "%URL%";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    Command(Vec<String>),
    Browser(String),
}

/// Expands the configured player command for `video`. An empty command means
/// the URL goes to the system browser; a command without a placeholder gets
/// the URL appended.
pub fn plan(command: &[String], video: &Video) -> Result<Launch> {
    let url = video.url.trim();
    if url.is_empty() {
        return Err(anyhow!("video {} has no playback url", video.id));
    }
    if command.is_empty() {
        return Ok(Launch::Browser(url.to_string()));
    }

    let mut args: Vec<String> = command
        .iter()
        .map(|arg| arg.replace(URL_PLACEHOLDER, url))
        .collect();
    if !command.iter().any(|arg| arg.contains(URL_PLACEHOLDER)) {
        args.push(url.to_string());
    }
    Ok(Launch::Command(args))
}

pub fn launch(command: &[String], video: &Video) -> Result<()> {
    match plan(command, video)? {
        Launch::Browser(url) => {
            info!(%url, "opening video in browser");
            webbrowser::open(&url).with_context(|| format!("open {url} in browser"))?;
        }
        Launch::Command(args) => {
            let (program, rest) = args
                .split_first()
                .ok_or_else(|| anyhow!("player command is empty"))?;
            info!(%program, video = %video.id, "launching player");
            Command::new(program)
                .args(rest)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .with_context(|| format!("launch {program} for {}", video.url))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;

    fn video(url: &str) -> Video {
        Video::new("clip", "Clip", "", url, Category::Trending)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn substitutes_placeholder() {
        let launch = plan(&strings(&["mpv", "--fs", "%URL%"]), &video("https://v/a.mp4")).unwrap();
        assert_eq!(
            launch,
            Launch::Command(strings(&["mpv", "--fs", "https://v/a.mp4"]))
        );
    }

    #[test]
    fn appends_url_without_placeholder() {
        let launch = plan(&strings(&["vlc"]), &video("https://v/a.mp4")).unwrap();
        assert_eq!(launch, Launch::Command(strings(&["vlc", "https://v/a.mp4"])));
    }

    #[test]
    fn empty_command_uses_browser() {
        let launch = plan(&[], &video(" https://v/a.mp4 ")).unwrap();
        assert_eq!(launch, Launch::Browser("https://v/a.mp4".into()));
    }

    #[test]
    fn missing_url_is_an_error() {
        assert!(plan(&strings(&["mpv"]), &video("  ")).is_err());
    }
}
