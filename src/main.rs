use std::path::PathBuf;

use reel_tui::app::RunOptions;
use reel_tui::catalog::Catalog;

fn main() {
    let options = match handle_cli_flags() {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(message) => {
            eprintln!("error: {message}");
            std::process::exit(2);
        }
    };

    if let Err(err) = reel_tui::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

/// Returns `None` when a flag was handled and the program should exit.
fn handle_cli_flags() -> Result<Option<RunOptions>, String> {
    let mut options = RunOptions::default();
    let mut saw_flag = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Reel-TUI {}", reel_tui::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "Reel-TUI - Browse, like and comment on a video catalog from the terminal.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n  --catalog            List the video catalog and exit\n  --config <path>      Read configuration from <path>\n  --ephemeral          Keep likes, comments and sessions in memory only"
                );
                saw_flag = true;
            }
            "--catalog" => {
                print_catalog();
                saw_flag = true;
            }
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| "--config requires a path".to_string())?;
                options.config_file = Some(PathBuf::from(path));
            }
            "--ephemeral" => options.ephemeral = true,
            other => return Err(format!("unknown argument {other}; see --help")),
        }
    }
    Ok(if saw_flag { None } else { Some(options) })
}

fn print_catalog() {
    let catalog = Catalog::builtin();
    for video in catalog.videos() {
        println!("{:<16} {:<10} {}", video.id, video.category, video.title);
    }
}
