use std::process::ExitCode;

use anyhow::Result;
use unmark_config::UnmarkConfig;
use unmark_core::{NotifierBackend, ProcessedLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Ok,
    Warn,
    Fail,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Ok => "[ok]  ",
            Level::Warn => "[warn]",
            Level::Fail => "[fail]",
        }
    }
}

#[derive(Debug, Default)]
struct Report {
    failed: bool,
}

impl Report {
    fn line(&mut self, level: Level, message: impl AsRef<str>) {
        if level == Level::Fail {
            self.failed = true;
        }
        println!("{} {}", level.tag(), message.as_ref());
    }
}

pub fn run(config: &UnmarkConfig) -> Result<ExitCode> {
    let mut report = Report::default();

    match config.transform.program.as_deref().map(str::trim) {
        Some(program) if !program.is_empty() => match which::which(program) {
            Ok(path) => report.line(Level::Ok, format!("transform program: {}", path.display())),
            Err(_) => report.line(
                Level::Fail,
                format!("transform program `{program}` not found on PATH"),
            ),
        },
        _ => report.line(Level::Fail, "transform program is not configured"),
    }

    match config.input_root() {
        Ok(root) if root.is_dir() => {
            report.line(Level::Ok, format!("input folder: {}", root.display()))
        }
        Ok(root) => report.line(
            Level::Fail,
            format!("input folder {} does not exist", root.display()),
        ),
        Err(err) => report.line(Level::Fail, err.to_string()),
    }

    match config.output_root() {
        Ok(root) if root.is_dir() => {
            report.line(Level::Ok, format!("output folder: {}", root.display()))
        }
        Ok(root) => report.line(
            Level::Warn,
            format!("output folder {} will be created", root.display()),
        ),
        Err(err) => report.line(Level::Fail, err.to_string()),
    }

    if let Ok(path) = config.ledger_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(_) => {
                    let ledger = ProcessedLedger::load(&path);
                    report.line(
                        Level::Ok,
                        format!("ledger {} holds {} entries", path.display(), ledger.len()),
                    );
                }
                Err(err) => report.line(
                    Level::Fail,
                    format!("ledger {} is unreadable: {err}", path.display()),
                ),
            }
        } else {
            report.line(
                Level::Ok,
                format!("ledger {} will be created", path.display()),
            );
        }
    }

    let wants_osascript = match config.notifications.backend {
        NotifierBackend::Osascript => true,
        NotifierBackend::Auto => cfg!(target_os = "macos"),
        NotifierBackend::Log | NotifierBackend::Disabled => false,
    };
    if wants_osascript {
        match which::which("osascript") {
            Ok(_) => report.line(Level::Ok, "desktop notifications available"),
            Err(_) => report.line(
                Level::Warn,
                "osascript not found; notifications will be skipped",
            ),
        }
    }

    Ok(if report.failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
