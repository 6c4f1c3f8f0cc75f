//! Logging setup
//!
//! `env_logger` writes every record to stdout and to a log file that is
//! rotated at midnight, keeping a fixed number of dated backups.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use env_logger::{Builder, Env, Target};

const BACKUP_DATE_FORMAT: &str = "%Y-%m-%d";

/// Install the global logger. `RUST_LOG` overrides the default `info` filter.
pub fn init(path: &Path, retain_days: usize) -> Result<(), String> {
    let file = DailyRotatingFile::open(path, retain_days)
        .map_err(|e| format!("cannot open log file {}: {}", path.display(), e))?;

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .map_err(|e| e.to_string())
}

/// Copies every log line to stdout and the rotating file
struct Tee {
    file: DailyRotatingFile,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Console output is best effort; the file is the record.
        let _ = io::stdout().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stdout().flush();
        self.file.flush()
    }
}

/// Append-only log file renamed to `<name>.<date>` when the day changes
pub struct DailyRotatingFile {
    path: PathBuf,
    retain: usize,
    opened_on: NaiveDate,
    file: File,
}

impl DailyRotatingFile {
    pub fn open(path: &Path, retain: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // An existing file belongs to the day it was last written.
        let opened_on = fs::metadata(path)
            .and_then(|m| m.modified())
            .map(|t| DateTime::<Local>::from(t).date_naive())
            .unwrap_or_else(|_| Local::now().date_naive());

        Ok(Self {
            path: path.to_path_buf(),
            retain,
            opened_on,
            file: append_to(path)?,
        })
    }

    pub fn rotate_if_needed(&mut self, today: NaiveDate) -> io::Result<()> {
        if today == self.opened_on {
            return Ok(());
        }

        self.file.flush()?;
        fs::rename(&self.path, self.backup_path(self.opened_on))?;
        self.file = append_to(&self.path)?;
        self.opened_on = today;
        self.prune()
    }

    fn backup_path(&self, date: NaiveDate) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", date.format(BACKUP_DATE_FORMAT)));
        PathBuf::from(name)
    }

    /// Delete all but the newest `retain` backups
    fn prune(&self) -> io::Result<()> {
        let Some(file_name) = self.path.file_name().and_then(|n| n.to_str()) else {
            return Ok(());
        };
        let prefix = format!("{}.", file_name);
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut backups: Vec<(NaiveDate, PathBuf)> = fs::read_dir(&dir)?
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let suffix = name.strip_prefix(&prefix)?;
                let date = NaiveDate::parse_from_str(suffix, BACKUP_DATE_FORMAT).ok()?;
                Some((date, entry.path()))
            })
            .collect();

        backups.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, stale) in backups.into_iter().skip(self.retain) {
            fs::remove_file(stale)?;
        }
        Ok(())
    }
}

impl Write for DailyRotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.rotate_if_needed(Local::now().date_naive())?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
