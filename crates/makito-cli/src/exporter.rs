use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, Utc};
use makito_core::{PollScheduler, Snapshot, Transport};
use serde_json::{json, Value};
use tracing::error;

use crate::{ctrl_c_token, log_failures};

const LOG_PREFIX: &str = "makito-";
const LOG_SUFFIX: &str = ".jsonl";
const DECODER_FIELDS: [&str; 8] = [
    "name",
    "state",
    "state_code",
    "signal",
    "stream_name",
    "stream_bitrate",
    "stream_connection_state",
    "uptime",
];

pub async fn run_exporter<T: Transport>(
    scheduler: &mut PollScheduler<T>,
    output_dir: &str,
    retention_days: u64,
) -> Result<()> {
    let out_dir = PathBuf::from(output_dir);
    fs::create_dir_all(&out_dir)?;

    let mut state = ExportState::new(out_dir, retention_days)?;

    let failures = scheduler.start().await?;
    log_failures(&failures);
    let store = scheduler.store().clone();
    state.write_snapshot(&store.snapshot(), &[])?;

    let cancel = ctrl_c_token();
    let stopper = cancel.clone();
    let mut outcome = Ok(());
    scheduler
        .run(cancel, |report| {
            let failures: Vec<String> = report.failures.iter().map(ToString::to_string).collect();
            let written = state
                .write_snapshot(&store.snapshot(), &failures)
                .and_then(|()| state.maybe_prune());
            if let Err(err) = written {
                error!(error = %err, "export failed, stopping");
                outcome = Err(err);
                stopper.cancel();
            }
        })
        .await;

    outcome
}

struct ExportState {
    out_dir: PathBuf,
    retention_days: u64,
    current_day: String,
    writer: BufWriter<File>,
    last_prune: Instant,
}

impl ExportState {
    fn new(out_dir: PathBuf, retention_days: u64) -> Result<Self> {
        let now = Utc::now();
        let day = now.format("%Y-%m-%d").to_string();
        let writer = Self::open_writer(&out_dir, &day)?;

        Ok(Self {
            out_dir,
            retention_days,
            current_day: day,
            writer,
            last_prune: Instant::now() - Duration::from_secs(3600),
        })
    }

    fn open_writer(out_dir: &Path, day: &str) -> Result<BufWriter<File>> {
        let path = out_dir.join(format!("{LOG_PREFIX}{day}{LOG_SUFFIX}"));
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(BufWriter::new(file))
    }

    fn rotate_if_needed(&mut self, ts: DateTime<Utc>) -> Result<()> {
        let day = ts.format("%Y-%m-%d").to_string();
        if day != self.current_day {
            self.writer.flush()?;
            self.writer = Self::open_writer(&self.out_dir, &day)?;
            self.current_day = day;
        }
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &Snapshot, failures: &[String]) -> Result<()> {
        self.rotate_if_needed(snapshot.ts)?;

        let exported = export_record(snapshot, failures);

        serde_json::to_writer(&mut self.writer, &exported)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        let latest_path = self.out_dir.join("latest.json");
        fs::write(latest_path, serde_json::to_vec_pretty(&exported)?)?;

        Ok(())
    }

    fn maybe_prune(&mut self) -> Result<()> {
        if self.last_prune.elapsed() < Duration::from_secs(1800) {
            return Ok(());
        }
        self.last_prune = Instant::now();

        prune_old_log_files(&self.out_dir, self.retention_days, SystemTime::now())?;

        Ok(())
    }
}

/// One JSONL line: the headline device values plus a trimmed view of every
/// decoder.
pub(crate) fn export_record(snapshot: &Snapshot, failures: &[String]) -> Value {
    let system = |key: &str| snapshot.system.get(key).cloned();
    let decoders: Vec<Value> = snapshot
        .decoders
        .iter()
        .enumerate()
        .map(|(index, vars)| {
            let mut entry = serde_json::Map::new();
            entry.insert("index".to_string(), json!(index));
            for field in DECODER_FIELDS {
                entry.insert(field.to_string(), vars.get(field).cloned().unwrap_or(Value::Null));
            }
            entry.insert(
                "thumbnail".to_string(),
                json!(snapshot.thumbnails.get(index).cloned().flatten()),
            );
            Value::Object(entry)
        })
        .collect();

    json!({
        "ts": snapshot.ts,
        "unix_ms": snapshot.ts.timestamp_millis(),
        "epoch": snapshot.epoch,
        "tick": snapshot.tick,
        "status": snapshot.status,
        "device": {
            "ip": system("device_ip"),
            "type": system("device_type"),
            "serial": system("device_serial"),
            "firmware": system("device_version"),
            "status": system("device_status"),
            "temperature": system("device_temperature"),
            "uptime_seconds": system("device_uptime_seconds"),
        },
        "streams": system("stream_count"),
        "preset_active": system("preset_active"),
        "decoders": decoders,
        "failures": failures,
    })
}

pub(crate) fn prune_old_log_files(out_dir: &Path, retention_days: u64, now: SystemTime) -> Result<()> {
    let today = DateTime::<Utc>::from(now).date_naive();
    let cutoff = today
        .checked_sub_days(Days::new(retention_days))
        .unwrap_or(today);

    for entry in fs::read_dir(out_dir)? {
        let path = entry?.path();

        let Some(file_name) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        let Some(date_part) = file_name
            .strip_prefix(LOG_PREFIX)
            .and_then(|v| v.strip_suffix(LOG_SUFFIX))
        else {
            continue;
        };

        let Ok(file_date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };

        if file_date < cutoff {
            let _ = fs::remove_file(path);
        }
    }

    Ok(())
}
